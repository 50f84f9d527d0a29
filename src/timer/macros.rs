/// Declares a static global `TRACK` transmitter protected by a `critical_section` mutex.
///
/// This macro creates a `static` singleton `TRACK` suitable for use in
/// interrupt-based environments, where the tick interrupt owns the
/// transmitter and `main()` only installs it.
///
/// # Arguments
/// - `$sig`: concrete type of the signal pin (must implement `OutputPin`)
/// - `$cut`: concrete type of the cutout pin (must implement `OutputPin`)
/// - `$pwr`: concrete type of the booster enable pin (must implement `OutputPin`)
/// - `$rc`: concrete type of the RailCom receiver (must implement `RailcomReceiver`)
///
/// # Example
/// ```rust,ignore
/// init_track!(PD1, PD2, PD3, UartRx);
/// ```
#[macro_export]
macro_rules! init_track {
    ( $sig:ty, $cut:ty, $pwr:ty, $rc:ty ) => {
        pub static TRACK: $crate::timer::GlobalTransmitter<$sig, $cut, $pwr, $rc> =
            $crate::timer::global_transmitter_init();
    };
}

/// Builds a transmitter and stores it in the `TRACK` declared by `init_track!`.
///
/// # Arguments
/// - `$shared`: `&'static Shared` used by the foreground as well
/// - `$sig`, `$cut`, `$pwr`: the pins
/// - `$rc`: the RailCom receiver
/// - `$config`: optional `Config`; defaults to `Config::new()`
///
/// # Example
/// ```rust,ignore
/// fn main() {
///     setup_track!(&SHARED, sig, cut, pwr, uart);
/// }
/// ```
///
/// # Notes
/// - Call before enabling the tick interrupt.
#[macro_export]
macro_rules! setup_track {
    ( $shared:expr, $sig:expr, $cut:expr, $pwr:expr, $rc:expr ) => {
        $crate::setup_track!($shared, $sig, $cut, $pwr, $rc, $crate::config::Config::new())
    };
    ( $shared:expr, $sig:expr, $cut:expr, $pwr:expr, $rc:expr, $config:expr ) => {
        $crate::timer::global_transmitter_setup(&TRACK, $shared, $sig, $cut, $pwr, $rc, $config)
    };
}

/// Ticks the `TRACK` transmitter; call from the timer interrupt.
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn TIM2() {
///     tick_track!();
/// }
/// ```
#[macro_export]
macro_rules! tick_track {
    () => {
        $crate::timer::global_transmitter_tick(&TRACK)
    };
}
