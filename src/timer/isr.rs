use core::cell::RefCell;

use critical_section::Mutex;
use embedded_hal::digital::OutputPin;

use crate::config::Config;
use crate::hal::RailcomReceiver;
use crate::shared::Shared;
use crate::transmitter::Transmitter;

/// The global transmitter slot an interrupt handler ticks.
pub type GlobalTransmitter<SIG, CUT, PWR, RC> =
    Mutex<RefCell<Option<Transmitter<'static, SIG, CUT, PWR, RC>>>>;

/// Used to initialize the global static transmitter for use with
/// `critical_section`.
///
/// # Returns
/// * An empty mutable ref-cell
///
/// # Example
/// ```rust,ignore
/// static SHARED: Shared = Shared::new();
/// static TRACK: GlobalTransmitter<PD1, PD2, PD3, UartRx> = global_transmitter_init();
/// ```
pub const fn global_transmitter_init<SIG, CUT, PWR, RC>() -> GlobalTransmitter<SIG, CUT, PWR, RC> {
    Mutex::new(RefCell::new(None))
}

/// Builds the transmitter and moves it into `global`.
///
/// # Arguments
/// * The global static transmitter slot
/// * The shared context the foreground station uses as well
/// * The signal, cutout and booster enable pins
/// * The RailCom receiver
/// * The timing configuration; its `tick_period_ns` must match the timer
///
/// # Example
/// ```rust,ignore
/// fn main() {
///     global_transmitter_setup(&TRACK, &SHARED, sig, cut, pwr, uart, Config::new());
/// }
/// ```
pub fn global_transmitter_setup<SIG, CUT, PWR, RC>(
    global: &'static GlobalTransmitter<SIG, CUT, PWR, RC>,
    shared: &'static Shared,
    signal: SIG,
    cutout: CUT,
    power: PWR,
    receiver: RC,
    config: Config,
) where
    SIG: OutputPin,
    CUT: OutputPin,
    PWR: OutputPin,
    RC: RailcomReceiver,
{
    critical_section::with(|cs| {
        let _ = global.borrow(cs).replace(Some(Transmitter::new(
            shared, signal, cutout, power, receiver, config,
        )));
    });
}

/// Runs the tick at each interrupt
///
/// # Example
/// ```rust,ignore
/// #[interrupt]
/// fn TIM2() {
///     global_transmitter_tick(&TRACK);
/// }
/// ```
pub fn global_transmitter_tick<SIG, CUT, PWR, RC>(global: &'static GlobalTransmitter<SIG, CUT, PWR, RC>)
where
    SIG: OutputPin,
    CUT: OutputPin,
    PWR: OutputPin,
    RC: RailcomReceiver,
{
    critical_section::with(|cs| {
        if let Some(tx) = global.borrow(cs).borrow_mut().as_mut() {
            tx.tick();
        }
    });
}
