use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::hal::RailcomReceiver;
use crate::transmitter::Transmitter;

/// Runs a blocking loop that repeatedly calls `tick()` on the transmitter.
///
/// For boards where the tick cannot come from a timer interrupt. The foreground
/// [`Station`](crate::station::Station) then has to run on another core or
/// thread sharing the same [`Shared`](crate::shared::Shared).
///
/// # Arguments
/// - `tx`: the transmitter
/// - `delay`: a delay provider from the HAL
/// - `tick_ns`: the delay between two ticks, normally
///   [`Config::tick_period_ns`](crate::config::Config::tick_period_ns)
///
/// # Notes
/// - This loop never returns.
/// - The time spent inside `tick()` adds to every period; prefer the
///   interrupt-driven tick where jitter matters.
pub fn run_tick_loop<D, SIG, CUT, PWR, RC>(
    tx: &mut Transmitter<'_, SIG, CUT, PWR, RC>,
    delay: &mut D,
    tick_ns: u32,
) -> !
where
    D: DelayNs,
    SIG: OutputPin,
    CUT: OutputPin,
    PWR: OutputPin,
    RC: RailcomReceiver,
{
    loop {
        tx.tick();
        delay.delay_ns(tick_ns);
    }
}
