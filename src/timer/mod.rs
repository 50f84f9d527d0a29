//! Tick sources for the transmitter.
//!
//! [`Transmitter::tick`](crate::transmitter::Transmitter::tick) has to run every
//! 29 µs. Two ways of getting there are provided: an interrupt service
//! routine sharing the transmitter through `critical_section::with`
//! (`timer-isr` feature), or a busy loop on a [`DelayNs`](embedded_hal::delay::DelayNs)
//! (`delay-loop` feature).
//!
//! Helpers for the compare/reload register of the tick timer:
//! - `compute_reload`: runtime calculator
//! - `const_reload`: compile-time calculator
//! - `global_transmitter_tick` and `tick_track!()`: interrupt callback wrapper
//!   (feature `timer-isr`)
//! - `run_tick_loop`: blocking driver loop (feature `delay-loop`)
//!
//! Common settings for a 29 µs tick:
//!
//! | F_CPU  | PRESCALER | RELOAD |
//! |--------|-----------|--------|
//! | 16 MHz |         8 |     58 |
//! | 48 MHz |         1 |   1392 |
//! | 72 MHz |         8 |    261 |

use libm::round;

#[cfg(feature = "delay-loop")]
mod delay;
#[cfg(feature = "delay-loop")]
pub use delay::*;

#[cfg(feature = "timer-isr")]
mod isr;
#[cfg(feature = "timer-isr")]
pub use isr::*;

#[cfg(feature = "timer-isr")]
mod macros;

/// Nanoseconds per second
pub const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// Computes the reload value of a timer in CTC mode.
///
/// # Arguments
/// - `f_cpu`: CPU frequency in Hz
/// - `prescaler`: timer prescaler (e.g., 1, 8, 64)
/// - `tick_ns`: tick period in nanoseconds (usually [`Config::tick_period_ns`](crate::config::Config::tick_period_ns))
///
/// # Returns
/// Timer counts per tick, rounded to the nearest integer
pub fn compute_reload(f_cpu: u32, prescaler: u32, tick_ns: u32) -> u16 {
    let counts_per_second = f_cpu as f64 / prescaler as f64;
    let counts = counts_per_second * tick_ns as f64 / NANOS_PER_SECOND as f64;
    round(counts) as u16
}

/// Compile-time reload value calculator, see [`compute_reload`].
pub const fn const_reload(f_cpu: u32, prescaler: u32, tick_ns: u32) -> u16 {
    let counts = (f_cpu / prescaler) as u64 * tick_ns as u64;
    ((counts + NANOS_PER_SECOND / 2) / NANOS_PER_SECOND) as u16
}

/// Actual tick period produced by a reload value, in nanoseconds.
///
/// Pass the result to [`Config::tick_period_ns`](crate::config::Config::tick_period_ns)
/// so the millisecond clock stays accurate when the reload had to be rounded.
pub const fn tick_period_ns(f_cpu: u32, prescaler: u32, reload: u16) -> u32 {
    (reload as u64 * prescaler as u64 * NANOS_PER_SECOND / f_cpu as u64) as u32
}
