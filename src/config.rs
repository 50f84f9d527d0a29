//! Timing and repetition parameters.
//!
//! Everything the protocol core needs from the board is injected through
//! [`Config`] at construction. The defaults are the values in
//! [`crate::consts`]; only change them if the bit timer cannot run at 29 µs or
//! a decoder population needs longer windows.

use crate::consts::*;
use crate::shared::Mode;

/// Timing configuration shared by the transmitter and the station.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Config {
    /// Period between two `tick()` calls, in nanoseconds
    pub tick_period_ns: u32,
    /// Preamble one-bits without cutout
    pub preamble_bits: u8,
    /// Preamble one-bits in RailCom mode
    pub preamble_bits_railcom: u8,
    /// Preamble one-bits on the programming track
    pub preamble_bits_programming: u8,
    /// Acknowledgement sample interval, in microseconds
    pub ack_sample_us: u32,
    /// Samples above threshold needed to accept an acknowledgement
    pub ack_min_samples: u16,
    /// Acknowledgement window after a programming-track write, in milliseconds
    pub pgm_write_window_ms: u32,
    /// Acknowledgement window after a programming-track verify, in milliseconds
    pub pgm_read_window_ms: u32,
    /// Reset packets before every programming-track operation
    pub pgm_reset_repeat: u8,
    /// Repetitions of every programming-track command
    pub pgm_command_repeat: u8,
    /// POM read commands before probing with get-ack packets
    pub pom_read_attempts: u8,
    /// Overall POM read window, in milliseconds
    pub pom_read_window_ms: u32,
    /// Misses tolerated after a first POM answer
    pub pom_max_misses: u8,
    /// XPOM poll window, in milliseconds
    pub xpom_window_ms: u32,
    /// Delay before the automatic switch deactivate, in milliseconds
    pub switch_reset_delay_ms: u32,
    /// Age after which a loco location is stale, in milliseconds
    pub location_stale_ms: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

impl Config {
    /// The standard timing.
    pub const fn new() -> Self {
        Self {
            tick_period_ns: TICK_PERIOD_NS,
            preamble_bits: PREAMBLE_BITS,
            preamble_bits_railcom: PREAMBLE_BITS_RAILCOM,
            preamble_bits_programming: PREAMBLE_BITS_PROGRAMMING,
            ack_sample_us: ACK_SAMPLE_US,
            ack_min_samples: ACK_MIN_SAMPLES,
            pgm_write_window_ms: PGM_WRITE_WINDOW_MS,
            pgm_read_window_ms: PGM_READ_WINDOW_MS,
            pgm_reset_repeat: PGM_RESET_REPEAT,
            pgm_command_repeat: PGM_COMMAND_REPEAT,
            pom_read_attempts: POM_READ_ATTEMPTS,
            pom_read_window_ms: POM_READ_WINDOW_MS,
            pom_max_misses: POM_MAX_MISSES,
            xpom_window_ms: XPOM_WINDOW_MS,
            switch_reset_delay_ms: SWITCH_RESET_DELAY_MS,
            location_stale_ms: LOCATION_STALE_MS,
        }
    }

    /// Preamble length for `mode`.
    pub fn preamble_for(&self, mode: Mode) -> u8 {
        match mode {
            Mode::RailCom => self.preamble_bits_railcom,
            Mode::NoRailCom => self.preamble_bits,
            Mode::Programming => self.preamble_bits_programming,
        }
    }
}
