//! Constants used across the DCC/RailCom protocol implementation.
//!
//! This module defines the protocol-wide constants used for packet sizing,
//! preamble control, RailCom cutout sequencing and the timing budgets of the
//! CV engine.
//!
//! The values follow the NMRA/RCN DCC conventions (RCN-211 to RCN-217). The
//! timing values are defaults; most of them can be overridden through
//! [`Config`](crate::config::Config).
//!
//! ## Key Concepts
//!
//! - **Packets**: address bytes, instruction bytes and a trailing XOR checksum.
//! - **Preamble**: run of one-bits before the packet start bit. Its length depends
//!   on the operating [`Mode`](crate::shared::Mode).
//! - **Cutout**: fixed tick offsets inside the RailCom window.
//! - **Statistics**: per-loco windows of [`RC2_WINDOW`] commands.

/// Maximum length (in bytes) of a DCC packet, checksum included.
pub const MAX_PACKET_LEN: usize = 9;

/// Minimum length (in bytes) of a DCC packet, checksum included.
pub const MIN_PACKET_LEN: usize = 2;

/// Address value meaning "no address bytes": the payload already carries
/// everything (accessory packets, service-mode packets).
pub const NO_ADDRESS: u16 = 0xFFFF;

/// Highest address that is encoded as a one-byte (short) address.
pub const MAX_SHORT_ADDRESS: u16 = 127;

/// Highest extended (two-byte) locomotive address.
pub const MAX_LONG_ADDRESS: u16 = 10239;

/// Highest basic accessory address accepted by the switch builders.
pub const MAX_ACCESSORY_ADDRESS: u16 = 2044;

/// Highest CV number reachable with the short (10 bit) CV form.
pub const MAX_CV: u16 = 1024;

/// Highest CV index reachable with the XPOM (24 bit) CV form.
pub const MAX_XPOM_CV: u32 = 0x00FF_FFFF;

/// Preamble length (in one-bits) without RailCom.
pub const PREAMBLE_BITS: u8 = 12;

/// Preamble length (in one-bits) with RailCom cutout enabled.
pub const PREAMBLE_BITS_RAILCOM: u8 = 16;

/// Preamble length (in one-bits) on the programming track.
pub const PREAMBLE_BITS_PROGRAMMING: u8 = 20;

/// Filler frame sent while nothing is queued (idle packet).
pub const IDLE_FRAME: [u8; 3] = [0xFF, 0x00, 0xFF];

/// Filler frame sent while nothing is queued in programming mode (reset packet).
pub const RESET_FRAME: [u8; 3] = [0x00, 0x00, 0x00];

/// Default tick period of the bit timer, in nanoseconds.
pub const TICK_PERIOD_NS: u32 = 29_000;

/// Cutout step: force positive track polarity.
pub const CUTOUT_STEP_POLARITY: u8 = 1;
/// Cutout step: disable track drive.
pub const CUTOUT_STEP_START: u8 = 2;
/// Cutout step: enable the RailCom receiver.
pub const CUTOUT_STEP_RX_ENABLE: u8 = 4;
/// Cutout step: flush the receiver input.
pub const CUTOUT_STEP_RX_FLUSH: u8 = 5;
/// Cutout step: read and decode channel 1.
pub const CUTOUT_STEP_CHANNEL1: u8 = 9;
/// Cutout step: read and decode channel 2, then disable the receiver.
pub const CUTOUT_STEP_CHANNEL2: u8 = 17;
/// Cutout step: restore track drive and return to ready.
pub const CUTOUT_STEP_END: u8 = 18;

/// Maximum number of raw bytes in a RailCom channel-1 datagram.
pub const CHANNEL1_LEN: usize = 2;

/// Maximum number of raw bytes in a RailCom channel-2 datagram.
pub const CHANNEL2_LEN: usize = 6;

/// Number of XPOM sequence slots.
pub const XPOM_SEQUENCES: usize = 4;

/// Number of per-loco statistics slots.
pub const MAX_LOCOS: usize = 32;

/// Number of commands in one RailCom channel-2 statistics window.
pub const RC2_WINDOW: u16 = 50;

/// Number of loco-location records kept.
pub const MAX_LOCATIONS: usize = 16;

/// Reset packets sent before every programming-track operation.
pub const PGM_RESET_REPEAT: u8 = 25;

/// Repetitions of a programming-track command before acknowledgement polling.
pub const PGM_COMMAND_REPEAT: u8 = 5;

/// Acknowledgement window for programming-track writes, in milliseconds.
pub const PGM_WRITE_WINDOW_MS: u32 = 100;

/// Acknowledgement window for programming-track reads, in milliseconds.
pub const PGM_READ_WINDOW_MS: u32 = 80;

/// Acknowledgement sample interval, in microseconds.
pub const ACK_SAMPLE_US: u32 = 100;

/// Consecutive active samples needed to accept an acknowledgement (~4 ms).
pub const ACK_MIN_SAMPLES: u16 = 40;

/// Number of POM read commands sent before falling back to ACK probes.
pub const POM_READ_ATTEMPTS: u8 = 4;

/// Overall POM read window, in milliseconds.
pub const POM_READ_WINDOW_MS: u32 = 500;

/// Consecutive misses tolerated after a first POM answer.
pub const POM_MAX_MISSES: u8 = 5;

/// XPOM poll window, in milliseconds.
pub const XPOM_WINDOW_MS: u32 = 30;

/// Delay between a switch activate and its automatic deactivate, in milliseconds.
pub const SWITCH_RESET_DELAY_MS: u32 = 200;

/// Age after which a loco-location record is stale, in milliseconds.
pub const LOCATION_STALE_MS: u32 = 1000;

/// Age after which a RailCom channel-1 or channel-2 address is stale, in milliseconds.
pub const RAILCOM_ADDRESS_STALE_MS: u32 = 1000;

/// Pause between two attempts to hand a packet to the transmitter, in microseconds.
pub const SUBMIT_SPIN_US: u32 = 5;
