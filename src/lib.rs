//! # dcc-railcom
//!
//! A portable, no_std core for DCC model-railway command stations with
//! RailCom feedback.
//!
//! The crate generates the bipolar DCC track signal from a fixed-period tick,
//! opens the RailCom cutout after every packet, decodes the 4-of-8 coded
//! answers of the decoders and keeps per-loco response statistics. On top of
//! that it implements the CV engine: programming track (PGM), programming on
//! the main (POM) and extended POM (XPOM).
//!
//! It is built from:
//! - `embedded-hal` traits for the track, cutout, booster and acknowledgement lines
//! - a single-slot packet handoff guarded by `critical-section`
//! - fixed-capacity tables from `heapless`, nothing is allocated
//! - optional tick sources using either a timer interrupt or a blocking delay
//!
//! ## Crate features
//! | Feature               | Description |
//! |-----------------------|-------------|
//! | `std`                 | Disables `#![no_std]` and enables `std` in the dependencies |
//! | `delay-loop`          | Blocking tick loop driven by `embedded_hal::delay::DelayNs` |
//! | `timer-isr` (default) | Global transmitter behind `critical_section::with` for timer interrupts |
//! | `defmt-0-3`           | Uses `defmt` logging |
//! | `log`                 | Uses `log` logging |
//!
//! ## Layout
//!
//! - [`shared::Shared`]: everything the interrupt and the foreground share.
//!   Lives in a `static`.
//! - [`transmitter::Transmitter`]: the interrupt half. Call
//!   [`tick()`](transmitter::Transmitter::tick) every 29 µs.
//! - [`station::Station`]: the foreground half. Builds packets, runs the CV
//!   engine, reads RailCom telemetry.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dcc_railcom::{Config, Shared, Station, Direction, init_track, setup_track, tick_track};
//! use dcc_railcom::ack::PinAck;
//!
//! static SHARED: Shared = Shared::new();
//! init_track!(SigPin, CutPin, PwrPin, Uart);
//!
//! #[interrupt]
//! fn TIM2() {
//!     tick_track!();
//! }
//!
//! fn main() {
//!     setup_track!(&SHARED, sig, cut, pwr, uart);
//!     let config = Config::new();
//!     let mut station = Station::new(&SHARED, delay, PinAck::from_config(ack_pin, &config), config);
//!     station.booster_on();
//!     station.send_speed_126(Some(0), 3, Direction::Forward, 40).unwrap();
//!     let value = station.pom_read_cv(Some(0), 3, 8);
//! }
//! ```
//!
//! ## Integration Notes
//!
//! - The tick must be the highest priority interrupt; jitter shows up directly
//!   as pulse-width error on the track.
//! - Only one `Transmitter` may be active per `Shared`.
//! - The foreground only waits for the packet slot, one frame at most, so no
//!   operation has a submission timeout.

#![deny(
    bad_style,
    improper_ctypes,
    non_shorthand_field_patterns,
    no_mangle_generic_items,
    overflowing_literals,
    path_statements,
    patterns_in_fns_without_body,
    unconditional_recursion,
    while_true,
    missing_debug_implementations,
    trivial_casts,
    unused_extern_crates,
    unused_import_braces
)]
#![warn(missing_docs, unused)]
#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
mod fmt;

pub use critical_section;
pub use heapless;

pub mod ack;
pub mod config;
pub mod consts;
mod cv;
pub mod error;
pub mod hal;
pub mod hamming;
pub mod location;
pub mod packet;
pub mod railcom;
pub mod shared;
pub mod station;
pub mod stats;
pub mod timer;
pub mod transmitter;

#[cfg(test)]
mod sim;

pub use config::Config;
pub use cv::XpomData;
pub use error::{Error, Result};
pub use packet::{Direction, FunctionGroup, Packet, SwitchState};
pub use shared::{Mode, Shared};
pub use station::Station;
pub use transmitter::Transmitter;
