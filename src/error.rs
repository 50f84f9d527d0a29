//! Error type shared by the packet builders and the CV engine.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = core::result::Result<T, Error>;

/// Errors returned by packet construction and CV operations.
///
/// Decode faults on the RailCom side are absorbed by the transmitter and never
/// show up here.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Error {
    /// The address is outside the short/long/accessory range.
    #[error("address out of range")]
    InvalidAddress,
    /// Address and payload do not make a packet of 2 to 9 bytes.
    #[error("packet length out of range")]
    InvalidLength,
    /// The loco index has no statistics slot.
    #[error("loco index out of range")]
    InvalidLocoIndex,
    /// CV number is zero or beyond the addressable range.
    #[error("CV number out of range")]
    InvalidCv,
    /// XPOM sequence number or count outside `0..4`.
    #[error("XPOM sequence out of range")]
    InvalidSequence,
    /// No acknowledgement pulse inside the programming window.
    #[error("no acknowledgement from decoder")]
    NoAcknowledge,
    /// No RailCom answer inside the read window.
    #[error("no RailCom response from decoder")]
    NoResponse,
}
