//! Loco locations reported by local RailCom detectors.
//!
//! Track-section detectors outside this crate read channel 1 locally and
//! report "address X is in section Y". The table keeps the latest report per
//! address and hides entries older than the staleness limit.

use heapless::Vec;

use crate::consts::MAX_LOCATIONS;

/// One location report.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct Location {
    /// Loco address
    pub address: u16,
    /// Detector section the loco was seen in
    pub section: u16,
    /// Time of the report, in milliseconds
    pub timestamp: u32,
}

/// Fixed-size table of the most recent location per address.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct LocationTable {
    entries: Vec<Location, MAX_LOCATIONS>,
}

impl LocationTable {
    /// Creates an empty table.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Records that `address` was seen in `section` at `now`.
    ///
    /// When the table is full the oldest entry is replaced.
    pub fn report(&mut self, address: u16, section: u16, now: u32) {
        let location = Location {
            address,
            section,
            timestamp: now,
        };
        if let Some(entry) = self.entries.iter_mut().find(|e| e.address == address) {
            *entry = location;
            return;
        }
        if let Err(location) = self.entries.push(location) {
            let oldest = self
                .entries
                .iter_mut()
                .max_by_key(|e| now.wrapping_sub(e.timestamp));
            if let Some(entry) = oldest {
                *entry = location;
            }
        }
    }

    /// Latest location of `address`, unless older than `max_age` ms.
    pub fn get(&self, address: u16, now: u32, max_age: u32) -> Option<Location> {
        self.entries
            .iter()
            .find(|e| e.address == address)
            .filter(|e| now.wrapping_sub(e.timestamp) < max_age)
            .copied()
    }

    /// Iterates over the entries younger than `max_age` ms.
    pub fn fresh(&self, now: u32, max_age: u32) -> impl Iterator<Item = &Location> {
        self.entries
            .iter()
            .filter(move |e| now.wrapping_sub(e.timestamp) < max_age)
    }
}
