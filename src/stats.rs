//! Per-loco RailCom channel-2 statistics.
//!
//! Each loco index owns an [`Rc2Slot`] with two rotating windows of
//! [`RC2_WINDOW`] commands. The active window counts commands and answers;
//! once it has seen a full window of commands the other window becomes active
//! and the response rate is read from the one just filled. This gives a moving
//! average over the last complete window without any history buffer.

use crate::consts::{MAX_LOCOS, RC2_WINDOW};

/// How a decoder answered in the channel-2 window of a cutout.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Response {
    /// Nothing usable was received.
    None,
    /// A well-formed datagram with an unknown identifier: proof of life, but no value.
    Partial,
    /// A decoded value or an ACK/NACK.
    Full,
}

/// Statistics for one loco index.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Rc2Slot {
    last_command: Option<u32>,
    last_response: Option<u32>,
    commands: [u16; 2],
    responses: [u16; 2],
    active: usize,
}

impl Default for Rc2Slot {
    fn default() -> Self {
        Self::new()
    }
}

impl Rc2Slot {
    /// Creates an empty slot.
    pub const fn new() -> Self {
        Self {
            last_command: None,
            last_response: None,
            commands: [0; 2],
            responses: [0; 2],
            active: 0,
        }
    }

    /// Books one cutout cycle for this slot.
    ///
    /// # Returns
    /// `true` if the active window rotated.
    pub fn record(&mut self, response: Response, now: u32) -> bool {
        self.last_command = Some(now);
        match response {
            Response::Full => {
                self.last_response = Some(now);
                self.responses[self.active] += 1;
            }
            Response::Partial => self.last_response = Some(now),
            Response::None => {}
        }
        self.commands[self.active] += 1;
        if self.commands[self.active] >= RC2_WINDOW {
            self.active ^= 1;
            self.commands[self.active] = 0;
            self.responses[self.active] = 0;
            return true;
        }
        false
    }

    /// Response rate of the last completed window, in percent.
    pub fn rate(&self) -> u8 {
        let filled = self.responses[self.active ^ 1] as u32;
        (filled * 100 / RC2_WINDOW as u32).min(100) as u8
    }

    /// Milliseconds since the last answer, if there was one.
    pub fn response_age(&self, now: u32) -> Option<u32> {
        self.last_response.map(|t| now.wrapping_sub(t))
    }

    /// Milliseconds since the last command was booked, if there was one.
    pub fn command_age(&self, now: u32) -> Option<u32> {
        self.last_command.map(|t| now.wrapping_sub(t))
    }

    /// Forgets the timestamps, keeping the windows.
    pub fn clear_timestamps(&mut self) {
        self.last_command = None;
        self.last_response = None;
    }
}

/// Statistics table for all loco indices.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Rc2Stats {
    slots: [Rc2Slot; MAX_LOCOS],
}

impl Default for Rc2Stats {
    fn default() -> Self {
        Self::new()
    }
}

impl Rc2Stats {
    /// Creates a table of empty slots.
    pub const fn new() -> Self {
        const EMPTY: Rc2Slot = Rc2Slot::new();
        Self {
            slots: [EMPTY; MAX_LOCOS],
        }
    }

    /// Slot for `index`, if the index is in range.
    pub fn slot(&self, index: u8) -> Option<&Rc2Slot> {
        self.slots.get(index as usize)
    }

    /// Books one cutout cycle for `index`. Out-of-range indices are ignored.
    pub fn record(&mut self, index: u8, response: Response, now: u32) {
        if let Some(slot) = self.slots.get_mut(index as usize) {
            if slot.record(response, now) {
                trace!("rc2 window rotated: loco {} rate {}", index, slot.rate());
            }
        }
    }

    /// Resets the slot for `index` to its initial state.
    pub fn reset(&mut self, index: u8) {
        if let Some(slot) = self.slots.get_mut(index as usize) {
            *slot = Rc2Slot::new();
        }
    }

    /// Forgets every timestamp (track power went away).
    pub fn clear_timestamps(&mut self) {
        self.slots.iter_mut().for_each(Rc2Slot::clear_timestamps);
    }
}

/// Last DCC address used per loco index.
///
/// Consulted when a packet is submitted, so a slot reused for another
/// locomotive starts with fresh statistics.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct LocoTable {
    addresses: [Option<u16>; MAX_LOCOS],
}

impl Default for LocoTable {
    fn default() -> Self {
        Self::new()
    }
}

impl LocoTable {
    /// Creates an empty table.
    pub const fn new() -> Self {
        Self {
            addresses: [None; MAX_LOCOS],
        }
    }

    /// Records `address` for `index`.
    ///
    /// # Returns
    /// `true` if the index was previously used with a different address (or
    /// never used), i.e. the statistics slot must be reset.
    pub fn update(&mut self, index: u8, address: u16) -> bool {
        match self.addresses.get_mut(index as usize) {
            Some(entry) if *entry != Some(address) => {
                *entry = Some(address);
                true
            }
            _ => false,
        }
    }

    /// Address last used with `index`.
    pub fn address(&self, index: u8) -> Option<u16> {
        self.addresses.get(index as usize).copied().flatten()
    }
}
