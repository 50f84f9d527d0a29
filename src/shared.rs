//! State shared between the tick interrupt and the foreground.
//!
//! [`Shared`] is the single context object of one track output. It is `const`
//! constructible so it can live in a `static`, and both halves of the crate
//! borrow it:
//!
//! - [`Transmitter`](crate::transmitter::Transmitter) (interrupt side) takes the
//!   pending packet, writes decoded RailCom data and statistics, and advances
//!   the millisecond clock.
//! - [`Station`](crate::station::Station) (foreground side) hands packets over,
//!   switches the operating mode and the booster, and reads telemetry.
//!
//! Single-word flags are atomics with one writer each; they only use `load`
//! and `store` so the crate also works on cores without compare-and-swap.
//! Multi-word state sits behind a `critical_section::Mutex`.
//!
//! | Field     | Writer      | Readers     |
//! |-----------|-------------|-------------|
//! | packet    | both (handoff) | both     |
//! | released  | interrupt   | foreground  |
//! | mode      | foreground  | interrupt   |
//! | booster   | foreground  | interrupt   |
//! | millis    | interrupt   | foreground  |
//! | railcom   | interrupt (foreground clears) | foreground |
//! | stats     | interrupt (foreground resets) | foreground |

use core::cell::RefCell;
use core::convert::Infallible;
use core::ops::Range;
use core::sync::atomic::{AtomicBool, AtomicU8, AtomicU32, Ordering};

use critical_section::Mutex;

use crate::consts::RAILCOM_ADDRESS_STALE_MS;
use crate::packet::Packet;
use crate::railcom::{DynValue, RailcomState, XpomSlot};
use crate::stats::{Rc2Slot, Rc2Stats, Response};

/// Operating mode of the track output.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
#[repr(u8)]
pub enum Mode {
    /// Main track with RailCom cutout after every packet.
    #[default]
    RailCom = 0,
    /// Main track without cutout.
    NoRailCom = 1,
    /// Programming track: long preamble, reset packets as filler, no cutout.
    Programming = 2,
}

impl Mode {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Mode::NoRailCom,
            2 => Mode::Programming,
            _ => Mode::RailCom,
        }
    }
}

/// Protocol engine context for one track output.
#[derive(Debug)]
pub struct Shared {
    packet: Mutex<RefCell<Option<Packet>>>,
    released: AtomicBool,
    mode: AtomicU8,
    booster: AtomicBool,
    millis: AtomicU32,
    railcom: Mutex<RefCell<RailcomState>>,
    stats: Mutex<RefCell<Rc2Stats>>,
}

impl Default for Shared {
    fn default() -> Self {
        Self::new()
    }
}

impl Shared {
    /// Creates the context: slot empty, RailCom mode, booster off, clock at 0.
    pub const fn new() -> Self {
        Self {
            packet: Mutex::new(RefCell::new(None)),
            released: AtomicBool::new(false),
            mode: AtomicU8::new(Mode::RailCom as u8),
            booster: AtomicBool::new(false),
            millis: AtomicU32::new(0),
            railcom: Mutex::new(RefCell::new(RailcomState::new())),
            stats: Mutex::new(RefCell::new(Rc2Stats::new())),
        }
    }

    /// Hands `packet` to the transmitter if the slot is free.
    ///
    /// # Returns
    /// `Err(nb::Error::WouldBlock)` while the previous packet has not been
    /// picked up yet.
    pub fn try_submit(&self, packet: &Packet) -> nb::Result<(), Infallible> {
        critical_section::with(|cs| {
            let mut slot = self.packet.borrow_ref_mut(cs);
            if slot.is_some() {
                return Err(nb::Error::WouldBlock);
            }
            *slot = Some(*packet);
            Ok(())
        })
    }

    /// Returns `true` if a packet is waiting in the slot.
    pub fn is_pending(&self) -> bool {
        critical_section::with(|cs| self.packet.borrow_ref(cs).is_some())
    }

    /// Takes the pending packet out of the slot and latches the release flag.
    pub(crate) fn take_packet(&self) -> Option<Packet> {
        let packet = critical_section::with(|cs| self.packet.borrow_ref_mut(cs).take());
        if packet.is_some() {
            self.released.store(true, Ordering::Release);
        }
        packet
    }

    /// Returns and clears the "slot released" flag.
    ///
    /// The transport layer polls this as its flow-control "continue" signal.
    pub fn take_released(&self) -> bool {
        critical_section::with(|_| {
            let released = self.released.load(Ordering::Acquire);
            self.released.store(false, Ordering::Release);
            released
        })
    }

    /// Current operating mode.
    pub fn mode(&self) -> Mode {
        Mode::from_u8(self.mode.load(Ordering::Acquire))
    }

    pub(crate) fn set_mode(&self, mode: Mode) {
        self.mode.store(mode as u8, Ordering::Release);
    }

    /// Returns `true` if the booster is enabled.
    pub fn booster(&self) -> bool {
        self.booster.load(Ordering::Acquire)
    }

    pub(crate) fn set_booster(&self, on: bool) {
        self.booster.store(on, Ordering::Release);
    }

    /// Milliseconds since start, as counted by the tick handler.
    pub fn millis(&self) -> u32 {
        self.millis.load(Ordering::Acquire)
    }

    /// Advances the clock. Only the tick handler calls this.
    pub(crate) fn advance_millis(&self, ms: u32) {
        let now = self.millis.load(Ordering::Relaxed);
        self.millis.store(now.wrapping_add(ms), Ordering::Release);
    }

    pub(crate) fn decode_channel1(&self, raw: &[u8]) -> bool {
        let now = self.millis();
        critical_section::with(|cs| self.railcom.borrow_ref_mut(cs).decode_channel1(raw, now))
    }

    /// Decodes a channel-2 datagram and books the result for `loco`.
    pub(crate) fn decode_channel2(&self, raw: &[u8], loco: Option<u8>) -> Response {
        let now = self.millis();
        critical_section::with(|cs| {
            let response = self.railcom.borrow_ref_mut(cs).decode_channel2(raw, now);
            if let Some(index) = loco {
                self.stats.borrow_ref_mut(cs).record(index, response, now);
            }
            response
        })
    }

    /// Address broadcast on channel 1, while less than 1000 ms old.
    pub fn channel1_address(&self) -> Option<u16> {
        let now = self.millis();
        critical_section::with(|cs| {
            self.railcom
                .borrow_ref(cs)
                .channel1
                .address(now, RAILCOM_ADDRESS_STALE_MS)
        })
    }

    /// Address reported on channel 2, while less than 1000 ms old.
    pub fn channel2_address(&self) -> Option<u16> {
        let now = self.millis();
        critical_section::with(|cs| {
            self.railcom
                .borrow_ref(cs)
                .channel2
                .address(now, RAILCOM_ADDRESS_STALE_MS)
        })
    }

    /// Last dynamic variable received.
    pub fn dynamic(&self) -> Option<DynValue> {
        critical_section::with(|cs| self.railcom.borrow_ref(cs).dynamic)
    }

    /// Returns and clears the POM value.
    pub fn take_cv(&self) -> Option<u8> {
        critical_section::with(|cs| self.railcom.borrow_ref_mut(cs).cv.take())
    }

    pub(crate) fn clear_cv(&self) {
        critical_section::with(|cs| {
            let mut railcom = self.railcom.borrow_ref_mut(cs);
            railcom.cv = None;
            railcom.ack = false;
        });
    }

    /// Returns and clears the "ACK seen" flag.
    pub fn take_ack(&self) -> bool {
        critical_section::with(|cs| core::mem::take(&mut self.railcom.borrow_ref_mut(cs).ack))
    }

    /// Arms the XPOM slots in `sequences` and blocks all others.
    pub(crate) fn arm_xpom(&self, sequences: Range<usize>) {
        critical_section::with(|cs| {
            let mut railcom = self.railcom.borrow_ref_mut(cs);
            for (i, slot) in railcom.xpom.iter_mut().enumerate() {
                *slot = if sequences.contains(&i) {
                    XpomSlot::Armed
                } else {
                    XpomSlot::Blocked
                };
            }
        });
    }

    /// XPOM slot for `sequence`.
    pub fn xpom(&self, sequence: usize) -> Option<XpomSlot> {
        critical_section::with(|cs| self.railcom.borrow_ref(cs).xpom.get(sequence).copied())
    }

    pub(crate) fn block_xpom(&self) {
        critical_section::with(|cs| self.railcom.borrow_ref_mut(cs).block_xpom());
    }

    /// Statistics slot for `index`.
    pub fn rc2_slot(&self, index: u8) -> Option<Rc2Slot> {
        critical_section::with(|cs| self.stats.borrow_ref(cs).slot(index).copied())
    }

    pub(crate) fn reset_stats(&self, index: u8) {
        critical_section::with(|cs| self.stats.borrow_ref_mut(cs).reset(index));
    }

    pub(crate) fn clear_timestamps(&self) {
        critical_section::with(|cs| {
            self.stats.borrow_ref_mut(cs).clear_timestamps();
            self.railcom.borrow_ref_mut(cs).channel1.clear();
            self.railcom.borrow_ref_mut(cs).channel2.clear();
        });
    }
}
