//! Tick-driven DCC transmitter with RailCom cutout.
//!
//! This module provides the [`Transmitter`], the interrupt half of the crate.
//! It turns packets into the bipolar DCC track signal and runs the RailCom
//! cutout after every packet, feeding the received bytes to the channel
//! decoders in [`Shared`].
//!
//! The transmitter does not know the time of day. [`tick()`](Transmitter::tick)
//! must be called at a fixed period (29 µs by default) from a timer interrupt
//! or a delay loop, see [`crate::timer`].
//!
//! ## Bit timing
//!
//! Every second tick is a *step*. A step toggles the track polarity, so a
//! half-bit normally lasts two ticks (58 µs): a DCC one. For a zero the
//! `long_pulse` flag swallows one extra step, giving a 116 µs half-bit.
//!
//! ```text
//!  one:   __|‾‾‾‾‾|_____|          2 + 2 ticks
//!  zero:  __|‾‾‾‾‾‾‾‾‾‾‾|___________|  4 + 4 ticks
//! ```
//!
//! ## Frame
//!
//! preamble (12, 16 or 20 ones), a zero start bit, then every byte MSB first
//! with a zero between bytes. After the last byte the transmitter either runs
//! the cutout (RailCom mode) or goes straight back to [`TxState::Ready`]; the
//! next preamble doubles as the packet end bit.
//!
//! ## Cutout
//!
//! The cutout advances one step per tick:
//!
//! | step | action                                   |
//! |------|------------------------------------------|
//! | 1    | force positive polarity                  |
//! | 2    | cutout on (track drive off)              |
//! | 4    | enable receiver                          |
//! | 5    | flush receiver                           |
//! | 9    | read and decode channel 1                |
//! | 17   | read and decode channel 2, disable       |
//! | 18   | cutout off, flush, back to ready         |
//!
//! Nothing is switched while the booster is off; the steps still elapse so the
//! frame rate does not change. Switching the booster off inside a cutout drops
//! the cutout line and disables the receiver at once.

use embedded_hal::digital::OutputPin;

use crate::config::Config;
use crate::consts::{
    CHANNEL1_LEN, CHANNEL2_LEN, CUTOUT_STEP_CHANNEL1, CUTOUT_STEP_CHANNEL2, CUTOUT_STEP_END,
    CUTOUT_STEP_POLARITY, CUTOUT_STEP_RX_ENABLE, CUTOUT_STEP_RX_FLUSH, CUTOUT_STEP_START,
    IDLE_FRAME, RESET_FRAME,
};
use crate::hal::RailcomReceiver;
use crate::packet::Packet;
use crate::shared::{Mode, Shared};
use crate::stats::Response;

const NS_PER_MS: u32 = 1_000_000;

const IDLE: Packet = Packet::raw(IDLE_FRAME);
const RESET: Packet = Packet::raw(RESET_FRAME);

/// Phase of the transmit state machine.
#[derive(PartialEq, Eq, Clone, Copy, Default, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum TxState {
    /// Between frames; the next step loads a packet or a filler frame.
    #[default]
    Ready,
    /// Sending preamble ones and the start bit.
    Preamble,
    /// Sending data bytes and their separators.
    Data,
    /// RailCom cutout after the frame.
    Cutout,
}

/// The interrupt side of a track output.
///
/// ## Type Parameters
///
/// - `SIG`: H-bridge direction, high is positive track polarity
/// - `CUT`: cutout line, high shorts both rails for the RailCom detector
/// - `PWR`: booster enable
/// - `RC`: RailCom receiver
#[derive(Debug)]
pub struct Transmitter<'a, SIG, CUT, PWR, RC> {
    shared: &'a Shared,
    signal: SIG,
    cutout: CUT,
    power: PWR,
    receiver: RC,
    config: Config,
    state: TxState,
    frame: Packet,
    level: bool,
    powered: bool,
    half_tick: bool,
    long_pulse: bool,
    second_half: bool,
    bit: bool,
    bit_count: u8,
    byte_index: usize,
    preamble_len: u8,
    cutout_step: u8,
    ns_acc: u32,
    /// Frames completed since start, fillers included
    pub frames_sent: u32,
    /// Cutouts completed since start
    pub cutouts: u32,
    /// Channel-2 datagrams that could not be decoded
    pub rc_rejected: u32,
}

impl<'a, SIG, CUT, PWR, RC> Transmitter<'a, SIG, CUT, PWR, RC>
where
    SIG: OutputPin,
    CUT: OutputPin,
    PWR: OutputPin,
    RC: RailcomReceiver,
{
    /// Creates a transmitter for the output described by `shared`.
    ///
    /// # Notes
    /// All three lines are driven low: negative polarity, no cutout, booster
    /// off. The booster follows [`Shared::booster`] from the next tick on.
    pub fn new(
        shared: &'a Shared,
        signal: SIG,
        cutout: CUT,
        power: PWR,
        receiver: RC,
        config: Config,
    ) -> Self {
        let mut tx = Self {
            shared,
            signal,
            cutout,
            power,
            receiver,
            config,
            state: TxState::Ready,
            frame: IDLE,
            level: false,
            powered: false,
            half_tick: false,
            long_pulse: false,
            second_half: false,
            bit: true,
            bit_count: 0,
            byte_index: 0,
            preamble_len: config.preamble_bits,
            cutout_step: 0,
            ns_acc: 0,
            frames_sent: 0,
            cutouts: 0,
            rc_rejected: 0,
        };
        let _ = tx.signal.set_low();
        let _ = tx.cutout.set_low();
        let _ = tx.power.set_low();
        tx
    }

    /// Current phase.
    pub fn state(&self) -> TxState {
        self.state
    }

    /// The frame being sent, or the last one sent while [`TxState::Ready`].
    pub fn frame(&self) -> &Packet {
        &self.frame
    }

    /// Returns `true` while the booster output is driven.
    pub fn is_powered(&self) -> bool {
        self.powered
    }

    /// Advances the transmitter by one tick period.
    ///
    /// # Timing
    /// Must be called at exactly [`Config::tick_period_ns`] intervals. Keep the
    /// handler at the highest interrupt priority; it never blocks.
    pub fn tick(&mut self) {
        self.advance_clock();
        if self.powered && !self.shared.booster() {
            self.write_power(false);
        }

        if self.state == TxState::Cutout {
            self.cutout_tick();
            return;
        }

        self.half_tick = !self.half_tick;
        if !self.half_tick {
            return;
        }
        if self.long_pulse {
            self.long_pulse = false;
            return;
        }
        self.step();
    }

    fn advance_clock(&mut self) {
        self.ns_acc += self.config.tick_period_ns;
        while self.ns_acc >= NS_PER_MS {
            self.ns_acc -= NS_PER_MS;
            self.shared.advance_millis(1);
        }
    }

    /// One half-bit.
    fn step(&mut self) {
        if self.second_half {
            self.second_half = false;
            self.toggle_signal();
            self.long_pulse = !self.bit;
            self.bit_done();
            return;
        }
        if self.state == TxState::Ready {
            self.load_frame();
        }
        self.bit = self.next_bit();
        self.second_half = true;
        self.toggle_signal();
        self.long_pulse = !self.bit;
    }

    fn load_frame(&mut self) {
        if !self.powered && self.shared.booster() {
            self.write_power(true);
        }
        let mode = self.shared.mode();
        self.frame = match self.shared.take_packet() {
            Some(packet) => packet,
            None if mode == Mode::Programming => RESET,
            None => IDLE,
        };
        self.preamble_len = self.config.preamble_for(mode);
        self.bit_count = 0;
        self.byte_index = 0;
        self.state = TxState::Preamble;
    }

    fn next_bit(&self) -> bool {
        match self.state {
            TxState::Preamble => self.bit_count < self.preamble_len,
            TxState::Data if self.bit_count < 8 => {
                let byte = self.frame.as_bytes()[self.byte_index];
                byte & (0x80 >> self.bit_count) != 0
            }
            // separator between bytes
            _ => false,
        }
    }

    fn bit_done(&mut self) {
        self.bit_count += 1;
        match self.state {
            TxState::Preamble if self.bit_count > self.preamble_len => {
                self.state = TxState::Data;
                self.bit_count = 0;
                self.byte_index = 0;
            }
            TxState::Data if self.bit_count == 8 && self.byte_index + 1 >= self.frame.len() => {
                self.end_frame();
            }
            TxState::Data if self.bit_count > 8 => {
                self.bit_count = 0;
                self.byte_index += 1;
            }
            _ => {}
        }
    }

    fn end_frame(&mut self) {
        self.frames_sent = self.frames_sent.wrapping_add(1);
        self.bit_count = 0;
        if self.shared.mode() == Mode::RailCom {
            self.cutout_step = 0;
            self.state = TxState::Cutout;
        } else {
            self.state = TxState::Ready;
        }
    }

    fn cutout_tick(&mut self) {
        // the last half-bit of a zero still needs its second step
        if self.long_pulse {
            self.half_tick = !self.half_tick;
            if self.half_tick {
                self.long_pulse = false;
            }
            return;
        }

        let step = self.cutout_step;
        self.cutout_step += 1;
        if step == CUTOUT_STEP_END {
            let _ = self.cutout.set_low();
            if self.powered {
                self.receiver.flush();
            }
            self.cutouts = self.cutouts.wrapping_add(1);
            self.half_tick = false;
            self.state = TxState::Ready;
            return;
        }
        if !self.powered {
            return;
        }
        match step {
            CUTOUT_STEP_POLARITY => self.write_signal(true),
            CUTOUT_STEP_START => {
                let _ = self.cutout.set_high();
            }
            CUTOUT_STEP_RX_ENABLE => self.receiver.enable(),
            CUTOUT_STEP_RX_FLUSH => self.receiver.flush(),
            CUTOUT_STEP_CHANNEL1 => {
                let mut buf = [0u8; CHANNEL1_LEN];
                let len = self.receiver.read(&mut buf);
                if len > 0 {
                    let _ = self.shared.decode_channel1(&buf[..len]);
                }
            }
            CUTOUT_STEP_CHANNEL2 => {
                let mut buf = [0u8; CHANNEL2_LEN];
                let len = self.receiver.read(&mut buf);
                let response = self.shared.decode_channel2(&buf[..len], self.frame.loco());
                if response == Response::None && len > 0 {
                    self.rc_rejected = self.rc_rejected.wrapping_add(1);
                }
                self.receiver.disable();
            }
            _ => {}
        }
    }

    fn toggle_signal(&mut self) {
        self.write_signal(!self.level);
    }

    fn write_signal(&mut self, level: bool) {
        self.level = level;
        if level {
            let _ = self.signal.set_high();
        } else {
            let _ = self.signal.set_low();
        }
    }

    fn write_power(&mut self, on: bool) {
        self.powered = on;
        if on {
            let _ = self.power.set_high();
        } else {
            let _ = self.power.set_low();
            if self.state == TxState::Cutout {
                self.release_cutout();
            }
        }
    }

    /// Drops the cutout line and stops the receiver if it is listening.
    fn release_cutout(&mut self) {
        let _ = self.cutout.set_low();
        if (CUTOUT_STEP_RX_ENABLE + 1..=CUTOUT_STEP_CHANNEL2).contains(&self.cutout_step) {
            self.receiver.disable();
        }
    }
}
