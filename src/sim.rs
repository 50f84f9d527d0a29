//! Track simulator for unit tests.
//!
//! [`SimDelay`] owns a [`Transmitter`] and ticks it for every tick period the
//! foreground waits, so a [`Station`] built by [`station()`] drives a real
//! track signal. A [`DecoderModel`] watches every completed frame, pulses the
//! acknowledgement line on the programming track and scripts RailCom answers
//! into the cutout that follows the frame.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, VecDeque};
use std::convert::Infallible;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, InputPin, OutputPin};

use crate::ack::PinAck;
use crate::config::Config;
use crate::consts::{IDLE_FRAME, MAX_SHORT_ADDRESS, RESET_FRAME};
use crate::hal::RailcomReceiver;
use crate::railcom::{ID_ADR_HIGH, ID_ADR_LOW, ID_POM, encode_datagram, encode_xpom};
use crate::shared::{Mode, Shared};
use crate::station::Station;
use crate::transmitter::{Transmitter, TxState};

/// Raw ACK codeword on channel 2.
const ACK_SYMBOL: u8 = 0xF0;
/// Length of the programming-track current pulse.
const ACK_PULSE_MS: u32 = 6;

/// Output pin that remembers its level.
#[derive(Clone, Default, Debug)]
pub struct Level(Rc<Cell<bool>>);

impl Level {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> bool {
        self.0.get()
    }
}

impl ErrorType for Level {
    type Error = Infallible;
}

impl OutputPin for Level {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.0.set(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.0.set(true);
        Ok(())
    }
}

/// Calls the transmitter made on a [`ScriptedReceiver`].
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum RxEvent {
    Enable,
    Disable,
    Flush,
    /// Read with a buffer of this size
    Read(usize),
}

#[derive(Default, Debug)]
struct RxScript {
    channel1: VecDeque<Vec<u8>>,
    channel2: VecDeque<Vec<u8>>,
    reads: usize,
    events: Vec<RxEvent>,
}

/// RailCom receiver replaying queued datagrams.
///
/// The first read after `enable` takes the next channel-1 entry, every later
/// one the next channel-2 entry. An empty queue reads as silence.
#[derive(Clone, Default, Debug)]
pub struct ScriptedReceiver(Rc<RefCell<RxScript>>);

impl ScriptedReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_channel1(&self, data: &[u8]) {
        self.0.borrow_mut().channel1.push_back(data.to_vec());
    }

    pub fn push_channel2(&self, data: &[u8]) {
        self.0.borrow_mut().channel2.push_back(data.to_vec());
    }

    pub fn events(&self) -> Vec<RxEvent> {
        self.0.borrow().events.clone()
    }
}

impl RailcomReceiver for ScriptedReceiver {
    fn enable(&mut self) {
        let mut script = self.0.borrow_mut();
        script.reads = 0;
        script.events.push(RxEvent::Enable);
    }

    fn disable(&mut self) {
        self.0.borrow_mut().events.push(RxEvent::Disable);
    }

    fn flush(&mut self) {
        self.0.borrow_mut().events.push(RxEvent::Flush);
    }

    fn read(&mut self, buf: &mut [u8]) -> usize {
        let mut guard = self.0.borrow_mut();
        let script = &mut *guard;
        script.events.push(RxEvent::Read(buf.len()));
        let queue = if script.reads == 0 {
            &mut script.channel1
        } else {
            &mut script.channel2
        };
        script.reads += 1;
        match queue.pop_front() {
            Some(data) => {
                let n = data.len().min(buf.len());
                buf[..n].copy_from_slice(&data[..n]);
                n
            }
            None => 0,
        }
    }
}

/// Turns sampled track levels into bits.
///
/// Returns the bits and the run lengths (in ticks) they were built from. The
/// last run may be cut off by the end of the sample and is dropped.
pub fn decode_levels(levels: &[bool]) -> (Vec<bool>, Vec<usize>) {
    let mut runs = Vec::new();
    let mut current = match levels.first() {
        Some(&level) => level,
        None => return (Vec::new(), runs),
    };
    let mut len = 0;
    for &level in levels {
        if level == current {
            len += 1;
        } else {
            runs.push(len);
            current = level;
            len = 1;
        }
    }
    let bits = runs.chunks_exact(2).map(|halves| halves[0] <= 2).collect();
    (bits, runs)
}

/// Splits a bit stream into packets (checksum byte included).
///
/// A packet starts after at least `min_preamble` ones and a zero start bit.
/// The one that ends a packet counts toward the next preamble.
pub fn parse_packets(bits: &[bool], min_preamble: usize) -> Vec<Vec<u8>> {
    let mut packets = Vec::new();
    let mut ones = 0;
    let mut i = 0;
    while i < bits.len() {
        if bits[i] {
            ones += 1;
            i += 1;
            continue;
        }
        i += 1;
        if ones < min_preamble {
            ones = 0;
            continue;
        }
        let mut packet = Vec::new();
        let complete = loop {
            if i + 9 > bits.len() {
                break false;
            }
            let byte = bits[i..i + 8]
                .iter()
                .fold(0u8, |acc, &bit| (acc << 1) | bit as u8);
            packet.push(byte);
            let end = bits[i + 8];
            i += 9;
            if end {
                break true;
            }
        };
        if !complete {
            break;
        }
        packets.push(packet);
        ones = 1;
    }
    packets
}

/// A single mobile decoder with a CV store.
#[derive(Debug)]
pub struct DecoderModel {
    address: u16,
    /// Acknowledges service-mode packets
    pub programming: bool,
    /// Answers in the RailCom cutout
    pub railcom: bool,
    /// Addressed frames answered with a bare ACK before a POM value is ready
    pub reply_delay: u32,
    /// Ignores writes
    pub read_only: bool,
    cvs: BTreeMap<u32, u8>,
    frames: Vec<Vec<u8>>,
    ack_until: u32,
    pending: Option<(Vec<u8>, u8)>,
    countdown: u32,
    send_high: bool,
}

impl DecoderModel {
    pub fn new(address: u16) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            address,
            programming: true,
            railcom: true,
            reply_delay: 0,
            read_only: false,
            cvs: BTreeMap::new(),
            frames: Vec::new(),
            ack_until: 0,
            pending: None,
            countdown: 0,
            send_high: true,
        }))
    }

    pub fn set_cv(&mut self, cv: u32, value: u8) {
        let _ = self.cvs.insert(cv, value);
    }

    pub fn cv(&self, cv: u32) -> u8 {
        self.cvs.get(&cv).copied().unwrap_or(0)
    }

    /// Every frame seen so far, checksum included.
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.frames.clone()
    }

    /// Frames other than idle and reset fillers.
    pub fn frames_without_fillers(&self) -> Vec<Vec<u8>> {
        self.frames
            .iter()
            .filter(|f| **f != IDLE_FRAME && **f != RESET_FRAME)
            .cloned()
            .collect()
    }

    fn write(&mut self, cv: u32, value: u8) {
        if !self.read_only {
            self.set_cv(cv, value);
        }
    }

    /// Handles a completed frame; returns the channel-1 and channel-2 bytes
    /// for the cutout after it.
    pub fn on_frame(&mut self, bytes: &[u8], now: u32, mode: Mode) -> (Vec<u8>, Vec<u8>) {
        self.frames.push(bytes.to_vec());
        let body = &bytes[..bytes.len().saturating_sub(1)];
        if mode == Mode::Programming {
            self.service_mode(body, now);
            return (Vec::new(), Vec::new());
        }
        if mode != Mode::RailCom || !self.railcom {
            return (Vec::new(), Vec::new());
        }
        let channel1 = self.channel1();
        let channel2 = match split_address(body) {
            Some((address, instruction)) if address == self.address => self.answer(instruction),
            _ => Vec::new(),
        };
        (channel1, channel2)
    }

    fn channel1(&mut self) -> Vec<u8> {
        let high = if self.address > MAX_SHORT_ADDRESS {
            0x80 | (self.address >> 8) as u8
        } else {
            0
        };
        self.send_high = !self.send_high;
        if !self.send_high {
            encode_datagram(ID_ADR_HIGH, high).to_vec()
        } else {
            encode_datagram(ID_ADR_LOW, self.address as u8).to_vec()
        }
    }

    fn service_mode(&mut self, body: &[u8], now: u32) {
        if !self.programming {
            return;
        }
        let &[op, low, data] = body else {
            return;
        };
        if op & 0xF0 != 0x70 {
            return;
        }
        let cv = ((((op & 0x03) as u32) << 8) | low as u32) + 1;
        let acked = match (op >> 2) & 0x03 {
            0x01 => self.cv(cv) == data,
            0x03 => {
                self.write(cv, data);
                true
            }
            0x02 => {
                let bit = data & 0x07;
                let value = data & 0x08 != 0;
                if data & 0x10 != 0 {
                    let new = set_bit(self.cv(cv), bit, value);
                    self.write(cv, new);
                    true
                } else {
                    (self.cv(cv) >> bit) & 1 == value as u8
                }
            }
            _ => false,
        };
        if acked {
            self.ack_until = now + ACK_PULSE_MS;
        }
    }

    fn answer(&mut self, instruction: &[u8]) -> Vec<u8> {
        match *instruction {
            [op, low, data] if op & 0xF0 == 0xE0 && op & 0x0C != 0 => {
                let cv = ((((op & 0x03) as u32) << 8) | low as u32) + 1;
                match op & 0x0C {
                    0x0C => self.write(cv, data),
                    0x08 if data & 0x10 != 0 => {
                        let new = set_bit(self.cv(cv), data & 0x07, data & 0x08 != 0);
                        self.write(cv, new);
                    }
                    _ => {}
                }
                let value = self.cv(cv);
                self.start_pending(instruction, value);
                self.pending_answer()
            }
            [0x0F] => self.pending_answer(),
            [op, c2, c1, c0, ref data @ ..] if op & 0xF0 == 0xE0 && op & 0x0C != 0 => {
                let cv = ((c2 as u32) << 16 | (c1 as u32) << 8 | c0 as u32) + 1;
                if op & 0x0C == 0x0C {
                    for (offset, &value) in data.iter().enumerate() {
                        self.write(cv + offset as u32, value);
                    }
                }
                let values = [self.cv(cv), self.cv(cv + 1), self.cv(cv + 2), self.cv(cv + 3)];
                encode_xpom(op & 0x03, values).to_vec()
            }
            _ => vec![ACK_SYMBOL],
        }
    }

    fn start_pending(&mut self, key: &[u8], value: u8) {
        let same = self
            .pending
            .as_ref()
            .is_some_and(|(previous, _)| previous.as_slice() == key);
        if !same {
            self.countdown = self.reply_delay;
        }
        self.pending = Some((key.to_vec(), value));
    }

    fn pending_answer(&mut self) -> Vec<u8> {
        match self.pending {
            Some((_, value)) if self.countdown == 0 => encode_datagram(ID_POM, value).to_vec(),
            Some(_) => {
                self.countdown -= 1;
                vec![ACK_SYMBOL]
            }
            None => vec![ACK_SYMBOL],
        }
    }
}

fn set_bit(value: u8, bit: u8, on: bool) -> u8 {
    if on {
        value | (1 << bit)
    } else {
        value & !(1 << bit)
    }
}

/// Splits a frame body into the loco address and the instruction bytes.
fn split_address(body: &[u8]) -> Option<(u16, &[u8])> {
    match *body.first()? {
        a @ 0..=0x7F => Some((a as u16, &body[1..])),
        a @ 0xC0..=0xE7 if body.len() > 1 => {
            Some(((((a & 0x3F) as u16) << 8) | body[1] as u16, &body[2..]))
        }
        _ => None,
    }
}

/// Acknowledgement input driven by the decoder model.
#[derive(Debug)]
pub struct AckLine<'a> {
    shared: &'a Shared,
    model: Rc<RefCell<DecoderModel>>,
}

impl ErrorType for AckLine<'_> {
    type Error = Infallible;
}

impl InputPin for AckLine<'_> {
    fn is_high(&mut self) -> Result<bool, Infallible> {
        Ok(self.shared.millis() < self.model.borrow().ack_until)
    }

    fn is_low(&mut self) -> Result<bool, Infallible> {
        self.is_high().map(|high| !high)
    }
}

/// Delay that runs the track while the foreground waits.
#[derive(Debug)]
pub struct SimDelay<'a> {
    shared: &'a Shared,
    tx: Transmitter<'a, Level, Level, Level, ScriptedReceiver>,
    receiver: ScriptedReceiver,
    model: Rc<RefCell<DecoderModel>>,
    tick_ns: u64,
    ns: u64,
    frames_seen: u32,
}

impl SimDelay<'_> {
    fn tick(&mut self) {
        self.tx.tick();
        if self.tx.frames_sent == self.frames_seen {
            return;
        }
        self.frames_seen = self.tx.frames_sent;
        let (channel1, channel2) = self.model.borrow_mut().on_frame(
            self.tx.frame().as_bytes(),
            self.shared.millis(),
            self.shared.mode(),
        );
        // only a driven cutout reads the receiver
        if self.tx.state() == TxState::Cutout && self.tx.is_powered() {
            self.receiver.push_channel1(&channel1);
            self.receiver.push_channel2(&channel2);
        }
    }
}

impl DelayNs for SimDelay<'_> {
    fn delay_ns(&mut self, ns: u32) {
        self.ns += ns as u64;
        while self.ns >= self.tick_ns {
            self.ns -= self.tick_ns;
            self.tick();
        }
    }
}

/// A station whose waits drive a simulated track with `model` on it.
pub fn station<'a>(
    shared: &'a Shared,
    model: &Rc<RefCell<DecoderModel>>,
) -> Station<'a, SimDelay<'a>, PinAck<AckLine<'a>>> {
    let config = Config::new();
    let receiver = ScriptedReceiver::new();
    let tx = Transmitter::new(
        shared,
        Level::new(),
        Level::new(),
        Level::new(),
        receiver.clone(),
        config,
    );
    let delay = SimDelay {
        shared,
        tx,
        receiver,
        model: Rc::clone(model),
        tick_ns: config.tick_period_ns as u64,
        ns: 0,
        frames_seen: 0,
    };
    let ack = PinAck::from_config(
        AckLine {
            shared,
            model: Rc::clone(model),
        },
        &config,
    );
    Station::new(shared, delay, ack, config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_packets_needs_full_preamble() {
        let mut bits = vec![true; 12];
        bits.push(false);
        bits.extend([false, false, false, false, false, false, true, true]);
        bits.push(true);
        assert_eq!(parse_packets(&bits, 12), [vec![0x03]]);
        assert!(parse_packets(&bits, 13).is_empty());
    }

    #[test]
    fn test_model_answers_pom_read() {
        let model = DecoderModel::new(3);
        model.borrow_mut().set_cv(1, 3);
        let (_, reply) = model
            .borrow_mut()
            .on_frame(&[0x03, 0xE4, 0x00, 0x00, 0xE7], 0, Mode::RailCom);
        assert_eq!(reply, encode_datagram(ID_POM, 3));
        let (_, other) = model
            .borrow_mut()
            .on_frame(&[0x04, 0xE4, 0x00, 0x00, 0xE0], 0, Mode::RailCom);
        assert!(other.is_empty());
    }
}
