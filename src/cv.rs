//! CV engine: programming track, POM and XPOM.
//!
//! All operations block the foreground for their whole window (tens to
//! hundreds of milliseconds). Time is read from the millisecond clock the tick
//! handler advances, so the engine needs no timer of its own.
//!
//! ## Programming track
//!
//! Every operation starts with 25 reset packets in [`Mode::Programming`] and
//! restores the previous mode afterwards. Each command is sent 5 times, then
//! the [`AckDetector`] is polled until it reports a pulse or the window closes
//! (100 ms after writes, 80 ms after verifies). A CV is read bit by bit with
//! eight bit verifies, and the result is confirmed with one byte verify.
//!
//! ## POM
//!
//! The decoder answers a POM packet with the CV value on RailCom channel 2.
//! The command is sent up to 4 times; if no value arrives, get-ack packets keep
//! the decoder talking for up to 500 ms. Once a value was seen, two identical
//! answers in a row or 5 probes without one end the exchange.
//!
//! ## XPOM
//!
//! One read per sequence, each followed by an idle packet, then the slots are
//! polled for 30 ms.

use embedded_hal::delay::DelayNs;
use heapless::Vec;

use crate::ack::AckDetector;
use crate::consts::{
    IDLE_FRAME, MAX_LONG_ADDRESS, MAX_SHORT_ADDRESS, NO_ADDRESS, RESET_FRAME, SUBMIT_SPIN_US,
    XPOM_SEQUENCES,
};
use crate::error::{Error, Result};
use crate::packet::{self, Packet};
use crate::railcom::XpomSlot;
use crate::shared::Mode;
use crate::station::Station;

const IDLE: Packet = Packet::raw(IDLE_FRAME);

/// CV 1: primary (short) address.
const CV_SHORT_ADDRESS: u16 = 1;
/// CV 17/18: extended address.
const CV_LONG_ADDRESS_HIGH: u16 = 17;
const CV_LONG_ADDRESS_LOW: u16 = 18;
/// CV 29: configuration; bit 5 selects the extended address.
const CV_CONFIG: u16 = 29;
const CONFIG_LONG_ADDRESS_BIT: u8 = 5;

/// Values read by one XPOM exchange: four bytes per sequence.
pub type XpomData = Vec<u8, 16>;

impl<D, A> Station<'_, D, A>
where
    D: DelayNs,
    A: AckDetector,
{
    fn elapsed_since(&self, start: u32) -> u32 {
        self.shared.millis().wrapping_sub(start)
    }

    /// Waits until every packet submitted so far has been sent, cutout
    /// included, so no answer to an earlier command is still on its way.
    fn drain(&mut self) {
        self.submit(&IDLE);
        while self.shared.is_pending() {
            self.delay.delay_us(SUBMIT_SPIN_US);
        }
    }

    fn programming<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        let previous = self.mode();
        self.set_mode(Mode::Programming);
        let reset = Packet::raw(RESET_FRAME);
        for _ in 0..self.config.pgm_reset_repeat {
            self.submit(&reset);
        }
        let result = op(self);
        self.set_mode(previous);
        result
    }

    /// Sends a service-mode command and waits for the acknowledgement.
    fn pgm_command(&mut self, payload: &[u8], window_ms: u32) -> Result<bool> {
        let packet = Packet::new(NO_ADDRESS, payload)?;
        self.ack.start();
        for _ in 0..self.config.pgm_command_repeat {
            self.submit(&packet);
        }
        let start = self.shared.millis();
        loop {
            if self.ack.poll() {
                return Ok(true);
            }
            if self.elapsed_since(start) >= window_ms {
                return Ok(false);
            }
            self.delay.delay_us(self.config.ack_sample_us);
        }
    }

    fn pgm_confirm(&mut self, payload: &[u8], window_ms: u32) -> Result<()> {
        if self.pgm_command(payload, window_ms)? {
            Ok(())
        } else {
            Err(Error::NoAcknowledge)
        }
    }

    /// Reads a CV on the programming track.
    ///
    /// # Errors
    /// [`Error::NoAcknowledge`] if the assembled value is not confirmed.
    pub fn pgm_read_cv(&mut self, cv: u16) -> Result<u8> {
        let window = self.config.pgm_read_window_ms;
        let result = self.programming(|s| {
            let mut value = 0u8;
            for bit in 0..8 {
                if s.pgm_command(&packet::pgm_verify_bit(cv, bit, true)?, window)? {
                    value |= 1 << bit;
                }
            }
            s.pgm_confirm(&packet::pgm_verify_byte(cv, value)?, window)?;
            Ok(value)
        });
        match result {
            Ok(value) => debug!("pgm cv {} = {}", cv, value),
            Err(_) => warn!("pgm cv {} read failed", cv),
        }
        result
    }

    /// Verifies that CV `cv` holds `value`.
    pub fn pgm_verify_cv(&mut self, cv: u16, value: u8) -> Result<()> {
        let window = self.config.pgm_read_window_ms;
        self.programming(|s| s.pgm_confirm(&packet::pgm_verify_byte(cv, value)?, window))
    }

    /// Verifies that bit `bit` of CV `cv` equals `value`.
    pub fn pgm_verify_cv_bit(&mut self, cv: u16, bit: u8, value: bool) -> Result<()> {
        let window = self.config.pgm_read_window_ms;
        self.programming(|s| s.pgm_confirm(&packet::pgm_verify_bit(cv, bit, value)?, window))
    }

    /// Writes a CV on the programming track.
    pub fn pgm_write_cv(&mut self, cv: u16, value: u8) -> Result<()> {
        let window = self.config.pgm_write_window_ms;
        self.programming(|s| s.pgm_confirm(&packet::pgm_write_byte(cv, value)?, window))
    }

    /// Writes one bit of a CV on the programming track.
    pub fn pgm_write_cv_bit(&mut self, cv: u16, bit: u8, value: bool) -> Result<()> {
        let window = self.config.pgm_write_window_ms;
        self.programming(|s| s.pgm_confirm(&packet::pgm_write_bit(cv, bit, value)?, window))
    }

    /// Programs the decoder address on the programming track.
    ///
    /// Addresses up to 127 go to CV 1, larger ones to CV 17/18. CV 29 bit 5 is
    /// set to match.
    pub fn pgm_write_address(&mut self, address: u16) -> Result<()> {
        let window = self.config.pgm_write_window_ms;
        match address {
            0 => Err(Error::InvalidAddress),
            ..=MAX_SHORT_ADDRESS => self.programming(|s| {
                s.pgm_confirm(
                    &packet::pgm_write_byte(CV_SHORT_ADDRESS, address as u8)?,
                    window,
                )?;
                s.pgm_confirm(
                    &packet::pgm_write_bit(CV_CONFIG, CONFIG_LONG_ADDRESS_BIT, false)?,
                    window,
                )
            }),
            ..=MAX_LONG_ADDRESS => self.programming(|s| {
                s.pgm_confirm(
                    &packet::pgm_write_byte(CV_LONG_ADDRESS_HIGH, 0xC0 | (address >> 8) as u8)?,
                    window,
                )?;
                s.pgm_confirm(
                    &packet::pgm_write_byte(CV_LONG_ADDRESS_LOW, address as u8)?,
                    window,
                )?;
                s.pgm_confirm(
                    &packet::pgm_write_bit(CV_CONFIG, CONFIG_LONG_ADDRESS_BIT, true)?,
                    window,
                )
            }),
            _ => Err(Error::InvalidAddress),
        }
    }

    /// Sends a POM packet and collects the value the decoder answers with.
    fn pom_exchange(&mut self, loco: Option<u8>, address: u16, payload: &[u8]) -> Result<u8> {
        self.drain();
        self.shared.clear_cv();
        let start = self.shared.millis();
        for _ in 0..self.config.pom_read_attempts {
            self.submit_packet(loco, address, payload)?;
            if let Some(value) = self.shared.take_cv() {
                return Ok(value);
            }
        }

        let mut last = None;
        let mut misses = 0;
        while self.elapsed_since(start) < self.config.pom_read_window_ms {
            self.get_ack(loco, address)?;
            match (self.shared.take_cv(), last) {
                (Some(value), Some(previous)) if value == previous => return Ok(value),
                (Some(value), _) => {
                    last = Some(value);
                    misses = 0;
                }
                (None, Some(_)) => {
                    misses += 1;
                    if misses >= self.config.pom_max_misses {
                        break;
                    }
                }
                (None, None) => {}
            }
        }
        last.ok_or(Error::NoResponse)
    }

    /// Reads a CV on the main track via RailCom.
    ///
    /// # Errors
    /// [`Error::NoResponse`] if the decoder does not answer within 500 ms.
    pub fn pom_read_cv(&mut self, loco: Option<u8>, address: u16, cv: u16) -> Result<u8> {
        let result = self.pom_exchange(loco, address, &packet::pom_read(cv)?);
        if result.is_err() {
            warn!("pom read {} cv {}: no answer", address, cv);
        }
        result
    }

    /// Writes a CV on the main track and checks the value echoed back.
    ///
    /// # Errors
    /// [`Error::NoResponse`] without an answer, [`Error::NoAcknowledge`] if the
    /// decoder reports a different value.
    pub fn pom_write_cv(&mut self, loco: Option<u8>, address: u16, cv: u16, value: u8) -> Result<()> {
        let echoed = self.pom_exchange(loco, address, &packet::pom_write(cv, value)?)?;
        if echoed != value {
            warn!("pom write {} cv {}: decoder reports {}", address, cv, echoed);
            return Err(Error::NoAcknowledge);
        }
        Ok(())
    }

    /// Writes one bit of a CV on the main track.
    pub fn pom_write_cv_bit(
        &mut self,
        loco: Option<u8>,
        address: u16,
        cv: u16,
        bit: u8,
        value: bool,
    ) -> Result<()> {
        let echoed = self.pom_exchange(loco, address, &packet::pom_write_bit(cv, bit, value)?)?;
        if (echoed >> (bit & 0x07)) & 1 != value as u8 {
            return Err(Error::NoAcknowledge);
        }
        Ok(())
    }

    /// Changes the address of the decoder answering to `old`.
    ///
    /// A long address is written to CV 17/18 before CV 29 bit 5 is set. When a
    /// long address is replaced by a short one, CV 1 is written first and CV 29
    /// bit 5 cleared afterwards, both still through the old address.
    pub fn pom_write_address(&mut self, loco: Option<u8>, old: u16, new: u16) -> Result<()> {
        match new {
            0 => Err(Error::InvalidAddress),
            ..=MAX_SHORT_ADDRESS => {
                self.pom_write_cv(loco, old, CV_SHORT_ADDRESS, new as u8)?;
                if old > MAX_SHORT_ADDRESS {
                    self.pom_write_cv_bit(loco, old, CV_CONFIG, CONFIG_LONG_ADDRESS_BIT, false)?;
                }
                Ok(())
            }
            ..=MAX_LONG_ADDRESS => {
                self.pom_write_cv(loco, old, CV_LONG_ADDRESS_HIGH, 0xC0 | (new >> 8) as u8)?;
                self.pom_write_cv(loco, old, CV_LONG_ADDRESS_LOW, new as u8)?;
                if old <= MAX_SHORT_ADDRESS {
                    self.pom_write_cv_bit(loco, old, CV_CONFIG, CONFIG_LONG_ADDRESS_BIT, true)?;
                }
                Ok(())
            }
            _ => Err(Error::InvalidAddress),
        }
    }

    fn xpom_poll(&mut self, sequences: core::ops::Range<usize>) -> bool {
        let start = self.shared.millis();
        loop {
            let done = sequences
                .clone()
                .all(|s| matches!(self.shared.xpom(s), Some(XpomSlot::Valid(_))));
            if done {
                return true;
            }
            if self.elapsed_since(start) >= self.config.xpom_window_ms {
                return false;
            }
            self.delay.delay_us(self.config.ack_sample_us);
        }
    }

    /// Reads `count` groups of four CVs starting at `cv` via XPOM.
    ///
    /// Sequence `n` reads CVs `cv + 4n ..= cv + 4n + 3`.
    ///
    /// # Errors
    /// [`Error::InvalidSequence`] unless `1 <= count <= 4`, [`Error::NoResponse`]
    /// if any sequence stays unanswered.
    pub fn xpom_read_cv(
        &mut self,
        loco: Option<u8>,
        address: u16,
        cv: u32,
        count: usize,
    ) -> Result<XpomData> {
        if count == 0 || count > XPOM_SEQUENCES {
            return Err(Error::InvalidSequence);
        }
        let mut requests: Vec<packet::Payload, XPOM_SEQUENCES> = Vec::new();
        for seq in 0..count {
            let _ = requests.push(packet::xpom_read(seq as u8, cv + 4 * seq as u32)?);
        }

        self.drain();
        self.shared.arm_xpom(0..count);
        for request in &requests {
            self.submit_packet(loco, address, request)?;
            // idle rather than get-ack between the requests
            self.submit(&IDLE);
        }
        let answered = self.xpom_poll(0..count);

        let mut data = XpomData::new();
        for seq in 0..count {
            if let Some(XpomSlot::Valid(values)) = self.shared.xpom(seq) {
                let _ = data.extend_from_slice(&values);
            }
        }
        self.shared.block_xpom();
        if !answered {
            warn!(
                "xpom read {} cv {}: {} of {} sequences",
                address,
                cv,
                data.len() / 4,
                count
            );
            return Err(Error::NoResponse);
        }
        Ok(data)
    }

    /// Writes one to four consecutive CVs starting at `cv` via XPOM, using
    /// sequence `sequence`.
    ///
    /// The decoder echoes the four CVs from `cv` on; the written bytes must
    /// match.
    pub fn xpom_write_cv(
        &mut self,
        loco: Option<u8>,
        address: u16,
        sequence: u8,
        cv: u32,
        data: &[u8],
    ) -> Result<()> {
        let payload = packet::xpom_write(sequence, cv, data)?;
        let seq = sequence as usize;
        self.drain();
        self.shared.arm_xpom(seq..seq + 1);
        let sent = self.submit_packet(loco, address, &payload);
        if sent.is_ok() {
            self.submit(&IDLE);
        }
        let answered = sent.is_ok() && self.xpom_poll(seq..seq + 1);
        let echoed = self.shared.xpom(seq);
        self.shared.block_xpom();
        sent?;
        match echoed {
            Some(XpomSlot::Valid(values)) if answered => {
                if values.starts_with(data) {
                    Ok(())
                } else {
                    Err(Error::NoAcknowledge)
                }
            }
            _ => Err(Error::NoResponse),
        }
    }
}
