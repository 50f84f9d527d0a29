//! DCC packet framing and instruction builders.
//!
//! A [`Packet`] is the byte sequence between the packet start bit and the
//! packet end bit: optional address bytes, instruction bytes and a trailing
//! XOR checksum. Packets are small, `Copy` and immutable once built.
//!
//! The free functions in this module build the instruction payloads for the
//! operations the [`Station`](crate::station::Station) offers. They return only
//! the instruction bytes; the address and checksum are added by
//! [`Packet::new`].

use crate::consts::{
    MAX_ACCESSORY_ADDRESS, MAX_CV, MAX_LONG_ADDRESS, MAX_PACKET_LEN, MAX_SHORT_ADDRESS,
    MAX_XPOM_CV, MIN_PACKET_LEN, NO_ADDRESS, XPOM_SEQUENCES,
};
use crate::error::{Error, Result};

/// A framed DCC packet, checksum included.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Packet {
    bytes: [u8; MAX_PACKET_LEN],
    len: u8,
    loco: Option<u8>,
}

impl Packet {
    /// Frames `payload` for `address`, appending the XOR checksum.
    ///
    /// # Arguments
    /// - `address`: `0..=127` short address (`0` is broadcast), `128..=10239`
    ///   long address, or [`NO_ADDRESS`] when `payload` is already complete.
    /// - `payload`: instruction bytes.
    ///
    /// # Errors
    /// [`Error::InvalidAddress`] for unencodable addresses and
    /// [`Error::InvalidLength`] if the frame would exceed
    /// [`MAX_PACKET_LEN`] or is shorter than [`MIN_PACKET_LEN`].
    pub fn new(address: u16, payload: &[u8]) -> Result<Self> {
        let mut packet = Self {
            bytes: [0; MAX_PACKET_LEN],
            len: 0,
            loco: None,
        };
        match address {
            NO_ADDRESS => {}
            a if a <= MAX_SHORT_ADDRESS => packet.push(a as u8)?,
            a if a <= MAX_LONG_ADDRESS => {
                packet.push(0xC0 | (a >> 8) as u8)?;
                packet.push(a as u8)?;
            }
            _ => return Err(Error::InvalidAddress),
        }
        for &b in payload {
            packet.push(b)?;
        }
        let checksum = packet.as_bytes().iter().fold(0u8, |acc, b| acc ^ b);
        packet.push(checksum)?;
        if (packet.len as usize) < MIN_PACKET_LEN {
            return Err(Error::InvalidLength);
        }
        Ok(packet)
    }

    /// Wraps an already framed byte sequence (checksum included), as used for
    /// the filler frames.
    pub(crate) const fn raw(frame: [u8; 3]) -> Self {
        Self {
            bytes: [frame[0], frame[1], frame[2], 0, 0, 0, 0, 0, 0],
            len: 3,
            loco: None,
        }
    }

    fn push(&mut self, byte: u8) -> Result<()> {
        let slot = self
            .bytes
            .get_mut(self.len as usize)
            .ok_or(Error::InvalidLength)?;
        *slot = byte;
        self.len += 1;
        Ok(())
    }

    /// Tags the packet with the loco index whose statistics slot its RailCom
    /// answers are booked to.
    pub fn with_loco(mut self, index: Option<u8>) -> Self {
        self.loco = index;
        self
    }

    /// Loco index this packet is booked to, if any.
    pub fn loco(&self) -> Option<u8> {
        self.loco
    }

    /// The framed bytes, checksum last.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// Number of framed bytes.
    pub fn len(&self) -> usize {
        self.len as usize
    }

    /// `true` for a packet without bytes (never produced by [`Packet::new`]).
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Checks the trailing XOR checksum.
    pub fn checksum_ok(&self) -> bool {
        match self.as_bytes().split_last() {
            Some((&checksum, rest)) => rest.iter().fold(0u8, |acc, b| acc ^ b) == checksum,
            None => false,
        }
    }
}

/// Locomotive direction of travel.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum Direction {
    /// Reverse (direction bit clear)
    Reverse = 0,
    /// Forward (direction bit set)
    Forward = 1,
}

/// Output of a basic accessory decoder pair.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum SwitchState {
    /// Diverging route (output 0)
    Branch = 0,
    /// Straight route (output 1)
    Straight = 1,
}

/// Function groups addressable with a single instruction.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub enum FunctionGroup {
    /// F0..F4, mask bit 0 is F0
    F0F4,
    /// F5..F8
    F5F8,
    /// F9..F12
    F9F12,
    /// F13..F20
    F13F20,
    /// F21..F28
    F21F28,
    /// F29..F36
    F29F36,
    /// F37..F44
    F37F44,
    /// F45..F52
    F45F52,
    /// F53..F60
    F53F60,
    /// F61..F68
    F61F68,
}

/// An instruction payload buffer: up to 8 instruction bytes.
pub type Payload = heapless::Vec<u8, 8>;

fn payload(bytes: &[u8]) -> Payload {
    // every builder below produces at most 8 bytes
    let mut p = Payload::new();
    for &b in bytes {
        let _ = p.push(b);
    }
    p
}

fn cv_index(cv: u16) -> Result<u16> {
    if cv == 0 || cv > MAX_CV {
        return Err(Error::InvalidCv);
    }
    Ok(cv - 1)
}

/// 28 speed step instruction: `01DC SSSS`.
pub fn speed_28(direction: Direction, speed: u8) -> Payload {
    let data = 0x40 | ((direction as u8) << 5) | ((speed & 0x01) << 4) | ((speed & 0x1F) >> 1);
    payload(&[data])
}

/// 126 speed step instruction: `0011 1111`, `DSSS SSSS`.
pub fn speed_126(direction: Direction, speed: u8) -> Payload {
    payload(&[0x3F, ((direction as u8) << 7) | (speed & 0x7F)])
}

/// Function group instruction. `mask` bit 0 is the lowest function of the group.
pub fn functions(group: FunctionGroup, mask: u8) -> Payload {
    match group {
        FunctionGroup::F0F4 => payload(&[0x80 | ((mask & 0x01) << 4) | ((mask >> 1) & 0x0F)]),
        FunctionGroup::F5F8 => payload(&[0xB0 | (mask & 0x0F)]),
        FunctionGroup::F9F12 => payload(&[0xA0 | (mask & 0x0F)]),
        FunctionGroup::F13F20 => payload(&[0xDE, mask]),
        FunctionGroup::F21F28 => payload(&[0xDF, mask]),
        FunctionGroup::F29F36 => payload(&[0xD8, mask]),
        FunctionGroup::F37F44 => payload(&[0xD9, mask]),
        FunctionGroup::F45F52 => payload(&[0xDA, mask]),
        FunctionGroup::F53F60 => payload(&[0xDB, mask]),
        FunctionGroup::F61F68 => payload(&[0xDC, mask]),
    }
}

/// Broadcast stop (`0100 0000`), sent to address 0.
pub fn stop() -> Payload {
    payload(&[0x40])
}

/// Broadcast emergency stop (`0100 0001`), sent to address 0.
pub fn emergency_stop() -> Payload {
    payload(&[0x41])
}

/// Decoder reset (`0000 0000`); to address 0 this is the reset packet.
pub fn decoder_reset() -> Payload {
    payload(&[0x00])
}

/// Decoder hard reset (`0000 0001`).
pub fn decoder_hard_reset() -> Payload {
    payload(&[0x01])
}

/// Decoder acknowledgement request (`0000 1111`).
pub fn get_ack() -> Payload {
    payload(&[0x0F])
}

/// Basic accessory instruction, complete including the address bytes.
///
/// The user address is offset by 3 so that address 1 is decoder 1, output
/// pair 0. Send with [`NO_ADDRESS`].
pub fn basic_accessory(address: u16, state: SwitchState, activate: bool) -> Result<Payload> {
    if address == 0 || address > MAX_ACCESSORY_ADDRESS {
        return Err(Error::InvalidAddress);
    }
    let swaddr = address + 3;
    let b1 = 0x80 | ((swaddr >> 2) & 0x3F) as u8;
    let b2 = 0x80
        | ((!swaddr >> 4) & 0x70) as u8
        | if activate { 0x08 } else { 0x00 }
        | ((swaddr & 0x03) << 1) as u8
        | state as u8;
    Ok(payload(&[b1, b2]))
}

/// Extended accessory instruction carrying an 8-bit aspect value. Send with
/// [`NO_ADDRESS`].
pub fn extended_accessory(address: u16, value: u8) -> Result<Payload> {
    if address == 0 || address > MAX_ACCESSORY_ADDRESS {
        return Err(Error::InvalidAddress);
    }
    let swaddr = address + 3;
    let b1 = 0x80 | ((swaddr >> 2) & 0x3F) as u8;
    let b2 = ((!swaddr >> 4) & 0x70) as u8 | ((swaddr & 0x03) << 1) as u8 | 0x01;
    Ok(payload(&[b1, b2, value]))
}

/// POM verify byte (read request): `1110 01VV VVVV VVVV 0000 0000`.
pub fn pom_read(cv: u16) -> Result<Payload> {
    let i = cv_index(cv)?;
    Ok(payload(&[0xE4 | (i >> 8) as u8, i as u8, 0x00]))
}

/// POM write byte: `1110 11VV VVVV VVVV DDDD DDDD`.
pub fn pom_write(cv: u16, value: u8) -> Result<Payload> {
    let i = cv_index(cv)?;
    Ok(payload(&[0xEC | (i >> 8) as u8, i as u8, value]))
}

/// POM write bit: `1110 10VV VVVV VVVV 1111 DBBB`.
pub fn pom_write_bit(cv: u16, bit: u8, value: bool) -> Result<Payload> {
    let i = cv_index(cv)?;
    Ok(payload(&[
        0xE8 | (i >> 8) as u8,
        i as u8,
        0xF0 | ((value as u8) << 3) | (bit & 0x07),
    ]))
}

fn xpom_header(kind: u8, sequence: u8, cv: u32) -> Result<[u8; 4]> {
    if sequence as usize >= XPOM_SEQUENCES {
        return Err(Error::InvalidSequence);
    }
    if cv == 0 || cv > MAX_XPOM_CV + 1 {
        return Err(Error::InvalidCv);
    }
    let i = cv - 1;
    Ok([kind | sequence, (i >> 16) as u8, (i >> 8) as u8, i as u8])
}

/// XPOM read of four consecutive CVs: `1110 01SS` + 24-bit CV index.
pub fn xpom_read(sequence: u8, cv: u32) -> Result<Payload> {
    Ok(payload(&xpom_header(0xE4, sequence, cv)?))
}

/// XPOM write of one to four consecutive CVs: `1110 11SS` + 24-bit CV index +
/// data bytes.
///
/// [`Packet::new`] rejects data that does not fit next to the address (three
/// bytes with a short address, two with a long one).
pub fn xpom_write(sequence: u8, cv: u32, data: &[u8]) -> Result<Payload> {
    if data.is_empty() || data.len() > 4 {
        return Err(Error::InvalidLength);
    }
    let mut p = payload(&xpom_header(0xEC, sequence, cv)?);
    for &b in data {
        let _ = p.push(b);
    }
    Ok(p)
}

/// Service-mode verify bit: `0111 10VV VVVV VVVV 1110 DBBB`.
pub fn pgm_verify_bit(cv: u16, bit: u8, value: bool) -> Result<Payload> {
    let i = cv_index(cv)?;
    Ok(payload(&[
        0x78 | (i >> 8) as u8,
        i as u8,
        0xE0 | ((value as u8) << 3) | (bit & 0x07),
    ]))
}

/// Service-mode write bit: `0111 10VV VVVV VVVV 1111 DBBB`.
pub fn pgm_write_bit(cv: u16, bit: u8, value: bool) -> Result<Payload> {
    let i = cv_index(cv)?;
    Ok(payload(&[
        0x78 | (i >> 8) as u8,
        i as u8,
        0xF0 | ((value as u8) << 3) | (bit & 0x07),
    ]))
}

/// Service-mode verify byte: `0111 01VV VVVV VVVV DDDD DDDD`.
pub fn pgm_verify_byte(cv: u16, value: u8) -> Result<Payload> {
    let i = cv_index(cv)?;
    Ok(payload(&[0x74 | (i >> 8) as u8, i as u8, value]))
}

/// Service-mode write byte: `0111 11VV VVVV VVVV DDDD DDDD`.
pub fn pgm_write_byte(cv: u16, value: u8) -> Result<Payload> {
    let i = cv_index(cv)?;
    Ok(payload(&[0x7C | (i >> 8) as u8, i as u8, value]))
}
