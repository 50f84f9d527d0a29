//! RailCom channel decoding.
//!
//! Decoders answer in the cutout after a packet. Channel 1 carries the address
//! broadcast (two bytes), channel 2 carries the answer of the addressed decoder
//! (up to six bytes). Every byte is first mapped through the 4-of-8 table in
//! [`crate::hamming`]; the resulting 6-bit values are then interpreted by the
//! 4-bit identifier in the top of the first value.
//!
//! | ID     | Datagram  | Payload                                      |
//! |--------|-----------|----------------------------------------------|
//! | 0      | POM       | one CV value                                 |
//! | 1      | ADR_HIGH  | upper address byte                           |
//! | 2      | ADR_LOW   | lower address byte                           |
//! | 7      | DYN       | value, plus sub-index in a third byte        |
//! | 8..=11 | XPOM 0..3 | four CV values in six bytes                  |
//!
//! All results land in [`RailcomState`], which lives in
//! [`Shared`](crate::shared::Shared) and is written from the tick handler only.

use crate::consts::{CHANNEL2_LEN, XPOM_SEQUENCES};
use crate::hamming::{self, ACK, INVALID};
use crate::stats::Response;

/// Identifier of the POM datagram.
pub const ID_POM: u8 = 0;
/// Identifier of the upper address byte.
pub const ID_ADR_HIGH: u8 = 1;
/// Identifier of the lower address byte.
pub const ID_ADR_LOW: u8 = 2;
/// Identifier of the dynamic-variable datagram.
pub const ID_DYN: u8 = 7;
/// Identifier of the XPOM datagram for sequence 0; sequences 1..3 follow.
pub const ID_XPOM: u8 = 8;

/// Combines the two address halves into one address.
///
/// Records the arrival time once both halves have been seen.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct AddressRecord {
    high: Option<u8>,
    low: Option<u8>,
    address: Option<u16>,
    timestamp: u32,
}

impl AddressRecord {
    /// Creates an empty record.
    pub const fn new() -> Self {
        Self {
            high: None,
            low: None,
            address: None,
            timestamp: 0,
        }
    }

    fn accept(&mut self, id: u8, data: u8, now: u32) -> bool {
        match id {
            ID_ADR_HIGH => self.high = Some(data),
            ID_ADR_LOW => self.low = Some(data),
            _ => return false,
        }
        if let (Some(high), Some(low)) = (self.high, self.low) {
            self.address = Some((((high & 0x3F) as u16) << 8) | low as u16);
            self.timestamp = now;
        }
        true
    }

    /// The combined address if it was completed less than `max_age` ms ago.
    pub fn address(&self, now: u32, max_age: u32) -> Option<u16> {
        self.address
            .filter(|_| now.wrapping_sub(self.timestamp) < max_age)
    }

    /// Forgets both halves and the combined address.
    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

/// State of one XPOM sequence slot.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum XpomSlot {
    /// Answers for this sequence are ignored.
    #[default]
    Blocked,
    /// Waiting for one answer.
    Armed,
    /// An answer has been stored; further answers are ignored.
    Valid([u8; 4]),
}

/// A dynamic-variable value and its sub-index.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
#[cfg_attr(feature = "defmt-0-3", derive(defmt::Format))]
pub struct DynValue {
    /// Sub-index (0..=63) naming the variable
    pub index: u8,
    /// The value
    pub value: u8,
}

/// Everything decoded from the cutouts.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct RailcomState {
    /// Address broadcast on channel 1
    pub channel1: AddressRecord,
    /// Address reported on channel 2
    pub channel2: AddressRecord,
    /// Last POM value
    pub cv: Option<u8>,
    /// XPOM sequence slots
    pub xpom: [XpomSlot; XPOM_SEQUENCES],
    /// Last dynamic variable
    pub dynamic: Option<DynValue>,
    /// An ACK was seen since the flag was last cleared
    pub ack: bool,
}

impl Default for RailcomState {
    fn default() -> Self {
        Self::new()
    }
}

impl RailcomState {
    /// Creates an empty state with every XPOM slot blocked.
    pub const fn new() -> Self {
        Self {
            channel1: AddressRecord::new(),
            channel2: AddressRecord::new(),
            cv: None,
            xpom: [XpomSlot::Blocked; XPOM_SEQUENCES],
            dynamic: None,
            ack: false,
        }
    }

    /// Decodes a channel-1 datagram.
    ///
    /// # Returns
    /// `true` if the datagram carried an address half.
    pub fn decode_channel1(&mut self, raw: &[u8], now: u32) -> bool {
        let [b0, b1] = match raw {
            [b0, b1, ..] => [hamming::decode(*b0), hamming::decode(*b1)],
            _ => return false,
        };
        if b0 > 0x3F || b1 > 0x3F {
            trace!("rc1 rejected: {} {}", raw[0], raw[1]);
            return false;
        }
        let id = b0 >> 2;
        let data = ((b0 & 0x03) << 6) | b1;
        self.channel1.accept(id, data, now)
    }

    /// Decodes a channel-2 datagram of up to six bytes.
    ///
    /// A single byte that is not a codeword rejects the whole datagram. If one
    /// of the first two bytes is an ACK/NACK/reserved codeword the datagram only
    /// counts as an answer. Otherwise the identifier selects the payload format
    /// and trailing sentinels are ignored.
    pub fn decode_channel2(&mut self, raw: &[u8], now: u32) -> Response {
        let mut values = [INVALID; CHANNEL2_LEN];
        let len = match hamming::decode_buffer(raw, &mut values) {
            Some(0) => return Response::None,
            Some(len) => len,
            None => {
                debug!("rc2 rejected: invalid codeword in {} bytes", raw.len());
                return Response::None;
            }
        };
        let values = &values[..len];

        // a sentinel in the identifier pair makes the datagram a bare answer
        if values[..len.min(2)].iter().any(|&v| hamming::is_sentinel(v)) {
            if values.contains(&ACK) {
                self.ack = true;
            }
            return Response::Full;
        }
        if len < 2 {
            debug!("rc2 rejected: single data byte");
            return Response::None;
        }

        let id = values[0] >> 2;
        let data = ((values[0] & 0x03) << 6) | values[1];
        match id {
            ID_POM => {
                self.cv = Some(data);
                Response::Full
            }
            ID_ADR_HIGH | ID_ADR_LOW => {
                let _ = self.channel2.accept(id, data, now);
                Response::Full
            }
            ID_DYN => {
                let index = values
                    .get(2)
                    .copied()
                    .filter(|&v| !hamming::is_sentinel(v))
                    .unwrap_or(0);
                self.dynamic = Some(DynValue { index, value: data });
                Response::Full
            }
            id if (ID_XPOM..ID_XPOM + XPOM_SEQUENCES as u8).contains(&id) => {
                if len < 6 || values[2..].iter().any(|&v| hamming::is_sentinel(v)) {
                    debug!("rc2 xpom incomplete: {} values", len);
                    return Response::Partial;
                }
                let slot = &mut self.xpom[(id - ID_XPOM) as usize];
                if *slot == XpomSlot::Armed {
                    *slot = XpomSlot::Valid([
                        data,
                        (values[2] << 2) | (values[3] >> 4),
                        ((values[3] & 0x0F) << 4) | (values[4] >> 2),
                        ((values[4] & 0x03) << 6) | values[5],
                    ]);
                }
                Response::Full
            }
            _ => {
                trace!("rc2 unknown id {}", id);
                Response::Partial
            }
        }
    }

    /// Blocks every XPOM slot so late answers cannot leak into the next read.
    pub fn block_xpom(&mut self) {
        self.xpom = [XpomSlot::Blocked; XPOM_SEQUENCES];
    }
}

/// Encodes an identifier and 8 data bits into a two-byte datagram, as a
/// decoder would send it. Used for channel 1 and the short channel-2 formats.
pub fn encode_datagram(id: u8, data: u8) -> [u8; 2] {
    [
        hamming::SYMBOLS[(((id & 0x0F) << 2) | (data >> 6)) as usize],
        hamming::SYMBOLS[(data & 0x3F) as usize],
    ]
}

/// Encodes an XPOM answer for `sequence` into its six-byte datagram.
pub fn encode_xpom(sequence: u8, data: [u8; 4]) -> [u8; 6] {
    let id = ID_XPOM + (sequence & 0x03);
    let values = [
        (id << 2) | (data[0] >> 6),
        data[0] & 0x3F,
        data[1] >> 2,
        ((data[1] & 0x03) << 4) | (data[2] >> 4),
        ((data[2] & 0x0F) << 2) | (data[3] >> 6),
        data[3] & 0x3F,
    ];
    values.map(|v| hamming::SYMBOLS[v as usize])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hamming::SYMBOLS;

    #[test]
    fn test_channel1_combines_address() {
        let mut state = RailcomState::new();
        assert!(state.decode_channel1(&encode_datagram(ID_ADR_HIGH, 0x80 | 0x04), 5));
        assert_eq!(state.channel1.address(5, 1000), None);
        assert!(state.decode_channel1(&encode_datagram(ID_ADR_LOW, 0xD2), 7));
        assert_eq!(state.channel1.address(7, 1000), Some(1234));
        assert_eq!(state.channel1.address(1006, 1000), Some(1234));
        assert_eq!(state.channel1.address(1007, 1000), None);
    }

    #[test]
    fn test_channel1_short_address() {
        let mut state = RailcomState::new();
        let _ = state.decode_channel1(&encode_datagram(ID_ADR_HIGH, 0), 0);
        let _ = state.decode_channel1(&encode_datagram(ID_ADR_LOW, 3), 0);
        assert_eq!(state.channel1.address(0, 1000), Some(3));
    }

    #[test]
    fn test_channel1_rejects_invalid_and_short() {
        let mut state = RailcomState::new();
        assert!(!state.decode_channel1(&[0x00, SYMBOLS[1]], 0));
        assert!(!state.decode_channel1(&[SYMBOLS[1]], 0));
        assert!(!state.decode_channel1(&[0x0f, 0x0f], 0));
    }

    #[test]
    fn test_channel2_pom_value() {
        let mut state = RailcomState::new();
        let r = state.decode_channel2(&encode_datagram(ID_POM, 0xA5), 0);
        assert_eq!(r, Response::Full);
        assert_eq!(state.cv, Some(0xA5));
    }

    #[test]
    fn test_channel2_ack_only() {
        let mut state = RailcomState::new();
        assert_eq!(state.decode_channel2(&[0xf0], 0), Response::Full);
        assert!(state.ack);
        assert_eq!(state.cv, None);

        let mut state = RailcomState::new();
        assert_eq!(state.decode_channel2(&[0x3c], 0), Response::Full);
        assert!(!state.ack);
    }

    #[test]
    fn test_channel2_double_ack() {
        let mut state = RailcomState::new();
        assert_eq!(state.decode_channel2(&[0x0f, 0xf0], 0), Response::Full);
        assert!(state.ack);
    }

    #[test]
    fn test_channel2_pom_value_with_trailing_ack() {
        let mut state = RailcomState::new();
        let [a, b] = encode_datagram(ID_POM, 0x5A);
        assert_eq!(state.decode_channel2(&[a, b, 0xf0], 0), Response::Full);
        assert_eq!(state.cv, Some(0x5A));
        assert!(!state.ack);
    }

    #[test]
    fn test_channel2_empty_and_invalid() {
        let mut state = RailcomState::new();
        assert_eq!(state.decode_channel2(&[], 0), Response::None);
        let mut raw = encode_datagram(ID_POM, 1);
        raw[1] = 0xff;
        assert_eq!(state.decode_channel2(&raw, 0), Response::None);
        assert_eq!(state.cv, None);
    }

    #[test]
    fn test_channel2_dynamic_with_index() {
        let mut state = RailcomState::new();
        let [a, b] = encode_datagram(ID_DYN, 80);
        let r = state.decode_channel2(&[a, b, SYMBOLS[7]], 0);
        assert_eq!(r, Response::Full);
        assert_eq!(state.dynamic, Some(DynValue { index: 7, value: 80 }));
    }

    #[test]
    fn test_channel2_unknown_id_is_partial() {
        let mut state = RailcomState::new();
        assert_eq!(
            state.decode_channel2(&encode_datagram(14, 0), 0),
            Response::Partial
        );
    }

    #[test]
    fn test_channel2_address_accumulates() {
        let mut state = RailcomState::new();
        let _ = state.decode_channel2(&encode_datagram(ID_ADR_LOW, 42), 1);
        let _ = state.decode_channel2(&encode_datagram(ID_ADR_HIGH, 0), 2);
        assert_eq!(state.channel2.address(2, 1000), Some(42));
        assert_eq!(state.channel1.address(2, 1000), None);
    }

    #[test]
    fn test_xpom_accepted_once_when_armed() {
        let mut state = RailcomState::new();
        let raw = encode_xpom(2, [0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(state.decode_channel2(&raw, 0), Response::Full);
        assert_eq!(state.xpom[2], XpomSlot::Blocked);

        state.xpom[2] = XpomSlot::Armed;
        let _ = state.decode_channel2(&raw, 0);
        assert_eq!(state.xpom[2], XpomSlot::Valid([0xDE, 0xAD, 0xBE, 0xEF]));

        let _ = state.decode_channel2(&encode_xpom(2, [1, 2, 3, 4]), 0);
        assert_eq!(state.xpom[2], XpomSlot::Valid([0xDE, 0xAD, 0xBE, 0xEF]));
    }

    #[test]
    fn test_xpom_with_invalid_byte_is_rejected() {
        let mut state = RailcomState::new();
        state.xpom = [XpomSlot::Armed; XPOM_SEQUENCES];
        for bad in 0..6 {
            let mut raw = encode_xpom(0, [1, 2, 3, 4]);
            raw[bad] = 0x00;
            assert_eq!(state.decode_channel2(&raw, 0), Response::None);
        }
        assert!(state.xpom.iter().all(|s| *s == XpomSlot::Armed));
    }
}
