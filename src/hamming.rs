//! RailCom 4-of-8 symbol decoding.
//!
//! Every byte a decoder sends in the RailCom cutout is a codeword of a
//! balanced code: exactly four of its eight bits are set. 64 codewords carry a
//! 6-bit payload, six more carry the ACK, NACK and reserved/busy signals.
//! Anything else is a transmission error.
//!
//! ## Symbol Table
//!
//! The encoder maps each 6-bit value to a codeword taken from a fixed lookup
//! table ([`SYMBOLS`]). The decoder is a 256-entry reverse table built from it
//! at compile time, so decoding a received byte is a single lookup.
//!
//! | Decoded        | Meaning                                    |
//! |----------------|--------------------------------------------|
//! | `0x00..=0x3F`  | 6-bit payload                              |
//! | [`ACK`]        | acknowledge (`0x0F` and `0xF0`)            |
//! | [`NACK`]       | not acknowledged (`0x3C`)                  |
//! | [`BUSY`]       | decoder busy (`0xE1`)                      |
//! | [`RESERVED_1`] | reserved (`0xC3`)                          |
//! | [`RESERVED_2`] | reserved (`0x87`)                          |
//! | [`INVALID`]    | not a codeword                             |
//!
//! ## Limitations
//!
//! - The code only detects errors, it does not correct them.
//! - Some decoders send `0xF8` instead of the ACK codeword `0xF0`; [`decode`]
//!   remaps it before the lookup.

/// Decoded value of both ACK codewords.
pub const ACK: u8 = 0x40;
/// Decoded value of the NACK codeword.
pub const NACK: u8 = 0x41;
/// Decoded value of the BUSY codeword.
pub const BUSY: u8 = 0x42;
/// Decoded value of the first reserved codeword.
pub const RESERVED_1: u8 = 0x43;
/// Decoded value of the second reserved codeword.
pub const RESERVED_2: u8 = 0x44;
/// Decoded value of a byte that is not a codeword.
pub const INVALID: u8 = 0xFF;

/// Codewords for the 6-bit values `0x00..=0x3F`, indexed by value.
pub static SYMBOLS: [u8; 64] = [
    0xac, 0xaa, 0xa9, 0xa5, 0xa3, 0xa6, 0x9c, 0x9a, 0x99, 0x95, 0x93, 0x96, 0x8e, 0x8d, 0x8b, 0xb1,
    0xb2, 0xb4, 0xb8, 0x74, 0x72, 0x6c, 0x6a, 0x69, 0x65, 0x63, 0x66, 0x5c, 0x5a, 0x59, 0x55, 0x53,
    0x56, 0x4e, 0x4d, 0x4b, 0x47, 0x71, 0xe8, 0xe4, 0xe2, 0xd1, 0xc9, 0xc5, 0xd8, 0xd4, 0xd2, 0xca,
    0xc6, 0xcc, 0x78, 0x17, 0x1b, 0x1d, 0x1e, 0x2e, 0x36, 0x3a, 0x27, 0x2b, 0x2d, 0x35, 0x39, 0x33,
];

/// Codewords for the sentinel values, as `(codeword, decoded)`.
const SENTINELS: [(u8, u8); 6] = [
    (0x0f, ACK),
    (0xf0, ACK),
    (0x3c, NACK),
    (0xe1, BUSY),
    (0xc3, RESERVED_1),
    (0x87, RESERVED_2),
];

/// Byte some decoders send in place of the `0xF0` ACK codeword.
const ACK_VARIANT: u8 = 0xf8;

static REV_SYMBOLS: [u8; 256] = build_rev_symbols();

const fn build_rev_symbols() -> [u8; 256] {
    let mut table = [INVALID; 256];
    let mut value = 0;
    while value < SYMBOLS.len() {
        table[SYMBOLS[value] as usize] = value as u8;
        value += 1;
    }
    let mut i = 0;
    while i < SENTINELS.len() {
        let (code, decoded) = SENTINELS[i];
        table[code as usize] = decoded;
        i += 1;
    }
    table
}

/// Decodes one received byte.
///
/// Returns the 6-bit payload, one of the sentinel values or [`INVALID`].
pub fn decode(byte: u8) -> u8 {
    let byte = if byte == ACK_VARIANT { 0xf0 } else { byte };
    REV_SYMBOLS[byte as usize]
}

/// Encodes a 6-bit value or a sentinel into its codeword.
///
/// Returns `None` for values that have no codeword. [`ACK`] encodes to `0xF0`.
pub fn encode(value: u8) -> Option<u8> {
    if let Some(&code) = SYMBOLS.get(value as usize) {
        return Some(code);
    }
    SENTINELS
        .iter()
        .rev()
        .find(|&&(_, decoded)| decoded == value)
        .map(|&(code, _)| code)
}

/// Returns `true` if the decoded value is one of the ACK/NACK/reserved sentinels.
pub fn is_sentinel(decoded: u8) -> bool {
    (ACK..=RESERVED_2).contains(&decoded)
}

/// Decodes a buffer of received bytes into `output`.
///
/// Stops at the first byte that is not a codeword and returns `None`; the
/// whole frame is then unusable for structured decoding.
///
/// # Returns
/// The number of decoded values written to `output`.
pub fn decode_buffer(input: &[u8], output: &mut [u8]) -> Option<usize> {
    let mut len = 0;
    for (&byte, slot) in input.iter().zip(output.iter_mut()) {
        let decoded = decode(byte);
        if decoded == INVALID {
            return None;
        }
        *slot = decoded;
        len += 1;
    }
    Some(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_symbol_is_balanced() {
        for code in SYMBOLS.iter().chain(SENTINELS.iter().map(|(code, _)| code)) {
            assert_eq!(code.count_ones(), 4, "codeword {:#04x}", code);
        }
    }

    #[test]
    fn test_payload_values_decode_to_themselves() {
        for value in 0..64u8 {
            assert_eq!(decode(SYMBOLS[value as usize]), value);
            assert_eq!(encode(value).map(decode), Some(value));
        }
    }

    #[test]
    fn test_sentinel_counts() {
        let decoded: Vec<u8> = (0..=255u8).map(decode).collect();
        let count = |v: u8| {
            (0..=255u8)
                .filter(|&b| b != ACK_VARIANT && decoded[b as usize] == v)
                .count()
        };
        assert_eq!(count(ACK), 2);
        assert_eq!(count(NACK), 1);
        assert_eq!(count(BUSY), 1);
        assert_eq!(count(RESERVED_1), 1);
        assert_eq!(count(RESERVED_2), 1);
        assert_eq!(decode(0x0f), ACK);
        assert_eq!(decode(0xf0), ACK);
    }

    #[test]
    fn test_decode_is_deterministic() {
        for byte in 0..=255u8 {
            assert_eq!(decode(byte), decode(byte));
            let d = decode(byte);
            assert!(d < 0x40 || is_sentinel(d) || d == INVALID);
        }
    }

    #[test]
    fn test_vendor_ack_is_remapped() {
        assert_eq!(decode(0xf8), ACK);
    }

    #[test]
    fn test_unbalanced_bytes_are_invalid() {
        for byte in [0x00u8, 0xff, 0x01, 0x7f, 0xfe] {
            assert_eq!(decode(byte), INVALID);
        }
    }

    #[test]
    fn test_decode_buffer_rejects_invalid_byte() {
        let mut out = [0u8; 6];
        let input = [SYMBOLS[1], SYMBOLS[2], 0x00];
        assert_eq!(decode_buffer(&input, &mut out), None);

        let input = [SYMBOLS[1], SYMBOLS[2], 0x0f];
        assert_eq!(decode_buffer(&input, &mut out), Some(3));
        assert_eq!(&out[..3], &[1, 2, ACK]);
    }
}
