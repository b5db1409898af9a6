//! Short identifiers packed into a `u64`.
//!
//! Identifiers of at most twelve characters are packed into a single integer
//! so they can be compared and matched on without heap strings. Three
//! encodings trade character range against length; the low four bits select
//! the encoding for the 5- and 6-bit forms, while the 7-bit form is the raw
//! little-endian bytes of up to eight 7-bit ASCII characters.
//!
//! Characters outside the charset of the requested encoding pack as zero
//! positions, which render as `?` and never match an exact lookup.

use std::fmt;

use crate::error::{Error, Result};

/// Number of low bits reserved for the encoding header.
const HEADER_BITS: u32 = 4;

/// Largest rendered identifier length across encodings.
pub const STRING_ID_MAX: usize = 12;

/// Encoding selector.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum StringIdBits {
    /// `a-z` and `-`; 5 bits per character, up to 12 characters.
    Bit5 = 0,
    /// `a-z`, `-`, `0-9`, `A-Z`; 6 bits per character, up to 10 characters.
    Bit6 = 1,
    /// Any 7-bit ASCII; 8 bits per character, up to 8 characters.
    Bit7 = 2,
}

// Encode tables map a byte to its position in the charset; zero means the
// byte is not representable.
const MAP_5BIT: [u8; 256] = build_map_5bit();
const MAP_6BIT: [u8; 256] = build_map_6bit();

const fn build_map_5bit() -> [u8; 256] {
    let mut map = [0u8; 256];
    map[b'-' as usize] = 27;

    let mut ch = b'a';
    while ch <= b'z' {
        map[ch as usize] = ch - b'a' + 1;
        ch += 1;
    }

    map
}

const fn build_map_6bit() -> [u8; 256] {
    let mut map = [0u8; 256];
    map[b'-' as usize] = 27;

    let mut ch = b'a';
    while ch <= b'z' {
        map[ch as usize] = ch - b'a' + 1;
        ch += 1;
    }

    ch = b'0';
    while ch <= b'9' {
        map[ch as usize] = ch - b'0' + 28;
        ch += 1;
    }

    ch = b'A';
    while ch <= b'Z' {
        map[ch as usize] = ch - b'A' + 38;
        ch += 1;
    }

    map
}

const DECODE_5BIT: &[u8; 32] = b"?abcdefghijklmnopqrstuvwxyz-????";
const DECODE_6BIT: &[u8; 64] = b"?abcdefghijklmnopqrstuvwxyz-0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Identifier packed into a `u64` for integer comparison and matching.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct StringId(u64);

impl StringId {
    /// Packs `text` with the requested encoding.
    ///
    /// Usable in const context, which is how filter type constants are
    /// defined. Characters beyond the encoding's maximum length are dropped;
    /// characters outside its charset pack as zero positions.
    #[must_use]
    pub const fn pack(bits: StringIdBits, text: &str) -> Self {
        let bytes = text.as_bytes();
        let mut result: u64 = bits as u64;
        let mut idx = 0;

        match bits {
            StringIdBits::Bit5 => {
                while idx < bytes.len() && idx < 12 {
                    result |= (MAP_5BIT[bytes[idx] as usize] as u64) << (HEADER_BITS as u64 + 5 * idx as u64);
                    idx += 1;
                }
            }
            StringIdBits::Bit6 => {
                while idx < bytes.len() && idx < 10 {
                    result |= (MAP_6BIT[bytes[idx] as usize] as u64) << (HEADER_BITS as u64 + 6 * idx as u64);
                    idx += 1;
                }
            }
            // Raw little-endian bytes, no header
            StringIdBits::Bit7 => {
                result = 0;

                while idx < bytes.len() && idx < 8 {
                    result |= ((bytes[idx] & 0x7F) as u64) << (8 * idx as u64);
                    idx += 1;
                }
            }
        }

        Self(result)
    }

    /// Packs `text` with the narrowest encoding that represents every
    /// character, or `AssertError` when it fits none.
    pub fn new(text: &str) -> Result<Self> {
        let bytes = text.as_bytes();

        if bytes.is_empty() || bytes.len() > STRING_ID_MAX {
            return Err(Error::assert(format!(
                "string id '{text}' length must be 1-{STRING_ID_MAX}"
            )));
        }

        if bytes.len() <= 12 && bytes.iter().all(|&ch| MAP_5BIT[ch as usize] != 0) {
            return Ok(Self::pack(StringIdBits::Bit5, text));
        }

        if bytes.len() <= 10 && bytes.iter().all(|&ch| MAP_6BIT[ch as usize] != 0) {
            return Ok(Self::pack(StringIdBits::Bit6, text));
        }

        if bytes.len() <= 8 && bytes.iter().all(u8::is_ascii) {
            return Ok(Self::pack(StringIdBits::Bit7, text));
        }

        Err(Error::assert(format!("string id '{text}' fits no encoding")))
    }

    /// Unpacks into `out` and returns the rendered length.
    pub fn unpack(self, out: &mut [u8; STRING_ID_MAX]) -> usize {
        let mut id = self.0;

        match id & ((1 << HEADER_BITS) - 1) {
            0 => {
                id >>= HEADER_BITS;

                for idx in 0..12 {
                    out[idx] = DECODE_5BIT[(id & 0x1F) as usize];
                    id >>= 5;

                    if id == 0 {
                        return idx + 1;
                    }
                }

                12
            }
            1 => {
                id >>= HEADER_BITS;

                for idx in 0..10 {
                    out[idx] = DECODE_6BIT[(id & 0x3F) as usize];
                    id >>= 6;

                    if id == 0 {
                        return idx + 1;
                    }
                }

                10
            }
            _ => {
                for idx in 0..8 {
                    out[idx] = (id & 0x7F) as u8;
                    id >>= 8;

                    if id == 0 {
                        return idx + 1;
                    }
                }

                8
            }
        }
    }

    /// Raw packed representation.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for StringId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = [0u8; STRING_ID_MAX];
        let size = self.unpack(&mut out);

        f.write_str(std::str::from_utf8(&out[..size]).unwrap_or("?"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pack_5bit_round_trips() {
        let id = StringId::pack(StringIdBits::Bit5, "gz-cmp");

        assert_eq!(id.as_u64() & 0xF, 0);
        assert_eq!(id.to_string(), "gz-cmp");

        // Maximum length
        assert_eq!(
            StringId::pack(StringIdBits::Bit5, "abcdefghijkl").to_string(),
            "abcdefghijkl"
        );
    }

    #[test]
    fn pack_6bit_round_trips() {
        let id = StringId::pack(StringIdBits::Bit6, "Aes256Cbc");

        assert_eq!(id.as_u64() & 0xF, 1);
        assert_eq!(id.to_string(), "Aes256Cbc");
    }

    #[test]
    fn pack_7bit_is_raw_bytes() {
        let id = StringId::pack(StringIdBits::Bit7, "x=1");

        // Little-endian raw bytes, no header
        assert_eq!(id.as_u64(), u64::from(b'x') | u64::from(b'=') << 8 | u64::from(b'1') << 16);
    }

    #[test]
    fn new_selects_narrowest_encoding() {
        assert_eq!(StringId::new("size").expect("5-bit").as_u64() & 0xF, 0);
        assert_eq!(StringId::new("sha256").expect("6-bit").as_u64() & 0xF, 1);
        assert!(StringId::new("a.b").is_ok());
        assert!(StringId::new("").is_err());
        assert!(StringId::new("thirteen-char").is_err());
    }

    #[test]
    fn out_of_charset_packs_to_zero_position() {
        // '0' is not in the 5-bit charset, so the position packs as zero and
        // renders as '?'
        let id = StringId::pack(StringIdBits::Bit5, "a0c");
        assert_eq!(id.to_string(), "a?c");

        // Exact-match lookups therefore never match the intended string
        assert_ne!(id, StringId::new("a0c").expect("6-bit pack"));
    }

    #[test]
    fn ids_compare_as_integers() {
        let size = StringId::new("size").expect("pack");
        let hash = StringId::new("hash").expect("pack");

        assert_ne!(size, hash);
        assert_eq!(size, StringId::pack(StringIdBits::Bit5, "size"));
    }
}
