//! # Batch Serialization
//!
//! Unsigned varint length prefixes and the cursor used to walk a
//! decompressed batch payload.
//!
//! ## Entry Layout
//!
//! ```text
//! ┌──────────────────────┬─────────────────────────────┐
//! │ length (varint, 1-5) │ packet bytes (length bytes) │  ... repeated
//! └──────────────────────┴─────────────────────────────┘
//! ```
//!
//! Varints are little-endian base-128: seven data bits per byte, high bit set
//! on every byte except the last.

use bytes::{BufMut, BytesMut};

use crate::error::{CodecError, CodecResult};

/// Maximum encoded size of a 32-bit varint.
pub const MAX_VARINT_LEN: usize = 5;

/// Writes `value` as an unsigned varint.
#[inline]
pub fn put_unsigned_varint(buf: &mut BytesMut, mut value: u32) {
    while value >= 0x80 {
        buf.put_u8((value as u8 & 0x7F) | 0x80);
        value >>= 7;
    }
    buf.put_u8(value as u8);
}

/// Number of bytes `value` occupies as an unsigned varint.
#[inline]
#[must_use]
pub const fn varint_len(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x001F_FFFF => 3,
        0x0020_0000..=0x0FFF_FFFF => 4,
        _ => 5,
    }
}

/// Cursor over a decompressed batch payload.
///
/// Every read is bounds-checked; a short buffer is reported as an error,
/// never as a panic.
pub struct BatchReader<'a> {
    buffer: &'a [u8],
    position: usize,
}

impl<'a> BatchReader<'a> {
    /// Creates a reader positioned at the start of `buffer`.
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, position: 0 }
    }

    /// Returns the number of bytes remaining.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.position)
    }

    /// Returns true once every byte has been consumed.
    #[inline]
    #[must_use]
    pub const fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }

    /// Returns the current read offset.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Reads an unsigned varint.
    pub fn read_unsigned_varint(&mut self) -> CodecResult<u32> {
        let mut value: u32 = 0;
        for i in 0..MAX_VARINT_LEN {
            let Some(&byte) = self.buffer.get(self.position) else {
                return Err(CodecError::TruncatedVarInt);
            };
            self.position += 1;

            let bits = u32::from(byte & 0x7F);
            // Fifth byte may only carry the top four bits of a u32.
            if i == MAX_VARINT_LEN - 1 && bits > 0x0F {
                return Err(CodecError::VarIntTooLong);
            }
            value |= bits << (7 * i);

            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CodecError::VarIntTooLong)
    }

    /// Reads exactly `len` bytes, returning their offset range in the buffer.
    pub fn read_range(&mut self, len: usize) -> CodecResult<std::ops::Range<usize>> {
        let remaining = self.remaining();
        if len > remaining {
            return Err(CodecError::LengthOverrun {
                declared: len,
                remaining,
            });
        }
        let start = self.position;
        self.position += len;
        Ok(start..self.position)
    }

    /// Reads one `{varint length, bytes}` entry and returns its range.
    pub fn read_entry(&mut self) -> CodecResult<std::ops::Range<usize>> {
        let len = self.read_unsigned_varint()? as usize;
        self.read_range(len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: u32) -> BytesMut {
        let mut buf = BytesMut::new();
        put_unsigned_varint(&mut buf, value);
        buf
    }

    #[test]
    fn test_varint_known_encodings() {
        assert_eq!(&encode(0)[..], &[0x00]);
        assert_eq!(&encode(1)[..], &[0x01]);
        assert_eq!(&encode(127)[..], &[0x7F]);
        assert_eq!(&encode(128)[..], &[0x80, 0x01]);
        assert_eq!(&encode(300)[..], &[0xAC, 0x02]);
        assert_eq!(&encode(u32::MAX)[..], &[0xFF, 0xFF, 0xFF, 0xFF, 0x0F]);
    }

    #[test]
    fn test_varint_len_matches_encoding() {
        for value in [0, 127, 128, 16_383, 16_384, 2_097_151, 2_097_152, u32::MAX] {
            assert_eq!(varint_len(value), encode(value).len(), "value {value}");
        }
    }

    #[test]
    fn test_read_varint_boundaries() {
        for value in [0, 1, 127, 128, 65_535, 1 << 21, u32::MAX] {
            let buf = encode(value);
            let mut reader = BatchReader::new(&buf);
            assert_eq!(reader.read_unsigned_varint().unwrap(), value);
            assert!(reader.is_exhausted());
        }
    }

    #[test]
    fn test_truncated_varint() {
        let mut reader = BatchReader::new(&[0x80, 0x80]);
        assert!(matches!(
            reader.read_unsigned_varint(),
            Err(CodecError::TruncatedVarInt)
        ));
    }

    #[test]
    fn test_overlong_varint() {
        let mut reader = BatchReader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0x01]);
        assert!(matches!(
            reader.read_unsigned_varint(),
            Err(CodecError::VarIntTooLong)
        ));

        // Fifth byte overflowing 32 bits
        let mut reader = BatchReader::new(&[0xFF, 0xFF, 0xFF, 0xFF, 0x1F]);
        assert!(matches!(
            reader.read_unsigned_varint(),
            Err(CodecError::VarIntTooLong)
        ));
    }

    #[test]
    fn test_entry_overrun() {
        // Declares 10 bytes, carries 3
        let mut reader = BatchReader::new(&[0x0A, 1, 2, 3]);
        match reader.read_entry() {
            Err(CodecError::LengthOverrun { declared, remaining }) => {
                assert_eq!(declared, 10);
                assert_eq!(remaining, 3);
            }
            other => panic!("expected overrun, got {other:?}"),
        }
    }

    #[test]
    fn test_read_entries_sequentially() {
        let buf = [0x02, 0xAA, 0xBB, 0x00, 0x01, 0xCC];
        let mut reader = BatchReader::new(&buf);
        assert_eq!(reader.read_entry().unwrap(), 1..3);
        assert_eq!(reader.read_entry().unwrap(), 4..4);
        assert_eq!(reader.read_entry().unwrap(), 5..6);
        assert!(reader.is_exhausted());
        assert_eq!(reader.position(), 6);
    }
}
