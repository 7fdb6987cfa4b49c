//! # Batch Compression
//!
//! Two incompatible DEFLATE containers are in use, chosen by the peer's
//! negotiated protocol version:
//!
//! | protocol | scheme | container |
//! |----------|--------|-----------|
//! | `>= 10`  | [`CompressionScheme::RawDeflate`] | none |
//! | `< 10`   | [`CompressionScheme::Zlib`] | 2-byte header + Adler-32 trailer |
//!
//! The scheme is a pure function of the version, so encode and decode always
//! agree for a given session. The level only affects encoding.

use std::io::{Read, Write};

use flate2::read::{DeflateDecoder, ZlibDecoder};
use flate2::write::{DeflateEncoder, ZlibEncoder};
use flate2::Compression;

use crate::error::{CodecError, CodecResult};

/// First protocol version that uses raw DEFLATE.
pub const RAW_DEFLATE_SINCE: u32 = 10;

/// Highest accepted compression level.
pub const MAX_COMPRESSION_LEVEL: u32 = 9;

/// Compression container used on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompressionScheme {
    /// DEFLATE stream with no header or trailer.
    RawDeflate,
    /// DEFLATE wrapped in a zlib container.
    Zlib,
}

impl CompressionScheme {
    /// Selects the scheme for a negotiated protocol version.
    #[inline]
    #[must_use]
    pub const fn for_protocol(protocol: u32) -> Self {
        if protocol >= RAW_DEFLATE_SINCE {
            Self::RawDeflate
        } else {
            Self::Zlib
        }
    }

    /// Compresses `data` at `level`.
    pub fn compress(self, data: &[u8], level: CompressionLevel) -> CodecResult<Vec<u8>> {
        let compression = Compression::new(level.get());
        // Deflate rarely expands small game payloads past this.
        let capacity = data.len() / 2 + 16;
        match self {
            Self::RawDeflate => {
                let mut encoder = DeflateEncoder::new(Vec::with_capacity(capacity), compression);
                encoder.write_all(data).map_err(CodecError::Compress)?;
                encoder.finish().map_err(CodecError::Compress)
            }
            Self::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::with_capacity(capacity), compression);
                encoder.write_all(data).map_err(CodecError::Compress)?;
                encoder.finish().map_err(CodecError::Compress)
            }
        }
    }

    /// Decompresses `data`, refusing output larger than `max_size` bytes.
    pub fn decompress(self, data: &[u8], max_size: usize) -> CodecResult<Vec<u8>> {
        let mut out = Vec::with_capacity((data.len() * 4).min(max_size));
        // Read one byte past the ceiling so an oversized batch is detectable.
        let limit = max_size as u64 + 1;
        let read = match self {
            Self::RawDeflate => DeflateDecoder::new(data).take(limit).read_to_end(&mut out),
            Self::Zlib => ZlibDecoder::new(data).take(limit).read_to_end(&mut out),
        };
        read.map_err(CodecError::Decompress)?;

        if out.len() > max_size {
            return Err(CodecError::PayloadTooLarge { max: max_size });
        }
        Ok(out)
    }
}

/// A validated DEFLATE level in `0..=9`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CompressionLevel(u32);

impl CompressionLevel {
    /// Store only.
    pub const NONE: Self = Self(0);
    /// Fastest compression.
    pub const FAST: Self = Self(1);
    /// Level used when the server config does not say otherwise.
    pub const DEFAULT: Self = Self(7);
    /// Smallest output.
    pub const BEST: Self = Self(MAX_COMPRESSION_LEVEL);

    /// Validates a raw level.
    pub fn new(level: u32) -> CodecResult<Self> {
        if level > MAX_COMPRESSION_LEVEL {
            return Err(CodecError::InvalidLevel(level));
        }
        Ok(Self(level))
    }

    /// Raw level.
    #[inline]
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self::DEFAULT
    }
}
