//! # Batch Codec
//!
//! Stateless encode/decode of packet groups into one physical frame.
//!
//! ```text
//! ┌──────┬──────────────────────────────────────────────────────────┐
//! │ 0xFE │ compress( varint len │ packet │ varint len │ packet ... ) │
//! └──────┴──────────────────────────────────────────────────────────┘
//! ```
//!
//! Decoding is all-or-nothing: a corrupt stream or an overrunning length
//! prefix rejects the whole frame. Unknown packet ids only cost their own
//! entry.

use bytes::{Bytes, BytesMut};

use super::compression::{CompressionLevel, CompressionScheme};
use super::packets::{BatchFrame, Packet, PacketKind, BATCH_MARKER};
use super::serialization::{put_unsigned_varint, varint_len, BatchReader};
use crate::error::{CodecError, CodecResult};

/// Default decompressed batch ceiling (2 MiB).
pub const DEFAULT_MAX_DECOMPRESSED_SIZE: usize = 2 * 1024 * 1024;

/// Default ceiling on entries per batch.
pub const DEFAULT_MAX_PACKETS_PER_BATCH: usize = 1024;

/// Ceilings applied while decoding untrusted frames.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchLimits {
    /// Largest accepted decompressed payload in bytes.
    pub max_decompressed_size: usize,
    /// Largest accepted number of entries.
    pub max_packets: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_decompressed_size: DEFAULT_MAX_DECOMPRESSED_SIZE,
            max_packets: DEFAULT_MAX_PACKETS_PER_BATCH,
        }
    }
}

/// Result of resolving raw entries through the packet registry.
#[derive(Debug, Default)]
pub struct DecodedBatch {
    /// Packets with a registered id, in wire order.
    pub packets: Vec<Packet>,
    /// Entries skipped because their id is unknown (or they were empty).
    pub unknown: usize,
}

/// Stateless batch encoder/decoder.
pub struct BatchCodec;

impl BatchCodec {
    /// Encodes `packets` into a complete wire frame, marker byte included.
    ///
    /// Every packet must already be encoded. Handing over an unencoded packet
    /// is a programming error: it panics in debug builds and is refused with
    /// [`CodecError::Unencoded`] otherwise.
    pub fn encode(
        packets: &[Packet],
        level: CompressionLevel,
        protocol: u32,
    ) -> CodecResult<Bytes> {
        let payload = Self::compress_payload(packets, level, protocol)?;
        let mut frame = BytesMut::with_capacity(1 + payload.len());
        frame.extend_from_slice(&[BATCH_MARKER]);
        frame.extend_from_slice(&payload);
        Ok(frame.freeze())
    }

    /// Encodes `packets` into a pre-built [`BatchFrame`] that can be queued
    /// and sent standalone.
    pub fn build_frame(
        packets: &[Packet],
        level: CompressionLevel,
        protocol: u32,
    ) -> CodecResult<BatchFrame> {
        Self::compress_payload(packets, level, protocol).map(BatchFrame::from_compressed)
    }

    fn compress_payload(
        packets: &[Packet],
        level: CompressionLevel,
        protocol: u32,
    ) -> CodecResult<Vec<u8>> {
        let capacity = packets
            .iter()
            .map(|p| p.buffer().len() + varint_len(p.buffer().len() as u32))
            .sum();
        let mut batched = BytesMut::with_capacity(capacity);

        for packet in packets {
            debug_assert!(
                packet.is_encoded(),
                "packet 0x{:02x} should have already been encoded",
                packet.id()
            );
            if !packet.is_encoded() {
                return Err(CodecError::Unencoded { id: packet.id() });
            }
            let buf = packet.buffer();
            put_unsigned_varint(&mut batched, buf.len() as u32);
            batched.extend_from_slice(buf);
        }

        CompressionScheme::for_protocol(protocol).compress(&batched, level)
    }

    /// Decodes a wire frame into its raw entries using default limits.
    pub fn decode(frame: &[u8], protocol: u32) -> CodecResult<Vec<Bytes>> {
        Self::decode_with_limits(frame, protocol, BatchLimits::default())
    }

    /// Decodes a wire frame into its raw entries.
    ///
    /// Each entry is one packet: its first byte is the packet type id.
    pub fn decode_with_limits(
        frame: &[u8],
        protocol: u32,
        limits: BatchLimits,
    ) -> CodecResult<Vec<Bytes>> {
        let Some((&BATCH_MARKER, compressed)) = frame.split_first() else {
            return Err(CodecError::MissingMarker);
        };

        let payload = Bytes::from(
            CompressionScheme::for_protocol(protocol)
                .decompress(compressed, limits.max_decompressed_size)?,
        );

        let mut reader = BatchReader::new(&payload);
        let mut entries = Vec::new();
        while !reader.is_exhausted() {
            if entries.len() == limits.max_packets {
                return Err(CodecError::TooManyPackets {
                    max: limits.max_packets,
                });
            }
            let range = reader.read_entry()?;
            entries.push(payload.slice(range));
        }
        Ok(entries)
    }

    /// Resolves raw entries through the packet registry.
    ///
    /// Unknown ids are logged and skipped; the remaining entries still decode.
    #[must_use]
    pub fn decode_packets(entries: Vec<Bytes>, protocol: u32) -> DecodedBatch {
        let mut batch = DecodedBatch {
            packets: Vec::with_capacity(entries.len()),
            unknown: 0,
        };

        for entry in entries {
            let decoded = entry
                .first()
                .and_then(|&id| PacketKind::from_id(id))
                .and_then(|kind| (kind.decoder())(entry.clone(), protocol));

            match decoded {
                Some(packet) => batch.packets.push(packet),
                None => {
                    batch.unknown += 1;
                    tracing::warn!(
                        packet = entry.first().copied(),
                        len = entry.len(),
                        protocol,
                        "skipping unknown packet in batch"
                    );
                }
            }
        }
        batch
    }
}
