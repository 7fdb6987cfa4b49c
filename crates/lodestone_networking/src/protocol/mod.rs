//! # Wire Protocol
//!
//! Batch framing shared by the inbound and outbound paths.
//!
//! ## Frame Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │ Marker (1 byte, 0xFE)                                        │
//! ├──────────────────────────────────────────────────────────────┤
//! │ Compressed payload (raw DEFLATE for protocol >= 10, else zlib)│
//! │   └─ { varint length │ packet id │ packet body } ...         │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Design Philosophy
//!
//! - One physical frame per coalesced run of packets
//! - Compression scheme fixed by the negotiated protocol version
//! - Untrusted input is bounds-checked, never panics

mod batch;
mod compression;
mod packets;
mod serialization;

pub use batch::{
    BatchCodec, BatchLimits, DecodedBatch, DEFAULT_MAX_DECOMPRESSED_SIZE,
    DEFAULT_MAX_PACKETS_PER_BATCH,
};
pub use compression::{
    CompressionLevel, CompressionScheme, MAX_COMPRESSION_LEVEL, RAW_DEFLATE_SINCE,
};
pub use packets::{BatchFrame, DecodeFn, Outbound, Packet, PacketKind, BATCH_MARKER};
pub use serialization::{put_unsigned_varint, varint_len, BatchReader, MAX_VARINT_LEN};
