//! # Lodestone Networking - The Session Pump
//!
//! Bridges a reliable, ordered transport to the game simulation for each
//! connected player.
//!
//! ## Architecture
//!
//! - **Protocol**: 0xFE batch frames, varint length-prefixed entries,
//!   raw DEFLATE or zlib chosen by protocol version
//! - **Server**: the per-connection [`Session`] with its lock-free queues
//! - **Transport**: the seam to the transport layer and a tokio driver that
//!   ticks every session
//! - **Integration**: the [`Identity`] trait the simulation implements
//!
//! ## Data Flow
//!
//! ```text
//! TRANSPORT                SESSION                    SIMULATION
//!   |                         |                            |
//!   |-- 0xFE frame ---------->| decode, queue inbound      |
//!   |                         |<--------- drain_inbound ---|
//!   |                         |<------ enqueue_outbound ---|
//!   |<-- coalesced frame -----| every 50ms                 |
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lodestone_networking::{EventLoop, MemoryTransport, PumpConfig, Session};
//!
//! let config = PumpConfig::default();
//! let transport = Arc::new(MemoryTransport::new(addr, 10));
//! let session = Arc::new(Session::new(&transport, &config));
//!
//! let driver = EventLoop::new(runtime.handle().clone(), config.tick_interval());
//! let (handle, _task) = driver.spawn(Arc::clone(&session));
//! handle.deliver(TransportEvent::Encapsulated(frame));
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod error;
pub mod integration;
pub mod protocol;
pub mod server;
pub mod transport;

// Re-exports for convenience
pub use config::PumpConfig;
pub use error::{CodecError, CodecResult, ConfigError, HandlerFault, SessionError, SessionResult};
pub use integration::Identity;
pub use protocol::{
    BatchCodec, BatchFrame, BatchLimits, CompressionLevel, CompressionScheme, Outbound, Packet,
    PacketKind, BATCH_MARKER,
};
pub use server::{Session, SessionState, StatsSnapshot, MALFORMED_PACKET_REASON};
pub use transport::{
    DisconnectReason, EventLoop, MemoryTransport, SessionHandle, TickSchedule, TransportEvent,
    TransportSession, TransportState,
};

/// Outbound flush period in milliseconds.
///
/// At 20Hz, every session flushes its outbound queue once per 50ms.
pub const TICK_INTERVAL_MS: u64 = config::DEFAULT_TICK_INTERVAL_MS;
