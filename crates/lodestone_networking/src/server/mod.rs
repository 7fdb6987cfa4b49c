//! # Session Server
//!
//! Per-connection state between the transport and the game simulation.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                         SESSION                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐       │
//! │  │ Transport    │  │ Queues       │  │ Simulation   │       │
//! │  │ (event loop) │──│ (lock-free)  │──│ (any thread) │       │
//! │  └──────────────┘  └──────────────┘  └──────────────┘       │
//! │         │                                   │               │
//! │         └──── tick every 50ms ──── BatchCodec ──────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Guarantees
//!
//! - Packets from one producer leave in the order they were queued
//! - A pre-built batch never merges with packets around it
//! - No frame reaches the transport after `disconnect` returns

mod queue;
mod session;
mod stats;

pub use queue::{InboundQueue, OutboundQueue};
pub use session::{Session, SessionState, MALFORMED_PACKET_REASON};
pub use stats::{SessionStats, StatsSnapshot};
