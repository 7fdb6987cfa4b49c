//! # Integration Traits
//!
//! Traits the simulation layer implements to plug into the session pump.
//!
//! ```text
//! Networking defines:    Simulation implements:
//! ┌────────────────┐     ┌────────────────┐
//! │ trait Identity │ ←── │ impl Identity  │
//! └────────────────┘     └────────────────┘
//! ```

use crate::error::HandlerFault;
use crate::protocol::Packet;

/// The game-side entity bound to a session after the handshake.
///
/// `handle` runs on the simulation thread during
/// [`Session::drain_inbound`](crate::server::Session::drain_inbound).
/// A returned fault is logged and the drain moves on to the next packet.
pub trait Identity: Send {
    /// Display name, used in logs.
    fn name(&self) -> &str;

    /// Game protocol version inbound packets are decoded against.
    fn protocol(&self) -> u32;

    /// Handles one decoded packet.
    fn handle(&mut self, packet: &Packet) -> Result<(), HandlerFault>;
}
