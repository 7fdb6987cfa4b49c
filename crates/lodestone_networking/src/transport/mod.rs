//! # Transport Seam
//!
//! The reliable, ordered transport (connection setup, retransmission,
//! congestion control) lives outside this crate. The pump only needs:
//!
//! - [`TransportSession`]: send a frame, report the negotiated protocol
//!   version and the remote address
//! - [`TransportEvent`]: lifecycle and payload callbacks delivered to the pump
//! - [`TickSchedule`]: a cancellable periodic tick on the transport's own
//!   event loop (see [`EventLoop`])

mod event_loop;

pub use event_loop::{EventLoop, SessionHandle};

use std::net::SocketAddr;

use bytes::Bytes;
use parking_lot::Mutex;

/// Outbound half of a transport connection.
pub trait TransportSession: Send + Sync {
    /// Queues one encapsulated frame for reliable, ordered delivery.
    fn send(&self, frame: Bytes);

    /// Protocol version negotiated with the peer during connection setup.
    fn protocol_version(&self) -> u32;

    /// Address of the remote peer.
    fn remote_addr(&self) -> SocketAddr;
}

/// Handle to the periodic tick scheduled for one session.
pub trait TickSchedule: Send + Sync {
    /// Stops future ticks. Must not block.
    fn cancel(&self);
}

/// Connection state reported by the transport.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransportState {
    /// Handshake in progress.
    Connecting,
    /// Handshake completed.
    Connected,
    /// Closing handshake in progress.
    Disconnecting,
    /// Connection gone.
    Disconnected,
}

/// Why the transport dropped the connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisconnectReason {
    /// No traffic from the peer within the transport timeout.
    TimedOut,
    /// The peer closed the connection.
    ClosedByPeer,
    /// Anything else (server shutdown, protocol error, ...).
    Other,
}

impl DisconnectReason {
    /// Message recorded on the session for this reason.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::TimedOut => "Timed out",
            Self::ClosedByPeer | Self::Other => "Disconnected from Server",
        }
    }
}

/// Callbacks delivered by the transport for one connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    /// The connection changed state.
    StateChanged(TransportState),
    /// The connection is gone.
    Disconnected(DisconnectReason),
    /// An encapsulated (reliable, ordered) message arrived.
    Encapsulated(Bytes),
    /// A direct (raw, unencapsulated) payload arrived. Never used by the pump.
    Direct(Bytes),
}

/// In-memory transport that records every frame it is asked to send.
///
/// Used by the demo server and by tests in place of a real network stack.
pub struct MemoryTransport {
    remote: SocketAddr,
    protocol: u32,
    sent: Mutex<Vec<Bytes>>,
}

impl MemoryTransport {
    /// Creates a transport for `remote` that negotiated `protocol`.
    #[must_use]
    pub fn new(remote: SocketAddr, protocol: u32) -> Self {
        Self {
            remote,
            protocol,
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Number of frames sent so far.
    #[must_use]
    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    /// Copies out every frame sent so far.
    #[must_use]
    pub fn sent_frames(&self) -> Vec<Bytes> {
        self.sent.lock().clone()
    }

    /// Removes and returns every frame sent so far.
    pub fn take_sent(&self) -> Vec<Bytes> {
        std::mem::take(&mut *self.sent.lock())
    }
}

impl TransportSession for MemoryTransport {
    fn send(&self, frame: Bytes) {
        self.sent.lock().push(frame);
    }

    fn protocol_version(&self) -> u32 {
        self.protocol
    }

    fn remote_addr(&self) -> SocketAddr {
        self.remote
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_transport_records_frames() {
        let transport = MemoryTransport::new("127.0.0.1:19132".parse().unwrap(), 10);
        assert_eq!(transport.protocol_version(), 10);
        assert_eq!(transport.sent_count(), 0);

        transport.send(Bytes::from_static(b"\xFEone"));
        transport.send(Bytes::from_static(b"\xFEtwo"));
        assert_eq!(transport.sent_count(), 2);
        assert_eq!(&transport.sent_frames()[1][..], b"\xFEtwo");

        let taken = transport.take_sent();
        assert_eq!(taken.len(), 2);
        assert_eq!(transport.sent_count(), 0);
    }

    #[test]
    fn test_disconnect_messages() {
        assert_eq!(DisconnectReason::TimedOut.message(), "Timed out");
        assert_eq!(DisconnectReason::ClosedByPeer.message(), "Disconnected from Server");
        assert_eq!(DisconnectReason::Other.message(), "Disconnected from Server");
    }
}
