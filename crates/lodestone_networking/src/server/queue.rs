//! # Session Queues
//!
//! Lock-free hand-off between the transport event loop and the simulation.
//!
//! ```text
//!  simulation threads ──push──┐                 ┌──push── transport loop
//!  simulation threads ──push──┤ OutboundQueue   │ InboundQueue
//!                             └──pop── tick     └──pop── drain_inbound
//! ```
//!
//! Both wrap crossbeam channels. The outbound side is genuinely
//! multi-producer; the inbound side has one producer and one consumer by
//! construction and never sees contention on the push path.

use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TrySendError};

use crate::error::{SessionError, SessionResult};
use crate::protocol::{Outbound, Packet};

/// Multi-producer / single-consumer outbound queue.
///
/// Unbounded unless a capacity is configured, in which case a full queue is
/// reported to the producer instead of growing.
pub struct OutboundQueue {
    tx: Sender<Outbound>,
    rx: Receiver<Outbound>,
    capacity: Option<usize>,
}

impl OutboundQueue {
    /// Creates an outbound queue.
    #[must_use]
    pub fn new(capacity: Option<usize>) -> Self {
        let (tx, rx) = match capacity {
            Some(cap) => bounded(cap),
            None => unbounded(),
        };
        Self { tx, rx, capacity }
    }

    /// Appends an item. Safe to call from any thread.
    pub fn push(&self, item: Outbound) -> SessionResult<()> {
        self.tx.try_send(item).map_err(|err| match err {
            TrySendError::Full(_) => SessionError::OutboundFull {
                capacity: self.capacity.unwrap_or_default(),
            },
            // Unreachable while the queue owns its receiver.
            TrySendError::Disconnected(_) => SessionError::Closed,
        })
    }

    /// Pops the oldest item, if any.
    #[inline]
    pub fn pop(&self) -> Option<Outbound> {
        self.rx.try_recv().ok()
    }

    /// Drops every queued item, returning how many were discarded.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    /// Number of queued items.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Single-producer / single-consumer inbound queue of decoded packets.
pub struct InboundQueue {
    tx: Sender<Packet>,
    rx: Receiver<Packet>,
}

impl InboundQueue {
    /// Creates an empty inbound queue.
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }

    /// Appends a packet.
    #[inline]
    pub fn push(&self, packet: Packet) {
        // Cannot fail: unbounded, and the receiver lives as long as `self`.
        let _ = self.tx.send(packet);
    }

    /// Pops the oldest packet, if any.
    #[inline]
    pub fn pop(&self) -> Option<Packet> {
        self.rx.try_recv().ok()
    }

    /// Number of queued packets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

impl Default for InboundQueue {
    fn default() -> Self {
        Self::new()
    }
}
