//! # Session Statistics
//!
//! Per-session counters, updated from both the transport loop and the
//! simulation thread.

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters for one session.
#[derive(Debug, Default)]
pub struct SessionStats {
    frames_received: AtomicU64,
    frames_ignored: AtomicU64,
    frames_sent: AtomicU64,
    packets_queued: AtomicU64,
    packets_sent: AtomicU64,
    packets_received: AtomicU64,
    unknown_packets: AtomicU64,
    handler_faults: AtomicU64,
    encode_failures: AtomicU64,
}

/// Point-in-time copy of [`SessionStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Batch frames accepted from the transport.
    pub frames_received: u64,
    /// Transport messages without the batch marker.
    pub frames_ignored: u64,
    /// Frames handed to the transport.
    pub frames_sent: u64,
    /// Packets accepted by `enqueue_outbound`.
    pub packets_queued: u64,
    /// Packets that left inside a coalesced frame.
    pub packets_sent: u64,
    /// Packets pushed to the inbound queue.
    pub packets_received: u64,
    /// Inbound entries skipped for an unknown id.
    pub unknown_packets: u64,
    /// Handler calls that returned a fault.
    pub handler_faults: u64,
    /// Coalesced groups dropped because encoding failed.
    pub encode_failures: u64,
}

#[inline]
fn bump(counter: &AtomicU64, n: u64) {
    counter.fetch_add(n, Ordering::Relaxed);
}

impl SessionStats {
    /// Records an accepted inbound frame.
    #[inline]
    pub fn frame_received(&self) {
        bump(&self.frames_received, 1);
    }

    /// Records a non-batch transport message.
    #[inline]
    pub fn frame_ignored(&self) {
        bump(&self.frames_ignored, 1);
    }

    /// Records a frame handed to the transport.
    #[inline]
    pub fn frame_sent(&self) {
        bump(&self.frames_sent, 1);
    }

    /// Records a packet accepted for sending.
    #[inline]
    pub fn packet_queued(&self) {
        bump(&self.packets_queued, 1);
    }

    /// Records packets that left in a coalesced frame.
    #[inline]
    pub fn packets_sent(&self, n: usize) {
        bump(&self.packets_sent, n as u64);
    }

    /// Records packets pushed to the inbound queue.
    #[inline]
    pub fn packets_received(&self, n: usize) {
        bump(&self.packets_received, n as u64);
    }

    /// Records skipped unknown entries.
    #[inline]
    pub fn unknown_packets(&self, n: usize) {
        bump(&self.unknown_packets, n as u64);
    }

    /// Records a handler fault.
    #[inline]
    pub fn handler_fault(&self) {
        bump(&self.handler_faults, 1);
    }

    /// Records a dropped group.
    #[inline]
    pub fn encode_failure(&self) {
        bump(&self.encode_failures, 1);
    }

    /// Copies the current counter values.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            frames_received: load(&self.frames_received),
            frames_ignored: load(&self.frames_ignored),
            frames_sent: load(&self.frames_sent),
            packets_queued: load(&self.packets_queued),
            packets_sent: load(&self.packets_sent),
            packets_received: load(&self.packets_received),
            unknown_packets: load(&self.unknown_packets),
            handler_faults: load(&self.handler_faults),
            encode_failures: load(&self.encode_failures),
        }
    }
}
