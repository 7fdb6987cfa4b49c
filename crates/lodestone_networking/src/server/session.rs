//! # Session Pump
//!
//! One connection's queues, lifecycle and periodic flush.
//!
//! ## Threads
//!
//! ```text
//!  transport event loop              simulation thread(s)
//!  ────────────────────              ────────────────────
//!  on_raw_frame ──► InboundQueue ──► drain_inbound ──► Identity::handle
//!  tick ◄── OutboundQueue ◄──────────────────────────── enqueue_outbound
//!   └──► BatchCodec ──► TransportSession::send
//! ```
//!
//! `tick` and `on_raw_frame` run serialized on the transport's event loop for
//! a given session. `enqueue_outbound`, `drain_inbound` and `disconnect` may
//! be called from any thread.
//!
//! ## Lifecycle
//!
//! `Unidentified → Identified → Disconnecting → Closed`, never backwards.
//! Every transmission happens under a read lock on the lifecycle and
//! `disconnect` takes the write lock, so once `disconnect` returns nothing
//! else reaches the transport.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{OnceLock, Weak};

use bytes::Bytes;
use parking_lot::{Mutex, RwLock};

use super::queue::{InboundQueue, OutboundQueue};
use super::stats::{SessionStats, StatsSnapshot};
use crate::config::PumpConfig;
use crate::error::{SessionError, SessionResult};
use crate::integration::Identity;
use crate::protocol::{
    BatchCodec, BatchLimits, CompressionLevel, CompressionScheme, Outbound, Packet, BATCH_MARKER,
};
use crate::transport::{TickSchedule, TransportEvent, TransportSession};

/// Disconnect reason recorded when a peer sends an undecodable frame.
pub const MALFORMED_PACKET_REASON: &str = "Sent malformed packet";

/// Lifecycle of a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    /// Connected, no game entity bound yet.
    Unidentified = 0,
    /// A game entity is bound; frames are decoded through the registry.
    Identified = 1,
    /// Disconnect in progress.
    Disconnecting = 2,
    /// Schedule cancelled. Terminal.
    Closed = 3,
}

impl SessionState {
    /// Returns true once the session is shutting down or gone.
    #[inline]
    #[must_use]
    pub const fn is_closing(self) -> bool {
        matches!(self, Self::Disconnecting | Self::Closed)
    }
}

struct Lifecycle {
    state: SessionState,
    reason: Option<String>,
}

/// What the transport loop needs to know about the bound identity without
/// touching the identity itself.
struct BoundIdentity {
    name: String,
    protocol: u32,
}

/// Per-connection session pump.
pub struct Session {
    remote: SocketAddr,
    protocol: u32,
    scheme: CompressionScheme,
    limits: BatchLimits,
    compression_level: AtomicU32,
    lifecycle: RwLock<Lifecycle>,
    identity: Mutex<Option<Box<dyn Identity>>>,
    bound: OnceLock<BoundIdentity>,
    inbound: InboundQueue,
    outbound: OutboundQueue,
    /// Scratch buffer for the run being coalesced; only `tick` touches it.
    pending: Mutex<Vec<Packet>>,
    schedule: Mutex<Option<Box<dyn TickSchedule>>>,
    transport: Weak<dyn TransportSession>,
    stats: SessionStats,
}

impl Session {
    /// Creates a session for a freshly contacted peer.
    ///
    /// The protocol version, and with it the compression scheme, is read from
    /// the transport once and never changes afterwards.
    #[must_use]
    pub fn new<T: TransportSession + 'static>(
        transport: &std::sync::Arc<T>,
        config: &PumpConfig,
    ) -> Self {
        let protocol = transport.protocol_version();
        let remote = transport.remote_addr();
        let weak: Weak<T> = std::sync::Arc::downgrade(transport);
        let transport: Weak<dyn TransportSession> = weak;

        tracing::debug!(%remote, protocol, "session created");

        Self {
            remote,
            protocol,
            scheme: CompressionScheme::for_protocol(protocol),
            limits: config.limits(),
            compression_level: AtomicU32::new(config.level().get()),
            lifecycle: RwLock::new(Lifecycle {
                state: SessionState::Unidentified,
                reason: None,
            }),
            identity: Mutex::new(None),
            bound: OnceLock::new(),
            inbound: InboundQueue::new(),
            outbound: OutboundQueue::new(config.outbound_capacity),
            pending: Mutex::new(Vec::with_capacity(64)),
            schedule: Mutex::new(None),
            transport,
            stats: SessionStats::default(),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Remote peer address.
    #[inline]
    #[must_use]
    pub const fn remote_addr(&self) -> SocketAddr {
        self.remote
    }

    /// Negotiated protocol version.
    #[inline]
    #[must_use]
    pub const fn protocol_version(&self) -> u32 {
        self.protocol
    }

    /// Compression scheme fixed for this session.
    #[inline]
    #[must_use]
    pub const fn compression_scheme(&self) -> CompressionScheme {
        self.scheme
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.lifecycle.read().state
    }

    /// Returns true until the session starts disconnecting.
    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.state().is_closing()
    }

    /// Reason given to the first `disconnect` call.
    #[must_use]
    pub fn disconnect_reason(&self) -> Option<String> {
        self.lifecycle.read().reason.clone()
    }

    /// Name of the bound identity.
    #[must_use]
    pub fn identity_name(&self) -> Option<&str> {
        self.bound.get().map(|b| b.name.as_str())
    }

    /// Compression level the next tick will use.
    #[must_use]
    pub fn compression_level(&self) -> CompressionLevel {
        CompressionLevel::new(self.compression_level.load(Ordering::Relaxed)).unwrap_or_default()
    }

    /// Changes the compression level. Takes effect at the next tick; the
    /// scheme itself never changes.
    pub fn set_compression_level(&self, level: CompressionLevel) {
        self.compression_level.store(level.get(), Ordering::Relaxed);
    }

    /// Packets waiting for the simulation.
    #[must_use]
    pub fn inbound_len(&self) -> usize {
        self.inbound.len()
    }

    /// Items waiting for the next tick.
    #[must_use]
    pub fn outbound_len(&self) -> usize {
        self.outbound.len()
    }

    /// Counter snapshot.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Installs the periodic tick handle so `disconnect` can cancel it.
    ///
    /// A session that is already closed cancels the handle immediately.
    pub fn set_schedule(&self, schedule: Box<dyn TickSchedule>) {
        let lifecycle = self.lifecycle.read();
        if lifecycle.state.is_closing() {
            schedule.cancel();
            return;
        }
        *self.schedule.lock() = Some(schedule);
    }

    // =========================================================================
    // Simulation side
    // =========================================================================

    /// Binds the session to a game entity.
    ///
    /// From now on inbound frames are resolved through the packet registry
    /// against the identity's protocol.
    pub fn attach_identity(&self, identity: Box<dyn Identity>) -> SessionResult<()> {
        let mut lifecycle = self.lifecycle.write();
        if lifecycle.state != SessionState::Unidentified {
            return Err(SessionError::InvalidState {
                expected: SessionState::Unidentified,
                actual: lifecycle.state,
            });
        }

        let name = identity.name().to_owned();
        let protocol = identity.protocol();
        // Unidentified implies nothing was bound before.
        let _ = self.bound.set(BoundIdentity {
            name: name.clone(),
            protocol,
        });
        *self.identity.lock() = Some(identity);
        lifecycle.state = SessionState::Identified;

        tracing::info!(remote = %self.remote, identity = %name, protocol, "identity attached");
        Ok(())
    }

    /// Queues a packet or pre-built batch for the next tick.
    ///
    /// Single packets are encoded here, for the session's negotiated protocol
    /// unless one was pinned. Does nothing once the session is closing.
    pub fn enqueue_outbound(&self, item: impl Into<Outbound>) -> SessionResult<()> {
        let lifecycle = self.lifecycle.read();
        if lifecycle.state.is_closing() {
            tracing::trace!(remote = %self.remote, "dropping outbound packet for closed session");
            return Ok(());
        }

        let item = match item.into() {
            Outbound::Single(mut packet) => {
                packet.encode(self.protocol);
                Outbound::Single(packet)
            }
            batch @ Outbound::Batch(_) => batch,
        };
        self.outbound.push(item)?;
        self.stats.packet_queued();
        Ok(())
    }

    /// Hands every queued inbound packet to the bound identity.
    ///
    /// A fault from one packet is logged and the drain continues. Returns the
    /// number of packets handled; zero while no identity is bound.
    pub fn drain_inbound(&self) -> usize {
        let mut guard = self.identity.lock();
        let Some(identity) = guard.as_mut() else {
            return 0;
        };

        let mut handled = 0;
        while let Some(packet) = self.inbound.pop() {
            if let Err(fault) = identity.handle(&packet) {
                self.stats.handler_fault();
                tracing::error!(
                    packet = %packet.name(),
                    identity = identity.name(),
                    error = %fault,
                    "an error occurred whilst handling packet"
                );
            }
            handled += 1;
        }
        handled
    }

    // =========================================================================
    // Transport side
    // =========================================================================

    /// Entry point for every transport callback.
    pub fn on_transport_event(&self, event: TransportEvent) {
        match event {
            TransportEvent::StateChanged(state) => {
                tracing::trace!(remote = %self.remote, ?state, "transport state changed");
            }
            TransportEvent::Disconnected(reason) => self.disconnect(reason.message()),
            TransportEvent::Encapsulated(frame) => self.on_raw_frame(&frame),
            TransportEvent::Direct(_) => {
                tracing::trace!(remote = %self.remote, "ignoring direct payload");
            }
        }
    }

    /// Handles one encapsulated transport message.
    ///
    /// Messages without the batch marker are noise and ignored. A frame that
    /// fails to decode disconnects the session and delivers nothing.
    pub fn on_raw_frame(&self, frame: &[u8]) {
        if frame.first() != Some(&BATCH_MARKER) {
            self.stats.frame_ignored();
            tracing::trace!(remote = %self.remote, len = frame.len(), "ignoring non-batch frame");
            return;
        }

        if self.state().is_closing() {
            return;
        }
        self.stats.frame_received();

        let entries = match BatchCodec::decode_with_limits(frame, self.protocol, self.limits) {
            Ok(entries) => entries,
            Err(err) => {
                tracing::error!(remote = %self.remote, error = %err, "unable to process batch packet");
                self.disconnect(MALFORMED_PACKET_REASON);
                return;
            }
        };

        // Held across the pushes so nothing is queued once `disconnect` returns.
        let lifecycle = self.lifecycle.read();
        if lifecycle.state.is_closing() {
            tracing::trace!(remote = %self.remote, "dropping batch for closed session");
            return;
        }

        match self.bound.get() {
            Some(bound) if lifecycle.state == SessionState::Identified => {
                let batch = BatchCodec::decode_packets(entries, bound.protocol);
                self.stats.unknown_packets(batch.unknown);
                self.stats.packets_received(batch.packets.len());
                for packet in batch.packets {
                    self.inbound.push(packet);
                }
            }
            _ => self.queue_raw(entries),
        }
    }

    /// Queues entries as-is until an identity can interpret them.
    ///
    /// Callers hold the lifecycle read lock.
    fn queue_raw(&self, entries: Vec<Bytes>) {
        let mut queued = 0;
        let mut empty = 0;
        for entry in entries {
            match Packet::from_wire(entry, self.protocol) {
                Some(packet) => {
                    self.inbound.push(packet);
                    queued += 1;
                }
                None => empty += 1,
            }
        }
        self.stats.packets_received(queued);
        self.stats.unknown_packets(empty);
    }

    /// Periodic flush, invoked every tick interval by the event loop.
    ///
    /// Drains the outbound queue, coalescing consecutive single packets into
    /// one frame. A pre-built batch flushes the pending run first and then
    /// goes out on its own. A group that fails to encode is logged and
    /// dropped; the tick carries on.
    pub fn tick(&self) {
        if !self.is_open() {
            return;
        }
        // One level for the whole tick, even if it is changed meanwhile.
        let level = self.compression_level();

        let mut pending = self.pending.lock();
        let mut frames = 0usize;
        while let Some(item) = self.outbound.pop() {
            match item {
                Outbound::Single(packet) => pending.push(packet),
                Outbound::Batch(frame) => {
                    frames += usize::from(self.flush(&mut pending, level));
                    frames += usize::from(self.transmit(frame.to_wire()));
                }
            }
        }
        frames += usize::from(self.flush(&mut pending, level));

        if frames > 0 {
            tracing::debug!(remote = %self.remote, frames, level = level.get(), "outbound flushed");
        }
    }

    /// Sends the pending run as one frame. Returns whether a frame went out.
    fn flush(&self, pending: &mut Vec<Packet>, level: CompressionLevel) -> bool {
        if pending.is_empty() {
            return false;
        }

        let sent = match BatchCodec::encode(pending, level, self.protocol) {
            Ok(frame) => {
                let sent = self.transmit(frame);
                if sent {
                    self.stats.packets_sent(pending.len());
                }
                sent
            }
            Err(err) => {
                self.stats.encode_failure();
                tracing::error!(
                    remote = %self.remote,
                    packets = pending.len(),
                    error = %err,
                    "unable to compress batched packets"
                );
                false
            }
        };
        pending.clear();
        sent
    }

    /// Hands one frame to the transport unless the session is closing.
    fn transmit(&self, frame: Bytes) -> bool {
        let lifecycle = self.lifecycle.read();
        if lifecycle.state.is_closing() {
            return false;
        }
        let Some(transport) = self.transport.upgrade() else {
            tracing::debug!(remote = %self.remote, "transport gone, frame dropped");
            return false;
        };
        transport.send(frame);
        self.stats.frame_sent();
        true
    }

    /// Closes the session.
    ///
    /// Cancels the periodic tick, records `reason` and discards anything still
    /// queued outbound. Only the first call has an effect; once it returns no
    /// further frame is sent and no further packet is queued.
    pub fn disconnect(&self, reason: &str) {
        let dropped = {
            let mut lifecycle = self.lifecycle.write();
            if lifecycle.state.is_closing() {
                return;
            }
            lifecycle.state = SessionState::Disconnecting;
            lifecycle.reason = Some(reason.to_owned());

            if let Some(schedule) = self.schedule.lock().take() {
                schedule.cancel();
            }
            let dropped = self.outbound.clear();
            lifecycle.state = SessionState::Closed;
            dropped
        };

        tracing::info!(
            remote = %self.remote,
            identity = self.identity_name(),
            reason,
            dropped,
            "session closed"
        );
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("remote", &self.remote)
            .field("protocol", &self.protocol)
            .field("state", &self.state())
            .field("identity", &self.identity_name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HandlerFault;
    use crate::protocol::{BatchFrame, PacketKind};
    use crate::transport::{DisconnectReason, MemoryTransport, TransportState};
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    struct Recorder {
        seen: Arc<Mutex<Vec<u8>>>,
    }

    impl Identity for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn protocol(&self) -> u32 {
            10
        }

        fn handle(&mut self, packet: &Packet) -> Result<(), HandlerFault> {
            self.seen.lock().push(packet.id());
            Ok(())
        }
    }

    struct FlagSchedule(Arc<AtomicBool>);

    impl TickSchedule for FlagSchedule {
        fn cancel(&self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    fn setup(protocol: u32) -> (Arc<MemoryTransport>, Session) {
        let transport = Arc::new(MemoryTransport::new(
            "10.0.0.1:19132".parse().unwrap(),
            protocol,
        ));
        let session = Session::new(&transport, &PumpConfig::default());
        (transport, session)
    }

    fn frame(packets: &[(PacketKind, &'static [u8])], protocol: u32) -> Bytes {
        let packets: Vec<_> = packets
            .iter()
            .map(|&(kind, body)| {
                let mut p = Packet::of_kind(kind, body);
                p.encode(protocol);
                p
            })
            .collect();
        BatchCodec::encode(&packets, CompressionLevel::DEFAULT, protocol).unwrap()
    }

    #[test]
    fn test_new_session_is_unidentified() {
        let (_, session) = setup(10);
        assert_eq!(session.state(), SessionState::Unidentified);
        assert_eq!(session.compression_scheme(), CompressionScheme::RawDeflate);
        assert_eq!(session.compression_level(), CompressionLevel::DEFAULT);
        assert!(session.disconnect_reason().is_none());
        assert!(session.identity_name().is_none());
    }

    #[test]
    fn test_scheme_follows_protocol() {
        let (_, session) = setup(9);
        assert_eq!(session.compression_scheme(), CompressionScheme::Zlib);
    }

    #[test]
    fn test_attach_identity_once() {
        let (_, session) = setup(10);
        let seen = Arc::new(Mutex::new(Vec::new()));
        session
            .attach_identity(Box::new(Recorder { seen: Arc::clone(&seen) }))
            .unwrap();
        assert_eq!(session.state(), SessionState::Identified);
        assert_eq!(session.identity_name(), Some("recorder"));

        let again = session.attach_identity(Box::new(Recorder { seen }));
        assert!(matches!(
            again,
            Err(SessionError::InvalidState {
                expected: SessionState::Unidentified,
                actual: SessionState::Identified,
            })
        ));
    }

    #[test]
    fn test_enqueue_encodes_with_session_protocol() {
        let (transport, session) = setup(10);
        session
            .enqueue_outbound(Packet::of_kind(PacketKind::Text, &b"hi"[..]))
            .unwrap();
        assert_eq!(session.outbound_len(), 1);

        session.tick();
        let sent = transport.take_sent();
        assert_eq!(sent.len(), 1);
        let entries = BatchCodec::decode(&sent[0], 10).unwrap();
        assert_eq!(&entries[0][..], b"\x09hi");
        assert_eq!(session.stats().packets_sent, 1);
    }

    #[test]
    fn test_tick_with_empty_queue_sends_nothing() {
        let (transport, session) = setup(10);
        session.tick();
        assert_eq!(transport.sent_count(), 0);
    }

    #[test]
    fn test_prebuilt_batch_sent_verbatim() {
        let (transport, session) = setup(10);
        let frame = BatchFrame::from_compressed(vec![0xAAu8, 0xBB]);
        session.enqueue_outbound(frame.clone()).unwrap();
        session.tick();
        assert_eq!(transport.take_sent(), vec![frame.to_wire()]);
    }

    #[test]
    fn test_unidentified_frames_queue_raw() {
        let (_, session) = setup(10);
        // 0xEE is not registered but still queued raw before identification
        let bytes = frame(&[(PacketKind::Login, &b"chain"[..]), (PacketKind::Text, &b"x"[..])], 10);
        session.on_raw_frame(&bytes);
        let mut raw = Packet::new(0xEE, &b"?"[..]);
        raw.encode(10);
        let unknown = BatchCodec::encode(&[raw], CompressionLevel::DEFAULT, 10).unwrap();
        session.on_raw_frame(&unknown);

        assert_eq!(session.inbound_len(), 3);
        assert_eq!(session.stats().unknown_packets, 0);
        // Nothing to hand them to yet
        assert_eq!(session.drain_inbound(), 0);
        assert_eq!(session.inbound_len(), 3);
    }

    #[test]
    fn test_identified_frames_skip_unknown_ids() {
        let (_, session) = setup(10);
        let seen = Arc::new(Mutex::new(Vec::new()));
        session
            .attach_identity(Box::new(Recorder { seen: Arc::clone(&seen) }))
            .unwrap();

        let mut packets = Vec::new();
        for id in [0x09u8, 0xEE, 0x15] {
            let mut p = Packet::new(id, &b"body"[..]);
            p.encode(10);
            packets.push(p);
        }
        let bytes = BatchCodec::encode(&packets, CompressionLevel::DEFAULT, 10).unwrap();
        session.on_raw_frame(&bytes);

        assert_eq!(session.inbound_len(), 2);
        assert_eq!(session.stats().unknown_packets, 1);
        assert_eq!(session.drain_inbound(), 2);
        assert_eq!(*seen.lock(), vec![0x09, 0x15]);
        assert!(session.is_open());
    }

    #[test]
    fn test_queued_raw_packets_drain_after_attach() {
        let (_, session) = setup(10);
        session.on_raw_frame(&frame(&[(PacketKind::Login, &b"chain"[..])], 10));

        let seen = Arc::new(Mutex::new(Vec::new()));
        session
            .attach_identity(Box::new(Recorder { seen: Arc::clone(&seen) }))
            .unwrap();
        assert_eq!(session.drain_inbound(), 1);
        assert_eq!(*seen.lock(), vec![PacketKind::Login.id()]);
    }

    #[test]
    fn test_transport_events() {
        let (_, session) = setup(10);
        session.on_transport_event(TransportEvent::StateChanged(TransportState::Connected));
        session.on_transport_event(TransportEvent::Direct(Bytes::from_static(b"\xFEraw")));
        assert_eq!(session.inbound_len(), 0);
        assert!(session.is_open());

        session.on_transport_event(TransportEvent::Encapsulated(frame(
            &[(PacketKind::Text, &b"a"[..])],
            10,
        )));
        assert_eq!(session.inbound_len(), 1);

        session.on_transport_event(TransportEvent::Disconnected(DisconnectReason::TimedOut));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.disconnect_reason().as_deref(), Some("Timed out"));
    }

    #[test]
    fn test_peer_close_reason() {
        let (_, session) = setup(10);
        session.on_transport_event(TransportEvent::Disconnected(DisconnectReason::ClosedByPeer));
        assert_eq!(
            session.disconnect_reason().as_deref(),
            Some("Disconnected from Server")
        );
    }

    #[test]
    fn test_disconnect_cancels_schedule_and_drops_outbound() {
        let (transport, session) = setup(10);
        let cancelled = Arc::new(AtomicBool::new(false));
        session.set_schedule(Box::new(FlagSchedule(Arc::clone(&cancelled))));

        session
            .enqueue_outbound(Packet::of_kind(PacketKind::Text, &b"late"[..]))
            .unwrap();
        session.disconnect("Server closed");

        assert!(cancelled.load(Ordering::SeqCst));
        assert_eq!(session.outbound_len(), 0);
        session.tick();
        assert_eq!(transport.sent_count(), 0);

        session
            .enqueue_outbound(Packet::of_kind(PacketKind::Text, &b"later"[..]))
            .unwrap();
        assert_eq!(session.outbound_len(), 0);
    }

    #[test]
    fn test_schedule_set_after_close_is_cancelled() {
        let (_, session) = setup(10);
        session.disconnect("gone");
        let cancelled = Arc::new(AtomicBool::new(false));
        session.set_schedule(Box::new(FlagSchedule(Arc::clone(&cancelled))));
        assert!(cancelled.load(Ordering::SeqCst));
    }

    #[test]
    fn test_attach_after_close_fails() {
        let (_, session) = setup(10);
        session.disconnect("gone");
        let seen = Arc::new(Mutex::new(Vec::new()));
        assert!(matches!(
            session.attach_identity(Box::new(Recorder { seen })),
            Err(SessionError::InvalidState { actual: SessionState::Closed, .. })
        ));
    }

    #[test]
    fn test_dropped_transport_sends_nothing() {
        let (transport, session) = setup(10);
        drop(transport);
        session
            .enqueue_outbound(Packet::of_kind(PacketKind::Text, &b"x"[..]))
            .unwrap();
        session.tick();
        assert_eq!(session.stats().frames_sent, 0);
        assert!(session.is_open());
    }
}
