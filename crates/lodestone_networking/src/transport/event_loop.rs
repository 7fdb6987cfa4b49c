//! # Event Loop Driver
//!
//! Runs each session on a tokio task that stands in for the transport's
//! per-connection event loop: transport callbacks and the periodic tick are
//! processed one at a time, so a session never sees them concurrently.
//!
//! ```text
//!  SessionHandle::deliver ──► mpsc ──┐
//!                                    ├──► select! ──► Session
//!  interval(tick_interval) ──────────┤
//!  cancel (Notify) ──────────────────┘    (biased: cancel wins)
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::{DisconnectReason, TickSchedule, TransportEvent};
use crate::server::Session;

/// Cancellation handle installed on the session.
struct TaskSchedule {
    cancelled: AtomicBool,
    notify: Notify,
}

impl TaskSchedule {
    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

impl TickSchedule for Arc<TaskSchedule> {
    fn cancel(&self) {
        if !self.cancelled.swap(true, Ordering::AcqRel) {
            // Stores a permit if the task is not parked on `notified` yet.
            self.notify.notify_one();
        }
    }
}

/// Feeds transport callbacks to one session's task.
#[derive(Clone, Debug)]
pub struct SessionHandle {
    events: mpsc::UnboundedSender<TransportEvent>,
}

impl SessionHandle {
    /// Delivers a transport callback. Returns false once the session task has
    /// stopped.
    pub fn deliver(&self, event: TransportEvent) -> bool {
        self.events.send(event).is_ok()
    }

    /// Returns true once the session task has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.events.is_closed()
    }
}

/// Spawns one task per session on a tokio runtime.
#[derive(Clone, Debug)]
pub struct EventLoop {
    runtime: Handle,
    tick_interval: Duration,
}

impl EventLoop {
    /// Creates a driver that ticks every session each `tick_interval`.
    #[must_use]
    pub const fn new(runtime: Handle, tick_interval: Duration) -> Self {
        Self {
            runtime,
            tick_interval,
        }
    }

    /// Tick period.
    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    /// Starts driving `session`.
    ///
    /// Installs the tick schedule on the session, so `Session::disconnect`
    /// stops the task. Dropping every [`SessionHandle`] disconnects the
    /// session and stops the task. The first tick fires one interval after
    /// spawning.
    pub fn spawn(&self, session: Arc<Session>) -> (SessionHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let schedule = Arc::new(TaskSchedule {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        });
        session.set_schedule(Box::new(Arc::clone(&schedule)));

        let period = self.tick_interval;
        let task = self.runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            let remote = session.remote_addr();
            tracing::debug!(%remote, ?period, "session task started");

            while !schedule.is_cancelled() {
                tokio::select! {
                    biased;
                    () = schedule.notify.notified() => break,
                    event = rx.recv() => match event {
                        Some(event) => session.on_transport_event(event),
                        None => {
                            session.disconnect(DisconnectReason::Other.message());
                            break;
                        }
                    },
                    _ = ticker.tick() => session.tick(),
                }
            }

            tracing::debug!(%remote, "session task stopped");
        });

        (SessionHandle { events: tx }, task)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PumpConfig;
    use crate::protocol::{Packet, PacketKind};
    use crate::server::SessionState;
    use crate::transport::MemoryTransport;

    #[test]
    fn test_cancel_is_idempotent() {
        let schedule = Arc::new(TaskSchedule {
            cancelled: AtomicBool::new(false),
            notify: Notify::new(),
        });
        schedule.cancel();
        schedule.cancel();
        assert!(schedule.is_cancelled());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_ticks_flush_outbound() {
        let transport = Arc::new(MemoryTransport::new("127.0.0.1:19132".parse().unwrap(), 10));
        let session = Arc::new(Session::new(&transport, &PumpConfig::default()));
        let driver = EventLoop::new(Handle::current(), Duration::from_millis(10));
        let (handle, task) = driver.spawn(Arc::clone(&session));

        session
            .enqueue_outbound(Packet::of_kind(PacketKind::Text, &b"hello"[..]))
            .unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        while transport.sent_count() == 0 && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(transport.sent_count(), 1);

        assert!(handle.deliver(TransportEvent::Disconnected(DisconnectReason::TimedOut)));
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(handle.is_closed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_dropped_handles_close_session() {
        let transport = Arc::new(MemoryTransport::new("127.0.0.1:19133".parse().unwrap(), 10));
        let session = Arc::new(Session::new(&transport, &PumpConfig::default()));
        let driver = EventLoop::new(Handle::current(), Duration::from_millis(10));
        let (handle, task) = driver.spawn(Arc::clone(&session));

        drop(handle);
        tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(
            session.disconnect_reason().as_deref(),
            Some("Disconnected from Server")
        );

        // Schedule was cancelled, so later packets never leave
        session
            .enqueue_outbound(Packet::of_kind(PacketKind::Text, &b"late"[..]))
            .unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(transport.sent_count(), 0);
    }
}
