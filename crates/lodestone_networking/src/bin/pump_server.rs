//! # Pump Server
//!
//! Drives a set of in-memory sessions end to end: simulated peers send batch
//! frames, an echo identity answers every chat packet, and the event loop
//! coalesces the replies every tick.
//!
//! ## Usage
//!
//! ```bash
//! RUST_LOG=lodestone_networking=debug pump_server --clients 8 --duration 5 --config pump.toml
//! ```

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant};

use lodestone_networking::{
    BatchCodec, CompressionLevel, EventLoop, HandlerFault, Identity, MemoryTransport, Packet,
    PacketKind, PumpConfig, Session, TransportEvent, TransportState,
};
use tracing_subscriber::EnvFilter;

/// Answers every chat packet with a chat packet of its own.
struct EchoIdentity {
    name: String,
    session: Weak<Session>,
}

impl Identity for EchoIdentity {
    fn name(&self) -> &str {
        &self.name
    }

    fn protocol(&self) -> u32 {
        10
    }

    fn handle(&mut self, packet: &Packet) -> Result<(), HandlerFault> {
        if packet.kind() != Some(PacketKind::Text) {
            return Err(HandlerFault::Rejected(format!("unexpected {}", packet.name())));
        }
        if let Some(session) = self.session.upgrade() {
            session
                .enqueue_outbound(Packet::of_kind(PacketKind::Text, packet.payload().clone()))
                .map_err(|e| HandlerFault::Other(Box::new(e)))?;
        }
        Ok(())
    }
}

fn peer_frame(seq: u32, protocol: u32) -> Option<bytes::Bytes> {
    let mut chat = Packet::of_kind(PacketKind::Text, format!("hello #{seq}").into_bytes());
    chat.encode(protocol);
    let mut moved = Packet::of_kind(PacketKind::MovePlayer, seq.to_le_bytes().to_vec());
    moved.encode(protocol);
    BatchCodec::encode(&[chat, moved], CompressionLevel::FAST, protocol).ok()
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("╔══════════════════════════════════════════════════════════════════╗");
    println!("║         LODESTONE SESSION PUMP                                   ║");
    println!("╚══════════════════════════════════════════════════════════════════╝");
    println!();

    let args: Vec<String> = std::env::args().collect();
    let mut clients = 4usize;
    let mut duration_secs = 3u64;
    let mut config_path: Option<String> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--clients" | "-c" => {
                if i + 1 < args.len() {
                    clients = args[i + 1].parse().unwrap_or(4);
                    i += 1;
                }
            }
            "--duration" | "-d" => {
                if i + 1 < args.len() {
                    duration_secs = args[i + 1].parse().unwrap_or(3);
                    i += 1;
                }
            }
            "--config" => {
                if i + 1 < args.len() {
                    config_path = Some(args[i + 1].clone());
                    i += 1;
                }
            }
            "--help" | "-h" => {
                println!("Usage: pump_server [OPTIONS]");
                println!();
                println!("Options:");
                println!("  -c, --clients <NUM>     Simulated peers (default: 4)");
                println!("  -d, --duration <SECS>   Run for N seconds then exit (default: 3)");
                println!("      --config <PATH>     TOML pump configuration");
                println!("  -h, --help              Show this help");
                return;
            }
            _ => {}
        }
        i += 1;
    }

    let config = match config_path {
        Some(path) => match PumpConfig::load(&path) {
            Ok(config) => config,
            Err(e) => {
                tracing::error!(%path, error = %e, "invalid configuration");
                std::process::exit(1);
            }
        },
        None => PumpConfig::default(),
    };

    println!("┌─ CONFIGURATION ─────────────────────────────────────────────────┐");
    println!("│ Clients:            {clients}");
    println!("│ Duration:           {duration_secs} seconds");
    println!("│ Tick Interval:      {} ms", config.tick_interval_ms);
    println!("│ Compression Level:  {}", config.compression_level);
    println!("└─────────────────────────────────────────────────────────────────┘");
    println!();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_time()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            tracing::error!(error = %e, "failed to start runtime");
            std::process::exit(1);
        }
    };
    let driver = EventLoop::new(runtime.handle().clone(), config.tick_interval());

    let mut peers = Vec::with_capacity(clients);
    for n in 0..clients {
        let port = u16::try_from(20_000 + n).unwrap_or(u16::MAX);
        let addr = SocketAddr::from(([127, 0, 0, 1], port));
        let transport = Arc::new(MemoryTransport::new(addr, 10));
        let session = Arc::new(Session::new(&transport, &config));

        let identity = EchoIdentity {
            name: format!("Steve{n}"),
            session: Arc::downgrade(&session),
        };
        if let Err(e) = session.attach_identity(Box::new(identity)) {
            tracing::error!(%addr, error = %e, "failed to attach identity");
            continue;
        }

        let (handle, task) = driver.spawn(Arc::clone(&session));
        handle.deliver(TransportEvent::StateChanged(TransportState::Connected));
        peers.push((transport, session, handle, task));
    }

    // Simulation thread: drains every session at 20Hz
    let running = Arc::new(AtomicBool::new(true));
    let sessions: Vec<_> = peers.iter().map(|(_, s, _, _)| Arc::clone(s)).collect();
    let sim_running = Arc::clone(&running);
    let simulation = std::thread::spawn(move || {
        while sim_running.load(Ordering::Relaxed) {
            for session in &sessions {
                session.drain_inbound();
            }
            std::thread::sleep(Duration::from_millis(50));
        }
    });

    let start = Instant::now();
    let mut seq = 0u32;
    while start.elapsed() < Duration::from_secs(duration_secs) {
        for (_, session, handle, _) in &peers {
            if let Some(frame) = peer_frame(seq, session.protocol_version()) {
                handle.deliver(TransportEvent::Encapsulated(frame));
            }
        }
        seq += 1;
        std::thread::sleep(Duration::from_millis(20));
    }

    running.store(false, Ordering::Relaxed);
    if simulation.join().is_err() {
        tracing::error!("simulation thread panicked");
    }

    println!("┌─ RESULTS ───────────────────────────────────────────────────────┐");
    for (transport, session, _, _) in &peers {
        session.disconnect("Server closed");
        let stats = session.stats();
        println!(
            "│ {:<8} in: {:>5} pkts  out: {:>5} pkts in {:>4} frames  faults: {}",
            session.identity_name().unwrap_or("?"),
            stats.packets_received,
            stats.packets_sent,
            transport.sent_count(),
            stats.handler_faults,
        );
    }
    println!("└─────────────────────────────────────────────────────────────────┘");

    for (_, _, _, task) in peers {
        if let Err(e) = runtime.block_on(task) {
            tracing::warn!(error = %e, "session task ended abnormally");
        }
    }
}
