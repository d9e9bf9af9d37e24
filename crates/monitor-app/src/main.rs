//! Demo binary for the packet monitoring ingestion core.
//!
//! Wires a [`monitor_app::AppContext`] (block-pool registry + worker
//! scheduler) to a loopback [`monitor_net::UdpSource`] fed by a
//! [`monitor_app::PooledPacketFactory`], sends a handful of synthetic
//! packets to itself, and prints the resulting statistics snapshot —
//! the same loopback shape as the UDP round-trip scenario the core's
//! test suite checks, run here as an end-to-end smoke demo rather than
//! an assertion.

use std::net::Ipv4Addr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use monitor_app::{AppContext, PooledPacketFactory, DEFAULT_PACKET_TASK_PRIORITY};
use monitor_net::config::NetworkConfig;
use monitor_net::source::PacketSource;
use monitor_net::udp::UdpSource;
use monitor_wire::PacketHeader;
use tracing_subscriber::EnvFilter;

const PACKET_COUNT: u32 = 10;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let ctx = AppContext::new(4).map_err(|e| anyhow::anyhow!("scheduler init failed: {e}"))?;
    ctx.start().map_err(|e| anyhow::anyhow!("scheduler start failed: {e}"))?;

    let pool = ctx
        .pool_registry()
        .create_pool("packets", 4096, 256, Box::new(monitor_wire::events::NullSink))
        .map_err(|e| anyhow::anyhow!("pool creation failed: {e}"))?;
    let factory = Arc::new(PooledPacketFactory::new(pool));

    let processed = Arc::new(AtomicU32::new(0));
    let processed_clone = processed.clone();
    let consumer: Arc<dyn Fn(Arc<monitor_net::factory::Packet>) + Send + Sync> =
        Arc::new(move |packet| {
            let n = processed_clone.fetch_add(1, Ordering::SeqCst) + 1;
            tracing::info!(
                id = packet.header.id,
                sequence = packet.header.sequence,
                payload_len = packet.payload.len(),
                processed = n,
                "packet processed"
            );
        });

    // Bind to an OS-assigned port by probing one, the same way the
    // test suite picks a free loopback port for S1.
    let probe = std::net::UdpSocket::bind("127.0.0.1:0")?;
    let port = probe.local_addr()?.port();
    drop(probe);

    let config = NetworkConfig::udp("demo", Ipv4Addr::LOCALHOST, port);
    let sink = ctx.packet_router(consumer, DEFAULT_PACKET_TASK_PRIORITY);
    let source = UdpSource::new(config, factory, sink);
    source.start().map_err(|e| anyhow::anyhow!("udp source start failed: {e}"))?;
    std::thread::sleep(Duration::from_millis(50));

    let send_socket = std::net::UdpSocket::bind("127.0.0.1:0")?;
    for i in 0..PACKET_COUNT {
        let payload = format!("Test packet {i}");
        let header = PacketHeader::new(1000 + i, i, now_ns(), payload.len() as u32);
        let mut datagram = Vec::with_capacity(header.total_len());
        header.encode(&mut datagram);
        datagram.extend_from_slice(payload.as_bytes());
        send_socket.send_to(&datagram, (Ipv4Addr::LOCALHOST, port))?;
    }

    std::thread::sleep(Duration::from_millis(300));
    source.stop();

    let snapshot = source.statistics();
    tracing::info!(
        packets_received = snapshot.packets_received,
        packets_dropped = snapshot.packets_dropped,
        packet_errors = snapshot.packet_errors,
        average_latency_us = snapshot.average_latency_us,
        pool_utilization = ctx.pool_registry().aggregate_utilization(),
        tasks_processed = ctx.scheduler().get_total_tasks_processed(),
        "demo run complete"
    );

    ctx.shutdown();
    Ok(())
}

fn now_ns() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
