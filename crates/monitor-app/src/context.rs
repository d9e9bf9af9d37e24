//! # AppContext
//!
//! Design Notes §9 re-architects the original's process-wide
//! memory-pool/scheduler singletons as owned values passed into
//! sources at construction. `AppContext` is the convenience
//! "application context" that note allows for: it holds the
//! [`BlockPoolRegistry`] and [`Scheduler`] with explicit init/teardown,
//! and builds the [`monitor_wire::events::EventSink`] that routes a
//! source's `packetReady` events onto the scheduler as tasks.
//!
//! Nothing here is required to use `monitor-net`/`monitor-pool`/
//! `monitor-sched` directly — a caller embedding just one of them is
//! free to wire its own sinks instead.

use std::sync::Arc;

use monitor_net::events::SourceEvent;
use monitor_net::factory::Packet;
use monitor_pool::BlockPoolRegistry;
use monitor_sched::{Scheduler, SchedulerError, SchedulingPolicy};
use monitor_wire::events::EventSink;

/// Priority a routed packet-processing task runs at by default.
/// Neutral: neither starved behind control-plane work nor allowed to
/// preempt it.
pub const DEFAULT_PACKET_TASK_PRIORITY: i32 = 0;

/// Routes a source's `PacketReady` events onto a [`Scheduler`] as
/// tasks; logs everything else at a level matching its severity.
/// `consumer` is the downstream collaborator spec.md §1 calls out as
/// out of scope for this core — the "packet factory" that further
/// materialises the typed packet is already done by this point
/// (C8 ran inside the source); this is whatever runs *after* that.
pub struct PacketRouter {
    scheduler: Arc<Scheduler>,
    consumer: Arc<dyn Fn(Arc<Packet>) + Send + Sync>,
    priority: i32,
}

impl EventSink<SourceEvent> for PacketRouter {
    fn emit(&self, event: SourceEvent) {
        match event {
            SourceEvent::PacketReady(packet) => {
                let consumer = self.consumer.clone();
                // A full scheduler here is dropped packet processing,
                // not a dropped packet: the source has already counted
                // it as received. Spec.md doesn't define a distinct
                // counter for this, so it's logged rather than
                // silently absorbed.
                if self.scheduler.submit(self.priority, Box::new(move || consumer(packet))).is_err() {
                    tracing::warn!("scheduler rejected a packet-processing task, dropping it");
                }
            }
            SourceEvent::Error { kind, message } => {
                tracing::error!(%kind, %message, "packet source error");
            }
            SourceEvent::StatisticsUpdated(snapshot) => {
                tracing::debug!(?snapshot, "source statistics tick");
            }
            SourceEvent::SocketStateChanged(state) => {
                tracing::info!(%state, "socket state changed");
            }
            SourceEvent::MulticastStatusChanged(joined) => {
                tracing::info!(joined, "multicast status changed");
            }
            SourceEvent::Connected => tracing::info!("source connected"),
            SourceEvent::Disconnected => tracing::info!("source disconnected"),
            SourceEvent::ConnectionFailed => tracing::warn!("source connection failed"),
        }
    }
}

/// Owns the shared block-pool registry and scheduler a set of packet
/// sources are built against. Not a singleton — a process embedding
/// the core more than once (e.g. a test harness) can construct more
/// than one.
pub struct AppContext {
    pool_registry: Arc<BlockPoolRegistry>,
    scheduler: Arc<Scheduler>,
}

impl AppContext {
    /// `num_workers == 0` auto-sizes the scheduler to
    /// `hardware_concurrency()`, matching `Scheduler::initialize`.
    pub fn new(num_workers: usize) -> Result<Self, SchedulerError> {
        Self::with_policy(num_workers, SchedulingPolicy::WorkStealing)
    }

    pub fn with_policy(num_workers: usize, policy: SchedulingPolicy) -> Result<Self, SchedulerError> {
        let scheduler = Arc::new(Scheduler::new());
        scheduler.initialize(num_workers)?;
        scheduler.set_scheduling_policy(policy);
        Ok(AppContext {
            pool_registry: Arc::new(BlockPoolRegistry::new()),
            scheduler,
        })
    }

    pub fn pool_registry(&self) -> &Arc<BlockPoolRegistry> {
        &self.pool_registry
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn start(&self) -> Result<(), SchedulerError> {
        self.scheduler.start()
    }

    pub fn shutdown(&self) {
        self.scheduler.shutdown();
    }

    /// Builds the event sink a `UdpSource`/`TcpSource` should be
    /// constructed with to have its decoded packets run through
    /// `consumer` on the worker pool, at `priority`.
    pub fn packet_router(
        &self,
        consumer: Arc<dyn Fn(Arc<Packet>) + Send + Sync>,
        priority: i32,
    ) -> Box<dyn EventSink<SourceEvent> + Send + Sync> {
        Box::new(PacketRouter {
            scheduler: self.scheduler.clone(),
            consumer,
            priority,
        })
    }
}

impl Drop for AppContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_net::config::NetworkConfig;
    use monitor_net::source::PacketSource;
    use monitor_net::udp::UdpSource;
    use std::net::Ipv4Addr;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::factory::SimplePacketFactory;

    #[test]
    fn routed_packets_reach_the_consumer_via_the_scheduler() {
        let ctx = AppContext::new(2).unwrap();
        ctx.start().unwrap();

        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = received.clone();
        let consumer: Arc<dyn Fn(Arc<Packet>) + Send + Sync> =
            Arc::new(move |_packet| {
                received_clone.fetch_add(1, Ordering::SeqCst);
            });

        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let port = socket.local_addr().unwrap().port();
        drop(socket);

        let config = NetworkConfig::udp("ctx-test", Ipv4Addr::LOCALHOST, port);
        let sink = ctx.packet_router(consumer, DEFAULT_PACKET_TASK_PRIORITY);
        let source = UdpSource::new(config, Arc::new(SimplePacketFactory), sink);
        source.start().unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let send_sock = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        let header = monitor_wire::PacketHeader::new(1, 0, 0, 5);
        let mut datagram = Vec::new();
        header.encode(&mut datagram);
        datagram.extend_from_slice(b"hello");
        send_sock.send_to(&datagram, (Ipv4Addr::LOCALHOST, port)).unwrap();

        std::thread::sleep(Duration::from_millis(150));
        source.stop();
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }
}
