//! # UdpSource (C6)
//!
//! Datagram reception, optional multicast join, framing, and rate
//! limiting, translated from `udp_source.cpp`'s Qt event-driven design
//! into a single dedicated receive thread that blocks on the socket
//! with a short read timeout — the timeout wakeup stands in for the
//! original's `readyRead` signal plus its 1s `QTimer` statistics tick,
//! since there's no host event loop to hang callbacks off of here
//! (Design Notes §9: no framework event loop).

use std::mem::MaybeUninit;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use quanta::Instant;
use socket2::{Domain, Protocol as SockProtocol, Socket, Type};

use monitor_wire::events::EventSink;
use monitor_wire::ErrorKind;

use crate::config::{NetworkConfig, Protocol};
use crate::error::NetError;
use crate::events::SourceEvent;
use crate::factory::PacketFactory;
use crate::state::{SocketState, SourceState};
use crate::stats::{NetworkStatistics, NetworkStatisticsSnapshot};

/// Successive datagram-level read failures tolerated before the source
/// escalates to `Error` and stops ingesting. Matches the original's
/// off-by-one: the escalation fires on the 11th, not the 10th.
const MAX_CONSECUTIVE_ERRORS: u32 = 10;

const STATISTICS_UPDATE_INTERVAL: Duration = Duration::from_millis(1000);
const RATE_LIMIT_WINDOW_MS: u64 = 100;
const SOCKET_POLL_TIMEOUT: Duration = Duration::from_millis(100);
/// Largest UDP datagram the OS can deliver; the receive buffer is sized
/// to this regardless of `max_packet_size` so an oversized datagram is
/// still readable and can be rejected with an accurate length.
const MAX_DATAGRAM_SIZE: usize = 65_536;

struct Shared {
    config: NetworkConfig,
    factory: Arc<dyn PacketFactory>,
    sink: Box<dyn EventSink<SourceEvent> + Send + Sync>,
    stats: NetworkStatistics,

    state: Mutex<SourceState>,
    socket_state: Mutex<SocketState>,
    paused: AtomicBool,
    multicast_joined: AtomicBool,

    consecutive_errors: AtomicU32,
    packets_since_last_check: AtomicU32,
    last_rate_check: Mutex<Instant>,

    stop_flag: Arc<AtomicBool>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

/// UDP packet source. One dedicated OS thread per instance; all public
/// methods other than construction are lifecycle calls and may be
/// invoked from any thread, serialised internally by `state`'s mutex.
pub struct UdpSource {
    shared: Arc<Shared>,
}

impl UdpSource {
    pub fn new(
        config: NetworkConfig,
        factory: Arc<dyn PacketFactory>,
        sink: Box<dyn EventSink<SourceEvent> + Send + Sync>,
    ) -> Self {
        if !config.is_valid() {
            tracing::warn!(name = %config.name, "constructing UdpSource with invalid configuration");
        }
        UdpSource {
            shared: Arc::new(Shared {
                config,
                factory,
                sink,
                stats: NetworkStatistics::new(),
                state: Mutex::new(SourceState::Stopped),
                socket_state: Mutex::new(SocketState::Uninitialized),
                paused: AtomicBool::new(false),
                multicast_joined: AtomicBool::new(false),
                consecutive_errors: AtomicU32::new(0),
                packets_since_last_check: AtomicU32::new(0),
                last_rate_check: Mutex::new(Instant::now()),
                stop_flag: Arc::new(AtomicBool::new(false)),
                thread: Mutex::new(None),
            }),
        }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.shared.config
    }

    pub fn is_multicast_active(&self) -> bool {
        self.shared.config.enable_multicast
            && self.shared.multicast_joined.load(Ordering::Relaxed)
    }

    pub fn socket_state(&self) -> SocketState {
        *self.shared.socket_state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn set_state(&self, state: SourceState) {
        *self.shared.state.lock().unwrap_or_else(|e| e.into_inner()) = state;
    }

    fn set_socket_state(&self, state: SocketState) {
        *self.shared.socket_state.lock().unwrap_or_else(|e| e.into_inner()) = state;
        self.shared.sink.emit(SourceEvent::SocketStateChanged(state));
    }

    fn report_fatal(&self, message: impl Into<String>) {
        let message = message.into();
        tracing::error!(name = %self.shared.config.name, %message, "udp source fatal error");
        self.set_state(SourceState::Error);
        self.shared.sink.emit(SourceEvent::Error {
            kind: ErrorKind::Fatal,
            message,
        });
    }
}

impl crate::source::PacketSource for UdpSource {
    fn start(&self) -> Result<(), NetError> {
        {
            let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state != SourceState::Stopped {
                return Err(NetError::AlreadyRunning);
            }
            if !self.shared.config.is_valid() {
                *state = SourceState::Error;
                drop(state);
                self.shared.sink.emit(SourceEvent::Error {
                    kind: ErrorKind::Configuration,
                    message: "invalid network configuration".to_string(),
                });
                return Err(NetError::Configuration(
                    "NetworkConfig failed validation".to_string(),
                ));
            }
            *state = SourceState::Running;
        }

        self.shared.stats.reset();
        self.shared.consecutive_errors.store(0, Ordering::Relaxed);
        self.shared.packets_since_last_check.store(0, Ordering::Relaxed);
        self.shared.paused.store(false, Ordering::Relaxed);
        self.shared.stop_flag.store(false, Ordering::Relaxed);

        let socket = match build_socket(&self.shared.config) {
            Ok(s) => s,
            Err(e) => {
                self.report_fatal(format!("failed to initialize socket: {e}"));
                return Err(NetError::BindFailed(e));
            }
        };

        let local_addr = SocketAddrV4::new(self.shared.config.local_address, self.shared.config.local_port);
        if let Err(e) = socket.bind(&local_addr.into()) {
            self.report_fatal(format!("failed to bind {local_addr}: {e}"));
            return Err(NetError::BindFailed(e));
        }
        self.set_socket_state(SocketState::Bound);
        tracing::info!(name = %self.shared.config.name, addr = %local_addr, "udp source bound");

        if self.shared.config.enable_multicast {
            match join_multicast(&socket, &self.shared.config) {
                Ok(()) => {
                    self.shared.multicast_joined.store(true, Ordering::Relaxed);
                    self.shared.sink.emit(SourceEvent::MulticastStatusChanged(true));
                    tracing::info!(group = %self.shared.config.multicast_group, "joined multicast group");
                }
                Err(e) => {
                    tracing::warn!(%e, "failed to join multicast group, continuing in unicast mode");
                }
            }
        }

        if let Err(e) = socket.set_read_timeout(Some(SOCKET_POLL_TIMEOUT)) {
            tracing::warn!(%e, "failed to set socket read timeout");
        }

        let shared = self.shared.clone();
        let stop_flag = self.shared.stop_flag.clone();
        let handle = std::thread::Builder::new()
            .name(format!("monitor-net-udp-{}", shared.config.name))
            .spawn(move || run_receive_loop(shared, stop_flag, socket))
            .expect("failed to spawn udp receive thread");

        *self.shared.thread.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
        Ok(())
    }

    fn stop(&self) {
        {
            let state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
            if *state == SourceState::Stopped {
                return;
            }
        }
        self.shared.stop_flag.store(true, Ordering::Relaxed);
        if let Some(handle) = self.shared.thread.lock().unwrap_or_else(|e| e.into_inner()).take() {
            let _ = handle.join();
        }
        self.shared.multicast_joined.store(false, Ordering::Relaxed);
        self.set_socket_state(SocketState::Closing);
        self.set_state(SourceState::Stopped);
        tracing::info!(name = %self.shared.config.name, "udp source stopped");
    }

    fn pause(&self) {
        let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state == SourceState::Running {
            *state = SourceState::Paused;
            self.shared.paused.store(true, Ordering::Relaxed);
        }
    }

    fn resume(&self) -> Result<(), NetError> {
        let mut state = self.shared.state.lock().unwrap_or_else(|e| e.into_inner());
        if *state != SourceState::Paused {
            return Err(NetError::NotRunning);
        }
        *state = SourceState::Running;
        self.shared.paused.store(false, Ordering::Relaxed);
        Ok(())
    }

    fn state(&self) -> SourceState {
        *self.shared.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn statistics(&self) -> NetworkStatisticsSnapshot {
        self.shared.stats.snapshot()
    }
}

impl Drop for UdpSource {
    fn drop(&mut self) {
        use crate::source::PacketSource;
        self.stop();
    }
}

fn build_socket(config: &NetworkConfig) -> std::io::Result<Socket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(SockProtocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_recv_buffer_size(config.receive_buffer_size)?;
    if config.priority > 0 {
        // "Low delay" hint; not every platform exposes IP_TOS through socket2.
        #[cfg(unix)]
        {
            if let Err(e) = socket.set_tos(0x10) {
                tracing::debug!(%e, "low-delay socket hint unsupported on this platform");
            }
        }
        #[cfg(not(unix))]
        tracing::debug!("low-delay socket hint unsupported on this platform");
    }
    if let Err(e) = socket.set_multicast_loop_v4(false) {
        tracing::debug!(%e, "failed to disable multicast loopback");
    }
    Ok(socket)
}

fn join_multicast(socket: &Socket, config: &NetworkConfig) -> std::io::Result<()> {
    let iface = resolve_interface_addr(config.network_interface.as_deref());
    socket.join_multicast_v4(&config.multicast_group, &iface)
}

/// Resolves a named interface to its IPv4 address. Falls back to the
/// kernel default (`UNSPECIFIED`) when no name is given, or when the
/// named interface can't be found — Design Notes §9 calls for this
/// forgiving behaviour rather than a hard failure.
fn resolve_interface_addr(interface: Option<&str>) -> Ipv4Addr {
    let Some(_name) = interface else {
        return Ipv4Addr::UNSPECIFIED;
    };
    #[cfg(target_os = "linux")]
    {
        if let Some(addr) = linux_interface_addr(_name) {
            return addr;
        }
        tracing::warn!(interface = _name, "network interface not found, using default");
    }
    Ipv4Addr::UNSPECIFIED
}

#[cfg(target_os = "linux")]
fn linux_interface_addr(name: &str) -> Option<Ipv4Addr> {
    use std::ffi::CStr;
    use std::ptr::null_mut;

    unsafe {
        let mut addrs: *mut libc::ifaddrs = null_mut();
        if libc::getifaddrs(&mut addrs) != 0 {
            return None;
        }
        let mut current = addrs;
        let mut found = None;
        while !current.is_null() {
            let ifa = &*current;
            if !ifa.ifa_name.is_null() && !ifa.ifa_addr.is_null() {
                let ifa_name = CStr::from_ptr(ifa.ifa_name).to_str().unwrap_or("");
                if ifa_name == name
                    && (*ifa.ifa_addr).sa_family == libc::AF_INET as libc::sa_family_t
                {
                    let sin = &*(ifa.ifa_addr as *const libc::sockaddr_in);
                    found = Some(Ipv4Addr::from(u32::from_be(sin.sin_addr.s_addr)));
                    break;
                }
            }
            current = ifa.ifa_next;
        }
        libc::freeifaddrs(addrs);
        found
    }
}

fn run_receive_loop(shared: Arc<Shared>, stop_flag: Arc<AtomicBool>, socket: Socket) {
    let mut buf = vec![MaybeUninit::<u8>::uninit(); MAX_DATAGRAM_SIZE];
    let mut last_stats_tick = Instant::now();

    while !stop_flag.load(Ordering::Relaxed) {
        if shared.paused.load(Ordering::Relaxed) {
            // Packets stay queued in the kernel socket buffer; we just
            // don't drain them while paused (spec §4.5).
            std::thread::sleep(SOCKET_POLL_TIMEOUT);
            continue;
        }

        let receive_time = Instant::now();
        match socket.recv_from(&mut buf) {
            Ok((n, _from)) => {
                shared.consecutive_errors.store(0, Ordering::Relaxed);
                let bytes: &[u8] =
                    unsafe { std::slice::from_raw_parts(buf.as_ptr() as *const u8, n) };
                process_datagram(&shared, bytes, receive_time);
            }
            Err(e) if is_timeout(&e) => {}
            Err(e) => {
                shared.stats.record_packet_error();
                let count = shared.consecutive_errors.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(%e, count, "udp datagram read error");
                if count > MAX_CONSECUTIVE_ERRORS {
                    drop(e);
                    shared_report_fatal(&shared, "too many consecutive datagram errors");
                    return;
                }
            }
        }

        if last_stats_tick.elapsed() >= STATISTICS_UPDATE_INTERVAL {
            shared.stats.tick();
            shared.sink.emit(SourceEvent::StatisticsUpdated(shared.stats.snapshot()));
            last_stats_tick = Instant::now();
        }
    }
}

fn shared_report_fatal(shared: &Arc<Shared>, message: &str) {
    tracing::error!(name = %shared.config.name, message, "udp source fatal error");
    *shared.state.lock().unwrap_or_else(|e| e.into_inner()) = SourceState::Error;
    shared.sink.emit(SourceEvent::Error {
        kind: ErrorKind::Fatal,
        message: message.to_string(),
    });
}

fn process_datagram(shared: &Arc<Shared>, data: &[u8], receive_time: Instant) {
    if should_drop_for_rate_limit(shared) {
        shared.stats.record_dropped();
        return;
    }

    if data.len() < monitor_wire::HEADER_SIZE {
        shared.stats.record_packet_error();
        return;
    }

    match shared.factory.create_from_raw(data) {
        Ok(packet) => {
            shared.stats.record_packet(data.len());
            update_latency_stats(shared, receive_time);
            shared.packets_since_last_check.fetch_add(1, Ordering::Relaxed);
            shared.sink.emit(SourceEvent::PacketReady(Arc::new(packet)));
        }
        Err(e) => {
            tracing::debug!(%e, "packet factory rejected datagram");
            shared.stats.record_packet_error();
        }
    }
}

fn update_latency_stats(shared: &Arc<Shared>, receive_time: Instant) {
    if shared.config.enable_timestamping {
        let latency_us = Instant::now().duration_since(receive_time).as_micros() as f64;
        shared.stats.update_latency(latency_us);
    }
}

/// Mirrors `shouldDropForRateLimit`: evaluated lazily, only when a
/// datagram arrives, not on a dedicated timer. Most packets in a
/// window return `false` immediately without touching the clock;
/// only the packet that crosses the 100ms boundary pays for the
/// recomputation and decides whether the *next* window drops.
fn should_drop_for_rate_limit(shared: &Arc<Shared>) -> bool {
    if shared.config.max_packet_rate == 0 {
        return false;
    }
    let now = Instant::now();
    let mut last_check = shared.last_rate_check.lock().unwrap_or_else(|e| e.into_inner());
    let elapsed_ms = now.duration_since(*last_check).as_millis() as u64;
    if elapsed_ms >= RATE_LIMIT_WINDOW_MS {
        let packets_in_interval = shared.packets_since_last_check.swap(0, Ordering::Relaxed);
        let current_rate = (packets_in_interval as f64 * 1000.0) / elapsed_ms as f64;
        *last_check = now;
        return current_rate > shared.config.max_packet_rate as f64;
    }
    false
}

fn is_timeout(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::Packet;
    use crate::source::PacketSource;
    use monitor_wire::events::{NullSink, VecSink};
    use monitor_wire::PacketHeader;

    struct EchoFactory;
    impl PacketFactory for EchoFactory {
        fn create_from_raw(&self, bytes: &[u8]) -> Result<Packet, crate::error::FactoryError> {
            let header = PacketHeader::decode(bytes)
                .map_err(|e| crate::error::FactoryError(e.to_string()))?;
            let payload = bytes::Bytes::copy_from_slice(&bytes[monitor_wire::HEADER_SIZE..]);
            Ok(Packet { header, payload })
        }
    }

    fn free_udp_port() -> u16 {
        let socket = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        socket.local_addr().unwrap().port()
    }

    // S1 — UDP loopback round-trip.
    #[test]
    fn scenario_s1_udp_loopback_round_trip() {
        let port = free_udp_port();
        let config = NetworkConfig::udp("Loopback", Ipv4Addr::LOCALHOST, port);
        let sink: Arc<VecSink<SourceEvent>> = Arc::new(VecSink::new());
        let source = UdpSource::new(
            config,
            Arc::new(EchoFactory),
            Box::new(sink.clone()),
        );

        source.start().unwrap();
        std::thread::sleep(Duration::from_millis(50));

        let send_sock = std::net::UdpSocket::bind("127.0.0.1:0").unwrap();
        for i in 0..10u32 {
            let payload = format!("Test packet {i}");
            let header = PacketHeader::new(1000 + i, i, 0, payload.len() as u32);
            let mut datagram = Vec::new();
            header.encode(&mut datagram);
            datagram.extend_from_slice(payload.as_bytes());
            send_sock
                .send_to(&datagram, (Ipv4Addr::LOCALHOST, port))
                .unwrap();
        }

        std::thread::sleep(Duration::from_millis(300));
        source.stop();

        let events = sink.drain();
        let packet_ready = events
            .iter()
            .filter(|e| matches!(e, SourceEvent::PacketReady(_)))
            .count();
        let errors = events
            .iter()
            .filter(|e| matches!(e, SourceEvent::Error { .. }))
            .count();
        assert_eq!(packet_ready, 10);
        assert_eq!(errors, 0);
        assert_eq!(source.statistics().packets_received, 10);
        assert_eq!(source.statistics().packets_dropped, 0);
        assert_eq!(source.state(), SourceState::Stopped);
    }

    #[test]
    fn start_rejects_invalid_config() {
        let config = NetworkConfig::udp("Bad", Ipv4Addr::UNSPECIFIED, 0);
        let source = UdpSource::new(config, Arc::new(EchoFactory), Box::new(NullSink));
        assert!(source.start().is_err());
        assert_eq!(source.state(), SourceState::Error);
    }

    #[test]
    fn pause_stops_new_deliveries_without_closing_socket() {
        let port = free_udp_port();
        let config = NetworkConfig::udp("Pausable", Ipv4Addr::LOCALHOST, port);
        let sink: Arc<VecSink<SourceEvent>> = Arc::new(VecSink::new());
        let source = UdpSource::new(config, Arc::new(EchoFactory), Box::new(sink.clone()));
        source.start().unwrap();
        source.pause();
        assert_eq!(source.state(), SourceState::Paused);
        source.resume().unwrap();
        assert_eq!(source.state(), SourceState::Running);
        source.stop();
    }
}
