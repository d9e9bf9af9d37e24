//! # NetworkStatistics
//!
//! Atomic counters plus a couple of derived rates, updated from the
//! source's own thread on the fast path and readable from any thread
//! for a `statisticsUpdated` snapshot. Reads are not coherent across
//! fields — a snapshot is a set of independent loads, not a
//! transaction (spec §5).

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use quanta::Instant;
use serde::Serialize;

const RELAXED: Ordering = Ordering::Relaxed;

/// An `f64` that can be shared across threads without a lock, for the
/// handful of floating-point gauges atomics don't natively support.
struct AtomicF64(AtomicU64);

impl AtomicF64 {
    fn new(value: f64) -> Self {
        AtomicF64(AtomicU64::new(value.to_bits()))
    }

    fn load(&self) -> f64 {
        f64::from_bits(self.0.load(RELAXED))
    }

    fn store(&self, value: f64) {
        self.0.store(value.to_bits(), RELAXED);
    }
}

/// Windowed packets/sec counter, separate from the cumulative
/// `packet_rate` gauge below — see the Open Question resolution on
/// `packet_rate` naming ambiguity: the spec is implemented faithfully
/// as the cumulative mean, with this as the companion instantaneous
/// gauge the original's naming actually implied.
struct RateCounter {
    samples: Vec<(Instant, u64)>,
    window: Duration,
}

impl RateCounter {
    fn new(window: Duration) -> Self {
        RateCounter {
            samples: Vec::with_capacity(64),
            window,
        }
    }

    fn record(&mut self, value: u64) {
        let now = Instant::now();
        self.samples.push((now, value));
        let cutoff = now - self.window;
        self.samples.retain(|(t, _)| *t >= cutoff);
    }

    fn rate(&self) -> f64 {
        let sum: u64 = self.samples.iter().map(|(_, v)| v).sum();
        sum as f64 / self.window.as_secs_f64()
    }
}

/// A point-in-time, non-coherent copy of [`NetworkStatistics`] for the
/// `statisticsUpdated` event and for display/export.
#[derive(Debug, Clone, Serialize)]
pub struct NetworkStatisticsSnapshot {
    pub packets_received: u64,
    pub bytes_received: u64,
    pub packets_dropped: u64,
    pub packet_errors: u64,
    pub socket_errors: u64,
    pub reconnections: u64,
    pub connection_drops: u32,
    pub average_latency_us: f64,
    pub packet_rate: f64,
    pub instantaneous_packet_rate: f64,
    pub byte_rate: f64,
    pub drop_rate_percent: f64,
}

/// EMA smoothing factor for `average_latency_us`.
const LATENCY_EMA_ALPHA: f64 = 0.1;

pub struct NetworkStatistics {
    packets_received: AtomicU64,
    bytes_received: AtomicU64,
    packets_dropped: AtomicU64,
    packet_errors: AtomicU64,
    socket_errors: AtomicU64,
    reconnections: AtomicU64,
    connection_drops: AtomicU32,

    average_latency_us: AtomicF64,
    packet_rate: AtomicF64,
    byte_rate: AtomicF64,
    instantaneous_rate: Mutex<RateCounter>,

    start_time: Instant,
    last_packet_time: Mutex<Option<Instant>>,
}

impl Default for NetworkStatistics {
    fn default() -> Self {
        NetworkStatistics::new()
    }
}

impl NetworkStatistics {
    pub fn new() -> Self {
        NetworkStatistics {
            packets_received: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            packets_dropped: AtomicU64::new(0),
            packet_errors: AtomicU64::new(0),
            socket_errors: AtomicU64::new(0),
            reconnections: AtomicU64::new(0),
            connection_drops: AtomicU32::new(0),
            average_latency_us: AtomicF64::new(0.0),
            packet_rate: AtomicF64::new(0.0),
            byte_rate: AtomicF64::new(0.0),
            instantaneous_rate: Mutex::new(RateCounter::new(Duration::from_secs(1))),
            start_time: Instant::now(),
            last_packet_time: Mutex::new(None),
        }
    }

    pub fn record_packet(&self, bytes: usize) {
        self.packets_received.fetch_add(1, RELAXED);
        self.bytes_received.fetch_add(bytes as u64, RELAXED);
        *self.last_packet_time.lock().unwrap_or_else(|e| e.into_inner()) = Some(Instant::now());
        self.instantaneous_rate
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(1);
    }

    pub fn record_dropped(&self) {
        self.packets_dropped.fetch_add(1, RELAXED);
    }

    pub fn record_packet_error(&self) {
        self.packet_errors.fetch_add(1, RELAXED);
    }

    pub fn record_socket_error(&self) {
        self.socket_errors.fetch_add(1, RELAXED);
    }

    pub fn record_reconnection(&self) {
        self.reconnections.fetch_add(1, RELAXED);
    }

    pub fn record_connection_drop(&self) {
        self.connection_drops.fetch_add(1, RELAXED);
    }

    /// Updates the latency EMA. Callers must only do so when
    /// `enable_timestamping` is set — gating lives in the source, not
    /// here, so the stat stays frozen at its last value when disabled.
    pub fn update_latency(&self, sample_us: f64) {
        let prev = self.average_latency_us.load();
        let next = if prev == 0.0 {
            sample_us
        } else {
            LATENCY_EMA_ALPHA * sample_us + (1.0 - LATENCY_EMA_ALPHA) * prev
        };
        self.average_latency_us.store(next);
    }

    pub fn packets_received(&self) -> u64 {
        self.packets_received.load(RELAXED)
    }

    pub fn packets_dropped(&self) -> u64 {
        self.packets_dropped.load(RELAXED)
    }

    pub fn packet_errors(&self) -> u64 {
        self.packet_errors.load(RELAXED)
    }

    /// Cumulative mean: `packets_received / seconds_since_start`.
    pub fn current_packet_rate(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 1.0 {
            return 0.0;
        }
        self.packets_received.load(RELAXED) as f64 / elapsed
    }

    pub fn current_byte_rate(&self) -> f64 {
        let elapsed = self.start_time.elapsed().as_secs_f64();
        if elapsed < 1.0 {
            return 0.0;
        }
        self.bytes_received.load(RELAXED) as f64 / elapsed
    }

    /// Percentage, 0.0-100.0.
    pub fn drop_rate(&self) -> f64 {
        let received = self.packets_received.load(RELAXED);
        let dropped = self.packets_dropped.load(RELAXED);
        let total = received + dropped;
        if total == 0 {
            return 0.0;
        }
        dropped as f64 / total as f64 * 100.0
    }

    /// Recomputes the cumulative rate gauges; called from the 1s
    /// statistics tick (`onStatisticsTimer` in the original).
    pub fn tick(&self) {
        self.packet_rate.store(self.current_packet_rate());
        self.byte_rate.store(self.current_byte_rate());
    }

    pub fn snapshot(&self) -> NetworkStatisticsSnapshot {
        let instantaneous_packet_rate = self
            .instantaneous_rate
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .rate();
        NetworkStatisticsSnapshot {
            packets_received: self.packets_received.load(RELAXED),
            bytes_received: self.bytes_received.load(RELAXED),
            packets_dropped: self.packets_dropped.load(RELAXED),
            packet_errors: self.packet_errors.load(RELAXED),
            socket_errors: self.socket_errors.load(RELAXED),
            reconnections: self.reconnections.load(RELAXED),
            connection_drops: self.connection_drops.load(RELAXED),
            average_latency_us: self.average_latency_us.load(),
            packet_rate: self.packet_rate.load(),
            instantaneous_packet_rate,
            byte_rate: self.byte_rate.load(),
            drop_rate_percent: self.drop_rate(),
        }
    }

    pub fn reset(&self) {
        self.packets_received.store(0, RELAXED);
        self.bytes_received.store(0, RELAXED);
        self.packets_dropped.store(0, RELAXED);
        self.packet_errors.store(0, RELAXED);
        self.socket_errors.store(0, RELAXED);
        self.reconnections.store(0, RELAXED);
        self.connection_drops.store(0, RELAXED);
        self.average_latency_us.store(0.0);
        self.packet_rate.store(0.0);
        self.byte_rate.store(0.0);
        *self.last_packet_time.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_rate_is_a_percentage() {
        let stats = NetworkStatistics::new();
        for _ in 0..9 {
            stats.record_packet(10);
        }
        stats.record_dropped();
        assert!((stats.drop_rate() - 10.0).abs() < 0.01);
    }

    #[test]
    fn drop_rate_zero_when_nothing_seen() {
        assert_eq!(NetworkStatistics::new().drop_rate(), 0.0);
    }

    #[test]
    fn latency_ema_seeds_from_first_sample() {
        let stats = NetworkStatistics::new();
        stats.update_latency(100.0);
        assert_eq!(stats.snapshot().average_latency_us, 100.0);
        stats.update_latency(200.0);
        // 0.1*200 + 0.9*100 = 110
        assert!((stats.snapshot().average_latency_us - 110.0).abs() < 0.01);
    }

    #[test]
    fn reset_clears_counters() {
        let stats = NetworkStatistics::new();
        stats.record_packet(100);
        stats.record_dropped();
        stats.reset();
        assert_eq!(stats.packets_received(), 0);
        assert_eq!(stats.packets_dropped(), 0);
    }
}
