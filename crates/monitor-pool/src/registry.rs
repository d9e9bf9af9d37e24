//! # Block Pool Registry
//!
//! A keyed set of named pools. Creation is idempotent: asking for a
//! name that already exists returns the existing pool instead of
//! erroring, which lets independent subsystems request "the packet
//! pool" without coordinating who creates it first.
//!
//! Each pool's [`PoolEvent::MemoryPressure`] is forwarded to the
//! caller-supplied sink for that pool, and also re-checked against
//! registry-wide utilisation; crossing the same threshold at the
//! aggregate level emits a [`RegistryEvent::PoolPressure`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use monitor_wire::events::EventSink;

use crate::pool::{BlockPool, PoolError, PoolEvent, PRESSURE_THRESHOLD};

#[derive(Debug, Clone, PartialEq)]
pub enum RegistryEvent {
    PoolCreated(String),
    PoolPressure { utilization: f64 },
}

struct RegistryInner {
    pools: Mutex<HashMap<String, Arc<BlockPool>>>,
    sink: Box<dyn EventSink<RegistryEvent> + Send + Sync>,
}

pub struct BlockPoolRegistry {
    inner: Arc<RegistryInner>,
}

impl BlockPoolRegistry {
    pub fn new() -> Self {
        Self::with_sink(Box::new(monitor_wire::events::NullSink))
    }

    pub fn with_sink(sink: Box<dyn EventSink<RegistryEvent> + Send + Sync>) -> Self {
        BlockPoolRegistry {
            inner: Arc::new(RegistryInner {
                pools: Mutex::new(HashMap::new()),
                sink,
            }),
        }
    }

    /// Create (or fetch) the named pool. Events from it are forwarded
    /// to `downstream`; pass `NullSink` if the caller doesn't need them.
    pub fn create_pool(
        &self,
        name: &str,
        block_size: usize,
        block_count: usize,
        downstream: Box<dyn EventSink<PoolEvent> + Send + Sync>,
    ) -> Result<Arc<BlockPool>, PoolError> {
        let mut pools = self.inner.pools.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = pools.get(name) {
            tracing::warn!(pool = name, "create_pool: pool already exists, returning it");
            return Ok(existing.clone());
        }

        let forwarder = ForwardingSink {
            registry: Arc::downgrade(&self.inner),
            downstream,
        };
        let pool = Arc::new(BlockPool::with_sink(block_size, block_count, Box::new(forwarder))?);
        pools.insert(name.to_string(), pool.clone());
        drop(pools);

        self.inner.sink.emit(RegistryEvent::PoolCreated(name.to_string()));
        Ok(pool)
    }

    pub fn get(&self, name: &str) -> Option<Arc<BlockPool>> {
        let pools = self.inner.pools.lock().unwrap_or_else(|e| e.into_inner());
        pools.get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        let pools = self.inner.pools.lock().unwrap_or_else(|e| e.into_inner());
        pools.keys().cloned().collect()
    }

    /// Used blocks across every registered pool divided by total
    /// capacity across every registered pool.
    pub fn aggregate_utilization(&self) -> f64 {
        aggregate_utilization(&self.inner)
    }

    /// Bytes currently checked out across every registered pool —
    /// `used_count * block_size` per pool, summed, not total capacity.
    pub fn total_memory_used(&self) -> usize {
        let pools = self.inner.pools.lock().unwrap_or_else(|e| e.into_inner());
        pools.values().map(|p| p.memory_used()).sum()
    }
}

impl Default for BlockPoolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn aggregate_utilization(inner: &RegistryInner) -> f64 {
    let pools = inner.pools.lock().unwrap_or_else(|e| e.into_inner());
    if pools.is_empty() {
        return 0.0;
    }
    let (used, total) = pools.values().fold((0usize, 0usize), |(u, t), p| {
        let block_used = (p.get_utilization() * p.block_count() as f64).round() as usize;
        (u + block_used, t + p.block_count())
    });
    if total == 0 {
        0.0
    } else {
        used as f64 / total as f64
    }
}

struct ForwardingSink {
    registry: Weak<RegistryInner>,
    downstream: Box<dyn EventSink<PoolEvent> + Send + Sync>,
}

impl EventSink<PoolEvent> for ForwardingSink {
    fn emit(&self, event: PoolEvent) {
        self.downstream.emit(event);
        if let PoolEvent::MemoryPressure { .. } = event {
            if let Some(registry) = self.registry.upgrade() {
                let utilization = aggregate_utilization(&registry);
                if utilization >= PRESSURE_THRESHOLD {
                    registry.sink.emit(RegistryEvent::PoolPressure { utilization });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_wire::events::{NullSink, VecSink};

    #[test]
    fn create_pool_is_idempotent() {
        let registry = BlockPoolRegistry::new();
        let a = registry.create_pool("packets", 64, 4, Box::new(NullSink)).unwrap();
        let b = registry.create_pool("packets", 64, 4, Box::new(NullSink)).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(registry.names(), vec!["packets".to_string()]);
    }

    #[test]
    fn aggregate_utilization_across_pools() {
        let registry = BlockPoolRegistry::new();
        let a = registry.create_pool("a", 64, 4, Box::new(NullSink)).unwrap();
        let b = registry.create_pool("b", 64, 4, Box::new(NullSink)).unwrap();
        let _h1 = a.acquire().unwrap();
        let _h2 = b.acquire().unwrap();
        assert_eq!(registry.aggregate_utilization(), 2.0 / 8.0);
    }

    #[test]
    fn total_memory_used_sums_only_checked_out_blocks() {
        let registry = BlockPoolRegistry::new();
        let a = registry.create_pool("a", 64, 4, Box::new(NullSink)).unwrap();
        let b = registry.create_pool("b", 128, 2, Box::new(NullSink)).unwrap();
        assert_eq!(registry.total_memory_used(), 0);

        let _h1 = a.acquire().unwrap();
        let _h2 = a.acquire().unwrap();
        let _h3 = b.acquire().unwrap();
        assert_eq!(registry.total_memory_used(), 64 * 2 + 128 * 1);
    }

    #[test]
    fn registry_pressure_fires_on_aggregate_crossing() {
        let reg_sink = Arc::new(VecSink::<RegistryEvent>::new());
        let registry = BlockPoolRegistry::with_sink(Box::new(reg_sink.clone()));
        let pool = registry
            .create_pool("packets", 64, 10, Box::new(NullSink))
            .unwrap();
        let mut held = Vec::new();
        for _ in 0..8 {
            held.push(pool.acquire().unwrap());
        }
        assert!(registry.aggregate_utilization() >= PRESSURE_THRESHOLD);
        assert!(reg_sink
            .drain()
            .iter()
            .any(|e| matches!(e, RegistryEvent::PoolPressure { .. })));
    }
}
