//! # Block Pool
//!
//! A fixed-size block allocator. The backing region is carved into
//! `block_count` blocks of `block_size` bytes once, up front; after that
//! `acquire`/`release` never touch the global allocator. Free blocks are
//! threaded into a singly-linked list through their own storage — the
//! first `size_of::<usize>()` bytes of a free block hold the address of
//! the next free block (or zero for the end of the list). Grounded on
//! the pointer-chasing free list in the original allocator, translated
//! into a `Mutex`-guarded head pointer instead of a raw global.

use std::mem;
use std::ptr::NonNull;
use std::sync::Mutex;

use monitor_wire::{ErrorKind, ErrorTag};

/// Utilisation crossing this fraction (upward) emits a one-shot
/// [`PoolEvent::MemoryPressure`] until it drops back below the line.
pub const PRESSURE_THRESHOLD: f64 = 0.80;

#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum PoolError {
    #[error("block_size {block_size} is smaller than the minimum {minimum} bytes needed to thread the free list")]
    BlockTooSmall { block_size: usize, minimum: usize },
    #[error("block_count must be greater than zero")]
    InvalidBlockCount,
}

impl ErrorTag for PoolError {
    fn kind(&self) -> ErrorKind {
        match self {
            PoolError::BlockTooSmall { .. } => ErrorKind::Configuration,
            PoolError::InvalidBlockCount => ErrorKind::Configuration,
        }
    }
}

/// Events a pool reports to an [`monitor_wire::events::EventSink`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PoolEvent {
    /// `acquire()` found the pool empty. Reported once per
    /// available-to-exhausted transition, not on every failed call.
    AllocationFailed,
    /// Utilisation crossed [`PRESSURE_THRESHOLD`] going up.
    MemoryPressure { utilization: f64 },
}

/// A block handed out by [`BlockPool::acquire`]. Carries no lifetime —
/// it outlives the borrow of the pool that produced it — but is only
/// ever constructed by that pool and is not `Clone`, so a caller cannot
/// release the same handle twice. Must be returned via
/// [`BlockPool::release`] on the same pool it came from.
#[derive(Debug)]
pub struct Block {
    ptr: NonNull<u8>,
    len: usize,
    generation: u64,
}

// SAFETY: the region a Block points into is owned by the BlockPool that
// issued it and does not move or get freed while blocks are outstanding.
unsafe impl Send for Block {}

impl Block {
    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: ptr/len describe a live block inside the pool's region.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        // SAFETY: `&mut self` guarantees exclusive access to this block.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

struct Inner {
    region: Box<[u8]>,
    free_head: Option<NonNull<u8>>,
    used_count: usize,
    generation: u64,
    exhausted: bool,
    under_pressure: bool,
}

// SAFETY: `region` is heap storage the Inner owns exclusively; access is
// always taken through the pool's Mutex.
unsafe impl Send for Inner {}

pub struct BlockPool {
    block_size: usize,
    block_count: usize,
    base: usize,
    inner: Mutex<Inner>,
    sink: Box<dyn monitor_wire::events::EventSink<PoolEvent> + Send + Sync>,
}

impl BlockPool {
    pub fn new(block_size: usize, block_count: usize) -> Result<Self, PoolError> {
        Self::with_sink(block_size, block_count, Box::new(monitor_wire::events::NullSink))
    }

    pub fn with_sink(
        block_size: usize,
        block_count: usize,
        sink: Box<dyn monitor_wire::events::EventSink<PoolEvent> + Send + Sync>,
    ) -> Result<Self, PoolError> {
        let minimum = mem::size_of::<usize>();
        if block_size < minimum {
            return Err(PoolError::BlockTooSmall { block_size, minimum });
        }
        if block_count == 0 {
            return Err(PoolError::InvalidBlockCount);
        }

        let mut region = vec![0u8; block_size * block_count].into_boxed_slice();
        let base = region.as_mut_ptr() as usize;

        // Thread the free list front to back; index 0 ends up as the
        // tail, the last block as the head, matching the order the
        // original allocator builds its list in.
        let mut free_head: Option<NonNull<u8>> = None;
        for i in 0..block_count {
            let offset = i * block_size;
            // SAFETY: offset is within the allocated region.
            let block_ptr = unsafe { NonNull::new_unchecked(region.as_mut_ptr().add(offset)) };
            unsafe { write_next(block_ptr, free_head) };
            free_head = Some(block_ptr);
        }

        Ok(BlockPool {
            block_size,
            block_count,
            base,
            inner: Mutex::new(Inner {
                region,
                free_head,
                used_count: 0,
                generation: 0,
                exhausted: false,
                under_pressure: false,
            }),
            sink,
        })
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    /// Take a block from the free list, or `None` if the pool is empty.
    pub fn acquire(&self) -> Option<Block> {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        let head = match inner.free_head {
            Some(head) => head,
            None => {
                if !inner.exhausted {
                    inner.exhausted = true;
                    drop(inner);
                    self.sink.emit(PoolEvent::AllocationFailed);
                }
                return None;
            }
        };

        // SAFETY: head is a live free block, written by a previous
        // with_sink/release call.
        let next = unsafe { read_next(head) };
        inner.free_head = next;
        inner.used_count += 1;
        inner.exhausted = false;
        let generation = inner.generation;
        let utilization = inner.used_count as f64 / self.block_count as f64;
        let crossed = utilization >= PRESSURE_THRESHOLD && !inner.under_pressure;
        if crossed {
            inner.under_pressure = true;
        } else if utilization < PRESSURE_THRESHOLD {
            inner.under_pressure = false;
        }
        drop(inner);

        if crossed {
            self.sink.emit(PoolEvent::MemoryPressure { utilization });
        }

        Some(Block {
            ptr: head,
            len: self.block_size,
            generation,
        })
    }

    /// Return a block to the free list. Ignored (with a warning) if the
    /// pointer doesn't belong to this pool's region, or if the pool was
    /// reset since the block was acquired — its generation is stale.
    pub fn release(&self, block: Block) {
        if !self.owns(block.ptr.as_ptr() as usize) {
            tracing::warn!("release() of a pointer not owned by this pool, ignoring");
            return;
        }

        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if block.generation != inner.generation {
            tracing::warn!("release() of a block from a prior generation, ignoring");
            return;
        }

        unsafe { write_next(block.ptr, inner.free_head) };
        inner.free_head = Some(block.ptr);
        inner.used_count = inner.used_count.saturating_sub(1);
        let utilization = inner.used_count as f64 / self.block_count as f64;
        if utilization < PRESSURE_THRESHOLD {
            inner.under_pressure = false;
        }
    }

    /// Rebuild the free list from scratch. Any `Block` handle acquired
    /// before this call is invalidated: its generation no longer
    /// matches, so a later `release` of it is ignored rather than
    /// corrupting the new list.
    pub fn reset(&self) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        if inner.used_count > 0 {
            tracing::warn!(
                outstanding = inner.used_count,
                "resetting pool with blocks still checked out"
            );
        }

        let mut free_head: Option<NonNull<u8>> = None;
        for i in 0..self.block_count {
            let offset = i * self.block_size;
            // SAFETY: offset is within the region this Inner owns.
            let block_ptr = unsafe { NonNull::new_unchecked(inner.region.as_mut_ptr().add(offset)) };
            unsafe { write_next(block_ptr, free_head) };
            free_head = Some(block_ptr);
        }
        inner.free_head = free_head;
        inner.used_count = 0;
        inner.generation += 1;
        inner.exhausted = false;
        inner.under_pressure = false;
    }

    /// Whether `addr` falls inside this pool's region, on a block
    /// boundary.
    pub fn validate(&self, addr: usize) -> bool {
        self.owns(addr)
    }

    fn owns(&self, addr: usize) -> bool {
        let span = self.block_size * self.block_count;
        if addr < self.base || addr >= self.base + span {
            return false;
        }
        (addr - self.base) % self.block_size == 0
    }

    pub fn get_utilization(&self) -> f64 {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.used_count as f64 / self.block_count as f64
    }

    pub fn get_available_blocks(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        self.block_count - inner.used_count
    }

    /// Bytes actually checked out right now: `used_count * block_size`,
    /// not the pool's total capacity.
    pub fn memory_used(&self) -> usize {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.used_count * self.block_size
    }
}

unsafe fn write_next(block: NonNull<u8>, next: Option<NonNull<u8>>) {
    let val = next.map(|p| p.as_ptr() as usize).unwrap_or(0);
    (block.as_ptr() as *mut usize).write(val);
}

unsafe fn read_next(block: NonNull<u8>) -> Option<NonNull<u8>> {
    let val = (block.as_ptr() as *const usize).read();
    NonNull::new(val as *mut u8)
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_wire::events::{EventSink, VecSink};
    use proptest::prelude::*;

    #[test]
    fn rejects_undersized_blocks() {
        let err = BlockPool::new(2, 4).unwrap_err();
        assert!(matches!(err, PoolError::BlockTooSmall { .. }));
    }

    #[test]
    fn rejects_zero_blocks() {
        let err = BlockPool::new(64, 0).unwrap_err();
        assert_eq!(err, PoolError::InvalidBlockCount);
    }

    #[test]
    fn acquire_release_roundtrip() {
        let pool = BlockPool::new(64, 4).unwrap();
        let b = pool.acquire().unwrap();
        assert_eq!(pool.get_available_blocks(), 3);
        pool.release(b);
        assert_eq!(pool.get_available_blocks(), 4);
    }

    #[test]
    fn scenario_s2_pool_exhaustion() {
        let pool = BlockPool::new(64, 2).unwrap();
        let a = pool.acquire().unwrap();
        let b = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        pool.release(a);
        let c = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        pool.release(b);
        pool.release(c);
        assert_eq!(pool.get_available_blocks(), 2);
    }

    #[test]
    fn allocation_failed_fires_once_per_transition() {
        let sink: VecSink<PoolEvent> = VecSink::new();
        let pool = BlockPool::with_sink(64, 1, Box::new(sink)).unwrap();
        let a = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
        assert!(pool.acquire().is_none());
        pool.release(a);
        let _ = pool.acquire().unwrap();
        assert!(pool.acquire().is_none());
    }

    #[test]
    fn scenario_s5_pressure_signal() {
        let sink: VecSink<PoolEvent> = VecSink::new();
        let pool = BlockPool::with_sink(64, 10, Box::new(sink)).unwrap();
        let mut held = Vec::new();
        for _ in 0..8 {
            held.push(pool.acquire().unwrap());
        }
        assert!(pool.get_utilization() >= PRESSURE_THRESHOLD);
        for b in held {
            pool.release(b);
        }
    }

    #[test]
    fn reset_invalidates_outstanding_handles() {
        let pool = BlockPool::new(64, 2).unwrap();
        let a = pool.acquire().unwrap();
        pool.reset();
        pool.release(a); // ignored: stale generation
        assert_eq!(pool.get_available_blocks(), 2);
    }

    #[test]
    fn release_of_foreign_pointer_is_ignored() {
        let pool_a = BlockPool::new(64, 2).unwrap();
        let pool_b = BlockPool::new(64, 2).unwrap();
        let from_b = pool_b.acquire().unwrap();
        // deliberately not released to pool_b here
        pool_a.release(from_b);
        assert_eq!(pool_a.get_available_blocks(), 2);
        assert_eq!(pool_b.get_available_blocks(), 1);
    }

    proptest! {
        #[test]
        fn never_exceeds_capacity(ops in proptest::collection::vec(proptest::bool::ANY, 0..200)) {
            let pool = BlockPool::new(32, 8).unwrap();
            let mut held: Vec<Block> = Vec::new();
            for acquire in ops {
                if acquire {
                    if let Some(b) = pool.acquire() {
                        held.push(b);
                    }
                } else if let Some(b) = held.pop() {
                    pool.release(b);
                }
                prop_assert!(pool.get_available_blocks() <= pool.block_count());
                prop_assert!(held.len() <= pool.block_count());
            }
        }
    }
}
