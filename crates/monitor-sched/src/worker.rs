//! # Worker
//!
//! One OS thread draining its own [`TaskQueue`]. Holds a `Weak` back
//! reference to the owning scheduler rather than a raw pointer — the
//! same forwarding idiom `monitor-pool`'s registry uses to avoid an
//! `Arc` cycle — and calls back into it for idle/busy/completion
//! events instead of emitting signals onto a shared bus.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicI64, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};

use crate::affinity;
use crate::queue::TaskQueue;
use crate::scheduler::SchedulerShared;
use crate::task::Task;

pub const MAX_QUEUE_SIZE: usize = 1000;
const IDLE_TIMEOUT: Duration = Duration::from_millis(100);

pub struct Worker {
    pub id: usize,
    queue: Mutex<TaskQueue>,
    wake: Condvar,
    idle: AtomicBool,
    should_stop: AtomicBool,
    tasks_processed: AtomicU64,
    tasks_stolen: AtomicU64,
    total_task_time_nanos: AtomicU64,
    cpu_affinity: AtomicI64,
    /// The OS tid `run()` is executing on, once started; 0 (no real
    /// tid takes this value) while the worker hasn't been started yet.
    os_tid: AtomicI32,
    scheduler: Weak<SchedulerShared>,
}

impl Worker {
    pub fn new(id: usize, scheduler: Weak<SchedulerShared>) -> Arc<Worker> {
        Arc::new(Worker {
            id,
            queue: Mutex::new(TaskQueue::new()),
            wake: Condvar::new(),
            idle: AtomicBool::new(true),
            should_stop: AtomicBool::new(false),
            tasks_processed: AtomicU64::new(0),
            tasks_stolen: AtomicU64::new(0),
            total_task_time_nanos: AtomicU64::new(0),
            cpu_affinity: AtomicI64::new(-1),
            os_tid: AtomicI32::new(0),
            scheduler,
        })
    }

    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_idle(&self) -> bool {
        self.idle.load(Ordering::Acquire)
    }

    pub fn tasks_processed(&self) -> u64 {
        self.tasks_processed.load(Ordering::Relaxed)
    }

    pub fn tasks_stolen(&self) -> u64 {
        self.tasks_stolen.load(Ordering::Relaxed)
    }

    pub fn cpu_affinity(&self) -> i64 {
        self.cpu_affinity.load(Ordering::Relaxed)
    }

    pub fn average_task_time(&self) -> Duration {
        let processed = self.tasks_processed.load(Ordering::Relaxed);
        if processed == 0 {
            return Duration::ZERO;
        }
        Duration::from_nanos(self.total_task_time_nanos.load(Ordering::Relaxed) / processed)
    }

    /// Negative `core_id` unbinds (spec.md §4.3). Applied immediately if
    /// the worker's thread is already running, not just recorded for
    /// the next start.
    pub fn set_cpu_affinity(&self, core_id: i64) {
        self.cpu_affinity.store(core_id, Ordering::Relaxed);
        let tid = self.os_tid.load(Ordering::Relaxed);
        if tid != 0 {
            affinity::pin_thread(tid, (core_id >= 0).then_some(core_id as usize));
        }
    }

    /// Add a task to this worker's queue. Hands the task back on
    /// failure (stopped, or queue at [`MAX_QUEUE_SIZE`]) so the caller
    /// can retry it on a sibling worker.
    pub fn add_task(&self, task: Task) -> Result<(), Task> {
        if self.should_stop.load(Ordering::Acquire) {
            return Err(task);
        }
        let mut q = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if q.len() >= MAX_QUEUE_SIZE {
            return Err(task);
        }
        q.push(task);
        if self.idle.load(Ordering::Acquire) {
            self.wake.notify_one();
        }
        Ok(())
    }

    /// Take the lowest-priority task from this worker's queue, for a
    /// thief on another worker. Declines to give up its only task.
    pub fn steal(&self) -> Option<Task> {
        let mut q = self.queue.lock().unwrap_or_else(|e| e.into_inner());
        if q.len() <= 1 {
            return None;
        }
        let stolen = q.pop_lowest();
        if stolen.is_some() {
            self.tasks_stolen.fetch_add(1, Ordering::Relaxed);
        }
        stolen
    }

    /// Spawn the worker's OS thread. Returns the join handle and a
    /// receiver that fires once the run loop has actually exited, so
    /// shutdown can join with a deadline instead of blocking forever.
    pub fn start(self: &Arc<Self>) -> (JoinHandle<()>, Receiver<()>) {
        let (done_tx, done_rx): (Sender<()>, Receiver<()>) = crossbeam_channel::bounded(0);
        let worker = self.clone();
        let handle = std::thread::Builder::new()
            .name(format!("monitor-sched-{}", self.id))
            .spawn(move || {
                worker.run();
                let _ = done_tx.send(());
            })
            .expect("failed to spawn worker thread");
        (handle, done_rx)
    }

    pub fn request_stop(&self) {
        self.should_stop.store(true, Ordering::Release);
        self.wake.notify_one();
    }

    /// Nudge a sleeping worker to re-check its queue without stopping it.
    pub fn wake(&self) {
        self.wake.notify_one();
    }

    fn run(&self) {
        self.os_tid.store(affinity::current_tid(), Ordering::Relaxed);
        let core = self.cpu_affinity.load(Ordering::Relaxed);
        if core >= 0 {
            affinity::pin_thread(self.os_tid.load(Ordering::Relaxed), Some(core as usize));
        }

        while !self.should_stop.load(Ordering::Acquire) {
            if self.is_scheduler_paused() {
                // A pause takes effect between tasks, never mid-execution:
                // process_task_queue already ran any task fully. Sit in the
                // same idle wait a genuinely empty queue would use rather
                // than busy-polling the paused flag.
                let guard = self.queue.lock().unwrap_or_else(|e| e.into_inner());
                self.set_idle(true);
                let (guard, _timed_out) = self
                    .wake
                    .wait_timeout(guard, IDLE_TIMEOUT)
                    .unwrap_or_else(|e| e.into_inner());
                drop(guard);
                self.set_idle(false);
                continue;
            }

            self.process_task_queue();
            if self.should_stop.load(Ordering::Acquire) {
                break;
            }

            let guard = self.queue.lock().unwrap_or_else(|e| e.into_inner());
            if guard.is_empty() {
                self.set_idle(true);
                let (guard, _timed_out) = self
                    .wake
                    .wait_timeout(guard, IDLE_TIMEOUT)
                    .unwrap_or_else(|e| e.into_inner());
                drop(guard);
                self.set_idle(false);
            }
        }
    }

    fn is_scheduler_paused(&self) -> bool {
        self.scheduler.upgrade().map(|s| s.is_paused()).unwrap_or(false)
    }

    fn process_task_queue(&self) {
        loop {
            if self.should_stop.load(Ordering::Acquire) || self.is_scheduler_paused() {
                break;
            }
            let task = {
                let mut q = self.queue.lock().unwrap_or_else(|e| e.into_inner());
                match q.pop_highest() {
                    Some(t) => t,
                    None => break,
                }
            };

            let Task { id, function, .. } = task;
            let start = Instant::now();
            let result = panic::catch_unwind(AssertUnwindSafe(function));
            let elapsed = start.elapsed();

            self.tasks_processed.fetch_add(1, Ordering::Relaxed);
            self.total_task_time_nanos
                .fetch_add(elapsed.as_nanos() as u64, Ordering::Relaxed);

            if let Some(scheduler) = self.scheduler.upgrade() {
                match result {
                    Ok(()) => scheduler.on_task_completed(id, elapsed),
                    Err(_) => {
                        tracing::warn!(worker_id = self.id, task_id = id, "task panicked");
                        scheduler.on_task_faulted(id);
                    }
                }
            }
        }
    }

    fn set_idle(&self, idle: bool) {
        let was_idle = self.idle.swap(idle, Ordering::AcqRel);
        if idle == was_idle {
            return;
        }
        let Some(scheduler) = self.scheduler.upgrade() else {
            return;
        };
        if idle {
            scheduler.on_worker_idle(self.id);
        } else {
            scheduler.on_worker_busy(self.id);
        }
    }
}
