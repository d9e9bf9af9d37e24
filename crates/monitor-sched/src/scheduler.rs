//! # Scheduler
//!
//! Owns a fixed set of [`Worker`]s and decides where a submitted task
//! lands. Work stealing runs on two independent, additive triggers:
//! a worker going idle immediately tries to steal from a busy sibling,
//! and a periodic sweep every [`DEFAULT_LOAD_BALANCE_INTERVAL`] looks
//! for workers more than 1.5x the mean depth (and more than 10 tasks
//! deep) and nudges an idle worker to steal from them. Either trigger
//! can fire independently of the other.

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::Receiver;
use monitor_wire::events::EventSink;

use crate::error::{SchedulerError, SubmitError};
use crate::events::SchedulerEvent;
use crate::future::{self, TaskHandle, TaskPanicked};
use crate::task::{Task, TaskFn};
use crate::worker::Worker;

pub const MIN_THREADS: usize = 1;
pub const MAX_THREADS: usize = 64;
pub const DEFAULT_LOAD_BALANCE_INTERVAL: Duration = Duration::from_millis(100);
pub const SATURATION_THRESHOLD: usize = 500;
const WORKER_JOIN_DEADLINE: Duration = Duration::from_secs(5);
const LOAD_IMBALANCE_RATIO: f64 = 1.5;
const LOAD_IMBALANCE_MIN_DEPTH: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingPolicy {
    RoundRobin,
    LeastLoaded,
    Random,
    WorkStealing,
}

pub(crate) struct SchedulerShared {
    workers: OnceLock<Vec<Arc<Worker>>>,
    policy: Mutex<SchedulingPolicy>,
    running: AtomicBool,
    paused: AtomicBool,
    work_stealing_enabled: AtomicBool,
    load_balancing_enabled: AtomicBool,
    next_task_id: AtomicU64,
    next_worker_index: AtomicUsize,
    stealing_attempts: AtomicU64,
    successful_steals: AtomicU64,
    idle_worker_count: AtomicUsize,
    total_tasks_completed: AtomicU64,
    pool_saturated: AtomicBool,
    pool_idle: AtomicBool,
    sink: Box<dyn EventSink<SchedulerEvent> + Send + Sync>,
}

impl SchedulerShared {
    fn workers(&self) -> &[Arc<Worker>] {
        self.workers.get().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether workers should hold off dequeuing. Existing in-flight
    /// tasks still run to completion; this only gates the *next* pop
    /// (spec.md §4.4: "new submissions remain allowed but workers do
    /// not dequeue").
    pub(crate) fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    fn total_queue_size(&self) -> usize {
        self.workers().iter().map(|w| w.queue_len()).sum()
    }

    /// `PoolSaturated`/`PoolIdle` are edge-triggered (spec.md §4.4:
    /// "Both are edge-triggered"): each fires once on the transition
    /// into its condition, not on every tick the condition still holds.
    fn check_pool_state(&self) {
        let total = self.total_queue_size();
        let idle = self.idle_worker_count.load(Ordering::Relaxed);

        let is_saturated = total > SATURATION_THRESHOLD;
        if is_saturated {
            if !self.pool_saturated.swap(true, Ordering::Relaxed) {
                self.sink.emit(SchedulerEvent::PoolSaturated { total_queue_size: total });
            }
        } else {
            self.pool_saturated.store(false, Ordering::Relaxed);
        }

        let is_idle = total == 0 && idle == self.workers().len();
        if is_idle {
            if !self.pool_idle.swap(true, Ordering::Relaxed) {
                self.sink.emit(SchedulerEvent::PoolIdle);
            }
        } else {
            self.pool_idle.store(false, Ordering::Relaxed);
        }
    }

    fn attempt_work_stealing(&self, idle_worker: &Arc<Worker>) {
        if !self.work_stealing_enabled.load(Ordering::Relaxed) {
            return;
        }
        self.stealing_attempts.fetch_add(1, Ordering::Relaxed);
        for victim in self.workers() {
            if Arc::ptr_eq(victim, idle_worker) {
                continue;
            }
            if victim.queue_len() <= 1 {
                continue;
            }
            if let Some(task) = victim.steal() {
                match idle_worker.add_task(task) {
                    Ok(()) => {
                        self.successful_steals.fetch_add(1, Ordering::Relaxed);
                        self.sink.emit(SchedulerEvent::WorkStealingOccurred {
                            from_worker: victim.id,
                            to_worker: idle_worker.id,
                        });
                        break;
                    }
                    Err(_lost) => {
                        // idle_worker stopped between the idle check and
                        // this add; the stolen task is dropped here, same
                        // as the race the original stealing path has.
                        tracing::warn!("stolen task dropped, target worker rejected it");
                    }
                }
            }
        }
    }

    pub(crate) fn on_task_completed(&self, task_id: u64, execution_time: Duration) {
        self.total_tasks_completed.fetch_add(1, Ordering::Relaxed);
        self.sink.emit(SchedulerEvent::TaskCompleted { task_id, execution_time });
        self.check_pool_state();
    }

    pub(crate) fn on_task_faulted(&self, task_id: u64) {
        self.sink.emit(SchedulerEvent::TaskFaulted { task_id });
    }

    pub(crate) fn on_worker_idle(&self, worker_id: usize) {
        self.idle_worker_count.fetch_add(1, Ordering::Relaxed);
        self.sink.emit(SchedulerEvent::WorkerIdle { worker_id });
        if let Some(worker) = self.workers().iter().find(|w| w.id == worker_id) {
            self.attempt_work_stealing(worker);
        }
        self.check_pool_state();
    }

    pub(crate) fn on_worker_busy(&self, worker_id: usize) {
        self.idle_worker_count.fetch_sub(1, Ordering::Relaxed);
        self.sink.emit(SchedulerEvent::WorkerBusy { worker_id });
        self.check_pool_state();
    }

    fn perform_load_balance(&self) {
        if !self.load_balancing_enabled.load(Ordering::Relaxed)
            || !self.running.load(Ordering::Relaxed)
            || self.paused.load(Ordering::Relaxed)
        {
            return;
        }
        let workers = self.workers();
        let sizes: Vec<usize> = workers.iter().map(|w| w.queue_len()).collect();
        if sizes.is_empty() {
            return;
        }
        let mean = sizes.iter().sum::<usize>() as f64 / sizes.len() as f64;

        for (i, &size) in sizes.iter().enumerate() {
            if size as f64 > mean * LOAD_IMBALANCE_RATIO && size > LOAD_IMBALANCE_MIN_DEPTH {
                if let Some(helper) = workers.iter().enumerate().find(|(j, w)| *j != i && w.is_idle()).map(|(_, w)| w) {
                    self.attempt_work_stealing(helper);
                }
            }
        }
    }

    fn select_worker(&self, policy: SchedulingPolicy) -> Option<&Arc<Worker>> {
        let workers = self.workers();
        if workers.is_empty() {
            return None;
        }
        match policy {
            SchedulingPolicy::RoundRobin => {
                let idx = self.next_worker_index.fetch_add(1, Ordering::Relaxed) % workers.len();
                workers.get(idx)
            }
            SchedulingPolicy::Random => {
                let idx = rand::random::<usize>() % workers.len();
                workers.get(idx)
            }
            SchedulingPolicy::LeastLoaded | SchedulingPolicy::WorkStealing => {
                workers.iter().min_by_key(|w| w.queue_len())
            }
        }
    }
}

/// A fixed pool of worker threads draining priority queues, with
/// victim-favored work stealing between them.
pub struct Scheduler {
    shared: Arc<SchedulerShared>,
    handles: Mutex<Vec<(JoinHandle<()>, Receiver<()>)>>,
    load_balance_thread: Mutex<Option<(JoinHandle<()>, Arc<AtomicBool>)>>,
    initialized: AtomicBool,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_sink(Box::new(monitor_wire::events::NullSink))
    }

    pub fn with_sink(sink: Box<dyn EventSink<SchedulerEvent> + Send + Sync>) -> Self {
        Scheduler {
            shared: Arc::new(SchedulerShared {
                workers: OnceLock::new(),
                policy: Mutex::new(SchedulingPolicy::WorkStealing),
                running: AtomicBool::new(false),
                paused: AtomicBool::new(false),
                work_stealing_enabled: AtomicBool::new(true),
                load_balancing_enabled: AtomicBool::new(true),
                next_task_id: AtomicU64::new(1),
                next_worker_index: AtomicUsize::new(0),
                stealing_attempts: AtomicU64::new(0),
                successful_steals: AtomicU64::new(0),
                idle_worker_count: AtomicUsize::new(0),
                total_tasks_completed: AtomicU64::new(0),
                pool_saturated: AtomicBool::new(false),
                pool_idle: AtomicBool::new(false),
                sink,
            }),
            handles: Mutex::new(Vec::new()),
            load_balance_thread: Mutex::new(None),
            initialized: AtomicBool::new(false),
        }
    }

    /// Build the fixed worker set. `num_threads == 0` auto-detects via
    /// the host's reported parallelism. Cannot be called twice.
    pub fn initialize(&self, num_threads: usize) -> Result<(), SchedulerError> {
        if self.initialized.swap(true, Ordering::AcqRel) {
            return Err(SchedulerError::AlreadyInitialized);
        }
        let num_threads = if num_threads == 0 {
            std::thread::available_parallelism().map(|n| n.get()).unwrap_or(MIN_THREADS)
        } else {
            num_threads
        };
        let num_threads = num_threads.clamp(MIN_THREADS, MAX_THREADS);

        let workers = (0..num_threads)
            .map(|id| Worker::new(id, Arc::downgrade(&self.shared)))
            .collect();
        // initialized flag guards this from ever running twice, so the
        // OnceLock can never see a second write.
        let _ = self.shared.workers.set(workers);
        Ok(())
    }

    pub fn set_scheduling_policy(&self, policy: SchedulingPolicy) {
        *self.shared.policy.lock().unwrap_or_else(|e| e.into_inner()) = policy;
    }

    pub fn set_work_stealing_enabled(&self, enabled: bool) {
        self.shared.work_stealing_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn set_load_balancing_enabled(&self, enabled: bool) {
        self.shared.load_balancing_enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::Relaxed)
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::Relaxed)
    }

    pub fn num_threads(&self) -> usize {
        self.shared.workers().len()
    }

    /// Negative entries unbind that worker (spec.md §4.3: "Negative id
    /// means 'unbind'"). Applied immediately to already-running workers,
    /// not just recorded for the next start.
    pub fn set_cpu_affinity_pattern(&self, core_ids: &[i64]) {
        for (worker, core) in self.shared.workers().iter().zip(core_ids) {
            worker.set_cpu_affinity(*core);
        }
    }

    pub fn start(&self) -> Result<(), SchedulerError> {
        if self.shared.workers().is_empty() {
            return Err(SchedulerError::NotInitialized);
        }
        if self.shared.running.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        self.shared.paused.store(false, Ordering::Relaxed);

        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        for worker in self.shared.workers() {
            handles.push(worker.start());
        }
        drop(handles);

        if self.shared.load_balancing_enabled.load(Ordering::Relaxed) {
            self.spawn_load_balance_thread();
        }
        Ok(())
    }

    fn spawn_load_balance_thread(&self) {
        let stop = Arc::new(AtomicBool::new(false));
        let shared = self.shared.clone();
        let stop_clone = stop.clone();
        let handle = std::thread::Builder::new()
            .name("monitor-sched-balancer".into())
            .spawn(move || {
                while !stop_clone.load(Ordering::Acquire) {
                    std::thread::sleep(DEFAULT_LOAD_BALANCE_INTERVAL);
                    if stop_clone.load(Ordering::Acquire) {
                        break;
                    }
                    shared.perform_load_balance();
                }
            })
            .expect("failed to spawn load-balance thread");
        *self.load_balance_thread.lock().unwrap_or_else(|e| e.into_inner()) = Some((handle, stop));
    }

    pub fn pause(&self) {
        if !self.shared.running.load(Ordering::Relaxed) {
            return;
        }
        self.shared.paused.store(true, Ordering::Relaxed);
    }

    pub fn resume(&self) {
        if !self.shared.running.load(Ordering::Relaxed) || !self.shared.paused.load(Ordering::Relaxed) {
            return;
        }
        self.shared.paused.store(false, Ordering::Relaxed);
        for worker in self.shared.workers() {
            worker.wake();
        }
    }

    pub fn shutdown(&self) {
        if !self.shared.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.shared.paused.store(false, Ordering::Relaxed);

        if let Some((handle, stop)) = self.load_balance_thread.lock().unwrap_or_else(|e| e.into_inner()).take() {
            stop.store(true, Ordering::Release);
            let _ = handle.join();
        }

        for worker in self.shared.workers() {
            worker.request_stop();
        }

        let mut handles = self.handles.lock().unwrap_or_else(|e| e.into_inner());
        for (handle, done_rx) in handles.drain(..) {
            if done_rx.recv_timeout(WORKER_JOIN_DEADLINE).is_ok() {
                let _ = handle.join();
            } else {
                tracing::warn!("worker did not shut down within the deadline");
            }
        }
    }

    /// Submit a fire-and-forget task at the given priority (higher
    /// value runs first). Returns the assigned task id.
    pub fn submit(&self, priority: i32, function: TaskFn) -> Result<u64, SubmitError> {
        if !self.shared.running.load(Ordering::Relaxed) {
            return Err(SubmitError::NotRunning);
        }
        if self.shared.paused.load(Ordering::Relaxed) {
            return Err(SubmitError::Paused);
        }

        let id = self.shared.next_task_id.fetch_add(1, Ordering::Relaxed);
        let task = Task {
            id,
            priority,
            enqueued_at: std::time::Instant::now(),
            function,
        };

        let policy = *self.shared.policy.lock().unwrap_or_else(|e| e.into_inner());
        let workers = self.shared.workers();
        let Some(primary) = self.shared.select_worker(policy) else {
            return Err(SubmitError::QueueFull);
        };

        let mut task = match primary.add_task(task) {
            Ok(()) => return Ok(id),
            Err(task) => task,
        };

        // Primary full: if stealing is allowed, try every other worker in
        // turn before giving up, same fallback the original submitTask used.
        if self.shared.work_stealing_enabled.load(Ordering::Relaxed) {
            tracing::warn!(task_id = id, "primary worker queue full, trying siblings");
            for worker in workers {
                if Arc::ptr_eq(worker, primary) {
                    continue;
                }
                task = match worker.add_task(task) {
                    Ok(()) => return Ok(id),
                    Err(task) => task,
                };
            }
        }
        let _ = task;
        Err(SubmitError::QueueFull)
    }

    pub fn submit_many(&self, tasks: Vec<(i32, TaskFn)>) -> Vec<Result<u64, SubmitError>> {
        tasks
            .into_iter()
            .map(|(priority, function)| self.submit(priority, function))
            .collect()
    }

    /// Wraps `function` as a task and returns a [`TaskHandle`] that
    /// resolves with its return value, or [`crate::future::TaskPanicked`]
    /// if the closure panics — the `spawn(fn) -> Future<R>` convenience
    /// spec.md §4.4 calls for. Submission failure (not running, paused,
    /// every queue full) is reported immediately as a completed,
    /// panicked handle rather than a separate error type, since the
    /// task never ran either way.
    pub fn spawn<R, F>(&self, priority: i32, function: F) -> TaskHandle<R>
    where
        R: Send + 'static,
        F: FnOnce() -> R + Send + 'static,
    {
        let (handle, completion) = future::pair::<R>();
        let wrapped: TaskFn = Box::new(move || {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(function))
                .map_err(|_| TaskPanicked);
            completion.complete(result);
        });
        // If submission fails, `wrapped` (and the `completion` it
        // captured) is simply dropped here; `TaskCompletion`'s Drop
        // impl resolves the handle as `TaskPanicked` instead of
        // leaving `join()`/`poll()` blocked forever.
        let _ = self.submit(priority, wrapped);
        handle
    }

    pub fn get_total_queue_size(&self) -> usize {
        self.shared.total_queue_size()
    }

    pub fn get_total_tasks_processed(&self) -> u64 {
        self.shared.total_tasks_completed.load(Ordering::Relaxed)
    }

    pub fn get_total_tasks_stolen(&self) -> u64 {
        self.shared.workers().iter().map(|w| w.tasks_stolen()).sum()
    }

    pub fn get_worker_queue_sizes(&self) -> Vec<usize> {
        self.shared.workers().iter().map(|w| w.queue_len()).collect()
    }

    pub fn get_worker_idle_states(&self) -> Vec<bool> {
        self.shared.workers().iter().map(|w| w.is_idle()).collect()
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use monitor_wire::events::{EventSink, VecSink};
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;
    use std::sync::Arc as StdArc;

    fn scheduler(num_threads: usize) -> Scheduler {
        let s = Scheduler::new();
        s.initialize(num_threads).unwrap();
        s.start().unwrap();
        s
    }

    #[test]
    fn submit_runs_task() {
        let s = scheduler(2);
        let counter = StdArc::new(StdAtomicUsize::new(0));
        let c = counter.clone();
        s.submit(0, Box::new(move || {
            c.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        s.shutdown();
    }

    #[test]
    fn submit_before_start_fails() {
        let s = Scheduler::new();
        s.initialize(1).unwrap();
        let err = s.submit(0, Box::new(|| {})).unwrap_err();
        assert!(matches!(err, SubmitError::NotRunning));
    }

    #[test]
    fn scenario_s3_worker_priority_order() {
        let s = Scheduler::new();
        s.initialize(1).unwrap();
        s.start().unwrap();

        // Occupy the single worker so the next three submissions queue up
        // behind it instead of racing onto the thread immediately.
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        s.submit(0, Box::new(move || {
            let _ = release_rx.recv();
        }))
        .unwrap();
        std::thread::sleep(Duration::from_millis(20));

        let order = StdArc::new(Mutex::new(Vec::new()));
        for priority in [1, 9, 5] {
            let order = order.clone();
            s.submit(priority, Box::new(move || {
                order.lock().unwrap().push(priority);
            }))
            .unwrap();
        }

        release_tx.send(()).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(*order.lock().unwrap(), vec![9, 5, 1]);
        s.shutdown();
    }

    #[test]
    fn scenario_s4_idle_worker_steals() {
        let sink = StdArc::new(VecSink::<SchedulerEvent>::new());
        let s = Scheduler::with_sink(Box::new(sink.clone()));
        s.initialize(2).unwrap();
        s.set_scheduling_policy(SchedulingPolicy::RoundRobin);
        s.start().unwrap();

        // Worker 0 gets tied up on a blocking task, then two more behind
        // it; worker 1 gets three quick ones, drains, and should steal
        // from worker 0's backlog once idle.
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        s.submit(0, Box::new(move || {
            let _ = release_rx.recv();
        }))
        .unwrap();
        for _ in 0..5 {
            s.submit(0, Box::new(|| {
                std::thread::sleep(Duration::from_millis(10));
            }))
            .unwrap();
        }
        std::thread::sleep(Duration::from_millis(80));
        release_tx.send(()).unwrap();
        std::thread::sleep(Duration::from_millis(150));

        assert_eq!(s.get_total_queue_size(), 0);
        assert!(sink
            .drain()
            .iter()
            .any(|e| matches!(e, SchedulerEvent::WorkStealingOccurred { .. })));
        s.shutdown();
    }

    #[test]
    fn spawn_resolves_with_the_closures_return_value() {
        let s = scheduler(1);
        let handle = s.spawn(0, || 2 + 2);
        assert_eq!(handle.join(), Ok(4));
        s.shutdown();
    }

    #[test]
    fn spawn_propagates_a_panic_through_the_handle() {
        let s = scheduler(1);
        let handle: TaskHandle<()> = s.spawn(0, || panic!("boom"));
        assert_eq!(handle.join(), Err(TaskPanicked));
        s.shutdown();
    }

    #[test]
    fn spawn_before_start_resolves_as_panicked_instead_of_hanging() {
        let s = Scheduler::new();
        s.initialize(1).unwrap();
        let handle = s.spawn(0, || 1);
        assert_eq!(handle.join(), Err(TaskPanicked));
    }

    #[test]
    fn pause_stops_dequeuing_but_keeps_queued_tasks() {
        let s = scheduler(1);
        s.pause();

        let counter = StdArc::new(StdAtomicUsize::new(0));
        let c = counter.clone();
        // submit() itself rejects while paused (spec.md §4.4 submission
        // contract); queue a task before pausing to exercise the
        // "workers do not dequeue" half of the lifecycle description.
        s.resume();
        s.pause();
        assert!(matches!(
            s.submit(0, Box::new(move || {
                c.fetch_add(1, Ordering::SeqCst);
            })),
            Err(SubmitError::Paused)
        ));

        // Queue a task the direct way the public API can't: through resume,
        // submit, then re-pause before the worker gets to it.
        s.resume();
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(0);
        s.submit(0, Box::new(move || {
            let _ = release_rx.recv();
        }))
        .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let counter2 = StdArc::new(StdAtomicUsize::new(0));
        let c2 = counter2.clone();
        s.submit(0, Box::new(move || {
            c2.fetch_add(1, Ordering::SeqCst);
        }))
        .unwrap();
        s.pause();
        release_tx.send(()).unwrap();

        std::thread::sleep(Duration::from_millis(150));
        assert_eq!(counter2.load(Ordering::SeqCst), 0);
        assert_eq!(s.get_total_queue_size(), 1);

        s.resume();
        std::thread::sleep(Duration::from_millis(80));
        assert_eq!(counter2.load(Ordering::SeqCst), 1);
        s.shutdown();
    }

    #[test]
    fn worker_queue_sizes_and_idle_states_report() {
        let s = Scheduler::new();
        s.initialize(2).unwrap();
        assert_eq!(s.get_worker_queue_sizes().len(), 2);
        s.start().unwrap();
        assert_eq!(s.get_worker_idle_states().len(), 2);
        s.shutdown();
    }

    #[test]
    fn pool_saturated_fires_once_per_crossing() {
        // Scheduler never started: nothing drains the queues we push
        // into directly, so total_queue_size holds still between calls.
        let sink = StdArc::new(VecSink::<SchedulerEvent>::new());
        let s = Scheduler::with_sink(Box::new(sink.clone()));
        s.initialize(1).unwrap();
        let worker = s.shared.workers()[0].clone();

        for _ in 0..(SATURATION_THRESHOLD + 1) {
            worker.add_task(Task { id: 0, priority: 0, enqueued_at: std::time::Instant::now(), function: Box::new(|| {}) }).unwrap();
        }

        // Repeated ticks over threshold must not re-emit until the total
        // drops back under it and crosses again.
        for _ in 0..3 {
            s.shared.check_pool_state();
        }
        let saturated_count = |sink: &VecSink<SchedulerEvent>| {
            sink.drain()
                .into_iter()
                .filter(|e| matches!(e, SchedulerEvent::PoolSaturated { .. }))
                .count()
        };
        assert_eq!(saturated_count(&sink), 1);

        // Drain back under the threshold via real steals, then refill to
        // cross it again: a second, distinct event.
        while worker.queue_len() > SATURATION_THRESHOLD {
            worker.steal().unwrap();
        }
        s.shared.check_pool_state();
        assert_eq!(saturated_count(&sink), 0);

        worker.add_task(Task { id: 0, priority: 0, enqueued_at: std::time::Instant::now(), function: Box::new(|| {}) }).unwrap();
        s.shared.check_pool_state();
        assert_eq!(saturated_count(&sink), 1);
    }

    #[test]
    fn set_cpu_affinity_accepts_negative_unbind() {
        let s = Scheduler::new();
        s.initialize(1).unwrap();
        s.set_cpu_affinity_pattern(&[-1]);
        assert_eq!(s.shared.workers()[0].cpu_affinity(), -1);
    }
}
