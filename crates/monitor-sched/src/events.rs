use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SchedulerEvent {
    TaskCompleted { task_id: u64, execution_time: Duration },
    /// A panic was caught inside a task's closure.
    TaskFaulted { task_id: u64 },
    WorkStealingOccurred { from_worker: usize, to_worker: usize },
    WorkerIdle { worker_id: usize },
    WorkerBusy { worker_id: usize },
    PoolSaturated { total_queue_size: usize },
    PoolIdle,
}
