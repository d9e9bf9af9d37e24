//! A unit of scheduled work.

use std::time::Instant;

/// The function a worker executes. Boxed once at submission time.
pub type TaskFn = Box<dyn FnOnce() + Send + 'static>;

pub struct Task {
    pub id: u64,
    pub priority: i32,
    pub enqueued_at: Instant,
    pub function: TaskFn,
}

impl std::fmt::Debug for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("priority", &self.priority)
            .field("enqueued_at", &self.enqueued_at)
            .finish_non_exhaustive()
    }
}
