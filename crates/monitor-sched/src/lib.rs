//! # monitor-sched
//!
//! A fixed-size pool of worker threads, each draining its own priority
//! queue, with victim-favored work stealing between them. Two
//! independent triggers feed stealing: a worker going idle tries to
//! steal immediately, and a periodic sweep nudges idle workers toward
//! backlogged siblings. See [`scheduler::Scheduler`] for the entry
//! point.

mod affinity;
mod error;
mod events;
mod future;
mod queue;
mod scheduler;
mod task;
mod worker;

pub use error::{SchedulerError, SubmitError};
pub use events::SchedulerEvent;
pub use future::{TaskHandle, TaskPanicked};
pub use scheduler::{Scheduler, SchedulingPolicy, MAX_THREADS, MIN_THREADS, SATURATION_THRESHOLD};
pub use task::TaskFn;
