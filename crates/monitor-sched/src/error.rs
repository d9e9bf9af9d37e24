use monitor_wire::{ErrorKind, ErrorTag};

#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    #[error("scheduler already initialized")]
    AlreadyInitialized,
    #[error("scheduler has no workers, call initialize() first")]
    NotInitialized,
}

impl ErrorTag for SchedulerError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SubmitError {
    #[error("scheduler is not running")]
    NotRunning,
    #[error("scheduler is paused")]
    Paused,
    #[error("every worker queue is full")]
    QueueFull,
}

impl ErrorTag for SubmitError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ResourceExhaustion
    }
}
