//! # Error Taxonomy
//!
//! The kinds below are shared across every crate in the core so that a
//! consumer can match on `kind()` without caring which component raised
//! the error. Concrete error enums in `monitor-pool`/`monitor-sched`/
//! `monitor-net` each implement [`ErrorTag`].

use std::fmt;

/// A stable, loggable tag for an error condition. Every fatal `error`
/// event carries exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Invalid configuration values, raised at construction or start().
    Configuration,
    /// Block pool empty, worker queue full — a value, never an exception.
    ResourceExhaustion,
    /// Transient network failure: read/write error, peer close mid-stream.
    Transient,
    /// Malformed header, impossible payload_size, undersized datagram.
    Protocol,
    /// Bind failure, reconnect budget exhausted — transitions to Error.
    Fatal,
    /// Panic inside a scheduled task, caught inside the worker.
    TaskFault,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Configuration => "configuration",
            ErrorKind::ResourceExhaustion => "resource_exhaustion",
            ErrorKind::Transient => "transient",
            ErrorKind::Protocol => "protocol",
            ErrorKind::Fatal => "fatal",
            ErrorKind::TaskFault => "task_fault",
        };
        f.write_str(s)
    }
}

/// Implemented by every error enum in the core so callers can recover
/// the stable tag without matching every variant by name.
pub trait ErrorTag {
    fn kind(&self) -> ErrorKind;
}
