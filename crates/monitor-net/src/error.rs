//! # Error Taxonomy
//!
//! One enum covering every fault a source can raise, tagged with the
//! shared [`monitor_wire::ErrorKind`] so a consumer can dispatch on
//! severity without matching every variant.

use monitor_wire::{ErrorKind, ErrorTag};

#[derive(Debug, thiserror::Error)]
pub enum NetError {
    #[error("invalid network configuration: {0}")]
    Configuration(String),

    #[error("socket bind failed: {0}")]
    BindFailed(std::io::Error),

    #[error("transient network error: {0}")]
    Transient(std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("reconnect budget exhausted after {attempts} attempts")]
    ReconnectExhausted { attempts: u32 },

    #[error("source already running")]
    AlreadyRunning,

    #[error("source is not running")]
    NotRunning,

    #[error("source is in the Error state; call stop() before restarting")]
    InErrorState,
}

impl ErrorTag for NetError {
    fn kind(&self) -> ErrorKind {
        match self {
            NetError::Configuration(_) => ErrorKind::Configuration,
            NetError::BindFailed(_) | NetError::ReconnectExhausted { .. } => ErrorKind::Fatal,
            NetError::Transient(_) => ErrorKind::Transient,
            NetError::Protocol(_) => ErrorKind::Protocol,
            NetError::AlreadyRunning | NetError::NotRunning | NetError::InErrorState => {
                ErrorKind::Configuration
            }
        }
    }
}

/// Returned by a [`crate::factory::PacketFactory`] on malformed input.
/// Always non-fatal from the source's perspective — counted as a
/// `packet_errors` increment, never propagated.
#[derive(Debug, Clone, thiserror::Error)]
#[error("packet factory rejected input: {0}")]
pub struct FactoryError(pub String);
