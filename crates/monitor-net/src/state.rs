//! # Source Lifecycle States

/// Lifecycle state of a [`crate::source::PacketSource`]. `Error` is
/// terminal except through an explicit `stop()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceState {
    Stopped,
    Running,
    Paused,
    Error,
}

/// Connection sub-state for a TCP source, reported alongside
/// `socketStateChanged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Reconnecting,
    Failed,
}

/// Coarse socket diagnostic snapshot, grounded on `UdpSource::getSocketState()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SocketState {
    Uninitialized,
    Bound,
    Connected,
    Closing,
    Unknown,
}

impl std::fmt::Display for SocketState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            SocketState::Uninitialized => "uninitialized",
            SocketState::Bound => "bound",
            SocketState::Connected => "connected",
            SocketState::Closing => "closing",
            SocketState::Unknown => "unknown",
        })
    }
}
