//! # Source Events
//!
//! Everything a `PacketSource` pushes through its `EventSink`. Emission
//! happens on the source's own thread; a consumer that needs
//! cross-thread delivery should hand the source a
//! `monitor_wire::events::ChannelSink`-backed sink (spec §6, "queued
//! delivery mode").

use std::sync::Arc;

use monitor_wire::ErrorKind;

use crate::factory::Packet;
use crate::stats::NetworkStatisticsSnapshot;
use crate::state::SocketState;

#[derive(Debug, Clone)]
pub enum SourceEvent {
    PacketReady(Arc<Packet>),
    Error { kind: ErrorKind, message: String },
    StatisticsUpdated(NetworkStatisticsSnapshot),
    SocketStateChanged(SocketState),
    /// UDP only.
    MulticastStatusChanged(bool),
    /// TCP only.
    Connected,
    /// TCP only.
    Disconnected,
    /// TCP only.
    ConnectionFailed,
}
