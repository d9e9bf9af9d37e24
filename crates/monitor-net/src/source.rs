//! # PacketSource (C5)
//!
//! Lifecycle contract shared by [`crate::udp::UdpSource`] and
//! [`crate::tcp::TcpSource`]. Public operations other than construction
//! are lifecycle calls only — a source is single-threaded internally
//! (spec §5); the caller must serialise concurrent lifecycle calls if
//! it makes them from more than one thread.

use crate::error::NetError;
use crate::stats::NetworkStatisticsSnapshot;
use crate::state::SourceState;

pub trait PacketSource: Send {
    fn start(&self) -> Result<(), NetError>;
    fn stop(&self);
    fn pause(&self);
    fn resume(&self) -> Result<(), NetError>;
    fn state(&self) -> SourceState;
    fn statistics(&self) -> NetworkStatisticsSnapshot;
}
