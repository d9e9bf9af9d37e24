//! # PacketFactory (C8, external)
//!
//! The trait a source hands raw bytes to once framing has carved out a
//! candidate packet region. Stateless from the source's point of view
//! — a factory may itself reach into a `BlockPoolRegistry`, but the
//! source never knows or cares. Defined here rather than in
//! `monitor-app` (which holds the reference implementation) so that
//! `UdpSource`/`TcpSource` can depend on the trait without depending on
//! the application-wiring crate that assembles them.

use bytes::Bytes;

use monitor_wire::PacketHeader;

use crate::error::FactoryError;

/// A decoded packet: header plus owned payload bytes.
#[derive(Debug, Clone)]
pub struct Packet {
    pub header: PacketHeader,
    pub payload: Bytes,
}

/// `(bytes) -> Result<Packet, Error>`. Any failure is counted as a
/// `packet_errors` increment by the caller; it is never fatal to the
/// source.
pub trait PacketFactory: Send + Sync {
    fn create_from_raw(&self, bytes: &[u8]) -> Result<Packet, FactoryError>;
}
