//! # Reference PacketFactory (C8)
//!
//! spec.md treats the packet factory as an external collaborator,
//! specified only by its `(bytes) -> Result<Packet, Error>` contract
//! (`monitor_net::PacketFactory`). This is a reference implementation
//! that exercises the rest of the contract: it decodes the shared wire
//! header, validates `payload_size` against both the datagram length
//! and the backing block's capacity, and — when built with
//! [`PooledPacketFactory::new`] — pulls the payload's storage straight
//! out of a [`monitor_pool::BlockPool`] instead of a fresh heap
//! allocation per packet, the whole point of C1/C2 existing.

use std::sync::Arc;

use bytes::Bytes;

use monitor_net::error::FactoryError;
use monitor_net::factory::{Packet, PacketFactory};
use monitor_pool::{Block, BlockPool};
use monitor_wire::{PacketHeader, HEADER_SIZE};

/// Wraps a checked-out [`Block`] as the owner behind a [`Bytes`], so
/// the block returns to its pool's free list the moment the last
/// `Bytes` clone referencing it is dropped — no separate "give the
/// block back" call for a factory or downstream consumer to forget.
struct PooledStorage {
    pool: Arc<BlockPool>,
    block: Option<Block>,
}

impl AsRef<[u8]> for PooledStorage {
    fn as_ref(&self) -> &[u8] {
        self.block.as_ref().expect("block taken only on drop").as_slice()
    }
}

impl Drop for PooledStorage {
    fn drop(&mut self) {
        if let Some(block) = self.block.take() {
            self.pool.release(block);
        }
    }
}

/// Decodes raw bytes into a [`Packet`], sourcing payload storage from a
/// named pool in a [`monitor_pool::BlockPoolRegistry`]. Falls back to a
/// plain heap-backed `Bytes` copy when the pool is exhausted — a
/// factory failure here would turn back-pressure at C1 into a
/// `packet_errors` increment at the source, which is worse than a
/// slower allocation for a system with a zero-loss goal.
pub struct PooledPacketFactory {
    pool: Arc<BlockPool>,
}

impl PooledPacketFactory {
    pub fn new(pool: Arc<BlockPool>) -> Self {
        PooledPacketFactory { pool }
    }
}

impl PacketFactory for PooledPacketFactory {
    fn create_from_raw(&self, bytes: &[u8]) -> Result<Packet, FactoryError> {
        let header = decode_and_validate(bytes)?;
        let payload_src = &bytes[HEADER_SIZE..HEADER_SIZE + header.payload_size as usize];

        let payload = match self.pool.acquire() {
            Some(mut block) if block.len() >= payload_src.len() => {
                block.as_mut_slice()[..payload_src.len()].copy_from_slice(payload_src);
                let storage = PooledStorage {
                    pool: self.pool.clone(),
                    block: Some(block),
                };
                Bytes::from_owner(storage).slice(0..payload_src.len())
            }
            Some(block) => {
                // Block smaller than this packet's payload: release it
                // unused and fall back, rather than truncate a payload.
                self.pool.release(block);
                Bytes::copy_from_slice(payload_src)
            }
            None => Bytes::copy_from_slice(payload_src),
        };

        Ok(Packet { header, payload })
    }
}

/// A plain heap-allocating factory with the same header/length
/// validation, for callers that don't want pool wiring (tests, or a
/// source configuration with no registered pool).
pub struct SimplePacketFactory;

impl PacketFactory for SimplePacketFactory {
    fn create_from_raw(&self, bytes: &[u8]) -> Result<Packet, FactoryError> {
        let header = decode_and_validate(bytes)?;
        let payload =
            Bytes::copy_from_slice(&bytes[HEADER_SIZE..HEADER_SIZE + header.payload_size as usize]);
        Ok(Packet { header, payload })
    }
}

fn decode_and_validate(bytes: &[u8]) -> Result<PacketHeader, FactoryError> {
    let header = PacketHeader::decode(bytes).map_err(|e| FactoryError(e.to_string()))?;
    let expected_total = header.total_len();
    if bytes.len() < expected_total {
        return Err(FactoryError(format!(
            "payload_size {} claims {expected_total} total bytes but only {} were given",
            header.payload_size,
            bytes.len()
        )));
    }
    Ok(header)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn datagram(id: u32, sequence: u32, payload: &[u8]) -> Vec<u8> {
        let header = PacketHeader::new(id, sequence, 0, payload.len() as u32);
        let mut buf = Vec::new();
        header.encode(&mut buf);
        buf.extend_from_slice(payload);
        buf
    }

    #[test]
    fn simple_factory_decodes_header_and_payload() {
        let factory = SimplePacketFactory;
        let datagram = datagram(1, 2, b"hello");
        let packet = factory.create_from_raw(&datagram).unwrap();
        assert_eq!(packet.header.id, 1);
        assert_eq!(packet.header.sequence, 2);
        assert_eq!(&packet.payload[..], b"hello");
    }

    #[test]
    fn simple_factory_rejects_truncated_payload() {
        let factory = SimplePacketFactory;
        let mut datagram = datagram(1, 2, b"hello world");
        datagram.truncate(datagram.len() - 3);
        assert!(factory.create_from_raw(&datagram).is_err());
    }

    #[test]
    fn pooled_factory_round_trips_and_releases_on_drop() {
        let pool = Arc::new(BlockPool::new(64, 2).unwrap());
        let factory = PooledPacketFactory::new(pool.clone());
        let datagram = datagram(7, 0, b"pooled payload");

        let packet = factory.create_from_raw(&datagram).unwrap();
        assert_eq!(&packet.payload[..], b"pooled payload");
        assert_eq!(pool.get_available_blocks(), 1);

        drop(packet);
        assert_eq!(pool.get_available_blocks(), 2);
    }

    #[test]
    fn pooled_factory_falls_back_when_pool_exhausted() {
        let pool = Arc::new(BlockPool::new(64, 1).unwrap());
        let _held = pool.acquire().unwrap();
        let factory = PooledPacketFactory::new(pool.clone());
        let datagram = datagram(1, 0, b"still decodes");
        let packet = factory.create_from_raw(&datagram).unwrap();
        assert_eq!(&packet.payload[..], b"still decodes");
    }
}
