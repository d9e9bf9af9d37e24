//! # Packet Wire Header
//!
//! Fixed-layout header shared by every packet source. No QUIC-style
//! VarInt here — the ingestion core's peers are fixed-format binary
//! feeds, not a tunable transport, so the layout is a flat struct.
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                              id                               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           sequence                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                      timestamp_ns (64-bit)                     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                         payload_size                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                            flags                                |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```

use bytes::{Buf, BufMut};

/// Header size in bytes: 4 (id) + 4 (sequence) + 8 (timestamp) + 4
/// (payload_size) + 4 (flags).
pub const HEADER_SIZE: usize = 24;

/// Flags bitfield. `TestData` is the only flag the core itself
/// inspects; the rest are reserved for the packet factory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PacketFlags(pub u32);

impl PacketFlags {
    pub const TEST_DATA: u32 = 0x0000_0001;

    pub fn new(bits: u32) -> Self {
        PacketFlags(bits)
    }

    pub fn contains(self, bit: u32) -> bool {
        self.0 & bit != 0
    }

    pub fn with(self, bit: u32) -> Self {
        PacketFlags(self.0 | bit)
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

/// The fixed packet header. All multi-byte fields are host-endian —
/// every source in a deployment agrees on byte order per spec.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    pub id: u32,
    pub sequence: u32,
    pub timestamp_ns: u64,
    pub payload_size: u32,
    pub flags: PacketFlags,
}

/// Errors that can occur while decoding a header from raw bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HeaderDecodeError {
    #[error("buffer shorter than header size ({HEADER_SIZE} bytes)")]
    Undersized,
}

impl PacketHeader {
    pub fn new(id: u32, sequence: u32, timestamp_ns: u64, payload_size: u32) -> Self {
        PacketHeader {
            id,
            sequence,
            timestamp_ns,
            payload_size,
            flags: PacketFlags::default(),
        }
    }

    pub fn with_flags(mut self, flags: PacketFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn is_test_data(&self) -> bool {
        self.flags.contains(PacketFlags::TEST_DATA)
    }

    /// Total on-wire length of header + payload.
    pub fn total_len(&self) -> usize {
        HEADER_SIZE + self.payload_size as usize
    }

    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u32(self.id);
        buf.put_u32(self.sequence);
        buf.put_u64(self.timestamp_ns);
        buf.put_u32(self.payload_size);
        buf.put_u32(self.flags.0);
    }

    /// Decode a header from the front of `buf`. Does not consume `buf`
    /// unless decoding succeeds — callers may retry once more bytes
    /// arrive.
    pub fn decode(buf: &[u8]) -> Result<Self, HeaderDecodeError> {
        if buf.len() < HEADER_SIZE {
            return Err(HeaderDecodeError::Undersized);
        }
        let mut cur = buf;
        let id = cur.get_u32();
        let sequence = cur.get_u32();
        let timestamp_ns = cur.get_u64();
        let payload_size = cur.get_u32();
        let flags = PacketFlags(cur.get_u32());
        Ok(PacketHeader {
            id,
            sequence,
            timestamp_ns,
            payload_size,
            flags,
        })
    }
}
