//! # NetworkConfig
//!
//! Every recognised option for a UDP or TCP packet source, transcribed
//! field-for-field from the original `NetworkConfig` struct. Validity
//! is a pure predicate ([`NetworkConfig::is_valid`]); construction never
//! fails, since a config can be built incrementally before it's valid
//! (e.g. a UI form mid-edit) — the source's `start()` is what actually
//! enforces validity.

use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

/// Transport protocol for a packet source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Protocol {
    Udp,
    Tcp,
}

impl Protocol {
    /// Parses the case-insensitive wire string, defaulting to UDP on
    /// anything unrecognised (matches `stringToProtocol`'s forgiving
    /// fallback).
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("tcp") {
            Protocol::Tcp
        } else {
            Protocol::Udp
        }
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Protocol::Udp => "UDP",
            Protocol::Tcp => "TCP",
        })
    }
}

/// Addressing, multicast, performance, QoS, and TCP-connection settings
/// for one packet source. Field groups mirror the persistent
/// representation's `multicast`/`performance`/`qos`/`connection` nesting
/// even though this struct itself is flat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub name: String,
    pub protocol: Protocol,

    pub local_address: Ipv4Addr,
    pub local_port: u16,
    pub remote_address: Ipv4Addr,
    pub remote_port: u16,
    pub network_interface: Option<String>,

    // multicast (UDP only)
    pub enable_multicast: bool,
    pub multicast_group: Ipv4Addr,
    pub multicast_ttl: u32,

    // performance
    pub receive_buffer_size: usize,
    pub socket_timeout_ms: u64,
    pub max_packet_size: usize,
    pub enable_timestamping: bool,
    /// Packets/sec shaper applied by the source's rate limiter; 0 means
    /// unlimited. Not present on the original's `NetworkConfig` (it
    /// lived on a base source-configuration type); folded in here so
    /// the whole rate-limiting contract has one home.
    pub max_packet_rate: u32,

    // QoS
    pub type_of_service: u8,
    pub priority: i32,

    // connection (TCP only)
    pub enable_keep_alive: bool,
    pub keep_alive_interval_s: u32,
    pub connect_timeout_ms: u64,
    pub max_reconnect_attempts: u32,
    pub reconnect_interval_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            name: "Default".to_string(),
            protocol: Protocol::Udp,
            local_address: Ipv4Addr::UNSPECIFIED,
            local_port: 8080,
            remote_address: Ipv4Addr::LOCALHOST,
            remote_port: 8081,
            network_interface: None,
            enable_multicast: false,
            multicast_group: Ipv4Addr::new(224, 0, 0, 1),
            multicast_ttl: 1,
            receive_buffer_size: 1_048_576,
            socket_timeout_ms: 1000,
            max_packet_size: 65_536,
            enable_timestamping: true,
            max_packet_rate: 0,
            type_of_service: 0,
            priority: 0,
            enable_keep_alive: true,
            keep_alive_interval_s: 30,
            connect_timeout_ms: 5000,
            max_reconnect_attempts: 3,
            reconnect_interval_ms: 1000,
        }
    }
}

impl NetworkConfig {
    /// Named constructor for a unicast UDP source.
    pub fn udp(name: impl Into<String>, local_address: Ipv4Addr, local_port: u16) -> Self {
        NetworkConfig {
            name: name.into(),
            protocol: Protocol::Udp,
            local_address,
            local_port,
            ..Default::default()
        }
    }

    /// Named constructor for a TCP source.
    pub fn tcp(name: impl Into<String>, remote_address: Ipv4Addr, remote_port: u16) -> Self {
        NetworkConfig {
            name: name.into(),
            protocol: Protocol::Tcp,
            remote_address,
            remote_port,
            ..Default::default()
        }
    }

    /// Named constructor for a multicast UDP source, joined on `port`
    /// for both local and remote (the original reuses the port both
    /// ways for a multicast listener).
    pub fn multicast(name: impl Into<String>, group: Ipv4Addr, port: u16) -> Self {
        NetworkConfig {
            name: name.into(),
            protocol: Protocol::Udp,
            enable_multicast: true,
            multicast_group: group,
            local_port: port,
            remote_port: port,
            ..Default::default()
        }
    }

    /// Pure validity predicate. Does not mutate, does not panic.
    pub fn is_valid(&self) -> bool {
        if self.protocol == Protocol::Udp && self.local_port == 0 {
            return false;
        }
        if self.protocol == Protocol::Tcp && self.remote_port == 0 {
            return false;
        }
        if self.enable_multicast && !is_multicast(self.multicast_group) {
            return false;
        }
        if !(1024..=67_108_864).contains(&self.receive_buffer_size) {
            return false;
        }
        if !(64..=65_536).contains(&self.max_packet_size) {
            return false;
        }
        true
    }
}

/// 224.0.0.0/4.
fn is_multicast(addr: Ipv4Addr) -> bool {
    (addr.octets()[0] & 0xF0) == 224
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(NetworkConfig::default().is_valid());
    }

    #[test]
    fn udp_requires_nonzero_local_port() {
        let mut c = NetworkConfig::udp("t", Ipv4Addr::UNSPECIFIED, 0);
        assert!(!c.is_valid());
        c.local_port = 9000;
        assert!(c.is_valid());
    }

    #[test]
    fn tcp_requires_nonzero_remote_port() {
        let c = NetworkConfig::tcp("t", Ipv4Addr::LOCALHOST, 0);
        assert!(!c.is_valid());
    }

    #[test]
    fn multicast_group_must_be_in_class_d() {
        let mut c = NetworkConfig::multicast("t", Ipv4Addr::new(10, 0, 0, 1), 9000);
        assert!(!c.is_valid());
        c.multicast_group = Ipv4Addr::new(239, 1, 2, 3);
        assert!(c.is_valid());
    }

    #[test]
    fn buffer_and_packet_size_bounds_enforced() {
        let mut c = NetworkConfig::udp("t", Ipv4Addr::UNSPECIFIED, 9000);
        c.receive_buffer_size = 512;
        assert!(!c.is_valid());
        c.receive_buffer_size = 1024;
        c.max_packet_size = 32;
        assert!(!c.is_valid());
        c.max_packet_size = 65_536;
        assert!(c.is_valid());
    }

    #[test]
    fn protocol_parse_is_case_insensitive_and_defaults_udp() {
        assert_eq!(Protocol::parse("tcp"), Protocol::Tcp);
        assert_eq!(Protocol::parse("TCP"), Protocol::Tcp);
        assert_eq!(Protocol::parse("garbage"), Protocol::Udp);
    }

    // S6 — NetworkConfig round-trip.
    #[test]
    fn scenario_s6_config_round_trip() {
        let c = NetworkConfig {
            name: "TestConfig".to_string(),
            protocol: Protocol::Tcp,
            local_port: 12345,
            remote_address: Ipv4Addr::new(10, 0, 0, 100),
            remote_port: 54321,
            enable_multicast: true,
            multicast_group: Ipv4Addr::new(224, 1, 2, 3),
            multicast_ttl: 5,
            receive_buffer_size: 2_097_152,
            max_packet_size: 2048,
            enable_keep_alive: false,
            ..Default::default()
        };
        assert!(c.is_valid());

        let json = serde_json::to_string(&c).unwrap();
        let round_tripped: NetworkConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(round_tripped, c);
    }
}
