use std::fmt;

use serde::{Deserialize, Serialize};

pub const ETHERTYPE_IPV4: u16 = 0x0800;
pub const ETHERTYPE_IPV6: u16 = 0x86DD;

pub const IPPROTO_TCP: u8 = 6;
pub const IPPROTO_UDP: u8 = 17;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub enum LinkLayerType {
    Loopback,
    Ethernet,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[repr(u16)]
pub enum NetworkLayerType {
    Ipv4 = ETHERTYPE_IPV4,
    Ipv6 = ETHERTYPE_IPV6,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[repr(u8)]
pub enum TransportLayerType {
    Tcp = IPPROTO_TCP,
    Udp = IPPROTO_UDP,
}

impl NetworkLayerType {
    /// Map an EtherType to a supported network layer
    pub fn from_ethertype(ethertype: u16) -> Option<Self> {
        match ethertype {
            ETHERTYPE_IPV4 => Some(NetworkLayerType::Ipv4),
            ETHERTYPE_IPV6 => Some(NetworkLayerType::Ipv6),
            _ => None,
        }
    }

    #[inline]
    pub fn ethertype(self) -> u16 {
        self as u16
    }
}

impl TransportLayerType {
    /// Map an IP protocol number to a supported transport layer
    pub fn from_protocol(proto: u8) -> Option<Self> {
        match proto {
            IPPROTO_TCP => Some(TransportLayerType::Tcp),
            IPPROTO_UDP => Some(TransportLayerType::Udp),
            _ => None,
        }
    }

    #[inline]
    pub fn protocol(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for LinkLayerType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LinkLayerType::Loopback => f.write_str("Loopback"),
            LinkLayerType::Ethernet => f.write_str("Ethernet"),
        }
    }
}

impl fmt::Display for NetworkLayerType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            NetworkLayerType::Ipv4 => f.write_str("IPv4"),
            NetworkLayerType::Ipv6 => f.write_str("IPv6"),
        }
    }
}

impl fmt::Display for TransportLayerType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransportLayerType::Tcp => f.write_str("TCP"),
            TransportLayerType::Udp => f.write_str("UDP"),
        }
    }
}
