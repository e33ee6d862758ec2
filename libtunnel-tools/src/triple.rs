use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::layers::TransportLayerType;

/// Flow endpoint as seen by NAT: IP address, port and transport protocol
///
/// The protocol is part of the key, so TCP and UDP endpoints on the same
/// address and port are distinct.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct Triple {
    pub ip: IpAddr,
    pub port: u16,
    pub protocol: TransportLayerType,
}

impl Triple {
    pub fn new(ip: IpAddr, port: u16, protocol: TransportLayerType) -> Self {
        Triple { ip, port, protocol }
    }

    pub fn from_socket_addr(addr: SocketAddr, protocol: TransportLayerType) -> Self {
        Triple {
            ip: addr.ip(),
            port: addr.port(),
            protocol,
        }
    }

    #[inline]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

impl fmt::Display for Triple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} [{}]", self.socket_addr(), self.protocol)
    }
}
