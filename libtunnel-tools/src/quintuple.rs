use std::fmt;
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::layers::TransportLayerType;
use crate::triple::Triple;

/// Directional flow identifier: source and destination endpoints, and transport protocol
///
/// No canonical ordering is applied: `a -> b` and `b -> a` are different keys.
/// Use [`Quintuple::reverse`] to look up the opposite direction.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Quintuple {
    pub src_ip: IpAddr,
    pub src_port: u16,
    pub dst_ip: IpAddr,
    pub dst_port: u16,
    pub protocol: TransportLayerType,
}

impl Quintuple {
    pub fn new(src: SocketAddr, dst: SocketAddr, protocol: TransportLayerType) -> Self {
        Quintuple {
            src_ip: src.ip(),
            src_port: src.port(),
            dst_ip: dst.ip(),
            dst_port: dst.port(),
            protocol,
        }
    }

    pub fn reverse(&self) -> Quintuple {
        Quintuple {
            src_ip: self.dst_ip,
            src_port: self.dst_port,
            dst_ip: self.src_ip,
            dst_port: self.src_port,
            protocol: self.protocol,
        }
    }

    pub fn src(&self) -> Triple {
        Triple::new(self.src_ip, self.src_port, self.protocol)
    }

    pub fn dst(&self) -> Triple {
        Triple::new(self.dst_ip, self.dst_port, self.protocol)
    }
}

impl fmt::Display for Quintuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} -> {} [{}]",
            SocketAddr::new(self.src_ip, self.src_port),
            SocketAddr::new(self.dst_ip, self.dst_port),
            self.protocol
        )
    }
}
