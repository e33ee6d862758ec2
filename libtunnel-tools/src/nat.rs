use std::fmt;
use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

/// Identifier of a connection held in a registry owned by the orchestrator
///
/// The generation is bumped each time a slot is reused, so an id that outlived
/// its connection fails to resolve instead of naming a different connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
pub struct ConnId {
    index: u32,
    generation: u32,
}

impl ConnId {
    pub const fn new(index: u32, generation: u32) -> Self {
        ConnId { index, generation }
    }

    #[inline]
    pub fn index(self) -> usize {
        self.index as usize
    }

    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ConnId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

/// Where to deliver return traffic for an observed flow
///
/// `encapsulated_src` is only set when the observed flow is tunnel traffic: it
/// holds the source endpoint of the inner packet.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct NatIndicator {
    pub src: SocketAddr,
    pub encapsulated_src: Option<SocketAddr>,
    pub conn: ConnId,
}

impl NatIndicator {
    /// Indicator for plain (non-tunneled) traffic
    pub fn new(src: SocketAddr, conn: ConnId) -> Self {
        NatIndicator {
            src,
            encapsulated_src: None,
            conn,
        }
    }

    /// Indicator for tunnel traffic, remembering the inner source endpoint
    pub fn encapsulated(src: SocketAddr, encapsulated_src: SocketAddr, conn: ConnId) -> Self {
        NatIndicator {
            src,
            encapsulated_src: Some(encapsulated_src),
            conn,
        }
    }

    #[inline]
    pub fn is_encapsulated(&self) -> bool {
        self.encapsulated_src.is_some()
    }
}
