use std::time::Duration;

use libtunnel_tools::Error;
use pcap_parser::Linktype;

use crate::frame::{Frame, Framing};
use crate::indicator::PacketIndicator;

/// Owned bytes of one captured frame, with its capture metadata
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CapturedPacket {
    data: Vec<u8>,
    link_type: Linktype,
    ts: Duration,
    origlen: u32,
}

impl CapturedPacket {
    /// Packet with no timestamp, whose original length is its captured length
    pub fn new(data: Vec<u8>, link_type: Linktype) -> Self {
        let origlen = data.len() as u32;
        CapturedPacket {
            data,
            link_type,
            ts: Duration::ZERO,
            origlen,
        }
    }

    pub fn with_metadata(data: Vec<u8>, link_type: Linktype, ts: Duration, origlen: u32) -> Self {
        CapturedPacket {
            data,
            link_type,
            ts,
            origlen,
        }
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    #[inline]
    pub fn link_type(&self) -> Linktype {
        self.link_type
    }

    /// Capture time, since the Unix epoch
    #[inline]
    pub fn timestamp(&self) -> Duration {
        self.ts
    }

    /// Length of the frame on the wire (may exceed `data().len()` if truncated by snaplen)
    #[inline]
    pub fn origlen(&self) -> u32 {
        self.origlen
    }

    /// Decode layers using the framing implied by the link type
    pub fn frame(&self) -> Result<Frame<'_>, Error> {
        let framing = Framing::from_linktype(self.link_type)?;
        Ok(Frame::decode(&self.data, framing))
    }

    pub fn indicator(&self) -> Result<PacketIndicator, Error> {
        PacketIndicator::decode(&self.frame()?)
    }
}
