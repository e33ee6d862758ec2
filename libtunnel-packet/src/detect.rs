use libtunnel_tools::{Error, LinkLayerType};
use tracing::trace;

use crate::frame::{Frame, Framing, ETHERNET_HEADER_LEN, ETHERTYPE_MIN};

/// Guess the link framing of raw bytes and decode them
///
/// Loopback is tried first, then Ethernet. This is a heuristic: a buffer can be
/// valid under both framings, in which case Loopback wins.
pub fn detect_link_layer(data: &[u8]) -> Result<(Frame<'_>, LinkLayerType), Error> {
    if data.is_empty() {
        return Err(Error::MissingLinkLayer);
    }
    let frame = Frame::decode(data, Framing::Loopback);
    if frame.link_layer() == Some(LinkLayerType::Loopback) {
        trace!("detected loopback framing");
        return Ok((frame, LinkLayerType::Loopback));
    }
    if data.len() < ETHERNET_HEADER_LEN {
        return Err(Error::MissingLinkLayer);
    }
    let type_or_len = u16::from_be_bytes([data[12], data[13]]);
    if type_or_len < ETHERTYPE_MIN {
        trace!("802.3 length field {}, not ethernet II", type_or_len);
        return Err(Error::UnsupportedLinkLayer);
    }
    let frame = Frame::decode(data, Framing::Ethernet);
    match frame.link_layer() {
        Some(LinkLayerType::Ethernet) => Ok((frame, LinkLayerType::Ethernet)),
        _ => Err(Error::MissingLinkLayer),
    }
}
