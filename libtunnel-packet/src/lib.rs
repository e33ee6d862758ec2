//! Layered packet decoding for the tunnel packet engine
//!
//! Bytes are first turned into a [`Frame`], a borrowed view holding the link,
//! network and transport layers that could be decoded. A [`PacketIndicator`] is
//! then extracted from the frame, or an error naming the first missing or
//! unsupported layer.
//!
//! ```
//! use libtunnel_packet::{Frame, Framing, PacketIndicator};
//!
//! fn ports(data: &[u8]) -> Option<(u16, u16)> {
//!     let frame = Frame::decode(data, Framing::Ethernet);
//!     let ind = PacketIndicator::decode(&frame).ok()?;
//!     Some((ind.src_port(), ind.dst_port()))
//! }
//! ```

mod captured;
mod detect;
mod frame;
mod indicator;

pub use captured::CapturedPacket;
pub use detect::detect_link_layer;
pub use frame::{Frame, Framing, NetworkLayer, TransportLayer};
pub use indicator::PacketIndicator;

pub use pcap_parser::Linktype;
