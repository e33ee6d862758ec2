//! Packet sources and sinks of the tunnel packet engine
//!
//! - [`RawConn`]: live capture and injection of whole frames on one interface
//! - [`Reader`]: sequential reader of pcap and pcap-ng files
//! - [`send_tcp`] / [`send_udp`]: delivery through regular sockets
//! - [`ConnRegistry`]: owner of raw connections, addressed by `ConnId`

mod conn;
mod device;
mod handle;
mod reader;
mod registry;
mod send;

pub use conn::{RawConn, MAX_MTU};
pub use device::Device;
pub use handle::{CaptureHandle, Closer, HandleFrame, Interrupt};
pub use reader::Reader;
pub use registry::ConnRegistry;
pub use send::{send_tcp, send_udp};
