use std::fmt;

use libtunnel_tools::{Error, LinkLayerType, NetworkLayerType, TransportLayerType};
use pcap_parser::Linktype;
use pnet_packet::ethernet::{EtherTypes, EthernetPacket};
use pnet_packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet_packet::ipv4::{Ipv4Flags, Ipv4Packet};
use pnet_packet::ipv6::Ipv6Packet;
use pnet_packet::tcp::TcpPacket;
use pnet_packet::udp::UdpPacket;
use pnet_packet::vlan::VlanPacket;
use tracing::trace;

pub(crate) const LOOPBACK_HEADER_LEN: usize = 4;
pub(crate) const ETHERNET_HEADER_LEN: usize = 14;
const VLAN_TAG_LEN: usize = 4;
const IPV4_MIN_HEADER_LEN: usize = 20;
const IPV6_HEADER_LEN: usize = 40;
const TCP_MIN_HEADER_LEN: usize = 20;
const UDP_HEADER_LEN: usize = 8;

/// Ethernet II type field starts here, smaller values are 802.3 lengths
pub(crate) const ETHERTYPE_MIN: u16 = 0x0600;
/// 802.1Q + 802.1ad
const MAX_VLAN_TAGS: usize = 2;

// loopback address families (BSD and Linux values)
const AF_INET: u32 = 2;
const AF_INET6_LINUX: u32 = 10;
const AF_INET6_BSD: u32 = 24;
const AF_INET6_FREEBSD: u32 = 28;
const AF_INET6_DARWIN: u32 = 30;

/// Outermost layer of a buffer, i.e where decoding starts
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Framing {
    Loopback,
    Ethernet,
    Ipv4,
    Ipv6,
    /// IPv4 or IPv6, chosen from the version nibble
    RawIp,
}

impl Framing {
    /// Framing used by a capture with the given pcap link type
    pub fn from_linktype(link_type: Linktype) -> Result<Framing, Error> {
        match link_type {
            Linktype::NULL | Linktype(108) /* LOOP */ => Ok(Framing::Loopback),
            Linktype::ETHERNET => Ok(Framing::Ethernet),
            Linktype::RAW | Linktype(12) | Linktype(14) => Ok(Framing::RawIp),
            Linktype(228) /* IPV4 */ => Ok(Framing::Ipv4),
            Linktype(229) /* IPV6 */ => Ok(Framing::Ipv6),
            l => {
                trace!("Unsupported link type {}", l);
                Err(Error::UnsupportedLinkLayer)
            }
        }
    }
}

pub enum NetworkLayer<'a> {
    Ipv4(Ipv4Packet<'a>),
    Ipv6(Ipv6Packet<'a>),
    /// A protocol announced by the link layer (EtherType or loopback family)
    /// that this engine does not decode
    Unsupported(u16),
}

pub enum TransportLayer<'a> {
    Tcp(TcpPacket<'a>),
    Udp(UdpPacket<'a>),
    /// IP protocol number of a transport this engine does not decode
    Unsupported(u8),
}

/// Layered view over the bytes of one packet
///
/// Decoding never fails. Each layer is decoded only if the previous one was, and
/// if the bytes structurally match; otherwise it is `None` and decoding stops.
/// Errors are reported when turning the frame into a
/// [`PacketIndicator`](crate::PacketIndicator).
pub struct Frame<'a> {
    data: &'a [u8],
    link: Option<LinkLayerType>,
    network: Option<NetworkLayer<'a>>,
    transport: Option<TransportLayer<'a>>,
    payload: &'a [u8],
}

impl<'a> Frame<'a> {
    pub fn decode(data: &'a [u8], framing: Framing) -> Frame<'a> {
        let mut frame = Frame {
            data,
            link: None,
            network: None,
            transport: None,
            payload: &[],
        };
        match framing {
            Framing::Loopback => frame.decode_loopback(data),
            Framing::Ethernet => frame.decode_ethernet(data),
            Framing::Ipv4 => frame.decode_ipv4(data),
            Framing::Ipv6 => frame.decode_ipv6(data),
            Framing::RawIp => match data.first().map(|b| b >> 4) {
                Some(4) => frame.decode_ipv4(data),
                Some(6) => frame.decode_ipv6(data),
                v => trace!("raw IP: unknown version {:?}", v),
            },
        }
        frame
    }

    /// All bytes of the packet, starting at the outermost layer
    #[inline]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    #[inline]
    pub fn link_layer(&self) -> Option<LinkLayerType> {
        self.link
    }

    #[inline]
    pub fn network_layer(&self) -> Option<&NetworkLayer<'a>> {
        self.network.as_ref()
    }

    pub fn network_layer_type(&self) -> Option<NetworkLayerType> {
        match self.network {
            Some(NetworkLayer::Ipv4(_)) => Some(NetworkLayerType::Ipv4),
            Some(NetworkLayer::Ipv6(_)) => Some(NetworkLayerType::Ipv6),
            _ => None,
        }
    }

    #[inline]
    pub fn transport_layer(&self) -> Option<&TransportLayer<'a>> {
        self.transport.as_ref()
    }

    pub fn transport_layer_type(&self) -> Option<TransportLayerType> {
        match self.transport {
            Some(TransportLayer::Tcp(_)) => Some(TransportLayerType::Tcp),
            Some(TransportLayer::Udp(_)) => Some(TransportLayerType::Udp),
            _ => None,
        }
    }

    /// Application data carried by the transport layer (empty if none)
    #[inline]
    pub fn application_payload(&self) -> &'a [u8] {
        self.payload
    }

    fn decode_loopback(&mut self, data: &'a [u8]) {
        let family = match loopback_family(data) {
            Some(family) => family,
            None => {
                trace!("not a loopback header");
                return;
            }
        };
        self.link = Some(LinkLayerType::Loopback);
        let data = &data[LOOPBACK_HEADER_LEN..];
        match family {
            AF_INET => self.decode_ipv4(data),
            AF_INET6_LINUX | AF_INET6_BSD | AF_INET6_FREEBSD | AF_INET6_DARWIN => {
                self.decode_ipv6(data)
            }
            // loopback_family() guarantees family <= 0xff
            af => {
                trace!("loopback: unsupported address family {}", af);
                self.network = Some(NetworkLayer::Unsupported(af as u16));
            }
        }
    }

    fn decode_ethernet(&mut self, data: &'a [u8]) {
        let eth = match EthernetPacket::new(data) {
            Some(eth) => eth,
            None => {
                trace!("packet too small to be ethernet");
                return;
            }
        };
        self.link = Some(LinkLayerType::Ethernet);
        let mut ethertype = eth.get_ethertype();
        let mut data = &data[ETHERNET_HEADER_LEN..];
        let mut tags = 0;
        while matches!(ethertype, EtherTypes::Vlan | EtherTypes::PBridge | EtherTypes::QinQ)
            && tags < MAX_VLAN_TAGS
        {
            let vlan = match VlanPacket::new(data) {
                Some(vlan) => vlan,
                None => {
                    trace!("truncated 802.1Q tag");
                    return;
                }
            };
            trace!("    vlan: {}", vlan.get_vlan_identifier());
            ethertype = vlan.get_ethertype();
            data = &data[VLAN_TAG_LEN..];
            tags += 1;
        }
        trace!("    ethertype: 0x{:x}", ethertype.0);
        match NetworkLayerType::from_ethertype(ethertype.0) {
            Some(NetworkLayerType::Ipv4) => self.decode_ipv4(data),
            Some(NetworkLayerType::Ipv6) => self.decode_ipv6(data),
            None => {
                trace!("Unsupported ethertype {} (0x{:x})", ethertype, ethertype.0);
                self.network = Some(NetworkLayer::Unsupported(ethertype.0));
            }
        }
    }

    fn decode_ipv4(&mut self, data: &'a [u8]) {
        let ipv4 = match Ipv4Packet::new(data) {
            Some(ipv4) => ipv4,
            None => {
                trace!("Could not build IPv4 packet from data");
                return;
            }
        };
        let header_len = ipv4.get_header_length() as usize * 4;
        if ipv4.get_version() != 4 || header_len < IPV4_MIN_HEADER_LEN || header_len > data.len() {
            trace!(
                "invalid IPv4 header (version={}, header_len={})",
                ipv4.get_version(),
                header_len
            );
            return;
        }
        // remove padding. A zero total length is left by segmentation offload.
        let total_len = ipv4.get_total_length() as usize;
        let end = match total_len {
            0 => data.len(),
            l if l < header_len => {
                trace!("IPv4 total length {} shorter than header", l);
                return;
            }
            l => l.min(data.len()),
        };
        let l4_proto = ipv4.get_next_level_protocol();
        let fragmented = ipv4.get_flags() & Ipv4Flags::MoreFragments != 0
            || ipv4.get_fragment_offset() != 0;
        self.network = Some(NetworkLayer::Ipv4(ipv4));
        if fragmented {
            trace!("IPv4 fragment, transport layer not decoded");
            return;
        }
        self.decode_transport(l4_proto, &data[header_len..end]);
    }

    fn decode_ipv6(&mut self, data: &'a [u8]) {
        let ipv6 = match Ipv6Packet::new(data) {
            Some(ipv6) => ipv6,
            None => {
                trace!("Could not build IPv6 packet from data");
                return;
            }
        };
        if ipv6.get_version() != 6 {
            trace!("invalid IPv6 header (version={})", ipv6.get_version());
            return;
        }
        let end = match ipv6.get_payload_length() as usize {
            // jumbogram ? (rfc2675)
            0 => data.len(),
            l => (IPV6_HEADER_LEN + l).min(data.len()),
        };
        let mut l4_proto = ipv6.get_next_header();
        let mut data = &data[IPV6_HEADER_LEN..end];
        self.network = Some(NetworkLayer::Ipv6(ipv6));
        loop {
            match l4_proto {
                IpNextHeaderProtocols::Hopopt
                | IpNextHeaderProtocols::Ipv6Route
                | IpNextHeaderProtocols::Ipv6Opts => {
                    // next header, then length in 8-octet units not counting the first 8
                    if data.len() < 8 {
                        trace!("truncated IPv6 extension header");
                        return;
                    }
                    let ext_len = (data[1] as usize + 1) * 8;
                    if ext_len > data.len() {
                        trace!("truncated IPv6 extension header");
                        return;
                    }
                    trace!("option header: {}", l4_proto);
                    l4_proto = IpNextHeaderProtocol(data[0]);
                    data = &data[ext_len..];
                }
                IpNextHeaderProtocols::Ipv6Frag => {
                    trace!("IPv6 fragment, transport layer not decoded");
                    return;
                }
                _ => break,
            }
        }
        self.decode_transport(l4_proto, data);
    }

    fn decode_transport(&mut self, l4_proto: IpNextHeaderProtocol, data: &'a [u8]) {
        if data.is_empty() {
            trace!("no transport data");
            return;
        }
        match TransportLayerType::from_protocol(l4_proto.0) {
            Some(TransportLayerType::Tcp) => self.decode_tcp(data),
            Some(TransportLayerType::Udp) => self.decode_udp(data),
            None => {
                trace!("Unsupported L4 proto {}", l4_proto);
                self.transport = Some(TransportLayer::Unsupported(l4_proto.0));
            }
        }
    }

    fn decode_tcp(&mut self, data: &'a [u8]) {
        let tcp = match TcpPacket::new(data) {
            Some(tcp) => tcp,
            None => {
                trace!("Could not build TCP packet from data");
                return;
            }
        };
        let header_len = tcp.get_data_offset() as usize * 4;
        if header_len < TCP_MIN_HEADER_LEN || header_len > data.len() {
            trace!("invalid TCP data offset {}", tcp.get_data_offset());
            return;
        }
        self.payload = &data[header_len..];
        self.transport = Some(TransportLayer::Tcp(tcp));
    }

    fn decode_udp(&mut self, data: &'a [u8]) {
        let udp = match UdpPacket::new(data) {
            Some(udp) => udp,
            None => {
                trace!("Could not build UDP packet from data");
                return;
            }
        };
        let length = udp.get_length() as usize;
        let end = if (UDP_HEADER_LEN..=data.len()).contains(&length) {
            length
        } else {
            data.len()
        };
        self.payload = &data[UDP_HEADER_LEN..end];
        self.transport = Some(TransportLayer::Udp(udp));
    }
}

/// Read the address family of a loopback (BSD NULL/LOOP) header
///
/// The family is stored in host order for NULL and network order for LOOP, so the
/// byte order is guessed: two leading zero bytes mean big-endian. Families above
/// 0xff, and zero, are not loopback headers.
pub(crate) fn loopback_family(data: &[u8]) -> Option<u32> {
    let header: [u8; LOOPBACK_HEADER_LEN] = data.get(..LOOPBACK_HEADER_LEN)?.try_into().ok()?;
    let family = if header[0] == 0 && header[1] == 0 {
        u32::from_be_bytes(header)
    } else {
        u32::from_le_bytes(header)
    };
    match family {
        1..=0xff => Some(family),
        _ => None,
    }
}

impl fmt::Debug for Frame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let network = self.network.as_ref().map(|n| match n {
            NetworkLayer::Ipv4(_) => "IPv4".to_owned(),
            NetworkLayer::Ipv6(_) => "IPv6".to_owned(),
            NetworkLayer::Unsupported(t) => format!("Unsupported(0x{:04x})", t),
        });
        let transport = self.transport.as_ref().map(|t| match t {
            TransportLayer::Tcp(_) => "TCP".to_owned(),
            TransportLayer::Udp(_) => "UDP".to_owned(),
            TransportLayer::Unsupported(p) => format!("Unsupported({})", p),
        });
        f.debug_struct("Frame")
            .field("len", &self.data.len())
            .field("link", &self.link)
            .field("network", &network)
            .field("transport", &transport)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // 10.0.0.1 -> 10.0.0.2, UDP 5000 -> 53, payload deadbeef
    const IPV4_UDP: &[u8] = &[
        0x45, 0x00, 0x00, 0x20, 0x12, 0x34, 0x00, 0x00, 0x40, 0x11, 0x00, 0x00, //
        0x0a, 0x00, 0x00, 0x01, 0x0a, 0x00, 0x00, 0x02, //
        0x13, 0x88, 0x00, 0x35, 0x00, 0x0c, 0x00, 0x00, //
        0xde, 0xad, 0xbe, 0xef,
    ];

    #[test]
    fn frame_ipv4_udp() {
        let frame = Frame::decode(IPV4_UDP, Framing::Ipv4);
        assert_eq!(frame.link_layer(), None);
        assert_eq!(frame.network_layer_type(), Some(NetworkLayerType::Ipv4));
        assert_eq!(frame.transport_layer_type(), Some(TransportLayerType::Udp));
        assert_eq!(frame.application_payload(), &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn frame_removes_ethernet_padding() {
        let mut data = IPV4_UDP.to_vec();
        data.extend_from_slice(&[0u8; 14]);
        let frame = Frame::decode(&data, Framing::RawIp);
        assert_eq!(frame.application_payload(), &[0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn frame_loopback_family() {
        assert_eq!(loopback_family(&[2, 0, 0, 0]), Some(2));
        assert_eq!(loopback_family(&[0, 0, 0, 30]), Some(30));
        assert_eq!(loopback_family(&[0xff, 0xff, 0xff, 0xff]), None);
        assert_eq!(loopback_family(&[0, 0, 0, 0]), None);
        assert_eq!(loopback_family(&[2, 0]), None);

        let mut data = vec![2, 0, 0, 0];
        data.extend_from_slice(IPV4_UDP);
        let frame = Frame::decode(&data, Framing::Loopback);
        assert_eq!(frame.link_layer(), Some(LinkLayerType::Loopback));
        assert_eq!(frame.transport_layer_type(), Some(TransportLayerType::Udp));
    }

    #[test]
    fn frame_truncated_layers() {
        // IPv4 header cut in the middle
        let frame = Frame::decode(&IPV4_UDP[..12], Framing::Ipv4);
        assert!(frame.network_layer().is_none());
        // header only: network but no transport
        let frame = Frame::decode(&IPV4_UDP[..20], Framing::Ipv4);
        assert_eq!(frame.network_layer_type(), Some(NetworkLayerType::Ipv4));
        assert!(frame.transport_layer().is_none());
        assert!(frame.application_payload().is_empty());
    }

    #[test]
    fn frame_rejects_bad_ihl() {
        let mut data = IPV4_UDP.to_vec();
        data[0] = 0x44;
        let frame = Frame::decode(&data, Framing::Ipv4);
        assert!(frame.network_layer().is_none());
    }

    #[test]
    fn frame_linktypes() {
        assert_eq!(Framing::from_linktype(Linktype::ETHERNET).ok(), Some(Framing::Ethernet));
        assert_eq!(Framing::from_linktype(Linktype::NULL).ok(), Some(Framing::Loopback));
        assert_eq!(Framing::from_linktype(Linktype(108)).ok(), Some(Framing::Loopback));
        assert_eq!(Framing::from_linktype(Linktype(101)).ok(), Some(Framing::RawIp));
        assert!(matches!(
            Framing::from_linktype(Linktype(113)),
            Err(Error::UnsupportedLinkLayer)
        ));
    }
}
