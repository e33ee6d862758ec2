use std::fmt;
use std::net::{IpAddr, SocketAddr};

use libtunnel_tools::{Error, NetworkLayerType, Quintuple, TransportLayerType, Triple};
use pnet_packet::tcp::TcpFlags;
use serde::{Serialize, Serializer};
use tracing::trace;

use crate::frame::{Frame, Framing, NetworkLayer, TransportLayer};

const IPV4_MIN_HEADER_LEN: usize = 20;

/// Interpretations tried for bytes with no link framing, keyed by IP version
const ENCAPSULATED_CANDIDATES: &[(u8, Framing, NetworkLayerType)] = &[
    (4, Framing::Ipv4, NetworkLayerType::Ipv4),
    (6, Framing::Ipv6, NetworkLayerType::Ipv6),
];

/// Decoded summary of one packet: addresses, ports, TCP state and payload
///
/// Built in one step by [`PacketIndicator::decode`] or
/// [`PacketIndicator::decode_encapsulated`], and read-only afterwards.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
pub struct PacketIndicator {
    network_layer_type: NetworkLayerType,
    src_ip: IpAddr,
    dst_ip: IpAddr,
    id: u16,
    ttl: u8,
    transport_layer_type: TransportLayerType,
    src_port: u16,
    dst_port: u16,
    seq: u32,
    ack: u32,
    syn: bool,
    ack_flag: bool,
    #[serde(rename = "payload_len", serialize_with = "serialize_len")]
    payload: Vec<u8>,
}

fn serialize_len<S: Serializer>(payload: &[u8], s: S) -> Result<S::Ok, S::Error> {
    s.serialize_u64(payload.len() as u64)
}

impl PacketIndicator {
    /// Extract the indicator from a decoded frame
    pub fn decode(frame: &Frame) -> Result<PacketIndicator, Error> {
        let (network_layer_type, src_ip, dst_ip, id, ttl) = match frame.network_layer() {
            Some(NetworkLayer::Ipv4(ipv4)) => (
                NetworkLayerType::Ipv4,
                IpAddr::V4(ipv4.get_source()),
                IpAddr::V4(ipv4.get_destination()),
                ipv4.get_identification(),
                ipv4.get_ttl(),
            ),
            Some(NetworkLayer::Ipv6(ipv6)) => (
                NetworkLayerType::Ipv6,
                IpAddr::V6(ipv6.get_source()),
                IpAddr::V6(ipv6.get_destination()),
                0,
                0,
            ),
            Some(NetworkLayer::Unsupported(t)) => return Err(Error::UnsupportedNetworkLayer(*t)),
            None => return Err(Error::MissingNetworkLayer),
        };
        let (transport_layer_type, src_port, dst_port, seq, ack, syn, ack_flag) =
            match frame.transport_layer() {
                Some(TransportLayer::Tcp(tcp)) => {
                    let flags = tcp.get_flags();
                    (
                        TransportLayerType::Tcp,
                        tcp.get_source(),
                        tcp.get_destination(),
                        tcp.get_sequence(),
                        tcp.get_acknowledgement(),
                        flags & TcpFlags::SYN != 0,
                        flags & TcpFlags::ACK != 0,
                    )
                }
                Some(TransportLayer::Udp(udp)) => (
                    TransportLayerType::Udp,
                    udp.get_source(),
                    udp.get_destination(),
                    0,
                    0,
                    false,
                    false,
                ),
                Some(TransportLayer::Unsupported(p)) => {
                    return Err(Error::UnsupportedTransportLayer(*p))
                }
                None => return Err(Error::MissingTransportLayer),
            };
        Ok(PacketIndicator {
            network_layer_type,
            src_ip,
            dst_ip,
            id,
            ttl,
            transport_layer_type,
            src_port,
            dst_port,
            seq,
            ack,
            syn,
            ack_flag,
            payload: frame.application_payload().to_vec(),
        })
    }

    /// Decode an IP packet carried with no link framing (tunnel payload)
    ///
    /// The IP version nibble selects the interpretation.
    pub fn decode_encapsulated(data: &[u8]) -> Result<PacketIndicator, Error> {
        if data.len() < IPV4_MIN_HEADER_LEN {
            trace!("encapsulated packet too short ({} bytes)", data.len());
            return Err(Error::MissingNetworkLayer);
        }
        let version = data[0] >> 4;
        let (framing, expected) = ENCAPSULATED_CANDIDATES
            .iter()
            .find(|(v, _, _)| *v == version)
            .map(|(_, framing, t)| (*framing, *t))
            .ok_or(Error::UnsupportedIpVersion(version))?;
        let frame = Frame::decode(data, framing);
        if frame.network_layer_type() != Some(expected) {
            trace!("encapsulated packet is not valid {}", expected);
            return Err(Error::MissingNetworkLayer);
        }
        PacketIndicator::decode(&frame)
    }

    #[inline]
    pub fn network_layer_type(&self) -> NetworkLayerType {
        self.network_layer_type
    }

    #[inline]
    pub fn src_ip(&self) -> IpAddr {
        self.src_ip
    }

    #[inline]
    pub fn dst_ip(&self) -> IpAddr {
        self.dst_ip
    }

    /// IPv4 identification (0 for IPv6)
    #[inline]
    pub fn id(&self) -> u16 {
        self.id
    }

    /// IPv4 time to live (0 for IPv6)
    #[inline]
    pub fn ttl(&self) -> u8 {
        self.ttl
    }

    #[inline]
    pub fn transport_layer_type(&self) -> TransportLayerType {
        self.transport_layer_type
    }

    #[inline]
    pub fn src_port(&self) -> u16 {
        self.src_port
    }

    #[inline]
    pub fn dst_port(&self) -> u16 {
        self.dst_port
    }

    #[inline]
    pub fn seq(&self) -> u32 {
        self.seq
    }

    #[inline]
    pub fn ack(&self) -> u32 {
        self.ack
    }

    #[inline]
    pub fn syn(&self) -> bool {
        self.syn
    }

    #[inline]
    pub fn ack_flag(&self) -> bool {
        self.ack_flag
    }

    #[inline]
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn src_ip_port(&self) -> SocketAddr {
        SocketAddr::new(self.src_ip, self.src_port)
    }

    pub fn dst_ip_port(&self) -> SocketAddr {
        SocketAddr::new(self.dst_ip, self.dst_port)
    }

    pub fn src_triple(&self) -> Triple {
        Triple::new(self.src_ip, self.src_port, self.transport_layer_type)
    }

    pub fn dst_triple(&self) -> Triple {
        Triple::new(self.dst_ip, self.dst_port, self.transport_layer_type)
    }

    pub fn quintuple(&self) -> Quintuple {
        Quintuple::new(
            self.src_ip_port(),
            self.dst_ip_port(),
            self.transport_layer_type,
        )
    }
}

impl fmt::Display for PacketIndicator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {} -> {} [{}]",
            self.network_layer_type,
            self.src_ip_port(),
            self.dst_ip_port(),
            self.transport_layer_type
        )?;
        if self.network_layer_type == NetworkLayerType::Ipv4 {
            write!(f, " id={} ttl={}", self.id, self.ttl)?;
        }
        if self.transport_layer_type == TransportLayerType::Tcp {
            write!(f, " seq={} ack={}", self.seq, self.ack)?;
            if self.syn {
                f.write_str(" SYN")?;
            }
            if self.ack_flag {
                f.write_str(" ACK")?;
            }
        }
        write!(f, " len={}", self.payload.len())
    }
}
