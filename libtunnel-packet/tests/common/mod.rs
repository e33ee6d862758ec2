//! Packet builders for decoder tests
#![allow(dead_code)]

use std::net::{Ipv4Addr, Ipv6Addr};

use pnet_base::MacAddr;
use pnet_packet::ethernet::{EtherType, EtherTypes, MutableEthernetPacket};
use pnet_packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet_packet::ipv4::MutableIpv4Packet;
use pnet_packet::ipv6::MutableIpv6Packet;
use pnet_packet::tcp::{MutableTcpPacket, TcpFlags};
use pnet_packet::udp::MutableUdpPacket;

pub enum Transport<'a> {
    Tcp {
        src: u16,
        dst: u16,
        seq: u32,
        ack: u32,
        syn: bool,
        ack_flag: bool,
        payload: &'a [u8],
    },
    Udp {
        src: u16,
        dst: u16,
        payload: &'a [u8],
    },
}

impl Transport<'_> {
    pub fn protocol(&self) -> IpNextHeaderProtocol {
        match self {
            Transport::Tcp { .. } => IpNextHeaderProtocols::Tcp,
            Transport::Udp { .. } => IpNextHeaderProtocols::Udp,
        }
    }

    pub fn build(&self) -> Vec<u8> {
        match *self {
            Transport::Tcp {
                src,
                dst,
                seq,
                ack,
                syn,
                ack_flag,
                payload,
            } => {
                let mut flags = 0;
                if syn {
                    flags |= TcpFlags::SYN;
                }
                if ack_flag {
                    flags |= TcpFlags::ACK;
                }
                let mut buf = vec![0u8; 20 + payload.len()];
                let mut tcp = MutableTcpPacket::new(&mut buf).unwrap();
                tcp.set_source(src);
                tcp.set_destination(dst);
                tcp.set_sequence(seq);
                tcp.set_acknowledgement(ack);
                tcp.set_data_offset(5);
                tcp.set_flags(flags);
                tcp.set_window(0xffff);
                tcp.set_payload(payload);
                buf
            }
            Transport::Udp { src, dst, payload } => {
                let mut buf = vec![0u8; 8 + payload.len()];
                let mut udp = MutableUdpPacket::new(&mut buf).unwrap();
                udp.set_source(src);
                udp.set_destination(dst);
                udp.set_length((8 + payload.len()) as u16);
                udp.set_payload(payload);
                buf
            }
        }
    }
}

pub fn ipv4(src: Ipv4Addr, dst: Ipv4Addr, proto: IpNextHeaderProtocol, l4: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 20 + l4.len()];
    let mut ip = MutableIpv4Packet::new(&mut buf).unwrap();
    ip.set_version(4);
    ip.set_header_length(5);
    ip.set_total_length((20 + l4.len()) as u16);
    ip.set_identification(0x1234);
    ip.set_ttl(64);
    ip.set_next_level_protocol(proto);
    ip.set_source(src);
    ip.set_destination(dst);
    ip.set_payload(l4);
    buf
}

pub fn ipv6(src: Ipv6Addr, dst: Ipv6Addr, next: IpNextHeaderProtocol, l4: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 40 + l4.len()];
    let mut ip = MutableIpv6Packet::new(&mut buf).unwrap();
    ip.set_version(6);
    ip.set_payload_length(l4.len() as u16);
    ip.set_next_header(next);
    ip.set_hop_limit(64);
    ip.set_source(src);
    ip.set_destination(dst);
    ip.set_payload(l4);
    buf
}

pub fn ethernet(ethertype: EtherType, l3: &[u8]) -> Vec<u8> {
    let mut buf = vec![0u8; 14 + l3.len()];
    let mut eth = MutableEthernetPacket::new(&mut buf).unwrap();
    eth.set_destination(MacAddr::new(0x00, 0x1b, 0x21, 0x3a, 0x4c, 0x5e));
    eth.set_source(MacAddr::new(0x00, 0x0c, 0x29, 0x7d, 0x10, 0x01));
    eth.set_ethertype(ethertype);
    eth.set_payload(l3);
    buf
}

/// Ethernet frame with one 802.1Q tag
pub fn ethernet_vlan(vid: u16, ethertype: EtherType, l3: &[u8]) -> Vec<u8> {
    let mut tagged = Vec::with_capacity(4 + l3.len());
    tagged.extend_from_slice(&(vid & 0x0fff).to_be_bytes());
    tagged.extend_from_slice(&ethertype.0.to_be_bytes());
    tagged.extend_from_slice(l3);
    ethernet(EtherTypes::Vlan, &tagged)
}

/// BSD loopback header, in host (little-endian) or network order
pub fn loopback(family: u32, big_endian: bool, l3: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(4 + l3.len());
    if big_endian {
        buf.extend_from_slice(&family.to_be_bytes());
    } else {
        buf.extend_from_slice(&family.to_le_bytes());
    }
    buf.extend_from_slice(l3);
    buf
}

pub const V4_SRC: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
pub const V4_DST: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
pub const V6_SRC: Ipv6Addr = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 1);
pub const V6_DST: Ipv6Addr = Ipv6Addr::new(0x2001, 0xdb8, 0, 0, 0, 0, 0, 2);
