use std::net::Ipv4Addr;

use pnet::packet::ethernet::EtherTypes;
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::tcp::{self, MutableTcpPacket, TcpFlags, TcpPacket};
use pnet::util::MacAddr;

use crate::ipv4::{self, Ipv4Fields};
use crate::{ETH_HDR_LEN, FrameError, IPV4_HDR_LEN, MIN_ETH_FRAME_NO_FCS, TCP_HDR_LEN, ethernet};

pub const WINDOW_SIZE: u16 = 8192;
/// Time-to-live used for cleanup segments so they reach the target.
pub const CLEANUP_TTL: u8 = 128;

const FRAME_LEN: usize = ETH_HDR_LEN + IPV4_HDR_LEN + TCP_HDR_LEN;

/// Addressing of a single probe segment, from the link layer up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentSpec {
    pub src_mac: MacAddr,
    pub dst_mac: MacAddr,
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
    pub src_port: u16,
    pub dst_port: u16,
    pub ttl: u8,
}

/// Builds a SYN probe whose sequence number equals its time-to-live.
///
/// Routers that drop the probe quote its header in the ICMP time-exceeded
/// message, so the sequence number tells which hop index the reply belongs to.
pub fn create_syn(spec: &SegmentSpec) -> Result<Vec<u8>, FrameError> {
    create_segment(spec, TcpFlags::SYN, u32::from(spec.ttl))
}

/// Builds a FIN segment that tears down whatever state the SYN left behind.
pub fn create_fin(spec: &SegmentSpec) -> Result<Vec<u8>, FrameError> {
    create_segment(spec, TcpFlags::FIN, 0)
}

fn create_segment(spec: &SegmentSpec, flags: u8, sequence: u32) -> Result<Vec<u8>, FrameError> {
    let mut buffer = vec![0u8; FRAME_LEN.max(MIN_ETH_FRAME_NO_FCS)];
    ethernet::make_header(&mut buffer, spec.src_mac, spec.dst_mac, EtherTypes::Ipv4)?;

    let fields = Ipv4Fields {
        src_addr: spec.src_addr,
        dst_addr: spec.dst_addr,
        ttl: spec.ttl,
        protocol: IpNextHeaderProtocols::Tcp,
        payload_len: TCP_HDR_LEN as u16,
    };
    ipv4::write_header(&mut buffer[ETH_HDR_LEN..], &fields)?;

    let tcp_start = ETH_HDR_LEN + IPV4_HDR_LEN;
    let mut segment = MutableTcpPacket::new(&mut buffer[tcp_start..tcp_start + TCP_HDR_LEN])
        .ok_or(FrameError::BufferTooSmall("tcp"))?;
    segment.set_source(spec.src_port);
    segment.set_destination(spec.dst_port);
    segment.set_sequence(sequence);
    segment.set_acknowledgement(0);
    segment.set_data_offset(5);
    segment.set_flags(flags);
    segment.set_window(WINDOW_SIZE);
    segment.set_urgent_ptr(0);

    segment.set_checksum(0);
    let csm = tcp::ipv4_checksum(&segment.to_immutable(), &spec.src_addr, &spec.dst_addr);
    segment.set_checksum(csm);

    Ok(buffer)
}

/// Parses the TCP header at the start of `bytes`.
pub fn get_packet_from_u8(bytes: &[u8]) -> Result<TcpPacket<'_>, FrameError> {
    TcpPacket::new(bytes).ok_or(FrameError::Truncated {
        layer: "tcp",
        len: bytes.len(),
    })
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
