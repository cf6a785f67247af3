use std::net::Ipv4Addr;

use pnet::packet::ip::IpNextHeaderProtocol;
use pnet::packet::ipv4::{self, Ipv4Flags, Ipv4Packet, MutableIpv4Packet};

use crate::{FrameError, IPV4_HDR_LEN};

/// Fields of an option-less IPv4 header that vary per probe.
#[derive(Debug, Clone, Copy)]
pub struct Ipv4Fields {
    pub src_addr: Ipv4Addr,
    pub dst_addr: Ipv4Addr,
    pub ttl: u8,
    pub protocol: IpNextHeaderProtocol,
    pub payload_len: u16,
}

/// Writes a 20 byte header with the "don't fragment" bit set and a valid checksum.
pub fn write_header(buf: &mut [u8], fields: &Ipv4Fields) -> Result<(), FrameError> {
    let mut ipv4 = MutableIpv4Packet::new(buf).ok_or(FrameError::BufferTooSmall("ipv4"))?;
    ipv4.set_version(4);
    ipv4.set_header_length(5);
    ipv4.set_dscp(0);
    ipv4.set_ecn(0);
    ipv4.set_total_length(IPV4_HDR_LEN as u16 + fields.payload_len);
    ipv4.set_identification(rand::random());
    ipv4.set_flags(Ipv4Flags::DontFragment);
    ipv4.set_fragment_offset(0);
    ipv4.set_ttl(fields.ttl);
    ipv4.set_next_level_protocol(fields.protocol);
    ipv4.set_source(fields.src_addr);
    ipv4.set_destination(fields.dst_addr);

    ipv4.set_checksum(0);
    let csm = ipv4::checksum(&ipv4.to_immutable());
    ipv4.set_checksum(csm);
    Ok(())
}

/// Parses the IPv4 header at the start of `bytes`.
pub fn get_packet_from_u8(bytes: &[u8]) -> Result<Ipv4Packet<'_>, FrameError> {
    Ipv4Packet::new(bytes).ok_or(FrameError::Truncated {
        layer: "ipv4",
        len: bytes.len(),
    })
}

/// Length in bytes of the header at the start of `packet`, options included.
pub fn header_len(packet: &Ipv4Packet<'_>) -> usize {
    packet.get_header_length() as usize * 4
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
