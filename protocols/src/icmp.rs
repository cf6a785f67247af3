use pnet::packet::Packet;
use pnet::packet::icmp::IcmpTypes;
use pnet::packet::icmp::time_exceeded::TimeExceededPacket;

use crate::ipv4;

/// Offset of the sequence number inside a TCP header.
const TCP_SEQUENCE_OFFSET: usize = 4;

/// Recovers the TCP sequence number of the datagram quoted by an ICMP
/// time-exceeded message.
///
/// `icmp` starts at the ICMP header. Returns `None` for any other ICMP type or
/// when the quote is too short to hold the first eight bytes of the segment.
pub fn quoted_tcp_sequence(icmp: &[u8]) -> Option<u32> {
    let message = TimeExceededPacket::new(icmp)?;
    if message.get_icmp_type() != IcmpTypes::TimeExceeded {
        return None;
    }

    let quote = message.payload();
    let quoted_ip = ipv4::get_packet_from_u8(quote).ok()?;
    let start = ipv4::header_len(&quoted_ip) + TCP_SEQUENCE_OFFSET;
    let bytes: [u8; 4] = quote.get(start..start + 4)?.try_into().ok()?;
    Some(u32::from_be_bytes(bytes))
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
