use std::net::Ipv4Addr;

use pnet::packet::Packet;
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::ip::IpNextHeaderProtocols;
use pnet::packet::ipv4::Ipv4Packet;
use pnet::util::MacAddr;

use tcproute_protocols::{icmp, tcp};

/// What an accepted reply says about the probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplyKind {
    /// A router on the way dropped the probe.
    Intermediate(Ipv4Addr),
    /// The destination itself answered.
    Target(Ipv4Addr),
}

impl ReplyKind {
    pub fn source(self) -> Ipv4Addr {
        match self {
            Self::Intermediate(addr) | Self::Target(addr) => addr,
        }
    }

    pub fn is_target(self) -> bool {
        matches!(self, Self::Target(_))
    }
}

/// The replies that answer one SYN probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpectedReply {
    pub local_mac: MacAddr,
    pub local_addr: Ipv4Addr,
    pub destination: Ipv4Addr,
    pub src_port: u16,
    /// Sequence number of the probe, which equals its time-to-live.
    pub sequence: u32,
}

impl ExpectedReply {
    /// Classifies `frame`, or returns `None` when it does not answer this probe.
    pub fn classify(&self, frame: &[u8]) -> Option<ReplyKind> {
        let eth = EthernetPacket::new(frame)?;
        if eth.get_destination() != self.local_mac || eth.get_ethertype() != EtherTypes::Ipv4 {
            return None;
        }

        let ip = Ipv4Packet::new(eth.payload())?;
        if ip.get_destination() != self.local_addr {
            return None;
        }

        match ip.get_next_level_protocol() {
            IpNextHeaderProtocols::Icmp => {
                let quoted = icmp::quoted_tcp_sequence(ip.payload())?;
                (quoted == self.sequence).then_some(ReplyKind::Intermediate(ip.get_source()))
            }
            IpNextHeaderProtocols::Tcp => {
                if ip.get_source() != self.destination {
                    return None;
                }
                let segment = tcp::get_packet_from_u8(ip.payload()).ok()?;
                (segment.get_destination() == self.src_port).then_some(ReplyKind::Target(ip.get_source()))
            }
            _ => None,
        }
    }
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
