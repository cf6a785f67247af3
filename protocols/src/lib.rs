//! # Probe Frame Builder
//!
//! Constructs and inspects the raw link-layer frames exchanged while tracing a
//! route: Ethernet+ARP requests for next-hop resolution, Ethernet+IPv4+TCP
//! SYN probes and FIN cleanup segments, plus the parsing helpers needed to
//! recognise ARP replies and ICMP time-exceeded messages.
//!
//! All builders return owned `Vec<u8>` frames with correct IPv4 and TCP
//! checksums, ready to be written to a datalink channel.

pub mod arp;
pub mod ethernet;
pub mod icmp;
pub mod ipv4;
pub mod tcp;

use thiserror::Error;

pub const MIN_ETH_FRAME_NO_FCS: usize = 60;
pub const ETH_HDR_LEN: usize = 14;
pub const ARP_LEN: usize = 28;
pub const IPV4_HDR_LEN: usize = 20;
pub const TCP_HDR_LEN: usize = 20;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("buffer too small for {0} header")]
    BufferTooSmall(&'static str),
    #[error("truncated or invalid {layer} packet (len {len})")]
    Truncated { layer: &'static str, len: usize },
}
