//! An in-memory network behind a dummy pnet channel.
//!
//! The simulated gateway answers ARP for itself. Each SYN probe is answered
//! by the router at its TTL with an ICMP time-exceeded message, or by the
//! destination with a SYN/ACK once the TTL is past the last router.

use std::collections::HashSet;
use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, Sender};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pnet::datalink::{Channel, Config, NetworkInterface, dummy};
use pnet::ipnetwork::IpNetwork;
use pnet::packet::Packet;
use pnet::packet::arp::{ArpHardwareTypes, ArpOperations, ArpPacket, MutableArpPacket};
use pnet::packet::ethernet::{EtherTypes, EthernetPacket};
use pnet::packet::icmp::IcmpTypes;
use pnet::packet::ip::{IpNextHeaderProtocol, IpNextHeaderProtocols};
use pnet::packet::ipv4::Ipv4Packet;
use pnet::packet::tcp::{MutableTcpPacket, TcpFlags, TcpPacket};
use pnet::util::MacAddr;
use tcproute_core::link::LinkInterface;
use tcproute_protocols::ipv4::{self, Ipv4Fields};
use tcproute_protocols::{ARP_LEN, ETH_HDR_LEN, IPV4_HDR_LEN, MIN_ETH_FRAME_NO_FCS, TCP_HDR_LEN, ethernet};

pub const GATEWAY_MAC: MacAddr = MacAddr(0x02, 0x00, 0x00, 0x00, 0x00, 0x01);

pub fn local_ip() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 1, 10)
}

pub fn gateway_ip() -> Ipv4Addr {
    Ipv4Addr::new(192, 168, 1, 1)
}

/// Shape of the simulated path.
#[derive(Debug, Clone)]
pub struct Topology {
    /// Routers at positions 1..=routers.len(). The first is usually the gateway.
    pub routers: Vec<Ipv4Addr>,
    pub destination: Ipv4Addr,
    /// Positions whose router drops probes silently.
    pub silent: HashSet<u8>,
    pub answer_arp: bool,
    /// Position at which the device read fails instead of answering.
    pub capture_failure: Option<u8>,
}

impl Topology {
    pub fn new(routers: Vec<Ipv4Addr>, destination: Ipv4Addr) -> Self {
        Self {
            routers,
            destination,
            silent: HashSet::new(),
            answer_arp: true,
            capture_failure: None,
        }
    }
}

/// Frames the link wrote, grouped by what the simulation recognized.
#[derive(Debug, Default)]
pub struct Capture {
    pub arp_requests: usize,
    pub syns: Vec<Segment>,
    pub fins: Vec<Segment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    pub dst_mac: MacAddr,
    pub ttl: u8,
    pub src_port: u16,
    pub dst_port: u16,
    pub sequence: u32,
}

/// The responder thread runs until the link, and with it the dummy channel, is dropped.
pub struct SimNetwork {
    pub link: Arc<LinkInterface>,
    pub capture: Arc<Mutex<Capture>>,
}

impl SimNetwork {
    pub fn start(topology: Topology) -> Self {
        let mut dummy_cfg = dummy::Config::default();
        let inject = dummy_cfg.inject_handle().expect("inject handle");
        let written = dummy_cfg.read_handle().expect("read handle");
        let opener = move |intf: &NetworkInterface, _: Config| -> io::Result<Channel> {
            dummy::channel(intf, dummy_cfg)
        };

        let link = LinkInterface::open_with(sim_interface(), gateway_ip(), opener).expect("open link");
        let capture = Arc::new(Mutex::new(Capture::default()));
        let responder = Responder {
            topology,
            local_mac: link.mac(),
            inject,
            capture: capture.clone(),
        };
        std::thread::spawn(move || responder.run(written));

        Self {
            link: Arc::new(link),
            capture,
        }
    }
}

impl SimNetwork {
    /// Polls the capture until `done` holds. Frames are recorded by the
    /// responder thread, so the last ones may trail the probe loop slightly.
    pub fn wait_for(&self, done: impl Fn(&Capture) -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(2);
        while Instant::now() < deadline {
            if done(&self.capture.lock()) {
                return true;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        done(&self.capture.lock())
    }
}

fn sim_interface() -> NetworkInterface {
    let mut intf = dummy::dummy_interface(0);
    intf.ips = vec![IpNetwork::V4("192.168.1.10/24".parse().expect("network"))];
    intf
}

struct Responder {
    topology: Topology,
    local_mac: MacAddr,
    inject: Sender<io::Result<Box<[u8]>>>,
    capture: Arc<Mutex<Capture>>,
}

impl Responder {
    fn run(self, written: Receiver<Box<[u8]>>) {
        while let Ok(frame) = written.recv() {
            if self.fails_capture(&frame) {
                let _ = self.inject.send(Err(io::Error::new(io::ErrorKind::BrokenPipe, "device gone")));
                continue;
            }
            if let Some(reply) = self.answer(&frame) {
                if self.inject.send(Ok(reply.into_boxed_slice())).is_err() {
                    break;
                }
            }
        }
    }

    fn fails_capture(&self, frame: &[u8]) -> bool {
        let Some(position) = self.topology.capture_failure else {
            return false;
        };
        let Some(eth) = EthernetPacket::new(frame) else {
            return false;
        };
        if eth.get_ethertype() != EtherTypes::Ipv4 {
            return false;
        }
        Ipv4Packet::new(eth.payload()).is_some_and(|ip| ip.get_ttl() == position)
    }

    fn answer(&self, frame: &[u8]) -> Option<Vec<u8>> {
        let eth = EthernetPacket::new(frame)?;
        match eth.get_ethertype() {
            EtherTypes::Arp => self.answer_arp(ArpPacket::new(eth.payload())?),
            EtherTypes::Ipv4 => self.answer_segment(eth.get_destination(), Ipv4Packet::new(eth.payload())?),
            _ => None,
        }
    }

    fn answer_arp(&self, request: ArpPacket<'_>) -> Option<Vec<u8>> {
        self.capture.lock().arp_requests += 1;
        if !self.topology.answer_arp || request.get_target_proto_addr() != gateway_ip() {
            return None;
        }

        let mut buffer = vec![0u8; MIN_ETH_FRAME_NO_FCS];
        ethernet::make_header(&mut buffer, GATEWAY_MAC, self.local_mac, EtherTypes::Arp).ok()?;
        let mut reply = MutableArpPacket::new(&mut buffer[ETH_HDR_LEN..ETH_HDR_LEN + ARP_LEN])?;
        reply.set_hardware_type(ArpHardwareTypes::Ethernet);
        reply.set_protocol_type(EtherTypes::Ipv4);
        reply.set_hw_addr_len(6);
        reply.set_proto_addr_len(4);
        reply.set_operation(ArpOperations::Reply);
        reply.set_sender_hw_addr(GATEWAY_MAC);
        reply.set_sender_proto_addr(gateway_ip());
        reply.set_target_hw_addr(self.local_mac);
        reply.set_target_proto_addr(request.get_sender_proto_addr());
        Some(buffer)
    }

    fn answer_segment(&self, dst_mac: MacAddr, ip: Ipv4Packet<'_>) -> Option<Vec<u8>> {
        if ip.get_next_level_protocol() != IpNextHeaderProtocols::Tcp {
            return None;
        }
        let tcp = TcpPacket::new(ip.payload())?;
        let segment = Segment {
            dst_mac,
            ttl: ip.get_ttl(),
            src_port: tcp.get_source(),
            dst_port: tcp.get_destination(),
            sequence: tcp.get_sequence(),
        };

        if tcp.get_flags() & TcpFlags::FIN != 0 {
            self.capture.lock().fins.push(segment);
            return None;
        }
        if tcp.get_flags() & TcpFlags::SYN == 0 {
            return None;
        }
        self.capture.lock().syns.push(segment);

        let position = segment.ttl;
        if self.topology.silent.contains(&position) {
            return None;
        }
        let router = usize::from(position)
            .checked_sub(1)
            .and_then(|index| self.topology.routers.get(index));
        match router {
            Some(router) => {
                let header_len = ipv4::header_len(&ip);
                let quote = &ip.packet()[..header_len + 8];
                let mut icmp = vec![0u8; 8];
                icmp[0] = IcmpTypes::TimeExceeded.0;
                icmp.extend_from_slice(quote);
                self.ip_frame(*router, IpNextHeaderProtocols::Icmp, &icmp)
            }
            None => {
                let mut reply = vec![0u8; TCP_HDR_LEN];
                let mut syn_ack = MutableTcpPacket::new(&mut reply)?;
                syn_ack.set_source(segment.dst_port);
                syn_ack.set_destination(segment.src_port);
                syn_ack.set_acknowledgement(segment.sequence.wrapping_add(1));
                syn_ack.set_data_offset(5);
                syn_ack.set_flags(TcpFlags::SYN | TcpFlags::ACK);
                self.ip_frame(self.topology.destination, IpNextHeaderProtocols::Tcp, &reply)
            }
        }
    }

    fn ip_frame(&self, src: Ipv4Addr, protocol: IpNextHeaderProtocol, payload: &[u8]) -> Option<Vec<u8>> {
        let mut frame = vec![0u8; ETH_HDR_LEN + IPV4_HDR_LEN + payload.len()];
        ethernet::make_header(&mut frame, GATEWAY_MAC, self.local_mac, EtherTypes::Ipv4).ok()?;
        let fields = Ipv4Fields {
            src_addr: src,
            dst_addr: local_ip(),
            ttl: 64,
            protocol,
            payload_len: payload.len() as u16,
        };
        ipv4::write_header(&mut frame[ETH_HDR_LEN..], &fields).ok()?;
        frame[ETH_HDR_LEN + IPV4_HDR_LEN..].copy_from_slice(payload);
        Some(frame)
    }
}
