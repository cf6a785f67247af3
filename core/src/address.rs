use std::collections::HashMap;
use std::net::Ipv4Addr;
use std::time::Duration;

use parking_lot::Mutex;
use pnet::ipnetwork::Ipv4Network;
use pnet::util::MacAddr;
use tracing::{debug, info};

use tcproute_common::error::TraceError;
use tcproute_protocols::arp;

use crate::correlation::Predicate;
use crate::link::FrameExchange;

pub const ARP_TIMEOUT: Duration = Duration::from_secs(10);

/// Next-hop link addresses learned over ARP.
///
/// Off-subnet addresses are resolved through the gateway. Entries are never
/// evicted and only one ARP exchange runs at a time, so concurrent callers
/// asking for the same address share a single exchange.
pub struct AddressCache {
    local_mac: MacAddr,
    network: Ipv4Network,
    gateway: Ipv4Addr,
    timeout: Duration,
    table: Mutex<HashMap<Ipv4Addr, MacAddr>>,
    in_flight: Mutex<()>,
}

impl AddressCache {
    pub fn new(local_mac: MacAddr, network: Ipv4Network, gateway: Ipv4Addr) -> Self {
        Self::with_timeout(local_mac, network, gateway, ARP_TIMEOUT)
    }

    pub fn with_timeout(local_mac: MacAddr, network: Ipv4Network, gateway: Ipv4Addr, timeout: Duration) -> Self {
        Self {
            local_mac,
            network,
            gateway,
            timeout,
            table: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(()),
        }
    }

    /// The address whose link address a frame for `target` is sent to.
    pub fn next_hop(&self, target: Ipv4Addr) -> Ipv4Addr {
        if self.network.contains(target) {
            target
        } else {
            self.gateway
        }
    }

    pub fn cached(&self, ip: Ipv4Addr) -> Option<MacAddr> {
        self.table.lock().get(&ip).copied()
    }

    pub fn resolve(&self, link: &impl FrameExchange, target: Ipv4Addr) -> Result<MacAddr, TraceError> {
        let next_hop = self.next_hop(target);
        if let Some(mac) = self.cached(next_hop) {
            return Ok(mac);
        }

        let _guard = self.in_flight.lock();
        if let Some(mac) = self.cached(next_hop) {
            return Ok(mac);
        }

        debug!("Resolving link address of {next_hop} for {target}");
        let request = arp::create_request(self.local_mac, self.network.ip(), next_hop)?;
        let reply = link
            .send_and_correlate(request, self.reply_from(next_hop), self.timeout)
            .map_err(|e| match e {
                TraceError::Timeout => TraceError::AddressResolutionFailed { ip: next_hop },
                other => other,
            })?;

        let mac = arp::parse_reply(&reply.frame, self.local_mac)
            .map(|r| r.sender_mac)
            .ok_or(TraceError::AddressResolutionFailed { ip: next_hop })?;

        let mac = *self.table.lock().entry(next_hop).or_insert(mac);
        info!("{next_hop} is at {mac}");
        Ok(mac)
    }

    fn reply_from(&self, addr: Ipv4Addr) -> Predicate {
        let local_mac = self.local_mac;
        Box::new(move |frame: &[u8]| {
            arp::parse_reply(frame, local_mac).is_some_and(|reply| reply.sender_addr == addr)
        })
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
