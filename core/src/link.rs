//! Layer 2 access to the capture device.
//!
//! A [`LinkInterface`] owns the Ethernet channel of one device. Frames are
//! written through a shared sender; a dedicated capture thread reads every
//! inbound frame and hands it to the [`ExchangeRegistry`]. This module
//! requires **root privileges** outside of tests.

use std::io;
use std::net::Ipv4Addr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use pnet::datalink::{self, Channel, Config, DataLinkReceiver, DataLinkSender, NetworkInterface};
use pnet::ipnetwork::Ipv4Network;
use pnet::util::MacAddr;
use tracing::{debug, error, info, trace};

use tcproute_common::config::TraceConfig;
use tcproute_common::error::TraceError;
use tcproute_common::network::gateway;
use tcproute_common::network::interface::{self, NetworkInterfaceExtension};
use tcproute_protocols::tcp::SegmentSpec;

use crate::address::AddressCache;
use crate::correlation::{ExchangeRegistry, Predicate, Reply};

const CAPTURE_READ_TIMEOUT: Duration = Duration::from_millis(50);

/// Sending frames and waiting for the frame that answers them.
pub trait FrameExchange {
    fn send(&self, frame: &[u8]) -> Result<(), TraceError>;

    /// Sends `frame` and blocks until `predicate` accepts a captured frame or
    /// `timeout` elapses.
    fn send_and_correlate(
        &self,
        frame: Vec<u8>,
        predicate: Predicate,
        timeout: Duration,
    ) -> Result<Reply, TraceError>;
}

pub struct LinkInterface {
    name: String,
    mac: MacAddr,
    ipv4_net: Ipv4Network,
    gateway: Ipv4Addr,
    tx: Mutex<Box<dyn DataLinkSender>>,
    registry: Arc<ExchangeRegistry>,
    addresses: AddressCache,
    running: Arc<AtomicBool>,
}

impl LinkInterface {
    /// Selects and opens the device described by `cfg`.
    pub fn open(cfg: &TraceConfig) -> Result<Self, TraceError> {
        let intf = match cfg.gateway {
            Some(_) => interface::select_interface(datalink::interfaces(), cfg.interface, |_| true)?,
            None => interface::find_interface(cfg.interface)?,
        };
        let gateway = cfg
            .gateway
            .or_else(|| gateway::default_gateway(&intf))
            .ok_or_else(|| TraceError::NoGateway(intf.name.clone()))?;

        Self::open_with(intf, gateway, datalink::channel)
    }

    /// Opens `intf` through `channel_opener` and starts the capture thread.
    pub fn open_with<F>(intf: NetworkInterface, gateway: Ipv4Addr, channel_opener: F) -> Result<Self, TraceError>
    where
        F: FnOnce(&NetworkInterface, Config) -> io::Result<Channel>,
    {
        let mac = intf.mac.ok_or_else(|| TraceError::NoDeviceFound(format!("{} has no MAC address", intf.name)))?;
        let ipv4_net = intf
            .get_ipv4_net()
            .ok_or_else(|| TraceError::NoIpv4Address(intf.name.clone()))?;

        let (tx, rx) = open_eth_channel(&intf, &get_config(), channel_opener)?;
        info!("Opened {} ({}, {mac}) via gateway {gateway}", intf.name, ipv4_net.ip());

        let registry = Arc::new(ExchangeRegistry::new());
        let running = Arc::new(AtomicBool::new(true));
        spawn_capture(rx, registry.clone(), running.clone());

        Ok(Self {
            name: intf.name,
            mac,
            ipv4_net,
            gateway,
            tx: Mutex::new(tx),
            registry,
            addresses: AddressCache::new(mac, ipv4_net, gateway),
            running,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mac(&self) -> MacAddr {
        self.mac
    }

    pub fn ip(&self) -> Ipv4Addr {
        self.ipv4_net.ip()
    }

    pub fn network(&self) -> Ipv4Network {
        self.ipv4_net
    }

    pub fn gateway(&self) -> Ipv4Addr {
        self.gateway
    }

    pub fn is_open(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Link address of the next hop towards `ip`: the host itself when it is
    /// on the local subnet, otherwise the gateway.
    pub fn resolve_link_address(&self, ip: Ipv4Addr) -> Result<MacAddr, TraceError> {
        self.addresses.resolve(self, ip)
    }

    /// Addresses a segment to `destination`, resolving the next hop first.
    pub fn segment_spec(
        &self,
        destination: Ipv4Addr,
        src_port: u16,
        dst_port: u16,
        ttl: u8,
    ) -> Result<SegmentSpec, TraceError> {
        let dst_mac = self.resolve_link_address(destination)?;
        Ok(SegmentSpec {
            src_mac: self.mac,
            dst_mac,
            src_addr: self.ip(),
            dst_addr: destination,
            src_port,
            dst_port,
            ttl,
        })
    }

    /// Stops the capture thread and fails every pending exchange.
    pub fn close(&self) {
        if self.running.swap(false, Ordering::AcqRel) {
            debug!("Closing {}", self.name);
            self.registry.close();
        }
    }
}

impl FrameExchange for LinkInterface {
    fn send(&self, frame: &[u8]) -> Result<(), TraceError> {
        if !self.is_open() {
            return Err(TraceError::LinkClosed);
        }
        match self.tx.lock().send_to(frame, None) {
            Some(Ok(())) => Ok(()),
            Some(Err(e)) => Err(TraceError::Send(e)),
            None => Err(TraceError::Send(io::Error::other("sender accepted no frame"))),
        }
    }

    fn send_and_correlate(
        &self,
        frame: Vec<u8>,
        predicate: Predicate,
        timeout: Duration,
    ) -> Result<Reply, TraceError> {
        let handle = self.registry.register(frame.clone(), predicate, timeout);
        if let Err(e) = self.send(&frame) {
            self.registry.cancel(handle.id());
            return Err(e);
        }
        self.registry.wait(handle)
    }
}

impl Drop for LinkInterface {
    fn drop(&mut self) {
        self.close();
    }
}

fn open_eth_channel<F>(
    intf: &NetworkInterface,
    cfg: &Config,
    channel_opener: F,
) -> Result<(Box<dyn DataLinkSender>, Box<dyn DataLinkReceiver>), TraceError>
where
    F: FnOnce(&NetworkInterface, Config) -> io::Result<Channel>,
{
    let ch = channel_opener(intf, *cfg).map_err(|source| TraceError::DeviceOpen {
        name: intf.name.clone(),
        source,
    })?;
    match ch {
        Channel::Ethernet(tx, rx) => Ok((tx, rx)),
        _ => Err(TraceError::NonEthernetChannel(intf.name.clone())),
    }
}

fn spawn_capture(mut rx: Box<dyn DataLinkReceiver>, registry: Arc<ExchangeRegistry>, running: Arc<AtomicBool>) {
    std::thread::spawn(move || {
        while running.load(Ordering::Acquire) {
            match rx.next() {
                Ok(frame) => registry.on_frame_arrival(frame, Instant::now()),
                Err(e) if is_read_timeout(&e) => {}
                Err(e) => {
                    error!("Capture failed, closing link: {e}");
                    running.store(false, Ordering::Release);
                    registry.close();
                    break;
                }
            }
        }
        trace!("Capture thread exiting");
    });
}

fn is_read_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock | io::ErrorKind::Interrupted
    )
}

fn get_config() -> Config {
    Config {
        read_timeout: Some(CAPTURE_READ_TIMEOUT),
        ..Default::default()
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
