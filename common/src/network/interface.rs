use std::net::Ipv4Addr;

use pnet::datalink::{self, NetworkInterface};
use pnet::ipnetwork::{IpNetwork, Ipv4Network};
use tracing::debug;

use crate::config::InterfaceSelector;
use crate::error::TraceError;
use crate::network::gateway;

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum ViabilityError {
    /// The interface is operationally down.
    IsDown,
    /// Loopback devices cannot reach a gateway.
    IsLoopback,
    /// The interface does not have a MAC address.
    NoMacAddress,
    /// The interface has no IPv4 address to send probes from.
    NoIpv4,
}

pub trait NetworkInterfaceExtension {
    fn get_ipv4_net(&self) -> Option<Ipv4Network>;
    fn has_ipv4_addr(&self, addr: Ipv4Addr) -> bool;
}

impl NetworkInterfaceExtension for NetworkInterface {
    fn get_ipv4_net(&self) -> Option<Ipv4Network> {
        self.ips.iter().find_map(|ip| match ip {
            IpNetwork::V4(net) if !net.ip().is_loopback() => Some(*net),
            _ => None,
        })
    }

    fn has_ipv4_addr(&self, addr: Ipv4Addr) -> bool {
        self.ips
            .iter()
            .any(|ip| matches!(ip, IpNetwork::V4(net) if net.ip() == addr))
    }
}

/// Devices that could carry a trace, in the order the OS reports them.
pub fn usable_interfaces() -> Vec<NetworkInterface> {
    datalink::interfaces()
        .into_iter()
        .filter(|intf| is_viable_interface(intf).is_ok())
        .collect()
}

/// Picks the capture device described by `selector` from the host's devices.
pub fn find_interface(selector: InterfaceSelector) -> Result<NetworkInterface, TraceError> {
    select_interface(datalink::interfaces(), selector, |intf| {
        gateway::default_gateway(intf).is_some()
    })
}

/// Applies `selector` to `interfaces`.
///
/// `Auto` takes the first viable device for which `has_gateway` holds.
pub fn select_interface(
    interfaces: Vec<NetworkInterface>,
    selector: InterfaceSelector,
    has_gateway: impl Fn(&NetworkInterface) -> bool,
) -> Result<NetworkInterface, TraceError> {
    let mut viable = interfaces.into_iter().filter(|intf| match is_viable_interface(intf) {
        Ok(()) => true,
        Err(reason) => {
            debug!("Skipping {}: {reason:?}", intf.name);
            false
        }
    });

    match selector {
        InterfaceSelector::Auto => viable
            .find(|intf| has_gateway(intf))
            .ok_or_else(|| TraceError::NoDeviceFound("no device with a default gateway".into())),
        InterfaceSelector::SourceIp(addr) => viable
            .find(|intf| intf.has_ipv4_addr(addr))
            .ok_or_else(|| TraceError::NoDeviceFound(format!("no device bound to {addr}"))),
        InterfaceSelector::Index(index) => viable
            .find(|intf| intf.index == index)
            .ok_or_else(|| TraceError::NoDeviceFound(format!("no device with index {index}"))),
    }
}

fn is_viable_interface(interface: &NetworkInterface) -> Result<(), ViabilityError> {
    if interface.is_loopback() {
        return Err(ViabilityError::IsLoopback);
    }
    if !interface.is_up() {
        return Err(ViabilityError::IsDown);
    }
    if interface.mac.is_none() {
        return Err(ViabilityError::NoMacAddress);
    }
    if interface.get_ipv4_net().is_none() {
        return Err(ViabilityError::NoIpv4);
    }
    Ok(())
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
