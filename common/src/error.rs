use std::io;
use std::net::{IpAddr, Ipv4Addr};

use tcproute_protocols::FrameError;
use thiserror::Error;

/// Failures of the probing subsystem.
///
/// Only [`TraceError::Timeout`] is recovered from inside the probe loop; every
/// other variant aborts the run.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("no reply arrived before the exchange timed out")]
    Timeout,
    #[error("address resolution failed for {ip}")]
    AddressResolutionFailed { ip: Ipv4Addr },
    #[error("no usable network device found: {0}")]
    NoDeviceFound(String),
    #[error("opening device {name}")]
    DeviceOpen {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("non-ethernet channel for {0}")]
    NonEthernetChannel(String),
    #[error("device {0} has no IPv4 address")]
    NoIpv4Address(String),
    #[error("no default gateway known for {0}")]
    NoGateway(String),
    #[error("sending frame")]
    Send(#[source] io::Error),
    #[error("link interface is closed")]
    LinkClosed,
    #[error(transparent)]
    Frame(#[from] FrameError),
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
}

impl TraceError {
    /// Whether the probe loop may continue after this error.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

/// Failures of the name and location lookups. These never abort a run.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("no record found for {0}")]
    NotFound(IpAddr),
    #[error("resolver error: {0}")]
    Resolver(String),
    #[error("http error: {0}")]
    Http(String),
    #[error("could not decode response: {0}")]
    Decode(String),
}

// ╔════════════════════════════════════════════╗
// ║ ████████╗███████╗███████╗████████╗███████╗ ║
// ║ ╚══██╔══╝██╔════╝██╔════╝╚══██╔══╝██╔════╝ ║
// ║    ██║   █████╗  ███████╗   ██║   ███████╗ ║
// ║    ██║   ██╔══╝  ╚════██║   ██║   ╚════██║ ║
// ║    ██║   ███████╗███████║   ██║   ███████║ ║
// ║    ╚═╝   ╚══════╝╚══════╝   ╚═╝   ╚══════╝ ║
// ╚════════════════════════════════════════════╝
