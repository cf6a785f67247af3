use std::net::Ipv4Addr;
use std::time::Duration;

use crate::error::TraceError;

pub const DEFAULT_MAX_HOPS: u8 = 30;
pub const DEFAULT_MAX_REPETITIONS: u32 = 1;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// How the capture device is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterfaceSelector {
    /// First non-loopback device that has a default gateway.
    #[default]
    Auto,
    /// The device bound to this source address.
    SourceIp(Ipv4Addr),
    /// The device with this OS interface index.
    Index(u32),
}

/// Runtime parameters of a single trace.
#[derive(Debug, Clone)]
pub struct TraceConfig {
    pub destination: Ipv4Addr,
    pub port: u16,
    pub max_hops: u8,
    pub max_repetitions: u32,
    /// Upper bound on each probe exchange. ARP uses its own fixed timeout.
    pub timeout: Duration,
    /// Resolve hop addresses to host names.
    pub resolve_names: bool,
    /// Resolve hop addresses to geographic locations.
    pub resolve_locations: bool,
    pub interface: InterfaceSelector,
    /// Overrides gateway discovery.
    pub gateway: Option<Ipv4Addr>,
}

impl TraceConfig {
    pub fn new(destination: Ipv4Addr, port: u16) -> Self {
        Self {
            destination,
            port,
            max_hops: DEFAULT_MAX_HOPS,
            max_repetitions: DEFAULT_MAX_REPETITIONS,
            timeout: DEFAULT_TIMEOUT,
            resolve_names: true,
            resolve_locations: true,
            interface: InterfaceSelector::Auto,
            gateway: None,
        }
    }

    pub fn validate(&self) -> Result<(), TraceError> {
        if self.max_hops == 0 {
            return Err(TraceError::InvalidConfig("max hops must be at least 1"));
        }
        if self.max_repetitions == 0 {
            return Err(TraceError::InvalidConfig("max repetitions must be at least 1"));
        }
        if self.timeout.is_zero() {
            return Err(TraceError::InvalidConfig("timeout must be positive"));
        }
        Ok(())
    }

    /// Source port used for the probe at `hop_index` (0-based).
    ///
    /// Stable across repetitions so a hop keeps the same flow through
    /// load balancers.
    pub fn source_port(&self, hop_index: u8) -> u16 {
        u16::MAX - u16::from(self.max_hops) + u16::from(hop_index)
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
