pub mod info;
pub mod route;

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use tcproute_common::config::{
    DEFAULT_MAX_HOPS, DEFAULT_MAX_REPETITIONS, DEFAULT_TIMEOUT, InterfaceSelector, TraceConfig,
};

#[derive(Parser)]
#[command(name = "tcproute")]
#[command(version, about = "Traces the route to a TCP service with SYN probes.")]
pub struct CommandLine {
    /// Show debug output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Trace the route to host:port
    #[command(alias = "r")]
    Route(RouteArgs),
    /// Show the devices a trace could use
    #[command(alias = "i")]
    Info,
}

#[derive(Args, Debug)]
pub struct RouteArgs {
    /// Destination as host:port
    pub destination: Destination,

    /// Maximum number of hops to search for the target
    #[arg(short = 'm', long, default_value_t = DEFAULT_MAX_HOPS, value_parser = clap::value_parser!(u8).range(1..))]
    pub max_hops: u8,

    /// Number of passes over the route
    #[arg(short = 'r', long, default_value_t = DEFAULT_MAX_REPETITIONS, value_parser = clap::value_parser!(u32).range(1..))]
    pub repetitions: u32,

    /// Seconds to wait for each reply
    #[arg(short = 't', long, default_value_t = DEFAULT_TIMEOUT.as_secs(), value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Do not resolve addresses to host names
    #[arg(short = 'n', long)]
    pub numeric: bool,

    /// Do not look up hop locations
    #[arg(short = 'l', long)]
    pub no_location: bool,

    /// Index of the device to send from
    #[arg(short = 'i', long, conflicts_with = "source_ip")]
    pub interface: Option<u32>,

    /// Source address selecting the device to send from
    #[arg(short = 's', long)]
    pub source_ip: Option<Ipv4Addr>,

    /// Gateway to use instead of the system default
    #[arg(short = 'g', long)]
    pub gateway: Option<Ipv4Addr>,
}

impl RouteArgs {
    pub fn interface_selector(&self) -> InterfaceSelector {
        match (self.interface, self.source_ip) {
            (Some(index), _) => InterfaceSelector::Index(index),
            (None, Some(addr)) => InterfaceSelector::SourceIp(addr),
            (None, None) => InterfaceSelector::Auto,
        }
    }

    /// Builds the trace parameters once the host has been resolved.
    pub fn to_config(&self, destination: Ipv4Addr) -> TraceConfig {
        TraceConfig {
            max_hops: self.max_hops,
            max_repetitions: self.repetitions,
            timeout: Duration::from_secs(self.timeout),
            resolve_names: !self.numeric,
            resolve_locations: !self.no_location,
            interface: self.interface_selector(),
            gateway: self.gateway,
            ..TraceConfig::new(destination, self.destination.port)
        }
    }
}

/// A `host:port` pair as typed on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub host: String,
    pub port: u16,
}

impl FromStr for Destination {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| format!("'{s}' is missing a port, expected host:port"))?;
        if host.is_empty() {
            return Err(format!("'{s}' is missing a host"));
        }
        let port: u16 = port
            .parse()
            .map_err(|_| format!("'{port}' is not a valid port"))?;
        if port == 0 {
            return Err("port must be between 1 and 65535".into());
        }
        Ok(Self {
            host: host.to_string(),
            port,
        })
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
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
