//! # Route Events
//!
//! The closed vocabulary the probe engine publishes while tracing. For any
//! single hop the engine emits, in order: [`RouteEvent::PositionMarker`],
//! [`RouteEvent::ProbeResult`], any [`AddressInfo`] events, then
//! [`RouteEvent::HopComplete`]. [`RouteEvent::RunComplete`] is always last.

use std::net::IpAddr;
use std::time::Duration;

use crate::location::LocationInfo;

#[derive(Debug, Clone, PartialEq)]
pub enum RouteEvent {
    /// A probe for `position` is about to be sent.
    PositionMarker { position: u8 },
    /// Outcome of one probe attempt. `ip` and `latency` are `None` when no
    /// reply arrived before the timeout.
    ProbeResult {
        position: u8,
        ip: Option<IpAddr>,
        latency: Option<Duration>,
        is_target: bool,
    },
    /// Information learned about an address, independent of its position.
    AddressInfo(AddressInfo),
    /// All lookups for the probe at `position` have finished.
    HopComplete { position: u8 },
    RunComplete,
}

#[derive(Debug, Clone, PartialEq)]
pub enum AddressInfo {
    NameInfo { ip: IpAddr, name: String },
    GeoInfo { ip: IpAddr, location: LocationInfo },
}

impl AddressInfo {
    pub fn ip(&self) -> IpAddr {
        match self {
            Self::NameInfo { ip, .. } | Self::GeoInfo { ip, .. } => *ip,
        }
    }
}
