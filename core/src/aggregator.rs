//! # Hop Aggregator
//!
//! Folds the event stream into a [`HopTable`], one [`HopRecord`] per position,
//! and hands the table to a [`RenderHook`] after every change.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::net::IpAddr;
use std::time::Duration;

use tcproute_common::event::{AddressInfo, RouteEvent};
use tcproute_common::location::LocationInfo;
use tracing::trace;

use crate::bus::RouteObserver;

/// One probe attempt at a position.
#[derive(Debug, Clone, PartialEq)]
pub struct HopProbeResult {
    pub ip: Option<IpAddr>,
    pub latency: Option<Duration>,
    pub is_target: bool,
}

impl HopProbeResult {
    pub fn is_resolved(&self) -> bool {
        self.ip.is_some()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct HopRecord {
    pub position: u8,
    pub results: Vec<HopProbeResult>,
    /// Number of `HopComplete` events seen for this position.
    pub completed_attempts: usize,
}

impl HopRecord {
    fn new(position: u8) -> Self {
        Self {
            position,
            results: Vec::new(),
            completed_attempts: 0,
        }
    }

    pub fn has_results(&self) -> bool {
        !self.results.is_empty()
    }

    /// First address that answered at this position.
    pub fn ip(&self) -> Option<IpAddr> {
        self.results.iter().find_map(|r| r.ip)
    }

    /// Mean over the attempts that got a reply. Unanswered attempts are left
    /// out rather than counted as zero; `None` when nothing answered.
    pub fn mean_latency(&self) -> Option<Duration> {
        let latencies: Vec<Duration> = self.results.iter().filter_map(|r| r.latency).collect();
        if latencies.is_empty() {
            return None;
        }
        let total: Duration = latencies.iter().sum();
        Some(total / latencies.len() as u32)
    }

    pub fn unanswered(&self) -> usize {
        self.results.iter().filter(|r| !r.is_resolved()).count()
    }

    pub fn lookups_complete(&self) -> bool {
        self.completed_attempts >= self.results.len() && self.has_results()
    }
}

/// Everything learned about a run so far.
#[derive(Debug, Clone, Default)]
pub struct HopTable {
    hops: Vec<HopRecord>,
    names: HashMap<IpAddr, String>,
    locations: HashMap<IpAddr, LocationInfo>,
    completed: bool,
    error: Option<String>,
}

impl HopTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, event: &RouteEvent) {
        match event {
            RouteEvent::PositionMarker { position } => {
                self.record_mut(*position);
            }
            RouteEvent::ProbeResult {
                position,
                ip,
                latency,
                is_target,
            } => {
                self.record_mut(*position).results.push(HopProbeResult {
                    ip: *ip,
                    latency: *latency,
                    is_target: *is_target,
                });
            }
            RouteEvent::AddressInfo(AddressInfo::NameInfo { ip, name }) => {
                if let Entry::Vacant(slot) = self.names.entry(*ip) {
                    slot.insert(name.clone());
                } else {
                    trace!("Keeping first name for {ip}");
                }
            }
            RouteEvent::AddressInfo(AddressInfo::GeoInfo { ip, location }) => {
                self.locations.entry(*ip).or_insert_with(|| location.clone());
            }
            RouteEvent::HopComplete { position } => {
                self.record_mut(*position).completed_attempts += 1;
            }
            RouteEvent::RunComplete => self.completed = true,
        }
    }

    pub fn hops(&self) -> &[HopRecord] {
        &self.hops
    }

    pub fn hop(&self, position: u8) -> Option<&HopRecord> {
        let index = usize::from(position).checked_sub(1)?;
        self.hops.get(index)
    }

    pub fn name(&self, ip: &IpAddr) -> Option<&str> {
        self.names.get(ip).map(String::as_str)
    }

    pub fn location(&self, ip: &IpAddr) -> Option<&LocationInfo> {
        self.locations.get(ip)
    }

    /// Number of leading positions, from 1, that have at least one result.
    pub fn highest_contiguous_complete_position(&self) -> usize {
        self.hops.iter().take_while(|hop| hop.has_results()).count()
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    fn record_mut(&mut self, position: u8) -> &mut HopRecord {
        let index = usize::from(position.max(1)) - 1;
        while self.hops.len() <= index {
            let next = self.hops.len() as u8 + 1;
            self.hops.push(HopRecord::new(next));
        }
        &mut self.hops[index]
    }
}

/// Redraws whatever shows the table.
pub trait RenderHook: Send + 'static {
    fn on_update(&mut self, table: &HopTable);
}

/// Observer that keeps a [`HopTable`] current and renders it.
pub struct HopAggregator<R: RenderHook> {
    table: HopTable,
    hook: R,
}

impl<R: RenderHook> HopAggregator<R> {
    pub fn new(hook: R) -> Self {
        Self {
            table: HopTable::new(),
            hook,
        }
    }

    pub fn table(&self) -> &HopTable {
        &self.table
    }
}

impl<R: RenderHook> RouteObserver for HopAggregator<R> {
    fn on_event(&mut self, event: &RouteEvent) {
        self.table.apply(event);
        self.hook.on_update(&self.table);
    }

    fn on_completed(&mut self) {
        self.table.completed = true;
        self.hook.on_update(&self.table);
    }

    fn on_error(&mut self, message: &str) {
        self.table.error = Some(message.to_string());
        self.hook.on_update(&self.table);
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
