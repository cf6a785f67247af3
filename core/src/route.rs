//! # Probe Engine
//!
//! Sends one TCP SYN per time-to-live, waits for the ICMP time-exceeded or
//! TCP answer that belongs to it, and publishes what it learned on the
//! [`EventBus`]. Probing is strictly sequential; the name and location
//! lookups for each hop run concurrently on the tokio runtime.

pub mod reply;

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use tcproute_common::config::TraceConfig;
use tcproute_common::error::TraceError;
use tcproute_common::event::{AddressInfo, RouteEvent};
use tcproute_protocols::tcp::{self, CLEANUP_TTL, SegmentSpec};

use crate::bus::{EventBus, RouteObserver, Subscription};
use crate::correlation::Predicate;
use crate::link::{FrameExchange, LinkInterface};
use crate::lookup::{LocationResolver, NameResolver};
use reply::ExpectedReply;

/// Outcome of a single probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub ip: Option<IpAddr>,
    pub latency: Option<Duration>,
    pub is_target: bool,
}

impl ProbeOutcome {
    fn unresolved() -> Self {
        Self {
            ip: None,
            latency: None,
            is_target: false,
        }
    }
}

pub struct TcpRoute {
    link: Arc<LinkInterface>,
    cfg: TraceConfig,
    names: Arc<dyn NameResolver>,
    locations: Arc<dyn LocationResolver>,
    bus: EventBus,
    runtime: Handle,
}

impl TcpRoute {
    pub fn new(
        link: Arc<LinkInterface>,
        cfg: TraceConfig,
        names: Arc<dyn NameResolver>,
        locations: Arc<dyn LocationResolver>,
        runtime: Handle,
    ) -> Self {
        Self {
            link,
            cfg,
            names,
            locations,
            bus: EventBus::new(),
            runtime,
        }
    }

    pub fn subscribe<O: RouteObserver>(&self, observer: O) -> Subscription {
        self.bus.subscribe(observer)
    }

    /// Runs every repetition, then waits for outstanding lookups.
    ///
    /// Blocks the calling thread; call it from `spawn_blocking` or a plain
    /// thread, never from inside an async task.
    pub fn execute(&self) -> Result<(), TraceError> {
        let mut lookups = Vec::new();
        let result = self.cfg.validate().and_then(|()| self.probe_all(&mut lookups));

        self.runtime.block_on(async {
            for lookup in lookups {
                if let Err(e) = lookup.await {
                    warn!("Lookup task failed: {e}");
                }
            }
        });

        match result {
            Ok(()) => {
                info!("Trace to {} complete", self.cfg.destination);
                self.bus.publish(RouteEvent::RunComplete);
                self.bus.publish_completed();
                Ok(())
            }
            Err(e) => {
                error!("Trace aborted: {e}");
                self.bus.publish_error(&e.to_string());
                Err(e)
            }
        }
    }

    fn probe_all(&self, lookups: &mut Vec<JoinHandle<()>>) -> Result<(), TraceError> {
        for repetition in 0..self.cfg.max_repetitions {
            debug!("Starting repetition {}", repetition + 1);
            for hop_index in 0..self.cfg.max_hops {
                let position = hop_index + 1;
                self.bus.publish(RouteEvent::PositionMarker { position });

                let outcome = self.probe(hop_index)?;
                self.bus.publish(RouteEvent::ProbeResult {
                    position,
                    ip: outcome.ip,
                    latency: outcome.latency,
                    is_target: outcome.is_target,
                });
                lookups.push(self.spawn_lookups(position, outcome.ip));

                if outcome.is_target {
                    debug!("Reached {} at position {position}", self.cfg.destination);
                    break;
                }
            }
        }
        Ok(())
    }

    /// Sends the probe for `hop_index` and classifies its answer. Only a
    /// timeout is absorbed here.
    pub fn probe(&self, hop_index: u8) -> Result<ProbeOutcome, TraceError> {
        let ttl = hop_index + 1;
        let src_port = self.cfg.source_port(hop_index);
        let spec = self
            .link
            .segment_spec(self.cfg.destination, src_port, self.cfg.port, ttl)?;
        let expected = ExpectedReply {
            local_mac: self.link.mac(),
            local_addr: self.link.ip(),
            destination: self.cfg.destination,
            src_port,
            sequence: u32::from(ttl),
        };

        let syn = tcp::create_syn(&spec)?;
        let predicate: Predicate = Box::new(move |frame: &[u8]| expected.classify(frame).is_some());
        let answer = self.link.send_and_correlate(syn, predicate, self.cfg.timeout);

        self.send_cleanup(&spec);

        let reply = match answer {
            Ok(reply) => reply,
            Err(e) if e.is_recoverable() => {
                debug!("No answer at position {ttl}: {e}");
                return Ok(ProbeOutcome::unresolved());
            }
            Err(e) => return Err(e),
        };

        let Some(kind) = expected.classify(&reply.frame) else {
            return Ok(ProbeOutcome::unresolved());
        };
        Ok(ProbeOutcome {
            ip: Some(IpAddr::V4(kind.source())),
            latency: Some(reply.latency()),
            is_target: kind.is_target(),
        })
    }

    fn send_cleanup(&self, probe: &SegmentSpec) {
        let cleanup = SegmentSpec {
            ttl: CLEANUP_TTL,
            ..*probe
        };
        let sent = tcp::create_fin(&cleanup)
            .map_err(TraceError::from)
            .and_then(|fin| self.link.send(&fin));
        if let Err(e) = sent {
            debug!("FIN for port {} not sent: {e}", probe.src_port);
        }
    }

    fn spawn_lookups(&self, position: u8, ip: Option<IpAddr>) -> JoinHandle<()> {
        let bus = self.bus.clone();
        let names = self.cfg.resolve_names.then(|| self.names.clone());
        let locations = self.cfg.resolve_locations.then(|| self.locations.clone());

        self.runtime.spawn(async move {
            if let Some(ip) = ip {
                let name = async {
                    let Some(names) = names else { return };
                    match names.resolve_name(ip).await {
                        Ok(name) => bus.publish(RouteEvent::AddressInfo(AddressInfo::NameInfo { ip, name })),
                        Err(e) => debug!("No name for {ip}: {e}"),
                    }
                };
                let location = async {
                    let Some(locations) = locations else { return };
                    match locations.resolve_location(ip).await {
                        Ok(Some(location)) => {
                            bus.publish(RouteEvent::AddressInfo(AddressInfo::GeoInfo { ip, location }))
                        }
                        Ok(None) => {}
                        Err(e) => debug!("No location for {ip}: {e}"),
                    }
                };
                tokio::join!(name, location);
            }
            bus.publish(RouteEvent::HopComplete { position });
        })
    }
}
