#![cfg(test)]
use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tcproute_common::config::TraceConfig;
use tcproute_common::error::{LookupError, TraceError};
use tcproute_common::event::{AddressInfo, RouteEvent};
use tcproute_common::location::LocationInfo;
use tcproute_core::aggregator::{HopAggregator, HopTable, RenderHook};
use tcproute_core::bus::RouteObserver;
use tcproute_core::lookup::{LocationResolver, NameResolver, NoLookup};
use tcproute_core::route::TcpRoute;
use tcproute_protocols::tcp::CLEANUP_TTL;
use tokio::runtime::Handle;

use crate::sim::{GATEWAY_MAC, SimNetwork, Topology, gateway_ip};

#[derive(Debug, Default)]
struct Log {
    events: Vec<RouteEvent>,
    completed: bool,
    error: Option<String>,
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Log>>);

impl RouteObserver for Recorder {
    fn on_event(&mut self, event: &RouteEvent) {
        self.0.lock().events.push(event.clone());
    }

    fn on_completed(&mut self) {
        self.0.lock().completed = true;
    }

    fn on_error(&mut self, message: &str) {
        self.0.lock().error = Some(message.to_string());
    }
}

#[derive(Clone, Default)]
struct Progress(Arc<Mutex<Vec<usize>>>);

impl RenderHook for Progress {
    fn on_update(&mut self, table: &HopTable) {
        self.0.lock().push(table.highest_contiguous_complete_position());
    }
}

struct NumberedNames;

#[async_trait]
impl NameResolver for NumberedNames {
    async fn resolve_name(&self, ip: IpAddr) -> Result<String, LookupError> {
        match ip {
            IpAddr::V4(v4) => Ok(format!("host-{}.example", v4.octets()[3])),
            IpAddr::V6(_) => Err(LookupError::NotFound(ip)),
        }
    }
}

struct OnlyDestination;

#[async_trait]
impl LocationResolver for OnlyDestination {
    async fn resolve_location(&self, ip: IpAddr) -> Result<Option<LocationInfo>, LookupError> {
        if ip != IpAddr::V4(destination()) {
            return Ok(None);
        }
        Ok(Some(LocationInfo {
            city: Some("Amsterdam".into()),
            country: Some("Netherlands".into()),
            ..Default::default()
        }))
    }
}

fn routers() -> Vec<Ipv4Addr> {
    vec![gateway_ip(), Ipv4Addr::new(10, 20, 0, 1), Ipv4Addr::new(172, 16, 3, 1)]
}

fn destination() -> Ipv4Addr {
    Ipv4Addr::new(203, 0, 113, 5)
}

fn config(max_hops: u8) -> TraceConfig {
    TraceConfig {
        max_hops,
        timeout: Duration::from_secs(2),
        resolve_names: false,
        resolve_locations: false,
        ..TraceConfig::new(destination(), 443)
    }
}

struct Run {
    result: Result<(), TraceError>,
    log: Log,
    sim: SimNetwork,
}

async fn trace(
    topology: Topology,
    cfg: TraceConfig,
    names: Arc<dyn NameResolver>,
    locations: Arc<dyn LocationResolver>,
) -> Run {
    let sim = SimNetwork::start(topology);
    let route = TcpRoute::new(sim.link.clone(), cfg, names, locations, Handle::current());
    let recorder = Recorder::default();
    let mut subscription = route.subscribe(recorder.clone());

    let result = tokio::task::spawn_blocking(move || route.execute())
        .await
        .expect("probe thread panicked");
    tokio::task::spawn_blocking(move || subscription.wait())
        .await
        .expect("dispatcher panicked");

    let log = std::mem::take(&mut *recorder.0.lock());
    Run { result, log, sim }
}

async fn trace_plain(topology: Topology, cfg: TraceConfig) -> Run {
    trace(topology, cfg, Arc::new(NoLookup), Arc::new(NoLookup)).await
}

fn probe_results(log: &Log) -> Vec<(u8, Option<IpAddr>, bool)> {
    log.events
        .iter()
        .filter_map(|event| match event {
            RouteEvent::ProbeResult { position, ip, is_target, .. } => Some((*position, *ip, *is_target)),
            _ => None,
        })
        .collect()
}

fn index_of(log: &Log, wanted: impl Fn(&RouteEvent) -> bool) -> usize {
    log.events.iter().position(wanted).expect("event not published")
}

fn v4(addr: Ipv4Addr) -> Option<IpAddr> {
    Some(IpAddr::V4(addr))
}

#[tokio::test(flavor = "multi_thread")]
async fn reaches_destination_past_the_routers() -> anyhow::Result<()> {
    let run = trace_plain(Topology::new(routers(), destination()), config(10)).await;
    run.result?;

    let results = probe_results(&run.log);
    let expected: Vec<_> = routers()
        .into_iter()
        .map(v4)
        .chain([v4(destination())])
        .enumerate()
        .map(|(i, ip)| (i as u8 + 1, ip, i == 3))
        .collect();
    assert_eq!(results, expected);

    assert!(run.log.completed);
    assert_eq!(run.log.error, None);
    assert_eq!(run.log.events.last(), Some(&RouteEvent::RunComplete));
    Ok(())
}

#[tokio::test(flavor = "multi_thread")]
async fn probes_go_through_the_gateway_and_are_cleaned_up() {
    let run = trace_plain(Topology::new(routers(), destination()), config(10)).await;
    assert!(run.result.is_ok());
    assert!(run.sim.wait_for(|capture| capture.fins.len() == 4));

    let capture = run.sim.capture.lock();
    assert_eq!(capture.arp_requests, 1);

    let ttls: Vec<u8> = capture.syns.iter().map(|syn| syn.ttl).collect();
    assert_eq!(ttls, [1, 2, 3, 4]);
    for syn in &capture.syns {
        assert_eq!(syn.dst_mac, GATEWAY_MAC);
        assert_eq!(syn.dst_port, 443);
        assert_eq!(syn.sequence, u32::from(syn.ttl));
    }

    for (fin, syn) in capture.fins.iter().zip(&capture.syns) {
        assert_eq!(fin.ttl, CLEANUP_TTL);
        assert_eq!(fin.src_port, syn.src_port);
        assert_eq!(fin.dst_port, 443);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn each_position_is_marked_then_answered_then_completed() {
    let run = trace_plain(Topology::new(routers(), destination()), config(10)).await;
    assert!(run.result.is_ok());

    for position in 1..=4u8 {
        let marker = index_of(&run.log, |e| *e == RouteEvent::PositionMarker { position });
        let result = index_of(&run.log, |e| {
            matches!(e, RouteEvent::ProbeResult { position: p, .. } if *p == position)
        });
        let complete = index_of(&run.log, |e| *e == RouteEvent::HopComplete { position });
        assert!(marker < result, "position {position}");
        assert!(result < complete, "position {position}");
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn silent_router_leaves_an_unresolved_position() {
    let mut topology = Topology::new(routers(), destination());
    topology.silent = HashSet::from([2]);
    let cfg = TraceConfig {
        timeout: Duration::from_millis(300),
        ..config(10)
    };

    let run = trace_plain(topology, cfg).await;
    assert!(run.result.is_ok());

    let results = probe_results(&run.log);
    assert_eq!(results.len(), 4);
    assert_eq!(results[1], (2, None, false));
    assert_eq!(results[3], (4, v4(destination()), true));

    let latency = run.log.events.iter().find_map(|e| match e {
        RouteEvent::ProbeResult { position: 2, latency, .. } => Some(*latency),
        _ => None,
    });
    assert_eq!(latency, Some(None));
}

#[tokio::test(flavor = "multi_thread")]
async fn stops_at_max_hops_without_reaching_the_destination() {
    let run = trace_plain(Topology::new(routers(), destination()), config(2)).await;
    assert!(run.result.is_ok());

    let results = probe_results(&run.log);
    assert_eq!(results.len(), 2);
    assert!(results.iter().all(|(_, _, is_target)| !is_target));
    assert!(run.log.completed);
    assert_eq!(run.sim.capture.lock().syns.len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn repetitions_reuse_source_ports_per_position() {
    let cfg = TraceConfig {
        max_repetitions: 2,
        ..config(10)
    };
    let run = trace_plain(Topology::new(routers(), destination()), cfg).await;
    assert!(run.result.is_ok());

    let positions: Vec<u8> = probe_results(&run.log).iter().map(|r| r.0).collect();
    assert_eq!(positions, [1, 2, 3, 4, 1, 2, 3, 4]);

    let capture = run.sim.capture.lock();
    assert_eq!(capture.syns.len(), 8);
    for i in 0..4 {
        assert_eq!(capture.syns[i].src_port, capture.syns[i + 4].src_port);
    }
    assert_eq!(capture.arp_requests, 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn unreachable_gateway_aborts_before_probing() {
    let mut topology = Topology::new(routers(), destination());
    topology.answer_arp = false;
    let cfg = TraceConfig {
        timeout: Duration::from_millis(200),
        ..config(10)
    };

    let run = trace_plain(topology, cfg).await;
    match run.result {
        Err(TraceError::AddressResolutionFailed { ip }) => assert_eq!(ip, gateway_ip()),
        other => panic!("unexpected result: {other:?}"),
    }

    assert!(!run.log.completed);
    assert!(run.log.error.is_some());
    assert!(probe_results(&run.log).is_empty());
    assert!(!run.log.events.contains(&RouteEvent::RunComplete));
    assert!(run.sim.capture.lock().syns.is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn capture_failure_aborts_the_run() {
    let mut topology = Topology::new(routers(), destination());
    topology.capture_failure = Some(2);
    let cfg = TraceConfig {
        timeout: Duration::from_secs(5),
        ..config(10)
    };

    let started = std::time::Instant::now();
    let run = trace_plain(topology, cfg).await;
    assert!(matches!(run.result, Err(TraceError::LinkClosed)), "got {:?}", run.result);
    assert!(started.elapsed() < Duration::from_secs(4));

    assert_eq!(probe_results(&run.log), [(1, v4(gateway_ip()), false)]);
    assert!(!run.log.completed);
    assert!(run.log.error.is_some());
    assert!(!run.sim.link.is_open());
}

#[tokio::test(flavor = "multi_thread")]
async fn lookups_land_before_their_hop_completes() {
    let cfg = TraceConfig {
        resolve_names: true,
        resolve_locations: true,
        ..config(10)
    };
    let run = trace(
        Topology::new(routers(), destination()),
        cfg,
        Arc::new(NumberedNames),
        Arc::new(OnlyDestination),
    )
    .await;
    assert!(run.result.is_ok());

    let hops = routers().into_iter().chain([destination()]);
    for (position, addr) in (1..=4u8).zip(hops) {
        let ip = IpAddr::V4(addr);
        let name = index_of(&run.log, |e| {
            matches!(e, RouteEvent::AddressInfo(AddressInfo::NameInfo { ip: i, name })
                if *i == ip && *name == format!("host-{}.example", addr.octets()[3]))
        });
        let complete = index_of(&run.log, |e| *e == RouteEvent::HopComplete { position });
        assert!(name < complete, "position {position}");
    }

    let geo: Vec<IpAddr> = run
        .log
        .events
        .iter()
        .filter_map(|e| match e {
            RouteEvent::AddressInfo(info @ AddressInfo::GeoInfo { .. }) => Some(info.ip()),
            _ => None,
        })
        .collect();
    assert_eq!(geo, [IpAddr::V4(destination())]);
}

#[tokio::test(flavor = "multi_thread")]
async fn disabled_lookups_publish_no_address_info() {
    let run = trace(
        Topology::new(routers(), destination()),
        config(10),
        Arc::new(NumberedNames),
        Arc::new(OnlyDestination),
    )
    .await;
    assert!(run.result.is_ok());

    assert!(!run.log.events.iter().any(|e| matches!(e, RouteEvent::AddressInfo(_))));
    let completes = run
        .log
        .events
        .iter()
        .filter(|e| matches!(e, RouteEvent::HopComplete { .. }))
        .count();
    assert_eq!(completes, 4);
}

#[tokio::test(flavor = "multi_thread")]
async fn aggregator_table_fills_up_to_the_destination() {
    let sim = SimNetwork::start(Topology::new(routers(), destination()));
    let route = TcpRoute::new(
        sim.link.clone(),
        config(10),
        Arc::new(NoLookup),
        Arc::new(NoLookup),
        Handle::current(),
    );
    let progress = Progress::default();
    let mut subscription = route.subscribe(HopAggregator::new(progress.clone()));

    let result = tokio::task::spawn_blocking(move || route.execute()).await.unwrap();
    assert!(result.is_ok());
    tokio::task::spawn_blocking(move || subscription.wait()).await.unwrap();

    let history = progress.0.lock();
    assert_eq!(history.last(), Some(&4));
    assert!(history.windows(2).all(|w| w[0] <= w[1]));
}
