use std::net::IpAddr;
use std::sync::Arc;

use anyhow::Context;
use colored::*;
use is_root::is_root;
use tcproute_common::config::TraceConfig;
use tcproute_core::aggregator::HopAggregator;
use tcproute_core::link::LinkInterface;
use tcproute_core::lookup::{LocationResolver, NameResolver, NoLookup};
use tcproute_core::route::TcpRoute;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use super::RouteArgs;
use crate::lookup::dns::CachingNameResolver;
use crate::lookup::geo::HttpLocationResolver;
use crate::terminal::render::ConsoleRenderer;
use crate::terminal::{colors, print};

pub async fn route(args: RouteArgs) -> anyhow::Result<()> {
    if !is_root() {
        warn!("Not running as root, opening the capture device will likely fail");
    }

    let dns = Arc::new(CachingNameResolver::new());
    let destination = dns
        .resolve_host(&args.destination.host)
        .await
        .with_context(|| format!("resolving {}", args.destination.host))?;
    let cfg = args.to_config(destination);
    cfg.validate()?;

    print::print(&format!(
        "Tracing route to {} [{}] over a maximum of {} hops",
        args.destination.host.color(colors::PRIMARY),
        destination.to_string().color(colors::IPV4_ADDR),
        cfg.max_hops
    ));
    print::print("");

    let link = open_link(cfg.clone()).await?;
    let gateway = link.gateway();
    let gateway_mac = tokio::task::spawn_blocking({
        let link = link.clone();
        move || link.resolve_link_address(gateway)
    })
    .await?
    .with_context(|| format!("resolving gateway {gateway}"))?;
    debug!("Gateway {gateway} is at {gateway_mac}");

    let names: Arc<dyn NameResolver> = if cfg.resolve_names {
        dns as Arc<dyn NameResolver>
    } else {
        Arc::new(NoLookup)
    };
    let locations: Arc<dyn LocationResolver> = if cfg.resolve_locations {
        Arc::new(HttpLocationResolver::new()?)
    } else {
        Arc::new(NoLookup)
    };

    let route = TcpRoute::new(link.clone(), cfg, names, locations, Handle::current());
    let mut subscription = route.subscribe(HopAggregator::new(ConsoleRenderer::stdout()));

    let result = tokio::task::spawn_blocking(move || route.execute()).await?;
    tokio::task::spawn_blocking(move || subscription.wait()).await?;
    link.close();

    result.with_context(|| format!("tracing {}", args.destination))?;
    print::print("");
    print::print("Trace complete.");
    Ok(())
}

async fn open_link(cfg: TraceConfig) -> anyhow::Result<Arc<LinkInterface>> {
    let link = tokio::task::spawn_blocking(move || LinkInterface::open(&cfg))
        .await?
        .context("opening capture device")?;
    debug!(
        "Sending from {} ({}) via {}",
        link.name(),
        IpAddr::V4(link.ip()),
        link.gateway()
    );
    Ok(Arc::new(link))
}
