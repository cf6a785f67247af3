//! # Trace Engine
//!
//! Everything between a [`TraceConfig`](tcproute_common::config::TraceConfig)
//! and a stream of [`RouteEvent`](tcproute_common::event::RouteEvent)s.
//!
//! ## Contents
//! * `link`: raw Ethernet device access and the capture thread.
//! * `correlation`: matches captured frames to outstanding requests.
//! * `address`: ARP cache for next-hop link addresses.
//! * `route`: the TTL-escalating SYN probe engine.
//! * `bus`: ordered per-subscriber event delivery.
//! * `aggregator`: folds events into a per-hop table for rendering.
//! * `lookup`: name and location resolver seams.

pub mod address;
pub mod aggregator;
pub mod bus;
pub mod correlation;
pub mod link;
pub mod lookup;
pub mod route;
