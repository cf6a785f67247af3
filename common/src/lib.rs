//! Shared models for the TCP route tracer: runtime configuration, the error
//! taxonomy, the hop event vocabulary and network interface helpers.

pub mod config;
pub mod error;
pub mod event;
pub mod location;
pub mod network;
