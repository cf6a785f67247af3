//! Network backed implementations of the hop lookups.

pub mod dns;
pub mod geo;
