use std::net::IpAddr;

use async_trait::async_trait;
use tcproute_common::error::LookupError;
use tcproute_common::location::LocationInfo;

/// Reverse name resolution for hop addresses.
#[async_trait]
pub trait NameResolver: Send + Sync {
    async fn resolve_name(&self, ip: IpAddr) -> Result<String, LookupError>;
}

/// Geographic lookup for hop addresses. `Ok(None)` means the address has no
/// public location, e.g. it is private.
#[async_trait]
pub trait LocationResolver: Send + Sync {
    async fn resolve_location(&self, ip: IpAddr) -> Result<Option<LocationInfo>, LookupError>;
}

/// Resolver that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

#[async_trait]
impl NameResolver for NoLookup {
    async fn resolve_name(&self, ip: IpAddr) -> Result<String, LookupError> {
        Err(LookupError::NotFound(ip))
    }
}

#[async_trait]
impl LocationResolver for NoLookup {
    async fn resolve_location(&self, _ip: IpAddr) -> Result<Option<LocationInfo>, LookupError> {
        Ok(None)
    }
}
