use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};

use async_trait::async_trait;
use hickory_resolver::TokioAsyncResolver;
use hickory_resolver::config::{ResolverConfig, ResolverOpts};
use parking_lot::RwLock;
use tcproute_common::error::LookupError;
use tcproute_core::lookup::NameResolver;
use tracing::debug;

/// Reverse DNS with a per-address cache.
///
/// Negative answers are cached too. Forward lookups seed the cache, so the
/// destination is shown under the name it was given on the command line.
pub struct CachingNameResolver {
    resolver: TokioAsyncResolver,
    cache: RwLock<HashMap<IpAddr, Option<String>>>,
}

impl CachingNameResolver {
    pub fn new() -> Self {
        Self {
            resolver: TokioAsyncResolver::tokio(ResolverConfig::default(), ResolverOpts::default()),
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// Resolves `host` to its first IPv4 address. IPv4 literals are returned as is.
    pub async fn resolve_host(&self, host: &str) -> Result<Ipv4Addr, LookupError> {
        if let Ok(addr) = host.parse::<Ipv4Addr>() {
            return Ok(addr);
        }

        let lookup = self
            .resolver
            .lookup_ip(host)
            .await
            .map_err(|e| LookupError::Resolver(e.to_string()))?;

        {
            let mut cache = self.cache.write();
            for ip in lookup.iter() {
                cache.entry(ip).or_insert_with(|| Some(host.to_string()));
            }
        }

        lookup
            .iter()
            .find_map(|ip| match ip {
                IpAddr::V4(v4) => Some(v4),
                IpAddr::V6(_) => None,
            })
            .ok_or_else(|| LookupError::Resolver(format!("{host} has no IPv4 address")))
    }

    pub fn remember(&self, ip: IpAddr, name: Option<String>) {
        self.cache.write().entry(ip).or_insert(name);
    }

    fn cached(&self, ip: IpAddr) -> Option<Option<String>> {
        self.cache.read().get(&ip).cloned()
    }
}

impl Default for CachingNameResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NameResolver for CachingNameResolver {
    async fn resolve_name(&self, ip: IpAddr) -> Result<String, LookupError> {
        if let Some(entry) = self.cached(ip) {
            return entry.ok_or(LookupError::NotFound(ip));
        }

        let name = match self.resolver.reverse_lookup(ip).await {
            Ok(lookup) => lookup
                .iter()
                .next()
                .map(|name| name.to_string().trim_end_matches('.').to_string()),
            Err(e) => {
                debug!("Reverse lookup of {ip} failed: {e}");
                None
            }
        };

        self.remember(ip, name);
        self.cached(ip).flatten().ok_or(LookupError::NotFound(ip))
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
