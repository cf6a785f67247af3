use std::net::IpAddr;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, HeaderValue};
use serde::Deserialize;
use tcproute_common::error::LookupError;
use tcproute_common::location::LocationInfo;
use tcproute_core::lookup::LocationResolver;

pub const DEFAULT_ENDPOINT: &str = "https://iplocation.com/";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct IpLocationResponse {
    city: Option<String>,
    company: Option<String>,
    country_name: Option<String>,
    region_name: Option<String>,
    lat: Option<f64>,
    lng: Option<f64>,
}

impl From<IpLocationResponse> for LocationInfo {
    fn from(response: IpLocationResponse) -> Self {
        Self {
            country: response.country_name,
            region: response.region_name,
            city: response.city,
            organisation: response.company,
            latitude: response.lat,
            longitude: response.lng,
        }
    }
}

/// Looks up public addresses with a form POST of `ip=<addr>` to an
/// iplocation.com style JSON endpoint.
pub struct HttpLocationResolver {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpLocationResolver {
    pub fn new() -> Result<Self, LookupError> {
        Self::with_endpoint(DEFAULT_ENDPOINT)
    }

    pub fn with_endpoint(endpoint: &str) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(format!("tcproute/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| LookupError::Http(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl LocationResolver for HttpLocationResolver {
    async fn resolve_location(&self, ip: IpAddr) -> Result<Option<LocationInfo>, LookupError> {
        if !is_public(ip) {
            return Ok(None);
        }

        let response = self
            .client
            .post(&self.endpoint)
            .header(ACCEPT, HeaderValue::from_static("application/json"))
            .form(&[("ip", ip.to_string())])
            .send()
            .await
            .map_err(|e| LookupError::Http(e.to_string()))?;

        if response.status() != StatusCode::OK {
            return Ok(None);
        }

        let body: IpLocationResponse = response
            .json()
            .await
            .map_err(|e| LookupError::Decode(e.to_string()))?;
        Ok(Some(body.into()))
    }
}

/// Whether `ip` could have a public location.
pub fn is_public(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => {
            !(v4.is_private()
                || v4.is_loopback()
                || v4.is_link_local()
                || v4.is_unspecified()
                || v4.is_broadcast()
                || v4.is_documentation())
        }
        IpAddr::V6(v6) => {
            let first = v6.segments()[0];
            !(v6.is_loopback()
                || v6.is_unspecified()
                || first & 0xfe00 == 0xfc00
                || first & 0xffc0 == 0xfe80)
        }
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
