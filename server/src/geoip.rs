//! Pluggable GeoIP enrichment hook.
//!
//! The core calls `lookup(ip)` when annotating SSH-login notices and when
//! the dashboard renders an audit-report login list; absence of a real
//! provider must not fail either path, so the default implementation
//! always returns `None` and every call site treats that as "no enrichment
//! available" rather than an error.

use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::warn;

#[async_trait]
pub trait GeoIpLookup: Send + Sync {
    async fn lookup(&self, ip: &str) -> Option<String>;
}

pub struct NoopGeoIpLookup;

#[async_trait]
impl GeoIpLookup for NoopGeoIpLookup {
    async fn lookup(&self, _ip: &str) -> Option<String> {
        None
    }
}

/// Queries an operator-configured HTTP lookup service. The wire contract is
/// deliberately generic (`GET {base_url}?ip=<ip>` → `{"location": "..."}`)
/// so any self-hosted or vendor GeoIP gateway can sit behind it without the
/// core depending on a specific provider's API shape.
pub struct HttpGeoIpLookup {
    client: Client,
    base_url: String,
}

#[derive(Deserialize)]
struct LookupResponse {
    location: Option<String>,
}

impl HttpGeoIpLookup {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| anyhow!("failed to build geoip HTTP client: {}", e))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }
}

#[async_trait]
impl GeoIpLookup for HttpGeoIpLookup {
    async fn lookup(&self, ip: &str) -> Option<String> {
        let result = self.client.get(&self.base_url).query(&[("ip", ip)]).send().await;

        let response = match result {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                warn!(ip, status = %r.status(), "geoip lookup returned a non-success status");
                return None;
            }
            Err(e) => {
                warn!(ip, error = %e, "geoip lookup request failed");
                return None;
            }
        };

        match response.json::<LookupResponse>().await {
            Ok(body) => body.location,
            Err(e) => {
                warn!(ip, error = %e, "failed to parse geoip lookup response");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_lookup_never_fails_the_caller() {
        let lookup = NoopGeoIpLookup;
        assert_eq!(lookup.lookup("1.2.3.4").await, None);
    }

    #[tokio::test]
    async fn http_lookup_parses_location() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "location": "Frankfurt, DE"
            })))
            .mount(&server)
            .await;

        let lookup = HttpGeoIpLookup::new(server.uri()).unwrap();
        assert_eq!(lookup.lookup("1.2.3.4").await, Some("Frankfurt, DE".to_string()));
    }

    #[tokio::test]
    async fn http_lookup_failure_yields_none() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .respond_with(wiremock::ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let lookup = HttpGeoIpLookup::new(server.uri()).unwrap();
        assert_eq!(lookup.lookup("1.2.3.4").await, None);
    }
}
