//! HTTP-based public IP resolver.
//!
//! Fetches the host's current public IPv4/IPv6 address from an external
//! echo service. A/AAAA content needs the address as seen from outside
//! the host's own NAT, not a local interface address, so this resolver
//! always goes out over HTTP rather than reading network interfaces.

use async_trait::async_trait;
use reconciler_core::error::{Error, ErrorKind};
use reconciler_core::scheduler::PublicIpResolver;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_V4_URL: &str = "https://api.ipify.org";
const DEFAULT_V6_URL: &str = "https://api6.ipify.org";

/// Resolves public IPv4 and IPv6 separately, against two (independently
/// configurable) echo endpoints, since a dual-stack host may reach one
/// family and not the other.
pub struct HttpIpResolver {
    v4_url: String,
    v6_url: String,
    client: reqwest::Client,
}

impl HttpIpResolver {
    pub fn new() -> Self {
        Self::with_urls(DEFAULT_V4_URL, DEFAULT_V6_URL)
    }

    pub fn with_urls(v4_url: impl Into<String>, v6_url: impl Into<String>) -> Self {
        Self {
            v4_url: v4_url.into(),
            v6_url: v6_url.into(),
            client: reqwest::Client::builder()
                .timeout(DEFAULT_HTTP_TIMEOUT)
                .build()
                .unwrap_or_default(),
        }
    }

    async fn fetch(&self, url: &str) -> Result<IpAddr, Error> {
        let response = self.client.get(url).send().await.map_err(|e| {
            Error::provider("http-ip", ErrorKind::Transient, format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let kind = if status.as_u16() == 429 {
                ErrorKind::RateLimited
            } else if status.is_server_error() {
                ErrorKind::Transient
            } else {
                ErrorKind::Validation
            };
            return Err(Error::provider("http-ip", kind, format!("http status {status}")));
        }

        let body = response.text().await.map_err(|e| {
            Error::provider("http-ip", ErrorKind::Transient, format!("failed to read body: {e}"))
        })?;

        body.trim()
            .parse()
            .map_err(|_| Error::provider("http-ip", ErrorKind::Validation, format!("not an IP address: {body}")))
    }
}

impl Default for HttpIpResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PublicIpResolver for HttpIpResolver {
    async fn resolve_v4(&self) -> Result<Option<Ipv4Addr>, Error> {
        match self.fetch(&self.v4_url).await? {
            IpAddr::V4(v4) => Ok(Some(v4)),
            IpAddr::V6(_) => Err(Error::provider(
                "http-ip",
                ErrorKind::Validation,
                "v4 endpoint returned an IPv6 address",
            )),
        }
    }

    async fn resolve_v6(&self) -> Result<Option<Ipv6Addr>, Error> {
        match self.fetch(&self.v6_url).await? {
            IpAddr::V6(v6) => Ok(Some(v6)),
            IpAddr::V4(_) => Err(Error::provider(
                "http-ip",
                ErrorKind::Validation,
                "v6 endpoint returned an IPv4 address",
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_urls_are_distinct_per_family() {
        let resolver = HttpIpResolver::new();
        assert_ne!(resolver.v4_url, resolver.v6_url);
    }

    #[test]
    fn with_urls_overrides_defaults() {
        let resolver = HttpIpResolver::with_urls("https://v4.example.com", "https://v6.example.com");
        assert_eq!(resolver.v4_url, "https://v4.example.com");
        assert_eq!(resolver.v6_url, "https://v6.example.com");
    }
}
