//! The addresses this proxy listens on, so a pass-through never targets itself.

use std::net::{IpAddr, SocketAddr};

use reqwest::Url;

use crate::interface;

/// Listen port plus every IP the listener accepts connections on.
#[derive(Debug, Clone)]
pub struct LocalEndpoints {
    port: u16,
    ips: Vec<IpAddr>,
    wildcard: bool,
}

impl LocalEndpoints {
    pub fn new(listen: SocketAddr, extra: impl IntoIterator<Item = IpAddr>) -> Self {
        let mut ips: Vec<IpAddr> = std::iter::once(listen.ip()).chain(extra).collect();
        ips.sort();
        ips.dedup();
        Self {
            port: listen.port(),
            ips,
            wildcard: listen.ip().is_unspecified(),
        }
    }

    /// Endpoints for a bound listener. A wildcard bind adds the address of
    /// every interface; failing to list them leaves loopback covered only.
    pub fn discover(listen: SocketAddr, extra: impl IntoIterator<Item = IpAddr>) -> Self {
        let mut found: Vec<IpAddr> = extra.into_iter().collect();
        if listen.ip().is_unspecified() {
            match interface::all_ips() {
                Ok(ips) => found.extend(ips),
                Err(e) => tracing::warn!(error = %e, "Could not list interface addresses"),
            }
        }
        Self::new(listen, found)
    }

    pub fn contains(&self, addr: SocketAddr) -> bool {
        if addr.port() != self.port {
            return false;
        }
        let ip = addr.ip();
        ip.is_unspecified() || self.ips.contains(&ip) || (self.wildcard && ip.is_loopback())
    }

    /// Whether connecting to `url` would reach this proxy. Names are resolved
    /// the way the upstream client would; a failed lookup counts as elsewhere.
    pub async fn serves(&self, url: &Url) -> bool {
        let (Some(host), Some(port)) = (url.host_str(), url.port_or_known_default()) else {
            return false;
        };
        if port != self.port {
            return false;
        }

        let host = host.trim_start_matches('[').trim_end_matches(']');
        match tokio::net::lookup_host((host, port)).await {
            Ok(mut addrs) => addrs.any(|addr| self.contains(addr)),
            Err(e) => {
                tracing::debug!(host, error = %e, "Pass-through host did not resolve");
                false
            }
        }
    }
}
