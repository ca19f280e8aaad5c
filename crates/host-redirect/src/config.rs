//! Configuration types and loading logic.

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use redirect_tracing::TracingConfig;
use serde::Deserialize;

use crate::policy::UnmatchedHostPolicy;

/// Top-level process configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProxyConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default)]
    pub tracing: TracingConfig,
}

/// HTTP listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,

    /// Inbound request bodies larger than this are answered with 413. Bodies
    /// are streamed and unlimited unless set.
    #[serde(default)]
    pub max_request_body_bytes: Option<u64>,
}

/// Upstream client settings, fixed at startup and handed to the HTTP front.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TransportConfig {
    /// Accept any upstream certificate. On unless turned off.
    #[serde(default = "default_true")]
    pub skip_tls_verify: bool,

    /// Offer `h2` in ALPN. Off means HTTP/1.1 only, which avoids spurious
    /// cancellation errors from intermediaries that mishandle h2 reuse.
    #[serde(default)]
    pub http2: bool,

    /// Send every upstream connection through this proxy.
    #[serde(default)]
    pub outbound_proxy: Option<String>,

    /// Whole-request upstream timeout. Unset means none.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

/// Route source and no-match behaviour.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutingConfig {
    /// JSON route file. Discovered when unset.
    #[serde(default)]
    pub routes_path: Option<String>,

    #[serde(default)]
    pub unmatched: UnmatchedHostPolicy,
}

/// DNS front configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DnsConfig {
    #[serde(default)]
    pub enabled: bool,

    /// Interface whose IPv4 address is handed out in override answers.
    #[serde(default)]
    pub interface: Option<String>,

    #[serde(default = "default_dns_listen_address")]
    pub listen_address: String,

    #[serde(default = "default_ttl_secs")]
    pub ttl_secs: u32,

    /// Log misses at info instead of debug.
    #[serde(default)]
    pub verbose: bool,
}

fn default_listen_address() -> String {
    "0.0.0.0:80".to_string()
}

fn default_true() -> bool {
    true
}

fn default_dns_listen_address() -> String {
    "0.0.0.0:53".to_string()
}

fn default_ttl_secs() -> u32 {
    3600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            max_request_body_bytes: None,
        }
    }
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            skip_tls_verify: true,
            http2: false,
            outbound_proxy: None,
            timeout_secs: None,
        }
    }
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interface: None,
            listen_address: default_dns_listen_address(),
            ttl_secs: default_ttl_secs(),
            verbose: false,
        }
    }
}

impl ProxyConfig {
    /// Load configuration from a TOML file and environment variables.
    ///
    /// Priority (highest to lowest):
    /// 1. Environment variables (REDIRECT_ prefix, __ for nesting)
    /// 2. TOML config file (may be absent)
    /// 3. Defaults
    pub fn load(config_path: &str) -> anyhow::Result<Self> {
        let config: ProxyConfig = Figment::new()
            .merge(Toml::file(config_path))
            .merge(Env::prefixed("REDIRECT_").split("__"))
            .extract()?;

        Ok(config)
    }
}
