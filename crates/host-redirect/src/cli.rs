//! Command-line flags. They take precedence over the TOML file and env vars.

use clap::Parser;

use crate::config::ProxyConfig;
use crate::policy::UnmatchedHostPolicy;

const DEFAULT_CONFIG_PATH: &str = "host-redirect.toml";

#[derive(Parser, Debug, PartialEq, Eq)]
#[command(name = "host-redirect")]
#[command(version, about = "Hostname redirector: DNS override plus host-keyed reverse proxy", long_about = None)]
pub struct CliArgs {
    /// TOML configuration file
    #[arg(long = "config", env = "REDIRECT_CONFIG", default_value = DEFAULT_CONFIG_PATH)]
    pub config_path: String,

    /// JSON route file
    #[arg(long = "routes")]
    pub routes_path: Option<String>,

    /// HTTP listen port; the configured bind host is kept
    #[arg(long)]
    pub port: Option<u16>,

    /// Skip upstream certificate verification (`--skip-ssl-verify=false` to verify)
    #[arg(
        long = "skip-ssl-verify",
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true"
    )]
    pub skip_tls_verify: Option<bool>,

    /// Outbound proxy URL for upstream requests
    #[arg(long = "proxy")]
    pub outbound_proxy: Option<String>,

    /// Run the DNS front
    #[arg(long)]
    pub dns: bool,

    /// Interface whose IPv4 address DNS overrides answer with
    #[arg(short = 'I', long)]
    pub interface: Option<String>,

    /// Log every DNS question
    #[arg(long)]
    pub verbose: bool,

    /// Allow HTTP/2 to upstreams
    #[arg(long)]
    pub http2: bool,

    /// Answer 502 for hosts with no route instead of passing them through
    #[arg(long)]
    pub reject_unmatched: bool,
}

impl CliArgs {
    /// Overlay the flags that were given onto the loaded configuration.
    pub fn apply(&self, config: &mut ProxyConfig) {
        if let Some(path) = &self.routes_path {
            config.routing.routes_path = Some(path.clone());
        }
        if let Some(port) = self.port {
            config.server.listen_address = with_port(&config.server.listen_address, port);
        }
        if let Some(skip) = self.skip_tls_verify {
            config.transport.skip_tls_verify = skip;
        }
        if let Some(proxy) = &self.outbound_proxy {
            config.transport.outbound_proxy = Some(proxy.clone());
        }
        if self.http2 {
            config.transport.http2 = true;
        }
        if self.dns {
            config.dns.enabled = true;
        }
        if let Some(iface) = &self.interface {
            config.dns.interface = Some(iface.clone());
        }
        if self.verbose {
            config.dns.verbose = true;
        }
        if self.reject_unmatched {
            config.routing.unmatched = UnmatchedHostPolicy::Reject;
        }
    }
}

/// Replace the port of a `host:port` listen address, keeping the host.
fn with_port(listen_address: &str, port: u16) -> String {
    match listen_address.rsplit_once(':') {
        Some((host, _)) => format!("{host}:{port}"),
        None => format!("{listen_address}:{port}"),
    }
}
