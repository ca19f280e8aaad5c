//! host-redirect: hostname redirector. One routing table feeds a DNS front
//! that points routed names at this machine and an HTTP front that forwards
//! requests for those names to their configured targets.

mod cli;
mod config;
mod dns;
mod error;
mod interface;
mod policy;
mod proxy;
mod routes;
mod server;
mod stats;
mod table;

use std::net::IpAddr;
use std::sync::Arc;

use clap::Parser;
use cli::CliArgs;
use config::ProxyConfig;
use dns::{DnsFront, SystemResolver};
use error::RedirectError;
use proxy::local::LocalEndpoints;
use server::AppState;
use stats::RedirectStats;
use table::RoutingTable;
use tokio::net::{TcpListener, UdpSocket};

fn main() -> anyhow::Result<()> {
    let cli = CliArgs::parse();

    // Load configuration, then let flags override it
    let mut config = ProxyConfig::load(&cli.config_path)?;
    cli.apply(&mut config);

    // The gRPC exporter needs a reactor, so the runtime comes before tracing
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        // OTLP export is optional; fmt-only otherwise
        let tracing_guard = redirect_tracing::init_tracing(&config.tracing);

        tracing::info!(
            config_path = %cli.config_path,
            listen_address = %config.server.listen_address,
            dns_enabled = config.dns.enabled,
            unmatched = %config.routing.unmatched,
            otlp_export = tracing_guard.exporting(),
            "Starting host-redirect"
        );

        run(config).await
    })
}

async fn run(config: ProxyConfig) -> anyhow::Result<()> {
    let stats = RedirectStats::new();

    // Routes are loaded once, before either front starts answering
    let table = Arc::new(RoutingTable::new());
    let routes_path = routes::discover(config.routing.routes_path.as_deref(), &std::env::current_dir()?)?;
    routes::ingest(&routes_path, &table)?;
    if table.is_empty() {
        tracing::warn!(
            path = %routes_path.display(),
            "No routes loaded; every host falls to the unmatched policy"
        );
    }

    let mut dns_ip = None;
    let dns_task = if config.dns.enabled {
        let iface = config
            .dns
            .interface
            .as_deref()
            .ok_or(RedirectError::MissingInterface)?;
        let local_ip = interface::ipv4_of(iface)?;
        dns_ip = Some(IpAddr::V4(local_ip));

        let socket = UdpSocket::bind(&config.dns.listen_address).await?;
        tracing::info!(
            address = %config.dns.listen_address,
            interface = %iface,
            local_ip = %local_ip,
            "DNS front listening"
        );

        let front = DnsFront::new(
            table.clone(),
            local_ip,
            Arc::new(SystemResolver),
            config.dns.ttl_secs,
            stats.clone(),
        )
        .with_verbose(config.dns.verbose);
        Some(tokio::spawn(Arc::new(front).serve(Arc::new(socket))))
    } else {
        None
    };

    let client = proxy::transport::build_client(&config.transport)?;
    let listener = TcpListener::bind(&config.server.listen_address).await?;
    // Requests for any of these would loop straight back in
    let local = LocalEndpoints::discover(listener.local_addr()?, dns_ip);

    let state = AppState {
        table,
        client,
        policy: config.routing.unmatched,
        max_request_body_bytes: config.server.max_request_body_bytes,
        local: Arc::new(local),
        stats: stats.clone(),
    };

    let result = server::run(listener, state).await;

    if let Some(task) = dns_task {
        task.abort();
    }
    stats.log_summary();
    result
}
