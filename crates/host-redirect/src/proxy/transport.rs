//! Upstream HTTP client construction.

use std::time::Duration;

use crate::config::TransportConfig;
use crate::error::{RedirectError, Result};

/// Build the client used for every forwarded request.
///
/// Redirects are relayed to the client rather than followed. Without `http2`
/// the client offers only `http/1.1` in ALPN. An outbound proxy that does not
/// parse is a startup error.
pub fn build_client(config: &TransportConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .redirect(reqwest::redirect::Policy::none())
        .danger_accept_invalid_certs(config.skip_tls_verify);

    if !config.http2 {
        builder = builder.http1_only();
    }

    if let Some(proxy_url) = &config.outbound_proxy {
        let proxy = reqwest::Proxy::all(proxy_url.as_str()).map_err(|source| {
            RedirectError::InvalidProxyUrl {
                url: proxy_url.clone(),
                source,
            }
        })?;
        builder = builder.proxy(proxy);
        tracing::info!(proxy = %proxy_url, "Using outbound proxy");
    }

    if let Some(secs) = config.timeout_secs {
        builder = builder.timeout(Duration::from_secs(secs));
    }

    if config.skip_tls_verify {
        tracing::warn!("Upstream TLS certificate verification is disabled");
    }
    tracing::info!(http2 = config.http2, "Upstream transport configured");

    Ok(builder.build()?)
}
