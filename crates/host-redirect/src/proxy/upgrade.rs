//! Protocol upgrades (WebSocket and the like).
//!
//! The upgrade request goes upstream like any other. If the upstream switches
//! protocols, the client gets the 101 and both upgraded connections are
//! spliced together until either side closes. Any other answer is relayed as
//! a normal response.

use axum::body::Body;
use axum::extract::Request;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::Response;
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use reqwest::Url;
use tracing::Instrument;

use super::director::relayed_response_headers;
use super::forward::{relay_response, upstream_error, InFlight};
use crate::stats::RedirectStats;

/// Forward an upgrade request and, on 101, tunnel the two connections.
///
/// `headers` must already carry `Connection: upgrade` and the `Upgrade` value.
pub async fn tunnel(
    client: &reqwest::Client,
    mut request: Request,
    url: Url,
    headers: HeaderMap,
    request_id: &str,
    stats: &RedirectStats,
) -> Response {
    let span = redirect_tracing::upstream_forward_span!(request_id, url);
    let downstream = hyper::upgrade::on(&mut request);
    let method = request.method().clone();
    let mut in_flight = InFlight::new(stats);

    async {
        let upstream_result = client.request(method, url).headers(headers).send().await;
        in_flight.answered();

        let upstream_resp = match upstream_result {
            Ok(resp) => resp,
            Err(e) => return upstream_error(&e, stats),
        };
        if upstream_resp.status() != StatusCode::SWITCHING_PROTOCOLS {
            tracing::info!(
                status = upstream_resp.status().as_u16(),
                "Upstream declined upgrade"
            );
            return relay_response(upstream_resp, false, stats);
        }

        let mut response_headers = relayed_response_headers(upstream_resp.headers());
        if let Some(protocol) = upstream_resp.headers().get(header::UPGRADE) {
            response_headers.insert(header::UPGRADE, protocol.clone());
        }
        response_headers.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));

        let upstream = match upstream_resp.upgrade().await {
            Ok(io) => io,
            Err(e) => return upstream_error(&e, stats),
        };
        tracing::info!("Upstream switched protocols");
        tokio::spawn(splice(downstream, upstream).in_current_span());

        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
        *response.headers_mut() = response_headers;
        response
    }
    .instrument(span)
    .await
}

/// Copy bytes both ways until either side closes.
async fn splice(downstream: OnUpgrade, mut upstream: reqwest::Upgraded) {
    let mut downstream = match downstream.await {
        Ok(upgraded) => TokioIo::new(upgraded),
        Err(e) => {
            tracing::warn!(error = %e, "Client connection was not upgraded");
            return;
        }
    };

    match tokio::io::copy_bidirectional(&mut downstream, &mut upstream).await {
        Ok((to_upstream, to_client)) => {
            tracing::debug!(to_upstream, to_client, "Upgraded connection closed");
        }
        Err(e) => tracing::debug!(error = %e, "Upgraded connection ended"),
    }
}
