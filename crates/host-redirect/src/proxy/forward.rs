//! Upstream forwarding.
//!
//! The response body is streamed back chunk by chunk as it arrives, so
//! long-polling and server-sent events keep working. `RelayBody` counts the
//! bytes it passes along and notices when the client goes away before the
//! body is finished. Request bodies travel the other way the same, unbuffered.

use std::pin::Pin;
use std::sync::atomic::Ordering;
use std::task::{Context, Poll};
use std::time::Instant;

use axum::body::Body;
use axum::http::{HeaderMap, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures_core::Stream;
use reqwest::Url;
use tracing::Instrument;

use super::director::relayed_response_headers;
use super::upload::UploadBody;
use crate::stats::{Counter, RedirectStats};

/// Passes upstream bytes through unchanged. Records `bytes_relayed` on the
/// forward span once the upstream body ends; if dropped earlier the client
/// disconnected mid-body.
struct RelayBody {
    inner: Pin<Box<dyn Stream<Item = Result<Bytes, reqwest::Error>> + Send>>,
    span: tracing::Span,
    stats: RedirectStats,
    bytes: u64,
    finished: bool,
}

impl Stream for RelayBody {
    type Item = Result<Bytes, reqwest::Error>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        match self.inner.as_mut().poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                self.bytes += chunk.len() as u64;
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                self.finished = true;
                self.span.in_scope(|| {
                    tracing::warn!(error = %e, bytes = self.bytes, "Upstream body failed mid-stream");
                });
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                self.finished = true;
                self.span.record("bytes_relayed", self.bytes);
                self.span.in_scope(|| {
                    tracing::debug!(bytes = self.bytes, "Upstream body relayed");
                });
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for RelayBody {
    fn drop(&mut self) {
        if !self.finished {
            self.span.record("bytes_relayed", self.bytes);
            self.span.in_scope(|| {
                tracing::debug!(bytes = self.bytes, "Client disconnected before body finished");
            });
            self.stats.inc(Counter::HttpCancelled);
        }
    }
}

/// Flags a forward abandoned before the upstream answered (the handler
/// future was dropped because the client went away).
pub(crate) struct InFlight<'a> {
    stats: &'a RedirectStats,
    answered: bool,
}

impl<'a> InFlight<'a> {
    pub(crate) fn new(stats: &'a RedirectStats) -> Self {
        Self {
            stats,
            answered: false,
        }
    }

    pub(crate) fn answered(&mut self) {
        self.answered = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.answered {
            tracing::debug!("Client disconnected before upstream answered");
            self.stats.inc(Counter::HttpCancelled);
        }
    }
}

/// Send one request upstream and stream the answer back.
///
/// `headers` must already be shaped for the outbound leg. `body` is `None`
/// when the client sent none. Connection failures answer 502, a configured
/// timeout elapsing answers 504, and a body overrunning its limit answers 413.
pub async fn forward(
    client: &reqwest::Client,
    method: Method,
    url: Url,
    headers: HeaderMap,
    body: Option<UploadBody>,
    request_id: &str,
    stats: &RedirectStats,
) -> Response {
    let span = redirect_tracing::upstream_forward_span!(request_id, url);
    let start = Instant::now();
    let mut in_flight = InFlight::new(stats);

    async {
        let head = method == Method::HEAD;
        let over_limit = body.as_ref().map(UploadBody::over_limit);

        let mut req_builder = client.request(method, url).headers(headers);
        if let Some(body) = body {
            req_builder = req_builder.body(reqwest::Body::wrap_stream(body));
        }

        let upstream_result = req_builder.send().await;
        in_flight.answered();

        if over_limit.is_some_and(|flag| flag.load(Ordering::Relaxed)) {
            tracing::warn!("Request body exceeds limit");
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
        }

        match upstream_result {
            Ok(resp) => {
                tracing::info!(
                    status = resp.status().as_u16(),
                    latency_ms = start.elapsed().as_millis() as u64,
                    "Upstream answered"
                );
                relay_response(resp, head, stats)
            }
            Err(e) => upstream_error(&e, stats),
        }
    }
    .instrument(span)
    .await
}

/// Map a failed upstream exchange to 502, or 504 on timeout.
pub fn upstream_error(e: &reqwest::Error, stats: &RedirectStats) -> Response {
    stats.inc(Counter::HttpUpstreamError);
    if e.is_timeout() {
        tracing::error!(error = %e, "Upstream timeout");
        return (StatusCode::GATEWAY_TIMEOUT, "upstream timeout").into_response();
    }
    tracing::error!(error = %e, "Upstream connection error");
    (StatusCode::BAD_GATEWAY, "upstream connection error").into_response()
}

/// Build an axum Response from an upstream response, streaming the body back.
///
/// Responses that carry no body (HEAD, 1xx, 204, 304, zero length) start out
/// finished, so hyper never polling them is not a disconnect.
pub fn relay_response(upstream_resp: reqwest::Response, head: bool, stats: &RedirectStats) -> Response {
    let status = upstream_resp.status();
    let bodiless = head
        || status.is_informational()
        || status == StatusCode::NO_CONTENT
        || status == StatusCode::NOT_MODIFIED
        || upstream_resp.content_length() == Some(0);

    let headers = relayed_response_headers(upstream_resp.headers());
    let body = RelayBody {
        inner: Box::pin(upstream_resp.bytes_stream()),
        span: tracing::Span::current(),
        stats: stats.clone(),
        bytes: 0,
        finished: bodiless,
    };

    let mut response = Response::new(Body::from_stream(body));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
