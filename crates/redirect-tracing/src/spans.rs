//! Span builder helpers for host-redirect instrumentation.

/// Span for one inbound HTTP request handled by the reverse proxy.
///
/// `route` is recorded once the routing decision is known
/// (`rewrite`, `pass-through` or `reject`). `status` and `latency_ms` are
/// recorded when the upstream answers.
#[macro_export]
macro_rules! http_request_span {
    ($request_id:expr, $method:expr, $host:expr) => {
        tracing::info_span!(
            "http_request",
            request_id = %$request_id,
            method = %$method,
            host = %$host,
            route = tracing::field::Empty,
            status = tracing::field::Empty,
            latency_ms = tracing::field::Empty,
        )
    };
}

/// Span for the outbound leg of a proxied request.
#[macro_export]
macro_rules! upstream_forward_span {
    ($request_id:expr, $url:expr) => {
        tracing::info_span!(
            "upstream_forward",
            request_id = %$request_id,
            url = %$url,
            bytes_relayed = tracing::field::Empty,
        )
    };
}

/// Span for one DNS query datagram.
///
/// `decision` is recorded as `override` or `forward`.
#[macro_export]
macro_rules! dns_query_span {
    ($id:expr, $name:expr, $qtype:expr) => {
        tracing::debug_span!(
            "dns_query",
            id = $id,
            name = %$name,
            qtype = %$qtype,
            decision = tracing::field::Empty,
            answers = tracing::field::Empty,
        )
    };
}
