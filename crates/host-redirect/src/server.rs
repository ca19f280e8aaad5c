//! Axum HTTP server: host-keyed reverse proxy, listener, graceful shutdown.

use std::sync::Arc;
use std::time::Instant;

use axum::body::HttpBody;
use axum::extract::{Request, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Router;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::policy::UnmatchedHostPolicy;
use crate::proxy::director::{self, Direction};
use crate::proxy::local::LocalEndpoints;
use crate::proxy::upload::UploadBody;
use crate::proxy::{forward, request_id, upgrade};
use crate::stats::{Counter, RedirectStats};
use crate::table::RoutingTable;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub table: Arc<RoutingTable>,
    pub client: reqwest::Client,
    pub policy: UnmatchedHostPolicy,
    pub max_request_body_bytes: Option<u64>,
    pub local: Arc<LocalEndpoints>,
    pub stats: RedirectStats,
}

/// Every path and method goes through the same handler; routing is by host.
pub fn router(state: AppState) -> Router {
    Router::new()
        .fallback(handle_request)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Serve on an already bound listener until Ctrl+C.
pub async fn run(listener: TcpListener, state: AppState) -> anyhow::Result<()> {
    let local_addr = listener.local_addr()?;
    tracing::info!(
        address = %local_addr,
        unmatched = %state.policy,
        "HTTP front listening"
    );

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("HTTP front shut down gracefully");
    Ok(())
}

async fn handle_request(State(state): State<Arc<AppState>>, request: Request) -> Response {
    let request_id = request_id::generate_id();
    let host = director::request_authority(request.uri(), request.headers()).unwrap_or_default();
    let span = redirect_tracing::http_request_span!(request_id, request.method(), host);
    let start = Instant::now();

    let response = proxy_request(&state, request, &request_id)
        .instrument(span.clone())
        .await;

    span.record("status", response.status().as_u16());
    span.record("latency_ms", start.elapsed().as_millis() as u64);
    response
}

async fn proxy_request(state: &AppState, request: Request, request_id: &str) -> Response {
    let direction = director::direct(&state.table, state.policy, request.uri(), request.headers());
    tracing::Span::current().record("route", direction.label());

    let url = match &direction {
        Direction::Reject { reason } => {
            state.stats.inc(Counter::HttpRejected);
            tracing::warn!(reason = *reason, "Request not forwarded");
            return (StatusCode::BAD_GATEWAY, *reason).into_response();
        }
        Direction::Rewrite { url, .. } => {
            state.stats.inc(Counter::HttpRewritten);
            tracing::info!(upstream = %url, "Rewriting request");
            url.clone()
        }
        Direction::PassThrough { url, .. } => {
            if state.local.serves(url).await {
                state.stats.inc(Counter::HttpRejected);
                tracing::warn!(upstream = %url, "Pass-through target is this proxy, not forwarding");
                return (StatusCode::BAD_GATEWAY, "request addressed to this proxy").into_response();
            }
            state.stats.inc(Counter::HttpPassedThrough);
            tracing::debug!(upstream = %url, "Passing request through");
            url.clone()
        }
    };

    let headers = director::outbound_headers(request.headers(), &direction);

    if let Some(protocol) = director::upgrade_protocol(request.headers()) {
        tracing::debug!(protocol = ?protocol, "Upgrade requested");
        return upgrade::tunnel(&state.client, request, url, headers, request_id, &state.stats).await;
    }

    if let Some(limit) = state.max_request_body_bytes {
        if declared_length(request.headers()).is_some_and(|len| len > limit) {
            tracing::warn!(limit, "Request body exceeds limit");
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
        }
    }

    let method = request.method().clone();
    let body = if request.body().is_end_stream() {
        None
    } else {
        Some(UploadBody::new(request.into_body(), state.max_request_body_bytes))
    };

    forward::forward(
        &state.client,
        method,
        url,
        headers,
        body,
        request_id,
        &state.stats,
    )
    .await
}

fn declared_length(headers: &HeaderMap) -> Option<u64> {
    headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

/// Wait for SIGINT (Ctrl+C) for graceful shutdown.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl+C; running until killed");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received, draining connections...");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use std::future::poll_fn;
    use std::time::Duration;

    use axum::body::{Body, Bytes};
    use futures_core::Stream;
    use hyper_util::rt::TokioIo;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;
    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use crate::table::RouteEntry;

    async fn spawn(app: Router) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        addr
    }

    /// Upstream that describes what it received.
    async fn spawn_echo_upstream() -> SocketAddr {
        let app = Router::new().fallback(|request: Request| async move {
            let headers = request.headers();
            let host = headers
                .get(header::HOST)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("none")
                .to_string();
            let xff = headers
                .get("x-forwarded-for")
                .and_then(|v| v.to_str().ok())
                .unwrap_or("none")
                .to_string();
            let path = request
                .uri()
                .path_and_query()
                .map(|pq| pq.as_str().to_string())
                .unwrap_or_default();
            format!("host={host} xff={xff} path={path}")
        });
        spawn(app).await
    }

    async fn spawn_proxy(table: RoutingTable, policy: UnmatchedHostPolicy, max_body: Option<u64>) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let state = AppState {
            table: Arc::new(table),
            client: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .http1_only()
                .build()
                .unwrap(),
            policy,
            max_request_body_bytes: max_body,
            local: Arc::new(LocalEndpoints::new(addr, [])),
            stats: RedirectStats::new(),
        };
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        addr
    }

    /// Read a response head off a raw connection, up to the blank line.
    async fn read_head(stream: &mut TcpStream) -> String {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            stream.read_exact(&mut byte).await.unwrap();
            head.push(byte[0]);
        }
        String::from_utf8(head).unwrap()
    }

    fn table_with(source: &str, target: String) -> RoutingTable {
        let table = RoutingTable::new();
        table.load([RouteEntry::new(source, target)]);
        table
    }

    #[tokio::test]
    async fn test_routed_host_is_rewritten() {
        let upstream = spawn_echo_upstream().await;
        let table = table_with("api.local", format!("http://127.0.0.1:{}", upstream.port()));
        let proxy = spawn_proxy(table, UnmatchedHostPolicy::PassThrough, None).await;

        let body = reqwest::Client::new()
            .get(format!("http://{proxy}/some/path?q=1"))
            .header("host", "API.local:80")
            .header("x-forwarded-for", "10.9.8.7")
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert_eq!(
            body,
            format!("host=127.0.0.1:{} xff=none path=/some/path?q=1", upstream.port())
        );
    }

    #[tokio::test]
    async fn test_unrouted_host_passes_through_unchanged() {
        let upstream = spawn_echo_upstream().await;
        let proxy = spawn_proxy(RoutingTable::new(), UnmatchedHostPolicy::PassThrough, None).await;
        let authority = format!("127.0.0.1:{}", upstream.port());

        let body = reqwest::Client::new()
            .get(format!("http://{proxy}/plain"))
            .header("host", authority.as_str())
            .header("x-forwarded-for", "10.9.8.7")
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();

        assert_eq!(body, format!("host={authority} xff=10.9.8.7 path=/plain"));
    }

    #[tokio::test]
    async fn test_reject_policy_answers_bad_gateway() {
        let proxy = spawn_proxy(RoutingTable::new(), UnmatchedHostPolicy::Reject, None).await;

        let response = reqwest::Client::new()
            .get(format!("http://{proxy}/"))
            .header("host", "nowhere.local")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_unreachable_target_answers_bad_gateway() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let dead = listener.local_addr().unwrap();
        drop(listener);

        let table = table_with("api.local", format!("http://{dead}"));
        let proxy = spawn_proxy(table, UnmatchedHostPolicy::PassThrough, None).await;

        let response = reqwest::Client::new()
            .get(format!("http://{proxy}/"))
            .header("host", "api.local")
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_oversized_body_is_refused() {
        let upstream = spawn_echo_upstream().await;
        let table = table_with("api.local", format!("http://{upstream}"));
        let proxy = spawn_proxy(table, UnmatchedHostPolicy::PassThrough, Some(16)).await;

        let response = reqwest::Client::new()
            .post(format!("http://{proxy}/upload"))
            .header("host", "api.local")
            .body(vec![b'x'; 100])
            .send()
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[tokio::test]
    async fn test_pass_through_to_own_address_is_refused() {
        let proxy = spawn_proxy(RoutingTable::new(), UnmatchedHostPolicy::PassThrough, None).await;
        let client = reqwest::Client::new();

        // Default Host is the proxy's own address.
        let response = timeout(Duration::from_secs(5), client.get(format!("http://{proxy}/")).send())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(response.text().await.unwrap(), "request addressed to this proxy");

        let by_name = format!("localhost:{}", proxy.port());
        let response = timeout(
            Duration::from_secs(5),
            client
                .get(format!("http://{proxy}/"))
                .header("host", by_name.as_str())
                .send(),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_undeclared_body_over_limit_is_refused() {
        let app = Router::new().fallback(|body: Bytes| async move { body.len().to_string() });
        let upstream = spawn(app).await;
        let table = table_with("api.local", format!("http://{upstream}"));
        let proxy = spawn_proxy(table, UnmatchedHostPolicy::PassThrough, Some(16)).await;

        let mut stream = TcpStream::connect(proxy).await.unwrap();
        let mut request = b"POST /upload HTTP/1.1\r\nHost: api.local\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n64\r\n".to_vec();
        request.extend_from_slice(&[b'x'; 100]);
        request.extend_from_slice(b"\r\n0\r\n\r\n");
        stream.write_all(&request).await.unwrap();

        let head = timeout(Duration::from_secs(5), read_head(&mut stream)).await.unwrap();
        assert!(head.starts_with("HTTP/1.1 413"), "{head}");
    }

    #[tokio::test]
    async fn test_request_body_streams_before_client_finishes() {
        let (seen_tx, mut seen_rx) = mpsc::channel::<Bytes>(4);
        let app = Router::new().fallback(move |request: Request| {
            let seen_tx = seen_tx.clone();
            async move {
                let mut stream = request.into_body().into_data_stream();
                let mut all = Vec::new();
                while let Some(chunk) = poll_fn(|cx| Pin::new(&mut stream).poll_next(cx)).await {
                    let chunk = chunk.unwrap();
                    let _ = seen_tx.send(chunk.clone()).await;
                    all.extend_from_slice(&chunk);
                }
                all
            }
        });
        let upstream = spawn(app).await;
        let table = table_with("upload.local", format!("http://{upstream}"));
        let proxy = spawn_proxy(table, UnmatchedHostPolicy::PassThrough, None).await;

        let mut stream = TcpStream::connect(proxy).await.unwrap();
        stream
            .write_all(b"POST /upload HTTP/1.1\r\nHost: upload.local\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n5\r\nfirst\r\n")
            .await
            .unwrap();

        // The client has not finished its body yet.
        let first = timeout(Duration::from_secs(5), seen_rx.recv()).await.unwrap().unwrap();
        assert_eq!(&first[..], b"first");

        stream.write_all(b"6\r\nsecond\r\n0\r\n\r\n").await.unwrap();
        let mut response = Vec::new();
        timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
            .await
            .unwrap()
            .unwrap();
        let response = String::from_utf8(response).unwrap();
        assert!(response.starts_with("HTTP/1.1 200"), "{response}");
        assert!(response.ends_with("firstsecond"), "{response}");
    }

    #[tokio::test]
    async fn test_upgrade_is_tunnelled() {
        let app = Router::new().fallback(|mut request: Request| async move {
            let on_upgrade = hyper::upgrade::on(&mut request);
            tokio::spawn(async move {
                let mut io = TokioIo::new(on_upgrade.await.unwrap());
                let mut buf = [0u8; 4];
                io.read_exact(&mut buf).await.unwrap();
                io.write_all(&buf).await.unwrap();
            });
            Response::builder()
                .status(StatusCode::SWITCHING_PROTOCOLS)
                .header(header::CONNECTION, "upgrade")
                .header(header::UPGRADE, "echo")
                .body(Body::empty())
                .unwrap()
        });
        let upstream = spawn(app).await;
        let table = table_with("chat.local", format!("http://{upstream}"));
        let proxy = spawn_proxy(table, UnmatchedHostPolicy::PassThrough, None).await;

        let mut stream = TcpStream::connect(proxy).await.unwrap();
        stream
            .write_all(b"GET /chat HTTP/1.1\r\nHost: chat.local\r\nConnection: Upgrade\r\nUpgrade: echo\r\n\r\n")
            .await
            .unwrap();

        let head = timeout(Duration::from_secs(5), read_head(&mut stream)).await.unwrap();
        assert!(head.starts_with("HTTP/1.1 101"), "{head}");
        assert!(head.to_ascii_lowercase().contains("upgrade: echo"), "{head}");

        stream.write_all(b"ping").await.unwrap();
        let mut echoed = [0u8; 4];
        timeout(Duration::from_secs(5), stream.read_exact(&mut echoed))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&echoed, b"ping");
    }

    struct ChunkStream(mpsc::Receiver<Bytes>);

    impl Stream for ChunkStream {
        type Item = Result<Bytes, std::io::Error>;

        fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
            self.0.poll_recv(cx).map(|chunk| chunk.map(Ok))
        }
    }

    #[tokio::test]
    async fn test_response_streams_before_upstream_finishes() {
        let (tx, rx) = mpsc::channel::<Bytes>(4);
        let rx = Arc::new(std::sync::Mutex::new(Some(rx)));
        let app = Router::new().fallback(move || {
            let rx = rx.lock().unwrap().take();
            async move {
                match rx {
                    Some(rx) => Body::from_stream(ChunkStream(rx)).into_response(),
                    None => StatusCode::GONE.into_response(),
                }
            }
        });
        let upstream = spawn(app).await;
        let table = table_with("events.local", format!("http://{upstream}"));
        let proxy = spawn_proxy(table, UnmatchedHostPolicy::PassThrough, None).await;

        tx.send(Bytes::from_static(b"first")).await.unwrap();
        let mut response = reqwest::Client::new()
            .get(format!("http://{proxy}/events"))
            .header("host", "events.local")
            .send()
            .await
            .unwrap();

        // The second chunk has not been produced yet.
        let first = response.chunk().await.unwrap().unwrap();
        assert_eq!(&first[..], b"first");

        tx.send(Bytes::from_static(b"second")).await.unwrap();
        drop(tx);
        let mut rest = Vec::new();
        while let Some(chunk) = response.chunk().await.unwrap() {
            rest.extend_from_slice(&chunk);
        }
        assert_eq!(rest, b"second");
    }

    #[test]
    fn test_declared_length() {
        let mut headers = HeaderMap::new();
        assert_eq!(declared_length(&headers), None);
        headers.insert(header::CONTENT_LENGTH, "42".parse().unwrap());
        assert_eq!(declared_length(&headers), Some(42));
    }
}
