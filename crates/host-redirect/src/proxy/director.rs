//! Per-request routing decision and outbound request shaping.
//!
//! Lookup key: the request authority with its port stripped, lowercased and
//! without a trailing root dot. Stripping the port means `api.local:8080`
//! matches a route for `api.local`; a route cannot be scoped to one port.

use http::header::{self, HeaderMap, HeaderValue};
use http::Uri;
use reqwest::Url;

use crate::policy::UnmatchedHostPolicy;
use crate::table::{strip_port, RoutingTable};

/// Headers never copied between the inbound and outbound legs.
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "host",
    "connection",
    "proxy-connection",
    "keep-alive",
    "transfer-encoding",
    "te",
    "trailer",
    "trailers",
    "upgrade",
    "proxy-authenticate",
    "proxy-authorization",
];

/// Where an inbound request goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Direction {
    /// Routed host: scheme and authority replaced by the target's.
    Rewrite { url: Url, authority: String },
    /// Unrouted host under [`UnmatchedHostPolicy::PassThrough`]: addressed to
    /// the original authority.
    PassThrough { url: Url, authority: String },
    /// Not forwarded; answered with 502.
    Reject { reason: &'static str },
}

impl Direction {
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Rewrite { .. } => "rewrite",
            Direction::PassThrough { .. } => "pass-through",
            Direction::Reject { .. } => "reject",
        }
    }
}

/// Authority of an inbound request: absolute-form URI authority first, then
/// the `Host` header.
pub fn request_authority(uri: &Uri, headers: &HeaderMap) -> Option<String> {
    if let Some(authority) = uri.authority() {
        return Some(authority.as_str().to_string());
    }
    headers
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

pub fn direct(
    table: &RoutingTable,
    policy: UnmatchedHostPolicy,
    uri: &Uri,
    headers: &HeaderMap,
) -> Direction {
    let Some(authority) = request_authority(uri, headers) else {
        return Direction::Reject {
            reason: "request has no host",
        };
    };
    let path_and_query = uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");

    if let Some(target) = table.lookup(strip_port(&authority)) {
        let Some(target_authority) = url_authority(&target) else {
            return Direction::Reject {
                reason: "route target has no host",
            };
        };
        return match join(target.scheme(), &target_authority, path_and_query) {
            Some(url) => Direction::Rewrite {
                url,
                authority: target_authority,
            },
            None => Direction::Reject {
                reason: "could not build upstream URL",
            },
        };
    }

    match policy {
        UnmatchedHostPolicy::Reject => Direction::Reject {
            reason: "no route for host",
        },
        UnmatchedHostPolicy::PassThrough => match join("http", &authority, path_and_query) {
            Some(url) => Direction::PassThrough { url, authority },
            None => Direction::Reject {
                reason: "could not build upstream URL",
            },
        },
    }
}

/// The protocol a message asks to switch to: `Upgrade` present and
/// `upgrade` listed in `Connection`.
pub fn upgrade_protocol(headers: &HeaderMap) -> Option<HeaderValue> {
    if !connection_tokens(headers).iter().any(|t| t == "upgrade") {
        return None;
    }
    headers.get(header::UPGRADE).cloned()
}

/// Headers for the outbound request.
///
/// Hop-by-hop headers (including any named in `Connection`) are dropped, except
/// that an upgrade request keeps `Connection: upgrade` and its `Upgrade`.
/// `Host` is set to the outbound authority. On a rewrite a client-supplied
/// `X-Forwarded-For` is removed. Nothing identifying the proxy is ever added.
pub fn outbound_headers(inbound: &HeaderMap, direction: &Direction) -> HeaderMap {
    let mut out = end_to_end(inbound);
    if let Some(protocol) = upgrade_protocol(inbound) {
        out.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
        out.insert(header::UPGRADE, protocol);
    }

    let authority = match direction {
        Direction::Rewrite { authority, .. } => {
            out.remove("x-forwarded-for");
            Some(authority)
        }
        Direction::PassThrough { authority, .. } => Some(authority),
        Direction::Reject { .. } => None,
    };
    if let Some(value) = authority.and_then(|a| HeaderValue::from_str(a).ok()) {
        out.insert(header::HOST, value);
    }

    out
}

/// Response headers relayed to the client: everything but hop-by-hop.
pub fn relayed_response_headers(upstream: &HeaderMap) -> HeaderMap {
    end_to_end(upstream)
}

fn end_to_end(headers: &HeaderMap) -> HeaderMap {
    let connection_listed = connection_tokens(headers);
    let mut out = HeaderMap::with_capacity(headers.len());
    for (name, value) in headers {
        let name_str = name.as_str();
        if HOP_BY_HOP_HEADERS.contains(&name_str) || connection_listed.iter().any(|t| t == name_str) {
            continue;
        }
        out.append(name.clone(), value.clone());
    }
    out
}

fn connection_tokens(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|t| t.trim().to_ascii_lowercase())
        .filter(|t| !t.is_empty())
        .collect()
}

/// `host[:port]` of a URL, keeping IPv6 brackets and dropping default ports.
fn url_authority(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    Some(match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    })
}

fn join(scheme: &str, authority: &str, path_and_query: &str) -> Option<Url> {
    Url::parse(&format!("{scheme}://{authority}{path_and_query}")).ok()
}
