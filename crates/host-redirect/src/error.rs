//! Startup and configuration errors.
//!
//! Only faults that must stop a subsystem from starting live here. Per-route,
//! per-request and per-query problems are logged and counted instead.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RedirectError {
    #[error("failed to read route file {path}: {source}")]
    RoutesRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid JSON in route file {path}: {source}")]
    RoutesParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write example route file {path}: {source}")]
    RoutesWrite {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid outbound proxy URL {url}: {source}")]
    InvalidProxyUrl {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("failed to enumerate addresses of interface {name}: {source}")]
    Interface {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("network interface {name} not found")]
    InterfaceNotFound { name: String },

    #[error("no IPv4 address found on interface {name}")]
    NoIpv4Address { name: String },

    #[error("an interface name (--interface / -I) is required when DNS is enabled")]
    MissingInterface,

    #[error("failed to build upstream HTTP client: {0}")]
    Transport(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, RedirectError>;
