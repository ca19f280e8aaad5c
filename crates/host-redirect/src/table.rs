//! Host-keyed routing table shared by the DNS and HTTP fronts.
//!
//! Keys are normalized hostnames (trimmed, lowercase, no trailing root dot, no
//! port). A load writes the whole batch under one write lock so readers never
//! observe a half-loaded table. Lookups take the read lock only for the map
//! access and never across I/O.

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use reqwest::Url;

/// One configured route, as read from the route file.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct RouteEntry {
    pub source: String,
    pub target: String,
}

impl RouteEntry {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
        }
    }
}

/// A route entry that was not loaded, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedRoute {
    pub entry: RouteEntry,
    pub reason: String,
}

/// Outcome of [`RoutingTable::load`].
#[derive(Debug, Default)]
pub struct LoadReport {
    pub loaded: usize,
    pub skipped: Vec<SkippedRoute>,
}

#[derive(Debug, Default)]
pub struct RoutingTable {
    routes: RwLock<HashMap<String, Url>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a batch of routes.
    ///
    /// Entries whose target is not an absolute URL with a host, or whose source
    /// is empty, are skipped and reported. Later entries overwrite earlier ones
    /// with the same normalized source.
    pub fn load<I>(&self, entries: I) -> LoadReport
    where
        I: IntoIterator<Item = RouteEntry>,
    {
        let mut report = LoadReport::default();
        let mut parsed = Vec::new();

        for entry in entries {
            match validate(&entry) {
                Ok((key, target)) => parsed.push((entry, key, target)),
                Err(reason) => {
                    tracing::warn!(
                        source = %entry.source,
                        target = %entry.target,
                        reason = %reason,
                        "Skipping invalid route"
                    );
                    report.skipped.push(SkippedRoute { entry, reason });
                }
            }
        }

        let mut routes = self.routes.write().unwrap_or_else(PoisonError::into_inner);
        for (entry, key, target) in parsed {
            tracing::info!(source = %entry.source, target = %target, "Loaded route");
            routes.insert(key, target);
            report.loaded += 1;
        }

        report
    }

    /// Find the target for a hostname. The name is normalized first; a port
    /// suffix is not stripped here.
    pub fn lookup(&self, host: &str) -> Option<Url> {
        let key = normalize_host(host);
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .cloned()
    }

    pub fn contains(&self, host: &str) -> bool {
        let key = normalize_host(host);
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.routes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn validate(entry: &RouteEntry) -> Result<(String, Url), String> {
    let key = normalize_host(&entry.source);
    if key.is_empty() {
        return Err("empty source hostname".to_string());
    }

    let target = Url::parse(entry.target.trim()).map_err(|e| e.to_string())?;
    if target.host_str().is_none() {
        return Err("target URL has no host".to_string());
    }

    Ok((key, target))
}

/// Trim, lowercase and drop a trailing root dot.
pub fn normalize_host(host: &str) -> String {
    let host = host.trim();
    host.strip_suffix('.').unwrap_or(host).to_ascii_lowercase()
}

/// Drop the `:port` suffix of an authority. Bracketed IPv6 literals keep their
/// brackets; a bare IPv6 address (more than one colon) is returned as is.
pub fn strip_port(authority: &str) -> &str {
    if authority.starts_with('[') {
        return match authority.find(']') {
            Some(end) => &authority[..=end],
            None => authority,
        };
    }

    match authority.rsplit_once(':') {
        Some((host, port))
            if !host.contains(':') && port.bytes().all(|b| b.is_ascii_digit()) =>
        {
            host
        }
        _ => authority,
    }
}
