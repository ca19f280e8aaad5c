//! Atomic redirect counters.
//!
//! Monotonic counters with `Relaxed` ordering; they carry no synchronization
//! meaning and are only read for the shutdown summary.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Default)]
struct StatsInner {
    http_rewritten: AtomicU64,
    http_passed_through: AtomicU64,
    http_rejected: AtomicU64,
    http_upstream_errors: AtomicU64,
    http_cancelled: AtomicU64,
    dns_overrides: AtomicU64,
    dns_forwards: AtomicU64,
    dns_dropped: AtomicU64,
}

/// Which counter to bump.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    HttpRewritten,
    HttpPassedThrough,
    HttpRejected,
    HttpUpstreamError,
    HttpCancelled,
    DnsOverride,
    DnsForward,
    DnsDropped,
}

/// Shared counters. Cheap to clone (Arc).
#[derive(Clone, Default)]
pub struct RedirectStats {
    inner: Arc<StatsInner>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub http_rewritten: u64,
    pub http_passed_through: u64,
    pub http_rejected: u64,
    pub http_upstream_errors: u64,
    pub http_cancelled: u64,
    pub dns_overrides: u64,
    pub dns_forwards: u64,
    pub dns_dropped: u64,
}

impl RedirectStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc(&self, counter: Counter) {
        let inner = &self.inner;
        let cell = match counter {
            Counter::HttpRewritten => &inner.http_rewritten,
            Counter::HttpPassedThrough => &inner.http_passed_through,
            Counter::HttpRejected => &inner.http_rejected,
            Counter::HttpUpstreamError => &inner.http_upstream_errors,
            Counter::HttpCancelled => &inner.http_cancelled,
            Counter::DnsOverride => &inner.dns_overrides,
            Counter::DnsForward => &inner.dns_forwards,
            Counter::DnsDropped => &inner.dns_dropped,
        };
        cell.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let inner = &self.inner;
        StatsSnapshot {
            http_rewritten: inner.http_rewritten.load(Ordering::Relaxed),
            http_passed_through: inner.http_passed_through.load(Ordering::Relaxed),
            http_rejected: inner.http_rejected.load(Ordering::Relaxed),
            http_upstream_errors: inner.http_upstream_errors.load(Ordering::Relaxed),
            http_cancelled: inner.http_cancelled.load(Ordering::Relaxed),
            dns_overrides: inner.dns_overrides.load(Ordering::Relaxed),
            dns_forwards: inner.dns_forwards.load(Ordering::Relaxed),
            dns_dropped: inner.dns_dropped.load(Ordering::Relaxed),
        }
    }

    /// Emit the current counters as one log line.
    pub fn log_summary(&self) {
        let s = self.snapshot();
        tracing::info!(
            http_rewritten = s.http_rewritten,
            http_passed_through = s.http_passed_through,
            http_rejected = s.http_rejected,
            http_upstream_errors = s.http_upstream_errors,
            http_cancelled = s.http_cancelled,
            dns_overrides = s.dns_overrides,
            dns_forwards = s.dns_forwards,
            dns_dropped = s.dns_dropped,
            "Redirect statistics"
        );
    }
}
