//! Service-level counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Running totals for a [`crate::ClusteringService`].
#[derive(Debug, Default)]
pub struct ServiceMetrics {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_failures: AtomicU64,
    reports_accepted: AtomicU64,
    duplicates_rejected: AtomicU64,
}

/// A point-in-time copy of [`ServiceMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceMetricsSnapshot {
    /// Clustering requests received, including rejected ones.
    pub requests: u64,
    /// Clustering requests answered from the cache.
    pub cache_hits: u64,
    /// Cache operations that failed and were skipped.
    pub cache_failures: u64,
    /// Submitted reports that were stored.
    pub reports_accepted: u64,
    /// Submitted reports rejected as duplicates.
    pub duplicates_rejected: u64,
}

impl ServiceMetrics {
    pub(crate) fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_cache_failure(&self) {
        self.cache_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_report_accepted(&self) {
        self.reports_accepted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_duplicate(&self) {
        self.duplicates_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads every counter.
    #[must_use]
    pub fn snapshot(&self) -> ServiceMetricsSnapshot {
        ServiceMetricsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_failures: self.cache_failures.load(Ordering::Relaxed),
            reports_accepted: self.reports_accepted.load(Ordering::Relaxed),
            duplicates_rejected: self.duplicates_rejected.load(Ordering::Relaxed),
        }
    }
}
