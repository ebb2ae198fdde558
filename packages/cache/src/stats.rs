//! Cache counters.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Running totals for a [`crate::TieredCache`].
#[derive(Debug, Default)]
pub struct CacheStats {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    promotions: AtomicU64,
    evictions: AtomicU64,
    invalidated: AtomicU64,
    expired: AtomicU64,
}

/// A point-in-time copy of [`CacheStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStatsSnapshot {
    /// Reads that found a live entry.
    pub hits: u64,
    /// Reads that found nothing.
    pub misses: u64,
    /// Successful `set` calls.
    pub writes: u64,
    /// Warm or cold hits copied into the hot tier.
    pub promotions: u64,
    /// Entries dropped for capacity or memory pressure.
    pub evictions: u64,
    /// Entries removed by pattern invalidation or emergency mode.
    pub invalidated: u64,
    /// Entries removed by the background sweep after their TTL passed.
    pub expired: u64,
}

fn add(counter: &AtomicU64, n: usize) {
    if n > 0 {
        counter.fetch_add(n as u64, Ordering::Relaxed);
    }
}

impl CacheStats {
    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_promotion(&self) {
        self.promotions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_evictions(&self, n: usize) {
        add(&self.evictions, n);
    }

    pub(crate) fn record_invalidated(&self, n: usize) {
        add(&self.invalidated, n);
    }

    pub(crate) fn record_expired(&self, n: usize) {
        add(&self.expired, n);
    }

    /// Reads every counter.
    #[must_use]
    pub fn snapshot(&self) -> CacheStatsSnapshot {
        CacheStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            promotions: self.promotions.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            invalidated: self.invalidated.load(Ordering::Relaxed),
            expired: self.expired.load(Ordering::Relaxed),
        }
    }
}

impl CacheStatsSnapshot {
    /// Fraction of reads that hit, or `None` before the first read.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn hit_rate(&self) -> Option<f64> {
        let reads = self.hits + self.misses;
        (reads > 0).then(|| self.hits as f64 / reads as f64)
    }
}
