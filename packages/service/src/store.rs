//! Report persistence contract and an in-memory implementation.

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use hazard_map_geo::partition;
use hazard_map_report_models::{HazardType, Report};
use tokio::sync::RwLock;

/// Errors from a report store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store could not be reached or rejected the operation.
    #[error("Report store unavailable: {message}")]
    Unavailable {
        /// Description of what went wrong.
        message: String,
    },
}

/// Persisted reports, sharded by partition key.
///
/// Keys are either concrete partition keys (`"US-CA-34.05,-118.25"`) or
/// subregion wildcards (`"US-CA-*"`) as produced by
/// [`hazard_map_geo::neighbor_keys`].
#[async_trait]
pub trait ReportStore: Send + Sync {
    /// Reports stored under `key`, or under every partition a wildcard
    /// covers.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store is unavailable.
    async fn fetch_reports_in_partition(&self, key: &str) -> Result<Vec<Report>, StoreError>;

    /// Reports from several partitions, each report at most once.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store is unavailable.
    async fn fetch_reports_in_partitions(&self, keys: &[String]) -> Result<Vec<Report>, StoreError> {
        let mut seen = HashSet::new();
        let mut reports = Vec::new();
        for key in keys {
            for report in self.fetch_reports_in_partition(key).await? {
                if seen.insert(report.id) {
                    reports.push(report);
                }
            }
        }
        Ok(reports)
    }

    /// Reports by `submitter_id` of `hazard_type` submitted at or after
    /// `since`, used for duplicate detection.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store is unavailable.
    async fn fetch_recent_by_submitter(
        &self,
        submitter_id: &str,
        hazard_type: HazardType,
        since: DateTime<Utc>,
    ) -> Result<Vec<Report>, StoreError>;

    /// Persists a report under its `partition_key`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the store is unavailable.
    async fn insert_report(&self, report: Report) -> Result<(), StoreError>;
}

/// A [`ReportStore`] held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryReportStore {
    partitions: RwLock<BTreeMap<String, Vec<Report>>>,
}

/// Stores `report` under `key_for(location)`, overwriting a stale or
/// foreign `partition_key`.
fn file_report(partitions: &mut BTreeMap<String, Vec<Report>>, mut report: Report) {
    let key = hazard_map_geo::key_for(report.location, partition::AUTO_REGION);
    if report.partition_key != key {
        log::debug!(
            "Report {} carried partition key {:?}, filing under {key}",
            report.id,
            report.partition_key
        );
        report.partition_key = key;
    }
    partitions
        .entry(report.partition_key.clone())
        .or_default()
        .push(report);
}

impl InMemoryReportStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `reports`.
    ///
    /// Each report is filed under the partition key derived from its
    /// location; a supplied `partition_key` that disagrees is replaced.
    #[must_use]
    pub fn with_reports(reports: impl IntoIterator<Item = Report>) -> Self {
        let mut partitions: BTreeMap<String, Vec<Report>> = BTreeMap::new();
        for report in reports {
            file_report(&mut partitions, report);
        }
        Self {
            partitions: RwLock::new(partitions),
        }
    }

    /// Total number of stored reports.
    pub async fn report_count(&self) -> usize {
        self.partitions.read().await.values().map(Vec::len).sum()
    }
}

#[async_trait]
impl ReportStore for InMemoryReportStore {
    async fn fetch_reports_in_partition(&self, key: &str) -> Result<Vec<Report>, StoreError> {
        let partitions = self.partitions.read().await;

        if !partition::is_wildcard(key) {
            return Ok(partitions.get(key).cloned().unwrap_or_default());
        }

        Ok(partitions
            .iter()
            .filter(|(k, _)| partition::matches(key, k))
            .flat_map(|(_, reports)| reports.iter().cloned())
            .collect())
    }

    async fn fetch_recent_by_submitter(
        &self,
        submitter_id: &str,
        hazard_type: HazardType,
        since: DateTime<Utc>,
    ) -> Result<Vec<Report>, StoreError> {
        let partitions = self.partitions.read().await;
        Ok(partitions
            .values()
            .flatten()
            .filter(|r| {
                r.submitter_id == submitter_id && r.hazard_type == hazard_type && r.timestamp >= since
            })
            .cloned()
            .collect())
    }

    async fn insert_report(&self, report: Report) -> Result<(), StoreError> {
        log::trace!("Storing report {} at {}", report.id, report.location);
        file_report(&mut *self.partitions.write().await, report);
        Ok(())
    }
}
