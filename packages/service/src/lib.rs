#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hazard report clustering service.
//!
//! Ties the pure pieces together behind one entry point per use case:
//!
//! - [`ClusteringService::cluster_reports`]: cache lookup, radius and
//!   urgency/age filtering, clustering, ranking, cache write-back.
//! - [`ClusteringService::fetch_nearby`] / [`ClusteringService::cluster_nearby`]:
//!   the same, reading reports from a [`ReportStore`] with partition
//!   fallback.
//! - [`ClusteringService::submit_report`]: the write path with duplicate
//!   suppression and geographic cache invalidation.
//!
//! Cache failures never fail a request. They are logged, counted in
//! [`ServiceMetrics`], and the request is served uncached.

pub mod cache_key;
pub mod metrics;
pub mod store;

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use hazard_map_cache::{CacheBackend, CacheError, GetOptions, SetOptions};
use hazard_map_cluster::{ClusterEngine, ClusterError};
use hazard_map_cluster_models::{ClusterOptions, ClusterRequest, ClusterResponse};
use hazard_map_config::{EngineConfig, ServiceConfig};
use hazard_map_dedup::DuplicateDetector;
use hazard_map_geo::{distance_km, neighbor_keys, partition};
use hazard_map_report_models::{Location, LocationError, NewReport, Report};
use uuid::Uuid;

pub use metrics::{ServiceMetrics, ServiceMetricsSnapshot};
pub use store::{InMemoryReportStore, ReportStore, StoreError};

/// Errors surfaced to callers of the service.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Bad coordinates, radius, or clustering option.
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// What was rejected.
        message: String,
    },

    /// The submitter already reported this hazard nearby within the
    /// duplicate window. Retrying the same submission will fail again.
    #[error("Duplicate of report {existing}")]
    DuplicateReport {
        /// The earlier report this one repeats.
        existing: Uuid,
    },

    /// The report store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<LocationError> for ServiceError {
    fn from(e: LocationError) -> Self {
        Self::InvalidInput {
            message: e.to_string(),
        }
    }
}

impl From<ClusterError> for ServiceError {
    fn from(e: ClusterError) -> Self {
        Self::InvalidInput {
            message: e.to_string(),
        }
    }
}

/// Orchestrates clustering, caching, and report submission.
pub struct ClusteringService {
    store: Arc<dyn ReportStore>,
    cache: Arc<dyn CacheBackend<ClusterResponse>>,
    engine: ClusterEngine,
    detector: DuplicateDetector,
    default_options: ClusterOptions,
    config: ServiceConfig,
    metrics: ServiceMetrics,
}

impl ClusteringService {
    /// Creates a service over `store` and `cache`.
    #[must_use]
    pub fn new(
        config: &EngineConfig,
        store: Arc<dyn ReportStore>,
        cache: Arc<dyn CacheBackend<ClusterResponse>>,
    ) -> Self {
        Self {
            store,
            cache,
            engine: ClusterEngine::from_config(&config.clustering),
            detector: DuplicateDetector::from_config(&config.dedup),
            default_options: ClusterOptions {
                cluster_radius_km: config.clustering.cluster_radius_km,
                grid_cell_km: config.clustering.grid_cell_km,
                emergency_mode: false,
            },
            config: config.service.clone(),
            metrics: ServiceMetrics::default(),
        }
    }

    /// Clustering options built from the configured radius and cell size.
    #[must_use]
    pub const fn default_options(&self) -> ClusterOptions {
        self.default_options
    }

    /// Request and cache counters.
    #[must_use]
    pub const fn metrics(&self) -> &ServiceMetrics {
        &self.metrics
    }

    fn cache_failed(&self, operation: &str, e: &CacheError) {
        self.metrics.record_cache_failure();
        log::warn!("Cache {operation} failed, continuing without cache: {e}");
    }

    /// Switches emergency mode on or off for every subsequent request.
    pub fn set_emergency_mode(&self, enabled: bool) {
        if let Err(e) = self.cache.set_emergency_mode(enabled) {
            self.cache_failed("set_emergency_mode", &e);
        }
    }

    /// Whether emergency mode is on. Reads as off if the cache is down.
    pub fn is_emergency_mode(&self) -> bool {
        self.cache.is_emergency_mode().unwrap_or_else(|e| {
            self.cache_failed("is_emergency_mode", &e);
            false
        })
    }

    /// Clusters `reports` around `request.center`.
    ///
    /// A cached result for the same rounded center, radius, and options is
    /// returned with `from_cache` set unless `force_refresh` is set.
    /// Otherwise reports outside the radius are dropped, then everything but
    /// high and critical reports in emergency mode, or everything older
    /// than the recent window in normal mode. The rest is clustered,
    /// ranked, cached, and returned.
    ///
    /// Emergency mode applies if the request asks for it or the service-wide
    /// mode is on.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidInput`] for an invalid center, a
    /// non-positive radius or option, or a report with an invalid location.
    /// Nothing is cached in that case.
    pub fn cluster_reports(
        &self,
        reports: &[Report],
        request: &ClusterRequest,
    ) -> Result<ClusterResponse, ServiceError> {
        self.metrics.record_request();

        request.center.validate()?;
        if !(request.radius_km.is_finite() && request.radius_km > 0.0) {
            return Err(ServiceError::InvalidInput {
                message: format!("radius must be positive, got {}", request.radius_km),
            });
        }

        let options = ClusterOptions {
            emergency_mode: request.options.emergency_mode || self.is_emergency_mode(),
            ..request.options
        };
        let key = cache_key::cluster_key(
            request.center,
            request.radius_km,
            &options,
            self.config.location_precision,
        );

        if !request.force_refresh {
            match self.cache.get(&key, GetOptions::default()) {
                Ok(Some(cached)) => {
                    self.metrics.record_cache_hit();
                    log::debug!("Serving {key} from cache");
                    return Ok(annotate_cached(cached, Utc::now()));
                }
                Ok(None) => {}
                Err(e) => self.cache_failed("get", &e),
            }
        }

        let response = self.compute(reports, request, &options)?;

        let set_options = SetOptions {
            emergency_priority: options.emergency_mode,
            ..SetOptions::default()
        };
        if let Err(e) = self.cache.set(&key, response.clone(), set_options) {
            self.cache_failed("set", &e);
        }

        Ok(response)
    }

    fn compute(
        &self,
        reports: &[Report],
        request: &ClusterRequest,
        options: &ClusterOptions,
    ) -> Result<ClusterResponse, ServiceError> {
        let started = std::time::Instant::now();
        let now = Utc::now();

        for report in reports {
            report.location.validate()?;
        }

        let recent_since = self.recent_window_start(now);
        let selected: Vec<Report> = reports
            .iter()
            .filter(|r| distance_km(request.center, r.location) <= request.radius_km)
            .filter(|r| {
                if options.emergency_mode {
                    r.urgent_level.is_emergency()
                } else {
                    r.timestamp >= recent_since
                }
            })
            .cloned()
            .collect();

        log::debug!(
            "{} of {} report(s) within {} km of {} selected for clustering",
            selected.len(),
            reports.len(),
            request.radius_km,
            request.center
        );

        let clustering = self.engine.cluster(&selected, options)?;
        let clusters = hazard_map_cluster::rank(clustering.clusters, options.emergency_mode);

        Ok(ClusterResponse {
            cluster_count: clusters.len(),
            clusters,
            total_reports: selected.len(),
            algorithm: clustering.algorithm,
            processing_time_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
            from_cache: false,
            cache_age_ms: None,
            computed_at: now,
        })
    }

    fn recent_window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        Duration::try_days(i64::from(self.config.recent_window_days))
            .and_then(|window| now.checked_sub_signed(window))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Loads reports around `center` from the store.
    ///
    /// The center's own partition is read first. If it holds fewer than the
    /// configured minimum, the adjacent partitions are read, then the
    /// subregion wildcards in [`neighbor_keys`] order until enough reports
    /// have been found or the candidates run out.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidInput`] for an invalid center, or
    /// [`ServiceError::Store`] if the store fails.
    pub async fn fetch_nearby(&self, center: Location) -> Result<Vec<Report>, ServiceError> {
        center.validate()?;
        let wanted = self.config.fallback_min_results.max(1);

        let primary = hazard_map_geo::key_for(center, partition::AUTO_REGION);
        let mut reports = self.store.fetch_reports_in_partition(&primary).await?;
        if reports.len() >= wanted {
            return Ok(reports);
        }

        let mut seen: HashSet<Uuid> = reports.iter().map(|r| r.id).collect();
        let (wildcards, cells): (Vec<String>, Vec<String>) =
            neighbor_keys(center, self.config.max_fallback_candidates)
                .into_iter()
                .partition(|k| partition::is_wildcard(k));

        log::debug!(
            "Partition {primary} has {} report(s), trying {} adjacent partition(s) \
             and {} wildcard(s)",
            reports.len(),
            cells.len(),
            wildcards.len()
        );

        if !cells.is_empty() {
            let adjacent = self.store.fetch_reports_in_partitions(&cells).await?;
            extend_unique(&mut reports, &mut seen, adjacent);
        }

        for key in &wildcards {
            if reports.len() >= wanted {
                break;
            }
            let found = self.store.fetch_reports_in_partition(key).await?;
            extend_unique(&mut reports, &mut seen, found);
        }

        Ok(reports)
    }

    /// [`Self::fetch_nearby`] followed by [`Self::cluster_reports`].
    ///
    /// # Errors
    ///
    /// See [`Self::fetch_nearby`] and [`Self::cluster_reports`].
    pub async fn cluster_nearby(
        &self,
        request: &ClusterRequest,
    ) -> Result<ClusterResponse, ServiceError> {
        let reports = self.fetch_nearby(request.center).await?;
        self.cluster_reports(&reports, request)
    }

    /// Accepts a new report.
    ///
    /// The location is truncated to the configured precision before it is
    /// partitioned, compared, or stored. If the submitter already reported
    /// the same hazard type within the duplicate radius and window, nothing
    /// is stored. After a successful insert, cached clustering results
    /// centered in the report's subregion are dropped.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidInput`] for an invalid location,
    /// [`ServiceError::DuplicateReport`] for a repeat submission, or
    /// [`ServiceError::Store`] if the store fails.
    pub async fn submit_report(&self, new_report: NewReport) -> Result<Report, ServiceError> {
        new_report.location.validate()?;
        let location = new_report.location.truncated(self.config.location_precision);
        let now = Utc::now();

        let recent = self
            .store
            .fetch_recent_by_submitter(
                &new_report.submitter_id,
                new_report.hazard_type,
                self.detector.window_start(now),
            )
            .await?;

        if let Some(existing) = self.detector.find_duplicate(location, &recent) {
            self.metrics.record_duplicate();
            log::warn!(
                "Rejected duplicate {} report from {} at {location} (matches {})",
                new_report.hazard_type,
                new_report.submitter_id,
                existing.id
            );
            return Err(ServiceError::DuplicateReport {
                existing: existing.id,
            });
        }

        let report = Report {
            id: Uuid::new_v4(),
            location,
            hazard_type: new_report.hazard_type,
            urgent_level: new_report.urgent_level,
            submitter_id: new_report.submitter_id,
            timestamp: now,
            partition_key: hazard_map_geo::key_for(location, partition::AUTO_REGION),
        };
        self.store.insert_report(report.clone()).await?;
        self.metrics.record_report_accepted();

        match self.cache.invalidate(&cache_key::subregion_pattern(location)) {
            Ok(removed) => log::debug!(
                "Report {} stored in {}, dropped {removed} cached result(s)",
                report.id,
                report.partition_key
            ),
            Err(e) => self.cache_failed("invalidate", &e),
        }

        Ok(report)
    }
}

fn annotate_cached(mut cached: ClusterResponse, now: DateTime<Utc>) -> ClusterResponse {
    let age = (now - cached.computed_at).num_milliseconds();
    cached.from_cache = true;
    cached.cache_age_ms = Some(u64::try_from(age).unwrap_or(0));
    cached
}

fn extend_unique(reports: &mut Vec<Report>, seen: &mut HashSet<Uuid>, found: Vec<Report>) {
    reports.extend(found.into_iter().filter(|r| seen.insert(r.id)));
}
