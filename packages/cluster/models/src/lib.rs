#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Cluster types produced by the clustering engine.
//!
//! Clusters are ephemeral: they are rebuilt on every clustering pass (subject
//! to caching) and their ids are random, so consumers must not treat a
//! cluster id as durable across calls.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use hazard_map_report_models::{HazardType, Location, Report, UrgencyLevel};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Default neighbor radius for density and simple clustering.
pub const DEFAULT_CLUSTER_RADIUS_KM: f64 = 1.0;

/// Default cell size for grid clustering.
pub const DEFAULT_GRID_CELL_KM: f64 = 2.0;

/// Which strategy produced a set of clusters.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
pub enum ClusterAlgorithm {
    /// Fixed-size grid bucketing, used for very large inputs.
    #[serde(rename = "grid-based")]
    #[strum(serialize = "grid-based")]
    Grid,
    /// DBSCAN-style density clustering for mid-sized inputs.
    #[serde(rename = "density-based")]
    #[strum(serialize = "density-based")]
    Density,
    /// Greedy first-come radius grouping for small inputs.
    #[serde(rename = "simple")]
    #[strum(serialize = "simple")]
    Simple,
}

/// A group of nearby reports, or a single report (a singleton).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    /// Random per-pass identifier.
    pub id: Uuid,
    /// Member reports in input order. Never empty.
    pub members: Vec<Report>,
    /// Urgency-weighted mean of member locations.
    pub centroid: Location,
    /// Most urgent member level.
    pub highest_urgency: UrgencyLevel,
    /// Member count per hazard type. Counts sum to `members.len()`.
    pub type_histogram: BTreeMap<HazardType, usize>,
}

impl Cluster {
    /// Number of member reports.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Always `false` for clusters built by the engine.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Whether this is a one-member cluster.
    #[must_use]
    pub fn is_singleton(&self) -> bool {
        self.members.len() == 1
    }

    /// Timestamp of the most recent member.
    #[must_use]
    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.members.iter().map(|r| r.timestamp).max()
    }
}

/// Per-call clustering knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOptions {
    /// Neighbor radius for the density and simple strategies.
    pub cluster_radius_km: f64,
    /// Cell size for the grid strategy.
    pub grid_cell_km: f64,
    /// Emergency mode: restricts input to urgent reports and doubles the
    /// urgency ranking key.
    pub emergency_mode: bool,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            cluster_radius_km: DEFAULT_CLUSTER_RADIUS_KM,
            grid_cell_km: DEFAULT_GRID_CELL_KM,
            emergency_mode: false,
        }
    }
}

/// A clustering query centered on a location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterRequest {
    /// Query center.
    pub center: Location,
    /// Only reports within this distance of `center` are clustered.
    pub radius_km: f64,
    /// Clustering knobs.
    #[serde(default)]
    pub options: ClusterOptions,
    /// Bypass the cache read (the result is still written back).
    #[serde(default)]
    pub force_refresh: bool,
}

/// The result of a clustering request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterResponse {
    /// Ranked clusters and singletons.
    pub clusters: Vec<Cluster>,
    /// Number of reports that survived filtering and were clustered.
    pub total_reports: usize,
    /// `clusters.len()`.
    pub cluster_count: usize,
    /// Strategy used.
    pub algorithm: ClusterAlgorithm,
    /// Wall time spent computing (not reading from cache).
    pub processing_time_ms: u64,
    /// Whether this response came from the cache.
    pub from_cache: bool,
    /// Age of the cached response, set only when `from_cache` is true.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_age_ms: Option<u64>,
    /// When the clusters were computed.
    pub computed_at: DateTime<Utc>,
}
