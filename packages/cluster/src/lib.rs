#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Adaptive clustering of hazard reports.
//!
//! The strategy is chosen purely by input size:
//!
//! 1. **Grid** (more than `grid_threshold` reports): O(n) bucketing into
//!    fixed-size cells. Cell boundaries split some natural groups, which is
//!    acceptable at this scale.
//! 2. **Density** (`density_threshold..=grid_threshold`): DBSCAN-style
//!    expansion from core points, with neighbor lookups served by an R-tree.
//! 3. **Simple** (fewer than `density_threshold`): greedy first-come radius
//!    grouping in input order.
//!
//! Every strategy only decides *which* reports belong together; centroid,
//! urgency, and histogram aggregation is shared (see [`aggregate`]).
//! [`rank`] orders the output for display.
//!
//! All functions are synchronous, pure, and safe to call from any number of
//! threads.

pub mod aggregate;
mod density;
mod grid;
pub mod rank;
mod simple;

use hazard_map_cluster_models::{Cluster, ClusterAlgorithm, ClusterOptions};
use hazard_map_config::ClusteringConfig;
use hazard_map_report_models::{LocationError, Report};
use uuid::Uuid;

pub use rank::rank;

/// Errors from a clustering pass.
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// A report carries a NaN or out-of-range location.
    #[error("Report {id} has an invalid location: {source}")]
    InvalidLocation {
        /// The offending report.
        id: Uuid,
        /// What was wrong with it.
        source: LocationError,
    },

    /// A radius or cell size is not a positive finite number.
    #[error("Invalid clustering option {name}: {value}")]
    InvalidOption {
        /// Option name.
        name: &'static str,
        /// Rejected value.
        value: f64,
    },
}

/// The output of one clustering pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    /// Strategy that was selected for the input size.
    pub algorithm: ClusterAlgorithm,
    /// Clusters and singletons, ordered by their first member's input
    /// position.
    pub clusters: Vec<Cluster>,
}

/// Selects and runs a clustering strategy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterEngine {
    grid_threshold: usize,
    density_threshold: usize,
    density_min_neighbors: usize,
}

impl Default for ClusterEngine {
    fn default() -> Self {
        Self::from_config(&ClusteringConfig::default())
    }
}

impl ClusterEngine {
    /// Creates an engine with the thresholds from `config`.
    #[must_use]
    pub const fn from_config(config: &ClusteringConfig) -> Self {
        Self {
            grid_threshold: config.grid_threshold,
            density_threshold: config.density_threshold,
            density_min_neighbors: config.density_min_neighbors,
        }
    }

    /// Returns the strategy used for `count` reports.
    #[must_use]
    pub const fn select_algorithm(&self, count: usize) -> ClusterAlgorithm {
        if count > self.grid_threshold {
            ClusterAlgorithm::Grid
        } else if count >= self.density_threshold {
            ClusterAlgorithm::Density
        } else {
            ClusterAlgorithm::Simple
        }
    }

    /// Clusters `reports`.
    ///
    /// Every input report appears in exactly one output cluster. For a fixed
    /// input and options the grouping is deterministic; only cluster ids
    /// differ between calls.
    ///
    /// # Errors
    ///
    /// Returns [`ClusterError`] if any report has an invalid location or an
    /// option is not a positive finite number. Nothing is computed in that
    /// case.
    pub fn cluster(
        &self,
        reports: &[Report],
        opts: &ClusterOptions,
    ) -> Result<Clustering, ClusterError> {
        validate_option("cluster_radius_km", opts.cluster_radius_km)?;
        validate_option("grid_cell_km", opts.grid_cell_km)?;
        for report in reports {
            report
                .location
                .validate()
                .map_err(|source| ClusterError::InvalidLocation {
                    id: report.id,
                    source,
                })?;
        }

        let algorithm = self.select_algorithm(reports.len());
        log::debug!(
            "Clustering {} report(s) with {algorithm} strategy",
            reports.len()
        );

        let mut groups = match algorithm {
            ClusterAlgorithm::Grid => grid::group(reports, opts.grid_cell_km),
            ClusterAlgorithm::Density => density::group(
                reports,
                opts.cluster_radius_km,
                self.density_min_neighbors,
            ),
            ClusterAlgorithm::Simple => simple::group(reports, opts.cluster_radius_km),
        };
        groups.sort_by_key(|g| g.first().copied());

        let clusters: Vec<Cluster> = groups
            .into_iter()
            .map(|indices| aggregate::build_cluster(indices.into_iter().map(|i| &reports[i])))
            .collect();

        log::debug!(
            "{algorithm} strategy produced {} cluster(s) from {} report(s)",
            clusters.len(),
            reports.len()
        );

        Ok(Clustering {
            algorithm,
            clusters,
        })
    }
}

fn validate_option(name: &'static str, value: f64) -> Result<(), ClusterError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ClusterError::InvalidOption { name, value })
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, Utc};
    use hazard_map_report_models::{HazardType, Location, Report, UrgencyLevel};
    use uuid::Uuid;

    pub fn report(lat: f64, lng: f64, urgency: UrgencyLevel) -> Report {
        report_aged(lat, lng, urgency, 0)
    }

    pub fn report_aged(lat: f64, lng: f64, urgency: UrgencyLevel, minutes_ago: i64) -> Report {
        let location = Location { lat, lng };
        Report {
            id: Uuid::new_v4(),
            location,
            hazard_type: HazardType::FireSpotting,
            urgent_level: urgency,
            submitter_id: "tester".to_string(),
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
            partition_key: hazard_map_geo::key_for(location, "auto"),
        }
    }

    /// Points on a 0.1 degree lattice (~11km apart), far from each other and
    /// from anything placed near `(34.0, -118.0)`.
    pub fn scattered(count: usize) -> Vec<Report> {
        const COLUMNS: usize = 20;
        const UNIT: f64 = 0.1;
        (0..count)
            .map(|i| {
                let row = f64::from(u32::try_from(i / COLUMNS).unwrap());
                let col = f64::from(u32::try_from(i % COLUMNS).unwrap());
                report(
                    row.mul_add(UNIT, 36.0),
                    col.mul_add(UNIT, -120.0),
                    UrgencyLevel::Low,
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use hazard_map_report_models::UrgencyLevel;

    use super::test_support::{report, scattered};
    use super::*;

    fn total_members(clustering: &Clustering) -> usize {
        clustering.clusters.iter().map(Cluster::len).sum()
    }

    #[test]
    fn algorithm_selection_thresholds() {
        let engine = ClusterEngine::default();
        assert_eq!(engine.select_algorithm(0), ClusterAlgorithm::Simple);
        assert_eq!(engine.select_algorithm(99), ClusterAlgorithm::Simple);
        assert_eq!(engine.select_algorithm(100), ClusterAlgorithm::Density);
        assert_eq!(engine.select_algorithm(1000), ClusterAlgorithm::Density);
        assert_eq!(engine.select_algorithm(1001), ClusterAlgorithm::Grid);
    }

    #[test]
    fn empty_input_gives_no_clusters() {
        let out = ClusterEngine::default()
            .cluster(&[], &ClusterOptions::default())
            .unwrap();
        assert!(out.clusters.is_empty());
        assert_eq!(out.algorithm, ClusterAlgorithm::Simple);
    }

    #[test]
    fn no_report_dropped_or_duplicated() {
        let engine = ClusterEngine::default();
        for count in [5, 150, 1200] {
            let mut reports = scattered(count);
            for i in 0..10 {
                reports.push(report(
                    f64::from(i).mul_add(0.0005, 34.0),
                    -118.0,
                    UrgencyLevel::High,
                ));
            }
            let out = engine.cluster(&reports, &ClusterOptions::default()).unwrap();
            assert_eq!(
                total_members(&out),
                reports.len(),
                "{} strategy lost or duplicated reports",
                out.algorithm
            );
        }
    }

    #[test]
    fn density_scenario_one_cluster_plus_singletons() {
        let mut reports = scattered(100);
        let urgencies = [
            UrgencyLevel::Low,
            UrgencyLevel::Normal,
            UrgencyLevel::High,
            UrgencyLevel::Normal,
        ];
        // 50 reports inside a ~0.3km box, interleaved with the scattered ones.
        for i in 0..50u32 {
            let lat = f64::from(i % 7).mul_add(0.0004, 34.0);
            let lng = f64::from(i / 7).mul_add(0.0004, -118.0);
            let urgency = urgencies[usize::try_from(i).unwrap() % urgencies.len()];
            reports.insert(usize::try_from(i).unwrap() * 3, report(lat, lng, urgency));
        }
        assert_eq!(reports.len(), 150);

        let out = ClusterEngine::default()
            .cluster(&reports, &ClusterOptions::default())
            .unwrap();

        assert_eq!(out.algorithm, ClusterAlgorithm::Density);
        let big: Vec<&Cluster> = out.clusters.iter().filter(|c| c.len() > 1).collect();
        assert_eq!(big.len(), 1, "expected exactly one multi-member cluster");
        assert_eq!(big[0].len(), 50);
        assert_eq!(big[0].highest_urgency, UrgencyLevel::High);
        assert_eq!(out.clusters.len(), 101);
    }

    #[test]
    fn grid_scenario() {
        let reports = scattered(1200);
        let out = ClusterEngine::default()
            .cluster(&reports, &ClusterOptions::default())
            .unwrap();
        assert_eq!(out.algorithm, ClusterAlgorithm::Grid);
        assert!(!out.clusters.is_empty());
        assert!(out.clusters.len() <= 1200);
    }

    #[test]
    fn nan_location_is_rejected() {
        let mut reports = scattered(3);
        reports[1].location.lat = f64::NAN;
        let err = ClusterEngine::default()
            .cluster(&reports, &ClusterOptions::default())
            .unwrap_err();
        assert!(matches!(err, ClusterError::InvalidLocation { id, .. } if id == reports[1].id));
    }

    #[test]
    fn non_positive_radius_is_rejected() {
        let opts = ClusterOptions {
            cluster_radius_km: 0.0,
            ..ClusterOptions::default()
        };
        assert!(matches!(
            ClusterEngine::default().cluster(&scattered(3), &opts),
            Err(ClusterError::InvalidOption {
                name: "cluster_radius_km",
                ..
            })
        ));
    }

    #[test]
    fn deterministic_across_threads() {
        let reports = scattered(300);
        let engine = ClusterEngine::default();
        let membership = |out: Clustering| -> Vec<Vec<Uuid>> {
            out.clusters
                .into_iter()
                .map(|c| c.members.into_iter().map(|r| r.id).collect())
                .collect()
        };
        let expected = membership(engine.cluster(&reports, &ClusterOptions::default()).unwrap());

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    s.spawn(|| {
                        membership(engine.cluster(&reports, &ClusterOptions::default()).unwrap())
                    })
                })
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), expected);
            }
        });
    }
}
