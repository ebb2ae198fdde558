#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Engine configuration for the hazard map.
//!
//! The documented defaults ship as `config/default.toml` and are embedded
//! as [`DEFAULT_CONFIG_TOML`]; a test keeps them identical to the
//! [`Default`] impls below. An override file only needs to name the keys it
//! changes; every other key falls back to its default.

use std::path::Path;

use serde::Deserialize;

/// The default configuration as TOML, suitable as a starting point for an
/// override file.
pub const DEFAULT_CONFIG_TOML: &str = include_str!("../config/default.toml");

/// Errors from loading an override config file.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The override file could not be read.
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The override file is not valid TOML for [`EngineConfig`].
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration for every engine component.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Tiered cache TTLs, capacities, and maintenance.
    #[serde(default)]
    pub cache: CacheConfig,
    /// Clustering defaults and algorithm thresholds.
    #[serde(default)]
    pub clustering: ClusteringConfig,
    /// Duplicate-detection window.
    #[serde(default)]
    pub dedup: DedupConfig,
    /// Orchestrator behavior.
    #[serde(default)]
    pub service: ServiceConfig,
}

impl EngineConfig {
    /// Parses a TOML override string on top of the embedded defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the string is not valid TOML or a
    /// key has the wrong type.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        Ok(toml::de::from_str(s)?)
    }

    /// Loads the config from `path`, or the embedded defaults when `path` is
    /// `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        log::info!("Loading engine config from {}", path.display());
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }
}

/// Tiered cache settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Hot tier TTL in normal mode.
    pub hot_ttl_secs: u64,
    /// Warm tier TTL in normal mode.
    pub warm_ttl_secs: u64,
    /// Cold tier TTL in normal mode.
    pub cold_ttl_secs: u64,
    /// Hot tier TTL while emergency mode is active.
    pub emergency_hot_ttl_secs: u64,
    /// Warm tier TTL while emergency mode is active.
    pub emergency_warm_ttl_secs: u64,
    /// Cold tier TTL while emergency mode is active.
    pub emergency_cold_ttl_secs: u64,
    /// Maximum keys held by the hot tier.
    pub hot_max_keys: usize,
    /// Maximum keys held by the warm tier.
    pub warm_max_keys: usize,
    /// Maximum keys held by the cold tier.
    pub cold_max_keys: usize,
    /// Estimated memory ceiling for the memory-pressure sweep.
    pub memory_budget_bytes: u64,
    /// Per-key size estimate used by the memory-pressure sweep.
    pub estimated_bytes_per_key: u64,
    /// How often the background maintenance task runs.
    pub sweep_interval_secs: u64,
    /// Emergency mode switches itself off after this long.
    pub emergency_timeout_secs: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            hot_ttl_secs: 30,
            warm_ttl_secs: 300,
            cold_ttl_secs: 1800,
            emergency_hot_ttl_secs: 10,
            emergency_warm_ttl_secs: 60,
            emergency_cold_ttl_secs: 300,
            hot_max_keys: 1000,
            warm_max_keys: 5000,
            cold_max_keys: 10_000,
            memory_budget_bytes: 50 * 1024 * 1024,
            estimated_bytes_per_key: 4096,
            sweep_interval_secs: 60,
            emergency_timeout_secs: 3600,
        }
    }
}

/// Clustering defaults.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Default neighbor radius for the density and simple strategies.
    pub cluster_radius_km: f64,
    /// Default cell size for the grid strategy.
    pub grid_cell_km: f64,
    /// Inputs larger than this use grid clustering.
    pub grid_threshold: usize,
    /// Inputs at least this large (and not above `grid_threshold`) use
    /// density clustering.
    pub density_threshold: usize,
    /// Minimum number of other reports within the radius for a density
    /// core point.
    pub density_min_neighbors: usize,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            cluster_radius_km: 1.0,
            grid_cell_km: 2.0,
            grid_threshold: 1000,
            density_threshold: 100,
            density_min_neighbors: 2,
        }
    }
}

/// Duplicate-detection settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct DedupConfig {
    /// Reports closer than this are considered duplicates.
    pub radius_km: f64,
    /// Trailing window the report store is asked for.
    pub window_secs: u64,
}

impl Default for DedupConfig {
    fn default() -> Self {
        Self {
            radius_km: 1.0,
            window_secs: 3600,
        }
    }
}

/// Orchestrator settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Outside emergency mode, only reports newer than this are clustered.
    pub recent_window_days: u32,
    /// Decimal places submitted locations are truncated to.
    pub location_precision: u32,
    /// The fallback partition walk stops once this many reports are found.
    pub fallback_min_results: usize,
    /// Maximum number of neighbor partitions tried by the fallback walk.
    pub max_fallback_candidates: usize,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            recent_window_days: 7,
            location_precision: 3,
            fallback_min_results: 1,
            max_fallback_candidates: 5,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_toml_matches_default_impls() {
        let embedded = EngineConfig::from_toml_str(DEFAULT_CONFIG_TOML).unwrap();
        assert_eq!(embedded, EngineConfig::default());
    }

    #[test]
    fn default_values() {
        let config = EngineConfig::default();
        assert_eq!(config.cache.hot_ttl_secs, 30);
        assert_eq!(config.cache.warm_ttl_secs, 300);
        assert_eq!(config.cache.cold_ttl_secs, 1800);
        assert_eq!(config.cache.emergency_timeout_secs, 3600);
        assert_eq!(config.clustering.grid_threshold, 1000);
        assert_eq!(config.clustering.density_threshold, 100);
        assert_eq!(config.service.recent_window_days, 7);
    }

    #[test]
    fn emergency_ttls_are_shorter() {
        let cache = CacheConfig::default();
        assert!(cache.emergency_hot_ttl_secs < cache.hot_ttl_secs);
        assert!(cache.emergency_warm_ttl_secs < cache.warm_ttl_secs);
        assert!(cache.emergency_cold_ttl_secs < cache.cold_ttl_secs);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config = EngineConfig::from_toml_str(
            "[cache]\nhot_ttl_secs = 5\n\n[clustering]\ncluster_radius_km = 0.5\n",
        )
        .unwrap();
        assert_eq!(config.cache.hot_ttl_secs, 5);
        assert_eq!(config.cache.warm_ttl_secs, 300);
        assert!((config.clustering.cluster_radius_km - 0.5).abs() < f64::EPSILON);
        assert!((config.clustering.grid_cell_km - 2.0).abs() < f64::EPSILON);
        assert_eq!(config.dedup, DedupConfig::default());
    }

    #[test]
    fn empty_override_is_default() {
        assert_eq!(
            EngineConfig::from_toml_str("").unwrap(),
            EngineConfig::default()
        );
    }

    #[test]
    fn rejects_wrong_types() {
        assert!(EngineConfig::from_toml_str("[cache]\nhot_ttl_secs = \"soon\"\n").is_err());
    }
}
