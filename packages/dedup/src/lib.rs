#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Best-effort duplicate suppression for hazard reports.
//!
//! The report store is responsible for narrowing candidates to the same
//! submitter, the same hazard type, and the trailing time window (see
//! [`DuplicateDetector::window`]). This crate only applies the spatial test.
//! It is an anti-spam heuristic: a missed duplicate is acceptable, a false
//! positive rejects a legitimate report with a retryable error.

use chrono::{DateTime, Duration, Utc};
use hazard_map_config::DedupConfig;
use hazard_map_geo::distance_km;
use hazard_map_report_models::{Location, Report};

/// Decides whether a new submission repeats one of the submitter's recent
/// reports.
#[derive(Debug, Clone, PartialEq)]
pub struct DuplicateDetector {
    radius_km: f64,
    window: Duration,
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::from_config(&DedupConfig::default())
    }
}

impl DuplicateDetector {
    /// Creates a detector from config.
    #[must_use]
    pub fn from_config(config: &DedupConfig) -> Self {
        Self {
            radius_km: config.radius_km,
            window: i64::try_from(config.window_secs)
                .ok()
                .and_then(Duration::try_seconds)
                .unwrap_or(Duration::MAX),
        }
    }

    /// Trailing window the caller should filter recent reports by.
    #[must_use]
    pub const fn window(&self) -> Duration {
        self.window
    }

    /// Start of the trailing window ending at `now`.
    #[must_use]
    pub fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.checked_sub_signed(self.window).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// Returns the first recent report within the duplicate radius of
    /// `candidate`, if any.
    #[must_use]
    pub fn find_duplicate<'a>(
        &self,
        candidate: Location,
        recent_by_same_submitter: &'a [Report],
    ) -> Option<&'a Report> {
        let found = recent_by_same_submitter
            .iter()
            .find(|r| distance_km(candidate, r.location) <= self.radius_km);
        if let Some(existing) = found {
            log::debug!(
                "Candidate at {candidate} is within {} km of report {}",
                self.radius_km,
                existing.id
            );
        }
        found
    }

    /// `true` iff any report in the set lies within the duplicate radius of
    /// `candidate`. Always `false` for an empty set.
    #[must_use]
    pub fn is_duplicate(&self, candidate: Location, recent_by_same_submitter: &[Report]) -> bool {
        self.find_duplicate(candidate, recent_by_same_submitter)
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use hazard_map_report_models::{HazardType, UrgencyLevel};
    use uuid::Uuid;

    use super::*;

    fn report_at(lat: f64, lng: f64, minutes_ago: i64) -> Report {
        let location = Location::new(lat, lng).unwrap();
        Report {
            id: Uuid::new_v4(),
            location,
            hazard_type: HazardType::FireSpotting,
            urgent_level: UrgencyLevel::High,
            submitter_id: "submitter-1".to_string(),
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
            partition_key: hazard_map_geo::key_for(location, "auto"),
        }
    }

    #[test]
    fn empty_window_is_never_duplicate() {
        let detector = DuplicateDetector::default();
        assert!(!detector.is_duplicate(Location::new(34.0, -118.0).unwrap(), &[]));
    }

    #[test]
    fn five_hundred_meters_apart_is_duplicate() {
        let detector = DuplicateDetector::default();
        let earlier = report_at(34.0, -118.0, 10);
        // ~0.0045 degrees of latitude is ~500m
        let candidate = Location::new(34.0045, -118.0).unwrap();
        assert!(distance_km(candidate, earlier.location) < 0.6);
        assert!(detector.is_duplicate(candidate, &[earlier]));
    }

    #[test]
    fn two_kilometers_apart_is_not_duplicate() {
        let detector = DuplicateDetector::default();
        let earlier = report_at(34.0, -118.0, 10);
        let candidate = Location::new(34.018, -118.0).unwrap();
        assert!(distance_km(candidate, earlier.location) > 1.9);
        assert!(!detector.is_duplicate(candidate, &[earlier]));
    }

    #[test]
    fn any_match_in_window_counts() {
        let detector = DuplicateDetector::default();
        let far = report_at(35.0, -118.0, 5);
        let near = report_at(34.001, -118.001, 50);
        let candidate = Location::new(34.0, -118.0).unwrap();
        let recent = [far, near.clone()];
        let found = detector.find_duplicate(candidate, &recent);
        assert_eq!(found.map(|r| r.id), Some(near.id));
    }

    #[test]
    fn window_defaults_to_one_hour() {
        let detector = DuplicateDetector::default();
        assert_eq!(detector.window(), Duration::hours(1));
        let now = Utc::now();
        assert_eq!(detector.window_start(now), now - Duration::hours(1));
    }
}
