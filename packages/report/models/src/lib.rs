#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Hazard report types shared across the hazard map.
//!
//! A [`Report`] is a single crowd-submitted hazard observation. Its
//! [`UrgencyLevel`] ordering drives every sort and aggregation in the
//! clustering engine, and its [`Location`] is truncated to ~100m before it
//! is ever persisted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use uuid::Uuid;

/// Urgency of a hazard report, ordered from least to most urgent.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum UrgencyLevel {
    /// Informational, no action expected
    Low = 1,
    /// Default urgency for most reports
    Normal = 2,
    /// Needs attention soon
    High = 3,
    /// Immediate danger to life or property
    Critical = 4,
}

impl UrgencyLevel {
    /// Returns the urgency rank used both as the centroid weight and as the
    /// primary ranking key (`critical = 4` down to `low = 1`).
    #[must_use]
    pub const fn weight(self) -> u8 {
        self as u8
    }

    /// Whether this level survives the emergency-mode urgency filter.
    #[must_use]
    pub const fn is_emergency(self) -> bool {
        matches!(self, Self::High | Self::Critical)
    }

    /// Returns all variants of this enum, least urgent first.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Low, Self::Normal, Self::High, Self::Critical]
    }
}

/// The kind of hazard a report describes.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum HazardType {
    /// Visible flames or a new ignition
    FireSpotting,
    /// Heavy smoke without visible flames
    SmokeSighting,
    /// Downed or arcing power lines
    PowerLineDown,
    /// Road blocked or closed
    RoadClosure,
    /// Generally unsafe conditions (debris, unstable structures)
    UnsafeConditions,
    /// People needing help evacuating
    EvacuationHelp,
    /// Flooding or mudslide
    Flooding,
    /// Anything not covered above
    Other,
}

impl HazardType {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::FireSpotting,
            Self::SmokeSighting,
            Self::PowerLineDown,
            Self::RoadClosure,
            Self::UnsafeConditions,
            Self::EvacuationHelp,
            Self::Flooding,
            Self::Other,
        ]
    }
}

/// Error returned when a coordinate pair is not a valid WGS84 location.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum LocationError {
    /// Latitude is NaN, infinite, or outside `[-90, 90]`.
    #[error("invalid latitude {lat}: expected a finite value in [-90, 90]")]
    Latitude {
        /// The rejected latitude.
        lat: f64,
    },

    /// Longitude is NaN, infinite, or outside `[-180, 180]`.
    #[error("invalid longitude {lng}: expected a finite value in [-180, 180]")]
    Longitude {
        /// The rejected longitude.
        lng: f64,
    },
}

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Latitude.
    pub lat: f64,
    /// Longitude.
    pub lng: f64,
}

impl Location {
    /// Creates a validated location.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError`] if either coordinate is non-finite or out of
    /// range.
    pub fn new(lat: f64, lng: f64) -> Result<Self, LocationError> {
        let location = Self { lat, lng };
        location.validate()?;
        Ok(location)
    }

    /// Checks that both coordinates are finite and in range.
    ///
    /// Locations built with a struct literal or deserialized from JSON skip
    /// [`Location::new`], so consumers validate again before computing.
    ///
    /// # Errors
    ///
    /// Returns [`LocationError`] naming the first offending coordinate.
    pub fn validate(&self) -> Result<(), LocationError> {
        if !self.lat.is_finite() || !(-90.0..=90.0).contains(&self.lat) {
            return Err(LocationError::Latitude { lat: self.lat });
        }
        if !self.lng.is_finite() || !(-180.0..=180.0).contains(&self.lng) {
            return Err(LocationError::Longitude { lng: self.lng });
        }
        Ok(())
    }

    /// Floors both coordinates to `precision` decimal places.
    ///
    /// Precision 3 gives ~100m cells, which is what reports are truncated to
    /// on ingestion so exact submitter positions are never stored.
    #[must_use]
    pub fn truncated(self, precision: u32) -> Self {
        let scale = 10f64.powi(i32::try_from(precision).unwrap_or(i32::MAX));
        Self {
            lat: floor_scaled(self.lat, scale) / scale,
            lng: floor_scaled(self.lng, scale) / scale,
        }
    }
}

/// Absorbs binary representation error before flooring, so `34.05` lands
/// in cell `3405` rather than `3404`.
pub const FLOOR_EPSILON: f64 = 1e-9;

/// Floors `value * scale`, tolerating representation error just below an
/// integer boundary.
#[must_use]
pub fn floor_scaled(value: f64, scale: f64) -> f64 {
    value.mul_add(scale, FLOOR_EPSILON).floor()
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.lat, self.lng)
    }
}

/// A persisted hazard report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    /// Opaque unique identifier assigned at creation.
    pub id: Uuid,
    /// Truncated report location.
    pub location: Location,
    /// Hazard kind.
    #[serde(rename = "type")]
    pub hazard_type: HazardType,
    /// Urgency level.
    pub urgent_level: UrgencyLevel,
    /// Pseudonymous submitter identifier. Only used for duplicate detection.
    /// Read from stored input but never serialized, so it cannot leak into
    /// responses shown to other users.
    #[serde(default, skip_serializing)]
    pub submitter_id: String,
    /// Creation time.
    pub timestamp: DateTime<Utc>,
    /// Partition key derived from `location`.
    pub partition_key: String,
}

/// A report as submitted, before an id, timestamp, and partition key have
/// been assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    /// Raw submitted location (not yet truncated).
    pub location: Location,
    /// Hazard kind.
    #[serde(rename = "type")]
    pub hazard_type: HazardType,
    /// Urgency level.
    pub urgent_level: UrgencyLevel,
    /// Pseudonymous submitter identifier.
    pub submitter_id: String,
}
