//! Great-circle distance and floor-based grid bucketing.

use hazard_map_report_models::{FLOOR_EPSILON, Location};

/// Mean Earth radius used for all distance math.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Approximate kilometers per degree of latitude.
pub const KM_PER_DEGREE: f64 = 111.32;

/// Haversine great-circle distance between two locations in kilometers.
///
/// Symmetric, and exactly `0.0` for identical inputs.
#[must_use]
pub fn distance_km(a: Location, b: Location) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0)
        .sin()
        .mul_add((dlat / 2.0).sin(), lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2));
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Floors a location to `precision` decimal places.
///
/// Floor, not nearest: two points closer than `10^-precision` degrees can
/// still land in different buckets when they straddle a boundary.
#[must_use]
pub fn round_to_grid(location: Location, precision: u32) -> Location {
    location.truncated(precision)
}

/// A cell in a fixed-size lat/lng grid, identified by integer indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct GridCell {
    /// `floor(lat / cell_size)`.
    pub lat_index: i64,
    /// `floor(lng / cell_size)`.
    pub lng_index: i64,
}

/// Converts a distance in kilometers to degrees of latitude.
#[must_use]
pub fn km_to_degrees(km: f64) -> f64 {
    km / KM_PER_DEGREE
}

/// Buckets a location into a grid whose cells are `cell_size_deg` degrees on
/// a side.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn grid_cell(location: Location, cell_size_deg: f64) -> GridCell {
    GridCell {
        lat_index: (location.lat / cell_size_deg + FLOOR_EPSILON).floor() as i64,
        lng_index: (location.lng / cell_size_deg + FLOOR_EPSILON).floor() as i64,
    }
}

/// An axis-aligned lat/lng box.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Envelope {
    /// Southern edge.
    pub min_lat: f64,
    /// Northern edge.
    pub max_lat: f64,
    /// Western edge.
    pub min_lng: f64,
    /// Eastern edge.
    pub max_lng: f64,
}

/// Returns a box guaranteed to contain every point within `radius_km` of
/// `center`.
///
/// When the circle reaches a pole or crosses the antimeridian the longitude
/// range widens to the whole globe.
#[must_use]
pub fn search_envelope(center: Location, radius_km: f64) -> Envelope {
    let angular = radius_km / EARTH_RADIUS_KM;
    let lat = center.lat.to_radians();
    let lng = center.lng.to_radians();

    let min_lat = lat - angular;
    let max_lat = lat + angular;
    let half_pi = std::f64::consts::FRAC_PI_2;
    let pi = std::f64::consts::PI;

    let full_lng = (-180.0, 180.0);
    let (min_lng, max_lng) = if min_lat > -half_pi && max_lat < half_pi {
        let ratio = angular.sin() / lat.cos();
        if ratio >= 1.0 {
            full_lng
        } else {
            let delta = ratio.asin();
            if lng - delta < -pi || lng + delta > pi {
                full_lng
            } else {
                ((lng - delta).to_degrees(), (lng + delta).to_degrees())
            }
        }
    } else {
        full_lng
    };

    // Pad by the floor epsilon so points exactly on the boundary are kept.
    Envelope {
        min_lat: min_lat.max(-half_pi).to_degrees() - FLOOR_EPSILON,
        max_lat: max_lat.min(half_pi).to_degrees() + FLOOR_EPSILON,
        min_lng: min_lng - FLOOR_EPSILON,
        max_lng: max_lng + FLOOR_EPSILON,
    }
}
