//! Coarse geographic partitioning.
//!
//! A partition key has the shape `"{region}-{subregion}-{gridLat},{gridLng}"`,
//! where the grid coordinates are the location floored to two decimals
//! (~1km cells). Reports are sharded by this key, and it is the primary
//! scope for cache keys and queries.

use hazard_map_report_models::{Location, floor_scaled};

/// Region placeholder that resolves the region from the location itself.
pub const AUTO_REGION: &str = "auto";

/// Subregion used when a location matches no known bounding box.
pub const OTHER_SUBREGION: &str = "OTHER";

/// Decimal places of the partition grid (~1km cells).
pub const PARTITION_PRECISION: u32 = 2;

/// Default number of fallback keys returned by [`neighbor_keys`].
pub const DEFAULT_MAX_CANDIDATES: usize = 5;

const GRID_SCALE: f64 = 100.0;

/// A named bounding box. First match wins where boxes overlap.
struct Subregion {
    code: &'static str,
    min_lat: f64,
    max_lat: f64,
    min_lng: f64,
    max_lng: f64,
}

impl Subregion {
    fn contains(&self, location: Location) -> bool {
        (self.min_lat..=self.max_lat).contains(&location.lat)
            && (self.min_lng..=self.max_lng).contains(&location.lng)
    }
}

const fn subregion(
    code: &'static str,
    min_lat: f64,
    max_lat: f64,
    min_lng: f64,
    max_lng: f64,
) -> Subregion {
    Subregion {
        code,
        min_lat,
        max_lat,
        min_lng,
        max_lng,
    }
}

/// Wildfire-prone states with approximate bounding boxes.
const KNOWN_SUBREGIONS: &[Subregion] = &[
    subregion("CA", 32.5, 42.0, -124.5, -114.1),
    subregion("OR", 42.0, 46.3, -124.6, -116.5),
    subregion("WA", 45.5, 49.0, -124.8, -116.9),
    subregion("NV", 35.0, 42.0, -120.0, -114.0),
    subregion("AZ", 31.3, 37.0, -114.8, -109.0),
    subregion("UT", 37.0, 42.0, -114.05, -109.05),
    subregion("CO", 37.0, 41.0, -109.05, -102.05),
    subregion("NM", 31.3, 37.0, -109.05, -103.0),
    subregion("ID", 42.0, 49.0, -117.2, -111.0),
    subregion("MT", 44.4, 49.0, -116.05, -104.04),
    subregion("TX", 25.8, 36.5, -106.65, -93.5),
    subregion("FL", 24.4, 31.0, -87.6, -80.0),
];

/// Country-scale boxes used when the region is `"auto"`.
const US_BOUNDS: &[Subregion] = &[
    subregion("CONUS", 24.4, 49.4, -125.0, -66.9),
    subregion("AK", 51.2, 71.5, -179.2, -129.9),
    subregion("HI", 18.9, 22.3, -160.3, -154.8),
];

/// Returns the subregion code for a location, or [`OTHER_SUBREGION`].
#[must_use]
pub fn subregion_for(location: Location) -> &'static str {
    KNOWN_SUBREGIONS
        .iter()
        .find(|s| s.contains(location))
        .map_or(OTHER_SUBREGION, |s| s.code)
}

/// Returns every known subregion code in lookup order.
#[must_use]
pub fn known_subregions() -> Vec<&'static str> {
    KNOWN_SUBREGIONS.iter().map(|s| s.code).collect()
}

/// Resolves `"auto"` to `"US"` or `"INTL"`; any other region is used as-is.
#[must_use]
pub fn resolve_region(location: Location, region: &str) -> String {
    if region != AUTO_REGION {
        return region.to_string();
    }
    if US_BOUNDS.iter().any(|b| b.contains(location)) {
        "US".to_string()
    } else {
        "INTL".to_string()
    }
}

#[allow(clippy::cast_possible_truncation)]
fn grid_index(value: f64) -> i64 {
    floor_scaled(value, GRID_SCALE) as i64
}

/// Formats a grid index as a fixed two-decimal coordinate without going
/// back through floating point.
fn format_grid(index: i64) -> String {
    let sign = if index < 0 { "-" } else { "" };
    let abs = index.unsigned_abs();
    format!("{sign}{}.{:02}", abs / 100, abs % 100)
}

fn format_key(region: &str, subregion: &str, lat_index: i64, lng_index: i64) -> String {
    format!(
        "{region}-{subregion}-{},{}",
        format_grid(lat_index),
        format_grid(lng_index)
    )
}

/// The wildcard key matching every cell of a subregion.
#[must_use]
pub fn wildcard_key(region: &str, subregion: &str) -> String {
    format!("{region}-{subregion}-*")
}

/// The `"{region}-{subregion}-"` prefix shared by every key of a subregion.
#[must_use]
pub fn subregion_prefix(location: Location, region: &str) -> String {
    format!(
        "{}-{}-",
        resolve_region(location, region),
        subregion_for(location)
    )
}

/// Computes the partition key for a location.
///
/// Deterministic and pure: the same location and region always produce the
/// same key.
#[must_use]
pub fn key_for(location: Location, region: &str) -> String {
    format_key(
        &resolve_region(location, region),
        subregion_for(location),
        grid_index(location.lat),
        grid_index(location.lng),
    )
}

/// Offsets of the eight cells surrounding a cell, row by row.
const NEIGHBOR_OFFSETS: [(i64, i64); 8] = [
    (-1, -1),
    (-1, 0),
    (-1, 1),
    (0, -1),
    (0, 1),
    (1, -1),
    (1, 0),
    (1, 1),
];

/// Returns up to `max_candidates` fallback partition keys for a location.
///
/// Order: the eight adjacent ~1km cells, then the wildcard for the
/// location's own subregion, then wildcards for every other known
/// subregion. This is a search order, not a query plan: callers try each
/// key in turn and stop once they have enough results.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn neighbor_keys(location: Location, max_candidates: usize) -> Vec<String> {
    let lat_index = grid_index(location.lat);
    let lng_index = grid_index(location.lng);
    let own_subregion = subregion_for(location);
    let region = resolve_region(location, AUTO_REGION);

    let mut keys: Vec<String> = NEIGHBOR_OFFSETS
        .iter()
        .map(|(dlat, dlng)| {
            let cell_lat = lat_index + dlat;
            let cell_lng = lng_index + dlng;
            // Resolve the neighbor's subregion from its cell center.
            let center = Location {
                lat: (cell_lat as f64 + 0.5) / GRID_SCALE,
                lng: (cell_lng as f64 + 0.5) / GRID_SCALE,
            };
            format_key(
                &resolve_region(center, AUTO_REGION),
                subregion_for(center),
                cell_lat,
                cell_lng,
            )
        })
        .collect();

    keys.push(wildcard_key(&region, own_subregion));
    keys.extend(
        KNOWN_SUBREGIONS
            .iter()
            .filter(|s| s.code != own_subregion)
            .map(|s| wildcard_key(&region, s.code)),
    );

    keys.truncate(max_candidates);
    log::trace!(
        "Fallback partitions for {location}: {} candidate(s)",
        keys.len()
    );
    keys
}

/// Whether `key` is a wildcard produced by [`wildcard_key`].
#[must_use]
pub fn is_wildcard(key: &str) -> bool {
    key.ends_with("-*")
}

/// Whether a concrete partition key is covered by `pattern`, which is either
/// the same concrete key or a wildcard.
#[must_use]
pub fn matches(pattern: &str, key: &str) -> bool {
    pattern
        .strip_suffix('*')
        .map_or_else(|| pattern == key, |prefix| key.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(lat: f64, lng: f64) -> Location {
        Location::new(lat, lng).unwrap()
    }

    #[test]
    fn key_for_los_angeles() {
        assert_eq!(key_for(loc(34.0522, -118.2437), AUTO_REGION), "US-CA-34.05,-118.25");
    }

    #[test]
    fn key_for_is_deterministic() {
        let l = loc(45.523, -122.676);
        assert_eq!(key_for(l, AUTO_REGION), key_for(l, AUTO_REGION));
        assert_eq!(key_for(l, AUTO_REGION), "US-OR-45.52,-122.68");
    }

    #[test]
    fn explicit_region_is_used_verbatim() {
        assert_eq!(key_for(loc(34.0522, -118.2437), "west"), "west-CA-34.05,-118.25");
    }

    #[test]
    fn unknown_location_is_other() {
        assert_eq!(key_for(loc(51.5074, -0.1278), AUTO_REGION), "INTL-OTHER-51.50,-0.13");
        assert_eq!(subregion_for(loc(39.0, -95.0)), OTHER_SUBREGION);
        assert_eq!(resolve_region(loc(39.0, -95.0), AUTO_REGION), "US");
    }

    #[test]
    fn small_negative_values_keep_sign() {
        assert_eq!(format_grid(-5), "-0.05");
        assert_eq!(format_grid(5), "0.05");
        assert_eq!(format_grid(-11825), "-118.25");
    }

    #[test]
    fn neighbors_start_with_adjacent_cells() {
        let l = loc(34.0522, -118.2437);
        let keys = neighbor_keys(l, 8);
        assert_eq!(keys.len(), 8);
        assert_eq!(keys[0], "US-CA-34.04,-118.26");
        assert_eq!(keys[3], "US-CA-34.05,-118.26");
        assert_eq!(keys[7], "US-CA-34.06,-118.24");
        assert!(!keys.contains(&key_for(l, AUTO_REGION)), "own cell must be excluded");
    }

    #[test]
    fn neighbors_then_wildcards() {
        let keys = neighbor_keys(loc(34.0522, -118.2437), 100);
        assert_eq!(keys[8], "US-CA-*");
        assert_eq!(keys[9], "US-OR-*");
        assert_eq!(keys.len(), 8 + KNOWN_SUBREGIONS.len());
        assert!(keys[8..].iter().all(|k| is_wildcard(k)));
    }

    #[test]
    fn neighbors_default_truncation() {
        assert_eq!(
            neighbor_keys(loc(34.0522, -118.2437), DEFAULT_MAX_CANDIDATES).len(),
            DEFAULT_MAX_CANDIDATES
        );
        assert!(neighbor_keys(loc(34.0522, -118.2437), 0).is_empty());
    }

    #[test]
    fn wildcard_matching() {
        assert!(matches("US-CA-*", "US-CA-34.05,-118.25"));
        assert!(!matches("US-OR-*", "US-CA-34.05,-118.25"));
        assert!(matches("US-CA-34.05,-118.25", "US-CA-34.05,-118.25"));
        assert!(!matches("US-CA-34.05,-118.25", "US-CA-34.05,-118.24"));
    }
}
