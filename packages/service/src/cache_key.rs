//! Cache keys for clustering results.
//!
//! Keys lead with the center's partition key so a write can drop every
//! cached result of its subregion with one substring pattern:
//!
//! ```text
//! clusters:US-CA-34.05,-118.25:34.052,-118.243:r5:cr1:g2:n
//! ```

use hazard_map_cache::KeyPattern;
use hazard_map_cluster_models::ClusterOptions;
use hazard_map_geo::{partition, round_to_grid};
use hazard_map_report_models::Location;

/// Prefix shared by every clustering cache key.
pub const CLUSTER_KEY_PREFIX: &str = "clusters:";

/// The cache key for a clustering query.
///
/// The center is floored to `precision` decimals, so nearby queries share a
/// cached result.
#[must_use]
pub fn cluster_key(
    center: Location,
    radius_km: f64,
    options: &ClusterOptions,
    precision: u32,
) -> String {
    let rounded = round_to_grid(center, precision);
    let decimals = precision as usize;
    format!(
        "{CLUSTER_KEY_PREFIX}{partition}:{lat:.decimals$},{lng:.decimals$}:r{radius_km}:cr{cr}:g{g}:{mode}",
        partition = hazard_map_geo::key_for(center, partition::AUTO_REGION),
        lat = rounded.lat,
        lng = rounded.lng,
        cr = options.cluster_radius_km,
        g = options.grid_cell_km,
        mode = if options.emergency_mode { 'e' } else { 'n' },
    )
}

/// Matches every cached clustering result centered in the same subregion as
/// `location`.
#[must_use]
pub fn subregion_pattern(location: Location) -> KeyPattern {
    KeyPattern::substring(format!(
        "{CLUSTER_KEY_PREFIX}{}",
        partition::subregion_prefix(location, partition::AUTO_REGION)
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(lat: f64, lng: f64) -> Location {
        Location::new(lat, lng).unwrap()
    }

    #[test]
    fn key_layout() {
        let key = cluster_key(loc(34.0522, -118.2437), 5.0, &ClusterOptions::default(), 3);
        assert_eq!(key, "clusters:US-CA-34.05,-118.25:34.052,-118.244:r5:cr1:g2:n");
    }

    #[test]
    fn nearby_centers_share_a_key() {
        let opts = ClusterOptions::default();
        assert_eq!(
            cluster_key(loc(34.0521, -118.2431), 5.0, &opts, 3),
            cluster_key(loc(34.0529, -118.2439), 5.0, &opts, 3),
        );
    }

    #[test]
    fn mode_and_radius_are_part_of_the_key() {
        let normal = ClusterOptions::default();
        let emergency = ClusterOptions {
            emergency_mode: true,
            ..normal
        };
        let center = loc(34.05, -118.25);
        assert_ne!(
            cluster_key(center, 5.0, &normal, 3),
            cluster_key(center, 5.0, &emergency, 3)
        );
        assert_ne!(
            cluster_key(center, 5.0, &normal, 3),
            cluster_key(center, 10.0, &normal, 3)
        );
    }

    #[test]
    fn subregion_pattern_covers_its_keys_only() {
        let opts = ClusterOptions::default();
        let pattern = subregion_pattern(loc(37.77, -122.42));
        assert!(pattern.matches(&cluster_key(loc(34.05, -118.25), 5.0, &opts, 3)));
        assert!(!pattern.matches(&cluster_key(loc(45.52, -122.68), 5.0, &opts, 3)));
    }
}
