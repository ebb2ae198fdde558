//! Cluster aggregation shared by every strategy.

use std::collections::BTreeMap;

use hazard_map_cluster_models::Cluster;
use hazard_map_report_models::{Location, Report, UrgencyLevel};
use uuid::Uuid;

/// Builds a cluster from its members, which must be non-empty.
///
/// The centroid is the urgency-weighted mean location (`critical = 4` down
/// to `low = 1`). A singleton's centroid is its member's location, copied
/// rather than recomputed so it is exact.
#[must_use]
pub fn build_cluster<'a>(members: impl IntoIterator<Item = &'a Report>) -> Cluster {
    let members: Vec<Report> = members.into_iter().cloned().collect();
    debug_assert!(!members.is_empty(), "clusters are never empty");

    let centroid = weighted_centroid(&members);
    let highest_urgency = members
        .iter()
        .map(|r| r.urgent_level)
        .max()
        .unwrap_or(UrgencyLevel::Low);

    let mut type_histogram = BTreeMap::new();
    for report in &members {
        *type_histogram.entry(report.hazard_type).or_insert(0) += 1;
    }

    Cluster {
        id: Uuid::new_v4(),
        members,
        centroid,
        highest_urgency,
        type_histogram,
    }
}

/// Urgency-weighted mean of the member locations.
#[must_use]
pub fn weighted_centroid(members: &[Report]) -> Location {
    if let [only] = members {
        return only.location;
    }

    let (mut lat_sum, mut lng_sum, mut weight_sum) = (0.0, 0.0, 0.0);
    for report in members {
        let weight = f64::from(report.urgent_level.weight());
        lat_sum = report.location.lat.mul_add(weight, lat_sum);
        lng_sum = report.location.lng.mul_add(weight, lng_sum);
        weight_sum += weight;
    }

    if weight_sum == 0.0 {
        return Location { lat: 0.0, lng: 0.0 };
    }

    Location {
        lat: lat_sum / weight_sum,
        lng: lng_sum / weight_sum,
    }
}
