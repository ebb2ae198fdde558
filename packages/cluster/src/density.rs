//! DBSCAN-style density clustering for mid-sized inputs.
//!
//! Neighbor lookups go through an R-tree over a conservative bounding box
//! and are confirmed with the haversine distance, so the grouping is
//! identical to an all-pairs scan.

use std::collections::VecDeque;

use hazard_map_geo::distance_km;
use hazard_map_geo::math::search_envelope;
use hazard_map_report_models::Report;
use rstar::primitives::GeomWithData;
use rstar::{AABB, RTree};

type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Indices of every *other* report within `radius_km` of each report, in
/// ascending order.
fn neighbor_lists(reports: &[Report], radius_km: f64) -> Vec<Vec<usize>> {
    let tree: RTree<IndexedPoint> = RTree::bulk_load(
        reports
            .iter()
            .enumerate()
            .map(|(i, r)| GeomWithData::new([r.location.lng, r.location.lat], i))
            .collect(),
    );

    reports
        .iter()
        .enumerate()
        .map(|(i, report)| {
            let env = search_envelope(report.location, radius_km);
            let query = AABB::from_corners([env.min_lng, env.min_lat], [env.max_lng, env.max_lat]);
            let mut neighbors: Vec<usize> = tree
                .locate_in_envelope(&query)
                .map(|p| p.data)
                .filter(|&j| {
                    j != i && distance_km(report.location, reports[j].location) <= radius_km
                })
                .collect();
            neighbors.sort_unstable();
            neighbors
        })
        .collect()
}

/// Groups reports by density.
///
/// A core point has at least `min_neighbors` other reports within
/// `radius_km`. Core points seed clusters in input order and expand
/// breadth-first through other core points; non-core points reached by an
/// expansion join the first cluster to reach them but do not expand further.
/// Everything else becomes a singleton.
pub fn group(reports: &[Report], radius_km: f64, min_neighbors: usize) -> Vec<Vec<usize>> {
    let neighbors = neighbor_lists(reports, radius_km);
    let is_core: Vec<bool> = neighbors.iter().map(|n| n.len() >= min_neighbors).collect();

    let mut assigned = vec![false; reports.len()];
    let mut groups: Vec<Vec<usize>> = Vec::new();

    for seed in 0..reports.len() {
        if assigned[seed] || !is_core[seed] {
            continue;
        }

        assigned[seed] = true;
        let mut members = vec![seed];
        let mut queue = VecDeque::from([seed]);

        while let Some(point) = queue.pop_front() {
            for &next in &neighbors[point] {
                if assigned[next] {
                    continue;
                }
                assigned[next] = true;
                members.push(next);
                if is_core[next] {
                    queue.push_back(next);
                }
            }
        }

        members.sort_unstable();
        groups.push(members);
    }

    let noise = assigned.iter().filter(|a| !**a).count();
    if noise > 0 {
        log::trace!("{noise} report(s) reachable from no core point");
    }

    groups.extend(
        assigned
            .iter()
            .enumerate()
            .filter(|(_, a)| !**a)
            .map(|(i, _)| vec![i]),
    );

    groups
}

#[cfg(test)]
mod tests {
    use hazard_map_report_models::UrgencyLevel;

    use super::*;
    use crate::test_support::report;

    fn line(lats: &[f64]) -> Vec<Report> {
        lats.iter()
            .map(|&lat| report(lat, -118.0, UrgencyLevel::Normal))
            .collect()
    }

    #[test]
    fn neighbors_exclude_self() {
        let reports = line(&[34.0, 34.001, 34.002, 35.0]);
        let lists = neighbor_lists(&reports, 1.0);
        assert_eq!(lists[0], vec![1, 2]);
        assert_eq!(lists[1], vec![0, 2]);
        assert!(lists[3].is_empty());
    }

    #[test]
    fn rtree_matches_all_pairs_scan() {
        let reports: Vec<Report> = (0..60u32)
            .map(|i| {
                report(
                    f64::from(i % 9).mul_add(0.004, 34.0),
                    f64::from(i / 9).mul_add(0.005, -118.0),
                    UrgencyLevel::Low,
                )
            })
            .collect();
        let lists = neighbor_lists(&reports, 1.0);
        for (i, list) in lists.iter().enumerate() {
            let brute: Vec<usize> = (0..reports.len())
                .filter(|&j| {
                    j != i && distance_km(reports[i].location, reports[j].location) <= 1.0
                })
                .collect();
            assert_eq!(list, &brute, "neighbor mismatch for report {i}");
        }
    }

    #[test]
    fn two_points_are_noise() {
        // Each has only one other neighbor, short of the two required.
        let reports = line(&[34.0, 34.001]);
        assert_eq!(group(&reports, 1.0, 2), vec![vec![0], vec![1]]);
    }

    #[test]
    fn border_point_is_absorbed() {
        // 0,1,2 are a tight core group. 3 is ~0.98km from 2 and just over
        // 1km from 1, so it is a border point. 4 is out of reach.
        let reports = line(&[34.0, 34.0005, 34.001, 34.0098, 34.03]);
        let groups = group(&reports, 1.0, 2);
        assert_eq!(groups, vec![vec![0, 1, 2, 3], vec![4]]);
    }

    #[test]
    fn shared_border_point_joins_first_cluster() {
        // Two tight quadruples ~1.8km apart. Report 4 sits between them,
        // within reach of one member of each but short of three neighbors.
        let reports = line(&[
            34.0, 34.0003, 34.0006, 34.0009, 34.0097, 34.0185, 34.0188, 34.0191, 34.0194,
        ]);
        let groups = group(&reports, 1.0, 3);
        assert_eq!(groups, vec![vec![0, 1, 2, 3, 4], vec![5, 6, 7, 8]]);
    }

    #[test]
    fn chains_expand_through_core_points() {
        let lats: Vec<f64> = (0..8).map(|i| f64::from(i).mul_add(0.005, 34.0)).collect();
        let groups = group(&line(&lats), 1.0, 2);
        assert_eq!(groups, vec![(0..8).collect::<Vec<usize>>()]);
    }
}
