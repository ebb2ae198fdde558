//! Greedy radius grouping for small inputs.

use hazard_map_geo::distance_km;
use hazard_map_report_models::Report;

/// Walks reports in input order; each unprocessed report claims every later
/// unprocessed report within `radius_km` of it.
///
/// First come, first served: a report near two seeds joins whichever seed
/// comes first in the input.
pub fn group(reports: &[Report], radius_km: f64) -> Vec<Vec<usize>> {
    let mut processed = vec![false; reports.len()];
    let mut groups = Vec::new();

    for seed in 0..reports.len() {
        if processed[seed] {
            continue;
        }
        processed[seed] = true;
        let mut members = vec![seed];

        for candidate in (seed + 1)..reports.len() {
            if !processed[candidate]
                && distance_km(reports[seed].location, reports[candidate].location) <= radius_km
            {
                processed[candidate] = true;
                members.push(candidate);
            }
        }

        groups.push(members);
    }

    groups
}

#[cfg(test)]
mod tests {
    use hazard_map_report_models::UrgencyLevel;

    use super::*;
    use crate::test_support::report;

    #[test]
    fn lone_report_is_singleton() {
        let reports = vec![
            report(34.0, -118.0, UrgencyLevel::Low),
            report(34.001, -118.0, UrgencyLevel::Low),
            report(35.0, -118.0, UrgencyLevel::Low),
        ];
        assert_eq!(group(&reports, 1.0), vec![vec![0, 1], vec![2]]);
    }

    #[test]
    fn boundary_report_joins_first_seed() {
        // ~0.8km steps: 0 and 2 are ~1.6km apart, 1 sits between them.
        let reports = vec![
            report(34.0, -118.0, UrgencyLevel::Low),
            report(34.0072, -118.0, UrgencyLevel::Low),
            report(34.0144, -118.0, UrgencyLevel::Low),
        ];
        assert_eq!(group(&reports, 1.0), vec![vec![0, 1], vec![2]]);

        let reversed: Vec<Report> = reports.into_iter().rev().collect();
        assert_eq!(group(&reversed, 1.0), vec![vec![0, 1], vec![2]]);
    }
}
