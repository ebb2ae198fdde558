//! Fixed-size grid bucketing for large inputs.

use std::collections::BTreeMap;

use hazard_map_geo::math::{GridCell, grid_cell, km_to_degrees};
use hazard_map_report_models::Report;

/// Groups reports by the grid cell they fall in. Groups appear in the order
/// their cell is first seen.
pub fn group(reports: &[Report], cell_km: f64) -> Vec<Vec<usize>> {
    let cell_deg = km_to_degrees(cell_km);
    let mut cells: BTreeMap<GridCell, usize> = BTreeMap::new();
    let mut groups: Vec<Vec<usize>> = Vec::new();

    for (i, report) in reports.iter().enumerate() {
        let cell = grid_cell(report.location, cell_deg);
        let slot = *cells.entry(cell).or_insert_with(|| {
            groups.push(Vec::new());
            groups.len() - 1
        });
        groups[slot].push(i);
    }

    groups
}

#[cfg(test)]
mod tests {
    use hazard_map_report_models::UrgencyLevel;

    use super::*;
    use crate::test_support::report;

    #[test]
    fn same_cell_groups_together() {
        let reports = vec![
            report(34.0001, -118.0001, UrgencyLevel::Low),
            report(36.0, -120.0, UrgencyLevel::Low),
            report(34.0002, -118.0002, UrgencyLevel::High),
        ];
        let groups = group(&reports, 2.0);
        assert_eq!(groups, vec![vec![0, 2], vec![1]]);
    }
}
