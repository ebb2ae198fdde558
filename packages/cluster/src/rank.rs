//! Display ordering for clusters and singletons.

use std::cmp::Reverse;

use chrono::{DateTime, Utc};
use hazard_map_cluster_models::Cluster;

/// Multiplier applied to the urgency key while emergency mode is active.
pub const EMERGENCY_URGENCY_MULTIPLIER: u16 = 2;

/// The ranking key of a cluster, compared lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PriorityKey {
    /// Highest member urgency, doubled in emergency mode.
    pub urgency: u16,
    /// Member count.
    pub size: usize,
    /// Most recent member timestamp.
    pub latest: Option<DateTime<Utc>>,
}

/// Computes the ranking key of a cluster.
#[must_use]
pub fn priority_key(cluster: &Cluster, emergency_mode: bool) -> PriorityKey {
    let multiplier = if emergency_mode {
        EMERGENCY_URGENCY_MULTIPLIER
    } else {
        1
    };
    PriorityKey {
        urgency: u16::from(cluster.highest_urgency.weight()) * multiplier,
        size: cluster.len(),
        latest: cluster.latest_timestamp(),
    }
}

/// Sorts clusters by urgency, then size, then recency, all descending.
///
/// The sort is stable, so clusters with equal keys keep their input order
/// and ranking the same input twice gives the same output.
#[must_use]
pub fn rank(mut clusters: Vec<Cluster>, emergency_mode: bool) -> Vec<Cluster> {
    clusters.sort_by_cached_key(|c| Reverse(priority_key(c, emergency_mode)));
    clusters
}
