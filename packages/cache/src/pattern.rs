//! Cache key patterns and key classification.
//!
//! Tier auto-selection and promotion are driven purely by what a key looks
//! like, so callers steer placement through their key naming:
//!
//! * `emergency` / `critical` keys are promotable into the hot tier.
//! * `report` / `cluster` keys live in the warm tier.
//! * `status` / `metrics` keys live in the cold tier and are dropped when
//!   emergency mode switches on.

use std::sync::LazyLock;

use regex::Regex;

static PROMOTABLE: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)emergency|critical"));
static REPORT_OR_CLUSTER: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)report|cluster"));
static STATUS_OR_METRICS: LazyLock<Regex> = LazyLock::new(|| compile(r"(?i)status|metrics"));

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).unwrap_or_else(|e| panic!("Invalid built-in key pattern {pattern}: {e}"))
}

/// Whether a warm/cold hit on this key is copied into the hot tier.
#[must_use]
pub fn is_promotable(key: &str) -> bool {
    PROMOTABLE.is_match(key)
}

/// Whether this key names report or cluster data.
#[must_use]
pub fn is_report_or_cluster(key: &str) -> bool {
    REPORT_OR_CLUSTER.is_match(key)
}

/// Whether this key names status or metrics data.
#[must_use]
pub fn is_status_or_metrics(key: &str) -> bool {
    STATUS_OR_METRICS.is_match(key)
}

/// Selects the keys removed by [`crate::TieredCache::invalidate`].
#[derive(Debug, Clone)]
pub enum KeyPattern {
    /// Matches keys containing the string.
    Substring(String),
    /// Matches keys the regex finds a match in.
    Regex(Regex),
}

impl KeyPattern {
    /// A pattern matching keys that contain `s`.
    #[must_use]
    pub fn substring(s: impl Into<String>) -> Self {
        Self::Substring(s.into())
    }

    /// A pattern matching keys the regex matches anywhere in.
    ///
    /// # Errors
    ///
    /// Returns the regex compile error for an invalid pattern.
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self::Regex(Regex::new(pattern)?))
    }

    /// Whether `key` matches.
    #[must_use]
    pub fn matches(&self, key: &str) -> bool {
        match self {
            Self::Substring(s) => key.contains(s.as_str()),
            Self::Regex(re) => re.is_match(key),
        }
    }
}

impl std::fmt::Display for KeyPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Substring(s) => write!(f, "*{s}*"),
            Self::Regex(re) => write!(f, "/{}/", re.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(is_promotable("emergency_alerts:US-CA"));
        assert!(is_promotable("clusters:CRITICAL"));
        assert!(!is_promotable("clusters:US-CA-34.05,-118.25"));
        assert!(is_report_or_cluster("reports:US-CA-*"));
        assert!(is_report_or_cluster("clusters:abc"));
        assert!(is_status_or_metrics("status_fire_count"));
        assert!(is_status_or_metrics("metrics:requests"));
        assert!(!is_status_or_metrics("clusters:abc"));
    }

    #[test]
    fn substring_and_regex_patterns() {
        let sub = KeyPattern::substring("US-CA-");
        assert!(sub.matches("clusters:US-CA-34.05,-118.25"));
        assert!(!sub.matches("clusters:US-OR-45.52,-122.68"));

        let re = KeyPattern::regex(r"^clusters:US-(CA|OR)-").unwrap();
        assert!(re.matches("clusters:US-OR-45.52,-122.68"));
        assert!(!re.matches("reports:US-OR-45.52,-122.68"));

        assert!(KeyPattern::regex("(").is_err());
    }
}
