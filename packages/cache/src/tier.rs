//! A single cache tier.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};
use tokio::time::Instant;

/// One of the three cache tiers.
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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum CacheTier {
    /// Short TTL, checked first, holds emergency data.
    Hot,
    /// Default tier for report and cluster data.
    Warm,
    /// Long TTL for status and metrics data.
    Cold,
}

impl CacheTier {
    /// Tiers in lookup order.
    pub const LOOKUP_ORDER: [Self; 3] = [Self::Hot, Self::Warm, Self::Cold];
}

pub struct Entry<V> {
    pub value: V,
    pub inserted_at: Instant,
    pub ttl: Duration,
    /// Insertion sequence number, used for oldest-first eviction.
    pub seq: u64,
    /// Tagged emergency/critical: promotable and spared by the warm-tier
    /// memory sweep.
    pub emergency: bool,
}

impl<V> Entry<V> {
    pub fn is_live(&self, now: Instant) -> bool {
        now < self.inserted_at + self.ttl
    }
}

pub struct Tier<V> {
    pub entries: BTreeMap<String, Entry<V>>,
    pub max_keys: usize,
}

impl<V> Tier<V> {
    pub const fn new(max_keys: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            max_keys,
        }
    }

    pub fn key_count(&self) -> usize {
        self.entries.len()
    }

    /// Returns the live entry for `key`, dropping it if it has expired.
    pub fn get_live(&mut self, key: &str, now: Instant) -> Option<&Entry<V>> {
        if self.entries.get(key).is_some_and(|e| !e.is_live(now)) {
            self.entries.remove(key);
            return None;
        }
        self.entries.get(key)
    }

    /// Inserts an entry, making room first if the tier is full. Returns the
    /// number of entries evicted to make room.
    pub fn insert(&mut self, key: String, entry: Entry<V>, now: Instant) -> usize {
        let mut evicted = 0;
        if !self.entries.contains_key(&key) && self.entries.len() >= self.max_keys {
            evicted += self.purge_expired(now);
            while self.entries.len() >= self.max_keys {
                let Some(oldest) = self.oldest_key(|_| true) else {
                    break;
                };
                self.entries.remove(&oldest);
                evicted += 1;
            }
        }
        if self.max_keys > 0 {
            self.entries.insert(key, entry);
        }
        evicted
    }

    pub fn remove(&mut self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn remove_matching(&mut self, mut predicate: impl FnMut(&str) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|k, _| !predicate(k));
        before - self.entries.len()
    }

    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, e| e.is_live(now));
        before - self.entries.len()
    }

    pub fn clear(&mut self) -> usize {
        let count = self.entries.len();
        self.entries.clear();
        count
    }

    /// The oldest-inserted key among entries accepted by `filter`.
    pub fn oldest_key(&self, filter: impl Fn(&Entry<V>) -> bool) -> Option<String> {
        self.entries
            .iter()
            .filter(|(_, e)| filter(e))
            .min_by_key(|(_, e)| e.seq)
            .map(|(k, _)| k.clone())
    }

    /// Keys accepted by `filter`, oldest insertion first.
    pub fn keys_oldest_first(&self, filter: impl Fn(&Entry<V>) -> bool) -> Vec<String> {
        let mut keyed: Vec<(u64, &String)> = self
            .entries
            .iter()
            .filter(|(_, e)| filter(e))
            .map(|(k, e)| (e.seq, k))
            .collect();
        keyed.sort_unstable_by_key(|(seq, _)| *seq);
        keyed.into_iter().map(|(_, k)| k.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(value: u32, seq: u64, ttl_secs: u64, now: Instant) -> Entry<u32> {
        Entry {
            value,
            inserted_at: now,
            ttl: Duration::from_secs(ttl_secs),
            seq,
            emergency: false,
        }
    }

    #[test]
    fn full_tier_evicts_oldest() {
        let now = Instant::now();
        let mut tier = Tier::new(2);
        tier.insert("a".to_string(), entry(1, 1, 60, now), now);
        tier.insert("b".to_string(), entry(2, 2, 60, now), now);
        let evicted = tier.insert("c".to_string(), entry(3, 3, 60, now), now);
        assert_eq!(evicted, 1);
        assert!(!tier.entries.contains_key("a"));
        assert_eq!(tier.key_count(), 2);
    }

    #[test]
    fn overwrite_does_not_evict() {
        let now = Instant::now();
        let mut tier = Tier::new(1);
        tier.insert("a".to_string(), entry(1, 1, 60, now), now);
        assert_eq!(tier.insert("a".to_string(), entry(2, 2, 60, now), now), 0);
        assert_eq!(tier.get_live("a", now).map(|e| e.value), Some(2));
    }

    #[test]
    fn expiry_is_exclusive_of_deadline() {
        let now = Instant::now();
        let mut tier = Tier::new(4);
        tier.insert("a".to_string(), entry(1, 1, 5, now), now);
        assert!(tier.get_live("a", now + Duration::from_millis(4999)).is_some());
        assert!(tier.get_live("a", now + Duration::from_secs(5)).is_none());
        assert_eq!(tier.key_count(), 0, "expired entry is dropped on read");
    }
}
