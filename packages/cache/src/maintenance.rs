//! Background upkeep: TTL sweep, memory-pressure eviction and the
//! emergency-mode watchdog.

use std::sync::{Arc, Weak};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::{CacheError, CacheTier, TieredCache};

/// After a memory-pressure sweep the estimate is brought below this
/// fraction of the budget.
const PRESSURE_TARGET_PERCENT: u64 = 80;

fn pressure_target(budget: u64) -> u64 {
    budget.saturating_mul(PRESSURE_TARGET_PERCENT) / 100
}

/// What one maintenance pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceReport {
    /// Entries dropped because their TTL had passed.
    pub expired: usize,
    /// Entries dropped by the memory-pressure sweep.
    pub evicted: usize,
    /// Whether emergency mode was switched off for exceeding its timeout.
    pub emergency_expired: bool,
}

impl<V: Clone> TieredCache<V> {
    /// Drops every entry whose TTL has passed. Returns how many.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the cache lock is poisoned.
    pub fn purge_expired(&self) -> Result<usize, CacheError> {
        let now = Instant::now();
        let mut state = self.lock()?;
        let removed: usize = CacheTier::LOOKUP_ORDER
            .iter()
            .map(|t| state.tier_mut(*t).purge_expired(now))
            .sum();
        drop(state);
        self.stats.record_expired(removed);
        Ok(removed)
    }

    /// Estimated bytes held: total keys times the configured per-key size.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the cache lock is poisoned.
    pub fn estimated_bytes(&self) -> Result<u64, CacheError> {
        let keys = self.lock()?.total_keys() as u64;
        Ok(keys.saturating_mul(self.config.estimated_bytes_per_key))
    }

    /// Sheds entries when the estimate exceeds the memory budget.
    ///
    /// The cold tier goes first, in full. If that is not enough, warm
    /// entries not tagged emergency are evicted oldest first until the
    /// estimate is under 80% of the budget. Hot entries are never touched.
    /// Returns how many entries were evicted.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the cache lock is poisoned.
    pub fn sweep_memory_pressure(&self) -> Result<usize, CacheError> {
        let per_key = self.config.estimated_bytes_per_key;
        let budget = self.config.memory_budget_bytes;
        let target = pressure_target(budget);
        let estimate = |keys: usize| (keys as u64).saturating_mul(per_key);

        let mut state = self.lock()?;
        if estimate(state.total_keys()) <= budget {
            return Ok(0);
        }

        log::warn!(
            "Cache over memory budget ({} > {budget} bytes), evicting",
            estimate(state.total_keys())
        );

        let mut evicted = state.cold.clear();

        if estimate(state.total_keys()) > target {
            for key in state.warm.keys_oldest_first(|e| !e.emergency) {
                if estimate(state.total_keys()) <= target {
                    break;
                }
                if state.warm.remove(&key) {
                    evicted += 1;
                }
            }
        }

        let remaining = estimate(state.total_keys());
        drop(state);

        self.stats.record_evictions(evicted);
        log::info!("Memory sweep evicted {evicted} entr(ies), estimate now {remaining} bytes");
        Ok(evicted)
    }

    /// Switches emergency mode off once it has been on for the configured
    /// timeout. Returns whether it did.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the cache lock is poisoned.
    pub fn expire_emergency_mode(&self) -> Result<bool, CacheError> {
        let now = Instant::now();
        let mut state = self.lock()?;
        match state.emergency_since {
            Some(since) if now >= since + self.emergency_timeout() => {
                state.emergency_since = None;
                drop(state);
                log::warn!(
                    "Emergency mode auto-expired after {}s",
                    self.config.emergency_timeout_secs
                );
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// One full maintenance pass.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the cache lock is poisoned.
    pub fn run_maintenance(&self) -> Result<MaintenanceReport, CacheError> {
        let emergency_expired = self.expire_emergency_mode()?;
        let expired = self.purge_expired()?;
        let evicted = self.sweep_memory_pressure()?;
        Ok(MaintenanceReport {
            expired,
            evicted,
            emergency_expired,
        })
    }
}

impl<V: Clone + Send + 'static> TieredCache<V> {
    /// Spawns the periodic maintenance task on the current tokio runtime.
    ///
    /// The task holds only a weak reference and exits once the cache is
    /// dropped. Abort the returned handle to stop it sooner.
    #[must_use]
    pub fn spawn_maintenance(self: &Arc<Self>) -> JoinHandle<()> {
        let period = Duration::from_secs(self.config.sweep_interval_secs.max(1));
        let cache = Arc::downgrade(self);
        tokio::spawn(maintenance_loop(cache, period))
    }
}

async fn maintenance_loop<V: Clone + Send + 'static>(cache: Weak<TieredCache<V>>, period: Duration) {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    log::debug!("Cache maintenance started, every {}s", period.as_secs());

    loop {
        interval.tick().await;
        let Some(strong) = cache.upgrade() else {
            log::debug!("Cache dropped, maintenance stopping");
            break;
        };
        match strong.run_maintenance() {
            Ok(report) => {
                if report.expired > 0 || report.evicted > 0 {
                    log::debug!(
                        "Cache maintenance: {} expired, {} evicted",
                        report.expired,
                        report.evicted
                    );
                }
            }
            Err(e) => {
                log::error!("Cache maintenance failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use hazard_map_config::CacheConfig;

    use crate::{GetOptions, SetOptions};

    use super::*;

    fn small_budget(keys: u64) -> CacheConfig {
        CacheConfig {
            memory_budget_bytes: keys * 100,
            estimated_bytes_per_key: 100,
            ..CacheConfig::default()
        }
    }

    fn in_tier(tier: CacheTier) -> SetOptions {
        SetOptions {
            tier: Some(tier),
            ..SetOptions::default()
        }
    }

    #[test]
    fn pressure_target_keeps_precision_for_small_budgets() {
        assert_eq!(pressure_target(150), 120);
        assert_eq!(pressure_target(1000), 800);
        assert_eq!(pressure_target(u64::MAX), u64::MAX / 100);
    }

    #[test]
    fn small_budget_sweep_stops_at_eighty_percent() {
        // Budget 150 bytes at 10 bytes/key: target 120 bytes = 12 keys.
        let cache = TieredCache::new(CacheConfig {
            memory_budget_bytes: 150,
            estimated_bytes_per_key: 10,
            ..CacheConfig::default()
        });
        for i in 0..16 {
            cache.set(&format!("w{i}"), i, in_tier(CacheTier::Warm)).unwrap();
        }
        assert_eq!(cache.sweep_memory_pressure().unwrap(), 4);
        assert_eq!(cache.key_count(CacheTier::Warm).unwrap(), 12);
    }

    #[test]
    fn under_budget_sweep_is_noop() {
        let cache = TieredCache::new(small_budget(10));
        cache.set("a", 1, in_tier(CacheTier::Cold)).unwrap();
        assert_eq!(cache.sweep_memory_pressure().unwrap(), 0);
        assert_eq!(cache.key_count(CacheTier::Cold).unwrap(), 1);
    }

    #[test]
    fn sweep_flushes_cold_first() {
        let cache = TieredCache::new(small_budget(10));
        for i in 0..6 {
            cache.set(&format!("c{i}"), i, in_tier(CacheTier::Cold)).unwrap();
        }
        for i in 0..6 {
            cache.set(&format!("w{i}"), i, in_tier(CacheTier::Warm)).unwrap();
        }

        // 12 keys > 10 budget; dropping 6 cold leaves 6 <= 8.
        assert_eq!(cache.sweep_memory_pressure().unwrap(), 6);
        assert_eq!(cache.key_count(CacheTier::Cold).unwrap(), 0);
        assert_eq!(cache.key_count(CacheTier::Warm).unwrap(), 6);
    }

    #[test]
    fn sweep_evicts_oldest_untagged_warm_entries() {
        let cache = TieredCache::new(small_budget(10));
        cache.set("critical:0", 0, in_tier(CacheTier::Warm)).unwrap();
        for i in 1..12 {
            cache.set(&format!("w{i}"), i, in_tier(CacheTier::Warm)).unwrap();
        }
        for i in 0..2 {
            cache.set(&format!("h{i}"), i, in_tier(CacheTier::Hot)).unwrap();
        }

        // 14 keys, target 8: six warm entries go, oldest untagged first.
        assert_eq!(cache.sweep_memory_pressure().unwrap(), 6);
        assert_eq!(cache.key_count(CacheTier::Hot).unwrap(), 2);
        assert_eq!(cache.key_count(CacheTier::Warm).unwrap(), 6);
        let warm_only = GetOptions {
            tier: Some(CacheTier::Warm),
            ..GetOptions::default()
        };
        assert!(cache.get("critical:0", warm_only).unwrap().is_some());
        assert!(cache.get("w1", warm_only).unwrap().is_none());
        assert!(cache.get("w6", warm_only).unwrap().is_none());
        assert!(cache.get("w7", warm_only).unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn purge_expired_counts() {
        let cache = TieredCache::new(CacheConfig::default());
        let short = SetOptions {
            ttl: Some(Duration::from_secs(5)),
            ..SetOptions::default()
        };
        cache.set("a", 1, short).unwrap();
        cache.set("b", 2, SetOptions::default()).unwrap();
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_eq!(cache.purge_expired().unwrap(), 1);
        assert_eq!(cache.stats().snapshot().expired, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn watchdog_clears_emergency_mode() {
        let cache = TieredCache::<u32>::new(CacheConfig::default());
        cache.set_emergency_mode(true).unwrap();
        assert!(!cache.expire_emergency_mode().unwrap());
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(cache.expire_emergency_mode().unwrap());
        assert!(!cache.is_emergency_mode().unwrap());
        assert!(!cache.expire_emergency_mode().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_task_runs_and_stops_with_cache() {
        let cache = Arc::new(TieredCache::new(CacheConfig::default()));
        let short = SetOptions {
            ttl: Some(Duration::from_secs(1)),
            ..SetOptions::default()
        };
        cache.set("a", 1, short).unwrap();
        cache.set_emergency_mode(true).unwrap();

        let handle = cache.spawn_maintenance();
        tokio::time::sleep(Duration::from_secs(3601)).await;

        assert_eq!(cache.key_count(CacheTier::Warm).unwrap(), 0);
        assert!(!cache.is_emergency_mode().unwrap());
        assert!(cache.stats().snapshot().expired >= 1);

        drop(cache);
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert!(handle.is_finished());
    }
}
