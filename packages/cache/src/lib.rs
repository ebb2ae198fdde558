#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Tiered TTL cache for hazard map queries.
//!
//! Three tiers with independent TTLs and key limits:
//!
//! | Tier | Normal TTL | Holds |
//! |------|-----------|-------|
//! | hot  | 30s   | emergency data, promoted entries |
//! | warm | 300s  | report and cluster data (the default) |
//! | cold | 1800s | status and metrics |
//!
//! Entries expire lazily on read and are swept by a background task (see
//! [`TieredCache::spawn_maintenance`]), which also runs the memory-pressure
//! sweep and switches emergency mode off after its timeout.
//!
//! All state, including the emergency-mode flag, sits behind one mutex, so
//! concurrent requests and the maintenance task never observe a torn write.
//! A poisoned mutex surfaces as [`CacheError::Unavailable`].

mod maintenance;
pub mod pattern;
pub mod stats;
mod tier;

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use hazard_map_config::CacheConfig;
use tokio::time::Instant;

pub use maintenance::MaintenanceReport;
pub use pattern::KeyPattern;
pub use stats::{CacheStats, CacheStatsSnapshot};
pub use tier::CacheTier;

use tier::{Entry, Tier};

/// Errors from cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// The cache cannot currently serve requests.
    #[error("Cache unavailable: {message}")]
    Unavailable {
        /// What went wrong.
        message: String,
    },
}

/// Options for [`TieredCache::get`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GetOptions {
    /// Read a single tier, or `None` to check hot, warm, then cold.
    pub tier: Option<CacheTier>,
    /// Promote a warm/cold hit into the hot tier even if the key is not
    /// tagged emergency.
    pub emergency_priority: bool,
}

/// Options for [`TieredCache::set`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SetOptions {
    /// Write to a specific tier, or `None` to choose from the key and mode.
    pub tier: Option<CacheTier>,
    /// Override the tier's TTL.
    pub ttl: Option<Duration>,
    /// Emergency data: goes to the hot tier (or is also copied there when
    /// an explicit colder tier is requested) and is spared by the memory
    /// sweep.
    pub emergency_priority: bool,
}

/// The cache operations the clustering service relies on.
///
/// Implemented by [`TieredCache`]; other implementations let callers swap
/// in a remote cache or a test double.
pub trait CacheBackend<V>: Send + Sync {
    /// See [`TieredCache::get`].
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache is unavailable.
    fn get(&self, key: &str, opts: GetOptions) -> Result<Option<V>, CacheError>;

    /// See [`TieredCache::set`].
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache is unavailable.
    fn set(&self, key: &str, value: V, opts: SetOptions) -> Result<(), CacheError>;

    /// See [`TieredCache::invalidate`].
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache is unavailable.
    fn invalidate(&self, pattern: &KeyPattern) -> Result<usize, CacheError>;

    /// See [`TieredCache::set_emergency_mode`].
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache is unavailable.
    fn set_emergency_mode(&self, enabled: bool) -> Result<(), CacheError>;

    /// See [`TieredCache::is_emergency_mode`].
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the cache is unavailable.
    fn is_emergency_mode(&self) -> Result<bool, CacheError>;
}

struct State<V> {
    hot: Tier<V>,
    warm: Tier<V>,
    cold: Tier<V>,
    /// When emergency mode was switched on, if it is on.
    emergency_since: Option<Instant>,
    next_seq: u64,
}

impl<V> State<V> {
    const fn tier(&self, tier: CacheTier) -> &Tier<V> {
        match tier {
            CacheTier::Hot => &self.hot,
            CacheTier::Warm => &self.warm,
            CacheTier::Cold => &self.cold,
        }
    }

    const fn tier_mut(&mut self, tier: CacheTier) -> &mut Tier<V> {
        match tier {
            CacheTier::Hot => &mut self.hot,
            CacheTier::Warm => &mut self.warm,
            CacheTier::Cold => &mut self.cold,
        }
    }

    const fn next_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn total_keys(&self) -> usize {
        self.hot.key_count() + self.warm.key_count() + self.cold.key_count()
    }

    fn remove_matching(&mut self, mut predicate: impl FnMut(&str) -> bool) -> usize {
        CacheTier::LOOKUP_ORDER
            .iter()
            .map(|t| self.tier_mut(*t).remove_matching(&mut predicate))
            .sum()
    }
}

/// Three-tier TTL cache with emergency-mode support.
pub struct TieredCache<V> {
    state: Mutex<State<V>>,
    config: CacheConfig,
    stats: CacheStats,
}

impl<V: Clone> TieredCache<V> {
    /// Creates an empty cache.
    #[must_use]
    pub fn new(config: CacheConfig) -> Self {
        Self {
            state: Mutex::new(State {
                hot: Tier::new(config.hot_max_keys),
                warm: Tier::new(config.warm_max_keys),
                cold: Tier::new(config.cold_max_keys),
                emergency_since: None,
                next_seq: 0,
            }),
            config,
            stats: CacheStats::default(),
        }
    }

    /// The configuration this cache was built with.
    #[must_use]
    pub const fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Hit/miss/eviction counters.
    #[must_use]
    pub const fn stats(&self) -> &CacheStats {
        &self.stats
    }

    fn lock(&self) -> Result<MutexGuard<'_, State<V>>, CacheError> {
        self.state.lock().map_err(|_| CacheError::Unavailable {
            message: "cache state mutex poisoned".to_string(),
        })
    }

    fn emergency_timeout(&self) -> Duration {
        Duration::from_secs(self.config.emergency_timeout_secs)
    }

    /// Whether emergency mode is on at `now`. A mode past its timeout counts
    /// as off even before the watchdog has cleared it.
    fn emergency_active(&self, state: &State<V>, now: Instant) -> bool {
        state
            .emergency_since
            .is_some_and(|since| now < since + self.emergency_timeout())
    }

    /// The TTL used for writes to `tier` that do not specify one.
    #[must_use]
    pub const fn default_ttl(&self, tier: CacheTier, emergency: bool) -> Duration {
        let secs = match (tier, emergency) {
            (CacheTier::Hot, false) => self.config.hot_ttl_secs,
            (CacheTier::Warm, false) => self.config.warm_ttl_secs,
            (CacheTier::Cold, false) => self.config.cold_ttl_secs,
            (CacheTier::Hot, true) => self.config.emergency_hot_ttl_secs,
            (CacheTier::Warm, true) => self.config.emergency_warm_ttl_secs,
            (CacheTier::Cold, true) => self.config.emergency_cold_ttl_secs,
        };
        Duration::from_secs(secs)
    }

    /// Picks a tier for `key`: emergency ⇒ hot, report/cluster ⇒ warm,
    /// status/metrics ⇒ cold, anything else ⇒ warm.
    #[must_use]
    pub fn select_tier(key: &str, emergency: bool) -> CacheTier {
        if emergency {
            CacheTier::Hot
        } else if pattern::is_report_or_cluster(key) {
            CacheTier::Warm
        } else if pattern::is_status_or_metrics(key) {
            CacheTier::Cold
        } else {
            CacheTier::Warm
        }
    }

    /// Reads `key`. A miss is `Ok(None)`.
    ///
    /// With `tier: None`, tiers are checked hot → warm → cold. A warm or
    /// cold hit on an emergency-tagged entry (or any hit when
    /// `emergency_priority` is set) is also copied into the hot tier with
    /// the emergency hot TTL.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the cache lock is poisoned.
    pub fn get(&self, key: &str, opts: GetOptions) -> Result<Option<V>, CacheError> {
        let now = Instant::now();
        let mut state = self.lock()?;

        let tiers: &[CacheTier] = match &opts.tier {
            Some(tier) => std::slice::from_ref(tier),
            None => &CacheTier::LOOKUP_ORDER,
        };

        for &tier in tiers {
            let Some(entry) = state.tier_mut(tier).get_live(key, now) else {
                continue;
            };
            let value = entry.value.clone();
            let promote = opts.tier.is_none()
                && tier != CacheTier::Hot
                && (entry.emergency || pattern::is_promotable(key) || opts.emergency_priority);

            if promote {
                let seq = state.next_seq();
                let evicted = state.hot.insert(
                    key.to_string(),
                    Entry {
                        value: value.clone(),
                        inserted_at: now,
                        ttl: self.default_ttl(CacheTier::Hot, true),
                        seq,
                        emergency: true,
                    },
                    now,
                );
                self.stats.record_evictions(evicted);
                self.stats.record_promotion();
                log::trace!("Promoted {key} from {tier} to hot");
            }

            self.stats.record_hit();
            return Ok(Some(value));
        }

        self.stats.record_miss();
        Ok(None)
    }

    /// Writes `key`.
    ///
    /// The key is first removed from every tier so it lives only where it is
    /// written now. An `emergency_priority` write to a tier other than hot
    /// is additionally copied into hot. Unspecified TTLs use the tier's
    /// emergency TTL while emergency mode is on.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the cache lock is poisoned.
    pub fn set(&self, key: &str, value: V, opts: SetOptions) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut state = self.lock()?;
        let emergency_mode = self.emergency_active(&state, now);

        let tier = opts
            .tier
            .unwrap_or_else(|| Self::select_tier(key, opts.emergency_priority || emergency_mode));
        let ttl = opts
            .ttl
            .unwrap_or_else(|| self.default_ttl(tier, emergency_mode));
        let tagged = opts.emergency_priority || pattern::is_promotable(key);

        state.remove_matching(|k| k == key);

        let mut evicted = 0;
        if opts.emergency_priority && tier != CacheTier::Hot {
            let seq = state.next_seq();
            evicted += state.hot.insert(
                key.to_string(),
                Entry {
                    value: value.clone(),
                    inserted_at: now,
                    ttl: self.default_ttl(CacheTier::Hot, emergency_mode),
                    seq,
                    emergency: true,
                },
                now,
            );
        }

        let seq = state.next_seq();
        evicted += state.tier_mut(tier).insert(
            key.to_string(),
            Entry {
                value,
                inserted_at: now,
                ttl,
                seq,
                emergency: tagged,
            },
            now,
        );

        self.stats.record_write();
        self.stats.record_evictions(evicted);
        log::trace!("Cached {key} in {tier} for {}s", ttl.as_secs());
        Ok(())
    }

    /// Removes every key in every tier matching `pattern`. Returns how many
    /// entries were removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the cache lock is poisoned.
    pub fn invalidate(&self, pattern: &KeyPattern) -> Result<usize, CacheError> {
        let removed = self.lock()?.remove_matching(|k| pattern.matches(k));
        self.stats.record_invalidated(removed);
        if removed > 0 {
            log::debug!("Invalidated {removed} cache entr(ies) matching {pattern}");
        }
        Ok(removed)
    }

    /// Switches emergency mode on or off.
    ///
    /// Switching on drops every status/metrics key immediately and starts
    /// the auto-expiry clock (enabling while already on restarts it).
    /// Subsequent writes without an explicit TTL use the emergency TTLs.
    /// Switching off restores normal TTLs for later writes; entries already
    /// written keep the TTL they were written with.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the cache lock is poisoned.
    pub fn set_emergency_mode(&self, enabled: bool) -> Result<(), CacheError> {
        let now = Instant::now();
        let mut state = self.lock()?;
        let was_active = self.emergency_active(&state, now);

        if enabled {
            state.emergency_since = Some(now);
            if !was_active {
                let removed = state.remove_matching(pattern::is_status_or_metrics);
                self.stats.record_invalidated(removed);
                log::warn!(
                    "Emergency mode enabled: dropped {removed} status/metrics entr(ies), \
                     auto-expires in {}s",
                    self.config.emergency_timeout_secs
                );
            }
        } else {
            state.emergency_since = None;
            if was_active {
                log::info!("Emergency mode disabled");
            }
        }
        Ok(())
    }

    /// Whether emergency mode is currently on.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the cache lock is poisoned.
    pub fn is_emergency_mode(&self) -> Result<bool, CacheError> {
        let state = self.lock()?;
        Ok(self.emergency_active(&state, Instant::now()))
    }

    /// Number of keys currently stored in `tier`, expired or not.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Unavailable`] if the cache lock is poisoned.
    pub fn key_count(&self, tier: CacheTier) -> Result<usize, CacheError> {
        Ok(self.lock()?.tier(tier).key_count())
    }
}

impl<V: Clone + Send> CacheBackend<V> for TieredCache<V> {
    fn get(&self, key: &str, opts: GetOptions) -> Result<Option<V>, CacheError> {
        Self::get(self, key, opts)
    }

    fn set(&self, key: &str, value: V, opts: SetOptions) -> Result<(), CacheError> {
        Self::set(self, key, value, opts)
    }

    fn invalidate(&self, pattern: &KeyPattern) -> Result<usize, CacheError> {
        Self::invalidate(self, pattern)
    }

    fn set_emergency_mode(&self, enabled: bool) -> Result<(), CacheError> {
        Self::set_emergency_mode(self, enabled)
    }

    fn is_emergency_mode(&self) -> Result<bool, CacheError> {
        Self::is_emergency_mode(self)
    }
}
