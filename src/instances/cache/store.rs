//! Tiered cache logic
//!
//! `TieredCache` keeps every key in exactly one tier. Writes land in memory,
//! overflow is demoted one tier down, repeated hits on a slower tier promote
//! the entry back to memory. Time is passed in so expiry is testable.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::core::component::ComponentError;
use crate::core::metrics::{CACHE_EVICTIONS, CACHE_HITS, CACHE_MISSES};

use super::compression;
use super::eviction::select_victim;
use super::models::*;
use super::tier::{DiskTier, DistributedTier, MemoryTier, TierStore};

/// One entry of a bulk load
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WarmEntry {
    pub key: String,
    pub value: serde_json::Value,
    #[serde(default)]
    pub ttl_secs: Option<u64>,
}

#[derive(Debug, Clone, Default)]
struct Counters {
    memory_hits: u64,
    disk_hits: u64,
    distributed_hits: u64,
    misses: u64,
    sets: u64,
    deletes: u64,
    evictions: u64,
    expirations: u64,
    promotions: u64,
    demotions: u64,
    compressed_entries: u64,
    bytes_saved: u64,
}

#[derive(Debug)]
pub struct TieredCache {
    config: CacheConfig,
    policy: EvictionPolicy,
    weights: AdaptiveWeights,
    memory: MemoryTier,
    disk: DiskTier,
    distributed: DistributedTier,
    /// Logical clock for insertion and access order
    clock: u64,
    counters: Counters,
}

impl TieredCache {
    pub fn new(config: CacheConfig) -> Result<Self, ComponentError> {
        config.validate()?;

        let disk = DiskTier::open(config.disk_path.as_deref())?;
        let clock = disk.max_sequence()?;
        let weights = config.adaptive_weights.normalized()?;

        Ok(Self {
            policy: config.eviction_policy,
            weights,
            memory: MemoryTier::new(),
            disk,
            distributed: DistributedTier::new(config.distributed_nodes),
            clock,
            counters: Counters::default(),
            config,
        })
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    pub fn policy(&self) -> EvictionPolicy {
        self.policy
    }

    pub fn set_eviction_policy(&mut self, policy: EvictionPolicy) {
        self.policy = policy;
    }

    pub fn weights(&self) -> AdaptiveWeights {
        self.weights
    }

    /// Validate, normalize and apply new adaptive weights
    pub fn update_adaptive_weights(&mut self, weights: AdaptiveWeights) -> Result<AdaptiveWeights, ComponentError> {
        self.weights = weights.normalized()?;
        Ok(self.weights)
    }

    pub fn set_distributed_node_online(&mut self, node: usize, online: bool) -> Result<(), ComponentError> {
        self.distributed.set_online(node, online)
    }

    fn next_seq(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    fn store(&self, tier: CacheTier) -> &dyn TierStore {
        match tier {
            CacheTier::Memory => &self.memory,
            CacheTier::Disk => &self.disk,
            CacheTier::Distributed => &self.distributed,
        }
    }

    fn store_mut(&mut self, tier: CacheTier) -> &mut dyn TierStore {
        match tier {
            CacheTier::Memory => &mut self.memory,
            CacheTier::Disk => &mut self.disk,
            CacheTier::Distributed => &mut self.distributed,
        }
    }

    fn capacity_exceeded(&self, tier: CacheTier) -> Result<bool, ComponentError> {
        let store = self.store(tier);
        Ok(match tier {
            CacheTier::Memory => {
                store.len()? > self.config.memory_capacity || store.size_bytes()? > self.config.memory_max_bytes
            }
            CacheTier::Disk => store.len()? > self.config.disk_capacity,
            CacheTier::Distributed => store.len()? > self.config.distributed_capacity,
        })
    }

    /// Store `value` under `key` in memory, demoting overflow
    pub fn set(
        &mut self,
        key: &str,
        value: &serde_json::Value,
        ttl_secs: Option<u64>,
        now: DateTime<Utc>,
    ) -> Result<(), ComponentError> {
        if key.is_empty() {
            return Err(ComponentError::ValidationError("Cache key must not be empty".to_string()));
        }

        let expires_at = match ttl_secs.or(self.config.default_ttl_secs) {
            Some(secs) => expiry_after(now, secs)?,
            None => None,
        };

        let raw = serde_json::to_vec(value)?;
        let original_size = raw.len() as u64;
        let (data, compressed) = compression::maybe_compress(
            raw,
            self.config.compression_enabled,
            self.config.compression_threshold_bytes,
        )?;
        if compressed {
            self.counters.compressed_entries += 1;
            self.counters.bytes_saved += original_size.saturating_sub(data.len() as u64);
        }

        self.disk.remove(key)?;
        self.distributed.remove(key)?;

        let seq = self.next_seq();
        let entry = CacheEntry::new(key, data, compressed, original_size, now, expires_at, seq);
        self.memory.put(entry)?;
        self.counters.sets += 1;

        self.rebalance(now)
    }

    /// Look a key up tier by tier, recording the hit and promoting when due
    pub fn get(&mut self, key: &str, now: DateTime<Utc>) -> Result<Option<serde_json::Value>, ComponentError> {
        for tier in CacheTier::ALL {
            let Some(mut entry) = self.store_mut(tier).get(key)? else { continue };

            if entry.is_expired(now) {
                self.store_mut(tier).remove(key)?;
                self.counters.expirations += 1;
                debug!("Cache entry {} expired in {} tier", key, tier);
                continue;
            }

            let value = entry.decode()?;
            entry.access_count += 1;
            entry.last_accessed = now;
            entry.accessed_seq = self.next_seq();
            self.record_hit(tier);

            if tier != CacheTier::Memory && entry.access_count >= self.config.promotion_threshold {
                self.store_mut(tier).remove(key)?;
                self.memory.put(entry)?;
                self.counters.promotions += 1;
                debug!("Promoted {} from {} tier to memory", key, tier);
                self.rebalance(now)?;
            } else {
                self.store_mut(tier).put(entry)?;
            }

            return Ok(Some(value));
        }

        self.counters.misses += 1;
        CACHE_MISSES.inc();
        Ok(None)
    }

    fn record_hit(&mut self, tier: CacheTier) {
        match tier {
            CacheTier::Memory => self.counters.memory_hits += 1,
            CacheTier::Disk => self.counters.disk_hits += 1,
            CacheTier::Distributed => self.counters.distributed_hits += 1,
        }
        CACHE_HITS.with_label_values(&[tier.as_str()]).inc();
    }

    /// Remove a key from every tier
    pub fn delete(&mut self, key: &str) -> Result<bool, ComponentError> {
        let mut found = false;
        for tier in CacheTier::ALL {
            found |= self.store_mut(tier).remove(key)?.is_some();
        }
        if found {
            self.counters.deletes += 1;
        }
        Ok(found)
    }

    /// Presence check without touching recency or statistics
    pub fn exists(&self, key: &str, now: DateTime<Utc>) -> Result<bool, ComponentError> {
        Ok(self.tier_of(key, now)?.is_some())
    }

    /// Tier holding a live copy of `key`
    pub fn tier_of(&self, key: &str, now: DateTime<Utc>) -> Result<Option<CacheTier>, ComponentError> {
        for tier in CacheTier::ALL {
            if let Some(entry) = self.store(tier).peek(key)? {
                if !entry.is_expired(now) {
                    return Ok(Some(tier));
                }
            }
        }
        Ok(None)
    }

    pub fn clear(&mut self) -> Result<(), ComponentError> {
        for tier in CacheTier::ALL {
            self.store_mut(tier).clear()?;
        }
        Ok(())
    }

    /// Drop expired entries from every tier, returning how many were removed
    pub fn cleanup_expired(&mut self, now: DateTime<Utc>) -> Result<usize, ComponentError> {
        let mut removed = 0;
        for tier in CacheTier::ALL {
            let expired: Vec<String> = self.store(tier)
                .metadata()?
                .into_iter()
                .filter(|m| m.is_expired(now))
                .map(|m| m.key)
                .collect();

            for key in expired {
                if self.store_mut(tier).remove(&key)?.is_some() {
                    removed += 1;
                }
            }
        }

        self.counters.expirations += removed as u64;
        if removed > 0 {
            debug!("Removed {} expired cache entries", removed);
        }
        Ok(removed)
    }

    /// Bulk load, returning the number of entries written
    pub fn warm(&mut self, entries: Vec<WarmEntry>, now: DateTime<Utc>) -> Result<usize, ComponentError> {
        let mut written = 0;
        for entry in entries {
            self.set(&entry.key, &entry.value, entry.ttl_secs, now)?;
            written += 1;
        }
        Ok(written)
    }

    /// Push overflow down the tiers until every tier is within its limits
    fn rebalance(&mut self, now: DateTime<Utc>) -> Result<(), ComponentError> {
        for tier in CacheTier::ALL {
            while self.capacity_exceeded(tier)? {
                let Some(victim) = self.choose_victim(tier, now)? else { break };
                let Some(entry) = self.store_mut(tier).remove(&victim)? else { break };

                if entry.is_expired(now) {
                    self.counters.expirations += 1;
                    continue;
                }

                match tier.next_slower() {
                    Some(lower) => self.demote(entry, lower)?,
                    None => {
                        self.record_eviction(tier);
                        debug!("Evicted {} from the cache", victim);
                    }
                }
            }
        }
        Ok(())
    }

    fn demote(&mut self, entry: CacheEntry, to: CacheTier) -> Result<(), ComponentError> {
        let key = entry.key.clone();
        match self.store_mut(to).put(entry) {
            Ok(()) => {
                self.counters.demotions += 1;
                debug!("Demoted {} to {} tier", key, to);
                Ok(())
            }
            Err(ComponentError::ResourceError(reason)) => {
                warn!("Dropping {} instead of demoting it: {}", key, reason);
                self.record_eviction(to);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// An entry left the cache entirely; `tier` is where it was dropped
    fn record_eviction(&mut self, tier: CacheTier) {
        self.counters.evictions += 1;
        CACHE_EVICTIONS.with_label_values(&[tier.as_str()]).inc();
    }

    fn choose_victim(&self, tier: CacheTier, now: DateTime<Utc>) -> Result<Option<String>, ComponentError> {
        let store = self.store(tier);
        if self.policy == EvictionPolicy::Lru {
            if let Some(key) = store.lru_candidate() {
                return Ok(Some(key));
            }
        }
        Ok(select_victim(self.policy, &store.metadata()?, now, &self.weights))
    }

    pub fn stats(&self) -> Result<CacheStats, ComponentError> {
        let c = &self.counters;
        let hits = c.memory_hits + c.disk_hits + c.distributed_hits;
        let lookups = hits + c.misses;

        Ok(CacheStats {
            eviction_policy: self.policy,
            memory_hits: c.memory_hits,
            disk_hits: c.disk_hits,
            distributed_hits: c.distributed_hits,
            misses: c.misses,
            sets: c.sets,
            deletes: c.deletes,
            evictions: c.evictions,
            expirations: c.expirations,
            promotions: c.promotions,
            demotions: c.demotions,
            compressed_entries: c.compressed_entries,
            bytes_saved: c.bytes_saved,
            memory_entries: self.memory.len()?,
            disk_entries: self.disk.len()?,
            distributed_entries: self.distributed.len()?,
            distributed_nodes_online: (0..self.distributed.node_count())
                .filter(|&node| self.distributed.is_online(node))
                .count(),
            memory_bytes: self.memory.size_bytes()?,
            hit_rate: if lookups > 0 { hits as f64 / lookups as f64 } else { 0.0 },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 9, 0, 0).unwrap()
    }

    fn small_config() -> CacheConfig {
        CacheConfig {
            memory_capacity: 2,
            disk_capacity: 2,
            distributed_capacity: 2,
            distributed_nodes: 2,
            compression_threshold_bytes: 64,
            promotion_threshold: 2,
            ..CacheConfig::default()
        }
    }

    fn cache(config: CacheConfig) -> TieredCache {
        TieredCache::new(config).unwrap()
    }

    fn assert_single_tier(cache: &TieredCache, key: &str) {
        let copies = CacheTier::ALL
            .iter()
            .filter(|t| cache.store(**t).contains(key).unwrap())
            .count();
        assert!(copies <= 1, "{} is held by {} tiers", key, copies);
    }

    #[test]
    fn test_set_get_delete() {
        let mut cache = cache(CacheConfig::default());
        cache.set("user:1", &json!({"name": "Ada"}), None, t0()).unwrap();

        assert_eq!(cache.get("user:1", t0()).unwrap(), Some(json!({"name": "Ada"})));
        assert_eq!(cache.get("user:2", t0()).unwrap(), None);
        assert!(cache.delete("user:1").unwrap());
        assert!(!cache.delete("user:1").unwrap());

        let stats = cache.stats().unwrap();
        assert_eq!((stats.memory_hits, stats.misses, stats.sets, stats.deletes), (1, 1, 1, 1));
        assert!((stats.hit_rate - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_overflow_cascades_down_the_tiers() {
        let mut cache = cache(small_config());
        for i in 0..7 {
            cache.set(&format!("k{}", i), &json!(i), None, t0()).unwrap();
        }

        let stats = cache.stats().unwrap();
        assert_eq!(stats.memory_entries, 2);
        assert_eq!(stats.disk_entries, 2);
        assert_eq!(stats.distributed_entries, 2);
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.demotions, 8);
        // Demotions are not evictions, and memory always has a tier below it
        assert_eq!(CACHE_EVICTIONS.with_label_values(&["memory"]).get(), 0);
        assert!(CACHE_EVICTIONS.with_label_values(&["distributed"]).get() >= 1);

        // Oldest entries moved furthest
        assert_eq!(cache.tier_of("k0", t0()).unwrap(), None);
        assert_eq!(cache.tier_of("k1", t0()).unwrap(), Some(CacheTier::Distributed));
        assert_eq!(cache.tier_of("k3", t0()).unwrap(), Some(CacheTier::Disk));
        assert_eq!(cache.tier_of("k6", t0()).unwrap(), Some(CacheTier::Memory));
    }

    #[test]
    fn test_repeated_hits_promote_to_memory() {
        let mut cache = cache(small_config());
        for i in 0..4 {
            cache.set(&format!("k{}", i), &json!(i), None, t0()).unwrap();
        }
        assert_eq!(cache.tier_of("k0", t0()).unwrap(), Some(CacheTier::Disk));

        assert_eq!(cache.get("k0", t0()).unwrap(), Some(json!(0)));
        assert_eq!(cache.tier_of("k0", t0()).unwrap(), Some(CacheTier::Disk));

        cache.get("k0", t0()).unwrap();
        assert_eq!(cache.tier_of("k0", t0()).unwrap(), Some(CacheTier::Memory));

        let stats = cache.stats().unwrap();
        assert_eq!(stats.disk_hits, 2);
        assert_eq!(stats.promotions, 1);
        assert_eq!(stats.memory_entries, 2);
        for i in 0..4 {
            assert_single_tier(&cache, &format!("k{}", i));
        }
    }

    #[test]
    fn test_promotion_into_full_memory_demotes_one_entry() {
        let mut cache = cache(small_config());
        for i in 0..4 {
            cache.set(&format!("k{}", i), &json!(i), None, t0()).unwrap();
        }
        assert_eq!(cache.tier_of("k1", t0()).unwrap(), Some(CacheTier::Disk));

        cache.get("k1", t0()).unwrap();
        cache.get("k1", t0()).unwrap();

        assert_eq!(cache.tier_of("k1", t0()).unwrap(), Some(CacheTier::Memory));
        assert_eq!(cache.tier_of("k2", t0()).unwrap(), Some(CacheTier::Disk));
        assert_eq!(cache.tier_of("k3", t0()).unwrap(), Some(CacheTier::Memory));
        assert_eq!(cache.tier_of("k0", t0()).unwrap(), Some(CacheTier::Disk));
        for i in 0..4 {
            assert_single_tier(&cache, &format!("k{}", i));
        }

        let stats = cache.stats().unwrap();
        assert_eq!((stats.promotions, stats.demotions, stats.evictions), (1, 3, 0));
        assert_eq!((stats.memory_entries, stats.disk_entries), (2, 2));
    }

    #[test]
    fn test_adaptive_policy_demotes_largest_entry() {
        let config = CacheConfig { compression_enabled: false, ..small_config() };
        let mut cache = cache(config);
        cache.set_eviction_policy(EvictionPolicy::Adaptive);
        cache
            .update_adaptive_weights(AdaptiveWeights { recency: 0.0, frequency: 0.0, size: 1.0 })
            .unwrap();

        cache.set("small-old", &json!(1), None, t0()).unwrap();
        cache.set("large-new", &json!("x".repeat(8 * 1024)), None, t0() + Duration::seconds(1)).unwrap();
        cache.set("small-new", &json!(2), None, t0() + Duration::seconds(2)).unwrap();

        // LRU would have picked small-old
        let later = t0() + Duration::seconds(3);
        assert_eq!(cache.tier_of("large-new", later).unwrap(), Some(CacheTier::Disk));
        assert_eq!(cache.tier_of("small-old", later).unwrap(), Some(CacheTier::Memory));
        assert_eq!(cache.tier_of("small-new", later).unwrap(), Some(CacheTier::Memory));
        assert_eq!(cache.stats().unwrap().demotions, 1);
    }

    #[test]
    fn test_out_of_range_ttl_is_rejected() {
        let mut cache = cache(CacheConfig::default());
        for ttl in [10_000_000_000_000, u64::MAX] {
            let err = cache.set("k", &json!(1), Some(ttl), t0()).unwrap_err();
            assert!(matches!(err, ComponentError::ValidationError(_)));
        }

        assert!(!cache.exists("k", t0()).unwrap());
        assert_eq!(cache.stats().unwrap().sets, 0);
    }

    #[test]
    fn test_rewrite_moves_key_back_to_memory() {
        let mut cache = cache(small_config());
        for i in 0..4 {
            cache.set(&format!("k{}", i), &json!(i), None, t0()).unwrap();
        }
        cache.set("k0", &json!("fresh"), None, t0()).unwrap();

        assert_eq!(cache.tier_of("k0", t0()).unwrap(), Some(CacheTier::Memory));
        assert_single_tier(&cache, "k0");
        assert_eq!(cache.get("k0", t0()).unwrap(), Some(json!("fresh")));
    }

    #[test]
    fn test_ttl_expiry() {
        let mut cache = cache(CacheConfig { default_ttl_secs: Some(60), ..CacheConfig::default() });
        cache.set("short", &json!(1), Some(5), t0()).unwrap();
        cache.set("default", &json!(2), None, t0()).unwrap();
        cache.set("forever", &json!(3), Some(0), t0()).unwrap();

        let later = t0() + Duration::seconds(10);
        assert!(!cache.exists("short", later).unwrap());
        assert_eq!(cache.get("short", later).unwrap(), None);
        assert_eq!(cache.get("default", later).unwrap(), Some(json!(2)));

        let much_later = t0() + Duration::days(365);
        assert_eq!(cache.cleanup_expired(much_later).unwrap(), 1);
        assert!(cache.exists("forever", much_later).unwrap());

        let stats = cache.stats().unwrap();
        assert_eq!(stats.expirations, 2);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_exists_has_no_side_effects() {
        let mut cache = cache(small_config());
        cache.set("a", &json!(1), None, t0()).unwrap();
        cache.set("b", &json!(2), None, t0()).unwrap();

        assert!(cache.exists("a", t0()).unwrap());
        cache.set("c", &json!(3), None, t0()).unwrap();

        // `a` is still the least recently used entry
        assert_eq!(cache.tier_of("a", t0()).unwrap(), Some(CacheTier::Disk));
        assert_eq!(cache.stats().unwrap().memory_hits, 0);
    }

    #[test]
    fn test_lfu_and_fifo_policies() {
        let mut cache = cache(small_config());
        cache.set_eviction_policy(EvictionPolicy::Lfu);
        cache.set("hot", &json!(1), None, t0()).unwrap();
        cache.set("cold", &json!(2), None, t0()).unwrap();
        cache.get("hot", t0()).unwrap();
        cache.set("new", &json!(3), None, t0()).unwrap();
        assert_eq!(cache.tier_of("cold", t0()).unwrap(), Some(CacheTier::Disk));

        let mut cache = self::cache(small_config());
        cache.set_eviction_policy(EvictionPolicy::Fifo);
        cache.set("first", &json!(1), None, t0()).unwrap();
        cache.set("second", &json!(2), None, t0()).unwrap();
        cache.get("first", t0()).unwrap();
        cache.set("third", &json!(3), None, t0()).unwrap();
        assert_eq!(cache.tier_of("first", t0()).unwrap(), Some(CacheTier::Disk));
    }

    #[test]
    fn test_byte_limit_demotes() {
        let config = CacheConfig { memory_max_bytes: 10, compression_enabled: false, ..CacheConfig::default() };
        let mut cache = cache(config);
        cache.set("big", &json!("0123456789abcdef"), None, t0()).unwrap();

        assert_eq!(cache.tier_of("big", t0()).unwrap(), Some(CacheTier::Disk));
        assert_eq!(cache.get("big", t0()).unwrap(), Some(json!("0123456789abcdef")));
    }

    #[test]
    fn test_compression_is_transparent() {
        let mut cache = cache(small_config());
        let payload = json!({ "text": "granger ".repeat(200) });
        cache.set("doc", &payload, None, t0()).unwrap();

        let stats = cache.stats().unwrap();
        assert_eq!(stats.compressed_entries, 1);
        assert!(stats.bytes_saved > 0);
        assert_eq!(cache.get("doc", t0()).unwrap(), Some(payload));
    }

    #[test]
    fn test_offline_distributed_nodes() {
        let config = CacheConfig { disk_capacity: 0, distributed_nodes: 1, ..small_config() };
        let mut cache = cache(config);
        cache.set_distributed_node_online(0, false).unwrap();

        for i in 0..3 {
            cache.set(&format!("k{}", i), &json!(i), None, t0()).unwrap();
        }
        // The demoted entry had nowhere to go
        let stats = cache.stats().unwrap();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.distributed_entries, 0);
        assert_eq!(stats.distributed_nodes_online, 0);
        assert!(cache.set_distributed_node_online(3, true).is_err());
    }

    #[test]
    fn test_adaptive_weights_update() {
        let mut cache = cache(CacheConfig::default());
        let applied = cache
            .update_adaptive_weights(AdaptiveWeights { recency: 1.0, frequency: 1.0, size: 0.0 })
            .unwrap();
        assert!((applied.recency - 0.5).abs() < 1e-9);
        assert!(cache.update_adaptive_weights(AdaptiveWeights { recency: 2.0, frequency: 0.0, size: 0.0 }).is_err());
        assert_eq!(cache.weights(), applied);
    }

    #[test]
    fn test_warm_and_clear() {
        let mut cache = cache(CacheConfig::default());
        let entries = vec![
            WarmEntry { key: "a".into(), value: json!(1), ttl_secs: None },
            WarmEntry { key: "b".into(), value: json!(2), ttl_secs: Some(30) },
        ];
        assert_eq!(cache.warm(entries, t0()).unwrap(), 2);
        assert!(cache.exists("b", t0()).unwrap());

        cache.clear().unwrap();
        assert!(!cache.exists("a", t0()).unwrap());
        assert!(cache.set("", &json!(1), None, t0()).is_err());
    }

    #[test]
    fn test_file_backed_disk_tier_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        let config = CacheConfig {
            memory_capacity: 1,
            disk_path: Some(dir.path().join("tier.db")),
            ..CacheConfig::default()
        };

        {
            let mut cache = cache(config.clone());
            cache.set("old", &json!("persisted"), None, t0()).unwrap();
            cache.set("new", &json!("volatile"), None, t0()).unwrap();
        }

        let mut cache = cache(config);
        assert_eq!(cache.get("old", t0()).unwrap(), Some(json!("persisted")));
        assert_eq!(cache.get("new", t0()).unwrap(), None);
    }
}
