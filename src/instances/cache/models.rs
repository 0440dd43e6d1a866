//! Data models for the Intelligent Cache

use std::fmt::{self, Display};
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::component::ComponentError;

use super::compression;

/// Longest TTL a write may request (one hundred years)
pub const MAX_TTL_SECS: u64 = 100 * 365 * 24 * 3600;

/// Storage tiers, fastest first
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheTier {
    Memory,
    Disk,
    Distributed,
}

impl CacheTier {
    /// Lookup order
    pub const ALL: [CacheTier; 3] = [CacheTier::Memory, CacheTier::Disk, CacheTier::Distributed];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheTier::Memory => "memory",
            CacheTier::Disk => "disk",
            CacheTier::Distributed => "distributed",
        }
    }

    /// Tier that receives entries demoted out of this one
    pub fn next_slower(&self) -> Option<CacheTier> {
        match self {
            CacheTier::Memory => Some(CacheTier::Disk),
            CacheTier::Disk => Some(CacheTier::Distributed),
            CacheTier::Distributed => None,
        }
    }
}

impl Display for CacheTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule for choosing which entry leaves a full tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvictionPolicy {
    Lru,
    Lfu,
    Fifo,
    Adaptive,
}

impl Default for EvictionPolicy {
    fn default() -> Self {
        EvictionPolicy::Lru
    }
}

impl FromStr for EvictionPolicy {
    type Err = ComponentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "lru" => Ok(EvictionPolicy::Lru),
            "lfu" => Ok(EvictionPolicy::Lfu),
            "fifo" => Ok(EvictionPolicy::Fifo),
            "adaptive" => Ok(EvictionPolicy::Adaptive),
            _ => Err(ComponentError::ValidationError(format!("Unknown eviction policy: {}", s))),
        }
    }
}

/// A cached value with its bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    /// Serialized JSON, gzip-compressed when `compressed` is set
    pub data: Vec<u8>,
    pub compressed: bool,
    /// Size of the uncompressed JSON
    pub original_size: u64,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
    pub access_count: u64,
    /// Logical time of the last write
    pub inserted_seq: u64,
    /// Logical time of the last write or hit
    pub accessed_seq: u64,
}

impl CacheEntry {
    pub fn new(
        key: &str,
        data: Vec<u8>,
        compressed: bool,
        original_size: u64,
        now: DateTime<Utc>,
        expires_at: Option<DateTime<Utc>>,
        seq: u64,
    ) -> Self {
        Self {
            key: key.to_string(),
            data,
            compressed,
            original_size,
            created_at: now,
            last_accessed: now,
            expires_at,
            access_count: 0,
            inserted_seq: seq,
            accessed_seq: seq,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |expiry| expiry <= now)
    }

    pub fn size_bytes(&self) -> u64 {
        self.data.len() as u64
    }

    /// Decompress if needed and parse the stored JSON
    pub fn decode(&self) -> Result<serde_json::Value, ComponentError> {
        if self.compressed {
            let raw = compression::decompress(&self.data)?;
            Ok(serde_json::from_slice(&raw)?)
        } else {
            Ok(serde_json::from_slice(&self.data)?)
        }
    }

    pub fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            key: self.key.clone(),
            size_bytes: self.size_bytes(),
            inserted_seq: self.inserted_seq,
            accessed_seq: self.accessed_seq,
            access_count: self.access_count,
            last_accessed: self.last_accessed,
            expires_at: self.expires_at,
        }
    }
}

/// The view of an entry that eviction and expiry sweeps need
#[derive(Debug, Clone, PartialEq)]
pub struct EntryMetadata {
    pub key: String,
    pub size_bytes: u64,
    pub inserted_seq: u64,
    pub accessed_seq: u64,
    pub access_count: u64,
    pub last_accessed: DateTime<Utc>,
    pub expires_at: Option<DateTime<Utc>>,
}

impl EntryMetadata {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.map_or(false, |expiry| expiry <= now)
    }
}

/// Weights of the adaptive eviction score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaptiveWeights {
    pub recency: f64,
    pub frequency: f64,
    pub size: f64,
}

impl Default for AdaptiveWeights {
    fn default() -> Self {
        Self { recency: 0.4, frequency: 0.4, size: 0.2 }
    }
}

impl AdaptiveWeights {
    /// Validate each weight is in [0, 1] and rescale them to sum to 1
    pub fn normalized(self) -> Result<Self, ComponentError> {
        let weights = [self.recency, self.frequency, self.size];
        if weights.iter().any(|w| !w.is_finite() || *w < 0.0 || *w > 1.0) {
            return Err(ComponentError::ValidationError(
                "Adaptive weights must be between 0.0 and 1.0".to_string(),
            ));
        }

        let sum: f64 = weights.iter().sum();
        if sum <= 0.0 {
            return Err(ComponentError::ValidationError(
                "At least one adaptive weight must be positive".to_string(),
            ));
        }

        Ok(Self {
            recency: self.recency / sum,
            frequency: self.frequency / sum,
            size: self.size / sum,
        })
    }
}

/// Cache configuration, passed in through `ComponentConfig.parameters`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Maximum number of entries held in memory
    pub memory_capacity: usize,
    /// Maximum stored bytes held in memory
    pub memory_max_bytes: u64,
    pub disk_capacity: usize,
    pub distributed_capacity: usize,
    /// Number of distributed shards
    pub distributed_nodes: usize,
    pub eviction_policy: EvictionPolicy,
    /// TTL applied when a write names none; 0 disables expiry
    pub default_ttl_secs: Option<u64>,
    pub compression_enabled: bool,
    /// Values at least this large are considered for compression
    pub compression_threshold_bytes: usize,
    /// SQLite file for the disk tier; in-memory database when unset
    pub disk_path: Option<PathBuf>,
    /// Hits on a lower tier that promote an entry back to memory
    pub promotion_threshold: u64,
    pub cleanup_interval_secs: u64,
    pub adaptive_weights: AdaptiveWeights,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            memory_capacity: 1000,
            memory_max_bytes: 64 * 1024 * 1024,
            disk_capacity: 10_000,
            distributed_capacity: 100_000,
            distributed_nodes: 3,
            eviction_policy: EvictionPolicy::Lru,
            default_ttl_secs: None,
            compression_enabled: true,
            compression_threshold_bytes: 1024,
            disk_path: None,
            promotion_threshold: 3,
            cleanup_interval_secs: 60,
            adaptive_weights: AdaptiveWeights::default(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), ComponentError> {
        if self.memory_capacity == 0 || self.memory_max_bytes == 0 {
            return Err(ComponentError::ValidationError("Memory tier capacity must be positive".to_string()));
        }
        if self.distributed_nodes == 0 {
            return Err(ComponentError::ValidationError("distributed_nodes must be at least 1".to_string()));
        }
        if self.promotion_threshold == 0 {
            return Err(ComponentError::ValidationError("promotion_threshold must be at least 1".to_string()));
        }
        if self.cleanup_interval_secs == 0 {
            return Err(ComponentError::ValidationError("cleanup_interval_secs must be positive".to_string()));
        }
        if self.default_ttl_secs.map_or(false, |secs| secs > MAX_TTL_SECS) {
            return Err(ComponentError::ValidationError(format!(
                "default_ttl_secs must not exceed {}", MAX_TTL_SECS
            )));
        }
        self.adaptive_weights.normalized()?;
        Ok(())
    }
}

/// Expiry time for a TTL counted from `now`; a TTL of 0 never expires
pub fn expiry_after(now: DateTime<Utc>, ttl_secs: u64) -> Result<Option<DateTime<Utc>>, ComponentError> {
    if ttl_secs == 0 {
        return Ok(None);
    }
    let out_of_range = || ComponentError::ValidationError(format!(
        "TTL of {} seconds exceeds the maximum of {}", ttl_secs, MAX_TTL_SECS
    ));
    if ttl_secs > MAX_TTL_SECS {
        return Err(out_of_range());
    }

    let ttl = i64::try_from(ttl_secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .ok_or_else(out_of_range)?;
    now.checked_add_signed(ttl).map(Some).ok_or_else(out_of_range)
}

/// Cache counters and sizes
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub eviction_policy: EvictionPolicy,
    pub memory_hits: u64,
    pub disk_hits: u64,
    pub distributed_hits: u64,
    pub misses: u64,
    pub sets: u64,
    pub deletes: u64,
    /// Entries dropped from the slowest tier
    pub evictions: u64,
    pub expirations: u64,
    pub promotions: u64,
    pub demotions: u64,
    pub compressed_entries: u64,
    pub bytes_saved: u64,
    pub memory_entries: usize,
    pub disk_entries: usize,
    pub distributed_entries: usize,
    pub distributed_nodes_online: usize,
    pub memory_bytes: u64,
    pub hit_rate: f64,
}

impl CacheStats {
    pub fn total_hits(&self) -> u64 {
        self.memory_hits + self.disk_hits + self.distributed_hits
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use serde_json::json;

    #[test]
    fn test_weights_are_normalized() {
        let weights = AdaptiveWeights { recency: 1.0, frequency: 0.5, size: 0.5 }.normalized().unwrap();
        assert!((weights.recency - 0.5).abs() < 1e-9);
        assert!((weights.frequency + weights.size - 0.5).abs() < 1e-9);

        assert!(AdaptiveWeights { recency: 1.5, frequency: 0.0, size: 0.0 }.normalized().is_err());
        assert!(AdaptiveWeights { recency: 0.0, frequency: 0.0, size: 0.0 }.normalized().is_err());
    }

    #[test]
    fn test_entry_expiry_and_decode() {
        let now = Utc::now();
        let data = serde_json::to_vec(&json!({"a": 1})).unwrap();
        let size = data.len() as u64;
        let entry = CacheEntry::new("k", data, false, size, now, Some(now + Duration::seconds(5)), 1);

        assert!(!entry.is_expired(now));
        assert!(entry.is_expired(now + Duration::seconds(5)));
        assert_eq!(entry.decode().unwrap(), json!({"a": 1}));
        assert_eq!(entry.metadata().accessed_seq, 1);
    }

    #[test]
    fn test_policy_parsing_and_config_validation() {
        assert_eq!("LFU".parse::<EvictionPolicy>().unwrap(), EvictionPolicy::Lfu);
        assert!("random".parse::<EvictionPolicy>().is_err());

        assert!(CacheConfig::default().validate().is_ok());
        let config = CacheConfig { distributed_nodes: 0, ..CacheConfig::default() };
        assert!(config.validate().is_err());
        let config = CacheConfig { default_ttl_secs: Some(u64::MAX), ..CacheConfig::default() };
        assert!(matches!(config.validate(), Err(ComponentError::ValidationError(_))));
    }

    #[test]
    fn test_expiry_after_rejects_out_of_range_ttl() {
        let now = Utc::now();
        assert_eq!(expiry_after(now, 0).unwrap(), None);
        assert_eq!(expiry_after(now, 30).unwrap(), Some(now + Duration::seconds(30)));
        assert!(expiry_after(now, MAX_TTL_SECS).unwrap().is_some());

        for ttl in [MAX_TTL_SECS + 1, 10_000_000_000_000, u64::MAX] {
            assert!(matches!(expiry_after(now, ttl), Err(ComponentError::ValidationError(_))));
        }
    }
}
