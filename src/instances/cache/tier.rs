//! Storage tiers of the Intelligent Cache
//!
//! Memory is an LRU-ordered map, disk is a SQLite table and the distributed
//! tier is a set of in-process shards that can be taken offline. The cache
//! moves entries between them through the `TierStore` interface.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use dashmap::DashMap;
use log::{debug, info};
use lru::LruCache;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::core::component::ComponentError;

use super::models::{CacheEntry, CacheTier, EntryMetadata};

/// Operations the cache needs from every tier
pub trait TierStore: Send {
    fn tier(&self) -> CacheTier;

    /// Fetch an entry, counting as a use for tiers that track recency
    fn get(&mut self, key: &str) -> Result<Option<CacheEntry>, ComponentError>;

    /// Fetch an entry without side effects
    fn peek(&self, key: &str) -> Result<Option<CacheEntry>, ComponentError>;

    /// Insert or replace an entry
    fn put(&mut self, entry: CacheEntry) -> Result<(), ComponentError>;

    fn remove(&mut self, key: &str) -> Result<Option<CacheEntry>, ComponentError>;

    fn contains(&self, key: &str) -> Result<bool, ComponentError>;

    fn len(&self) -> Result<usize, ComponentError>;

    /// Bytes of stored payload
    fn size_bytes(&self) -> Result<u64, ComponentError>;

    fn metadata(&self) -> Result<Vec<EntryMetadata>, ComponentError>;

    fn clear(&mut self) -> Result<(), ComponentError>;

    /// Least recently used key, for tiers that maintain that order themselves
    fn lru_candidate(&self) -> Option<String> {
        None
    }
}

/// In-process tier ordered by recency
#[derive(Debug)]
pub struct MemoryTier {
    entries: LruCache<String, CacheEntry>,
    bytes: u64,
}

impl MemoryTier {
    pub fn new() -> Self {
        Self {
            entries: LruCache::unbounded(),
            bytes: 0,
        }
    }
}

impl Default for MemoryTier {
    fn default() -> Self {
        Self::new()
    }
}

impl TierStore for MemoryTier {
    fn tier(&self) -> CacheTier {
        CacheTier::Memory
    }

    fn get(&mut self, key: &str) -> Result<Option<CacheEntry>, ComponentError> {
        Ok(self.entries.get(key).cloned())
    }

    fn peek(&self, key: &str) -> Result<Option<CacheEntry>, ComponentError> {
        Ok(self.entries.peek(key).cloned())
    }

    fn put(&mut self, entry: CacheEntry) -> Result<(), ComponentError> {
        self.bytes += entry.size_bytes();
        if let Some(old) = self.entries.put(entry.key.clone(), entry) {
            self.bytes = self.bytes.saturating_sub(old.size_bytes());
        }
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<Option<CacheEntry>, ComponentError> {
        let removed = self.entries.pop(key);
        if let Some(entry) = &removed {
            self.bytes = self.bytes.saturating_sub(entry.size_bytes());
        }
        Ok(removed)
    }

    fn contains(&self, key: &str) -> Result<bool, ComponentError> {
        Ok(self.entries.contains(key))
    }

    fn len(&self) -> Result<usize, ComponentError> {
        Ok(self.entries.len())
    }

    fn size_bytes(&self) -> Result<u64, ComponentError> {
        Ok(self.bytes)
    }

    fn metadata(&self) -> Result<Vec<EntryMetadata>, ComponentError> {
        Ok(self.entries.iter().map(|(_, entry)| entry.metadata()).collect())
    }

    fn clear(&mut self) -> Result<(), ComponentError> {
        self.entries.clear();
        self.bytes = 0;
        Ok(())
    }

    fn lru_candidate(&self) -> Option<String> {
        self.entries.peek_lru().map(|(key, _)| key.clone())
    }
}

/// SQLite-backed tier
pub struct DiskTier {
    conn: Connection,
}

impl std::fmt::Debug for DiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskTier").finish_non_exhaustive()
    }
}

const ENTRY_COLUMNS: &str = "key, data, compressed, original_size, created_at, last_accessed, \
                             expires_at, access_count, inserted_seq, accessed_seq";

impl DiskTier {
    /// Open the tier at `path`, or an in-memory database when `None`
    pub fn open(path: Option<&Path>) -> Result<Self, ComponentError> {
        let conn = match path {
            Some(path) => {
                info!("Opening disk cache tier at {}", path.display());
                let conn = Connection::open(path)?;
                conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;
                conn
            }
            None => Connection::open_in_memory()?,
        };

        let tier = Self { conn };
        tier.init_schema()?;
        Ok(tier)
    }

    fn init_schema(&self) -> Result<(), ComponentError> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key TEXT PRIMARY KEY,
                data BLOB NOT NULL,
                compressed INTEGER NOT NULL,
                original_size INTEGER NOT NULL,
                created_at INTEGER NOT NULL,
                last_accessed INTEGER NOT NULL,
                expires_at INTEGER,
                access_count INTEGER NOT NULL DEFAULT 0,
                inserted_seq INTEGER NOT NULL,
                accessed_seq INTEGER NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cache_entries_expires ON cache_entries(expires_at);
            "#,
        )?;
        Ok(())
    }

    /// Highest logical timestamp stored, so a reopened cache keeps counting upwards
    pub fn max_sequence(&self) -> Result<u64, ComponentError> {
        let max: i64 = self.conn.query_row(
            "SELECT COALESCE(MAX(MAX(inserted_seq, accessed_seq)), 0) FROM cache_entries",
            [],
            |row| row.get(0),
        )?;
        Ok(max.max(0) as u64)
    }

    fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<CacheEntry> {
        let expires_at: Option<i64> = row.get(6)?;
        Ok(CacheEntry {
            key: row.get(0)?,
            data: row.get(1)?,
            compressed: row.get(2)?,
            original_size: row.get::<_, i64>(3)? as u64,
            created_at: from_millis(4, row.get(4)?)?,
            last_accessed: from_millis(5, row.get(5)?)?,
            expires_at: expires_at.map(|millis| from_millis(6, millis)).transpose()?,
            access_count: row.get::<_, i64>(7)? as u64,
            inserted_seq: row.get::<_, i64>(8)? as u64,
            accessed_seq: row.get::<_, i64>(9)? as u64,
        })
    }
}

/// Decode a stored timestamp; `column` names the offending column on failure
fn from_millis(column: usize, millis: i64) -> rusqlite::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or(rusqlite::Error::IntegralValueOutOfRange(column, millis))
}

impl TierStore for DiskTier {
    fn tier(&self) -> CacheTier {
        CacheTier::Disk
    }

    fn get(&mut self, key: &str) -> Result<Option<CacheEntry>, ComponentError> {
        self.peek(key)
    }

    fn peek(&self, key: &str) -> Result<Option<CacheEntry>, ComponentError> {
        let entry = self.conn
            .query_row(
                &format!("SELECT {} FROM cache_entries WHERE key = ?1", ENTRY_COLUMNS),
                params![key],
                Self::row_to_entry,
            )
            .optional()?;
        Ok(entry)
    }

    fn put(&mut self, entry: CacheEntry) -> Result<(), ComponentError> {
        self.conn.execute(
            &format!(
                "INSERT OR REPLACE INTO cache_entries ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                ENTRY_COLUMNS
            ),
            params![
                entry.key,
                entry.data,
                entry.compressed,
                entry.original_size as i64,
                entry.created_at.timestamp_millis(),
                entry.last_accessed.timestamp_millis(),
                entry.expires_at.map(|t| t.timestamp_millis()),
                entry.access_count as i64,
                entry.inserted_seq as i64,
                entry.accessed_seq as i64,
            ],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<Option<CacheEntry>, ComponentError> {
        let existing = self.peek(key)?;
        if existing.is_some() {
            self.conn.execute("DELETE FROM cache_entries WHERE key = ?1", params![key])?;
        }
        Ok(existing)
    }

    fn contains(&self, key: &str) -> Result<bool, ComponentError> {
        let found: Option<i64> = self.conn
            .query_row("SELECT 1 FROM cache_entries WHERE key = ?1", params![key], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    fn len(&self) -> Result<usize, ComponentError> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn size_bytes(&self) -> Result<u64, ComponentError> {
        let bytes: i64 = self.conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(data)), 0) FROM cache_entries",
            [],
            |row| row.get(0),
        )?;
        Ok(bytes as u64)
    }

    fn metadata(&self) -> Result<Vec<EntryMetadata>, ComponentError> {
        let mut stmt = self.conn.prepare(
            "SELECT key, LENGTH(data), inserted_seq, accessed_seq, access_count, last_accessed, expires_at \
             FROM cache_entries",
        )?;
        let rows = stmt.query_map([], |row| {
            let expires_at: Option<i64> = row.get(6)?;
            Ok(EntryMetadata {
                key: row.get(0)?,
                size_bytes: row.get::<_, i64>(1)? as u64,
                inserted_seq: row.get::<_, i64>(2)? as u64,
                accessed_seq: row.get::<_, i64>(3)? as u64,
                access_count: row.get::<_, i64>(4)? as u64,
                last_accessed: from_millis(5, row.get(5)?)?,
                expires_at: expires_at.map(|millis| from_millis(6, millis)).transpose()?,
            })
        })?;

        let mut metadata = Vec::new();
        for row in rows {
            metadata.push(row?);
        }
        Ok(metadata)
    }

    fn clear(&mut self) -> Result<(), ComponentError> {
        self.conn.execute("DELETE FROM cache_entries", [])?;
        Ok(())
    }
}

#[derive(Debug)]
struct Shard {
    entries: DashMap<String, CacheEntry>,
    online: bool,
}

/// Entries spread over in-process shards by key hash
#[derive(Debug)]
pub struct DistributedTier {
    shards: Vec<Shard>,
}

impl DistributedTier {
    pub fn new(node_count: usize) -> Self {
        let shards = (0..node_count.max(1))
            .map(|_| Shard { entries: DashMap::new(), online: true })
            .collect();
        Self { shards }
    }

    pub fn node_count(&self) -> usize {
        self.shards.len()
    }

    pub fn is_online(&self, node: usize) -> bool {
        self.shards.get(node).map_or(false, |s| s.online)
    }

    pub fn set_online(&mut self, node: usize, online: bool) -> Result<(), ComponentError> {
        let shard = self.shards
            .get_mut(node)
            .ok_or_else(|| ComponentError::NotFound(format!("Distributed cache node {}", node)))?;
        shard.online = online;
        debug!("Distributed cache node {} is now {}", node, if online { "online" } else { "offline" });
        Ok(())
    }

    /// Shard a key is placed on when every shard is online
    pub fn home_shard(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    /// Online shards in probe order, starting at the key's home shard
    fn probe_order(&self, key: &str) -> impl Iterator<Item = usize> + '_ {
        let home = self.home_shard(key);
        let n = self.shards.len();
        (0..n).map(move |i| (home + i) % n).filter(move |&i| self.shards[i].online)
    }

    /// Shard currently holding `key`, if it is readable
    pub fn shard_of(&self, key: &str) -> Option<usize> {
        self.probe_order(key).find(|&i| self.shards[i].entries.contains_key(key))
    }
}

impl TierStore for DistributedTier {
    fn tier(&self) -> CacheTier {
        CacheTier::Distributed
    }

    fn get(&mut self, key: &str) -> Result<Option<CacheEntry>, ComponentError> {
        self.peek(key)
    }

    fn peek(&self, key: &str) -> Result<Option<CacheEntry>, ComponentError> {
        Ok(self.shard_of(key).and_then(|i| self.shards[i].entries.get(key).map(|e| e.value().clone())))
    }

    fn put(&mut self, entry: CacheEntry) -> Result<(), ComponentError> {
        // Drop copies left on other shards, including offline ones
        for shard in &self.shards {
            shard.entries.remove(&entry.key);
        }

        let target = self.probe_order(&entry.key).next().ok_or_else(|| {
            ComponentError::ResourceError("All distributed cache nodes are offline".to_string())
        })?;
        self.shards[target].entries.insert(entry.key.clone(), entry);
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<Option<CacheEntry>, ComponentError> {
        let mut removed = None;
        for shard in &self.shards {
            if let Some((_, entry)) = shard.entries.remove(key) {
                removed = Some(entry);
            }
        }
        Ok(removed)
    }

    fn contains(&self, key: &str) -> Result<bool, ComponentError> {
        Ok(self.shard_of(key).is_some())
    }

    fn len(&self) -> Result<usize, ComponentError> {
        Ok(self.shards.iter().map(|s| s.entries.len()).sum())
    }

    fn size_bytes(&self) -> Result<u64, ComponentError> {
        Ok(self.shards
            .iter()
            .map(|s| s.entries.iter().map(|e| e.value().size_bytes()).sum::<u64>())
            .sum())
    }

    fn metadata(&self) -> Result<Vec<EntryMetadata>, ComponentError> {
        let mut metadata = Vec::new();
        for shard in &self.shards {
            metadata.extend(shard.entries.iter().map(|e| e.value().metadata()));
        }
        Ok(metadata)
    }

    fn clear(&mut self) -> Result<(), ComponentError> {
        for shard in &self.shards {
            shard.entries.clear();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(key: &str, seq: u64) -> CacheEntry {
        CacheEntry::new(key, key.as_bytes().to_vec(), false, key.len() as u64, Utc::now(), None, seq)
    }

    /// Behavior every tier must share
    fn exercise(store: &mut dyn TierStore) {
        store.put(entry("a", 1)).unwrap();
        store.put(entry("bb", 2)).unwrap();
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.size_bytes().unwrap(), 3);

        // Replacing keeps one copy
        store.put(entry("a", 3)).unwrap();
        assert_eq!(store.len().unwrap(), 2);
        assert_eq!(store.peek("a").unwrap().unwrap().inserted_seq, 3);

        assert!(store.contains("bb").unwrap());
        assert_eq!(store.remove("bb").unwrap().unwrap().key, "bb");
        assert!(store.remove("bb").unwrap().is_none());

        let metadata = store.metadata().unwrap();
        assert_eq!(metadata.len(), 1);
        assert_eq!(metadata[0].key, "a");

        store.clear().unwrap();
        assert_eq!(store.len().unwrap(), 0);
    }

    #[test]
    fn test_memory_tier() {
        let mut tier = MemoryTier::new();
        exercise(&mut tier);

        tier.put(entry("x", 1)).unwrap();
        tier.put(entry("y", 2)).unwrap();
        assert_eq!(tier.lru_candidate().as_deref(), Some("x"));
        tier.get("x").unwrap();
        assert_eq!(tier.lru_candidate().as_deref(), Some("y"));
        tier.peek("y").unwrap();
        assert_eq!(tier.lru_candidate().as_deref(), Some("y"));
    }

    #[test]
    fn test_disk_tier_in_memory() {
        let mut tier = DiskTier::open(None).unwrap();
        exercise(&mut tier);
    }

    #[test]
    fn test_disk_tier_persists_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.db");

        {
            let mut tier = DiskTier::open(Some(&path)).unwrap();
            let mut stored = entry("kept", 7);
            stored.expires_at = Some(Utc.timestamp_millis_opt(1_900_000_000_000).unwrap());
            tier.put(stored).unwrap();
        }

        let tier = DiskTier::open(Some(&path)).unwrap();
        let loaded = tier.peek("kept").unwrap().unwrap();
        assert_eq!(loaded.data, b"kept".to_vec());
        assert_eq!(loaded.expires_at.unwrap().timestamp_millis(), 1_900_000_000_000);
        assert_eq!(tier.max_sequence().unwrap(), 7);
    }

    #[test]
    fn test_disk_tier_rejects_corrupt_timestamps() {
        let mut tier = DiskTier::open(None).unwrap();
        tier.put(entry("a", 1)).unwrap();
        tier.conn
            .execute("UPDATE cache_entries SET last_accessed = ?1 WHERE key = 'a'", params![i64::MAX])
            .unwrap();

        assert!(matches!(tier.peek("a"), Err(ComponentError::PersistenceError(_))));
        assert!(matches!(tier.metadata(), Err(ComponentError::PersistenceError(_))));
        // The row itself is still countable
        assert_eq!(tier.len().unwrap(), 1);
    }

    #[test]
    fn test_distributed_tier() {
        let mut tier = DistributedTier::new(3);
        exercise(&mut tier);
    }

    #[test]
    fn test_offline_shard_hides_entries_and_reroutes_writes() {
        let mut tier = DistributedTier::new(3);
        tier.put(entry("k", 1)).unwrap();
        let home = tier.home_shard("k");
        assert_eq!(tier.shard_of("k"), Some(home));

        tier.set_online(home, false).unwrap();
        assert!(!tier.is_online(home));
        assert!(tier.peek("k").unwrap().is_none());
        assert_eq!(tier.len().unwrap(), 1);

        // A rewrite lands on the next online shard and replaces the hidden copy
        tier.put(entry("k", 2)).unwrap();
        assert_eq!(tier.shard_of("k"), Some((home + 1) % 3));
        assert_eq!(tier.len().unwrap(), 1);

        tier.set_online(home, true).unwrap();
        assert_eq!(tier.peek("k").unwrap().unwrap().inserted_seq, 2);
        assert!(tier.set_online(7, true).is_err());
    }

    #[test]
    fn test_all_shards_offline_rejects_writes() {
        let mut tier = DistributedTier::new(1);
        tier.set_online(0, false).unwrap();
        assert!(matches!(tier.put(entry("k", 1)), Err(ComponentError::ResourceError(_))));
    }
}
