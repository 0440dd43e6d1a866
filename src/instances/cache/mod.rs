//! Intelligent Cache
//!
//! A key/value cache spread over three tiers: an LRU-ordered memory tier, a
//! SQLite disk tier and a set of in-process distributed shards. Entries
//! overflowing a tier are demoted to the next one; entries hit often enough
//! on a slower tier are promoted back to memory.

pub mod compression;
pub mod eviction;
pub mod instance;
pub mod models;
pub mod store;
pub mod tier;

pub use instance::IntelligentCacheInstance;
pub use models::{AdaptiveWeights, CacheConfig, CacheStats, CacheTier, EvictionPolicy};
pub use store::WarmEntry;
