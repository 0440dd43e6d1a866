//! Victim selection for the eviction policies

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use super::models::{AdaptiveWeights, EntryMetadata, EvictionPolicy};

/// Accesses beyond this count no longer raise the frequency score
const FREQUENCY_CAP: f64 = 100.0;

/// Pick the key that should leave a tier under `policy`
pub fn select_victim(
    policy: EvictionPolicy,
    entries: &[EntryMetadata],
    now: DateTime<Utc>,
    weights: &AdaptiveWeights,
) -> Option<String> {
    let victim = match policy {
        EvictionPolicy::Lru => entries.iter().min_by_key(|e| e.accessed_seq),
        EvictionPolicy::Lfu => entries.iter().min_by_key(|e| (e.access_count, e.accessed_seq)),
        EvictionPolicy::Fifo => entries.iter().min_by_key(|e| e.inserted_seq),
        EvictionPolicy::Adaptive => entries.iter().min_by(|a, b| {
            adaptive_score(a, now, weights)
                .partial_cmp(&adaptive_score(b, now, weights))
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.accessed_seq.cmp(&b.accessed_seq))
        }),
    };

    victim.map(|e| e.key.clone())
}

/// Higher means more worth keeping
pub fn adaptive_score(entry: &EntryMetadata, now: DateTime<Utc>, weights: &AdaptiveWeights) -> f64 {
    let idle_secs = (now - entry.last_accessed).num_milliseconds().max(0) as f64 / 1000.0;
    let recency = 1.0 / (1.0 + idle_secs);
    let frequency = (entry.access_count as f64).min(FREQUENCY_CAP) / FREQUENCY_CAP;
    let size_factor = 1.0 / (1.0 + entry.size_bytes as f64 / 1024.0);

    weights.recency * recency + weights.frequency * frequency + weights.size * size_factor
}
