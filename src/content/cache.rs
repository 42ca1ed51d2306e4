use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use sha2::{Digest, Sha256};

use crate::config::CacheConfig;

/// Identifies one regex execution: the pattern, its flags and the text it ran on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RegexCacheKey {
    pub pattern: String,
    pub flags: String,
    /// SHA-256 of the candidate text, hex encoded.
    pub content_hash: String,
}

impl RegexCacheKey {
    pub fn new(pattern: &str, flags: &str, content: &str) -> Self {
        let hash = Sha256::digest(content.as_bytes());
        Self {
            pattern: pattern.to_string(),
            flags: flags.to_string(),
            content_hash: format!("{:x}", hash),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct CachedVerdict {
    matched: bool,
    sequence: u64,
}

/// Bounded cache of regex verdicts. When full, the oldest entries are evicted in bulk.
///
/// Safe for concurrent use; a racing insert for the same key stores the same verdict.
pub struct RegexCache {
    entries: DashMap<RegexCacheKey, CachedVerdict>,
    capacity: usize,
    eviction_ratio: f64,
    sequence: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl Default for RegexCache {
    fn default() -> Self {
        Self::new(&CacheConfig::default())
    }
}

impl RegexCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            entries: DashMap::new(),
            capacity: config.capacity.max(1),
            eviction_ratio: config.eviction_ratio.clamp(0.0, 1.0),
            sequence: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &RegexCacheKey) -> Option<bool> {
        match self.entries.get(key) {
            Some(entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.matched)
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, key: RegexCacheKey, matched: bool) {
        if !self.entries.contains_key(&key) && self.entries.len() >= self.capacity {
            self.evict_oldest();
        }
        let sequence = self.sequence.fetch_add(1, Ordering::Relaxed);
        self.entries
            .insert(key, CachedVerdict { matched, sequence });
    }

    /// Drop the oldest `eviction_ratio` share of the capacity (at least one entry).
    fn evict_oldest(&self) {
        let count = ((self.capacity as f64 * self.eviction_ratio).round() as usize).max(1);

        let mut by_age: Vec<(u64, RegexCacheKey)> = self
            .entries
            .iter()
            .map(|entry| (entry.value().sequence, entry.key().clone()))
            .collect();
        by_age.sort_unstable_by_key(|(sequence, _)| *sequence);

        let mut evicted = 0;
        for (_, key) in by_age.into_iter().take(count) {
            if self.entries.remove(&key).is_some() {
                evicted += 1;
            }
        }
        self.evictions.fetch_add(evicted, Ordering::Relaxed);
        tracing::debug!(evicted, "regex cache full, evicted oldest entries");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> RegexCacheStats {
        RegexCacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}

/// Cache statistics for monitoring.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegexCacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}
