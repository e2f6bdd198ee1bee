//! Bounded cross-request term cache.
//!
//! Scoring tokenizes every title and abstract it sees. The same records come
//! back from several tiers and several sources, so tokenized term sets are
//! memoized here, keyed by a SHA-256 content hash. Entries are immutable once
//! written; a collision on insert is last-writer-wins. Capacity is fixed and
//! the least recently used entry is evicted when full.

use sha2::{Digest, Sha256};
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// A tokenized, stop-word-filtered term set.
pub type TermSet = Arc<BTreeSet<String>>;

struct CacheEntry {
    terms: TermSet,
    last_used: Instant,
}

/// Hit/miss counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
}

/// Content-hash keyed LRU cache of document term sets.
pub struct TermCache {
    entries: Mutex<HashMap<[u8; 32], CacheEntry>>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl std::fmt::Debug for TermCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TermCache")
            .field("max_entries", &self.max_entries)
            .field("stats", &self.stats())
            .finish()
    }
}

impl TermCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries: max_entries.max(1),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    fn key(text: &str) -> [u8; 32] {
        Sha256::digest(text.as_bytes()).into()
    }

    // A poisoned lock only means another thread panicked mid-insert; the map
    // itself is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<[u8; 32], CacheEntry>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn get(&self, text: &str) -> Option<TermSet> {
        let key = Self::key(text);
        let mut entries = self.lock();
        match entries.get_mut(&key) {
            Some(entry) => {
                entry.last_used = Instant::now();
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.terms.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    pub fn insert(&self, text: &str, terms: TermSet) {
        let key = Self::key(text);
        let mut entries = self.lock();

        if entries.len() >= self.max_entries
            && !entries.contains_key(&key)
            && let Some(oldest) = entries
                .iter()
                .min_by_key(|(_, v)| v.last_used)
                .map(|(k, _)| *k)
        {
            entries.remove(&oldest);
        }

        entries.insert(
            key,
            CacheEntry {
                terms,
                last_used: Instant::now(),
            },
        );
    }

    /// Return the cached term set for `text`, computing and storing it on a miss.
    pub fn get_or_insert_with<F>(&self, text: &str, compute: F) -> TermSet
    where
        F: FnOnce(&str) -> BTreeSet<String>,
    {
        if let Some(terms) = self.get(text) {
            return terms;
        }
        let terms = Arc::new(compute(text));
        self.insert(text, terms.clone());
        terms
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Drop every entry and reset the counters.
    pub fn clear(&self) {
        self.lock().clear();
        self.hits.store(0, Ordering::Relaxed);
        self.misses.store(0, Ordering::Relaxed);
        tracing::debug!("Term cache cleared");
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(words: &[&str]) -> BTreeSet<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_get_or_insert_computes_once() {
        let cache = TermCache::new(8);
        let mut calls = 0;
        let first = cache.get_or_insert_with("aspirin trial", |_| {
            calls += 1;
            set(&["aspirin", "trial"])
        });
        let second = cache.get_or_insert_with("aspirin trial", |_| {
            calls += 1;
            set(&[])
        });
        assert_eq!(calls, 1);
        assert_eq!(first, second);
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_capacity_is_bounded() {
        let cache = TermCache::new(2);
        cache.insert("a", Arc::new(set(&["a"])));
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.insert("b", Arc::new(set(&["b"])));
        std::thread::sleep(std::time::Duration::from_millis(2));
        // Touch "a" so "b" becomes least recently used.
        assert!(cache.get("a").is_some());
        std::thread::sleep(std::time::Duration::from_millis(2));
        cache.insert("c", Arc::new(set(&["c"])));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_some());
        assert!(cache.get("b").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn test_clear() {
        let cache = TermCache::new(4);
        cache.insert("x", Arc::new(set(&["x"])));
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats(), CacheStats::default());
    }
}
