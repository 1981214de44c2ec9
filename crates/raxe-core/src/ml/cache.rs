//! LRU embedding cache.
//!
//! Memoizes text → embedding so repeated scans of the same prompt skip
//! tokenization and the embedder forward pass. Keys are the first 16 hex
//! characters of the SHA-256 of the text. Entries can carry a TTL; expired
//! entries are removed on access and counted. All statistics are taken
//! under the same lock as the data, so snapshots are consistent.

use lru::LruCache;
use raxe_common::text_key;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Immutable statistics snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub max_size: usize,
    pub hit_rate: f64,
    pub evictions: u64,
    pub expirations: u64,
}

struct Entry {
    embedding: Arc<Vec<f32>>,
    inserted_at: Instant,
}

struct Inner {
    entries: LruCache<String, Entry>,
    hits: u64,
    misses: u64,
    evictions: u64,
    expirations: u64,
}

/// Thread-safe LRU cache for text embeddings.
///
/// `max_size == 0` disables caching entirely; every accessor then
/// short-circuits.
pub struct EmbeddingCache {
    inner: Option<Mutex<Inner>>,
    max_size: usize,
    ttl: Option<Duration>,
}

impl EmbeddingCache {
    pub fn new(max_size: usize, ttl: Option<Duration>) -> Self {
        let inner = NonZeroUsize::new(max_size).map(|cap| {
            Mutex::new(Inner {
                entries: LruCache::new(cap),
                hits: 0,
                misses: 0,
                evictions: 0,
                expirations: 0,
            })
        });
        Self {
            inner,
            max_size,
            ttl,
        }
    }

    pub fn enabled(&self) -> bool {
        self.inner.is_some()
    }

    /// Look up the embedding for `text`, promoting the entry to
    /// most-recently-used. Expired entries are dropped and counted as a
    /// miss plus an expiration.
    pub fn get(&self, text: &str) -> Option<Arc<Vec<f32>>> {
        let inner = self.inner.as_ref()?;
        let key = text_key(text);
        let mut guard = inner.lock().expect("embedding cache lock poisoned");
        let state = &mut *guard;

        let expired = match state.entries.get(&key) {
            None => {
                state.misses += 1;
                return None;
            }
            Some(entry) => self
                .ttl
                .is_some_and(|ttl| entry.inserted_at.elapsed() > ttl),
        };

        if expired {
            state.entries.pop(&key);
            state.expirations += 1;
            state.misses += 1;
            return None;
        }

        state.hits += 1;
        state
            .entries
            .get(&key)
            .map(|entry| Arc::clone(&entry.embedding))
    }

    /// Store the embedding for `text`, evicting the least recently used
    /// entry at capacity. No-op when caching is disabled.
    pub fn put(&self, text: &str, embedding: Vec<f32>) {
        let Some(inner) = self.inner.as_ref() else {
            return;
        };
        let key = text_key(text);
        let mut inner = inner.lock().expect("embedding cache lock poisoned");
        let evicted = inner.entries.push(
            key.clone(),
            Entry {
                embedding: Arc::new(embedding),
                inserted_at: Instant::now(),
            },
        );
        if let Some((old_key, _)) = evicted {
            // push returns the displaced entry; same key means update, not
            // eviction.
            if old_key != key {
                inner.evictions += 1;
            }
        }
    }

    /// Membership probe: no statistics update, no LRU promotion.
    pub fn contains(&self, text: &str) -> bool {
        let Some(inner) = self.inner.as_ref() else {
            return false;
        };
        let key = text_key(text);
        let inner = inner.lock().expect("embedding cache lock poisoned");
        inner.entries.contains(&key)
    }

    /// Drop every entry and reset counters. Used on model reload, where
    /// cached vectors would belong to the wrong embedder.
    pub fn clear(&self) {
        let Some(inner) = self.inner.as_ref() else {
            return;
        };
        let mut inner = inner.lock().expect("embedding cache lock poisoned");
        inner.entries.clear();
        inner.hits = 0;
        inner.misses = 0;
        inner.evictions = 0;
        inner.expirations = 0;
    }

    pub fn len(&self) -> usize {
        self.inner
            .as_ref()
            .map(|i| i.lock().expect("embedding cache lock poisoned").entries.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Consistent snapshot of the counters.
    pub fn stats(&self) -> CacheStats {
        let Some(inner) = self.inner.as_ref() else {
            return CacheStats {
                hits: 0,
                misses: 0,
                size: 0,
                max_size: 0,
                hit_rate: 0.0,
                evictions: 0,
                expirations: 0,
            };
        };
        let inner = inner.lock().expect("embedding cache lock poisoned");
        let total = inner.hits + inner.misses;
        CacheStats {
            hits: inner.hits,
            misses: inner.misses,
            size: inner.entries.len(),
            max_size: self.max_size,
            hit_rate: if total == 0 {
                0.0
            } else {
                inner.hits as f64 / total as f64
            },
            evictions: inner.evictions,
            expirations: inner.expirations,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_rate_tracks_hits_over_total() {
        let cache = EmbeddingCache::new(10, None);
        assert!(cache.get("a").is_none());
        cache.put("a", vec![1.0, 2.0]);
        assert!(cache.get("a").is_some());
        assert!(cache.get("a").is_some());

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert!((stats.hit_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn lru_eviction_drops_oldest() {
        let cache = EmbeddingCache::new(2, None);
        cache.put("a", vec![1.0]);
        cache.put("b", vec![2.0]);
        // Touch "a" so "b" becomes the eviction candidate.
        assert!(cache.get("a").is_some());
        cache.put("c", vec![3.0]);

        assert!(cache.get("b").is_none(), "evicted entry returns None");
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn update_of_existing_key_is_not_an_eviction() {
        let cache = EmbeddingCache::new(2, None);
        cache.put("a", vec![1.0]);
        cache.put("a", vec![1.5]);
        assert_eq!(cache.stats().evictions, 0);
        assert_eq!(cache.get("a").unwrap().as_slice(), &[1.5]);
    }

    #[test]
    fn zero_capacity_disables_caching() {
        let cache = EmbeddingCache::new(0, None);
        assert!(!cache.enabled());
        cache.put("a", vec![1.0]);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.stats().max_size, 0);
        assert_eq!(cache.stats().misses, 0, "disabled cache records nothing");
    }

    #[test]
    fn ttl_expires_entries_on_access() {
        let cache = EmbeddingCache::new(10, Some(Duration::from_millis(0)));
        cache.put("a", vec![1.0]);
        std::thread::sleep(Duration::from_millis(2));
        assert!(cache.get("a").is_none());
        let stats = cache.stats();
        assert_eq!(stats.expirations, 1);
        assert_eq!(stats.size, 0);
    }

    #[test]
    fn contains_does_not_touch_stats_or_order() {
        let cache = EmbeddingCache::new(2, None);
        cache.put("a", vec![1.0]);
        cache.put("b", vec![2.0]);
        assert!(cache.contains("a"));
        let stats = cache.stats();
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        // "a" was not promoted by contains(), so it is still the LRU entry.
        cache.put("c", vec![3.0]);
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
    }

    #[test]
    fn clear_resets_everything() {
        let cache = EmbeddingCache::new(4, None);
        cache.put("a", vec![1.0]);
        let _ = cache.get("a");
        let _ = cache.get("zz");
        cache.clear();
        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses, stats.size), (0, 0, 0));
    }

    #[test]
    fn concurrent_access_is_safe() {
        let cache = Arc::new(EmbeddingCache::new(64, None));
        let mut handles = Vec::new();
        for t in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                for i in 0..200 {
                    let key = format!("text-{}", (t * 7 + i) % 32);
                    if cache.get(&key).is_none() {
                        cache.put(&key, vec![i as f32]);
                    }
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        let stats = cache.stats();
        assert_eq!(stats.hits + stats.misses, 1600);
    }
}
