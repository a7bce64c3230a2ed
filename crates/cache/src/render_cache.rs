//! Render cache with LRU eviction
//!
//! Holds the most recently rendered page rasters so that revisiting a
//! (page, scale, rotation) triple skips the engine entirely. The store is
//! bounded by entry count; when full, the entry with the oldest access
//! stamp is evicted before the new one is inserted.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Default number of rasters kept per canvas surface
pub const DEFAULT_CAPACITY: usize = 5;

/// Identifies one rendered raster
///
/// The scale is stored in hundredths so that 1.499999 and 1.5 hash to the
/// same key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// 1-based page number
    pub page_number: u32,

    /// Render scale rounded to 2 decimals, times 100
    pub scale_centi: u32,

    /// Rotation in degrees (0, 90, 180, 270)
    pub rotation: u16,
}

impl CacheKey {
    /// Create a key, rounding the scale to 2 decimals
    pub fn new(page_number: u32, scale: f32, rotation: u16) -> Self {
        Self {
            page_number,
            scale_centi: (scale.max(0.0) * 100.0).round() as u32,
            rotation: rotation % 360,
        }
    }

    /// The rounded scale as a float
    pub fn scale(&self) -> f32 {
        self.scale_centi as f32 / 100.0
    }
}

/// Statistics about cache usage
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of entries currently cached
    pub entry_count: usize,

    /// Maximum number of entries
    pub capacity: usize,

    /// Number of cache hits
    pub hits: u64,

    /// Number of cache misses
    pub misses: u64,

    /// Number of entries evicted to make room
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the cache hit rate (0.0 to 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Debug, Clone)]
struct CacheEntry<V> {
    snapshot: V,

    /// Logical clock value of the last put or get
    last_access: u64,
}

struct CacheState<V> {
    entries: HashMap<CacheKey, CacheEntry<V>>,

    /// Monotonic access clock; every put and hit advances it, so stamps are
    /// unique and ties resolve by insertion order
    clock: u64,

    capacity: usize,

    stats: CacheStats,
}

impl<V> CacheState<V> {
    fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::new(),
            clock: 0,
            capacity,
            stats: CacheStats {
                capacity,
                ..Default::default()
            },
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Evict the entry with the oldest access stamp
    fn evict_lru(&mut self) -> Option<CacheKey> {
        let key = self
            .entries
            .iter()
            .min_by_key(|(_, entry)| entry.last_access)
            .map(|(key, _)| *key)?;

        self.entries.remove(&key);
        self.stats.evictions += 1;
        self.stats.entry_count = self.entries.len();
        Some(key)
    }
}

/// Bounded render cache with strict LRU eviction
///
/// Cloning the cache is cheap and yields a handle to the same store, which
/// lets a render task insert its result after it completes.
///
/// # Example
///
/// ```
/// use signview_cache::{CacheKey, RenderCache};
///
/// let cache = RenderCache::new(2);
/// cache.put(CacheKey::new(1, 1.0, 0), "page one");
/// cache.put(CacheKey::new(2, 1.0, 0), "page two");
///
/// // Reading page one makes page two the eviction candidate
/// assert!(cache.get(&CacheKey::new(1, 1.0, 0)).is_some());
/// cache.put(CacheKey::new(3, 1.0, 0), "page three");
///
/// assert!(!cache.contains(&CacheKey::new(2, 1.0, 0)));
/// assert!(cache.contains(&CacheKey::new(1, 1.0, 0)));
/// ```
pub struct RenderCache<V> {
    state: Arc<Mutex<CacheState<V>>>,
}

impl<V: Clone> RenderCache<V> {
    /// Create a cache holding at most `capacity` entries
    ///
    /// A capacity of zero is promoted to one.
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(CacheState::new(capacity))),
        }
    }

    /// Retrieve a snapshot, refreshing its recency
    pub fn get(&self, key: &CacheKey) -> Option<V> {
        let mut state = self.state.lock();
        let stamp = state.tick();

        let hit = state.entries.get_mut(key).map(|entry| {
            entry.last_access = stamp;
            entry.snapshot.clone()
        });

        if hit.is_some() {
            state.stats.hits += 1;
            log::trace!("render cache hit for {key:?}");
        } else {
            state.stats.misses += 1;
        }
        hit
    }

    /// Store a snapshot
    ///
    /// Replaces any existing entry for `key`. When the store is at capacity
    /// and `key` is new, the least recently used entry is evicted first.
    pub fn put(&self, key: CacheKey, snapshot: V) {
        let mut state = self.state.lock();

        if !state.entries.contains_key(&key) && state.entries.len() >= state.capacity {
            if let Some(evicted) = state.evict_lru() {
                log::trace!("render cache evicted {evicted:?}");
            }
        }

        let last_access = state.tick();
        state.entries.insert(
            key,
            CacheEntry {
                snapshot,
                last_access,
            },
        );
        state.stats.entry_count = state.entries.len();
    }

    /// Check for a key without touching its recency
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Remove every entry
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.stats.entry_count = 0;
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.state.lock().capacity
    }

    /// Get current cache statistics
    pub fn stats(&self) -> CacheStats {
        self.state.lock().stats
    }
}

impl<V> Clone for RenderCache<V> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
        }
    }
}

impl<V: Clone> Default for RenderCache<V> {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;

    fn key(page: u32) -> CacheKey {
        CacheKey::new(page, 1.0, 0)
    }

    #[test]
    fn test_basic_put_get() {
        let cache = RenderCache::new(3);
        cache.put(key(1), vec![1u8, 2, 3]);

        assert_eq!(cache.get(&key(1)), Some(vec![1u8, 2, 3]));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_cache_miss() {
        let cache: RenderCache<u32> = RenderCache::new(3);
        assert!(cache.get(&key(9)).is_none());
        assert_eq!(cache.stats().misses, 1);
    }

    #[test]
    fn test_key_rounds_scale_to_two_decimals() {
        assert_eq!(CacheKey::new(1, 1.499_999, 0), CacheKey::new(1, 1.5, 0));
        assert_ne!(CacheKey::new(1, 1.51, 0), CacheKey::new(1, 1.5, 0));
        assert_eq!(CacheKey::new(1, 1.25, 90).scale(), 1.25);
    }

    #[test]
    fn test_key_distinguishes_rotation() {
        assert_ne!(CacheKey::new(1, 1.0, 0), CacheKey::new(1, 1.0, 90));
        assert_eq!(CacheKey::new(1, 1.0, 360), CacheKey::new(1, 1.0, 0));
    }

    #[test]
    fn test_lru_eviction_after_capacity_plus_one() {
        let cache = RenderCache::new(5);
        for page in 1..=6 {
            cache.put(key(page), page);
        }

        assert_eq!(cache.len(), 5);
        assert!(!cache.contains(&key(1)), "oldest entry should be evicted");
        for page in 2..=6 {
            assert!(cache.contains(&key(page)));
        }
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn test_get_protects_entry_from_eviction() {
        let cache = RenderCache::new(3);
        cache.put(key(1), 1);
        cache.put(key(2), 2);
        cache.put(key(3), 3);

        // Page 1 is the oldest until it is read
        assert_eq!(cache.get(&key(1)), Some(1));
        cache.put(key(4), 4);

        assert!(cache.contains(&key(1)));
        assert!(!cache.contains(&key(2)));
        assert!(cache.contains(&key(3)));
        assert!(cache.contains(&key(4)));
    }

    #[test]
    fn test_contains_does_not_refresh() {
        let cache = RenderCache::new(2);
        cache.put(key(1), 1);
        cache.put(key(2), 2);

        assert!(cache.contains(&key(1)));
        cache.put(key(3), 3);

        assert!(!cache.contains(&key(1)));
    }

    #[test]
    fn test_update_existing_key_does_not_evict() {
        let cache = RenderCache::new(2);
        cache.put(key(1), 1);
        cache.put(key(2), 2);
        cache.put(key(1), 10);

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.stats().evictions, 0);

        // Re-put refreshed page 1, so page 2 goes next
        cache.put(key(3), 3);
        assert_eq!(cache.get(&key(1)), Some(10));
        assert!(!cache.contains(&key(2)));
    }

    #[test]
    fn test_clear() {
        let cache = RenderCache::new(3);
        cache.put(key(1), 1);
        cache.put(key(2), 2);

        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get(&key(1)).is_none());
    }

    #[test]
    fn test_zero_capacity_is_promoted() {
        let cache = RenderCache::new(0);
        assert_eq!(cache.capacity(), 1);

        cache.put(key(1), 1);
        cache.put(key(2), 2);
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&key(2)));
    }

    #[test]
    fn test_clones_share_store() {
        let cache = RenderCache::new(2);
        let handle = cache.clone();

        handle.put(key(1), 1);
        assert_eq!(cache.get(&key(1)), Some(1));
    }

    #[test]
    fn test_stats() {
        let cache = RenderCache::new(2);
        cache.put(key(1), 1);
        cache.get(&key(1));
        cache.get(&key(1));
        cache.get(&key(2));

        let stats = cache.stats();
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.entry_count, 1);
        assert_eq!(stats.capacity, 2);
        assert!((stats.hit_rate() - 2.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn test_default_capacity() {
        let cache: RenderCache<u8> = RenderCache::default();
        assert_eq!(cache.capacity(), DEFAULT_CAPACITY);
    }

    #[test]
    fn test_random_access_matches_reference_lru() {
        // Compare against a simple Vec-based LRU (front = oldest)
        let mut rng = rand::thread_rng();
        let cache = RenderCache::new(4);
        let mut reference: Vec<u32> = Vec::new();

        for _ in 0..2000 {
            let page = rng.gen_range(1..=10);
            if rng.gen_bool(0.5) {
                let hit = cache.get(&key(page)).is_some();
                let position = reference.iter().position(|p| *p == page);
                assert_eq!(hit, position.is_some());
                if let Some(position) = position {
                    reference.remove(position);
                    reference.push(page);
                }
            } else {
                cache.put(key(page), page);
                if let Some(position) = reference.iter().position(|p| *p == page) {
                    reference.remove(position);
                } else if reference.len() == 4 {
                    reference.remove(0);
                }
                reference.push(page);
            }

            assert!(cache.len() <= 4);
            assert_eq!(cache.len(), reference.len());
        }

        for page in &reference {
            assert!(cache.contains(&key(*page)));
        }
    }
}
