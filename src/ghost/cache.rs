//! Ghost cache: one LRU, every cache size at once.
//!
//! A ghost cache holds no data, only metadata. From a single stream of
//! accesses it reports the hit rate that *every* cache size in the spectrum
//! `{min, min+tick, …, max}` would have achieved, by running one LRU of
//! capacity `max` and keeping a small set of size-boundary markers that
//! partition its list.
//!
//! ## Boundaries
//!
//! With `N` spectrum sizes, each resident node's metadata stores its
//! `size_idx`: the smallest `k` such that a cache of `min + k*tick` entries
//! would still hold it. Walking from the newest end, the first `min` nodes
//! have index 0, the next `tick` have index 1, and so on. `boundaries[k]`
//! points at the *oldest* node of index `k`: the first victim of a cache
//! sized exactly `min + k*tick`.
//!
//! ```text
//!   min=2, tick=2:   oldest  A    B    C    D    E  newest
//!   size_idx:                2    1    1    0    0
//!   boundaries:                  [1]       [0]
//!
//!   access(B):       oldest  A    C    D    E    B  newest
//!   size_idx:                2    1    1    0    0
//!   boundaries:                  [1]       [0]
//!
//!   (B was boundary 1, so that boundary moved to B's successor C;
//!    boundary 0 slid from D to E, bumping D into the next band.)
//! ```
//!
//! On each access every boundary below the accessed node's index advances
//! one step toward the newest end, incrementing the index of the node it
//! leaves behind. That is O(N) boundary steps but O(1) counter work: the
//! access lands in one bin of a reuse-distance histogram, and the per-size
//! hit/miss array is rebuilt from the histogram by prefix sum only when
//! queried.
//!
//! ## In-use list stays empty
//!
//! The inner LRU's pin machinery is never exercised: `access` goes through
//! the unpinned `refresh` fast-path, so allocation cannot fail.

use std::cell::RefCell;
use std::fmt;

use parking_lot::Mutex;

use crate::error::ConfigError;
use crate::hash::{Hash32, IdHash, PageHash};
use crate::policy::lru::{Handle, LruCache};
use crate::stat::CacheStat;

/// How an access contributes to the hit/miss counters.
///
/// The LRU state always advances; only the accounting differs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Count a hit at the access's reuse distance, or a miss.
    #[default]
    Default,
    /// Count a miss for every size (e.g. a forced fetch).
    AsMiss,
    /// Count a hit for every size (e.g. a write that allocates).
    AsHit,
    /// No counter update; used for pre-heating and checkpoint replay.
    Noop,
}

/// Node metadata of a ghost cache; must carry the size index.
pub trait GhostMeta: Default {
    fn size_idx(&self) -> u32;
    fn set_size_idx(&mut self, idx: u32);
}

impl GhostMeta for u32 {
    #[inline]
    fn size_idx(&self) -> u32 {
        *self
    }

    #[inline]
    fn set_size_idx(&mut self, idx: u32) {
        *self = idx;
    }
}

/// Simulates a whole spectrum of LRU cache sizes at once.
///
/// # Example
///
/// ```
/// use ghostkit::ghost::GhostCache;
///
/// let mut ghost = GhostCache::new(1, 3, 6);
/// for key in [0, 1, 2, 3, 1] {
///     ghost.access(key);
/// }
/// // The reuse of key 1 hits in a 3-entry cache and everything larger.
/// assert_eq!(ghost.stat(3).hit_cnt, 1);
/// assert_eq!(ghost.stat(6).miss_cnt, 4);
/// ```
pub struct GhostCache<H = PageHash, M = u32> {
    tick: u32,
    min_size: u32,
    max_size: u32,
    num_ticks: u32,
    lru_size: u32,
    cache: LruCache<u32, M, IdHash>,
    boundaries: Vec<Option<Handle>>,
    reuse_distances: Vec<u64>,
    reuse_count: u64,
    // Materialized per-size stats, rebuilt lazily on query.
    caches_stat: RefCell<Vec<CacheStat>>,
    hasher: H,
}

impl GhostCache {
    /// Creates a ghost cache for the sizes `{min_size, min_size + tick, …,
    /// max_size}`.
    ///
    /// # Panics
    ///
    /// Panics on an invalid spectrum; see [`GhostCache::try_new`].
    pub fn new(tick: u32, min_size: u32, max_size: u32) -> GhostCache {
        Self::try_new(tick, min_size, max_size).expect("invalid ghost cache spectrum")
    }

    /// Fallible [`GhostCache::new`]: requires `tick > 0`, `min_size > 1`,
    /// `max_size` aligned to the spectrum, and at least 3 sizes.
    pub fn try_new(tick: u32, min_size: u32, max_size: u32) -> Result<GhostCache, ConfigError> {
        GhostCache::try_with_hasher(tick, min_size, max_size, PageHash)
    }
}

impl<H, M> GhostCache<H, M>
where
    H: Hash32<u32>,
    M: GhostMeta,
{
    /// [`GhostCache::try_new`] with an explicit hash function.
    pub fn try_with_hasher(
        tick: u32,
        min_size: u32,
        max_size: u32,
        hasher: H,
    ) -> Result<Self, ConfigError> {
        if tick == 0 {
            return Err(ConfigError::new("tick must be > 0"));
        }
        if min_size <= 1 {
            return Err(ConfigError::new("min_size must be > 1"));
        }
        if max_size < min_size {
            return Err(ConfigError::new("max_size must be >= min_size"));
        }
        if (max_size - min_size) % tick != 0 {
            return Err(ConfigError::new(
                "max_size - min_size must be a multiple of tick",
            ));
        }
        let num_ticks = (max_size - min_size) / tick + 1;
        if num_ticks < 3 {
            return Err(ConfigError::new("spectrum needs at least 3 sizes"));
        }
        Ok(GhostCache {
            tick,
            min_size,
            max_size,
            num_ticks,
            lru_size: 0,
            cache: LruCache::with_hasher(max_size as usize, IdHash),
            boundaries: vec![None; (num_ticks - 1) as usize],
            reuse_distances: vec![0; num_ticks as usize],
            reuse_count: 0,
            caches_stat: RefCell::new(vec![CacheStat::default(); num_ticks as usize]),
            hasher,
        })
    }

    /// Spectrum quantum.
    #[inline]
    pub fn tick(&self) -> u32 {
        self.tick
    }

    /// Smallest simulated size.
    #[inline]
    pub fn min_size(&self) -> u32 {
        self.min_size
    }

    /// Largest simulated size (inclusive).
    #[inline]
    pub fn max_size(&self) -> u32 {
        self.max_size
    }

    /// Number of keys currently resident in the simulated LRU.
    #[inline]
    pub fn lru_len(&self) -> u32 {
        self.lru_size
    }

    /// Records an access to `key` with default accounting.
    pub fn access(&mut self, key: u32) {
        self.access_with(key, AccessMode::Default);
    }

    /// Records an access to `key` under the given [`AccessMode`].
    pub fn access_with(&mut self, key: u32, mode: AccessMode) {
        let hash = self.hasher.hash32(&key);
        self.access_impl(key, hash, mode);
    }

    pub(crate) fn access_impl(&mut self, key: u32, hash: u32, mode: AccessMode) -> Handle {
        let (h, successor) = self
            .cache
            .refresh_hashed(key, hash)
            .expect("ghost cache allocation cannot fail: in_use list is always empty");

        let size_idx;
        match successor {
            // Hit: if the node was itself a boundary, its successor takes
            // over (the node just moved to the newest position).
            Some(s) => {
                size_idx = self.cache.value(h).size_idx();
                if size_idx + 1 < self.num_ticks
                    && self.boundaries[size_idx as usize] == Some(h)
                {
                    self.boundaries[size_idx as usize] = Some(s);
                }
            }
            // Miss: the list may have grown; if it just reached a spectrum
            // size, that size's boundary is the current oldest node.
            None => {
                debug_assert!(self.lru_size <= self.max_size);
                if self.lru_size < self.max_size {
                    self.lru_size += 1;
                }
                let s = self.lru_size;
                size_idx = if s > self.min_size {
                    (s - self.min_size).div_ceil(self.tick)
                } else {
                    0
                };
                if size_idx + 1 < self.num_ticks && s == self.min_size + size_idx * self.tick {
                    self.boundaries[size_idx as usize] = self.cache.oldest();
                }
            }
        }

        // Every boundary below the accessed node's band slides one step
        // toward the newest end; the node it leaves behind now belongs to
        // the next band up.
        for i in 0..size_idx as usize {
            if let Some(b) = self.boundaries[i] {
                let meta = self.cache.value_mut(b);
                meta.set_size_idx(meta.size_idx() + 1);
                self.boundaries[i] = self.cache.next_newer(b);
            }
        }
        self.cache.value_mut(h).set_size_idx(0);

        match mode {
            AccessMode::Default => {
                if successor.is_some() {
                    self.reuse_distances[size_idx as usize] += 1;
                }
                self.reuse_count += 1;
            }
            AccessMode::AsMiss => self.reuse_count += 1,
            AccessMode::AsHit => {
                self.reuse_distances[0] += 1;
                self.reuse_count += 1;
            }
            AccessMode::Noop => {}
        }
        h
    }

    /// Hit/miss counts a cache of `cache_size` entries would have seen.
    ///
    /// # Panics
    ///
    /// Panics when `cache_size` lies outside the spectrum or off the tick
    /// grid.
    pub fn stat(&self, cache_size: u32) -> CacheStat {
        assert!(
            (self.min_size..=self.max_size).contains(&cache_size),
            "cache size outside the simulated spectrum"
        );
        assert_eq!(
            (cache_size - self.min_size) % self.tick,
            0,
            "cache size not on the tick grid"
        );
        let k = ((cache_size - self.min_size) / self.tick) as usize;
        let mut stats = self.caches_stat.borrow_mut();
        let entry = stats[k];
        if entry.acc_cnt() != self.reuse_count {
            // Stale: rebuild every size in one prefix-sum pass.
            let mut hits = 0u64;
            for (i, st) in stats.iter_mut().enumerate() {
                hits += self.reuse_distances[i];
                st.hit_cnt = hits;
                st.miss_cnt = self.reuse_count - hits;
            }
        }
        stats[k]
    }

    /// Hit rate at `cache_size`; `f64::INFINITY` before any counted access.
    pub fn hit_rate(&self, cache_size: u32) -> f64 {
        self.stat(cache_size).hit_rate()
    }

    /// Miss rate at `cache_size`; `f64::INFINITY` before any counted access.
    pub fn miss_rate(&self, cache_size: u32) -> f64 {
        self.stat(cache_size).miss_rate()
    }

    /// Zeroes the histogram and access count. The simulated LRU (and the
    /// boundaries) are left untouched, so profiling can restart against a
    /// warm list.
    pub fn reset_stat(&mut self) {
        self.reuse_distances.fill(0);
        self.reuse_count = 0;
        for st in self.caches_stat.borrow_mut().iter_mut() {
            st.reset();
        }
    }

    /// Resident keys, oldest first. Replaying this sequence with
    /// [`AccessMode::Noop`] into another ghost cache (any spectrum)
    /// reproduces the LRU order.
    pub fn iter_lru(&self) -> impl Iterator<Item = u32> + '_ {
        self.cache.iter_lru().map(|h| self.cache.key(h))
    }

    /// Keys of the current boundary nodes, oldest-surviving per size;
    /// `None` where a size has not filled yet. Diagnostics and tests.
    pub fn boundary_keys(&self) -> Vec<Option<u32>> {
        self.boundaries
            .iter()
            .map(|b| b.map(|h| self.cache.key(h)))
            .collect()
    }

    #[inline]
    pub(crate) fn inner(&self) -> &LruCache<u32, M, IdHash> {
        &self.cache
    }

    #[inline]
    pub(crate) fn meta_mut(&mut self, h: Handle) -> &mut M {
        self.cache.value_mut(h)
    }

    /// Table-only metadata access; no LRU movement.
    pub(crate) fn peek_meta_mut(&mut self, key: u32, hash: u32) -> Option<&mut M> {
        let h = self.cache.peek_hashed(key, hash)?;
        Some(self.cache.value_mut(h))
    }
}

impl<H, M> fmt::Debug for GhostCache<H, M>
where
    H: Hash32<u32>,
    M: GhostMeta,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GhostCache")
            .field("tick", &self.tick)
            .field("min_size", &self.min_size)
            .field("max_size", &self.max_size)
            .field("lru", &self.iter_lru().collect::<Vec<_>>())
            .field("boundaries", &self.boundary_keys())
            .finish()
    }
}

/// [`GhostCache`] behind a `parking_lot::Mutex` for callers that profile
/// from several threads. Every access mutates the LRU, so there is nothing
/// to gain from a reader/writer split.
pub struct ConcurrentGhostCache<H = PageHash, M = u32> {
    inner: Mutex<GhostCache<H, M>>,
}

impl ConcurrentGhostCache {
    /// See [`GhostCache::new`].
    ///
    /// # Panics
    ///
    /// Panics on an invalid spectrum.
    pub fn new(tick: u32, min_size: u32, max_size: u32) -> ConcurrentGhostCache {
        ConcurrentGhostCache {
            inner: Mutex::new(GhostCache::new(tick, min_size, max_size)),
        }
    }
}

impl<H, M> ConcurrentGhostCache<H, M>
where
    H: Hash32<u32>,
    M: GhostMeta,
{
    /// Records an access with default accounting.
    pub fn access(&self, key: u32) {
        self.inner.lock().access(key);
    }

    /// Records an access under the given [`AccessMode`].
    pub fn access_with(&self, key: u32, mode: AccessMode) {
        self.inner.lock().access_with(key, mode);
    }

    /// See [`GhostCache::stat`].
    pub fn stat(&self, cache_size: u32) -> CacheStat {
        self.inner.lock().stat(cache_size)
    }

    /// See [`GhostCache::hit_rate`].
    pub fn hit_rate(&self, cache_size: u32) -> f64 {
        self.inner.lock().hit_rate(cache_size)
    }

    /// See [`GhostCache::miss_rate`].
    pub fn miss_rate(&self, cache_size: u32) -> f64 {
        self.inner.lock().miss_rate(cache_size)
    }

    /// See [`GhostCache::reset_stat`].
    pub fn reset_stat(&self) {
        self.inner.lock().reset_stat();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(ghost: &GhostCache, sizes: &[u32]) -> Vec<(u64, u64)> {
        sizes
            .iter()
            .map(|&s| {
                let st = ghost.stat(s);
                (st.hit_cnt, st.acc_cnt())
            })
            .collect()
    }

    #[test]
    fn try_new_validates_spectrum() {
        assert!(GhostCache::try_new(0, 3, 6).is_err());
        assert!(GhostCache::try_new(1, 1, 6).is_err());
        assert!(GhostCache::try_new(4, 3, 6).is_err());
        assert!(GhostCache::try_new(2, 4, 6).is_err()); // only 2 sizes
        assert!(GhostCache::try_new(1, 3, 6).is_ok());
    }

    #[test]
    fn cold_fill_counts_only_misses() {
        let mut ghost = GhostCache::new(1, 3, 6);
        for key in 0..4 {
            ghost.access(key);
        }
        assert_eq!(ghost.lru_len(), 4);
        for size in 3..=6 {
            let st = ghost.stat(size);
            assert_eq!(st.hit_cnt, 0);
            assert_eq!(st.miss_cnt, 4);
        }
    }

    #[test]
    fn boundaries_track_spectrum_fill() {
        // The worked sequence from the engine's design: tick=1, sizes 3..=6.
        let mut ghost = GhostCache::new(1, 3, 6);
        for key in [0, 1, 2, 3] {
            ghost.access(key);
        }
        assert_eq!(ghost.boundary_keys(), vec![Some(1), Some(0), None]);

        ghost.access(4);
        ghost.access(5);
        assert_eq!(ghost.boundary_keys(), vec![Some(3), Some(2), Some(1)]);
        assert_eq!(stats(&ghost, &[3, 4, 5, 6]), vec![(0, 6); 4]);

        ghost.access(2);
        assert_eq!(ghost.boundary_keys(), vec![Some(4), Some(3), Some(1)]);
        assert_eq!(
            stats(&ghost, &[3, 4, 5, 6]),
            vec![(0, 7), (1, 7), (1, 7), (1, 7)]
        );

        ghost.access(4);
        assert_eq!(ghost.boundary_keys(), vec![Some(5), Some(3), Some(1)]);
        assert_eq!(
            stats(&ghost, &[3, 4, 5, 6]),
            vec![(1, 8), (2, 8), (2, 8), (2, 8)]
        );
    }

    #[test]
    fn access_modes_only_change_accounting() {
        let mut ghost = GhostCache::new(1, 3, 6);
        for key in [0, 1, 2, 3, 4, 5, 2, 4] {
            ghost.access(key);
        }
        // AS_MISS: LRU still moves, but every size records a miss.
        ghost.access_with(2, AccessMode::AsMiss);
        assert_eq!(ghost.boundary_keys(), vec![Some(5), Some(3), Some(1)]);
        assert_eq!(
            stats(&ghost, &[3, 4, 5, 6]),
            vec![(1, 9), (2, 9), (2, 9), (2, 9)]
        );

        // AS_HIT: every size records a hit.
        ghost.access_with(0, AccessMode::AsHit);
        assert_eq!(ghost.boundary_keys(), vec![Some(4), Some(5), Some(3)]);
        assert_eq!(
            stats(&ghost, &[3, 4, 5, 6]),
            vec![(2, 10), (3, 10), (3, 10), (3, 10)]
        );

        // NOOP: the LRU and boundaries advance, counters freeze.
        ghost.access_with(7, AccessMode::Noop);
        assert_eq!(ghost.boundary_keys(), vec![Some(2), Some(4), Some(5)]);
        assert_eq!(
            stats(&ghost, &[3, 4, 5, 6]),
            vec![(2, 10), (3, 10), (3, 10), (3, 10)]
        );
    }

    #[test]
    fn wider_tick_ceils_the_band() {
        // tick=2, sizes {2, 4, 6}: mirrors the second reference walk.
        let mut ghost = GhostCache::new(2, 2, 6);
        for key in [0, 1, 2, 3] {
            ghost.access(key);
        }
        assert_eq!(ghost.boundary_keys(), vec![Some(2), Some(0)]);
        ghost.access(4);
        ghost.access(5);
        assert_eq!(ghost.boundary_keys(), vec![Some(4), Some(2)]);
        ghost.access(6);
        ghost.access(7);
        assert_eq!(ghost.boundary_keys(), vec![Some(6), Some(4)]);
        // Key 1 was evicted from the 6-entry list: a miss everywhere.
        ghost.access(1);
        assert_eq!(ghost.boundary_keys(), vec![Some(7), Some(5)]);
        assert_eq!(stats(&ghost, &[2, 4, 6]), vec![(0, 9); 3]);
        // Key 4 sits in the 6-band: hit only at size 6.
        ghost.access(4);
        assert_eq!(ghost.boundary_keys(), vec![Some(1), Some(6)]);
        assert_eq!(
            stats(&ghost, &[2, 4, 6]),
            vec![(0, 10), (0, 10), (1, 10)]
        );
    }

    #[test]
    fn hit_counts_are_monotone_in_size() {
        let mut ghost = GhostCache::new(2, 2, 10);
        for i in 0u32..400 {
            ghost.access((i * 7) % 23);
        }
        let mut prev = 0;
        for size in (2..=10).step_by(2) {
            let st = ghost.stat(size);
            assert!(st.hit_cnt >= prev, "hits must not shrink with size");
            assert_eq!(st.acc_cnt(), 400);
            prev = st.hit_cnt;
        }
    }

    #[test]
    fn reset_stat_keeps_the_lru_warm() {
        let mut ghost = GhostCache::new(1, 3, 6);
        for key in [0, 1, 2, 0, 1, 2] {
            ghost.access(key);
        }
        let resident: Vec<u32> = ghost.iter_lru().collect();
        ghost.reset_stat();
        assert_eq!(ghost.stat(3), CacheStat::default());
        assert_eq!(ghost.iter_lru().collect::<Vec<u32>>(), resident);
        // A warm hit right after reset is counted as a hit.
        ghost.access(2);
        assert_eq!(ghost.stat(3).hit_cnt, 1);
    }

    #[test]
    fn stat_total_matches_access_count() {
        let mut ghost = GhostCache::new(1, 3, 6);
        for i in 0u32..50 {
            ghost.access(i % 9);
        }
        for size in 3..=6 {
            assert_eq!(ghost.stat(size).acc_cnt(), 50);
        }
    }

    #[test]
    #[should_panic(expected = "tick grid")]
    fn misaligned_stat_query_panics() {
        let mut ghost = GhostCache::new(2, 2, 6);
        ghost.access(1);
        let _ = ghost.stat(3);
    }

    #[test]
    #[should_panic(expected = "outside the simulated spectrum")]
    fn out_of_range_stat_query_panics() {
        let ghost = GhostCache::new(2, 2, 6);
        let _ = ghost.stat(8);
    }

    #[test]
    fn concurrent_wrapper_smoke() {
        let ghost = ConcurrentGhostCache::new(1, 3, 6);
        for key in [0, 1, 2, 1] {
            ghost.access(key);
        }
        assert_eq!(ghost.stat(3).hit_cnt, 1);
        assert!((ghost.hit_rate(3) - 0.25).abs() < 1e-12);
        assert!((ghost.miss_rate(3) - 0.75).abs() < 1e-12);
        ghost.reset_stat();
        assert_eq!(ghost.stat(3).acc_cnt(), 0);
    }
}
