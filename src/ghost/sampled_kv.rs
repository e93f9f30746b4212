//! Sampled ghost cache for variable-size key-value entries.
//!
//! Same hash-prefix sampling as [`SampledGhostCache`], but each resident
//! node also records the entry's byte footprint, so the miss-rate curve can
//! be indexed by aggregate bytes as well as by entry count. The spectrum is
//! configured in entry *counts*; [`SampledGhostKvCache::stat_curve`] pairs
//! each count with the cumulative bytes of that many most-recent entries.
//!
//! [`SampledGhostCache`]: crate::ghost::sampled::SampledGhostCache

use crate::error::ConfigError;
use crate::ghost::cache::{AccessMode, GhostCache, GhostMeta};
use crate::hash::{hash_bytes, IdHash};
use crate::stat::CacheStat;

/// Ghost metadata with a byte footprint.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct KvMeta {
    size_idx: u32,
    pub kv_size: u32,
}

impl GhostMeta for KvMeta {
    #[inline]
    fn size_idx(&self) -> u32 {
        self.size_idx
    }

    #[inline]
    fn set_size_idx(&mut self, idx: u32) {
        self.size_idx = idx;
    }
}

/// KV-size-aware sampled ghost cache.
///
/// Keys are byte strings (or pre-computed 32-bit hashes); only keys whose
/// hash has `S` leading zero bits are tracked. `tick`, `min_count` and
/// `max_count` must be multiples of `2^S`.
///
/// # Example
///
/// ```
/// use ghostkit::ghost::SampledGhostKvCache;
///
/// let mut ghost: SampledGhostKvCache<0> = SampledGhostKvCache::new(1, 2, 6);
/// ghost.access(b"alpha", 100);
/// ghost.access(b"beta", 200);
/// ghost.access(b"gamma", 300);
///
/// let curve = ghost.stat_curve();
/// // Two most recent entries hold 500 bytes.
/// assert_eq!(curve[0].0, 2);
/// assert_eq!(curve[0].1, 500);
/// ```
pub struct SampledGhostKvCache<const S: u32> {
    ghost: GhostCache<IdHash, KvMeta>,
}

impl<const S: u32> SampledGhostKvCache<S> {
    /// Creates a KV ghost cache over the counts `{min_count, …,
    /// max_count}`.
    ///
    /// # Panics
    ///
    /// Panics on an invalid spectrum; see
    /// [`SampledGhostKvCache::try_new`].
    pub fn new(tick: u32, min_count: u32, max_count: u32) -> Self {
        Self::try_new(tick, min_count, max_count).expect("invalid kv ghost cache spectrum")
    }

    /// Fallible [`SampledGhostKvCache::new`]; the preconditions of
    /// [`SampledGhostCache`](crate::ghost::sampled::SampledGhostCache)
    /// apply.
    pub fn try_new(tick: u32, min_count: u32, max_count: u32) -> Result<Self, ConfigError> {
        if S >= 32 {
            return Err(ConfigError::new("sample shift must be < 32"));
        }
        let unit = 1u32 << S;
        if tick % unit != 0 || min_count % unit != 0 || max_count % unit != 0 {
            return Err(ConfigError::new(
                "tick, min_count and max_count must be multiples of 2^S",
            ));
        }
        Ok(SampledGhostKvCache {
            ghost: GhostCache::try_with_hasher(tick >> S, min_count >> S, max_count >> S, IdHash)?,
        })
    }

    /// Spectrum quantum, in unscaled entry counts.
    #[inline]
    pub fn tick(&self) -> u32 {
        self.ghost.tick() << S
    }

    /// Smallest simulated count, unscaled.
    #[inline]
    pub fn min_count(&self) -> u32 {
        self.ghost.min_size() << S
    }

    /// Largest simulated count, unscaled.
    #[inline]
    pub fn max_count(&self) -> u32 {
        self.ghost.max_size() << S
    }

    /// Records an access to a byte-string key of `kv_size` bytes.
    pub fn access(&mut self, key: &[u8], kv_size: u32) {
        self.access_with(key, kv_size, AccessMode::Default);
    }

    /// [`SampledGhostKvCache::access`] under an explicit [`AccessMode`].
    pub fn access_with(&mut self, key: &[u8], kv_size: u32, mode: AccessMode) {
        self.access_hashed(hash_bytes(key), kv_size, mode);
    }

    /// Records an access by pre-computed key hash; hashes outside the
    /// sample are dropped.
    pub fn access_hashed(&mut self, key_hash: u32, kv_size: u32, mode: AccessMode) {
        if S != 0 && key_hash >> (32 - S) != 0 {
            return;
        }
        let h = self.ghost.access_impl(key_hash, key_hash, mode);
        self.ghost.meta_mut(h).kv_size = kv_size;
    }

    /// Overwrites the recorded byte footprint of a resident key without
    /// refreshing its LRU position. Returns `false` when the key is not
    /// sampled or not resident. Applying the same update twice is a no-op.
    pub fn update_size(&mut self, key: &[u8], kv_size: u32) -> bool {
        self.update_size_hashed(hash_bytes(key), kv_size)
    }

    /// [`SampledGhostKvCache::update_size`] by pre-computed key hash.
    pub fn update_size_hashed(&mut self, key_hash: u32, kv_size: u32) -> bool {
        if S != 0 && key_hash >> (32 - S) != 0 {
            return false;
        }
        match self.ghost.peek_meta_mut(key_hash, key_hash) {
            Some(meta) => {
                meta.kv_size = kv_size;
                true
            }
            None => false,
        }
    }

    /// Hit/miss counts for a cache of `count` (unscaled) entries.
    ///
    /// # Panics
    ///
    /// Panics when `count` is not a spectrum size.
    pub fn stat(&self, count: u32) -> CacheStat {
        assert_eq!(count % (1 << S), 0, "count must be a multiple of 2^S");
        self.ghost.stat(count >> S)
    }

    /// Hit rate estimate at `count` entries.
    pub fn hit_rate(&self, count: u32) -> f64 {
        self.stat(count).hit_rate()
    }

    /// Miss rate estimate at `count` entries.
    pub fn miss_rate(&self, count: u32) -> f64 {
        self.stat(count).miss_rate()
    }

    /// See [`GhostCache::reset_stat`].
    pub fn reset_stat(&mut self) {
        self.ghost.reset_stat();
    }

    /// The miss-rate curve with byte footprints: walks the resident
    /// entries newest to oldest and emits `(count, bytes, stat)` at every
    /// spectrum size, both scaled back up by `2^S`.
    ///
    /// When the working set is smaller than `max_count`, one final point
    /// is emitted at the next spectrum size at or above the working-set
    /// count (carrying the same cumulative bytes), so the curve always
    /// covers the whole resident set.
    pub fn stat_curve(&self) -> Vec<(u32, u64, CacheStat)> {
        let tick = self.ghost.tick();
        let min = self.ghost.min_size();
        let max = self.ghost.max_size();
        let inner = self.ghost.inner();

        let mut curve = Vec::new();
        let mut count: u32 = 0;
        let mut bytes: u64 = 0;
        for h in inner.iter_mru() {
            bytes += u64::from(inner.value(h).kv_size);
            count += 1;
            if count >= min && (count - min) % tick == 0 {
                curve.push((count << S, bytes << S, self.ghost.stat(count)));
            }
        }
        if count < max {
            let aligned = if count <= min {
                min
            } else {
                min + (count - min).div_ceil(tick) * tick
            };
            let emitted = curve.last().is_some_and(|&(c, _, _)| c == aligned << S);
            if !emitted {
                curve.push((aligned << S, bytes << S, self.ghost.stat(aligned)));
            }
        }
        curve
    }
}
