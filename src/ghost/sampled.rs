//! Spatially sampled ghost cache.
//!
//! Keeps only the keys whose hash has `S` leading zero bits (a uniform
//! 1-in-`2^S` sample of the key space) and runs the exact engine over a
//! spectrum shifted right by `S`. Reported sizes are scaled back up, so the
//! curve converges to the unsampled one at `2^S` times less memory and CPU.
//!
//! The inner cache is keyed by the hash itself (identity-hashed): once a
//! key has passed the gate its hash is as good an identity as the key, and
//! hashing twice would be wasted work.

use crate::error::ConfigError;
use crate::ghost::cache::{AccessMode, GhostCache};
use crate::hash::{Hash32, IdHash, PageHash};
use crate::stat::CacheStat;

/// Ghost cache sampling 1 in `2^S` keys by hash prefix.
///
/// `tick`, `min_size` and `max_size` must all be multiples of `2^S`, and
/// the spectrum must leave the top `S` hash bits free for the gate
/// (`ceil_log2(max_size) + S <= 32`).
///
/// # Example
///
/// ```
/// use ghostkit::ghost::SampledGhostCache;
///
/// let mut ghost: SampledGhostCache<2> = SampledGhostCache::new(4, 8, 16);
/// for key in 0..10_000u32 {
///     ghost.access(key);
/// }
/// assert_eq!(ghost.max_size(), 16);
/// let _curve_point = ghost.stat(8);
/// ```
pub struct SampledGhostCache<const S: u32, H = PageHash> {
    ghost: GhostCache<IdHash, u32>,
    hasher: H,
}

impl<const S: u32> SampledGhostCache<S> {
    /// Creates a sampled ghost cache over `{min_size, …, max_size}`.
    ///
    /// # Panics
    ///
    /// Panics on an invalid spectrum; see
    /// [`SampledGhostCache::try_new`].
    pub fn new(tick: u32, min_size: u32, max_size: u32) -> SampledGhostCache<S> {
        Self::try_new(tick, min_size, max_size).expect("invalid sampled ghost cache spectrum")
    }

    /// Fallible [`SampledGhostCache::new`].
    pub fn try_new(tick: u32, min_size: u32, max_size: u32) -> Result<SampledGhostCache<S>, ConfigError> {
        Self::try_with_hasher(tick, min_size, max_size, PageHash)
    }
}

impl<const S: u32, H> SampledGhostCache<S, H>
where
    H: Hash32<u32>,
{
    /// [`SampledGhostCache::try_new`] with an explicit hash function.
    pub fn try_with_hasher(
        tick: u32,
        min_size: u32,
        max_size: u32,
        hasher: H,
    ) -> Result<Self, ConfigError> {
        if S >= 32 {
            return Err(ConfigError::new("sample shift must be < 32"));
        }
        let unit = 1u32 << S;
        if tick % unit != 0 || min_size % unit != 0 || max_size % unit != 0 {
            return Err(ConfigError::new(
                "tick, min_size and max_size must be multiples of 2^S",
            ));
        }
        if ceil_log2(max_size) + S > 32 {
            return Err(ConfigError::new(
                "spectrum too wide: top S hash bits must stay free for sampling",
            ));
        }
        Ok(SampledGhostCache {
            ghost: GhostCache::try_with_hasher(tick >> S, min_size >> S, max_size >> S, IdHash)?,
            hasher,
        })
    }

    /// The sampling shift `S`.
    #[inline]
    pub const fn sample_shift(&self) -> u32 {
        S
    }

    /// Spectrum quantum, in unscaled entries.
    #[inline]
    pub fn tick(&self) -> u32 {
        self.ghost.tick() << S
    }

    /// Smallest simulated size, unscaled.
    #[inline]
    pub fn min_size(&self) -> u32 {
        self.ghost.min_size() << S
    }

    /// Largest simulated size, unscaled.
    #[inline]
    pub fn max_size(&self) -> u32 {
        self.ghost.max_size() << S
    }

    /// Records an access; keys outside the sample are dropped.
    pub fn access(&mut self, key: u32) {
        self.access_with(key, AccessMode::Default);
    }

    /// Records an access under the given [`AccessMode`]; keys outside the
    /// sample are dropped.
    pub fn access_with(&mut self, key: u32, mode: AccessMode) {
        let hash = self.hasher.hash32(&key);
        if S != 0 && hash >> (32 - S) != 0 {
            return;
        }
        self.ghost.access_impl(hash, hash, mode);
    }

    /// Hit/miss counts for a cache of `cache_size` (unscaled) entries.
    ///
    /// The returned counts are of *sampled* accesses; rates estimate the
    /// full stream's.
    ///
    /// # Panics
    ///
    /// Panics when `cache_size` is not a spectrum size.
    pub fn stat(&self, cache_size: u32) -> CacheStat {
        assert_eq!(
            cache_size % (1 << S),
            0,
            "cache size must be a multiple of 2^S"
        );
        self.ghost.stat(cache_size >> S)
    }

    /// Hit rate estimate at `cache_size` (unscaled).
    pub fn hit_rate(&self, cache_size: u32) -> f64 {
        self.stat(cache_size).hit_rate()
    }

    /// Miss rate estimate at `cache_size` (unscaled).
    pub fn miss_rate(&self, cache_size: u32) -> f64 {
        self.stat(cache_size).miss_rate()
    }

    /// See [`GhostCache::reset_stat`].
    pub fn reset_stat(&mut self) {
        self.ghost.reset_stat();
    }
}

/// Smallest `n` with `2^n >= x`; 0 for `x <= 1`.
fn ceil_log2(x: u32) -> u32 {
    if x <= 1 {
        0
    } else {
        32 - (x - 1).leading_zeros()
    }
}
