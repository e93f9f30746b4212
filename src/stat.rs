//! Hit/miss counters.
//!
//! [`CacheStat`] is the racy-fast flavor: two plain `u64`s. A reader on
//! another thread may observe a torn pair (a hit counted but not yet the
//! matching access); the inaccuracy is tolerable for profiling and the
//! atomics were measured too expensive to be the default. Callers that need
//! a consistent cross-thread snapshot use [`AtomicCacheStat`].

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Hit/miss pair for one simulated cache size.
///
/// The hit rate of an *empty* stat is reported as `f64::INFINITY`: it is a
/// sentinel for "no accesses recorded", distinguishable from a real 0% or
/// 100% rate. [`CacheStat`]'s `Display` prints `NAN` for that case.
///
/// # Example
///
/// ```
/// use ghostkit::stat::CacheStat;
///
/// let mut stat = CacheStat::default();
/// assert!(stat.hit_rate().is_infinite());
///
/// stat.add_hit();
/// stat.add_miss();
/// stat.add_miss();
/// assert_eq!(stat.acc_cnt(), 3);
/// assert!((stat.hit_rate() - 1.0 / 3.0).abs() < 1e-12);
/// ```
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStat {
    pub hit_cnt: u64,
    pub miss_cnt: u64,
}

impl CacheStat {
    /// Records one hit.
    #[inline]
    pub fn add_hit(&mut self) {
        self.hit_cnt += 1;
    }

    /// Records one miss.
    #[inline]
    pub fn add_miss(&mut self) {
        self.miss_cnt += 1;
    }

    /// Total accesses recorded.
    #[inline]
    pub fn acc_cnt(&self) -> u64 {
        self.hit_cnt + self.miss_cnt
    }

    /// Fraction of accesses that hit; `f64::INFINITY` if none recorded.
    #[inline]
    pub fn hit_rate(&self) -> f64 {
        let acc = self.acc_cnt();
        if acc == 0 {
            return f64::INFINITY;
        }
        self.hit_cnt as f64 / acc as f64
    }

    /// Fraction of accesses that missed; `f64::INFINITY` if none recorded.
    #[inline]
    pub fn miss_rate(&self) -> f64 {
        let acc = self.acc_cnt();
        if acc == 0 {
            return f64::INFINITY;
        }
        self.miss_cnt as f64 / acc as f64
    }

    /// Zeroes both counters.
    #[inline]
    pub fn reset(&mut self) {
        self.hit_cnt = 0;
        self.miss_cnt = 0;
    }

    /// Formats the stat with counters padded to `width` columns, the shape
    /// used by table printers: `" 66.7% (       2/       3)"`.
    pub fn format_padded(&self, width: usize) -> String {
        let acc = self.acc_cnt();
        if acc == 0 {
            return format!("  NAN ({:>width$}/{:>width$})", self.hit_cnt, acc);
        }
        format!(
            "{:5.1}% ({:>width$}/{:>width$})",
            self.hit_rate() * 100.0,
            self.hit_cnt,
            acc
        )
    }
}

impl fmt::Display for CacheStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_padded(0))
    }
}

/// Tear-free variant of [`CacheStat`] for cross-thread readers.
///
/// Counters use relaxed atomics: individually exact, mutually unordered.
/// [`AtomicCacheStat::snapshot`] yields a plain [`CacheStat`] to feed the
/// rate/format helpers.
#[derive(Debug, Default)]
pub struct AtomicCacheStat {
    hit_cnt: AtomicU64,
    miss_cnt: AtomicU64,
}

impl AtomicCacheStat {
    /// Records one hit.
    #[inline]
    pub fn add_hit(&self) {
        self.hit_cnt.fetch_add(1, Ordering::Relaxed);
    }

    /// Records one miss.
    #[inline]
    pub fn add_miss(&self) {
        self.miss_cnt.fetch_add(1, Ordering::Relaxed);
    }

    /// Copies both counters into a plain [`CacheStat`].
    #[inline]
    pub fn snapshot(&self) -> CacheStat {
        CacheStat {
            hit_cnt: self.hit_cnt.load(Ordering::Relaxed),
            miss_cnt: self.miss_cnt.load(Ordering::Relaxed),
        }
    }

    /// Zeroes both counters.
    pub fn reset(&self) {
        self.hit_cnt.store(0, Ordering::Relaxed);
        self.miss_cnt.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_stat_reports_infinity() {
        let stat = CacheStat::default();
        assert!(stat.hit_rate().is_infinite());
        assert!(stat.miss_rate().is_infinite());
    }

    #[test]
    fn rates_sum_to_one() {
        let mut stat = CacheStat::default();
        for _ in 0..3 {
            stat.add_hit();
        }
        stat.add_miss();
        assert!((stat.hit_rate() + stat.miss_rate() - 1.0).abs() < 1e-12);
        assert_eq!(stat.acc_cnt(), 4);
    }

    #[test]
    fn reset_zeroes_counters() {
        let mut stat = CacheStat {
            hit_cnt: 5,
            miss_cnt: 7,
        };
        stat.reset();
        assert_eq!(stat, CacheStat::default());
    }

    #[test]
    fn display_empty_prints_nan() {
        let stat = CacheStat::default();
        assert_eq!(stat.to_string(), "  NAN (0/0)");
    }

    #[test]
    fn display_prints_percentage() {
        let stat = CacheStat {
            hit_cnt: 1,
            miss_cnt: 2,
        };
        assert_eq!(stat.to_string(), " 33.3% (1/3)");
    }

    #[test]
    fn format_padded_width() {
        let stat = CacheStat {
            hit_cnt: 2,
            miss_cnt: 1,
        };
        assert_eq!(stat.format_padded(4), " 66.7% (   2/   3)");
    }

    #[test]
    fn atomic_snapshot_roundtrip() {
        let stat = AtomicCacheStat::default();
        stat.add_hit();
        stat.add_hit();
        stat.add_miss();
        assert_eq!(
            stat.snapshot(),
            CacheStat {
                hit_cnt: 2,
                miss_cnt: 1
            }
        );
        stat.reset();
        assert_eq!(stat.snapshot(), CacheStat::default());
    }
}
