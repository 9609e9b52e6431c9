//! Variable-width bucketed histogram with robust statistics.
//!
//! Observations are unsigned 64-bit integers, typically nanosecond
//! durations. Memory stays bounded at [`MAX_BUCKETS`] buckets no matter how
//! many observations arrive: every read first compacts, sorting buckets and
//! merging neighbors until populations level out. Statistics are
//! quantile-based (trimean, interquartile range) rather than moment-based, so
//! a few pathological observations cannot dominate the summary.

use alloc::format;
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::math;

/// Maximum number of buckets held at any time.
pub const MAX_BUCKETS: usize = 256;

/// IQR-to-sigma scale for a normal distribution, 2·√2·erfc(0.5).
const IQR_UNBIASED: f64 = 1.356_231_151_912_69;

/// Proportion of a normal distribution lying beyond ±6σ, one tail.
const SIX_SIGMA_TAIL: f64 = (1.0 - 0.999_999_998_026_825) / 2.0;

const SPAN_BITS: u32 = 40;
const COUNT_BITS: u32 = 24;
const MAX_SPAN: u64 = (1 << SPAN_BITS) - 1;
const MAX_BUCKET_COUNT: u64 = (1 << COUNT_BITS) - 1;

/// A run of observations summarized as a closed range plus a population.
///
/// The span (40 bits, about 10^12, 78 hours in nanoseconds) and the
/// population (24 bits, about 1.6×10^7) share one word. Ranking interpolates
/// linearly inside the range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Bucket {
    observation_min: u64,
    // span in the high bits, population in the low COUNT_BITS
    span_count: u64,
}

impl Bucket {
    fn single(observation: u64) -> Self {
        Self {
            observation_min: observation,
            span_count: 1,
        }
    }

    fn min(self) -> u64 {
        self.observation_min
    }

    fn max(self) -> u64 {
        self.observation_min.saturating_add(self.span())
    }

    fn span(self) -> u64 {
        self.span_count >> COUNT_BITS
    }

    fn count(self) -> u64 {
        self.span_count & MAX_BUCKET_COUNT
    }

    fn merge(&mut self, other: Bucket) {
        let min = self.min().min(other.min());
        let max = self.max().max(other.max());
        let combined = self.count() + other.count();
        debug_assert!(combined <= MAX_BUCKET_COUNT, "bucket population overflow");
        let count = combined.min(MAX_BUCKET_COUNT);
        let span = (max - min).min(MAX_SPAN);
        self.observation_min = min;
        self.span_count = (span << COUNT_BITS) | count;
    }

    fn overlaps(self, other: Bucket) -> bool {
        self.min() <= other.max() && self.max() >= other.min()
    }

    fn contains_rank(self, rank: u64) -> bool {
        rank >= 1 && rank <= self.count()
    }

    /// Observation at `rank` (1-based within the bucket), interpolated.
    fn value_at_rank(self, rank: u64) -> u64 {
        debug_assert!(self.contains_rank(rank));
        if self.count() <= 1 {
            self.observation_min
        } else {
            let offset = (rank - 1) as u128 * self.span() as u128 / (self.count() - 1) as u128;
            self.observation_min + offset as u64
        }
    }
}

/// Histogram of u64 observations with bounded memory and quantile statistics.
///
/// Buckets have varying widths and are only allocated as needed; compaction
/// aims to level the number of observations per bucket.
#[derive(Clone, Debug, Default)]
pub struct Histogram {
    observations: u64,
    compacted: bool,
    buckets: Vec<Bucket>,
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            observations: 0,
            compacted: true,
            buckets: Vec::with_capacity(MAX_BUCKETS),
        }
    }

    /// Record one observation.
    pub fn add(&mut self, observation: u64) {
        self.buckets.push(Bucket::single(observation));
        self.observations += 1;
        self.compacted = false;
        if self.buckets.len() >= MAX_BUCKETS {
            self.compact();
        }
        self.debug_validate();
    }

    /// Total number of observations recorded.
    pub fn count(&self) -> u64 {
        self.observations
    }

    /// Sort buckets and merge neighbors until populations level out.
    ///
    /// Runs automatically before any read and when the bucket vector fills.
    /// Calling it twice back to back is a fixed point.
    pub fn compact(&mut self) {
        if self.compacted {
            return;
        }
        self.debug_validate();
        self.buckets.sort_unstable_by_key(|bucket| bucket.min());

        let target_size = 1 + math::round_div(self.observations, MAX_BUCKETS as u64);
        let mut merged: Vec<Bucket> = Vec::with_capacity(MAX_BUCKETS);
        for bucket in self.buckets.drain(..) {
            match merged.last_mut() {
                Some(last) if last.count() < target_size || bucket.overlaps(*last) => {
                    last.merge(bucket);
                }
                _ => merged.push(bucket),
            }
        }
        self.buckets = merged;
        self.compacted = true;
        self.debug_validate();
        debug_assert!(self.buckets.len() < MAX_BUCKETS);
    }

    /// Observation at global rank `r`, 1 ≤ r ≤ count. Out-of-range ranks are
    /// clamped; an empty histogram yields 0.
    pub fn by_rank(&mut self, rank: u64) -> u64 {
        if self.observations == 0 {
            return 0;
        }
        self.compact();
        let mut remaining = rank.clamp(1, self.observations);
        for bucket in &self.buckets {
            if bucket.contains_rank(remaining) {
                return bucket.value_at_rank(remaining);
            }
            remaining -= bucket.count();
        }
        debug_assert!(false, "rank walk exhausted buckets");
        0
    }

    /// Smallest observation, 0 when empty.
    pub fn min_value(&mut self) -> u64 {
        self.compact();
        match self.buckets.first() {
            Some(bucket) => bucket.value_at_rank(1),
            None => 0,
        }
    }

    /// Largest observation, 0 when empty.
    pub fn max_value(&mut self) -> u64 {
        self.compact();
        match self.buckets.last() {
            Some(bucket) => bucket.value_at_rank(bucket.count()),
            None => 0,
        }
    }

    /// Robust location estimate, (Q1 + 2·Q2 + Q3) / 4.
    pub fn trimean(&mut self) -> u64 {
        self.compact();
        if self.observations < 4 {
            return match self.observations {
                0 => 0,
                1 | 2 => self.by_rank(1),
                _ => self.by_rank(2),
            };
        }

        let q1_rank = math::round_div(self.observations, 4);
        let q2_rank = math::round_div(self.observations, 2);
        let q3_rank = q1_rank + q2_rank;
        let q1 = self.by_rank(q1_rank);
        let q2 = self.by_rank(q2_rank);
        let q3 = self.by_rank(q3_rank);
        math::round_div(q1 + 2 * q2 + q3, 4)
    }

    /// Robust dispersion estimate, Q3 − Q1.
    pub fn iqr(&mut self) -> u64 {
        self.compact();
        if self.observations < 4 {
            return match self.observations {
                0 | 1 => 0,
                2 => self.by_rank(2) - self.by_rank(1),
                _ => self.by_rank(3) - self.by_rank(1),
            };
        }

        let q1_rank = math::round_div(self.observations, 4);
        let q3_rank = q1_rank + math::round_div(self.observations, 2);
        self.by_rank(q3_rank) - self.by_rank(q1_rank)
    }

    /// Standard deviation estimated from the IQR, assuming roughly normal
    /// observations. Surprisingly accurate, and immune to outliers.
    pub fn std_dev_estimate(&mut self) -> f64 {
        self.iqr() as f64 / IQR_UNBIASED
    }

    /// Signal-to-noise ratio in decibels, clamped to 0..=99.
    ///
    /// 0 means the noise is as large as the signal, 99 means very little
    /// noise. A trimean of 0 is treated as 1, as is a deviation below 1.
    pub fn snr_db(&mut self) -> u32 {
        let mut trimean = self.trimean() as f64;
        if trimean == 0.0 {
            trimean = 1.0;
        }
        let mut std_dev = self.std_dev_estimate();
        if std_dev < 1.0 {
            std_dev = 1.0;
        }
        let snr = 10.0 * math::log10((trimean * trimean) / (std_dev * std_dev));
        math::round(snr.clamp(0.0, 99.0)) as u32
    }

    /// Are there observations more than 6σ below or above the trimean, in
    /// excess of what a normal distribution would produce?
    ///
    /// Returns `(low, high)`. Boundary observations count as outliers
    /// (inclusive thresholds).
    pub fn has_outliers(&mut self) -> (bool, bool) {
        if self.observations == 0 {
            return (false, false);
        }
        self.compact();

        let expected = math::round(self.observations as f64 * SIX_SIGMA_TAIL) as u64;
        let trimean = self.trimean() as f64;
        let std_dev = self.std_dev_estimate();

        let low_threshold = trimean - 6.0 * std_dev;
        let mut low_values = 0;
        if low_threshold >= self.min_value() as f64 {
            low_values = self.count_at_or_below(math::round(low_threshold) as u64);
        }

        let high_threshold = trimean + 6.0 * std_dev;
        let mut high_values = 0;
        if high_threshold <= self.max_value() as f64 {
            high_values = self.count_at_or_above(math::round(high_threshold) as u64);
        }

        (low_values > expected, high_values > expected)
    }

    /// Single-line textual chart of the distribution, `width` characters of
    /// "▁▂▃▄▅▆▇█". Empty histograms yield the empty string.
    pub fn sparkline(&mut self, width: usize) -> String {
        const STEPS: [&str; 8] = ["▁", "▂", "▃", "▄", "▅", "▆", "▇", "█"];

        if self.buckets.is_empty() || width == 0 {
            return String::new();
        }
        self.compact();

        let min_value = self.min_value();
        let range = self.max_value() - min_value;
        let column_width = range as f64 / (width as f64 - 1.0);

        let mut columns = vec![0u64; width];
        for bucket in &self.buckets {
            for rank in 1..=bucket.count() {
                let value = bucket.value_at_rank(rank);
                let index = if range == 0 {
                    0
                } else {
                    ((value - min_value) as f64 / column_width) as usize
                };
                columns[index.min(width - 1)] += 1;
            }
        }

        let max_height = columns.iter().copied().max().unwrap_or(1).max(1);
        let mut sparkline = String::with_capacity(width * 3);
        for &column in &columns {
            let step = math::round_div(column * (STEPS.len() as u64 - 1), max_height) as usize;
            sparkline.push_str(STEPS[step]);
        }
        sparkline
    }

    /// Compact one-line summary of the distribution.
    pub fn statistics(&mut self) -> String {
        let (low_outliers, high_outliers) = self.has_outliers();
        format!(
            "{{min:{},max:{},count:{},low_outliers:{},high_outliers:{},trimean:{},std_dev:{:.2},snr:{},sparkline:{}}}",
            self.min_value(),
            self.max_value(),
            self.count(),
            low_outliers,
            high_outliers,
            self.trimean(),
            self.std_dev_estimate(),
            self.snr_db(),
            self.sparkline(9),
        )
    }

    /// Number of observations ≤ `threshold`.
    fn count_at_or_below(&self, threshold: u64) -> u64 {
        let mut low_count = 0;
        for bucket in &self.buckets {
            if bucket.max() <= threshold {
                low_count += bucket.count();
            } else {
                for rank in 1..=bucket.count() {
                    if bucket.value_at_rank(rank) <= threshold {
                        low_count += 1;
                    } else {
                        break;
                    }
                }
                break;
            }
        }
        low_count
    }

    /// Number of observations ≥ `threshold`.
    fn count_at_or_above(&self, threshold: u64) -> u64 {
        let mut high_count = 0;
        for bucket in self.buckets.iter().rev() {
            if bucket.min() >= threshold {
                high_count += bucket.count();
            } else {
                for rank in (1..=bucket.count()).rev() {
                    if bucket.value_at_rank(rank) >= threshold {
                        high_count += 1;
                    } else {
                        break;
                    }
                }
                break;
            }
        }
        high_count
    }

    #[inline]
    fn debug_validate(&self) {
        #[cfg(debug_assertions)]
        {
            let sum: u64 = self.buckets.iter().map(|b| b.count()).sum();
            debug_assert_eq!(sum, self.observations);
            debug_assert!(self.buckets.len() <= MAX_BUCKETS);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(values: &[u64]) -> Histogram {
        let mut histogram = Histogram::new();
        for &value in values {
            histogram.add(value);
        }
        histogram
    }

    #[test]
    fn empty_histogram_boundaries() {
        let mut histogram = Histogram::new();
        assert_eq!(histogram.count(), 0);
        assert_eq!(histogram.trimean(), 0);
        assert_eq!(histogram.iqr(), 0);
        assert_eq!(histogram.std_dev_estimate(), 0.0);
        assert_eq!(histogram.sparkline(9), "");
        assert_eq!(histogram.has_outliers(), (false, false));
    }

    #[test]
    fn single_observation() {
        let mut histogram = filled(&[42]);
        assert_eq!(histogram.by_rank(1), 42);
        assert_eq!(histogram.trimean(), 42);
        assert_eq!(histogram.iqr(), 0);
    }

    #[test]
    fn two_observations() {
        let mut histogram = filled(&[10, 30]);
        assert_eq!(histogram.trimean(), histogram.by_rank(1));
        assert_eq!(histogram.iqr(), histogram.by_rank(2) - histogram.by_rank(1));
        assert_eq!(histogram.iqr(), 20);
    }

    #[test]
    fn three_observations_use_middle_rank() {
        let mut histogram = filled(&[10, 20, 90]);
        assert_eq!(histogram.trimean(), 20);
        assert_eq!(histogram.iqr(), 80);
    }

    #[test]
    fn rank_walk_is_ordered() {
        let mut histogram = filled(&[50, 10, 40, 20, 30]);
        let ranked: Vec<u64> = (1..=5).map(|r| histogram.by_rank(r)).collect();
        assert_eq!(ranked, vec![10, 20, 30, 40, 50]);
    }

    #[test]
    fn count_invariant_across_compaction() {
        let mut histogram = Histogram::new();
        for i in 0..10_000u64 {
            histogram.add(i % 977);
        }
        assert_eq!(histogram.count(), 10_000);
        histogram.compact();
        let sum: u64 = histogram.buckets.iter().map(|b| b.count()).sum();
        assert_eq!(sum, 10_000);
        assert!(histogram.buckets.len() < MAX_BUCKETS);
    }

    #[test]
    fn compaction_is_idempotent() {
        let mut histogram = Histogram::new();
        for i in 0..5_000u64 {
            histogram.add(i * 7 % 1_013);
        }
        histogram.compact();
        let first = histogram.buckets.clone();
        histogram.compacted = false;
        histogram.compact();
        assert_eq!(histogram.buckets, first);
    }

    #[test]
    fn trimean_of_uniform_range_sits_in_the_middle() {
        let mut histogram = Histogram::new();
        for i in 0..1_000u64 {
            histogram.add(100 + i % 101);
        }
        let trimean = histogram.trimean();
        assert!((140..=160).contains(&trimean), "trimean {trimean}");
    }

    #[test]
    fn detects_high_outliers() {
        // 997 observations uniform in [100, 200] plus 3 far out at 10_000.
        let mut histogram = Histogram::new();
        for i in 0..997u64 {
            histogram.add(100 + i % 101);
        }
        for _ in 0..3 {
            histogram.add(10_000);
        }
        assert_eq!(histogram.has_outliers(), (false, true));
        let trimean = histogram.trimean();
        assert!((120..=180).contains(&trimean), "trimean {trimean}");
    }

    #[test]
    fn no_outliers_in_tight_uniform_data() {
        let mut histogram = Histogram::new();
        for i in 0..1_000u64 {
            histogram.add(500 + i % 11);
        }
        assert_eq!(histogram.has_outliers(), (false, false));
    }

    #[test]
    fn sparkline_has_requested_width_and_charset() {
        let mut histogram = Histogram::new();
        for i in 0..500u64 {
            histogram.add(i);
        }
        let sparkline = histogram.sparkline(9);
        assert_eq!(sparkline.chars().count(), 9);
        for c in sparkline.chars() {
            assert!("▁▂▃▄▅▆▇█".contains(c), "unexpected char {c}");
        }
    }

    #[test]
    fn sparkline_of_identical_observations_is_single_column() {
        let mut histogram = filled(&[7, 7, 7, 7]);
        let sparkline = histogram.sparkline(5);
        assert_eq!(sparkline.chars().count(), 5);
        // All mass lands in the first column.
        assert_eq!(sparkline.chars().next(), Some('█'));
    }

    #[test]
    fn snr_is_clamped() {
        let mut noisy = filled(&[1, 1_000_000, 2, 999_999]);
        assert!(noisy.snr_db() <= 99);

        let mut quiet = Histogram::new();
        for _ in 0..100 {
            quiet.add(1_000_000);
        }
        assert_eq!(quiet.snr_db(), 99);
    }

    #[test]
    fn statistics_line_mentions_count() {
        let mut histogram = filled(&[1, 2, 3]);
        let line = histogram.statistics();
        assert!(line.contains("count:3"), "{line}");
    }
}
