//! Staggered release scheduling for worker pools sharing a period.
//!
//! Every worker in a pool of `n` threads sharing a `period` gets its own
//! start offset `i * (period / n)` so the pool's load spreads evenly across
//! the period instead of every worker releasing in lockstep.

use shelfstress_time::{Absolute, Relative};

/// One worker's release schedule: a fixed period and the next instant it
/// should run.
#[derive(Debug, Clone, Copy)]
pub struct Schedule {
    period: Relative,
    next_release: Absolute,
}

impl Schedule {
    /// Builds the schedule for worker `index` of `pool_size` workers sharing
    /// `period`, all starting relative to `t0`. `pool_size` must be non-zero.
    #[must_use]
    pub fn staggered(t0: Absolute, period: Relative, pool_size: u32, index: u32) -> Self {
        debug_assert!(pool_size > 0, "pool_size must be non-zero");
        let stagger = period.divide(pool_size.max(1));
        Self { period, next_release: t0 + stagger.multiply(index) }
    }

    /// The instant this worker should next run.
    #[must_use]
    pub fn next_release(&self) -> Absolute {
        self.next_release
    }

    /// Sleeps until the next release (best-effort, per [`Absolute::sleep_until`]),
    /// then advances the schedule by one period. Returns the (possibly
    /// negative-clamped-to-zero) lateness, i.e. how long after `next_release`
    /// the wake actually happened, for latency recording.
    pub fn sleep_and_advance(&mut self) -> Relative {
        let target = self.next_release;
        target.sleep_until();
        let actual = Absolute::now();
        self.next_release += self.period;
        actual.saturating_since(target)
    }

    /// True once `self.next_release()` has passed `end`, i.e. this worker
    /// should stop looping.
    #[must_use]
    pub fn is_past(&self, end: Absolute) -> bool {
        self.next_release.cmp(&end) == std::cmp::Ordering::Greater
    }
}
