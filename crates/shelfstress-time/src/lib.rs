//! Monotonic time primitives: [`Absolute`] and [`Relative`] nanosecond timestamps.
//!
//! Built on [`std::time::Instant`], which is already monotonic on every platform
//! Rust targets. `Absolute` and `Relative` exist as distinct types so that worker
//! loops can't accidentally add two absolute instants or subtract in the wrong
//! direction; the arithmetic below is the only bridge between them.

use std::time::{Duration, Instant};

/// A monotonic point in time, nanosecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Absolute(Instant);

/// A monotonic duration, nanosecond resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Relative(Duration);

impl Absolute {
    /// Returns the current time.
    #[must_use]
    pub fn now() -> Self {
        Self(Instant::now())
    }

    /// Compares two absolute timestamps.
    #[must_use]
    pub fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        Ord::cmp(&self.0, &other.0)
    }

    /// Sleeps the calling thread until this point in time.
    ///
    /// Best-effort: the OS scheduler may wake the thread slightly early or
    /// late. Callers that turn the delta between requested and actual wake
    /// time into a latency sample must floor negative deltas at zero before
    /// recording (see [`Relative::saturating_since`]).
    pub fn sleep_until(self) {
        let now = Instant::now();
        if self.0 > now {
            std::thread::sleep(self.0 - now);
        }
    }

    /// The underlying `std::time::Instant`, for interop with std APIs.
    #[must_use]
    pub fn as_instant(&self) -> Instant {
        self.0
    }
}

impl std::ops::Add<Relative> for Absolute {
    type Output = Absolute;
    fn add(self, rhs: Relative) -> Absolute {
        Absolute(self.0 + rhs.0)
    }
}

impl std::ops::AddAssign<Relative> for Absolute {
    fn add_assign(&mut self, rhs: Relative) {
        self.0 += rhs.0;
    }
}

impl std::ops::Sub for Absolute {
    type Output = Relative;
    fn sub(self, rhs: Absolute) -> Relative {
        // Instant subtraction panics on negative deltas pre-1.60 behavior;
        // saturating_duration_since keeps this total across thread races.
        Relative(self.0.saturating_duration_since(rhs.0))
    }
}

impl Relative {
    /// Zero duration.
    pub const ZERO: Relative = Relative(Duration::ZERO);

    /// Builds a `Relative` from whole microseconds.
    #[must_use]
    pub fn from_micros(micros: u64) -> Self {
        Self(Duration::from_micros(micros))
    }

    /// Builds a `Relative` from whole milliseconds.
    #[must_use]
    pub fn from_millis(millis: u64) -> Self {
        Self(Duration::from_millis(millis))
    }

    /// Builds a `Relative` from whole nanoseconds.
    #[must_use]
    pub fn from_nanos(nanos: u64) -> Self {
        Self(Duration::from_nanos(nanos))
    }

    /// Whole microseconds, truncating any sub-microsecond remainder.
    #[must_use]
    pub fn as_micros(&self) -> u64 {
        self.0.as_micros() as u64
    }

    /// Whole nanoseconds.
    #[must_use]
    pub fn as_nanos(&self) -> u128 {
        self.0.as_nanos()
    }

    /// Scales this duration by an integer factor.
    #[must_use]
    pub fn multiply(self, k: u32) -> Self {
        Self(self.0 * k)
    }

    /// Scales this duration by a floating-point factor. Used by the
    /// transaction-rate search to step `CustomerPeriod`/`CustomerThinkTime`
    /// by 0.9/1.1/1.025.
    #[must_use]
    pub fn scale(self, factor: f64) -> Self {
        Self(self.0.mul_f64(factor.max(0.0)))
    }

    /// Divides this duration by an integer factor.
    #[must_use]
    pub fn divide(self, k: u32) -> Self {
        Self(self.0 / k)
    }

    /// Integer division of two durations, i.e. how many `rhs` periods fit in `self`.
    #[must_use]
    pub fn divide_by(self, rhs: Self) -> u64 {
        if rhs.0.is_zero() {
            0
        } else {
            (self.0.as_nanos() / rhs.0.as_nanos().max(1)) as u64
        }
    }

    /// Subtracts `rhs` from `self`, flooring at zero rather than panicking or
    /// wrapping. Used to convert an imprecise `sleep_until` wakeup into a
    /// non-negative latency sample.
    #[must_use]
    pub fn saturating_since(self, rhs: Self) -> Self {
        Self(self.0.saturating_sub(rhs.0))
    }

    /// True if this is a zero-length duration.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }
}

impl std::ops::Add for Relative {
    type Output = Relative;
    fn add(self, rhs: Relative) -> Relative {
        Relative(self.0 + rhs.0)
    }
}

impl std::ops::Sub for Relative {
    type Output = Relative;
    fn sub(self, rhs: Relative) -> Relative {
        Relative(self.0.saturating_sub(rhs.0))
    }
}

impl From<Duration> for Relative {
    fn from(d: Duration) -> Self {
        Self(d)
    }
}

impl From<Relative> for Duration {
    fn from(r: Relative) -> Self {
        r.0
    }
}
