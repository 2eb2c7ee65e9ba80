//! Transaction-rate search: an optional outer loop around a simulation run.
//!
//! Wraps a simulation run in a loop that adjusts `CustomerPeriod` and
//! `CustomerThinkTime` to find the fastest sustainable rate at which every
//! configured percentile gate still holds. This module owns only the
//! period/think-time stepping and termination logic; running an actual
//! simulation attempt and measuring its percentiles is the caller's job
//! (see the `demos/` assembly).

use std::time::Duration;

use shelfstress_config::Config;

/// One attempt's measured outcome, as reported by the caller after running
/// a full simulation at the attempt's `CustomerPeriod`/`CustomerThinkTime`.
#[derive(Debug, Clone, Copy)]
pub struct AttemptResult {
    pub observed_transactions: u64,
    pub expected_transactions: u64,
    pub p50_us: u64,
    pub p95_us: u64,
    pub p99_us: u64,
    pub p999_us: u64,
    pub p9999_us: u64,
    pub p99999_us: u64,
    pub p100_us: u64,
}

fn gate(threshold_us: u32, observed_us: u64) -> bool {
    threshold_us == 0 || observed_us <= u64::from(threshold_us)
}

impl AttemptResult {
    /// "Success": observed transactions within
    /// `CustomerThreads` of expected, and every configured (non-zero)
    /// percentile threshold satisfied.
    #[must_use]
    pub fn satisfies(&self, config: &Config) -> bool {
        let enough_transactions =
            self.observed_transactions + u64::from(config.customer_threads) >= self.expected_transactions;
        enough_transactions
            && gate(config.max_p50_customer_prep_us, self.p50_us)
            && gate(config.max_p95_customer_prep_us, self.p95_us)
            && gate(config.max_p99_customer_prep_us, self.p99_us)
            && gate(config.max_p999_customer_prep_us, self.p999_us)
            && gate(config.max_p9999_customer_prep_us, self.p9999_us)
            && gate(config.max_p99999_customer_prep_us, self.p99999_us)
            && gate(config.max_p100_customer_prep_us, self.p100_us)
    }
}

/// True if any percentile threshold is configured, i.e. the rate search
/// should run at all rather than a single fixed-rate simulation.
#[must_use]
pub fn enabled(config: &Config) -> bool {
    [
        config.max_p50_customer_prep_us,
        config.max_p95_customer_prep_us,
        config.max_p99_customer_prep_us,
        config.max_p999_customer_prep_us,
        config.max_p9999_customer_prep_us,
        config.max_p99999_customer_prep_us,
        config.max_p100_customer_prep_us,
    ]
    .into_iter()
    .any(|t| t > 0)
}

/// Drives the outer binary-step rate search:
/// - a success scales `CustomerPeriod`/`CustomerThinkTime` by 0.9 (10% faster);
/// - before the first success, two *consecutive* failures scale by 1.1 (10%
///   slower); a single isolated failure just retries the same rate;
/// - after the first success, every failure scales by 1.025 (a smaller,
///   2.5% slower step);
/// - the search terminates once three consecutive backward (slower) steps
///   have been taken in a row.
pub struct RateSearch {
    period: Duration,
    think_time: Duration,
    found_first_success: bool,
    failures_since_last_step: u32,
    consecutive_backward_steps: u32,
    attempts: u32,
    best: Option<(Duration, Duration)>,
}

/// Outcome of a completed rate-search run: the fastest rate that satisfied
/// every gate, and how many attempts the search took.
#[derive(Debug, Clone, Copy)]
pub struct RateSearchOutcome {
    pub best_period: Duration,
    pub best_think_time: Duration,
    pub attempts: u32,
}

impl RateSearch {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            period: config.customer_period,
            think_time: config.customer_think_time,
            found_first_success: false,
            failures_since_last_step: 0,
            consecutive_backward_steps: 0,
            attempts: 0,
            best: None,
        }
    }

    /// The `(CustomerPeriod, CustomerThinkTime)` the next attempt should run at.
    #[must_use]
    pub fn current(&self) -> (Duration, Duration) {
        (self.period, self.think_time)
    }

    /// Records one attempt's outcome and steps the search. Returns
    /// `Some(outcome)` once the search has terminated (three consecutive
    /// backward steps), `None` if another attempt should follow.
    pub fn record(&mut self, success: bool) -> Option<RateSearchOutcome> {
        self.attempts += 1;

        if success {
            self.best = Some((self.period, self.think_time));
            self.found_first_success = true;
            self.failures_since_last_step = 0;
            self.step(0.9);
            self.consecutive_backward_steps = 0;
            return None;
        }

        if self.found_first_success {
            self.step(1.025);
            self.consecutive_backward_steps += 1;
        } else {
            self.failures_since_last_step += 1;
            if self.failures_since_last_step >= 2 {
                self.step(1.1);
                self.failures_since_last_step = 0;
                self.consecutive_backward_steps += 1;
            } else {
                return None; // single isolated failure: retry the same rate.
            }
        }

        if self.consecutive_backward_steps >= 3 {
            let (best_period, best_think_time) = self.best.unwrap_or((self.period, self.think_time));
            Some(RateSearchOutcome { best_period, best_think_time, attempts: self.attempts })
        } else {
            None
        }
    }

    fn step(&mut self, factor: f64) {
        self.period = self.period.mul_f64(factor);
        self.think_time = self.think_time.mul_f64(factor);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_with_gates() -> Config {
        use std::time::Duration;
        Config {
            allow_any_match: true,
            fast_and_furious: false,
            phased_updates: false,
            report_csv: false,
            report_individual_threads: false,
            dictionary_size: 100,
            dictionary_file: None,
            num_products: 50,
            num_customers: 50,
            product_name_length: 3,
            product_description_length: 5,
            product_review_length: 5,
            customer_threads: 4,
            server_threads: 2,
            customer_period: Duration::from_millis(100),
            customer_think_time: Duration::from_millis(150),
            server_period: Duration::from_millis(20),
            browsing_expiration: Duration::from_secs(30),
            browsing_history_queue_count: 2,
            sales_transaction_queue_count: 2,
            customer_replacement_period: Duration::from_secs(5),
            customer_replacement_count: 1,
            product_replacement_period: Duration::from_secs(5),
            product_replacement_count: 1,
            phased_update_interval: Duration::from_millis(500),
            simulation_duration: Duration::from_secs(10),
            warmup_duration: Duration::from_secs(1),
            keyword_search_count: 2,
            selection_criteria_count: 2,
            buy_threshold: 0.3,
            save_for_later_threshold: 0.3,
            max_array_length: 64,
            random_seed: 1,
            response_time_measurements: 10_000,
            max_p50_customer_prep_us: 5_000,
            max_p95_customer_prep_us: 20_000,
            max_p99_customer_prep_us: 0,
            max_p999_customer_prep_us: 0,
            max_p9999_customer_prep_us: 0,
            max_p99999_customer_prep_us: 0,
            max_p100_customer_prep_us: 0,
        }
    }

    fn result(p50: u64, p95: u64, observed: u64, expected: u64) -> AttemptResult {
        AttemptResult {
            observed_transactions: observed,
            expected_transactions: expected,
            p50_us: p50,
            p95_us: p95,
            p99_us: 0,
            p999_us: 0,
            p9999_us: 0,
            p99999_us: 0,
            p100_us: 0,
        }
    }

    #[test]
    fn enabled_reflects_any_nonzero_threshold() {
        assert!(enabled(&config_with_gates()));
        let mut c = config_with_gates();
        c.max_p50_customer_prep_us = 0;
        c.max_p95_customer_prep_us = 0;
        assert!(!enabled(&c));
    }

    #[test]
    fn success_satisfies_when_all_gates_and_volume_pass() {
        let config = config_with_gates();
        assert!(result(4_000, 15_000, 1_000, 1_000).satisfies(&config));
        assert!(!result(6_000, 15_000, 1_000, 1_000).satisfies(&config));
        assert!(!result(4_000, 15_000, 900, 1_000).satisfies(&config));
    }

    #[test]
    fn success_steps_faster_by_ninety_percent() {
        let config = config_with_gates();
        let mut search = RateSearch::new(&config);
        let (p0, t0) = search.current();
        assert!(search.record(true).is_none());
        let (p1, t1) = search.current();
        assert_eq!(p1, p0.mul_f64(0.9));
        assert_eq!(t1, t0.mul_f64(0.9));
    }

    #[test]
    fn isolated_failure_before_first_success_does_not_step() {
        let config = config_with_gates();
        let mut search = RateSearch::new(&config);
        let (p0, t0) = search.current();
        assert!(search.record(false).is_none());
        assert_eq!(search.current(), (p0, t0));
    }

    #[test]
    fn two_consecutive_failures_before_first_success_step_slower() {
        let config = config_with_gates();
        let mut search = RateSearch::new(&config);
        let (p0, _) = search.current();
        assert!(search.record(false).is_none());
        assert!(search.record(false).is_none());
        let (p1, _) = search.current();
        assert_eq!(p1, p0.mul_f64(1.1));
    }

    #[test]
    fn terminates_after_three_consecutive_backward_steps() {
        let config = config_with_gates();
        let mut search = RateSearch::new(&config);
        assert!(search.record(true).is_none()); // establishes first success, resets backward counter
        assert!(search.record(false).is_none());
        assert!(search.record(false).is_none());
        let outcome = search.record(false);
        assert!(outcome.is_some());
        assert_eq!(outcome.unwrap().attempts, 4);
    }
}
