//! Customer and server worker units of work.
//!
//! Each function here performs exactly one period's worth of work; the
//! calling loop (see the `demos/` assembly) is responsible for scheduling
//! via [`crate::scheduler::Schedule`] and for recording the unit's elapsed
//! time into a per-worker [`LatencyLog`].

use rand::Rng;
use shelfstress_catalog::{MatchMode, Product};
use shelfstress_config::{Config, Dictionary};
use shelfstress_latency::LatencyLog;
use shelfstress_queues::SalesTransaction;
use shelfstress_time::Absolute;
use tracing::{debug, trace};

use crate::engine::Engine;
use crate::review::{argmax_review, random_keywords, random_words, synthetic_review};

/// What a customer worker's unit of work decided to do, for test assertions
/// and lightweight run-level counters (the textual/CSV report itself is out
/// of scope).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustomerOutcome {
    NoChoice,
    Bought,
    SavedForLater,
    Dropped,
}

/// Runs one customer worker period against `engine`: picks a random
/// customer, searches for keyword candidates (unioned with their
/// save-for-later products), and buys/saves/drops the best-scoring one.
/// `worker_index` selects which partitioned browsing/sales queue this
/// worker is bound to.
pub fn customer_tick(
    engine: &Engine,
    config: &Config,
    dictionary: &dyn Dictionary,
    rng: &mut impl Rng,
    worker_index: u32,
) -> CustomerOutcome {
    let Some(customer) = engine.registry.select_random(rng).ok().flatten() else {
        return CustomerOutcome::NoChoice;
    };

    let keywords = random_keywords(dictionary, rng, config.keyword_search_count);
    let mut candidates = engine.catalogue.lookup(&keywords, MatchMode::All);
    if config.allow_any_match {
        let any_matches = engine.catalogue.lookup(&keywords, MatchMode::Any);
        for product in any_matches {
            if !candidates.iter().any(|p| p.id == product.id) {
                candidates.push(product);
            }
        }
    }

    let browsing_queue = engine.browsing_queue_for_worker(worker_index);
    for handle in customer.save_for_later_snapshot() {
        let Some(record) = browsing_queue.peek(handle) else { continue };
        if let Some(product) = engine.catalogue.fetch_by_id(record.product_id) {
            if !candidates.iter().any(|p| p.id == product.id) {
                candidates.push(product);
            }
        }
    }

    if candidates.is_empty() {
        trace!(customer = customer.id, "no-choice: no matching candidates");
        std::thread::sleep(config.customer_think_time);
        return CustomerOutcome::NoChoice;
    }

    let reviews: Vec<String> = candidates
        .iter()
        .map(|_| synthetic_review(dictionary, rng, config.product_review_length))
        .collect();
    std::thread::sleep(config.customer_think_time);

    let criteria = random_words(dictionary, rng, config.selection_criteria_count);
    let Some(winner) = argmax_review(&reviews, &criteria) else {
        return CustomerOutcome::NoChoice;
    };
    let picked: &Product = &candidates[winner];

    let roll: f64 = rng.gen_range(0.0..1.0);
    if roll < config.buy_threshold {
        let sales_queue = engine.sales_queue_for_worker(worker_index);
        sales_queue.enqueue(SalesTransaction {
            customer_id: customer.id,
            product_id: picked.id,
            review: reviews[winner].clone(),
            enqueued_at: Absolute::now(),
        });
        debug!(customer = customer.id, product = picked.id, "bought");
        CustomerOutcome::Bought
    } else if roll < config.buy_threshold + config.save_for_later_threshold {
        let expires_at = Absolute::now() + config.browsing_expiration.into();
        let handle = browsing_queue.enqueue(customer.id, picked.id, expires_at);
        customer.add_save_for_later(handle);
        debug!(customer = customer.id, product = picked.id, "saved for later");
        CustomerOutcome::SavedForLater
    } else {
        CustomerOutcome::Dropped
    }
}

/// Which of the five round-robin attention points a server worker's unit of
/// work performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttentionPoint {
    DrainSales,
    ExpireBrowsing,
    ReplaceCustomers,
    ReplaceProducts,
    Idle,
}

/// Per-attention-point latency logs a server worker accumulates across its
/// lifetime, merged into the run-level report at the end.
pub struct ServerWorkerLogs {
    pub drain_sales: LatencyLog,
    pub expire_browsing: LatencyLog,
    pub replace_customers: LatencyLog,
    pub replace_products: LatencyLog,
    pub idle: LatencyLog,
}

impl ServerWorkerLogs {
    #[must_use]
    pub fn new(quantum_us: u64) -> Self {
        Self {
            drain_sales: LatencyLog::new(quantum_us),
            expire_browsing: LatencyLog::new(quantum_us),
            replace_customers: LatencyLog::new(quantum_us),
            replace_products: LatencyLog::new(quantum_us),
            idle: LatencyLog::new(quantum_us),
        }
    }
}

/// Tracks when this server worker last performed customer/product
/// replacement, so [`server_tick`] knows when `CustomerReplacementPeriod`/
/// `ProductReplacementPeriod` has elapsed.
pub struct ReplacementClocks {
    pub last_customer_replacement: Absolute,
    pub last_product_replacement: Absolute,
}

impl ReplacementClocks {
    #[must_use]
    pub fn starting_at(now: Absolute) -> Self {
        Self { last_customer_replacement: now, last_product_replacement: now }
    }
}

/// Runs one server worker period: round-robins over the five attention
/// points in priority order, performing (and recording the latency of)
/// exactly the first one that's currently due. `worker_index` selects this
/// worker's bound sales/browsing queues.
pub fn server_tick(
    engine: &Engine,
    config: &Config,
    dictionary: &dyn Dictionary,
    rng: &mut impl Rng,
    worker_index: u32,
    clocks: &mut ReplacementClocks,
    logs: &mut ServerWorkerLogs,
) -> AttentionPoint {
    let now = Absolute::now();

    let sales_queue = engine.sales_queue_for_worker(worker_index);
    let pending = sales_queue.drain_all();
    if !pending.is_empty() {
        for tx in &pending {
            let latency = now - tx.enqueued_at;
            logs.drain_sales.record(latency.as_micros() as i64);
        }
        return AttentionPoint::DrainSales;
    }

    let browsing_queue = engine.browsing_queue_for_worker(worker_index);
    let start = Absolute::now();
    let mut expired_any = false;
    while let Some(record) = browsing_queue.pop_if_expired(now) {
        expired_any = true;
        // The customer's own save_for_later set still holds this handle;
        // `BrowsingHistoryQueue::peek` returns `None` for it on the next
        // lookup (stale generation), so customer_tick skips it there
        // instead of this path reaching back into the registry.
        let _ = record;
    }
    if expired_any {
        let elapsed = Absolute::now() - start;
        logs.expire_browsing.record(elapsed.as_micros() as i64);
        return AttentionPoint::ExpireBrowsing;
    }

    if (now - clocks.last_customer_replacement).as_micros() >= config.customer_replacement_period.as_micros() as u64 {
        let start = Absolute::now();
        for _ in 0..config.customer_replacement_count {
            if let Ok(orphaned) = engine.registry.replace_random(dictionary, rng) {
                for handle in orphaned {
                    engine.browsing_queues[handle.queue.0 as usize % engine.browsing_queues.len().max(1)]
                        .remove(handle);
                }
            }
        }
        clocks.last_customer_replacement = now;
        let elapsed = Absolute::now() - start;
        logs.replace_customers.record(elapsed.as_micros() as i64);
        return AttentionPoint::ReplaceCustomers;
    }

    if (now - clocks.last_product_replacement).as_micros() >= config.product_replacement_period.as_micros() as u64 {
        let start = Absolute::now();
        for _ in 0..config.product_replacement_count {
            let _ = engine.catalogue.replace_random(
                config.product_name_length,
                config.product_description_length,
                dictionary,
                rng,
            );
        }
        clocks.last_product_replacement = now;
        let elapsed = Absolute::now() - start;
        logs.replace_products.record(elapsed.as_micros() as i64);
        return AttentionPoint::ReplaceProducts;
    }

    logs.idle.record(0);
    AttentionPoint::Idle
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use shelfstress_config::VecDictionary;
    use std::time::Duration;

    // Small vocabulary relative to catalogue size so keyword searches have a
    // realistic chance of hitting a product within a handful of ticks.
    fn dict() -> VecDictionary {
        VecDictionary::new((0..15).map(|i| format!("word{i}")).collect())
    }

    fn test_config() -> Config {
        Config {
            allow_any_match: true,
            fast_and_furious: false,
            phased_updates: false,
            report_csv: false,
            report_individual_threads: false,
            dictionary_size: 15,
            dictionary_file: None,
            num_products: 20,
            num_customers: 20,
            product_name_length: 3,
            product_description_length: 5,
            product_review_length: 6,
            customer_threads: 2,
            server_threads: 2,
            customer_period: Duration::from_millis(1),
            customer_think_time: Duration::from_millis(1),
            server_period: Duration::from_millis(1),
            browsing_expiration: Duration::from_secs(1),
            browsing_history_queue_count: 2,
            sales_transaction_queue_count: 2,
            customer_replacement_period: Duration::from_secs(10),
            customer_replacement_count: 1,
            product_replacement_period: Duration::from_secs(10),
            product_replacement_count: 1,
            phased_update_interval: Duration::from_millis(50),
            simulation_duration: Duration::from_secs(1),
            warmup_duration: Duration::ZERO,
            keyword_search_count: 2,
            selection_criteria_count: 2,
            buy_threshold: 1.0,
            save_for_later_threshold: 0.0,
            max_array_length: 8,
            random_seed: 1,
            response_time_measurements: 1_000,
            max_p50_customer_prep_us: 0,
            max_p95_customer_prep_us: 0,
            max_p99_customer_prep_us: 0,
            max_p999_customer_prep_us: 0,
            max_p9999_customer_prep_us: 0,
            max_p99999_customer_prep_us: 0,
            max_p100_customer_prep_us: 0,
        }
    }

    #[test]
    fn customer_tick_with_buy_threshold_one_always_buys_when_candidates_exist() {
        let config = test_config();
        let dictionary = dict();
        let mut rng = StdRng::seed_from_u64(config.random_seed);
        let engine = Engine::new(&config, &dictionary, &mut rng);

        let mut bought = 0;
        for _ in 0..200 {
            match customer_tick(&engine, &config, &dictionary, &mut rng, 0) {
                CustomerOutcome::Bought => bought += 1,
                CustomerOutcome::NoChoice => {}
                other => panic!("unexpected outcome with buy_threshold=1.0: {other:?}"),
            }
        }
        assert!(bought > 0, "expected at least one purchase across 50 ticks");
        assert!(!engine.sales_queues[0].is_empty() || !engine.sales_queues[1].is_empty());
    }

    #[test]
    fn server_tick_drains_a_pending_transaction() {
        let config = test_config();
        let dictionary = dict();
        let mut rng = StdRng::seed_from_u64(config.random_seed);
        let engine = Engine::new(&config, &dictionary, &mut rng);

        engine.sales_queues[0].enqueue(SalesTransaction {
            customer_id: 1,
            product_id: 1,
            review: "x".into(),
            enqueued_at: Absolute::now(),
        });

        let mut clocks = ReplacementClocks::starting_at(Absolute::now());
        let mut logs = ServerWorkerLogs::new(256);
        let outcome = server_tick(&engine, &config, &dictionary, &mut rng, 0, &mut clocks, &mut logs);
        assert_eq!(outcome, AttentionPoint::DrainSales);
        assert_eq!(logs.drain_sales.count(), 1);
        assert!(engine.sales_queues[0].is_empty());
    }

    #[test]
    fn server_tick_replaces_products_once_period_elapses() {
        let mut config = test_config();
        config.product_replacement_period = Duration::from_millis(1);
        let dictionary = dict();
        let mut rng = StdRng::seed_from_u64(config.random_seed);
        let engine = Engine::new(&config, &dictionary, &mut rng);

        let earlier = Absolute::now();
        std::thread::sleep(Duration::from_millis(5));
        let mut clocks = ReplacementClocks::starting_at(earlier);
        let mut logs = ServerWorkerLogs::new(256);
        let outcome = server_tick(&engine, &config, &dictionary, &mut rng, 0, &mut clocks, &mut logs);
        assert_eq!(outcome, AttentionPoint::ReplaceProducts);
        assert_eq!(logs.replace_products.count(), 1);
    }

    #[test]
    fn server_tick_idles_when_nothing_is_due() {
        let config = test_config();
        let dictionary = dict();
        let mut rng = StdRng::seed_from_u64(config.random_seed);
        let engine = Engine::new(&config, &dictionary, &mut rng);

        let mut clocks = ReplacementClocks::starting_at(Absolute::now());
        let mut logs = ServerWorkerLogs::new(256);
        let outcome = server_tick(&engine, &config, &dictionary, &mut rng, 0, &mut clocks, &mut logs);
        assert_eq!(outcome, AttentionPoint::Idle);
        assert_eq!(logs.idle.count(), 1);
    }
}
