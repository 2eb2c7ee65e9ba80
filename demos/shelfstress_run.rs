//! Reference assembly showing how a driver would wire `shelfstress-config`,
//! `shelfstress-catalog`, and `shelfstress-sim` together into a bounded-
//! duration run. Not a compiled part of the workspace: no argv parsing, no
//! report formatting, no process entry-point.
//!
//! A real driver would add this file under a binary crate's `src/bin/` or a
//! library crate's `examples/` directory so Cargo picks it up; here it's
//! kept loose to avoid introducing a throwaway package into the workspace.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;

use shelfstress_config::{Config, VecDictionary};
use shelfstress_latency::LatencyLog;
use shelfstress_sim::{
    customer_tick, server_tick, CustomerOutcome, Engine, ReplacementClocks, Schedule, ServerWorkerLogs,
};
use shelfstress_time::{Absolute, Relative};

fn demo_config() -> Config {
    Config {
        allow_any_match: true,
        fast_and_furious: false,
        phased_updates: false,
        report_csv: false,
        report_individual_threads: false,
        dictionary_size: 2_000,
        dictionary_file: None,
        num_products: 500,
        num_customers: 500,
        product_name_length: 3,
        product_description_length: 8,
        product_review_length: 10,
        customer_threads: 8,
        server_threads: 4,
        customer_period: Duration::from_millis(50),
        customer_think_time: Duration::from_millis(80),
        server_period: Duration::from_millis(20),
        browsing_expiration: Duration::from_secs(5),
        browsing_history_queue_count: 4,
        sales_transaction_queue_count: 4,
        customer_replacement_period: Duration::from_millis(200),
        customer_replacement_count: 1,
        product_replacement_period: Duration::from_millis(200),
        product_replacement_count: 1,
        phased_update_interval: Duration::from_millis(500),
        simulation_duration: Duration::from_secs(5),
        warmup_duration: Duration::from_secs(1),
        keyword_search_count: 3,
        selection_criteria_count: 3,
        buy_threshold: 0.3,
        save_for_later_threshold: 0.3,
        max_array_length: 64,
        random_seed: 42,
        response_time_measurements: 100_000,
        max_p50_customer_prep_us: 0,
        max_p95_customer_prep_us: 0,
        max_p99_customer_prep_us: 0,
        max_p999_customer_prep_us: 0,
        max_p9999_customer_prep_us: 0,
        max_p99999_customer_prep_us: 0,
        max_p100_customer_prep_us: 0,
    }
}

/// Runs `config` to completion, returning the merged customer-tick latency
/// log and total purchase count. A process entry-point would wrap this with
/// argv parsing and report printing.
fn run(config: Config) -> (LatencyLog, u64) {
    config.validate().expect("demo config must satisfy every validation rule");

    let dictionary: Vec<String> = (0..config.dictionary_size).map(|i| format!("item{i}")).collect();
    let dictionary = VecDictionary::new(dictionary);

    let mut seed_rng = StdRng::seed_from_u64(config.random_seed);
    let engine = Arc::new(Engine::new(&config, &dictionary, &mut seed_rng));
    let config = Arc::new(config);
    let dictionary = Arc::new(dictionary);

    let t0 = Absolute::now();
    let end = t0 + Relative::from(config.simulation_duration);
    let purchases = Arc::new(AtomicU64::new(0));
    let merged_customer_log = Arc::new(Mutex::new(LatencyLog::new(256)));

    let mut handles = Vec::new();

    for i in 0..config.customer_threads {
        let engine = Arc::clone(&engine);
        let config = Arc::clone(&config);
        let dictionary = Arc::clone(&dictionary);
        let purchases = Arc::clone(&purchases);
        let merged_customer_log = Arc::clone(&merged_customer_log);
        handles.push(thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(config.random_seed.wrapping_add(u64::from(i) + 1));
            let mut schedule =
                Schedule::staggered(t0, Relative::from(config.customer_period), config.customer_threads, i);
            let mut local_log = LatencyLog::new(256);

            while !schedule.is_past(end) {
                schedule.sleep_and_advance();
                let tick_start = Absolute::now();
                let outcome = customer_tick(&engine, &config, &*dictionary, &mut rng, i);
                let elapsed = Absolute::now() - tick_start;
                local_log.record(elapsed.as_micros() as i64);
                if outcome == CustomerOutcome::Bought {
                    purchases.fetch_add(1, Ordering::Relaxed);
                }
            }

            merged_customer_log.lock().unwrap().merge(&local_log);
        }));
    }

    for i in 0..config.server_threads {
        let engine = Arc::clone(&engine);
        let config = Arc::clone(&config);
        let dictionary = Arc::clone(&dictionary);
        handles.push(thread::spawn(move || {
            let mut rng = StdRng::seed_from_u64(config.random_seed.wrapping_add(1_000 + u64::from(i)));
            let mut schedule =
                Schedule::staggered(t0, Relative::from(config.server_period), config.server_threads, i);
            let mut clocks = ReplacementClocks::starting_at(t0);
            let mut logs = ServerWorkerLogs::new(256);

            while !schedule.is_past(end) {
                schedule.sleep_and_advance();
                let attention = server_tick(&engine, &config, &*dictionary, &mut rng, i, &mut clocks, &mut logs);
                tracing::trace!(worker = i, ?attention, "server attention point");
            }
        }));
    }

    if config.phased_updates {
        let engine = Arc::clone(&engine);
        let interval = config.phased_update_interval;
        handles.push(thread::spawn(move || {
            let mut next = t0 + Relative::from(interval);
            while !(Absolute::now().cmp(&end) == std::cmp::Ordering::Greater) {
                next.sleep_until();
                engine.rebuild();
                next += Relative::from(interval);
            }
        }));
    }

    for h in handles {
        h.join().expect("worker thread panicked");
    }

    let merged = Arc::try_unwrap(merged_customer_log).unwrap().into_inner().unwrap();
    let total_purchases = purchases.load(Ordering::Relaxed);
    (merged, total_purchases)
}

fn main() {
    tracing_subscriber::fmt::init();
    let (log, purchases) = run(demo_config());
    println!(
        "customer ticks: {} purchases: {} p50: {:?}us p99: {:?}us",
        log.count(),
        purchases,
        log.p50(),
        log.p99(),
    );
}
