//! Wires the catalogue, registry, queues, and dictionary together under one
//! of the three concurrency disciplines, ready for worker loops to drive.

use std::sync::Arc;

use rand::Rng;
use shelfstress_catalog::{CustomerRegistry, ProductCatalogue};
use shelfstress_config::{Config, Dictionary};
use shelfstress_latency::LatencyLog;
use shelfstress_queues::{BrowsingHistoryQueue, QueueId, SalesTransactionQueue};

/// Default bucket quantum for contention/attention-point latency logs, in
/// microseconds. Matches [`shelfstress_latency::LatencyLog`]'s own default.
const DEFAULT_WAIT_LOG_QUANTUM_US: u64 = 256;

/// Everything a customer or server worker needs a shared handle to: the
/// catalogue, the registry, and the partitioned queues. Built once at
/// startup and shared via `Arc` across every worker thread.
pub struct Engine {
    pub catalogue: ProductCatalogue,
    pub registry: CustomerRegistry,
    pub browsing_queues: Vec<BrowsingHistoryQueue>,
    pub sales_queues: Vec<SalesTransactionQueue>,
}

impl Engine {
    /// Builds an engine from `config`, seeding the catalogue and registry
    /// from `dictionary` with `rng`. Picks the catalogue/registry
    /// concurrency discipline from `config.fast_and_furious` /
    /// `config.phased_updates` (mutually exclusive, enforced by
    /// [`Config::validate`] before this is ever called).
    pub fn new(config: &Config, dictionary: &dyn Dictionary, rng: &mut impl Rng) -> Self {
        let catalogue = if config.phased_updates {
            ProductCatalogue::phased(
                config.num_products,
                config.product_name_length,
                config.product_description_length,
                dictionary,
                rng,
            )
        } else if config.fast_and_furious {
            ProductCatalogue::fast_and_furious(
                config.num_products,
                config.product_name_length,
                config.product_description_length,
                dictionary,
                rng,
            )
        } else {
            ProductCatalogue::coarse(
                config.num_products,
                config.product_name_length,
                config.product_description_length,
                dictionary,
                rng,
                DEFAULT_WAIT_LOG_QUANTUM_US,
            )
        };

        let registry = if config.phased_updates {
            CustomerRegistry::phased(config.num_customers, dictionary, rng)
        } else if config.fast_and_furious {
            CustomerRegistry::fast_and_furious(config.num_customers, dictionary, rng)
        } else {
            CustomerRegistry::coarse(config.num_customers, dictionary, rng, DEFAULT_WAIT_LOG_QUANTUM_US)
        };

        let browsing_queues = (0..config.browsing_history_queue_count.max(1))
            .map(|i| BrowsingHistoryQueue::new(QueueId(i)))
            .collect();
        let sales_queues = (0..config.sales_transaction_queue_count.max(1))
            .map(|_| SalesTransactionQueue::new())
            .collect();

        Self { catalogue, registry, browsing_queues, sales_queues }
    }

    /// The browsing-history queue a customer worker at pool index `i` is
    /// bound to (partitions traffic so enqueue contention is spread across
    /// queues).
    #[must_use]
    pub fn browsing_queue_for_worker(&self, worker_index: u32) -> &BrowsingHistoryQueue {
        let n = self.browsing_queues.len().max(1);
        &self.browsing_queues[worker_index as usize % n]
    }

    /// The sales-transaction queue a customer worker at pool index `i`
    /// enqueues into, and a server worker at the same pool index drains.
    #[must_use]
    pub fn sales_queue_for_worker(&self, worker_index: u32) -> &SalesTransactionQueue {
        let n = self.sales_queues.len().max(1);
        &self.sales_queues[worker_index as usize % n]
    }

    /// The catalogue's acquisition-wait contention log, if it's running
    /// under `Coarse` mode (the only mode that goes through a [`FairLock`](shelfstress_concurrency::FairLock)).
    #[must_use]
    pub fn catalogue_contention(&self) -> Option<LatencyLog> {
        match &self.catalogue {
            ProductCatalogue::Coarse { core, .. } => Some(core.contention_snapshot()),
            _ => None,
        }
    }

    /// The registry's acquisition-wait contention log, under the same
    /// `Coarse`-mode condition as [`Self::catalogue_contention`].
    #[must_use]
    pub fn registry_contention(&self) -> Option<LatencyLog> {
        match &self.registry {
            CustomerRegistry::Coarse { core, .. } => Some(core.contention_snapshot()),
            _ => None,
        }
    }

    /// `PhasedUpdates` rebuilder tick: rebuild both the catalogue and the
    /// registry, removing the outgoing customers' browsing histories from
    /// whichever queue owns them. A no-op outside `PhasedUpdates` mode.
    pub fn rebuild(&self) {
        self.catalogue.rebuild();
        let orphaned = self.registry.rebuild();
        for handle in orphaned {
            self.browsing_queues[handle.queue.0 as usize % self.browsing_queues.len().max(1)].remove(handle);
        }
    }
}

/// Convenience alias for the `Arc`-shared engine every worker thread clones.
pub type SharedEngine = Arc<Engine>;
