//! Typed simulation configuration, its validation rules, duration-value
//! parsing, and the `Dictionary` collaborator interface.
//!
//! Turning `-d<Key>=<Value>` command-line tokens into a [`Config`] is out of
//! scope here — this crate only owns the typed value and what it means for
//! that value to be valid.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Everything the simulation needs to know before a single worker thread starts.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub allow_any_match: bool,
    pub fast_and_furious: bool,
    pub phased_updates: bool,
    pub report_csv: bool,
    pub report_individual_threads: bool,

    pub dictionary_size: u32,
    pub dictionary_file: Option<PathBuf>,

    pub num_products: u32,
    pub num_customers: u32,
    pub product_name_length: u32,
    pub product_description_length: u32,
    pub product_review_length: u32,

    pub customer_threads: u32,
    pub server_threads: u32,
    pub customer_period: Duration,
    pub customer_think_time: Duration,
    pub server_period: Duration,

    pub browsing_expiration: Duration,
    pub browsing_history_queue_count: u32,
    pub sales_transaction_queue_count: u32,

    pub customer_replacement_period: Duration,
    pub customer_replacement_count: u32,
    pub product_replacement_period: Duration,
    pub product_replacement_count: u32,

    pub phased_update_interval: Duration,

    pub simulation_duration: Duration,
    pub warmup_duration: Duration,

    pub keyword_search_count: u32,
    pub selection_criteria_count: u32,
    pub buy_threshold: f64,
    pub save_for_later_threshold: f64,

    pub max_array_length: u32,
    pub random_seed: u64,
    pub response_time_measurements: u32,

    pub max_p50_customer_prep_us: u32,
    pub max_p95_customer_prep_us: u32,
    pub max_p99_customer_prep_us: u32,
    pub max_p999_customer_prep_us: u32,
    pub max_p9999_customer_prep_us: u32,
    pub max_p99999_customer_prep_us: u32,
    pub max_p100_customer_prep_us: u32,
}

/// Failures raised by [`Config::validate`] or [`parse_duration`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("PhasedUpdates and FastAndFurious are mutually exclusive")]
    PhasedUpdatesWithFastAndFurious,
    #[error("CustomerThinkTime must be >= CustomerPeriod")]
    ThinkTimeBelowCustomerPeriod,
    #[error("BuyThreshold + SaveForLaterThreshold must be <= 1.0")]
    ThresholdsExceedOne,
    #[error("ServerPeriod * 5 must be < CustomerReplacementPeriod")]
    ServerPeriodTooCloseToCustomerReplacement,
    #[error("ServerPeriod * 5 must be < ProductReplacementPeriod")]
    ServerPeriodTooCloseToProductReplacement,
    #[error("BrowsingHistoryQueueCount must be <= CustomerThreads and <= ServerThreads")]
    BrowsingQueueCountExceedsThreads,
    #[error("SalesTransactionQueueCount must be <= CustomerThreads and <= ServerThreads")]
    SalesQueueCountExceedsThreads,
    #[error(
        "dictionary of {available} words cannot supply {needed} distinct draws for the configured sizes"
    )]
    DictionaryTooSmall { needed: u64, available: u64 },
    #[error("unrecognized configuration key: {0}")]
    UnrecognizedKey(String),
    #[error("malformed configuration value: {0}")]
    MalformedValue(String),
}

impl Config {
    /// Checks every configuration validation rule. Configuration errors abort
    /// the run before any worker thread starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.phased_updates && self.fast_and_furious {
            return Err(ConfigError::PhasedUpdatesWithFastAndFurious);
        }
        if self.customer_think_time < self.customer_period {
            return Err(ConfigError::ThinkTimeBelowCustomerPeriod);
        }
        if self.buy_threshold + self.save_for_later_threshold > 1.0 {
            return Err(ConfigError::ThresholdsExceedOne);
        }
        if self.server_period.saturating_mul(5) >= self.customer_replacement_period {
            return Err(ConfigError::ServerPeriodTooCloseToCustomerReplacement);
        }
        if self.server_period.saturating_mul(5) >= self.product_replacement_period {
            return Err(ConfigError::ServerPeriodTooCloseToProductReplacement);
        }
        if self.browsing_history_queue_count > self.customer_threads
            || self.browsing_history_queue_count > self.server_threads
        {
            return Err(ConfigError::BrowsingQueueCountExceedsThreads);
        }
        if self.sales_transaction_queue_count > self.customer_threads
            || self.sales_transaction_queue_count > self.server_threads
        {
            return Err(ConfigError::SalesQueueCountExceedsThreads);
        }

        let dict = u64::from(self.dictionary_size);
        let names_needed = u64::from(self.num_products);
        let name_space = dict.checked_pow(self.product_name_length.min(32)).unwrap_or(u64::MAX);
        if name_space < names_needed {
            return Err(ConfigError::DictionaryTooSmall { needed: names_needed, available: name_space });
        }
        let customers_needed = u64::from(self.num_customers);
        let two_word_space = dict.checked_pow(2).unwrap_or(u64::MAX);
        if two_word_space < customers_needed {
            return Err(ConfigError::DictionaryTooSmall {
                needed: customers_needed,
                available: two_word_space,
            });
        }

        Ok(())
    }
}

/// Parses a `<integer><ms|s|m|h|d>` duration literal, e.g. `"500ms"`, `"2h"`.
pub fn parse_duration(value: &str) -> Result<Duration, ConfigError> {
    let unit_start = value
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| ConfigError::MalformedValue(value.to_string()))?;
    let (digits, unit) = value.split_at(unit_start);
    let amount: u64 =
        digits.parse().map_err(|_| ConfigError::MalformedValue(value.to_string()))?;

    let multiplier = match unit {
        "ms" => 1,
        "s" => 1_000,
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        _ => return Err(ConfigError::MalformedValue(value.to_string())),
    };

    Ok(Duration::from_millis(amount.saturating_mul(multiplier)))
}

/// A source of pseudo-random words for product names/descriptions and
/// two-word customer names. `word(index)` must be a pure, deterministic
/// function of `index` so re-running with the same `RandomSeed` reproduces
/// the same catalogue/registry contents.
pub trait Dictionary {
    /// The word at `index`, wrapping as needed (`index % len()`, conceptually).
    fn word(&self, index: u64) -> &str;
    /// Number of distinct words available.
    fn len(&self) -> u32;
    /// True if the dictionary has no words at all.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An in-memory [`Dictionary`] backed by an already-loaded word list. Used
/// by tests and demos in place of the out-of-scope stride-59 file loader.
#[derive(Debug, Clone)]
pub struct VecDictionary {
    words: Vec<String>,
}

impl VecDictionary {
    /// Builds a dictionary from an explicit word list. Panics if `words` is
    /// empty; an empty dictionary can never satisfy `Config::validate`.
    #[must_use]
    pub fn new(words: Vec<String>) -> Self {
        assert!(!words.is_empty(), "VecDictionary requires at least one word");
        Self { words }
    }
}

impl Dictionary for VecDictionary {
    fn word(&self, index: u64) -> &str {
        &self.words[(index as usize) % self.words.len()]
    }

    fn len(&self) -> u32 {
        self.words.len() as u32
    }
}
