//! Simulation scheduler: wires the catalogue, registry, and queues from
//! `shelfstress-catalog`/`shelfstress-queues` into staggered customer/server
//! worker loops, plus the optional transaction-rate search.
//!
//! This crate owns the *units of work* and the *scheduling*; the driving
//! loop that spawns OS threads and runs them to `SimulationDuration` lives
//! in `demos/` — the worker functions here are what such an entry-point
//! would call.

pub mod engine;
pub mod rate_search;
pub mod review;
pub mod scheduler;
pub mod worker;

pub use engine::{Engine, SharedEngine};
pub use rate_search::{AttemptResult, RateSearch, RateSearchOutcome};
pub use scheduler::Schedule;
pub use worker::{
    customer_tick, server_tick, AttentionPoint, CustomerOutcome, ReplacementClocks, ServerWorkerLogs,
};
