//! Product catalogue and customer registry: the two indexed, concurrently
//! accessed structures the simulation drives.
//!
//! Both structures share the same three-mode shape (`Coarse`, `FastAndFurious`,
//! `Phased`) built from [`shelfstress_concurrency`]'s primitives, and both
//! resolve browsing-history bookkeeping through [`shelfstress_queues`] handles
//! rather than back-pointers (see `customer` module docs).

pub mod customer;
pub mod product;

pub use customer::{Customer, CustomerChange, CustomerRegistry};
pub use product::{CatalogCore, MatchMode, Product, ProductCatalogue, ProductChange};

use thiserror::Error;

/// Structural failures from the catalogue/registry. Never used to signal
/// "not found" — that's modeled as `Option`/empty results instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Arraylet(#[from] shelfstress_arraylet::ArrayletError),
}
