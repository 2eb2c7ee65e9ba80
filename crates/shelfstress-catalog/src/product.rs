//! Product catalogue: a slot sequence of ids, an id→[`Product`] map, and two
//! inverted keyword indexes, under three swappable concurrency disciplines.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use rand::Rng;
use shelfstress_arraylet::Arraylet;
use shelfstress_concurrency::{ChangeLog, FairLock, SnapshotCell};
use shelfstress_config::Dictionary;

use crate::CatalogError;

/// A slot with no live product. Only ever observed transiently, between a
/// fine-grained retirement and the matching install.
const SENTINEL: u64 = u64::MAX;

/// A catalogue entry. `available` latches to `false` on retirement and
/// never reverts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Product {
    pub id: u64,
    pub name: String,
    pub description: String,
    pub available: bool,
}

/// Whether a multi-keyword lookup requires every keyword to match
/// (`All`) or any of them (`Any`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    All,
    Any,
}

/// A pending replacement under `PhasedUpdates`: install `product` at `slot`.
#[derive(Debug, Clone)]
pub struct ProductChange {
    pub slot: usize,
    pub product: Product,
}

/// The plain (non-concurrent) representation shared by `Coarse` mode (under
/// one [`FairLock`]) and `PhasedUpdates` mode (as the immutable snapshot
/// type inside [`SnapshotCell`]).
#[derive(Debug, Clone)]
pub struct CatalogCore {
    slots: Arraylet<u64>,
    products: HashMap<u64, Product>,
    name_index: HashMap<String, HashSet<u64>>,
    description_index: HashMap<String, HashSet<u64>>,
}

impl CatalogCore {
    /// Builds a catalogue of `num_products` slots, each populated from
    /// `dictionary` using `rng` for slot/word selection.
    pub fn seeded(
        num_products: u32,
        name_words: u32,
        description_words: u32,
        dictionary: &dyn Dictionary,
        rng: &mut impl Rng,
        next_id: &AtomicU64,
    ) -> Self {
        let mut slots = Arraylet::<u64>::new(0, num_products as usize)
            .expect("num_products arraylet construction cannot fail with chunk_len 0");
        let mut products = HashMap::new();
        let mut name_index: HashMap<String, HashSet<u64>> = HashMap::new();
        let mut description_index: HashMap<String, HashSet<u64>> = HashMap::new();

        for slot in 0..num_products as usize {
            let id = next_id.fetch_add(1, Ordering::Relaxed);
            let product = make_random_product(id, name_words, description_words, dictionary, rng);
            index_product(&mut name_index, &mut description_index, &product);
            products.insert(id, product);
            slots.set(slot, id).expect("slot in range by construction");
        }

        Self { slots, products, name_index, description_index }
    }

    pub fn fetch_by_index(&self, i: usize) -> Result<Option<Product>, CatalogError> {
        fetch_by_index_parts(&self.slots, &self.products, i)
    }

    pub fn fetch_by_id(&self, id: u64) -> Option<Product> {
        self.products.get(&id).cloned()
    }

    pub fn lookup(&self, keywords: &[String], mode: MatchMode) -> Vec<Product> {
        lookup_parts(&self.name_index, &self.description_index, &self.products, keywords, mode)
    }

    pub fn apply_replacement(&mut self, slot: usize, new_product: Product) -> Result<(), CatalogError> {
        retire_and_install(
            &mut self.slots,
            &mut self.products,
            &mut self.name_index,
            &mut self.description_index,
            slot,
            new_product,
        )
    }

    fn num_slots(&self) -> usize {
        self.slots.len()
    }
}

fn make_random_product(
    id: u64,
    name_words: u32,
    description_words: u32,
    dictionary: &dyn Dictionary,
    rng: &mut impl Rng,
) -> Product {
    let name = join_random_words(dictionary, rng, name_words);
    let description = join_random_words(dictionary, rng, description_words);
    Product { id, name, description, available: true }
}

fn join_random_words(dictionary: &dyn Dictionary, rng: &mut impl Rng, count: u32) -> String {
    (0..count)
        .map(|_| {
            let idx = rng.gen_range(0..u64::from(dictionary.len().max(1)));
            dictionary.word(idx).to_string()
        })
        .collect::<Vec<_>>()
        .join(" ")
}

fn index_product(
    name_index: &mut HashMap<String, HashSet<u64>>,
    description_index: &mut HashMap<String, HashSet<u64>>,
    product: &Product,
) {
    for word in product.name.split_whitespace() {
        name_index.entry(word.to_string()).or_default().insert(product.id);
    }
    for word in product.description.split_whitespace() {
        description_index.entry(word.to_string()).or_default().insert(product.id);
    }
}

fn unindex_product(
    name_index: &mut HashMap<String, HashSet<u64>>,
    description_index: &mut HashMap<String, HashSet<u64>>,
    product: &Product,
) {
    // Keyword keys are never removed once inserted, only emptied.
    for word in product.name.split_whitespace() {
        if let Some(ids) = name_index.get_mut(word) {
            ids.remove(&product.id);
        }
    }
    for word in product.description.split_whitespace() {
        if let Some(ids) = description_index.get_mut(word) {
            ids.remove(&product.id);
        }
    }
}

fn fetch_by_index_parts(
    slots: &Arraylet<u64>,
    products: &HashMap<u64, Product>,
    i: usize,
) -> Result<Option<Product>, CatalogError> {
    let id = *slots.get(i)?;
    if id == SENTINEL {
        return Ok(None);
    }
    Ok(products.get(&id).cloned())
}

fn lookup_parts(
    name_index: &HashMap<String, HashSet<u64>>,
    description_index: &HashMap<String, HashSet<u64>>,
    products: &HashMap<u64, Product>,
    keywords: &[String],
    mode: MatchMode,
) -> Vec<Product> {
    let ids_for = |keyword: &str| -> HashSet<u64> {
        let mut ids = HashSet::new();
        if let Some(s) = name_index.get(keyword) {
            ids.extend(s.iter().copied());
        }
        if let Some(s) = description_index.get(keyword) {
            ids.extend(s.iter().copied());
        }
        ids
    };

    let resolve = |ids: HashSet<u64>| -> HashSet<u64> {
        ids.into_iter()
            .filter(|id| products.get(id).is_some_and(|p| p.available))
            .collect()
    };

    match mode {
        MatchMode::Any => {
            let mut all_ids = HashSet::new();
            for kw in keywords {
                all_ids.extend(ids_for(kw));
            }
            resolve(all_ids)
                .into_iter()
                .filter_map(|id| products.get(&id).cloned())
                .collect()
        }
        MatchMode::All => {
            let mut iter = keywords.iter();
            let Some(first) = iter.next() else { return Vec::new() };
            let mut acc = resolve(ids_for(first));
            for kw in iter {
                if acc.is_empty() {
                    break;
                }
                let next = resolve(ids_for(kw));
                acc.retain(|id| next.contains(id));
            }
            acc.into_iter().filter_map(|id| products.get(&id).cloned()).collect()
        }
    }
}

fn retire_and_install(
    slots: &mut Arraylet<u64>,
    products: &mut HashMap<u64, Product>,
    name_index: &mut HashMap<String, HashSet<u64>>,
    description_index: &mut HashMap<String, HashSet<u64>>,
    slot: usize,
    new_product: Product,
) -> Result<(), CatalogError> {
    let old_id = *slots.get(slot)?;
    if old_id != SENTINEL {
        if let Some(mut old) = products.remove(&old_id) {
            old.available = false;
            unindex_product(name_index, description_index, &old);
        }
    }
    index_product(name_index, description_index, &new_product);
    let new_id = new_product.id;
    products.insert(new_id, new_product);
    slots.set(slot, new_id)?;
    Ok(())
}

/// Product catalogue under one of the three concurrency disciplines
/// selected by configuration (`Coarse` is the default).
pub enum ProductCatalogue {
    Coarse { core: FairLock<CatalogCore>, next_id: AtomicU64 },
    FastAndFurious {
        slots: Mutex<Arraylet<u64>>,
        products: Mutex<HashMap<u64, Product>>,
        name_index: Mutex<HashMap<String, HashSet<u64>>>,
        description_index: Mutex<HashMap<String, HashSet<u64>>>,
        next_id: AtomicU64,
    },
    Phased { snapshot: SnapshotCell<CatalogCore>, change_log: ChangeLog<ProductChange>, next_id: AtomicU64 },
}

impl ProductCatalogue {
    /// Builds a `Coarse`-mode catalogue, seeded from `dictionary`.
    pub fn coarse(
        num_products: u32,
        name_words: u32,
        description_words: u32,
        dictionary: &dyn Dictionary,
        rng: &mut impl Rng,
        wait_log_quantum_us: u64,
    ) -> Self {
        let next_id = AtomicU64::new(0);
        let core = CatalogCore::seeded(num_products, name_words, description_words, dictionary, rng, &next_id);
        Self::Coarse { core: FairLock::new(core, wait_log_quantum_us), next_id }
    }

    /// Builds a `FastAndFurious`-mode catalogue, seeded from `dictionary`.
    pub fn fast_and_furious(
        num_products: u32,
        name_words: u32,
        description_words: u32,
        dictionary: &dyn Dictionary,
        rng: &mut impl Rng,
    ) -> Self {
        let next_id = AtomicU64::new(0);
        let core = CatalogCore::seeded(num_products, name_words, description_words, dictionary, rng, &next_id);
        Self::FastAndFurious {
            slots: Mutex::new(core.slots.clone()),
            products: Mutex::new(core.products.clone()),
            name_index: Mutex::new(core.name_index.clone()),
            description_index: Mutex::new(core.description_index.clone()),
            next_id,
        }
    }

    /// Builds a `PhasedUpdates`-mode catalogue, seeded from `dictionary`.
    pub fn phased(
        num_products: u32,
        name_words: u32,
        description_words: u32,
        dictionary: &dyn Dictionary,
        rng: &mut impl Rng,
    ) -> Self {
        let next_id = AtomicU64::new(0);
        let core = CatalogCore::seeded(num_products, name_words, description_words, dictionary, rng, &next_id);
        Self::Phased { snapshot: SnapshotCell::new(core), change_log: ChangeLog::new(), next_id }
    }

    pub fn fetch_by_index(&self, i: usize) -> Result<Option<Product>, CatalogError> {
        match self {
            Self::Coarse { core, .. } => core.read(|core| core.fetch_by_index(i)),
            Self::FastAndFurious { slots, products, .. } => {
                let slots = slots.lock().expect("catalogue slots mutex poisoned");
                let products = products.lock().expect("catalogue products mutex poisoned");
                fetch_by_index_parts(&slots, &products, i)
            }
            Self::Phased { snapshot, .. } => snapshot.load().fetch_by_index(i),
        }
    }

    pub fn lookup(&self, keywords: &[String], mode: MatchMode) -> Vec<Product> {
        match self {
            Self::Coarse { core, .. } => core.read(|core| core.lookup(keywords, mode)),
            Self::FastAndFurious { name_index, description_index, products, .. } => {
                let name_index = name_index.lock().expect("catalogue name index mutex poisoned");
                let description_index =
                    description_index.lock().expect("catalogue description index mutex poisoned");
                let products = products.lock().expect("catalogue products mutex poisoned");
                lookup_parts(&name_index, &description_index, &products, keywords, mode)
            }
            Self::Phased { snapshot, .. } => snapshot.load().lookup(keywords, mode),
        }
    }

    /// Resolves a product by its stable id (as opposed to [`Self::fetch_by_index`]'s
    /// slot lookup). Used to turn a customer's save-for-later handles back
    /// into candidate products.
    pub fn fetch_by_id(&self, id: u64) -> Option<Product> {
        match self {
            Self::Coarse { core, .. } => core.read(|core| core.fetch_by_id(id)),
            Self::FastAndFurious { products, .. } => {
                products.lock().expect("catalogue products mutex poisoned").get(&id).cloned()
            }
            Self::Phased { snapshot, .. } => snapshot.load().fetch_by_id(id),
        }
    }

    /// Replaces a uniformly random slot's product with a freshly minted one.
    /// Returns the new product's id. In `PhasedUpdates` mode this only
    /// appends to the change log; the replacement is not visible to readers
    /// until the next [`Self::rebuild`].
    pub fn replace_random(
        &self,
        name_words: u32,
        description_words: u32,
        dictionary: &dyn Dictionary,
        rng: &mut impl Rng,
    ) -> Result<u64, CatalogError> {
        match self {
            Self::Coarse { core, next_id } => {
                let num_slots = core.read(|core| core.num_slots());
                let slot = rng.gen_range(0..num_slots);
                let id = next_id.fetch_add(1, Ordering::Relaxed);
                let product = make_random_product(id, name_words, description_words, dictionary, rng);
                core.write(|core| core.apply_replacement(slot, product))?;
                Ok(id)
            }
            Self::FastAndFurious { slots, products, name_index, description_index, next_id } => {
                let num_slots = slots.lock().expect("catalogue slots mutex poisoned").len();
                let slot = rng.gen_range(0..num_slots);
                let id = next_id.fetch_add(1, Ordering::Relaxed);
                let product = make_random_product(id, name_words, description_words, dictionary, rng);

                let mut slots = slots.lock().expect("catalogue slots mutex poisoned");
                let mut products = products.lock().expect("catalogue products mutex poisoned");
                let mut name_index = name_index.lock().expect("catalogue name index mutex poisoned");
                let mut description_index =
                    description_index.lock().expect("catalogue description index mutex poisoned");
                retire_and_install(&mut slots, &mut products, &mut name_index, &mut description_index, slot, product)?;
                Ok(id)
            }
            Self::Phased { snapshot, change_log, next_id } => {
                let num_slots = snapshot.load().num_slots();
                let slot = rng.gen_range(0..num_slots);
                let id = next_id.fetch_add(1, Ordering::Relaxed);
                let product = make_random_product(id, name_words, description_words, dictionary, rng);
                change_log.append(ProductChange { slot, product });
                Ok(id)
            }
        }
    }

    /// `PhasedUpdates` rebuilder step: drains the change log onto a shallow
    /// copy of the current snapshot and publishes it. A no-op under the
    /// other two modes.
    pub fn rebuild(&self) {
        if let Self::Phased { snapshot, change_log, .. } = self {
            let pending = change_log.drain();
            if pending.is_empty() {
                return;
            }
            let mut next = (*snapshot.load()).clone();
            for change in pending {
                if !next.products.contains_key(&change.product.id) {
                    let _ = next.apply_replacement(change.slot, change.product);
                }
            }
            snapshot.publish(next);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use shelfstress_config::VecDictionary;

    fn dict() -> VecDictionary {
        VecDictionary::new((0..200).map(|i| format!("word{i}")).collect())
    }

    fn core_with_named_products(names: &[(&str, &str)]) -> CatalogCore {
        let mut slots = Arraylet::<u64>::new(0, names.len()).unwrap();
        let mut products = HashMap::new();
        let mut name_index: HashMap<String, HashSet<u64>> = HashMap::new();
        let mut description_index: HashMap<String, HashSet<u64>> = HashMap::new();
        for (i, (name, description)) in names.iter().enumerate() {
            let product = Product { id: i as u64, name: name.to_string(), description: description.to_string(), available: true };
            index_product(&mut name_index, &mut description_index, &product);
            products.insert(i as u64, product);
            slots.set(i, i as u64).unwrap();
        }
        CatalogCore { slots, products, name_index, description_index }
    }

    /// S3: {"red hat", "red shoe", "blue hat"}; matches-all([red, hat]) ==
    /// {"red hat"}; matches-any([red, hat]) == all three.
    #[test]
    fn keyword_all_match_is_exact_any_match_is_union() {
        let core = core_with_named_products(&[("red hat", ""), ("red shoe", ""), ("blue hat", "")]);
        let keywords = vec!["red".to_string(), "hat".to_string()];

        let all = core.lookup(&keywords, MatchMode::All);
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "red hat");

        let mut any: Vec<&str> = core.lookup(&keywords, MatchMode::Any).iter().map(|p| p.name.as_str()).collect();
        any.sort_unstable();
        assert_eq!(any, vec!["blue hat", "red hat", "red shoe"]);
    }

    /// Invariant 11: with a keyword absent from every product, matches-all is empty.
    #[test]
    fn matches_all_with_absent_keyword_is_empty() {
        let core = core_with_named_products(&[("red hat", ""), ("blue hat", "")]);
        let keywords = vec!["red".to_string(), "galoshes".to_string()];
        assert!(core.lookup(&keywords, MatchMode::All).is_empty());
    }

    #[test]
    fn lookup_excludes_retired_products() {
        let mut core = core_with_named_products(&[("red hat", ""), ("red shoe", "")]);
        let replacement = Product { id: 99, name: "green boot".to_string(), description: String::new(), available: true };
        core.apply_replacement(0, replacement).unwrap();

        let results = core.lookup(&["red".to_string()], MatchMode::Any);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].name, "red shoe");
    }

    /// Invariant 2 / testable property 6: keyword keys persist after the id
    /// set they referenced shrinks to empty; the new product is reachable
    /// and the old one is not.
    #[test]
    fn replacement_keeps_keyword_key_but_drops_old_id() {
        let mut core = core_with_named_products(&[("solo item", "")]);
        let replacement = Product { id: 7, name: "fresh item".to_string(), description: String::new(), available: true };
        core.apply_replacement(0, replacement).unwrap();

        assert!(core.name_index.contains_key("solo"), "keyword key must survive even though its set is now empty");
        assert!(core.name_index["solo"].is_empty());
        assert_eq!(core.fetch_by_index(0).unwrap().unwrap().name, "fresh item");
        assert!(core.fetch_by_id(0).is_none(), "old product id must no longer resolve");
    }

    #[test]
    fn fetch_by_index_out_of_bounds_is_an_error() {
        let core = core_with_named_products(&[("a", "")]);
        assert!(core.fetch_by_index(5).is_err());
    }

    #[test]
    fn seeded_coarse_catalogue_has_exactly_num_products_slots() {
        let mut rng = StdRng::seed_from_u64(11);
        let catalogue = ProductCatalogue::coarse(30, 3, 5, &dict(), &mut rng, 256);
        for i in 0..30 {
            assert!(catalogue.fetch_by_index(i).unwrap().is_some());
        }
        assert!(catalogue.fetch_by_index(30).is_err());
    }

    #[test]
    fn replace_random_installs_a_reachable_new_product_and_retires_the_old_one() {
        let mut rng = StdRng::seed_from_u64(5);
        let catalogue = ProductCatalogue::coarse(10, 2, 3, &dict(), &mut rng, 256);
        let before: Vec<Option<Product>> = (0..10).map(|i| catalogue.fetch_by_index(i).unwrap()).collect();

        let new_id = catalogue.replace_random(2, 3, &dict(), &mut rng).unwrap();
        let after: Vec<Option<Product>> = (0..10).map(|i| catalogue.fetch_by_index(i).unwrap()).collect();

        let changed_slot = before.iter().zip(after.iter()).position(|(a, b)| a.as_ref().unwrap().id != b.as_ref().unwrap().id);
        assert!(changed_slot.is_some(), "exactly one slot should have changed");
        let new_product = after[changed_slot.unwrap()].as_ref().unwrap();
        assert_eq!(new_product.id, new_id);
    }

    #[test]
    fn phased_mode_replacement_is_invisible_until_rebuild() {
        let mut rng = StdRng::seed_from_u64(9);
        let catalogue = ProductCatalogue::phased(5, 2, 2, &dict(), &mut rng);
        let before: Vec<u64> = (0..5).map(|i| catalogue.fetch_by_index(i).unwrap().unwrap().id).collect();

        catalogue.replace_random(2, 2, &dict(), &mut rng).unwrap();
        let still_before: Vec<u64> = (0..5).map(|i| catalogue.fetch_by_index(i).unwrap().unwrap().id).collect();
        assert_eq!(before, still_before, "pending change log entries must not be visible before rebuild");

        catalogue.rebuild();
        let after: Vec<u64> = (0..5).map(|i| catalogue.fetch_by_index(i).unwrap().unwrap().id).collect();
        assert_ne!(before, after);
    }

    #[test]
    fn phased_rebuild_with_empty_change_log_is_a_noop() {
        let mut rng = StdRng::seed_from_u64(13);
        let catalogue = ProductCatalogue::phased(5, 2, 2, &dict(), &mut rng);
        let before: Vec<u64> = (0..5).map(|i| catalogue.fetch_by_index(i).unwrap().unwrap().id).collect();
        catalogue.rebuild();
        let after: Vec<u64> = (0..5).map(|i| catalogue.fetch_by_index(i).unwrap().unwrap().id).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn fast_and_furious_replace_random_preserves_slot_count() {
        let mut rng = StdRng::seed_from_u64(21);
        let catalogue = ProductCatalogue::fast_and_furious(15, 2, 2, &dict(), &mut rng);
        for _ in 0..15 {
            assert!(catalogue.replace_random(2, 2, &dict(), &mut rng).is_ok());
        }
        for i in 0..15 {
            assert!(catalogue.fetch_by_index(i).unwrap().is_some());
        }
    }
}
