//! Customer registry: a slot sequence of names, a name→[`Customer`] map, and
//! each customer's save-for-later set, under the same three concurrency
//! disciplines as the product catalogue.
//!
//! A customer's `save_for_later` set changes on almost every customer-worker
//! tick, while the registry's slot/map structure only changes on the much
//! rarer replacement/churn path. Folding `save_for_later` into the
//! replaceable part of the registry would mean `PhasedUpdates` has to
//! rebuild a whole snapshot on every save-for-later insert, which defeats the
//! point of that mode. Instead each [`Customer`] owns its set behind its own
//! mutex and is shared as an `Arc`; the registry's three modes only ever
//! swap which `Arc<Customer>` a slot/name points at.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rand::Rng;
use shelfstress_arraylet::Arraylet;
use shelfstress_concurrency::{ChangeLog, FairLock, SnapshotCell};
use shelfstress_config::Dictionary;
use shelfstress_queues::BrowsingHistoryHandle;

use crate::CatalogError;

/// A registered customer and their live save-for-later handles.
#[derive(Debug)]
pub struct Customer {
    pub id: u64,
    pub name: String,
    save_for_later: Mutex<HashSet<BrowsingHistoryHandle>>,
}

impl Customer {
    fn new(id: u64, name: String) -> Self {
        Self { id, name, save_for_later: Mutex::new(HashSet::new()) }
    }

    /// Registers a freshly enqueued browsing history on this customer.
    pub fn add_save_for_later(&self, handle: BrowsingHistoryHandle) {
        self.save_for_later.lock().expect("customer save-for-later mutex poisoned").insert(handle);
    }

    /// The handles currently in this customer's save-for-later set, for
    /// unioning into keyword-lookup candidates.
    #[must_use]
    pub fn save_for_later_snapshot(&self) -> Vec<BrowsingHistoryHandle> {
        self.save_for_later.lock().expect("customer save-for-later mutex poisoned").iter().copied().collect()
    }

    /// Drops a handle that a server worker has just popped as expired, or
    /// that `remove` resolved directly. A no-op if already absent.
    pub fn forget_save_for_later(&self, handle: BrowsingHistoryHandle) {
        self.save_for_later.lock().expect("customer save-for-later mutex poisoned").remove(&handle);
    }

    /// Takes every live handle, leaving the set empty. Called on retirement;
    /// the caller is responsible for removing each handle from its owning
    /// queue (the registry doesn't hold queue references, see module docs).
    fn drain_save_for_later(&self) -> Vec<BrowsingHistoryHandle> {
        std::mem::take(&mut *self.save_for_later.lock().expect("customer save-for-later mutex poisoned"))
            .into_iter()
            .collect()
    }
}

/// A pending replacement under `PhasedUpdates`: install `customer` at `slot`.
#[derive(Debug, Clone)]
pub struct CustomerChange {
    pub slot: usize,
    pub customer: Arc<Customer>,
}

/// The plain (non-concurrent) representation shared by `Coarse` mode (under
/// one [`FairLock`]) and `PhasedUpdates` mode (the immutable snapshot type).
#[derive(Debug, Clone)]
pub struct CustomerCore {
    slots: Arraylet<String>,
    customers: HashMap<String, Arc<Customer>>,
}

impl CustomerCore {
    /// Builds a registry of `num_customers` slots, each a freshly minted
    /// two-word customer regenerated until its name is unique.
    pub fn seeded(
        num_customers: u32,
        dictionary: &dyn Dictionary,
        rng: &mut impl Rng,
        next_id: &AtomicU64,
    ) -> Self {
        let mut slots = Arraylet::<String>::new(0, num_customers as usize)
            .expect("num_customers arraylet construction cannot fail with chunk_len 0");
        let mut customers = HashMap::new();

        for slot in 0..num_customers as usize {
            let name = unique_name(&customers, dictionary, rng);
            let id = next_id.fetch_add(1, Ordering::Relaxed);
            customers.insert(name.clone(), Arc::new(Customer::new(id, name.clone())));
            slots.set(slot, name).expect("slot in range by construction");
        }

        Self { slots, customers }
    }

    pub fn select_by_index(&self, i: usize) -> Result<Option<Arc<Customer>>, CatalogError> {
        select_by_index_parts(&self.slots, &self.customers, i)
    }

    fn num_slots(&self) -> usize {
        self.slots.len()
    }
}

fn unique_name(
    customers: &HashMap<String, Arc<Customer>>,
    dictionary: &dyn Dictionary,
    rng: &mut impl Rng,
) -> String {
    loop {
        let name = join_two_words(dictionary, rng);
        if !customers.contains_key(&name) {
            return name;
        }
    }
}

fn join_two_words(dictionary: &dyn Dictionary, rng: &mut impl Rng) -> String {
    let bound = u64::from(dictionary.len().max(1));
    let first = dictionary.word(rng.gen_range(0..bound)).to_string();
    let second = dictionary.word(rng.gen_range(0..bound)).to_string();
    format!("{first} {second}")
}

fn select_by_index_parts(
    slots: &Arraylet<String>,
    customers: &HashMap<String, Arc<Customer>>,
    i: usize,
) -> Result<Option<Arc<Customer>>, CatalogError> {
    let name = slots.get(i)?;
    Ok(customers.get(name).cloned())
}

/// Retires whatever customer currently occupies `slot` (if any) and installs
/// `new_customer` in its place. Returns the retired customer's drained
/// save-for-later handles, which the caller must remove from their owning
/// queues (see module docs).
fn retire_and_install(
    slots: &mut Arraylet<String>,
    customers: &mut HashMap<String, Arc<Customer>>,
    slot: usize,
    new_customer: Arc<Customer>,
) -> Result<Vec<BrowsingHistoryHandle>, CatalogError> {
    let old_name = slots.get(slot)?.clone();
    let drained = if let Some(old) = customers.remove(&old_name) {
        old.drain_save_for_later()
    } else {
        Vec::new()
    };
    slots.set(slot, new_customer.name.clone())?;
    customers.insert(new_customer.name.clone(), new_customer);
    Ok(drained)
}

/// Customer registry under one of the three concurrency disciplines selected
/// by configuration (`Coarse` is the default).
pub enum CustomerRegistry {
    Coarse { core: FairLock<CustomerCore>, next_id: AtomicU64 },
    FastAndFurious {
        slots: Mutex<Arraylet<String>>,
        customers: Mutex<HashMap<String, Arc<Customer>>>,
        next_id: AtomicU64,
    },
    Phased { snapshot: SnapshotCell<CustomerCore>, change_log: ChangeLog<CustomerChange>, next_id: AtomicU64 },
}

impl CustomerRegistry {
    /// Builds a `Coarse`-mode registry, seeded from `dictionary`.
    pub fn coarse(
        num_customers: u32,
        dictionary: &dyn Dictionary,
        rng: &mut impl Rng,
        wait_log_quantum_us: u64,
    ) -> Self {
        let next_id = AtomicU64::new(0);
        let core = CustomerCore::seeded(num_customers, dictionary, rng, &next_id);
        Self::Coarse { core: FairLock::new(core, wait_log_quantum_us), next_id }
    }

    /// Builds a `FastAndFurious`-mode registry, seeded from `dictionary`.
    pub fn fast_and_furious(num_customers: u32, dictionary: &dyn Dictionary, rng: &mut impl Rng) -> Self {
        let next_id = AtomicU64::new(0);
        let core = CustomerCore::seeded(num_customers, dictionary, rng, &next_id);
        Self::FastAndFurious {
            slots: Mutex::new(core.slots.clone()),
            customers: Mutex::new(core.customers.clone()),
            next_id,
        }
    }

    /// Builds a `PhasedUpdates`-mode registry, seeded from `dictionary`.
    pub fn phased(num_customers: u32, dictionary: &dyn Dictionary, rng: &mut impl Rng) -> Self {
        let next_id = AtomicU64::new(0);
        let core = CustomerCore::seeded(num_customers, dictionary, rng, &next_id);
        Self::Phased { snapshot: SnapshotCell::new(core), change_log: ChangeLog::new(), next_id }
    }

    /// Picks a uniformly random slot and returns its customer, if the slot
    /// name still resolves (always true outside a fine-grained race window).
    pub fn select_random(&self, rng: &mut impl Rng) -> Result<Option<Arc<Customer>>, CatalogError> {
        let num_slots = self.num_slots();
        let slot = rng.gen_range(0..num_slots);
        self.select_by_index(slot)
    }

    pub fn select_by_index(&self, i: usize) -> Result<Option<Arc<Customer>>, CatalogError> {
        match self {
            Self::Coarse { core, .. } => core.read(|core| core.select_by_index(i)),
            Self::FastAndFurious { slots, customers, .. } => {
                let slots = slots.lock().expect("registry slots mutex poisoned");
                let customers = customers.lock().expect("registry customers mutex poisoned");
                select_by_index_parts(&slots, &customers, i)
            }
            Self::Phased { snapshot, .. } => snapshot.load().select_by_index(i),
        }
    }

    fn num_slots(&self) -> usize {
        match self {
            Self::Coarse { core, .. } => core.read(CustomerCore::num_slots),
            Self::FastAndFurious { slots, .. } => {
                slots.lock().expect("registry slots mutex poisoned").len()
            }
            Self::Phased { snapshot, .. } => snapshot.load().num_slots(),
        }
    }

    /// Retires a uniformly random slot's customer and installs a freshly
    /// minted one with a newly generated, presently-unique two-word name.
    /// Returns the retired customer's drained save-for-later handles; the
    /// caller must remove each from its owning queue. In `PhasedUpdates`
    /// mode this only appends to the change log — no handles are drained
    /// until the next [`Self::rebuild`], so an empty vec is returned.
    pub fn replace_random(
        &self,
        dictionary: &dyn Dictionary,
        rng: &mut impl Rng,
    ) -> Result<Vec<BrowsingHistoryHandle>, CatalogError> {
        match self {
            Self::Coarse { core, next_id } => {
                let (slot, name) = core.read(|core| {
                    let slot = rng.gen_range(0..core.num_slots());
                    (slot, unique_name(&core.customers, dictionary, rng))
                });
                let id = next_id.fetch_add(1, Ordering::Relaxed);
                let new_customer = Arc::new(Customer::new(id, name));
                core.write(|core| retire_and_install(&mut core.slots, &mut core.customers, slot, new_customer))
            }
            Self::FastAndFurious { slots, customers, next_id } => {
                let num_slots = slots.lock().expect("registry slots mutex poisoned").len();
                let slot = rng.gen_range(0..num_slots);
                let name = unique_name(&customers.lock().expect("registry customers mutex poisoned"), dictionary, rng);
                let id = next_id.fetch_add(1, Ordering::Relaxed);
                let new_customer = Arc::new(Customer::new(id, name));

                let mut slots = slots.lock().expect("registry slots mutex poisoned");
                let mut customers = customers.lock().expect("registry customers mutex poisoned");
                retire_and_install(&mut slots, &mut customers, slot, new_customer)
            }
            Self::Phased { snapshot, change_log, next_id } => {
                let loaded = snapshot.load();
                let slot = rng.gen_range(0..loaded.num_slots());
                let name = unique_name(&loaded.customers, dictionary, rng);
                let id = next_id.fetch_add(1, Ordering::Relaxed);
                change_log.append(CustomerChange { slot, customer: Arc::new(Customer::new(id, name)) });
                Ok(Vec::new())
            }
        }
    }

    /// `PhasedUpdates` rebuilder step: drains the change log onto a shallow
    /// copy of the current snapshot and publishes it, returning the drained
    /// save-for-later handles of every customer retired in the process. A
    /// no-op (empty vec) under the other two modes, and when the change log
    /// is empty.
    pub fn rebuild(&self) -> Vec<BrowsingHistoryHandle> {
        let Self::Phased { snapshot, change_log, .. } = self else { return Vec::new() };
        let pending = change_log.drain();
        if pending.is_empty() {
            return Vec::new();
        }
        let mut next = (*snapshot.load()).clone();
        let mut orphaned = Vec::new();
        for change in pending {
            if next.customers.contains_key(&change.customer.name) {
                continue;
            }
            if let Ok(drained) = retire_and_install(&mut next.slots, &mut next.customers, change.slot, change.customer) {
                orphaned.extend(drained);
            }
        }
        snapshot.publish(next);
        orphaned
    }
}
