//! Expiration and transaction queues.
//!
//! [`BrowsingHistoryQueue`] is a mutex-protected doubly-linked list ordered
//! by expiration. Rather than the textbook pointer-linked node (`BrowsingHistory`
//! holding a raw reference back to its queue, which Rust's ownership model
//! won't let two sides of a cycle share), entries live in a slab inside the
//! queue and are addressed from outside by a `BrowsingHistoryHandle`
//! (queue id + slot id). A customer's save-for-later set stores handles, not
//! pointers; retiring a customer means calling `remove` on each handle's
//! queue.
//!
//! [`SalesTransactionQueue`] is a plain mutex-protected FIFO.

use std::sync::Mutex;

use shelfstress_time::Absolute;

/// Identifies one `BrowsingHistoryQueue` among the partitioned set
/// (`BrowsingHistoryQueueCount` of them).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct QueueId(pub u32);

/// Addresses one live entry inside a specific `BrowsingHistoryQueue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BrowsingHistoryHandle {
    pub queue: QueueId,
    slot: u32,
    generation: u32,
}

/// The data carried by a browsing-history entry, returned on `pop_if_expired`/`remove`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BrowsingHistoryRecord {
    pub customer_id: u64,
    pub product_id: u64,
    pub expires_at: Absolute,
}

struct Entry {
    record: BrowsingHistoryRecord,
    generation: u32,
    prev: Option<u32>,
    next: Option<u32>,
}

enum Slot {
    Occupied(Entry),
    Free { next_free: Option<u32>, generation: u32 },
}

/// A doubly-linked, mutex-protected queue of browsing histories, ordered by
/// insertion (which equals expiration order: every enqueue uses the same
/// `BrowsingExpiration` duration from the time it runs).
pub struct BrowsingHistoryQueue {
    id: QueueId,
    inner: Mutex<Inner>,
}

struct Inner {
    slots: Vec<Slot>,
    free_head: Option<u32>,
    head: Option<u32>,
    tail: Option<u32>,
}

impl BrowsingHistoryQueue {
    /// Builds an empty queue carrying the given partition id.
    #[must_use]
    pub fn new(id: QueueId) -> Self {
        Self {
            id,
            inner: Mutex::new(Inner { slots: Vec::new(), free_head: None, head: None, tail: None }),
        }
    }

    /// This queue's partition id.
    #[must_use]
    pub fn id(&self) -> QueueId {
        self.id
    }

    /// Appends a new history at the tail, returning the handle a customer
    /// should remember in its save-for-later set.
    pub fn enqueue(
        &self,
        customer_id: u64,
        product_id: u64,
        expires_at: Absolute,
    ) -> BrowsingHistoryHandle {
        let mut inner = self.inner.lock().expect("browsing history queue mutex poisoned");
        let record = BrowsingHistoryRecord { customer_id, product_id, expires_at };

        let (slot, generation) = match inner.free_head.take() {
            Some(idx) => {
                let generation = match &inner.slots[idx as usize] {
                    Slot::Free { generation, .. } => *generation,
                    Slot::Occupied(_) => unreachable!("free list pointed at an occupied slot"),
                };
                let next_free = match &inner.slots[idx as usize] {
                    Slot::Free { next_free, .. } => *next_free,
                    Slot::Occupied(_) => unreachable!(),
                };
                inner.free_head = next_free;
                (idx, generation)
            }
            None => {
                let idx = inner.slots.len() as u32;
                inner.slots.push(Slot::Free { next_free: None, generation: 0 });
                (idx, 0)
            }
        };

        let prev = inner.tail;
        inner.slots[slot as usize] = Slot::Occupied(Entry { record, generation, prev, next: None });
        if let Some(prev_idx) = prev {
            if let Slot::Occupied(e) = &mut inner.slots[prev_idx as usize] {
                e.next = Some(slot);
            }
        }
        inner.tail = Some(slot);
        if inner.head.is_none() {
            inner.head = Some(slot);
        }

        BrowsingHistoryHandle { queue: self.id, slot, generation }
    }

    /// If the head entry's `expires_at <= now`, unlinks and returns it.
    /// Otherwise (empty queue, or head not yet expired) returns `None`.
    pub fn pop_if_expired(&self, now: Absolute) -> Option<BrowsingHistoryRecord> {
        let mut inner = self.inner.lock().expect("browsing history queue mutex poisoned");
        let head_idx = inner.head?;
        let expired = match &inner.slots[head_idx as usize] {
            Slot::Occupied(e) => e.record.expires_at.cmp(&now) != std::cmp::Ordering::Greater,
            Slot::Free { .. } => unreachable!("head pointed at a free slot"),
        };
        if !expired {
            return None;
        }
        Some(Self::unlink(&mut inner, head_idx))
    }

    /// Reads the record at `handle` without unlinking it. Returns `None` if
    /// the handle has already been removed (stale generation).
    pub fn peek(&self, handle: BrowsingHistoryHandle) -> Option<BrowsingHistoryRecord> {
        debug_assert_eq!(handle.queue, self.id, "handle belongs to a different queue");
        let inner = self.inner.lock().expect("browsing history queue mutex poisoned");
        match inner.slots.get(handle.slot as usize) {
            Some(Slot::Occupied(e)) if e.generation == handle.generation => Some(e.record),
            _ => None,
        }
    }

    /// Unlinks whichever position `handle` currently occupies and returns
    /// its record. Returns `None` if the handle was already removed (stale
    /// generation) — removal is therefore safe to call twice.
    pub fn remove(&self, handle: BrowsingHistoryHandle) -> Option<BrowsingHistoryRecord> {
        debug_assert_eq!(handle.queue, self.id, "handle belongs to a different queue");
        let mut inner = self.inner.lock().expect("browsing history queue mutex poisoned");
        match inner.slots.get(handle.slot as usize) {
            Some(Slot::Occupied(e)) if e.generation == handle.generation => {}
            _ => return None,
        }
        Some(Self::unlink(&mut inner, handle.slot))
    }

    fn unlink(inner: &mut Inner, idx: u32) -> BrowsingHistoryRecord {
        let (record, generation, prev, next) = match std::mem::replace(
            &mut inner.slots[idx as usize],
            Slot::Free { next_free: None, generation: 0 },
        ) {
            Slot::Occupied(e) => (e.record, e.generation, e.prev, e.next),
            Slot::Free { .. } => unreachable!("unlink called on an already-free slot"),
        };

        match prev {
            Some(p) => {
                if let Slot::Occupied(e) = &mut inner.slots[p as usize] {
                    e.next = next;
                }
            }
            None => inner.head = next,
        }
        match next {
            Some(n) => {
                if let Slot::Occupied(e) = &mut inner.slots[n as usize] {
                    e.prev = prev;
                }
            }
            None => inner.tail = prev,
        }

        inner.slots[idx as usize] =
            Slot::Free { next_free: inner.free_head, generation: generation.wrapping_add(1) };
        inner.free_head = Some(idx);

        record
    }

    /// Number of histories currently live in this queue. For tests/metrics only.
    #[must_use]
    pub fn len(&self) -> usize {
        let inner = self.inner.lock().expect("browsing history queue mutex poisoned");
        let mut count = 0;
        let mut cur = inner.head;
        while let Some(idx) = cur {
            count += 1;
            cur = match &inner.slots[idx as usize] {
                Slot::Occupied(e) => e.next,
                Slot::Free { .. } => unreachable!(),
            };
        }
        count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A sale awaiting processing by a server worker. `enqueued_at` lets the
/// server worker that eventually dequeues it record the full enqueue-to-
/// dequeue latency once a server worker drains it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SalesTransaction {
    pub customer_id: u64,
    pub product_id: u64,
    pub review: String,
    pub enqueued_at: Absolute,
}

/// A mutex-protected FIFO of pending sales transactions.
#[derive(Default)]
pub struct SalesTransactionQueue {
    inner: Mutex<Vec<SalesTransaction>>,
}

impl SalesTransactionQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a transaction at the tail.
    pub fn enqueue(&self, tx: SalesTransaction) {
        self.inner.lock().expect("sales transaction queue mutex poisoned").push(tx);
    }

    /// Atomically takes every pending transaction, leaving the queue empty.
    pub fn drain_all(&self) -> Vec<SalesTransaction> {
        let mut guard = self.inner.lock().expect("sales transaction queue mutex poisoned");
        std::mem::take(&mut *guard)
    }

    /// Number of transactions currently pending. For tests/metrics only.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().expect("sales transaction queue mutex poisoned").len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn later(base: Absolute, ms: u64) -> Absolute {
        base + shelfstress_time::Relative::from_millis(ms)
    }

    #[test]
    fn fifo_order_and_expiration_gate() {
        let q = BrowsingHistoryQueue::new(QueueId(0));
        let base = Absolute::now();
        let h1 = q.enqueue(1, 10, later(base, 5));
        let h2 = q.enqueue(2, 20, later(base, 500));
        assert_eq!(q.len(), 2);

        // Not yet expired relative to `base`.
        assert!(q.pop_if_expired(base).is_none());

        let past_first = later(base, 5) + Duration::from_millis(1).into();
        let popped = q.pop_if_expired(past_first).unwrap();
        assert_eq!(popped.customer_id, 1);
        assert_eq!(popped.product_id, 10);
        assert_eq!(q.len(), 1);

        // h1 already popped; removing again is a no-op.
        assert!(q.remove(h1).is_none());

        let removed = q.remove(h2).unwrap();
        assert_eq!(removed.customer_id, 2);
        assert!(q.is_empty());
    }

    #[test]
    fn remove_from_middle_relinks_neighbors() {
        let q = BrowsingHistoryQueue::new(QueueId(1));
        let base = Absolute::now();
        let _h1 = q.enqueue(1, 1, later(base, 100));
        let h2 = q.enqueue(2, 2, later(base, 200));
        let _h3 = q.enqueue(3, 3, later(base, 300));

        assert!(q.remove(h2).is_some());
        assert_eq!(q.len(), 2);

        let far_future = later(base, 1_000);
        let first = q.pop_if_expired(far_future).unwrap();
        assert_eq!(first.customer_id, 1);
        let second = q.pop_if_expired(far_future).unwrap();
        assert_eq!(second.customer_id, 3);
        assert!(q.is_empty());
    }

    #[test]
    fn slots_are_reused_after_removal() {
        let q = BrowsingHistoryQueue::new(QueueId(2));
        let base = Absolute::now();
        let h1 = q.enqueue(1, 1, base);
        q.remove(h1).unwrap();
        let h2 = q.enqueue(2, 2, base);
        // Same physical slot reused, but a fresh generation, so the stale h1 never matches.
        assert!(q.remove(h1).is_none());
        assert!(q.remove(h2).is_some());
    }

    #[test]
    fn transaction_queue_is_fifo_and_drains_atomically() {
        let q = SalesTransactionQueue::new();
        let now = Absolute::now();
        q.enqueue(SalesTransaction { customer_id: 1, product_id: 1, review: "great".into(), enqueued_at: now });
        q.enqueue(SalesTransaction { customer_id: 2, product_id: 2, review: "meh".into(), enqueued_at: now });
        assert_eq!(q.len(), 2);

        let drained = q.drain_all();
        assert_eq!(drained.len(), 2);
        assert_eq!(drained[0].customer_id, 1);
        assert!(q.is_empty());
    }

    proptest::proptest! {
        #[test]
        fn enqueue_remove_sequence_never_corrupts_links(ops in proptest::collection::vec(0u8..3, 1..200)) {
            let q = BrowsingHistoryQueue::new(QueueId(9));
            let base = Absolute::now();
            let mut handles: Vec<BrowsingHistoryHandle> = Vec::new();
            for (i, op) in ops.iter().enumerate() {
                match op {
                    0 => {
                        let h = q.enqueue(i as u64, i as u64, later(base, 1_000_000));
                        handles.push(h);
                    }
                    1 => {
                        if !handles.is_empty() {
                            let h = handles.remove(0);
                            q.remove(h);
                        }
                    }
                    _ => {
                        q.pop_if_expired(base);
                    }
                }
            }
            // No panics, and length is never larger than what we enqueued.
            proptest::prop_assert!(q.len() <= ops.len());
        }
    }
}
