//! S6: two producers enqueue interleaved, one consumer drains; every drained
//! sequence must be a valid interleaving that preserves each producer's own
//! order (transaction id 0..N per producer, strictly increasing within that
//! producer's subsequence).

use std::sync::Arc;
use std::thread;

use shelfstress_queues::{SalesTransaction, SalesTransactionQueue};
use shelfstress_time::Absolute;

const PER_PRODUCER: u64 = 2_000;

#[test]
fn drained_sequence_preserves_per_producer_order() {
    let queue = Arc::new(SalesTransactionQueue::new());

    let producers: Vec<_> = (0..2u64)
        .map(|producer_id| {
            let queue = Arc::clone(&queue);
            thread::spawn(move || {
                for seq in 0..PER_PRODUCER {
                    queue.enqueue(SalesTransaction {
                        customer_id: producer_id,
                        product_id: seq,
                        review: String::new(),
                        enqueued_at: Absolute::now(),
                    });
                }
            })
        })
        .collect();

    let mut drained = Vec::new();
    // Drain continuously while producers are still running, then once more
    // after they finish, mirroring a server worker's repeated drain_all.
    while drained.len() < (PER_PRODUCER * 2) as usize {
        drained.extend(queue.drain_all());
        thread::yield_now();
    }

    for handle in producers {
        handle.join().unwrap();
    }
    drained.extend(queue.drain_all());

    assert_eq!(drained.len(), (PER_PRODUCER * 2) as usize);

    let mut last_seq_per_producer = [None::<u64>; 2];
    for tx in &drained {
        let idx = tx.customer_id as usize;
        if let Some(last) = last_seq_per_producer[idx] {
            assert!(tx.product_id > last, "producer {idx} observed out of order: {last} then {}", tx.product_id);
        }
        last_seq_per_producer[idx] = Some(tx.product_id);
    }
    assert_eq!(last_seq_per_producer[0], Some(PER_PRODUCER - 1));
    assert_eq!(last_seq_per_producer[1], Some(PER_PRODUCER - 1));
}
