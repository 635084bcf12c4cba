//! Cell Pool Tests
//!
//! - Acquired cells hold exactly the requested value
//! - Recycled cells carry no state from their previous tenant
//! - Cells still observed elsewhere are never recycled

use crate::*;

/// acquire(v).read() == v after any donate/acquire history
#[test]
fn test_acquired_cell_reads_its_value() {
    let pool = CellPool::new(4);
    let mut kept = Vec::new();
    for round in 0..50u32 {
        let cell = pool.acquire(round);
        assert_eq!(cell.read(), round);
        atomically(|| cell.modify(|v| v + 1_000)).unwrap();
        if round % 5 == 0 {
            kept.push(cell);
        } else {
            pool.donate(cell);
        }
    }
    assert_eq!(pool.acquire(7).read(), 7);
    for (i, cell) in kept.iter().enumerate() {
        assert_eq!(cell.read(), i as u32 * 5 + 1_000);
    }
}

/// A recycled cell is a new identity: stale read-sets cannot match it
#[test]
fn test_recycled_cell_has_fresh_identity() {
    let pool = CellPool::new(1);
    let first = pool.acquire(1);
    let old_id = first.id();
    assert!(pool.donate(first));

    let second = pool.acquire(2);
    assert_ne!(second.id(), old_id);
    assert_eq!(pool.stats().reused, 1);

    let mut tx = Transaction::begin();
    second.write(second.read() + 1).unwrap();
    assert!(tx.commit().unwrap());
    assert_eq!(second.read(), 3);
}

/// A cell held by a transaction or a caller is not pooled
#[test]
fn test_observed_cell_not_recycled() {
    let pool = CellPool::new(4);
    let cell = pool.acquire(1);
    let mut tx = Transaction::begin();
    assert_eq!(cell.read(), 1); // in the read-set now

    let handle = cell.clone();
    assert!(!pool.donate(cell));
    assert!(pool.is_empty());
    assert!(tx.commit().unwrap());
    assert_eq!(handle.read(), 1);
}

/// A disabled pool is a plain allocator
#[test]
fn test_disabled_pool_from_config() {
    let pool = CellPool::from_config(&PoolConfig::disabled());
    for i in 0..10 {
        let cell = pool.acquire(i);
        assert_eq!(cell.read(), i);
        assert!(!pool.donate(cell));
    }
    let stats = pool.stats();
    assert_eq!(stats.allocated, 10);
    assert_eq!(stats.reused, 0);
    assert_eq!(stats.reuse_rate(), 0.0);
}
