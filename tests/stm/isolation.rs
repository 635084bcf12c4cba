//! Isolation Tests
//!
//! - Pending writes are private to their transaction chain
//! - Disjoint transactions commit concurrently
//! - Ambient transactions never cross threads

use crate::*;

/// Uncommitted writes are invisible to other threads
#[test]
fn test_pending_write_invisible_elsewhere() {
    let cell = TxCell::new(1);
    let _tx = Transaction::begin();
    cell.write(2).unwrap();

    let seen_elsewhere = thread::scope(|s| s.spawn(|| cell.read()).join().unwrap());
    assert_eq!(seen_elsewhere, 1);
    assert_eq!(cell.read(), 2);
}

/// Transactions touching disjoint cells both commit
#[test]
fn test_disjoint_transactions_both_commit() {
    init_tracing();
    let left = TxCell::new(0);
    let right = TxCell::new(0);
    let barrier = Barrier::new(2);

    let results: Vec<bool> = thread::scope(|s| {
        let handles = [&left, &right].map(|cell| {
            let barrier = &barrier;
            s.spawn(move || {
                let mut tx = Transaction::begin();
                cell.write(cell.read() + 1).unwrap();
                barrier.wait();
                tx.commit().unwrap()
            })
        });
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results, vec![true, true]);
    assert_eq!(left.read(), 1);
    assert_eq!(right.read(), 1);
}

/// A transaction begun on one thread is not ambient on another
#[test]
fn test_ambient_transaction_is_thread_local() {
    let cell = TxCell::new(0);
    let _tx = Transaction::begin();

    thread::scope(|s| {
        s.spawn(|| {
            assert!(!TxContext::with(|ctx| ctx.is_active()));
            assert_eq!(cell.write(1), Err(StmError::NoAmbientTransaction));
        });
    });
    assert!(TxContext::with(|ctx| ctx.is_active()));
}

/// Writes outside any transaction are rejected
#[test]
fn test_write_requires_transaction() {
    let cell = TxCell::new(0);
    let err = cell.write(1).unwrap_err();
    assert_eq!(err, StmError::NoAmbientTransaction);
    assert!(err.is_misuse());
    assert_eq!(cell.read(), 0);
}
