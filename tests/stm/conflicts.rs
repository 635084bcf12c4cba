//! Conflict Detection Tests
//!
//! Overlapping transactions built on the same stale version:
//! - At most one commits
//! - The winner's write is what remains
//! - Retry helpers converge under contention

use crate::*;

/// Two transactions read and write the same cell; only one commits
#[test]
fn test_overlapping_commits_at_most_one_wins() {
    init_tracing();
    let cell = TxCell::new(0);
    let barrier = Arc::new(Barrier::new(2));

    let outcomes: Vec<(i32, bool)> = thread::scope(|s| {
        let handles: Vec<_> = [1, 2]
            .into_iter()
            .map(|mine| {
                let cell = &cell;
                let barrier = Arc::clone(&barrier);
                s.spawn(move || {
                    let mut tx = Transaction::begin();
                    let seen = cell.read();
                    barrier.wait(); // both have read the same version
                    cell.write(seen + mine).unwrap();
                    barrier.wait(); // both have buffered their write
                    (mine, tx.commit().unwrap())
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners: Vec<i32> = outcomes
        .iter()
        .filter(|(_, committed)| *committed)
        .map(|(mine, _)| *mine)
        .collect();
    assert!(winners.len() <= 1, "both overlapping commits succeeded");
    match winners.first() {
        Some(mine) => assert_eq!(cell.read(), *mine),
        None => assert_eq!(cell.read(), 0),
    }
}

/// Retrying increments never lose an update
#[test]
fn test_contended_counter_is_exact() {
    init_tracing();
    const THREADS: usize = 8;
    const INCREMENTS: usize = 250;

    let counter = Arc::new(TxCell::new(0usize));
    let barrier = Arc::new(Barrier::new(THREADS));
    let before = strand::metrics();

    let handles: Vec<_> = (0..THREADS)
        .map(|_| {
            let counter = Arc::clone(&counter);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                for _ in 0..INCREMENTS {
                    atomically(|| counter.modify(|n| n + 1)).unwrap();
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(counter.read(), THREADS * INCREMENTS);
    assert_eq!(counter.version(), (THREADS * INCREMENTS) as u64);

    let after = strand::metrics();
    assert!(after.committed - before.committed >= (THREADS * INCREMENTS) as u64);
}

/// A bounded retry budget surfaces a conflict error
#[test]
fn test_retry_budget_exhaustion() {
    let cell = TxCell::new(0);
    let mut attempts = 0;
    let result = atomically_with(&RetryPolicy::limited(3), || {
        attempts += 1;
        let n = cell.read();
        commit_on_other_thread(&cell, n + 1);
        cell.write(n - 1)
    });

    let err = result.unwrap_err();
    assert_eq!(err, StmError::CommitConflict { attempts: 3 });
    assert!(err.is_retryable());
    assert_eq!(attempts, 3);
    assert_eq!(cell.read(), 3);
}

/// Read-only transactions also validate
#[test]
fn test_read_only_commit_detects_change() {
    let cell = TxCell::new(1);
    let mut tx = Transaction::begin();
    assert_eq!(cell.read(), 1);
    commit_on_other_thread(&cell, 2);
    assert!(!tx.commit().unwrap());
    assert_eq!(tx.status(), TxStatus::RolledBack);
}

/// Conflicts are counted
#[test]
fn test_conflict_metrics() {
    let before = strand::metrics();
    let cell = TxCell::new(0);
    let mut tx = Transaction::begin();
    cell.write(cell.read() + 1).unwrap();
    commit_on_other_thread(&cell, 5);
    assert!(!tx.commit().unwrap());

    let after = strand::metrics();
    assert!(after.conflicts > before.conflicts);
    assert!(after.rolled_back > before.rolled_back);
}
