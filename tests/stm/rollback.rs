//! Rollback Tests
//!
//! - Dropping a guard without commit discards its writes
//! - Panics unwind through the guard and roll back
//! - Finished transactions ignore further commit/rollback calls

use crate::*;
use std::panic::{self, AssertUnwindSafe};

/// write a=7, drop scope without commit: a stays 5
#[test]
fn test_scope_exit_without_commit() {
    let a = TxCell::new(5);
    {
        let _tx = Transaction::begin();
        a.write(7).unwrap();
        assert_eq!(a.read(), 7);
    }
    assert_eq!(a.read(), 5);
    assert_eq!(a.version(), 0);
}

/// A panicking body leaves the committed state and the context clean
#[test]
fn test_panic_rolls_back() {
    let a = TxCell::new(1);
    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        let _ = atomically(|| {
            a.write(2)?;
            if a.read() == 2 {
                panic!("body failed");
            }
            Ok(())
        });
    }));
    assert!(result.is_err());
    assert_eq!(a.read(), 1);
    assert_no_ambient_transaction();
}

/// Commit after commit is inert
#[test]
fn test_recommit_is_inert() {
    let a = TxCell::new(0);
    let mut tx = Transaction::begin();
    a.write(1).unwrap();
    assert!(tx.commit().unwrap());
    assert_eq!(tx.status(), TxStatus::Committed);

    assert!(!tx.commit().unwrap());
    tx.rollback().unwrap();
    assert_eq!(tx.status(), TxStatus::Committed);
    assert_eq!(a.read(), 1);
    assert_eq!(a.version(), 1);
}

/// Commit after rollback does not resurrect writes
#[test]
fn test_commit_after_rollback_is_inert() {
    let a = TxCell::new(0);
    let mut tx = Transaction::begin();
    a.write(1).unwrap();
    tx.rollback().unwrap();
    tx.rollback().unwrap();
    assert!(!tx.commit().unwrap());
    assert_eq!(a.read(), 0);
}

/// Leaked inner guards are discarded with their ancestor
#[test]
fn test_drop_with_leaked_descendant() {
    init_tracing();
    let a = TxCell::new(0);
    {
        let _outer = Transaction::begin();
        let inner = Transaction::begin();
        a.write(1).unwrap();
        std::mem::forget(inner);
    }
    assert_no_ambient_transaction();
    assert_eq!(a.read(), 0);
}
