//! Nested Transaction Tests
//!
//! - Inner commits merge into the parent, not the committed state
//! - Outer rollback discards merged inner work
//! - Misuse of the nesting order is reported

use crate::*;

/// a=5; outer writes 9; inner writes 13 and commits; outer rolls back
#[test]
fn test_outer_rollback_discards_inner_commit() {
    let a = TxCell::new(5);
    {
        let mut outer = Transaction::begin();
        a.write(9).unwrap();
        {
            let mut inner = Transaction::begin();
            a.write(13).unwrap();
            assert!(inner.commit().unwrap());
        }
        assert_eq!(a.read(), 13);
        outer.rollback().unwrap();
    }
    assert_eq!(a.read(), 5);
    assert_no_ambient_transaction();
}

/// Inner commit becomes global only when the root commits
#[test]
fn test_inner_commit_published_by_root() {
    let a = TxCell::new(0);
    let b = TxCell::new(0);

    let mut outer = Transaction::begin();
    a.write(1).unwrap();
    {
        let mut inner = Transaction::begin();
        assert_eq!(a.read(), 1, "inner sees the parent's pending write");
        b.write(2).unwrap();
        assert!(inner.commit().unwrap());
    }
    assert_eq!(outer.pending_writes(), 2);
    assert_eq!(b.load_committed(), 0);

    assert!(outer.commit().unwrap());
    assert_eq!(a.read(), 1);
    assert_eq!(b.read(), 2);
}

/// Inner rollback keeps the parent's writes
#[test]
fn test_inner_rollback_preserves_parent() {
    let a = TxCell::new(0);
    let mut outer = Transaction::begin();
    a.write(1).unwrap();
    {
        let _inner = Transaction::begin();
        a.write(2).unwrap();
    }
    assert_eq!(a.read(), 1);
    assert!(outer.commit().unwrap());
    assert_eq!(a.read(), 1);
}

/// Inner read of a cell that changed underneath fails at inner commit
#[test]
fn test_inner_validation_failure() {
    let a = TxCell::new(0);
    let mut outer = Transaction::begin();
    {
        let mut inner = Transaction::begin();
        let seen = a.read();
        commit_on_other_thread(&a, 10);
        a.write(seen + 1).unwrap();
        assert!(!inner.commit().unwrap());
    }
    assert_eq!(outer.pending_writes(), 0);
    assert!(outer.commit().unwrap());
    assert_eq!(a.read(), 10);
}

/// Merged inner reads are validated again by the root
#[test]
fn test_root_validates_inner_reads() {
    let a = TxCell::new(0);
    let b = TxCell::new(0);
    let mut outer = Transaction::begin();
    {
        let mut inner = Transaction::begin();
        let seen = a.read();
        b.write(seen + 1).unwrap();
        assert!(inner.commit().unwrap());
    }
    commit_on_other_thread(&a, 7);
    assert!(!outer.commit().unwrap());
    assert_eq!(b.read(), 0);
}

/// Committing an outer transaction while an inner one is open is misuse
#[test]
fn test_commit_out_of_order() {
    let mut outer = Transaction::begin();
    let mut inner = Transaction::begin();
    assert_eq!(outer.depth(), 1);
    assert_eq!(inner.depth(), 2);

    let err = outer.commit().unwrap_err();
    assert!(matches!(err, StmError::InvalidNesting(_)));
    assert!(err.is_misuse());

    assert!(inner.commit().unwrap());
    assert!(outer.commit().unwrap());
}

/// Nested `atomically` composes with an enclosing transaction
#[test]
fn test_nested_atomically() {
    let a = TxCell::new(1);
    let total = atomically(|| {
        let doubled = atomically(|| {
            let v = a.read() * 2;
            a.write(v)?;
            Ok(v)
        })?;
        assert_eq!(a.load_committed(), 1);
        Ok(doubled + 1)
    })
    .unwrap();
    assert_eq!(total, 3);
    assert_eq!(a.read(), 2);
}
