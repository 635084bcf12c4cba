//! Fixed-capacity lock-free slot array
//!
//! Every slot is an independent atomic pointer (`ArcSwapOption`). A slot is
//! either empty (`None`) or holds an `Arc<T>`. Because "empty" lives at the
//! slot level, a stored `T` may itself be `Option<_>`: a slot holding
//! `Some(Arc::new(None))` logically holds null and is still occupied.
//!
//! # Design
//!
//! - One compare-and-swap per attempt on every mutation path
//! - `insert` / `exchange` / `get` never retry
//! - `take` / `update` retry only when another thread changed the slot
//!   between load and CAS
//! - Callers compare against an `Arc` they hold, which keeps the observed
//!   allocation alive, so a pointer-equality CAS cannot suffer ABA
//!
//! # Count
//!
//! `count` is adjusted right after each occupancy-changing CAS. Under heavy
//! churn a reader may observe it lagging by the number of in-flight
//! operations; it is exact once operations quiesce.

use arc_swap::{ArcSwapOption, Guard};
use std::ptr;
use std::sync::atomic::{AtomicIsize, Ordering};
use std::sync::Arc;
use strand_core::error::{Result, StmError};

/// Fixed-capacity array of independently lock-free slots
///
/// # Thread Safety
///
/// All operations take `&self` and are safe to call from any number of
/// threads. There is no cross-slot atomicity.
///
/// # Example
///
/// ```
/// use strand_storage::SlotArray;
///
/// let slots: SlotArray<&str> = SlotArray::new(4);
/// assert!(slots.insert(1, "a").unwrap());
/// assert!(!slots.insert(1, "b").unwrap());
/// assert_eq!(slots.get(1).unwrap().as_deref(), Some(&"a"));
/// assert_eq!(slots.count(), 1);
/// ```
pub struct SlotArray<T> {
    slots: Box<[ArcSwapOption<T>]>,
    count: AtomicIsize,
}

impl<T> SlotArray<T> {
    /// Create an array of `capacity` empty slots
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: (0..capacity).map(|_| ArcSwapOption::empty()).collect(),
            count: AtomicIsize::new(0),
        }
    }

    /// Number of slots
    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots
    ///
    /// May lag behind in-flight operations; see the module docs.
    #[inline]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::Acquire).max(0) as usize
    }

    /// Check if no slot is occupied
    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    #[inline]
    fn slot(&self, index: usize) -> Result<&ArcSwapOption<T>> {
        StmError::check_index(index, self.slots.len())?;
        Ok(&self.slots[index])
    }

    #[inline]
    fn occupied(&self) {
        self.count.fetch_add(1, Ordering::AcqRel);
    }

    #[inline]
    fn vacated(&self) {
        self.count.fetch_sub(1, Ordering::AcqRel);
    }

    // ========================================================================
    // Single-slot operations
    // ========================================================================

    /// Store `value` only if the slot is empty
    ///
    /// Returns `Ok(true)` if the slot transitioned empty → occupied, `Ok(false)`
    /// if it was already occupied (the value is dropped).
    ///
    /// # Errors
    /// [`StmError::IndexOutOfRange`] if `index >= capacity`.
    pub fn insert(&self, index: usize, value: impl Into<Arc<T>>) -> Result<bool> {
        let slot = self.slot(index)?;
        let prev = Guard::into_inner(slot.compare_and_swap(ptr::null::<T>(), Some(value.into())));
        if prev.is_none() {
            self.occupied();
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// Store `value` unconditionally, returning what was there before
    ///
    /// # Errors
    /// [`StmError::IndexOutOfRange`] if `index >= capacity`.
    pub fn exchange(&self, index: usize, value: impl Into<Arc<T>>) -> Result<Option<Arc<T>>> {
        let slot = self.slot(index)?;
        let prev = slot.swap(Some(value.into()));
        if prev.is_none() {
            self.occupied();
        }
        Ok(prev)
    }

    /// Clear the slot if occupied, returning the removed value
    ///
    /// # Errors
    /// [`StmError::IndexOutOfRange`] if `index >= capacity`.
    pub fn take(&self, index: usize) -> Result<Option<Arc<T>>> {
        let slot = self.slot(index)?;
        loop {
            let Some(current) = slot.load_full() else {
                return Ok(None);
            };
            let prev = Guard::into_inner(slot.compare_and_swap(&current, None::<Arc<T>>));
            if same(prev.as_ref(), Some(&current)) {
                self.vacated();
                return Ok(Some(current));
            }
        }
    }

    /// Clear the slot if occupied
    ///
    /// # Errors
    /// [`StmError::IndexOutOfRange`] if `index >= capacity`.
    pub fn remove(&self, index: usize) -> Result<bool> {
        Ok(self.take(index)?.is_some())
    }

    /// Replace the value with `updater(current)` while `predicate(current)` holds
    ///
    /// The predicate is evaluated against the value the CAS will compare
    /// against. If another thread changes the slot in between, the attempt is
    /// repeated with the new value. Both closures may run several times and
    /// must be pure.
    ///
    /// Returns `Ok(false)` if the slot is empty or the predicate rejects the
    /// current value.
    ///
    /// # Errors
    /// [`StmError::IndexOutOfRange`] if `index >= capacity`.
    pub fn update<U, P>(&self, index: usize, updater: U, predicate: P) -> Result<bool>
    where
        U: Fn(&T) -> T,
        P: Fn(&T) -> bool,
    {
        let slot = self.slot(index)?;
        loop {
            let Some(current) = slot.load_full() else {
                return Ok(false);
            };
            if !predicate(&current) {
                return Ok(false);
            }
            let next = Arc::new(updater(&current));
            let prev = Guard::into_inner(slot.compare_and_swap(&current, Some(next)));
            if same(prev.as_ref(), Some(&current)) {
                return Ok(true);
            }
            tracing::trace!(index, "slot update lost a race, retrying");
        }
    }

    /// Single compare-and-swap on one slot
    ///
    /// Succeeds only if the slot currently holds exactly `current` (pointer
    /// identity, `None` meaning empty). Occupancy changes are reflected in
    /// [`count`](Self::count).
    ///
    /// # Errors
    /// [`StmError::IndexOutOfRange`] if `index >= capacity`.
    pub fn compare_exchange(
        &self,
        index: usize,
        current: Option<&Arc<T>>,
        new: Option<Arc<T>>,
    ) -> Result<bool> {
        let slot = self.slot(index)?;
        let expected: *const T = current.map_or(ptr::null(), Arc::as_ptr);
        let fills = new.is_some();
        let prev = Guard::into_inner(slot.compare_and_swap(expected, new));
        if !same(prev.as_ref(), current) {
            return Ok(false);
        }
        match (current.is_some(), fills) {
            (false, true) => self.occupied(),
            (true, false) => self.vacated(),
            _ => {}
        }
        Ok(true)
    }

    /// Read the slot
    ///
    /// # Errors
    /// [`StmError::IndexOutOfRange`] if `index >= capacity`.
    #[inline]
    pub fn get(&self, index: usize) -> Result<Option<Arc<T>>> {
        Ok(self.slot(index)?.load_full())
    }

    /// Return the current value, or install `make()` if the slot is empty
    ///
    /// The boolean is `true` when this call installed the value. `make` runs
    /// at most once and only when the slot looked empty.
    ///
    /// # Errors
    /// [`StmError::IndexOutOfRange`] if `index >= capacity`.
    pub fn get_or_insert_with<F>(&self, index: usize, make: F) -> Result<(Arc<T>, bool)>
    where
        F: FnOnce() -> T,
    {
        let slot = self.slot(index)?;
        if let Some(existing) = slot.load_full() {
            return Ok((existing, false));
        }
        let candidate = Arc::new(make());
        let prev = Guard::into_inner(
            slot.compare_and_swap(ptr::null::<T>(), Some(Arc::clone(&candidate))),
        );
        match prev {
            None => {
                self.occupied();
                Ok((candidate, true))
            }
            Some(existing) => Ok((existing, false)),
        }
    }

    // ========================================================================
    // Iteration
    // ========================================================================

    /// Iterate over occupied slots as `(index, value)`
    ///
    /// Each slot is read once, in index order; concurrent mutations may or
    /// may not be reflected.
    pub fn iter(&self) -> impl Iterator<Item = (usize, Arc<T>)> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.load_full().map(|value| (index, value)))
    }

    /// Iterate over occupied indices
    pub fn indices(&self) -> impl Iterator<Item = usize> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.load().is_some())
            .map(|(index, _)| index)
    }
}

impl<T> std::fmt::Debug for SlotArray<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SlotArray")
            .field("capacity", &self.capacity())
            .field("count", &self.count())
            .finish()
    }
}

#[inline]
fn same<T>(a: Option<&Arc<T>>, b: Option<&Arc<T>>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => Arc::ptr_eq(a, b),
        _ => false,
    }
}
