//! # Sparse Table
//!
//! Dense slot array paired with a list of the slots written since the last
//! reset.

/// A dense array of slots with amortized sparse reset.
///
/// Every slot starts at the `empty` value. Writing a value into an empty
/// slot records the slot in the touched list; [`SparseTable::reset`] walks
/// only that list. A lattice with millions of slots but a few thousand
/// occupied ones therefore resets in time proportional to the occupied
/// count.
///
/// The touched list keeps first-write order, so it doubles as an ordered
/// list of occupied slots.
///
/// # Example
///
/// ```rust,ignore
/// let mut table = SparseTable::new(1_000_000, u32::MAX);
/// table.set(42, 7);
/// assert_eq!(table.touched(), &[42]);
///
/// table.reset(); // O(1) here, not O(1_000_000)
/// assert!(table.is_empty_slot(42));
/// ```
#[derive(Debug, Clone)]
pub struct SparseTable<V: Copy + PartialEq> {
    /// One value per slot.
    slots: Vec<V>,
    /// Slots written since the last reset, in first-write order.
    touched: Vec<usize>,
    /// Sentinel meaning "unoccupied".
    empty: V,
}

impl<V: Copy + PartialEq> SparseTable<V> {
    /// Creates a table with `len` slots, all set to `empty`.
    #[must_use]
    pub fn new(len: usize, empty: V) -> Self {
        Self {
            slots: vec![empty; len],
            touched: Vec::new(),
            empty,
        }
    }

    /// Reallocates to `len` slots and clears everything.
    ///
    /// This is the full-cost path, O(len).
    pub fn resize(&mut self, len: usize) {
        self.slots.clear();
        self.slots.resize(len, self.empty);
        self.touched.clear();
    }

    /// Number of slots.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns true if the table has no slots at all.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Value at `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> V {
        self.slots[index]
    }

    /// Value at `index`, or `None` if the slot is empty or out of range.
    #[inline]
    #[must_use]
    pub fn occupied(&self, index: usize) -> Option<V> {
        self.slots.get(index).copied().filter(|v| *v != self.empty)
    }

    /// Returns true if the slot holds the sentinel.
    #[inline]
    #[must_use]
    pub fn is_empty_slot(&self, index: usize) -> bool {
        self.slots[index] == self.empty
    }

    /// Writes `value` into `index`, recording the slot if it was empty.
    ///
    /// Writing the sentinel itself is not tracked; use [`SparseTable::reset`].
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn set(&mut self, index: usize, value: V) {
        let slot = &mut self.slots[index];
        if *slot == self.empty && value != self.empty {
            self.touched.push(index);
        }
        *slot = value;
    }

    /// Slots written since the last reset, in first-write order.
    #[inline]
    #[must_use]
    pub fn touched(&self) -> &[usize] {
        &self.touched
    }

    /// Restores every touched slot to the sentinel.
    ///
    /// Cost is O(touched). Calling it twice in a row is a no-op the
    /// second time.
    pub fn reset(&mut self) {
        for &index in &self.touched {
            self.slots[index] = self.empty;
        }
        self.touched.clear();
    }

    /// Ensures the touched list can hold `additional` more entries without
    /// reallocating.
    pub fn reserve_touched(&mut self, additional: usize) {
        self.touched.reserve(additional);
    }

    /// Current capacity of the touched list.
    #[inline]
    #[must_use]
    pub fn touched_capacity(&self) -> usize {
        self.touched.capacity()
    }
}
