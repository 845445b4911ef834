//! # Spinlock Table
//!
//! One test-and-set lock per entity and a slice view that only hands out
//! `&mut` access while the matching locks are held.
//!
//! ## Safety Note
//!
//! [`LockedSlice`] turns `&mut [T]` into shared access from many threads.
//! This requires unsafe code; the lock table is the only thing standing
//! between two threads and the same element, so every access path goes
//! through it.

#![allow(unsafe_code)]

use std::cell::UnsafeCell;
use std::hint;
use std::sync::atomic::{AtomicBool, Ordering};

/// A binary test-and-test-and-set spinlock.
///
/// Acquire on lock, release on unlock. Meant for critical sections of a
/// few dozen instructions; anything longer belongs behind a parking mutex.
#[derive(Debug, Default)]
pub struct SpinLock {
    flag: AtomicBool,
}

impl SpinLock {
    /// Creates an unlocked spinlock.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            flag: AtomicBool::new(false),
        }
    }

    /// Spins until the lock is acquired.
    #[inline]
    pub fn lock(&self) {
        while self
            .flag
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            // Read-only spin keeps the cache line shared until it frees up.
            while self.flag.load(Ordering::Relaxed) {
                hint::spin_loop();
            }
        }
    }

    /// Attempts to acquire without spinning.
    #[inline]
    #[must_use]
    pub fn try_lock(&self) -> bool {
        self.flag
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    /// Releases the lock.
    ///
    /// Must only be called by the holder.
    #[inline]
    pub fn unlock(&self) {
        self.flag.store(false, Ordering::Release);
    }

    /// Returns true if some thread currently holds the lock.
    #[inline]
    #[must_use]
    pub fn is_locked(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// One [`SpinLock`] per entity index.
///
/// Sized once for the population and kept for the lifetime of the
/// simulation.
#[derive(Debug)]
pub struct SpinTable {
    locks: Box<[SpinLock]>,
}

impl SpinTable {
    /// Creates a table with `count` unlocked entries.
    #[must_use]
    pub fn new(count: usize) -> Self {
        Self {
            locks: (0..count).map(|_| SpinLock::new()).collect(),
        }
    }

    /// Number of locks.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    /// Returns true if the table holds no locks.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }

    /// Lock for a single index.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    #[must_use]
    pub fn get(&self, index: usize) -> &SpinLock {
        &self.locks[index]
    }

    /// Locks both entries of a pair, lower index first.
    ///
    /// The returned guard unlocks the higher index first, then the lower.
    ///
    /// # Panics
    ///
    /// Panics if `a == b` or either index is out of range.
    #[inline]
    #[must_use = "the pair is unlocked as soon as the guard is dropped"]
    pub fn lock_pair(&self, a: usize, b: usize) -> PairGuard<'_> {
        assert_ne!(a, b, "self-pair {a} cannot be locked twice");
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        let first = &self.locks[lo];
        let second = &self.locks[hi];
        first.lock();
        second.lock();
        PairGuard { first, second }
    }

    /// Returns true if no lock in the table is held.
    #[must_use]
    pub fn all_unlocked(&self) -> bool {
        self.locks.iter().all(|l| !l.is_locked())
    }
}

/// Holds two entity locks; releases them in reverse acquisition order.
#[derive(Debug)]
pub struct PairGuard<'a> {
    first: &'a SpinLock,
    second: &'a SpinLock,
}

impl Drop for PairGuard<'_> {
    fn drop(&mut self) {
        self.second.unlock();
        self.first.unlock();
    }
}

/// A mutable slice shared across threads, guarded element-wise by a
/// [`SpinTable`].
///
/// The view borrows the slice mutably for its whole lifetime, so nothing
/// outside it can observe the elements; inside it, an element is only
/// reachable while its lock is held.
pub struct LockedSlice<'a, T> {
    cells: &'a [UnsafeCell<T>],
    locks: &'a SpinTable,
}

// SAFETY: element access is serialized by the spin table (see `with_pair`
// and `with`), which gives the same guarantee as `Mutex<T>`: shared across
// threads as long as the payload itself may move between threads.
unsafe impl<T: Send> Sync for LockedSlice<'_, T> {}
// SAFETY: as above; the view holds only shared references.
unsafe impl<T: Send> Send for LockedSlice<'_, T> {}

impl<'a, T> LockedSlice<'a, T> {
    /// Wraps `items`, using `locks[i]` to guard `items[i]`.
    ///
    /// # Panics
    ///
    /// Panics if the lock table is smaller than the slice.
    #[must_use]
    pub fn new(items: &'a mut [T], locks: &'a SpinTable) -> Self {
        assert!(
            locks.len() >= items.len(),
            "lock table ({}) smaller than slice ({})",
            locks.len(),
            items.len()
        );
        let ptr = items as *mut [T] as *const [UnsafeCell<T>];
        // SAFETY: `UnsafeCell<T>` is `repr(transparent)` over `T`, and the
        // unique borrow of `items` is held for `'a`, so no other reference
        // to the elements exists while this view is alive.
        let cells = unsafe { &*ptr };
        Self { cells, locks }
    }

    /// Number of elements.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Returns true if the view is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Runs `f` with exclusive access to elements `a` and `b`.
    ///
    /// Locks are taken in ascending index order and released in reverse,
    /// including when `f` panics.
    ///
    /// # Panics
    ///
    /// Panics if `a == b` or either index is out of range.
    #[inline]
    pub fn with_pair<R>(&self, a: usize, b: usize, f: impl FnOnce(&mut T, &mut T) -> R) -> R {
        let (cell_a, cell_b) = (&self.cells[a], &self.cells[b]);
        let _guard = self.locks.lock_pair(a, b);
        // SAFETY: `a != b` (checked by `lock_pair`) so the two references do
        // not alias, and both locks are held until `_guard` drops after `f`.
        let (x, y) = unsafe { (&mut *cell_a.get(), &mut *cell_b.get()) };
        f(x, y)
    }

    /// Runs `f` with exclusive access to element `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index` is out of range.
    #[inline]
    pub fn with<R>(&self, index: usize, f: impl FnOnce(&mut T) -> R) -> R {
        let cell = &self.cells[index];
        let lock = self.locks.get(index);
        lock.lock();
        let _release = Unlock(lock);
        // SAFETY: the element's lock is held until `_release` drops.
        let item = unsafe { &mut *cell.get() };
        f(item)
    }
}

/// Releases a single lock on drop.
struct Unlock<'a>(&'a SpinLock);

impl Drop for Unlock<'_> {
    fn drop(&mut self) {
        self.0.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_spinlock_basic() {
        let lock = SpinLock::new();
        assert!(lock.try_lock());
        assert!(!lock.try_lock());
        lock.unlock();
        assert!(!lock.is_locked());
    }

    #[test]
    fn test_pair_guard_releases_both() {
        let table = SpinTable::new(8);
        {
            let _g = table.lock_pair(5, 2);
            assert!(table.get(2).is_locked());
            assert!(table.get(5).is_locked());
        }
        assert!(table.all_unlocked());
    }

    #[test]
    #[should_panic(expected = "self-pair")]
    fn test_self_pair_rejected() {
        let table = SpinTable::new(4);
        let _g = table.lock_pair(1, 1);
    }

    #[test]
    fn test_opposite_order_pairs_do_not_deadlock() {
        let table = Arc::new(SpinTable::new(2));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let table = Arc::clone(&table);
                thread::spawn(move || {
                    for _ in 0..20_000 {
                        let _g = if t % 2 == 0 {
                            table.lock_pair(0, 1)
                        } else {
                            table.lock_pair(1, 0)
                        };
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert!(table.all_unlocked());
    }

    #[test]
    fn test_locked_slice_counts_are_exact() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 5_000;

        let mut counters = vec![0u64; 4];
        let locks = SpinTable::new(counters.len());
        {
            let view = LockedSlice::new(&mut counters, &locks);
            thread::scope(|s| {
                for t in 0..THREADS {
                    let view = &view;
                    s.spawn(move || {
                        for r in 0..ROUNDS {
                            let a = (t + r) % 4;
                            let b = (t + r + 1 + r % 3) % 4;
                            if a == b {
                                view.with(a, |x| *x += 2);
                            } else {
                                view.with_pair(a, b, |x, y| {
                                    *x += 1;
                                    *y += 1;
                                });
                            }
                        }
                    });
                }
            });
        }

        assert_eq!(counters.iter().sum::<u64>(), (THREADS * ROUNDS * 2) as u64);
        assert!(locks.all_unlocked());
    }

    #[test]
    fn test_with_pair_unlocks_on_panic() {
        let mut items = vec![1, 2, 3];
        let locks = SpinTable::new(3);
        let view = LockedSlice::new(&mut items, &locks);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            view.with_pair(0, 2, |_, _| panic!("boom"));
        }));
        assert!(result.is_err());
        assert!(locks.all_unlocked());
    }
}
