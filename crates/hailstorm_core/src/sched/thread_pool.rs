//! # Fork-Join Thread Pool
//!
//! Fixed set of workers pulling boxed jobs from one FIFO queue guarded by a
//! single mutex/condvar pair.
//!
//! ## Safety Note
//!
//! `parallel_for` lends the caller's closure (and `parallel_for_mut` the
//! caller's slice) to the workers without `'static` bounds. That requires
//! unsafe lifetime erasure. It is sound because the caller does not return
//! until every chunk has counted down, and a chunk never touches the
//! borrowed data after counting down.
//!
//! ## Lifecycle
//!
//! ```text
//!   new()                parallel_for()                     drop()
//!     │                       │                                │
//!     ├─ spawn N workers      ├─ split range into chunks       ├─ stop = true
//!     │                       ├─ enqueue one job per chunk     ├─ wake all
//!     │                       └─ block on latch ◄── last chunk └─ join all
//! ```

#![allow(unsafe_code)]

use std::any::Any;
use std::collections::VecDeque;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use parking_lot::{Condvar, Mutex};

type Job = Box<dyn FnOnce() + Send + 'static>;
type PanicPayload = Box<dyn Any + Send + 'static>;
type ChunkFn<'a> = dyn Fn(usize, usize, usize) + Sync + 'a;

/// Queue state protected by the pool mutex.
struct QueueState {
    jobs: VecDeque<Job>,
    stop: bool,
}

/// State shared between the pool handle and its workers.
struct Shared {
    state: Mutex<QueueState>,
    available: Condvar,
    jobs_executed: AtomicU64,
}

/// Snapshot of pool counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Number of worker threads.
    pub threads: usize,
    /// `parallel_for` calls that dispatched at least one chunk.
    pub parallel_calls: u64,
    /// Jobs run to completion by workers.
    pub jobs_executed: u64,
}

/// Fixed-size worker pool with a blocking `parallel_for`.
///
/// # Thread Safety
///
/// `parallel_for` may be called from any thread that is not itself one of
/// this pool's workers. Calling it from inside a chunk can deadlock once
/// every worker is blocked waiting on nested chunks.
///
/// # Example
///
/// ```rust,ignore
/// let pool = ThreadPool::new(4)?;
/// let hits = AtomicUsize::new(0);
/// pool.parallel_for(0, 100_000, 4096, |start, end, _chunk| {
///     hits.fetch_add(end - start, Ordering::Relaxed);
/// });
/// assert_eq!(hits.into_inner(), 100_000);
/// ```
pub struct ThreadPool {
    shared: Arc<Shared>,
    workers: Vec<JoinHandle<()>>,
    size: usize,
    parallel_calls: AtomicU64,
}

impl ThreadPool {
    /// Spawns the worker threads.
    ///
    /// `threads == 0` selects `max(1, hardware_threads - 1)`, leaving one
    /// core for the calling thread.
    ///
    /// # Errors
    ///
    /// Returns the OS error if a worker thread cannot be spawned. Workers
    /// that did start are stopped and joined before returning.
    pub fn new(threads: usize) -> io::Result<Self> {
        let size = if threads > 0 {
            threads
        } else {
            Self::default_thread_count()
        };

        let shared = Arc::new(Shared {
            state: Mutex::new(QueueState {
                jobs: VecDeque::new(),
                stop: false,
            }),
            available: Condvar::new(),
            jobs_executed: AtomicU64::new(0),
        });

        let mut pool = Self {
            shared,
            workers: Vec::with_capacity(size),
            size,
            parallel_calls: AtomicU64::new(0),
        };

        for index in 0..size {
            let shared = Arc::clone(&pool.shared);
            let handle = thread::Builder::new()
                .name(format!("hailstorm-worker-{index}"))
                .spawn(move || worker_loop(&shared))?;
            pool.workers.push(handle);
        }

        tracing::debug!("thread pool started with {} workers", size);
        Ok(pool)
    }

    /// `max(1, hardware_threads - 1)`.
    #[must_use]
    pub fn default_thread_count() -> usize {
        thread::available_parallelism()
            .map_or(1, std::num::NonZeroUsize::get)
            .saturating_sub(1)
            .max(1)
    }

    /// Number of worker threads.
    #[inline]
    #[must_use]
    pub fn thread_count(&self) -> usize {
        self.size
    }

    /// Number of chunks `parallel_for` uses for a range of `total` items.
    ///
    /// `max(1, min(threads, total / min_grain))`.
    #[inline]
    #[must_use]
    pub fn chunk_count(&self, total: usize, min_grain: usize) -> usize {
        (total / min_grain.max(1)).min(self.size).max(1)
    }

    /// Runs `f(chunk_start, chunk_end, chunk_index)` over `[begin, end)`
    /// split into contiguous, near-equal chunks, and blocks until all of
    /// them have finished.
    ///
    /// Chunk `k` of `n` covers
    /// `[begin + total*k/n, begin + total*(k+1)/n)`. Chunk order among
    /// workers is unspecified; the return is a full barrier. An empty range
    /// returns immediately.
    ///
    /// # Panics
    ///
    /// If any chunk panics, the remaining chunks still run and the first
    /// panic is resumed on the calling thread after the barrier.
    pub fn parallel_for<F>(&self, begin: usize, end: usize, min_grain: usize, f: F)
    where
        F: Fn(usize, usize, usize) + Sync,
    {
        let total = end.saturating_sub(begin);
        if total == 0 {
            return;
        }

        let chunks = self.chunk_count(total, min_grain);
        let latch = Arc::new(Latch::new(chunks));

        let borrowed: &ChunkFn<'_> = &f;
        // SAFETY: the erased reference is only used by jobs of this call.
        // `latch.wait()` below does not return until every job has counted
        // down, and jobs count down only after their last use of `f`, so
        // `f` outlives every use. Panics inside `f` are caught, so the
        // count-down always happens.
        let erased: &'static ChunkFn<'static> =
            unsafe { std::mem::transmute::<&ChunkFn<'_>, &'static ChunkFn<'static>>(borrowed) };

        {
            let mut state = self.shared.state.lock();
            for k in 0..chunks {
                let (start, stop) = chunk_bounds(begin, total, chunks, k);
                let latch = Arc::clone(&latch);
                state.jobs.push_back(Box::new(move || {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| erased(start, stop, k)));
                    latch.count_down(outcome.err());
                }));
            }
        }
        self.shared.available.notify_all();
        self.parallel_calls.fetch_add(1, Ordering::Relaxed);

        latch.wait();

        if let Some(payload) = latch.take_panic() {
            panic::resume_unwind(payload);
        }
    }

    /// Runs `f(offset, chunk, chunk_index)` over disjoint mutable chunks of
    /// `items`, blocking until all have finished.
    ///
    /// `offset` is the index of `chunk[0]` within `items`. Chunking follows
    /// [`ThreadPool::parallel_for`].
    ///
    /// # Panics
    ///
    /// Resumes the first chunk panic on the calling thread.
    pub fn parallel_for_mut<T, F>(&self, items: &mut [T], min_grain: usize, f: F)
    where
        T: Send,
        F: Fn(usize, &mut [T], usize) + Sync,
    {
        let base = SlicePtr(items.as_mut_ptr());
        let len = items.len();
        self.parallel_for(0, len, min_grain, |start, end, chunk| {
            let base = &base;
            // SAFETY: chunk ranges of one `parallel_for` call partition
            // `[0, len)`, so the sub-slices are disjoint, and `items` stays
            // mutably borrowed until `parallel_for` returns.
            let part = unsafe { std::slice::from_raw_parts_mut(base.0.add(start), end - start) };
            f(start, part, chunk);
        });
    }

    /// Snapshot of the pool counters.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            threads: self.size,
            parallel_calls: self.parallel_calls.load(Ordering::Relaxed),
            jobs_executed: self.shared.jobs_executed.load(Ordering::Relaxed),
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        self.shared.state.lock().stop = true;
        self.shared.available.notify_all();

        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::warn!("thread pool worker exited by panic");
            }
        }
        tracing::debug!("thread pool stopped");
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("size", &self.size)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn worker_loop(shared: &Shared) {
    loop {
        let job = {
            let mut state = shared.state.lock();
            loop {
                if let Some(job) = state.jobs.pop_front() {
                    break job;
                }
                if state.stop {
                    return;
                }
                shared.available.wait(&mut state);
            }
        };
        job();
        shared.jobs_executed.fetch_add(1, Ordering::Relaxed);
    }
}

/// `[start, end)` of chunk `k` out of `chunks` over `total` items.
#[inline]
fn chunk_bounds(begin: usize, total: usize, chunks: usize, k: usize) -> (usize, usize) {
    let total = total as u128;
    let chunks = chunks as u128;
    let k = k as u128;
    let start = begin + (total * k / chunks) as usize;
    let end = begin + (total * (k + 1) / chunks) as usize;
    (start, end)
}

/// Countdown with a blocking wait, released by the final chunk.
struct Latch {
    remaining: AtomicUsize,
    lock: Mutex<()>,
    done: Condvar,
    panic: Mutex<Option<PanicPayload>>,
}

impl Latch {
    fn new(count: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
            lock: Mutex::new(()),
            done: Condvar::new(),
            panic: Mutex::new(None),
        }
    }

    fn count_down(&self, panic: Option<PanicPayload>) {
        if let Some(payload) = panic {
            let mut slot = self.panic.lock();
            if slot.is_none() {
                *slot = Some(payload);
            }
        }
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            let _guard = self.lock.lock();
            self.done.notify_one();
        }
    }

    fn wait(&self) {
        let mut guard = self.lock.lock();
        while self.remaining.load(Ordering::Acquire) != 0 {
            self.done.wait(&mut guard);
        }
    }

    fn take_panic(&self) -> Option<PanicPayload> {
        self.panic.lock().take()
    }
}

/// Base pointer of a slice being split across chunks.
struct SlicePtr<T>(*mut T);

// SAFETY: only used inside `parallel_for_mut`, where each chunk derives a
// disjoint sub-slice from the pointer.
unsafe impl<T: Send> Sync for SlicePtr<T> {}
