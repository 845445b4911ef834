//! # HAILSTORM Core
//!
//! The concurrency kernel that drives the physics stage:
//! - A fixed pool of worker threads with a blocking, chunked `parallel_for`
//! - A spinlock per entity, acquired in ascending index order
//! - Sparse tables whose reset cost follows occupancy, not capacity
//!
//! ## Architecture Rules
//!
//! 1. **Fork-join only** - every parallel call is a full barrier
//! 2. **No globals** - the pool and lock table are owned by the caller
//! 3. **Index-based access** - entities are addressed by slot, never by pointer
//!
//! ## Example
//!
//! ```rust,ignore
//! use hailstorm_core::ThreadPool;
//!
//! let pool = ThreadPool::new(0)?; // hardware threads - 1
//! pool.parallel_for(0, 100_000, 4096, |start, end, _chunk| {
//!     for i in start..end { /* ... */ }
//! });
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod memory;
pub mod sched;
pub mod sync;

pub use memory::SparseTable;
pub use sched::{PoolStats, ThreadPool};
pub use sync::{LockedSlice, PairGuard, SpinLock, SpinTable};
