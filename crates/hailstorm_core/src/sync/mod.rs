//! # Synchronization Primitives for the Narrowphase
//!
//! ## The Problem
//!
//! ```text
//! Chunk 0:  collide(7, 12)      Chunk 1:  collide(12, 40)
//!                     \               /
//!                      entity 12 written by both
//! ```
//!
//! Pair resolution touches two entities at once and the broadphase hands
//! the same entity to several chunks.
//!
//! ## The Solution: Ordered Spinlocks
//!
//! One spinlock per entity. A pair always locks the lower index first and
//! unlocks in reverse, so no two threads can wait on each other in a cycle.
//! Critical sections are a few dozen flops, which is why a spin beats a
//! parking mutex here.

mod spin_table;

pub use spin_table::{LockedSlice, PairGuard, SpinLock, SpinTable};
