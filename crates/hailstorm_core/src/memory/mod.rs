//! # Memory Management
//!
//! Storage that is grown once and reused across frames.
//!
//! ## Design Philosophy
//!
//! Capacity is only ever added, never released, so after warm-up a frame
//! performs no heap allocation. Resets touch only what the previous frame
//! wrote.

mod sparse_table;

pub use sparse_table::SparseTable;
