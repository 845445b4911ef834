//! # Task Scheduling
//!
//! A small fixed pool of long-lived workers and a synchronous fork-join
//! `parallel_for` on top of it. The caller blocks until every chunk has run,
//! so borrowed data can be handed to the workers safely.

mod thread_pool;

pub use thread_pool::{PoolStats, ThreadPool};
