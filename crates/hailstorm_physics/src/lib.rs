//! # HAILSTORM Physics
//!
//! Everything that happens to a sphere inside one physics substep:
//!
//! ```text
//! Sphere::apply_gravity ──► BoundingBox::resolve_collision
//!          │
//!          ▼
//! UniformGrid::clear + insert (serial)
//!          │
//!          ▼
//! UniformGrid::for_each_potential_pair_pruned (parallel)
//!          │
//!          ▼
//! narrowphase: lock(min) → lock(max) → Sphere::collide → unlock
//! ```
//!
//! Entities are addressed by [`EntityIndex`] everywhere, which keeps the
//! grid and the scheduler independent of where the spheres live.

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod bounds;
pub mod grid;
pub mod narrowphase;
pub mod sphere;

pub use bounds::BoundingBox;
pub use grid::{BucketEntry, UniformGrid};
pub use narrowphase::{resolve_contacts, solve_contacts, PairStrategy};
pub use sphere::Sphere;

/// Index of an entity in the simulation's sphere array.
pub type EntityIndex = u32;
