//! # HAILSTORM
//!
//! Real-time simulation of tens of thousands of bouncing spheres in a box.
//!
//! ```text
//! Simulation::advance(elapsed)
//!   debt += elapsed
//!   while debt >= dt && substeps < max_substeps:
//!     ├─ gravity          (parallel, disjoint chunks)
//!     ├─ wall collisions  (parallel, disjoint chunks)
//!     ├─ grid rebuild     (serial)
//!     ├─ contacts × N     (parallel, ordered spinlocks)
//!     └─ debt -= dt
//!   debt = min(debt, max_substeps * dt)
//! ```
//!
//! The renderer-facing side ([`culling`], [`instance`]) reads the sphere
//! array between frames and never touches the physics state.
//!
//! ## Example
//!
//! ```rust,ignore
//! use hailstorm::{Simulation, SimulationConfig};
//!
//! let mut sim = Simulation::new(SimulationConfig::default())?;
//! let report = sim.advance(1.0 / 60.0);
//! println!("{} substeps, {} near walls", report.substeps, sim.near_wall().len());
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod config;
pub mod culling;
pub mod error;
pub mod instance;
pub mod simulation;
pub mod spawn;

pub use config::SimulationConfig;
pub use culling::{Frustum, Plane, VisibilityCuller};
pub use error::{ConfigError, Result, SimulationError};
pub use instance::{pack_instances, SphereInstance};
pub use simulation::{FrameReport, Simulation, SimulationStats};

/// Re-exports of the workspace crates.
pub mod prelude {
    pub use hailstorm_core::{SpinTable, ThreadPool};
    pub use hailstorm_physics::{BoundingBox, PairStrategy, Sphere, UniformGrid};
    pub use hailstorm_shared::{Mat4, Vec3};
}
