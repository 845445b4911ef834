//! # Simulation Tuning Constants
//!
//! Defaults for the simulation and the fixed parameters of the solver.
//! Everything tunable per run lives in the configuration file; the values
//! here are the fallbacks used when a field is omitted.

use crate::math::Vec3;

// =============================================================================
// POPULATION & DOMAIN
// =============================================================================

/// Default number of spheres.
pub const DEFAULT_SPHERE_COUNT: usize = 23_000;

/// Default sphere radius.
pub const DEFAULT_SPHERE_RADIUS: f32 = 0.25;

/// Default cage minimum corner.
pub const DEFAULT_BOX_MIN: Vec3 = Vec3::new(-40.0, -20.0, -45.0);

/// Default cage maximum corner.
pub const DEFAULT_BOX_MAX: Vec3 = Vec3::new(40.0, 20.0, 45.0);

// =============================================================================
// STEPPING
// =============================================================================

/// Fixed physics substep (240 Hz).
pub const DEFAULT_FIXED_DT: f32 = 1.0 / 240.0;

/// Maximum substeps consumed per frame before the debt is clamped.
pub const DEFAULT_MAX_SUBSTEPS: u32 = 8;

/// Collision passes per substep.
pub const DEFAULT_SOLVER_ITERATIONS: u32 = 2;

/// Default gravity (m/s²).
pub const DEFAULT_GRAVITY: Vec3 = Vec3::new(0.0, -9.81, 0.0);

/// Default sphere-sphere restitution.
pub const DEFAULT_SPHERE_RESTITUTION: f32 = 0.9;

/// Default sphere-wall restitution.
pub const DEFAULT_WALL_RESTITUTION: f32 = 0.8;

/// Default spawn seed.
pub const DEFAULT_SEED: u64 = 0xC001_CAFE;

// =============================================================================
// SOLVER
// =============================================================================

/// Fraction of the penetration corrected per contact.
pub const CORRECTION_PERCENT: f32 = 0.8;

/// Penetration below this depth is left alone.
pub const CORRECTION_SLOP: f32 = 0.001;

/// Floor applied to squared distance before taking the square root. At or
/// below it the contact normal falls back to +X.
pub const MIN_DISTANCE_SQUARED: f32 = 1e-8;

/// Tangential friction coefficient.
pub const FRICTION_COEFFICIENT: f32 = 0.02;

/// Tangential speed² below which friction is skipped.
pub const MIN_TANGENT_SPEED_SQUARED: f32 = 1e-8;

// =============================================================================
// SCHEDULING GRAINS
// =============================================================================

/// Minimum entities per chunk for per-entity phases.
pub const ENTITY_GRAIN: usize = 2048;

/// Minimum active cells per chunk for parallel pair enumeration.
pub const PAIR_GRAIN: usize = 64;

/// Minimum active cells per chunk for pruned pair enumeration.
pub const PRUNED_PAIR_GRAIN: usize = 16;

/// Buckets above this occupancy are sorted before sweeping.
pub const SWEEP_THRESHOLD: usize = 64;

/// Minimum entities per chunk for visibility culling.
pub const CULL_GRAIN: usize = 4096;
