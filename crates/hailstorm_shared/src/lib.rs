//! # HAILSTORM Shared
//!
//! Common types used by the physics core, the scheduler and the
//! render-facing layer.
//!
//! ## CRITICAL RULE
//!
//! This crate must NEVER depend on a GPU or window crate. The renderer
//! consumes these types; it does not define them.

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod constants;
pub mod math;

pub use math::{Mat4, Vec3};
