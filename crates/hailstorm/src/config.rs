//! # Simulation Configuration
//!
//! Loaded once at startup from TOML. Every field is optional; missing
//! fields take the defaults from [`hailstorm_shared::constants`].
//!
//! ```toml
//! count = 23000
//! radius = 0.25
//! box_min = { x = -40.0, y = -20.0, z = -45.0 }
//! box_max = { x = 40.0, y = 20.0, z = 45.0 }
//! fixed_dt = 0.004166667
//! max_substeps = 8
//! pair_strategy = "pruned_parallel"
//! ```

use crate::error::ConfigError;
use hailstorm_physics::{PairStrategy, Sphere};
use hailstorm_shared::constants::{
    DEFAULT_BOX_MAX, DEFAULT_BOX_MIN, DEFAULT_FIXED_DT, DEFAULT_GRAVITY, DEFAULT_MAX_SUBSTEPS,
    DEFAULT_SEED, DEFAULT_SOLVER_ITERATIONS, DEFAULT_SPHERE_COUNT, DEFAULT_SPHERE_RADIUS,
    DEFAULT_SPHERE_RESTITUTION, DEFAULT_WALL_RESTITUTION,
};
use hailstorm_shared::Vec3;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Tunables for one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SimulationConfig {
    /// Number of spheres.
    pub count: usize,
    /// Cage minimum corner.
    pub box_min: Vec3,
    /// Cage maximum corner.
    pub box_max: Vec3,
    /// Radius shared by every sphere at spawn.
    pub radius: f32,
    /// Grid cell edge. `None` means one sphere diameter.
    pub cell_size: Option<f32>,
    /// Gravitational acceleration.
    pub gravity: Vec3,
    /// Sphere-sphere restitution.
    pub sphere_restitution: f32,
    /// Sphere-wall restitution.
    pub wall_restitution: f32,
    /// Physics substep in seconds.
    pub fixed_dt: f32,
    /// Substep cap per frame.
    pub max_substeps: u32,
    /// Contact passes per substep.
    pub solver_iterations: u32,
    /// Worker threads; 0 picks one less than the hardware parallelism.
    pub threads: usize,
    /// Spawn seed.
    pub seed: u64,
    /// Broadphase enumeration feeding the narrowphase.
    pub pair_strategy: PairStrategy,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            count: DEFAULT_SPHERE_COUNT,
            box_min: DEFAULT_BOX_MIN,
            box_max: DEFAULT_BOX_MAX,
            radius: DEFAULT_SPHERE_RADIUS,
            cell_size: None,
            gravity: DEFAULT_GRAVITY,
            sphere_restitution: DEFAULT_SPHERE_RESTITUTION,
            wall_restitution: DEFAULT_WALL_RESTITUTION,
            fixed_dt: DEFAULT_FIXED_DT,
            max_substeps: DEFAULT_MAX_SUBSTEPS,
            solver_iterations: DEFAULT_SOLVER_ITERATIONS,
            threads: 0,
            seed: DEFAULT_SEED,
            pair_strategy: PairStrategy::default(),
        }
    }
}

impl SimulationConfig {
    /// Reads and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read, does not parse,
    /// or fails [`SimulationConfig::validate`].
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&raw)?;
        tracing::debug!(path = %path.display(), count = config.count, "configuration loaded");
        Ok(config)
    }

    /// Parses and validates TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] on a parse error or an invalid field.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Effective grid cell edge.
    #[must_use]
    pub fn effective_cell_size(&self) -> f32 {
        self.cell_size.unwrap_or(2.0 * self.radius)
    }

    /// Checks every field for a usable value.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.count == 0 || self.count > u32::MAX as usize {
            return Err(invalid("count", format!("must be in 1..={}, got {}", u32::MAX, self.count)));
        }
        positive("radius", self.radius)?;
        positive("fixed_dt", self.fixed_dt)?;

        if !self.box_min.is_finite() || !self.box_max.is_finite() {
            return Err(invalid("box_min", "box corners must be finite".into()));
        }
        let inner_min = self.box_min + Vec3::splat(self.radius);
        let inner_max = self.box_max - Vec3::splat(self.radius);
        if !self.box_min.all_lt(self.box_max) {
            return Err(invalid(
                "box_max",
                format!("must exceed box_min on every axis, got {:?}..{:?}", self.box_min, self.box_max),
            ));
        }
        if !inner_min.all_lt(inner_max) {
            return Err(invalid("radius", format!("{} does not fit inside the box", self.radius)));
        }

        let cell = self.effective_cell_size();
        positive("cell_size", cell)?;
        if cell < 2.0 * self.radius {
            return Err(invalid(
                "cell_size",
                format!("{cell} is smaller than one sphere diameter ({})", 2.0 * self.radius),
            ));
        }

        if !self.gravity.is_finite() {
            return Err(invalid("gravity", format!("must be finite, got {:?}", self.gravity)));
        }
        unit_interval("sphere_restitution", self.sphere_restitution)?;
        unit_interval("wall_restitution", self.wall_restitution)?;

        if self.max_substeps == 0 {
            return Err(invalid("max_substeps", "must be at least 1".into()));
        }
        Ok(())
    }

    /// Adapts the configuration to a caller-built population and validates
    /// it.
    ///
    /// `count` becomes `spheres.len()`. With no explicit `cell_size`, the
    /// cell grows to the largest sphere's diameter when that exceeds the
    /// configured one. An explicit cell must hold the largest sphere.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidField`] if a sphere radius is not
    /// positive, the cell is smaller than the largest diameter, or
    /// [`SimulationConfig::validate`] fails.
    pub fn fit_to_population(&mut self, spheres: &[Sphere]) -> Result<(), ConfigError> {
        self.count = spheres.len();
        let mut largest = 0.0_f32;
        for sphere in spheres {
            positive("radius", sphere.radius())?;
            largest = largest.max(sphere.radius());
        }
        if self.cell_size.is_none() && largest > self.radius {
            self.cell_size = Some(2.0 * largest);
        }
        self.validate()?;

        let cell = self.effective_cell_size();
        if cell < 2.0 * largest {
            return Err(invalid(
                "cell_size",
                format!("{cell} is smaller than the largest sphere diameter ({})", 2.0 * largest),
            ));
        }
        Ok(())
    }
}

fn invalid(field: &'static str, reason: String) -> ConfigError {
    ConfigError::InvalidField { field, reason }
}

fn positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(invalid(field, format!("must be positive, got {value}")))
    }
}

fn unit_interval(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(field, format!("must be in [0, 1], got {value}")))
    }
}
