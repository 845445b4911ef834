//! # Simulation Driver
//!
//! Owns every piece of mutable state (spheres, grid, lock table, worker
//! pool) and advances it with a fixed-step accumulator.
//!
//! ## Frame
//!
//! Real elapsed time is added to a debt. Whole substeps of `fixed_dt` are
//! paid off until the debt drops below one step or `max_substeps` have run
//! this frame; whatever is left is then clamped to `max_substeps * fixed_dt`
//! so a stalled frame cannot snowball into a spiral of death.

use crate::config::SimulationConfig;
use crate::error::Result;
use crate::spawn::spawn_spheres;
use hailstorm_core::{SpinTable, ThreadPool};
use hailstorm_physics::{solve_contacts, BoundingBox, EntityIndex, Sphere, UniformGrid};
use hailstorm_shared::constants::ENTITY_GRAIN;
use std::time::{Duration, Instant};

/// Outcome of one [`Simulation::advance`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameReport {
    /// Substeps run this frame.
    pub substeps: u32,
    /// True if the substep cap stopped the frame with a full step still owed.
    pub capped: bool,
    /// Debt carried into the next frame, in seconds.
    pub debt: f64,
}

/// Cumulative counters since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SimulationStats {
    /// `advance` calls.
    pub frames: u64,
    /// Substeps run.
    pub substeps: u64,
    /// Frames that hit the substep cap.
    pub capped_frames: u64,
    /// Wall-clock time spent inside `advance`.
    pub physics_time: Duration,
}

impl SimulationStats {
    /// Average wall-clock cost of one substep.
    #[must_use]
    pub fn avg_substep(&self) -> Duration {
        if self.substeps == 0 {
            return Duration::ZERO;
        }
        self.physics_time.div_f64(self.substeps as f64)
    }

    /// Average wall-clock cost of one frame.
    #[must_use]
    pub fn avg_frame(&self) -> Duration {
        if self.frames == 0 {
            return Duration::ZERO;
        }
        self.physics_time.div_f64(self.frames as f64)
    }
}

/// A running sphere simulation.
#[derive(Debug)]
pub struct Simulation {
    config: SimulationConfig,
    bounds: BoundingBox,
    spheres: Vec<Sphere>,
    grid: UniformGrid,
    locks: SpinTable,
    pool: ThreadPool,
    debt: f64,
    was_capped: bool,
    stats: SimulationStats,
}

impl Simulation {
    /// Validates `config`, spawns the population and starts the workers.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid or a worker thread
    /// cannot be spawned.
    pub fn new(config: SimulationConfig) -> Result<Self> {
        config.validate()?;
        let spheres = spawn_spheres(&config);
        Self::with_spheres(config, spheres)
    }

    /// Like [`Simulation::new`] but with a caller-provided population.
    ///
    /// The configuration is fitted to `spheres` with
    /// [`SimulationConfig::fit_to_population`].
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the grid cells
    /// are too small for the largest sphere, or a worker thread cannot be
    /// spawned.
    pub fn with_spheres(mut config: SimulationConfig, spheres: Vec<Sphere>) -> Result<Self> {
        config.fit_to_population(&spheres)?;

        let bounds = BoundingBox::new(config.box_min, config.box_max);
        let pool = ThreadPool::new(config.threads)?;
        let grid = UniformGrid::new(config.box_min, config.box_max, config.effective_cell_size());
        let locks = SpinTable::new(spheres.len());

        let mut sim = Self {
            config,
            bounds,
            spheres,
            grid,
            locks,
            pool,
            debt: 0.0,
            was_capped: false,
            stats: SimulationStats::default(),
        };
        sim.rebuild_grid();

        tracing::info!(
            spheres = sim.spheres.len(),
            threads = sim.pool.thread_count(),
            cells = sim.grid.cell_count(),
            strategy = ?sim.config.pair_strategy,
            "simulation ready"
        );
        Ok(sim)
    }

    /// Advances by `elapsed` seconds of real time.
    ///
    /// Negative or non-finite input counts as zero.
    pub fn advance(&mut self, elapsed: f64) -> FrameReport {
        let started = Instant::now();
        let dt = f64::from(self.config.fixed_dt);
        let max_substeps = self.config.max_substeps;

        if elapsed.is_finite() && elapsed > 0.0 {
            self.debt += elapsed;
        }

        let mut substeps = 0;
        while self.debt >= dt && substeps < max_substeps {
            self.step();
            self.debt -= dt;
            substeps += 1;
        }

        let capped = self.debt >= dt;
        self.debt = self.debt.min(f64::from(max_substeps) * dt);

        if capped && !self.was_capped {
            tracing::warn!(
                max_substeps,
                debt = self.debt,
                "substep cap reached, simulation is running behind real time"
            );
        }
        self.was_capped = capped;

        self.stats.frames += 1;
        self.stats.substeps += u64::from(substeps);
        self.stats.capped_frames += u64::from(capped);
        self.stats.physics_time += started.elapsed();

        tracing::trace!(substeps, capped, debt = self.debt, "frame advanced");
        FrameReport {
            substeps,
            capped,
            debt: self.debt,
        }
    }

    /// Runs exactly one substep of `fixed_dt`.
    pub fn step(&mut self) {
        let dt = self.config.fixed_dt;
        let gravity = self.config.gravity;
        let bounds = self.bounds;
        let wall_restitution = self.config.wall_restitution;

        self.pool
            .parallel_for_mut(&mut self.spheres, ENTITY_GRAIN, |_, chunk, _| {
                for sphere in chunk {
                    sphere.apply_gravity(gravity, dt);
                }
            });
        self.pool
            .parallel_for_mut(&mut self.spheres, ENTITY_GRAIN, |_, chunk, _| {
                for sphere in chunk {
                    bounds.resolve_collision(sphere, wall_restitution);
                }
            });

        self.rebuild_grid();

        solve_contacts(
            self.config.solver_iterations,
            self.config.pair_strategy,
            &self.pool,
            &mut self.grid,
            &mut self.spheres,
            &self.locks,
            self.config.sphere_restitution,
        );
    }

    /// Clears the grid and inserts every sphere at its current position.
    fn rebuild_grid(&mut self) {
        self.grid.clear(self.spheres.len());
        for (i, sphere) in self.spheres.iter().enumerate() {
            self.grid
                .insert(i as EntityIndex, sphere.position(), sphere.radius());
        }
    }

    /// Current sphere state.
    #[inline]
    #[must_use]
    pub fn spheres(&self) -> &[Sphere] {
        &self.spheres
    }

    /// Spheres touching a wall as of the last grid rebuild.
    #[inline]
    #[must_use]
    pub fn near_wall(&self) -> &[EntityIndex] {
        self.grid.near_wall()
    }

    /// The broadphase grid as of the last rebuild.
    #[inline]
    #[must_use]
    pub fn grid(&self) -> &UniformGrid {
        &self.grid
    }

    /// The worker pool, shared with render-side work such as culling.
    #[inline]
    #[must_use]
    pub fn pool(&self) -> &ThreadPool {
        &self.pool
    }

    /// The cage.
    #[inline]
    #[must_use]
    pub fn bounds(&self) -> BoundingBox {
        self.bounds
    }

    /// Active configuration.
    #[inline]
    #[must_use]
    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    /// Time owed to the next frame, in seconds.
    #[inline]
    #[must_use]
    pub fn debt(&self) -> f64 {
        self.debt
    }

    /// Cumulative counters.
    #[inline]
    #[must_use]
    pub fn stats(&self) -> SimulationStats {
        self.stats
    }

    /// Total kinetic energy, `½·m·v²` summed.
    #[must_use]
    pub fn kinetic_energy(&self) -> f64 {
        self.spheres
            .iter()
            .map(|s| 0.5 * f64::from(s.mass()) * f64::from(s.velocity().length_squared()))
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ConfigError;
    use hailstorm_shared::Vec3;

    fn tiny_config() -> SimulationConfig {
        SimulationConfig {
            count: 64,
            box_min: Vec3::splat(-4.0),
            box_max: Vec3::splat(4.0),
            threads: 2,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn test_construction_warms_grid() {
        let sim = Simulation::new(tiny_config()).unwrap();
        assert_eq!(sim.spheres().len(), 64);
        assert_eq!(sim.grid().len(), 64);
        assert_eq!(sim.debt(), 0.0);
    }

    #[test]
    fn test_small_elapsed_only_accumulates() {
        let mut sim = Simulation::new(tiny_config()).unwrap();
        let before = sim.spheres().to_vec();
        let dt = f64::from(sim.config().fixed_dt);

        let report = sim.advance(dt * 0.5);
        assert_eq!(report.substeps, 0);
        assert!(!report.capped);
        assert!((report.debt - dt * 0.5).abs() < 1e-12);
        assert_eq!(sim.spheres(), before.as_slice());
    }

    #[test]
    fn test_whole_steps_consume_debt() {
        let mut sim = Simulation::new(tiny_config()).unwrap();
        let dt = f64::from(sim.config().fixed_dt);

        let report = sim.advance(dt * 3.5);
        assert_eq!(report.substeps, 3);
        assert!(!report.capped);
        assert!((report.debt - dt * 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_substep_cap_and_debt_clamp() {
        let mut sim = Simulation::new(tiny_config()).unwrap();
        let dt = f64::from(sim.config().fixed_dt);

        let report = sim.advance(10.0);
        assert_eq!(report.substeps, 8);
        assert!(report.capped);
        assert!((report.debt - 8.0 * dt).abs() < 1e-12);

        // The clamped debt is paid off next frame without new time.
        let report = sim.advance(0.0);
        assert_eq!(report.substeps, 8);
        assert!(report.debt < dt);

        let stats = sim.stats();
        assert_eq!(stats.frames, 2);
        assert_eq!(stats.substeps, 16);
        assert_eq!(stats.capped_frames, 1);
    }

    #[test]
    fn test_bad_elapsed_ignored() {
        let mut sim = Simulation::new(tiny_config()).unwrap();
        for elapsed in [-1.0, f64::NAN, f64::INFINITY] {
            let report = sim.advance(elapsed);
            assert_eq!(report.substeps, 0);
            assert_eq!(report.debt, 0.0);
        }
    }

    #[test]
    fn test_cell_grows_with_population_radius() {
        let spheres = vec![
            Sphere::new(Vec3::ZERO, 1.0, Vec3::ONE),
            Sphere::new(Vec3::new(1.5, 0.0, 0.0), 0.25, Vec3::ONE),
        ];
        let sim = Simulation::with_spheres(tiny_config(), spheres).unwrap();
        assert_eq!(sim.config().count, 2);
        assert_eq!(sim.config().cell_size, Some(2.0));
        assert_eq!(sim.grid().cell_size(), 2.0);
    }

    #[test]
    fn test_explicit_cell_too_small_for_population() {
        let config = SimulationConfig {
            cell_size: Some(0.5),
            ..tiny_config()
        };
        let spheres = vec![Sphere::new(Vec3::ZERO, 1.0, Vec3::ONE)];
        let err = Simulation::with_spheres(config, spheres).unwrap_err();
        assert!(matches!(
            err,
            crate::SimulationError::Config(ConfigError::InvalidField { field: "cell_size", .. })
        ));
    }

    #[test]
    fn test_step_applies_gravity() {
        let mut sim = Simulation::new(SimulationConfig {
            count: 1,
            ..tiny_config()
        })
        .unwrap();
        let y0 = sim.spheres()[0].position().y;

        sim.step();
        let s = sim.spheres()[0];
        assert!(s.velocity().y < 0.0);
        assert!(s.position().y < y0);
    }
}
