//! # Stratified Spawn
//!
//! Places the initial population on a jittered lattice so spheres start
//! spread through the whole cage instead of piled up in one corner.
//!
//! The cage is divided into `side³` strata with `side = ceil(cbrt(N))`.
//! Strata are filled in z, y, x order; each sphere lands at its stratum
//! center plus a random offset small enough to keep it inside the stratum,
//! then gets clamped into the cage. The RNG is seeded, so a given
//! configuration always spawns the same scene.

use crate::config::SimulationConfig;
use hailstorm_physics::Sphere;
use hailstorm_shared::Vec3;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Lowest value of any color channel.
const COLOR_FLOOR: f32 = 0.1;

/// Builds the initial sphere array for `config`.
#[must_use]
pub fn spawn_spheres(config: &SimulationConfig) -> Vec<Sphere> {
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    stratified_positions(config.count, config.box_min, config.box_max, config.radius, &mut rng)
        .into_iter()
        .map(|position| Sphere::new(position, config.radius, random_color(&mut rng)))
        .collect()
}

/// Jittered lattice positions for `count` spheres of `radius` in
/// `[min, max]`.
#[must_use]
pub fn stratified_positions(
    count: usize,
    min: Vec3,
    max: Vec3,
    radius: f32,
    rng: &mut impl Rng,
) -> Vec<Vec3> {
    let side = lattice_side(count);
    let cell = (max - min) / side as f32;
    let jitter_span = cell - Vec3::splat(2.0 * radius);
    let clamp_min = min + Vec3::splat(radius);
    let clamp_max = max - Vec3::splat(radius);

    let mut positions = Vec::with_capacity(count);
    'fill: for z in 0..side {
        for y in 0..side {
            for x in 0..side {
                if positions.len() == count {
                    break 'fill;
                }
                let stratum = Vec3::new(x as f32, y as f32, z as f32) + Vec3::splat(0.5);
                let base = min + stratum.mul_elem(cell);
                let jitter = (random_unit3(rng) - Vec3::splat(0.5)).mul_elem(jitter_span);
                positions.push((base + jitter).clamp(clamp_min, clamp_max));
            }
        }
    }
    positions
}

/// Smallest `side` with `side³ >= count`.
fn lattice_side(count: usize) -> usize {
    let mut side = (count as f64).cbrt().ceil() as usize;
    // cbrt of a perfect cube can land a hair above the integer.
    while side > 1 && (side - 1).pow(3) >= count {
        side -= 1;
    }
    while side.pow(3) < count {
        side += 1;
    }
    side.max(1)
}

fn random_unit3(rng: &mut impl Rng) -> Vec3 {
    Vec3::new(rng.gen(), rng.gen(), rng.gen())
}

fn random_color(rng: &mut impl Rng) -> Vec3 {
    Vec3::splat(COLOR_FLOOR) + random_unit3(rng) * (1.0 - COLOR_FLOOR)
}
