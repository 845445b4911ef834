//! # Narrowphase
//!
//! Runs [`Sphere::collide`] over the broadphase candidates.
//!
//! The parallel strategies share the sphere array through a
//! [`LockedSlice`]: every pair is resolved with both entity locks held,
//! lower index first. The serial strategy needs no locks.

use crate::grid::UniformGrid;
use crate::sphere::Sphere;
use hailstorm_core::{LockedSlice, SpinTable, ThreadPool};
use serde::{Deserialize, Serialize};

/// Which pair enumeration feeds the narrowphase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PairStrategy {
    /// Single-threaded, deterministic.
    Serial,
    /// Every adjacent-cell pair, cells split across the pool.
    Parallel,
    /// Parallel with the X sweep filter.
    #[default]
    PrunedParallel,
}

/// Resolves every candidate pair the grid produces once.
///
/// `spheres` must be the array the grid was filled from, and `locks` must
/// hold at least one lock per sphere. For the parallel strategies the
/// order in which pairs are resolved is unspecified, so results differ
/// from run to run at the bit level.
///
/// # Panics
///
/// Panics if `locks` is shorter than `spheres` or the grid references an
/// index outside `spheres`.
pub fn resolve_contacts(
    strategy: PairStrategy,
    pool: &ThreadPool,
    grid: &UniformGrid,
    spheres: &mut [Sphere],
    locks: &SpinTable,
    restitution: f32,
) {
    match strategy {
        PairStrategy::Serial => {
            grid.for_each_potential_pair(|a, b| {
                let (x, y) = pair_mut(spheres, a as usize, b as usize);
                x.collide(y, restitution);
            });
        }
        PairStrategy::Parallel => {
            let view = LockedSlice::new(spheres, locks);
            grid.for_each_potential_pair_parallel(pool, |a, b| {
                collide_locked(&view, a as usize, b as usize, restitution);
            });
        }
        PairStrategy::PrunedParallel => {
            let view = LockedSlice::new(spheres, locks);
            grid.for_each_potential_pair_pruned(pool, |a, b| {
                collide_locked(&view, a as usize, b as usize, restitution);
            });
        }
    }
}

/// Runs `passes` rounds of [`resolve_contacts`] over one grid build.
///
/// Spheres move during each pass but keep their cells. Before every pass
/// after the first, the pruned strategy refreshes the bucket snapshots so
/// its X filter sees the moved positions.
///
/// # Panics
///
/// Same conditions as [`resolve_contacts`].
pub fn solve_contacts(
    passes: u32,
    strategy: PairStrategy,
    pool: &ThreadPool,
    grid: &mut UniformGrid,
    spheres: &mut [Sphere],
    locks: &SpinTable,
    restitution: f32,
) {
    for pass in 0..passes {
        if pass > 0 && strategy == PairStrategy::PrunedParallel {
            grid.refresh_snapshots(spheres);
        }
        resolve_contacts(strategy, pool, grid, spheres, locks, restitution);
    }
}

/// Collides `a` and `b` with both locks held.
///
/// Returns true if they were in contact.
#[inline]
pub fn collide_locked(view: &LockedSlice<'_, Sphere>, a: usize, b: usize, restitution: f32) -> bool {
    view.with_pair(a, b, |x, y| x.collide(y, restitution))
}

/// Two distinct mutable elements of one slice.
fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &mut T) {
    assert_ne!(a, b, "self-pair {a}");
    if a < b {
        let (lo, hi) = items.split_at_mut(b);
        (&mut lo[a], &mut hi[0])
    } else {
        let (lo, hi) = items.split_at_mut(a);
        (&mut hi[0], &mut lo[b])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hailstorm_shared::Vec3;

    fn cluster() -> Vec<Sphere> {
        // Three overlapping spheres in a row plus one loner.
        vec![
            Sphere::new(Vec3::new(0.0, 0.0, 0.0), 0.25, Vec3::ONE).with_velocity(Vec3::X),
            Sphere::new(Vec3::new(0.4, 0.0, 0.0), 0.25, Vec3::ONE),
            Sphere::new(Vec3::new(0.8, 0.0, 0.0), 0.25, Vec3::ONE).with_velocity(-Vec3::X),
            Sphere::new(Vec3::new(3.0, 3.0, 3.0), 0.25, Vec3::ONE),
        ]
    }

    fn fill(grid: &mut UniformGrid, spheres: &[Sphere]) {
        grid.clear(spheres.len());
        for (i, s) in spheres.iter().enumerate() {
            grid.insert(i as u32, s.position(), s.radius());
        }
    }

    fn momentum(spheres: &[Sphere]) -> Vec3 {
        spheres
            .iter()
            .fold(Vec3::ZERO, |acc, s| acc + s.velocity() * s.mass())
    }

    #[test]
    fn test_pair_mut_both_orders() {
        let mut v = vec![1, 2, 3, 4];
        let (a, b) = pair_mut(&mut v, 3, 1);
        std::mem::swap(a, b);
        assert_eq!(v, vec![1, 4, 3, 2]);
    }

    #[test]
    fn test_strategies_conserve_momentum_and_release_locks() {
        let pool = ThreadPool::new(3).unwrap();
        for strategy in [
            PairStrategy::Serial,
            PairStrategy::Parallel,
            PairStrategy::PrunedParallel,
        ] {
            let mut spheres = cluster();
            let locks = SpinTable::new(spheres.len());
            let mut grid = UniformGrid::new(Vec3::splat(-4.0), Vec3::splat(4.0), 0.5);
            fill(&mut grid, &spheres);

            let before = momentum(&spheres);
            resolve_contacts(strategy, &pool, &grid, &mut spheres, &locks, 0.9);
            let after = momentum(&spheres);

            assert!((after - before).length() < 1e-5, "{strategy:?}");
            assert!(locks.all_unlocked(), "{strategy:?}");
            assert!(spheres[1].position().x != 0.4, "{strategy:?} left contact unresolved");
            assert_eq!(spheres[3], cluster()[3], "{strategy:?} touched the loner");
        }
    }

    #[test]
    fn test_second_pass_reaches_contact_made_by_first() {
        let pool = ThreadPool::new(3).unwrap();
        for strategy in [PairStrategy::Parallel, PairStrategy::PrunedParallel] {
            // 0 and 1 overlap; 1 and 2 are 0.05 apart until the first pass
            // pushes 1 into 2.
            let mut spheres = vec![
                Sphere::new(Vec3::new(0.0, 0.0, 0.0), 0.25, Vec3::ONE),
                Sphere::new(Vec3::new(0.3, 0.0, 0.0), 0.25, Vec3::ONE),
                Sphere::new(Vec3::new(0.85, 0.0, 0.0), 0.25, Vec3::ONE),
            ];
            let locks = SpinTable::new(spheres.len());
            let mut grid = UniformGrid::new(Vec3::splat(-2.0), Vec3::splat(2.0), 0.5);
            fill(&mut grid, &spheres);

            solve_contacts(2, strategy, &pool, &mut grid, &mut spheres, &locks, 0.9);

            assert!(spheres[2].position().x > 0.85, "{strategy:?} never resolved 1-2");
            assert!(locks.all_unlocked(), "{strategy:?}");
        }
    }

    #[test]
    fn test_single_pass_prunes_distant_pair() {
        let pool = ThreadPool::new(2).unwrap();
        let mut spheres = vec![
            Sphere::new(Vec3::new(0.0, 0.0, 0.0), 0.25, Vec3::ONE),
            Sphere::new(Vec3::new(0.3, 0.0, 0.0), 0.25, Vec3::ONE),
            Sphere::new(Vec3::new(0.85, 0.0, 0.0), 0.25, Vec3::ONE),
        ];
        let locks = SpinTable::new(spheres.len());
        let mut grid = UniformGrid::new(Vec3::splat(-2.0), Vec3::splat(2.0), 0.5);
        fill(&mut grid, &spheres);

        solve_contacts(1, PairStrategy::PrunedParallel, &pool, &mut grid, &mut spheres, &locks, 0.9);

        assert!(spheres[1].position().x > 0.3);
        assert_eq!(spheres[2].position().x, 0.85);
    }

    #[test]
    fn test_serial_is_deterministic() {
        let pool = ThreadPool::new(2).unwrap();
        let run = || {
            let mut spheres = cluster();
            let locks = SpinTable::new(spheres.len());
            let mut grid = UniformGrid::new(Vec3::splat(-4.0), Vec3::splat(4.0), 0.5);
            fill(&mut grid, &spheres);
            resolve_contacts(PairStrategy::Serial, &pool, &grid, &mut spheres, &locks, 0.9);
            spheres
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn test_strategy_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            strategy: PairStrategy,
        }
        let w: Wrapper = toml::from_str("strategy = \"pruned_parallel\"").unwrap();
        assert_eq!(w.strategy, PairStrategy::PrunedParallel);
    }
}
