//! Serial and parallel candidate-pair enumeration.

use super::{BucketEntry, UniformGrid};
use crate::EntityIndex;
use hailstorm_core::ThreadPool;
use hailstorm_shared::constants::PAIR_GRAIN;

impl UniformGrid {
    /// Calls `f(a, b)` once for every unordered pair of entities that share
    /// a cell or occupy adjacent cells.
    ///
    /// Single-threaded; the reference the parallel variants are checked
    /// against.
    pub fn for_each_potential_pair(&self, mut f: impl FnMut(EntityIndex, EntityIndex)) {
        for &cell in self.active_cells() {
            self.emit_cell_pairs(cell, &mut f);
        }
    }

    /// Same pairs as [`UniformGrid::for_each_potential_pair`], with the
    /// active cells split across `pool`.
    ///
    /// `f` runs concurrently on several threads; anything it mutates must
    /// be synchronized by the caller. Blocks until every chunk is done.
    pub fn for_each_potential_pair_parallel<F>(&self, pool: &ThreadPool, f: F)
    where
        F: Fn(EntityIndex, EntityIndex) + Sync,
    {
        let active = self.active_cells();
        pool.parallel_for(0, active.len(), PAIR_GRAIN, |start, end, _| {
            let mut emit = |a, b| f(a, b);
            for &cell in &active[start..end] {
                self.emit_cell_pairs(cell, &mut emit);
            }
        });
    }

    /// Intra-cell pairs in bucket order, then every occupant against every
    /// occupant of each forward neighbor.
    fn emit_cell_pairs<F>(&self, cell: usize, f: &mut F)
    where
        F: FnMut(EntityIndex, EntityIndex),
    {
        let Some(bucket) = self.bucket_at(cell) else {
            return;
        };

        for (i, a) in bucket.iter().enumerate() {
            for b in &bucket[i + 1..] {
                f(a.id, b.id);
            }
        }

        self.for_each_forward_bucket(cell, |neighbor: &[BucketEntry]| {
            for a in bucket {
                for b in neighbor {
                    f(a.id, b.id);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hailstorm_shared::Vec3;
    use parking_lot::Mutex;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::collections::BTreeSet;

    fn ordered(a: EntityIndex, b: EntityIndex) -> (EntityIndex, EntityIndex) {
        if a < b {
            (a, b)
        } else {
            (b, a)
        }
    }

    fn scattered(count: u32, seed: u64) -> (UniformGrid, Vec<Vec3>) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut grid = UniformGrid::new(Vec3::splat(-5.0), Vec3::splat(5.0), 1.0);
        let positions: Vec<Vec3> = (0..count)
            .map(|_| {
                Vec3::new(
                    rng.gen_range(-5.0..5.0),
                    rng.gen_range(-5.0..5.0),
                    rng.gen_range(-5.0..5.0),
                )
            })
            .collect();
        grid.clear(count as usize);
        for (i, p) in positions.iter().enumerate() {
            grid.insert(i as u32, *p, 0.25);
        }
        (grid, positions)
    }

    /// Every pair whose cells differ by at most one on each axis.
    fn brute_force(grid: &UniformGrid, positions: &[Vec3]) -> BTreeSet<(u32, u32)> {
        let cells: Vec<[usize; 3]> = positions.iter().map(|p| grid.cell_of(*p)).collect();
        let mut out = BTreeSet::new();
        for i in 0..cells.len() {
            for j in i + 1..cells.len() {
                let adjacent = (0..3).all(|a| cells[i][a].abs_diff(cells[j][a]) <= 1);
                if adjacent {
                    out.insert((i as u32, j as u32));
                }
            }
        }
        out
    }

    #[test]
    fn test_serial_matches_brute_force_without_duplicates() {
        let (grid, positions) = scattered(600, 11);
        let mut emitted = Vec::new();
        grid.for_each_potential_pair(|a, b| emitted.push(ordered(a, b)));

        let unique: BTreeSet<_> = emitted.iter().copied().collect();
        assert_eq!(unique.len(), emitted.len(), "duplicate pair emitted");
        assert!(emitted.iter().all(|(a, b)| a != b), "self pair emitted");
        assert_eq!(unique, brute_force(&grid, &positions));
    }

    #[test]
    fn test_parallel_matches_serial() {
        let pool = ThreadPool::new(4).unwrap();
        let (grid, _) = scattered(2_000, 29);

        let mut serial = Vec::new();
        grid.for_each_potential_pair(|a, b| serial.push(ordered(a, b)));

        let parallel = Mutex::new(Vec::new());
        grid.for_each_potential_pair_parallel(&pool, |a, b| parallel.lock().push(ordered(a, b)));
        let mut parallel = parallel.into_inner();

        serial.sort_unstable();
        parallel.sort_unstable();
        assert_eq!(serial, parallel);
    }

    #[test]
    fn test_single_cell_pairs() {
        let mut grid = UniformGrid::new(Vec3::ZERO, Vec3::splat(4.0), 1.0);
        for i in 0..4u32 {
            grid.insert(i, Vec3::new(0.5, 0.5, 0.5), 0.1);
        }
        let mut pairs = Vec::new();
        grid.for_each_potential_pair(|a, b| pairs.push((a, b)));
        assert_eq!(pairs, vec![(0, 1), (0, 2), (0, 3), (1, 2), (1, 3), (2, 3)]);
    }

    #[test]
    fn test_distant_cells_emit_nothing() {
        let mut grid = UniformGrid::new(Vec3::ZERO, Vec3::splat(4.0), 1.0);
        grid.insert(0, Vec3::new(0.5, 0.5, 0.5), 0.1);
        grid.insert(1, Vec3::new(2.5, 0.5, 0.5), 0.1);

        let mut count = 0;
        grid.for_each_potential_pair(|_, _| count += 1);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_empty_grid_is_a_no_op() {
        let pool = ThreadPool::new(2).unwrap();
        let grid = UniformGrid::new(Vec3::ZERO, Vec3::splat(4.0), 1.0);
        grid.for_each_potential_pair(|_, _| panic!("no pairs expected"));
        grid.for_each_potential_pair_parallel(&pool, |_, _| panic!("no pairs expected"));
    }
}
