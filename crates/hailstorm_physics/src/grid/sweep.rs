//! Sort-and-sweep pruned enumeration.
//!
//! Candidate pairs from a cell and its forward neighbors are filtered along
//! X before the callback sees them. Large buckets are sorted into a
//! thread-local scratch buffer and swept; small ones are cheaper to test
//! directly.

use super::{BucketEntry, UniformGrid};
use crate::EntityIndex;
use hailstorm_core::ThreadPool;
use hailstorm_shared::constants::{PRUNED_PAIR_GRAIN, SWEEP_THRESHOLD};
use std::cell::RefCell;

/// Per-thread sort buffers, reused across calls.
#[derive(Default)]
struct SweepScratch {
    home: Vec<BucketEntry>,
    neighbor: Vec<BucketEntry>,
}

thread_local! {
    static SWEEP_SCRATCH: RefCell<SweepScratch> = RefCell::new(SweepScratch::default());
}

impl UniformGrid {
    /// Parallel enumeration that drops pairs separated along X by more
    /// than the sum of their radii.
    ///
    /// Emits a subset of [`UniformGrid::for_each_potential_pair`] that
    /// still contains every pair overlapping as of the bucket snapshots,
    /// taken at insertion or by the last
    /// [`UniformGrid::refresh_snapshots`]. `f` may freely move entities.
    ///
    /// # Panics
    ///
    /// Panics if `f` re-enters pruned enumeration on the same thread.
    pub fn for_each_potential_pair_pruned<F>(&self, pool: &ThreadPool, f: F)
    where
        F: Fn(EntityIndex, EntityIndex) + Sync,
    {
        let active = self.active_cells();
        pool.parallel_for(0, active.len(), PRUNED_PAIR_GRAIN, |start, end, _| {
            SWEEP_SCRATCH.with(|local| {
                let mut scratch = local.borrow_mut();
                for &cell in &active[start..end] {
                    self.emit_pruned_cell_pairs(cell, &mut scratch, &f);
                }
            });
        });
    }

    fn emit_pruned_cell_pairs<F>(&self, cell: usize, scratch: &mut SweepScratch, f: &F)
    where
        F: Fn(EntityIndex, EntityIndex),
    {
        let Some(bucket) = self.bucket_at(cell) else {
            return;
        };

        // Sorted copy of the home bucket, shared by every cross-cell sweep.
        let home_sorted = bucket.len() > SWEEP_THRESHOLD;
        let home_max_radius = if home_sorted {
            sorted_copy(bucket, &mut scratch.home)
        } else {
            0.0
        };

        if home_sorted {
            sweep_within(&scratch.home, home_max_radius, f);
        } else {
            for (i, a) in bucket.iter().enumerate() {
                for b in &bucket[i + 1..] {
                    f(a.id, b.id);
                }
            }
        }

        let home = &scratch.home;
        let neighbor_scratch = &mut scratch.neighbor;
        self.for_each_forward_bucket(cell, |neighbor| {
            if home_sorted && neighbor.len() > SWEEP_THRESHOLD {
                let neighbor_max_radius = sorted_copy(neighbor, neighbor_scratch);
                sweep_across(home, home_max_radius, neighbor_scratch, neighbor_max_radius, f);
            } else {
                for a in bucket {
                    for b in neighbor {
                        if overlaps_on_x(a, b) {
                            f(a.id, b.id);
                        }
                    }
                }
            }
        });
    }
}

#[inline]
fn overlaps_on_x(a: &BucketEntry, b: &BucketEntry) -> bool {
    (b.x - a.x).abs() <= a.radius + b.radius
}

/// Copies `bucket` into `out` sorted by X; returns the largest radius.
fn sorted_copy(bucket: &[BucketEntry], out: &mut Vec<BucketEntry>) -> f32 {
    out.clear();
    out.extend_from_slice(bucket);
    out.sort_unstable_by(|a, b| a.x.total_cmp(&b.x));
    out.iter().map(|e| e.radius).fold(0.0, f32::max)
}

/// Pairs within one X-sorted bucket.
fn sweep_within<F>(sorted: &[BucketEntry], max_radius: f32, f: &F)
where
    F: Fn(EntityIndex, EntityIndex),
{
    for (i, a) in sorted.iter().enumerate() {
        let reach = a.radius + max_radius;
        for b in &sorted[i + 1..] {
            let gap = b.x - a.x;
            if gap > reach {
                break;
            }
            if gap <= a.radius + b.radius {
                f(a.id, b.id);
            }
        }
    }
}

/// Pairs between two X-sorted buckets, advancing a shared window start.
fn sweep_across<F>(home: &[BucketEntry], home_max: f32, other: &[BucketEntry], other_max: f32, f: &F)
where
    F: Fn(EntityIndex, EntityIndex),
{
    let window = home_max + other_max;
    let mut first = 0;
    for a in home {
        while first < other.len() && other[first].x < a.x - window {
            first += 1;
        }
        let reach = a.radius + other_max;
        for b in &other[first..] {
            if b.x - a.x > reach {
                break;
            }
            if overlaps_on_x(a, b) {
                f(a.id, b.id);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Sphere;
    use hailstorm_shared::Vec3;
    use parking_lot::Mutex;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;
    use std::collections::BTreeSet;

    fn ordered(a: EntityIndex, b: EntityIndex) -> (EntityIndex, EntityIndex) {
        (a.min(b), a.max(b))
    }

    /// Dense population so buckets exceed the sweep threshold.
    fn crowded(count: u32, radius_range: (f32, f32), seed: u64) -> (UniformGrid, Vec<(Vec3, f32)>) {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let mut grid = UniformGrid::new(Vec3::splat(-1.0), Vec3::splat(1.0), 1.0);
        let spheres: Vec<(Vec3, f32)> = (0..count)
            .map(|_| {
                let p = Vec3::new(
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                    rng.gen_range(-1.0..1.0),
                );
                (p, rng.gen_range(radius_range.0..=radius_range.1))
            })
            .collect();
        grid.clear(count as usize);
        for (i, (p, r)) in spheres.iter().enumerate() {
            grid.insert(i as u32, *p, *r);
        }
        (grid, spheres)
    }

    fn collect_pruned(grid: &UniformGrid, pool: &ThreadPool) -> Vec<(u32, u32)> {
        let out = Mutex::new(Vec::new());
        grid.for_each_potential_pair_pruned(pool, |a, b| out.lock().push(ordered(a, b)));
        out.into_inner()
    }

    #[test]
    fn test_pruned_is_subset_without_duplicates() {
        let pool = ThreadPool::new(4).unwrap();
        let (grid, _) = crowded(1_500, (0.02, 0.05), 3);
        assert!(grid.active_cells().iter().all(|&c| grid.bucket_len(c) > SWEEP_THRESHOLD));

        let pruned = collect_pruned(&grid, &pool);
        let unique: BTreeSet<_> = pruned.iter().copied().collect();
        assert_eq!(unique.len(), pruned.len());
        assert!(pruned.iter().all(|(a, b)| a != b));

        // A 2x2x2 lattice makes every pair a candidate.
        let n = grid.len();
        assert!(unique.len() < n * (n - 1) / 2);
    }

    #[test]
    fn test_pruned_keeps_every_overlap() {
        let pool = ThreadPool::new(3).unwrap();
        // Mixed radii exercise the max-radius window.
        let (grid, spheres) = crowded(1_200, (0.01, 0.12), 17);

        let pruned: BTreeSet<_> = collect_pruned(&grid, &pool).into_iter().collect();
        for i in 0..spheres.len() {
            for j in i + 1..spheres.len() {
                let (pi, ri) = spheres[i];
                let (pj, rj) = spheres[j];
                if pi.distance_squared(pj) < (ri + rj) * (ri + rj) {
                    assert!(pruned.contains(&(i as u32, j as u32)), "missed overlap {i}-{j}");
                }
            }
        }
    }

    #[test]
    fn test_small_buckets_keep_all_intra_pairs() {
        let pool = ThreadPool::new(2).unwrap();
        let mut grid = UniformGrid::new(Vec3::ZERO, Vec3::splat(4.0), 1.0);
        // Far apart on X but in the same cell: small buckets are not pruned.
        grid.insert(0, Vec3::new(0.05, 0.5, 0.5), 0.01);
        grid.insert(1, Vec3::new(0.95, 0.5, 0.5), 0.01);
        // Neighbor cell, too far on X to touch either.
        grid.insert(2, Vec3::new(1.9, 0.5, 0.5), 0.01);

        let pairs = collect_pruned(&grid, &pool);
        assert_eq!(pairs, vec![(0, 1)]);
    }

    #[test]
    fn test_refreshed_snapshot_emits_new_overlap() {
        let pool = ThreadPool::new(2).unwrap();
        let mut spheres = vec![
            Sphere::new(Vec3::new(0.30, 0.0, 0.0), 0.25, Vec3::ONE),
            Sphere::new(Vec3::new(0.90, 0.0, 0.0), 0.25, Vec3::ONE),
        ];
        let mut grid = UniformGrid::new(Vec3::splat(-2.0), Vec3::splat(2.0), 0.5);
        grid.clear(spheres.len());
        for (i, s) in spheres.iter().enumerate() {
            grid.insert(i as EntityIndex, s.position(), s.radius());
        }
        assert!(collect_pruned(&grid, &pool).is_empty());

        // A solver pass pushes sphere 1 into sphere 0 without a rebuild.
        spheres[1].set_position(Vec3::new(0.70, 0.0, 0.0));
        let mut serial = Vec::new();
        grid.for_each_potential_pair(|a, b| serial.push(ordered(a, b)));
        assert_eq!(serial, vec![(0, 1)]);
        assert!(collect_pruned(&grid, &pool).is_empty());

        grid.refresh_snapshots(&spheres);
        assert_eq!(collect_pruned(&grid, &pool), vec![(0, 1)]);
    }

    #[test]
    fn test_sweep_within_stops_early() {
        let entries: Vec<BucketEntry> = (0..10)
            .map(|i| BucketEntry {
                id: i,
                x: i as f32,
                radius: 0.3,
            })
            .collect();
        let calls = Mutex::new(Vec::new());
        sweep_within(&entries, 0.3, &|a, b| calls.lock().push((a, b)));
        assert!(calls.into_inner().is_empty());

        let touching: Vec<BucketEntry> = (0..4)
            .map(|i| BucketEntry {
                id: i,
                x: i as f32 * 0.5,
                radius: 0.3,
            })
            .collect();
        let calls = Mutex::new(Vec::new());
        sweep_within(&touching, 0.3, &|a, b| calls.lock().push((a, b)));
        assert_eq!(calls.into_inner(), vec![(0, 1), (1, 2), (2, 3)]);
    }
}
