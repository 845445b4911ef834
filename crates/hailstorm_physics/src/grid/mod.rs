//! # Uniform Grid Broadphase
//!
//! A fixed lattice of cubic cells over the cage. Each frame the grid is
//! cleared and refilled; entities that share a cell or sit in adjacent
//! cells become candidate pairs.
//!
//! ## Storage
//!
//! ```text
//! lut:      [cell] -> bucket index      (SparseTable, sentinel u32::MAX)
//! buckets:  pool of Vec<BucketEntry>    (reused across frames)
//! active:   lut.touched()               (occupied cells, first-insert order)
//! ```
//!
//! Clearing walks only the cells touched last frame, so a mostly empty
//! lattice with millions of cells resets in time proportional to the
//! occupied count. Bucket vectors keep their capacity, so a warm frame
//! allocates nothing.
//!
//! ## Enumeration
//!
//! Pairs are produced from intra-cell combinations plus the 13-cell
//! forward half of the 26-neighborhood, which yields every unordered pair
//! of adjacent-cell entities exactly once:
//!
//! - [`UniformGrid::for_each_potential_pair`]: serial baseline
//! - [`UniformGrid::for_each_potential_pair_parallel`]: active cells split
//!   across the pool
//! - [`UniformGrid::for_each_potential_pair_pruned`]: parallel, with a
//!   sort-and-sweep along X that skips pairs too far apart to touch

mod pairs;
mod sweep;

use crate::bounds::touches_wall;
use crate::sphere::Sphere;
use crate::EntityIndex;
use hailstorm_core::SparseTable;
use hailstorm_shared::Vec3;

/// LUT sentinel for "no bucket".
const NO_BUCKET: u32 = u32::MAX;

/// Cell sizes at or below this fall back to [`FALLBACK_CELL_SIZE`].
const MIN_CELL_SIZE: f32 = 1e-6;

/// Cell size used when the requested one is unusable.
const FALLBACK_CELL_SIZE: f32 = 1.0;

/// Capacity given to a bucket the first time it is claimed.
const BUCKET_INITIAL_CAPACITY: usize = 8;

/// Minimum reserved capacity of the near-wall list.
const MIN_NEAR_WALL_CAPACITY: usize = 32;

/// Forward half-neighborhood: `dx ∈ {0,1}`, `dy,dz ∈ {-1,0,1}`, minus the
/// cell itself and every offset whose mirror is already listed.
const FORWARD_NEIGHBORS: [[i64; 3]; 13] = [
    [0, 0, 1],
    [0, 1, -1],
    [0, 1, 0],
    [0, 1, 1],
    [1, -1, -1],
    [1, -1, 0],
    [1, -1, 1],
    [1, 0, -1],
    [1, 0, 0],
    [1, 0, 1],
    [1, 1, -1],
    [1, 1, 0],
    [1, 1, 1],
];

/// One occupant of a cell.
///
/// X and radius are captured at insertion so the pruned sweep can work from
/// a consistent snapshot while the narrowphase moves the spheres. Between
/// solver passes [`UniformGrid::refresh_snapshots`] brings them up to date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketEntry {
    /// Entity index.
    pub id: EntityIndex,
    /// Center X at insertion or last refresh.
    pub x: f32,
    /// Radius at insertion or last refresh.
    pub radius: f32,
}

/// Uniform-grid broadphase with sparse per-frame reset.
#[derive(Debug, Clone)]
pub struct UniformGrid {
    min: Vec3,
    max: Vec3,
    cell_size: f32,
    inv_cell_size: f32,
    dims: [usize; 3],
    lut: SparseTable<u32>,
    buckets: Vec<Vec<BucketEntry>>,
    used_buckets: usize,
    near_wall: Vec<EntityIndex>,
    inserted: usize,
}

impl UniformGrid {
    /// Creates a grid covering `[min, max]` with cubic cells of edge
    /// `cell_size`.
    #[must_use]
    pub fn new(min: Vec3, max: Vec3, cell_size: f32) -> Self {
        let mut grid = Self {
            min,
            max,
            cell_size: FALLBACK_CELL_SIZE,
            inv_cell_size: 1.0 / FALLBACK_CELL_SIZE,
            dims: [1; 3],
            lut: SparseTable::new(0, NO_BUCKET),
            buckets: Vec::new(),
            used_buckets: 0,
            near_wall: Vec::new(),
            inserted: 0,
        };
        grid.resize(min, max, cell_size);
        grid
    }

    /// Rebuilds the lattice for new bounds or cell size.
    ///
    /// Full cost, O(cells). Meant for startup and configuration changes,
    /// not per frame.
    pub fn resize(&mut self, min: Vec3, max: Vec3, cell_size: f32) {
        let cell_size = if cell_size.is_finite() && cell_size > MIN_CELL_SIZE {
            cell_size
        } else {
            FALLBACK_CELL_SIZE
        };
        let extent = (max - min).max(Vec3::ZERO);

        self.min = min;
        self.max = max;
        self.cell_size = cell_size;
        self.inv_cell_size = 1.0 / cell_size;
        self.dims = [0, 1, 2].map(|axis| ((extent[axis] / cell_size).ceil() as usize).max(1));
        self.lut.resize(self.cell_count());
        self.used_buckets = 0;
        self.near_wall.clear();
        self.inserted = 0;

        tracing::debug!(
            dims = ?self.dims,
            cells = self.cell_count(),
            cell_size,
            "grid resized"
        );
    }

    /// Empties the grid for a new frame.
    ///
    /// Resets only the cells occupied since the last clear, then makes sure
    /// the pooled storage can take `expected` inserts without growing.
    /// Calling it twice in a row is equivalent to calling it once.
    pub fn clear(&mut self, expected: usize) {
        self.lut.reset();
        self.near_wall.clear();
        self.used_buckets = 0;
        self.inserted = 0;

        if expected == 0 {
            return;
        }
        let cells = expected.min(self.cell_count());
        if self.buckets.len() < cells {
            self.buckets.resize_with(cells, Vec::new);
        }
        self.lut.reserve_touched(cells);
        self.near_wall.reserve((expected / 8).max(MIN_NEAR_WALL_CAPACITY));
    }

    /// Adds an entity to the cell containing `position`.
    ///
    /// Positions outside the lattice are clamped into the border cells.
    /// Entities whose sphere touches the grid bounds are also recorded in
    /// [`UniformGrid::near_wall`].
    pub fn insert(&mut self, id: EntityIndex, position: Vec3, radius: f32) {
        let cell = self.cell_index(self.cell_of(position));

        let bucket = match self.lut.occupied(cell) {
            Some(bucket) => bucket as usize,
            None => {
                let bucket = self.claim_bucket();
                self.lut.set(cell, bucket as u32);
                bucket
            }
        };
        self.buckets[bucket].push(BucketEntry {
            id,
            x: position.x,
            radius,
        });
        self.inserted += 1;

        if touches_wall(self.min, self.max, position, radius) {
            self.near_wall.push(id);
        }
    }

    /// Re-reads X and radius of every occupant from `spheres`.
    ///
    /// Cell membership is unchanged. Run between solver passes so the
    /// pruned sweep filters on where the spheres are now, not where they
    /// were inserted.
    ///
    /// # Panics
    ///
    /// Panics if an occupant's index is outside `spheres`.
    pub fn refresh_snapshots(&mut self, spheres: &[Sphere]) {
        for bucket in &mut self.buckets[..self.used_buckets] {
            for entry in bucket.iter_mut() {
                let sphere = &spheres[entry.id as usize];
                entry.x = sphere.position().x;
                entry.radius = sphere.radius();
            }
        }
    }

    /// Hands out the next pooled bucket, growing the pool if needed.
    fn claim_bucket(&mut self) -> usize {
        let bucket = self.used_buckets;
        if bucket == self.buckets.len() {
            self.buckets.push(Vec::with_capacity(BUCKET_INITIAL_CAPACITY));
        }
        let storage = &mut self.buckets[bucket];
        storage.clear();
        if storage.capacity() < BUCKET_INITIAL_CAPACITY {
            storage.reserve(BUCKET_INITIAL_CAPACITY);
        }
        self.used_buckets += 1;
        bucket
    }

    /// Cell coordinates of `position`, clamped into the lattice.
    #[must_use]
    pub fn cell_of(&self, position: Vec3) -> [usize; 3] {
        [0, 1, 2].map(|axis| {
            let c = ((position[axis] - self.min[axis]) * self.inv_cell_size).floor();
            // NaN casts to 0, infinities saturate; both end up clamped.
            (c as i64).clamp(0, self.dims[axis] as i64 - 1) as usize
        })
    }

    /// Linear index of a cell: `(z * dy + y) * dx + x`.
    #[inline]
    #[must_use]
    pub fn cell_index(&self, [x, y, z]: [usize; 3]) -> usize {
        (z * self.dims[1] + y) * self.dims[0] + x
    }

    /// Inverse of [`UniformGrid::cell_index`].
    #[inline]
    fn cell_coords(&self, index: usize) -> [usize; 3] {
        let x = index % self.dims[0];
        let rest = index / self.dims[0];
        [x, rest % self.dims[1], rest / self.dims[1]]
    }

    /// Occupants of a cell, if any.
    #[inline]
    fn bucket_at(&self, cell: usize) -> Option<&[BucketEntry]> {
        self.lut
            .occupied(cell)
            .map(|bucket| self.buckets[bucket as usize].as_slice())
    }

    /// Calls `f` with the bucket of every occupied forward neighbor of
    /// `cell`.
    fn for_each_forward_bucket(&self, cell: usize, mut f: impl FnMut(&[BucketEntry])) {
        let [cx, cy, cz] = self.cell_coords(cell);
        let dims = self.dims;
        for [dx, dy, dz] in FORWARD_NEIGHBORS {
            let nx = cx as i64 + dx;
            let ny = cy as i64 + dy;
            let nz = cz as i64 + dz;
            if nx >= dims[0] as i64 || ny < 0 || ny >= dims[1] as i64 || nz < 0 || nz >= dims[2] as i64 {
                continue;
            }
            let neighbor = self.cell_index([nx as usize, ny as usize, nz as usize]);
            if let Some(bucket) = self.bucket_at(neighbor) {
                f(bucket);
            }
        }
    }

    /// Number of entities in the cell with linear index `cell`.
    #[must_use]
    pub fn bucket_len(&self, cell: usize) -> usize {
        self.bucket_at(cell).map_or(0, <[BucketEntry]>::len)
    }

    /// Occupants of the cell with linear index `cell`.
    #[must_use]
    pub fn bucket(&self, cell: usize) -> &[BucketEntry] {
        self.bucket_at(cell).unwrap_or(&[])
    }

    /// Occupied cells in first-insert order.
    #[inline]
    #[must_use]
    pub fn active_cells(&self) -> &[usize] {
        self.lut.touched()
    }

    /// Entities classified as touching the grid bounds this frame.
    #[inline]
    #[must_use]
    pub fn near_wall(&self) -> &[EntityIndex] {
        &self.near_wall
    }

    /// Cells per axis.
    #[inline]
    #[must_use]
    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    /// Total number of cells.
    #[inline]
    #[must_use]
    pub fn cell_count(&self) -> usize {
        self.dims.iter().product()
    }

    /// Effective cell edge length.
    #[inline]
    #[must_use]
    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    /// Entities inserted since the last clear.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.inserted
    }

    /// Returns true if nothing has been inserted since the last clear.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inserted == 0
    }

    /// Buckets currently held by the pool, claimed or not.
    #[inline]
    #[must_use]
    pub fn pooled_buckets(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid() -> UniformGrid {
        UniformGrid::new(Vec3::splat(-4.0), Vec3::splat(4.0), 1.0)
    }

    #[test]
    fn test_dims_round_up() {
        let g = UniformGrid::new(Vec3::ZERO, Vec3::new(10.0, 2.5, 0.1), 1.0);
        assert_eq!(g.dims(), [10, 3, 1]);
        assert_eq!(g.cell_count(), 30);
    }

    #[test]
    fn test_bad_cell_size_falls_back() {
        let g = UniformGrid::new(Vec3::ZERO, Vec3::splat(4.0), 0.0);
        assert_eq!(g.cell_size(), 1.0);
        assert_eq!(g.dims(), [4, 4, 4]);
    }

    #[test]
    fn test_insert_clamps_out_of_range() {
        let mut g = grid();
        g.insert(0, Vec3::splat(-100.0), 0.25);
        g.insert(1, Vec3::splat(100.0), 0.25);
        g.insert(2, Vec3::new(f32::NAN, 0.0, 0.0), 0.25);

        assert_eq!(g.cell_of(Vec3::splat(-100.0)), [0, 0, 0]);
        assert_eq!(g.cell_of(Vec3::splat(100.0)), [7, 7, 7]);
        assert_eq!(g.len(), 3);
        assert_eq!(g.near_wall(), &[0, 1]);
    }

    #[test]
    fn test_cell_index_round_trip() {
        let g = UniformGrid::new(Vec3::ZERO, Vec3::new(5.0, 3.0, 2.0), 1.0);
        for index in 0..g.cell_count() {
            assert_eq!(g.cell_index(g.cell_coords(index)), index);
        }
    }

    #[test]
    fn test_clear_empties_every_bucket() {
        let mut g = grid();
        for i in 0..50u32 {
            let t = i as f32 * 0.15 - 3.5;
            g.insert(i, Vec3::new(t, -t, t * 0.5), 0.1);
        }
        assert!(!g.active_cells().is_empty());
        let touched: Vec<usize> = g.active_cells().to_vec();

        g.clear(50);
        assert!(g.is_empty());
        assert!(g.active_cells().is_empty());
        assert!(g.near_wall().is_empty());
        assert!(touched.iter().all(|&c| g.bucket_len(c) == 0));
        assert!((0..g.cell_count()).all(|c| g.bucket_len(c) == 0));

        // Idempotent.
        g.clear(50);
        assert!(g.is_empty());
        assert!(g.active_cells().is_empty());
    }

    #[test]
    fn test_reused_bucket_starts_empty() {
        let mut g = grid();
        g.insert(0, Vec3::new(0.5, 0.5, 0.5), 0.1);
        g.insert(1, Vec3::new(0.6, 0.5, 0.5), 0.1);
        g.clear(2);

        g.insert(7, Vec3::new(-3.5, -3.5, -3.5), 0.1);
        let cell = g.active_cells()[0];
        assert_eq!(g.bucket(cell).len(), 1);
        assert_eq!(g.bucket(cell)[0].id, 7);
    }

    #[test]
    fn test_warm_clear_keeps_pool() {
        let mut g = grid();
        g.clear(100);
        let pooled = g.pooled_buckets();
        assert!(pooled >= 100);

        for i in 0..100u32 {
            g.insert(i, Vec3::new(i as f32 * 0.07 - 3.5, 0.0, 0.0), 0.01);
        }
        g.clear(100);
        assert_eq!(g.pooled_buckets(), pooled);
    }

    #[test]
    fn test_refresh_snapshots_follows_spheres() {
        let mut spheres = vec![
            Sphere::new(Vec3::new(0.3, 0.0, 0.0), 0.25, Vec3::ONE),
            Sphere::new(Vec3::new(1.5, 0.0, 0.0), 0.25, Vec3::ONE),
        ];
        let mut g = grid();
        g.clear(spheres.len());
        for (i, s) in spheres.iter().enumerate() {
            g.insert(i as EntityIndex, s.position(), s.radius());
        }
        let home = g.active_cells()[0];

        spheres[0].set_position(Vec3::new(0.4, 0.0, 0.0));
        spheres[1].set_radius(0.5);
        g.refresh_snapshots(&spheres);

        let entry = g.bucket(home)[0];
        assert_eq!((entry.id, entry.x, entry.radius), (0, 0.4, 0.25));
        let moved = g.active_cells().iter().flat_map(|&c| g.bucket(c)).find(|e| e.id == 1);
        assert_eq!(moved.map(|e| e.radius), Some(0.5));
        // Membership is untouched.
        assert_eq!(g.len(), 2);
        assert_eq!(g.bucket(home).len(), 1);
    }

    #[test]
    fn test_active_cells_in_first_insert_order() {
        let mut g = grid();
        g.insert(0, Vec3::new(3.5, 3.5, 3.5), 0.1);
        g.insert(1, Vec3::new(-3.5, -3.5, -3.5), 0.1);
        g.insert(2, Vec3::new(3.6, 3.6, 3.6), 0.1);

        let expected = vec![
            g.cell_index(g.cell_of(Vec3::new(3.5, 3.5, 3.5))),
            g.cell_index(g.cell_of(Vec3::new(-3.5, -3.5, -3.5))),
        ];
        assert_eq!(g.active_cells(), expected.as_slice());
        assert_eq!(g.bucket_len(expected[0]), 2);
    }
}
