//! Frustum culling for the sphere population.
//!
//! Extracts frustum planes from the view-projection matrix and tests each
//! sphere's bounding sphere against them, in parallel on the simulation's
//! worker pool.

use hailstorm_core::ThreadPool;
use hailstorm_physics::{EntityIndex, Sphere};
use hailstorm_shared::constants::CULL_GRAIN;
use hailstorm_shared::{Mat4, Vec3};
use parking_lot::Mutex;

/// Extra margin so spheres exactly tangent to a plane stay visible.
const PLANE_EPSILON: f32 = 1e-4;

/// A plane `normal · p + d = 0`, normal pointing into the frustum.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Plane {
    /// Unit normal.
    pub normal: Vec3,
    /// Offset from the origin.
    pub d: f32,
}

impl Plane {
    /// Creates a plane from raw coefficients `(a, b, c, d)`.
    #[must_use]
    pub const fn new(a: f32, b: f32, c: f32, d: f32) -> Self {
        Self {
            normal: Vec3::new(a, b, c),
            d,
        }
    }

    /// Scales the coefficients so the normal has unit length.
    #[must_use]
    pub fn normalized(self) -> Self {
        let len = self.normal.length();
        if len > 0.0 {
            Self {
                normal: self.normal / len,
                d: self.d / len,
            }
        } else {
            self
        }
    }

    /// Signed distance from `point`; positive on the inside.
    #[inline]
    #[must_use]
    pub fn distance(&self, point: Vec3) -> f32 {
        self.normal.dot(point) + self.d
    }
}

/// View frustum for culling.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Frustum {
    /// Left, right, bottom, top, near, far planes.
    pub planes: [Plane; 6],
}

impl Frustum {
    /// Left plane index.
    pub const LEFT: usize = 0;
    /// Right plane index.
    pub const RIGHT: usize = 1;
    /// Bottom plane index.
    pub const BOTTOM: usize = 2;
    /// Top plane index.
    pub const TOP: usize = 3;
    /// Near plane index.
    pub const NEAR: usize = 4;
    /// Far plane index.
    pub const FAR: usize = 5;

    /// Extracts the six planes of a column-major view-projection matrix.
    #[must_use]
    pub fn from_view_projection(view_projection: &Mat4) -> Self {
        let m = &view_projection.cols;
        // Row `r` of the matrix, read across the columns.
        let row = |r: usize| [m[0][r], m[1][r], m[2][r], m[3][r]];
        let combine = |a: [f32; 4], b: [f32; 4], sign: f32| {
            Plane::new(
                a[0] + sign * b[0],
                a[1] + sign * b[1],
                a[2] + sign * b[2],
                a[3] + sign * b[3],
            )
            .normalized()
        };

        let w = row(3);
        let mut planes = [Plane::default(); 6];
        planes[Self::LEFT] = combine(w, row(0), 1.0);
        planes[Self::RIGHT] = combine(w, row(0), -1.0);
        planes[Self::BOTTOM] = combine(w, row(1), 1.0);
        planes[Self::TOP] = combine(w, row(1), -1.0);
        planes[Self::NEAR] = combine(w, row(2), 1.0);
        planes[Self::FAR] = combine(w, row(2), -1.0);
        Self { planes }
    }

    /// Returns false only if the sphere lies entirely outside some plane.
    #[inline]
    #[must_use]
    pub fn sphere_visible(&self, center: Vec3, radius: f32) -> bool {
        let limit = -(radius + PLANE_EPSILON);
        self.planes.iter().all(|p| p.distance(center) >= limit)
    }
}

/// Computes the visible subset of the population each frame.
///
/// Chunks write into their own buffers, which are kept between frames and
/// concatenated in chunk order, so the result is ascending.
#[derive(Debug, Default)]
pub struct VisibilityCuller {
    chunks: Vec<Mutex<Vec<EntityIndex>>>,
    visible: Vec<EntityIndex>,
}

impl VisibilityCuller {
    /// Creates an empty culler.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Indices of the spheres inside `frustum`, in ascending order.
    pub fn cull(&mut self, pool: &ThreadPool, spheres: &[Sphere], frustum: &Frustum) -> &[EntityIndex] {
        self.visible.clear();
        if spheres.is_empty() {
            return &self.visible;
        }

        let chunk_count = pool.chunk_count(spheres.len(), CULL_GRAIN);
        if self.chunks.len() < chunk_count {
            self.chunks.resize_with(chunk_count, Mutex::default);
        }

        let chunks = &self.chunks;
        pool.parallel_for(0, spheres.len(), CULL_GRAIN, |start, end, k| {
            let mut out = chunks[k].lock();
            out.clear();
            for (i, sphere) in spheres[start..end].iter().enumerate() {
                if frustum.sphere_visible(sphere.position(), sphere.radius()) {
                    out.push((start + i) as EntityIndex);
                }
            }
        });

        for chunk in &self.chunks[..chunk_count] {
            self.visible.extend_from_slice(&chunk.lock());
        }
        &self.visible
    }

    /// Result of the last [`VisibilityCuller::cull`].
    #[inline]
    #[must_use]
    pub fn visible(&self) -> &[EntityIndex] {
        &self.visible
    }
}
