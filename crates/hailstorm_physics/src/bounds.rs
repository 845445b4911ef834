//! # Bounding Box
//!
//! The axis-aligned cage every sphere lives in.

use crate::sphere::Sphere;
use hailstorm_shared::Vec3;

/// Axis-aligned box with `min < max` on every axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    min: Vec3,
    max: Vec3,
}

impl BoundingBox {
    /// Creates a box.
    ///
    /// # Panics
    ///
    /// Panics if `min` is not strictly below `max` on every axis.
    #[must_use]
    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self::try_new(min, max).unwrap_or_else(|| panic!("degenerate box {min:?}..{max:?}"))
    }

    /// Creates a box, or `None` if `min` is not strictly below `max` on
    /// every axis.
    #[must_use]
    pub fn try_new(min: Vec3, max: Vec3) -> Option<Self> {
        (min.is_finite() && max.is_finite() && min.all_lt(max)).then_some(Self { min, max })
    }

    /// Minimum corner.
    #[inline]
    #[must_use]
    pub fn min(&self) -> Vec3 {
        self.min
    }

    /// Maximum corner.
    #[inline]
    #[must_use]
    pub fn max(&self) -> Vec3 {
        self.max
    }

    /// Edge lengths.
    #[inline]
    #[must_use]
    pub fn extent(&self) -> Vec3 {
        self.max - self.min
    }

    /// Center point.
    #[inline]
    #[must_use]
    pub fn center(&self) -> Vec3 {
        (self.min + self.max) * 0.5
    }

    /// Keeps `sphere` inside the box.
    ///
    /// Each axis is handled on its own: a center outside
    /// `[min + r, max − r]` is clamped onto that bound and the axis velocity
    /// is reflected and scaled by `restitution`.
    ///
    /// Returns true if any axis was clamped.
    pub fn resolve_collision(&self, sphere: &mut Sphere, restitution: f32) -> bool {
        let radius = sphere.radius();
        let mut position = sphere.position();
        let mut velocity = sphere.velocity();
        let mut hit = false;

        for axis in 0..3 {
            let lo = self.min[axis] + radius;
            let hi = self.max[axis] - radius;
            if position[axis] < lo {
                position[axis] = lo;
                velocity[axis] = -velocity[axis] * restitution;
                hit = true;
            } else if position[axis] > hi {
                position[axis] = hi;
                velocity[axis] = -velocity[axis] * restitution;
                hit = true;
            }
        }

        if hit {
            sphere.set_position(position);
            sphere.set_velocity(velocity);
        }
        hit
    }
}

/// Returns true if a sphere at `position` touches or crosses a face of the
/// box `[min, max]`.
#[inline]
pub(crate) fn touches_wall(min: Vec3, max: Vec3, position: Vec3, radius: f32) -> bool {
    (0..3).any(|axis| position[axis] - radius <= min[axis] || position[axis] + radius >= max[axis])
}
