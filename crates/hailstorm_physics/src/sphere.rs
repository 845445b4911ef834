//! # Sphere Entity
//!
//! A dynamic sphere and the two rules that move it: gravity integration and
//! pairwise contact resolution.

use hailstorm_shared::constants::{
    CORRECTION_PERCENT, CORRECTION_SLOP, FRICTION_COEFFICIENT, MIN_DISTANCE_SQUARED,
    MIN_TANGENT_SPEED_SQUARED,
};
use hailstorm_shared::Vec3;

/// A simulated sphere.
///
/// Mass is derived from the radius (`r³`, unit density) and kept in sync by
/// [`Sphere::set_radius`]; fields are private so the two cannot drift apart.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sphere {
    position: Vec3,
    velocity: Vec3,
    radius: f32,
    mass: f32,
    color: Vec3,
}

impl Default for Sphere {
    fn default() -> Self {
        Self::new(Vec3::ZERO, 1.0, Vec3::ONE)
    }
}

impl Sphere {
    /// Creates a sphere at rest.
    #[must_use]
    pub fn new(position: Vec3, radius: f32, color: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            radius,
            mass: radius * radius * radius,
            color,
        }
    }

    /// Builder-style initial velocity.
    #[must_use]
    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }

    /// Center position.
    #[inline]
    #[must_use]
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Linear velocity.
    #[inline]
    #[must_use]
    pub fn velocity(&self) -> Vec3 {
        self.velocity
    }

    /// Radius.
    #[inline]
    #[must_use]
    pub fn radius(&self) -> f32 {
        self.radius
    }

    /// Mass (`radius³`).
    #[inline]
    #[must_use]
    pub fn mass(&self) -> f32 {
        self.mass
    }

    /// Inverse mass.
    #[inline]
    #[must_use]
    pub fn inverse_mass(&self) -> f32 {
        1.0 / self.mass
    }

    /// Display color, each channel in `[0, 1]`.
    #[inline]
    #[must_use]
    pub fn color(&self) -> Vec3 {
        self.color
    }

    /// Moves the sphere.
    #[inline]
    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    /// Replaces the velocity.
    #[inline]
    pub fn set_velocity(&mut self, velocity: Vec3) {
        self.velocity = velocity;
    }

    /// Changes the radius and recomputes the mass.
    pub fn set_radius(&mut self, radius: f32) {
        self.radius = radius;
        self.mass = radius * radius * radius;
    }

    /// Semi-implicit Euler step: velocity first, then position with the
    /// new velocity.
    #[inline]
    pub fn apply_gravity(&mut self, gravity: Vec3, dt: f32) {
        self.velocity += gravity * dt;
        self.position += self.velocity * dt;
    }

    /// Resolves contact between `self` and `other`.
    ///
    /// Does nothing if the spheres do not overlap. Otherwise:
    ///
    /// 1. pushes them apart along the contact normal by
    ///    `0.8 · max(penetration − 0.001, 0)`, split by inverse mass;
    /// 2. if they are approaching, applies a normal impulse with the given
    ///    restitution;
    /// 3. applies a small tangential friction impulse, clamped to
    ///    `μ · |normal impulse|`.
    ///
    /// Returns true if the spheres were overlapping.
    pub fn collide(&mut self, other: &mut Sphere, restitution: f32) -> bool {
        let delta = self.position - other.position;
        let dist_sq = delta.length_squared();
        let radius_sum = self.radius + other.radius;
        if dist_sq >= radius_sum * radius_sum {
            return false;
        }

        let dist = dist_sq.max(MIN_DISTANCE_SQUARED).sqrt();
        let normal = if dist_sq > MIN_DISTANCE_SQUARED {
            delta / dist
        } else {
            Vec3::X
        };

        let inv_a = self.inverse_mass();
        let inv_b = other.inverse_mass();
        let inv_sum = inv_a + inv_b;

        let penetration = radius_sum - dist;
        let depth = (penetration - CORRECTION_SLOP).max(0.0);
        let correction = normal * (depth / inv_sum * CORRECTION_PERCENT);
        self.position += correction * inv_a;
        other.position -= correction * inv_b;

        let relative = self.velocity - other.velocity;
        let normal_speed = relative.dot(normal);
        if normal_speed > 0.0 {
            return true;
        }

        let j = -(1.0 + restitution) * normal_speed / inv_sum;
        let impulse = normal * j;
        self.velocity += impulse * inv_a;
        other.velocity -= impulse * inv_b;

        let relative = self.velocity - other.velocity;
        let tangential = relative - normal * relative.dot(normal);
        let tangential_sq = tangential.length_squared();
        if tangential_sq > MIN_TANGENT_SPEED_SQUARED {
            let tangent = tangential / tangential_sq.sqrt();
            let limit = FRICTION_COEFFICIENT * j.abs();
            let jt = (-relative.dot(tangent) / inv_sum).max(-limit).min(limit);
            let friction = tangent * jt;
            self.velocity += friction * inv_a;
            other.velocity -= friction * inv_b;
        }

        true
    }
}
