//! Instance data structures for GPU upload.

use bytemuck::{Pod, Zeroable};
use hailstorm_physics::{EntityIndex, Sphere};

/// Per-sphere data consumed by an instanced sphere shader.
///
/// Two `vec4` attributes, 32 bytes, no padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Pod, Zeroable)]
pub struct SphereInstance {
    /// World position (x, y, z) + radius in w.
    pub position_radius: [f32; 4],
    /// RGB color + alpha in w.
    pub color: [f32; 4],
}

impl SphereInstance {
    /// Size in bytes.
    pub const SIZE: usize = std::mem::size_of::<Self>();

    /// Instance for one sphere.
    #[inline]
    #[must_use]
    pub fn from_sphere(sphere: &Sphere) -> Self {
        let p = sphere.position();
        let c = sphere.color();
        Self {
            position_radius: [p.x, p.y, p.z, sphere.radius()],
            color: [c.x, c.y, c.z, 1.0],
        }
    }
}

/// Refills `out` with instances for `spheres`, or only for the indices in
/// `visible` if given.
///
/// `out` keeps its capacity between frames.
///
/// # Panics
///
/// Panics if `visible` holds an index outside `spheres`.
pub fn pack_instances(spheres: &[Sphere], visible: Option<&[EntityIndex]>, out: &mut Vec<SphereInstance>) {
    out.clear();
    match visible {
        Some(indices) => out.extend(
            indices
                .iter()
                .map(|&i| SphereInstance::from_sphere(&spheres[i as usize])),
        ),
        None => out.extend(spheres.iter().map(SphereInstance::from_sphere)),
    }
}

/// Raw bytes of an instance buffer, ready for upload.
#[must_use]
pub fn as_bytes(instances: &[SphereInstance]) -> &[u8] {
    bytemuck::cast_slice(instances)
}
