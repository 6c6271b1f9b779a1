use std::f32::consts::{PI, TAU};

use glam::{Quat, Vec3};

use crate::geometry::TriMesh;

/// Renderable geometry: triangle soup plus per-vertex normals and colours.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub geometry: TriMesh,
    pub normals: Vec<Vec3>,
    pub colors: Vec<[f32; 4]>,
}

impl MeshData {
    pub fn vertex_count(&self) -> usize {
        self.geometry.positions.len()
    }

    pub fn index_count(&self) -> usize {
        self.geometry.triangles.len() * 3
    }

    pub fn with_color(mut self, color: [f32; 4]) -> Self {
        self.colors = vec![color; self.vertex_count()];
        self
    }

    /// Recolours each vertex from its position.
    pub fn with_vertex_colors(mut self, color_at: impl Fn(Vec3) -> [f32; 4]) -> Self {
        self.colors = self.geometry.positions.iter().map(|p| color_at(*p)).collect();
        self
    }

    pub fn rotated(mut self, rotation: Quat) -> Self {
        for position in &mut self.geometry.positions {
            *position = rotation * *position;
        }
        for normal in &mut self.normals {
            *normal = rotation * *normal;
        }
        self
    }

    /// Reverses winding and normals, for geometry viewed from the inside.
    pub fn flipped(mut self) -> Self {
        for triangle in &mut self.geometry.triangles {
            triangle.swap(1, 2);
        }
        for normal in &mut self.normals {
            *normal = -*normal;
        }
        self
    }

    fn from_parts(positions: Vec<Vec3>, normals: Vec<Vec3>, triangles: Vec<[u32; 3]>) -> Self {
        let colors = vec![[1.0; 4]; positions.len()];
        Self {
            geometry: TriMesh {
                positions,
                triangles,
            },
            normals,
            colors,
        }
    }
}

/// Flat disc in the XY plane facing +Z.
pub fn disc(radius: f32, segments: u32) -> MeshData {
    let segments = segments.max(3);
    let mut positions = vec![Vec3::ZERO];
    for i in 0..=segments {
        let angle = TAU * i as f32 / segments as f32;
        positions.push(Vec3::new(angle.cos() * radius, angle.sin() * radius, 0.0));
    }
    let normals = vec![Vec3::Z; positions.len()];
    let triangles = (1..=segments).map(|i| [0, i, i + 1]).collect();
    MeshData::from_parts(positions, normals, triangles)
}

/// Flat annulus in the XY plane facing +Z.
pub fn ring(inner_radius: f32, outer_radius: f32, segments: u32) -> MeshData {
    let segments = segments.max(3);
    let mut positions = Vec::with_capacity(((segments + 1) * 2) as usize);
    for i in 0..=segments {
        let angle = TAU * i as f32 / segments as f32;
        let dir = Vec3::new(angle.cos(), angle.sin(), 0.0);
        positions.push(dir * inner_radius);
        positions.push(dir * outer_radius);
    }
    let normals = vec![Vec3::Z; positions.len()];
    let triangles = (0..segments)
        .flat_map(|i| {
            let inner = i * 2;
            let outer = inner + 1;
            let next_inner = inner + 2;
            let next_outer = inner + 3;
            [[inner, outer, next_outer], [inner, next_outer, next_inner]]
        })
        .collect();
    MeshData::from_parts(positions, normals, triangles)
}

pub fn uv_sphere(radius: f32, stacks: u32, slices: u32) -> MeshData {
    let stacks = stacks.max(2);
    let slices = slices.max(3);
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    for stack in 0..=stacks {
        let phi = PI * stack as f32 / stacks as f32;
        for slice in 0..=slices {
            let theta = TAU * slice as f32 / slices as f32;
            let normal = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
            positions.push(normal * radius);
            normals.push(normal);
        }
    }

    let row = slices + 1;
    let mut triangles = Vec::new();
    for stack in 0..stacks {
        for slice in 0..slices {
            let a = stack * row + slice;
            let b = a + row;
            triangles.push([a, a + 1, b]);
            triangles.push([a + 1, b + 1, b]);
        }
    }
    MeshData::from_parts(positions, normals, triangles)
}

/// Torus around the Z axis, lying in the XY plane.
pub fn torus(
    major_radius: f32,
    minor_radius: f32,
    major_segments: u32,
    minor_segments: u32,
) -> MeshData {
    let major_segments = major_segments.max(3);
    let minor_segments = minor_segments.max(3);
    let mut positions = Vec::new();
    let mut normals = Vec::new();
    for i in 0..=major_segments {
        let u = TAU * i as f32 / major_segments as f32;
        let ring_center = Vec3::new(u.cos(), u.sin(), 0.0) * major_radius;
        for j in 0..=minor_segments {
            let v = TAU * j as f32 / minor_segments as f32;
            let normal = Vec3::new(u.cos() * v.cos(), u.sin() * v.cos(), v.sin());
            positions.push(ring_center + normal * minor_radius);
            normals.push(normal);
        }
    }

    let row = minor_segments + 1;
    let mut triangles = Vec::new();
    for i in 0..major_segments {
        for j in 0..minor_segments {
            let a = i * row + j;
            let b = a + row;
            triangles.push([a, b, a + 1]);
            triangles.push([b, b + 1, a + 1]);
        }
    }
    MeshData::from_parts(positions, normals, triangles)
}

/// Box with flat-shaded faces.
pub fn cuboid(half_extents: Vec3) -> MeshData {
    let h = half_extents.abs();
    let faces = [
        (Vec3::X, Vec3::Y, Vec3::Z),
        (Vec3::NEG_X, Vec3::Y, Vec3::NEG_Z),
        (Vec3::Y, Vec3::Z, Vec3::X),
        (Vec3::NEG_Y, Vec3::NEG_Z, Vec3::X),
        (Vec3::Z, Vec3::Y, Vec3::NEG_X),
        (Vec3::NEG_Z, Vec3::Y, Vec3::X),
    ];
    let mut positions = Vec::with_capacity(24);
    let mut normals = Vec::with_capacity(24);
    let mut triangles = Vec::with_capacity(12);
    for (normal, up, side) in faces {
        let base = positions.len() as u32;
        for (s, u) in [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)] {
            let corner = normal + side * s + up * u;
            positions.push(corner * h);
            normals.push(normal);
        }
        let facing = (side.cross(up)).dot(normal);
        if facing >= 0.0 {
            triangles.push([base, base + 1, base + 2]);
            triangles.push([base, base + 2, base + 3]);
        } else {
            triangles.push([base, base + 2, base + 1]);
            triangles.push([base, base + 3, base + 2]);
        }
    }
    MeshData::from_parts(positions, normals, triangles)
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};

    use super::{cuboid, disc, ring, torus, uv_sphere};

    #[test]
    fn primitive_indices_stay_in_bounds() {
        for mesh in [
            disc(1.3, 32),
            ring(0.15, 0.2, 32),
            uv_sphere(1.0, 8, 12),
            torus(1.0, 0.1, 24, 8),
            cuboid(Vec3::new(0.5, 1.0, 0.25)),
        ] {
            let count = mesh.vertex_count() as u32;
            assert!(mesh.geometry.triangles.iter().flatten().all(|index| *index < count));
            assert_eq!(mesh.normals.len(), mesh.vertex_count());
            assert_eq!(mesh.colors.len(), mesh.vertex_count());
        }
    }

    #[test]
    fn cuboid_faces_wind_outward() {
        let mesh = cuboid(Vec3::ONE);
        for (index, triangle) in mesh.geometry.triangles.iter().enumerate() {
            let [a, b, c] = triangle.map(|i| mesh.geometry.positions[i as usize]);
            let face_normal = (b - a).cross(c - a);
            let expected = mesh.normals[triangle[0] as usize];
            assert!(face_normal.dot(expected) > 0.0, "triangle {index} winds inward");
        }
    }

    #[test]
    fn reticle_ring_lies_flat_after_rotation() {
        let reticle = ring(0.15, 0.2, 32)
            .rotated(Quat::from_rotation_x(-std::f32::consts::FRAC_PI_2));
        assert!(reticle.geometry.positions.iter().all(|p| p.y.abs() < 1.0e-5));
        assert!(reticle.normals.iter().all(|n| n.abs_diff_eq(Vec3::Y, 1.0e-5)));
    }

    #[test]
    fn disc_radius_is_respected() {
        let mesh = disc(1.3, 32);
        let max = mesh
            .geometry
            .positions
            .iter()
            .map(|p| p.length())
            .fold(0.0_f32, f32::max);
        assert!((max - 1.3).abs() < 1.0e-5);
    }
}
