use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

/// Hits closer together than this along a ray are the same surface point
/// reported by two triangles sharing an edge.
const COINCIDENT_HIT_EPSILON: f32 = 1.0e-5;
const PARALLEL_EPSILON: f32 = 1.0e-8;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Ray {
    pub origin: Vec3,
    pub direction: Vec3,
}

impl Ray {
    pub fn new(origin: Vec3, direction: Vec3) -> Self {
        Self { origin, direction }
    }

    pub fn at(&self, t: f32) -> Vec3 {
        self.origin + self.direction * t
    }

    pub fn transformed(&self, matrix: &Mat4) -> Self {
        Self {
            origin: matrix.transform_point3(self.origin),
            direction: matrix.transform_vector3(self.direction),
        }
    }
}

/// One surface crossing along a ray, in world units from the ray origin.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RayHit {
    pub distance: f32,
    pub point: Vec3,
    /// The ray met the triangle's outward (counter-clockwise) side.
    pub front_facing: bool,
}

/// Decomposed placement: position, orientation, per-axis scale.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub translation: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Transform {
    pub const IDENTITY: Self = Self {
        translation: Vec3::ZERO,
        rotation: Quat::IDENTITY,
        scale: Vec3::ONE,
    };

    pub fn from_translation(translation: Vec3) -> Self {
        Self {
            translation,
            ..Self::IDENTITY
        }
    }

    pub fn from_translation_rotation(translation: Vec3, rotation: Quat) -> Self {
        Self {
            translation,
            rotation,
            scale: Vec3::ONE,
        }
    }

    pub fn from_matrix(matrix: &Mat4) -> Self {
        let (scale, rotation, translation) = matrix.to_scale_rotation_translation();
        Self {
            translation,
            rotation,
            scale,
        }
    }

    pub fn with_uniform_scale(mut self, scale: f32) -> Self {
        self.scale = Vec3::splat(scale);
        self
    }

    pub fn matrix(&self) -> Mat4 {
        Mat4::from_scale_rotation_translation(self.scale, self.rotation, self.translation)
    }
}

/// Indexed triangle soup. Closed meshes act as solids for parity tests.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TriMesh {
    pub positions: Vec<Vec3>,
    pub triangles: Vec<[u32; 3]>,
}

impl TriMesh {
    /// Axis-aligned box around the origin, outward winding, 12 triangles.
    pub fn cuboid(half_extents: Vec3) -> Self {
        let h = half_extents.abs();
        let positions = vec![
            Vec3::new(-h.x, -h.y, -h.z),
            Vec3::new(h.x, -h.y, -h.z),
            Vec3::new(h.x, h.y, -h.z),
            Vec3::new(-h.x, h.y, -h.z),
            Vec3::new(-h.x, -h.y, h.z),
            Vec3::new(h.x, -h.y, h.z),
            Vec3::new(h.x, h.y, h.z),
            Vec3::new(-h.x, h.y, h.z),
        ];
        let triangles = vec![
            // -Z
            [0, 2, 1],
            [0, 3, 2],
            // +Z
            [4, 5, 6],
            [4, 6, 7],
            // -X
            [0, 4, 7],
            [0, 7, 3],
            // +X
            [1, 2, 6],
            [1, 6, 5],
            // -Y
            [0, 1, 5],
            [0, 5, 4],
            // +Y
            [3, 7, 6],
            [3, 6, 2],
        ];
        Self {
            positions,
            triangles,
        }
    }

    pub fn triangle(&self, index: usize) -> Option<[Vec3; 3]> {
        let [a, b, c] = *self.triangles.get(index)?;
        Some([
            *self.positions.get(a as usize)?,
            *self.positions.get(b as usize)?,
            *self.positions.get(c as usize)?,
        ])
    }
}

/// Möller-Trumbore, two-sided. Returns the ray parameter of the hit and
/// whether the triangle faced the ray.
pub fn ray_triangle(ray: &Ray, triangle: &[Vec3; 3]) -> Option<(f32, bool)> {
    let [a, b, c] = *triangle;
    let edge1 = b - a;
    let edge2 = c - a;
    let p = ray.direction.cross(edge2);
    let det = edge1.dot(p);
    if det.abs() < PARALLEL_EPSILON {
        return None;
    }

    let inv_det = 1.0 / det;
    let s = ray.origin - a;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = ray.direction.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge2.dot(q) * inv_det;
    (t > COINCIDENT_HIT_EPSILON).then_some((t, det > 0.0))
}

/// Every surface crossing of `ray` with `mesh` placed at `world`, nearest
/// first. A hit on an edge shared by two triangles facing the same way is
/// reported once; a ray grazing a convex edge keeps both hits (one entering,
/// one leaving) and so does not change parity.
pub fn raycast_mesh(ray: &Ray, mesh: &TriMesh, world: &Mat4) -> Vec<RayHit> {
    let local_ray = ray.transformed(&world.inverse());
    let mut params: Vec<(f32, bool)> = (0..mesh.triangles.len())
        .filter_map(|index| mesh.triangle(index))
        .filter_map(|triangle| ray_triangle(&local_ray, &triangle))
        .collect();
    params.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
    params.dedup_by(|next, kept| {
        next.1 == kept.1 && (next.0 - kept.0).abs() <= COINCIDENT_HIT_EPSILON
    });

    let speed = ray.direction.length();
    params
        .into_iter()
        .map(|(t, front_facing)| RayHit {
            distance: t * speed,
            point: ray.at(t),
            front_facing,
        })
        .collect()
}

/// Parity point-in-solid test: a ray leaving a closed surface crosses it an
/// odd number of times iff its origin is inside.
pub fn is_inside_by_parity(ray: &Ray, mesh: &TriMesh, world: &Mat4) -> bool {
    raycast_mesh(ray, mesh, world).len() % 2 == 1
}

/// Intersection of a ray with an infinite plane, in front of the origin only.
pub fn ray_plane(ray: &Ray, plane_point: Vec3, plane_normal: Vec3) -> Option<f32> {
    let denom = plane_normal.dot(ray.direction);
    if denom.abs() < 1.0e-6 {
        return None;
    }

    let t = (plane_point - ray.origin).dot(plane_normal) / denom;
    (t.is_finite() && t > 1.0e-4).then_some(t)
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Quat, Vec3};

    use super::{is_inside_by_parity, ray_plane, raycast_mesh, Ray, Transform, TriMesh};

    #[test]
    fn ray_through_box_hits_entry_and_exit_once_each() {
        let cube = TriMesh::cuboid(Vec3::splat(1.0));
        let ray = Ray::new(Vec3::new(0.2, 0.3, -5.0), Vec3::Z);

        let hits = raycast_mesh(&ray, &cube, &Mat4::IDENTITY);
        assert_eq!(hits.len(), 2);
        assert!((hits[0].distance - 4.0).abs() < 1.0e-4);
        assert!((hits[1].distance - 6.0).abs() < 1.0e-4);
        assert!(hits[0].front_facing);
        assert!(!hits[1].front_facing);
    }

    #[test]
    fn ray_along_face_diagonal_is_not_double_counted() {
        let cube = TriMesh::cuboid(Vec3::splat(1.0));
        // x == y lies on the split diagonal of the +Z and -Z faces.
        let ray = Ray::new(Vec3::new(0.25, 0.25, 0.0), Vec3::Z);

        assert_eq!(raycast_mesh(&ray, &cube, &Mat4::IDENTITY).len(), 1);
        assert!(is_inside_by_parity(&ray, &cube, &Mat4::IDENTITY));
    }

    #[test]
    fn ray_grazing_a_box_edge_stays_outside() {
        let cube = TriMesh::cuboid(Vec3::ONE);
        // Touches the x == 1, z == -1 edge at (1, 0, -1) and leaves again.
        let ray = Ray::new(Vec3::new(0.0, -1.0, -2.0), Vec3::ONE);

        let hits = raycast_mesh(&ray, &cube, &Mat4::IDENTITY);
        assert_eq!(hits.len(), 2);
        assert_ne!(hits[0].front_facing, hits[1].front_facing);
        assert!(!is_inside_by_parity(&ray, &cube, &Mat4::IDENTITY));
    }

    #[test]
    fn parity_matches_containment_for_transformed_box() {
        let cube = TriMesh::cuboid(Vec3::new(0.5, 1.0, 0.25));
        let world = Transform::from_translation_rotation(
            Vec3::new(3.0, 1.0, -2.0),
            Quat::from_rotation_y(0.7),
        )
        .matrix();
        let probe = Vec3::new(1.0, 1.0, 1.0).normalize();

        let inside = Ray::new(world.transform_point3(Vec3::new(0.1, -0.4, 0.05)), probe);
        let outside = Ray::new(world.transform_point3(Vec3::new(0.9, 0.0, 0.0)), probe);
        let far_away = Ray::new(Vec3::new(-20.0, 1.0, -2.0), probe);

        assert!(is_inside_by_parity(&inside, &cube, &world));
        assert!(!is_inside_by_parity(&outside, &cube, &world));
        assert!(!is_inside_by_parity(&far_away, &cube, &world));
    }

    #[test]
    fn hit_distance_uses_world_units_under_scale() {
        let cube = TriMesh::cuboid(Vec3::splat(1.0));
        let world = Transform::IDENTITY.with_uniform_scale(2.0).matrix();
        let ray = Ray::new(Vec3::new(0.0, 0.0, -10.0), Vec3::Z);

        let hits = raycast_mesh(&ray, &cube, &world);
        assert_eq!(hits.len(), 2);
        assert!((hits[0].distance - 8.0).abs() < 1.0e-4);
        assert!((hits[0].point.z + 2.0).abs() < 1.0e-4);
    }

    #[test]
    fn plane_hits_only_in_front() {
        let down = Ray::new(Vec3::new(0.0, 1.6, 0.0), Vec3::new(0.0, -1.0, -1.0));
        let t = ray_plane(&down, Vec3::ZERO, Vec3::Y).expect("floor hit");
        assert!((down.at(t).y).abs() < 1.0e-5);

        let up = Ray::new(Vec3::new(0.0, 1.6, 0.0), Vec3::Y);
        assert!(ray_plane(&up, Vec3::ZERO, Vec3::Y).is_none());
    }

    #[test]
    fn transform_round_trips_through_matrix() {
        let transform = Transform {
            translation: Vec3::new(1.0, 2.0, 3.0),
            rotation: Quat::from_rotation_x(0.4),
            scale: Vec3::splat(0.5),
        };
        let decomposed = Transform::from_matrix(&transform.matrix());
        assert!(decomposed.translation.abs_diff_eq(transform.translation, 1.0e-5));
        assert!(decomposed.scale.abs_diff_eq(transform.scale, 1.0e-5));
        assert!(decomposed.rotation.abs_diff_eq(transform.rotation, 1.0e-5));
    }
}
