use bitflags::bitflags;
use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::geometry::{is_inside_by_parity, Ray, Transform, TriMesh};

bitflags! {
    /// Hitbox volumes containing the probe origin this frame.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct ZoneFlags: u8 {
        const FRONT_OUTER = 0b0000_0001;
        const BACK_OUTER  = 0b0000_0010;
        const CENTER      = 0b0000_0100;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HitboxVolume {
    FrontOuter,
    BackOuter,
    Center,
}

impl HitboxVolume {
    pub const ALL: [HitboxVolume; 3] = [Self::FrontOuter, Self::BackOuter, Self::Center];

    pub fn flag(self) -> ZoneFlags {
        match self {
            Self::FrontOuter => ZoneFlags::FRONT_OUTER,
            Self::BackOuter => ZoneFlags::BACK_OUTER,
            Self::Center => ZoneFlags::CENTER,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::FrontOuter => "hit_front_outer",
            Self::BackOuter => "hit_back_outer",
            Self::Center => "hit_center",
        }
    }
}

/// Shape of the three zones around a portal plane, in world units.
///
/// Along the plane normal the front zone covers `[gap, gap + depth]`, the back
/// zone `[-(gap + depth), -gap]` and the center zone `[-gap, gap]`, so the
/// outer zones never overlap and the center zone fills the slot between them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoneShape {
    pub gap: f32,
    pub depth: f32,
    /// In-plane half size as a multiple of the portal radius.
    pub in_plane_margin: f32,
}

impl Default for ZoneShape {
    fn default() -> Self {
        Self {
            gap: 0.026,
            depth: 0.6,
            in_plane_margin: 1.25,
        }
    }
}

/// A closed hitbox placed in the world.
#[derive(Debug, Clone)]
pub struct Hitbox {
    pub volume: HitboxVolume,
    pub mesh: TriMesh,
    pub world: Mat4,
}

impl Hitbox {
    pub fn contains_by_parity(&self, ray: &Ray) -> bool {
        is_inside_by_parity(ray, &self.mesh, &self.world)
    }
}

/// The three zone volumes for one portal. Built once when the portal anchor
/// is created and never moved afterwards.
#[derive(Debug, Clone)]
pub struct HitboxSet {
    hitboxes: [Hitbox; 3],
}

impl HitboxSet {
    /// `rotation` maps local +Z onto the portal's front normal.
    pub fn around_plane(center: Vec3, rotation: Quat, radius: f32, shape: &ZoneShape) -> Self {
        let gap = shape.gap.max(0.0);
        let depth = shape.depth.max(f32::EPSILON);
        let half_in_plane = (radius * shape.in_plane_margin).max(f32::EPSILON);
        let normal = rotation * Vec3::Z;

        let outer_half = Vec3::new(half_in_plane, half_in_plane, depth * 0.5);
        let outer_offset = gap + depth * 0.5;
        let center_half = Vec3::new(half_in_plane, half_in_plane, gap.max(f32::EPSILON));

        let place = |offset: f32| {
            Transform::from_translation_rotation(center + normal * offset, rotation).matrix()
        };

        Self {
            hitboxes: [
                Hitbox {
                    volume: HitboxVolume::FrontOuter,
                    mesh: TriMesh::cuboid(outer_half),
                    world: place(outer_offset),
                },
                Hitbox {
                    volume: HitboxVolume::BackOuter,
                    mesh: TriMesh::cuboid(outer_half),
                    world: place(-outer_offset),
                },
                Hitbox {
                    volume: HitboxVolume::Center,
                    mesh: TriMesh::cuboid(center_half),
                    world: place(0.0),
                },
            ],
        }
    }

    pub fn get(&self, volume: HitboxVolume) -> &Hitbox {
        match volume {
            HitboxVolume::FrontOuter => &self.hitboxes[0],
            HitboxVolume::BackOuter => &self.hitboxes[1],
            HitboxVolume::Center => &self.hitboxes[2],
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Hitbox> {
        self.hitboxes.iter()
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};

    use super::{HitboxSet, HitboxVolume, ZoneFlags, ZoneShape};
    use crate::geometry::Ray;

    fn zones_at(set: &HitboxSet, point: Vec3, direction: Vec3) -> ZoneFlags {
        let ray = Ray::new(point, direction);
        set.iter()
            .filter(|hitbox| hitbox.contains_by_parity(&ray))
            .fold(ZoneFlags::empty(), |flags, hitbox| flags | hitbox.volume.flag())
    }

    #[test]
    fn zones_partition_the_normal_axis() {
        let shape = ZoneShape::default();
        let set = HitboxSet::around_plane(Vec3::new(0.0, 1.0, -1.0), Quat::IDENTITY, 1.0, &shape);
        let probe = Vec3::Z;

        assert_eq!(zones_at(&set, Vec3::new(0.1, 1.2, -0.7), probe), ZoneFlags::FRONT_OUTER);
        assert_eq!(zones_at(&set, Vec3::new(0.1, 1.2, -1.3), probe), ZoneFlags::BACK_OUTER);
        assert_eq!(zones_at(&set, Vec3::new(0.1, 1.2, -1.0), probe), ZoneFlags::CENTER);
        assert_eq!(zones_at(&set, Vec3::new(0.1, 1.2, 2.0), probe), ZoneFlags::empty());
        assert_eq!(zones_at(&set, Vec3::new(5.0, 1.2, -1.0), probe), ZoneFlags::empty());
    }

    #[test]
    fn rotated_set_follows_its_normal() {
        let rotation = Quat::from_rotation_y(std::f32::consts::FRAC_PI_2);
        let set = HitboxSet::around_plane(Vec3::ZERO, rotation, 1.0, &ZoneShape::default());
        let normal = rotation * Vec3::Z;

        assert_eq!(zones_at(&set, normal * 0.3, normal), ZoneFlags::FRONT_OUTER);
        assert_eq!(zones_at(&set, normal * -0.3, normal), ZoneFlags::BACK_OUTER);
    }

    #[test]
    fn volumes_are_looked_up_by_name() {
        let set = HitboxSet::around_plane(Vec3::ZERO, Quat::IDENTITY, 1.3, &ZoneShape::default());
        for volume in HitboxVolume::ALL {
            assert_eq!(set.get(volume).volume, volume);
        }
        assert_eq!(HitboxVolume::Center.name(), "hit_center");
    }
}
