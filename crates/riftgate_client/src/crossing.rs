use glam::{Quat, Vec3};
use riftgate_shared::geometry::Ray;
use riftgate_shared::hitbox::{HitboxSet, HitboxVolume, ZoneFlags, ZoneShape};
use serde::{Deserialize, Serialize};

use crate::portal::PortalAnchor;

/// Direction of the parity probe cast from the camera.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeDirection {
    /// Along the portal's front normal.
    #[default]
    PortalNormal,
    /// A constant world-space vector.
    Fixed([f32; 3]),
}

impl ProbeDirection {
    pub fn resolve(self, portal_rotation: Quat) -> Vec3 {
        let normal = portal_rotation * Vec3::Z;
        match self {
            Self::PortalNormal => normal,
            Self::Fixed(direction) => Vec3::from(direction).try_normalize().unwrap_or(normal),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrossingState {
    Outside,
    InFrontZone,
    InBackZone,
    InCenterZone,
}

/// Per-frame detector output. Never stored between frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CrossingVerdict {
    pub zones: ZoneFlags,
}

impl CrossingVerdict {
    pub fn front_outer(&self) -> bool {
        self.zones.contains(ZoneFlags::FRONT_OUTER)
    }

    pub fn back_outer(&self) -> bool {
        self.zones.contains(ZoneFlags::BACK_OUTER)
    }

    pub fn center(&self) -> bool {
        self.zones.contains(ZoneFlags::CENTER)
    }

    pub fn no_zone(&self) -> bool {
        self.zones.is_empty()
    }

    pub fn state(&self) -> CrossingState {
        if self.front_outer() {
            CrossingState::InFrontZone
        } else if self.back_outer() {
            CrossingState::InBackZone
        } else if self.center() {
            CrossingState::InCenterZone
        } else {
            CrossingState::Outside
        }
    }
}

impl From<ZoneFlags> for CrossingVerdict {
    fn from(zones: ZoneFlags) -> Self {
        Self { zones }
    }
}

/// Casts a probe from the camera against each zone volume and applies the
/// even-odd rule independently per volume.
#[derive(Debug, Clone)]
pub struct CrossingDetector {
    hitboxes: HitboxSet,
    probe: Vec3,
}

impl CrossingDetector {
    pub fn around(
        center: Vec3,
        rotation: Quat,
        radius: f32,
        shape: &ZoneShape,
        probe: ProbeDirection,
    ) -> Self {
        Self {
            hitboxes: HitboxSet::around_plane(center, rotation, radius, shape),
            probe: probe.resolve(rotation),
        }
    }

    pub fn for_anchor(anchor: &PortalAnchor, shape: &ZoneShape, probe: ProbeDirection) -> Self {
        Self::around(
            anchor.position(),
            anchor.orientation(),
            anchor.radius(),
            shape,
            probe,
        )
    }

    pub fn probe_direction(&self) -> Vec3 {
        self.probe
    }

    pub fn hitboxes(&self) -> &HitboxSet {
        &self.hitboxes
    }

    pub fn detect(&self, camera_position: Vec3) -> CrossingVerdict {
        let ray = Ray::new(camera_position, self.probe);
        let zones = HitboxVolume::ALL
            .into_iter()
            .filter(|volume| self.hitboxes.get(*volume).contains_by_parity(&ray))
            .fold(ZoneFlags::empty(), |zones, volume| zones | volume.flag());
        CrossingVerdict { zones }
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};
    use riftgate_shared::hitbox::{ZoneFlags, ZoneShape};

    use super::{CrossingDetector, CrossingState, ProbeDirection};

    fn detector(probe: ProbeDirection) -> CrossingDetector {
        CrossingDetector::around(
            Vec3::new(0.0, 1.3, -1.3),
            Quat::IDENTITY,
            1.04,
            &ZoneShape::default(),
            probe,
        )
    }

    #[test]
    fn detection_is_pure() {
        let detector = detector(ProbeDirection::PortalNormal);
        let point = Vec3::new(0.2, 1.1, -1.0);
        let first = detector.detect(point);
        for _ in 0..10 {
            assert_eq!(detector.detect(point), first);
        }
        assert_eq!(first.state(), CrossingState::InFrontZone);
    }

    #[test]
    fn outer_zones_are_never_reported_together() {
        let detector = detector(ProbeDirection::PortalNormal);
        for step in 0..=200 {
            let z = 0.5 - step as f32 * 0.018;
            let verdict = detector.detect(Vec3::new(0.1, 1.4, z));
            assert!(!(verdict.front_outer() && verdict.back_outer()), "overlap at z = {z}");
        }
    }

    #[test]
    fn walking_through_visits_front_center_back_in_order() {
        let detector = detector(ProbeDirection::PortalNormal);
        let mut states = Vec::new();
        for step in 0..=120 {
            let z = 0.0 - step as f32 * 0.022;
            let state = detector.detect(Vec3::new(0.0, 1.3, z)).state();
            if states.last() != Some(&state) {
                states.push(state);
            }
        }
        assert_eq!(
            states,
            vec![
                CrossingState::Outside,
                CrossingState::InFrontZone,
                CrossingState::InCenterZone,
                CrossingState::InBackZone,
                CrossingState::Outside,
            ]
        );
    }

    #[test]
    fn fixed_probe_agrees_with_normal_probe_on_convex_zones() {
        let along_normal = detector(ProbeDirection::PortalNormal);
        let diagonal = detector(ProbeDirection::Fixed([1.0, 1.0, 1.0]));
        for point in [
            Vec3::new(0.3, 1.0, -0.9),
            Vec3::new(-0.3, 1.5, -1.6),
            Vec3::new(0.0, 1.3, -1.3),
            Vec3::new(4.0, 1.3, -1.3),
        ] {
            assert_eq!(along_normal.detect(point), diagonal.detect(point));
        }
        assert_eq!(
            diagonal.detect(Vec3::new(4.0, 1.3, -1.3)).zones,
            ZoneFlags::empty()
        );
    }

    #[test]
    fn degenerate_fixed_probe_falls_back_to_normal() {
        let rotation = Quat::from_rotation_y(1.0);
        let resolved = ProbeDirection::Fixed([0.0, 0.0, 0.0]).resolve(rotation);
        assert!(resolved.abs_diff_eq(rotation * Vec3::Z, 1.0e-6));
    }
}
