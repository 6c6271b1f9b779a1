use glam::{Quat, Vec3};
use riftgate_shared::geometry::Transform;
use riftgate_shared::scene::{MeshNode, NodeId, SceneVisitor};

const MEMBRANE_BOB_AMPLITUDE: f32 = 0.001;
const MEMBRANE_BREATHING_AMPLITUDE: f32 = 0.0625;
const MEMBRANE_BREATHING_RATE: f32 = 0.15;

/// Emissive colour cycle shared by every gate mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GateGlow {
    pub emissive: [f32; 3],
    pub intensity: f32,
}

pub fn gate_glow(time: f32) -> GateGlow {
    let channel = |wave: f32| ((wave + 1.0) / 2.0 * 255.0).floor() / 255.0;
    GateGlow {
        emissive: [
            channel(time.cos()),
            channel(time.sin()),
            channel((time + 77.0).cos()),
        ],
        intensity: time.sin() * 0.2 + 1.3,
    }
}

/// Counter-rotation of the gate's inner ring.
pub fn inner_ring_spin(time: f32) -> Quat {
    Quat::from_rotation_z(-1.5 * time / 2.0)
}

/// Placement of the membrane for this frame: the anchor plus a transient spin
/// and bob. The anchor itself never moves.
pub fn membrane_transform(anchor: Transform, time: f32, breathing: bool) -> Transform {
    let breath = if breathing {
        1.0 + (time * MEMBRANE_BREATHING_RATE).sin() * MEMBRANE_BREATHING_AMPLITUDE
    } else {
        1.0
    };
    Transform {
        translation: anchor.translation + Vec3::Y * (time.sin() * MEMBRANE_BOB_AMPLITUDE),
        rotation: anchor.rotation * Quat::from_rotation_z(time / 2.0),
        scale: anchor.scale * breath,
    }
}

/// Writes one glow value into every mesh under the visited root.
pub struct GlowVisitor {
    glow: GateGlow,
}

impl GlowVisitor {
    pub fn new(glow: GateGlow) -> Self {
        Self { glow }
    }
}

impl SceneVisitor for GlowVisitor {
    fn visit_mesh(&mut self, _node: NodeId, _name: &str, mesh: &mut MeshNode) {
        mesh.material.emissive = self.glow.emissive;
        mesh.material.emissive_intensity = self.glow.intensity;
    }
}

#[cfg(test)]
mod tests {
    use glam::{Quat, Vec3};
    use riftgate_shared::geometry::Transform;

    use super::{gate_glow, inner_ring_spin, membrane_transform};

    #[test]
    fn glow_channels_stay_in_byte_range() {
        for step in 0..1000 {
            let glow = gate_glow(step as f32 * 0.01);
            assert!(glow.emissive.iter().all(|c| (0.0..=1.0).contains(c)));
            assert!((1.09..=1.51).contains(&glow.intensity));
        }
        let start = gate_glow(0.0);
        assert_eq!(start.emissive[0], 1.0);
        assert!((start.intensity - 1.3).abs() < 1.0e-6);
    }

    #[test]
    fn membrane_motion_is_transient() {
        let anchor =
            Transform::from_translation_rotation(Vec3::new(0.0, 1.0, -1.3), Quat::IDENTITY);
        let moved = membrane_transform(anchor, 1.0, false);
        assert!((moved.translation - anchor.translation).length() <= 0.001 + 1.0e-6);
        assert!(moved.rotation.abs_diff_eq(Quat::from_rotation_z(0.5), 1.0e-6));

        let back = membrane_transform(anchor, 0.0, true);
        assert!(back.translation.abs_diff_eq(anchor.translation, 1.0e-6));
        assert!(back.scale.abs_diff_eq(anchor.scale, 1.0e-6));
    }

    #[test]
    fn inner_ring_spins_backwards() {
        let (axis, angle) = inner_ring_spin(1.0).to_axis_angle();
        assert!((axis.z.abs() - 1.0).abs() < 1.0e-5);
        assert!((axis.z * angle + 0.75).abs() < 1.0e-5);
    }
}
