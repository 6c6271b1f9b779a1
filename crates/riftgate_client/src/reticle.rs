use std::f32::consts::FRAC_PI_2;
use std::sync::Arc;

use glam::{Mat4, Quat, Vec3};
use riftgate_shared::geometry::Transform;
use riftgate_shared::material::Material;
use riftgate_shared::mesh::{ring, MeshData};
use riftgate_shared::scene::{NodeId, Scene};

use crate::xr::HitTestOutcome;

pub const RETICLE_INNER_RADIUS: f32 = 0.15;
pub const RETICLE_OUTER_RADIUS: f32 = 0.2;

/// Placement marker driven by hit-test outcomes. No smoothing: the pose is
/// always the latest hit.
#[derive(Debug, Default)]
pub struct ReticleController {
    visible: bool,
    pose: Option<Transform>,
    node: Option<NodeId>,
}

impl ReticleController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mesh() -> MeshData {
        ring(RETICLE_INNER_RADIUS, RETICLE_OUTER_RADIUS, 32)
            .rotated(Quat::from_rotation_x(-FRAC_PI_2))
    }

    /// Adds the ring to `scene`, hidden until the first hit.
    pub fn attach(&mut self, scene: &mut Scene) -> NodeId {
        let mesh = scene.add_mesh(Arc::new(Self::mesh()));
        let node = scene.add_mesh_node(
            "reticle",
            Transform::IDENTITY,
            mesh,
            Material::unlit([1.0, 1.0, 1.0, 1.0]),
            None,
        );
        scene.set_visible(node, false);
        self.node = Some(node);
        node
    }

    pub fn apply(&mut self, outcome: &HitTestOutcome) {
        match outcome {
            HitTestOutcome::Anchor(pose) => self.place(pose),
            HitTestOutcome::NoAnchor | HitTestOutcome::Unavailable => self.visible = false,
            HitTestOutcome::Pending => {}
        }
    }

    pub fn hide(&mut self) {
        self.visible = false;
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    /// Most recent hit pose, kept after the reticle hides.
    pub fn last_pose(&self) -> Option<Transform> {
        self.pose
    }

    /// Pose usable for placement this frame.
    pub fn placement(&self) -> Option<Transform> {
        self.pose.filter(|_| self.visible)
    }

    pub fn position(&self) -> Option<Vec3> {
        self.placement().map(|pose| pose.translation)
    }

    pub fn sync(&self, scene: &mut Scene) {
        let Some(node) = self.node else {
            return;
        };
        if let Some(pose) = self.pose {
            scene.set_transform(node, pose);
        }
        scene.set_visible(node, self.visible);
    }

    fn place(&mut self, pose: &Mat4) {
        self.pose = Some(Transform::from_matrix(pose));
        self.visible = true;
    }
}

#[cfg(test)]
mod tests {
    use glam::{Mat4, Vec3};
    use riftgate_shared::scene::Scene;

    use super::ReticleController;
    use crate::xr::HitTestOutcome;

    #[test]
    fn hides_on_the_very_next_tick_without_hits() {
        let mut reticle = ReticleController::new();
        let hit = Mat4::from_translation(Vec3::new(0.5, 0.0, -2.0));

        reticle.apply(&HitTestOutcome::Anchor(hit));
        assert!(reticle.is_visible());
        assert_eq!(reticle.position(), Some(Vec3::new(0.5, 0.0, -2.0)));

        reticle.apply(&HitTestOutcome::NoAnchor);
        assert!(!reticle.is_visible());
        assert!(reticle.placement().is_none());
        assert!(reticle.last_pose().is_some());
    }

    #[test]
    fn pose_is_always_the_latest_hit() {
        let mut reticle = ReticleController::new();
        for x in [0.0, 1.0, -3.0] {
            reticle.apply(&HitTestOutcome::Anchor(Mat4::from_translation(Vec3::new(x, 0.0, -1.0))));
        }
        assert_eq!(reticle.position(), Some(Vec3::new(-3.0, 0.0, -1.0)));

        reticle.apply(&HitTestOutcome::Pending);
        assert!(reticle.is_visible());
    }

    #[test]
    fn scene_node_follows_visibility() {
        let mut scene = Scene::new();
        let mut reticle = ReticleController::new();
        let node = reticle.attach(&mut scene);
        assert!(scene.draw_list().is_empty());

        reticle.apply(&HitTestOutcome::Anchor(Mat4::from_translation(Vec3::new(0.0, 0.0, -1.0))));
        reticle.sync(&mut scene);
        let draws = scene.draw_list();
        assert_eq!(draws.len(), 1);
        assert_eq!(draws[0].node, node);

        reticle.apply(&HitTestOutcome::NoAnchor);
        reticle.sync(&mut scene);
        assert!(scene.draw_list().is_empty());
    }
}
