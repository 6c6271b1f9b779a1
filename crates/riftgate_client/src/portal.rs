use glam::{Mat4, Quat, Vec3};
use riftgate_shared::geometry::Transform;
use tracing::{debug, info};

use crate::crossing::CrossingVerdict;

/// Radius of the portal membrane before the uniform scale is applied.
pub const PORTAL_BASE_RADIUS: f32 = 1.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnchorSource {
    SurfaceHit,
    CameraOffset,
}

/// Where the single portal instance lives. Immutable once generated; per-frame
/// animation is applied as a transient delta on top of it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortalAnchor {
    position: Vec3,
    orientation: Quat,
    radius: f32,
    source: AnchorSource,
}

impl PortalAnchor {
    pub fn position(&self) -> Vec3 {
        self.position
    }

    /// Maps local +Z onto the portal's front normal.
    pub fn orientation(&self) -> Quat {
        self.orientation
    }

    pub fn radius(&self) -> f32 {
        self.radius
    }

    pub fn source(&self) -> AnchorSource {
        self.source
    }

    pub fn normal(&self) -> Vec3 {
        self.orientation * Vec3::Z
    }

    /// Placement of the unit-radius membrane mesh.
    pub fn transform(&self) -> Transform {
        Transform::from_translation_rotation(self.position, self.orientation)
            .with_uniform_scale(self.radius / PORTAL_BASE_RADIUS)
    }

    /// Signed distance of `point` from the portal plane, positive on the front.
    pub fn signed_distance(&self, point: Vec3) -> f32 {
        (point - self.position).dot(self.normal())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PortalPlacement {
    /// A surface hit pose; the portal stands on it, facing the camera.
    SurfaceHit { pose: Mat4, camera_position: Vec3 },
    /// A fixed offset in the camera's local frame, facing back at the camera.
    CameraOffset { camera_world: Mat4, offset: Vec3 },
}

pub fn generate_portal(placement: PortalPlacement, uniform_scale: f32) -> PortalAnchor {
    let radius = PORTAL_BASE_RADIUS * uniform_scale.max(f32::EPSILON);
    let anchor = match placement {
        PortalPlacement::SurfaceHit {
            pose,
            camera_position,
        } => {
            let (_, rotation, hit_position) = pose.to_scale_rotation_translation();
            let up = (rotation * Vec3::Y).try_normalize().unwrap_or(Vec3::Y);
            let position = hit_position + up * radius;
            PortalAnchor {
                position,
                orientation: facing_yaw(camera_position - position),
                radius,
                source: AnchorSource::SurfaceHit,
            }
        }
        PortalPlacement::CameraOffset {
            camera_world,
            offset,
        } => {
            let forward = camera_world.transform_vector3(Vec3::NEG_Z);
            PortalAnchor {
                position: camera_world.transform_point3(offset),
                orientation: facing_yaw(-forward),
                radius,
                source: AnchorSource::CameraOffset,
            }
        }
    };

    info!(
        "portal generated at ({:.2}, {:.2}, {:.2}) radius {:.2} from {:?}",
        anchor.position.x, anchor.position.y, anchor.position.z, anchor.radius, anchor.source
    );
    anchor
}

/// Upright rotation about +Y turning local +Z towards `direction`.
fn facing_yaw(direction: Vec3) -> Quat {
    let flat = Vec3::new(direction.x, 0.0, direction.z);
    if flat.length_squared() <= 1.0e-8 {
        return Quat::IDENTITY;
    }
    Quat::from_rotation_y(flat.x.atan2(flat.z))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalSide {
    Front,
    Back,
}

impl PortalSide {
    pub fn opposite(self) -> Self {
        match self {
            Self::Front => Self::Back,
            Self::Back => Self::Front,
        }
    }
}

/// Which side of the portal the viewer most recently came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DirectionalMemory {
    came_from_front: bool,
    came_from_back: bool,
}

impl DirectionalMemory {
    pub const fn new(came_from_front: bool, came_from_back: bool) -> Self {
        Self {
            came_from_front,
            came_from_back,
        }
    }

    fn from_side(side: PortalSide) -> Self {
        match side {
            PortalSide::Front => Self::new(true, false),
            PortalSide::Back => Self::new(false, true),
        }
    }

    pub fn came_from_front(&self) -> bool {
        self.came_from_front
    }

    pub fn came_from_back(&self) -> bool {
        self.came_from_back
    }

    /// The side recorded when exactly one flag is set.
    pub fn recorded_side(&self) -> Option<PortalSide> {
        match (self.came_from_front, self.came_from_back) {
            (true, false) => Some(PortalSide::Front),
            (false, true) => Some(PortalSide::Back),
            _ => None,
        }
    }
}

/// The two render-mode booleans consumed by the material switcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderMode {
    world_material_active: bool,
    portal_front_material_active: bool,
}

impl Default for RenderMode {
    fn default() -> Self {
        Self::new(false, true)
    }
}

impl RenderMode {
    pub const fn new(world_material_active: bool, portal_front_material_active: bool) -> Self {
        Self {
            world_material_active,
            portal_front_material_active,
        }
    }

    pub fn world_material_active(&self) -> bool {
        self.world_material_active
    }

    pub fn portal_front_material_active(&self) -> bool {
        self.portal_front_material_active
    }
}

/// Portal state threaded through the frame tick. Only `PortalStateMachine`
/// mutates it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PortalContext {
    memory: DirectionalMemory,
    mode: RenderMode,
}

impl PortalContext {
    pub fn new(memory: DirectionalMemory, mode: RenderMode) -> Self {
        Self { memory, mode }
    }

    pub fn memory(&self) -> DirectionalMemory {
        self.memory
    }

    pub fn mode(&self) -> RenderMode {
        self.mode
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Entered an outer zone with no recorded side.
    EnterFromOutside(PortalSide),
    /// Entered an outer zone after leaving the portal on the virtual side.
    EnterFromWorld(PortalSide),
    /// Moved from one outer zone to the other.
    Crossed { to: PortalSide, world_active: bool },
    Center,
    Reset { world_active: bool },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StepReport {
    pub transitions: Vec<Transition>,
}

impl StepReport {
    pub fn crossed(&self) -> bool {
        self.transitions
            .iter()
            .any(|transition| matches!(transition, Transition::Crossed { .. }))
    }

    pub fn reset(&self) -> bool {
        self.transitions
            .iter()
            .any(|transition| matches!(transition, Transition::Reset { .. }))
    }
}

#[derive(Debug, Default)]
pub struct PortalStateMachine {
    crossings: u64,
}

impl PortalStateMachine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn crossings(&self) -> u64 {
        self.crossings
    }

    /// Applies one frame's verdict: front outer, back outer, center, then the
    /// no-zone reset.
    pub fn advance(&mut self, ctx: &mut PortalContext, verdict: &CrossingVerdict) -> StepReport {
        let mut report = StepReport::default();

        if verdict.front_outer() {
            self.enter_outer(ctx, PortalSide::Front, &mut report);
        }
        if verdict.back_outer() {
            self.enter_outer(ctx, PortalSide::Back, &mut report);
        }
        if verdict.center() {
            debug!("camera in center zone");
            report.transitions.push(Transition::Center);
        }
        if verdict.no_zone() {
            let world_active = ctx.mode.world_material_active;
            let before = *ctx;
            if world_active {
                ctx.memory = DirectionalMemory::new(true, true);
                ctx.mode.portal_front_material_active = false;
            } else {
                ctx.memory = DirectionalMemory::new(false, false);
                ctx.mode.portal_front_material_active = true;
            }
            if before != *ctx {
                debug!(world_active, "portal memory reset");
            }
            report.transitions.push(Transition::Reset { world_active });
        }

        report
    }

    fn enter_outer(&mut self, ctx: &mut PortalContext, side: PortalSide, report: &mut StepReport) {
        let memory = ctx.memory;
        match (memory.came_from_front, memory.came_from_back) {
            (false, false) => {
                ctx.mode = RenderMode::new(false, true);
                ctx.memory = DirectionalMemory::from_side(side);
                report.transitions.push(Transition::EnterFromOutside(side));
            }
            (true, true) => {
                ctx.mode = RenderMode::new(true, false);
                ctx.memory = DirectionalMemory::from_side(side);
                report.transitions.push(Transition::EnterFromWorld(side));
            }
            _ if memory.recorded_side() == Some(side) => {}
            _ => {
                let world_active = !ctx.mode.world_material_active;
                ctx.mode = RenderMode::new(world_active, !world_active);
                ctx.memory = DirectionalMemory::from_side(side);
                self.crossings += 1;
                info!(
                    from = ?side.opposite(),
                    to = ?side,
                    world_active,
                    "portal crossed"
                );
                report.transitions.push(Transition::Crossed {
                    to: side,
                    world_active,
                });
            }
        }
    }
}
