use riftgate_shared::material::{Material, StencilParams};
use riftgate_shared::scene::{MeshNode, NodeId, Scene, SceneVisitor};

use crate::portal::RenderMode;

/// Material bound to the portal membrane this frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PortalBinding {
    /// Stencil-writing silhouette; the skybox shows through it.
    Mask,
    /// Animated distortion over the camera feed.
    PassThrough,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SwitchTargets {
    pub portal: Option<NodeId>,
    pub skybox: Option<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchReport {
    pub portal: Option<PortalBinding>,
    pub skybox_meshes: usize,
}

/// Applies the render mode to the scene. Reads the mode, never writes it.
#[derive(Debug, Clone)]
pub struct MaterialSwitcher {
    stencil_reference: u8,
    mask: Material,
    pass_through: Material,
}

impl MaterialSwitcher {
    pub fn new(stencil_reference: u8) -> Self {
        Self {
            stencil_reference,
            mask: Material::stencil_mask(stencil_reference),
            pass_through: Material::pass_through(),
        }
    }

    pub fn stencil_reference(&self) -> u8 {
        self.stencil_reference
    }

    pub fn portal_binding(mode: RenderMode) -> PortalBinding {
        if mode.portal_front_material_active() {
            PortalBinding::Mask
        } else {
            PortalBinding::PassThrough
        }
    }

    pub fn portal_material(&self, binding: PortalBinding) -> Material {
        match binding {
            PortalBinding::Mask => self.mask,
            PortalBinding::PassThrough => self.pass_through,
        }
    }

    /// Skybox stencil test: only inside the mask while in the real world,
    /// everywhere once the viewer is in the virtual one.
    pub fn skybox_stencil(&self, mode: RenderMode) -> Option<StencilParams> {
        (!mode.world_material_active()).then(|| StencilParams::equal_to(self.stencil_reference))
    }

    /// Missing targets are skipped.
    pub fn apply(
        &self,
        mode: RenderMode,
        scene: &mut Scene,
        targets: &SwitchTargets,
    ) -> SwitchReport {
        let portal = targets.portal.and_then(|node| {
            let binding = Self::portal_binding(mode);
            let mesh = scene.mesh_node_mut(node)?;
            mesh.material = self.portal_material(binding);
            Some(binding)
        });

        let skybox_meshes = match targets.skybox {
            Some(root) => {
                let mut visitor = SkyboxStencil {
                    stencil: self.skybox_stencil(mode),
                    touched: 0,
                };
                scene.walk_mut(root, &mut visitor);
                visitor.touched
            }
            None => 0,
        };

        SwitchReport {
            portal,
            skybox_meshes,
        }
    }
}

struct SkyboxStencil {
    stencil: Option<StencilParams>,
    touched: usize,
}

impl SceneVisitor for SkyboxStencil {
    fn visit_mesh(&mut self, _node: NodeId, _name: &str, mesh: &mut MeshNode) {
        mesh.material.stencil = self.stencil;
        self.touched += 1;
    }
}
