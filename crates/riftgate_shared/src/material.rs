use glam::Vec2;
use serde::{Deserialize, Serialize};

/// Stencil value written by the portal mask and tested by the skybox.
pub const DEFAULT_STENCIL_REF: u8 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StencilFunc {
    Always,
    Equal,
    NotEqual,
    Never,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StencilOp {
    Keep,
    Replace,
    Zero,
}

/// Per-material stencil parameters, as exposed by the rendering engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StencilParams {
    pub write: bool,
    pub reference: u8,
    pub func: StencilFunc,
    pub z_pass: StencilOp,
}

impl StencilParams {
    /// Writes `reference` wherever the fragment passes the depth test.
    pub fn write_mask(reference: u8) -> Self {
        Self {
            write: true,
            reference,
            func: StencilFunc::Always,
            z_pass: StencilOp::Replace,
        }
    }

    /// Draws only where the buffer already holds `reference`.
    pub fn equal_to(reference: u8) -> Self {
        Self {
            write: false,
            reference,
            func: StencilFunc::Equal,
            z_pass: StencilOp::Keep,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShaderKind {
    Unlit,
    Emissive,
    /// Animated refraction tell over the camera feed; driven by `PortalUniforms`.
    PassThrough,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Material {
    pub shader: ShaderKind,
    pub color: [f32; 4],
    pub emissive: [f32; 3],
    pub emissive_intensity: f32,
    pub color_write: bool,
    pub depth_write: bool,
    pub double_sided: bool,
    pub stencil: Option<StencilParams>,
}

impl Default for Material {
    fn default() -> Self {
        Self::unlit([1.0, 1.0, 1.0, 1.0])
    }
}

impl Material {
    pub fn unlit(color: [f32; 4]) -> Self {
        Self {
            shader: ShaderKind::Unlit,
            color,
            emissive: [0.0; 3],
            emissive_intensity: 0.0,
            color_write: true,
            depth_write: true,
            double_sided: false,
            stencil: None,
        }
    }

    pub fn emissive(color: [f32; 4], emissive: [f32; 3], intensity: f32) -> Self {
        Self {
            shader: ShaderKind::Emissive,
            emissive,
            emissive_intensity: intensity,
            ..Self::unlit(color)
        }
    }

    /// Invisible silhouette that stamps the stencil buffer; the skybox later
    /// shows only inside it.
    pub fn stencil_mask(reference: u8) -> Self {
        Self {
            color_write: false,
            depth_write: false,
            double_sided: true,
            stencil: Some(StencilParams::write_mask(reference)),
            ..Self::unlit([1.0, 1.0, 1.0, 1.0])
        }
    }

    /// Lets the camera feed through with a faint animated distortion.
    pub fn pass_through() -> Self {
        Self {
            shader: ShaderKind::PassThrough,
            depth_write: false,
            double_sided: true,
            ..Self::unlit([0.7, 0.85, 1.0, 0.5])
        }
    }

    pub fn writes_stencil(&self) -> bool {
        self.stencil.is_some_and(|stencil| stencil.write)
    }

    pub fn is_translucent(&self) -> bool {
        self.color[3] < 1.0 || self.shader == ShaderKind::PassThrough
    }
}

/// Uniforms shared by the portal materials: `{ time, resolution }`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct PortalUniforms {
    pub time: f32,
    pub resolution: Vec2,
}

impl PortalUniforms {
    /// Fixed per-frame step, not wall clock.
    pub fn advance(&mut self, step: f32) {
        self.time += step;
    }

    pub fn set_resolution(&mut self, width: u32, height: u32) {
        self.resolution = Vec2::new(width as f32, height as f32);
    }
}
