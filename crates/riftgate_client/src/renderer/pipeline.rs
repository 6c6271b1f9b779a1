use riftgate_shared::material::{Material, ShaderKind, StencilFunc, StencilOp, StencilParams};
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::renderer::SceneVertex;

/// Everything about a material that changes pipeline state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineKey {
    pub shader: ShaderKind,
    pub color_write: bool,
    pub depth_write: bool,
    pub double_sided: bool,
    pub translucent: bool,
    pub stencil: Option<StencilParams>,
}

impl PipelineKey {
    pub fn for_material(material: &Material) -> Self {
        Self {
            shader: material.shader,
            color_write: material.color_write,
            depth_write: material.depth_write,
            double_sided: material.double_sided,
            translucent: material.is_translucent(),
            // The reference value is dynamic pass state, not pipeline state.
            stencil: material.stencil.map(|stencil| StencilParams {
                reference: 0,
                ..stencil
            }),
        }
    }
}

pub fn compare_function(func: StencilFunc) -> wgpu::CompareFunction {
    match func {
        StencilFunc::Always => wgpu::CompareFunction::Always,
        StencilFunc::Equal => wgpu::CompareFunction::Equal,
        StencilFunc::NotEqual => wgpu::CompareFunction::NotEqual,
        StencilFunc::Never => wgpu::CompareFunction::Never,
    }
}

pub fn stencil_operation(op: StencilOp) -> wgpu::StencilOperation {
    match op {
        StencilOp::Keep => wgpu::StencilOperation::Keep,
        StencilOp::Replace => wgpu::StencilOperation::Replace,
        StencilOp::Zero => wgpu::StencilOperation::Zero,
    }
}

/// No stencil parameters means the stencil buffer is ignored entirely.
pub fn stencil_state(stencil: Option<StencilParams>) -> wgpu::StencilState {
    let Some(stencil) = stencil else {
        return wgpu::StencilState::default();
    };
    let face = wgpu::StencilFaceState {
        compare: compare_function(stencil.func),
        fail_op: wgpu::StencilOperation::Keep,
        depth_fail_op: wgpu::StencilOperation::Keep,
        pass_op: stencil_operation(stencil.z_pass),
    };
    wgpu::StencilState {
        front: face,
        back: face,
        read_mask: 0xff,
        write_mask: if stencil.write { 0xff } else { 0x00 },
    }
}

#[derive(Debug)]
pub struct MaterialPipelines {
    layout: wgpu::PipelineLayout,
    scene_shader: wgpu::ShaderModule,
    portal_shader: wgpu::ShaderModule,
    color_format: wgpu::TextureFormat,
    depth_format: wgpu::TextureFormat,
    cache: FxHashMap<PipelineKey, wgpu::RenderPipeline>,
}

impl MaterialPipelines {
    pub fn new(
        device: &wgpu::Device,
        color_format: wgpu::TextureFormat,
        depth_format: wgpu::TextureFormat,
        frame_bind_group_layout: &wgpu::BindGroupLayout,
        draw_bind_group_layout: &wgpu::BindGroupLayout,
    ) -> Self {
        let scene_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/../../assets/shaders/scene.wgsl"
                ))
                .into(),
            ),
        });
        let portal_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Portal Pass-Through Shader"),
            source: wgpu::ShaderSource::Wgsl(
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/../../assets/shaders/portal.wgsl"
                ))
                .into(),
            ),
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Material Pipeline Layout"),
            bind_group_layouts: &[frame_bind_group_layout, draw_bind_group_layout],
            push_constant_ranges: &[],
        });

        Self {
            layout,
            scene_shader,
            portal_shader,
            color_format,
            depth_format,
            cache: FxHashMap::default(),
        }
    }

    pub fn get_or_create(
        &mut self,
        device: &wgpu::Device,
        key: PipelineKey,
    ) -> &wgpu::RenderPipeline {
        if !self.cache.contains_key(&key) {
            let pipeline = self.create(device, &key);
            self.cache.insert(key, pipeline);
            debug!(?key, cached = self.cache.len(), "created material pipeline");
        }
        &self.cache[&key]
    }

    pub fn cached(&self, key: &PipelineKey) -> Option<&wgpu::RenderPipeline> {
        self.cache.get(key)
    }

    fn create(&self, device: &wgpu::Device, key: &PipelineKey) -> wgpu::RenderPipeline {
        let shader = match key.shader {
            ShaderKind::Unlit | ShaderKind::Emissive => &self.scene_shader,
            ShaderKind::PassThrough => &self.portal_shader,
        };
        let blend = if key.translucent {
            wgpu::BlendState::ALPHA_BLENDING
        } else {
            wgpu::BlendState::REPLACE
        };
        let write_mask = if key.color_write {
            wgpu::ColorWrites::ALL
        } else {
            wgpu::ColorWrites::empty()
        };

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Material Pipeline"),
            layout: Some(&self.layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some("vs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[SceneVertex::desc()],
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some("fs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: self.color_format,
                    blend: Some(blend),
                    write_mask,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: if key.double_sided {
                    None
                } else {
                    Some(wgpu::Face::Back)
                },
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: self.depth_format,
                depth_write_enabled: key.depth_write,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: stencil_state(key.stencil),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use riftgate_shared::material::{Material, StencilParams};

    use super::{stencil_state, PipelineKey};

    #[test]
    fn mask_stencil_replaces_on_every_fragment() {
        let state = stencil_state(Some(StencilParams::write_mask(1)));
        assert_eq!(state.front.compare, wgpu::CompareFunction::Always);
        assert_eq!(state.front.pass_op, wgpu::StencilOperation::Replace);
        assert_eq!(state.write_mask, 0xff);
        assert_eq!(state.front, state.back);
    }

    #[test]
    fn equal_test_never_writes() {
        let state = stencil_state(Some(StencilParams::equal_to(1)));
        assert_eq!(state.front.compare, wgpu::CompareFunction::Equal);
        assert_eq!(state.front.pass_op, wgpu::StencilOperation::Keep);
        assert_eq!(state.write_mask, 0);
        assert!(!stencil_state(None).is_enabled());
    }

    #[test]
    fn stencil_reference_does_not_split_pipelines() {
        let a = PipelineKey::for_material(&Material::stencil_mask(1));
        let b = PipelineKey::for_material(&Material::stencil_mask(7));
        assert_eq!(a, b);
        assert_ne!(a, PipelineKey::for_material(&Material::pass_through()));
    }
}
