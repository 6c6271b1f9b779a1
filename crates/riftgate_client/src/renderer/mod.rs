pub mod pipeline;

use std::fmt;
use std::num::NonZeroU64;
use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use rustc_hash::FxHashMap;
use riftgate_shared::mesh::MeshData;
use riftgate_shared::scene::{DrawItem, MeshId, Scene};
use tracing::warn;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::frame::{FrameSink, RenderFrame};
use crate::renderer::pipeline::{MaterialPipelines, PipelineKey};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24PlusStencil8;
const INITIAL_DRAW_CAPACITY: usize = 64;

/// Stand-in for the passthrough camera image behind everything else.
const CAMERA_FEED_COLOR: wgpu::Color = wgpu::Color {
    r: 0.32,
    g: 0.34,
    b: 0.36,
    a: 1.0,
};

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct SceneVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub color: [f32; 4],
}

impl SceneVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x4];

    pub fn desc<'a>() -> wgpu::VertexBufferLayout<'a> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<SceneVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Interleaves a mesh; missing normals face +Y and missing colours are white.
pub fn scene_vertices(mesh: &MeshData) -> Vec<SceneVertex> {
    mesh.geometry
        .positions
        .iter()
        .enumerate()
        .map(|(index, position)| SceneVertex {
            position: position.to_array(),
            normal: mesh
                .normals
                .get(index)
                .map_or([0.0, 1.0, 0.0], |normal| normal.to_array()),
            color: mesh.colors.get(index).copied().unwrap_or([1.0; 4]),
        })
        .collect()
}

/// Stencil writers first so testers see a complete mask, then opaque, then
/// translucent.
pub fn sort_draws(draws: &mut [DrawItem]) {
    draws.sort_by_key(|draw| {
        if draw.material.writes_stencil() {
            0
        } else if draw.material.is_translucent() {
            2
        } else {
            1
        }
    });
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct FrameUniform {
    view_proj: [[f32; 4]; 4],
    camera_pos: [f32; 4],
    /// `time, resolution.x, resolution.y, 0`.
    time_resolution: [f32; 4],
}

#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
struct DrawUniform {
    model: [[f32; 4]; 4],
    color: [f32; 4],
    /// Emissive rgb plus intensity.
    emissive: [f32; 4],
}

impl DrawUniform {
    fn from_draw(draw: &DrawItem) -> Self {
        let material = &draw.material;
        Self {
            model: draw.world.to_cols_array_2d(),
            color: material.color,
            emissive: [
                material.emissive[0],
                material.emissive[1],
                material.emissive[2],
                material.emissive_intensity,
            ],
        }
    }
}

fn align_to(size: usize, alignment: usize) -> usize {
    size.div_ceil(alignment) * alignment
}

#[derive(Debug)]
struct DepthTexture {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthTexture {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Riftgate Depth Stencil Texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}

struct GpuMesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

impl GpuMesh {
    fn upload(device: &wgpu::Device, mesh: &MeshData) -> Self {
        let vertices = scene_vertices(mesh);
        let indices: Vec<u32> = mesh.geometry.triangles.iter().flatten().copied().collect();
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Mesh Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Scene Mesh Index Buffer"),
            contents: bytemuck::cast_slice(&indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: indices.len() as u32,
        }
    }
}

struct DrawBuffer {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: usize,
}

impl DrawBuffer {
    fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        stride: usize,
        capacity: usize,
    ) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Draw Uniform Buffer"),
            size: (stride * capacity) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw Bind Group"),
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &buffer,
                    offset: 0,
                    size: NonZeroU64::new(std::mem::size_of::<DrawUniform>() as u64),
                }),
            }],
        });
        Self {
            buffer,
            bind_group,
            capacity,
        }
    }
}

#[derive(Debug)]
pub enum RendererInitError {
    CreateSurface(wgpu::CreateSurfaceError),
    RequestAdapter(wgpu::RequestAdapterError),
    RequestDevice(wgpu::RequestDeviceError),
    UnsupportedSurface,
}

impl fmt::Display for RendererInitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CreateSurface(err) => write!(f, "failed to create surface: {err}"),
            Self::RequestAdapter(err) => write!(f, "failed to request adapter: {err}"),
            Self::RequestDevice(err) => write!(f, "failed to request device: {err}"),
            Self::UnsupportedSurface => write!(f, "adapter does not support this surface"),
        }
    }
}

impl std::error::Error for RendererInitError {}

pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface: wgpu::Surface<'static>,
    surface_config: wgpu::SurfaceConfiguration,
    depth_texture: DepthTexture,
    pipelines: MaterialPipelines,
    frame_buffer: wgpu::Buffer,
    frame_bind_group: wgpu::BindGroup,
    draw_bind_group_layout: wgpu::BindGroupLayout,
    draw_stride: usize,
    draws: DrawBuffer,
    meshes: FxHashMap<MeshId, GpuMesh>,
    surface_error: Option<wgpu::SurfaceError>,
}

impl Renderer {
    pub fn new(window: Arc<Window>) -> Result<Self, RendererInitError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .map_err(RendererInitError::CreateSurface)?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .map_err(RendererInitError::RequestAdapter)?;

        let (device, queue) = pollster::block_on(adapter.request_device(&wgpu::DeviceDescriptor {
            label: Some("Riftgate Device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            memory_hints: wgpu::MemoryHints::Performance,
            trace: wgpu::Trace::Off,
        }))
        .map_err(RendererInitError::RequestDevice)?;

        let initial_size = window.inner_size();
        let surface_config = surface
            .get_default_config(&adapter, initial_size.width.max(1), initial_size.height.max(1))
            .ok_or(RendererInitError::UnsupportedSurface)?;
        surface.configure(&device, &surface_config);

        let frame_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Frame Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });
        let draw_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("Draw Bind Group Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(
                            std::mem::size_of::<DrawUniform>() as u64,
                        ),
                    },
                    count: None,
                }],
            });

        let frame_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Frame Uniform Buffer"),
            contents: bytemuck::bytes_of(&FrameUniform::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let frame_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Frame Bind Group"),
            layout: &frame_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: frame_buffer.as_entire_binding(),
            }],
        });

        let pipelines = MaterialPipelines::new(
            &device,
            surface_config.format,
            DEPTH_FORMAT,
            &frame_bind_group_layout,
            &draw_bind_group_layout,
        );
        let draw_stride = align_to(
            std::mem::size_of::<DrawUniform>(),
            device.limits().min_uniform_buffer_offset_alignment as usize,
        );
        let draws = DrawBuffer::new(
            &device,
            &draw_bind_group_layout,
            draw_stride,
            INITIAL_DRAW_CAPACITY,
        );
        let depth_texture = DepthTexture::new(&device, surface_config.width, surface_config.height);

        Ok(Self {
            device,
            queue,
            surface,
            surface_config,
            depth_texture,
            pipelines,
            frame_buffer,
            frame_bind_group,
            draw_bind_group_layout,
            draw_stride,
            draws,
            meshes: FxHashMap::default(),
            surface_error: None,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }

        self.surface_config.width = width;
        self.surface_config.height = height;
        self.surface.configure(&self.device, &self.surface_config);
        self.depth_texture = DepthTexture::new(&self.device, width, height);
    }

    /// Error from the most recent submit, if presenting failed.
    pub fn take_surface_error(&mut self) -> Option<wgpu::SurfaceError> {
        self.surface_error.take()
    }

    fn upload_meshes(&mut self, scene: &Scene, draws: &[DrawItem]) {
        for draw in draws {
            if self.meshes.contains_key(&draw.mesh) {
                continue;
            }
            let Some(mesh) = scene.mesh(draw.mesh) else {
                warn!("draw references missing mesh {}", draw.mesh.index());
                continue;
            };
            self.meshes.insert(draw.mesh, GpuMesh::upload(&self.device, mesh));
        }
    }

    fn write_draw_uniforms(&mut self, draws: &[DrawItem]) {
        if draws.len() > self.draws.capacity {
            let capacity = draws.len().next_power_of_two();
            self.draws = DrawBuffer::new(
                &self.device,
                &self.draw_bind_group_layout,
                self.draw_stride,
                capacity,
            );
        }

        let mut staging = vec![0u8; self.draw_stride * draws.len()];
        for (index, draw) in draws.iter().enumerate() {
            let offset = index * self.draw_stride;
            let uniform = DrawUniform::from_draw(draw);
            let bytes = bytemuck::bytes_of(&uniform);
            staging[offset..offset + bytes.len()].copy_from_slice(bytes);
        }
        if !staging.is_empty() {
            self.queue.write_buffer(&self.draws.buffer, 0, &staging);
        }
    }

    pub fn render(&mut self, frame: &RenderFrame<'_>) -> Result<(), wgpu::SurfaceError> {
        let mut draws = frame.scene.draw_list();
        sort_draws(&mut draws);

        self.upload_meshes(frame.scene, &draws);
        self.write_draw_uniforms(&draws);

        let uniform = FrameUniform {
            view_proj: frame.view_projection.to_cols_array_2d(),
            camera_pos: frame.camera_position.extend(1.0).to_array(),
            time_resolution: [
                frame.uniforms.time,
                frame.uniforms.resolution.x,
                frame.uniforms.resolution.y,
                0.0,
            ],
        };
        self.queue
            .write_buffer(&self.frame_buffer, 0, bytemuck::bytes_of(&uniform));

        for draw in &draws {
            self.pipelines
                .get_or_create(&self.device, PipelineKey::for_material(&draw.material));
        }

        let surface_texture = self.surface.get_current_texture()?;
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Riftgate Command Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Riftgate Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CAMERA_FEED_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(0),
                        store: wgpu::StoreOp::Discard,
                    }),
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            render_pass.set_bind_group(0, &self.frame_bind_group, &[]);

            for (index, draw) in draws.iter().enumerate() {
                let Some(mesh) = self.meshes.get(&draw.mesh) else {
                    continue;
                };
                let Some(pipeline) = self
                    .pipelines
                    .cached(&PipelineKey::for_material(&draw.material))
                else {
                    continue;
                };

                let reference = draw.material.stencil.map_or(
                    u32::from(frame.stencil_reference),
                    |stencil| u32::from(stencil.reference),
                );
                render_pass.set_pipeline(pipeline);
                render_pass.set_stencil_reference(reference);
                let offset = (index * self.draw_stride) as u32;
                render_pass.set_bind_group(1, &self.draws.bind_group, &[offset]);
                render_pass.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
                render_pass
                    .set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
                render_pass.draw_indexed(0..mesh.index_count, 0, 0..1);
            }
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();
        Ok(())
    }
}

impl FrameSink for Renderer {
    fn submit(&mut self, frame: &RenderFrame<'_>) {
        if let Err(err) = self.render(frame) {
            self.surface_error = Some(err);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use glam::{Mat4, Vec3};
    use riftgate_shared::geometry::Transform;
    use riftgate_shared::material::Material;
    use riftgate_shared::mesh::disc;
    use riftgate_shared::scene::{DrawItem, Scene};

    use super::{align_to, scene_vertices, sort_draws, DrawUniform};

    #[test]
    fn stencil_writers_draw_before_everything_else() {
        let mut scene = Scene::new();
        let mesh = scene.add_mesh(Arc::new(disc(1.0, 8)));
        let node =
            scene.add_mesh_node("disc", Transform::IDENTITY, mesh, Material::default(), None);
        let make = |material| DrawItem {
            node,
            mesh,
            material,
            world: Mat4::IDENTITY,
        };
        let mut draws = vec![
            make(Material::pass_through()),
            make(Material::unlit([1.0; 4])),
            make(Material::stencil_mask(1)),
        ];
        sort_draws(&mut draws);

        assert!(draws[0].material.writes_stencil());
        assert!(!draws[1].material.is_translucent());
        assert!(draws[2].material.is_translucent());
    }

    #[test]
    fn vertices_fall_back_to_white_and_up() {
        let mut mesh = disc(1.0, 4);
        mesh.normals.clear();
        mesh.colors.truncate(1);
        let vertices = scene_vertices(&mesh);
        assert_eq!(vertices.len(), mesh.vertex_count());
        assert_eq!(vertices[1].normal, Vec3::Y.to_array());
        assert_eq!(vertices[1].color, [1.0; 4]);
    }

    #[test]
    fn draw_stride_respects_offset_alignment() {
        let size = std::mem::size_of::<DrawUniform>();
        assert_eq!(size, 96);
        assert_eq!(align_to(size, 256), 256);
        assert_eq!(align_to(256, 256), 256);
    }
}
