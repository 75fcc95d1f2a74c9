//! Cone-traced forward shading pass.
//!
//! Consumes the mipmap pyramids: direct lighting from the light list and the
//! shadow map, indirect diffuse from a hemisphere cone set and indirect
//! specular from a single reflection cone, with the mip level selected per
//! step from the cone footprint.

use super::shadow::ShadowPass;
use super::volume::VoxelVolume;
use super::warp::WarpMapBuilder;
use crate::camera::Camera;
use crate::config::{RenderSettings, VoxelGridConfig};
use crate::geometry::Vertex;
use crate::light::LightList;
use crate::math::Matrix4;
use crate::scene::SceneSource;
use bytemuck::{Pod, Zeroable};

/// Uniform surface roughness used when the specular cone angle is derived
/// from roughness; the narrow scene interface carries no material data.
const MATERIAL_ROUGHNESS: f32 = 0.3;

/// Sky clear color for the final target.
pub const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.5294,
    g: 0.8078,
    b: 0.9216,
    a: 1.0,
};

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct CameraUniform {
    view_proj: [[f32; 4]; 4],
    light_space: [[f32; 4]; 4],
    eye: [f32; 4],
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct TraceUniform {
    grid_min: [f32; 4],
    grid_max: [f32; 4],
    grid_center: [f32; 4],
    diffuse_cone: [f32; 4],
    diffuse_params: [f32; 4],
    specular_cone: [f32; 4],
    specular_params: [f32; 4],
    flags: [u32; 4],
}

/// The final shading pass.
pub struct ConeTracingPass {
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    camera_buffer: wgpu::Buffer,
    trace_buffer: wgpu::Buffer,
}

impl ConeTracingPass {
    /// Create the pass for a given output color format.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device: &wgpu::Device,
        volume: &VoxelVolume,
        warp: &WarpMapBuilder,
        shadow: &ShadowPass,
        lights: &LightList,
        output_format: wgpu::TextureFormat,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Trace Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/trace.wgsl").into()),
        });

        let uniform_entry = |binding, visibility| wgpu::BindGroupLayoutEntry {
            binding,
            visibility,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };
        let volume_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D3,
                multisampled: false,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Trace Bind Group Layout"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT),
                uniform_entry(1, wgpu::ShaderStages::FRAGMENT),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                volume_entry(3),
                volume_entry(4),
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                volume_entry(6),
                wgpu::BindGroupLayoutEntry {
                    binding: 7,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 8,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 9,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Trace Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Trace Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: output_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: Some(wgpu::Face::Back),
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: wgpu::TextureFormat::Depth32Float,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Trace Camera Buffer"),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let trace_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Trace Settings Buffer"),
            size: std::mem::size_of::<TraceUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let volume_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Trace Volume Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Trace Shadow Sampler"),
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Trace Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: trace_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: lights.buffer().as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&volume.radiance_view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&volume.color_view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: wgpu::BindingResource::Sampler(&volume_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::TextureView(warp.warp_view()),
                },
                wgpu::BindGroupEntry {
                    binding: 7,
                    resource: wgpu::BindingResource::Sampler(warp.sampler()),
                },
                wgpu::BindGroupEntry {
                    binding: 8,
                    resource: wgpu::BindingResource::TextureView(shadow.depth_view()),
                },
                wgpu::BindGroupEntry {
                    binding: 9,
                    resource: wgpu::BindingResource::Sampler(&shadow_sampler),
                },
            ],
        });

        Self {
            pipeline,
            bind_group,
            camera_buffer,
            trace_buffer,
        }
    }

    /// Upload the frame's camera and cone parameters.
    pub fn update(
        &self,
        queue: &wgpu::Queue,
        config: &VoxelGridConfig,
        settings: &RenderSettings,
        camera: &Camera,
        aspect: f32,
        light_space: &Matrix4,
    ) {
        let view_proj = camera.projection_matrix(aspect).multiply(&camera.view_matrix());
        let camera_uniform = CameraUniform {
            view_proj: view_proj.to_cols_array_2d(),
            light_space: light_space.to_cols_array_2d(),
            eye: [camera.position.x, camera.position.y, camera.position.z, 1.0],
        };
        queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&camera_uniform));

        let warp_active = settings.warp_texture || settings.warp_voxels;
        let diffuse = &settings.diffuse_cones;
        let specular = &settings.specular_cones;
        let trace_uniform = TraceUniform {
            grid_min: [
                config.min.x,
                config.min.y,
                config.min.z,
                config.voxel_dim as f32,
            ],
            grid_max: [
                config.max.x,
                config.max.y,
                config.max.z,
                config.voxel_levels as f32,
            ],
            grid_center: [
                config.center.x,
                config.center.y,
                config.center.z,
                warp_active as u32 as f32,
            ],
            diffuse_cone: [
                diffuse.steps as f32,
                diffuse.bias,
                diffuse.cone_angle,
                diffuse.cone_initial_height,
            ],
            diffuse_params: [
                diffuse.lod_offset,
                settings.ambient_scale,
                settings.reflect_scale,
                0.0,
            ],
            specular_cone: [
                specular.steps as f32,
                specular.bias,
                specular.cone_angle,
                specular.cone_initial_height,
            ],
            specular_params: [
                specular.lod_offset,
                settings.specular_cone_angle_from_roughness as u32 as f32,
                MATERIAL_ROUGHNESS,
                0.0,
            ],
            flags: [
                settings.enable_diffuse as u32,
                settings.enable_specular as u32,
                settings.enable_shadows as u32,
                settings.draw_normals as u32,
            ],
        };
        queue.write_buffer(&self.trace_buffer, 0, bytemuck::bytes_of(&trace_uniform));
    }

    /// Render the scene into the frame target.
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        color_view: &wgpu::TextureView,
        depth_view: &wgpu::TextureView,
        scene: &dyn SceneSource,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Trace Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        scene.draw(&mut pass);
    }
}
