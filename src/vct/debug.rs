//! Debug visualizations: instanced voxel cubes, a fullscreen volume
//! raymarch, and a shadow-map blit.

use super::shadow::ShadowPass;
use super::volume::VoxelVolume;
use super::warp::WarpMapBuilder;
use crate::camera::Camera;
use crate::config::{RenderSettings, VoxelGridConfig};
use bytemuck::{Pod, Zeroable};

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct VoxelDebugUniform {
    mvp: [[f32; 4]; 4],
    grid_min: [f32; 4],
    grid_max: [f32; 4],
    grid_center: [f32; 4],
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct RaymarchUniform {
    eye: [f32; 4],
    forward: [f32; 4],
    right: [f32; 4],
    up: [f32; 4],
    grid_min: [f32; 4],
    grid_max: [f32; 4],
    grid_center: [f32; 4],
}

/// The bundled debug passes.
pub struct DebugPasses {
    voxel_pipeline: wgpu::RenderPipeline,
    voxel_uniform: wgpu::Buffer,
    voxel_color_bind_group: wgpu::BindGroup,
    voxel_radiance_bind_group: wgpu::BindGroup,

    raymarch_pipeline: wgpu::RenderPipeline,
    raymarch_uniform: wgpu::Buffer,
    raymarch_color_bind_group: wgpu::BindGroup,
    raymarch_radiance_bind_group: wgpu::BindGroup,

    blit_pipeline: wgpu::RenderPipeline,
    blit_bind_group: wgpu::BindGroup,

    dim: u32,
}

impl DebugPasses {
    /// Create all debug pipelines up front.
    pub fn new(
        device: &wgpu::Device,
        config: &VoxelGridConfig,
        volume: &VoxelVolume,
        warp: &WarpMapBuilder,
        shadow: &ShadowPass,
        output_format: wgpu::TextureFormat,
    ) -> Self {
        // Instanced voxel cubes.
        let voxel_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Debug Voxels Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/debug_voxels.wgsl").into()),
        });

        let voxel_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Debug Voxels Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D3,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let voxel_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Debug Voxels Pipeline"),
            layout: Some(&device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Debug Voxels Pipeline Layout"),
                bind_group_layouts: &[&voxel_layout],
                push_constant_ranges: &[],
            })),
            vertex: wgpu::VertexState {
                module: &voxel_shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &voxel_shader,
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

        let voxel_uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Debug Voxels Uniform"),
            size: std::mem::size_of::<VoxelDebugUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let voxel_bind_group = |label: &str, view: &wgpu::TextureView| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &voxel_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: voxel_uniform.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                ],
            })
        };
        let voxel_color_bind_group =
            voxel_bind_group("Debug Voxels Color Bind Group", &volume.color_view);
        let voxel_radiance_bind_group =
            voxel_bind_group("Debug Voxels Radiance Bind Group", &volume.radiance_view);

        // Fullscreen raymarch.
        let raymarch_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Raymarch Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/raymarch.wgsl").into()),
        });

        let raymarch_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Raymarch Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D3,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D3,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let raymarch_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Raymarch Pipeline"),
            layout: Some(&device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Raymarch Pipeline Layout"),
                bind_group_layouts: &[&raymarch_layout],
                push_constant_ranges: &[],
            })),
            vertex: wgpu::VertexState {
                module: &raymarch_shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &raymarch_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: output_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let raymarch_uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Raymarch Uniform"),
            size: std::mem::size_of::<RaymarchUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let volume_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Raymarch Volume Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let raymarch_bind_group = |label: &str, view: &wgpu::TextureView| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &raymarch_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: raymarch_uniform.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(view),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: wgpu::BindingResource::Sampler(&volume_sampler),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::TextureView(warp.warp_view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::Sampler(warp.sampler()),
                    },
                ],
            })
        };
        let raymarch_color_bind_group =
            raymarch_bind_group("Raymarch Color Bind Group", &volume.color_view);
        let raymarch_radiance_bind_group =
            raymarch_bind_group("Raymarch Radiance Bind Group", &volume.radiance_view);

        // Shadow-map blit.
        let blit_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Blit Depth Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/blit_depth.wgsl").into()),
        });

        let blit_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Blit Depth Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::NonFiltering),
                    count: None,
                },
            ],
        });

        let blit_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Blit Depth Pipeline"),
            layout: Some(&device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Blit Depth Pipeline Layout"),
                bind_group_layouts: &[&blit_layout],
                push_constant_ranges: &[],
            })),
            vertex: wgpu::VertexState {
                module: &blit_shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &blit_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: output_format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let blit_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Blit Depth Sampler"),
            ..Default::default()
        });

        let blit_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Blit Depth Bind Group"),
            layout: &blit_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(shadow.depth_view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&blit_sampler),
                },
            ],
        });

        Self {
            voxel_pipeline,
            voxel_uniform,
            voxel_color_bind_group,
            voxel_radiance_bind_group,
            raymarch_pipeline,
            raymarch_uniform,
            raymarch_color_bind_group,
            raymarch_radiance_bind_group,
            blit_pipeline,
            blit_bind_group,
            dim: config.voxel_dim,
        }
    }

    /// Upload the debug uniforms for this frame.
    pub fn update(
        &self,
        queue: &wgpu::Queue,
        config: &VoxelGridConfig,
        settings: &RenderSettings,
        camera: &Camera,
        aspect: f32,
    ) {
        let mip = settings.debug_mip_level.max(0.0);
        let mip_dim = (self.dim >> mip as u32).max(1);
        let mvp = camera.projection_matrix(aspect).multiply(&camera.view_matrix());

        let voxel_uniform = VoxelDebugUniform {
            mvp: mvp.to_cols_array_2d(),
            grid_min: [config.min.x, config.min.y, config.min.z, mip_dim as f32],
            grid_max: [config.max.x, config.max.y, config.max.z, mip],
            grid_center: [config.center.x, config.center.y, config.center.z, 0.0],
        };
        queue.write_buffer(&self.voxel_uniform, 0, bytemuck::bytes_of(&voxel_uniform));

        let warp_active = settings.warp_texture || settings.warp_voxels;
        let front = camera.front();
        let up = camera.up();
        let right = front.cross(&up).normalized() * aspect;
        let raymarch_uniform = RaymarchUniform {
            eye: [camera.position.x, camera.position.y, camera.position.z, 0.0],
            forward: [front.x, front.y, front.z, 0.0],
            right: [right.x, right.y, right.z, 0.0],
            up: [up.x, up.y, up.z, 0.0],
            grid_min: [config.min.x, config.min.y, config.min.z, mip],
            grid_max: [config.max.x, config.max.y, config.max.z, 0.0],
            grid_center: [
                config.center.x,
                config.center.y,
                config.center.z,
                warp_active as u32 as f32,
            ],
        };
        queue.write_buffer(&self.raymarch_uniform, 0, bytemuck::bytes_of(&raymarch_uniform));
    }

    /// Draw the instanced voxel cube view.
    pub fn encode_voxels(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        color_view: &wgpu::TextureView,
        depth_view: &wgpu::TextureView,
        settings: &RenderSettings,
    ) {
        let mip_dim = (self.dim >> settings.debug_mip_level.max(0.0) as u32).max(1);
        let instances = mip_dim * mip_dim * mip_dim;

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Debug Voxels Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
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
        pass.set_pipeline(&self.voxel_pipeline);
        let bind_group = if settings.draw_radiance {
            &self.voxel_radiance_bind_group
        } else {
            &self.voxel_color_bind_group
        };
        pass.set_bind_group(0, bind_group, &[]);
        pass.draw(0..36, 0..instances);
    }

    /// Draw the fullscreen raymarch view.
    pub fn encode_raymarch(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        color_view: &wgpu::TextureView,
        settings: &RenderSettings,
    ) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Raymarch Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.raymarch_pipeline);
        let bind_group = if settings.draw_radiance {
            &self.raymarch_radiance_bind_group
        } else {
            &self.raymarch_color_bind_group
        };
        pass.set_bind_group(0, bind_group, &[]);
        pass.draw(0..3, 0..1);
    }

    /// Blit the shadow map depth to the target.
    pub fn encode_shadowmap(&self, encoder: &mut wgpu::CommandEncoder, color_view: &wgpu::TextureView) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Blit Depth Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_pipeline(&self.blit_pipeline);
        pass.set_bind_group(0, &self.blit_bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}
