//! Radiance injection pass.
//!
//! Dispatches one thread per shadow-map texel rather than per voxel: every
//! lit texel reconstructs its world position through the inverse light
//! transform and scatters its flux into the radiance voxel it falls in,
//! which is the reflective-shadow-map injection scheme.

use super::shadow::ShadowPass;
use super::volume::VoxelVolume;
use super::warp::WarpMapBuilder;
use crate::config::{RenderSettings, VoxelGridConfig};
use crate::math::Matrix4;
use bytemuck::{Pod, Zeroable};

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct InjectUniform {
    light_space_inverse: [[f32; 4]; 4],
    grid_min: [f32; 4],
    grid_max: [f32; 4],
    grid_center: [f32; 4],
}

/// The radiance injection compute pass.
pub struct RadianceInjector {
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
    shadow_size: u32,
}

impl RadianceInjector {
    /// Create the pass over the shared shadow, volume and warp resources.
    pub fn new(
        device: &wgpu::Device,
        volume: &VoxelVolume,
        shadow: &ShadowPass,
        warp: &WarpMapBuilder,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Inject Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/inject.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Inject Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D3,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 4,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 6,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Inject Pipeline"),
            layout: Some(&device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Inject Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            })),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Inject Uniform"),
            size: std::mem::size_of::<InjectUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Inject Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(shadow.depth_view()),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(shadow.flux_view()),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: volume.radiance_raw.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(warp.warp_view()),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(warp.sampler()),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 6,
                    resource: wgpu::BindingResource::TextureView(shadow.normal_view()),
                },
            ],
        });

        Self {
            pipeline,
            bind_group,
            uniform_buffer,
            shadow_size: shadow.size(),
        }
    }

    /// Upload the frame's injection parameters.
    pub fn update(
        &self,
        queue: &wgpu::Queue,
        config: &VoxelGridConfig,
        settings: &RenderSettings,
        light_space: &Matrix4,
    ) {
        let warp_active = settings.warp_texture || settings.warp_voxels;
        let uniform = InjectUniform {
            light_space_inverse: light_space.inverse().to_cols_array_2d(),
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
                self.shadow_size as f32,
            ],
            grid_center: [
                config.center.x,
                config.center.y,
                config.center.z,
                warp_active as u32 as f32,
            ],
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniform));
    }

    /// Dispatch the injection over the shadow-map texel grid.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder) {
        let groups = (self.shadow_size + 15) / 16;
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Inject Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.dispatch_workgroups(groups, groups, 1);
    }
}
