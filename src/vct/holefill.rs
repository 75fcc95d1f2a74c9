//! Hole-filling pass.
//!
//! Dilates radiance into empty voxels from their populated face neighbors,
//! closing leaks left by voxelization gaps. Writes into an explicit second
//! buffer and copies back, so the dilation never reads its own writes.

use super::volume::VoxelVolume;
use crate::config::VoxelGridConfig;
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct HoleFillUniform {
    dims: [u32; 4],
}

/// The hole-filling compute pass.
pub struct HoleFiller {
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    dim: u32,
    buffer_size: u64,
}

impl HoleFiller {
    /// Create the pass over the radiance working set and its scratch buffer.
    pub fn new(device: &wgpu::Device, config: &VoxelGridConfig, volume: &VoxelVolume) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Hole Fill Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/holefill.wgsl").into()),
        });

        let storage_entry = |binding, read_only| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Storage { read_only },
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Hole Fill Bind Group Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Hole Fill Pipeline"),
            layout: Some(&device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Hole Fill Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            })),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Hole Fill Uniform"),
            contents: bytemuck::bytes_of(&HoleFillUniform {
                dims: [config.voxel_dim, 0, 0, 0],
            }),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Hole Fill Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: volume.radiance_raw.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: volume.radiance_scratch.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        });

        Self {
            pipeline,
            bind_group,
            dim: config.voxel_dim,
            buffer_size: config.voxel_count() * 4,
        }
    }

    /// Dispatch the dilation and copy the result back over the primary
    /// radiance buffer.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, volume: &VoxelVolume) {
        let groups = (self.dim + 3) / 4;
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Hole Fill Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.dispatch_workgroups(groups, groups, groups);
        }
        encoder.copy_buffer_to_buffer(
            &volume.radiance_scratch,
            0,
            &volume.radiance_raw,
            0,
            self.buffer_size,
        );
    }
}
