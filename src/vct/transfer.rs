//! Voxel transfer pass.
//!
//! Resolves the raw atomic color/normal voxelization into the volume
//! textures and folds the frame's contribution into the radiance working
//! set, with optional exponential temporal blending against the previous
//! frame. The blend happens in place; the pipeline orders this pass strictly
//! after voxelization so the raw buffers have converged.

use super::shader_with_format;
use super::volume::VoxelVolume;
use crate::config::{RenderSettings, VoxelGridConfig};
use bytemuck::{Pod, Zeroable};

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct TransferUniform {
    dims: [u32; 4],
    factors: [f32; 4],
}

/// Host-side reference for the temporal blend the kernel applies.
///
/// `decay = 1` keeps the history untouched, `decay = 0` takes the new
/// contribution verbatim.
pub fn temporal_blend(previous: [f32; 4], contribution: [f32; 4], decay: f32) -> [f32; 4] {
    let mut out = [0.0; 4];
    for i in 0..4 {
        out[i] = previous[i] * decay + contribution[i] * (1.0 - decay);
    }
    out
}

/// The voxel transfer compute pass.
pub struct VoxelTransfer {
    pipeline: wgpu::ComputePipeline,
    bind_group: wgpu::BindGroup,
    uniform_buffer: wgpu::Buffer,
    dim: u32,
}

impl VoxelTransfer {
    /// Create the pass over the shared volume resources.
    pub fn new(device: &wgpu::Device, config: &VoxelGridConfig, volume: &VoxelVolume) -> Self {
        let source = shader_with_format(
            include_str!("../shaders/transfer.wgsl"),
            config.voxel_format,
        );
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Transfer Shader"),
            source: wgpu::ShaderSource::Wgsl(source.into()),
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
        let storage_texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::StorageTexture {
                access: wgpu::StorageTextureAccess::WriteOnly,
                format: config.voxel_format.texture_format(),
                view_dimension: wgpu::TextureViewDimension::D3,
            },
            count: None,
        };

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Transfer Bind Group Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_entry(2, false),
                storage_texture_entry(3),
                storage_texture_entry(4),
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
            ],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Transfer Pipeline"),
            layout: Some(&device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Transfer Pipeline Layout"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            })),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Transfer Uniform"),
            size: std::mem::size_of::<TransferUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Transfer Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: volume.color_raw.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: volume.normal_raw.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: volume.radiance_raw.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&volume.color_mip_views[0]),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&volume.normal_base_view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: uniform_buffer.as_entire_binding(),
                },
            ],
        });

        Self {
            pipeline,
            bind_group,
            uniform_buffer,
            dim: config.voxel_dim,
        }
    }

    /// Upload the frame's transfer parameters.
    pub fn update(&self, queue: &wgpu::Queue, settings: &RenderSettings) {
        let uniform = TransferUniform {
            dims: [
                self.dim,
                settings.temporal_filter_radiance as u32,
                0,
                0,
            ],
            factors: [
                settings.temporal_decay.clamp(0.0, 1.0),
                settings.voxel_set_opacity.clamp(0.0, 1.0),
                0.0,
                0.0,
            ],
        };
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniform));
    }

    /// Dispatch the transfer.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder) {
        let groups = (self.dim + 3) / 4;
        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Transfer Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.dispatch_workgroups(groups, groups, groups);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_decay_keeps_history() {
        let previous = [0.3, 0.5, 0.7, 1.0];
        let contribution = [0.9, 0.1, 0.2, 1.0];
        assert_eq!(temporal_blend(previous, contribution, 1.0), previous);
    }

    #[test]
    fn test_zero_decay_takes_contribution() {
        let previous = [0.3, 0.5, 0.7, 1.0];
        let contribution = [0.9, 0.1, 0.2, 1.0];
        assert_eq!(temporal_blend(previous, contribution, 0.0), contribution);
    }

    #[test]
    fn test_blend_is_convex() {
        let blended = temporal_blend([1.0, 0.0, 0.0, 0.0], [0.0, 1.0, 0.0, 0.0], 0.25);
        assert!((blended[0] - 0.25).abs() < 1e-6);
        assert!((blended[1] - 0.75).abs() < 1e-6);
    }
}
