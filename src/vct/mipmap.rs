//! Mipmap pyramid builder.
//!
//! Resolves the radiance working set into level 0 of its volume texture,
//! then halves the radiance and color volumes level by level with a box
//! filter. Levels are built strictly in order inside one encoder; each
//! dispatch sits in its own compute pass so level k+1 reads observe level
//! k's writes.

use super::shader_with_format;
use super::volume::VoxelVolume;
use crate::config::VoxelGridConfig;
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct ResolveUniform {
    dims: [u32; 4],
}

/// Host-side reference of the box filter: level k+1's voxel `(x, y, z)` is
/// the mean of level k's 2x2x2 block at `(2x, 2y, 2z)`.
pub fn box_filter_reference(level: &[[f32; 4]], dim: usize) -> Vec<[f32; 4]> {
    debug_assert_eq!(level.len(), dim * dim * dim);
    let half = (dim / 2).max(1);
    let index = |x: usize, y: usize, z: usize| x + dim * (y + dim * z);
    let mut out = vec![[0.0f32; 4]; half * half * half];

    for z in 0..half {
        for y in 0..half {
            for x in 0..half {
                let mut sum = [0.0f32; 4];
                for dz in 0..2 {
                    for dy in 0..2 {
                        for dx in 0..2 {
                            let sample = level[index(2 * x + dx, 2 * y + dy, 2 * z + dz)];
                            for c in 0..4 {
                                sum[c] += sample[c];
                            }
                        }
                    }
                }
                out[x + half * (y + half * z)] = sum.map(|c| c / 8.0);
            }
        }
    }
    out
}

/// The pyramid builder: one resolve pipeline plus the per-level box-filter
/// bind groups for both filtered volumes.
pub struct MipmapPyramidBuilder {
    resolve_pipeline: wgpu::ComputePipeline,
    resolve_bind_group: wgpu::BindGroup,
    filter_pipeline: wgpu::ComputePipeline,
    radiance_bind_groups: Vec<wgpu::BindGroup>,
    color_bind_groups: Vec<wgpu::BindGroup>,
    dim: u32,
    levels: u32,
}

impl MipmapPyramidBuilder {
    /// Create the pass; per-level bind groups are built up front.
    pub fn new(device: &wgpu::Device, config: &VoxelGridConfig, volume: &VoxelVolume) -> Self {
        let format = config.voxel_format;

        // Resolve: radiance buffer -> texture level 0.
        let resolve_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mipmap Resolve Shader"),
            source: wgpu::ShaderSource::Wgsl(
                shader_with_format(include_str!("../shaders/resolve.wgsl"), format).into(),
            ),
        });

        let resolve_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mipmap Resolve Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: format.texture_format(),
                        view_dimension: wgpu::TextureViewDimension::D3,
                    },
                    count: None,
                },
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

        let resolve_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Mipmap Resolve Pipeline"),
            layout: Some(&device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Mipmap Resolve Pipeline Layout"),
                bind_group_layouts: &[&resolve_layout],
                push_constant_ranges: &[],
            })),
            module: &resolve_shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let resolve_uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mipmap Resolve Uniform"),
            contents: bytemuck::bytes_of(&ResolveUniform {
                dims: [config.voxel_dim, 0, 0, 0],
            }),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        let resolve_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mipmap Resolve Bind Group"),
            layout: &resolve_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: volume.radiance_raw.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&volume.radiance_mip_views[0]),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: resolve_uniform.as_entire_binding(),
                },
            ],
        });

        // Box filter: level k -> level k+1.
        let filter_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Mipmap Filter Shader"),
            source: wgpu::ShaderSource::Wgsl(
                shader_with_format(include_str!("../shaders/mipmap.wgsl"), format).into(),
            ),
        });

        let filter_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mipmap Filter Bind Group Layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D3,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::COMPUTE,
                    ty: wgpu::BindingType::StorageTexture {
                        access: wgpu::StorageTextureAccess::WriteOnly,
                        format: format.texture_format(),
                        view_dimension: wgpu::TextureViewDimension::D3,
                    },
                    count: None,
                },
            ],
        });

        let filter_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Mipmap Filter Pipeline"),
            layout: Some(&device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Mipmap Filter Pipeline Layout"),
                bind_group_layouts: &[&filter_layout],
                push_constant_ranges: &[],
            })),
            module: &filter_shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let level_bind_groups = |views: &[wgpu::TextureView], label: &str| {
            (0..config.voxel_levels as usize)
                .map(|level| {
                    device.create_bind_group(&wgpu::BindGroupDescriptor {
                        label: Some(&format!("{} Level {} Bind Group", label, level)),
                        layout: &filter_layout,
                        entries: &[
                            wgpu::BindGroupEntry {
                                binding: 0,
                                resource: wgpu::BindingResource::TextureView(&views[level]),
                            },
                            wgpu::BindGroupEntry {
                                binding: 1,
                                resource: wgpu::BindingResource::TextureView(&views[level + 1]),
                            },
                        ],
                    })
                })
                .collect::<Vec<_>>()
        };

        let radiance_bind_groups = level_bind_groups(&volume.radiance_mip_views, "Mipmap Radiance");
        let color_bind_groups = level_bind_groups(&volume.color_mip_views, "Mipmap Color");

        Self {
            resolve_pipeline,
            resolve_bind_group,
            filter_pipeline,
            radiance_bind_groups,
            color_bind_groups,
            dim: config.voxel_dim,
            levels: config.voxel_levels,
        }
    }

    fn encode_pyramid(&self, encoder: &mut wgpu::CommandEncoder, bind_groups: &[wgpu::BindGroup]) {
        let mut dim = self.dim;
        for level in 0..self.levels as usize {
            let dst_dim = (dim >> 1).max(1);
            let groups = (dst_dim + 3) / 4;

            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Mipmap Filter Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.filter_pipeline);
            pass.set_bind_group(0, &bind_groups[level], &[]);
            pass.dispatch_workgroups(groups, groups, groups);
            drop(pass);

            dim = dst_dim;
        }
    }

    /// Resolve level 0 and build both pyramids, radiance first.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder) {
        {
            let groups = (self.dim + 3) / 4;
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Mipmap Resolve Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.resolve_pipeline);
            pass.set_bind_group(0, &self.resolve_bind_group, &[]);
            pass.dispatch_workgroups(groups, groups, groups);
        }

        self.encode_pyramid(encoder, &self.radiance_bind_groups);
        self.encode_pyramid(encoder, &self.color_bind_groups);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient_level(dim: usize) -> Vec<[f32; 4]> {
        (0..dim * dim * dim)
            .map(|i| {
                let v = i as f32 / (dim * dim * dim) as f32;
                [v, 1.0 - v, v * 0.5, 1.0]
            })
            .collect()
    }

    #[test]
    fn test_filter_halves_dimension() {
        let level = gradient_level(8);
        assert_eq!(box_filter_reference(&level, 8).len(), 4 * 4 * 4);
    }

    #[test]
    fn test_filter_is_idempotent_on_identical_input() {
        let level = gradient_level(8);
        let a = box_filter_reference(&level, 8);
        let b = box_filter_reference(&level, 8);
        assert_eq!(a, b);
    }

    #[test]
    fn test_filter_averages_blocks() {
        let dim = 4usize;
        let mut level = vec![[0.0f32; 4]; dim * dim * dim];
        // One fully lit cell in the first 2x2x2 block.
        level[0] = [1.0, 1.0, 1.0, 1.0];
        let next = box_filter_reference(&level, dim);
        for c in next[0] {
            assert!((c - 0.125).abs() < 1e-6);
        }
        assert_eq!(next[1], [0.0; 4]);
    }

    #[test]
    fn test_constant_volume_stays_constant() {
        let dim = 8usize;
        let level = vec![[0.5f32, 0.25, 0.75, 1.0]; dim * dim * dim];
        let next = box_filter_reference(&level, dim);
        for voxel in next {
            assert_eq!(voxel, [0.5, 0.25, 0.75, 1.0]);
        }
    }
}
