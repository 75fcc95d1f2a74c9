//! Warp map construction.
//!
//! The occupancy grid is scanned on the host into three per-axis prefix-sum
//! volumes and a per-count weight table, which a compute kernel expands into
//! a 3D lookup texture remapping uniform voxel coordinates to non-uniform
//! positions that concentrate resolution near geometry.

use crate::config::{RenderSettings, VoxelGridConfig};
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

/// Inclusive per-axis prefix sums over a binary occupancy grid.
///
/// Entry `(x, y, z)` holds, per axis, the number of occupied cells from the
/// row start through that cell. Returned as `[i32; 4]` to match the GPU
/// `vec4<i32>` layout.
pub fn prefix_sums(grid: &[u32], dim: usize) -> Vec<[i32; 4]> {
    debug_assert_eq!(grid.len(), dim * dim * dim);
    let index = |x: usize, y: usize, z: usize| x + dim * (y + dim * z);
    let mut sums = vec![[0i32; 4]; grid.len()];

    for z in 0..dim {
        for y in 0..dim {
            let mut sum = 0;
            for x in 0..dim {
                sum += (grid[index(x, y, z)] > 0) as i32;
                sums[index(x, y, z)][0] = sum;
            }
        }
    }

    for z in 0..dim {
        for x in 0..dim {
            let mut sum = 0;
            for y in 0..dim {
                sum += (grid[index(x, y, z)] > 0) as i32;
                sums[index(x, y, z)][1] = sum;
            }
        }
    }

    for y in 0..dim {
        for x in 0..dim {
            let mut sum = 0;
            for z in 0..dim {
                sum += (grid[index(x, y, z)] > 0) as i32;
                sums[index(x, y, z)][2] = sum;
            }
        }
    }

    sums
}

/// Solve the low/high resolution weights for a row with `occupied` cells.
///
/// The weights satisfy `low * empty + high * occupied == dim`. `high` is
/// fixed to its configured cap and `low` solved for; if `low` falls below
/// its floor, it is clamped there and `high` re-solved. The resulting `high`
/// is deliberately not re-validated against the cap.
pub fn solve_weights(dim: u32, occupied: u32, low_min: f32, high_max: f32) -> (f32, f32) {
    if occupied == 0 || occupied == dim {
        // Fully empty or fully occupied rows stay uniform.
        return (1.0, 1.0);
    }

    let total = dim as f32;
    let empty = (dim - occupied) as f32;

    let mut high = high_max;
    let mut low = (total - high * occupied as f32) / empty;
    if low < low_min {
        low = low_min;
        high = (total - low * empty) / occupied as f32;
    }
    (low, high)
}

/// The per-count weight table uploaded to the GPU: `dim + 1` low weights
/// followed by `dim + 1` high weights, indexed by occupied count.
pub fn weight_table(dim: u32, low_min: f32, high_max: f32) -> Vec<f32> {
    let entries = dim as usize + 1;
    let mut table = vec![0.0f32; entries * 2];
    for occupied in 0..=dim {
        let (low, high) = solve_weights(dim, occupied, low_min, high_max);
        table[occupied as usize] = low;
        table[entries + occupied as usize] = high;
    }
    table
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct WarpDimsUniform {
    dims: [u32; 4],
    axes: [u32; 4],
}

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct BlurUniform {
    dims: [u32; 4],
}

fn weight_texture(device: &wgpu::Device, label: &str, dim: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: dim,
            height: dim,
            depth_or_array_layers: dim,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D3,
        format: wgpu::TextureFormat::Rgba16Float,
        usage: wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::STORAGE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

/// Builds and owns the warp lookup texture and its auxiliary weight volumes.
pub struct WarpMapBuilder {
    warp_texture: wgpu::Texture,
    warp_view: wgpu::TextureView,
    warp_sampler: wgpu::Sampler,

    weights_low_texture: wgpu::Texture,
    weights_high_texture: wgpu::Texture,
    blur_scratch_texture: wgpu::Texture,

    partials_buffer: wgpu::Buffer,
    table_buffer: wgpu::Buffer,
    gen_uniform: wgpu::Buffer,
    weights_uniform: wgpu::Buffer,

    weights_pipeline: wgpu::ComputePipeline,
    weights_bind_group: wgpu::BindGroup,
    blur_pipeline: wgpu::ComputePipeline,
    // Double-buffered blur: high -> scratch -> high -> scratch, then copy back.
    blur_bind_groups: [wgpu::BindGroup; 3],
    blur_uniforms: [wgpu::Buffer; 3],
    gen_pipeline: wgpu::ComputePipeline,
    gen_bind_group: wgpu::BindGroup,

    dim: u32,
}

impl WarpMapBuilder {
    /// Create the warp resources and kernels over an existing occupancy
    /// grid buffer.
    pub fn new(
        device: &wgpu::Device,
        config: &VoxelGridConfig,
        occupancy_buffer: &wgpu::Buffer,
    ) -> Self {
        let dim = config.occupancy_dim;

        let warp_texture = weight_texture(device, "Warp Map Texture", dim);
        let warp_view = warp_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let warp_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Warp Map Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let weights_low_texture = weight_texture(device, "Warp Weights Low Texture", dim);
        let weights_high_texture = weight_texture(device, "Warp Weights High Texture", dim);
        let blur_scratch_texture = weight_texture(device, "Warp Blur Scratch Texture", dim);

        let partials_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Warp Partials Buffer"),
            size: config.occupancy_count() * 16,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let table_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Warp Weight Table Buffer"),
            size: (dim as u64 + 1) * 2 * 4,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let gen_uniform = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Warp Gen Uniform"),
            size: std::mem::size_of::<WarpDimsUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let weights_uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Warp Weights Uniform"),
            contents: bytemuck::bytes_of(&BlurUniform { dims: [dim, 0, 0, 0] }),
            usage: wgpu::BufferUsages::UNIFORM,
        });

        // Weights pre-pass.
        let weights_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Warp Weights Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/warp_weights.wgsl").into()),
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
                format: wgpu::TextureFormat::Rgba16Float,
                view_dimension: wgpu::TextureViewDimension::D3,
            },
            count: None,
        };
        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: false },
                view_dimension: wgpu::TextureViewDimension::D3,
                multisampled: false,
            },
            count: None,
        };
        let uniform_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::COMPUTE,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: None,
            },
            count: None,
        };

        let weights_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Warp Weights Bind Group Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                storage_texture_entry(2),
                storage_texture_entry(3),
                uniform_entry(4),
            ],
        });

        let weights_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Warp Weights Pipeline"),
            layout: Some(&device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Warp Weights Pipeline Layout"),
                bind_group_layouts: &[&weights_layout],
                push_constant_ranges: &[],
            })),
            module: &weights_shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let low_view = weights_low_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let high_view = weights_high_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let scratch_view = blur_scratch_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let weights_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Warp Weights Bind Group"),
            layout: &weights_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: partials_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: table_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&low_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&high_view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: weights_uniform.as_entire_binding(),
                },
            ],
        });

        // Separable Gaussian blur over the high-resolution weights.
        let blur_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Warp Blur Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/gaussian_blur.wgsl").into()),
        });

        let blur_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Warp Blur Bind Group Layout"),
            entries: &[texture_entry(0), storage_texture_entry(1), uniform_entry(2)],
        });

        let blur_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Warp Blur Pipeline"),
            layout: Some(&device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Warp Blur Pipeline Layout"),
                bind_group_layouts: &[&blur_layout],
                push_constant_ranges: &[],
            })),
            module: &blur_shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let blur_uniforms: [wgpu::Buffer; 3] = std::array::from_fn(|axis| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("Warp Blur Axis {} Uniform", axis)),
                contents: bytemuck::bytes_of(&BlurUniform {
                    dims: [axis as u32, dim, 0, 0],
                }),
                usage: wgpu::BufferUsages::UNIFORM,
            })
        });

        let blur_bind_group = |label: &str, src: &wgpu::TextureView, dst: &wgpu::TextureView, axis: usize| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout: &blur_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: wgpu::BindingResource::TextureView(src),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: wgpu::BindingResource::TextureView(dst),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: blur_uniforms[axis].as_entire_binding(),
                    },
                ],
            })
        };
        let blur_bind_groups = [
            blur_bind_group("Warp Blur X Bind Group", &high_view, &scratch_view, 0),
            blur_bind_group("Warp Blur Y Bind Group", &scratch_view, &high_view, 1),
            blur_bind_group("Warp Blur Z Bind Group", &high_view, &scratch_view, 2),
        ];

        // Warp map generation.
        let gen_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Warp Gen Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/warp_gen.wgsl").into()),
        });

        let gen_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Warp Gen Bind Group Layout"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, true),
                texture_entry(2),
                texture_entry(3),
                storage_texture_entry(4),
                uniform_entry(5),
            ],
        });

        let gen_pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Warp Gen Pipeline"),
            layout: Some(&device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("Warp Gen Pipeline Layout"),
                bind_group_layouts: &[&gen_layout],
                push_constant_ranges: &[],
            })),
            module: &gen_shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let warp_storage_view = warp_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let gen_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Warp Gen Bind Group"),
            layout: &gen_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: occupancy_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: table_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&low_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&high_view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(&warp_storage_view),
                },
                wgpu::BindGroupEntry {
                    binding: 5,
                    resource: gen_uniform.as_entire_binding(),
                },
            ],
        });

        Self {
            warp_texture,
            warp_view,
            warp_sampler,
            weights_low_texture,
            weights_high_texture,
            blur_scratch_texture,
            partials_buffer,
            table_buffer,
            gen_uniform,
            weights_uniform,
            weights_pipeline,
            weights_bind_group,
            blur_pipeline,
            blur_bind_groups,
            blur_uniforms,
            gen_pipeline,
            gen_bind_group,
            dim,
        }
    }

    /// Scan the read-back occupancy grid and upload the derived tables.
    pub fn upload_tables(&self, queue: &wgpu::Queue, grid: &[u32], settings: &RenderSettings) {
        let sums = prefix_sums(grid, self.dim as usize);
        let table = weight_table(
            self.dim,
            settings.warp_low_resolution,
            settings.warp_high_resolution,
        );
        queue.write_buffer(&self.partials_buffer, 0, bytemuck::cast_slice(&sums));
        queue.write_buffer(&self.table_buffer, 0, bytemuck::cast_slice(&table));

        let uniform = WarpDimsUniform {
            dims: [
                self.dim,
                settings.use_warp_weights_texture as u32,
                settings.warp_texture_linear as u32,
                0,
            ],
            axes: [
                settings.warp_axes[0] as u32,
                settings.warp_axes[1] as u32,
                settings.warp_axes[2] as u32,
                0,
            ],
        };
        queue.write_buffer(&self.gen_uniform, 0, bytemuck::bytes_of(&uniform));
    }

    /// Encode the weight pre-pass, optional blur, and warp map generation.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, settings: &RenderSettings) {
        let groups = (self.dim + 3) / 4;

        if settings.use_warp_weights_texture {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Warp Weights Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.weights_pipeline);
            pass.set_bind_group(0, &self.weights_bind_group, &[]);
            pass.dispatch_workgroups(groups, groups, groups);
            drop(pass);

            if settings.blur_warp_weights {
                for bind_group in &self.blur_bind_groups {
                    let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                        label: Some("Warp Blur Pass"),
                        timestamp_writes: None,
                    });
                    pass.set_pipeline(&self.blur_pipeline);
                    pass.set_bind_group(0, bind_group, &[]);
                    pass.dispatch_workgroups(groups, groups, groups);
                }
                // The odd pass count leaves the result in the scratch volume.
                encoder.copy_texture_to_texture(
                    self.blur_scratch_texture.as_image_copy(),
                    self.weights_high_texture.as_image_copy(),
                    wgpu::Extent3d {
                        width: self.dim,
                        height: self.dim,
                        depth_or_array_layers: self.dim,
                    },
                );
            }
        }

        let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Warp Gen Pass"),
            timestamp_writes: None,
        });
        pass.set_pipeline(&self.gen_pipeline);
        pass.set_bind_group(0, &self.gen_bind_group, &[]);
        pass.dispatch_workgroups(groups, groups, groups);
    }

    /// The warp lookup texture view.
    #[inline]
    pub fn warp_view(&self) -> &wgpu::TextureView {
        &self.warp_view
    }

    /// The sampler for the warp lookup texture.
    #[inline]
    pub fn sampler(&self) -> &wgpu::Sampler {
        &self.warp_sampler
    }

    /// Keep the weight volumes alive for debug inspection.
    #[inline]
    pub fn weights_low_texture(&self) -> &wgpu::Texture {
        &self.weights_low_texture
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIM: u32 = 16;
    const LOW: f32 = 0.25;
    const HIGH: f32 = 2.0;

    #[test]
    fn test_weights_satisfy_identity() {
        for occupied in 1..DIM {
            let (low, high) = solve_weights(DIM, occupied, LOW, HIGH);
            let total = low * (DIM - occupied) as f32 + high * occupied as f32;
            assert!((total - DIM as f32).abs() < 1e-4, "occupied = {}", occupied);
            assert!(high <= HIGH + 1e-6 || low == LOW);
            assert!(low >= LOW - 1e-6);
        }
    }

    #[test]
    fn test_degenerate_rows_are_uniform() {
        assert_eq!(solve_weights(DIM, 0, LOW, HIGH), (1.0, 1.0));
        assert_eq!(solve_weights(DIM, DIM, LOW, HIGH), (1.0, 1.0));
    }

    #[test]
    fn test_clamp_resolves_high() {
        // Nearly full row: solving low first drives it under the floor, so
        // low clamps and high is re-solved below its cap.
        let occupied = DIM - 1;
        let (low, high) = solve_weights(DIM, occupied, LOW, HIGH);
        assert_eq!(low, LOW);
        let expected_high = (DIM as f32 - LOW) / occupied as f32;
        assert!((high - expected_high).abs() < 1e-5);
        assert!(high < HIGH);
    }

    #[test]
    fn test_weight_table_layout() {
        let table = weight_table(DIM, LOW, HIGH);
        assert_eq!(table.len(), (DIM as usize + 1) * 2);
        // Degenerate entries at both ends of each half.
        assert_eq!(table[0], 1.0);
        assert_eq!(table[DIM as usize], 1.0);
        assert_eq!(table[DIM as usize + 1], 1.0);
        assert_eq!(table.last(), Some(&1.0));
    }

    #[test]
    fn test_prefix_sums_monotone_and_total() {
        let dim = 8usize;
        let mut grid = vec![0u32; dim * dim * dim];
        // Occupy a diagonal band.
        for i in 0..dim {
            grid[i + dim * (i + dim * i)] = 1;
            grid[i + dim * (i + dim * ((i + 1) % dim))] = 3;
        }

        let sums = prefix_sums(&grid, dim);
        let index = |x: usize, y: usize, z: usize| x + dim * (y + dim * z);

        for z in 0..dim {
            for y in 0..dim {
                let mut previous = 0;
                let mut occupied = 0;
                for x in 0..dim {
                    let value = sums[index(x, y, z)][0];
                    assert!(value >= previous);
                    previous = value;
                    occupied += (grid[index(x, y, z)] > 0) as i32;
                }
                assert_eq!(sums[index(dim - 1, y, z)][0], occupied);
            }
        }
    }

    #[test]
    fn test_prefix_sums_zero_grid() {
        let dim = 4usize;
        let grid = vec![0u32; dim * dim * dim];
        let sums = prefix_sums(&grid, dim);
        assert!(sums.iter().all(|entry| entry[..3] == [0, 0, 0]));
    }

    #[test]
    fn test_uniform_weights_for_empty_and_full_scene() {
        // Zero geometry: every row degenerate, all weights uniform.
        let table = weight_table(DIM, LOW, HIGH);
        let full_rows = 0usize;
        assert_eq!(table[full_rows], 1.0);
        // A grid-filling cube: every row fully occupied, also uniform.
        assert_eq!(table[DIM as usize], 1.0);
        assert_eq!(table[(DIM as usize + 1) + DIM as usize], 1.0);
    }
}
