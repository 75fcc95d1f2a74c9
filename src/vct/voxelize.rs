//! Scene voxelization pass.
//!
//! Rasterizes the scene from three orthogonal axes into the raw color and
//! normal buffers with atomic-max blending. An alternate path subdivides the
//! triangles on the host first, so even large polygons voxelize without
//! gaps; exactly one of the two paths runs per frame.

use super::occupancy::{axis_view_projections, voxelize_pipeline_variants, RasterTargets};
use super::shadow::ShadowPass;
use super::volume::VoxelVolume;
use super::warp::WarpMapBuilder;
use crate::config::{ConservativeRasterMode, RenderSettings, VoxelGridConfig};
use crate::geometry::subdivide_triangles;
use crate::light::Light;
use crate::math::Matrix4;
use crate::scene::SceneSource;
use bytemuck::{Pod, Zeroable};

/// Initial capacity of the tessellation scratch buffer, in vertices.
const SCRATCH_CAPACITY: u64 = 1 << 17;

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct VoxelizeUniform {
    mvp: [[f32; 4]; 4],
    light_space: [[f32; 4]; 4],
    grid_min: [f32; 4],
    grid_max: [f32; 4],
    grid_center: [f32; 4],
    light_direction: [f32; 4],
    light_color: [f32; 4],
    flags: [u32; 4],
}

/// The three-axis scene voxelizer.
pub struct SceneVoxelizer {
    pipelines: [wgpu::RenderPipeline; 3],
    raster_targets: RasterTargets,
    axis_buffers: [wgpu::Buffer; 3],
    axis_bind_groups: [wgpu::BindGroup; 3],
    scratch_buffer: wgpu::Buffer,
    scratch_capacity: u64,
    dim: u32,
}

impl SceneVoxelizer {
    /// Create the pass over the shared volume, warp and shadow resources.
    pub fn new(
        device: &wgpu::Device,
        config: &VoxelGridConfig,
        volume: &VoxelVolume,
        warp: &WarpMapBuilder,
        shadow: &ShadowPass,
        conservative: bool,
    ) -> Self {
        let dim = config.voxel_dim;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Voxelize Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/voxelize.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Voxelize Bind Group Layout"),
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
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
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
                wgpu::BindGroupLayoutEntry {
                    binding: 5,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Depth,
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 6,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Comparison),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Voxelize Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipelines =
            voxelize_pipeline_variants(device, "Voxelize", &pipeline_layout, &shader, conservative);

        let shadow_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Voxelize Shadow Sampler"),
            compare: Some(wgpu::CompareFunction::LessEqual),
            ..Default::default()
        });

        let axis_buffers: [wgpu::Buffer; 3] = std::array::from_fn(|axis| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("Voxelize Axis {} Uniform", axis)),
                size: std::mem::size_of::<VoxelizeUniform>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });

        let axis_bind_groups: [wgpu::BindGroup; 3] = std::array::from_fn(|axis| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("Voxelize Axis {} Bind Group", axis)),
                layout: &bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: axis_buffers[axis].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: volume.color_raw.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: volume.normal_raw.as_entire_binding(),
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
                        resource: wgpu::BindingResource::TextureView(shadow.depth_view()),
                    },
                    wgpu::BindGroupEntry {
                        binding: 6,
                        resource: wgpu::BindingResource::Sampler(&shadow_sampler),
                    },
                ],
            })
        });

        let scratch_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Voxelize Tessellation Scratch Buffer"),
            size: SCRATCH_CAPACITY * std::mem::size_of::<crate::geometry::Vertex>() as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            pipelines,
            raster_targets: RasterTargets::new(device, "Voxelize Raster Target", dim),
            axis_buffers,
            axis_bind_groups,
            scratch_buffer,
            scratch_capacity: SCRATCH_CAPACITY,
            dim,
        }
    }

    /// Upload the per-axis uniforms for this frame.
    pub fn update(
        &self,
        queue: &wgpu::Queue,
        config: &VoxelGridConfig,
        settings: &RenderSettings,
        light: Option<&Light>,
        light_space: &Matrix4,
    ) {
        let matrices = axis_view_projections(config);
        let (direction, color) = match light {
            Some(light) => (light.direction.to_array(), light.color.to_array()),
            None => ([0.0; 3], [0.0; 3]),
        };
        let warp_active = settings.warp_texture || settings.warp_voxels;

        for (axis, mvp) in matrices.iter().enumerate() {
            let uniform = VoxelizeUniform {
                mvp: mvp.to_cols_array_2d(),
                light_space: light_space.to_cols_array_2d(),
                grid_min: [
                    config.min.x,
                    config.min.y,
                    config.min.z,
                    config.voxel_dim as f32,
                ],
                grid_max: [config.max.x, config.max.y, config.max.z, 0.0],
                grid_center: [config.center.x, config.center.y, config.center.z, 0.0],
                light_direction: [direction[0], direction[1], direction[2], 0.0],
                light_color: [color[0], color[1], color[2], 0.0],
                flags: [
                    warp_active as u32,
                    (settings.voxelize_lighting && light.is_some()) as u32,
                    0,
                    0,
                ],
            };
            queue.write_buffer(&self.axis_buffers[axis], 0, bytemuck::bytes_of(&uniform));
        }
    }

    fn encode_axis_passes(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        mode: ConservativeRasterMode,
        mut draw: impl FnMut(&mut wgpu::RenderPass<'_>),
    ) {
        let pipeline = match mode {
            ConservativeRasterMode::Off => &self.pipelines[0],
            ConservativeRasterMode::Hardware => &self.pipelines[1],
            ConservativeRasterMode::Multisample => &self.pipelines[2],
        };

        for axis in 0..3 {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Voxelize Axis Pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: self.raster_targets.view(mode),
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &self.axis_bind_groups[axis], &[]);
            draw(&mut pass);
        }
    }

    /// Voxelize the scene through the direct rasterization path.
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        scene: &dyn SceneSource,
        settings: &RenderSettings,
    ) {
        self.encode_axis_passes(encoder, settings.conservative_rasterization, |pass| {
            scene.draw(pass);
        });
    }

    /// Voxelize the scene through the host-tessellated path: subdivide the
    /// triangles until edges fit within a voxel, then rasterize the refined
    /// list.
    pub fn encode_tessellated(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        scene: &dyn SceneSource,
        config: &VoxelGridConfig,
        settings: &RenderSettings,
    ) {
        let voxel_size = (config.max.x - config.min.x) / config.voxel_dim as f32;
        let refined = subdivide_triangles(&scene.world_triangles(), voxel_size);
        if refined.is_empty() {
            return;
        }

        let needed = refined.len() as u64;
        if needed > self.scratch_capacity {
            log::info!(
                "growing tessellation scratch buffer to {} vertices",
                needed
            );
            self.scratch_capacity = needed.next_power_of_two();
            self.scratch_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("Voxelize Tessellation Scratch Buffer"),
                size: self.scratch_capacity * std::mem::size_of::<crate::geometry::Vertex>() as u64,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
        }
        queue.write_buffer(&self.scratch_buffer, 0, bytemuck::cast_slice(&refined));

        let vertex_count = refined.len() as u32;
        let scratch = &self.scratch_buffer;
        self.encode_axis_passes(encoder, settings.conservative_rasterization, |pass| {
            pass.set_vertex_buffer(0, scratch.slice(..));
            pass.draw(0..vertex_count, 0..1);
        });
    }

    /// Voxel volume edge length this pass writes at.
    #[inline]
    pub fn dim(&self) -> u32 {
        self.dim
    }
}
