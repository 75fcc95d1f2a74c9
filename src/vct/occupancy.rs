//! Occupancy voxelization pass.
//!
//! Rasterizes the scene from three orthogonal axes into a coarse counter
//! grid. The grid is read back to host memory for the warp-map computation;
//! that readback is the pipeline's one deliberate host/device stall and only
//! happens when the voxel bounds move.

use crate::config::{ConservativeRasterMode, VoxelGridConfig};
use crate::geometry::Vertex;
use crate::math::{Matrix4, Vector3};
use crate::scene::SceneSource;
use bytemuck::{Pod, Zeroable};
use std::sync::mpsc;

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct OccupancyUniform {
    mvp: [[f32; 4]; 4],
    grid_min: [f32; 4],
    grid_max: [f32; 4],
    grid_center: [f32; 4],
}

/// Orthographic view-projection for each voxelization axis.
pub(crate) fn axis_view_projections(config: &VoxelGridConfig) -> [Matrix4; 3] {
    let projection = Matrix4::orthographic(
        config.min.x,
        config.max.x,
        config.min.y,
        config.max.y,
        0.0,
        config.max.z - config.min.z,
    );
    let center = config.center;

    let from_x = Matrix4::look_at(
        &(center + Vector3::new(config.max.x, 0.0, 0.0)),
        &center,
        &Vector3::new(0.0, 1.0, 0.0),
    );
    let from_y = Matrix4::look_at(
        &(center + Vector3::new(0.0, config.max.y, 0.0)),
        &center,
        &Vector3::new(0.0, 0.0, -1.0),
    );
    let from_z = Matrix4::look_at(
        &(center + Vector3::new(0.0, 0.0, config.max.z)),
        &center,
        &Vector3::new(0.0, 1.0, 0.0),
    );

    [
        projection.multiply(&from_x),
        projection.multiply(&from_y),
        projection.multiply(&from_z),
    ]
}

/// Create the pipeline variants for a voxelization shader: plain, hardware
/// conservative (when supported) and 4x multisampled.
pub(crate) fn voxelize_pipeline_variants(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    conservative_supported: bool,
) -> [wgpu::RenderPipeline; 3] {
    let build = |name: &str, conservative: bool, samples: u32| {
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(name),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::layout()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some("fs_main"),
                targets: &[],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // Both winding orders must scatter voxels.
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: wgpu::TextureFormat::Depth32Float,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Always,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState {
                count: samples,
                ..Default::default()
            },
            multiview: None,
            cache: None,
        })
    };

    let plain = build(&format!("{} Pipeline", label), false, 1);
    let conservative = if conservative_supported {
        build(&format!("{} Conservative Pipeline", label), true, 1)
    } else {
        build(&format!("{} Conservative Fallback Pipeline", label), false, 1)
    };
    let multisample = build(&format!("{} MSAA Pipeline", label), false, 4);
    [plain, conservative, multisample]
}

/// Dummy depth attachments for voxelization render passes; wgpu requires at
/// least one attachment even though the passes only scatter into buffers.
pub(crate) struct RasterTargets {
    single: wgpu::TextureView,
    multi: wgpu::TextureView,
}

impl RasterTargets {
    pub(crate) fn new(device: &wgpu::Device, label: &str, dim: u32) -> Self {
        let create = |samples: u32| {
            device
                .create_texture(&wgpu::TextureDescriptor {
                    label: Some(label),
                    size: wgpu::Extent3d {
                        width: dim,
                        height: dim,
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: samples,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::Depth32Float,
                    usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                    view_formats: &[],
                })
                .create_view(&wgpu::TextureViewDescriptor::default())
        };
        Self {
            single: create(1),
            multi: create(4),
        }
    }

    pub(crate) fn view(&self, mode: ConservativeRasterMode) -> &wgpu::TextureView {
        match mode {
            ConservativeRasterMode::Multisample => &self.multi,
            _ => &self.single,
        }
    }
}

/// The three-axis occupancy voxelizer.
pub struct OccupancyVoxelizer {
    pipelines: [wgpu::RenderPipeline; 3],
    raster_targets: RasterTargets,
    axis_buffers: [wgpu::Buffer; 3],
    axis_bind_groups: [wgpu::BindGroup; 3],
    occupancy_buffer: wgpu::Buffer,
    staging_buffer: wgpu::Buffer,
    dim: u32,
}

impl OccupancyVoxelizer {
    /// Create the pass and the occupancy grid buffers.
    pub fn new(device: &wgpu::Device, config: &VoxelGridConfig, conservative: bool) -> Self {
        let dim = config.occupancy_dim;
        let grid_size = config.occupancy_count() * 4;

        let occupancy_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Occupancy Grid Buffer"),
            size: grid_size,
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Occupancy Staging Buffer"),
            size: grid_size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Occupancy Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/occupancy.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Occupancy Bind Group Layout"),
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
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Occupancy Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipelines =
            voxelize_pipeline_variants(device, "Occupancy", &pipeline_layout, &shader, conservative);

        let axis_buffers: [wgpu::Buffer; 3] = std::array::from_fn(|axis| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("Occupancy Axis {} Uniform", axis)),
                size: std::mem::size_of::<OccupancyUniform>() as u64,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });

        let axis_bind_groups: [wgpu::BindGroup; 3] = std::array::from_fn(|axis| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("Occupancy Axis {} Bind Group", axis)),
                layout: &bind_group_layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: axis_buffers[axis].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: occupancy_buffer.as_entire_binding(),
                    },
                ],
            })
        });

        Self {
            pipelines,
            raster_targets: RasterTargets::new(device, "Occupancy Raster Target", dim),
            axis_buffers,
            axis_bind_groups,
            occupancy_buffer,
            staging_buffer,
            dim,
        }
    }

    /// Upload the per-axis uniforms for the current grid placement.
    pub fn update(&self, queue: &wgpu::Queue, config: &VoxelGridConfig) {
        let matrices = axis_view_projections(config);
        for (axis, mvp) in matrices.iter().enumerate() {
            let uniform = OccupancyUniform {
                mvp: mvp.to_cols_array_2d(),
                grid_min: [config.min.x, config.min.y, config.min.z, self.dim as f32],
                grid_max: [config.max.x, config.max.y, config.max.z, 0.0],
                grid_center: [config.center.x, config.center.y, config.center.z, 0.0],
            };
            queue.write_buffer(&self.axis_buffers[axis], 0, bytemuck::bytes_of(&uniform));
        }
    }

    /// Encode the three axis passes and the staging copy for readback.
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        scene: &dyn SceneSource,
        mode: ConservativeRasterMode,
    ) {
        encoder.clear_buffer(&self.occupancy_buffer, 0, None);

        let pipeline = match mode {
            ConservativeRasterMode::Off => &self.pipelines[0],
            ConservativeRasterMode::Hardware => &self.pipelines[1],
            ConservativeRasterMode::Multisample => &self.pipelines[2],
        };

        for axis in 0..3 {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Occupancy Axis Pass"),
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
            scene.draw(&mut pass);
        }

        encoder.copy_buffer_to_buffer(
            &self.occupancy_buffer,
            0,
            &self.staging_buffer,
            0,
            self.staging_buffer.size(),
        );
    }

    /// Block until the staged occupancy grid is mapped and return its cells.
    ///
    /// The deliberate pipeline stall; callers must have submitted the
    /// commands from [`encode`](Self::encode) first.
    pub fn read_back(&self, device: &wgpu::Device) -> Vec<u32> {
        let slice = self.staging_buffer.slice(..);
        let (sender, receiver) = mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        let _ = device.poll(wgpu::Maintain::Wait);

        match receiver.recv() {
            Ok(Ok(())) => {
                let data = {
                    let view = slice.get_mapped_range();
                    bytemuck::cast_slice::<u8, u32>(&view[..]).to_vec()
                };
                self.staging_buffer.unmap();
                data
            }
            _ => {
                log::error!("occupancy readback failed, warp map will stay uniform");
                vec![0; (self.dim as usize).pow(3)]
            }
        }
    }

    /// The device-side occupancy grid buffer.
    #[inline]
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.occupancy_buffer
    }

    /// Occupancy grid edge length.
    #[inline]
    pub fn dim(&self) -> u32 {
        self.dim
    }
}
