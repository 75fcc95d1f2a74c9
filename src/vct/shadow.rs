//! Reflective shadow map pass.
//!
//! Renders depth from the main light's point of view, plus flux and
//! world-normal color targets that the radiance injector samples.

use crate::geometry::Vertex;
use crate::light::Light;
use crate::math::{Matrix4, Vector3};
use crate::scene::SceneSource;
use bytemuck::{Pod, Zeroable};

/// Default shadow map edge length.
pub const SHADOWMAP_SIZE: u32 = 4096;

/// Half-extent of the directional light's orthographic frustum.
const LIGHT_BOUNDARY: f32 = 25.0;
/// Directional light near plane.
const LIGHT_NEAR: f32 = 0.0;
/// Directional light far plane.
const LIGHT_FAR: f32 = 100.0;

#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct LightCameraUniform {
    view_proj: [[f32; 4]; 4],
    light_direction: [f32; 4],
    light_color: [f32; 4],
}

/// Shadow pass with reflective shadow map attachments.
pub struct ShadowPass {
    /// Depth target.
    depth_texture: wgpu::Texture,
    /// Depth target view, sampled by later passes.
    depth_view: wgpu::TextureView,
    /// Flux (albedo x received light) target view.
    flux_view: wgpu::TextureView,
    /// World-normal target view.
    normal_view: wgpu::TextureView,
    /// Render pipeline.
    pipeline: wgpu::RenderPipeline,
    /// Light camera uniform buffer.
    light_camera_buffer: wgpu::Buffer,
    /// Light camera bind group.
    light_camera_bind_group: wgpu::BindGroup,
    /// Shadow map edge length.
    size: u32,
}

impl ShadowPass {
    /// Create the pass and its off-screen targets.
    pub fn new(device: &wgpu::Device, size: u32) -> Self {
        let depth_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("RSM Depth Texture"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Depth32Float,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let depth_view = depth_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let color_target = |label: &str| {
            let texture = device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: size,
                    height: size,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            });
            texture.create_view(&wgpu::TextureViewDescriptor::default())
        };
        let flux_view = color_target("RSM Flux Texture");
        let normal_view = color_target("RSM Normal Texture");

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("RSM Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("../shaders/rsm.wgsl").into()),
        });

        let light_camera_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some("RSM Light Camera Layout"),
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                }],
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("RSM Pipeline Layout"),
            bind_group_layouts: &[&light_camera_layout],
            push_constant_ranges: &[],
        });

        let color_targets = [
            Some(wgpu::ColorTargetState {
                format: wgpu::TextureFormat::Rgba8Unorm,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            }),
            Some(wgpu::ColorTargetState {
                format: wgpu::TextureFormat::Rgba8Unorm,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            }),
        ];

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("RSM Pipeline"),
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
                targets: &color_targets,
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
                bias: wgpu::DepthBiasState {
                    constant: 2,
                    slope_scale: 2.0,
                    clamp: 0.0,
                },
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let light_camera_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("RSM Light Camera Buffer"),
            size: std::mem::size_of::<LightCameraUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let light_camera_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("RSM Light Camera Bind Group"),
            layout: &light_camera_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: light_camera_buffer.as_entire_binding(),
            }],
        });

        Self {
            depth_texture,
            depth_view,
            flux_view,
            normal_view,
            pipeline,
            light_camera_buffer,
            light_camera_bind_group,
            size,
        }
    }

    /// Light-space matrix for a directional light.
    pub fn light_space_matrix(light: &Light) -> Matrix4 {
        let projection = Matrix4::orthographic(
            -LIGHT_BOUNDARY,
            LIGHT_BOUNDARY,
            -LIGHT_BOUNDARY,
            LIGHT_BOUNDARY,
            LIGHT_NEAR,
            LIGHT_FAR,
        );
        let view = Matrix4::look_at(
            &light.position,
            &(light.position + light.direction),
            &Vector3::UP,
        );
        projection.multiply(&view)
    }

    /// Upload the light camera for this frame.
    pub fn update(&self, queue: &wgpu::Queue, light: &Light, light_space: &Matrix4) {
        let uniform = LightCameraUniform {
            view_proj: light_space.to_cols_array_2d(),
            light_direction: [light.direction.x, light.direction.y, light.direction.z, 0.0],
            light_color: [light.color.r, light.color.g, light.color.b, 0.0],
        };
        queue.write_buffer(&self.light_camera_buffer, 0, bytemuck::bytes_of(&uniform));
    }

    /// Render the reflective shadow map.
    pub fn encode(&self, encoder: &mut wgpu::CommandEncoder, scene: &dyn SceneSource) {
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("RSM Pass"),
            color_attachments: &[
                Some(wgpu::RenderPassColorAttachment {
                    view: &self.flux_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                }),
                Some(wgpu::RenderPassColorAttachment {
                    view: &self.normal_view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                }),
            ],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: &self.depth_view,
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
        pass.set_bind_group(0, &self.light_camera_bind_group, &[]);
        scene.draw(&mut pass);
    }

    /// Shadow map depth view.
    #[inline]
    pub fn depth_view(&self) -> &wgpu::TextureView {
        &self.depth_view
    }

    /// RSM flux view.
    #[inline]
    pub fn flux_view(&self) -> &wgpu::TextureView {
        &self.flux_view
    }

    /// RSM world-normal view.
    #[inline]
    pub fn normal_view(&self) -> &wgpu::TextureView {
        &self.normal_view
    }

    /// Shadow map edge length.
    #[inline]
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Keep the depth texture alive for external debug views.
    #[inline]
    pub fn depth_texture(&self) -> &wgpu::Texture {
        &self.depth_texture
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::math::Color;

    #[test]
    fn test_light_space_roundtrip() {
        // The injector reconstructs world positions through the inverse of
        // this matrix; a point inside the frustum must survive the round trip.
        let light = Light::directional(
            Vector3::new(12.0, 40.0, -7.0),
            Vector3::new(-0.38, -0.88, 0.2),
            Color::WHITE,
        );
        let light_space = ShadowPass::light_space_matrix(&light);

        let world = Vector3::new(1.0, 2.0, 3.0);
        let clip = light_space.transform_point(&world);
        assert!(clip.x.abs() <= 1.0 && clip.y.abs() <= 1.0);
        assert!((0.0..=1.0).contains(&clip.z));

        let back = light_space.inverse().transform_point(&clip);
        assert!(back.approx_eq(&world, 1e-3));
    }

    #[test]
    fn test_point_behind_light_is_outside_depth_range() {
        let light = Light::directional(
            Vector3::new(0.0, 40.0, 0.0),
            Vector3::new(0.0, -1.0, 0.0),
            Color::WHITE,
        );
        let light_space = ShadowPass::light_space_matrix(&light);
        let behind = Vector3::new(0.0, 45.0, 0.0);
        let clip = light_space.transform_point(&behind);
        assert!(clip.z < 0.0);
    }
}
