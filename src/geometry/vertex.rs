//! Vertex type and layout.

use bytemuck::{Pod, Zeroable};

/// Scene vertex in world space.
///
/// The pipeline consumes pre-transformed geometry; material systems are an
/// external concern, so surface color rides on the vertex.
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[repr(C)]
pub struct Vertex {
    /// World-space position.
    pub position: [f32; 3],
    /// World-space normal.
    pub normal: [f32; 3],
    /// Surface albedo.
    pub albedo: [f32; 3],
}

impl Vertex {
    /// Create a new vertex.
    pub const fn new(position: [f32; 3], normal: [f32; 3], albedo: [f32; 3]) -> Self {
        Self {
            position,
            normal,
            albedo,
        }
    }

    /// Get the vertex buffer layout for this vertex type.
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Self>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }

    /// Vertex attributes.
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] = [
        // position
        wgpu::VertexAttribute {
            offset: 0,
            shader_location: 0,
            format: wgpu::VertexFormat::Float32x3,
        },
        // normal
        wgpu::VertexAttribute {
            offset: std::mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
            shader_location: 1,
            format: wgpu::VertexFormat::Float32x3,
        },
        // albedo
        wgpu::VertexAttribute {
            offset: std::mem::size_of::<[f32; 6]>() as wgpu::BufferAddress,
            shader_location: 2,
            format: wgpu::VertexFormat::Float32x3,
        },
    ];
}
