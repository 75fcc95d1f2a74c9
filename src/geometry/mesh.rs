//! GPU mesh with a host-side vertex copy.

use super::Vertex;
use wgpu::util::DeviceExt;

/// A triangle-list mesh with world-space vertices.
///
/// The host-side vertex copy stays resident so the tessellated voxelization
/// path can re-subdivide the triangles each time it runs.
pub struct Mesh {
    vertices: Vec<Vertex>,
    vertex_buffer: wgpu::Buffer,
}

impl Mesh {
    /// Upload a triangle list. The vertex count must be a multiple of 3.
    pub fn new(device: &wgpu::Device, vertices: Vec<Vertex>) -> Self {
        debug_assert_eq!(vertices.len() % 3, 0);
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mesh Vertex Buffer"),
            contents: bytemuck::cast_slice(&vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        Self {
            vertices,
            vertex_buffer,
        }
    }

    /// Number of vertices.
    #[inline]
    pub fn vertex_count(&self) -> u32 {
        self.vertices.len() as u32
    }

    /// Host-side triangle-list vertices.
    #[inline]
    pub fn vertices(&self) -> &[Vertex] {
        &self.vertices
    }

    /// Bind the vertex buffer and draw all triangles.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.draw(0..self.vertex_count(), 0..1);
    }
}

/// Triangle-list vertices for an axis-aligned box, outward-facing normals.
pub fn cube_vertices(min: [f32; 3], max: [f32; 3], albedo: [f32; 3]) -> Vec<Vertex> {
    let [x0, y0, z0] = min;
    let [x1, y1, z1] = max;

    // Each face: two CCW triangles, flat normal.
    let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
        // +X
        ([1.0, 0.0, 0.0], [[x1, y0, z0], [x1, y1, z0], [x1, y1, z1], [x1, y0, z1]]),
        // -X
        ([-1.0, 0.0, 0.0], [[x0, y0, z1], [x0, y1, z1], [x0, y1, z0], [x0, y0, z0]]),
        // +Y
        ([0.0, 1.0, 0.0], [[x0, y1, z0], [x0, y1, z1], [x1, y1, z1], [x1, y1, z0]]),
        // -Y
        ([0.0, -1.0, 0.0], [[x0, y0, z1], [x0, y0, z0], [x1, y0, z0], [x1, y0, z1]]),
        // +Z
        ([0.0, 0.0, 1.0], [[x0, y0, z1], [x1, y0, z1], [x1, y1, z1], [x0, y1, z1]]),
        // -Z
        ([0.0, 0.0, -1.0], [[x1, y0, z0], [x0, y0, z0], [x0, y1, z0], [x1, y1, z0]]),
    ];

    let mut vertices = Vec::with_capacity(36);
    for (normal, corners) in faces {
        for idx in [0, 1, 2, 0, 2, 3] {
            vertices.push(Vertex::new(corners[idx], normal, albedo));
        }
    }
    vertices
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cube_has_36_vertices() {
        let vertices = cube_vertices([-1.0; 3], [1.0; 3], [0.5; 3]);
        assert_eq!(vertices.len(), 36);
    }

    #[test]
    fn test_cube_normals_face_outward() {
        let vertices = cube_vertices([-1.0; 3], [1.0; 3], [1.0; 3]);
        for v in &vertices {
            // The position component along the normal axis sits on that face.
            let dot = v.position[0] * v.normal[0]
                + v.position[1] * v.normal[1]
                + v.position[2] * v.normal[2];
            assert!((dot - 1.0).abs() < 1e-6);
        }
    }
}
