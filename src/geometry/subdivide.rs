//! Host-side adaptive triangle subdivision.
//!
//! The tessellated voxelization path refines triangles until no edge spans
//! more than a voxel-derived threshold, so large triangles still produce one
//! fragment per voxel they cross when rasterized at voxel resolution.

use super::Vertex;

/// Hard cap on recursive splits per input triangle.
const MAX_SPLIT_DEPTH: u32 = 10;

/// Subdivide a triangle list until every edge is at most `max_edge` long.
///
/// Splits the longest edge at its midpoint, recursively. Vertex attributes
/// are interpolated; normals are re-normalized.
pub fn subdivide_triangles(vertices: &[Vertex], max_edge: f32) -> Vec<Vertex> {
    debug_assert_eq!(vertices.len() % 3, 0);
    let mut out = Vec::with_capacity(vertices.len());
    for triangle in vertices.chunks_exact(3) {
        split(
            [triangle[0], triangle[1], triangle[2]],
            max_edge,
            0,
            &mut out,
        );
    }
    out
}

fn split(triangle: [Vertex; 3], max_edge: f32, depth: u32, out: &mut Vec<Vertex>) {
    let lengths = [
        edge_length(&triangle[0], &triangle[1]),
        edge_length(&triangle[1], &triangle[2]),
        edge_length(&triangle[2], &triangle[0]),
    ];

    let longest = if lengths[0] >= lengths[1] && lengths[0] >= lengths[2] {
        0
    } else if lengths[1] >= lengths[2] {
        1
    } else {
        2
    };

    if lengths[longest] <= max_edge || depth >= MAX_SPLIT_DEPTH {
        out.extend_from_slice(&triangle);
        return;
    }

    let a = triangle[longest];
    let b = triangle[(longest + 1) % 3];
    let c = triangle[(longest + 2) % 3];
    let mid = midpoint(&a, &b);

    split([a, mid, c], max_edge, depth + 1, out);
    split([mid, b, c], max_edge, depth + 1, out);
}

fn edge_length(a: &Vertex, b: &Vertex) -> f32 {
    let dx = a.position[0] - b.position[0];
    let dy = a.position[1] - b.position[1];
    let dz = a.position[2] - b.position[2];
    (dx * dx + dy * dy + dz * dz).sqrt()
}

fn midpoint(a: &Vertex, b: &Vertex) -> Vertex {
    let lerp3 = |u: [f32; 3], v: [f32; 3]| {
        [
            (u[0] + v[0]) * 0.5,
            (u[1] + v[1]) * 0.5,
            (u[2] + v[2]) * 0.5,
        ]
    };

    let mut normal = lerp3(a.normal, b.normal);
    let len = (normal[0] * normal[0] + normal[1] * normal[1] + normal[2] * normal[2]).sqrt();
    if len > 0.0 {
        normal = [normal[0] / len, normal[1] / len, normal[2] / len];
    }

    Vertex::new(lerp3(a.position, b.position), normal, lerp3(a.albedo, b.albedo))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle(scale: f32) -> Vec<Vertex> {
        vec![
            Vertex::new([0.0, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
            Vertex::new([scale, 0.0, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
            Vertex::new([0.0, scale, 0.0], [0.0, 0.0, 1.0], [1.0, 0.0, 0.0]),
        ]
    }

    #[test]
    fn test_small_triangle_unchanged() {
        let input = triangle(0.5);
        let result = subdivide_triangles(&input, 1.0);
        assert_eq!(result, input);
    }

    #[test]
    fn test_output_is_triangle_list() {
        let result = subdivide_triangles(&triangle(8.0), 1.0);
        assert_eq!(result.len() % 3, 0);
        assert!(result.len() > 3 * 3);
    }

    #[test]
    fn test_all_edges_below_threshold() {
        let max_edge = 1.0;
        let result = subdivide_triangles(&triangle(4.0), max_edge);
        for t in result.chunks_exact(3) {
            for (a, b) in [(0, 1), (1, 2), (2, 0)] {
                // Allow slack for the recursion depth cap.
                assert!(edge_length(&t[a], &t[b]) <= max_edge + 1e-4);
            }
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(subdivide_triangles(&[], 1.0).is_empty());
    }
}
