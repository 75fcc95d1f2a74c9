//! Geometry types consumed by the voxel pipeline.

mod mesh;
mod subdivide;
mod vertex;

pub use mesh::{cube_vertices, Mesh};
pub use subdivide::subdivide_triangles;
pub use vertex::Vertex;
