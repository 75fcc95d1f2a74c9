//! Minimal 3D math types used throughout the voxel pipeline.

mod color;
mod matrix4;
mod vector3;

pub use color::Color;
pub use matrix4::Matrix4;
pub use vector3::Vector3;
