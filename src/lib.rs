//! # Vxgi - Voxel Cone Tracing Global Illumination
//!
//! A real-time global illumination renderer built on wgpu. Indirect light
//! transport is approximated with voxel cone tracing: the scene is
//! voxelized into sparse color/normal volumes, direct lighting is injected
//! from a reflective shadow map, a filtered mipmap pyramid is built over
//! the radiance volume, and the final shading pass integrates indirect
//! diffuse and specular light by marching cones through that pyramid.
//!
//! A secondary sub-pipeline warps voxel space non-uniformly, driven by an
//! occupancy histogram and per-axis prefix sums, so voxel resolution
//! concentrates where geometry is dense.
//!
//! ## Example
//!
//! ```ignore
//! use vxgi::prelude::*;
//!
//! let ctx = pollster::block_on(GpuContext::new())?;
//! let mut scene = Scene::with_default_lights();
//! scene.add_mesh(Mesh::new(&ctx.device, cube_vertices([-1.0; 3], [1.0; 3], [0.8; 3])));
//!
//! let config = VoxelGridConfig::default();
//! let mut pipeline = VctPipeline::new(&ctx, config, wgpu::TextureFormat::Bgra8UnormSrgb)?;
//!
//! let settings = RenderSettings::default();
//! pipeline.render_frame(&ctx, &scene, &Camera::default(), &settings, &target)?;
//! ```

#![warn(missing_docs)]

pub mod camera;
pub mod config;
pub mod core;
pub mod geometry;
pub mod light;
pub mod math;
pub mod scene;
pub mod vct;

// Re-export commonly used types
pub mod prelude {
    //! Convenient re-exports of commonly used types.

    pub use crate::camera::Camera;
    pub use crate::config::{
        ConeSettings, ConfigError, ConservativeRasterMode, DebugView, RenderSettings, VoxelFormat,
        VoxelGridConfig,
    };
    pub use crate::core::{ContextError, GpuContext, Stage, StageTiming};
    pub use crate::geometry::{cube_vertices, Mesh, Vertex};
    pub use crate::light::{Light, LightType};
    pub use crate::math::{Color, Matrix4, Vector3};
    pub use crate::scene::{Scene, SceneSource};
    pub use crate::vct::{FrameTarget, VctPipeline};
}
