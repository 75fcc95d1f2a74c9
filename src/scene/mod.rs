//! The narrow scene interface the pipeline renders through.

use crate::geometry::{Mesh, Vertex};
use crate::light::Light;
use crate::math::{Color, Vector3};

/// Geometry and light source for the pipeline.
///
/// The scene graph, actors and materials are external concerns; the pipeline
/// only needs draw calls, raw triangles for the host-tessellated path, and a
/// read-only light list whose first entry is the main light.
pub trait SceneSource {
    /// Issue all scene geometry into the given render pass.
    ///
    /// The pass's pipeline must use [`Vertex::layout`](crate::geometry::Vertex::layout)
    /// at slot 0.
    fn draw(&self, pass: &mut wgpu::RenderPass<'_>);

    /// World-space triangle-list vertices, for host-side processing.
    fn world_triangles(&self) -> Vec<Vertex>;

    /// The scene lights. `lights()[0]` is the main light and is expected to
    /// be directional and shadow-casting.
    fn lights(&self) -> &[Light];
}

/// A flat mesh + light container implementing [`SceneSource`].
pub struct Scene {
    meshes: Vec<Mesh>,
    lights: Vec<Light>,
}

impl Scene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self {
            meshes: Vec::new(),
            lights: Vec::new(),
        }
    }

    /// Create a scene with the default light rig: a shadow-casting
    /// directional main light and a colored point fill light.
    pub fn with_default_lights() -> Self {
        let mut scene = Self::new();
        scene.add_light(Light::directional(
            Vector3::new(12.0, 40.0, -7.0),
            Vector3::new(-0.38, -0.88, 0.2),
            Color::WHITE,
        ));
        scene.add_light(Light::point(
            Vector3::new(0.0, 10.0, 0.0),
            Color::new(1.0, 0.0, 1.0),
        ));
        scene
    }

    /// Add a mesh.
    pub fn add_mesh(&mut self, mesh: Mesh) {
        self.meshes.push(mesh);
    }

    /// Add a light.
    pub fn add_light(&mut self, light: Light) {
        self.lights.push(light);
    }

    /// The meshes in this scene.
    #[inline]
    pub fn meshes(&self) -> &[Mesh] {
        &self.meshes
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl SceneSource for Scene {
    fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        for mesh in &self.meshes {
            mesh.draw(pass);
        }
    }

    fn world_triangles(&self) -> Vec<Vertex> {
        let mut vertices = Vec::new();
        for mesh in &self.meshes {
            vertices.extend_from_slice(mesh.vertices());
        }
        vertices
    }

    fn lights(&self) -> &[Light] {
        &self.lights
    }
}
