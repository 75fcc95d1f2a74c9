//! Scene lights and their GPU representation.

use crate::math::{Color, Vector3};
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

/// Maximum number of lights in the light list buffer.
pub const MAX_LIGHTS: usize = 16;

/// Light type identifier, shared with WGSL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum LightType {
    /// Directional light (sun-like).
    Directional = 0,
    /// Point light (omni-directional).
    Point = 1,
}

/// A scene light. Owned by the Scene collaborator, read-only to the pipeline.
#[derive(Debug, Clone, Copy)]
pub struct Light {
    /// Light type.
    pub light_type: LightType,
    /// World-space position (also the shadow frustum origin for directional).
    pub position: Vector3,
    /// Direction the light points, for directional lights.
    pub direction: Vector3,
    /// Light color / intensity.
    pub color: Color,
    /// Whether this light renders a shadow map.
    pub shadow_caster: bool,
}

impl Light {
    /// A shadow-casting directional light.
    pub fn directional(position: Vector3, direction: Vector3, color: Color) -> Self {
        Self {
            light_type: LightType::Directional,
            position,
            direction: direction.normalized(),
            color,
            shadow_caster: true,
        }
    }

    /// A point light without shadows.
    pub fn point(position: Vector3, color: Color) -> Self {
        Self {
            light_type: LightType::Point,
            position,
            direction: Vector3::ZERO,
            color,
            shadow_caster: false,
        }
    }
}

/// GPU layout of a single light (48 bytes).
#[derive(Debug, Clone, Copy, Default, Pod, Zeroable)]
#[repr(C)]
pub struct LightUniform {
    /// World-space position.
    pub position: [f32; 3],
    /// Light type (0 = directional, 1 = point).
    pub light_type: u32,
    /// Direction, for directional lights.
    pub direction: [f32; 3],
    /// 1 when the light casts shadows.
    pub shadow_caster: u32,
    /// Light color.
    pub color: [f32; 3],
    /// Padding for 16-byte stride alignment.
    pub _padding: u32,
}

impl From<&Light> for LightUniform {
    fn from(light: &Light) -> Self {
        Self {
            position: light.position.to_array(),
            light_type: light.light_type as u32,
            direction: light.direction.to_array(),
            shadow_caster: light.shadow_caster as u32,
            color: light.color.to_array(),
            _padding: 0,
        }
    }
}

/// GPU layout of the light list header + array.
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
#[repr(C)]
struct LightListUniform {
    count: u32,
    _padding: [u32; 3],
    lights: [LightUniform; MAX_LIGHTS],
}

/// The light list as a read-only storage buffer.
pub struct LightList {
    buffer: wgpu::Buffer,
}

impl LightList {
    /// Create the storage buffer.
    pub fn new(device: &wgpu::Device) -> Self {
        let contents = LightListUniform {
            count: 0,
            _padding: [0; 3],
            lights: [LightUniform::default(); MAX_LIGHTS],
        };
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Light List Buffer"),
            contents: bytemuck::bytes_of(&contents),
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        });
        Self { buffer }
    }

    /// Upload the current lights. Lights beyond [`MAX_LIGHTS`] are dropped.
    pub fn write(&self, queue: &wgpu::Queue, lights: &[Light]) {
        let mut contents = LightListUniform {
            count: lights.len().min(MAX_LIGHTS) as u32,
            _padding: [0; 3],
            lights: [LightUniform::default(); MAX_LIGHTS],
        };
        for (dst, src) in contents.lights.iter_mut().zip(lights.iter()) {
            *dst = src.into();
        }
        queue.write_buffer(&self.buffer, 0, bytemuck::bytes_of(&contents));
    }

    /// The underlying storage buffer, for bind group construction.
    #[inline]
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_light_uniform_stride() {
        assert_eq!(std::mem::size_of::<LightUniform>(), 48);
        assert_eq!(
            std::mem::size_of::<LightListUniform>(),
            16 + 48 * MAX_LIGHTS
        );
    }

    #[test]
    fn test_directional_normalizes() {
        let light = Light::directional(
            Vector3::ZERO,
            Vector3::new(0.0, -2.0, 0.0),
            Color::WHITE,
        );
        assert!(light.direction.approx_eq(&Vector3::new(0.0, -1.0, 0.0), 1e-6));
        let uniform = LightUniform::from(&light);
        assert_eq!(uniform.light_type, 0);
        assert_eq!(uniform.shadow_caster, 1);
    }
}
