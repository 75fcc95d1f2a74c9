//! Pipeline configuration.
//!
//! All settings are plain values handed to the pipeline each frame; no stage
//! reads hidden global state. `VoxelGridConfig` is validated once at pipeline
//! construction and is immutable afterwards except for the camera-tracked
//! `center`.

use crate::math::Vector3;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors produced by configuration validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Voxel dimension must be a power of two.
    #[error("voxel dimension {0} is not a power of two")]
    VoxelDimNotPowerOfTwo(u32),

    /// Occupancy dimension must be a power of two.
    #[error("occupancy dimension {0} is not a power of two")]
    OccupancyDimNotPowerOfTwo(u32),

    /// Mip level count must equal log2 of the voxel dimension.
    #[error("voxel levels {levels} does not match log2({dim})")]
    LevelMismatch {
        /// Configured level count.
        levels: u32,
        /// Configured voxel dimension.
        dim: u32,
    },

    /// World bounds must have positive extent on every axis.
    #[error("voxel grid bounds are degenerate: min {min:?}, max {max:?}")]
    DegenerateBounds {
        /// Lower world-space corner.
        min: [f32; 3],
        /// Upper world-space corner.
        max: [f32; 3],
    },

    /// Warp resolution weights must satisfy 0 < low <= 1 <= high.
    #[error("warp resolution bounds are invalid: low {low}, high {high}")]
    InvalidWarpBounds {
        /// Low-resolution scale floor.
        low: f32,
        /// High-resolution scale cap.
        high: f32,
    },
}

/// Storage precision for the resolved voxel volumes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VoxelFormat {
    /// 8-bit normalized RGBA. Compact, matches the packed atomic encoding.
    #[default]
    Rgba8,
    /// 16-bit float RGBA. Higher precision for HDR radiance.
    Rgba16Float,
}

impl VoxelFormat {
    /// The corresponding wgpu texture format.
    pub fn texture_format(&self) -> wgpu::TextureFormat {
        match self {
            Self::Rgba8 => wgpu::TextureFormat::Rgba8Unorm,
            Self::Rgba16Float => wgpu::TextureFormat::Rgba16Float,
        }
    }
}

/// Conservative rasterization mode for the voxelization passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConservativeRasterMode {
    /// Standard rasterization. Thin geometry may leave gaps.
    #[default]
    Off,
    /// Hardware conservative rasterization (requires the device feature).
    Hardware,
    /// 4x multisampled rasterization as an emulation fallback.
    Multisample,
}

/// World-space extent and resolution of the voxel volumes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct VoxelGridConfig {
    /// Lower world-space corner of the voxel volume.
    pub min: Vector3,
    /// Upper world-space corner of the voxel volume.
    pub max: Vector3,
    /// World-space center offset; mutated per frame when camera tracking is on.
    pub center: Vector3,
    /// Edge length of the full-resolution voxel volume. Power of two.
    pub voxel_dim: u32,
    /// Mip levels below the base level; equals log2(voxel_dim).
    pub voxel_levels: u32,
    /// Edge length of the coarse occupancy grid used for warp computation.
    pub occupancy_dim: u32,
    /// Storage precision of the resolved color/normal/radiance volumes.
    pub voxel_format: VoxelFormat,
}

impl Default for VoxelGridConfig {
    fn default() -> Self {
        Self::new(Vector3::splat(-16.0), Vector3::splat(16.0), 128, 32)
    }
}

impl VoxelGridConfig {
    /// Create a grid config with `voxel_levels` derived from `voxel_dim`.
    pub fn new(min: Vector3, max: Vector3, voxel_dim: u32, occupancy_dim: u32) -> Self {
        Self {
            min,
            max,
            center: Vector3::ZERO,
            voxel_dim,
            voxel_levels: voxel_dim.max(1).trailing_zeros(),
            occupancy_dim,
            voxel_format: VoxelFormat::default(),
        }
    }

    /// Validate the invariants the GPU dispatch sizes rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.voxel_dim == 0 || !self.voxel_dim.is_power_of_two() {
            return Err(ConfigError::VoxelDimNotPowerOfTwo(self.voxel_dim));
        }
        if self.occupancy_dim == 0 || !self.occupancy_dim.is_power_of_two() {
            return Err(ConfigError::OccupancyDimNotPowerOfTwo(self.occupancy_dim));
        }
        if self.voxel_levels != self.voxel_dim.trailing_zeros() {
            return Err(ConfigError::LevelMismatch {
                levels: self.voxel_levels,
                dim: self.voxel_dim,
            });
        }
        let extent = self.max - self.min;
        if extent.x <= 0.0 || extent.y <= 0.0 || extent.z <= 0.0 {
            return Err(ConfigError::DegenerateBounds {
                min: self.min.to_array(),
                max: self.max.to_array(),
            });
        }
        Ok(())
    }

    /// World-space size of the coarsest-mip cell the volume is snapped to.
    ///
    /// Snapping the center to multiples of this keeps every mip level aligned
    /// across recentring, preventing temporal shimmer.
    pub fn grid_cell(&self) -> Vector3 {
        (self.max - self.min) * ((1u32 << self.voxel_levels) as f32 / self.voxel_dim as f32)
    }

    /// Center snapped to the discrete tracking grid for a camera position.
    pub fn snapped_center(&self, camera_position: &Vector3) -> Vector3 {
        let cell = self.grid_cell();
        (*camera_position / cell).floor() * cell
    }

    /// Number of voxels in the full-resolution volume.
    #[inline]
    pub fn voxel_count(&self) -> u64 {
        (self.voxel_dim as u64).pow(3)
    }

    /// Number of cells in the occupancy grid.
    #[inline]
    pub fn occupancy_count(&self) -> u64 {
        (self.occupancy_dim as u64).pow(3)
    }
}

/// Parameters of a single cone family used by the tracing pass.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ConeSettings {
    /// Maximum march steps along the cone.
    pub steps: u32,
    /// Start offset along the cone axis, in voxel widths.
    pub bias: f32,
    /// Tangent of the cone half-angle.
    pub cone_angle: f32,
    /// Initial sample height along the cone, in voxel widths.
    pub cone_initial_height: f32,
    /// Additive bias applied to the computed mip level.
    pub lod_offset: f32,
}

impl ConeSettings {
    /// Defaults for the diffuse cone set (wide cones, few steps).
    pub fn diffuse() -> Self {
        Self {
            steps: 16,
            bias: 1.0,
            cone_angle: 0.577,
            cone_initial_height: 1.0,
            lod_offset: 0.0,
        }
    }

    /// Defaults for the specular cone (narrow, more steps).
    pub fn specular() -> Self {
        Self {
            steps: 32,
            bias: 1.0,
            cone_angle: 0.1,
            cone_initial_height: 1.0,
            lod_offset: 0.0,
        }
    }
}

/// Debug visualization selector for the final output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DebugView {
    /// Normal cone-traced shading.
    #[default]
    None,
    /// Instanced cube per voxel of the color or radiance volume.
    Voxels,
    /// Fullscreen raymarch through the voxel volumes.
    Raymarch,
    /// Blit the shadow-map depth to the screen.
    Shadowmap,
}

/// Per-frame render settings, passed by value into every stage entry point.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Warp voxel coordinates analytically in shaders.
    pub warp_voxels: bool,
    /// Sample the warp lookup texture instead of the analytic warp.
    pub warp_texture: bool,
    /// Run the separate warp-weights pre-pass.
    pub use_warp_weights_texture: bool,
    /// Gaussian-blur the warp weight volumes to soften discontinuities.
    pub blur_warp_weights: bool,
    /// Emit an unwarped (linear) warp map; useful for debugging the remap.
    pub warp_texture_linear: bool,
    /// Per-axis enable for the warp remapping.
    pub warp_axes: [bool; 3],
    /// Floor for the low-resolution warp weight.
    pub warp_low_resolution: f32,
    /// Cap for the high-resolution warp weight.
    pub warp_high_resolution: f32,
    /// Subdivide triangles on the host before voxelization instead of the
    /// three-axis rasterizer path. Exactly one of the two paths runs per frame.
    pub tessellate_voxelization: bool,
    /// Blend the radiance volume with the previous frame.
    pub temporal_filter_radiance: bool,
    /// Exponential decay factor for temporal filtering, in [0, 1].
    pub temporal_decay: f32,
    /// Opacity written for occupied voxels; drives cone occlusion.
    pub voxel_set_opacity: f32,
    /// Evaluate direct lighting during voxelization (shadow-map tested).
    pub voxelize_lighting: bool,
    /// Run the hole-filling dilation pass on the radiance volume.
    pub voxel_fill_holes: bool,
    /// Conservative rasterization mode for both voxelizers.
    pub conservative_rasterization: ConservativeRasterMode,
    /// Re-center the voxel volume on the (snapped) camera position.
    pub voxel_track_camera: bool,
    /// Derive the specular cone angle from material roughness.
    pub specular_cone_angle_from_roughness: bool,
    /// Diffuse cone parameters.
    pub diffuse_cones: ConeSettings,
    /// Specular cone parameters.
    pub specular_cones: ConeSettings,
    /// Scale on the indirect diffuse term.
    pub ambient_scale: f32,
    /// Scale on the indirect specular term.
    pub reflect_scale: f32,
    /// Enable the indirect diffuse cones.
    pub enable_diffuse: bool,
    /// Enable the indirect specular cone.
    pub enable_specular: bool,
    /// Enable direct shadow-map shadows in the final pass.
    pub enable_shadows: bool,
    /// Debug visualization selector.
    pub debug_view: DebugView,
    /// Show the radiance volume instead of color in debug views.
    pub draw_radiance: bool,
    /// Visualize voxel normals in the final shading pass.
    pub draw_normals: bool,
    /// Mip level shown by the debug views.
    pub debug_mip_level: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            warp_voxels: false,
            warp_texture: true,
            use_warp_weights_texture: true,
            blur_warp_weights: true,
            warp_texture_linear: false,
            warp_axes: [true; 3],
            warp_low_resolution: 0.25,
            warp_high_resolution: 2.0,
            tessellate_voxelization: false,
            temporal_filter_radiance: true,
            temporal_decay: 0.8,
            voxel_set_opacity: 1.0,
            voxelize_lighting: true,
            voxel_fill_holes: true,
            conservative_rasterization: ConservativeRasterMode::Off,
            voxel_track_camera: true,
            specular_cone_angle_from_roughness: true,
            diffuse_cones: ConeSettings::diffuse(),
            specular_cones: ConeSettings::specular(),
            ambient_scale: 1.0,
            reflect_scale: 1.0,
            enable_diffuse: true,
            enable_specular: true,
            enable_shadows: true,
            debug_view: DebugView::None,
            draw_radiance: false,
            draw_normals: false,
            debug_mip_level: 0.0,
        }
    }
}

impl RenderSettings {
    /// Validate the warp weight bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.warp_low_resolution > 0.0
            && self.warp_low_resolution <= 1.0
            && self.warp_high_resolution >= 1.0)
        {
            return Err(ConfigError::InvalidWarpBounds {
                low: self.warp_low_resolution,
                high: self.warp_high_resolution,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        let config = VoxelGridConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.voxel_levels, 7);
    }

    #[test]
    fn test_non_power_of_two_rejected() {
        let mut config = VoxelGridConfig::new(Vector3::splat(-1.0), Vector3::splat(1.0), 96, 32);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::VoxelDimNotPowerOfTwo(96))
        ));
        config.voxel_dim = 128;
        config.voxel_levels = 7;
        config.occupancy_dim = 33;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::OccupancyDimNotPowerOfTwo(33))
        ));
    }

    #[test]
    fn test_level_mismatch_rejected() {
        let mut config = VoxelGridConfig::default();
        config.voxel_levels = 5;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::LevelMismatch { levels: 5, dim: 128 })
        ));
    }

    #[test]
    fn test_degenerate_bounds_rejected() {
        let config = VoxelGridConfig::new(Vector3::ONE, Vector3::ONE, 64, 16);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DegenerateBounds { .. })
        ));
    }

    #[test]
    fn test_snapped_center_is_stable_within_cell() {
        let config = VoxelGridConfig::default();
        let cell = config.grid_cell();
        let a = config.snapped_center(&Vector3::new(0.1, 0.1, 0.1));
        let b = config.snapped_center(&(Vector3::new(0.1, 0.1, 0.1) + cell * 0.5));
        assert!(a.approx_eq(&b, 1e-6));
        let c = config.snapped_center(&(Vector3::new(0.1, 0.1, 0.1) + cell));
        assert!(!a.approx_eq(&c, 1e-6));
    }

    #[test]
    fn test_warp_bounds_validation() {
        let mut settings = RenderSettings::default();
        assert!(settings.validate().is_ok());
        settings.warp_high_resolution = 0.5;
        assert!(settings.validate().is_err());
        settings.warp_high_resolution = 2.0;
        settings.warp_low_resolution = 0.0;
        assert!(settings.validate().is_err());
    }
}
