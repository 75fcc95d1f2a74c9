//! Voxel volume resources shared by the pipeline stages.

use crate::config::VoxelGridConfig;

/// Pack an RGBA color in [0, 1] into the 8-bit-per-channel atomic encoding.
///
/// Host mirror of WGSL `pack4x8unorm`; alpha occupies the high byte so
/// `atomicMax` prefers occupied texels over empty ones.
pub fn pack_rgba8(color: [f32; 4]) -> u32 {
    let quantize = |v: f32| (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u32;
    quantize(color[0])
        | (quantize(color[1]) << 8)
        | (quantize(color[2]) << 16)
        | (quantize(color[3]) << 24)
}

/// Unpack the 8-bit-per-channel atomic encoding. Host mirror of WGSL
/// `unpack4x8unorm`.
pub fn unpack_rgba8(packed: u32) -> [f32; 4] {
    [
        (packed & 0xff) as f32 / 255.0,
        ((packed >> 8) & 0xff) as f32 / 255.0,
        ((packed >> 16) & 0xff) as f32 / 255.0,
        ((packed >> 24) & 0xff) as f32 / 255.0,
    ]
}

/// Linear voxel index for a cell in a cubic grid.
#[inline]
pub fn voxel_index(x: u32, y: u32, z: u32, dim: u32) -> u64 {
    x as u64 + dim as u64 * (y as u64 + dim as u64 * z as u64)
}

fn create_volume_texture(
    device: &wgpu::Device,
    label: &str,
    dim: u32,
    mip_count: u32,
    format: wgpu::TextureFormat,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: dim,
            height: dim,
            depth_or_array_layers: dim,
        },
        mip_level_count: mip_count,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D3,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::STORAGE_BINDING,
        view_formats: &[],
    })
}

fn create_mip_views(texture: &wgpu::Texture, label: &str, mip_count: u32) -> Vec<wgpu::TextureView> {
    (0..mip_count)
        .map(|mip| {
            texture.create_view(&wgpu::TextureViewDescriptor {
                label: Some(&format!("{} Mip {} View", label, mip)),
                base_mip_level: mip,
                mip_level_count: Some(1),
                ..Default::default()
            })
        })
        .collect()
}

/// The three co-registered voxel volumes plus their raw atomic backing.
///
/// Created once at pipeline initialization; the radiance buffer is the only
/// resource carrying state across frames (temporal filtering).
pub struct VoxelVolume {
    /// Resolved surface color volume with a full mip chain.
    pub color_texture: wgpu::Texture,
    /// Resolved surface normal volume (level 0 only is meaningful).
    pub normal_texture: wgpu::Texture,
    /// Accumulated radiance volume with a full mip chain.
    pub radiance_texture: wgpu::Texture,
    /// Per-mip views of the color volume, for the pyramid builder.
    pub color_mip_views: Vec<wgpu::TextureView>,
    /// Per-mip views of the radiance volume, for the pyramid builder.
    pub radiance_mip_views: Vec<wgpu::TextureView>,
    /// Level-0 view of the normal volume.
    pub normal_base_view: wgpu::TextureView,
    /// Full-chain view of the color volume, for cone sampling.
    pub color_view: wgpu::TextureView,
    /// Full-chain view of the normal volume.
    pub normal_view: wgpu::TextureView,
    /// Full-chain view of the radiance volume, for cone sampling.
    pub radiance_view: wgpu::TextureView,

    /// Raw voxelization target for color, RGBA8 packed in `atomic<u32>`.
    pub color_raw: wgpu::Buffer,
    /// Raw voxelization target for normals, RGBA8 packed in `atomic<u32>`.
    pub normal_raw: wgpu::Buffer,
    /// Radiance working set; persists across frames for temporal filtering.
    pub radiance_raw: wgpu::Buffer,
    /// Scratch buffer for the hole-filling double-buffer.
    pub radiance_scratch: wgpu::Buffer,

    /// Edge length of the volumes.
    pub dim: u32,
    /// Number of mip levels (dim down to 1).
    pub mip_count: u32,
}

impl VoxelVolume {
    /// Allocate all volume resources for a grid configuration.
    pub fn new(device: &wgpu::Device, config: &VoxelGridConfig) -> Self {
        let dim = config.voxel_dim;
        let mip_count = config.voxel_levels + 1;
        let format = config.voxel_format.texture_format();

        let color_texture = create_volume_texture(device, "Voxel Color Volume", dim, mip_count, format);
        let normal_texture = create_volume_texture(device, "Voxel Normal Volume", dim, 1, format);
        let radiance_texture =
            create_volume_texture(device, "Voxel Radiance Volume", dim, mip_count, format);

        let color_mip_views = create_mip_views(&color_texture, "Voxel Color", mip_count);
        let radiance_mip_views = create_mip_views(&radiance_texture, "Voxel Radiance", mip_count);
        let normal_base_view = normal_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let color_view = color_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let normal_view = normal_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let radiance_view = radiance_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let raw_size = config.voxel_count() * 4;
        let raw_buffer = |label: &str| {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(label),
                size: raw_size,
                usage: wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
                mapped_at_creation: false,
            })
        };

        Self {
            color_texture,
            normal_texture,
            radiance_texture,
            color_mip_views,
            radiance_mip_views,
            normal_base_view,
            color_view,
            normal_view,
            radiance_view,
            color_raw: raw_buffer("Voxel Color Raw Buffer"),
            normal_raw: raw_buffer("Voxel Normal Raw Buffer"),
            radiance_raw: raw_buffer("Voxel Radiance Raw Buffer"),
            radiance_scratch: raw_buffer("Voxel Radiance Scratch Buffer"),
            dim,
            mip_count,
        }
    }

    /// Clear the per-frame raw voxelization targets.
    pub fn clear_raw(&self, encoder: &mut wgpu::CommandEncoder) {
        encoder.clear_buffer(&self.color_raw, 0, None);
        encoder.clear_buffer(&self.normal_raw, 0, None);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_roundtrip() {
        for color in [
            [0.0, 0.0, 0.0, 0.0],
            [1.0, 1.0, 1.0, 1.0],
            [0.25, 0.5, 0.75, 1.0],
        ] {
            let unpacked = unpack_rgba8(pack_rgba8(color));
            for (a, b) in color.iter().zip(unpacked.iter()) {
                assert!((a - b).abs() < 1.0 / 255.0);
            }
        }
    }

    #[test]
    fn test_occupied_wins_atomic_max() {
        // An occupied texel (alpha 1) always beats an empty one under max.
        let empty = pack_rgba8([0.9, 0.9, 0.9, 0.0]);
        let occupied = pack_rgba8([0.1, 0.1, 0.1, 1.0]);
        assert!(occupied > empty);
    }

    #[test]
    fn test_voxel_index_layout() {
        assert_eq!(voxel_index(0, 0, 0, 16), 0);
        assert_eq!(voxel_index(1, 0, 0, 16), 1);
        assert_eq!(voxel_index(0, 1, 0, 16), 16);
        assert_eq!(voxel_index(0, 0, 1, 16), 256);
    }
}
