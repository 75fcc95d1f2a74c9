//! The voxel cone tracing pipeline.
//!
//! Stages run once per frame in strict dependency order on a single queue:
//! shadow map, scene voxelization, voxel transfer, radiance injection, hole
//! filling, mipmap pyramid, and the final cone-traced shading pass. The
//! occupancy voxelizer and warp map builder run only when the voxel bounds
//! move; their one host readback is the pipeline's only stall.

mod debug;
mod holefill;
mod inject;
mod mipmap;
mod occupancy;
mod shadow;
mod trace;
mod transfer;
mod volume;
mod voxelize;
mod warp;

pub use debug::DebugPasses;
pub use holefill::HoleFiller;
pub use inject::RadianceInjector;
pub use mipmap::{box_filter_reference, MipmapPyramidBuilder};
pub use occupancy::OccupancyVoxelizer;
pub use shadow::{ShadowPass, SHADOWMAP_SIZE};
pub use trace::ConeTracingPass;
pub use transfer::{temporal_blend, VoxelTransfer};
pub use volume::{pack_rgba8, unpack_rgba8, voxel_index, VoxelVolume};
pub use voxelize::SceneVoxelizer;
pub use warp::{prefix_sums, solve_weights, weight_table, WarpMapBuilder};

use crate::camera::Camera;
use crate::config::{ConfigError, DebugView, RenderSettings, VoxelFormat, VoxelGridConfig};
use crate::core::{FrameTimers, GpuContext, Stage, StageTiming};
use crate::light::LightList;
use crate::math::Matrix4;
use crate::scene::SceneSource;

/// Rewrite a shader's storage texture declarations for the configured voxel
/// precision. Shaders are written against `rgba8unorm`.
pub(crate) fn shader_with_format(source: &str, format: VoxelFormat) -> String {
    match format {
        VoxelFormat::Rgba8 => source.to_string(),
        VoxelFormat::Rgba16Float => source.replace("rgba8unorm", "rgba16float"),
    }
}

/// The frame's output target, owned by the embedding application.
pub struct FrameTarget<'a> {
    /// Color attachment view.
    pub color: &'a wgpu::TextureView,
    /// Depth attachment view (`Depth32Float`).
    pub depth: &'a wgpu::TextureView,
    /// Width over height of the target.
    pub aspect: f32,
}

/// The assembled pipeline: all passes, their shared volumes, and the
/// per-stage timers. Every GPU resource is created here, up front.
pub struct VctPipeline {
    config: VoxelGridConfig,
    volume: VoxelVolume,
    shadow: ShadowPass,
    occupancy: OccupancyVoxelizer,
    warp: WarpMapBuilder,
    voxelizer: SceneVoxelizer,
    transfer: VoxelTransfer,
    injector: RadianceInjector,
    hole_filler: HoleFiller,
    mipmapper: MipmapPyramidBuilder,
    tracer: ConeTracingPass,
    debug: DebugPasses,
    lights: LightList,
    timers: FrameTimers,
    warp_dirty: bool,
    warned_no_light: bool,
}

impl VctPipeline {
    /// Build the pipeline for a validated grid configuration.
    ///
    /// Fails fast on configuration inconsistencies rather than propagating
    /// them into GPU dispatch sizes.
    pub fn new(
        ctx: &GpuContext,
        config: VoxelGridConfig,
        output_format: wgpu::TextureFormat,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let device = &ctx.device;

        let volume = VoxelVolume::new(device, &config);
        let shadow = ShadowPass::new(device, SHADOWMAP_SIZE);
        let occupancy = OccupancyVoxelizer::new(device, &config, ctx.conservative_raster);
        let warp = WarpMapBuilder::new(device, &config, occupancy.buffer());
        let voxelizer = SceneVoxelizer::new(
            device,
            &config,
            &volume,
            &warp,
            &shadow,
            ctx.conservative_raster,
        );
        let transfer = VoxelTransfer::new(device, &config, &volume);
        let injector = RadianceInjector::new(device, &volume, &shadow, &warp);
        let hole_filler = HoleFiller::new(device, &config, &volume);
        let mipmapper = MipmapPyramidBuilder::new(device, &config, &volume);
        let lights = LightList::new(device);
        let tracer = ConeTracingPass::new(device, &volume, &warp, &shadow, &lights, output_format);
        let debug = DebugPasses::new(device, &config, &volume, &warp, &shadow, output_format);
        let timers = FrameTimers::new(device, &ctx.queue, ctx.timestamps);

        log::info!(
            "vct pipeline ready: {}^3 voxels, {}^3 occupancy, {} mip levels",
            config.voxel_dim,
            config.occupancy_dim,
            config.voxel_levels + 1,
        );

        Ok(Self {
            config,
            volume,
            shadow,
            occupancy,
            warp,
            voxelizer,
            transfer,
            injector,
            hole_filler,
            mipmapper,
            tracer,
            debug,
            lights,
            timers,
            // The first frame always builds the warp map.
            warp_dirty: true,
            warned_no_light: false,
        })
    }

    /// Rebuild the warp map from a fresh occupancy pass.
    ///
    /// Contains the pipeline's single synchronous GPU-to-host readback;
    /// callers invoke this only when the voxel bounds moved.
    pub fn recompute_warp_map(
        &mut self,
        ctx: &GpuContext,
        scene: &dyn SceneSource,
        settings: &RenderSettings,
    ) {
        log::debug!("recomputing warp map");

        self.occupancy.update(&ctx.queue, &self.config);
        let mut encoder = ctx.create_command_encoder();
        self.occupancy
            .encode(&mut encoder, scene, settings.conservative_rasterization);
        ctx.queue.submit(std::iter::once(encoder.finish()));

        let grid = self.occupancy.read_back(&ctx.device);
        self.warp.upload_tables(&ctx.queue, &grid, settings);

        let mut encoder = ctx.create_command_encoder();
        self.warp.encode(&mut encoder, settings);
        ctx.queue.submit(std::iter::once(encoder.finish()));
    }

    /// Render one frame into the target.
    pub fn render_frame(
        &mut self,
        ctx: &GpuContext,
        scene: &dyn SceneSource,
        camera: &Camera,
        settings: &RenderSettings,
        target: &FrameTarget<'_>,
    ) -> Result<(), ConfigError> {
        settings.validate()?;

        // Snap the volume to the tracking grid; recentring invalidates the
        // cached warp map.
        if settings.voxel_track_camera {
            let center = self.config.snapped_center(&camera.position);
            if !center.approx_eq(&self.config.center, 1e-6) {
                log::debug!(
                    "voxel grid recentered to ({}, {}, {})",
                    center.x,
                    center.y,
                    center.z
                );
                self.config.center = center;
                self.warp_dirty = true;
            }
        }

        if self.warp_dirty {
            self.recompute_warp_map(ctx, scene, settings);
            self.warp_dirty = false;
        }

        let main_light = scene.lights().first().copied();
        if main_light.is_none() && !self.warned_no_light {
            log::error!("scene has no lights; direct lighting and injection are disabled");
            self.warned_no_light = true;
        }
        let light_space = main_light
            .as_ref()
            .map(ShadowPass::light_space_matrix)
            .unwrap_or(Matrix4::IDENTITY);

        self.lights.write(&ctx.queue, scene.lights());
        if let Some(light) = &main_light {
            self.shadow.update(&ctx.queue, light, &light_space);
        }
        self.voxelizer.update(
            &ctx.queue,
            &self.config,
            settings,
            main_light.as_ref(),
            &light_space,
        );
        self.transfer.update(&ctx.queue, settings);
        self.injector
            .update(&ctx.queue, &self.config, settings, &light_space);
        self.tracer.update(
            &ctx.queue,
            &self.config,
            settings,
            camera,
            target.aspect,
            &light_space,
        );
        self.debug
            .update(&ctx.queue, &self.config, settings, camera, target.aspect);

        let mut encoder = ctx.create_command_encoder();
        self.timers.begin(&mut encoder, Stage::Total);

        self.timers.begin(&mut encoder, Stage::Shadowmap);
        self.shadow.encode(&mut encoder, scene);
        self.timers.end(&mut encoder, Stage::Shadowmap);

        self.timers.begin(&mut encoder, Stage::Voxelize);
        self.volume.clear_raw(&mut encoder);
        if settings.tessellate_voxelization {
            self.voxelizer.encode_tessellated(
                &ctx.device,
                &ctx.queue,
                &mut encoder,
                scene,
                &self.config,
                settings,
            );
        } else {
            self.voxelizer.encode(&mut encoder, scene, settings);
        }
        self.timers.end(&mut encoder, Stage::Voxelize);

        self.timers.begin(&mut encoder, Stage::Radiance);
        self.transfer.encode(&mut encoder);
        if main_light.is_some_and(|light| light.shadow_caster) {
            self.injector.encode(&mut encoder);
        }
        self.timers.end(&mut encoder, Stage::Radiance);

        if settings.voxel_fill_holes {
            self.hole_filler.encode(&mut encoder, &self.volume);
        }

        self.timers.begin(&mut encoder, Stage::Mipmap);
        self.mipmapper.encode(&mut encoder);
        self.timers.end(&mut encoder, Stage::Mipmap);

        self.timers.begin(&mut encoder, Stage::Render);
        match settings.debug_view {
            DebugView::None => {
                self.tracer
                    .encode(&mut encoder, target.color, target.depth, scene)
            }
            DebugView::Voxels => {
                self.debug
                    .encode_voxels(&mut encoder, target.color, target.depth, settings)
            }
            DebugView::Raymarch => self.debug.encode_raymarch(&mut encoder, target.color, settings),
            DebugView::Shadowmap => self.debug.encode_shadowmap(&mut encoder, target.color),
        }
        self.timers.end(&mut encoder, Stage::Render);

        self.timers.end(&mut encoder, Stage::Total);
        self.timers.resolve(&mut encoder);

        ctx.queue.submit(std::iter::once(encoder.finish()));
        self.timers.poll(&ctx.device);

        Ok(())
    }

    /// Last known per-stage GPU timings, for the instrumentation overlay.
    pub fn timings(&self) -> Vec<StageTiming> {
        self.timers.timings()
    }

    /// The current grid configuration.
    #[inline]
    pub fn config(&self) -> &VoxelGridConfig {
        &self.config
    }

    /// The shared voxel volumes.
    #[inline]
    pub fn volume(&self) -> &VoxelVolume {
        &self.volume
    }
}
