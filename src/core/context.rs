//! wgpu context management.

use thiserror::Error;

/// Errors that can occur during context creation.
#[derive(Error, Debug)]
pub enum ContextError {
    /// Failed to request adapter.
    #[error("Failed to request adapter: no suitable GPU found")]
    AdapterRequest,

    /// Failed to request device.
    #[error("Failed to request device: {0}")]
    DeviceRequest(#[from] wgpu::RequestDeviceError),
}

/// The wgpu rendering context.
///
/// Window/surface creation belongs to the embedding application; this context
/// only owns the device and queue the voxel pipeline renders with, so it can
/// run headless for tools and tests.
pub struct GpuContext {
    /// The wgpu instance.
    pub instance: wgpu::Instance,
    /// The GPU adapter.
    pub adapter: wgpu::Adapter,
    /// The GPU device.
    pub device: wgpu::Device,
    /// The command queue.
    pub queue: wgpu::Queue,
    /// Hardware conservative rasterization is available.
    pub conservative_raster: bool,
    /// Timestamp queries inside command encoders are available.
    pub timestamps: bool,
}

impl GpuContext {
    /// Optional features the pipeline can take advantage of.
    const OPTIONAL_FEATURES: wgpu::Features = wgpu::Features::CONSERVATIVE_RASTERIZATION
        .union(wgpu::Features::TIMESTAMP_QUERY)
        .union(wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS);

    /// Create a new headless context.
    pub async fn new() -> Result<Self, ContextError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(ContextError::AdapterRequest)?;

        // Take whichever optional features the adapter exposes.
        let required_features = adapter.features() & Self::OPTIONAL_FEATURES;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Vxgi Device"),
                    required_features,
                    required_limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await?;

        let conservative_raster =
            required_features.contains(wgpu::Features::CONSERVATIVE_RASTERIZATION);
        let timestamps = required_features.contains(wgpu::Features::TIMESTAMP_QUERY)
            && required_features.contains(wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS);

        if !conservative_raster {
            log::info!("hardware conservative rasterization unavailable");
        }
        if !timestamps {
            log::info!("GPU timestamp queries unavailable, stage timings will read zero");
        }

        Ok(Self {
            instance,
            adapter,
            device,
            queue,
            conservative_raster,
            timestamps,
        })
    }

    /// Wrap an externally created device and queue.
    ///
    /// Used when the embedding application owns context creation.
    pub fn from_device(
        instance: wgpu::Instance,
        adapter: wgpu::Adapter,
        device: wgpu::Device,
        queue: wgpu::Queue,
    ) -> Self {
        let features = device.features();
        let conservative_raster = features.contains(wgpu::Features::CONSERVATIVE_RASTERIZATION);
        let timestamps = features.contains(wgpu::Features::TIMESTAMP_QUERY)
            && features.contains(wgpu::Features::TIMESTAMP_QUERY_INSIDE_ENCODERS);
        Self {
            instance,
            adapter,
            device,
            queue,
            conservative_raster,
            timestamps,
        }
    }

    /// Create a command encoder.
    pub fn create_command_encoder(&self) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Vxgi Command Encoder"),
            })
    }
}
