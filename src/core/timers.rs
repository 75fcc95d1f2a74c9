//! Per-stage GPU timing via timestamp queries.
//!
//! Each pipeline stage is bracketed by a pair of timestamps. The query set is
//! resolved once per frame and read back asynchronously; results therefore
//! lag the frame they measure by a frame or two, which is fine for an
//! instrumentation overlay.

use std::sync::mpsc;

/// Pipeline stages with a dedicated GPU timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Stage {
    /// Shadow / reflective shadow map rendering.
    Shadowmap = 0,
    /// Scene voxelization (either path).
    Voxelize = 1,
    /// Radiance transfer and injection.
    Radiance = 2,
    /// Mipmap pyramid construction.
    Mipmap = 3,
    /// Final cone-traced shading pass.
    Render = 4,
    /// Whole frame.
    Total = 5,
}

impl Stage {
    /// All stages, in report order.
    pub const ALL: [Stage; 6] = [
        Stage::Shadowmap,
        Stage::Voxelize,
        Stage::Radiance,
        Stage::Mipmap,
        Stage::Render,
        Stage::Total,
    ];

    /// Number of timed stages.
    pub const COUNT: usize = Self::ALL.len();

    /// Human-readable stage name.
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Shadowmap => "shadowmap",
            Stage::Voxelize => "voxelize",
            Stage::Radiance => "radiance",
            Stage::Mipmap => "mipmap",
            Stage::Render => "render",
            Stage::Total => "total",
        }
    }
}

/// Resolved timing for one stage.
#[derive(Debug, Clone, Copy)]
pub struct StageTiming {
    /// The measured stage.
    pub stage: Stage,
    /// Last known GPU time in milliseconds.
    pub ms: f32,
}

/// GPU timers for every pipeline stage.
pub struct FrameTimers {
    query_set: Option<wgpu::QuerySet>,
    resolve_buffer: wgpu::Buffer,
    staging_buffer: wgpu::Buffer,
    period_ns: f32,
    results_ms: [f32; Stage::COUNT],
    map_receiver: Option<mpsc::Receiver<Result<(), wgpu::BufferAsyncError>>>,
}

const QUERY_COUNT: u32 = (Stage::COUNT * 2) as u32;
const BUFFER_SIZE: u64 = QUERY_COUNT as u64 * 8;

impl FrameTimers {
    /// Create the timers. When `enabled` is false (feature unsupported) every
    /// operation is a no-op and timings read zero.
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, enabled: bool) -> Self {
        let query_set = enabled.then(|| {
            device.create_query_set(&wgpu::QuerySetDescriptor {
                label: Some("Vxgi Stage Timers"),
                ty: wgpu::QueryType::Timestamp,
                count: QUERY_COUNT,
            })
        });

        let resolve_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Vxgi Timer Resolve Buffer"),
            size: BUFFER_SIZE,
            usage: wgpu::BufferUsages::QUERY_RESOLVE | wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });

        let staging_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Vxgi Timer Staging Buffer"),
            size: BUFFER_SIZE,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Self {
            query_set,
            resolve_buffer,
            staging_buffer,
            period_ns: queue.get_timestamp_period(),
            results_ms: [0.0; Stage::COUNT],
            map_receiver: None,
        }
    }

    /// Record the start timestamp for a stage.
    pub fn begin(&self, encoder: &mut wgpu::CommandEncoder, stage: Stage) {
        if let Some(query_set) = &self.query_set {
            encoder.write_timestamp(query_set, stage as u32 * 2);
        }
    }

    /// Record the end timestamp for a stage.
    pub fn end(&self, encoder: &mut wgpu::CommandEncoder, stage: Stage) {
        if let Some(query_set) = &self.query_set {
            encoder.write_timestamp(query_set, stage as u32 * 2 + 1);
        }
    }

    /// Resolve this frame's queries into the staging buffer.
    ///
    /// Skipped while the previous readback is still in flight.
    pub fn resolve(&self, encoder: &mut wgpu::CommandEncoder) {
        let Some(query_set) = &self.query_set else {
            return;
        };
        if self.map_receiver.is_some() {
            return;
        }
        encoder.resolve_query_set(query_set, 0..QUERY_COUNT, &self.resolve_buffer, 0);
        encoder.copy_buffer_to_buffer(&self.resolve_buffer, 0, &self.staging_buffer, 0, BUFFER_SIZE);
    }

    /// Kick off or complete the asynchronous readback. Call once per frame
    /// after submitting; never blocks.
    pub fn poll(&mut self, device: &wgpu::Device) {
        if self.query_set.is_none() {
            return;
        }
        let _ = device.poll(wgpu::Maintain::Poll);

        let Some(receiver) = &self.map_receiver else {
            let (sender, receiver) = mpsc::channel();
            self.staging_buffer
                .slice(..)
                .map_async(wgpu::MapMode::Read, move |result| {
                    let _ = sender.send(result);
                });
            self.map_receiver = Some(receiver);
            return;
        };

        let Ok(result) = receiver.try_recv() else {
            return;
        };
        if result.is_ok() {
            let view = self.staging_buffer.slice(..).get_mapped_range();
            let ticks: &[u64] = bytemuck::cast_slice(&view[..]);
            for stage in Stage::ALL {
                let start = ticks[stage as usize * 2];
                let end = ticks[stage as usize * 2 + 1];
                let elapsed = end.saturating_sub(start);
                self.results_ms[stage as usize] = elapsed as f32 * self.period_ns / 1_000_000.0;
            }
        }
        self.staging_buffer.unmap();
        self.map_receiver = None;
    }

    /// Last known time for a stage, in milliseconds.
    #[inline]
    pub fn stage_ms(&self, stage: Stage) -> f32 {
        self.results_ms[stage as usize]
    }

    /// Last known timings for all stages, in report order.
    pub fn timings(&self) -> Vec<StageTiming> {
        Stage::ALL
            .iter()
            .map(|&stage| StageTiming {
                stage,
                ms: self.stage_ms(stage),
            })
            .collect()
    }
}
