//! GPU context management and frame instrumentation.

mod context;
mod timers;

pub use context::{ContextError, GpuContext};
pub use timers::{FrameTimers, Stage, StageTiming};
