//! Ember Engine
//!
//! A real-time rendering engine library centred on its render-node
//! pipeline: per-frame classification of scene geometry into
//! fixed-capacity per-pipeline node tables, instancing aggregation,
//! visibility intersection and command recording, on top of a Vulkan
//! handle layer.
//!
//! The per-frame flow:
//! - [`QueueRenderNodes::parse`](renderer::QueueRenderNodes::parse)
//!   classifies everything the culler tracks,
//! - the [`GpuEventQueue`](event_system::GpuEventQueue) is drained on the
//!   render thread to initialise descriptor sets,
//! - [`QueueCulledRenderNodes::parse`](renderer::QueueCulledRenderNodes::parse)
//!   intersects against the frame's visibility result,
//! - `prepare_command_buffers` records the draw list.

pub mod constants;
pub mod error;
pub mod event_system;
pub mod renderer;
pub mod scene;

pub use error::{CapacityPolicy, EngineError, EngineResult};
pub use event_system::GpuEventQueue;
pub use renderer::{
    QueueCulledRenderNodes, QueueRenderNodes, RenderDevice, RenderPassSpec, SceneRenderNodes,
};
pub use scene::{RenderMode, Scene, SceneCuller};

/// Engine-level configuration for the render-node pipeline
#[derive(Debug, Clone, Copy)]
pub struct RenderConfig {
    /// How fixed-capacity tables react to bounds violations
    pub capacity_policy: CapacityPolicy,

    /// Global multiplier applied to instanced draw counts
    pub instance_multiplier: u32,

    /// Whether the device exposes storage buffers (required for skinned
    /// instancing; without it skinning drops instancing instead)
    pub supports_storage_buffers: bool,

    /// Whether the device supports instanced draws at all
    pub supports_instancing: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            capacity_policy: CapacityPolicy::Panic,
            instance_multiplier: 1,
            supports_storage_buffers: true,
            supports_instancing: true,
        }
    }
}
