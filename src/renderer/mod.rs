//! Renderer Module
//!
//! The GPU-facing half of the engine: pipeline identity, draw command
//! layouts, the render-device seam and the render-node pipeline.

pub mod commands;
pub mod device;
pub mod pipeline;
pub mod render_queue;

pub use commands::{
    DrawIndexedIndirectCommand, DrawIndirectCommand, NodeCommand, RecordedCommandBuffer,
    RenderCommand,
};
pub use device::{DescriptorCounts, DescriptorPoolError, RenderDevice, VulkanDevice};
pub use pipeline::{CullSide, PipelineAndId, PipelineCache, PipelineFlags, ProgramFlags};
pub use render_queue::{
    QueueCulledRenderNodes, QueueRenderNodes, RenderPassSpec, SceneRenderNodes,
};
