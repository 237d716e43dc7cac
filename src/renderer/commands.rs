//! Draw command layouts and the recorded secondary command list
//!
//! The Pod structs match the Vulkan indirect-command layouts byte for byte
//! so the per-kind command arrays can be uploaded straight into an
//! INDIRECT_BUFFER. [`RecordedCommandBuffer`] is the CPU-side secondary
//! command buffer the culled queue emits: an ordered list of binds and
//! draws the backend replays verbatim.

use ash::vk;
use bytemuck::{Pod, Zeroable};

use crate::renderer::pipeline::{CullSide, PipelineAndId};

/// Matches `VkDrawIndexedIndirectCommand`
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndexedIndirectCommand {
    /// Number of indices to draw
    pub index_count: u32,

    /// Number of instances to draw
    pub instance_count: u32,

    /// First index in the index buffer
    pub first_index: u32,

    /// Value added to each index
    pub vertex_offset: i32,

    /// First instance index
    pub first_instance: u32,
}

/// Matches `VkDrawIndirectCommand`
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct DrawIndirectCommand {
    /// Number of vertices to draw
    pub vertex_count: u32,

    /// Number of instances to draw
    pub instance_count: u32,

    /// First vertex index
    pub first_vertex: u32,

    /// First instance index
    pub first_instance: u32,
}

/// The draw a render node was classified with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCommand {
    Indexed(DrawIndexedIndirectCommand),
    Vertex(DrawIndirectCommand),
}

impl NodeCommand {
    pub fn instance_count(&self) -> u32 {
        match self {
            NodeCommand::Indexed(cmd) => cmd.instance_count,
            NodeCommand::Vertex(cmd) => cmd.instance_count,
        }
    }

    /// The same command with its instance count replaced, used when an
    /// instanced group collapses several nodes into one draw.
    pub fn with_instance_count(self, instance_count: u32) -> Self {
        match self {
            NodeCommand::Indexed(mut cmd) => {
                cmd.instance_count = instance_count;
                NodeCommand::Indexed(cmd)
            }
            NodeCommand::Vertex(mut cmd) => {
                cmd.instance_count = instance_count;
                NodeCommand::Vertex(cmd)
            }
        }
    }
}

/// One recorded command
#[derive(Debug, Clone, Copy)]
pub enum RenderCommand {
    SetViewport(vk::Viewport),
    SetScissor(vk::Rect2D),
    BindPipeline(PipelineAndId, CullSide),
    BindDescriptorSets {
        uniforms: vk::DescriptorSet,
        textures: vk::DescriptorSet,
    },
    BindVertexBuffer(vk::Buffer),
    DrawIndexed(DrawIndexedIndirectCommand),
    Draw(DrawIndirectCommand),
}

/// CPU-side secondary command buffer
#[derive(Debug, Default)]
pub struct RecordedCommandBuffer {
    commands: Vec<RenderCommand>,
}

impl RecordedCommandBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, command: RenderCommand) {
        self.commands.push(command);
    }

    pub fn commands(&self) -> &[RenderCommand] {
        &self.commands
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Number of draw commands recorded
    pub fn draw_call_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::DrawIndexed(_) | RenderCommand::Draw(_)))
            .count()
    }

    /// Number of pipeline binds recorded
    pub fn pipeline_bind_count(&self) -> usize {
        self.commands
            .iter()
            .filter(|c| matches!(c, RenderCommand::BindPipeline(..)))
            .count()
    }
}
