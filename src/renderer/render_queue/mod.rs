//! Render-node classification, instancing aggregation and culling update
//!
//! The per-frame pipeline: [`QueueRenderNodes`] classifies every tracked
//! object into fixed-capacity node tables, [`SceneRenderNodes`] owns the
//! node identities and their descriptor provisioning, and
//! [`QueueCulledRenderNodes`] intersects the tables with the frame's
//! visibility result and records the draw commands.

pub mod buffers_view;
pub mod counted_node;
pub mod culled_render_nodes;
pub mod descriptors;
pub mod instanced_nodes;
pub mod pipelines_nodes;
pub mod queue_render_nodes;
pub mod scene_render_nodes;


pub use buffers_view::{BufferNodes, BuffersView};
pub use counted_node::{CountedNode, NodesView};
pub use culled_render_nodes::QueueCulledRenderNodes;
pub use descriptors::{
    DescriptorSetLayouts, DescriptorSetPools, NodeDescriptorSets, NodeShape,
};
pub use instanced_nodes::InstancedPipelinesNodes;
pub use pipelines_nodes::{NodePath, PipelinesNodes};
pub use queue_render_nodes::{
    NodesCounts, PipelineNodesRegistry, QueueRenderNodes, RenderPassSpec,
};
pub use scene_render_nodes::{
    BillboardRenderNode, RenderNode, RenderNodeId, SceneRenderNodes, SubmeshRenderNode,
};
