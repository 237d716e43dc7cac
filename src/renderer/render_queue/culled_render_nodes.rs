//! Per-frame visibility intersection and command recording
//!
//! The full tables built by classification reflect every tracked object;
//! this pass intersects them against the culler's visible set for the
//! frame and records the resulting draw list. It is a set-intersection,
//! not a rebuild: pipeline flags are not recomputed and descriptor sets
//! are not touched. The membership test is a linear scan of the culled
//! list, which is already bounded by frustum culling.

use crate::error::{CapacityPolicy, EngineError, EngineResult};
use crate::renderer::commands::{
    DrawIndexedIndirectCommand, DrawIndirectCommand, NodeCommand, RecordedCommandBuffer,
    RenderCommand,
};
use crate::renderer::pipeline::CullSide;
use crate::renderer::render_queue::counted_node::CountedNode;
use crate::renderer::render_queue::descriptors::NodeDescriptorSets;
use crate::renderer::render_queue::instanced_nodes::InstancedPipelinesNodes;
use crate::renderer::render_queue::pipelines_nodes::PipelinesNodes;
use crate::renderer::render_queue::queue_render_nodes::QueueRenderNodes;
use crate::renderer::render_queue::scene_render_nodes::SceneRenderNodes;
use crate::scene::{CulledId, RenderMode, SceneCuller};
use ash::vk;

/// Which indirect-command array a plain table's draws land in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrawKind {
    Submesh,
    Billboard,
}

/// The node subset actually drawn this frame, plus its recorded commands
pub struct QueueCulledRenderNodes {
    pub static_nodes: PipelinesNodes,
    pub skinned_nodes: PipelinesNodes,
    pub morphing_nodes: PipelinesNodes,
    pub billboard_nodes: PipelinesNodes,
    pub instanced_static_nodes: InstancedPipelinesNodes,
    pub instanced_skinned_nodes: InstancedPipelinesNodes,

    submesh_indexed_commands: Vec<DrawIndexedIndirectCommand>,
    submesh_commands: Vec<DrawIndirectCommand>,
    billboard_commands: Vec<DrawIndirectCommand>,
}

impl QueueCulledRenderNodes {
    pub fn new(policy: CapacityPolicy) -> Self {
        Self {
            static_nodes: PipelinesNodes::new(policy),
            skinned_nodes: PipelinesNodes::new(policy),
            morphing_nodes: PipelinesNodes::new(policy),
            billboard_nodes: PipelinesNodes::new(policy),
            instanced_static_nodes: InstancedPipelinesNodes::new(policy),
            instanced_skinned_nodes: InstancedPipelinesNodes::new(policy),
            submesh_indexed_commands: Vec::new(),
            submesh_commands: Vec::new(),
            billboard_commands: Vec::new(),
        }
    }

    /// Intersect the full tables against the culler's visible set for
    /// `mode`.
    pub fn parse(
        &mut self,
        full: &QueueRenderNodes,
        culler: &SceneCuller,
        mode: RenderMode,
    ) -> EngineResult<()> {
        self.static_nodes.clear();
        self.skinned_nodes.clear();
        self.morphing_nodes.clear();
        self.billboard_nodes.clear();
        self.instanced_static_nodes.clear();
        self.instanced_skinned_nodes.clear();

        let submeshes = culler.culled_submeshes(mode);
        let billboards = culler.culled_billboards(mode);

        intersect_plain(&mut self.static_nodes, &full.static_nodes, submeshes)?;
        intersect_plain(&mut self.skinned_nodes, &full.skinned_nodes, submeshes)?;
        intersect_plain(&mut self.morphing_nodes, &full.morphing_nodes, submeshes)?;
        intersect_plain(&mut self.billboard_nodes, &full.billboard_nodes, billboards)?;
        intersect_instanced(
            &mut self.instanced_static_nodes,
            &full.instanced_static_nodes,
            submeshes,
        )?;
        intersect_instanced(
            &mut self.instanced_skinned_nodes,
            &full.instanced_skinned_nodes,
            submeshes,
        )?;

        log::debug!(
            "[QueueCulledRenderNodes::parse] mode={:?} static={} skinned={} morphing={} billboard={} instanced_static={} instanced_skinned={}",
            mode,
            self.static_nodes.size(),
            self.skinned_nodes.size(),
            self.morphing_nodes.size(),
            self.billboard_nodes.size(),
            self.instanced_static_nodes.size(),
            self.instanced_skinned_nodes.size(),
        );
        Ok(())
    }

    /// True iff any of the twelve kind/orientation table halves holds a
    /// node; gates whether the owning render pass is scheduled at all.
    pub fn has_nodes(&self) -> bool {
        CullSide::BOTH.iter().any(|&side| {
            self.static_nodes.side_node_count(side) > 0
                || self.skinned_nodes.side_node_count(side) > 0
                || self.morphing_nodes.side_node_count(side) > 0
                || self.billboard_nodes.side_node_count(side) > 0
                || self.instanced_static_nodes.side_node_count(side) > 0
                || self.instanced_skinned_nodes.side_node_count(side) > 0
        })
    }

    /// Record the frame's secondary command buffer: each pipeline bound
    /// exactly once before all its draws, front-culled tables before
    /// back-culled, kinds in classification order. Also fills the per-kind
    /// indirect command arrays.
    pub fn prepare_command_buffers(
        &mut self,
        viewport: vk::Viewport,
        scissor: vk::Rect2D,
        scene_nodes: &SceneRenderNodes,
        instance_multiplier: u32,
    ) -> EngineResult<RecordedCommandBuffer> {
        let Self {
            static_nodes,
            skinned_nodes,
            morphing_nodes,
            billboard_nodes,
            instanced_static_nodes,
            instanced_skinned_nodes,
            submesh_indexed_commands,
            submesh_commands,
            billboard_commands,
        } = self;

        submesh_indexed_commands.clear();
        submesh_commands.clear();
        billboard_commands.clear();

        let mut recorded = RecordedCommandBuffer::new();
        recorded.push(RenderCommand::SetViewport(viewport));
        recorded.push(RenderCommand::SetScissor(scissor));

        let mut sinks = CommandSinks {
            submesh_indexed: submesh_indexed_commands,
            submesh: submesh_commands,
            billboard: billboard_commands,
        };

        for side in [CullSide::Front, CullSide::Back] {
            record_plain(
                &mut recorded,
                static_nodes,
                side,
                scene_nodes,
                DrawKind::Submesh,
                &mut sinks,
            )?;
            record_plain(
                &mut recorded,
                skinned_nodes,
                side,
                scene_nodes,
                DrawKind::Submesh,
                &mut sinks,
            )?;
            record_instanced(
                &mut recorded,
                instanced_static_nodes,
                side,
                scene_nodes,
                instance_multiplier,
                &mut sinks,
            )?;
            record_instanced(
                &mut recorded,
                instanced_skinned_nodes,
                side,
                scene_nodes,
                instance_multiplier,
                &mut sinks,
            )?;
            record_plain(
                &mut recorded,
                morphing_nodes,
                side,
                scene_nodes,
                DrawKind::Submesh,
                &mut sinks,
            )?;
            record_plain(
                &mut recorded,
                billboard_nodes,
                side,
                scene_nodes,
                DrawKind::Billboard,
                &mut sinks,
            )?;
        }

        log::debug!(
            "[QueueCulledRenderNodes::prepare_command_buffers] {} draws, {} pipeline binds",
            recorded.draw_call_count(),
            recorded.pipeline_bind_count()
        );
        Ok(recorded)
    }

    /// Indexed submesh draws, in recording order
    pub fn submesh_indexed_commands(&self) -> &[DrawIndexedIndirectCommand] {
        &self.submesh_indexed_commands
    }

    /// Non-indexed submesh draws, in recording order
    pub fn submesh_commands(&self) -> &[DrawIndirectCommand] {
        &self.submesh_commands
    }

    /// Billboard draws, in recording order
    pub fn billboard_commands(&self) -> &[DrawIndirectCommand] {
        &self.billboard_commands
    }
}

struct CommandSinks<'a> {
    submesh_indexed: &'a mut Vec<DrawIndexedIndirectCommand>,
    submesh: &'a mut Vec<DrawIndirectCommand>,
    billboard: &'a mut Vec<DrawIndirectCommand>,
}

impl CommandSinks<'_> {
    fn sink(&mut self, command: NodeCommand, kind: DrawKind) {
        match (command, kind) {
            (NodeCommand::Indexed(cmd), _) => self.submesh_indexed.push(cmd),
            (NodeCommand::Vertex(cmd), DrawKind::Submesh) => self.submesh.push(cmd),
            (NodeCommand::Vertex(cmd), DrawKind::Billboard) => self.billboard.push(cmd),
        }
    }
}

fn intersect_plain(
    culled: &mut PipelinesNodes,
    full: &PipelinesNodes,
    visible: &[CulledId],
) -> EngineResult<()> {
    for slot in full.pipelines() {
        for buffer_nodes in slot.view.iter() {
            for counted in buffer_nodes.nodes.iter() {
                if counted.visible && visible.contains(&counted.culled) {
                    culled.emplace(slot.pipeline, buffer_nodes.buffer, *counted, slot.side)?;
                }
            }
        }
    }
    Ok(())
}

fn intersect_instanced(
    culled: &mut InstancedPipelinesNodes,
    full: &InstancedPipelinesNodes,
    visible: &[CulledId],
) -> EngineResult<()> {
    for slot in full.pipelines() {
        for buffer_nodes in &slot.buffers {
            for pass_nodes in &buffer_nodes.passes {
                for group in &pass_nodes.objects {
                    for &index in &group.nodes {
                        let counted = full.node(index);
                        if counted.visible && visible.contains(&counted.culled) {
                            culled.emplace(
                                slot.pipeline,
                                buffer_nodes.buffer,
                                pass_nodes.pass,
                                group.object,
                                *counted,
                                slot.side,
                            )?;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}

fn node_sets(
    scene_nodes: &SceneRenderNodes,
    counted: &CountedNode,
) -> EngineResult<NodeDescriptorSets> {
    scene_nodes
        .node_sets(counted.node)
        .ok_or(EngineError::StateError {
            expected: "initialised descriptor sets before recording".to_string(),
            actual: format!("node {} has no sets", counted.node.0),
        })
}

fn record_plain(
    recorded: &mut RecordedCommandBuffer,
    table: &PipelinesNodes,
    side: CullSide,
    scene_nodes: &SceneRenderNodes,
    kind: DrawKind,
    sinks: &mut CommandSinks<'_>,
) -> EngineResult<()> {
    for slot in table.pipelines_of(side) {
        if slot.view.iter().all(|b| b.nodes.visible_count() == 0) {
            continue;
        }

        recorded.push(RenderCommand::BindPipeline(slot.pipeline, side));

        for buffer_nodes in slot.view.iter() {
            if buffer_nodes.nodes.visible_count() == 0 {
                continue;
            }

            recorded.push(RenderCommand::BindVertexBuffer(buffer_nodes.buffer));

            for counted in buffer_nodes.nodes.iter().filter(|n| n.visible) {
                let sets = node_sets(scene_nodes, counted)?;
                recorded.push(RenderCommand::BindDescriptorSets {
                    uniforms: sets.uniforms,
                    textures: sets.textures,
                });

                match counted.command {
                    NodeCommand::Indexed(cmd) => recorded.push(RenderCommand::DrawIndexed(cmd)),
                    NodeCommand::Vertex(cmd) => recorded.push(RenderCommand::Draw(cmd)),
                }
                sinks.sink(counted.command, kind);
            }
        }
    }
    Ok(())
}

fn record_instanced(
    recorded: &mut RecordedCommandBuffer,
    table: &InstancedPipelinesNodes,
    side: CullSide,
    scene_nodes: &SceneRenderNodes,
    instance_multiplier: u32,
    sinks: &mut CommandSinks<'_>,
) -> EngineResult<()> {
    for slot in table.pipelines_of(side) {
        let any_visible = slot
            .buffers
            .iter()
            .flat_map(|b| b.passes.iter())
            .flat_map(|p| p.objects.iter())
            .any(|group| table.visible_in_group(group) > 0);
        if !any_visible {
            continue;
        }

        recorded.push(RenderCommand::BindPipeline(slot.pipeline, side));

        for buffer_nodes in &slot.buffers {
            let buffer_visible = buffer_nodes
                .passes
                .iter()
                .flat_map(|p| p.objects.iter())
                .any(|group| table.visible_in_group(group) > 0);
            if !buffer_visible {
                continue;
            }

            recorded.push(RenderCommand::BindVertexBuffer(buffer_nodes.buffer));

            for pass_nodes in &buffer_nodes.passes {
                for group in &pass_nodes.objects {
                    let members = table.visible_in_group(group);
                    if members == 0 {
                        continue;
                    }

                    // One draw for the whole group; descriptor sets come
                    // from its first visible member.
                    let first = group
                        .nodes
                        .iter()
                        .map(|&index| table.node(index))
                        .find(|counted| counted.visible)
                        .expect("group with visible members has a first visible node");

                    let sets = node_sets(scene_nodes, first)?;
                    recorded.push(RenderCommand::BindDescriptorSets {
                        uniforms: sets.uniforms,
                        textures: sets.textures,
                    });

                    let command = first
                        .command
                        .with_instance_count(members * instance_multiplier);
                    match command {
                        NodeCommand::Indexed(cmd) => {
                            recorded.push(RenderCommand::DrawIndexed(cmd))
                        }
                        NodeCommand::Vertex(cmd) => recorded.push(RenderCommand::Draw(cmd)),
                    }
                    sinks.sink(command, DrawKind::Submesh);
                }
            }
        }
    }
    Ok(())
}
