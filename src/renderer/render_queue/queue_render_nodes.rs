//! Per-frame render-node classification
//!
//! `QueueRenderNodes::parse` walks every submesh and billboard the culler
//! tracks for the queue's render mode (visibility-unfiltered), decides the
//! animated/instanced/static path from pass and companion-object state, and
//! routes each into the right node table. Descriptor initialisation for the
//! nodes it touched is posted to the GPU event queue, never run inline.

use std::sync::Arc;

use ash::vk;
use rustc_hash::FxHashMap;

use crate::constants::nodes::MAX_PIPELINE_NODE_BUFFERS;
use crate::constants::nodes::{MAX_INSTANCED_PIPELINES, MAX_PIPELINES};
use crate::error::{CapacityPolicy, EngineResult};
use crate::event_system::GpuEventQueue;
use crate::renderer::commands::{
    DrawIndexedIndirectCommand, DrawIndirectCommand, NodeCommand,
};
use crate::renderer::pipeline::{CullSide, PipelineCache, PipelineFlags, ProgramFlags};
use crate::renderer::render_queue::counted_node::CountedNode;
use crate::renderer::render_queue::instanced_nodes::InstancedPipelinesNodes;
use crate::renderer::render_queue::pipelines_nodes::PipelinesNodes;
use crate::renderer::render_queue::scene_render_nodes::{RenderNodeId, SceneRenderNodes};
use crate::scene::{
    AnimatedSkeletonId, Billboard, CulledBillboard, CulledSubmesh, Pass, RenderMode, Scene,
    SceneCuller, Submesh,
};
use crate::RenderConfig;

/// Per-render-pass classification context: which passes this queue accepts
/// and how it shapes pipelines.
#[derive(Clone, Copy)]
pub struct RenderPassSpec {
    pub mode: RenderMode,

    /// Alpha-blended passes may still instance when the pass's output is
    /// order-independent
    pub order_independent: bool,

    /// The render pass forces two-sided rendering regardless of pass state
    pub force_two_sided: bool,

    /// Render-pass hook: a pass returning false is excluded from
    /// classification
    pub filter: Option<fn(&Pass) -> bool>,
}

impl RenderPassSpec {
    pub fn new(mode: RenderMode) -> Self {
        Self {
            mode,
            order_independent: false,
            force_two_sided: false,
            filter: None,
        }
    }

    /// Mode and hook filtering; failing passes are silently excluded,
    /// which is steady-state behaviour, not an error.
    pub fn is_valid_pass(&self, pass: &Pass) -> bool {
        let mode_ok = match self.mode {
            RenderMode::Opaque => !pass.has_only_alpha_blending(),
            RenderMode::Transparent => pass.has_alpha_blending(),
            RenderMode::Shadow => true,
        };
        mode_ok && self.filter.map_or(true, |filter| filter(pass))
    }

    /// A front-culled pipeline variant exists only when back faces can be
    /// visible: two-sided passes, forced two-sidedness, or alpha blending.
    fn needs_front(&self, pass: &Pass) -> bool {
        pass.is_two_sided() || self.force_two_sided || pass.has_alpha_blending()
    }
}

/// Bounded registry of (pipeline flags hash, buffer) slots for GPU-side
/// per-draw node indexing
#[derive(Debug)]
pub struct PipelineNodesRegistry {
    slots: FxHashMap<(u64, vk::Buffer), u32>,
    policy: CapacityPolicy,
}

impl PipelineNodesRegistry {
    pub fn new(policy: CapacityPolicy) -> Self {
        Self {
            slots: FxHashMap::default(),
            policy,
        }
    }

    pub fn register(&mut self, flags_hash: u64, buffer: vk::Buffer) -> EngineResult<u32> {
        if let Some(&slot) = self.slots.get(&(flags_hash, buffer)) {
            return Ok(slot);
        }

        let next = self.slots.len() as u32;

        if next >= MAX_PIPELINE_NODE_BUFFERS {
            return Err(self.policy.violation(
                "pipeline node buffers",
                MAX_PIPELINE_NODE_BUFFERS,
                next + 1,
            ));
        }

        self.slots.insert((flags_hash, buffer), next);
        Ok(next)
    }

    pub fn index_of(&self, flags_hash: u64, buffer: vk::Buffer) -> Option<u32> {
        self.slots.get(&(flags_hash, buffer)).copied()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

/// Node totals after a classification pass
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct NodesCounts {
    pub static_nodes: u32,
    pub skinned_nodes: u32,
    pub morphing_nodes: u32,
    pub billboard_nodes: u32,
    pub instanced_static_nodes: u32,
    pub instanced_skinned_nodes: u32,
}

impl NodesCounts {
    pub fn total(&self) -> u32 {
        self.static_nodes
            + self.skinned_nodes
            + self.morphing_nodes
            + self.billboard_nodes
            + self.instanced_static_nodes
            + self.instanced_skinned_nodes
    }
}

/// One queue's classification state and node tables
pub struct QueueRenderNodes {
    spec: RenderPassSpec,
    config: RenderConfig,

    pipelines: PipelineCache,
    instanced_pipelines: PipelineCache,

    pub static_nodes: PipelinesNodes,
    pub skinned_nodes: PipelinesNodes,
    pub morphing_nodes: PipelinesNodes,
    pub billboard_nodes: PipelinesNodes,
    pub instanced_static_nodes: InstancedPipelinesNodes,
    pub instanced_skinned_nodes: InstancedPipelinesNodes,

    node_registry: PipelineNodesRegistry,
    counts: NodesCounts,
    has_nodes: bool,
}

impl QueueRenderNodes {
    pub fn new(spec: RenderPassSpec, config: RenderConfig) -> Self {
        let policy = config.capacity_policy;
        Self {
            spec,
            config,
            pipelines: PipelineCache::new(MAX_PIPELINES, policy),
            instanced_pipelines: PipelineCache::new(MAX_INSTANCED_PIPELINES, policy),
            static_nodes: PipelinesNodes::new(policy),
            skinned_nodes: PipelinesNodes::new(policy),
            morphing_nodes: PipelinesNodes::new(policy),
            billboard_nodes: PipelinesNodes::new(policy),
            instanced_static_nodes: InstancedPipelinesNodes::new(policy),
            instanced_skinned_nodes: InstancedPipelinesNodes::new(policy),
            node_registry: PipelineNodesRegistry::new(policy),
            counts: NodesCounts::default(),
            has_nodes: false,
        }
    }

    pub fn spec(&self) -> &RenderPassSpec {
        &self.spec
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn has_nodes(&self) -> bool {
        self.has_nodes
    }

    pub fn counts(&self) -> NodesCounts {
        self.counts
    }

    pub fn node_registry(&self) -> &PipelineNodesRegistry {
        &self.node_registry
    }

    /// Whether any culler entry would survive filtering, checked before
    /// any table work so an empty render pass can be skipped outright.
    pub fn has_culled_nodes(&self, scene: &Scene, culler: &SceneCuller) -> bool {
        culler
            .all_submeshes(self.spec.mode)
            .iter()
            .any(|culled| self.accepts_submesh(scene, culled))
            || culler
                .all_billboards(self.spec.mode)
                .iter()
                .any(|culled| self.accepts_billboard(scene, culled))
    }

    fn accepts_submesh(&self, scene: &Scene, culled: &CulledSubmesh) -> bool {
        if scene.ignored_node() == Some(culled.scene_node) {
            return false;
        }

        let geometry = scene.geometry(culled.geometry);
        if self.spec.mode == RenderMode::Shadow && !geometry.shadow_caster {
            return false;
        }

        self.spec.is_valid_pass(scene.pass(culled.pass))
    }

    fn accepts_billboard(&self, scene: &Scene, culled: &CulledBillboard) -> bool {
        if scene.ignored_node() == Some(culled.scene_node) {
            return false;
        }

        self.spec.is_valid_pass(scene.pass(culled.pass))
    }

    /// Classify every tracked object into the node tables and schedule
    /// descriptor initialisation for the result.
    pub fn parse(
        &mut self,
        scene: &Scene,
        culler: &SceneCuller,
        scene_nodes: &Arc<SceneRenderNodes>,
        events: &GpuEventQueue,
    ) -> EngineResult<()> {
        self.static_nodes.clear();
        self.skinned_nodes.clear();
        self.morphing_nodes.clear();
        self.billboard_nodes.clear();
        self.instanced_static_nodes.clear();
        self.instanced_skinned_nodes.clear();
        self.node_registry.clear();
        self.has_nodes = false;

        for culled in culler.all_submeshes(self.spec.mode) {
            if self.accepts_submesh(scene, culled) {
                self.classify_submesh(scene, scene_nodes, culled)?;
            }
        }

        for culled in culler.all_billboards(self.spec.mode) {
            if self.accepts_billboard(scene, culled) {
                self.classify_billboard(scene, scene_nodes, culled)?;
            }
        }

        self.counts = NodesCounts {
            static_nodes: self.static_nodes.size(),
            skinned_nodes: self.skinned_nodes.size(),
            morphing_nodes: self.morphing_nodes.size(),
            billboard_nodes: self.billboard_nodes.size(),
            instanced_static_nodes: self.instanced_static_nodes.size(),
            instanced_skinned_nodes: self.instanced_skinned_nodes.size(),
        };
        log::debug!(
            "[QueueRenderNodes::parse] mode={:?} counts={:?}",
            self.spec.mode,
            self.counts
        );

        let nodes = Arc::clone(scene_nodes);
        let counts = self.counts;
        events.post(Box::new(move |device| {
            match nodes.initialise_nodes(device) {
                Ok(initialised) => log::debug!(
                    "[QueueRenderNodes] Initialised descriptors for {} nodes ({} classified)",
                    initialised,
                    counts.total()
                ),
                Err(error) => log::warn!(
                    "[QueueRenderNodes] Deferred descriptor initialisation failed: {}",
                    error
                ),
            }
        }));

        Ok(())
    }

    /// Incremental visibility update for one submesh entry: re-classify
    /// when it becomes visible, hide its node everywhere when it is culled
    /// away. No full rebuild.
    pub fn submesh_changed(
        &mut self,
        scene: &Scene,
        scene_nodes: &Arc<SceneRenderNodes>,
        culled: &CulledSubmesh,
        visible: bool,
    ) -> EngineResult<()> {
        if visible {
            if self.accepts_submesh(scene, culled) {
                self.classify_submesh(scene, scene_nodes, culled)?;
            }
        } else if let Some(node) =
            scene_nodes.find_submesh_node(culled.scene_node, culled.submesh, culled.geometry)
        {
            self.erase_node(node);
        }
        Ok(())
    }

    /// Incremental visibility update for one billboard entry
    pub fn billboard_changed(
        &mut self,
        scene: &Scene,
        scene_nodes: &Arc<SceneRenderNodes>,
        culled: &CulledBillboard,
        visible: bool,
    ) -> EngineResult<()> {
        if visible {
            if self.accepts_billboard(scene, culled) {
                self.classify_billboard(scene, scene_nodes, culled)?;
            }
        } else if let Some(node) =
            scene_nodes.find_billboard_node(culled.scene_node, culled.billboard)
        {
            self.erase_node(node);
        }
        Ok(())
    }

    fn erase_node(&mut self, node: RenderNodeId) {
        self.static_nodes.erase(node);
        self.skinned_nodes.erase(node);
        self.morphing_nodes.erase(node);
        self.billboard_nodes.erase(node);
        self.instanced_static_nodes.erase(node);
        self.instanced_skinned_nodes.erase(node);
    }

    /// Drop everything the queue accumulated, pipelines included.
    /// Scene teardown only; per-frame reuse goes through `parse`.
    pub fn clear(&mut self) {
        self.pipelines.clear();
        self.instanced_pipelines.clear();
        self.static_nodes.clear();
        self.skinned_nodes.clear();
        self.morphing_nodes.clear();
        self.billboard_nodes.clear();
        self.instanced_static_nodes.clear();
        self.instanced_skinned_nodes.clear();
        self.node_registry.clear();
        self.counts = NodesCounts::default();
        self.has_nodes = false;
    }

    fn classify_submesh(
        &mut self,
        scene: &Scene,
        scene_nodes: &Arc<SceneRenderNodes>,
        culled: &CulledSubmesh,
    ) -> EngineResult<()> {
        let pass = scene.pass(culled.pass);
        let geometry = scene.geometry(culled.geometry);
        pass.prepare_textures();

        let mut program = pass.pass_flags();
        if pass.has_alpha_blending() {
            program.insert(ProgramFlags::ALPHA_BLENDING);
        }

        let mesh = scene.animated().find_mesh(&geometry.name);
        let skeleton = scene.animated().find_skeleton(&geometry.name);

        let instancing_eligible = self.config.supports_instancing
            && scene.instance_count(culled.submesh, culled.pass) > 1
            && mesh.is_none()
            && (!pass.has_alpha_blending() || self.spec.order_independent)
            && !pass.has_environment_mapping();

        if instancing_eligible {
            program.insert(ProgramFlags::INSTANTIATION);
        } else {
            program.remove(ProgramFlags::INSTANTIATION);
        }

        if skeleton.is_some() {
            program.insert(ProgramFlags::SKINNING);
            // Skinned instancing needs the bone matrices in a storage
            // buffer; without that support instancing is dropped instead.
            if !self.config.supports_storage_buffers {
                program.remove(ProgramFlags::INSTANTIATION);
            }
        }

        let needs_front = self.spec.needs_front(pass);

        if let Some(skeleton) = skeleton {
            self.add_skinning_node(
                scene,
                scene_nodes,
                culled,
                program,
                skeleton,
                needs_front,
            )
        } else if mesh.is_some() {
            program.insert(ProgramFlags::MORPHING);
            self.add_morphing_node(scene, scene_nodes, culled, program, needs_front)
        } else {
            self.add_static_node(scene, scene_nodes, culled, program, needs_front)
        }
    }

    fn classify_billboard(
        &mut self,
        scene: &Scene,
        scene_nodes: &Arc<SceneRenderNodes>,
        culled: &CulledBillboard,
    ) -> EngineResult<()> {
        let pass = scene.pass(culled.pass);
        let billboard = scene.billboard(culled.billboard);
        pass.prepare_textures();

        let mut program = pass.pass_flags();
        program.insert(ProgramFlags::BILLBOARDS);
        if pass.has_alpha_blending() {
            program.insert(ProgramFlags::ALPHA_BLENDING);
        }

        let node = scene_nodes.create_billboard_node(
            culled.pass,
            pass.texture_count(),
            culled.scene_node,
            culled.billboard,
        );

        let counted = CountedNode {
            node,
            culled: culled.id,
            command: billboard_command(billboard, culled.instance_count),
            instance_count: culled.instance_count,
            visible: true,
        };

        let flags = self.pipeline_flags(program, pass);
        let pipeline = self.pipelines.get_or_create(&flags)?;
        let needs_front = self.spec.needs_front(pass);

        self.billboard_nodes
            .emplace(pipeline, billboard.buffer, counted, CullSide::Back)?;
        if needs_front {
            self.billboard_nodes
                .emplace(pipeline, billboard.buffer, counted, CullSide::Front)?;
        }

        self.node_registry
            .register(flags.flags_hash(), billboard.buffer)?;
        self.has_nodes = true;
        Ok(())
    }

    fn add_static_node(
        &mut self,
        scene: &Scene,
        scene_nodes: &Arc<SceneRenderNodes>,
        culled: &CulledSubmesh,
        program: ProgramFlags,
        needs_front: bool,
    ) -> EngineResult<()> {
        let pass = scene.pass(culled.pass);
        let submesh = scene.submesh(culled.submesh);

        let node = scene_nodes.create_submesh_node(
            culled.pass,
            pass.texture_count(),
            culled.scene_node,
            culled.submesh,
            culled.geometry,
            None,
            None,
            false,
        );

        let counted = CountedNode {
            node,
            culled: culled.id,
            command: submesh_command(submesh, culled.instance_count),
            instance_count: culled.instance_count,
            visible: true,
        };
        let flags = self.pipeline_flags(program, pass);

        if program.contains(ProgramFlags::INSTANTIATION) {
            let pipeline = self.instanced_pipelines.get_or_create(&flags)?;
            self.instanced_static_nodes.emplace(
                pipeline,
                submesh.positions_buffer,
                culled.pass,
                culled.submesh,
                counted,
                CullSide::Back,
            )?;
            if needs_front {
                self.instanced_static_nodes.emplace(
                    pipeline,
                    submesh.positions_buffer,
                    culled.pass,
                    culled.submesh,
                    counted,
                    CullSide::Front,
                )?;
            }
        } else {
            let pipeline = self.pipelines.get_or_create(&flags)?;
            self.static_nodes
                .emplace(pipeline, submesh.positions_buffer, counted, CullSide::Back)?;
            if needs_front {
                self.static_nodes.emplace(
                    pipeline,
                    submesh.positions_buffer,
                    counted,
                    CullSide::Front,
                )?;
            }
        }

        self.node_registry
            .register(flags.flags_hash(), submesh.positions_buffer)?;
        self.has_nodes = true;
        Ok(())
    }

    fn add_morphing_node(
        &mut self,
        scene: &Scene,
        scene_nodes: &Arc<SceneRenderNodes>,
        culled: &CulledSubmesh,
        program: ProgramFlags,
        needs_front: bool,
    ) -> EngineResult<()> {
        let pass = scene.pass(culled.pass);
        let submesh = scene.submesh(culled.submesh);
        let geometry = scene.geometry(culled.geometry);
        let mesh = scene.animated().find_mesh(&geometry.name);

        let node = scene_nodes.create_submesh_node(
            culled.pass,
            pass.texture_count(),
            culled.scene_node,
            culled.submesh,
            culled.geometry,
            mesh,
            None,
            false,
        );

        let counted = CountedNode {
            node,
            culled: culled.id,
            command: submesh_command(submesh, culled.instance_count),
            instance_count: culled.instance_count,
            visible: true,
        };
        let flags = self.pipeline_flags(program, pass);
        let pipeline = self.pipelines.get_or_create(&flags)?;

        self.morphing_nodes
            .emplace(pipeline, submesh.positions_buffer, counted, CullSide::Back)?;
        if needs_front {
            self.morphing_nodes.emplace(
                pipeline,
                submesh.positions_buffer,
                counted,
                CullSide::Front,
            )?;
        }

        self.node_registry
            .register(flags.flags_hash(), submesh.positions_buffer)?;
        self.has_nodes = true;
        Ok(())
    }

    fn add_skinning_node(
        &mut self,
        scene: &Scene,
        scene_nodes: &Arc<SceneRenderNodes>,
        culled: &CulledSubmesh,
        mut program: ProgramFlags,
        skeleton: AnimatedSkeletonId,
        needs_front: bool,
    ) -> EngineResult<()> {
        let pass = scene.pass(culled.pass);
        let submesh = scene.submesh(culled.submesh);
        let geometry = scene.geometry(culled.geometry);
        let mesh = scene.animated().find_mesh(&geometry.name);

        let instanced_bones = scene.animated().skeleton(skeleton).instanced_bones;
        let instanced = program.contains(ProgramFlags::INSTANTIATION) && instanced_bones;

        if instanced {
            program.insert(ProgramFlags::INSTANCED_SKINNING);
        } else {
            program.remove(ProgramFlags::INSTANTIATION);
        }

        let node = scene_nodes.create_submesh_node(
            culled.pass,
            pass.texture_count(),
            culled.scene_node,
            culled.submesh,
            culled.geometry,
            mesh,
            Some(skeleton),
            instanced,
        );

        let counted = CountedNode {
            node,
            culled: culled.id,
            command: submesh_command(submesh, culled.instance_count),
            instance_count: culled.instance_count,
            visible: true,
        };
        let flags = self.pipeline_flags(program, pass);

        if instanced {
            let pipeline = self.instanced_pipelines.get_or_create(&flags)?;
            self.instanced_skinned_nodes.emplace(
                pipeline,
                submesh.positions_buffer,
                culled.pass,
                culled.submesh,
                counted,
                CullSide::Back,
            )?;
            if needs_front {
                self.instanced_skinned_nodes.emplace(
                    pipeline,
                    submesh.positions_buffer,
                    culled.pass,
                    culled.submesh,
                    counted,
                    CullSide::Front,
                )?;
            }
        } else {
            let pipeline = self.pipelines.get_or_create(&flags)?;
            self.skinned_nodes
                .emplace(pipeline, submesh.positions_buffer, counted, CullSide::Back)?;
            if needs_front {
                self.skinned_nodes.emplace(
                    pipeline,
                    submesh.positions_buffer,
                    counted,
                    CullSide::Front,
                )?;
            }
        }

        self.node_registry
            .register(flags.flags_hash(), submesh.positions_buffer)?;
        self.has_nodes = true;
        Ok(())
    }

    fn pipeline_flags(&self, program: ProgramFlags, pass: &Pass) -> PipelineFlags {
        PipelineFlags {
            program,
            textures_mask: pass.textures_mask(),
            mode: self.spec.mode,
        }
    }
}

/// The draw a submesh classifies into: indexed when index data exists,
/// plain vertex draw otherwise
pub(crate) fn submesh_command(submesh: &Submesh, instance_count: u32) -> NodeCommand {
    if submesh.has_indices {
        NodeCommand::Indexed(DrawIndexedIndirectCommand {
            index_count: submesh.index_count,
            instance_count,
            first_index: submesh.first_index,
            vertex_offset: submesh.vertex_offset,
            first_instance: 0,
        })
    } else {
        NodeCommand::Vertex(DrawIndirectCommand {
            vertex_count: submesh.vertex_count,
            instance_count,
            first_vertex: 0,
            first_instance: 0,
        })
    }
}

pub(crate) fn billboard_command(billboard: &Billboard, instance_count: u32) -> NodeCommand {
    NodeCommand::Vertex(DrawIndirectCommand {
        vertex_count: billboard.vertex_count,
        instance_count,
        first_vertex: billboard.first_vertex,
        first_instance: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk::Handle;

    #[test]
    fn test_registry_register_is_idempotent() {
        let mut registry = PipelineNodesRegistry::new(CapacityPolicy::Error);
        let buffer = vk::Buffer::from_raw(1);

        let first = registry.register(0xFEED, buffer).unwrap();
        let again = registry.register(0xFEED, buffer).unwrap();
        assert_eq!(first, again);
        assert_eq!(registry.len(), 1);

        let other = registry.register(0xFEED, vk::Buffer::from_raw(2)).unwrap();
        assert_ne!(first, other);
        assert_eq!(registry.index_of(0xFEED, buffer), Some(first));
    }

    #[test]
    fn test_registry_capacity_enforced() {
        let mut registry = PipelineNodesRegistry::new(CapacityPolicy::Error);
        for i in 0..MAX_PIPELINE_NODE_BUFFERS {
            registry
                .register(u64::from(i), vk::Buffer::from_raw(1))
                .unwrap();
        }
        assert!(registry
            .register(u64::from(MAX_PIPELINE_NODE_BUFFERS), vk::Buffer::from_raw(1))
            .is_err());
    }

    #[test]
    fn test_pass_validity_per_mode() {
        let opaque_only = Pass::new("stone");
        let blended = Pass::new("glass").with_alpha_blending(true);
        let blend_only = Pass::new("smoke").with_only_alpha_blending(true);

        let opaque = RenderPassSpec::new(RenderMode::Opaque);
        assert!(opaque.is_valid_pass(&opaque_only));
        assert!(opaque.is_valid_pass(&blended));
        assert!(!opaque.is_valid_pass(&blend_only));

        let transparent = RenderPassSpec::new(RenderMode::Transparent);
        assert!(!transparent.is_valid_pass(&opaque_only));
        assert!(transparent.is_valid_pass(&blended));
        assert!(transparent.is_valid_pass(&blend_only));
    }

    #[test]
    fn test_pass_filter_hook_excludes() {
        let mut spec = RenderPassSpec::new(RenderMode::Opaque);
        spec.filter = Some(|pass| !pass.name.starts_with("debug_"));

        assert!(spec.is_valid_pass(&Pass::new("stone")));
        assert!(!spec.is_valid_pass(&Pass::new("debug_wire")));
    }
}
