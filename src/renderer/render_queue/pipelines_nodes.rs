//! Plain per-pipeline node table
//!
//! Maps (pipeline id, cull side) to a [`BuffersView`], with a dedup index
//! keyed on (node id, side) so one node is never inserted twice into the
//! same orientation slot within a classification pass. Re-insertion of a
//! seen node only re-affirms its visibility; that is how a node referenced
//! from several culled-object entries converges to a single draw entry.

use ash::vk;
use rustc_hash::FxHashMap;

use crate::constants::nodes::{MAX_PIPELINES, MAX_TABLE_NODES};
use crate::error::{CapacityPolicy, EngineResult};
use crate::renderer::pipeline::{CullSide, PipelineAndId};
use crate::renderer::render_queue::buffers_view::BuffersView;
use crate::renderer::render_queue::counted_node::CountedNode;
use crate::renderer::render_queue::scene_render_nodes::RenderNodeId;

/// Where a counted node lives inside the table
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodePath {
    pub slot: usize,
    pub buffer: usize,
    pub index: u32,
}

/// One occupied pipeline slot
#[derive(Debug)]
pub struct PipelineSlot {
    pub pipeline: PipelineAndId,
    pub side: CullSide,
    pub view: BuffersView,
}

/// Root table: (pipeline, orientation) -> buffers -> nodes
#[derive(Debug)]
pub struct PipelinesNodes {
    slots: Vec<Option<PipelineSlot>>,
    lookup: FxHashMap<(RenderNodeId, CullSide), NodePath>,
    total: u32,
    policy: CapacityPolicy,
}

impl PipelinesNodes {
    pub fn new(policy: CapacityPolicy) -> Self {
        let mut slots = Vec::new();
        slots.resize_with(MAX_PIPELINES as usize, || None);
        Self {
            slots,
            lookup: FxHashMap::default(),
            total: 0,
            policy,
        }
    }

    /// Insert a node for `(pipeline, side)`, or re-affirm its visibility if
    /// this pass already saw it. Idempotent per (node, side).
    pub fn emplace(
        &mut self,
        pipeline: PipelineAndId,
        buffer: vk::Buffer,
        counted: CountedNode,
        side: CullSide,
    ) -> EngineResult<NodePath> {
        let key = (counted.node, side);

        if let Some(&path) = self.lookup.get(&key) {
            if let Some(existing) = self.node_mut(path) {
                existing.visible = true;
            }
            return Ok(path);
        }

        if self.total >= MAX_TABLE_NODES {
            return Err(
                self.policy
                    .violation("nodes", MAX_TABLE_NODES, self.total + 1),
            );
        }

        let slot_index = pipeline.slot(side, MAX_PIPELINES);

        if slot_index >= self.slots.len() {
            return Err(self.policy.violation(
                "pipelines",
                MAX_PIPELINES / 2,
                pipeline.id as u32 + 1,
            ));
        }

        let policy = self.policy;
        let slot = self.slots[slot_index].get_or_insert_with(|| PipelineSlot {
            pipeline,
            side,
            view: BuffersView::new(policy),
        });
        slot.pipeline = pipeline;

        let (buffer_index, node_index) = slot.view.emplace(
            buffer,
            CountedNode {
                visible: true,
                ..counted
            },
        )?;

        let path = NodePath {
            slot: slot_index,
            buffer: buffer_index,
            index: node_index,
        };
        self.lookup.insert(key, path);
        self.total += 1;
        Ok(path)
    }

    /// Hide `node` in both orientation slots without removing it from the
    /// table. Both keys are probed unconditionally even when only one
    /// orientation was ever inserted; the miss is a no-op.
    pub fn erase(&mut self, node: RenderNodeId) {
        for side in CullSide::BOTH {
            if let Some(&path) = self.lookup.get(&(node, side)) {
                if let Some(counted) = self.node_mut(path) {
                    counted.visible = false;
                }
            }
        }
    }

    /// Reset to empty. Pipeline entries are released; node storage stays
    /// allocated for the next classification pass.
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.view.clear();
        }
        self.lookup.clear();
        self.total = 0;
    }

    pub fn size(&self) -> u32 {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn get(&self, path: NodePath) -> Option<&CountedNode> {
        self.slots[path.slot]
            .as_ref()?
            .view
            .get(path.buffer)?
            .nodes
            .get(path.index)
    }

    fn node_mut(&mut self, path: NodePath) -> Option<&mut CountedNode> {
        self.slots[path.slot]
            .as_mut()?
            .view
            .get_mut(path.buffer)?
            .nodes
            .get_mut(path.index)
    }

    /// Look up the live entry for (node, side)
    pub fn find(&self, node: RenderNodeId, side: CullSide) -> Option<&CountedNode> {
        let path = *self.lookup.get(&(node, side))?;
        self.get(path)
    }

    /// Occupied pipeline slots with at least one node, back-culled half
    /// first, each in slot order
    pub fn pipelines(&self) -> impl Iterator<Item = &PipelineSlot> {
        self.slots
            .iter()
            .flatten()
            .filter(|slot| !slot.view.is_empty())
    }

    /// Occupied slots of one orientation, in slot order
    pub fn pipelines_of(&self, side: CullSide) -> impl Iterator<Item = &PipelineSlot> {
        self.pipelines().filter(move |slot| slot.side == side)
    }

    /// Nodes in one orientation half
    pub fn side_node_count(&self, side: CullSide) -> u32 {
        self.pipelines()
            .filter(|slot| slot.side == side)
            .map(|slot| slot.view.node_count())
            .sum()
    }
}
