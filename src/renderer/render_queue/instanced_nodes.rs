//! Instanced per-pipeline node table
//!
//! Keyed one level deeper than [`PipelinesNodes`]: pipeline -> buffer ->
//! pass -> object (submesh). Every render node sharing that tuple lands in
//! one group, which the culled queue later turns into a single draw with
//! `instance_count = group size`. Deduplication is by node id alone and
//! scoped to the whole table, so a node re-seen through another orientation
//! or culled-object entry only re-affirms visibility on its one entry.

use ash::vk;
use rustc_hash::FxHashMap;

use crate::constants::nodes::{
    MAX_BUFFERS_PER_PIPELINE, MAX_INSTANCED_PIPELINES, MAX_NODES_PER_BUFFER,
    MAX_OBJECTS_PER_PASS, MAX_PASSES_PER_BUFFER, MAX_TABLE_INSTANCES,
};
use crate::error::{CapacityPolicy, EngineResult};
use crate::renderer::pipeline::{CullSide, PipelineAndId};
use crate::renderer::render_queue::counted_node::CountedNode;
use crate::renderer::render_queue::scene_render_nodes::RenderNodeId;
use crate::scene::{PassId, SubmeshId};

/// One aggregated (pipeline, buffer, pass, object) group
#[derive(Debug)]
pub struct ObjectNodes {
    pub object: SubmeshId,

    /// Indices into the table's backing node array
    pub nodes: Vec<u32>,
}

/// Object groups for one pass
#[derive(Debug)]
pub struct PassNodes {
    pub pass: PassId,
    pub objects: Vec<ObjectNodes>,
}

/// Pass groups for one buffer
#[derive(Debug)]
pub struct InstancedBufferNodes {
    pub buffer: vk::Buffer,
    pub passes: Vec<PassNodes>,
}

/// One occupied instanced pipeline slot
#[derive(Debug)]
pub struct InstancedPipelineSlot {
    pub pipeline: PipelineAndId,
    pub side: CullSide,
    pub buffers: Vec<InstancedBufferNodes>,
}

/// Instancing-aggregation table
#[derive(Debug)]
pub struct InstancedPipelinesNodes {
    /// Backing node storage; indices are stable until `clear`
    nodes: Vec<CountedNode>,

    /// Dedup by node id, table-wide
    lookup: FxHashMap<RenderNodeId, u32>,

    slots: Vec<Option<InstancedPipelineSlot>>,
    policy: CapacityPolicy,
}

impl InstancedPipelinesNodes {
    pub fn new(policy: CapacityPolicy) -> Self {
        let mut slots = Vec::new();
        slots.resize_with(MAX_INSTANCED_PIPELINES as usize, || None);
        Self {
            nodes: Vec::new(),
            lookup: FxHashMap::default(),
            slots,
            policy,
        }
    }

    /// Insert a node into its (pipeline, buffer, pass, object) group, or
    /// re-affirm visibility if the table already holds it.
    pub fn emplace(
        &mut self,
        pipeline: PipelineAndId,
        buffer: vk::Buffer,
        pass: PassId,
        object: SubmeshId,
        counted: CountedNode,
        side: CullSide,
    ) -> EngineResult<u32> {
        if let Some(&index) = self.lookup.get(&counted.node) {
            self.nodes[index as usize].visible = true;
            return Ok(index);
        }

        if self.nodes.len() as u32 >= MAX_TABLE_INSTANCES {
            return Err(self.policy.violation(
                "instances",
                MAX_TABLE_INSTANCES,
                self.nodes.len() as u32 + 1,
            ));
        }

        let slot_index = pipeline.slot(side, MAX_INSTANCED_PIPELINES);

        if slot_index >= self.slots.len() {
            return Err(self.policy.violation(
                "instanced pipelines",
                MAX_INSTANCED_PIPELINES / 2,
                pipeline.id as u32 + 1,
            ));
        }

        let policy = self.policy;
        let slot = self.slots[slot_index].get_or_insert_with(|| InstancedPipelineSlot {
            pipeline,
            side,
            buffers: Vec::new(),
        });
        slot.pipeline = pipeline;

        let buffer_index = match slot.buffers.iter().position(|b| b.buffer == buffer) {
            Some(index) => index,
            None => {
                if slot.buffers.len() as u32 >= MAX_BUFFERS_PER_PIPELINE {
                    return Err(policy.violation(
                        "buffers for given pipeline",
                        MAX_BUFFERS_PER_PIPELINE,
                        slot.buffers.len() as u32 + 1,
                    ));
                }
                slot.buffers.push(InstancedBufferNodes {
                    buffer,
                    passes: Vec::new(),
                });
                slot.buffers.len() - 1
            }
        };

        let passes = &mut slot.buffers[buffer_index].passes;
        let pass_index = match passes.iter().position(|p| p.pass == pass) {
            Some(index) => index,
            None => {
                if passes.len() as u32 >= MAX_PASSES_PER_BUFFER {
                    return Err(policy.violation(
                        "passes for given buffer and pipeline",
                        MAX_PASSES_PER_BUFFER,
                        passes.len() as u32 + 1,
                    ));
                }
                passes.push(PassNodes {
                    pass,
                    objects: Vec::new(),
                });
                passes.len() - 1
            }
        };

        let objects = &mut passes[pass_index].objects;
        let object_index = match objects.iter().position(|o| o.object == object) {
            Some(index) => index,
            None => {
                if objects.len() as u32 >= MAX_OBJECTS_PER_PASS {
                    return Err(policy.violation(
                        "objects for given pass",
                        MAX_OBJECTS_PER_PASS,
                        objects.len() as u32 + 1,
                    ));
                }
                objects.push(ObjectNodes {
                    object,
                    nodes: Vec::new(),
                });
                objects.len() - 1
            }
        };

        let group = &mut objects[object_index];

        if group.nodes.len() as u32 >= MAX_NODES_PER_BUFFER {
            return Err(policy.violation(
                "nodes for given buffer and pipeline",
                MAX_NODES_PER_BUFFER,
                group.nodes.len() as u32 + 1,
            ));
        }

        let index = self.nodes.len() as u32;
        let node = counted.node;
        self.nodes.push(CountedNode {
            visible: true,
            ..counted
        });
        group.nodes.push(index);
        self.lookup.insert(node, index);
        Ok(index)
    }

    /// Hide `node` without removing it from its group
    pub fn erase(&mut self, node: RenderNodeId) {
        if let Some(&index) = self.lookup.get(&node) {
            self.nodes[index as usize].visible = false;
        }
    }

    /// Reset to empty; the backing node storage keeps its capacity
    pub fn clear(&mut self) {
        for slot in self.slots.iter_mut().flatten() {
            slot.buffers.clear();
        }
        self.nodes.clear();
        self.lookup.clear();
    }

    pub fn size(&self) -> u32 {
        self.nodes.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, index: u32) -> &CountedNode {
        &self.nodes[index as usize]
    }

    pub fn find(&self, node: RenderNodeId) -> Option<&CountedNode> {
        let index = *self.lookup.get(&node)?;
        self.nodes.get(index as usize)
    }

    /// Occupied pipeline slots with at least one group, in slot order
    pub fn pipelines(&self) -> impl Iterator<Item = &InstancedPipelineSlot> {
        self.slots
            .iter()
            .flatten()
            .filter(|slot| !slot.buffers.is_empty())
    }

    /// Occupied slots of one orientation, in slot order
    pub fn pipelines_of(&self, side: CullSide) -> impl Iterator<Item = &InstancedPipelineSlot> {
        self.pipelines().filter(move |slot| slot.side == side)
    }

    /// Nodes in one orientation half
    pub fn side_node_count(&self, side: CullSide) -> u32 {
        self.pipelines_of(side)
            .flat_map(|slot| slot.buffers.iter())
            .flat_map(|buffer| buffer.passes.iter())
            .flat_map(|pass| pass.objects.iter())
            .map(|group| group.nodes.len() as u32)
            .sum()
    }

    /// Visible members of a group
    pub fn visible_in_group(&self, group: &ObjectNodes) -> u32 {
        group
            .nodes
            .iter()
            .filter(|&&index| self.nodes[index as usize].visible)
            .count() as u32
    }
}
