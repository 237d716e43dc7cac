//! Per-GPU-buffer node grouping
//!
//! One [`BuffersView`] per pipeline slot: up to `MAX_BUFFERS_PER_PIPELINE`
//! distinct vertex buffers, each owning one [`NodesView`]. Bounding the
//! buffer count keeps the per-pipeline scan O(16) worst case and lets the
//! backing storage persist across frames.

use ash::vk;

use crate::constants::nodes::MAX_BUFFERS_PER_PIPELINE;
use crate::error::{CapacityPolicy, EngineResult};
use crate::renderer::render_queue::counted_node::{CountedNode, NodesView};

/// One buffer slot and its node array
#[derive(Debug)]
pub struct BufferNodes {
    pub buffer: vk::Buffer,
    pub nodes: NodesView,
}

/// The buffers a pipeline draws from, each with its nodes
#[derive(Debug)]
pub struct BuffersView {
    buffers: Vec<BufferNodes>,

    /// Live slots; slots beyond this are cleared storage kept for reuse
    count: usize,

    policy: CapacityPolicy,
}

impl BuffersView {
    pub fn new(policy: CapacityPolicy) -> Self {
        Self {
            buffers: Vec::new(),
            count: 0,
            policy,
        }
    }

    /// Find or create the slot for `buffer`. Fatal when a new slot would
    /// exceed `MAX_BUFFERS_PER_PIPELINE`.
    pub fn emplace_buffer(&mut self, buffer: vk::Buffer) -> EngineResult<usize> {
        if let Some(index) = self.buffers[..self.count]
            .iter()
            .position(|b| b.buffer == buffer)
        {
            return Ok(index);
        }

        if self.count as u32 >= MAX_BUFFERS_PER_PIPELINE {
            return Err(self.policy.violation(
                "buffers for given pipeline",
                MAX_BUFFERS_PER_PIPELINE,
                self.count as u32 + 1,
            ));
        }

        let index = self.count;

        if index == self.buffers.len() {
            self.buffers.push(BufferNodes {
                buffer,
                nodes: NodesView::new(self.policy),
            });
        } else {
            // Reuse a cleared slot's storage
            self.buffers[index].buffer = buffer;
        }

        self.count += 1;
        Ok(index)
    }

    /// Find or create `buffer`'s slot, then append `node` into it.
    /// Returns (buffer slot, node index).
    pub fn emplace(&mut self, buffer: vk::Buffer, node: CountedNode) -> EngineResult<(usize, u32)> {
        let buffer_index = self.emplace_buffer(buffer)?;
        let node_index = self.buffers[buffer_index].nodes.emplace(node)?;
        Ok((buffer_index, node_index))
    }

    /// Reset every slot: identities emptied, node arrays cleared, logical
    /// buffer count back to zero. Storage is kept.
    pub fn clear(&mut self) {
        for slot in &mut self.buffers {
            slot.buffer = vk::Buffer::null();
            slot.nodes.clear();
        }
        self.count = 0;
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn get(&self, index: usize) -> Option<&BufferNodes> {
        self.buffers[..self.count].get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut BufferNodes> {
        if index < self.count {
            self.buffers.get_mut(index)
        } else {
            None
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &BufferNodes> {
        self.buffers[..self.count].iter()
    }

    /// Total nodes across all live slots
    pub fn node_count(&self) -> u32 {
        self.iter().map(|b| b.nodes.len() as u32).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::commands::{DrawIndirectCommand, NodeCommand};
    use crate::renderer::render_queue::scene_render_nodes::RenderNodeId;
    use crate::scene::CulledId;
    use ash::vk::Handle;

    fn buffer(raw: u64) -> vk::Buffer {
        vk::Buffer::from_raw(raw)
    }

    fn counted(id: u32) -> CountedNode {
        CountedNode {
            node: RenderNodeId(id),
            culled: CulledId(id),
            command: NodeCommand::Vertex(DrawIndirectCommand {
                vertex_count: 3,
                instance_count: 1,
                first_vertex: 0,
                first_instance: 0,
            }),
            instance_count: 1,
            visible: true,
        }
    }

    #[test]
    fn test_emplace_groups_by_buffer_identity() {
        let mut view = BuffersView::new(CapacityPolicy::Error);
        view.emplace(buffer(1), counted(0)).unwrap();
        view.emplace(buffer(2), counted(1)).unwrap();
        view.emplace(buffer(1), counted(2)).unwrap();

        assert_eq!(view.len(), 2);
        assert_eq!(view.get(0).unwrap().nodes.len(), 2);
        assert_eq!(view.get(1).unwrap().nodes.len(), 1);
    }

    #[test]
    fn test_buffer_capacity_enforced() {
        let mut view = BuffersView::new(CapacityPolicy::Error);
        for i in 0..MAX_BUFFERS_PER_PIPELINE {
            view.emplace_buffer(buffer(u64::from(i) + 1)).unwrap();
        }
        assert!(view
            .emplace_buffer(buffer(u64::from(MAX_BUFFERS_PER_PIPELINE) + 1))
            .is_err());
    }

    #[test]
    fn test_clear_resets_count_and_reuses_slots() {
        let mut view = BuffersView::new(CapacityPolicy::Error);
        view.emplace(buffer(1), counted(0)).unwrap();
        view.emplace(buffer(2), counted(1)).unwrap();

        view.clear();
        assert!(view.is_empty());
        assert_eq!(view.node_count(), 0);

        // Refill up to capacity works after clear.
        for i in 0..MAX_BUFFERS_PER_PIPELINE {
            view.emplace(buffer(u64::from(i) + 10), counted(i)).unwrap();
        }
        assert_eq!(view.len() as u32, MAX_BUFFERS_PER_PIPELINE);
    }
}
