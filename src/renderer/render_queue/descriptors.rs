//! Descriptor-set bookkeeping per node shape
//!
//! Nodes with the same "shape" (billboard vs submesh, animation state,
//! texture count) share descriptor layouts and draw their sets from the
//! same pool group. Pools are allocated in batches of
//! [`POOL_GRANULARITY`](crate::constants::descriptors::POOL_GRANULARITY)
//! sets; exhaustion is recovered by allocating another pool, never
//! surfaced as an error.

use ash::vk;
use rustc_hash::FxHashMap;

use crate::constants::descriptors::POOL_GRANULARITY;
use crate::error::{descriptor_error, EngineResult};
use crate::renderer::device::{DescriptorCounts, DescriptorPoolError, RenderDevice};
use crate::renderer::render_queue::scene_render_nodes::RenderNodeId;

/// The descriptor-relevant shape of a render node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeShape {
    pub billboard: bool,
    pub animated_mesh: bool,
    pub animated_skeleton: bool,
    pub instanced_skinning: bool,
    pub texture_count: u32,
}

impl NodeShape {
    /// Bindings a node of this shape needs, per binding type.
    /// Model data is one uniform buffer; billboards add their dimensions
    /// buffer; animation state binds through storage buffers.
    pub fn descriptor_counts(&self) -> DescriptorCounts {
        let mut uniform_buffers = 1;
        if self.billboard {
            uniform_buffers += 1;
        }

        let mut storage_buffers = 0;
        if self.animated_mesh {
            storage_buffers += 1;
        }
        if self.animated_skeleton {
            storage_buffers += 1;
        }
        if self.instanced_skinning {
            storage_buffers += 1;
        }

        DescriptorCounts {
            uniform_buffers,
            storage_buffers,
            samplers: self.texture_count,
        }
    }
}

impl std::fmt::Display for NodeShape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}{}{} textures={}",
            if self.billboard { "billboard" } else { "submesh" },
            if self.animated_mesh { "+morphing" } else { "" },
            if self.animated_skeleton { "+skinning" } else { "" },
            if self.instanced_skinning { "+instanced" } else { "" },
            self.texture_count
        )
    }
}

impl DescriptorCounts {
    /// The buffer bindings only (the uniform-set layout)
    pub fn buffer_counts(&self) -> DescriptorCounts {
        DescriptorCounts {
            uniform_buffers: self.uniform_buffers,
            storage_buffers: self.storage_buffers,
            samplers: 0,
        }
    }

    /// The sampler bindings only (the texture-set layout)
    pub fn texture_counts(&self) -> DescriptorCounts {
        DescriptorCounts {
            uniform_buffers: 0,
            storage_buffers: 0,
            samplers: self.samplers,
        }
    }
}

/// The (uniform-set, texture-set) layout pair for one shape
#[derive(Debug, Clone, Copy)]
pub struct DescriptorSetLayouts {
    pub uniforms: vk::DescriptorSetLayout,
    pub textures: vk::DescriptorSetLayout,
}

/// The sets allocated for one render node
#[derive(Debug, Clone, Copy)]
pub struct NodeDescriptorSets {
    pub uniforms: vk::DescriptorSet,
    pub textures: vk::DescriptorSet,
}

/// Pooled descriptor-set allocation for one shape group
#[derive(Debug)]
pub struct DescriptorSetPools {
    counts: DescriptorCounts,
    pools: Vec<vk::DescriptorPool>,
    allocations: FxHashMap<RenderNodeId, NodeDescriptorSets>,
}

impl DescriptorSetPools {
    pub fn new(counts: DescriptorCounts) -> Self {
        Self {
            counts,
            pools: Vec::new(),
            allocations: FxHashMap::default(),
        }
    }

    /// Allocate the set pair for `node`; a no-op returning the existing
    /// sets if the node already has them.
    pub fn allocate(
        &mut self,
        device: &dyn RenderDevice,
        layouts: &DescriptorSetLayouts,
        node: RenderNodeId,
    ) -> EngineResult<NodeDescriptorSets> {
        if let Some(sets) = self.allocations.get(&node) {
            return Ok(*sets);
        }

        let uniforms = self.allocate_set(device, layouts.uniforms)?;
        let textures = self.allocate_set(device, layouts.textures)?;
        let sets = NodeDescriptorSets { uniforms, textures };
        self.allocations.insert(node, sets);
        Ok(sets)
    }

    fn allocate_set(
        &mut self,
        device: &dyn RenderDevice,
        layout: vk::DescriptorSetLayout,
    ) -> EngineResult<vk::DescriptorSet> {
        if let Some(&pool) = self.pools.last() {
            match device.allocate_descriptor_set(pool, layout) {
                Ok(set) => return Ok(set),
                Err(DescriptorPoolError::Exhausted) => {}
                Err(DescriptorPoolError::Device(error)) => {
                    return Err(descriptor_error("descriptor set", error))
                }
            }
        }

        let pool = device.create_descriptor_pool(&self.counts, POOL_GRANULARITY)?;
        self.pools.push(pool);
        log::debug!(
            "[DescriptorSetPools::allocate_set] Allocated pool #{} ({} sets)",
            self.pools.len(),
            POOL_GRANULARITY
        );

        match device.allocate_descriptor_set(pool, layout) {
            Ok(set) => Ok(set),
            Err(DescriptorPoolError::Exhausted) => Err(descriptor_error(
                "descriptor set",
                "fresh pool exhausted immediately",
            )),
            Err(DescriptorPoolError::Device(error)) => {
                Err(descriptor_error("descriptor set", error))
            }
        }
    }

    pub fn is_allocated(&self, node: RenderNodeId) -> bool {
        self.allocations.contains_key(&node)
    }

    pub fn sets(&self, node: RenderNodeId) -> Option<NodeDescriptorSets> {
        self.allocations.get(&node).copied()
    }

    pub fn allocated_count(&self) -> usize {
        self.allocations.len()
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    /// Destroy every pool (and with them every set); scene teardown only
    pub fn clear(&mut self, device: &dyn RenderDevice) {
        for pool in self.pools.drain(..) {
            device.destroy_descriptor_pool(pool);
        }
        self.allocations.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::device::mock::MockDevice;

    fn shape(textures: u32) -> NodeShape {
        NodeShape {
            billboard: false,
            animated_mesh: false,
            animated_skeleton: false,
            instanced_skinning: false,
            texture_count: textures,
        }
    }

    fn layouts(device: &MockDevice, counts: &DescriptorCounts) -> DescriptorSetLayouts {
        DescriptorSetLayouts {
            uniforms: device
                .create_descriptor_layout(&counts.buffer_counts())
                .unwrap(),
            textures: device
                .create_descriptor_layout(&counts.texture_counts())
                .unwrap(),
        }
    }

    #[test]
    fn test_shape_counts() {
        let plain = shape(2).descriptor_counts();
        assert_eq!(plain.uniform_buffers, 1);
        assert_eq!(plain.storage_buffers, 0);
        assert_eq!(plain.samplers, 2);

        let animated = NodeShape {
            billboard: false,
            animated_mesh: true,
            animated_skeleton: true,
            instanced_skinning: true,
            texture_count: 1,
        }
        .descriptor_counts();
        assert_eq!(animated.storage_buffers, 3);

        let billboard = NodeShape {
            billboard: true,
            animated_mesh: false,
            animated_skeleton: false,
            instanced_skinning: false,
            texture_count: 0,
        }
        .descriptor_counts();
        assert_eq!(billboard.uniform_buffers, 2);
    }

    #[test]
    fn test_allocate_is_idempotent_per_node() {
        let device = MockDevice::new();
        let counts = shape(1).descriptor_counts();
        let layouts = layouts(&device, &counts);
        let mut pools = DescriptorSetPools::new(counts);

        let first = pools
            .allocate(&device, &layouts, RenderNodeId(0))
            .unwrap();
        let again = pools
            .allocate(&device, &layouts, RenderNodeId(0))
            .unwrap();

        assert_eq!(first.uniforms, again.uniforms);
        assert_eq!(first.textures, again.textures);
        assert_eq!(pools.allocated_count(), 1);
        assert_eq!(pools.pool_count(), 1);
    }

    #[test]
    fn test_exhaustion_allocates_additional_pool() {
        let device = MockDevice::new();
        let counts = shape(0).descriptor_counts();
        let layouts = layouts(&device, &counts);
        let mut pools = DescriptorSetPools::new(counts);

        // Two sets per node, 50 sets per pool: 26 nodes force a second pool.
        for i in 0..26 {
            pools.allocate(&device, &layouts, RenderNodeId(i)).unwrap();
        }

        assert_eq!(pools.pool_count(), 2);
        assert_eq!(pools.allocated_count(), 26);
    }

    #[test]
    fn test_clear_destroys_pools() {
        let device = MockDevice::new();
        let counts = shape(0).descriptor_counts();
        let layouts = layouts(&device, &counts);
        let mut pools = DescriptorSetPools::new(counts);

        pools.allocate(&device, &layouts, RenderNodeId(0)).unwrap();
        pools.clear(&device);

        assert_eq!(pools.pool_count(), 0);
        assert!(!pools.is_allocated(RenderNodeId(0)));
    }
}
