//! Render-node ownership
//!
//! `SceneRenderNodes` is the single authority for render-node identity and
//! lifetime: nodes are created lazily on first encounter, keyed by
//! (scene node, geometry data, instance), and only destroyed when the
//! scene's render-node cache is cleared. It also owns the per-shape
//! descriptor layouts and pools. One instance is shared by every render
//! queue of a scene, so all lookup/creation goes through one mutex.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::error::EngineResult;
use crate::renderer::device::RenderDevice;
use crate::renderer::render_queue::descriptors::{
    DescriptorSetLayouts, DescriptorSetPools, NodeDescriptorSets, NodeShape,
};
use crate::scene::{
    AnimatedMeshId, AnimatedSkeletonId, BillboardId, GeometryId, PassId, SceneNodeId, SubmeshId,
};

/// Handle to one render node, minted by [`SceneRenderNodes`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderNodeId(pub u32);

/// One drawable submesh instance under one pass
#[derive(Debug, Clone, Copy)]
pub struct SubmeshRenderNode {
    pub pass: PassId,
    pub submesh: SubmeshId,
    pub instance: GeometryId,
    pub scene_node: SceneNodeId,

    /// Slot in the per-instance model-data buffer
    pub model_slot: u32,

    pub mesh: Option<AnimatedMeshId>,
    pub skeleton: Option<AnimatedSkeletonId>,
}

/// One drawable billboard list under one pass
#[derive(Debug, Clone, Copy)]
pub struct BillboardRenderNode {
    pub pass: PassId,
    pub billboard: BillboardId,
    pub scene_node: SceneNodeId,
    pub model_slot: u32,
}

/// A render node: one pass paired with one piece of geometry and one
/// scene transform
#[derive(Debug, Clone, Copy)]
pub enum RenderNode {
    Submesh(SubmeshRenderNode),
    Billboard(BillboardRenderNode),
}

impl RenderNode {
    pub fn pass(&self) -> PassId {
        match self {
            RenderNode::Submesh(node) => node.pass,
            RenderNode::Billboard(node) => node.pass,
        }
    }

    pub fn scene_node(&self) -> SceneNodeId {
        match self {
            RenderNode::Submesh(node) => node.scene_node,
            RenderNode::Billboard(node) => node.scene_node,
        }
    }

    pub fn model_slot(&self) -> u32 {
        match self {
            RenderNode::Submesh(node) => node.model_slot,
            RenderNode::Billboard(node) => node.model_slot,
        }
    }
}

/// Identity key: at most one render node exists per key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NodeKey {
    Submesh {
        scene_node: SceneNodeId,
        submesh: SubmeshId,
        instance: GeometryId,
    },
    Billboard {
        scene_node: SceneNodeId,
        billboard: BillboardId,
    },
}

/// One shape group: its layouts, pools and member nodes
struct DescriptorNodes {
    layouts: Option<DescriptorSetLayouts>,
    pools: DescriptorSetPools,
    nodes: Vec<RenderNodeId>,
}

#[derive(Default)]
struct Inner {
    nodes: Vec<RenderNode>,
    shapes: Vec<NodeShape>,
    index: FxHashMap<NodeKey, RenderNodeId>,
    groups: FxHashMap<NodeShape, DescriptorNodes>,
}

impl Inner {
    fn create(&mut self, key: NodeKey, shape: NodeShape, build: impl FnOnce(u32) -> RenderNode) -> RenderNodeId {
        if let Some(&id) = self.index.get(&key) {
            return id;
        }

        let id = RenderNodeId(self.nodes.len() as u32);
        let node = build(id.0);
        self.nodes.push(node);
        self.shapes.push(shape);
        self.index.insert(key, id);

        self.groups
            .entry(shape)
            .or_insert_with(|| DescriptorNodes {
                layouts: None,
                pools: DescriptorSetPools::new(shape.descriptor_counts()),
                nodes: Vec::new(),
            })
            .nodes
            .push(id);

        id
    }

    fn ensure_layouts(
        group: &mut DescriptorNodes,
        shape: NodeShape,
        device: &dyn RenderDevice,
    ) -> EngineResult<DescriptorSetLayouts> {
        if let Some(layouts) = group.layouts {
            return Ok(layouts);
        }

        let counts = shape.descriptor_counts();
        let layouts = DescriptorSetLayouts {
            uniforms: device.create_descriptor_layout(&counts.buffer_counts())?,
            textures: device.create_descriptor_layout(&counts.texture_counts())?,
        };
        group.layouts = Some(layouts);
        Ok(layouts)
    }
}

/// Scene-wide render-node arena and descriptor provisioning
#[derive(Default)]
pub struct SceneRenderNodes {
    inner: Mutex<Inner>,
}

impl SceneRenderNodes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or return the existing) node for a submesh instance.
    /// Idempotent per (scene node, submesh, instance).
    #[allow(clippy::too_many_arguments)]
    pub fn create_submesh_node(
        &self,
        pass: PassId,
        texture_count: u32,
        scene_node: SceneNodeId,
        submesh: SubmeshId,
        instance: GeometryId,
        mesh: Option<AnimatedMeshId>,
        skeleton: Option<AnimatedSkeletonId>,
        instanced_skinning: bool,
    ) -> RenderNodeId {
        let key = NodeKey::Submesh {
            scene_node,
            submesh,
            instance,
        };
        let shape = NodeShape {
            billboard: false,
            animated_mesh: mesh.is_some(),
            animated_skeleton: skeleton.is_some(),
            instanced_skinning,
            texture_count,
        };

        self.inner.lock().create(key, shape, |model_slot| {
            RenderNode::Submesh(SubmeshRenderNode {
                pass,
                submesh,
                instance,
                scene_node,
                model_slot,
                mesh,
                skeleton,
            })
        })
    }

    /// Create (or return the existing) node for a billboard list.
    /// Idempotent per (scene node, billboard).
    pub fn create_billboard_node(
        &self,
        pass: PassId,
        texture_count: u32,
        scene_node: SceneNodeId,
        billboard: BillboardId,
    ) -> RenderNodeId {
        let key = NodeKey::Billboard {
            scene_node,
            billboard,
        };
        let shape = NodeShape {
            billboard: true,
            animated_mesh: false,
            animated_skeleton: false,
            instanced_skinning: false,
            texture_count,
        };

        self.inner.lock().create(key, shape, |model_slot| {
            RenderNode::Billboard(BillboardRenderNode {
                pass,
                billboard,
                scene_node,
                model_slot,
            })
        })
    }

    pub fn node(&self, id: RenderNodeId) -> RenderNode {
        self.inner.lock().nodes[id.0 as usize]
    }

    /// The node for a submesh identity, if one was ever created
    pub fn find_submesh_node(
        &self,
        scene_node: SceneNodeId,
        submesh: SubmeshId,
        instance: GeometryId,
    ) -> Option<RenderNodeId> {
        self.inner
            .lock()
            .index
            .get(&NodeKey::Submesh {
                scene_node,
                submesh,
                instance,
            })
            .copied()
    }

    /// The node for a billboard identity, if one was ever created
    pub fn find_billboard_node(
        &self,
        scene_node: SceneNodeId,
        billboard: BillboardId,
    ) -> Option<RenderNodeId> {
        self.inner
            .lock()
            .index
            .get(&NodeKey::Billboard {
                scene_node,
                billboard,
            })
            .copied()
    }

    pub fn shape(&self, id: RenderNodeId) -> NodeShape {
        self.inner.lock().shapes[id.0 as usize]
    }

    /// The layout pair for `shape`, created on first use. Callable before
    /// any node of the shape exists; classification uses it to build the
    /// pipeline layout.
    pub fn descriptor_set_layouts(
        &self,
        shape: NodeShape,
        device: &dyn RenderDevice,
    ) -> EngineResult<DescriptorSetLayouts> {
        let mut inner = self.inner.lock();
        let group = inner.groups.entry(shape).or_insert_with(|| DescriptorNodes {
            layouts: None,
            pools: DescriptorSetPools::new(shape.descriptor_counts()),
            nodes: Vec::new(),
        });
        Inner::ensure_layouts(group, shape, device)
    }

    /// Allocate descriptor sets for every node that does not have them
    /// yet. Runs as a deferred pre-render event, not inline with
    /// classification. Returns the number of nodes now allocated.
    pub fn initialise_nodes(&self, device: &dyn RenderDevice) -> EngineResult<usize> {
        let mut inner = self.inner.lock();
        let mut initialised = 0usize;

        let shapes: Vec<NodeShape> = inner.groups.keys().copied().collect();

        for shape in shapes {
            let group = inner
                .groups
                .get_mut(&shape)
                .expect("shape group disappeared");
            let layouts = Inner::ensure_layouts(group, shape, device)?;
            let nodes = group.nodes.clone();

            for node in nodes {
                group.pools.allocate(device, &layouts, node)?;
            }
            initialised += group.pools.allocated_count();
        }

        log::debug!(
            "[SceneRenderNodes::initialise_nodes] {} nodes across {} shapes",
            initialised,
            inner.groups.len()
        );
        Ok(initialised)
    }

    /// The sets allocated for `id`, if `initialise_nodes` has run for it
    pub fn node_sets(&self, id: RenderNodeId) -> Option<NodeDescriptorSets> {
        let inner = self.inner.lock();
        let shape = *inner.shapes.get(id.0 as usize)?;
        inner.groups.get(&shape)?.pools.sets(id)
    }

    pub fn is_allocated(&self, id: RenderNodeId) -> bool {
        self.node_sets(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().nodes.is_empty()
    }

    pub fn shape_count(&self) -> usize {
        self.inner.lock().groups.len()
    }

    /// Drop all nodes, their descriptor pools and layouts. Scene teardown
    /// only.
    pub fn clear(&self, device: &dyn RenderDevice) {
        let mut inner = self.inner.lock();

        for (_, mut group) in inner.groups.drain() {
            group.pools.clear(device);
            if let Some(layouts) = group.layouts.take() {
                device.destroy_descriptor_layout(layouts.uniforms);
                device.destroy_descriptor_layout(layouts.textures);
            }
        }

        inner.nodes.clear();
        inner.shapes.clear();
        inner.index.clear();
    }
}
