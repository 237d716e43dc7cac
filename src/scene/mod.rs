//! Scene Module - collaborator model for the node pipeline
//!
//! Arenas for nodes, passes, geometry and animated objects. Every
//! cross-reference is an opaque id minted here; the node pipeline never
//! compares addresses.

pub mod animation;
pub mod culler;
pub mod geometry;
pub mod pass;

pub use animation::{
    AnimatedMesh, AnimatedMeshId, AnimatedObjectRegistry, AnimatedSkeleton, AnimatedSkeletonId,
};
pub use culler::{CulledBillboard, CulledId, CulledSubmesh, RenderMode, SceneCuller};
pub use geometry::{
    Billboard, BillboardId, Geometry, GeometryId, SceneNode, SceneNodeId, Submesh, SubmeshId,
};
pub use pass::{Pass, PassId};

use rustc_hash::FxHashMap;

/// Scene content as consumed by classification
#[derive(Debug, Default)]
pub struct Scene {
    nodes: Vec<SceneNode>,
    passes: Vec<Pass>,
    submeshes: Vec<Submesh>,
    billboards: Vec<Billboard>,
    geometries: Vec<Geometry>,
    animated: AnimatedObjectRegistry,

    /// Geometry instances per (submesh, pass); more than one makes the
    /// submesh instancing-eligible for that pass
    instance_refs: FxHashMap<(SubmeshId, PassId), u32>,

    /// Node excluded from classification (gizmo/preview exclusion)
    ignored_node: Option<SceneNodeId>,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_node(&mut self, node: SceneNode) -> SceneNodeId {
        let id = SceneNodeId(self.nodes.len() as u32);
        self.nodes.push(node);
        id
    }

    pub fn add_pass(&mut self, pass: Pass) -> PassId {
        let id = PassId(self.passes.len() as u32);
        self.passes.push(pass);
        id
    }

    pub fn add_submesh(&mut self, submesh: Submesh) -> SubmeshId {
        let id = SubmeshId(self.submeshes.len() as u32);
        self.submeshes.push(submesh);
        id
    }

    pub fn add_billboard(&mut self, billboard: Billboard) -> BillboardId {
        let id = BillboardId(self.billboards.len() as u32);
        self.billboards.push(billboard);
        id
    }

    /// Add a geometry instance; bumps the (submesh, pass) reference count
    /// that drives instancing eligibility.
    pub fn add_geometry(&mut self, geometry: Geometry, pass: PassId) -> GeometryId {
        let id = GeometryId(self.geometries.len() as u32);
        *self
            .instance_refs
            .entry((geometry.submesh, pass))
            .or_insert(0) += 1;
        self.geometries.push(geometry);
        id
    }

    pub fn node(&self, id: SceneNodeId) -> &SceneNode {
        &self.nodes[id.0 as usize]
    }

    pub fn pass(&self, id: PassId) -> &Pass {
        &self.passes[id.0 as usize]
    }

    pub fn submesh(&self, id: SubmeshId) -> &Submesh {
        &self.submeshes[id.0 as usize]
    }

    pub fn billboard(&self, id: BillboardId) -> &Billboard {
        &self.billboards[id.0 as usize]
    }

    pub fn geometry(&self, id: GeometryId) -> &Geometry {
        &self.geometries[id.0 as usize]
    }

    pub fn animated(&self) -> &AnimatedObjectRegistry {
        &self.animated
    }

    pub fn animated_mut(&mut self) -> &mut AnimatedObjectRegistry {
        &mut self.animated
    }

    /// Geometry instances sharing `submesh` under `pass`
    pub fn instance_count(&self, submesh: SubmeshId, pass: PassId) -> u32 {
        self.instance_refs
            .get(&(submesh, pass))
            .copied()
            .unwrap_or(0)
    }

    pub fn set_ignored_node(&mut self, node: Option<SceneNodeId>) {
        self.ignored_node = node;
    }

    pub fn ignored_node(&self) -> Option<SceneNodeId> {
        self.ignored_node
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ash::vk;

    #[test]
    fn test_instance_count_tracks_shared_submeshes() {
        let mut scene = Scene::new();
        let node = scene.add_node(SceneNode::new("root"));
        let pass = scene.add_pass(Pass::new("stone"));
        let submesh = scene.add_submesh(Submesh::indexed(vk::Buffer::null(), 36, 24));

        for i in 0..3 {
            scene.add_geometry(
                Geometry {
                    name: format!("rock{}", i),
                    node,
                    submesh,
                    shadow_caster: true,
                },
                pass,
            );
        }

        assert_eq!(scene.instance_count(submesh, pass), 3);
        assert_eq!(scene.instance_count(submesh, PassId(99)), 0);
    }
}
