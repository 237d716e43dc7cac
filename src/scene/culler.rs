//! Scene culler interface
//!
//! The culler is an external collaborator: it owns the per-mode "all"
//! lists (every object that could draw in that mode) and the "culled"
//! lists (the subset surviving frustum/occlusion visibility this frame).
//! Classification consumes the "all" lists; the per-frame intersection
//! pass consumes the "culled" lists. Entries are identity-comparable via
//! the [`CulledId`] minted at registration.

use crate::scene::geometry::{BillboardId, GeometryId, SceneNodeId, SubmeshId};
use crate::scene::pass::PassId;

/// Which render queue an object is classified for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RenderMode {
    Opaque,
    Transparent,
    Shadow,
}

impl RenderMode {
    pub const COUNT: usize = 3;

    fn index(self) -> usize {
        match self {
            RenderMode::Opaque => 0,
            RenderMode::Transparent => 1,
            RenderMode::Shadow => 2,
        }
    }
}

/// Identity of one culler entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CulledId(pub u32);

/// One submesh the culler tracks for a mode
#[derive(Debug, Clone)]
pub struct CulledSubmesh {
    pub id: CulledId,
    pub pass: PassId,
    pub submesh: SubmeshId,
    pub geometry: GeometryId,
    pub scene_node: SceneNodeId,

    /// Culler-reported instance count for the entry's draw
    pub instance_count: u32,
}

/// One billboard the culler tracks for a mode
#[derive(Debug, Clone)]
pub struct CulledBillboard {
    pub id: CulledId,
    pub pass: PassId,
    pub billboard: BillboardId,
    pub scene_node: SceneNodeId,
    pub instance_count: u32,
}

#[derive(Debug, Default)]
struct ModeLists {
    all_submeshes: Vec<CulledSubmesh>,
    all_billboards: Vec<CulledBillboard>,
    culled_submeshes: Vec<CulledId>,
    culled_billboards: Vec<CulledId>,
}

/// Per-mode object lists as the node pipeline consumes them
#[derive(Debug, Default)]
pub struct SceneCuller {
    modes: [ModeLists; RenderMode::COUNT],
    next_id: u32,
}

impl SceneCuller {
    pub fn new() -> Self {
        Self::default()
    }

    fn mint(&mut self) -> CulledId {
        let id = CulledId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Register a submesh entry in a mode's "all" list
    pub fn register_submesh(
        &mut self,
        mode: RenderMode,
        pass: PassId,
        submesh: SubmeshId,
        geometry: GeometryId,
        scene_node: SceneNodeId,
        instance_count: u32,
    ) -> CulledId {
        let id = self.mint();
        self.modes[mode.index()].all_submeshes.push(CulledSubmesh {
            id,
            pass,
            submesh,
            geometry,
            scene_node,
            instance_count,
        });
        id
    }

    /// Register a billboard entry in a mode's "all" list
    pub fn register_billboard(
        &mut self,
        mode: RenderMode,
        pass: PassId,
        billboard: BillboardId,
        scene_node: SceneNodeId,
        instance_count: u32,
    ) -> CulledId {
        let id = self.mint();
        self.modes[mode.index()]
            .all_billboards
            .push(CulledBillboard {
                id,
                pass,
                billboard,
                scene_node,
                instance_count,
            });
        id
    }

    /// Replace a mode's visible-submesh set for this frame
    pub fn set_culled_submeshes(&mut self, mode: RenderMode, visible: Vec<CulledId>) {
        self.modes[mode.index()].culled_submeshes = visible;
    }

    /// Replace a mode's visible-billboard set for this frame
    pub fn set_culled_billboards(&mut self, mode: RenderMode, visible: Vec<CulledId>) {
        self.modes[mode.index()].culled_billboards = visible;
    }

    /// Every submesh entry for a mode, regardless of visibility
    pub fn all_submeshes(&self, mode: RenderMode) -> &[CulledSubmesh] {
        &self.modes[mode.index()].all_submeshes
    }

    /// Every billboard entry for a mode, regardless of visibility
    pub fn all_billboards(&self, mode: RenderMode) -> &[CulledBillboard] {
        &self.modes[mode.index()].all_billboards
    }

    /// The submesh entries visible this frame
    pub fn culled_submeshes(&self, mode: RenderMode) -> &[CulledId] {
        &self.modes[mode.index()].culled_submeshes
    }

    /// The billboard entries visible this frame
    pub fn culled_billboards(&self, mode: RenderMode) -> &[CulledId] {
        &self.modes[mode.index()].culled_billboards
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_keeps_modes_separate() {
        let mut culler = SceneCuller::new();
        let a = culler.register_submesh(
            RenderMode::Opaque,
            PassId(0),
            SubmeshId(0),
            GeometryId(0),
            SceneNodeId(0),
            1,
        );
        culler.register_submesh(
            RenderMode::Transparent,
            PassId(1),
            SubmeshId(1),
            GeometryId(1),
            SceneNodeId(0),
            1,
        );

        assert_eq!(culler.all_submeshes(RenderMode::Opaque).len(), 1);
        assert_eq!(culler.all_submeshes(RenderMode::Transparent).len(), 1);
        assert_eq!(culler.all_submeshes(RenderMode::Opaque)[0].id, a);
        assert!(culler.all_billboards(RenderMode::Opaque).is_empty());
    }

    #[test]
    fn test_culled_lists_start_empty() {
        let mut culler = SceneCuller::new();
        let id = culler.register_billboard(
            RenderMode::Opaque,
            PassId(0),
            BillboardId(0),
            SceneNodeId(0),
            1,
        );
        assert!(culler.culled_billboards(RenderMode::Opaque).is_empty());

        culler.set_culled_billboards(RenderMode::Opaque, vec![id]);
        assert_eq!(culler.culled_billboards(RenderMode::Opaque), &[id]);
    }
}
