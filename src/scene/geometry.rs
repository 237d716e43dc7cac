//! Scene-side geometry types
//!
//! Everything the node pipeline needs to know about scene content: node
//! transforms, submesh buffer locations, billboard buffers and the geometry
//! instances tying them to scene nodes. All cross-references are opaque ids
//! minted by the [`Scene`](super::Scene) arenas, never addresses.

use ash::vk;
use cgmath::Matrix4;
use cgmath::SquareMatrix;

/// Identifies a scene node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SceneNodeId(pub u32);

/// Identifies a submesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubmeshId(pub u32);

/// Identifies a billboard list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BillboardId(pub u32);

/// Identifies a geometry instance (one submesh placement on one scene node)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GeometryId(pub u32);

/// A transform node in the scene graph
#[derive(Debug, Clone)]
pub struct SceneNode {
    pub name: String,
    pub transform: Matrix4<f32>,
    pub visible: bool,
}

impl SceneNode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Matrix4::identity(),
            visible: true,
        }
    }
}

/// One piece of indexed or non-indexed geometry living in GPU buffers
#[derive(Debug, Clone)]
pub struct Submesh {
    /// Vertex positions buffer; buffer identity groups nodes in the tables
    pub positions_buffer: vk::Buffer,

    /// Index data, if the submesh is indexed
    pub index_count: u32,
    pub first_index: u32,
    pub has_indices: bool,

    /// Vertex data
    pub vertex_count: u32,
    pub vertex_offset: i32,

    /// Whether the submesh carries morph targets
    pub has_morph_targets: bool,
}

impl Submesh {
    pub fn indexed(positions_buffer: vk::Buffer, index_count: u32, vertex_count: u32) -> Self {
        Self {
            positions_buffer,
            index_count,
            first_index: 0,
            has_indices: true,
            vertex_count,
            vertex_offset: 0,
            has_morph_targets: false,
        }
    }

    pub fn unindexed(positions_buffer: vk::Buffer, vertex_count: u32) -> Self {
        Self {
            positions_buffer,
            index_count: 0,
            first_index: 0,
            has_indices: false,
            vertex_count,
            vertex_offset: 0,
            has_morph_targets: false,
        }
    }
}

/// A camera-facing quad strip
#[derive(Debug, Clone)]
pub struct Billboard {
    pub name: String,
    pub node: SceneNodeId,
    pub buffer: vk::Buffer,
    pub vertex_count: u32,
    pub first_vertex: u32,
}

/// One placement of a submesh on a scene node. Several geometries may share
/// one submesh; that sharing is what makes a submesh instancing-eligible.
#[derive(Debug, Clone)]
pub struct Geometry {
    pub name: String,
    pub node: SceneNodeId,
    pub submesh: SubmeshId,
    pub shadow_caster: bool,
}
