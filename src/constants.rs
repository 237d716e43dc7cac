// Ember Engine Constants - SINGLE SOURCE OF TRUTH
//
// This file contains ALL fixed capacity limits used by the render-node
// pipeline. These values are part of the binary contract with the GPU buffer
// layouts: changing any of them changes the size of preallocated node and
// command storage.
//
// CRITICAL: Do NOT define capacity constants anywhere else in the codebase!

/// Render-node table limits
pub mod nodes {
    /// Maximum render nodes per (buffer, pipeline) leaf array
    pub const MAX_NODES_PER_BUFFER: u32 = 1024;

    /// Maximum distinct GPU buffers per pipeline
    pub const MAX_BUFFERS_PER_PIPELINE: u32 = 16;

    /// Maximum pipeline slots in the plain node tables.
    /// Slots are split evenly: ids live in [0, MAX/2), the front-culled
    /// slot for an id is `id + MAX/2`.
    pub const MAX_PIPELINES: u32 = 128;

    /// Maximum pipeline slots in the instanced node tables, split the
    /// same way as [`MAX_PIPELINES`]
    pub const MAX_INSTANCED_PIPELINES: u32 = 256;

    /// Maximum distinct object (submesh) groups per (pass, buffer, pipeline)
    /// in the instanced tables
    pub const MAX_OBJECTS_PER_PASS: u32 = 512;

    /// Maximum passes per (buffer, pipeline) in the instanced tables
    pub const MAX_PASSES_PER_BUFFER: u32 = 64;

    /// Total node capacity of one plain table
    pub const MAX_TABLE_NODES: u32 =
        MAX_PIPELINES * MAX_BUFFERS_PER_PIPELINE * MAX_NODES_PER_BUFFER;

    /// Total instance capacity of one instanced table
    pub const MAX_TABLE_INSTANCES: u32 =
        MAX_INSTANCED_PIPELINES * MAX_BUFFERS_PER_PIPELINE * MAX_NODES_PER_BUFFER;

    /// Maximum registered (pipeline hash, buffer) slots for GPU-side
    /// per-draw node indexing
    pub const MAX_PIPELINE_NODE_BUFFERS: u32 = 4096;
}

/// Descriptor-set provisioning
pub mod descriptors {
    /// Number of descriptor sets allocated per pool batch
    pub const POOL_GRANULARITY: u32 = 50;
}
