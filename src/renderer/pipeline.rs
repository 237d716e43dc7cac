//! Pipeline identity
//!
//! A pipeline is a compiled shader/state permutation selected by program,
//! texture and mode flags. The node tables never hold the GPU pipeline
//! handle; they hold a [`PipelineAndId`] whose small id doubles as the
//! table slot index, with the front-face-culled variant offset by half the
//! slot space.

use std::hash::{Hash, Hasher};

use rustc_hash::{FxHashMap, FxHasher};

use crate::error::{CapacityPolicy, EngineResult};
use crate::scene::RenderMode;

/// Program feature flags, one bit per shader permutation input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ProgramFlags(u32);

impl ProgramFlags {
    pub const INSTANTIATION: ProgramFlags = ProgramFlags(1 << 0);
    pub const SKINNING: ProgramFlags = ProgramFlags(1 << 1);
    pub const MORPHING: ProgramFlags = ProgramFlags(1 << 2);
    pub const BILLBOARDS: ProgramFlags = ProgramFlags(1 << 3);
    pub const ALPHA_BLENDING: ProgramFlags = ProgramFlags(1 << 4);
    pub const INSTANCED_SKINNING: ProgramFlags = ProgramFlags(1 << 5);

    pub fn empty() -> Self {
        ProgramFlags(0)
    }

    pub fn contains(self, other: ProgramFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: ProgramFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: ProgramFlags) {
        self.0 &= !other.0;
    }

    pub fn bits(self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for ProgramFlags {
    type Output = ProgramFlags;

    fn bitor(self, rhs: ProgramFlags) -> ProgramFlags {
        ProgramFlags(self.0 | rhs.0)
    }
}

impl std::ops::BitOrAssign for ProgramFlags {
    fn bitor_assign(&mut self, rhs: ProgramFlags) {
        self.0 |= rhs.0;
    }
}

/// Front-face vs back-face-culled pipeline variant. Distinct from
/// frustum/occlusion visibility culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CullSide {
    Back,
    Front,
}

impl CullSide {
    pub const BOTH: [CullSide; 2] = [CullSide::Back, CullSide::Front];
}

/// The identity key of one pipeline permutation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineFlags {
    pub program: ProgramFlags,
    pub textures_mask: u32,
    pub mode: RenderMode,
}

impl PipelineFlags {
    pub fn flags_hash(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.hash(&mut hasher);
        hasher.finish()
    }
}

/// A pipeline permutation plus its table-slot id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PipelineAndId {
    pub id: u16,
    pub flags_hash: u64,
}

impl PipelineAndId {
    /// Table slot for this pipeline in a table with `max_slots` slots.
    /// Back-culled ids map onto [0, max/2), front-culled onto [max/2, max).
    pub fn slot(&self, side: CullSide, max_slots: u32) -> usize {
        let offset = match side {
            CullSide::Back => 0,
            CullSide::Front => max_slots / 2,
        };
        self.id as usize + offset as usize
    }
}

/// Mints stable small ids for pipeline permutations within one queue
#[derive(Debug)]
pub struct PipelineCache {
    max_slots: u32,
    ids: FxHashMap<u64, u16>,
    policy: CapacityPolicy,
}

impl PipelineCache {
    pub fn new(max_slots: u32, policy: CapacityPolicy) -> Self {
        Self {
            max_slots,
            ids: FxHashMap::default(),
            policy,
        }
    }

    /// Return the id for `flags`, minting the next free one on first sight.
    /// Front and back variants share one id; orientation picks the slot.
    pub fn get_or_create(&mut self, flags: &PipelineFlags) -> EngineResult<PipelineAndId> {
        let flags_hash = flags.flags_hash();

        if let Some(&id) = self.ids.get(&flags_hash) {
            return Ok(PipelineAndId { id, flags_hash });
        }

        let limit = self.max_slots / 2;
        let next = self.ids.len() as u32;

        if next >= limit {
            return Err(self.policy.violation("pipelines", limit, next + 1));
        }

        let id = next as u16;
        self.ids.insert(flags_hash, id);
        Ok(PipelineAndId { id, flags_hash })
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn clear(&mut self) {
        self.ids.clear();
    }
}
