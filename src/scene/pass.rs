//! Material pass classification inputs
//!
//! The node pipeline only ever reads a pass: two-sidedness, blending and
//! texture usage decide pipeline orientation and descriptor shape. The one
//! mutation, [`Pass::prepare_textures`], is an idempotent cache warm.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::renderer::pipeline::ProgramFlags;

/// Identifies a material pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(pub u32);

/// One material pass as seen by the classification pass
#[derive(Debug)]
pub struct Pass {
    pub name: String,

    two_sided: bool,
    alpha_blending: bool,
    only_alpha_blending: bool,
    environment_mapping: bool,

    /// One bit per texture channel the pass samples
    textures_mask: u32,

    /// Flags the pass contributes to every node classified under it
    pass_flags: ProgramFlags,

    textures_prepared: AtomicBool,
}

impl Pass {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            two_sided: false,
            alpha_blending: false,
            only_alpha_blending: false,
            environment_mapping: false,
            textures_mask: 0,
            pass_flags: ProgramFlags::empty(),
            textures_prepared: AtomicBool::new(false),
        }
    }

    pub fn with_two_sided(mut self, two_sided: bool) -> Self {
        self.two_sided = two_sided;
        self
    }

    pub fn with_alpha_blending(mut self, alpha_blending: bool) -> Self {
        self.alpha_blending = alpha_blending;
        self
    }

    pub fn with_only_alpha_blending(mut self, only: bool) -> Self {
        self.only_alpha_blending = only;
        if only {
            self.alpha_blending = true;
        }
        self
    }

    pub fn with_environment_mapping(mut self, env: bool) -> Self {
        self.environment_mapping = env;
        self
    }

    pub fn with_textures_mask(mut self, mask: u32) -> Self {
        self.textures_mask = mask;
        self
    }

    pub fn with_pass_flags(mut self, flags: ProgramFlags) -> Self {
        self.pass_flags = flags;
        self
    }

    pub fn is_two_sided(&self) -> bool {
        self.two_sided
    }

    pub fn has_alpha_blending(&self) -> bool {
        self.alpha_blending
    }

    pub fn has_only_alpha_blending(&self) -> bool {
        self.only_alpha_blending
    }

    pub fn has_environment_mapping(&self) -> bool {
        self.environment_mapping
    }

    pub fn textures_mask(&self) -> u32 {
        self.textures_mask
    }

    pub fn texture_count(&self) -> u32 {
        self.textures_mask.count_ones()
    }

    pub fn pass_flags(&self) -> ProgramFlags {
        self.pass_flags
    }

    /// Warm the pass's texture cache. Called once per pass per
    /// classification pass; repeat calls are no-ops.
    pub fn prepare_textures(&self) {
        if !self.textures_prepared.swap(true, Ordering::Relaxed) {
            log::debug!("[Pass::prepare_textures] Prepared textures for '{}'", self.name);
        }
    }

    pub fn textures_prepared(&self) -> bool {
        self.textures_prepared.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_texture_count_counts_mask_bits() {
        let pass = Pass::new("metal").with_textures_mask(0b1011);
        assert_eq!(pass.texture_count(), 3);
    }

    #[test]
    fn test_prepare_textures_is_idempotent() {
        let pass = Pass::new("glass");
        assert!(!pass.textures_prepared());
        pass.prepare_textures();
        pass.prepare_textures();
        assert!(pass.textures_prepared());
    }

    #[test]
    fn test_only_alpha_blending_implies_alpha_blending() {
        let pass = Pass::new("smoke").with_only_alpha_blending(true);
        assert!(pass.has_alpha_blending());
        assert!(pass.has_only_alpha_blending());
    }
}
