//! Animated companion objects
//!
//! A geometry named `Door` animates through companions registered as
//! `Door_Mesh` (morph targets) and `Door_Skeleton` (skinning). A missing
//! companion is not an error; the geometry is classified as static.

use rustc_hash::FxHashMap;

/// Identifies an animated mesh (morphing animation state)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnimatedMeshId(pub u32);

/// Identifies an animated skeleton (skinning animation state)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnimatedSkeletonId(pub u32);

/// Morph-target animation state for one mesh
#[derive(Debug, Clone)]
pub struct AnimatedMesh {
    pub name: String,
}

/// Skinning animation state for one skeleton
#[derive(Debug, Clone)]
pub struct AnimatedSkeleton {
    pub name: String,

    /// Whether the skeleton's bone matrices live in a storage buffer shared
    /// by all instances, allowing skinned instancing
    pub instanced_bones: bool,
}

/// One registered animated object
#[derive(Debug, Clone, Copy)]
pub enum AnimatedObject {
    Mesh(AnimatedMeshId),
    Skeleton(AnimatedSkeletonId),
}

/// Name-keyed registry of every animated object in a scene
#[derive(Debug, Default)]
pub struct AnimatedObjectRegistry {
    meshes: Vec<AnimatedMesh>,
    skeletons: Vec<AnimatedSkeleton>,
    by_name: FxHashMap<String, AnimatedObject>,
}

impl AnimatedObjectRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_mesh(&mut self, mesh: AnimatedMesh) -> AnimatedMeshId {
        let id = AnimatedMeshId(self.meshes.len() as u32);
        self.by_name
            .insert(mesh.name.clone(), AnimatedObject::Mesh(id));
        self.meshes.push(mesh);
        id
    }

    pub fn add_skeleton(&mut self, skeleton: AnimatedSkeleton) -> AnimatedSkeletonId {
        let id = AnimatedSkeletonId(self.skeletons.len() as u32);
        self.by_name
            .insert(skeleton.name.clone(), AnimatedObject::Skeleton(id));
        self.skeletons.push(skeleton);
        id
    }

    pub fn mesh(&self, id: AnimatedMeshId) -> &AnimatedMesh {
        &self.meshes[id.0 as usize]
    }

    pub fn skeleton(&self, id: AnimatedSkeletonId) -> &AnimatedSkeleton {
        &self.skeletons[id.0 as usize]
    }

    /// Find the `<name>_Mesh` companion for a geometry
    pub fn find_mesh(&self, geometry_name: &str) -> Option<AnimatedMeshId> {
        match self.by_name.get(&format!("{}_Mesh", geometry_name)) {
            Some(AnimatedObject::Mesh(id)) => Some(*id),
            _ => None,
        }
    }

    /// Find the `<name>_Skeleton` companion for a geometry
    pub fn find_skeleton(&self, geometry_name: &str) -> Option<AnimatedSkeletonId> {
        match self.by_name.get(&format!("{}_Skeleton", geometry_name)) {
            Some(AnimatedObject::Skeleton(id)) => Some(*id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_companion_lookup_by_name_convention() {
        let mut registry = AnimatedObjectRegistry::new();
        registry.add_mesh(AnimatedMesh {
            name: "Door_Mesh".to_string(),
        });
        registry.add_skeleton(AnimatedSkeleton {
            name: "Guard_Skeleton".to_string(),
            instanced_bones: false,
        });

        assert!(registry.find_mesh("Door").is_some());
        assert!(registry.find_skeleton("Door").is_none());
        assert!(registry.find_skeleton("Guard").is_some());
        assert!(registry.find_mesh("Guard").is_none());
    }

    #[test]
    fn test_missing_companion_is_none() {
        let registry = AnimatedObjectRegistry::new();
        assert!(registry.find_mesh("Rock").is_none());
        assert!(registry.find_skeleton("Rock").is_none());
    }
}
