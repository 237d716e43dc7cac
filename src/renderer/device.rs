//! Render device seam
//!
//! The node pipeline treats pipelines, buffers and descriptor sets as opaque
//! Vulkan handles. Everything that actually talks to the driver goes through
//! the [`RenderDevice`] trait so the table and classification code never
//! holds a `vk::Device` directly.

use ash::vk;

use crate::error::{EngineError, EngineResult};

/// Descriptor bindings required by one node "shape", per binding type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DescriptorCounts {
    /// Uniform buffer bindings
    pub uniform_buffers: u32,

    /// Storage buffer bindings (skinning matrices, morph weights)
    pub storage_buffers: u32,

    /// Combined image sampler bindings
    pub samplers: u32,
}

impl DescriptorCounts {
    pub fn total(&self) -> u32 {
        self.uniform_buffers + self.storage_buffers + self.samplers
    }
}

/// Why a descriptor set allocation did not produce a set
#[derive(Debug)]
pub enum DescriptorPoolError {
    /// The pool has no free sets left; the caller allocates a new pool
    /// and retries
    Exhausted,
    /// Driver-level failure, surfaced to the caller
    Device(String),
}

/// The graphics-API surface consumed by the node pipeline.
///
/// One implementation wraps a live `ash::Device`; tests provide a mock that
/// mints fake handles.
pub trait RenderDevice: Send + Sync {
    /// Create a descriptor set layout matching `counts`. Bindings are laid
    /// out uniform buffers first, then storage buffers, then samplers.
    fn create_descriptor_layout(
        &self,
        counts: &DescriptorCounts,
    ) -> EngineResult<vk::DescriptorSetLayout>;

    /// Create a descriptor pool able to serve `max_sets` sets of the given
    /// shape.
    fn create_descriptor_pool(
        &self,
        counts: &DescriptorCounts,
        max_sets: u32,
    ) -> EngineResult<vk::DescriptorPool>;

    /// Allocate one set from `pool` with `layout`.
    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, DescriptorPoolError>;

    /// Destroy a pool and every set allocated from it.
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);

    /// Destroy a descriptor set layout.
    fn destroy_descriptor_layout(&self, layout: vk::DescriptorSetLayout);
}

/// Production device backed by `ash`
pub struct VulkanDevice {
    device: ash::Device,
}

impl VulkanDevice {
    /// Wrap an already-created logical device. The caller keeps the
    /// instance/physical-device ownership.
    pub fn new(device: ash::Device) -> Self {
        Self { device }
    }

    pub fn raw(&self) -> &ash::Device {
        &self.device
    }

    fn layout_bindings(counts: &DescriptorCounts) -> Vec<vk::DescriptorSetLayoutBinding> {
        let mut bindings = Vec::with_capacity(counts.total() as usize);
        let mut binding = 0u32;

        for _ in 0..counts.uniform_buffers {
            bindings.push(
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding)
                    .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT)
                    .build(),
            );
            binding += 1;
        }

        for _ in 0..counts.storage_buffers {
            bindings.push(
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding)
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::VERTEX)
                    .build(),
            );
            binding += 1;
        }

        for _ in 0..counts.samplers {
            bindings.push(
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding)
                    .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                    .descriptor_count(1)
                    .stage_flags(vk::ShaderStageFlags::FRAGMENT)
                    .build(),
            );
            binding += 1;
        }

        bindings
    }

    fn pool_sizes(counts: &DescriptorCounts, max_sets: u32) -> Vec<vk::DescriptorPoolSize> {
        let mut sizes = Vec::with_capacity(3);

        if counts.uniform_buffers > 0 {
            sizes.push(vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: counts.uniform_buffers * max_sets,
            });
        }

        if counts.storage_buffers > 0 {
            sizes.push(vk::DescriptorPoolSize {
                ty: vk::DescriptorType::STORAGE_BUFFER,
                descriptor_count: counts.storage_buffers * max_sets,
            });
        }

        if counts.samplers > 0 {
            sizes.push(vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: counts.samplers * max_sets,
            });
        }

        sizes
    }
}

impl RenderDevice for VulkanDevice {
    fn create_descriptor_layout(
        &self,
        counts: &DescriptorCounts,
    ) -> EngineResult<vk::DescriptorSetLayout> {
        let bindings = Self::layout_bindings(counts);
        let info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);

        unsafe { self.device.create_descriptor_set_layout(&info, None) }.map_err(|e| {
            EngineError::GpuOperationFailed {
                operation: "create_descriptor_set_layout".to_string(),
                error: e.to_string(),
            }
        })
    }

    fn create_descriptor_pool(
        &self,
        counts: &DescriptorCounts,
        max_sets: u32,
    ) -> EngineResult<vk::DescriptorPool> {
        let sizes = Self::pool_sizes(counts, max_sets);
        let info = vk::DescriptorPoolCreateInfo::builder()
            .max_sets(max_sets)
            .pool_sizes(&sizes);

        unsafe { self.device.create_descriptor_pool(&info, None) }.map_err(|e| {
            EngineError::GpuOperationFailed {
                operation: "create_descriptor_pool".to_string(),
                error: e.to_string(),
            }
        })
    }

    fn allocate_descriptor_set(
        &self,
        pool: vk::DescriptorPool,
        layout: vk::DescriptorSetLayout,
    ) -> Result<vk::DescriptorSet, DescriptorPoolError> {
        let layouts = [layout];
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);

        match unsafe { self.device.allocate_descriptor_sets(&info) } {
            Ok(sets) => Ok(sets[0]),
            Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {
                Err(DescriptorPoolError::Exhausted)
            }
            Err(e) => Err(DescriptorPoolError::Device(e.to_string())),
        }
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.device.destroy_descriptor_pool(pool, None) };
    }

    fn destroy_descriptor_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.device.destroy_descriptor_set_layout(layout, None) };
    }
}

#[cfg(test)]
pub(crate) mod mock {
    //! Handle-minting device used by the table and queue tests

    use super::*;
    use ash::vk::Handle;
    use parking_lot::Mutex;
    use rustc_hash::FxHashMap;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[derive(Default)]
    struct PoolState {
        capacity: u32,
        allocated: u32,
    }

    /// Fake device that mints sequential handles and enforces pool capacity,
    /// so exhaustion-recovery can be exercised without a driver.
    pub struct MockDevice {
        next_handle: AtomicU64,
        pools: Mutex<FxHashMap<u64, PoolState>>,
        pub layouts_created: AtomicU64,
        pub pools_created: AtomicU64,
        pub sets_allocated: AtomicU64,
    }

    impl MockDevice {
        pub fn new() -> Self {
            Self {
                next_handle: AtomicU64::new(1),
                pools: Mutex::new(FxHashMap::default()),
                layouts_created: AtomicU64::new(0),
                pools_created: AtomicU64::new(0),
                sets_allocated: AtomicU64::new(0),
            }
        }

        fn mint(&self) -> u64 {
            self.next_handle.fetch_add(1, Ordering::Relaxed)
        }
    }

    impl RenderDevice for MockDevice {
        fn create_descriptor_layout(
            &self,
            _counts: &DescriptorCounts,
        ) -> EngineResult<vk::DescriptorSetLayout> {
            self.layouts_created.fetch_add(1, Ordering::Relaxed);
            Ok(vk::DescriptorSetLayout::from_raw(self.mint()))
        }

        fn create_descriptor_pool(
            &self,
            _counts: &DescriptorCounts,
            max_sets: u32,
        ) -> EngineResult<vk::DescriptorPool> {
            let handle = self.mint();
            self.pools.lock().insert(
                handle,
                PoolState {
                    capacity: max_sets,
                    allocated: 0,
                },
            );
            self.pools_created.fetch_add(1, Ordering::Relaxed);
            Ok(vk::DescriptorPool::from_raw(handle))
        }

        fn allocate_descriptor_set(
            &self,
            pool: vk::DescriptorPool,
            _layout: vk::DescriptorSetLayout,
        ) -> Result<vk::DescriptorSet, DescriptorPoolError> {
            let mut pools = self.pools.lock();
            let state = pools
                .get_mut(&pool.as_raw())
                .ok_or_else(|| DescriptorPoolError::Device("unknown pool".to_string()))?;

            if state.allocated >= state.capacity {
                return Err(DescriptorPoolError::Exhausted);
            }

            state.allocated += 1;
            drop(pools);
            self.sets_allocated.fetch_add(1, Ordering::Relaxed);
            Ok(vk::DescriptorSet::from_raw(self.mint()))
        }

        fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
            self.pools.lock().remove(&pool.as_raw());
        }

        fn destroy_descriptor_layout(&self, _layout: vk::DescriptorSetLayout) {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_bindings_are_sequential() {
        let counts = DescriptorCounts {
            uniform_buffers: 2,
            storage_buffers: 1,
            samplers: 3,
        };
        let bindings = VulkanDevice::layout_bindings(&counts);
        assert_eq!(bindings.len(), 6);

        for (i, binding) in bindings.iter().enumerate() {
            assert_eq!(binding.binding, i as u32);
        }
        assert_eq!(
            bindings[0].descriptor_type,
            vk::DescriptorType::UNIFORM_BUFFER
        );
        assert_eq!(
            bindings[2].descriptor_type,
            vk::DescriptorType::STORAGE_BUFFER
        );
        assert_eq!(
            bindings[5].descriptor_type,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER
        );
    }

    #[test]
    fn test_pool_sizes_skip_empty_types() {
        let counts = DescriptorCounts {
            uniform_buffers: 2,
            storage_buffers: 0,
            samplers: 1,
        };
        let sizes = VulkanDevice::pool_sizes(&counts, 50);
        assert_eq!(sizes.len(), 2);
        assert_eq!(sizes[0].descriptor_count, 100);
        assert_eq!(sizes[1].descriptor_count, 50);
    }

    #[test]
    fn test_mock_pool_exhaustion() {
        use super::mock::MockDevice;

        let device = MockDevice::new();
        let counts = DescriptorCounts {
            uniform_buffers: 1,
            ..Default::default()
        };
        let layout = device.create_descriptor_layout(&counts).unwrap();
        let pool = device.create_descriptor_pool(&counts, 2).unwrap();

        assert!(device.allocate_descriptor_set(pool, layout).is_ok());
        assert!(device.allocate_descriptor_set(pool, layout).is_ok());
        assert!(matches!(
            device.allocate_descriptor_set(pool, layout),
            Err(DescriptorPoolError::Exhausted)
        ));
    }
}
