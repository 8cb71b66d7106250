use std::sync::Arc;

use ahash::AHashMap;
use ash::vk;

use crate::{context::Device, error::DescriptorError};

/// Wrapped descriptor set layout. Handles on-drop destruction of the resource.
pub struct DescriptorSetLayout {
    pub device: Arc<Device>,
    pub inner: vk::DescriptorSetLayout,
}

impl DescriptorSetLayout {
    ///Generates a descriptor set layout from a set of bindings.
    pub fn new(
        device: &Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> Result<Self, DescriptorError> {
        let info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
        let layout = unsafe { device.inner.create_descriptor_set_layout(&info, None)? };

        Ok(DescriptorSetLayout {
            device: device.clone(),
            inner: layout,
        })
    }
}

impl Drop for DescriptorSetLayout {
    fn drop(&mut self) {
        unsafe {
            self.device
                .inner
                .destroy_descriptor_set_layout(self.inner, None)
        }
    }
}

pub struct DescriptorPool {
    pub device: Arc<Device>,
    pub inner: vk::DescriptorPool,
    ///Allocatable sizes
    pub sizes: AHashMap<vk::DescriptorType, u32>,
}

impl Drop for DescriptorPool {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_descriptor_pool(self.inner, None) }
    }
}

impl DescriptorPool {
    ///Simple [ash::vk::DescriptorPool](ash::vk::DescriptorPool) creation wrapper.
    pub fn new(
        device: &Arc<Device>,
        sizes: &[vk::DescriptorPoolSize],
        set_count: u32,
    ) -> Result<Self, DescriptorError> {
        let create_info = vk::DescriptorPoolCreateInfo::default()
            .max_sets(set_count)
            .pool_sizes(sizes);

        let pool = unsafe { device.inner.create_descriptor_pool(&create_info, None)? };

        Ok(DescriptorPool {
            device: device.clone(),
            inner: pool,
            sizes: pool_size_map(sizes),
        })
    }

    ///Creates a pool that can allocate exactly one set of a layout with `bindings`.
    pub fn new_for_bindings(
        device: &Arc<Device>,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> Result<Self, DescriptorError> {
        let sizes = pool_sizes_for(bindings);
        Self::new(device, &sizes, 1)
    }

    ///Allocates a single set of `layout`. The set lives as long as the pool does.
    pub fn allocate(
        self: &Arc<Self>,
        layout: &DescriptorSetLayout,
    ) -> Result<DescriptorSet, DescriptorError> {
        let create_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(self.inner)
            .set_layouts(core::slice::from_ref(&layout.inner));

        let mut sets = unsafe { self.device.inner.allocate_descriptor_sets(&create_info)? };

        if sets.is_empty() {
            return Err(DescriptorError::Allocation {
                requested: 1,
                count: 0,
            });
        }

        Ok(DescriptorSet {
            inner: sets.remove(0),
            parent_pool: self.clone(),
        })
    }
}

fn pool_size_map(sizes: &[vk::DescriptorPoolSize]) -> AHashMap<vk::DescriptorType, u32> {
    sizes.iter().fold(AHashMap::default(), |mut map, size| {
        *map.entry(size.ty).or_insert(0) += size.descriptor_count;
        map
    })
}

///Sums up the descriptor counts per type of `bindings`.
pub fn pool_sizes_for(bindings: &[vk::DescriptorSetLayoutBinding]) -> Vec<vk::DescriptorPoolSize> {
    let mut map: AHashMap<vk::DescriptorType, u32> = AHashMap::default();
    for binding in bindings {
        *map.entry(binding.descriptor_type).or_insert(0) += binding.descriptor_count;
    }
    let mut sizes = map
        .into_iter()
        .map(|(ty, descriptor_count)| vk::DescriptorPoolSize {
            ty,
            descriptor_count,
        })
        .collect::<Vec<_>>();
    sizes.sort_by_key(|s| s.ty.as_raw());
    sizes
}

///A single descriptor update.
#[derive(Clone, Copy, Debug)]
pub enum DescriptorWrite {
    Buffer {
        binding: u32,
        ty: vk::DescriptorType,
        info: vk::DescriptorBufferInfo,
    },
    StorageImage {
        binding: u32,
        view: vk::ImageView,
        layout: vk::ImageLayout,
    },
    AccelerationStructure {
        binding: u32,
        handle: vk::AccelerationStructureKHR,
    },
}

///Descriptor set that is freed together with its pool.
pub struct DescriptorSet {
    pub inner: vk::DescriptorSet,
    pub parent_pool: Arc<DescriptorPool>,
}

impl DescriptorSet {
    ///Writes all descriptors in `writes`. The referenced resources must stay alive as long as the set is used.
    pub fn write(&self, writes: &[DescriptorWrite]) {
        let device = &self.parent_pool.device.inner;
        for write in writes {
            match write {
                DescriptorWrite::Buffer { binding, ty, info } => {
                    let w = vk::WriteDescriptorSet::default()
                        .dst_set(self.inner)
                        .dst_binding(*binding)
                        .descriptor_type(*ty)
                        .buffer_info(core::slice::from_ref(info));
                    unsafe { device.update_descriptor_sets(&[w], &[]) };
                }
                DescriptorWrite::StorageImage {
                    binding,
                    view,
                    layout,
                } => {
                    let info = vk::DescriptorImageInfo {
                        sampler: vk::Sampler::null(),
                        image_view: *view,
                        image_layout: *layout,
                    };
                    let w = vk::WriteDescriptorSet::default()
                        .dst_set(self.inner)
                        .dst_binding(*binding)
                        .descriptor_type(vk::DescriptorType::STORAGE_IMAGE)
                        .image_info(core::slice::from_ref(&info));
                    unsafe { device.update_descriptor_sets(&[w], &[]) };
                }
                DescriptorWrite::AccelerationStructure { binding, handle } => {
                    let mut as_write = vk::WriteDescriptorSetAccelerationStructureKHR::default()
                        .acceleration_structures(core::slice::from_ref(handle));
                    //the count is not implied by the main write for acceleration structures
                    let w = vk::WriteDescriptorSet::default()
                        .dst_set(self.inner)
                        .dst_binding(*binding)
                        .descriptor_type(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
                        .descriptor_count(1)
                        .push_next(&mut as_write);
                    unsafe { device.update_descriptor_sets(&[w], &[]) };
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(DescriptorSetLayout: Send, Sync);
        assert_impl_all!(DescriptorPool: Send, Sync);
        assert_impl_all!(DescriptorSet: Send, Sync);
    }

    #[test]
    fn pool_sizes_sum_per_type() {
        let bindings = [
            vk::DescriptorSetLayoutBinding::default()
                .binding(0)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(1),
            vk::DescriptorSetLayoutBinding::default()
                .binding(1)
                .descriptor_type(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
                .descriptor_count(1),
            vk::DescriptorSetLayoutBinding::default()
                .binding(2)
                .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                .descriptor_count(1),
        ];
        let sizes = pool_sizes_for(&bindings);
        assert_eq!(sizes.len(), 2);
        let storage = sizes
            .iter()
            .find(|s| s.ty == vk::DescriptorType::STORAGE_BUFFER)
            .map(|s| s.descriptor_count);
        assert_eq!(storage, Some(2));
    }
}
