//! ## Allocator
//!
//! Every buffer and image owns a [ManagedAllocation] that hands its memory back to the allocator once dropped.
//! Allocators are abstracted through the [Allocator] trait, a default implementation based on
//! [Traverse Research's](https://github.com/Traverse-Research/gpu-allocator) `gpu-allocator` is included through the
//! `default_allocator` feature.

#[cfg(feature = "default_allocator")]
mod gpu_allocator;

use std::sync::{Arc, Mutex};

use ash::vk;

///Types of memory usage. Resources the host never touches should be `GpuOnly`.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum MemoryUsage {
    Unknown,
    GpuOnly,
    CpuToGpu,
    GpuToCpu,
}

impl MemoryUsage {
    pub fn is_host_visible(&self) -> bool {
        match self {
            MemoryUsage::CpuToGpu | MemoryUsage::GpuToCpu => true,
            MemoryUsage::GpuOnly | MemoryUsage::Unknown => false,
        }
    }
}

///Abstract allocation trait that allows finding the memory handle of an allocation, its offset on that memory and
/// its host mapping, if there is any.
pub trait Allocation {
    fn memory(&self) -> vk::DeviceMemory;
    fn offset(&self) -> u64;
    fn size(&self) -> u64;
    fn memory_properties(&self) -> vk::MemoryPropertyFlags;
    fn mapped_slice(&self) -> Option<&[u8]>;
    fn mapped_slice_mut(&mut self) -> Option<&mut [u8]>;
}

///Trait that can be implemented by anything that can handle allocation for a initialized [ash::Device](ash::Device).
pub trait Allocator {
    type Allocation: Allocation + Send + Sync + 'static;
    type AllocationError: std::error::Error + Send + Sync + 'static;
    ///creates a single allocation (possibly tagged via `name` for debugging).
    fn allocate(
        &mut self,
        name: Option<&str>,
        requirements: vk::MemoryRequirements,
        usage: MemoryUsage,
        is_linear: bool,
    ) -> Result<Self::Allocation, Self::AllocationError>;

    ///Frees a allocation
    fn free(&mut self, allocation: Self::Allocation) -> Result<(), Self::AllocationError>;

    ///Allocates for a provided buffer. `min_alignment` raises the buffer's alignment requirement, for instance for
    /// shader binding tables or acceleration structure scratch memory.
    fn allocate_buffer(
        &mut self,
        device: &ash::Device,
        name: Option<&str>,
        buffer: &vk::Buffer,
        usage: MemoryUsage,
        min_alignment: Option<u64>,
    ) -> Result<Self::Allocation, Self::AllocationError> {
        let mut requirements = unsafe { device.get_buffer_memory_requirements(*buffer) };
        if let Some(alignment) = min_alignment {
            requirements.alignment = requirements.alignment.max(alignment);
        }
        //NOTE: Buffers are always "linear" in memory
        self.allocate(name, requirements, usage, true)
    }

    fn allocate_image(
        &mut self,
        device: &ash::Device,
        name: Option<&str>,
        image: &vk::Image,
        usage: MemoryUsage,
        is_linear: bool,
    ) -> Result<Self::Allocation, Self::AllocationError> {
        let requirements = unsafe { device.get_image_memory_requirements(*image) };
        self.allocate(name, requirements, usage, is_linear)
    }
}

///Implemented for all managed allocations. Allows [Image](crate::resources::Image) and [Buffer](crate::resources::Buffer) to hide their allocator type.
pub trait AnonymAllocation {
    fn memory(&self) -> vk::DeviceMemory;
    fn offset(&self) -> u64;
    fn size(&self) -> u64;
    ///True if the host mapping does not need explicit flushes and invalidations.
    fn is_coherent(&self) -> bool;
    fn as_slice_ref(&self) -> Option<&[u8]>;
    fn as_slice_mut(&mut self) -> Option<&mut [u8]>;
}

///An allocation that frees itself when dropped.
pub struct ManagedAllocation<A: Allocator + Send + Sync + 'static> {
    pub allocator: Arc<Mutex<A>>,
    pub allocation: Option<<A as Allocator>::Allocation>,
}

impl<A: Allocator + Send + Sync + 'static> ManagedAllocation<A> {
    ///Returns false if the allocation is for some reason invalid, aka. shouldn't be used.
    pub fn is_valid(&self) -> bool {
        self.allocation.is_some()
    }
}

impl<A: Allocator + Send + Sync + 'static> AnonymAllocation for ManagedAllocation<A> {
    fn memory(&self) -> vk::DeviceMemory {
        self.allocation
            .as_ref()
            .map(|a| a.memory())
            .unwrap_or(vk::DeviceMemory::null())
    }

    fn offset(&self) -> u64 {
        self.allocation.as_ref().map(|a| a.offset()).unwrap_or(0)
    }

    fn size(&self) -> u64 {
        self.allocation.as_ref().map(|a| a.size()).unwrap_or(0)
    }

    fn is_coherent(&self) -> bool {
        self.allocation
            .as_ref()
            .map(|a| {
                a.memory_properties()
                    .contains(vk::MemoryPropertyFlags::HOST_COHERENT)
            })
            .unwrap_or(false)
    }

    fn as_slice_ref(&self) -> Option<&[u8]> {
        self.allocation.as_ref().and_then(|a| a.mapped_slice())
    }

    fn as_slice_mut(&mut self) -> Option<&mut [u8]> {
        self.allocation.as_mut().and_then(|a| a.mapped_slice_mut())
    }
}

impl<A: Allocator + Send + Sync + 'static> Drop for ManagedAllocation<A> {
    fn drop(&mut self) {
        if let (Ok(mut lck), Some(allocation)) = (self.allocator.lock(), self.allocation.take()) {
            if let Err(e) = lck.free(allocation) {
                //NOTE: failed free happens "silently". The allocator knows the memory is gone and
                //      this allocation became invalid since we took it.
                #[cfg(feature = "logging")]
                log::error!("Freeing allocation failed with: {}", e);
                #[cfg(not(feature = "logging"))]
                let _ = e;
            }
        } else {
            #[cfg(feature = "logging")]
            log::warn!("Could not free managed allocation");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_visibility() {
        assert!(MemoryUsage::CpuToGpu.is_host_visible());
        assert!(MemoryUsage::GpuToCpu.is_host_visible());
        assert!(!MemoryUsage::GpuOnly.is_host_visible());
        assert!(!MemoryUsage::Unknown.is_host_visible());
    }
}
