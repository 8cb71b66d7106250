use std::{
    hash::{Hash, Hasher},
    sync::{Arc, Mutex},
};

use crate::{
    allocator::{Allocator, AnonymAllocation, ManagedAllocation, MemoryUsage},
    context::Device,
    error::{AllocationError, BufferMapError, ResourceError},
};
use ash::vk;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BufDesc {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}

impl BufDesc {
    pub fn new(size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Self {
        BufDesc { size, usage }
    }

    pub fn set_on_builder<'a>(&self, builder: vk::BufferCreateInfo<'a>) -> vk::BufferCreateInfo<'a> {
        builder
            .size(self.size)
            .usage(self.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
    }
}

///Self managing buffer that uses the allocator `A` to create the buffer, and free it when dropped.
//Note Freeing happens in `ManagedAllocation`'s implementation.
pub struct Buffer {
    pub desc: BufDesc,
    pub inner: vk::Buffer,
    pub usage: MemoryUsage,
    pub device: Arc<Device>,
    pub allocation: Box<dyn AnonymAllocation + Send + Sync + 'static>,
}

impl Drop for Buffer {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_buffer(self.inner, None) }
    }
}

///The hash implementation is based on [Buffer](ash::vk::Buffer)'s hash.
impl Hash for Buffer {
    fn hash<H: Hasher>(&self, hasher: &mut H) {
        self.inner.hash(hasher)
    }
}

impl Buffer {
    ///Creates a buffer for `description`. `min_alignment` can raise the alignment of the backing memory above the
    /// buffer's own requirement.
    pub fn new<A: Allocator + Send + Sync + 'static>(
        device: &Arc<Device>,
        allocator: &Arc<Mutex<A>>,
        description: BufDesc,
        usage: MemoryUsage,
        name: Option<&str>,
        min_alignment: Option<u64>,
    ) -> Result<Self, ResourceError> {
        let builder = description.set_on_builder(vk::BufferCreateInfo::default());
        let buffer = unsafe { device.inner.create_buffer(&builder, None)? };

        let allocation = match allocator.lock() {
            Ok(mut alloc) => alloc
                .allocate_buffer(&device.inner, name, &buffer, usage, min_alignment)
                .map_err(|e| AllocationError::Allocator(Box::new(e))),
            Err(_) => Err(AllocationError::Poisoned),
        };
        let allocation = match allocation {
            Ok(a) => a,
            Err(e) => {
                unsafe { device.inner.destroy_buffer(buffer, None) };
                return Err(e.into());
            }
        };

        let managed = ManagedAllocation {
            allocator: allocator.clone(),
            allocation: Some(allocation),
        };

        //from here on the allocation frees itself if binding fails
        if let Err(e) = unsafe {
            device
                .inner
                .bind_buffer_memory(buffer, managed.memory(), managed.offset())
        } {
            unsafe { device.inner.destroy_buffer(buffer, None) };
            return Err(e.into());
        }

        Ok(Buffer {
            device: device.clone(),
            allocation: Box::new(managed),
            usage,
            desc: description,
            inner: buffer,
        })
    }

    ///A staging buffer is a host visible, mapable buffer. Those are usually used to copy data from the host to
    /// the device.
    ///
    /// Buffers created by this function are initialized to `data` and can be used as transfer source.
    pub fn new_staging_for_data<A: Allocator + Send + Sync + 'static, T: bytemuck::Pod>(
        device: &Arc<Device>,
        allocator: &Arc<Mutex<A>>,
        name: Option<&str>,
        data: &[T],
    ) -> Result<Self, ResourceError> {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        let desc = BufDesc::new(
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::TRANSFER_SRC,
        );

        let mut buffer = Buffer::new(device, allocator, desc, MemoryUsage::CpuToGpu, name, None)?;
        buffer.write(0, bytes)?;
        buffer.flush_range()?;

        Ok(buffer)
    }

    ///Returns the size the buffer was created with.
    pub fn size(&self) -> vk::DeviceSize {
        self.desc.size
    }

    fn check_mapable(&self) -> Result<(), BufferMapError> {
        if self.usage.is_host_visible() {
            Ok(())
        } else {
            #[cfg(feature = "logging")]
            log::error!("Tried to map buffer that has usage: {:?}", self.usage);
            Err(BufferMapError::NotMapable)
        }
    }

    ///Writes `data` to the buffer, starting at `offset`.
    ///If `offset + data.len()` exceeds the buffer only the bytes that fit are written and an error is returned.
    ///
    ///If the buffer is not mapable by the host (usually if the buffer us created with MemoryUsage::GpuOnly) nothing is
    /// written and an error is returned.
    pub fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), BufferMapError> {
        self.check_mapable()?;

        let size = self.desc.size as usize;
        if offset > size {
            #[cfg(feature = "logging")]
            log::error!(
                "Supplied offset for buffer write to large. BufferSize={}, offset={}",
                size,
                offset
            );
            return Err(BufferMapError::OffsetTooLarge);
        }
        let write_size = data.len().min(size - offset);

        let Some(mapped) = self.allocation.as_slice_mut() else {
            return Err(BufferMapError::NotMapable);
        };
        #[cfg(feature = "logging")]
        log::trace!(
            "writing to mapped buffer[{:?}] of size {} with offset={}, write_size={}",
            self.inner,
            size,
            offset,
            write_size
        );
        mapped[offset..offset + write_size].copy_from_slice(&data[..write_size]);

        if write_size < data.len() {
            Err(BufferMapError::PartialyWritten {
                written: write_size,
                size: data.len(),
            })
        } else {
            Ok(())
        }
    }

    ///Returns a reference to the buffer's data. The slice covers exactly the buffer's size.
    pub fn read(&self) -> Result<&[u8], BufferMapError> {
        self.check_mapable()?;
        let size = self.desc.size as usize;
        match self.allocation.as_slice_ref() {
            Some(slice) if slice.len() >= size => Ok(&slice[..size]),
            _ => Err(BufferMapError::NotMapable),
        }
    }

    fn mapped_range(&self) -> vk::MappedMemoryRange<'static> {
        let atom = unsafe {
            self.device
                .instance
                .inner
                .get_physical_device_properties(self.device.physical_device)
        }
        .limits
        .non_coherent_atom_size
        .max(1);

        let offset = self.allocation.offset();
        let aligned_offset = (offset / atom) * atom;
        vk::MappedMemoryRange::default()
            .memory(self.allocation.memory())
            .offset(aligned_offset)
            .size(vk::WHOLE_SIZE)
    }

    ///Makes host writes visible to the device. Does nothing for host coherent memory.
    pub fn flush_range(&self) -> Result<(), ResourceError> {
        self.check_mapable()?;
        if self.allocation.is_coherent() {
            return Ok(());
        }
        let range = self.mapped_range();
        unsafe { self.device.inner.flush_mapped_memory_ranges(&[range])? };
        Ok(())
    }

    ///Makes device writes visible to the host. Does nothing for host coherent memory.
    pub fn invalidate_range(&self) -> Result<(), ResourceError> {
        self.check_mapable()?;
        if self.allocation.is_coherent() {
            return Ok(());
        }
        let range = self.mapped_range();
        unsafe {
            self.device
                .inner
                .invalidate_mapped_memory_ranges(&[range])?
        };
        Ok(())
    }

    ///Returns the device address of the buffer. The buffer must have been created with `SHADER_DEVICE_ADDRESS` usage.
    pub fn device_address(&self) -> Result<vk::DeviceAddress, ResourceError> {
        if !self
            .desc
            .usage
            .contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS)
        {
            return Err(ResourceError::NoDeviceAddress(self.inner));
        }
        let info = vk::BufferDeviceAddressInfo::default().buffer(self.inner);
        Ok(unsafe { self.device.inner.get_buffer_device_address(&info) })
    }

    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.inner,
            offset: 0,
            range: self.desc.size,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Buffer: Send, Sync);
    }

    #[test]
    fn desc_on_builder() {
        let desc = BufDesc::new(4096, vk::BufferUsageFlags::STORAGE_BUFFER);
        let ci = desc.set_on_builder(vk::BufferCreateInfo::default());
        assert_eq!(ci.size, 4096);
        assert_eq!(ci.usage, vk::BufferUsageFlags::STORAGE_BUFFER);
        assert_eq!(ci.sharing_mode, vk::SharingMode::EXCLUSIVE);
    }
}
