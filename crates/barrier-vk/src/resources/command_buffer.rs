use std::sync::Arc;

use ash::vk;

use crate::{context::Device, error::CommandBufferError};

pub struct CommandPool {
    ///Device this pool was created on.
    pub device: Arc<Device>,
    ///The queue family this pool's buffers can be used on.
    pub queue_family: u32,
    ///the raw vulkan handle.
    pub inner: vk::CommandPool,
    pub can_reset_buffer: bool,
}

impl CommandPool {
    pub fn new(
        device: &Arc<Device>,
        queue_family: u32,
        flags: vk::CommandPoolCreateFlags,
    ) -> Result<Self, CommandBufferError> {
        let create_info = vk::CommandPoolCreateInfo::default()
            .flags(flags)
            .queue_family_index(queue_family);

        let pool = unsafe { device.inner.create_command_pool(&create_info, None)? };

        let can_reset_buffer = flags.contains(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        Ok(CommandPool {
            device: device.clone(),
            inner: pool,
            queue_family,
            can_reset_buffer,
        })
    }
}

impl Drop for CommandPool {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_command_pool(self.inner, None) }
    }
}

impl CommandBufferAllocator for CommandPool {
    fn reset(
        &self,
        command_buffer: &vk::CommandBuffer,
        release_resources: bool,
    ) -> Result<(), CommandBufferError> {
        if !self.can_reset_buffer {
            return Err(CommandBufferError::PoolNotResetable);
        }
        let flag = if release_resources {
            vk::CommandBufferResetFlags::RELEASE_RESOURCES
        } else {
            vk::CommandBufferResetFlags::empty()
        };
        unsafe {
            self.device
                .inner
                .reset_command_buffer(*command_buffer, flag)?
        };
        Ok(())
    }

    fn allocate_buffer(
        self,
        level: vk::CommandBufferLevel,
    ) -> Result<CommandBuffer<Self>, CommandBufferError>
    where
        Self: Sized,
    {
        let mut buffer = unsafe {
            self.device.inner.allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::default()
                    .command_pool(self.inner)
                    .command_buffer_count(1)
                    .level(level),
            )?
        };

        if buffer.is_empty() {
            return Err(CommandBufferError::FailedToAllocate {
                allocated: 0,
                count: 1,
            });
        }

        #[cfg(feature = "logging")]
        if buffer.len() > 1 {
            log::warn!(
                "Allocated too many command buffer, expected 1, got {}",
                buffer.len()
            )
        }

        let buffer = buffer.remove(0);

        Ok(CommandBuffer {
            pool: self,
            inner: buffer,
        })
    }

    fn device(&self) -> &ash::Device {
        &self.device.inner
    }
    fn raw(&self) -> &vk::CommandPool {
        &self.inner
    }
}

///Command buffer allocation implementation.
pub trait CommandBufferAllocator {
    ///Tries to reset the command buffer. Fails if the pool was not created with the `RESET_COMMAND_BUFFER` flag.
    fn reset(
        &self,
        command_buffer: &vk::CommandBuffer,
        release_resources: bool,
    ) -> Result<(), CommandBufferError>;
    ///Allocates a single command buffer. Might fail if no free buffers are left
    fn allocate_buffer(
        self,
        level: vk::CommandBufferLevel,
    ) -> Result<CommandBuffer<Self>, CommandBufferError>
    where
        Self: Sized;

    fn device(&self) -> &ash::Device;
    fn raw(&self) -> &vk::CommandPool;
}

///Works for shared pools as well.
impl<T: CommandBufferAllocator> CommandBufferAllocator for Arc<T> {
    fn reset(
        &self,
        command_buffer: &vk::CommandBuffer,
        release_resources: bool,
    ) -> Result<(), CommandBufferError> {
        self.as_ref().reset(command_buffer, release_resources)
    }

    fn allocate_buffer(
        self,
        level: vk::CommandBufferLevel,
    ) -> Result<CommandBuffer<Self>, CommandBufferError>
    where
        Self: Sized,
    {
        let mut buffer = unsafe {
            self.device().allocate_command_buffers(
                &vk::CommandBufferAllocateInfo::default()
                    .command_pool(*self.raw())
                    .command_buffer_count(1)
                    .level(level),
            )?
        };
        if buffer.is_empty() {
            return Err(CommandBufferError::FailedToAllocate {
                allocated: 0,
                count: 1,
            });
        }
        let inner = buffer.remove(0);
        Ok(CommandBuffer { pool: self, inner })
    }

    fn device(&self) -> &ash::Device {
        self.as_ref().device()
    }
    fn raw(&self) -> &vk::CommandPool {
        self.as_ref().raw()
    }
}

pub struct CommandBuffer<P: CommandBufferAllocator> {
    ///Pool this command buffer was created from. Used for reset operations, and freeing on drop.
    pub pool: P,
    ///the raw vulkan handle
    pub inner: vk::CommandBuffer,
}

impl<P: CommandBufferAllocator> CommandBuffer<P> {
    pub fn reset(&mut self, release_resources: bool) -> Result<(), CommandBufferError> {
        self.pool.reset(&self.inner, release_resources)
    }
}

impl<P: CommandBufferAllocator> Drop for CommandBuffer<P> {
    fn drop(&mut self) {
        unsafe {
            self.pool
                .device()
                .free_command_buffers(*self.pool.raw(), core::slice::from_ref(&self.inner))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(CommandPool: Send, Sync);
        assert_impl_all!(CommandBuffer<CommandPool>: Send, Sync);
        assert_impl_all!(CommandBuffer<Arc<CommandPool>>: Send, Sync);
    }
}
