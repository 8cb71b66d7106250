//! # Synchronisation
//!
//! Each barrier case is a single submission that the host waits on, so the only host/device primitive needed is a
//! [Fence]. Everything on the device side is ordered by pipeline barriers, which are recorded by the
//! `barrier-commands` crate.

use crate::context::Device;
use ash::vk;
use std::fmt::Debug;
use std::sync::Arc;

///Self destroying fence.
pub struct Fence {
    pub inner: vk::Fence,
    pub device: Arc<Device>,
}

impl Fence {
    pub fn new(device: &Arc<Device>, signaled: bool) -> Result<Self, vk::Result> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let ci = vk::FenceCreateInfo::default().flags(flags);
        let fence = unsafe { device.inner.create_fence(&ci, None)? };

        Ok(Fence {
            inner: fence,
            device: device.clone(),
        })
    }

    ///Blocks until the fence is signaled or `timeout` (in nanoseconds) is reached.
    pub fn wait(&self, timeout: u64) -> Result<(), vk::Result> {
        unsafe {
            self.device
                .inner
                .wait_for_fences(core::slice::from_ref(&self.inner), true, timeout)
        }
    }

    pub fn reset(&self) -> Result<(), vk::Result> {
        unsafe {
            self.device
                .inner
                .reset_fences(core::slice::from_ref(&self.inner))
        }
    }

    pub fn is_signaled(&self) -> Result<bool, vk::Result> {
        unsafe { self.device.inner.get_fence_status(self.inner) }
    }
}

impl Drop for Fence {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_fence(self.inner, None) }
    }
}

impl Debug for Fence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.inner.fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Fence: Send, Sync);
    }
}
