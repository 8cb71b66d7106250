//! ## Context
//!
//! The [Instance] and [Device] are always created by ash, the allocator however can be defined by the
//! application. Have a look at the [allocator](crate::allocator) module for its definition and default implementation.
//!
//! Since device, queue and allocator closely work together they are bundled in [Ctx]. A context also carries the
//! [DeviceCapabilities] it was created with, so support checks never have to query the driver again.
use std::sync::{Arc, Mutex};

use ash::vk;

mod capabilities;
pub use capabilities::DeviceCapabilities;

mod instance;
pub use instance::{vulkan_debug_callback, Debugger, GetDeviceFilter, Instance, InstanceBuilder};

mod device;
pub use device::{Device, DeviceBuilder};

mod queue;
pub use queue::{Queue, QueueBuilder};

mod physical_device;
pub use physical_device::{PhyDeviceProperties, PhysicalDeviceFilter};

use crate::allocator::Allocator;
#[cfg(feature = "default_allocator")]
use crate::error::{DeviceError, HarnessError};

///Vulkan context. Can either be constructed by hand, or via [Ctx::new_headless].
#[derive(Clone)]
pub struct Ctx<A: Allocator + Send> {
    ///Allocator instance used for all buffer and image allocation in this context.
    pub allocator: Arc<Mutex<A>>,
    ///Vulkan device including associated queues.
    pub device: Arc<Device>,
    ///The initial vulkan instance used for the context.
    pub instance: Arc<Instance>,
    ///What the device supports. Features that are reported here are also enabled on `device`.
    pub capabilities: DeviceCapabilities,
}

impl<A: Allocator + Send> Ctx<A> {
    ///Creates the context from its elements.
    ///
    /// # Safety
    /// Assumes that the allocator was created for the device, which is in turn created for the instance.
    pub fn new(
        allocator: A,
        device: Arc<Device>,
        instance: Arc<Instance>,
        capabilities: DeviceCapabilities,
    ) -> Self {
        Ctx {
            allocator: Arc::new(Mutex::new(allocator)),
            device,
            instance,
            capabilities,
        }
    }

    ///The queue all work of this context is submitted to.
    pub fn queue(&self) -> Option<&Queue> {
        self.device.queues.first()
    }
}

#[cfg(feature = "default_allocator")]
impl Ctx<gpu_allocator::vulkan::Allocator> {
    ///Creates a context without any surface. Picks the best Vulkan 1.3 device that has a graphics and compute queue and
    /// enables `synchronization2` and the ray tracing extensions and features if the device reports them. Whatever is
    /// missing is left to the per case support checks.
    pub fn new_headless(use_validation: bool) -> Result<Self, HarnessError> {
        let mut instance_builder = Instance::load()?;
        if use_validation {
            instance_builder = instance_builder.enable_validation();
        }
        let instance = instance_builder.build()?;

        let mut device_candidates = instance
            .create_physical_device_filter()?
            .filter_api_version(1, 3)
            .filter_queue_flags(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE)
            .sort_by_type()
            .release();

        if device_candidates.is_empty() {
            return Err(DeviceError::NoPhysicalDevice.into());
        }

        let physical = device_candidates.remove(0);
        let capabilities = DeviceCapabilities::query(&instance, &physical);

        #[cfg(feature = "logging")]
        log::info!("Using device {}: {:#?}", capabilities.device_name, capabilities);

        let mut device_builder = physical
            .into_device_builder(
                instance.clone(),
                vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE,
            )
            .with(|b| {
                b.features.fragment_stores_and_atomics =
                    capabilities.fragment_stores_and_atomics.into();
                b.features12.buffer_device_address = capabilities.buffer_device_address.into();
                b.features13.synchronization2 = capabilities.synchronization2.into();
            });

        if capabilities.has_ray_tracing_extensions() {
            device_builder = device_builder
                .push_extension(ash::khr::deferred_host_operations::NAME)
                .push_extension(ash::khr::acceleration_structure::NAME)
                .push_extension(ash::khr::ray_tracing_pipeline::NAME)
                .with(|b| {
                    b.acceleration_structure = Some(
                        vk::PhysicalDeviceAccelerationStructureFeaturesKHR::default()
                            .acceleration_structure(capabilities.acceleration_structure),
                    );
                    b.ray_tracing_pipeline = Some(
                        vk::PhysicalDeviceRayTracingPipelineFeaturesKHR::default()
                            .ray_tracing_pipeline(capabilities.ray_tracing_pipeline),
                    );
                });
        }

        let device = device_builder.build()?;

        let allocator =
            gpu_allocator::vulkan::Allocator::new(&gpu_allocator::vulkan::AllocatorCreateDesc {
                buffer_device_address: capabilities.buffer_device_address,
                debug_settings: gpu_allocator::AllocatorDebugSettings {
                    log_leaks_on_shutdown: true,
                    ..Default::default()
                },
                device: device.inner.clone(),
                instance: instance.inner.clone(),
                physical_device: device.physical_device,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| DeviceError::GpuAllocatorError(Box::new(e)))?;

        Ok(Ctx::new(allocator, device, instance, capabilities))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Ctx<gpu_allocator::vulkan::Allocator>: Send, Sync);
        assert_impl_all!(Device: Send, Sync);
        assert_impl_all!(DeviceCapabilities: Send, Sync);
    }
}
