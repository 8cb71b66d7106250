use std::{
    ffi::{CStr, CString},
    sync::Arc,
};

use ash::vk;

use super::{Instance, Queue, QueueBuilder};
use crate::error::DeviceError;

///Helper that lets you setup device features and possibly needed extensions before creating the actual
/// device.
///
/// Feature structs are kept as concrete fields and chained together when the device is built, so every
/// struct lives exactly as long as the create info that points to it.
pub struct DeviceBuilder {
    ///Instance based on which the device is created
    pub instance: Arc<Instance>,
    ///The physical device from which this will be an abstraction
    pub physical_device: vk::PhysicalDevice,
    ///Extensions the physical device reports.
    pub available_extensions: Vec<CString>,
    ///Queue family index, and properties of all queues that will be created.
    pub queues: Vec<QueueBuilder>,
    ///Device extensions that are enabled.
    pub device_extensions: Vec<&'static CStr>,

    pub features: vk::PhysicalDeviceFeatures,
    pub features12: vk::PhysicalDeviceVulkan12Features<'static>,
    pub features13: vk::PhysicalDeviceVulkan13Features<'static>,
    pub acceleration_structure: Option<vk::PhysicalDeviceAccelerationStructureFeaturesKHR<'static>>,
    pub ray_tracing_pipeline: Option<vk::PhysicalDeviceRayTracingPipelineFeaturesKHR<'static>>,
}

impl DeviceBuilder {
    pub fn supports_extension(&self, name: &CStr) -> bool {
        self.available_extensions.iter().any(|e| e.as_c_str() == name)
    }

    ///Checks that all device extensions are supported.
    fn check_extensions(&self) -> Result<(), DeviceError> {
        #[cfg(feature = "logging")]
        {
            log::trace!("Supported extensions");
            for ext in self.available_extensions.iter() {
                log::trace!("  {:?}", ext);
            }
        }

        for ext in self.device_extensions.iter() {
            if !self.supports_extension(ext) {
                return Err(DeviceError::UnsupportedExtension(
                    ext.to_string_lossy().into_owned(),
                ));
            }
        }

        Ok(())
    }

    ///Allows changing `self` builder style
    pub fn with(mut self, mut mapping: impl FnMut(&mut DeviceBuilder)) -> Self {
        mapping(&mut self);
        self
    }

    ///Pushes the new extension, if it was not pushed yet. The name is usually obtained from the extensions definition like this:
    ///```ignore
    ///  builder.push_extension(ash::khr::ray_tracing_pipeline::NAME);
    ///```
    pub fn push_extension(mut self, ext_name: &'static CStr) -> Self {
        if !self.device_extensions.contains(&ext_name) {
            self.device_extensions.push(ext_name);
        }
        self
    }

    pub fn build(self) -> Result<Arc<Device>, DeviceError> {
        self.check_extensions()?;

        let DeviceBuilder {
            instance,
            physical_device,
            available_extensions: _,
            queues,
            device_extensions,
            features,
            mut features12,
            mut features13,
            mut acceleration_structure,
            mut ray_tracing_pipeline,
        } = self;

        if queues.is_empty() {
            return Err(DeviceError::NoQueue(vk::QueueFlags::empty()));
        }

        let queue_create_infos = queues
            .iter()
            .map(|q| q.as_create_info())
            .collect::<Vec<_>>();
        let extension_ptrs = device_extensions
            .iter()
            .map(|e| e.as_ptr())
            .collect::<Vec<_>>();

        let mut features2 = vk::PhysicalDeviceFeatures2::default().features(features);
        let mut create_info = vk::DeviceCreateInfo::default()
            .enabled_extension_names(&extension_ptrs)
            .queue_create_infos(&queue_create_infos)
            .push_next(&mut features2)
            .push_next(&mut features12)
            .push_next(&mut features13);
        if let Some(accel) = acceleration_structure.as_mut() {
            create_info = create_info.push_next(accel);
        }
        if let Some(rt) = ray_tracing_pipeline.as_mut() {
            create_info = create_info.push_next(rt);
        }

        #[cfg(feature = "logging")]
        {
            log::info!("Device creation:");
            for e in &device_extensions {
                log::info!("  Extension {:?}", e);
            }
        }

        unsafe {
            Device::new_from_info(
                instance,
                physical_device,
                &create_info,
                &queues,
                &device_extensions,
            )
        }
    }
}

///Thin device abstraction that keeps the underlying instance (and therefore entrypoint) alive
/// and takes care of device destruction once its dropped.
///
/// Extension loaders for the ray tracing extensions are created if those extensions were enabled.
pub struct Device {
    ///The raw ash device
    pub inner: ash::Device,
    pub instance: Arc<Instance>,
    pub physical_device: vk::PhysicalDevice,
    pub queues: Vec<Queue>,
    pub enabled_extensions: Vec<&'static CStr>,
    pub acceleration_structure: Option<ash::khr::acceleration_structure::Device>,
    pub ray_tracing_pipeline: Option<ash::khr::ray_tracing_pipeline::Device>,
}

impl Device {
    ///Creates the device from an already created instance and physical device, using
    /// the supplied create info.
    ///
    /// # Safety
    /// The queue families of `queue_builder` must match the create info, and `extensions` must be the extensions enabled in it.
    pub unsafe fn new_from_info(
        instance: Arc<Instance>,
        physical_device: vk::PhysicalDevice,
        device_create_info: &vk::DeviceCreateInfo,
        queue_builder: &[QueueBuilder],
        extensions: &[&'static CStr],
    ) -> Result<Arc<Self>, DeviceError> {
        let device = unsafe {
            instance
                .inner
                .create_device(physical_device, device_create_info, None)?
        };

        let queues = queue_builder
            .iter()
            .flat_map(|queue_family| {
                (0..queue_family.priorities.len()).map(|queue_index| Queue {
                    family_index: queue_family.family_index,
                    properties: queue_family.properties,
                    inner: unsafe {
                        device.get_device_queue(queue_family.family_index, queue_index as u32)
                    },
                })
            })
            .collect();

        let acceleration_structure = extensions
            .contains(&ash::khr::acceleration_structure::NAME)
            .then(|| ash::khr::acceleration_structure::Device::new(&instance.inner, &device));
        let ray_tracing_pipeline = extensions
            .contains(&ash::khr::ray_tracing_pipeline::NAME)
            .then(|| ash::khr::ray_tracing_pipeline::Device::new(&instance.inner, &device));

        Ok(Arc::new(Device {
            inner: device,
            instance,
            physical_device,
            queues,
            enabled_extensions: extensions.to_vec(),
            acceleration_structure,
            ray_tracing_pipeline,
        }))
    }

    ///Returns the first queue for the given family, if there is any.
    pub fn get_first_queue_for_family(&self, family: u32) -> Option<&Queue> {
        self.queues.iter().find(|q| q.family_index == family)
    }

    ///Returns the first queue that supports all `flags`.
    pub fn first_queue(&self, flags: vk::QueueFlags) -> Result<&Queue, DeviceError> {
        self.queues
            .iter()
            .find(|q| q.supports(flags))
            .ok_or(DeviceError::NoQueue(flags))
    }

    pub fn is_extension_enabled(&self, name: &CStr) -> bool {
        self.enabled_extensions.contains(&name)
    }

    ///Blocks until the device is idle. Errors are only logged, since this is usually called on teardown.
    pub fn wait_idle(&self) {
        if let Err(e) = unsafe { self.inner.device_wait_idle() } {
            #[cfg(feature = "logging")]
            log::error!("Failed to wait for device idle: {}", e);
            #[cfg(not(feature = "logging"))]
            let _ = e;
        }
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        self.wait_idle();
        unsafe { self.inner.destroy_device(None) };
    }
}
