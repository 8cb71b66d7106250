use std::{ffi::CString, sync::Arc};

use ash::vk;

use super::{DeviceBuilder, Instance, QueueBuilder};

///Collection off all properties for this physical device. Can be used to easily create a [DeviceBuilder](DeviceBuilder).
/// Is usually acquired from a [PhysicalDeviceFilter](PhysicalDeviceFilter), or by using `new`.
pub struct PhyDeviceProperties {
    pub phydev: vk::PhysicalDevice,
    pub properties: vk::PhysicalDeviceProperties,
    pub queue_properties: Vec<(usize, vk::QueueFamilyProperties)>,
    ///Names of all device extensions the device reports.
    pub extensions: Vec<CString>,
}

impl PhyDeviceProperties {
    ///Creates Self from just a physical device definition. Fills in `queue_properties` with all available properties.
    pub fn new(instance: &ash::Instance, physical_device: vk::PhysicalDevice) -> Self {
        let properties = unsafe { instance.get_physical_device_properties(physical_device) };
        let queues =
            unsafe { instance.get_physical_device_queue_family_properties(physical_device) };
        let extensions =
            unsafe { instance.enumerate_device_extension_properties(physical_device) }
                .unwrap_or_default()
                .iter()
                .filter_map(|ext| ext.extension_name_as_c_str().ok().map(|n| n.to_owned()))
                .collect();

        PhyDeviceProperties {
            phydev: physical_device,
            properties,
            queue_properties: queues.into_iter().enumerate().collect(),
            extensions,
        }
    }

    pub fn supports_extension(&self, name: &std::ffi::CStr) -> bool {
        self.extensions.iter().any(|e| e.as_c_str() == name)
    }

    pub fn device_name(&self) -> String {
        self.properties
            .device_name_as_c_str()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|_| String::from("unknown device"))
    }

    ///Creates a device builder for this physical device. Only the first queue family that contains `queue_flags` is
    /// created, with a single queue.
    pub fn into_device_builder(
        self,
        instance: Arc<Instance>,
        queue_flags: vk::QueueFlags,
    ) -> DeviceBuilder {
        let queues = self
            .queue_properties
            .iter()
            .find(|(_, q)| q.queue_flags.contains(queue_flags))
            .map(|(idx, properties)| QueueBuilder {
                family_index: *idx as u32,
                properties: *properties,
                priorities: vec![1.0],
            })
            .into_iter()
            .collect();

        DeviceBuilder {
            instance,
            physical_device: self.phydev,
            available_extensions: self.extensions,
            queues,
            device_extensions: Vec::new(),
            features: vk::PhysicalDeviceFeatures::default(),
            features12: vk::PhysicalDeviceVulkan12Features::default(),
            features13: vk::PhysicalDeviceVulkan13Features::default(),
            acceleration_structure: None,
            ray_tracing_pipeline: None,
        }
    }
}

///Filter that lets you select a sub-set of all physical devices.
/// use [ash::Instance::enumerate_physical_devices](ash::Instance::enumerate_physical_devices) to get a list of all devices
/// and [PhysicalDeviceFilter::new](PhysicalDeviceFilter::new) to create this filter.
pub struct PhysicalDeviceFilter {
    ///All available devices.
    pub pdevices: Vec<PhyDeviceProperties>,
}

impl PhysicalDeviceFilter {
    pub fn new(instance: &ash::Instance, phydevices: Vec<vk::PhysicalDevice>) -> Self {
        PhysicalDeviceFilter {
            pdevices: phydevices
                .into_iter()
                .map(|phy| PhyDeviceProperties::new(instance, phy))
                .collect(),
        }
    }

    ///removes all devices that do not contain a queue with the given flags
    pub fn filter_queue_flags(mut self, flags: vk::QueueFlags) -> Self {
        self.pdevices.retain(|dev| {
            dev.queue_properties.iter().any(|(_idx, f)| {
                #[cfg(feature = "logging")]
                log::trace!("Checking {:?} for {:?}", f.queue_flags, flags);
                f.queue_flags.contains(flags)
            })
        });

        self
    }

    ///removes all devices that report an api version below `major.minor`.
    pub fn filter_api_version(mut self, major: u32, minor: u32) -> Self {
        self.pdevices.retain(|dev| {
            let version = dev.properties.api_version;
            let keep = (vk::api_version_major(version), vk::api_version_minor(version))
                >= (major, minor);
            #[cfg(feature = "logging")]
            {
                if !keep {
                    log::info!(
                        "Ignoring {}, it only supports Vulkan {}.{}",
                        dev.device_name(),
                        vk::api_version_major(version),
                        vk::api_version_minor(version)
                    );
                }
            }
            keep
        });
        self
    }

    ///Custom filter on the cached properties
    pub fn filter<F>(mut self, filter: F) -> Self
    where
        F: FnMut(&PhyDeviceProperties) -> bool,
    {
        self.pdevices = self.pdevices.into_iter().filter(filter).collect();
        self
    }

    ///Sorts the devices so that discrete GPUs come first, followed by integrated ones.
    pub fn sort_by_type(mut self) -> Self {
        fn rank(ty: vk::PhysicalDeviceType) -> u8 {
            match ty {
                vk::PhysicalDeviceType::DISCRETE_GPU => 0,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
                vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
                vk::PhysicalDeviceType::CPU => 3,
                _ => 4,
            }
        }
        self.pdevices
            .sort_by_key(|dev| rank(dev.properties.device_type));
        self
    }

    ///Releases the current filtered physical devices and queues. You can use [into_device_builder](PhyDeviceProperties::into_device_builder) to start and create an abstract device for these.
    pub fn release(self) -> Vec<PhyDeviceProperties> {
        self.pdevices
    }
}
