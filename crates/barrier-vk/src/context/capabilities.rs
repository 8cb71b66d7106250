use ash::vk;

use super::{Instance, PhyDeviceProperties};

///Everything the barrier cases need to know about a device before creating any resource.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub device_name: String,
    pub acceleration_structure_extension: bool,
    pub ray_tracing_pipeline_extension: bool,
    ///`VK_KHR_deferred_host_operations`, required by the acceleration structure extension.
    pub deferred_host_operations_extension: bool,
    pub acceleration_structure: bool,
    pub ray_tracing_pipeline: bool,
    pub fragment_stores_and_atomics: bool,
    pub buffer_device_address: bool,
    pub synchronization2: bool,
    pub shader_group_handle_size: u32,
    pub shader_group_base_alignment: u32,
    pub min_scratch_alignment: u32,
}

impl DeviceCapabilities {
    pub fn query(instance: &Instance, device: &PhyDeviceProperties) -> Self {
        let phy = device.phydev;
        let acceleration_structure_extension =
            device.supports_extension(ash::khr::acceleration_structure::NAME);
        let ray_tracing_pipeline_extension =
            device.supports_extension(ash::khr::ray_tracing_pipeline::NAME);
        let deferred_host_operations_extension =
            device.supports_extension(ash::khr::deferred_host_operations::NAME);

        let features = unsafe { instance.inner.get_physical_device_features(phy) };
        let features12: vk::PhysicalDeviceVulkan12Features = instance.get_feature(&phy);
        let features13: vk::PhysicalDeviceVulkan13Features = instance.get_feature(&phy);

        let mut caps = DeviceCapabilities {
            device_name: device.device_name(),
            acceleration_structure_extension,
            ray_tracing_pipeline_extension,
            deferred_host_operations_extension,
            fragment_stores_and_atomics: features.fragment_stores_and_atomics == vk::TRUE,
            buffer_device_address: features12.buffer_device_address == vk::TRUE,
            synchronization2: features13.synchronization2 == vk::TRUE,
            ..Default::default()
        };

        if acceleration_structure_extension {
            let accel: vk::PhysicalDeviceAccelerationStructureFeaturesKHR =
                instance.get_feature(&phy);
            caps.acceleration_structure = accel.acceleration_structure == vk::TRUE;
            let accel_props: vk::PhysicalDeviceAccelerationStructurePropertiesKHR =
                instance.get_property(&phy);
            caps.min_scratch_alignment =
                accel_props.min_acceleration_structure_scratch_offset_alignment;
        }
        if ray_tracing_pipeline_extension {
            let rt: vk::PhysicalDeviceRayTracingPipelineFeaturesKHR = instance.get_feature(&phy);
            caps.ray_tracing_pipeline = rt.ray_tracing_pipeline == vk::TRUE;
            let rt_props: vk::PhysicalDeviceRayTracingPipelinePropertiesKHR =
                instance.get_property(&phy);
            caps.shader_group_handle_size = rt_props.shader_group_handle_size;
            caps.shader_group_base_alignment = rt_props.shader_group_base_alignment;
        }

        caps
    }

    ///True if every extension a ray tracing device needs is present.
    pub fn has_ray_tracing_extensions(&self) -> bool {
        self.acceleration_structure_extension
            && self.ray_tracing_pipeline_extension
            && self.deferred_host_operations_extension
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rt_device() -> DeviceCapabilities {
        DeviceCapabilities {
            acceleration_structure_extension: true,
            ray_tracing_pipeline_extension: true,
            deferred_host_operations_extension: true,
            acceleration_structure: true,
            ray_tracing_pipeline: true,
            buffer_device_address: true,
            synchronization2: true,
            shader_group_handle_size: 32,
            shader_group_base_alignment: 64,
            min_scratch_alignment: 128,
            ..Default::default()
        }
    }

    #[test]
    fn ray_tracing_needs_all_extensions() {
        assert!(rt_device().has_ray_tracing_extensions());
        let caps = DeviceCapabilities {
            deferred_host_operations_extension: false,
            ..rt_device()
        };
        assert!(!caps.has_ray_tracing_extensions());
        assert!(!DeviceCapabilities::default().has_ray_tracing_extensions());
    }

    #[test]
    fn extensions_do_not_imply_features() {
        let caps = DeviceCapabilities {
            ray_tracing_pipeline: false,
            ..rt_device()
        };
        assert!(caps.has_ray_tracing_extensions());
    }
}
