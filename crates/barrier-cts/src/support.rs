use barrier_matrix::{Stage, TestCase};
use barrier_vk::{context::DeviceCapabilities, HarnessError};

///Checks that the device can run `case`. Runs before any resource is created.
///
/// Missing functionality is reported as [HarnessError::NotSupported]. A device that exposes
/// `VK_KHR_acceleration_structure` but not the `accelerationStructure` feature violates the extension and is reported
/// as [HarnessError::Internal].
pub fn check_support(case: &TestCase, caps: &DeviceCapabilities) -> Result<(), HarnessError> {
    //every barrier is recorded with vkCmdPipelineBarrier2
    if !caps.synchronization2 {
        return Err(HarnessError::NotSupported(
            "synchronization2 is not supported".to_owned(),
        ));
    }

    if case.writer == Stage::Fragment && !caps.fragment_stores_and_atomics {
        return Err(HarnessError::NotSupported(
            "Fragment shader does not support stores".to_owned(),
        ));
    }

    if case.involves_ray_tracing() {
        for (present, name) in [
            (
                caps.acceleration_structure_extension,
                "VK_KHR_acceleration_structure",
            ),
            (
                caps.ray_tracing_pipeline_extension,
                "VK_KHR_ray_tracing_pipeline",
            ),
            (
                caps.deferred_host_operations_extension,
                "VK_KHR_deferred_host_operations",
            ),
        ] {
            if !present {
                return Err(HarnessError::NotSupported(format!(
                    "{} is not supported",
                    name
                )));
            }
        }

        if !caps.ray_tracing_pipeline {
            return Err(HarnessError::NotSupported(
                "Ray Tracing pipelines not supported".to_owned(),
            ));
        }

        if !caps.acceleration_structure {
            return Err(HarnessError::Internal(
                "VK_KHR_acceleration_structure supported without accelerationStructure support"
                    .to_owned(),
            ));
        }

        if !caps.buffer_device_address {
            return Err(HarnessError::NotSupported(
                "bufferDeviceAddress is not supported".to_owned(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ray_tracing_device() -> DeviceCapabilities {
        DeviceCapabilities {
            device_name: "test".to_owned(),
            acceleration_structure_extension: true,
            ray_tracing_pipeline_extension: true,
            deferred_host_operations_extension: true,
            acceleration_structure: true,
            ray_tracing_pipeline: true,
            fragment_stores_and_atomics: true,
            buffer_device_address: true,
            synchronization2: true,
            shader_group_handle_size: 32,
            shader_group_base_alignment: 64,
            min_scratch_alignment: 128,
        }
    }

    fn case(path: &str) -> TestCase {
        TestCase::from_path(path).unwrap()
    }

    #[test]
    fn full_device_supports_everything() {
        let caps = ray_tracing_device();
        for path in [
            "barrier.ssbo.memory_barrier.from_frag_to_rgen",
            "barrier.simg.specific_barrier.from_isec_to_xfer",
            "barrier.ubo.specific_barrier.from_host_to_call",
        ] {
            assert!(check_support(&case(path), &caps).is_ok(), "{path}");
        }
    }

    #[test]
    fn fragment_writer_needs_stores() {
        let caps = DeviceCapabilities {
            fragment_stores_and_atomics: false,
            ..ray_tracing_device()
        };
        let err = check_support(&case("barrier.ssbo.memory_barrier.from_frag_to_rgen"), &caps)
            .unwrap_err();
        assert!(err.is_not_supported());

        //reading in a fragment shader does not need the feature
        assert!(check_support(&case("barrier.ssbo.memory_barrier.from_rgen_to_frag"), &caps).is_ok());
    }

    #[test]
    fn missing_extension_skips() {
        let caps = DeviceCapabilities {
            ray_tracing_pipeline_extension: false,
            ..ray_tracing_device()
        };
        let err = check_support(&case("barrier.ssbo.memory_barrier.from_comp_to_miss"), &caps)
            .unwrap_err();
        assert!(err.is_not_supported());
        assert!(err.to_string().contains("VK_KHR_ray_tracing_pipeline"));

        let caps = DeviceCapabilities {
            ray_tracing_pipeline: false,
            ..ray_tracing_device()
        };
        assert!(check_support(&case("barrier.ssbo.memory_barrier.from_comp_to_miss"), &caps)
            .unwrap_err()
            .is_not_supported());
    }

    #[test]
    fn missing_synchronization2_skips_every_case() {
        let caps = DeviceCapabilities {
            synchronization2: false,
            ..ray_tracing_device()
        };
        for path in [
            "barrier.ssbo.memory_barrier.from_comp_to_rgen",
            "barrier.simg.specific_barrier.from_xfer_to_isec",
            "barrier.ssbo.memory_barrier.from_host_to_xfer",
        ] {
            let err = check_support(&case(path), &caps).unwrap_err();
            assert!(err.is_not_supported(), "{path}");
            assert!(err.to_string().contains("synchronization2"));
        }
    }

    #[test]
    fn extension_without_feature_is_internal() {
        let caps = DeviceCapabilities {
            acceleration_structure: false,
            ..ray_tracing_device()
        };
        let err = check_support(&case("barrier.ssbo.memory_barrier.from_ahit_to_host"), &caps)
            .unwrap_err();
        assert!(matches!(err, HarnessError::Internal(_)));
    }

    #[test]
    fn non_ray_tracing_cases_ignore_ray_tracing() {
        let caps = DeviceCapabilities {
            fragment_stores_and_atomics: true,
            synchronization2: true,
            ..Default::default()
        };
        assert!(check_support(&case("barrier.ssbo.memory_barrier.from_host_to_xfer"), &caps).is_ok());
        assert!(check_support(&case("barrier.ssbo.memory_barrier.from_rgen_to_xfer"), &caps)
            .unwrap_err()
            .is_not_supported());
    }
}
