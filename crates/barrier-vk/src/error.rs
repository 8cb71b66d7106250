use std::{error::Error, ffi::CString};

use ash::{vk, LoadingError};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum InstanceError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Failed to load Vulkan entry point: {0}")]
    EntryLoading(#[from] LoadingError),
    #[error("Instance extension {0:?} is not available")]
    MissingExtension(CString),
    #[error("Instance layer {0:?} is not available")]
    MissingLayer(CString),
}

#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Extension {0} is not supported by device")]
    UnsupportedExtension(String),
    #[error("No physical device found. Is a Vulkan capable GPU and driver installed?")]
    NoPhysicalDevice,
    #[error("No queue family supports {0:?}")]
    NoQueue(vk::QueueFlags),
    #[error("GpuAllocator error: {0}")]
    GpuAllocatorError(#[from] Box<dyn Error + Send + Sync + 'static>),
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
}

#[derive(Error, Debug)]
pub enum AllocationError {
    #[error("Allocator error: {0}")]
    Allocator(Box<dyn Error + Send + Sync + 'static>),
    #[error("Allocator lock is poisoned")]
    Poisoned,
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
}

#[derive(Error, Debug)]
pub enum BufferMapError {
    #[error("Supplied offset bigger then buffer")]
    OffsetTooLarge,
    #[error("Mapped buffer is partially written. {written} / {size}")]
    PartialyWritten { written: usize, size: usize },
    #[error("Buffer can not be mapped")]
    NotMapable,
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
}

#[derive(Error, Debug)]
pub enum ResourceError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Allocation error: {0}")]
    Allocation(#[from] AllocationError),
    #[error("Mapping error: {0}")]
    Map(#[from] BufferMapError),
    #[error("Buffer {0:?} has no device address, was it created with SHADER_DEVICE_ADDRESS?")]
    NoDeviceAddress(vk::Buffer),
}

#[derive(Error, Debug)]
pub enum ShaderError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Filesystem error: {0}")]
    FileError(#[from] std::io::Error),
    #[error("No SPIR-V binary for program {0}")]
    MissingProgram(String),
    #[error("Compiling {name} failed: {message}")]
    Compilation { name: String, message: String },
}

#[derive(Error, Debug)]
pub enum CommandBufferError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Command pool is not resettable")]
    PoolNotResetable,
    #[error("Submitting to queue failed with {0}")]
    SubmitFailed(vk::Result),
    #[error("Failed to allocate command buffer. Requested {count}, got {allocated}")]
    FailedToAllocate { allocated: usize, count: usize },
    #[error("Image is in layout {found:?}, but the barrier expects {expected:?}")]
    LayoutMismatch {
        expected: vk::ImageLayout,
        found: vk::ImageLayout,
    },
    #[error("Barrier of scope {0} can not be applied to this resource")]
    InvalidBarrierScope(&'static str),
}

#[derive(Error, Debug)]
pub enum DescriptorError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Failed to allocate Descriptors from pool. Requested {requested} got {count}")]
    Allocation { requested: usize, count: usize },
    #[error("Descriptorset can't be freed")]
    UnFreeable,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Failed to allocate pipeline")]
    Allocation,
    #[error("Ray tracing pipeline has no {0} group")]
    MissingGroup(&'static str),
    #[error("Device extension {0} is not loaded")]
    ExtensionNotLoaded(&'static str),
    #[error("Shader error: {0}")]
    Shader(#[from] ShaderError),
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),
}

#[derive(Error, Debug)]
pub enum AccelerationStructureError {
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),
    #[error("Command error: {0}")]
    Command(#[from] CommandBufferError),
    #[error("Acceleration structure extension is not loaded")]
    NotLoaded,
}

///Umbrella error of everything the harness does on a device.
#[derive(Error, Debug)]
pub enum HarnessError {
    ///The device lacks something the case needs. The case is skipped, not failed.
    #[error("Not supported: {0}")]
    NotSupported(String),
    ///The harness itself is inconsistent. Reported as failure.
    #[error("Internal error: {0}")]
    Internal(String),
    #[error("Instance error: {0}")]
    InstanceError(#[from] InstanceError),
    #[error("Device error: {0}")]
    DeviceError(#[from] DeviceError),
    #[error("Allocation error: {0}")]
    AllocationError(#[from] AllocationError),
    #[error("Resource error: {0}")]
    ResourceError(#[from] ResourceError),
    #[error("Mapping error: {0}")]
    BufferMapError(#[from] BufferMapError),
    #[error("Shader/ShaderModule error: {0}")]
    ShaderError(#[from] ShaderError),
    #[error("CommandBuffer error: {0}")]
    CommandBufferError(#[from] CommandBufferError),
    #[error("Desriptor error: {0}")]
    DescriptorError(#[from] DescriptorError),
    #[error("Pipeline error: {0}")]
    PipelineError(#[from] PipelineError),
    #[error("Acceleration structure error: {0}")]
    AccelerationStructureError(#[from] AccelerationStructureError),
    #[error("Vulkan error: {0}")]
    VkError(#[from] vk::Result),
}

impl HarnessError {
    pub fn is_not_supported(&self) -> bool {
        matches!(self, HarnessError::NotSupported(_))
    }
}

#[cfg(test)]
mod test {
    use static_assertions::assert_impl_all;

    use super::*;

    #[test]
    fn assure_send_sync() {
        assert_impl_all!(InstanceError: Send, Sync);
        assert_impl_all!(DeviceError: Send, Sync);
        assert_impl_all!(AllocationError: Send, Sync);
        assert_impl_all!(ResourceError: Send, Sync);
        assert_impl_all!(ShaderError: Send, Sync);
        assert_impl_all!(CommandBufferError: Send, Sync);
        assert_impl_all!(DescriptorError: Send, Sync);
        assert_impl_all!(PipelineError: Send, Sync);
        assert_impl_all!(AccelerationStructureError: Send, Sync);
        assert_impl_all!(HarnessError: Send, Sync);
    }

    #[test]
    fn not_supported_is_distinct() {
        assert!(HarnessError::NotSupported("rayTracingPipeline".into()).is_not_supported());
        assert!(!HarnessError::Internal("layout".into()).is_not_supported());
        assert!(!HarnessError::from(vk::Result::ERROR_DEVICE_LOST).is_not_supported());
    }
}
