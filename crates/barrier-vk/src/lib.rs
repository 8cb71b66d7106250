//! # barrier-vk
//!
//! Transparent wrappers around the Vulkan objects a barrier test touches. This includes the
//! [Instance](context::Instance), [Device](context::Device) and every lifetime sensitive resource a case creates:
//! buffers, images, descriptor sets, pipelines, shader binding tables and acceleration structures. The wrappers keep
//! track of their parents and destroy themselves when dropped.
//!
//! Structures that are not sensitive to lifetime requirements (like create info) are not wrapped.
//!
//! All device work assumes Vulkan 1.3. Barriers are recorded with `synchronization2`, which is only enabled if the
//! device reports it. Ray tracing objects additionally need the
//! `VK_KHR_acceleration_structure` and `VK_KHR_ray_tracing_pipeline` extensions to be enabled on the device.

pub use ash;
#[cfg(feature = "default_allocator")]
pub use gpu_allocator;

///Allocator related details. Resources are generic over an allocator (usually the `A` parameter on the
/// [Ctx](context::Ctx)).
pub mod allocator;

///[Instance](context::Instance) and [Device](context::Device) creation, device selection and the capability query.
/// Also includes the [Ctx](context::Ctx) struct bundling device, queue and allocator.
pub mod context;

///Allocatable and pipeline resources.
pub mod resources;

///Vulkan synchronisation primitives
pub mod sync;

mod error;
pub use error::{
    AccelerationStructureError, AllocationError, BufferMapError, CommandBufferError,
    DescriptorError, DeviceError, HarnessError, InstanceError, PipelineError, ResourceError,
    ShaderError,
};
