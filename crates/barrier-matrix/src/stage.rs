//! Stages, resource kinds and barrier types as well as the tables that map them
//! to Vulkan synchronization scopes.
//!
//! Every table is an exhaustive `match`, so adding a stage fails to compile until each table
//! knows about it.

use ash::vk;

///Every point in a submission that can either produce or consume the test values.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Host,
    Transfer,
    Raygen,
    Intersect,
    AnyHit,
    ClosestHit,
    Miss,
    Callable,
    Compute,
    Fragment,
}

impl Stage {
    ///All stages in table order. Case enumeration iterates in this order.
    pub const ALL: [Stage; 10] = [
        Stage::Host,
        Stage::Transfer,
        Stage::Raygen,
        Stage::Intersect,
        Stage::AnyHit,
        Stage::ClosestHit,
        Stage::Miss,
        Stage::Callable,
        Stage::Compute,
        Stage::Fragment,
    ];

    ///Short name used in case paths.
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Host => "host",
            Stage::Transfer => "xfer",
            Stage::Raygen => "rgen",
            Stage::Intersect => "isec",
            Stage::AnyHit => "ahit",
            Stage::ClosestHit => "chit",
            Stage::Miss => "miss",
            Stage::Callable => "call",
            Stage::Compute => "comp",
            Stage::Fragment => "frag",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }

    ///True for the six stages of a ray tracing pipeline.
    pub fn is_ray_tracing(&self) -> bool {
        match self {
            Stage::Raygen
            | Stage::Intersect
            | Stage::AnyHit
            | Stage::ClosestHit
            | Stage::Miss
            | Stage::Callable => true,
            Stage::Host | Stage::Transfer | Stage::Compute | Stage::Fragment => false,
        }
    }

    ///True if the stage runs shader code on the device.
    pub fn is_shader(&self) -> bool {
        self.shader_stage().is_some()
    }

    ///Stages that are only reached by tracing rays (or calling callables) from an auxiliary raygen
    /// shader and therefore need a top level acceleration structure bound.
    pub fn needs_acceleration_structure(&self) -> bool {
        match self {
            Stage::Intersect | Stage::AnyHit | Stage::ClosestHit | Stage::Miss | Stage::Callable => {
                true
            }
            Stage::Host | Stage::Transfer | Stage::Raygen | Stage::Compute | Stage::Fragment => {
                false
            }
        }
    }

    ///Pipeline stage that contains this stage's accesses.
    pub fn pipeline_stage(&self) -> vk::PipelineStageFlags2 {
        match self {
            Stage::Host => vk::PipelineStageFlags2::HOST,
            Stage::Transfer => vk::PipelineStageFlags2::TRANSFER,
            Stage::Raygen
            | Stage::Intersect
            | Stage::AnyHit
            | Stage::ClosestHit
            | Stage::Miss
            | Stage::Callable => vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
            Stage::Compute => vk::PipelineStageFlags2::COMPUTE_SHADER,
            Stage::Fragment => vk::PipelineStageFlags2::FRAGMENT_SHADER,
        }
    }

    ///Access mask of this stage when it produces the values.
    pub fn writer_access(&self) -> vk::AccessFlags2 {
        match self {
            Stage::Host => vk::AccessFlags2::HOST_WRITE,
            Stage::Transfer => vk::AccessFlags2::TRANSFER_WRITE,
            Stage::Raygen
            | Stage::Intersect
            | Stage::AnyHit
            | Stage::ClosestHit
            | Stage::Miss
            | Stage::Callable
            | Stage::Compute
            | Stage::Fragment => vk::AccessFlags2::SHADER_WRITE,
        }
    }

    ///Access mask of this stage when it consumes the values of a `resource`.
    pub fn reader_access(&self, resource: ResourceKind) -> vk::AccessFlags2 {
        match self {
            Stage::Host => vk::AccessFlags2::HOST_READ,
            Stage::Transfer => vk::AccessFlags2::TRANSFER_READ,
            Stage::Raygen
            | Stage::Intersect
            | Stage::AnyHit
            | Stage::ClosestHit
            | Stage::Miss
            | Stage::Callable
            | Stage::Compute
            | Stage::Fragment => match resource {
                ResourceKind::UniformBuffer => vk::AccessFlags2::UNIFORM_READ,
                ResourceKind::StorageBuffer | ResourceKind::StorageImage => {
                    vk::AccessFlags2::SHADER_READ
                }
            },
        }
    }

    ///The single shader stage bit of this stage. `None` for stages that do not run shader code.
    pub fn shader_stage(&self) -> Option<vk::ShaderStageFlags> {
        match self {
            Stage::Host | Stage::Transfer => None,
            Stage::Raygen => Some(vk::ShaderStageFlags::RAYGEN_KHR),
            Stage::Intersect => Some(vk::ShaderStageFlags::INTERSECTION_KHR),
            Stage::AnyHit => Some(vk::ShaderStageFlags::ANY_HIT_KHR),
            Stage::ClosestHit => Some(vk::ShaderStageFlags::CLOSEST_HIT_KHR),
            Stage::Miss => Some(vk::ShaderStageFlags::MISS_KHR),
            Stage::Callable => Some(vk::ShaderStageFlags::CALLABLE_KHR),
            Stage::Compute => Some(vk::ShaderStageFlags::COMPUTE),
            Stage::Fragment => Some(vk::ShaderStageFlags::FRAGMENT),
        }
    }

    ///Every shader stage a pipeline exercising this stage contains. Ray tracing stages other
    /// than raygen are driven by an auxiliary raygen shader, fragment work needs a vertex stage.
    pub fn stage_flags(&self) -> vk::ShaderStageFlags {
        match self {
            Stage::Host | Stage::Transfer => vk::ShaderStageFlags::empty(),
            Stage::Raygen => vk::ShaderStageFlags::RAYGEN_KHR,
            Stage::Intersect => {
                vk::ShaderStageFlags::RAYGEN_KHR | vk::ShaderStageFlags::INTERSECTION_KHR
            }
            Stage::AnyHit => vk::ShaderStageFlags::RAYGEN_KHR | vk::ShaderStageFlags::ANY_HIT_KHR,
            Stage::ClosestHit => {
                vk::ShaderStageFlags::RAYGEN_KHR | vk::ShaderStageFlags::CLOSEST_HIT_KHR
            }
            Stage::Miss => vk::ShaderStageFlags::RAYGEN_KHR | vk::ShaderStageFlags::MISS_KHR,
            Stage::Callable => {
                vk::ShaderStageFlags::RAYGEN_KHR | vk::ShaderStageFlags::CALLABLE_KHR
            }
            Stage::Compute => vk::ShaderStageFlags::COMPUTE,
            Stage::Fragment => vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT,
        }
    }

    ///Layout a reader at this stage expects an image in. The host never reads images.
    pub fn optimal_read_layout(&self) -> Option<vk::ImageLayout> {
        match self {
            Stage::Host => None,
            Stage::Transfer => Some(vk::ImageLayout::TRANSFER_SRC_OPTIMAL),
            Stage::Raygen
            | Stage::Intersect
            | Stage::AnyHit
            | Stage::ClosestHit
            | Stage::Miss
            | Stage::Callable
            | Stage::Compute
            | Stage::Fragment => Some(vk::ImageLayout::GENERAL),
        }
    }

    ///Which pipeline kind executes the stage's shaders.
    pub fn pipeline_kind(&self) -> Option<PipelineKind> {
        match self {
            Stage::Host | Stage::Transfer => None,
            Stage::Raygen
            | Stage::Intersect
            | Stage::AnyHit
            | Stage::ClosestHit
            | Stage::Miss
            | Stage::Callable => Some(PipelineKind::RayTracing),
            Stage::Compute => Some(PipelineKind::Compute),
            Stage::Fragment => Some(PipelineKind::Graphics),
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

///Pipeline type a shader stage is executed on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PipelineKind {
    Compute,
    Graphics,
    RayTracing,
}

///The resource the values travel through between writer and reader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ResourceKind {
    UniformBuffer,
    StorageBuffer,
    StorageImage,
}

impl ResourceKind {
    pub const ALL: [ResourceKind; 3] = [
        ResourceKind::UniformBuffer,
        ResourceKind::StorageBuffer,
        ResourceKind::StorageImage,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ResourceKind::UniformBuffer => "ubo",
            ResourceKind::StorageBuffer => "ssbo",
            ResourceKind::StorageImage => "simg",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|r| r.name() == name)
    }

    pub fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            ResourceKind::UniformBuffer => vk::DescriptorType::UNIFORM_BUFFER,
            ResourceKind::StorageBuffer => vk::DescriptorType::STORAGE_BUFFER,
            ResourceKind::StorageImage => vk::DescriptorType::STORAGE_IMAGE,
        }
    }

    pub fn is_buffer(&self) -> bool {
        match self {
            ResourceKind::UniformBuffer | ResourceKind::StorageBuffer => true,
            ResourceKind::StorageImage => false,
        }
    }
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

///Form of the single barrier placed between writer and reader.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BarrierType {
    ///Global memory barrier, no resource and no layout change.
    General,
    ///Buffer or image barrier on exactly the tested resource.
    Specific,
}

impl BarrierType {
    pub const ALL: [BarrierType; 2] = [BarrierType::General, BarrierType::Specific];

    pub fn name(&self) -> &'static str {
        match self {
            BarrierType::General => "memory_barrier",
            BarrierType::Specific => "specific_barrier",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }
}

impl std::fmt::Display for BarrierType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(Stage: Send, Sync, Copy);
        assert_impl_all!(ResourceKind: Send, Sync, Copy);
        assert_impl_all!(BarrierType: Send, Sync, Copy);
    }

    #[test]
    fn single_pipeline_stage_bit() {
        for stage in Stage::ALL {
            assert_eq!(stage.pipeline_stage().as_raw().count_ones(), 1, "{stage}");
            assert_eq!(stage.writer_access().as_raw().count_ones(), 1, "{stage}");
        }
    }

    #[test]
    fn acceleration_structure_implies_ray_tracing() {
        for stage in Stage::ALL {
            if stage.needs_acceleration_structure() {
                assert!(stage.is_ray_tracing(), "{stage}");
            }
        }
        assert!(!Stage::Raygen.needs_acceleration_structure());
        assert!(Stage::Miss.needs_acceleration_structure());
    }

    #[test]
    fn uniform_reads_use_uniform_access() {
        assert_eq!(
            Stage::ClosestHit.reader_access(ResourceKind::UniformBuffer),
            vk::AccessFlags2::UNIFORM_READ
        );
        assert_eq!(
            Stage::ClosestHit.reader_access(ResourceKind::StorageBuffer),
            vk::AccessFlags2::SHADER_READ
        );
        assert_eq!(
            Stage::Transfer.reader_access(ResourceKind::UniformBuffer),
            vk::AccessFlags2::TRANSFER_READ
        );
    }

    #[test]
    fn stage_sets() {
        assert_eq!(Stage::Host.stage_flags(), vk::ShaderStageFlags::empty());
        assert_eq!(
            Stage::AnyHit.stage_flags(),
            vk::ShaderStageFlags::RAYGEN_KHR | vk::ShaderStageFlags::ANY_HIT_KHR
        );
        assert_eq!(
            Stage::Fragment.stage_flags(),
            vk::ShaderStageFlags::VERTEX | vk::ShaderStageFlags::FRAGMENT
        );
        for stage in Stage::ALL {
            if let Some(own) = stage.shader_stage() {
                assert!(stage.stage_flags().contains(own), "{stage}");
            }
        }
    }

    #[test]
    fn read_layouts() {
        assert_eq!(Stage::Host.optimal_read_layout(), None);
        assert_eq!(
            Stage::Transfer.optimal_read_layout(),
            Some(vk::ImageLayout::TRANSFER_SRC_OPTIMAL)
        );
        assert_eq!(
            Stage::Intersect.optimal_read_layout(),
            Some(vk::ImageLayout::GENERAL)
        );
    }

    #[test]
    fn names_round_trip_through_lookup() {
        for stage in Stage::ALL {
            assert_eq!(Stage::from_name(stage.name()), Some(stage));
        }
        assert_eq!(ResourceKind::from_name("simg"), Some(ResourceKind::StorageImage));
        assert_eq!(BarrierType::from_name("memory_barrier"), Some(BarrierType::General));
        assert_eq!(Stage::from_name("vert"), None);
    }
}
