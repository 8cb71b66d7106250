//! Device independent description of every synchronization step and resource property of a case.
//!
//! The execution layer only turns these values into Vulkan calls, so masks and layouts can be
//! checked without a device.

use ash::vk;

use crate::{BarrierType, ResourceKind, Stage, TestCase};

///Source or destination half of a dependency.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AccessScope {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}

impl AccessScope {
    pub const fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        AccessScope { stage, access }
    }

    ///Scope of `stage` producing the values.
    pub fn writer(stage: Stage) -> Self {
        AccessScope::new(stage.pipeline_stage(), stage.writer_access())
    }

    ///Scope of `stage` consuming the values of `resource`.
    pub fn reader(stage: Stage, resource: ResourceKind) -> Self {
        AccessScope::new(stage.pipeline_stage(), stage.reader_access(resource))
    }

    ///Empty source scope for first use transitions.
    pub const fn top_of_pipe() -> Self {
        AccessScope::new(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE)
    }
}

///What a barrier covers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BarrierScope {
    ///Global memory barrier.
    Memory,
    ///Whole range of the tested (or verification) buffer.
    Buffer,
    ///Whole tested image, including a layout change.
    Image {
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    },
}

///A single dependency recorded with one `vkCmdPipelineBarrier2`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BarrierPlan {
    pub src: AccessScope,
    pub dst: AccessScope,
    pub scope: BarrierScope,
}

impl BarrierPlan {
    ///Layout the image is in after the barrier, if it changes one.
    pub fn new_layout(&self) -> Option<vk::ImageLayout> {
        match self.scope {
            BarrierScope::Image { new_layout, .. } => Some(new_layout),
            BarrierScope::Memory | BarrierScope::Buffer => None,
        }
    }

    ///Makes host writes of a staging buffer visible to a following copy.
    pub fn staging_upload() -> Self {
        BarrierPlan {
            src: AccessScope::new(vk::PipelineStageFlags2::HOST, vk::AccessFlags2::HOST_WRITE),
            dst: AccessScope::new(
                vk::PipelineStageFlags2::TRANSFER,
                vk::AccessFlags2::TRANSFER_READ,
            ),
            scope: BarrierScope::Memory,
        }
    }
}

impl TestCase {
    ///Usage of the tested buffer.
    pub fn resource_buffer_usage(&self) -> vk::BufferUsageFlags {
        let mut usage = match self.resource {
            ResourceKind::UniformBuffer => vk::BufferUsageFlags::UNIFORM_BUFFER,
            ResourceKind::StorageBuffer | ResourceKind::StorageImage => {
                vk::BufferUsageFlags::STORAGE_BUFFER
            }
        };
        if self.writer == Stage::Transfer {
            usage |= vk::BufferUsageFlags::TRANSFER_DST;
        }
        if self.reader == Stage::Transfer {
            usage |= vk::BufferUsageFlags::TRANSFER_SRC;
        }
        usage
    }

    ///Usage of the tested image.
    pub fn resource_image_usage(&self) -> vk::ImageUsageFlags {
        let mut usage = vk::ImageUsageFlags::STORAGE;
        if self.writer == Stage::Transfer {
            usage |= vk::ImageUsageFlags::TRANSFER_DST;
        }
        if self.reader == Stage::Transfer {
            usage |= vk::ImageUsageFlags::TRANSFER_SRC;
        }
        usage
    }

    ///Usage of the host visible verification buffer.
    pub fn verification_buffer_usage(&self) -> vk::BufferUsageFlags {
        let mut usage = vk::BufferUsageFlags::STORAGE_BUFFER;
        if self.reader == Stage::Transfer {
            usage |= vk::BufferUsageFlags::TRANSFER_DST;
        }
        usage
    }

    ///Layout the image has to be in while the writer fills it. `None` for buffers.
    pub fn writer_image_layout(&self) -> Option<vk::ImageLayout> {
        if self.resource != ResourceKind::StorageImage {
            return None;
        }
        match self.writer {
            Stage::Host => None,
            Stage::Transfer => Some(match self.barrier {
                BarrierType::Specific => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                BarrierType::General => vk::ImageLayout::GENERAL,
            }),
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

    ///Transition into [Self::writer_image_layout]. `None` if the image is already there or the
    /// resource is a buffer.
    pub fn writer_transition(&self, current: vk::ImageLayout) -> Option<BarrierPlan> {
        let target = self.writer_image_layout()?;
        if target == current {
            return None;
        }
        Some(BarrierPlan {
            src: AccessScope::top_of_pipe(),
            dst: AccessScope::writer(self.writer),
            scope: BarrierScope::Image {
                old_layout: current,
                new_layout: target,
            },
        })
    }

    ///The barrier under test. `current_layout` is the image's layout after the writer ran and is
    /// ignored for buffers.
    pub fn main_barrier(&self, current_layout: vk::ImageLayout) -> BarrierPlan {
        let src = AccessScope::writer(self.writer);
        let dst = AccessScope::reader(self.reader, self.resource);

        let scope = match (self.barrier, self.resource) {
            (BarrierType::General, _) => BarrierScope::Memory,
            (BarrierType::Specific, ResourceKind::UniformBuffer | ResourceKind::StorageBuffer) => {
                BarrierScope::Buffer
            }
            (BarrierType::Specific, ResourceKind::StorageImage) => BarrierScope::Image {
                old_layout: current_layout,
                //images are never read by the host
                new_layout: self
                    .reader
                    .optimal_read_layout()
                    .unwrap_or(vk::ImageLayout::GENERAL),
            },
        };

        BarrierPlan { src, dst, scope }
    }

    ///Makes the reader's writes to the verification buffer visible to the host.
    pub fn verification_barrier(&self) -> BarrierPlan {
        BarrierPlan {
            src: AccessScope::writer(self.reader),
            dst: AccessScope::new(vk::PipelineStageFlags2::HOST, vk::AccessFlags2::HOST_READ),
            scope: BarrierScope::Buffer,
        }
    }

    ///Shader stages of the writer's and reader's pipelines combined. The tested resource is
    /// visible to all of them.
    pub fn all_stage_flags(&self) -> vk::ShaderStageFlags {
        self.writer.stage_flags() | self.reader.stage_flags()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn case(path: &str) -> TestCase {
        TestCase::from_path(path).unwrap()
    }

    #[test]
    fn host_to_raygen_specific_buffer() {
        let c = case("barrier.ssbo.specific_barrier.from_host_to_rgen");
        assert!(c.needs_host_visible_resource());
        let plan = c.main_barrier(vk::ImageLayout::UNDEFINED);
        assert_eq!(plan.scope, BarrierScope::Buffer);
        assert_eq!(plan.src.stage, vk::PipelineStageFlags2::HOST);
        assert_eq!(plan.src.access, vk::AccessFlags2::HOST_WRITE);
        assert_eq!(plan.dst.stage, vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR);
        assert_eq!(plan.dst.access, vk::AccessFlags2::SHADER_READ);
    }

    #[test]
    fn transfer_to_closest_hit_image() {
        let c = case("barrier.simg.specific_barrier.from_xfer_to_chit");
        assert_eq!(
            c.writer_image_layout(),
            Some(vk::ImageLayout::TRANSFER_DST_OPTIMAL)
        );
        let pre = c.writer_transition(vk::ImageLayout::UNDEFINED).unwrap();
        assert_eq!(pre.src, AccessScope::top_of_pipe());
        assert_eq!(pre.dst.access, vk::AccessFlags2::TRANSFER_WRITE);

        let plan = c.main_barrier(vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(
            plan.scope,
            BarrierScope::Image {
                old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                new_layout: vk::ImageLayout::GENERAL
            }
        );
        assert_eq!(plan.dst.access, vk::AccessFlags2::SHADER_READ);
        assert!(c.resource_image_usage().contains(vk::ImageUsageFlags::TRANSFER_DST));
        assert!(!c.resource_image_usage().contains(vk::ImageUsageFlags::TRANSFER_SRC));
    }

    #[test]
    fn general_barrier_keeps_general_layout() {
        let c = case("barrier.simg.memory_barrier.from_xfer_to_isec");
        assert_eq!(c.writer_image_layout(), Some(vk::ImageLayout::GENERAL));
        let plan = c.main_barrier(vk::ImageLayout::GENERAL);
        assert_eq!(plan.scope, BarrierScope::Memory);
        assert_eq!(plan.new_layout(), None);
    }

    #[test]
    fn specific_image_barrier_targets_reader_layout() {
        let c = case("barrier.simg.specific_barrier.from_rgen_to_xfer");
        let plan = c.main_barrier(vk::ImageLayout::GENERAL);
        assert_eq!(plan.new_layout(), Some(vk::ImageLayout::TRANSFER_SRC_OPTIMAL));
        assert_eq!(plan.dst.access, vk::AccessFlags2::TRANSFER_READ);
        assert!(c.resource_image_usage().contains(vk::ImageUsageFlags::TRANSFER_SRC));
    }

    #[test]
    fn no_redundant_writer_transition() {
        let c = case("barrier.simg.memory_barrier.from_comp_to_miss");
        assert!(c.writer_transition(vk::ImageLayout::GENERAL).is_none());
        assert!(c.writer_transition(vk::ImageLayout::UNDEFINED).is_some());
        let buffer = case("barrier.ssbo.memory_barrier.from_comp_to_miss");
        assert!(buffer.writer_transition(vk::ImageLayout::UNDEFINED).is_none());
    }

    #[test]
    fn uniform_reader_access() {
        let c = case("barrier.ubo.specific_barrier.from_xfer_to_ahit");
        assert_eq!(c.main_barrier(vk::ImageLayout::UNDEFINED).dst.access, vk::AccessFlags2::UNIFORM_READ);
        let usage = c.resource_buffer_usage();
        assert!(usage.contains(vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST));
        assert!(!usage.contains(vk::BufferUsageFlags::STORAGE_BUFFER));
    }

    #[test]
    fn verification_barrier_uses_reader_write_scope() {
        let c = case("barrier.ssbo.memory_barrier.from_rgen_to_xfer");
        let plan = c.verification_barrier();
        assert_eq!(plan.src.stage, vk::PipelineStageFlags2::TRANSFER);
        assert_eq!(plan.src.access, vk::AccessFlags2::TRANSFER_WRITE);
        assert_eq!(plan.dst.access, vk::AccessFlags2::HOST_READ);
        assert!(c.verification_buffer_usage().contains(vk::BufferUsageFlags::TRANSFER_DST));
    }

    #[test]
    fn combined_stage_flags() {
        let c = case("barrier.ssbo.memory_barrier.from_frag_to_call");
        assert_eq!(
            c.all_stage_flags(),
            vk::ShaderStageFlags::VERTEX
                | vk::ShaderStageFlags::FRAGMENT
                | vk::ShaderStageFlags::RAYGEN_KHR
                | vk::ShaderStageFlags::CALLABLE_KHR
        );
    }
}
