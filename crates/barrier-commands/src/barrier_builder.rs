use barrier_matrix::{BarrierPlan, BarrierScope};
use barrier_vk::{
    ash::{
        self,
        vk::{self, ImageLayout},
    },
    CommandBufferError,
};
use tinyvec::TinyVec;

///Barrier building helper. Lets you add memory, buffer and image barriers via a simple builder API and record all
/// of them with a single `vkCmdPipelineBarrier2`.
///
/// Uses tinyvec internally. [Self::STACK_ALLOCATION] barriers per type are pre allocated into an array. The builder
/// however can outgrow that value.
#[derive(Debug, Default)]
pub struct BarrierBuilder {
    pub memory: TinyVec<[vk::MemoryBarrier2<'static>; Self::STACK_ALLOCATION]>,
    pub images: TinyVec<[vk::ImageMemoryBarrier2<'static>; Self::STACK_ALLOCATION]>,
    pub buffers: TinyVec<[vk::BufferMemoryBarrier2<'static>; Self::STACK_ALLOCATION]>,
}

impl BarrierBuilder {
    ///Ammount of barriers that can be stack allocated.
    pub const STACK_ALLOCATION: usize = 2;

    pub fn new() -> Self {
        Self::default()
    }

    ///Adds a global memory barrier.
    pub fn memory_barrier(
        &mut self,
        src_access_mask: vk::AccessFlags2,
        src_pipeline_stage: vk::PipelineStageFlags2,
        dst_access_mask: vk::AccessFlags2,
        dst_pipeline_stage: vk::PipelineStageFlags2,
    ) -> &mut Self {
        let item = vk::MemoryBarrier2::default()
            .src_access_mask(src_access_mask)
            .src_stage_mask(src_pipeline_stage)
            .dst_access_mask(dst_access_mask)
            .dst_stage_mask(dst_pipeline_stage);

        #[cfg(feature = "logging")]
        log::trace!("memory {:#?}", item);

        self.memory.push(item);
        self
    }

    ///Adds this barrier to the internal collection.
    ///
    /// # Safety
    ///
    /// Make sure that the `buffer` handle is alive until the barrier is used on the GPU.
    /// This is not enforced by this object since it is dropped whenever the commandbuffer is build. Therefore, there is no
    /// way for it to extent the lifetime as needed.
    pub fn buffer_barrier(
        &mut self,
        buffer: vk::Buffer,
        offset: u64,
        size: u64,
        src_access_mask: vk::AccessFlags2,
        src_pipeline_stage: vk::PipelineStageFlags2,
        dst_access_mask: vk::AccessFlags2,
        dst_pipeline_stage: vk::PipelineStageFlags2,
    ) -> &mut Self {
        let item = vk::BufferMemoryBarrier2::default()
            .buffer(buffer)
            .src_access_mask(src_access_mask)
            .src_stage_mask(src_pipeline_stage)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_access_mask(dst_access_mask)
            .dst_stage_mask(dst_pipeline_stage)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .offset(offset)
            .size(size);

        #[cfg(feature = "logging")]
        log::trace!("buffer[{:?}] {:#?}", buffer, item);

        self.buffers.push(item);
        self
    }

    ///Adds this barrier.
    ///
    /// # Safety
    ///
    /// Make sure that the `image` handle is alive until the barrier is used on the GPU.
    /// This is not enforced by this object since it is dropped whenever the commandbuffer is build. Therefore, there is no
    /// way for it to extent the lifetime as needed.
    pub fn image_barrier(
        &mut self,
        image: vk::Image,
        subresource_range: vk::ImageSubresourceRange,
        src_access_mask: vk::AccessFlags2,
        src_pipeline_stage: vk::PipelineStageFlags2,
        src_layout: vk::ImageLayout,
        dst_access_mask: vk::AccessFlags2,
        dst_pipeline_stage: vk::PipelineStageFlags2,
        dst_layout: ImageLayout,
    ) -> &mut Self {
        let item = vk::ImageMemoryBarrier2::default()
            .image(image)
            .subresource_range(subresource_range)
            .src_access_mask(src_access_mask)
            .src_stage_mask(src_pipeline_stage)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .old_layout(src_layout)
            .dst_access_mask(dst_access_mask)
            .dst_stage_mask(dst_pipeline_stage)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .new_layout(dst_layout);

        #[cfg(feature = "logging")]
        log::trace!("full_transition[{:?}] {:#?}", image, item);

        self.images.push(item);
        self
    }

    ///Adds `plan` for a buffer. A [BarrierScope::Memory] plan becomes a global barrier, a
    /// [BarrierScope::Buffer] plan covers the whole `buffer`. Fails for image plans.
    pub fn buffer_plan(
        &mut self,
        plan: &BarrierPlan,
        buffer: vk::Buffer,
    ) -> Result<&mut Self, CommandBufferError> {
        match plan.scope {
            BarrierScope::Memory => Ok(self.memory_barrier(
                plan.src.access,
                plan.src.stage,
                plan.dst.access,
                plan.dst.stage,
            )),
            BarrierScope::Buffer => Ok(self.buffer_barrier(
                buffer,
                0,
                vk::WHOLE_SIZE,
                plan.src.access,
                plan.src.stage,
                plan.dst.access,
                plan.dst.stage,
            )),
            BarrierScope::Image { .. } => Err(CommandBufferError::InvalidBarrierScope("image")),
        }
    }

    ///Adds `plan` for the whole `image`. A [BarrierScope::Memory] plan becomes a global barrier. Fails for buffer
    /// plans.
    ///
    /// Prefer [TrackedImage::transition](crate::TrackedImage::transition), which also keeps track of the layout.
    pub fn image_plan(
        &mut self,
        plan: &BarrierPlan,
        image: vk::Image,
        subresource_range: vk::ImageSubresourceRange,
    ) -> Result<&mut Self, CommandBufferError> {
        match plan.scope {
            BarrierScope::Memory => Ok(self.memory_barrier(
                plan.src.access,
                plan.src.stage,
                plan.dst.access,
                plan.dst.stage,
            )),
            BarrierScope::Image {
                old_layout,
                new_layout,
            } => Ok(self.image_barrier(
                image,
                subresource_range,
                plan.src.access,
                plan.src.stage,
                old_layout,
                plan.dst.access,
                plan.dst.stage,
                new_layout,
            )),
            BarrierScope::Buffer => Err(CommandBufferError::InvalidBarrierScope("buffer")),
        }
    }

    ///Returns a dependency info referencing the currently pushed barriers.
    pub fn as_dependency_info(&self) -> vk::DependencyInfo<'_> {
        vk::DependencyInfo::default()
            .memory_barriers(self.memory.as_slice())
            .image_memory_barriers(self.images.as_slice())
            .buffer_memory_barriers(self.buffers.as_slice())
    }

    ///Returns true if at least one barrier has been added.
    pub fn has_barrier(&self) -> bool {
        !self.memory.is_empty() || !self.images.is_empty() || !self.buffers.is_empty()
    }

    ///Records all barriers with one `vkCmdPipelineBarrier2`. Does nothing if no barrier was added.
    pub fn record(&self, device: &ash::Device, command_buffer: vk::CommandBuffer) {
        if !self.has_barrier() {
            return;
        }
        unsafe { device.cmd_pipeline_barrier2(command_buffer, &self.as_dependency_info()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barrier_matrix::{AccessScope, TestCase};

    #[test]
    fn general_plan_is_one_memory_barrier() {
        let case = TestCase::from_path("barrier.ssbo.memory_barrier.from_comp_to_rgen").unwrap();
        let plan = case.main_barrier(vk::ImageLayout::UNDEFINED);

        let mut builder = BarrierBuilder::new();
        builder.buffer_plan(&plan, vk::Buffer::null()).unwrap();

        assert_eq!(builder.memory.len(), 1);
        assert!(builder.buffers.is_empty());
        assert!(builder.images.is_empty());
        let barrier = builder.memory[0];
        assert_eq!(barrier.src_stage_mask, vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(barrier.src_access_mask, vk::AccessFlags2::SHADER_WRITE);
        assert_eq!(
            barrier.dst_stage_mask,
            vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR
        );
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags2::SHADER_READ);
    }

    #[test]
    fn specific_buffer_plan_covers_whole_buffer() {
        let case = TestCase::from_path("barrier.ubo.specific_barrier.from_host_to_miss").unwrap();
        let plan = case.main_barrier(vk::ImageLayout::UNDEFINED);

        let mut builder = BarrierBuilder::new();
        builder.buffer_plan(&plan, vk::Buffer::null()).unwrap();
        assert_eq!(builder.buffers.len(), 1);
        let barrier = builder.buffers[0];
        assert_eq!(barrier.offset, 0);
        assert_eq!(barrier.size, vk::WHOLE_SIZE);
        assert_eq!(barrier.src_access_mask, vk::AccessFlags2::HOST_WRITE);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags2::UNIFORM_READ);
        assert_eq!(barrier.src_queue_family_index, vk::QUEUE_FAMILY_IGNORED);
    }

    #[test]
    fn scope_mismatch_is_rejected() {
        let image_plan = BarrierPlan {
            src: AccessScope::top_of_pipe(),
            dst: AccessScope::new(
                vk::PipelineStageFlags2::TRANSFER,
                vk::AccessFlags2::TRANSFER_WRITE,
            ),
            scope: BarrierScope::Image {
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            },
        };
        let mut builder = BarrierBuilder::new();
        assert!(builder
            .buffer_plan(&image_plan, vk::Buffer::null())
            .is_err());

        let buffer_plan = BarrierPlan {
            scope: BarrierScope::Buffer,
            ..image_plan
        };
        assert!(builder
            .image_plan(
                &buffer_plan,
                vk::Image::null(),
                vk::ImageSubresourceRange::default()
            )
            .is_err());
        assert!(!builder.has_barrier());
    }

    #[test]
    fn image_plan_carries_layouts() {
        let case = TestCase::from_path("barrier.simg.specific_barrier.from_xfer_to_chit").unwrap();
        let plan = case.main_barrier(vk::ImageLayout::TRANSFER_DST_OPTIMAL);

        let mut builder = BarrierBuilder::new();
        builder
            .image_plan(
                &plan,
                vk::Image::null(),
                vk::ImageSubresourceRange::default(),
            )
            .unwrap();
        let barrier = builder.images[0];
        assert_eq!(barrier.old_layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert_eq!(barrier.new_layout, vk::ImageLayout::GENERAL);
        assert_eq!(barrier.src_access_mask, vk::AccessFlags2::TRANSFER_WRITE);

        let info = builder.as_dependency_info();
        assert_eq!(info.image_memory_barrier_count, 1);
        assert_eq!(info.memory_barrier_count, 0);
    }
}
