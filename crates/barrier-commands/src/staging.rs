use std::sync::{Arc, Mutex};

use barrier_matrix::BarrierPlan;
use barrier_vk::{
    allocator::Allocator,
    ash::vk,
    context::Device,
    resources::{Buffer, CommandBufferAllocator},
    CommandBufferError, HarnessError,
};

use crate::{BarrierBuilder, Recorder, TrackedImage};

///Creates a staging buffer filled with `data`, makes the host write visible to transfer reads and records a copy into
/// `dst`. The staging buffer is captured by `recorder`.
pub fn record_buffer_upload<A, P, T>(
    device: &Arc<Device>,
    allocator: &Arc<Mutex<A>>,
    recorder: &mut Recorder<'_, P>,
    data: &[T],
    dst: &Buffer,
) -> Result<(), HarnessError>
where
    A: Allocator + Send + Sync + 'static,
    P: CommandBufferAllocator,
    T: bytemuck::Pod,
{
    let staging = Buffer::new_staging_for_data(device, allocator, Some("staging upload"), data)?;
    record_staging_barrier(recorder, staging.inner)?;

    let region = vk::BufferCopy {
        src_offset: 0,
        dst_offset: 0,
        size: staging.size().min(dst.size()),
    };
    let (src, dst) = (staging.inner, dst.inner);
    recorder.record(|device, cmd| unsafe {
        device.cmd_copy_buffer(cmd, src, dst, core::slice::from_ref(&region))
    });
    recorder.capture(staging);

    Ok(())
}

///Like [record_buffer_upload], but copies into the whole `dst` image. The image must already be in
/// `TRANSFER_DST_OPTIMAL` or `GENERAL`. `data` is tightly packed.
pub fn record_image_upload<A, P, T>(
    device: &Arc<Device>,
    allocator: &Arc<Mutex<A>>,
    recorder: &mut Recorder<'_, P>,
    data: &[T],
    dst: &TrackedImage,
) -> Result<(), HarnessError>
where
    A: Allocator + Send + Sync + 'static,
    P: CommandBufferAllocator,
    T: bytemuck::Pod,
{
    let layout = dst.layout();
    if layout != vk::ImageLayout::TRANSFER_DST_OPTIMAL && layout != vk::ImageLayout::GENERAL {
        return Err(CommandBufferError::LayoutMismatch {
            expected: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            found: layout,
        }
        .into());
    }

    let staging = Buffer::new_staging_for_data(device, allocator, Some("staging upload"), data)?;
    record_staging_barrier(recorder, staging.inner)?;

    let region = dst.image().buffer_copy_region();
    let (src, image) = (staging.inner, dst.image().inner);
    recorder.record(|device, cmd| unsafe {
        device.cmd_copy_buffer_to_image(cmd, src, image, layout, core::slice::from_ref(&region))
    });
    recorder.capture(staging);

    Ok(())
}

///Makes the host write into `staging` visible to the following copy.
fn staging_barrier(staging: vk::Buffer) -> Result<BarrierBuilder, CommandBufferError> {
    let mut builder = BarrierBuilder::new();
    builder.buffer_plan(&BarrierPlan::staging_upload(), staging)?;
    Ok(builder)
}

fn record_staging_barrier<P: CommandBufferAllocator>(
    recorder: &mut Recorder<'_, P>,
    staging: vk::Buffer,
) -> Result<(), CommandBufferError> {
    let builder = staging_barrier(staging)?;
    recorder.barrier(&builder);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn staging_upload_is_one_host_to_transfer_barrier() {
        let builder = staging_barrier(vk::Buffer::null()).unwrap();
        assert!(builder.has_barrier());
        assert_eq!(builder.memory.len(), 1);
        assert!(builder.buffers.is_empty());

        let barrier = builder.memory[0];
        assert_eq!(barrier.src_stage_mask, vk::PipelineStageFlags2::HOST);
        assert_eq!(barrier.src_access_mask, vk::AccessFlags2::HOST_WRITE);
        assert_eq!(barrier.dst_stage_mask, vk::PipelineStageFlags2::TRANSFER);
        assert_eq!(barrier.dst_access_mask, vk::AccessFlags2::TRANSFER_READ);
    }
}
