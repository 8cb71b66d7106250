use std::sync::Arc;

use barrier_matrix::{BarrierPlan, BarrierScope};
use barrier_vk::{ash::vk, resources::Image, CommandBufferError};

use crate::{BarrierBuilder, Recorder};
use barrier_vk::resources::CommandBufferAllocator;

///Image together with the layout it is in once all recorded commands executed.
///
/// The layout can only change through [TrackedImage::transition], which records the barrier and updates the tracked
/// value in one step.
pub struct TrackedImage {
    image: Arc<Image>,
    layout: vk::ImageLayout,
}

impl TrackedImage {
    ///Starts tracking a freshly created image, which is always `UNDEFINED`.
    pub fn new(image: Arc<Image>) -> Self {
        TrackedImage {
            image,
            layout: vk::ImageLayout::UNDEFINED,
        }
    }

    pub fn image(&self) -> &Arc<Image> {
        &self.image
    }

    pub fn layout(&self) -> vk::ImageLayout {
        self.layout
    }

    ///Records `plan` on the whole image.
    ///
    /// Image plans must start at the tracked layout, the tracked layout becomes the plan's new layout. A global memory
    /// plan keeps the layout, which has to be `GENERAL` since a memory barrier can only order accesses that do not
    /// depend on a layout change.
    pub fn transition<P: CommandBufferAllocator>(
        &mut self,
        recorder: &mut Recorder<'_, P>,
        plan: &BarrierPlan,
    ) -> Result<(), CommandBufferError> {
        let next = layout_after(self.layout, plan)?;

        let mut builder = BarrierBuilder::new();
        builder.image_plan(plan, self.image.inner, self.image.subresource_all())?;
        recorder.barrier(&builder);

        #[cfg(feature = "logging")]
        if next != self.layout {
            log::trace!("Image {:?}: {:?} -> {:?}", self.image.inner, self.layout, next);
        }

        self.layout = next;
        Ok(())
    }
}

///Layout an image in `current` is in after `plan`.
pub fn layout_after(
    current: vk::ImageLayout,
    plan: &BarrierPlan,
) -> Result<vk::ImageLayout, CommandBufferError> {
    match plan.scope {
        BarrierScope::Image {
            old_layout,
            new_layout,
        } => {
            if old_layout != current {
                return Err(CommandBufferError::LayoutMismatch {
                    expected: old_layout,
                    found: current,
                });
            }
            Ok(new_layout)
        }
        BarrierScope::Memory => {
            if current != vk::ImageLayout::GENERAL {
                return Err(CommandBufferError::LayoutMismatch {
                    expected: vk::ImageLayout::GENERAL,
                    found: current,
                });
            }
            Ok(current)
        }
        BarrierScope::Buffer => Err(CommandBufferError::InvalidBarrierScope("buffer")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use barrier_matrix::TestCase;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(TrackedImage: Send, Sync);
    }

    #[test]
    fn transfer_writer_specific_chain() {
        let case = TestCase::from_path("barrier.simg.specific_barrier.from_xfer_to_ahit").unwrap();

        let pre = case.writer_transition(vk::ImageLayout::UNDEFINED).unwrap();
        let layout = layout_after(vk::ImageLayout::UNDEFINED, &pre).unwrap();
        assert_eq!(layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);

        let main = case.main_barrier(layout);
        let layout = layout_after(layout, &main).unwrap();
        assert_eq!(layout, vk::ImageLayout::GENERAL);
    }

    #[test]
    fn general_barrier_keeps_general() {
        let case = TestCase::from_path("barrier.simg.memory_barrier.from_xfer_to_isec").unwrap();

        let pre = case.writer_transition(vk::ImageLayout::UNDEFINED).unwrap();
        let layout = layout_after(vk::ImageLayout::UNDEFINED, &pre).unwrap();
        assert_eq!(layout, vk::ImageLayout::GENERAL);

        let main = case.main_barrier(layout);
        assert!(matches!(
            layout_after(layout, &main),
            Ok(vk::ImageLayout::GENERAL)
        ));
    }

    #[test]
    fn stale_layout_is_detected() {
        let case = TestCase::from_path("barrier.simg.specific_barrier.from_rgen_to_xfer").unwrap();
        let main = case.main_barrier(vk::ImageLayout::GENERAL);

        let err = layout_after(vk::ImageLayout::UNDEFINED, &main).unwrap_err();
        assert!(matches!(
            err,
            CommandBufferError::LayoutMismatch {
                expected: vk::ImageLayout::GENERAL,
                found: vk::ImageLayout::UNDEFINED,
            }
        ));

        //memory barriers are only valid in GENERAL
        let general = TestCase::from_path("barrier.simg.memory_barrier.from_rgen_to_xfer").unwrap();
        let main = general.main_barrier(vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        assert!(layout_after(vk::ImageLayout::TRANSFER_DST_OPTIMAL, &main).is_err());
    }
}
