//! # barrier-commands
//!
//! Command recording for the barrier tests. The main part is [ManagedCommands], a command buffer that owns a fence
//! and everything its recorded commands reference, and the [Recorder] that records into it.
//!
//! Every case records all of its work into one command buffer, submits it once and waits for the fence. Resources
//! that are only needed on the device (staging buffers, scratch memory) are handed to the recorder via
//! [Recorder::capture] and released when the command buffer is recorded again or dropped.
//!
//! Barriers are built with the [BarrierBuilder], images that change layout are wrapped in a [TrackedImage].

use std::{any::Any, sync::Arc};

use barrier_vk::{
    ash::{self, vk},
    context::{Device, Queue},
    resources::{CommandBuffer, CommandBufferAllocator, CommandPool},
    sync::Fence,
    CommandBufferError,
};

mod barrier_builder;
pub use barrier_builder::BarrierBuilder;

mod tracked_image;
pub use tracked_image::{layout_after, TrackedImage};

///Host to device upload helpers.
pub mod staging;

///Wrapper around a [CommandBuffer](barrier_vk::resources::CommandBuffer)
/// that keeps used resources alive until its execution finished.
pub struct ManagedCommands<P: CommandBufferAllocator> {
    ///Assosiated command buffer
    pub inner: CommandBuffer<P>,
    ///All resources needed for the current `inner` command buffer to be valid.
    pub resources: Vec<Box<dyn Any + Send + 'static>>,
    ///Signaled once a pending submission of `inner` finished.
    pub fence: Fence,
    submission: Submission,
}

///Whether `fence` will be signaled by a submission. A failed submit leaves the fence unsignaled without anything
/// pending, waiting on it would block forever.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Submission {
    #[default]
    Idle,
    Pending,
}

impl Submission {
    fn after_submit<T, E>(result: &Result<T, E>) -> Self {
        if result.is_ok() {
            Submission::Pending
        } else {
            Submission::Idle
        }
    }
}

impl ManagedCommands<Arc<CommandPool>> {
    ///Creates a primary command buffer from its own pool on `queue`'s family.
    pub fn new_for_queue(device: &Arc<Device>, queue: &Queue) -> Result<Self, CommandBufferError> {
        let pool = Arc::new(CommandPool::new(
            device,
            queue.family_index,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
        )?);
        let command_buffer = pool.allocate_buffer(vk::CommandBufferLevel::PRIMARY)?;
        Self::new(device, command_buffer)
    }
}

impl<P: CommandBufferAllocator> ManagedCommands<P> {
    ///Creates a new ManagedCommands instance from a command buffer. Assumes that the commandbuffer is resetable. Otherwise
    /// [Recorder] creation fails.
    pub fn new(
        device: &Arc<Device>,
        command_buffer: CommandBuffer<P>,
    ) -> Result<Self, CommandBufferError> {
        Ok(ManagedCommands {
            inner: command_buffer,
            resources: Vec::new(),
            fence: Fence::new(device, true)?,
            submission: Submission::Idle,
        })
    }

    ///True while a successful submission has not been waited on.
    pub fn is_pending(&self) -> bool {
        self.submission == Submission::Pending
    }

    ///waits for the execution fence to get signaled. Returns immediately if nothing was submitted.
    pub fn wait(&mut self, timeout: u64) -> Result<(), CommandBufferError> {
        if self.is_pending() {
            self.fence.wait(timeout)?;
            self.submission = Submission::Idle;
        }
        Ok(())
    }

    ///Starts recording a new command buffer. Blocks until any execution of this command buffer has finished.
    pub fn start_recording(&mut self) -> Result<Recorder<'_, P>, CommandBufferError> {
        //wait until all execution has finished.
        self.wait(u64::MAX)?;
        //now drop all bound resources
        self.resources.clear();

        self.inner.reset(true)?;

        unsafe {
            self.inner.pool.device().begin_command_buffer(
                self.inner.inner,
                &vk::CommandBufferBeginInfo::default()
                    .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT),
            )?
        };

        Ok(Recorder {
            buffer: self,
            has_finished_recording: false,
        })
    }

    ///Submits the recorded commands to `queue`. The fence is signaled once the execution finished.
    pub fn submit(&mut self, device: &Arc<Device>, queue: &Queue) -> Result<(), CommandBufferError> {
        self.fence.reset()?;

        let submit_info =
            vk::SubmitInfo::default().command_buffers(core::slice::from_ref(&self.inner.inner));
        let result = unsafe {
            device.inner.queue_submit(
                queue.inner,
                core::slice::from_ref(&submit_info),
                self.fence.inner,
            )
        };
        self.submission = Submission::after_submit(&result);

        if let Err(e) = result {
            #[cfg(feature = "logging")]
            log::error!(
                "Failed to submit command buffer to queue {}: {}",
                queue.family_index,
                e
            );
            return Err(CommandBufferError::SubmitFailed(e));
        }

        Ok(())
    }

    ///Submits to `queue` and blocks until the execution finished. Resources captured while recording are released
    /// afterwards.
    pub fn submit_and_wait(
        &mut self,
        device: &Arc<Device>,
        queue: &Queue,
    ) -> Result<(), CommandBufferError> {
        self.submit(device, queue)?;
        self.wait(u64::MAX)?;
        self.resources.clear();
        Ok(())
    }
}

impl<P: CommandBufferAllocator> Drop for ManagedCommands<P> {
    fn drop(&mut self) {
        //if not signaled, wait for the fence to end
        if self.is_pending() && self.fence.is_signaled() == Ok(false) {
            #[cfg(feature = "logging")]
            log::trace!("Waiting for fence");

            if let Err(_e) = self.fence.wait(u64::MAX) {
                #[cfg(feature = "logging")]
                log::error!("Failed waiting for fence on ManagedCommands drop: {}", _e);
            }
        }
    }
}

///Records into a [ManagedCommands]. Has to be finished via [Recorder::finish_recording] before the commands can be
/// submitted.
pub struct Recorder<'a, P: CommandBufferAllocator> {
    buffer: &'a mut ManagedCommands<P>,
    has_finished_recording: bool,
}

impl<'a, P: CommandBufferAllocator> Recorder<'a, P> {
    ///Records a command `cmd` right away.
    ///
    /// ```ignore
    /// recorder.record(|device, cmd| unsafe { device.cmd_dispatch(cmd, 32, 32, 1) });
    /// ```
    ///
    /// Any resource `cmd` references must outlive the execution, use [Self::capture] for the ones nothing else keeps
    /// alive.
    pub fn record(&mut self, cmd: impl FnOnce(&ash::Device, vk::CommandBuffer)) {
        cmd(self.buffer.inner.pool.device(), self.buffer.inner.inner);
    }

    ///Keeps `resource` alive until the command buffer has finished executing.
    pub fn capture<R: Any + Send + 'static>(&mut self, resource: R) {
        self.buffer.resources.push(Box::new(resource));
    }

    ///Records all barriers of `builder`.
    pub fn barrier(&mut self, builder: &BarrierBuilder) {
        builder.record(self.buffer.inner.pool.device(), self.buffer.inner.inner);
    }

    ///The raw command buffer that is being recorded.
    pub fn command_buffer(&self) -> vk::CommandBuffer {
        self.buffer.inner.inner
    }

    ///Finishes recording of this buffer.
    pub fn finish_recording(mut self) -> Result<(), CommandBufferError> {
        self.has_finished_recording = true;
        unsafe {
            self.buffer
                .inner
                .pool
                .device()
                .end_command_buffer(self.buffer.inner.inner)?
        };

        Ok(())
    }
}

///Custom implementation of drop. Prevents leaving the command buffer in a recording state.
///This most likely hides a bug in the caller, therefore a log error is issued
impl<'a, P: CommandBufferAllocator> Drop for Recorder<'a, P> {
    fn drop(&mut self) {
        if !self.has_finished_recording {
            #[cfg(feature = "logging")]
            log::error!("Finish recording on drop. Recorded commands are most likely incomplete!");
            if let Err(_e) = unsafe {
                self.buffer
                    .inner
                    .pool
                    .device()
                    .end_command_buffer(self.buffer.inner.inner)
            } {
                #[cfg(feature = "logging")]
                log::error!(
                    "Failed to end recording of command buffer in Recorder's drop implementation: {}",
                    _e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(ManagedCommands<Arc<CommandPool>>: Send);
    }

    #[test]
    fn failed_submit_is_not_waited_on() {
        let failed: Result<(), vk::Result> = Err(vk::Result::ERROR_DEVICE_LOST);
        assert_eq!(Submission::after_submit(&failed), Submission::Idle);
        assert_eq!(Submission::after_submit(&Ok::<(), vk::Result>(())), Submission::Pending);
        assert_eq!(Submission::default(), Submission::Idle);
    }
}
