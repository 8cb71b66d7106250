use std::sync::Arc;

use ash::vk;

use crate::{context::Device, error::PipelineError, resources::ShaderStage};

use super::PipelineLayout;

///Pipeline that manages its own lifetime and keeps its layout alive.
pub struct ComputePipeline {
    pub device: Arc<Device>,
    pub pipeline: vk::Pipeline,
    pub layout: Arc<PipelineLayout>,
}

impl ComputePipeline {
    pub fn new(
        device: &Arc<Device>,
        stage: &ShaderStage,
        layout: Arc<PipelineLayout>,
    ) -> Result<Self, PipelineError> {
        let create_info = vk::ComputePipelineCreateInfo::default()
            .stage(stage.as_create_info(None))
            .layout(layout.layout);

        let mut pipelines = unsafe {
            match device.inner.create_compute_pipelines(
                vk::PipelineCache::null(),
                core::slice::from_ref(&create_info),
                None,
            ) {
                Ok(p) => p,
                Err((_plines, err)) => {
                    return Err(err.into());
                }
            }
        };

        if pipelines.len() != 1 {
            return Err(PipelineError::Allocation);
        }

        Ok(ComputePipeline {
            device: device.clone(),
            pipeline: pipelines.remove(0),
            layout,
        })
    }
}

impl Drop for ComputePipeline {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_pipeline(self.pipeline, None) }
    }
}
