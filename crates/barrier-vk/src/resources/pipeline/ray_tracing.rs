use std::sync::{Arc, Mutex};

use ash::vk;

use super::PipelineLayout;
use crate::{
    allocator::{Allocator, MemoryUsage},
    context::Device,
    error::PipelineError,
    resources::{BufDesc, Buffer, ShaderStage},
};

///One shader group of a ray tracing pipeline.
pub enum RayTracingGroup {
    ///Raygen, miss or callable shader.
    General(ShaderStage),
    ///Hit group for triangle geometry.
    Triangles {
        closest_hit: Option<ShaderStage>,
        any_hit: Option<ShaderStage>,
    },
    ///Hit group for AABB geometry.
    Procedural {
        intersection: ShaderStage,
        closest_hit: Option<ShaderStage>,
        any_hit: Option<ShaderStage>,
    },
}

///The shader binding table region a group's record lives in.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SbtRegion {
    Raygen,
    Miss,
    Hit,
    Callable,
}

impl RayTracingGroup {
    pub fn region(&self) -> SbtRegion {
        match self {
            RayTracingGroup::General(stage) => {
                if stage.stage == vk::ShaderStageFlags::MISS_KHR {
                    SbtRegion::Miss
                } else if stage.stage == vk::ShaderStageFlags::CALLABLE_KHR {
                    SbtRegion::Callable
                } else {
                    SbtRegion::Raygen
                }
            }
            RayTracingGroup::Triangles { .. } | RayTracingGroup::Procedural { .. } => {
                SbtRegion::Hit
            }
        }
    }

    fn stages(&self) -> impl Iterator<Item = &ShaderStage> + '_ {
        let (a, b, c) = match self {
            RayTracingGroup::General(s) => (Some(s), None, None),
            RayTracingGroup::Triangles {
                closest_hit,
                any_hit,
            } => (closest_hit.as_ref(), any_hit.as_ref(), None),
            RayTracingGroup::Procedural {
                intersection,
                closest_hit,
                any_hit,
            } => (closest_hit.as_ref(), any_hit.as_ref(), Some(intersection)),
        };
        a.into_iter().chain(b).chain(c)
    }
}

///Pipeline that manages its own lifetime and keeps its layout alive. Groups are numbered in the order they were passed to
/// [RayTracingPipeline::new].
pub struct RayTracingPipeline {
    pub device: Arc<Device>,
    pub pipeline: vk::Pipeline,
    pub layout: Arc<PipelineLayout>,
    ///SBT region of each group, indexed by group.
    pub group_regions: Vec<SbtRegion>,
    pub loader: ash::khr::ray_tracing_pipeline::Device,
}

impl RayTracingPipeline {
    pub fn new<'g>(
        device: &Arc<Device>,
        groups: &'g [RayTracingGroup],
        layout: Arc<PipelineLayout>,
        max_recursion_depth: u32,
    ) -> Result<Self, PipelineError> {
        let loader = device
            .ray_tracing_pipeline
            .clone()
            .ok_or(PipelineError::ExtensionNotLoaded("VK_KHR_ray_tracing_pipeline"))?;

        if !groups
            .iter()
            .any(|g| g.region() == SbtRegion::Raygen)
        {
            return Err(PipelineError::MissingGroup("raygen"));
        }

        let mut stages: Vec<vk::PipelineShaderStageCreateInfo> = Vec::new();
        let mut group_infos = Vec::with_capacity(groups.len());
        for group in groups {
            let mut index_of = |stage: Option<&'g ShaderStage>| match stage {
                Some(s) => {
                    stages.push(s.as_create_info(None));
                    (stages.len() - 1) as u32
                }
                None => vk::SHADER_UNUSED_KHR,
            };

            let info = match group {
                RayTracingGroup::General(s) => vk::RayTracingShaderGroupCreateInfoKHR::default()
                    .ty(vk::RayTracingShaderGroupTypeKHR::GENERAL)
                    .general_shader(index_of(Some(s)))
                    .closest_hit_shader(vk::SHADER_UNUSED_KHR)
                    .any_hit_shader(vk::SHADER_UNUSED_KHR)
                    .intersection_shader(vk::SHADER_UNUSED_KHR),
                RayTracingGroup::Triangles {
                    closest_hit,
                    any_hit,
                } => vk::RayTracingShaderGroupCreateInfoKHR::default()
                    .ty(vk::RayTracingShaderGroupTypeKHR::TRIANGLES_HIT_GROUP)
                    .general_shader(vk::SHADER_UNUSED_KHR)
                    .closest_hit_shader(index_of(closest_hit.as_ref()))
                    .any_hit_shader(index_of(any_hit.as_ref()))
                    .intersection_shader(vk::SHADER_UNUSED_KHR),
                RayTracingGroup::Procedural {
                    intersection,
                    closest_hit,
                    any_hit,
                } => vk::RayTracingShaderGroupCreateInfoKHR::default()
                    .ty(vk::RayTracingShaderGroupTypeKHR::PROCEDURAL_HIT_GROUP)
                    .general_shader(vk::SHADER_UNUSED_KHR)
                    .closest_hit_shader(index_of(closest_hit.as_ref()))
                    .any_hit_shader(index_of(any_hit.as_ref()))
                    .intersection_shader(index_of(Some(intersection))),
            };
            group_infos.push(info);
        }
        debug_assert_eq!(
            stages.len(),
            groups.iter().map(|g| g.stages().count()).sum::<usize>()
        );

        let create_info = vk::RayTracingPipelineCreateInfoKHR::default()
            .stages(&stages)
            .groups(&group_infos)
            .max_pipeline_ray_recursion_depth(max_recursion_depth)
            .layout(layout.layout);

        let mut pipelines = unsafe {
            match loader.create_ray_tracing_pipelines(
                vk::DeferredOperationKHR::null(),
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

        Ok(RayTracingPipeline {
            device: device.clone(),
            pipeline: pipelines.remove(0),
            layout,
            group_regions: groups.iter().map(|g| g.region()).collect(),
            loader,
        })
    }

    pub fn group_count(&self) -> u32 {
        self.group_regions.len() as u32
    }

    ///Returns the opaque handles of all groups, `handle_size` bytes each.
    pub fn group_handles(&self, handle_size: u32) -> Result<Vec<u8>, PipelineError> {
        let handles = unsafe {
            self.loader.get_ray_tracing_shader_group_handles(
                self.pipeline,
                0,
                self.group_count(),
                (self.group_count() * handle_size) as usize,
            )?
        };
        Ok(handles)
    }

    ///Records a trace of `width x height x depth` rays using `sbt`.
    pub fn cmd_trace_rays(
        &self,
        command_buffer: vk::CommandBuffer,
        sbt: &ShaderBindingTable,
        width: u32,
        height: u32,
        depth: u32,
    ) {
        unsafe {
            self.loader.cmd_trace_rays(
                command_buffer,
                &sbt.region(SbtRegion::Raygen),
                &sbt.region(SbtRegion::Miss),
                &sbt.region(SbtRegion::Hit),
                &sbt.region(SbtRegion::Callable),
                width,
                height,
                depth,
            )
        }
    }
}

impl Drop for RayTracingPipeline {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_pipeline(self.pipeline, None) }
    }
}

///Shader binding table where each non-empty region is its own buffer, aligned to the device's
/// `shaderGroupBaseAlignment`. Records are the bare group handles without any shader record data.
pub struct ShaderBindingTable {
    pub raygen: Option<(Buffer, vk::StridedDeviceAddressRegionKHR)>,
    pub miss: Option<(Buffer, vk::StridedDeviceAddressRegionKHR)>,
    pub hit: Option<(Buffer, vk::StridedDeviceAddressRegionKHR)>,
    pub callable: Option<(Buffer, vk::StridedDeviceAddressRegionKHR)>,
}

impl ShaderBindingTable {
    ///Builds the table for all groups of `pipeline`. The raygen region only references the first raygen group.
    pub fn new<A: Allocator + Send + Sync + 'static>(
        device: &Arc<Device>,
        allocator: &Arc<Mutex<A>>,
        pipeline: &RayTracingPipeline,
        handle_size: u32,
        base_alignment: u32,
    ) -> Result<Self, PipelineError> {
        let handles = pipeline.group_handles(handle_size)?;
        let handle_size_usize = handle_size as usize;

        let build_region = |region: SbtRegion,
                            limit: usize|
         -> Result<Option<(Buffer, vk::StridedDeviceAddressRegionKHR)>, PipelineError> {
            let records = pipeline
                .group_regions
                .iter()
                .enumerate()
                .filter(|(_, r)| **r == region)
                .map(|(idx, _)| idx)
                .take(limit)
                .collect::<Vec<_>>();
            if records.is_empty() {
                return Ok(None);
            }

            let size = (records.len() * handle_size_usize) as vk::DeviceSize;
            let mut buffer = Buffer::new(
                device,
                allocator,
                BufDesc::new(
                    size,
                    vk::BufferUsageFlags::SHADER_BINDING_TABLE_KHR
                        | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
                ),
                MemoryUsage::CpuToGpu,
                Some("shader binding table"),
                Some(base_alignment as u64),
            )?;

            for (slot, group) in records.iter().enumerate() {
                let start = group * handle_size_usize;
                let handle = &handles[start..start + handle_size_usize];
                buffer
                    .write(slot * handle_size_usize, handle)
                    .map_err(crate::error::ResourceError::from)?;
            }
            buffer.flush_range()?;

            let region = vk::StridedDeviceAddressRegionKHR {
                device_address: buffer.device_address()?,
                stride: handle_size as vk::DeviceSize,
                size,
            };
            Ok(Some((buffer, region)))
        };

        let raygen = build_region(SbtRegion::Raygen, 1)?;
        let miss = build_region(SbtRegion::Miss, usize::MAX)?;
        let hit = build_region(SbtRegion::Hit, usize::MAX)?;
        let callable = build_region(SbtRegion::Callable, usize::MAX)?;

        Ok(ShaderBindingTable {
            raygen,
            miss,
            hit,
            callable,
        })
    }

    ///Returns the address region of `region`, or an empty region if the table has no such records.
    pub fn region(&self, region: SbtRegion) -> vk::StridedDeviceAddressRegionKHR {
        let entry = match region {
            SbtRegion::Raygen => &self.raygen,
            SbtRegion::Miss => &self.miss,
            SbtRegion::Hit => &self.hit,
            SbtRegion::Callable => &self.callable,
        };
        entry
            .as_ref()
            .map(|(_, r)| *r)
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(RayTracingPipeline: Send, Sync);
        assert_impl_all!(ShaderBindingTable: Send, Sync);
        assert_impl_all!(RayTracingGroup: Send, Sync);
    }
}
