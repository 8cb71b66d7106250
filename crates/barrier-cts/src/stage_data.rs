//! Everything one side of a case needs on the device to run its shaders: descriptors, pipeline and, for ray tracing
//! stages that are reached through a traced ray, the acceleration structures.

use std::sync::{Arc, Mutex};

use barrier_commands::Recorder;
use barrier_matrix::{
    data::{FULL_SCREEN_QUAD, IMAGE_DIM},
    PipelineKind, ShaderSource, Stage, StagePrograms,
};
use barrier_vk::{
    allocator::{Allocator, MemoryUsage},
    ash::vk,
    context::{Ctx, Device},
    resources::{
        BufDesc, Buffer, CommandBufferAllocator, ComputePipeline, DescriptorPool, DescriptorSet,
        DescriptorSetLayout, DescriptorWrite, Framebuffer, Geometry, GraphicsPipeline,
        PipelineLayout, RayTracingGroup, RayTracingPipeline, RenderPass,
        SceneAccelerationStructures, ShaderBindingTable, ShaderModule, ShaderStage,
    },
    HarnessError,
};

use crate::compiler::ShaderCompiler;

///Binding of the top level acceleration structure in every set that needs one.
pub const ACCELERATION_STRUCTURE_BINDING: u32 = 1;

///Geometry a traced ray has to hit (or miss) to reach `stage`. `None` for stages that do not trace rays.
pub fn geometry_for(stage: Stage) -> Option<Geometry> {
    match stage {
        Stage::Intersect => Some(Geometry::Aabb { z: -1.0 }),
        Stage::AnyHit | Stage::ClosestHit | Stage::Callable => Some(Geometry::Triangles { z: -1.0 }),
        //behind tmax of the auxiliary raygen shader
        Stage::Miss => Some(Geometry::Triangles { z: -9.9 }),
        Stage::Host | Stage::Transfer | Stage::Raygen | Stage::Compute | Stage::Fragment => None,
    }
}

///Builds the shader groups of a pipeline exercising `stage`. Group 0 is always the raygen shader, group 1 holds the
/// tested stage unless that is raygen itself.
pub fn ray_tracing_groups(
    stage: Stage,
    raygen: ShaderStage,
    main: Option<ShaderStage>,
) -> Result<Vec<RayTracingGroup>, HarnessError> {
    if stage == Stage::Raygen {
        return Ok(vec![RayTracingGroup::General(raygen)]);
    }
    let main = main.ok_or_else(|| {
        HarnessError::Internal(format!("no shader for the tested {} stage", stage))
    })?;

    let tested = match stage {
        Stage::Intersect => RayTracingGroup::Procedural {
            intersection: main,
            closest_hit: None,
            any_hit: None,
        },
        Stage::AnyHit => RayTracingGroup::Triangles {
            closest_hit: None,
            any_hit: Some(main),
        },
        Stage::ClosestHit => RayTracingGroup::Triangles {
            closest_hit: Some(main),
            any_hit: None,
        },
        Stage::Miss | Stage::Callable => RayTracingGroup::General(main),
        Stage::Host | Stage::Transfer | Stage::Raygen | Stage::Compute | Stage::Fragment => {
            return Err(HarnessError::Internal(format!(
                "{} is not a ray tracing stage",
                stage
            )));
        }
    };
    Ok(vec![RayTracingGroup::General(raygen), tested])
}

///The pipeline of one side, together with the objects its commands use.
pub enum StagePipeline {
    Compute(ComputePipeline),
    Graphics {
        pipeline: GraphicsPipeline,
        framebuffer: Framebuffer,
        vertex_buffer: Buffer,
    },
    RayTracing {
        pipeline: RayTracingPipeline,
        sbt: ShaderBindingTable,
    },
}

impl StagePipeline {
    pub fn bind_point(&self) -> vk::PipelineBindPoint {
        match self {
            StagePipeline::Compute(_) => vk::PipelineBindPoint::COMPUTE,
            StagePipeline::Graphics { .. } => vk::PipelineBindPoint::GRAPHICS,
            StagePipeline::RayTracing { .. } => vk::PipelineBindPoint::RAY_TRACING_KHR,
        }
    }

    pub fn handle(&self) -> vk::Pipeline {
        match self {
            StagePipeline::Compute(p) => p.pipeline,
            StagePipeline::Graphics { pipeline, .. } => pipeline.pipeline,
            StagePipeline::RayTracing { pipeline, .. } => pipeline.pipeline,
        }
    }
}

///Descriptor set, pipeline and acceleration structures of a shader stage.
pub struct StageData {
    pub stage: Stage,
    pub descriptor_layout: DescriptorSetLayout,
    pub descriptor_set: DescriptorSet,
    pub pipeline_layout: Arc<PipelineLayout>,
    pub pipeline: StagePipeline,
    pub acceleration_structures: Option<SceneAccelerationStructures>,
}

impl StageData {
    ///Creates the pipeline for `programs` with a descriptor set of `bindings`.
    ///
    /// If the stage is only reached by tracing rays, the acceleration structures are built into `recorder` and bound
    /// at [ACCELERATION_STRUCTURE_BINDING]. Everything else in the set is left for the caller to write.
    pub fn new<A, P>(
        ctx: &Ctx<A>,
        recorder: &mut Recorder<'_, P>,
        programs: &StagePrograms,
        compiler: &dyn ShaderCompiler,
        bindings: &[vk::DescriptorSetLayoutBinding],
    ) -> Result<Self, HarnessError>
    where
        A: Allocator + Send + Sync + 'static,
        P: CommandBufferAllocator,
    {
        let device = &ctx.device;
        let stage = programs.stage;

        let descriptor_layout = DescriptorSetLayout::new(device, bindings)?;
        let pool = Arc::new(DescriptorPool::new_for_bindings(device, bindings)?);
        let descriptor_set = pool.allocate(&descriptor_layout)?;
        let pipeline_layout = Arc::new(PipelineLayout::new(
            device,
            &[descriptor_layout.inner],
            &[],
        )?);

        let kind = stage.pipeline_kind().ok_or_else(|| {
            HarnessError::Internal(format!("{} does not run on a pipeline", stage))
        })?;

        let pipeline = match kind {
            PipelineKind::Compute => {
                let shader = load_stage(device, compiler, &programs.main)?;
                StagePipeline::Compute(ComputePipeline::new(
                    device,
                    &shader,
                    pipeline_layout.clone(),
                )?)
            }
            PipelineKind::Graphics => {
                let vertex = programs.aux.as_ref().ok_or_else(|| {
                    HarnessError::Internal(format!("{} has no vertex shader", programs.main.name))
                })?;
                let vertex = load_stage(device, compiler, vertex)?;
                let fragment = load_stage(device, compiler, &programs.main)?;

                let extent = vk::Extent2D {
                    width: IMAGE_DIM,
                    height: IMAGE_DIM,
                };
                let renderpass = Arc::new(RenderPass::new_attachmentless(device)?);
                let framebuffer =
                    Framebuffer::new_attachmentless(device, renderpass.clone(), extent)?;
                let pipeline = GraphicsPipeline::new_vec4_triangles(
                    device,
                    &vertex,
                    &fragment,
                    pipeline_layout.clone(),
                    renderpass,
                    extent,
                )?;
                let vertex_buffer = full_screen_quad(device, &ctx.allocator)?;

                StagePipeline::Graphics {
                    pipeline,
                    framebuffer,
                    vertex_buffer,
                }
            }
            PipelineKind::RayTracing => {
                let raygen = programs.raygen().ok_or_else(|| {
                    HarnessError::Internal(format!("{} has no raygen shader", programs.main.name))
                })?;
                let raygen = load_stage(device, compiler, raygen)?;
                let main = if stage == Stage::Raygen {
                    None
                } else {
                    Some(load_stage(device, compiler, &programs.main)?)
                };
                let groups = ray_tracing_groups(stage, raygen, main)?;

                let pipeline = RayTracingPipeline::new(device, &groups, pipeline_layout.clone(), 1)?;
                let sbt = ShaderBindingTable::new(
                    device,
                    &ctx.allocator,
                    &pipeline,
                    ctx.capabilities.shader_group_handle_size,
                    ctx.capabilities.shader_group_base_alignment,
                )?;
                StagePipeline::RayTracing { pipeline, sbt }
            }
        };

        let acceleration_structures = if stage.needs_acceleration_structure() {
            let geometry = geometry_for(stage).ok_or_else(|| {
                HarnessError::Internal(format!("{} has no scene geometry", stage))
            })?;
            let structures = SceneAccelerationStructures::build(
                device,
                &ctx.allocator,
                recorder.command_buffer(),
                geometry,
                ctx.capabilities.min_scratch_alignment,
            )?;
            descriptor_set.write(&[DescriptorWrite::AccelerationStructure {
                binding: ACCELERATION_STRUCTURE_BINDING,
                handle: structures.tlas.inner,
            }]);
            Some(structures)
        } else {
            None
        };

        log::debug!(
            "Created {:?} pipeline for {} ({})",
            kind,
            stage,
            programs.main.name
        );

        Ok(StageData {
            stage,
            descriptor_layout,
            descriptor_set,
            pipeline_layout,
            pipeline,
            acceleration_structures,
        })
    }

    ///Writes the remaining descriptors of the set.
    pub fn write_descriptors(&self, writes: &[DescriptorWrite]) {
        self.descriptor_set.write(writes);
    }

    ///Binds the pipeline and the set and records the work of the stage: a 32x32 dispatch, a full screen draw into
    /// a 32x32 render area or a 32x32 trace.
    pub fn record_execution<P: CommandBufferAllocator>(&self, recorder: &mut Recorder<'_, P>) {
        let bind_point = self.pipeline.bind_point();
        let pipeline = self.pipeline.handle();
        let layout = self.pipeline_layout.layout;
        let set = self.descriptor_set.inner;

        recorder.record(|device, cmd| unsafe {
            device.cmd_bind_pipeline(cmd, bind_point, pipeline);
            device.cmd_bind_descriptor_sets(cmd, bind_point, layout, 0, &[set], &[]);
        });

        match &self.pipeline {
            StagePipeline::Compute(_) => recorder.record(|device, cmd| unsafe {
                device.cmd_dispatch(cmd, IMAGE_DIM, IMAGE_DIM, 1)
            }),
            StagePipeline::Graphics {
                framebuffer,
                vertex_buffer,
                ..
            } => {
                let begin_info = vk::RenderPassBeginInfo::default()
                    .render_pass(framebuffer.renderpass.inner)
                    .framebuffer(framebuffer.inner)
                    .render_area(framebuffer.render_area());
                let vertices = vertex_buffer.inner;
                recorder.record(|device, cmd| unsafe {
                    device.cmd_begin_render_pass(cmd, &begin_info, vk::SubpassContents::INLINE);
                    device.cmd_bind_vertex_buffers(cmd, 0, &[vertices], &[0]);
                    device.cmd_draw(cmd, FULL_SCREEN_QUAD.len() as u32, 1, 0, 0);
                    device.cmd_end_render_pass(cmd);
                });
            }
            StagePipeline::RayTracing { pipeline, sbt } => {
                recorder.record(|_device, cmd| {
                    pipeline.cmd_trace_rays(cmd, sbt, IMAGE_DIM, IMAGE_DIM, 1)
                });
            }
        }
    }
}

fn load_stage(
    device: &Arc<Device>,
    compiler: &dyn ShaderCompiler,
    source: &ShaderSource,
) -> Result<ShaderStage, HarnessError> {
    let code = compiler.compile(source)?;
    let module = Arc::new(ShaderModule::new(device, &code)?);
    Ok(module.into_stage(source.kind.stage_flag()))
}

fn full_screen_quad<A: Allocator + Send + Sync + 'static>(
    device: &Arc<Device>,
    allocator: &Arc<Mutex<A>>,
) -> Result<Buffer, HarnessError> {
    let bytes: &[u8] = bytemuck::cast_slice(&FULL_SCREEN_QUAD);
    let mut buffer = Buffer::new(
        device,
        allocator,
        BufDesc::new(
            bytes.len() as vk::DeviceSize,
            vk::BufferUsageFlags::VERTEX_BUFFER,
        ),
        MemoryUsage::CpuToGpu,
        Some("full screen quad"),
        None,
    )?;
    buffer.write(0, bytes)?;
    buffer.flush_range()?;
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(StageData: Send, Sync);
    }

    #[test]
    fn ray_stages_have_geometry() {
        for stage in Stage::ALL {
            assert_eq!(
                geometry_for(stage).is_some(),
                stage.needs_acceleration_structure(),
                "{stage}"
            );
        }
        assert_eq!(geometry_for(Stage::Intersect), Some(Geometry::Aabb { z: -1.0 }));
        match geometry_for(Stage::Miss) {
            Some(Geometry::Triangles { z }) => assert!(z < -9.0),
            other => panic!("unexpected miss geometry {:?}", other),
        }
    }
}
