//! Execution of a single case.
//!
//! All work of a case is recorded into one command buffer: acceleration structure builds, the writer, the barrier
//! under test, the reader and the barrier that makes the reader's output visible to the host. After the single
//! submission finished the host reads the verification buffer and compares it against the expected sequence.

use std::{fmt::Display, sync::Arc};

use barrier_commands::{staging, BarrierBuilder, ManagedCommands, Recorder, TrackedImage};
use barrier_matrix::{
    data::{self, IMAGE_DIM, IMAGE_FORMAT, STD140_BUFFER_SIZE, STD430_BUFFER_SIZE},
    CasePrograms, Role, ShaderGenError, Stage, StagePrograms, TestCase,
};
use barrier_vk::{
    allocator::{Allocator, MemoryUsage},
    ash::vk,
    context::{Ctx, DeviceCapabilities},
    resources::{
        BufDesc, Buffer, CommandBufferAllocator, DescriptorWrite, Image, ImageView, ImgDesc,
        SafeImageView,
    },
    HarnessError,
};

use crate::{
    compiler::ShaderCompiler,
    stage_data::{StageData, ACCELERATION_STRUCTURE_BINDING},
    support::check_support,
};

///Outcome of a case.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TestStatus {
    Pass,
    Fail(String),
    ///The device lacks a feature or extension the case needs.
    NotSupported(String),
}

impl TestStatus {
    pub fn is_fail(&self) -> bool {
        matches!(self, TestStatus::Fail(_))
    }
}

impl Display for TestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestStatus::Pass => write!(f, "Pass"),
            TestStatus::Fail(msg) => write!(f, "Fail({})", msg),
            TestStatus::NotSupported(msg) => write!(f, "NotSupported({})", msg),
        }
    }
}

impl From<HarnessError> for TestStatus {
    fn from(e: HarnessError) -> Self {
        match e {
            HarnessError::NotSupported(msg) => TestStatus::NotSupported(msg),
            other => TestStatus::Fail(other.to_string()),
        }
    }
}

///The tested resource. Images carry their tracked layout and the view both sides bind.
enum TestResource {
    Buffer(Buffer),
    Image {
        image: TrackedImage,
        view: ImageView,
    },
}

impl TestResource {
    fn new<A: Allocator + Send + Sync + 'static>(
        ctx: &Ctx<A>,
        case: &TestCase,
    ) -> Result<Self, HarnessError> {
        if case.resource.is_buffer() {
            let usage = if case.writer == Stage::Host {
                MemoryUsage::CpuToGpu
            } else if case.reader == Stage::Host {
                MemoryUsage::GpuToCpu
            } else {
                MemoryUsage::GpuOnly
            };
            let buffer = Buffer::new(
                &ctx.device,
                &ctx.allocator,
                BufDesc::new(STD140_BUFFER_SIZE, case.resource_buffer_usage()),
                usage,
                Some("tested buffer"),
                None,
            )?;
            Ok(TestResource::Buffer(buffer))
        } else {
            let image = Arc::new(Image::new(
                &ctx.device,
                &ctx.allocator,
                ImgDesc::storage_image_2d(IMAGE_DIM, IMAGE_DIM, IMAGE_FORMAT)
                    .add_usage(case.resource_image_usage()),
                MemoryUsage::GpuOnly,
                Some("tested image"),
            )?);
            let view = image.view(image.view_all())?;
            Ok(TestResource::Image {
                image: TrackedImage::new(image),
                view,
            })
        }
    }

    ///Descriptor of the resource at binding 0. Images are bound in their currently tracked layout.
    fn descriptor(&self, ty: vk::DescriptorType) -> DescriptorWrite {
        match self {
            TestResource::Buffer(buffer) => DescriptorWrite::Buffer {
                binding: 0,
                ty,
                info: buffer.descriptor_info(),
            },
            TestResource::Image { image, view } => DescriptorWrite::StorageImage {
                binding: 0,
                view: view.view,
                layout: image.layout(),
            },
        }
    }

    fn layout(&self) -> vk::ImageLayout {
        match self {
            TestResource::Buffer(_) => vk::ImageLayout::UNDEFINED,
            TestResource::Image { image, .. } => image.layout(),
        }
    }
}

///A case together with its generated shaders.
#[derive(Clone, Debug)]
pub struct BarrierTest {
    pub case: TestCase,
    pub programs: CasePrograms,
}

impl BarrierTest {
    pub fn new(case: TestCase) -> Result<Self, ShaderGenError> {
        let programs = CasePrograms::generate(&case)?;
        Ok(BarrierTest { case, programs })
    }

    ///Checks device support for this case without touching the device.
    pub fn check_support(&self, caps: &DeviceCapabilities) -> Result<(), HarnessError> {
        check_support(&self.case, caps)
    }

    ///Runs the case once on `ctx`.
    pub fn iterate<A: Allocator + Send + Sync + 'static>(
        &self,
        ctx: &Ctx<A>,
        compiler: &dyn ShaderCompiler,
    ) -> TestStatus {
        let values = match self.execute(ctx, compiler) {
            Ok(values) => values,
            Err(e) => {
                if !e.is_not_supported() {
                    log::error!("{}: {}", self.case, e);
                }
                return e.into();
            }
        };

        match data::verify(&values) {
            Ok(()) => TestStatus::Pass,
            Err(mismatch) => TestStatus::Fail(mismatch.to_string()),
        }
    }

    ///Runs the whole case and returns the values the reader produced.
    pub fn execute<A: Allocator + Send + Sync + 'static>(
        &self,
        ctx: &Ctx<A>,
        compiler: &dyn ShaderCompiler,
    ) -> Result<Vec<u32>, HarnessError> {
        let case = &self.case;
        self.check_support(&ctx.capabilities)?;

        let device = &ctx.device;
        let queue = ctx
            .queue()
            .ok_or_else(|| HarnessError::Internal("context has no queue".to_owned()))?;

        let mut resource = TestResource::new(ctx, case)?;
        let mut verification = Buffer::new(
            device,
            &ctx.allocator,
            BufDesc::new(STD430_BUFFER_SIZE, case.verification_buffer_usage()),
            MemoryUsage::GpuToCpu,
            Some("verification buffer"),
            None,
        )?;
        verification.write(0, &vec![0u8; STD430_BUFFER_SIZE as usize])?;
        verification.flush_range()?;

        if case.writer == Stage::Host {
            if let TestResource::Buffer(buffer) = &mut resource {
                buffer.write(0, bytemuck::cast_slice(&data::std140_values()))?;
                buffer.flush_range()?;
            }
        }

        let mut commands = ManagedCommands::new_for_queue(device, queue)?;
        let mut recorder = commands.start_recording()?;

        //Both sides are created up front, so all acceleration structure builds precede the writer.
        let writer = match &self.programs.writer {
            Some(programs) => Some(self.stage_data(ctx, &mut recorder, programs, compiler)?),
            None => None,
        };
        let reader = match &self.programs.reader {
            Some(programs) => Some(self.stage_data(ctx, &mut recorder, programs, compiler)?),
            None => None,
        };

        self.record_writer(ctx, &mut recorder, &mut resource, writer.as_ref())?;
        self.record_main_barrier(&mut recorder, &mut resource)?;
        self.record_reader(&mut recorder, &resource, &verification, reader.as_ref())?;

        let mut builder = BarrierBuilder::new();
        builder.buffer_plan(&case.verification_barrier(), verification.inner)?;
        recorder.barrier(&builder);

        recorder.finish_recording()?;
        commands.submit_and_wait(device, queue)?;

        if case.reader == Stage::Host {
            let TestResource::Buffer(buffer) = &resource else {
                return Err(HarnessError::Internal(
                    "host reads are only defined for buffers".to_owned(),
                ));
            };
            buffer.invalidate_range()?;
            let values = data::unpack_std140(buffer.read()?).ok_or_else(|| {
                HarnessError::Internal("tested buffer is smaller than its data".to_owned())
            })?;
            verification.write(0, bytemuck::cast_slice(&values))?;
            verification.flush_range()?;
        }

        verification.invalidate_range()?;
        let values = data::unpack_std430(verification.read()?).ok_or_else(|| {
            HarnessError::Internal("verification buffer is smaller than its data".to_owned())
        })?;

        log::debug!("{}: read back {} values", case, values.len());
        Ok(values)
    }

    ///Descriptor bindings of one side. The tested resource is visible to every shader of the case, the acceleration
    /// structure and the verification buffer only to the side that uses them.
    pub fn bindings(&self, programs: &StagePrograms) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
        let stage_flags = programs.stage.stage_flags();
        let mut bindings = vec![vk::DescriptorSetLayoutBinding::default()
            .binding(0)
            .descriptor_type(self.case.resource.descriptor_type())
            .descriptor_count(1)
            .stage_flags(self.case.all_stage_flags())];

        if programs.stage.needs_acceleration_structure() {
            bindings.push(
                vk::DescriptorSetLayoutBinding::default()
                    .binding(ACCELERATION_STRUCTURE_BINDING)
                    .descriptor_type(vk::DescriptorType::ACCELERATION_STRUCTURE_KHR)
                    .descriptor_count(1)
                    .stage_flags(stage_flags),
            );
        }

        if programs.role == Role::Reader {
            bindings.push(
                vk::DescriptorSetLayoutBinding::default()
                    .binding(self.case.verification_binding())
                    .descriptor_type(vk::DescriptorType::STORAGE_BUFFER)
                    .descriptor_count(1)
                    .stage_flags(stage_flags),
            );
        }

        bindings
    }

    fn stage_data<A, P>(
        &self,
        ctx: &Ctx<A>,
        recorder: &mut Recorder<'_, P>,
        programs: &StagePrograms,
        compiler: &dyn ShaderCompiler,
    ) -> Result<StageData, HarnessError>
    where
        A: Allocator + Send + Sync + 'static,
        P: CommandBufferAllocator,
    {
        StageData::new(ctx, recorder, programs, compiler, &self.bindings(programs))
    }

    fn record_writer<A, P>(
        &self,
        ctx: &Ctx<A>,
        recorder: &mut Recorder<'_, P>,
        resource: &mut TestResource,
        writer: Option<&StageData>,
    ) -> Result<(), HarnessError>
    where
        A: Allocator + Send + Sync + 'static,
        P: CommandBufferAllocator,
    {
        let case = &self.case;

        if let TestResource::Image { image, .. } = resource {
            if let Some(plan) = case.writer_transition(image.layout()) {
                image.transition(recorder, &plan)?;
            }
        }

        match case.writer {
            //written before recording
            Stage::Host => {}
            Stage::Transfer => match resource {
                TestResource::Buffer(buffer) => staging::record_buffer_upload(
                    &ctx.device,
                    &ctx.allocator,
                    recorder,
                    &data::std140_values(),
                    buffer,
                )?,
                TestResource::Image { image, .. } => staging::record_image_upload(
                    &ctx.device,
                    &ctx.allocator,
                    recorder,
                    &data::std430_values(),
                    image,
                )?,
            },
            _ => {
                let writer = writer.ok_or_else(|| {
                    HarnessError::Internal(format!("no pipeline for writer {}", case.writer))
                })?;
                writer.write_descriptors(&[resource.descriptor(case.resource.descriptor_type())]);
                writer.record_execution(recorder);
            }
        }

        Ok(())
    }

    fn record_main_barrier<P: CommandBufferAllocator>(
        &self,
        recorder: &mut Recorder<'_, P>,
        resource: &mut TestResource,
    ) -> Result<(), HarnessError> {
        let plan = self.case.main_barrier(resource.layout());
        match resource {
            TestResource::Buffer(buffer) => {
                let mut builder = BarrierBuilder::new();
                builder.buffer_plan(&plan, buffer.inner)?;
                recorder.barrier(&builder);
            }
            TestResource::Image { image, .. } => {
                image.transition(recorder, &plan)?;
                let expected = match plan.new_layout() {
                    Some(layout) => layout,
                    None => vk::ImageLayout::GENERAL,
                };
                if image.layout() != expected {
                    return Err(HarnessError::Internal(format!(
                        "image is in {:?} after the barrier, expected {:?}",
                        image.layout(),
                        expected
                    )));
                }
            }
        }
        Ok(())
    }

    fn record_reader<P: CommandBufferAllocator>(
        &self,
        recorder: &mut Recorder<'_, P>,
        resource: &TestResource,
        verification: &Buffer,
        reader: Option<&StageData>,
    ) -> Result<(), HarnessError> {
        let case = &self.case;
        let dst = verification.inner;

        match case.reader {
            //read after the submission
            Stage::Host => {}
            Stage::Transfer => match resource {
                TestResource::Buffer(buffer) => {
                    let src = buffer.inner;
                    let regions = data::std140_to_std430_regions();
                    recorder.record(|device, cmd| unsafe {
                        device.cmd_copy_buffer(cmd, src, dst, &regions)
                    });
                }
                TestResource::Image { image, .. } => {
                    let src = image.image().inner;
                    let layout = image.layout();
                    let region = image.image().buffer_copy_region();
                    recorder.record(|device, cmd| unsafe {
                        device.cmd_copy_image_to_buffer(
                            cmd,
                            src,
                            layout,
                            dst,
                            core::slice::from_ref(&region),
                        )
                    });
                }
            },
            _ => {
                let reader = reader.ok_or_else(|| {
                    HarnessError::Internal(format!("no pipeline for reader {}", case.reader))
                })?;
                reader.write_descriptors(&[
                    resource.descriptor(case.resource.descriptor_type()),
                    DescriptorWrite::Buffer {
                        binding: case.verification_binding(),
                        ty: vk::DescriptorType::STORAGE_BUFFER,
                        info: verification.descriptor_info(),
                    },
                ]);
                reader.record_execution(recorder);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test(path: &str) -> BarrierTest {
        BarrierTest::new(TestCase::from_path(path).unwrap()).unwrap()
    }

    #[test]
    fn status_display() {
        assert_eq!(TestStatus::Pass.to_string(), "Pass");
        assert_eq!(
            TestStatus::Fail("Unexpected value found at position 3: found 0 and expected 2051".into())
                .to_string(),
            "Fail(Unexpected value found at position 3: found 0 and expected 2051)"
        );
        assert!(!TestStatus::NotSupported("x".into()).is_fail());
    }

    #[test]
    fn not_supported_is_a_skip() {
        let status: TestStatus = HarnessError::NotSupported("rayTracingPipeline".into()).into();
        assert_eq!(status, TestStatus::NotSupported("rayTracingPipeline".into()));

        let status: TestStatus = HarnessError::Internal("layout".into()).into();
        assert!(status.is_fail());
    }

    #[test]
    fn writer_bindings() {
        let t = test("barrier.ssbo.specific_barrier.from_ahit_to_comp");
        let writer = t.programs.writer.as_ref().unwrap();
        let bindings = t.bindings(writer);
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::STORAGE_BUFFER);
        assert_eq!(
            bindings[0].stage_flags,
            vk::ShaderStageFlags::RAYGEN_KHR
                | vk::ShaderStageFlags::ANY_HIT_KHR
                | vk::ShaderStageFlags::COMPUTE
        );
        assert_eq!(bindings[1].binding, ACCELERATION_STRUCTURE_BINDING);
        assert_eq!(
            bindings[1].descriptor_type,
            vk::DescriptorType::ACCELERATION_STRUCTURE_KHR
        );
    }

    #[test]
    fn reader_verification_binding_follows_acceleration_structure() {
        let t = test("barrier.ubo.memory_barrier.from_xfer_to_miss");
        let reader = t.bindings(t.programs.reader.as_ref().unwrap());
        assert_eq!(reader.len(), 3);
        assert_eq!(reader[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(reader[2].binding, 2);
        assert_eq!(reader[2].descriptor_type, vk::DescriptorType::STORAGE_BUFFER);

        let t = test("barrier.simg.specific_barrier.from_rgen_to_comp");
        let reader = t.bindings(t.programs.reader.as_ref().unwrap());
        assert_eq!(reader.len(), 2);
        assert_eq!(reader[0].descriptor_type, vk::DescriptorType::STORAGE_IMAGE);
        assert_eq!(reader[1].binding, 1);
        assert_eq!(reader[1].stage_flags, vk::ShaderStageFlags::COMPUTE);
    }
}
