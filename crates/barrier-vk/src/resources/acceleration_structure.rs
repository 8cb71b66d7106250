use std::sync::{Arc, Mutex};

use ash::vk;

use crate::{
    allocator::{Allocator, MemoryUsage},
    context::Device,
    error::AccelerationStructureError,
    resources::{align_up, BufDesc, Buffer},
};

///Alignment Vulkan requires for the offset of an acceleration structure within its buffer.
const ACCELERATION_STRUCTURE_ALIGNMENT: u64 = 256;
///Instance buffers must be 16 byte aligned.
const INSTANCE_ALIGNMENT: u64 = 16;

///Geometry of a single-primitive-set bottom level acceleration structure.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Geometry {
    ///Two triangles covering `[-1, 1]²` at depth `z`.
    Triangles { z: f32 },
    ///One axis aligned box from `(-1, -1, z)` to `(1, 1, z)`.
    Aabb { z: f32 },
}

impl Geometry {
    pub fn geometry_type(&self) -> vk::GeometryTypeKHR {
        match self {
            Geometry::Triangles { .. } => vk::GeometryTypeKHR::TRIANGLES,
            Geometry::Aabb { .. } => vk::GeometryTypeKHR::AABBS,
        }
    }

    pub fn primitive_count(&self) -> u32 {
        match self {
            Geometry::Triangles { .. } => 2,
            Geometry::Aabb { .. } => 1,
        }
    }

    ///Vertex positions, or the min and max corner for an AABB, as they are uploaded.
    pub fn positions(&self) -> Vec<[f32; 3]> {
        match *self {
            Geometry::Triangles { z } => vec![
                [-1.0, -1.0, z],
                [-1.0, 1.0, z],
                [1.0, -1.0, z],
                [-1.0, 1.0, z],
                [1.0, -1.0, z],
                [1.0, 1.0, z],
            ],
            Geometry::Aabb { z } => vec![[-1.0, -1.0, z], [1.0, 1.0, z]],
        }
    }

    fn stride(&self) -> vk::DeviceSize {
        match self {
            Geometry::Triangles { .. } => core::mem::size_of::<[f32; 3]>() as vk::DeviceSize,
            Geometry::Aabb { .. } => core::mem::size_of::<[f32; 6]>() as vk::DeviceSize,
        }
    }

    fn as_vk_geometry(&self, data: vk::DeviceAddress) -> vk::AccelerationStructureGeometryKHR<'static> {
        let address = vk::DeviceOrHostAddressConstKHR {
            device_address: data,
        };
        let geometry = match self {
            Geometry::Triangles { .. } => vk::AccelerationStructureGeometryDataKHR {
                triangles: vk::AccelerationStructureGeometryTrianglesDataKHR::default()
                    .vertex_format(vk::Format::R32G32B32_SFLOAT)
                    .vertex_data(address)
                    .vertex_stride(self.stride())
                    .max_vertex(self.positions().len() as u32 - 1)
                    .index_type(vk::IndexType::NONE_KHR),
            },
            Geometry::Aabb { .. } => vk::AccelerationStructureGeometryDataKHR {
                aabbs: vk::AccelerationStructureGeometryAabbsDataKHR::default()
                    .data(address)
                    .stride(self.stride()),
            },
        };

        //not opaque, otherwise any-hit shaders would never run
        vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(self.geometry_type())
            .geometry(geometry)
            .flags(vk::GeometryFlagsKHR::empty())
    }
}

///Acceleration structure together with the buffer that backs it. Destroyed on drop.
pub struct AccelerationStructure {
    pub device: Arc<Device>,
    pub loader: ash::khr::acceleration_structure::Device,
    pub inner: vk::AccelerationStructureKHR,
    pub ty: vk::AccelerationStructureTypeKHR,
    pub buffer: Buffer,
}

impl AccelerationStructure {
    ///Creates an unbuilt acceleration structure of `size` bytes.
    pub fn new<A: Allocator + Send + Sync + 'static>(
        device: &Arc<Device>,
        allocator: &Arc<Mutex<A>>,
        ty: vk::AccelerationStructureTypeKHR,
        size: vk::DeviceSize,
        name: Option<&str>,
    ) -> Result<Self, AccelerationStructureError> {
        let loader = device
            .acceleration_structure
            .clone()
            .ok_or(AccelerationStructureError::NotLoaded)?;

        let buffer = Buffer::new(
            device,
            allocator,
            BufDesc::new(
                size,
                vk::BufferUsageFlags::ACCELERATION_STRUCTURE_STORAGE_KHR
                    | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
            ),
            MemoryUsage::GpuOnly,
            name,
            Some(ACCELERATION_STRUCTURE_ALIGNMENT),
        )?;

        let create_info = vk::AccelerationStructureCreateInfoKHR::default()
            .buffer(buffer.inner)
            .offset(0)
            .size(size)
            .ty(ty);
        let inner = unsafe { loader.create_acceleration_structure(&create_info, None)? };

        Ok(AccelerationStructure {
            device: device.clone(),
            loader,
            inner,
            ty,
            buffer,
        })
    }

    pub fn device_address(&self) -> vk::DeviceAddress {
        let info = vk::AccelerationStructureDeviceAddressInfoKHR::default()
            .acceleration_structure(self.inner);
        unsafe { self.loader.get_acceleration_structure_device_address(&info) }
    }
}

impl Drop for AccelerationStructure {
    fn drop(&mut self) {
        unsafe {
            self.loader
                .destroy_acceleration_structure(self.inner, None)
        }
    }
}

///A bottom level structure with one geometry and a top level structure holding a single instance of it.
///
/// Both builds are recorded into a caller supplied command buffer. All buffers the builds read from are kept alive
/// here, so the value must outlive the execution of that command buffer.
pub struct SceneAccelerationStructures {
    pub blas: AccelerationStructure,
    pub tlas: AccelerationStructure,
    pub geometry: Geometry,
    //build inputs, only held until the recorded builds executed
    #[allow(dead_code)]
    geometry_buffer: Buffer,
    #[allow(dead_code)]
    instance_buffer: Buffer,
    #[allow(dead_code)]
    scratch: Vec<Buffer>,
}

impl SceneAccelerationStructures {
    ///Creates both structures and records their builds into `command_buffer`. After the recorded commands executed
    /// the top level structure is ready for ray tracing.
    pub fn build<A: Allocator + Send + Sync + 'static>(
        device: &Arc<Device>,
        allocator: &Arc<Mutex<A>>,
        command_buffer: vk::CommandBuffer,
        geometry: Geometry,
        min_scratch_alignment: u32,
    ) -> Result<Self, AccelerationStructureError> {
        let positions = geometry.positions();
        let geometry_buffer = input_buffer(device, allocator, "blas geometry", bytemuck::cast_slice(&positions), 0)?;
        let vk_geometry = geometry.as_vk_geometry(geometry_buffer.device_address()?);

        let (blas, blas_scratch) = build_level(
            device,
            allocator,
            command_buffer,
            vk::AccelerationStructureTypeKHR::BOTTOM_LEVEL,
            vk_geometry,
            geometry.primitive_count(),
            min_scratch_alignment,
        )?;

        //BLAS must be complete before the TLAS build reads it.
        record_build_barrier(device, command_buffer);

        let instance = vk::AccelerationStructureInstanceKHR {
            transform: vk::TransformMatrixKHR {
                matrix: [1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0],
            },
            instance_custom_index_and_mask: vk::Packed24_8::new(0, 0xff),
            instance_shader_binding_table_record_offset_and_flags: vk::Packed24_8::new(0, 0),
            acceleration_structure_reference: vk::AccelerationStructureReferenceKHR {
                device_handle: blas.device_address(),
            },
        };
        let instance_bytes = unsafe {
            core::slice::from_raw_parts(
                (&instance as *const vk::AccelerationStructureInstanceKHR).cast::<u8>(),
                core::mem::size_of::<vk::AccelerationStructureInstanceKHR>(),
            )
        };
        let instance_buffer = input_buffer(device, allocator, "tlas instances", instance_bytes, INSTANCE_ALIGNMENT)?;

        let instances = vk::AccelerationStructureGeometryKHR::default()
            .geometry_type(vk::GeometryTypeKHR::INSTANCES)
            .geometry(vk::AccelerationStructureGeometryDataKHR {
                instances: vk::AccelerationStructureGeometryInstancesDataKHR::default()
                    .array_of_pointers(false)
                    .data(vk::DeviceOrHostAddressConstKHR {
                        device_address: instance_buffer.device_address()?,
                    }),
            });

        let (tlas, tlas_scratch) = build_level(
            device,
            allocator,
            command_buffer,
            vk::AccelerationStructureTypeKHR::TOP_LEVEL,
            instances,
            1,
            min_scratch_alignment,
        )?;

        record_build_barrier(device, command_buffer);

        #[cfg(feature = "logging")]
        log::trace!("Recorded acceleration structure builds for {:?}", geometry);

        Ok(SceneAccelerationStructures {
            blas,
            tlas,
            geometry,
            geometry_buffer,
            instance_buffer,
            scratch: vec![blas_scratch, tlas_scratch],
        })
    }
}

fn input_buffer<A: Allocator + Send + Sync + 'static>(
    device: &Arc<Device>,
    allocator: &Arc<Mutex<A>>,
    name: &str,
    data: &[u8],
    alignment: u64,
) -> Result<Buffer, AccelerationStructureError> {
    let mut buffer = Buffer::new(
        device,
        allocator,
        BufDesc::new(
            data.len() as vk::DeviceSize,
            vk::BufferUsageFlags::ACCELERATION_STRUCTURE_BUILD_INPUT_READ_ONLY_KHR
                | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
        ),
        MemoryUsage::CpuToGpu,
        Some(name),
        if alignment > 0 { Some(alignment) } else { None },
    )?;
    buffer
        .write(0, data)
        .map_err(crate::error::ResourceError::from)?;
    buffer.flush_range()?;
    Ok(buffer)
}

///Creates the structure for `geometry` and records its build. Returns the scratch buffer that has to live until
/// the build executed.
fn build_level<A: Allocator + Send + Sync + 'static>(
    device: &Arc<Device>,
    allocator: &Arc<Mutex<A>>,
    command_buffer: vk::CommandBuffer,
    ty: vk::AccelerationStructureTypeKHR,
    geometry: vk::AccelerationStructureGeometryKHR<'static>,
    primitive_count: u32,
    min_scratch_alignment: u32,
) -> Result<(AccelerationStructure, Buffer), AccelerationStructureError> {
    let loader = device
        .acceleration_structure
        .as_ref()
        .ok_or(AccelerationStructureError::NotLoaded)?;

    let mut build_info = vk::AccelerationStructureBuildGeometryInfoKHR::default()
        .ty(ty)
        .flags(vk::BuildAccelerationStructureFlagsKHR::PREFER_FAST_TRACE)
        .mode(vk::BuildAccelerationStructureModeKHR::BUILD)
        .geometries(core::slice::from_ref(&geometry));

    let mut sizes = vk::AccelerationStructureBuildSizesInfoKHR::default();
    unsafe {
        loader.get_acceleration_structure_build_sizes(
            vk::AccelerationStructureBuildTypeKHR::DEVICE,
            &build_info,
            &[primitive_count],
            &mut sizes,
        )
    };

    let name = if ty == vk::AccelerationStructureTypeKHR::TOP_LEVEL {
        "tlas"
    } else {
        "blas"
    };
    let structure = AccelerationStructure::new(
        device,
        allocator,
        ty,
        sizes.acceleration_structure_size,
        Some(name),
    )?;

    let alignment = u64::from(min_scratch_alignment.max(1));
    let scratch = Buffer::new(
        device,
        allocator,
        BufDesc::new(
            align_up(sizes.build_scratch_size.max(1), alignment),
            vk::BufferUsageFlags::STORAGE_BUFFER | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
        ),
        MemoryUsage::GpuOnly,
        Some("acceleration structure scratch"),
        Some(alignment),
    )?;
    let scratch_address = align_up(scratch.device_address()?, alignment);

    build_info = build_info
        .dst_acceleration_structure(structure.inner)
        .scratch_data(vk::DeviceOrHostAddressKHR {
            device_address: scratch_address,
        });

    let range = vk::AccelerationStructureBuildRangeInfoKHR::default()
        .primitive_count(primitive_count)
        .primitive_offset(0)
        .first_vertex(0)
        .transform_offset(0);

    unsafe {
        loader.cmd_build_acceleration_structures(
            command_buffer,
            core::slice::from_ref(&build_info),
            &[core::slice::from_ref(&range)],
        )
    };

    Ok((structure, scratch))
}

fn record_build_barrier(device: &Device, command_buffer: vk::CommandBuffer) {
    let barrier = vk::MemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::ACCELERATION_STRUCTURE_BUILD_KHR)
        .src_access_mask(vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR)
        .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .dst_access_mask(vk::AccessFlags2::ACCELERATION_STRUCTURE_READ_KHR);
    let dependency =
        vk::DependencyInfo::default().memory_barriers(core::slice::from_ref(&barrier));
    unsafe {
        device
            .inner
            .cmd_pipeline_barrier2(command_buffer, &dependency)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(AccelerationStructure: Send, Sync);
        assert_impl_all!(SceneAccelerationStructures: Send, Sync);
    }

    #[test]
    fn triangles_cover_unit_square() {
        let geometry = Geometry::Triangles { z: -9.9 };
        let positions = geometry.positions();
        assert_eq!(positions.len(), 6);
        assert_eq!(positions.len() as u32, geometry.primitive_count() * 3);
        assert!(positions.iter().all(|p| p[2] == -9.9));
        assert_eq!(geometry.geometry_type(), vk::GeometryTypeKHR::TRIANGLES);
    }

    #[test]
    fn aabb_is_one_box() {
        let geometry = Geometry::Aabb { z: -1.0 };
        let positions = geometry.positions();
        assert_eq!(geometry.primitive_count(), 1);
        assert_eq!(positions, vec![[-1.0, -1.0, -1.0], [1.0, 1.0, -1.0]]);
        //two corners, one AABB record of six floats
        assert_eq!(
            positions.len() * core::mem::size_of::<[f32; 3]>(),
            geometry.stride() as usize
        );
    }
}
