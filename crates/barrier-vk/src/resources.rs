mod image;
pub use image::{Image, ImageView, ImgDesc, ImgViewDesc, SafeImageView};

mod buffer;
pub use buffer::{BufDesc, Buffer};

mod descriptor;
pub use descriptor::{DescriptorPool, DescriptorSet, DescriptorSetLayout, DescriptorWrite};

pub mod pipeline;
pub use pipeline::{
    compute::ComputePipeline,
    graphics::{Framebuffer, GraphicsPipeline, RenderPass},
    ray_tracing::{RayTracingGroup, RayTracingPipeline, SbtRegion, ShaderBindingTable},
    PipelineLayout,
};

mod command_buffer;
pub use command_buffer::{CommandBuffer, CommandBufferAllocator, CommandPool};

mod shader_module;
pub use shader_module::{ShaderModule, ShaderStage};

mod acceleration_structure;
pub use acceleration_structure::{AccelerationStructure, Geometry, SceneAccelerationStructures};

///Rounds `value` up to the next multiple of `alignment`. An alignment of 0 leaves `value` unchanged.
pub fn align_up(value: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        value
    } else {
        value.div_ceil(alignment) * alignment
    }
}

#[cfg(test)]
mod tests {
    use super::align_up;

    #[test]
    fn alignment() {
        assert_eq!(align_up(0, 64), 0);
        assert_eq!(align_up(1, 64), 64);
        assert_eq!(align_up(64, 64), 64);
        assert_eq!(align_up(65, 64), 128);
        assert_eq!(align_up(33, 0), 33);
    }
}
