use std::sync::Arc;

use ash::vk;

use super::PipelineLayout;
use crate::context::Device;
use crate::error::PipelineError;
use crate::resources::ShaderStage;

///Renderpass describing the order of shader invocation. Note that this is only a thin wrapper over the creation and destruction process.
pub struct RenderPass {
    pub device: Arc<Device>,
    pub inner: vk::RenderPass,
}

impl RenderPass {
    pub fn new(device: &Arc<Device>, create_info: &vk::RenderPassCreateInfo) -> Result<Self, vk::Result> {
        let renderpass = unsafe { device.inner.create_render_pass(create_info, None)? };
        Ok(RenderPass {
            device: device.clone(),
            inner: renderpass,
        })
    }

    ///Render pass with a single graphics subpass and no attachments at all. Fragment shaders of such a pass only
    /// communicate through descriptors.
    pub fn new_attachmentless(device: &Arc<Device>) -> Result<Self, vk::Result> {
        let subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS);
        let create_info =
            vk::RenderPassCreateInfo::default().subpasses(core::slice::from_ref(&subpass));
        Self::new(device, &create_info)
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_render_pass(self.inner, None) }
    }
}

///Framebuffer without attachments. Keeps its render pass alive.
pub struct Framebuffer {
    pub device: Arc<Device>,
    pub inner: vk::Framebuffer,
    pub renderpass: Arc<RenderPass>,
    pub extent: vk::Extent2D,
}

impl Framebuffer {
    pub fn new_attachmentless(
        device: &Arc<Device>,
        renderpass: Arc<RenderPass>,
        extent: vk::Extent2D,
    ) -> Result<Self, vk::Result> {
        let create_info = vk::FramebufferCreateInfo::default()
            .render_pass(renderpass.inner)
            .width(extent.width)
            .height(extent.height)
            .layers(1);
        let framebuffer = unsafe { device.inner.create_framebuffer(&create_info, None)? };

        Ok(Framebuffer {
            device: device.clone(),
            inner: framebuffer,
            renderpass,
            extent,
        })
    }

    pub fn render_area(&self) -> vk::Rect2D {
        vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent: self.extent,
        }
    }
}

impl Drop for Framebuffer {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_framebuffer(self.inner, None) }
    }
}

///Pipeline that manages its own lifetime and keeps its layout and render pass alive.
pub struct GraphicsPipeline {
    pub device: Arc<Device>,
    pub pipeline: vk::Pipeline,
    pub layout: Arc<PipelineLayout>,
    pub renderpass: Arc<RenderPass>,
}

impl GraphicsPipeline {
    ///Simplest graphics pipeline wrapper. Assumes that `create_info` is valid. Sets `layout` and `renderpass`
    /// on the `create_info` before executing.
    pub fn new(
        device: &Arc<Device>,
        create_info: vk::GraphicsPipelineCreateInfo,
        layout: Arc<PipelineLayout>,
        renderpass: Arc<RenderPass>,
    ) -> Result<Self, PipelineError> {
        let create_info = create_info
            .layout(layout.layout)
            .render_pass(renderpass.inner);

        let mut pipelines = unsafe {
            match device.inner.create_graphics_pipelines(
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

        Ok(GraphicsPipeline {
            device: device.clone(),
            pipeline: pipelines.remove(0),
            layout,
            renderpass,
        })
    }

    ///Creates a pipeline that draws a triangle list of `vec4` positions at location 0 into `extent`. Nothing is culled,
    /// there is no depth test and no color output.
    pub fn new_vec4_triangles(
        device: &Arc<Device>,
        vertex: &ShaderStage,
        fragment: &ShaderStage,
        layout: Arc<PipelineLayout>,
        renderpass: Arc<RenderPass>,
        extent: vk::Extent2D,
    ) -> Result<Self, PipelineError> {
        let stages = [vertex.as_create_info(None), fragment.as_create_info(None)];

        let binding = vk::VertexInputBindingDescription {
            binding: 0,
            stride: core::mem::size_of::<[f32; 4]>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        };
        let attribute = vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32A32_SFLOAT,
            offset: 0,
        };
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(core::slice::from_ref(&binding))
            .vertex_attribute_descriptions(core::slice::from_ref(&attribute));
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scissor = vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        };
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(core::slice::from_ref(&viewport))
            .scissors(core::slice::from_ref(&scissor));

        let rasterization = vk::PipelineRasterizationStateCreateInfo::default()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(vk::CullModeFlags::NONE)
            .front_face(vk::FrontFace::COUNTER_CLOCKWISE)
            .line_width(1.0);
        let multisample = vk::PipelineMultisampleStateCreateInfo::default()
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default();
        let color_blend = vk::PipelineColorBlendStateCreateInfo::default();

        let create_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .subpass(0);

        Self::new(device, create_info, layout, renderpass)
    }
}

impl Drop for GraphicsPipeline {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_pipeline(self.pipeline, None) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(RenderPass: Send, Sync);
        assert_impl_all!(Framebuffer: Send, Sync);
        assert_impl_all!(GraphicsPipeline: Send, Sync);
    }
}
