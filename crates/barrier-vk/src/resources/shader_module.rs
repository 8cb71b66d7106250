use crate::{context::Device, error::ShaderError};
use ash::vk;
use std::{ffi::CString, path::Path, sync::Arc};

///Single shader module
pub struct ShaderModule {
    pub device: Arc<Device>,
    pub module: vk::ShaderModule,
}

impl ShaderModule {
    ///Reads file at `path`, checks that it is a spirv file and, if so, tries to create the shader module from it.
    pub fn new_from_file(device: &Arc<Device>, file: impl AsRef<Path>) -> Result<Self, ShaderError> {
        let mut file = std::fs::File::open(file)?;
        let code = ash::util::read_spv(&mut file)?;

        Self::new(device, &code)
    }

    pub fn new(device: &Arc<Device>, code: &[u32]) -> Result<Self, ShaderError> {
        let create_info = vk::ShaderModuleCreateInfo::default().code(code);
        let module = unsafe { device.inner.create_shader_module(&create_info, None)? };

        Ok(ShaderModule {
            device: device.clone(),
            module,
        })
    }

    ///Creates a shader stage from this module, using `main` as entry point.
    pub fn into_stage(self: Arc<Self>, stage: vk::ShaderStageFlags) -> ShaderStage {
        ShaderStage {
            module: self,
            stage,
            entry_point: CString::from(c"main"),
        }
    }
}

impl Drop for ShaderModule {
    fn drop(&mut self) {
        unsafe { self.device.inner.destroy_shader_module(self.module, None) }
    }
}

///Shader module bound to a single pipeline stage and entry point.
pub struct ShaderStage {
    pub module: Arc<ShaderModule>,
    pub stage: vk::ShaderStageFlags,
    pub entry_point: CString,
}

impl ShaderStage {
    pub fn as_create_info<'a>(
        &'a self,
        specialization_info: Option<&'a vk::SpecializationInfo<'a>>,
    ) -> vk::PipelineShaderStageCreateInfo<'a> {
        let info = vk::PipelineShaderStageCreateInfo::default()
            .module(self.module.module)
            .stage(self.stage)
            .name(&self.entry_point);

        if let Some(si) = specialization_info {
            info.specialization_info(si)
        } else {
            info
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    #[test]
    fn impl_send_sync() {
        assert_impl_all!(ShaderModule: Send, Sync);
        assert_impl_all!(ShaderStage: Send, Sync);
    }
}
