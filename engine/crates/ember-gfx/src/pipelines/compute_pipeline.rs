use ash::vk;

use crate::{error::GfxError, foundation::debug_messenger::DebugType, gfx::Gfx, pipelines::shader::ShaderModule};

/// 计算管线，layout 由调用者持有
pub struct ComputePipeline {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}
impl ComputePipeline {
    /// 入口固定为 `main`；编译失败时写日志并返回错误
    pub fn new(layout: vk::PipelineLayout, shader: &ShaderModule, debug_name: &str) -> Result<Self, GfxError> {
        let stage_info = vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::COMPUTE)
            .module(shader.handle())
            .name(c"main");
        let pipeline_info = vk::ComputePipelineCreateInfo::default().layout(layout).stage(stage_info);

        let gfx_device = Gfx::get().gfx_device();
        let pipelines = unsafe {
            gfx_device.create_compute_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None)
        };
        let pipeline = match pipelines {
            Ok(pipelines) => pipelines[0],
            Err((_, result)) => {
                log::error!("failed to create compute pipeline {}: {:?}", debug_name, result);
                return Err(GfxError::PipelineCompile {
                    name: debug_name.to_string(),
                    result,
                });
            }
        };

        let pipeline = Self { pipeline, layout };
        gfx_device.set_debug_name(&pipeline, debug_name);
        Ok(pipeline)
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    #[inline]
    pub fn destroy(self) {
        unsafe {
            Gfx::get().gfx_device().destroy_pipeline(self.pipeline, None);
        }
    }
}
impl DebugType for ComputePipeline {
    fn debug_type_name() -> &'static str {
        "GfxComputePipeline"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.pipeline
    }
}
