use ash::vk;

use crate::{error::VkCheck, foundation::debug_messenger::DebugType, gfx::Gfx};

/// 由调用者单独持有，可以被多个 pipeline 共享
///
/// # Destroy
/// 需要手动 destroy，且晚于所有使用它的 pipeline
pub struct PipelineLayout {
    handle: vk::PipelineLayout,
}
impl PipelineLayout {
    pub fn new(
        descriptor_set_layouts: &[vk::DescriptorSetLayout],
        push_constant_ranges: &[vk::PushConstantRange],
        debug_name: impl AsRef<str>,
    ) -> Self {
        let pipeline_layout_create_info = vk::PipelineLayoutCreateInfo::default()
            .set_layouts(descriptor_set_layouts)
            .push_constant_ranges(push_constant_ranges);
        let gfx_device = Gfx::get().gfx_device();
        let handle = unsafe {
            gfx_device.create_pipeline_layout(&pipeline_layout_create_info, None).vk_check("create pipeline layout")
        };
        let layout = PipelineLayout { handle };
        gfx_device.set_debug_name(&layout, debug_name);
        layout
    }

    #[inline]
    pub fn handle(&self) -> vk::PipelineLayout {
        self.handle
    }

    #[inline]
    pub fn destroy(self) {
        unsafe {
            Gfx::get().gfx_device().destroy_pipeline_layout(self.handle, None);
        }
    }
}
impl DebugType for PipelineLayout {
    fn debug_type_name() -> &'static str {
        "GfxPipelineLayout"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
