use ash::vk;

use crate::{error::VkCheck, foundation::debug_messenger::DebugType, gfx::Gfx};

/// 逐个添加 binding，最后一次性创建 layout
///
/// ```ignore
/// let layout = DescriptorLayoutBuilder::default()
///     .add_binding(0, vk::DescriptorType::STORAGE_IMAGE)
///     .build(vk::ShaderStageFlags::COMPUTE, "draw-image");
/// ```
#[derive(Default)]
pub struct DescriptorLayoutBuilder {
    bindings: Vec<vk::DescriptorSetLayoutBinding<'static>>,
}

impl DescriptorLayoutBuilder {
    /// builder
    #[inline]
    pub fn add_binding(mut self, binding: u32, ty: vk::DescriptorType) -> Self {
        self.bindings.push(
            vk::DescriptorSetLayoutBinding::default().binding(binding).descriptor_type(ty).descriptor_count(1),
        );
        self
    }

    #[inline]
    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    /// 所有 binding 使用相同的 shader stage
    pub fn bindings_for_stage(&self, stages: vk::ShaderStageFlags) -> Vec<vk::DescriptorSetLayoutBinding<'static>> {
        self.bindings.iter().map(|b| b.stage_flags(stages)).collect()
    }

    pub fn build(&self, stages: vk::ShaderStageFlags, debug_name: &str) -> GfxDescriptorSetLayout {
        let bindings = self.bindings_for_stage(stages);
        let create_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        let gfx_device = Gfx::get().gfx_device();
        let handle = unsafe {
            gfx_device.create_descriptor_set_layout(&create_info, None).vk_check("create descriptor set layout")
        };
        let layout = GfxDescriptorSetLayout { handle };
        gfx_device.set_debug_name(&layout, debug_name);
        layout
    }
}

/// # Destroy
/// 需要手动 destroy
pub struct GfxDescriptorSetLayout {
    handle: vk::DescriptorSetLayout,
}
impl GfxDescriptorSetLayout {
    #[inline]
    pub fn handle(&self) -> vk::DescriptorSetLayout {
        self.handle
    }

    pub fn destroy(self) {
        unsafe {
            Gfx::get().gfx_device().destroy_descriptor_set_layout(self.handle, None);
        }
    }
}
impl DebugType for GfxDescriptorSetLayout {
    fn debug_type_name() -> &'static str {
        "GfxDescriptorSetLayout"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bindings_share_stage() {
        let builder = DescriptorLayoutBuilder::default()
            .add_binding(0, vk::DescriptorType::STORAGE_IMAGE)
            .add_binding(1, vk::DescriptorType::UNIFORM_BUFFER);
        let bindings = builder.bindings_for_stage(vk::ShaderStageFlags::COMPUTE);

        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[1].binding, 1);
        assert_eq!(bindings[1].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert!(bindings.iter().all(|b| b.stage_flags == vk::ShaderStageFlags::COMPUTE && b.descriptor_count == 1));
    }

    #[test]
    fn test_clear() {
        let mut builder = DescriptorLayoutBuilder::default().add_binding(0, vk::DescriptorType::STORAGE_IMAGE);
        builder.clear();
        assert!(builder.bindings_for_stage(vk::ShaderStageFlags::ALL).is_empty());
    }
}
