use ash::vk;

use crate::{descriptors::descriptor_layout::GfxDescriptorSetLayout, error::VkCheck, gfx::Gfx};

/// 每个 set 平均需要某类描述符的数量
#[derive(Debug, Clone, Copy)]
pub struct PoolSizeRatio {
    pub ty: vk::DescriptorType,
    pub ratio: f32,
}

/// 根据 set 数量和比例计算 pool 中每类描述符的数量，至少为 1
pub fn pool_sizes(max_sets: u32, ratios: &[PoolSizeRatio]) -> Vec<vk::DescriptorPoolSize> {
    ratios
        .iter()
        .map(|r| vk::DescriptorPoolSize {
            ty: r.ty,
            descriptor_count: ((r.ratio * max_sets as f32) as u32).max(1),
        })
        .collect()
}

/// 固定容量的描述符池
///
/// set 跟随 pool 一起释放，不单独 free
pub struct DescriptorAllocator {
    pool: vk::DescriptorPool,
}

// 创建与销毁
impl DescriptorAllocator {
    pub fn new(max_sets: u32, ratios: &[PoolSizeRatio], debug_name: &str) -> Self {
        let sizes = pool_sizes(max_sets, ratios);
        let pool_ci = vk::DescriptorPoolCreateInfo::default().max_sets(max_sets).pool_sizes(&sizes);

        let gfx_device = Gfx::get().gfx_device();
        let pool = unsafe { gfx_device.create_descriptor_pool(&pool_ci, None).vk_check("create descriptor pool") };
        gfx_device.set_object_debug_name(pool, format!("GfxDescriptorPool::{}", debug_name));

        Self { pool }
    }

    pub fn destroy(self) {
        unsafe {
            Gfx::get().gfx_device().destroy_descriptor_pool(self.pool, None);
        }
    }
}

// tools
impl DescriptorAllocator {
    /// pool 容量不足是致命的
    pub fn allocate(&self, layout: &GfxDescriptorSetLayout, debug_name: &str) -> vk::DescriptorSet {
        let layouts = [layout.handle()];
        let alloc_info = vk::DescriptorSetAllocateInfo::default().descriptor_pool(self.pool).set_layouts(&layouts);

        let gfx_device = Gfx::get().gfx_device();
        let set = unsafe { gfx_device.allocate_descriptor_sets(&alloc_info).vk_check("allocate descriptor set")[0] };
        gfx_device.set_object_debug_name(set, format!("GfxDescriptorSet::{}", debug_name));
        set
    }
}
