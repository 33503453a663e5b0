/// 资源所在的内存层级
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryTier {
    /// GPU 专用的静态数据（vertex/index buffer，render target）
    DeviceLocal,
    /// CPU 可见且持久映射，用于 staging 上传
    HostVisibleMapped,
}

impl MemoryTier {
    /// 对应的 vma 分配参数
    pub fn alloc_create_info(self) -> vk_mem::AllocationCreateInfo {
        match self {
            MemoryTier::DeviceLocal => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::AutoPreferDevice,
                ..Default::default()
            },
            MemoryTier::HostVisibleMapped => vk_mem::AllocationCreateInfo {
                usage: vk_mem::MemoryUsage::Auto,
                flags: vk_mem::AllocationCreateFlags::HOST_ACCESS_SEQUENTIAL_WRITE,
                ..Default::default()
            },
        }
    }

    /// 创建后是否需要立即 map
    #[inline]
    pub fn is_mapped(self) -> bool {
        matches!(self, MemoryTier::HostVisibleMapped)
    }
}
