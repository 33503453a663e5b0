use ash::vk;
use ash::vk::Handle;
use vk_mem::Alloc;

use crate::{
    error::VkCheck, foundation::debug_messenger::DebugType, gfx::Gfx, resources::memory_tier::MemoryTier,
};

/// GPU buffer
///
/// # Destroy
/// 需要手动调用 `destroy`，一般是注册到 deletion queue 上
pub struct GfxBuffer {
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,

    size: vk::DeviceSize,
    tier: MemoryTier,

    /// HostVisibleMapped 在创建时 map，destroy 时 unmap
    map_ptr: Option<*mut u8>,
    /// 只有在 buffer usage 包含 SHADER_DEVICE_ADDRESS 时才有值
    device_addr: Option<vk::DeviceAddress>,

    name: String,
}
impl DebugType for GfxBuffer {
    fn debug_type_name() -> &'static str {
        "GfxBuffer"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
// init & destroy
impl GfxBuffer {
    /// 分配失败是致命的
    pub fn new(
        buffer_size: vk::DeviceSize,
        buffer_usage: vk::BufferUsageFlags,
        tier: MemoryTier,
        name: impl AsRef<str>,
    ) -> Self {
        let buffer_ci = vk::BufferCreateInfo::default().size(buffer_size).usage(buffer_usage);
        let alloc_ci = tier.alloc_create_info();

        let allocator = Gfx::get().allocator();
        let (buffer, mut alloc) =
            unsafe { allocator.create_buffer(&buffer_ci, &alloc_ci).vk_check("allocate buffer") };

        let map_ptr = tier.is_mapped().then(|| unsafe { allocator.map_memory(&mut alloc).vk_check("map buffer") });

        let gfx_device = Gfx::get().gfx_device();
        let device_addr = buffer_usage.contains(vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS).then(|| unsafe {
            gfx_device.get_buffer_device_address(&vk::BufferDeviceAddressInfo::default().buffer(buffer))
        });

        let buffer = Self {
            handle: buffer,
            allocation: alloc,
            size: buffer_size,
            tier,
            map_ptr,
            device_addr,

            name: name.as_ref().to_string(),
        };
        gfx_device.set_debug_name(&buffer, name);
        buffer
    }

    #[inline]
    pub fn new_stage_buffer(size: vk::DeviceSize, debug_name: impl AsRef<str>) -> Self {
        Self::new(size, vk::BufferUsageFlags::TRANSFER_SRC, MemoryTier::HostVisibleMapped, debug_name)
    }

    pub fn destroy(mut self) {
        log::debug!("Destroying GfxBuffer: {}", self.name);
        let allocator = Gfx::get().allocator();
        unsafe {
            if self.map_ptr.take().is_some() {
                allocator.unmap_memory(&mut self.allocation);
            }
            allocator.destroy_buffer(self.handle, &mut self.allocation);
        }
        self.handle = vk::Buffer::null();
    }
}
impl Drop for GfxBuffer {
    fn drop(&mut self) {
        debug_assert!(self.handle.is_null(), "GfxBuffer must be destroyed manually: {}", self.name);
    }
}
// getter
impl GfxBuffer {
    #[inline]
    pub fn vk_buffer(&self) -> vk::Buffer {
        self.handle
    }

    /// 未开启 SHADER_DEVICE_ADDRESS 时返回 None
    #[inline]
    pub fn device_address(&self) -> Option<vk::DeviceAddress> {
        self.device_addr
    }

    #[inline]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    #[inline]
    pub fn tier(&self) -> MemoryTier {
        self.tier
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }
}
// tools
impl GfxBuffer {
    /// 通过 mem map 的方式将 data 写入到 buffer 的 `offset` 处
    ///
    /// # Panics
    /// buffer 不是 HostVisibleMapped，或者写入越界
    pub fn write_mapped<T: bytemuck::Pod>(&self, offset: vk::DeviceSize, data: &[T]) {
        let bytes: &[u8] = bytemuck::cast_slice(data);
        assert!(
            offset + bytes.len() as vk::DeviceSize <= self.size,
            "write out of range for buffer {}: offset {} + {} bytes > {}",
            self.name,
            offset,
            bytes.len(),
            self.size
        );
        let Some(ptr) = self.map_ptr else {
            panic!("buffer {} is not host visible mapped", self.name);
        };
        unsafe {
            std::ptr::copy_nonoverlapping(bytes.as_ptr(), ptr.add(offset as usize), bytes.len());
        }
        Gfx::get()
            .allocator()
            .flush_allocation(&self.allocation, offset, bytes.len() as vk::DeviceSize)
            .vk_check("flush buffer allocation");
    }
}
