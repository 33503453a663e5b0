use ash::vk;
use ash::vk::Handle;
use vk_mem::Alloc;

use crate::{error::VkCheck, foundation::debug_messenger::DebugType, gfx::Gfx, resources::memory_tier::MemoryTier};

/// 根据 format 推导 image view 和 barrier 使用的 aspect
pub fn aspect_for_format(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
            vk::ImageAspectFlags::DEPTH
        }
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
        _ => vk::ImageAspectFlags::COLOR,
    }
}

/// 2D GPU image 以及它的 view
///
/// 总是分配在 DeviceLocal 上，只有 1 个 mip 和 1 个 layer
///
/// # Destroy
/// 需要手动调用 `destroy`，一般是注册到 deletion queue 上
pub struct GfxImage {
    handle: vk::Image,
    view: vk::ImageView,
    allocation: vk_mem::Allocation,

    extent: vk::Extent2D,
    format: vk::Format,
    usage: vk::ImageUsageFlags,

    name: String,
}
// new & init
impl GfxImage {
    /// 分配失败是致命的
    pub fn new_2d(extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags, name: &str) -> Self {
        let image_ci = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let mut alloc_ci = MemoryTier::DeviceLocal.alloc_create_info();
        alloc_ci.required_flags = vk::MemoryPropertyFlags::DEVICE_LOCAL;

        let allocator = Gfx::get().allocator();
        let gfx_device = Gfx::get().gfx_device();
        let (image, allocation) = unsafe { allocator.create_image(&image_ci, &alloc_ci).vk_check("allocate image") };

        let view_ci = vk::ImageViewCreateInfo::default()
            .image(image)
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(format)
            .subresource_range(
                vk::ImageSubresourceRange::default()
                    .aspect_mask(aspect_for_format(format))
                    .base_mip_level(0)
                    .level_count(1)
                    .base_array_layer(0)
                    .layer_count(1),
            );
        let view = unsafe { gfx_device.create_image_view(&view_ci, None).vk_check("create image view") };

        let image = Self {
            handle: image,
            view,
            allocation,
            extent,
            format,
            usage,
            name: name.to_string(),
        };
        gfx_device.set_debug_name(&image, name);
        gfx_device.set_object_debug_name(view, format!("GfxImageView::{}", name));
        image
    }
}
// getter
impl GfxImage {
    #[inline]
    pub fn handle(&self) -> vk::Image {
        self.handle
    }

    #[inline]
    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    #[inline]
    pub fn usage(&self) -> vk::ImageUsageFlags {
        self.usage
    }
}
impl DebugType for GfxImage {
    fn debug_type_name() -> &'static str {
        "GfxImage2D"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
// destroy
impl GfxImage {
    /// view 先于 image 销毁
    pub fn destroy(mut self) {
        log::debug!("Destroying GfxImage: {}", self.name);
        unsafe {
            Gfx::get().gfx_device().destroy_image_view(self.view, None);
            Gfx::get().allocator().destroy_image(self.handle, &mut self.allocation);
        }
        self.handle = vk::Image::null();
    }
}
impl Drop for GfxImage {
    fn drop(&mut self) {
        debug_assert!(self.handle.is_null(), "GfxImage must be destroyed manually: {}", self.name);
    }
}
