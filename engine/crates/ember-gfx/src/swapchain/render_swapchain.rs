use ash::vk;
use ash::vk::Handle;
use itertools::Itertools;

use crate::{
    commands::{command_queue::GfxCommandQueue, semaphore::GfxSemaphore},
    error::{GfxError, VkCheck, fatal},
    gfx::Gfx,
    swapchain::surface::GfxSurface,
};

/// 期望的交换链格式
pub const PREFERRED_SURFACE_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::R8G8B8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// 交换链以及它的 image view
///
/// image 属于交换链，不需要销毁；view 由这里创建和销毁
pub struct GfxRenderSwapchain {
    surface: GfxSurface,
    swapchain_handle: vk::SwapchainKHR,

    swapchain_images: Vec<vk::Image>,
    swapchain_image_views: Vec<vk::ImageView>,

    surface_format: vk::SurfaceFormatKHR,
    present_mode: vk::PresentModeKHR,
    swapchain_extent: vk::Extent2D,
}

// new & init
impl GfxRenderSwapchain {
    pub fn new(
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
        present_mode: vk::PresentModeKHR,
        window_physical_extent: vk::Extent2D,
    ) -> Self {
        let surface = GfxSurface::new(raw_display_handle, raw_window_handle);
        let surface_format = Self::choose_surface_format(&surface.get_formats());
        let present_mode = Self::choose_present_mode(&surface.get_present_modes(), present_mode);

        let mut swapchain = Self {
            surface,
            swapchain_handle: vk::SwapchainKHR::null(),
            swapchain_images: vec![],
            swapchain_image_views: vec![],
            surface_format,
            present_mode,
            swapchain_extent: window_physical_extent,
        };
        swapchain.create_swapchain(window_physical_extent);
        swapchain
    }

    fn create_swapchain(&mut self, window_physical_extent: vk::Extent2D) {
        let surface_capabilities = self.surface.get_capabilities();

        // 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
        let extent = Self::calculate_swapchain_extent(&surface_capabilities, window_physical_extent);
        log::info!(
            "create swapchain:
            surface current extent: {}x{}, min extent: {}x{}, max extent: {}x{}
            window physical extent: {}x{}
            final swapchain extent: {}x{}",
            surface_capabilities.current_extent.width,
            surface_capabilities.current_extent.height,
            surface_capabilities.min_image_extent.width,
            surface_capabilities.min_image_extent.height,
            surface_capabilities.max_image_extent.width,
            surface_capabilities.max_image_extent.height,
            window_physical_extent.width,
            window_physical_extent.height,
            extent.width,
            extent.height
        );

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface.handle)
            .min_image_count(Self::image_count(&surface_capabilities))
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            // TRANSFER_DST 用于 draw image 的 blit
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSFER_DST)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(self.present_mode)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .clipped(true);

        let gfx_device = Gfx::get().gfx_device();
        let swapchain_handle =
            unsafe { gfx_device.swapchain.create_swapchain(&create_info, None).vk_check("create swapchain") };
        gfx_device.set_object_debug_name(swapchain_handle, "main");

        let images =
            unsafe { gfx_device.swapchain.get_swapchain_images(swapchain_handle).vk_check("get swapchain images") };
        let views = images
            .iter()
            .enumerate()
            .map(|(idx, image)| {
                let view_ci = vk::ImageViewCreateInfo::default()
                    .image(*image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(self.surface_format.format)
                    .subresource_range(
                        vk::ImageSubresourceRange::default()
                            .aspect_mask(vk::ImageAspectFlags::COLOR)
                            .level_count(1)
                            .layer_count(1),
                    );
                let view =
                    unsafe { gfx_device.create_image_view(&view_ci, None).vk_check("create swapchain image view") };
                gfx_device.set_object_debug_name(*image, format!("swapchain-image-{}", idx));
                gfx_device.set_object_debug_name(view, format!("swapchain-view-{}", idx));
                view
            })
            .collect_vec();

        self.swapchain_handle = swapchain_handle;
        self.swapchain_images = images;
        self.swapchain_image_views = views;
        self.swapchain_extent = extent;
    }
}

// getters
impl GfxRenderSwapchain {
    #[inline]
    pub fn images(&self) -> &[vk::Image] {
        &self.swapchain_images
    }

    #[inline]
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.swapchain_image_views
    }

    #[inline]
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain_extent
    }

    #[inline]
    pub fn format(&self) -> vk::Format {
        self.surface_format.format
    }
}

// tools
impl GfxRenderSwapchain {
    /// 确定 window 的 extent 尺寸
    ///
    /// 如果 surface_capabilities.current_extent 包含特殊值 0xFFFFFFFF，则表示可以自己设置交换链的 extent
    pub fn calculate_swapchain_extent(
        surface_capabilities: &vk::SurfaceCapabilitiesKHR,
        window_physical_extent: vk::Extent2D,
    ) -> vk::Extent2D {
        let surface_extent = surface_capabilities.current_extent;
        if surface_extent.width == 0xFFFFFFFF || surface_extent.height == 0xFFFFFFFF {
            let width = window_physical_extent
                .width
                .clamp(surface_capabilities.min_image_extent.width, surface_capabilities.max_image_extent.width);
            let height = window_physical_extent
                .height
                .clamp(surface_capabilities.min_image_extent.height, surface_capabilities.max_image_extent.height);
            vk::Extent2D { width, height }
        } else {
            surface_extent
        }
    }

    /// min + 1，max_image_count == 0 表示不限制 image 数量
    pub fn image_count(surface_capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
        if surface_capabilities.max_image_count == 0 {
            surface_capabilities.min_image_count + 1
        } else {
            u32::min(surface_capabilities.max_image_count, surface_capabilities.min_image_count + 1)
        }
    }

    /// 优先使用 [`PREFERRED_SURFACE_FORMAT`]，否则使用 surface 报告的第一个格式
    pub fn choose_surface_format(available: &[vk::SurfaceFormatKHR]) -> vk::SurfaceFormatKHR {
        if available.contains(&PREFERRED_SURFACE_FORMAT) {
            return PREFERRED_SURFACE_FORMAT;
        }
        match available.first() {
            // 只有一个 UNDEFINED 表示可以任选
            Some(first) if first.format == vk::Format::UNDEFINED => PREFERRED_SURFACE_FORMAT,
            Some(first) => {
                log::warn!(
                    "surface does not support {:?}, fall back to {:?}",
                    PREFERRED_SURFACE_FORMAT,
                    first
                );
                *first
            }
            None => fatal("choose surface format", "surface reports no formats"),
        }
    }

    /// 不支持请求的 present mode 时退回 FIFO（所有实现都必须支持）
    pub fn choose_present_mode(
        available: &[vk::PresentModeKHR],
        requested: vk::PresentModeKHR,
    ) -> vk::PresentModeKHR {
        if available.contains(&requested) {
            requested
        } else {
            log::warn!("present mode {:?} is not supported, fall back to FIFO", requested);
            vk::PresentModeKHR::FIFO
        }
    }
}

// update
impl GfxRenderSwapchain {
    /// timeout: nano seconds
    ///
    /// 交换链过期时返回 [`GfxError::SwapchainOutOfDate`]，其他错误是致命的
    #[inline]
    pub fn acquire_next_image(&self, semaphore: &GfxSemaphore, timeout: u64) -> Result<u32, GfxError> {
        let result = unsafe {
            Gfx::get().gfx_device().swapchain.acquire_next_image(
                self.swapchain_handle,
                timeout,
                semaphore.handle(),
                vk::Fence::null(),
            )
        };

        match result {
            Ok((image_index, is_suboptimal)) => {
                if is_suboptimal {
                    log::warn!("swapchain acquire image index {} is not optimal", image_index);
                }
                Ok(image_index)
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("swapchain is out of date when acquire next image");
                Err(GfxError::SwapchainOutOfDate)
            }
            Err(e) => fatal("acquire next swapchain image", e),
        }
    }

    /// 交换链过期时返回 [`GfxError::SwapchainOutOfDate`]，其他错误是致命的
    #[inline]
    pub fn present_image(
        &self,
        queue: &GfxCommandQueue,
        image_index: u32,
        wait_semaphores: &[GfxSemaphore],
    ) -> Result<(), GfxError> {
        let wait_semaphores = wait_semaphores.iter().map(|s| s.handle()).collect_vec();
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .image_indices(&image_indices)
            .swapchains(std::slice::from_ref(&self.swapchain_handle));

        let result = unsafe { Gfx::get().gfx_device().swapchain.queue_present(queue.handle(), &present_info) };
        match result {
            Ok(is_suboptimal) => {
                if is_suboptimal {
                    log::warn!("swapchain present image index {} is not optimal", image_index);
                }
                Ok(())
            }
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                log::warn!("swapchain is out of date when present image");
                Err(GfxError::SwapchainOutOfDate)
            }
            Err(e) => fatal("present swapchain image", e),
        }
    }

    /// 调用者需要保证设备已经 idle
    pub fn recreate(&mut self, window_physical_extent: vk::Extent2D) {
        let _span = tracy_client::span!("GfxRenderSwapchain::recreate");
        self.destroy_swapchain();
        self.create_swapchain(window_physical_extent);
    }
}

// destroy
impl GfxRenderSwapchain {
    fn destroy_swapchain(&mut self) {
        let gfx_device = Gfx::get().gfx_device();
        unsafe {
            for view in self.swapchain_image_views.drain(..) {
                gfx_device.destroy_image_view(view, None);
            }
            gfx_device.swapchain.destroy_swapchain(self.swapchain_handle, None);
        }
        self.swapchain_images.clear();
        self.swapchain_handle = vk::SwapchainKHR::null();
    }

    /// surface 通过 drop 销毁
    pub fn destroy(mut self) {
        self.destroy_swapchain();
    }
}
impl Drop for GfxRenderSwapchain {
    fn drop(&mut self) {
        debug_assert!(self.swapchain_handle.is_null(), "GfxRenderSwapchain must be destroyed manually.");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(current: (u32, u32), min: (u32, u32), max: (u32, u32)) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D {
                width: current.0,
                height: current.1,
            },
            min_image_extent: vk::Extent2D {
                width: min.0,
                height: min.1,
            },
            max_image_extent: vk::Extent2D {
                width: max.0,
                height: max.1,
            },
            min_image_count: 2,
            max_image_count: 0,
            ..Default::default()
        }
    }

    #[test]
    fn test_extent_follows_surface() {
        let c = caps((800, 600), (1, 1), (4096, 4096));
        let extent = GfxRenderSwapchain::calculate_swapchain_extent(&c, vk::Extent2D {
            width: 1700,
            height: 900,
        });
        assert_eq!((extent.width, extent.height), (800, 600));
    }

    #[test]
    fn test_extent_clamped_when_surface_undefined() {
        let c = caps((0xFFFFFFFF, 0xFFFFFFFF), (100, 100), (1600, 800));
        let extent = GfxRenderSwapchain::calculate_swapchain_extent(&c, vk::Extent2D {
            width: 1700,
            height: 50,
        });
        assert_eq!((extent.width, extent.height), (1600, 100));
    }

    #[test]
    fn test_image_count() {
        let mut c = caps((1, 1), (1, 1), (1, 1));
        assert_eq!(GfxRenderSwapchain::image_count(&c), 3);
        c.max_image_count = 2;
        assert_eq!(GfxRenderSwapchain::image_count(&c), 2);
    }

    #[test]
    fn test_surface_format_prefers_rgba8() {
        let bgra = vk::SurfaceFormatKHR {
            format: vk::Format::B8G8R8A8_UNORM,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        };
        assert_eq!(
            GfxRenderSwapchain::choose_surface_format(&[bgra, PREFERRED_SURFACE_FORMAT]),
            PREFERRED_SURFACE_FORMAT
        );
        assert_eq!(GfxRenderSwapchain::choose_surface_format(&[bgra]), bgra);
    }

    #[test]
    fn test_present_mode_falls_back_to_fifo() {
        let available = [vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX];
        assert_eq!(
            GfxRenderSwapchain::choose_present_mode(&available, vk::PresentModeKHR::MAILBOX),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            GfxRenderSwapchain::choose_present_mode(&available, vk::PresentModeKHR::IMMEDIATE),
            vk::PresentModeKHR::FIFO
        );
    }
}
