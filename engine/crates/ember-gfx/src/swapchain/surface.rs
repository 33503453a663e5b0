use ash::vk;

use crate::{
    error::{VkCheck, fatal},
    foundation::debug_messenger::DebugType,
    gfx::Gfx,
};

pub struct GfxSurface {
    pub(crate) handle: vk::SurfaceKHR,
    pub(crate) pf: ash::khr::surface::Instance,
}

impl GfxSurface {
    /// graphics queue 不支持在该 surface 上 present 是致命的
    pub fn new(
        raw_display_handle: raw_window_handle::RawDisplayHandle,
        raw_window_handle: raw_window_handle::RawWindowHandle,
    ) -> Self {
        let gfx_core = Gfx::get().gfx_core();
        let surface_pf = ash::khr::surface::Instance::new(&gfx_core.vk_entry, &gfx_core.instance.ash_instance);

        let surface = unsafe {
            ash_window::create_surface(
                &gfx_core.vk_entry,
                &gfx_core.instance.ash_instance,
                raw_display_handle,
                raw_window_handle,
                None,
            )
            .vk_check("create surface")
        };

        let present_supported = unsafe {
            surface_pf
                .get_physical_device_surface_support(
                    gfx_core.physical_device.vk_handle,
                    gfx_core.physical_device.gfx_queue_family.queue_family_index,
                    surface,
                )
                .vk_check("query surface support")
        };
        if !present_supported {
            fatal("create surface", "graphics queue family can not present to this surface");
        }

        let surface = GfxSurface {
            handle: surface,
            pf: surface_pf,
        };
        gfx_core.gfx_device.set_debug_name(&surface, "main");

        surface
    }
}

// getters
impl GfxSurface {
    pub fn get_capabilities(&self) -> vk::SurfaceCapabilitiesKHR {
        unsafe {
            self.pf
                .get_physical_device_surface_capabilities(Gfx::get().physical_device().vk_handle, self.handle)
                .vk_check("query surface capabilities")
        }
    }

    pub fn get_formats(&self) -> Vec<vk::SurfaceFormatKHR> {
        unsafe {
            self.pf
                .get_physical_device_surface_formats(Gfx::get().physical_device().vk_handle, self.handle)
                .vk_check("query surface formats")
        }
    }

    pub fn get_present_modes(&self) -> Vec<vk::PresentModeKHR> {
        unsafe {
            self.pf
                .get_physical_device_surface_present_modes(Gfx::get().physical_device().vk_handle, self.handle)
                .vk_check("query surface present modes")
        }
    }
}

impl Drop for GfxSurface {
    fn drop(&mut self) {
        unsafe { self.pf.destroy_surface(self.handle, None) }
    }
}

impl DebugType for GfxSurface {
    fn debug_type_name() -> &'static str {
        "GfxSurface"
    }
    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}
