use ash::vk;
use itertools::Itertools;

use crate::{
    commands::command_queue::GfxQueueFamily,
    error::{VkCheck, fatal},
    foundation::debug_messenger::DebugType,
};

/// 表示一张物理显卡
pub struct GfxPhysicalDevice {
    pub(crate) vk_handle: vk::PhysicalDevice,

    /// 当前 gpu 的基础属性
    pub(crate) basic_props: vk::PhysicalDeviceProperties,

    pub(crate) gfx_queue_family: GfxQueueFamily,
}

impl GfxPhysicalDevice {
    /// 优先选择独立显卡，如果没有则选择第一个具备 graphics queue 的显卡
    pub fn new_descrete_physical_device(instance: &ash::Instance) -> Self {
        let pdevices = unsafe { instance.enumerate_physical_devices().vk_check("enumerate physical devices") };
        pdevices
            .iter()
            .filter_map(|pdevice| GfxPhysicalDevice::new(*pdevice, instance))
            .find_or_first(GfxPhysicalDevice::is_descrete_gpu)
            .unwrap_or_else(|| fatal("select physical device", "no gpu with a graphics queue family"))
    }

    fn new(pdevice: vk::PhysicalDevice, instance: &ash::Instance) -> Option<Self> {
        unsafe {
            let basic_props = instance.get_physical_device_properties(pdevice);
            log::info!("found gpu: {:?}", basic_props.device_name_as_c_str().unwrap_or_default());

            let queue_familiy_props = instance.get_physical_device_queue_family_properties(pdevice);
            log::debug!("physical device: queue family props:\n{:#?}", queue_familiy_props);

            let gfx_queue_family = Self::find_gfx_queue_family(&queue_familiy_props)?;

            Some(Self {
                vk_handle: pdevice,
                basic_props,
                gfx_queue_family,
            })
        }
    }

    /// 全能的 Queue：graphics, compute, transfer
    fn find_gfx_queue_family(props: &[vk::QueueFamilyProperties]) -> Option<GfxQueueFamily> {
        let required = vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER;
        props.iter().enumerate().find(|(_, props)| props.queue_flags.contains(required)).map(|(family_idx, props)| {
            GfxQueueFamily {
                name: "gfx".to_string(),
                queue_family_index: family_idx as u32,
                queue_flags: props.queue_flags,
                queue_count: props.queue_count,
            }
        })
    }

    pub fn destroy(self) {
        // 无需销毁
    }

    /// 当前 gpu 是否是独立显卡
    #[inline]
    pub fn is_descrete_gpu(&self) -> bool {
        self.basic_props.device_type == vk::PhysicalDeviceType::DISCRETE_GPU
    }
}

impl DebugType for GfxPhysicalDevice {
    fn debug_type_name() -> &'static str {
        "GfxPhysicalDevice"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.vk_handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_gfx_queue_family_skips_transfer_only() {
        let props = [
            vk::QueueFamilyProperties {
                queue_flags: vk::QueueFlags::TRANSFER,
                queue_count: 2,
                ..Default::default()
            },
            vk::QueueFamilyProperties {
                queue_flags: vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE | vk::QueueFlags::TRANSFER,
                queue_count: 16,
                ..Default::default()
            },
        ];
        let family = GfxPhysicalDevice::find_gfx_queue_family(&props).unwrap();
        assert_eq!(family.queue_family_index, 1);
        assert_eq!(family.queue_count, 16);
    }

    #[test]
    fn test_find_gfx_queue_family_none() {
        let props = [vk::QueueFamilyProperties {
            queue_flags: vk::QueueFlags::COMPUTE,
            queue_count: 1,
            ..Default::default()
        }];
        assert!(GfxPhysicalDevice::find_gfx_queue_family(&props).is_none());
    }
}
