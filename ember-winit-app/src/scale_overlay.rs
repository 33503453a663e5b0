use std::{cell::Cell, rc::Rc};

use ash::vk;
use ember_gfx::commands::command_buffer::GfxCommandBuffer;
use ember_renderer::overlay::OverlayPass;

/// 在交换链图像底部画一条进度条，长度表示当前的 render scale
pub struct ScaleIndicatorOverlay {
    scale: Rc<Cell<f32>>,
}

impl ScaleIndicatorOverlay {
    const BAR_HEIGHT: u32 = 6;
    const BAR_COLOR: [f32; 4] = [0.9, 0.6, 0.1, 1.0];

    pub fn new(scale: Rc<Cell<f32>>) -> Self {
        Self { scale }
    }

    fn bar_rect(scale: f32, extent: vk::Extent2D) -> Option<vk::Rect2D> {
        let height = Self::BAR_HEIGHT.min(extent.height);
        let width = (extent.width as f32 * scale.clamp(0.0, 1.0)) as u32;
        if width == 0 || height == 0 {
            return None;
        }

        Some(vk::Rect2D {
            offset: vk::Offset2D {
                x: 0,
                y: (extent.height - height) as i32,
            },
            extent: vk::Extent2D { width, height },
        })
    }
}

impl OverlayPass for ScaleIndicatorOverlay {
    fn record(&mut self, cmd: &GfxCommandBuffer, _target_view: vk::ImageView, extent: vk::Extent2D) {
        let Some(rect) = Self::bar_rect(self.scale.get(), extent) else {
            return;
        };

        let attachment = vk::ClearAttachment {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            color_attachment: 0,
            clear_value: vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: Self::BAR_COLOR,
                },
            },
        };
        let clear_rect = vk::ClearRect {
            rect,
            base_array_layer: 0,
            layer_count: 1,
        };
        cmd.cmd_clear_attachments(std::slice::from_ref(&attachment), std::slice::from_ref(&clear_rect));
    }
}
