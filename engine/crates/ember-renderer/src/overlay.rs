use ash::vk;
use ember_gfx::commands::command_buffer::GfxCommandBuffer;

/// 在交换链图像上绘制的最后一层（UI 等）
///
/// 调用时 rendering scope 已经打开：唯一的 color attachment 是 `target_view`，
/// load op 为 LOAD，图像处于 COLOR_ATTACHMENT_OPTIMAL
pub trait OverlayPass {
    fn record(&mut self, cmd: &GfxCommandBuffer, target_view: vk::ImageView, extent: vk::Extent2D);

    /// 交换链重建之后调用
    fn on_resize(&mut self, _extent: vk::Extent2D) {}

    /// 设备 idle 之后调用，释放自己持有的资源
    fn destroy(&mut self) {}
}
