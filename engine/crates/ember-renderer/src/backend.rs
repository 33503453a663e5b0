use ash::vk;
use ember_gfx::error::GfxError;

use crate::{
    background::ComputePushConstants,
    frame::{
        frame_counter::FrameLabel,
        frame_manager::{FrameContext, FrameSlot},
    },
    frame_script::FrameOp,
};

/// 帧循环依赖的设备侧操作
///
/// [`crate::renderer::Renderer`] 只负责顺序和状态，所有真正的 GPU 调用都在这里。
/// 真实实现见 [`crate::vulkan_backend::VulkanBackend`]，测试中使用 mock。
pub trait RenderBackend {
    type Slot: FrameSlot;

    // 创建与销毁
    fn create_slot(&mut self, label: FrameLabel) -> Self::Slot;
    /// 调用前设备已经 idle
    fn destroy_slot(&mut self, slot: Self::Slot);
    /// 调用前设备已经 idle，所有 slot 都已经销毁
    fn destroy(self);

    // 一帧的各个阶段
    /// 获取交换链图像，完成时 signal slot 的 acquire-complete semaphore
    ///
    /// 交换链过期时返回 [`GfxError::SwapchainOutOfDate`]
    fn acquire_image(&mut self, slot: &Self::Slot) -> Result<u32, GfxError>;

    /// 本帧在提交之前被放弃
    ///
    /// slot 的 fence 已经 reset，需要重新 signal，否则下一次复用会等待超时
    fn abandon_frame(&mut self, slot: &Self::Slot);

    /// 按照脚本录制 slot 的 command buffer
    fn record(
        &mut self,
        frame: &mut FrameContext<Self::Slot>,
        image_index: u32,
        script: &[FrameOp],
        draw_extent: vk::Extent2D,
    );

    /// 等待 acquire-complete，signal render-complete 和 slot 的 fence
    fn submit(&mut self, slot: &Self::Slot);

    /// 等待 render-complete 之后呈现
    ///
    /// 交换链过期时返回 [`GfxError::SwapchainOutOfDate`]
    fn present(&mut self, slot: &Self::Slot, image_index: u32) -> Result<(), GfxError>;

    // getters
    fn surface_extent(&self) -> vk::Extent2D;
    /// draw image 分配时的大小
    fn draw_image_extent(&self) -> vk::Extent2D;
    fn background_effect_count(&self) -> usize;
    /// 下标会回绕；没有任何 effect 时为 None
    fn background_effect_data(&self, index: usize) -> Option<ComputePushConstants>;

    // update
    /// 下一次录制这个 effect 时使用新的参数
    fn set_background_effect_data(&mut self, index: usize, data: ComputePushConstants);

    // tools
    /// 调用前设备已经 idle
    fn recreate_swapchain(&mut self, window_extent: vk::Extent2D);
    fn wait_idle(&self);
}
