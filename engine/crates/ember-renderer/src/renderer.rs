use ash::vk;
use ember_gfx::error::{GfxError, fatal};

use crate::{
    backend::RenderBackend,
    background::{ComputePushConstants, wrap_effect_index},
    config::EngineConfig,
    frame::{frame_counter::FrameCounter, frame_manager::FrameManager},
    frame_script::{FrameScriptParams, ImageLayoutTracker, build_frame_script},
    render_scale::{RenderScale, draw_extent},
};

/// 一次 `draw_frame` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    /// 已经提交，但 present 时交换链过期，等待重建
    PresentedStale,
    /// acquire 时交换链过期，本帧没有录制也没有提交
    SkippedStale,
    /// 绘制区域为 0，没有做任何事情
    SkippedZeroExtent,
}

/// 帧循环
///
/// WAIT_PREVIOUS → ACQUIRE_TARGET → RECORD → SUBMIT → PRESENT
pub struct Renderer<B: RenderBackend> {
    backend: B,
    frames: FrameManager<B::Slot>,
    frame_counter: FrameCounter,

    render_scale: RenderScale,
    background_effect: usize,

    /// 交换链过期之后置位，由 [`Self::resize_if_requested`] 处理
    resize_requested: bool,
}

// new & init
impl<B: RenderBackend> Renderer<B> {
    pub fn new(mut backend: B, config: &EngineConfig) -> Self {
        let frames = FrameManager::new(config.fence_timeout_ns, |label| backend.create_slot(label));
        let background_effect = wrap_effect_index(config.background_effect, backend.background_effect_count());

        Self {
            backend,
            frames,
            frame_counter: FrameCounter::new(0),
            render_scale: RenderScale::new(config.render_scale, config.min_render_scale),
            background_effect: background_effect.unwrap_or(0),
            resize_requested: false,
        }
    }
}

// destroy
impl<B: RenderBackend> Renderer<B> {
    pub fn destroy(self) {
        let Self { mut backend, frames, .. } = self;

        backend.wait_idle();
        frames.destroy(|slot| backend.destroy_slot(slot));
        backend.destroy();
    }
}

// getters
impl<B: RenderBackend> Renderer<B> {
    #[inline]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    #[inline]
    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_counter.frame_id()
    }

    #[inline]
    pub fn render_scale(&self) -> f32 {
        self.render_scale.get()
    }

    #[inline]
    pub fn background_effect(&self) -> usize {
        self.background_effect
    }

    /// 当前背景 effect 的参数；没有加载任何 effect 时为 None
    #[inline]
    pub fn current_effect_data(&self) -> Option<ComputePushConstants> {
        self.backend.background_effect_data(self.background_effect)
    }

    #[inline]
    pub fn resize_requested(&self) -> bool {
        self.resize_requested
    }

    /// 按照当前的 surface 和 render scale 计算的绘制区域
    #[inline]
    pub fn draw_extent(&self) -> vk::Extent2D {
        draw_extent(self.backend.surface_extent(), self.backend.draw_image_extent(), self.render_scale)
    }
}

// update
impl<B: RenderBackend> Renderer<B> {
    #[inline]
    pub fn set_render_scale(&mut self, scale: f32) {
        self.render_scale.set(scale);
    }

    #[inline]
    pub fn adjust_render_scale(&mut self, delta: f32) {
        self.render_scale.adjust(delta);
    }

    /// 超出范围的下标会回绕
    pub fn set_background_effect(&mut self, index: usize) {
        if let Some(index) = wrap_effect_index(index, self.backend.background_effect_count()) {
            self.background_effect = index;
        }
    }

    #[inline]
    pub fn cycle_background_effect(&mut self) {
        self.set_background_effect(self.background_effect + 1);
    }

    /// 修改当前背景 effect 的参数，从下一帧开始生效
    ///
    /// 没有加载任何 effect 时返回 None，否则返回修改后的参数
    pub fn edit_current_effect(
        &mut self,
        edit: impl FnOnce(&mut ComputePushConstants),
    ) -> Option<ComputePushConstants> {
        let mut data = self.current_effect_data()?;
        edit(&mut data);
        self.backend.set_background_effect_data(self.background_effect, data);
        Some(data)
    }

    /// 窗口大小变化时调用，下一次 [`Self::resize_if_requested`] 会重建交换链
    #[inline]
    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    /// 需要重建且窗口大小不为 0 时：等待设备 idle，然后重建交换链
    pub fn resize_if_requested(&mut self, window_extent: vk::Extent2D) -> bool {
        if !self.resize_requested || window_extent.width == 0 || window_extent.height == 0 {
            return false;
        }

        let _span = tracy_client::span!("Renderer::resize");
        self.backend.wait_idle();
        self.backend.recreate_swapchain(window_extent);
        self.resize_requested = false;
        log::info!("swapchain recreated: {}x{}", window_extent.width, window_extent.height);
        true
    }

    pub fn draw_frame(&mut self) -> FrameOutcome {
        let _span = tracy_client::span!("Renderer::draw_frame");

        let draw_extent = self.draw_extent();
        if draw_extent.width == 0 || draw_extent.height == 0 {
            return FrameOutcome::SkippedZeroExtent;
        }

        let frame_id = self.frame_counter.frame_id();

        // WAIT_PREVIOUS
        let frame = self.frames.acquire_frame(frame_id);

        // ACQUIRE_TARGET
        let image_index = match self.backend.acquire_image(&frame.slot) {
            Ok(image_index) => image_index,
            Err(GfxError::SwapchainOutOfDate) => {
                self.resize_requested = true;
                self.backend.abandon_frame(&frame.slot);
                return FrameOutcome::SkippedStale;
            }
            Err(e) => fatal("acquire swapchain image", e),
        };

        // RECORD
        let script = build_frame_script(&FrameScriptParams {
            background_effect: self.background_effect,
            draw_extent,
            swapchain_extent: self.backend.surface_extent(),
        });
        if let Err(e) = ImageLayoutTracker::validate(&script) {
            fatal("validate frame script", e);
        }
        self.backend.record(frame, image_index, &script, draw_extent);

        // SUBMIT
        self.backend.submit(&frame.slot);

        // PRESENT
        let outcome = match self.backend.present(&frame.slot, image_index) {
            Ok(()) => FrameOutcome::Presented,
            Err(GfxError::SwapchainOutOfDate) => {
                self.resize_requested = true;
                FrameOutcome::PresentedStale
            }
            Err(e) => fatal("present swapchain image", e),
        };

        self.frame_counter.next_frame();
        outcome
    }
}
