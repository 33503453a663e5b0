use ash::vk;
use itertools::Itertools;

use crate::commands::{command_buffer::GfxCommandBuffer, semaphore::GfxSemaphore};

/// Gfx 关于 SubmitInfo2 的封装，更易用
///
/// ```ignore
/// let submit_info = GfxSubmitInfo::new(&[cmd])
///     .wait(&swapchain_semaphore, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, None)
///     .signal(&render_semaphore, vk::PipelineStageFlags2::ALL_GRAPHICS, None);
/// ```
#[derive(Default)]
pub struct GfxSubmitInfo {
    command_buffers: Vec<vk::CommandBufferSubmitInfo<'static>>,
    wait_infos: Vec<vk::SemaphoreSubmitInfo<'static>>,
    signal_infos: Vec<vk::SemaphoreSubmitInfo<'static>>,
}

impl GfxSubmitInfo {
    pub fn new(commands: &[GfxCommandBuffer]) -> Self {
        let command_buffers = commands
            .iter()
            .map(|cmd| vk::CommandBufferSubmitInfo::default().command_buffer(cmd.vk_handle()).device_mask(0))
            .collect_vec();

        Self {
            command_buffers,
            wait_infos: vec![],
            signal_infos: vec![],
        }
    }

    /// 引用自身的数组，需要保证 self 活得比返回值久
    #[inline]
    pub fn submit_info(&self) -> vk::SubmitInfo2<'_> {
        vk::SubmitInfo2::default()
            .command_buffer_infos(&self.command_buffers)
            .wait_semaphore_infos(&self.wait_infos)
            .signal_semaphore_infos(&self.signal_infos)
    }

    /// binary semaphore 的 value 会被忽略，传 None 即可
    #[inline]
    pub fn wait(mut self, semaphore: &GfxSemaphore, stage: vk::PipelineStageFlags2, value: Option<u64>) -> Self {
        self.wait_infos.push(Self::semaphore_info(semaphore, stage, value));
        self
    }

    #[inline]
    pub fn signal(mut self, semaphore: &GfxSemaphore, stage: vk::PipelineStageFlags2, value: Option<u64>) -> Self {
        self.signal_infos.push(Self::semaphore_info(semaphore, stage, value));
        self
    }

    fn semaphore_info(
        semaphore: &GfxSemaphore,
        stage: vk::PipelineStageFlags2,
        value: Option<u64>,
    ) -> vk::SemaphoreSubmitInfo<'static> {
        vk::SemaphoreSubmitInfo::default()
            .semaphore(semaphore.handle())
            .stage_mask(stage)
            .value(value.unwrap_or_default())
            .device_index(0)
    }
}
