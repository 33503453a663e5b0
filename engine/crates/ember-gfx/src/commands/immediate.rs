use ash::vk;

use crate::{
    basic::color::LabelColor,
    commands::{
        command_buffer::GfxCommandBuffer,
        command_pool::GfxCommandPool,
        fence::{GfxFence, wait_and_rearm},
        submit_info::GfxSubmitInfo,
    },
    gfx::Gfx,
};

/// 同步执行一段 command 的通道
///
/// 有自己的 command pool、command buffer 和 fence，不会碰到任何 frame slot。
/// fence 创建时是 unsignaled，每次提交后等待并 reset，回到 unsignaled。
pub struct ImmediateSubmit {
    command_pool: GfxCommandPool,
    command_buffer: GfxCommandBuffer,
    fence: GfxFence,

    /// fence 等待的超时时间（ns）
    timeout_ns: u64,
}

// new & init
impl ImmediateSubmit {
    pub fn new(timeout_ns: u64) -> Self {
        let command_pool = GfxCommandPool::new(
            Gfx::get().gfx_queue_family(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            "immediate",
        );
        let command_buffer = GfxCommandBuffer::new(&command_pool, "immediate");
        let fence = GfxFence::new(false, "immediate");

        Self {
            command_pool,
            command_buffer,
            fence,
            timeout_ns,
        }
    }
}

// tools
impl ImmediateSubmit {
    /// 录制 `func` 并提交到 graphics queue，阻塞到 GPU 执行完毕
    ///
    /// 等待超时是致命的
    pub fn submit<F, R>(&self, name: &str, func: F) -> R
    where
        F: FnOnce(&GfxCommandBuffer) -> R,
    {
        let _span = tracy_client::span!("ImmediateSubmit::submit");

        self.command_buffer.reset();
        self.command_buffer.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, name);
        let result = func(&self.command_buffer);
        self.command_buffer.end();

        let gfx_queue = Gfx::get().gfx_queue();
        gfx_queue.begin_label(name, LabelColor::COLOR_IMMEDIATE);
        gfx_queue.submit(&[GfxSubmitInfo::new(std::slice::from_ref(&self.command_buffer))], Some(&self.fence));
        gfx_queue.end_label();

        wait_and_rearm(&self.fence, self.timeout_ns, name, || {});

        result
    }
}

// destroy
impl ImmediateSubmit {
    pub fn destroy(self) {
        self.fence.destroy();
        self.command_pool.destroy();
    }
}
