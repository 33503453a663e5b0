use ash::vk;

use crate::{
    error::{FenceWaitError, VkCheck, fatal},
    foundation::debug_messenger::DebugType,
    gfx::Gfx,
};

/// CPU 可以等待的 GPU 完成信号
///
/// 帧管理和 immediate submit 都只依赖这个 trait，测试中可以用 mock 替换
pub trait CompletionFence {
    /// 阻塞等待，直到 signaled 或超时
    fn wait(&self, timeout_ns: u64) -> Result<(), FenceWaitError>;

    /// 回到 unsignaled 状态
    fn reset(&self);
}

/// 一次同步的 GPU 往返：等待 fence → 执行 `between` → reset fence
///
/// 超时或者设备错误都是致命的：写日志后 panic
pub fn wait_and_rearm<F: CompletionFence + ?Sized>(
    fence: &F,
    timeout_ns: u64,
    label: &str,
    between: impl FnOnce(),
) {
    if let Err(e) = fence.wait(timeout_ns) {
        fatal(&format!("wait fence [{}]", label), e);
    }
    between();
    fence.reset();
}

/// # Destroy
/// 不实现 Drop，因为可以 Clone，需要手动 destroy
#[derive(Clone)]
pub struct GfxFence {
    fence: vk::Fence,
}

impl DebugType for GfxFence {
    fn debug_type_name() -> &'static str {
        "GfxFence"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.fence
    }
}

// 创建与销毁
impl GfxFence {
    /// # param
    /// * signaled - 是否创建时就 signaled
    pub fn new(signaled: bool, debug_name: &str) -> Self {
        let gfx_device = Gfx::get().gfx_device();
        let fence_flags = if signaled { vk::FenceCreateFlags::SIGNALED } else { vk::FenceCreateFlags::empty() };
        let fence = unsafe {
            gfx_device.create_fence(&vk::FenceCreateInfo::default().flags(fence_flags), None).vk_check("create fence")
        };

        let fence = Self { fence };
        gfx_device.set_debug_name(&fence, debug_name);
        fence
    }

    #[inline]
    pub fn destroy(self) {
        let gfx_device = Gfx::get().gfx_device();
        unsafe {
            gfx_device.destroy_fence(self.fence, None);
        }
    }
}

// getters
impl GfxFence {
    #[inline]
    pub fn handle(&self) -> vk::Fence {
        self.fence
    }
}

impl CompletionFence for GfxFence {
    fn wait(&self, timeout_ns: u64) -> Result<(), FenceWaitError> {
        let gfx_device = Gfx::get().gfx_device();
        let result = unsafe { gfx_device.wait_for_fences(std::slice::from_ref(&self.fence), true, timeout_ns) };
        match result {
            Ok(()) => Ok(()),
            Err(vk::Result::TIMEOUT) => Err(FenceWaitError::Timeout { timeout_ns }),
            Err(e) => Err(FenceWaitError::Device(e)),
        }
    }

    fn reset(&self) {
        let gfx_device = Gfx::get().gfx_device();
        unsafe {
            gfx_device.reset_fences(std::slice::from_ref(&self.fence)).vk_check("reset fence");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use super::*;

    struct MockFence {
        events: RefCell<Vec<String>>,
        timeout: bool,
    }
    impl CompletionFence for MockFence {
        fn wait(&self, timeout_ns: u64) -> Result<(), FenceWaitError> {
            self.events.borrow_mut().push(format!("wait:{}", timeout_ns));
            if self.timeout { Err(FenceWaitError::Timeout { timeout_ns }) } else { Ok(()) }
        }
        fn reset(&self) {
            self.events.borrow_mut().push("reset".to_string());
        }
    }

    #[test]
    fn test_wait_and_rearm_order() {
        let fence = MockFence {
            events: RefCell::new(vec![]),
            timeout: false,
        };
        wait_and_rearm(&fence, 42, "test", || fence.events.borrow_mut().push("between".to_string()));
        assert_eq!(*fence.events.borrow(), vec!["wait:42", "between", "reset"]);
    }

    #[test]
    #[should_panic(expected = "wait fence [slot-A]")]
    fn test_wait_and_rearm_timeout_is_fatal() {
        let fence = MockFence {
            events: RefCell::new(vec![]),
            timeout: true,
        };
        wait_and_rearm(&fence, 1, "slot-A", || {});
    }
}
