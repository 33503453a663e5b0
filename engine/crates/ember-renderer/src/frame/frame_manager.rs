use ember_gfx::commands::fence::{CompletionFence, wait_and_rearm};

use crate::{
    deletion_queue::DeletionQueue,
    frame::frame_counter::{FrameCounter, FrameLabel},
};

/// 一个 frame slot 持有的设备资源
///
/// 真实实现是 command pool/buffer + 两个 semaphore + fence，测试中使用 mock
pub trait FrameSlot {
    type Fence: CompletionFence;

    /// slot 上一次提交的完成信号，创建时为 signaled
    fn fence(&self) -> &Self::Fence;

    /// 让 command buffer 回到初始状态，可以重新录制
    fn reset_commands(&self);
}

/// 每个 frame slot 的上下文
pub struct FrameContext<S> {
    pub slot: S,
    /// 跟随这个 slot 的延迟销毁，slot 下一次被复用时执行
    pub deletion_queue: DeletionQueue,
    pub label: FrameLabel,
}

/// 固定数量的 frame slot，按照 `frame_id % N` 轮流使用
pub struct FrameManager<S: FrameSlot> {
    frames: [FrameContext<S>; FrameCounter::fif_count()],
    fence_timeout_ns: u64,
}

// new & init
impl<S: FrameSlot> FrameManager<S> {
    pub fn new(fence_timeout_ns: u64, mut create_slot: impl FnMut(FrameLabel) -> S) -> Self {
        let frames = FrameCounter::frame_labels().map(|label| FrameContext {
            slot: create_slot(label),
            deletion_queue: DeletionQueue::new(format!("frame-{}", label)),
            label,
        });

        Self {
            frames,
            fence_timeout_ns,
        }
    }
}

// getters
impl<S: FrameSlot> FrameManager<S> {
    #[inline]
    pub const fn slot_index(frame_id: u64) -> usize {
        FrameLabel::from_frame_id(frame_id).index()
    }

    #[inline]
    pub fn fence_timeout_ns(&self) -> u64 {
        self.fence_timeout_ns
    }

    /// 不做任何等待，只用于读取 slot 的状态
    #[inline]
    pub fn frame(&self, frame_id: u64) -> &FrameContext<S> {
        &self.frames[Self::slot_index(frame_id)]
    }
}

// update
impl<S: FrameSlot> FrameManager<S> {
    /// 取得 `frame_id` 对应的 slot，保证 GPU 已经不再使用它
    ///
    /// 1. 等待 slot 的 fence（超时或设备错误是致命的）
    /// 2. flush slot 的 deletion queue
    /// 3. reset fence
    /// 4. reset command buffer
    pub fn acquire_frame(&mut self, frame_id: u64) -> &mut FrameContext<S> {
        let _span = tracy_client::span!("FrameManager::acquire_frame");

        let timeout_ns = self.fence_timeout_ns;
        let frame = &mut self.frames[Self::slot_index(frame_id)];
        let FrameContext {
            slot,
            deletion_queue,
            label,
        } = &mut *frame;

        wait_and_rearm(slot.fence(), timeout_ns, &format!("frame-{}", label), || deletion_queue.flush());
        slot.reset_commands();

        frame
    }
}

// destroy
impl<S: FrameSlot> FrameManager<S> {
    /// 调用前需要保证设备已经 idle
    pub fn destroy(self, mut destroy_slot: impl FnMut(S)) {
        for mut frame in self.frames {
            frame.deletion_queue.flush();
            destroy_slot(frame.slot);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, rc::Rc};

    use ember_gfx::error::FenceWaitError;

    use super::*;

    type EventLog = Rc<RefCell<Vec<String>>>;

    struct MockFence {
        label: usize,
        signaled: RefCell<bool>,
        log: EventLog,
    }
    impl CompletionFence for MockFence {
        fn wait(&self, timeout_ns: u64) -> Result<(), FenceWaitError> {
            self.log.borrow_mut().push(format!("wait:{}:{}", self.label, timeout_ns));
            if *self.signaled.borrow() { Ok(()) } else { Err(FenceWaitError::Timeout { timeout_ns }) }
        }
        fn reset(&self) {
            self.log.borrow_mut().push(format!("reset:{}", self.label));
            *self.signaled.borrow_mut() = false;
        }
    }

    struct MockSlot {
        fence: MockFence,
    }
    impl FrameSlot for MockSlot {
        type Fence = MockFence;
        fn fence(&self) -> &MockFence {
            &self.fence
        }
        fn reset_commands(&self) {
            self.fence.log.borrow_mut().push(format!("reset_cmd:{}", self.fence.label));
        }
    }

    fn manager(log: &EventLog) -> FrameManager<MockSlot> {
        FrameManager::new(1_000, |label| MockSlot {
            fence: MockFence {
                label: label.index(),
                signaled: RefCell::new(true),
                log: log.clone(),
            },
        })
    }

    /// 模拟 GPU 执行完毕
    fn complete(frames: &FrameManager<MockSlot>, frame_id: u64) {
        *frames.frame(frame_id).slot.fence.signaled.borrow_mut() = true;
    }

    #[test]
    fn test_same_slot_every_fif_count_frames() {
        let log = EventLog::default();
        let mut frames = manager(&log);
        for frame_id in [0_u64, 1, 7, 100] {
            let n = FrameCounter::fif_count() as u64;
            let label = frames.acquire_frame(frame_id).label;
            complete(&frames, frame_id);
            let label_next = frames.acquire_frame(frame_id + n).label;
            complete(&frames, frame_id + n);
            assert_eq!(label, label_next);
        }
        frames.destroy(|_| {});
    }

    #[test]
    fn test_acquire_order() {
        let log = EventLog::default();
        let mut frames = manager(&log);
        {
            let log = log.clone();
            frames.acquire_frame(0).deletion_queue.push(move || log.borrow_mut().push("delete".to_string()));
        }
        complete(&frames, 0);
        log.borrow_mut().clear();

        frames.acquire_frame(2);

        assert_eq!(*log.borrow(), vec!["wait:0:1000", "delete", "reset:0", "reset_cmd:0"]);
        frames.destroy(|_| {});
    }

    #[test]
    fn test_deletion_waits_for_slot_reuse() {
        let log = EventLog::default();
        let mut frames = manager(&log);
        {
            let log = log.clone();
            frames.acquire_frame(0).deletion_queue.push(move || log.borrow_mut().push("delete".to_string()));
        }

        // 其他 slot 的复用不会触发 slot A 的销毁
        frames.acquire_frame(1);
        assert!(!log.borrow().iter().any(|e| e == "delete"));

        complete(&frames, 0);
        frames.acquire_frame(2);
        let events = log.borrow();
        let delete_at = events.iter().position(|e| e == "delete").unwrap();
        let wait_at = events.iter().rposition(|e| e == "wait:0:1000").unwrap();
        assert!(wait_at < delete_at);
        drop(events);
        frames.destroy(|_| {});
    }

    #[test]
    #[should_panic(expected = "wait fence [frame-A]")]
    fn test_fence_timeout_is_fatal() {
        let log = EventLog::default();
        let mut frames = manager(&log);
        frames.acquire_frame(0);
        // slot A 已经 reset，但是没有任何提交去 signal 它
        frames.acquire_frame(2);
    }

    #[test]
    fn test_destroy_flushes_pending_deletions() {
        let log = EventLog::default();
        let mut frames = manager(&log);
        {
            let log = log.clone();
            frames.acquire_frame(1).deletion_queue.push(move || log.borrow_mut().push("delete".to_string()));
        }
        let destroyed = Rc::new(RefCell::new(0));
        {
            let destroyed = destroyed.clone();
            frames.destroy(move |_| *destroyed.borrow_mut() += 1);
        }
        assert!(log.borrow().iter().any(|e| e == "delete"));
        assert_eq!(*destroyed.borrow(), 2);
    }
}
