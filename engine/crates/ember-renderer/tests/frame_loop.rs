//! 通过 mock backend 驱动完整的帧循环，不需要 GPU

use std::{
    cell::{Cell, RefCell},
    collections::VecDeque,
    rc::Rc,
};

use ash::vk;
use ember_gfx::{
    commands::fence::CompletionFence,
    error::{FenceWaitError, GfxError},
};
use ember_renderer::{
    backend::RenderBackend,
    background::ComputePushConstants,
    config::EngineConfig,
    frame::{
        frame_counter::FrameLabel,
        frame_manager::{FrameContext, FrameSlot},
    },
    frame_script::FrameOp,
    renderer::{FrameOutcome, Renderer},
};

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Wait { slot: usize, timeout_ns: u64 },
    ResetFence(usize),
    ResetCommands(usize),
    Acquire(usize),
    Abandon(usize),
    Record { slot: usize, image_index: u32, draw_extent: vk::Extent2D },
    Submit(usize),
    Present(usize),
    Deleted { frame: u64 },
    WaitIdle,
    Recreate(vk::Extent2D),
    DestroySlot(usize),
    Destroy,
}

type EventLog = Rc<RefCell<Vec<Event>>>;

struct MockFence {
    slot: usize,
    signaled: Cell<bool>,
    log: EventLog,
}
impl CompletionFence for MockFence {
    fn wait(&self, timeout_ns: u64) -> Result<(), FenceWaitError> {
        self.log.borrow_mut().push(Event::Wait {
            slot: self.slot,
            timeout_ns,
        });
        if self.signaled.get() { Ok(()) } else { Err(FenceWaitError::Timeout { timeout_ns }) }
    }
    fn reset(&self) {
        self.log.borrow_mut().push(Event::ResetFence(self.slot));
        self.signaled.set(false);
    }
}

struct MockSlot {
    index: usize,
    fence: MockFence,
}
impl FrameSlot for MockSlot {
    type Fence = MockFence;
    fn fence(&self) -> &MockFence {
        &self.fence
    }
    fn reset_commands(&self) {
        self.fence.log.borrow_mut().push(Event::ResetCommands(self.index));
    }
}

struct MockBackend {
    log: EventLog,
    surface: vk::Extent2D,
    draw_image: vk::Extent2D,
    /// 每个背景 effect 的当前参数
    effect_data: Vec<ComputePushConstants>,

    acquire_results: VecDeque<Result<u32, GfxError>>,
    present_results: VecDeque<Result<(), GfxError>>,

    /// 每次 record 时收到的脚本
    scripts: Rc<RefCell<Vec<Vec<FrameOp>>>>,
    /// 录制 Background 时使用的参数
    dispatched: Rc<RefCell<Vec<ComputePushConstants>>>,
    recorded: u64,
}

impl MockBackend {
    fn new(log: &EventLog) -> Self {
        Self {
            log: log.clone(),
            surface: vk::Extent2D { width: 1700, height: 900 },
            draw_image: vk::Extent2D { width: 1700, height: 900 },
            effect_data: vec![ComputePushConstants::default(); 2],
            acquire_results: VecDeque::new(),
            present_results: VecDeque::new(),
            scripts: Rc::default(),
            dispatched: Rc::default(),
            recorded: 0,
        }
    }

    fn push(&self, event: Event) {
        self.log.borrow_mut().push(event);
    }
}

impl RenderBackend for MockBackend {
    type Slot = MockSlot;

    fn create_slot(&mut self, label: FrameLabel) -> MockSlot {
        MockSlot {
            index: label.index(),
            fence: MockFence {
                slot: label.index(),
                signaled: Cell::new(true),
                log: self.log.clone(),
            },
        }
    }

    fn destroy_slot(&mut self, slot: MockSlot) {
        self.push(Event::DestroySlot(slot.index));
    }

    fn destroy(self) {
        self.push(Event::Destroy);
    }

    fn acquire_image(&mut self, slot: &MockSlot) -> Result<u32, GfxError> {
        self.push(Event::Acquire(slot.index));
        self.acquire_results.pop_front().unwrap_or(Ok(0))
    }

    fn abandon_frame(&mut self, slot: &MockSlot) {
        self.push(Event::Abandon(slot.index));
        slot.fence.signaled.set(true);
    }

    fn record(
        &mut self,
        frame: &mut FrameContext<MockSlot>,
        image_index: u32,
        script: &[FrameOp],
        draw_extent: vk::Extent2D,
    ) {
        self.push(Event::Record {
            slot: frame.slot.index,
            image_index,
            draw_extent,
        });
        self.scripts.borrow_mut().push(script.to_vec());
        for op in script {
            if let FrameOp::Background { effect } = *op {
                let data = self.effect_data[effect % self.effect_data.len()];
                self.dispatched.borrow_mut().push(data);
            }
        }

        let log = self.log.clone();
        let frame_number = self.recorded;
        frame.deletion_queue.push(move || log.borrow_mut().push(Event::Deleted { frame: frame_number }));
        self.recorded += 1;
    }

    fn submit(&mut self, slot: &MockSlot) {
        self.push(Event::Submit(slot.index));
        // 模拟 GPU 立即执行完毕
        slot.fence.signaled.set(true);
    }

    fn present(&mut self, slot: &MockSlot, _image_index: u32) -> Result<(), GfxError> {
        self.push(Event::Present(slot.index));
        self.present_results.pop_front().unwrap_or(Ok(()))
    }

    fn surface_extent(&self) -> vk::Extent2D {
        self.surface
    }

    fn draw_image_extent(&self) -> vk::Extent2D {
        self.draw_image
    }

    fn background_effect_count(&self) -> usize {
        self.effect_data.len()
    }

    fn background_effect_data(&self, index: usize) -> Option<ComputePushConstants> {
        (!self.effect_data.is_empty()).then(|| self.effect_data[index % self.effect_data.len()])
    }

    fn set_background_effect_data(&mut self, index: usize, data: ComputePushConstants) {
        let count = self.effect_data.len();
        if count > 0 {
            self.effect_data[index % count] = data;
        }
    }

    fn recreate_swapchain(&mut self, window_extent: vk::Extent2D) {
        self.push(Event::Recreate(window_extent));
        self.surface = window_extent;
    }

    fn wait_idle(&self) {
        self.push(Event::WaitIdle);
    }
}

fn config() -> EngineConfig {
    EngineConfig {
        fence_timeout_ns: 123_456,
        ..Default::default()
    }
}

fn recorded_slots(log: &EventLog) -> Vec<usize> {
    log.borrow()
        .iter()
        .filter_map(|e| match e {
            Event::Record { slot, .. } => Some(*slot),
            _ => None,
        })
        .collect()
}

#[test]
fn test_five_frames_rotate_two_slots() {
    let log = EventLog::default();
    let mut renderer = Renderer::new(MockBackend::new(&log), &config());

    for _ in 0..5 {
        assert_eq!(renderer.draw_frame(), FrameOutcome::Presented);
    }

    assert_eq!(recorded_slots(&log), vec![0, 1, 0, 1, 0]);
    let waits = log
        .borrow()
        .iter()
        .filter_map(|e| match e {
            Event::Wait { timeout_ns, .. } => Some(*timeout_ns),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(waits, vec![123_456; 5]);
    assert_eq!(renderer.frame_id(), 5);

    renderer.destroy();
}

#[test]
fn test_frame_phase_order() {
    let log = EventLog::default();
    let mut renderer = Renderer::new(MockBackend::new(&log), &config());

    renderer.draw_frame();

    assert_eq!(
        *log.borrow(),
        vec![
            Event::Wait {
                slot: 0,
                timeout_ns: 123_456
            },
            Event::ResetFence(0),
            Event::ResetCommands(0),
            Event::Acquire(0),
            Event::Record {
                slot: 0,
                image_index: 0,
                draw_extent: vk::Extent2D { width: 1700, height: 900 },
            },
            Event::Submit(0),
            Event::Present(0),
        ]
    );
    renderer.destroy();
}

#[test]
fn test_frame_deletion_runs_after_slot_wait() {
    let log = EventLog::default();
    let mut renderer = Renderer::new(MockBackend::new(&log), &config());

    renderer.draw_frame(); // frame 0, slot A
    renderer.draw_frame(); // frame 1, slot B
    assert!(!log.borrow().iter().any(|e| matches!(e, Event::Deleted { .. })));

    renderer.draw_frame(); // frame 2, slot A again

    let events = log.borrow();
    let deleted_at = events.iter().position(|e| *e == Event::Deleted { frame: 0 }).unwrap();
    let last_wait_a = events
        .iter()
        .rposition(|e| matches!(e, Event::Wait { slot: 0, .. }))
        .unwrap();
    let last_record = events.iter().rposition(|e| matches!(e, Event::Record { .. })).unwrap();
    assert!(last_wait_a < deleted_at);
    assert!(deleted_at < last_record);
    // slot B 的删除还没有执行
    assert!(!events.iter().any(|e| *e == Event::Deleted { frame: 1 }));
    drop(events);

    renderer.destroy();
}

#[test]
fn test_stale_acquire_skips_frame_and_recovers() {
    let log = EventLog::default();
    let mut backend = MockBackend::new(&log);
    backend.acquire_results.push_back(Err(GfxError::SwapchainOutOfDate));
    let mut renderer = Renderer::new(backend, &config());

    assert_eq!(renderer.draw_frame(), FrameOutcome::SkippedStale);
    assert!(renderer.resize_requested());
    assert_eq!(renderer.frame_id(), 0);
    {
        let events = log.borrow();
        assert!(events.contains(&Event::Abandon(0)));
        assert!(!events.iter().any(|e| matches!(e, Event::Record { .. } | Event::Submit(_) | Event::Present(_))));
    }

    assert!(renderer.resize_if_requested(vk::Extent2D { width: 800, height: 600 }));
    assert!(!renderer.resize_requested());

    // 被放弃的 slot 的 fence 已经重新 signal，再次使用不会超时
    assert_eq!(renderer.draw_frame(), FrameOutcome::Presented);
    assert_eq!(recorded_slots(&log), vec![0]);

    renderer.destroy();
}

#[test]
fn test_stale_present_requests_resize() {
    let log = EventLog::default();
    let mut backend = MockBackend::new(&log);
    backend.present_results.push_back(Err(GfxError::SwapchainOutOfDate));
    let mut renderer = Renderer::new(backend, &config());

    assert_eq!(renderer.draw_frame(), FrameOutcome::PresentedStale);
    assert!(renderer.resize_requested());
    assert_eq!(renderer.frame_id(), 1);

    // 窗口最小化时不重建
    assert!(!renderer.resize_if_requested(vk::Extent2D { width: 0, height: 0 }));
    assert!(renderer.resize_requested());

    log.borrow_mut().clear();
    let new_extent = vk::Extent2D { width: 1280, height: 720 };
    assert!(renderer.resize_if_requested(new_extent));
    assert_eq!(*log.borrow(), vec![Event::WaitIdle, Event::Recreate(new_extent)]);

    renderer.destroy();
}

#[test]
fn test_zero_draw_extent_does_nothing() {
    let log = EventLog::default();
    let mut backend = MockBackend::new(&log);
    backend.surface = vk::Extent2D { width: 0, height: 0 };
    let mut renderer = Renderer::new(backend, &config());

    assert_eq!(renderer.draw_frame(), FrameOutcome::SkippedZeroExtent);
    assert!(log.borrow().is_empty());
    assert_eq!(renderer.frame_id(), 0);

    renderer.destroy();
}

#[test]
fn test_render_scale_drives_draw_extent_and_blit() {
    let log = EventLog::default();
    let mut backend = MockBackend::new(&log);
    backend.surface = vk::Extent2D { width: 1000, height: 600 };
    let scripts = backend.scripts.clone();
    let mut renderer = Renderer::new(backend, &config());

    renderer.set_render_scale(0.5);
    renderer.draw_frame();
    // 低于最小值时被 clamp
    renderer.set_render_scale(0.01);
    assert_eq!(renderer.render_scale(), 0.3);

    let half = vk::Extent2D { width: 500, height: 300 };
    assert!(log.borrow().iter().any(|e| matches!(e, Event::Record { draw_extent, .. } if *draw_extent == half)));
    let blit = scripts.borrow()[0]
        .iter()
        .copied()
        .find(|op| matches!(op, FrameOp::Blit { .. }))
        .unwrap();
    assert_eq!(
        blit,
        FrameOp::Blit {
            src_extent: half,
            dst_extent: vk::Extent2D { width: 1000, height: 600 },
        }
    );

    renderer.destroy();
}

#[test]
fn test_background_effect_selection_wraps() {
    let log = EventLog::default();
    let backend = MockBackend::new(&log);
    let scripts = backend.scripts.clone();
    let mut renderer = Renderer::new(backend, &config());

    renderer.set_background_effect(3);
    assert_eq!(renderer.background_effect(), 1);
    renderer.draw_frame();
    renderer.cycle_background_effect();
    assert_eq!(renderer.background_effect(), 0);

    assert!(scripts.borrow()[0].contains(&FrameOp::Background { effect: 1 }));
    renderer.destroy();
}

#[test]
fn test_edited_effect_data_reaches_record() {
    let log = EventLog::default();
    let backend = MockBackend::new(&log);
    let dispatched = backend.dispatched.clone();
    let mut renderer = Renderer::new(backend, &config());

    renderer.set_background_effect(1);
    renderer.draw_frame();
    let edited = renderer.edit_current_effect(|data| data.nudge_data1(2, 0.25)).unwrap();
    assert_eq!(edited.data1, glam::vec4(0.0, 0.0, 0.25, 0.0));
    assert_eq!(renderer.current_effect_data(), Some(edited));
    renderer.draw_frame();

    // 另一个 effect 的参数不受影响
    renderer.cycle_background_effect();
    assert_eq!(renderer.current_effect_data(), Some(ComputePushConstants::default()));
    renderer.draw_frame();

    assert_eq!(*dispatched.borrow(), vec![ComputePushConstants::default(), edited, ComputePushConstants::default()]);
    renderer.destroy();
}

#[test]
fn test_edit_without_effects_is_ignored() {
    let log = EventLog::default();
    let mut backend = MockBackend::new(&log);
    backend.effect_data.clear();
    let mut renderer = Renderer::new(backend, &config());

    assert_eq!(renderer.current_effect_data(), None);
    assert_eq!(renderer.edit_current_effect(|data| data.nudge_data1(0, 0.1)), None);
    renderer.destroy();
}

#[test]
fn test_destroy_order() {
    let log = EventLog::default();
    let mut renderer = Renderer::new(MockBackend::new(&log), &config());
    renderer.draw_frame();
    log.borrow_mut().clear();

    renderer.destroy();

    assert_eq!(
        *log.borrow(),
        vec![
            Event::WaitIdle,
            // slot A 没有被复用过，frame 0 的删除在销毁时执行
            Event::Deleted { frame: 0 },
            Event::DestroySlot(0),
            Event::DestroySlot(1),
            Event::Destroy,
        ]
    );
}
