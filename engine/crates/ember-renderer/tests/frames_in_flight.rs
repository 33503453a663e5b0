//! 两个 frame slot 同时在 GPU 上执行时的等待和延迟销毁
//!
//! mock 的 GPU 不会自己完成提交：测试可以手动完成，或者在 CPU 等待 fence 时按提交顺序完成

use std::{cell::RefCell, collections::VecDeque, rc::Rc};

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

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    /// CPU 等待一个还没有完成的 slot
    Blocked(usize),
    GpuDone(usize),
    Record(usize),
    Submit(usize),
    MeshDestroyed(u32),
}

/// 按提交顺序执行的队列
#[derive(Default)]
struct MockGpu {
    signaled: [bool; 2],
    pending: VecDeque<usize>,
    /// 不再完成任何提交
    hung: bool,
    log: Vec<Event>,
}

impl MockGpu {
    fn shared() -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            // fence 创建时为 signaled
            signaled: [true; 2],
            ..Default::default()
        }))
    }

    /// 完成最早的一次提交
    fn complete_next(&mut self) -> Option<usize> {
        let slot = self.pending.pop_front()?;
        self.signaled[slot] = true;
        self.log.push(Event::GpuDone(slot));
        Some(slot)
    }

    fn count(&self, event: Event) -> usize {
        self.log.iter().filter(|e| **e == event).count()
    }

    fn position(&self, event: Event) -> Option<usize> {
        self.log.iter().position(|e| *e == event)
    }
}

struct GpuFence {
    slot: usize,
    gpu: Rc<RefCell<MockGpu>>,
}
impl CompletionFence for GpuFence {
    fn wait(&self, timeout_ns: u64) -> Result<(), FenceWaitError> {
        let mut gpu = self.gpu.borrow_mut();
        if gpu.signaled[self.slot] {
            return Ok(());
        }
        if gpu.hung {
            return Err(FenceWaitError::Timeout { timeout_ns });
        }

        gpu.log.push(Event::Blocked(self.slot));
        while !gpu.signaled[self.slot] {
            if gpu.complete_next().is_none() {
                return Err(FenceWaitError::Timeout { timeout_ns });
            }
        }
        Ok(())
    }

    fn reset(&self) {
        self.gpu.borrow_mut().signaled[self.slot] = false;
    }
}

struct GpuSlot {
    index: usize,
    fence: GpuFence,
}
impl FrameSlot for GpuSlot {
    type Fence = GpuFence;
    fn fence(&self) -> &GpuFence {
        &self.fence
    }
    fn reset_commands(&self) {}
}

struct InFlightBackend {
    gpu: Rc<RefCell<MockGpu>>,
    /// 被替换下来的网格 id，下一次录制时交给当前 slot
    retired_meshes: Vec<u32>,
}

impl InFlightBackend {
    fn retire_mesh(&mut self, id: u32) {
        self.retired_meshes.push(id);
    }
}

impl RenderBackend for InFlightBackend {
    type Slot = GpuSlot;

    fn create_slot(&mut self, label: FrameLabel) -> GpuSlot {
        GpuSlot {
            index: label.index(),
            fence: GpuFence {
                slot: label.index(),
                gpu: self.gpu.clone(),
            },
        }
    }

    fn destroy_slot(&mut self, _slot: GpuSlot) {}

    fn destroy(self) {}

    fn acquire_image(&mut self, _slot: &GpuSlot) -> Result<u32, GfxError> {
        Ok(0)
    }

    fn abandon_frame(&mut self, slot: &GpuSlot) {
        self.gpu.borrow_mut().signaled[slot.index] = true;
    }

    fn record(
        &mut self,
        frame: &mut FrameContext<GpuSlot>,
        _image_index: u32,
        _script: &[FrameOp],
        _draw_extent: vk::Extent2D,
    ) {
        for id in self.retired_meshes.drain(..) {
            let gpu = self.gpu.clone();
            frame.deletion_queue.push(move || gpu.borrow_mut().log.push(Event::MeshDestroyed(id)));
        }
        self.gpu.borrow_mut().log.push(Event::Record(frame.slot.index));
    }

    fn submit(&mut self, slot: &GpuSlot) {
        let mut gpu = self.gpu.borrow_mut();
        gpu.pending.push_back(slot.index);
        gpu.log.push(Event::Submit(slot.index));
    }

    fn present(&mut self, _slot: &GpuSlot, _image_index: u32) -> Result<(), GfxError> {
        Ok(())
    }

    fn surface_extent(&self) -> vk::Extent2D {
        vk::Extent2D { width: 640, height: 480 }
    }

    fn draw_image_extent(&self) -> vk::Extent2D {
        vk::Extent2D { width: 640, height: 480 }
    }

    fn background_effect_count(&self) -> usize {
        1
    }

    fn background_effect_data(&self, _index: usize) -> Option<ComputePushConstants> {
        Some(ComputePushConstants::default())
    }

    fn set_background_effect_data(&mut self, _index: usize, _data: ComputePushConstants) {}

    fn recreate_swapchain(&mut self, _window_extent: vk::Extent2D) {}

    fn wait_idle(&self) {
        let mut gpu = self.gpu.borrow_mut();
        while gpu.complete_next().is_some() {}
    }
}

fn renderer(gpu: &Rc<RefCell<MockGpu>>) -> Renderer<InFlightBackend> {
    let backend = InFlightBackend {
        gpu: gpu.clone(),
        retired_meshes: vec![],
    };
    Renderer::new(backend, &EngineConfig::default())
}

#[test]
fn test_third_frame_waits_for_first_slot() {
    let gpu = MockGpu::shared();
    let mut renderer = renderer(&gpu);

    // 两帧都还在 GPU 上，CPU 没有等待
    assert_eq!(renderer.draw_frame(), FrameOutcome::Presented);
    assert_eq!(renderer.draw_frame(), FrameOutcome::Presented);
    assert_eq!(
        gpu.borrow().log,
        vec![Event::Record(0), Event::Submit(0), Event::Record(1), Event::Submit(1)]
    );
    assert_eq!(gpu.borrow().pending, vec![0, 1]);

    gpu.borrow_mut().log.clear();
    renderer.draw_frame();
    // 只等 slot A，slot B 仍在执行
    assert_eq!(
        gpu.borrow().log,
        vec![Event::Blocked(0), Event::GpuDone(0), Event::Record(0), Event::Submit(0)]
    );
    assert_eq!(gpu.borrow().pending, vec![1, 0]);

    renderer.destroy();
}

#[test]
fn test_retired_mesh_destroyed_after_its_slot_wait() {
    let gpu = MockGpu::shared();
    let mut renderer = renderer(&gpu);

    renderer.draw_frame(); // frame 0, slot A
    renderer.backend_mut().retire_mesh(7);
    renderer.draw_frame(); // frame 1, slot B 接管网格 7
    renderer.draw_frame(); // frame 2, 等待 slot A
    assert_eq!(gpu.borrow().count(Event::MeshDestroyed(7)), 0);
    assert_eq!(gpu.borrow().count(Event::Blocked(1)), 0);

    renderer.draw_frame(); // frame 3, 等待 slot B
    {
        let gpu = gpu.borrow();
        let blocked = gpu.position(Event::Blocked(1)).unwrap();
        let done = gpu.position(Event::GpuDone(1)).unwrap();
        let destroyed = gpu.position(Event::MeshDestroyed(7)).unwrap();
        let last_record = gpu.log.iter().rposition(|e| *e == Event::Record(1)).unwrap();
        assert!(blocked < done);
        assert!(done < destroyed);
        assert!(destroyed < last_record);
        assert_eq!(gpu.count(Event::MeshDestroyed(7)), 1);
    }

    renderer.destroy();
}

#[test]
fn test_completed_slot_is_reused_without_blocking() {
    let gpu = MockGpu::shared();
    let mut renderer = renderer(&gpu);

    renderer.draw_frame();
    renderer.backend_mut().retire_mesh(3);
    renderer.draw_frame();

    // GPU 在 CPU 等待之前就完成了两帧
    assert_eq!(gpu.borrow_mut().complete_next(), Some(0));
    assert_eq!(gpu.borrow_mut().complete_next(), Some(1));
    // fence 完成本身不会触发销毁
    assert_eq!(gpu.borrow().count(Event::MeshDestroyed(3)), 0);

    renderer.draw_frame();
    renderer.draw_frame();
    let gpu_ref = gpu.borrow();
    assert!(!gpu_ref.log.iter().any(|e| matches!(e, Event::Blocked(_))));
    assert_eq!(gpu_ref.count(Event::MeshDestroyed(3)), 1);
    drop(gpu_ref);

    renderer.destroy();
}

#[test]
#[should_panic(expected = "wait fence [frame-A]")]
fn test_hung_gpu_is_fatal() {
    let gpu = MockGpu::shared();
    let mut renderer = renderer(&gpu);

    renderer.draw_frame();
    renderer.draw_frame();
    gpu.borrow_mut().hung = true;
    renderer.draw_frame();
}
