use std::{cell::Cell, ffi::CStr, path::PathBuf, rc::Rc};

use anyhow::Context;
use ash::vk;
use ember_crate_tools::{
    init_log::{init_log, install_panic_handler},
    resource::EmberPath,
};
use ember_gfx::gfx::Gfx;
use ember_renderer::{
    config::EngineConfig,
    renderer::{FrameOutcome, Renderer},
    vulkan_backend::VulkanBackend,
};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use winit::{
    application::ApplicationHandler,
    event::{StartCause, WindowEvent},
    event_loop::ActiveEventLoop,
    window::{Window, WindowId},
};

use crate::{
    scale_overlay::ScaleIndicatorOverlay,
    winit_event_adapter::{ControlAction, WinitEventAdapter},
};

pub struct WinitApp {
    config: EngineConfig,
    shader_dir: PathBuf,

    /// renderer 持有 surface，必须先于 window 销毁
    renderer: Option<Renderer<VulkanBackend>>,
    window: Option<Window>,

    /// 和 overlay 共享，显示当前的 render scale
    scale_indicator: Rc<Cell<f32>>,
}
// 总的 main 函数
impl WinitApp {
    const RENDER_SCALE_STEP: f32 = 0.1;
    /// 数字键 1-4 每次给 data1 对应分量加上的值
    const EFFECT_DATA_STEP: f32 = 0.05;

    /// 整个程序的入口
    pub fn run(config_path: Option<&str>) -> anyhow::Result<()> {
        init_log();
        install_panic_handler();
        tracy_client::Client::start();
        tracy_client::set_thread_name!("EmberMain");

        let config = match config_path {
            Some(path) => EngineConfig::from_file(path)?,
            None => EngineConfig::default(),
        };
        log::info!("config: {:?}", config);

        let event_loop = winit::event_loop::EventLoop::new().context("failed to create event loop")?;

        // 追加 window system 需要的 extension
        let raw_display_handle = event_loop.display_handle()?.as_raw();
        let extra_instance_ext = ash_window::enumerate_required_extensions(raw_display_handle)
            .context("failed to enumerate surface extensions")?
            .iter()
            .map(|ext| unsafe { CStr::from_ptr(*ext) })
            .collect::<Vec<_>>();
        Gfx::init(&config.app_name, &extra_instance_ext, config.validation_verbosity.into());

        let shader_dir = config.shader_dir.clone().unwrap_or_else(EmberPath::shader_build_dir);
        let mut app = Self {
            scale_indicator: Rc::new(Cell::new(config.render_scale)),
            config,
            shader_dir,
            renderer: None,
            window: None,
        };
        let result = event_loop.run_app(&mut app).context("event loop terminated abnormally");

        log::info!("end run.");

        app.destroy();
        result
    }
}
// new & init
impl WinitApp {
    /// 在 window 创建之后调用，初始化 Renderer
    fn init_after_window(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let window = Self::create_window(event_loop, &self.config)?;
        let window_extent = Self::window_extent(&window);

        let mut backend = VulkanBackend::new(
            &self.config,
            &self.shader_dir,
            window.display_handle()?.as_raw(),
            window.window_handle()?.as_raw(),
            window_extent,
        );
        backend.set_overlay(Box::new(ScaleIndicatorOverlay::new(self.scale_indicator.clone())));

        let renderer = Renderer::new(backend, &self.config);
        self.scale_indicator.set(renderer.render_scale());

        self.renderer = Some(renderer);
        self.window = Some(window);
        Ok(())
    }

    fn create_window(event_loop: &ActiveEventLoop, config: &EngineConfig) -> anyhow::Result<Window> {
        let window_attr = Window::default_attributes()
            .with_title(config.app_name.clone())
            .with_inner_size(winit::dpi::PhysicalSize::new(config.window_width, config.window_height));

        event_loop.create_window(window_attr).context("failed to create window")
    }

    fn window_extent(window: &Window) -> vk::Extent2D {
        let size = window.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }
}
// update
impl WinitApp {
    fn update(&mut self) {
        let (Some(window), Some(renderer)) = (self.window.as_ref(), self.renderer.as_mut()) else {
            return;
        };

        // 最小化时不渲染
        let window_extent = Self::window_extent(window);
        if window_extent.width == 0 || window_extent.height == 0 {
            return;
        }
        renderer.resize_if_requested(window_extent);

        match renderer.draw_frame() {
            FrameOutcome::Presented => {}
            outcome => log::debug!("frame {}: {:?}", renderer.frame_id(), outcome),
        }
        tracy_client::frame_mark();
    }

    fn on_control(&mut self, action: ControlAction) {
        let Some(renderer) = self.renderer.as_mut() else {
            return;
        };

        match action {
            ControlAction::ScaleUp => renderer.adjust_render_scale(Self::RENDER_SCALE_STEP),
            ControlAction::ScaleDown => renderer.adjust_render_scale(-Self::RENDER_SCALE_STEP),
            ControlAction::NextBackground => {
                renderer.cycle_background_effect();
                log::info!("background effect: {}", renderer.background_effect());
            }
            ControlAction::NextMeshPalette => renderer.backend_mut().cycle_mesh_palette(),
            ControlAction::TweakEffect(channel) => {
                if let Some(data) = renderer.edit_current_effect(|data| data.nudge_data1(channel, Self::EFFECT_DATA_STEP)) {
                    log::info!("background effect {} data1: {}", renderer.background_effect(), data.data1);
                }
            }
        }
        self.scale_indicator.set(renderer.render_scale());
    }
}
// destroy
impl WinitApp {
    fn destroy(mut self) {
        if let Some(renderer) = self.renderer.take() {
            renderer.destroy();
        }
        self.window = None;
        Gfx::destroy();
    }
}
// 各种 winit 的事件处理
impl ApplicationHandler for WinitApp {
    fn new_events(&mut self, _event_loop: &ActiveEventLoop, _cause: StartCause) {}

    // 建议在这里创建 window 和 Renderer
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        log::info!("winit event: resumed");
        if self.window.is_some() {
            return;
        }

        if let Err(e) = self.init_after_window(event_loop) {
            log::error!("{:#}", e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _window_id: WindowId, event: WindowEvent) {
        if let Some(action) = WinitEventAdapter::control_from_winit_event(&event) {
            self.on_control(action);
        }

        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(new_size) => {
                log::debug!("window resized: {}x{}", new_size.width, new_size.height);
                if let Some(renderer) = self.renderer.as_mut() {
                    renderer.request_resize();
                }
            }
            WindowEvent::RedrawRequested => {
                self.update();
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn suspended(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!("winit event: suspended");
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        log::info!("loop exiting");
    }

    fn memory_warning(&mut self, _event_loop: &ActiveEventLoop) {
        log::warn!("memory warning");
    }
}
