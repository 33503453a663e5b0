//! Ember 渲染核心
//!
//! 帧循环（等待 → 获取交换链图像 → 录制 → 提交 → 呈现）、frame slot 的轮转、
//! 延迟销毁队列、image layout 的转换与校验。
//!
//! 设备相关的部分都藏在 [`backend::RenderBackend`] 后面，
//! 帧循环本身可以脱离 GPU 测试。

pub mod backend;
pub mod background;
pub mod config;
pub mod deletion_queue;
pub mod error;
pub mod frame;
pub mod frame_script;
pub mod mesh;
pub mod overlay;
pub mod render_scale;
pub mod renderer;
pub mod transition;
pub mod vulkan_backend;
