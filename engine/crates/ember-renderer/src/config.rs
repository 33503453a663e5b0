use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use ash::vk;
use ember_gfx::foundation::debug_messenger::DebugMsgVerbosity;
use serde::{Deserialize, Serialize};

/// 交换链的呈现模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PresentModeConfig {
    #[default]
    Fifo,
    Mailbox,
    Immediate,
}
impl PresentModeConfig {
    #[inline]
    pub fn vk_present_mode(self) -> vk::PresentModeKHR {
        match self {
            Self::Fifo => vk::PresentModeKHR::FIFO,
            Self::Mailbox => vk::PresentModeKHR::MAILBOX,
            Self::Immediate => vk::PresentModeKHR::IMMEDIATE,
        }
    }
}

/// validation layer 消息的输出等级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ValidationVerbosity {
    Error,
    #[default]
    Warning,
    Info,
    Verbose,
}
impl From<ValidationVerbosity> for DebugMsgVerbosity {
    fn from(value: ValidationVerbosity) -> Self {
        match value {
            ValidationVerbosity::Error => DebugMsgVerbosity::Error,
            ValidationVerbosity::Warning => DebugMsgVerbosity::Warning,
            ValidationVerbosity::Info => DebugMsgVerbosity::Info,
            ValidationVerbosity::Verbose => DebugMsgVerbosity::Verbose,
        }
    }
}

/// 引擎配置，所有字段都有默认值
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub app_name: String,

    /// 窗口的初始大小，draw image 和 depth image 也按这个大小分配
    pub window_width: u32,
    pub window_height: u32,

    pub present_mode: PresentModeConfig,

    /// frame slot 和 immediate submit 等待 fence 的超时（ns）
    pub fence_timeout_ns: u64,

    pub render_scale: f32,
    pub min_render_scale: f32,

    /// SPIR-V 文件所在目录；为空时由 app 决定
    pub shader_dir: Option<PathBuf>,

    /// 初始的背景 effect 下标
    pub background_effect: usize,

    pub validation_verbosity: ValidationVerbosity,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            app_name: "Ember".to_string(),
            window_width: 1700,
            window_height: 900,
            present_mode: PresentModeConfig::Fifo,
            fence_timeout_ns: 1_000_000_000,
            render_scale: 1.0,
            min_render_scale: 0.3,
            shader_dir: None,
            background_effect: 0,
            validation_verbosity: ValidationVerbosity::Warning,
        }
    }
}

impl EngineConfig {
    /// 从 TOML 文件加载配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read config file: {:?}", path.as_ref()))?;

        Self::from_toml_str(&content).with_context(|| format!("failed to load config file: {:?}", path.as_ref()))
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: EngineConfig = toml::from_str(content).context("failed to parse TOML config")?;
        Ok(config)
    }

    #[inline]
    pub fn window_extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.window_width,
            height: self.window_height,
        }
    }
}
