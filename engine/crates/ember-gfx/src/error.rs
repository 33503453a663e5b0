use std::path::PathBuf;

use ash::vk;

/// 管线 builder 状态不完整
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PipelineStateError {
    #[error("missing shader stages")]
    MissingShaderStages,
    #[error("missing color attachment format")]
    MissingColorAttachmentFormat,
    #[error("missing pipeline layout")]
    MissingPipelineLayout,
}

/// fence 等待失败的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum FenceWaitError {
    #[error("fence wait timed out after {timeout_ns} ns")]
    Timeout { timeout_ns: u64 },
    #[error("fence wait failed: {0:?}")]
    Device(vk::Result),
}

/// GFX 层可恢复的错误
#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    #[error("failed to read shader file {path:?}: {source}")]
    ShaderLoad {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed SPIR-V in {path:?}: {source}")]
    ShaderParse {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid pipeline state: {0}")]
    PipelineState(#[from] PipelineStateError),

    #[error("failed to compile pipeline {name}: {result:?}")]
    PipelineCompile { name: String, result: vk::Result },

    #[error(transparent)]
    FenceWait(#[from] FenceWaitError),

    #[error("swapchain is out of date")]
    SwapchainOutOfDate,
}

/// 设备级别必须成功的调用
///
/// 失败时以 error 等级写日志，然后 panic；release 下 `panic = 'abort'` 直接终止进程
pub trait VkCheck<T> {
    fn vk_check(self, what: &str) -> T;
}

impl<T> VkCheck<T> for ash::prelude::VkResult<T> {
    #[inline]
    #[track_caller]
    fn vk_check(self, what: &str) -> T {
        match self {
            Ok(value) => value,
            Err(result) => fatal(what, result),
        }
    }
}

/// 致命错误：写日志后 panic
#[cold]
#[track_caller]
pub fn fatal(what: &str, result: impl std::fmt::Debug) -> ! {
    log::error!("fatal vulkan error: {} failed: {:?}", what, result);
    panic!("fatal vulkan error: {} failed: {:?}", what, result);
}
