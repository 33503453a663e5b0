use ember_gfx::error::GfxError;

use crate::{frame_script::FrameImage, transition::ImageLayout};

/// 渲染层可恢复的错误
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    /// 帧脚本中第 `op_index` 个操作使用 image 时，layout 和跟踪到的不一致
    #[error("layout misuse at op #{op_index}: {image:?} expected in {expected:?}, but tracked as {actual:?}")]
    LayoutMisuse {
        op_index: usize,
        image: FrameImage,
        expected: ImageLayout,
        actual: ImageLayout,
    },

    #[error("cannot upload an empty mesh ({indices} indices, {vertices} vertices)")]
    EmptyMesh { indices: usize, vertices: usize },

    #[error(transparent)]
    Gfx(#[from] GfxError),
}
