use std::fmt::Display;

/// frame slot 的标签，和 slot 的下标一一对应
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum FrameLabel {
    A,
    B,
}
impl FrameLabel {
    /// 帧序号对应的 slot 标签
    #[inline]
    pub const fn from_frame_id(frame_id: u64) -> Self {
        match frame_id % FrameCounter::FIF_COUNT as u64 {
            0 => Self::A,
            _ => Self::B,
        }
    }

    #[inline]
    pub const fn index(self) -> usize {
        match self {
            Self::A => 0,
            Self::B => 1,
        }
    }
}
impl Display for FrameLabel {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::A => write!(f, "A"),
            Self::B => write!(f, "B"),
        }
    }
}

/// 帧计数器
///
/// 只在成功提交的帧之后累加，被放弃的帧不计数
#[derive(Debug, Default)]
pub struct FrameCounter {
    /// 当前的帧序号，一直累加
    frame_id: u64,
}
// new & init
impl FrameCounter {
    pub fn new(init_frame_id: u64) -> Self {
        Self { frame_id: init_frame_id }
    }
}
// update
impl FrameCounter {
    #[inline]
    pub fn next_frame(&mut self) {
        self.frame_id = self.frame_id.wrapping_add(1);
    }
}
// getters
impl FrameCounter {
    const FIF_COUNT: usize = 2;

    #[inline]
    pub fn frame_id(&self) -> u64 {
        self.frame_id
    }
    #[inline]
    pub const fn fif_count() -> usize {
        Self::FIF_COUNT
    }
    #[inline]
    pub const fn frame_labels() -> [FrameLabel; Self::FIF_COUNT] {
        [FrameLabel::A, FrameLabel::B]
    }
    #[inline]
    pub fn frame_label(&self) -> FrameLabel {
        FrameLabel::from_frame_id(self.frame_id)
    }
    #[inline]
    pub fn frame_name(&self) -> String {
        format!("[F{}{}]", self.frame_id, self.frame_label())
    }
}
