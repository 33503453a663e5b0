//! 一帧的录制脚本
//!
//! 帧内的每一步（layout 转换、各个 pass）先组成一个 [`FrameOp`] 列表，
//! 由 [`ImageLayoutTracker`] 回放校验之后，backend 再按顺序录制。

use ash::vk;

use crate::{error::RenderError, transition::ImageLayout};

/// 帧内参与 layout 跟踪的 image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrameImage {
    /// 离屏的 HDR 绘制目标
    Draw,
    Depth,
    /// 本帧获取到的交换链图像
    Swapchain,
}
impl FrameImage {
    const COUNT: usize = 3;

    #[inline]
    fn index(self) -> usize {
        match self {
            Self::Draw => 0,
            Self::Depth => 1,
            Self::Swapchain => 2,
        }
    }
}

/// 脚本中的一步
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOp {
    Transition {
        image: FrameImage,
        from: ImageLayout,
        to: ImageLayout,
    },
    /// compute 背景，写入 draw image
    Background { effect: usize },
    /// 网格绘制，draw image + depth image
    Geometry,
    /// 把 draw image 缩放拷贝到交换链图像
    Blit {
        src_extent: vk::Extent2D,
        dst_extent: vk::Extent2D,
    },
    /// 在交换链图像上绘制 overlay
    Overlay,
}

impl FrameOp {
    /// 这一步要求 image 所处的 layout
    pub fn required_layouts(&self) -> &'static [(FrameImage, ImageLayout)] {
        match self {
            Self::Transition { .. } => &[],
            Self::Background { .. } => &[(FrameImage::Draw, ImageLayout::General)],
            Self::Geometry => &[
                (FrameImage::Draw, ImageLayout::ColorAttachment),
                (FrameImage::Depth, ImageLayout::DepthAttachment),
            ],
            Self::Blit { .. } => &[
                (FrameImage::Draw, ImageLayout::TransferSrc),
                (FrameImage::Swapchain, ImageLayout::TransferDst),
            ],
            Self::Overlay => &[(FrameImage::Swapchain, ImageLayout::ColorAttachment)],
        }
    }
}

/// 构建脚本需要的参数
#[derive(Debug, Clone, Copy)]
pub struct FrameScriptParams {
    pub background_effect: usize,
    pub draw_extent: vk::Extent2D,
    pub swapchain_extent: vk::Extent2D,
}

/// 一帧的标准流程
///
/// 背景 compute → 网格 → blit 到交换链 → overlay → present
pub fn build_frame_script(params: &FrameScriptParams) -> Vec<FrameOp> {
    use FrameImage::*;
    use ImageLayout as L;

    let t = |image, from, to| FrameOp::Transition { image, from, to };
    vec![
        t(Draw, L::Undefined, L::General),
        FrameOp::Background {
            effect: params.background_effect,
        },
        t(Draw, L::General, L::ColorAttachment),
        t(Depth, L::Undefined, L::DepthAttachment),
        FrameOp::Geometry,
        t(Draw, L::ColorAttachment, L::TransferSrc),
        t(Swapchain, L::Undefined, L::TransferDst),
        FrameOp::Blit {
            src_extent: params.draw_extent,
            dst_extent: params.swapchain_extent,
        },
        t(Swapchain, L::TransferDst, L::ColorAttachment),
        FrameOp::Overlay,
        t(Swapchain, L::ColorAttachment, L::PresentSrc),
    ]
}

/// 脚本中所有的 layout 转换，按顺序
pub fn transitions(script: &[FrameOp]) -> Vec<(FrameImage, ImageLayout, ImageLayout)> {
    script
        .iter()
        .filter_map(|op| match *op {
            FrameOp::Transition { image, from, to } => Some((image, from, to)),
            _ => None,
        })
        .collect()
}

/// 回放脚本，跟踪每个 image 当前的 layout
///
/// 每帧开始时所有 image 都视为 UNDEFINED
#[derive(Debug, Clone)]
pub struct ImageLayoutTracker {
    layouts: [ImageLayout; FrameImage::COUNT],
}

impl Default for ImageLayoutTracker {
    fn default() -> Self {
        Self {
            layouts: [ImageLayout::Undefined; FrameImage::COUNT],
        }
    }
}

impl ImageLayoutTracker {
    #[inline]
    pub fn current(&self, image: FrameImage) -> ImageLayout {
        self.layouts[image.index()]
    }

    /// 执行一步，返回第一个不匹配的 layout
    ///
    /// UNDEFINED 作为转换的 src 表示丢弃内容，从任何 layout 出发都合法
    pub fn apply(&mut self, op_index: usize, op: &FrameOp) -> Result<(), RenderError> {
        if let FrameOp::Transition { image, from, to } = *op {
            let tracked = self.current(image);
            if from != ImageLayout::Undefined && from != tracked {
                return Err(RenderError::LayoutMisuse {
                    op_index,
                    image,
                    expected: tracked,
                    actual: from,
                });
            }
            self.layouts[image.index()] = to;
            return Ok(());
        }

        for &(image, required) in op.required_layouts() {
            let tracked = self.current(image);
            if tracked != required {
                return Err(RenderError::LayoutMisuse {
                    op_index,
                    image,
                    expected: required,
                    actual: tracked,
                });
            }
        }
        Ok(())
    }

    /// 回放整个脚本；交换链图像最后必须处于 PRESENT_SRC
    pub fn validate(script: &[FrameOp]) -> Result<(), RenderError> {
        let mut tracker = Self::default();
        for (op_index, op) in script.iter().enumerate() {
            tracker.apply(op_index, op)?;
        }

        let swapchain_layout = tracker.current(FrameImage::Swapchain);
        if swapchain_layout != ImageLayout::PresentSrc {
            return Err(RenderError::LayoutMisuse {
                op_index: script.len(),
                image: FrameImage::Swapchain,
                expected: ImageLayout::PresentSrc,
                actual: swapchain_layout,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params() -> FrameScriptParams {
        FrameScriptParams {
            background_effect: 0,
            draw_extent: vk::Extent2D { width: 850, height: 450 },
            swapchain_extent: vk::Extent2D { width: 1700, height: 900 },
        }
    }

    #[test]
    fn test_standard_script_transitions() {
        use FrameImage::*;
        use ImageLayout as L;

        let script = build_frame_script(&params());
        assert_eq!(
            transitions(&script),
            vec![
                (Draw, L::Undefined, L::General),
                (Draw, L::General, L::ColorAttachment),
                (Depth, L::Undefined, L::DepthAttachment),
                (Draw, L::ColorAttachment, L::TransferSrc),
                (Swapchain, L::Undefined, L::TransferDst),
                (Swapchain, L::TransferDst, L::ColorAttachment),
                (Swapchain, L::ColorAttachment, L::PresentSrc),
            ]
        );
        assert!(ImageLayoutTracker::validate(&script).is_ok());
    }

    #[test]
    fn test_blit_uses_draw_and_swapchain_extent() {
        let script = build_frame_script(&params());
        let blit = script.iter().find(|op| matches!(op, FrameOp::Blit { .. })).unwrap();
        assert_eq!(
            *blit,
            FrameOp::Blit {
                src_extent: vk::Extent2D { width: 850, height: 450 },
                dst_extent: vk::Extent2D { width: 1700, height: 900 },
            }
        );
    }

    #[test]
    fn test_use_without_transition_is_detected() {
        let mut script = build_frame_script(&params());
        // 去掉 depth 的转换
        script.remove(3);

        let err = ImageLayoutTracker::validate(&script).unwrap_err();
        match err {
            RenderError::LayoutMisuse {
                op_index,
                image,
                expected,
                actual,
            } => {
                assert_eq!(op_index, 3);
                assert_eq!(image, FrameImage::Depth);
                assert_eq!(expected, ImageLayout::DepthAttachment);
                assert_eq!(actual, ImageLayout::Undefined);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_transition_from_wrong_layout_is_detected() {
        let mut script = build_frame_script(&params());
        script[2] = FrameOp::Transition {
            image: FrameImage::Draw,
            from: ImageLayout::TransferDst,
            to: ImageLayout::ColorAttachment,
        };

        let err = ImageLayoutTracker::validate(&script).unwrap_err();
        assert!(matches!(
            err,
            RenderError::LayoutMisuse {
                op_index: 2,
                image: FrameImage::Draw,
                expected: ImageLayout::General,
                actual: ImageLayout::TransferDst,
            }
        ));
    }

    #[test]
    fn test_undefined_source_is_valid_from_any_layout() {
        let mut tracker = ImageLayoutTracker::default();
        let to_general = FrameOp::Transition {
            image: FrameImage::Draw,
            from: ImageLayout::Undefined,
            to: ImageLayout::General,
        };
        let discard = FrameOp::Transition {
            image: FrameImage::Draw,
            from: ImageLayout::Undefined,
            to: ImageLayout::TransferDst,
        };
        tracker.apply(0, &to_general).unwrap();
        tracker.apply(1, &discard).unwrap();
        assert_eq!(tracker.current(FrameImage::Draw), ImageLayout::TransferDst);
    }

    #[test]
    fn test_missing_present_transition_is_detected() {
        let mut script = build_frame_script(&params());
        script.pop();

        let err = ImageLayoutTracker::validate(&script).unwrap_err();
        assert!(matches!(
            err,
            RenderError::LayoutMisuse {
                image: FrameImage::Swapchain,
                expected: ImageLayout::PresentSrc,
                ..
            }
        ));
    }
}
