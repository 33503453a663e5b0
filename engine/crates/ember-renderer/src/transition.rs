//! image layout 以及 layout 之间的转换
//!
//! 每个 layout 对应一组固定的 stage / access，barrier 的 src 来自旧 layout，dst 来自新 layout。
//! 旧 layout 为 UNDEFINED 时，src access 由 barrier 的类别（attachment 或 general/transfer）决定。

use ash::vk;
use ember_gfx::commands::{barrier::GfxImageBarrier, command_buffer::GfxCommandBuffer};

/// 帧内 image 会用到的 layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageLayout {
    /// 作为 src 时表示丢弃旧内容
    Undefined,
    /// compute shader 读写 storage image
    General,
    ColorAttachment,
    DepthAttachment,
    TransferSrc,
    TransferDst,
    PresentSrc,
}

/// barrier 的两大类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarrierScope {
    /// 光栅化阶段读写 color/depth attachment
    Attachment,
    /// compute 读写 storage image，或者 copy/blit
    GeneralTransfer,
}

impl BarrierScope {
    /// 这一类操作可能留下的写入
    pub const fn writes(self) -> vk::AccessFlags2 {
        match self {
            Self::Attachment => vk::AccessFlags2::from_raw(
                vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw()
                    | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw(),
            ),
            Self::GeneralTransfer => vk::AccessFlags2::from_raw(
                vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw() | vk::AccessFlags2::TRANSFER_WRITE.as_raw(),
            ),
        }
    }
}

/// 某个 layout 下的访问方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayoutState {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    pub layout: vk::ImageLayout,
}

impl LayoutState {
    #[inline]
    const fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2, layout: vk::ImageLayout) -> Self {
        Self { stage, access, layout }
    }
}

impl ImageLayout {
    pub const fn state(self) -> LayoutState {
        match self {
            Self::Undefined => LayoutState::new(
                vk::PipelineStageFlags2::ALL_COMMANDS,
                vk::AccessFlags2::NONE,
                vk::ImageLayout::UNDEFINED,
            ),
            Self::General => LayoutState::new(
                vk::PipelineStageFlags2::COMPUTE_SHADER,
                vk::AccessFlags2::from_raw(
                    vk::AccessFlags2::SHADER_STORAGE_READ.as_raw() | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw(),
                ),
                vk::ImageLayout::GENERAL,
            ),
            Self::ColorAttachment => LayoutState::new(
                vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
                vk::AccessFlags2::from_raw(
                    vk::AccessFlags2::COLOR_ATTACHMENT_READ.as_raw()
                        | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw(),
                ),
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            ),
            Self::DepthAttachment => LayoutState::new(
                vk::PipelineStageFlags2::from_raw(
                    vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw()
                        | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
                ),
                vk::AccessFlags2::from_raw(
                    vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
                        | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw(),
                ),
                vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
            ),
            Self::TransferSrc => LayoutState::new(
                vk::PipelineStageFlags2::ALL_TRANSFER,
                vk::AccessFlags2::TRANSFER_READ,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
            ),
            Self::TransferDst => LayoutState::new(
                vk::PipelineStageFlags2::ALL_TRANSFER,
                vk::AccessFlags2::TRANSFER_WRITE,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            ),
            // 呈现引擎的读取由 semaphore 保证，这里只需要让之前的写入完成
            Self::PresentSrc => LayoutState::new(
                vk::PipelineStageFlags2::ALL_GRAPHICS,
                vk::AccessFlags2::NONE,
                vk::ImageLayout::PRESENT_SRC_KHR,
            ),
        }
    }

    #[inline]
    pub fn vk_layout(self) -> vk::ImageLayout {
        self.state().layout
    }

    #[inline]
    pub fn is_attachment(self) -> bool {
        matches!(self, Self::ColorAttachment | Self::DepthAttachment)
    }
}

/// 只要有一侧是 attachment，就属于 attachment 类的 barrier
#[inline]
pub fn barrier_scope(from: ImageLayout, to: ImageLayout) -> BarrierScope {
    if from.is_attachment() || to.is_attachment() { BarrierScope::Attachment } else { BarrierScope::GeneralTransfer }
}

/// 从 `from` 到 `to` 的 barrier；转入或转出 depth attachment 时使用 depth aspect
pub fn image_barrier(image: vk::Image, from: ImageLayout, to: ImageLayout) -> GfxImageBarrier {
    let scope = barrier_scope(from, to);
    let mut src = from.state();
    let dst = to.state();
    // 丢弃旧内容时 UNDEFINED 自身没有 access，同一类的写入仍然要在 layout 转换之前可用
    if from == ImageLayout::Undefined {
        src.access = scope.writes();
    }
    let aspect = if from == ImageLayout::DepthAttachment || to == ImageLayout::DepthAttachment {
        vk::ImageAspectFlags::DEPTH
    } else {
        vk::ImageAspectFlags::COLOR
    };

    GfxImageBarrier::new()
        .image(image)
        .layout_transfer(from.vk_layout(), to.vk_layout())
        .src_mask(src.stage, src.access)
        .dst_mask(dst.stage, dst.access)
        .image_aspect_flag(aspect)
}

/// 向 `cmd` 追加一个 synchronization2 image barrier
pub fn transition_image(cmd: &GfxCommandBuffer, image: vk::Image, from: ImageLayout, to: ImageLayout) {
    log::trace!("transition {:?}: {:?} -> {:?} ({:?})", image, from, to, barrier_scope(from, to));
    cmd.image_memory_barrier(vk::DependencyFlags::empty(), &[image_barrier(image, from, to)]);
}
