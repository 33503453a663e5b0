use std::{cell::RefCell, path::Path, rc::Rc};

use ash::vk;
use ember_crate_tools::resource::EmberPath;
use ember_gfx::{
    basic::color::LabelColor,
    commands::{
        command_buffer::GfxCommandBuffer, command_pool::GfxCommandPool, fence::GfxFence,
        immediate::ImmediateSubmit, semaphore::GfxSemaphore, submit_info::GfxSubmitInfo,
    },
    descriptors::{
        descriptor_allocator::{DescriptorAllocator, PoolSizeRatio},
        descriptor_layout::DescriptorLayoutBuilder,
        descriptor_writer::DescriptorWriter,
    },
    error::GfxError,
    gfx::Gfx,
    pipelines::{
        graphics_pipeline::{BlendMode, DepthTest, PipelineBuilder},
        pipeline_layout::PipelineLayout,
        shader::ShaderModule,
    },
    resources::image::GfxImage,
    swapchain::render_swapchain::GfxRenderSwapchain,
};
use raw_window_handle::{RawDisplayHandle, RawWindowHandle};

use crate::{
    backend::RenderBackend,
    background::{BackgroundEffects, ComputePushConstants},
    config::EngineConfig,
    deletion_queue::DeletionQueue,
    frame::{
        frame_counter::FrameLabel,
        frame_manager::{FrameContext, FrameSlot},
    },
    frame_script::{FrameImage, FrameOp},
    mesh::{GeoSurface, GpuDrawPushConstants, MeshAsset, MeshSet, Vertex, cube_mesh, upload_mesh, world_matrix},
    overlay::OverlayPass,
    transition::transition_image,
};

/// 一个 frame slot 的设备资源
pub struct GpuFrame {
    command_pool: GfxCommandPool,
    command_buffer: GfxCommandBuffer,

    /// 交换链图像可用
    acquire_complete: GfxSemaphore,
    /// 本帧的命令执行完毕，可以 present
    render_complete: GfxSemaphore,
    /// 创建时为 signaled，第一次复用时不需要等待
    fence: GfxFence,
}

// 创建与销毁
impl GpuFrame {
    pub fn new(label: FrameLabel) -> Self {
        let command_pool = GfxCommandPool::new(
            Gfx::get().gfx_queue_family(),
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            &format!("frame-{}", label),
        );
        let command_buffer = GfxCommandBuffer::new(&command_pool, &format!("frame-{}", label));

        Self {
            command_pool,
            command_buffer,
            acquire_complete: GfxSemaphore::new(&format!("frame-{}-acquire-complete", label)),
            render_complete: GfxSemaphore::new(&format!("frame-{}-render-complete", label)),
            fence: GfxFence::new(true, &format!("frame-{}", label)),
        }
    }

    pub fn destroy(self) {
        self.fence.destroy();
        self.render_complete.destroy();
        self.acquire_complete.destroy();
        self.command_pool.destroy();
    }
}

impl FrameSlot for GpuFrame {
    type Fence = GfxFence;

    #[inline]
    fn fence(&self) -> &GfxFence {
        &self.fence
    }

    #[inline]
    fn reset_commands(&self) {
        self.command_buffer.reset();
    }
}

/// 离屏目标的句柄，image 本身由 main deletion queue 持有
#[derive(Debug, Clone, Copy)]
struct RenderTarget {
    image: vk::Image,
    view: vk::ImageView,
    extent: vk::Extent2D,
    format: vk::Format,
}
impl RenderTarget {
    fn new(image: &GfxImage) -> Self {
        Self {
            image: image.handle(),
            view: image.view(),
            extent: image.extent(),
            format: image.format(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct MeshPipeline {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}

/// Vulkan 上的 [`RenderBackend`]
///
/// 持有交换链、draw/depth image、背景 effect、网格管线和网格。
/// 生命周期和进程相同的对象在创建时就注册到 main deletion queue，退出时逆序销毁。
pub struct VulkanBackend {
    swapchain: GfxRenderSwapchain,

    draw_image: RenderTarget,
    depth_image: RenderTarget,
    /// draw image 作为 storage image 的 descriptor set
    draw_image_set: vk::DescriptorSet,

    background: BackgroundEffects,

    /// 没有 shader 时为 None，跳过网格绘制
    mesh_pipeline: Option<MeshPipeline>,
    /// 被替换下来的网格在下一次录制时交给当前 slot 的 deletion queue
    meshes: Rc<RefCell<MeshSet>>,
    mesh_palette: usize,

    overlay: Option<Box<dyn OverlayPass>>,

    immediate: ImmediateSubmit,
    main_deletion_queue: DeletionQueue,

    /// 获取交换链图像的超时（ns），和 fence 的超时相同
    acquire_timeout_ns: u64,
    /// 已经录制的帧数，用于网格旋转
    recorded_frames: u64,
}

// new & init
impl VulkanBackend {
    const DRAW_FORMAT: vk::Format = vk::Format::R16G16B16A16_SFLOAT;
    const DEPTH_FORMAT: vk::Format = vk::Format::D32_SFLOAT;
    const MESH_PALETTES: [glam::Vec4; 3] = [
        glam::Vec4::ONE,
        glam::vec4(1.0, 0.6, 0.3, 1.0),
        glam::vec4(0.4, 0.8, 1.0, 1.0),
    ];

    pub fn new(
        config: &EngineConfig,
        shader_dir: &Path,
        raw_display_handle: RawDisplayHandle,
        raw_window_handle: RawWindowHandle,
        window_extent: vk::Extent2D,
    ) -> Self {
        let _span = tracy_client::span!("VulkanBackend::new");

        let swapchain = GfxRenderSwapchain::new(
            raw_display_handle,
            raw_window_handle,
            config.present_mode.vk_present_mode(),
            window_extent,
        );
        let immediate = ImmediateSubmit::new(config.fence_timeout_ns);
        let mut main_deletion_queue = DeletionQueue::new("main");

        // draw image 和 depth image 按照配置的窗口大小分配，之后不随窗口变化
        let draw_image = GfxImage::new_2d(
            config.window_extent(),
            Self::DRAW_FORMAT,
            vk::ImageUsageFlags::TRANSFER_SRC
                | vk::ImageUsageFlags::TRANSFER_DST
                | vk::ImageUsageFlags::STORAGE
                | vk::ImageUsageFlags::COLOR_ATTACHMENT,
            "draw-image",
        );
        let draw_target = RenderTarget::new(&draw_image);
        main_deletion_queue.push(move || draw_image.destroy());

        let depth_image = GfxImage::new_2d(
            config.window_extent(),
            Self::DEPTH_FORMAT,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            "depth-image",
        );
        let depth_target = RenderTarget::new(&depth_image);
        main_deletion_queue.push(move || depth_image.destroy());

        // descriptors
        let descriptor_allocator = DescriptorAllocator::new(
            10,
            &[PoolSizeRatio {
                ty: vk::DescriptorType::STORAGE_IMAGE,
                ratio: 1.0,
            }],
            "global",
        );
        let draw_image_set_layout = DescriptorLayoutBuilder::default()
            .add_binding(0, vk::DescriptorType::STORAGE_IMAGE)
            .build(vk::ShaderStageFlags::COMPUTE, "draw-image");
        let draw_image_set = descriptor_allocator.allocate(&draw_image_set_layout, "draw-image");
        DescriptorWriter::default()
            .write_image(
                0,
                draw_target.view,
                vk::Sampler::null(),
                vk::ImageLayout::GENERAL,
                vk::DescriptorType::STORAGE_IMAGE,
            )
            .update_set(draw_image_set);

        let draw_image_set_layout_handle = draw_image_set_layout.handle();
        main_deletion_queue.push(move || {
            descriptor_allocator.destroy();
            draw_image_set_layout.destroy();
        });
        let background = BackgroundEffects::new(shader_dir, draw_image_set_layout_handle, &mut main_deletion_queue);

        let mesh_pipeline = Self::init_mesh_pipeline(shader_dir, draw_target.format, &mut main_deletion_queue);
        let meshes = MeshSet::register(
            Self::upload_default_meshes(&immediate, 0),
            &mut main_deletion_queue,
            MeshAsset::destroy,
        );

        Self {
            swapchain,
            draw_image: draw_target,
            depth_image: depth_target,
            draw_image_set,
            background,
            mesh_pipeline,
            meshes,
            mesh_palette: 0,
            overlay: None,
            immediate,
            main_deletion_queue,
            acquire_timeout_ns: config.fence_timeout_ns,
            recorded_frames: 0,
        }
    }

    fn init_mesh_pipeline(
        shader_dir: &Path,
        color_format: vk::Format,
        deletion_queue: &mut DeletionQueue,
    ) -> Option<MeshPipeline> {
        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::VERTEX)
            .offset(0)
            .size(size_of::<GpuDrawPushConstants>() as u32);
        let layout = PipelineLayout::new(&[], &[push_range], "mesh");
        let layout_handle = layout.handle();
        deletion_queue.push(move || layout.destroy());

        let load = |file: &str| {
            ShaderModule::load(&EmberPath::resolve_shader(shader_dir, file))
                .inspect_err(|e| log::error!("skip mesh pipeline: {}", e))
                .ok()
        };
        let vertex = load("colored_triangle_mesh.vert")?;
        let Some(fragment) = load("colored_triangle.frag") else {
            vertex.destroy();
            return None;
        };

        let pipeline = PipelineBuilder::default()
            .set_shaders(vertex.handle(), fragment.handle())
            .set_input_topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .set_polygon_mode(vk::PolygonMode::FILL)
            .set_cull_mode(vk::CullModeFlags::NONE, vk::FrontFace::CLOCKWISE)
            .set_multisampling_none()
            .set_blend_mode(BlendMode::Additive)
            .set_depth_test(DepthTest::Enabled {
                write: true,
                op: vk::CompareOp::GREATER_OR_EQUAL,
            })
            .set_color_attachment_format(color_format)
            .set_depth_format(Self::DEPTH_FORMAT)
            .set_layout(layout_handle)
            .build_pipeline("mesh");
        vertex.destroy();
        fragment.destroy();

        match pipeline {
            Ok(pipeline) => {
                let mesh_pipeline = MeshPipeline {
                    pipeline: pipeline.handle(),
                    layout: pipeline.layout(),
                };
                deletion_queue.push(move || pipeline.destroy());
                Some(mesh_pipeline)
            }
            Err(e) => {
                log::error!("skip mesh pipeline: {}", e);
                None
            }
        }
    }

    /// 内置的立方体，颜色乘上当前的调色
    fn upload_default_meshes(immediate: &ImmediateSubmit, palette: usize) -> Vec<MeshAsset> {
        let tint = Self::MESH_PALETTES[palette % Self::MESH_PALETTES.len()];
        let (indices, vertices) = cube_mesh();
        let vertices: Vec<Vertex> = vertices
            .into_iter()
            .map(|v| Vertex {
                color: v.color * tint,
                ..v
            })
            .collect();

        match upload_mesh(immediate, "cube", &indices, &vertices) {
            Ok(buffers) => vec![MeshAsset {
                name: "cube".to_string(),
                surfaces: vec![GeoSurface {
                    start_index: 0,
                    count: indices.len() as u32,
                }],
                buffers,
            }],
            Err(e) => {
                log::error!("failed to upload default mesh: {}", e);
                vec![]
            }
        }
    }
}

// destroy
impl VulkanBackend {
    fn destroy_all(mut self) {
        if let Some(mut overlay) = self.overlay.take() {
            overlay.destroy();
        }
        self.main_deletion_queue.flush();
        self.immediate.destroy();
        self.swapchain.destroy();
    }
}

// tools
impl VulkanBackend {
    pub fn set_overlay(&mut self, overlay: Box<dyn OverlayPass>) {
        if let Some(mut old) = self.overlay.replace(overlay) {
            Gfx::get().wait_idle();
            old.destroy();
        }
    }

    /// 换一种颜色重新上传网格
    ///
    /// 旧的网格可能还在被 in-flight 的帧使用，交给下一帧所在 slot 的 deletion queue
    pub fn cycle_mesh_palette(&mut self) {
        self.mesh_palette = (self.mesh_palette + 1) % Self::MESH_PALETTES.len();
        let meshes = Self::upload_default_meshes(&self.immediate, self.mesh_palette);
        if meshes.is_empty() {
            return;
        }
        self.meshes.borrow_mut().replace(meshes);
    }

    #[inline]
    fn frame_image(&self, image: FrameImage, swapchain_image: vk::Image) -> vk::Image {
        match image {
            FrameImage::Draw => self.draw_image.image,
            FrameImage::Depth => self.depth_image.image,
            FrameImage::Swapchain => swapchain_image,
        }
    }

    /// 要求 draw image 处于 COLOR_ATTACHMENT，depth image 处于 DEPTH_ATTACHMENT
    fn record_geometry(&self, cmd: &GfxCommandBuffer, draw_extent: vk::Extent2D) {
        let Some(mesh_pipeline) = self.mesh_pipeline else {
            return;
        };

        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.draw_image.view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::LOAD)
            .store_op(vk::AttachmentStoreOp::STORE);
        // reversed-z：清空为 0
        let depth_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(self.depth_image.view)
            .image_layout(vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .clear_value(vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 0.0, stencil: 0 },
            });
        let render_area = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent: draw_extent,
        };
        let rendering_info = vk::RenderingInfo::default()
            .render_area(render_area)
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment))
            .depth_attachment(&depth_attachment);

        cmd.cmd_begin_rendering(&rendering_info);
        cmd.cmd_bind_pipeline(vk::PipelineBindPoint::GRAPHICS, mesh_pipeline.pipeline);
        cmd.cmd_set_viewport(
            0,
            &[vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: draw_extent.width as f32,
                height: draw_extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            }],
        );
        cmd.cmd_set_scissor(0, &[render_area]);

        let model = glam::Mat4::from_rotation_y(self.recorded_frames as f32 * 0.01)
            * glam::Mat4::from_rotation_x(0.4);
        let world = world_matrix(draw_extent, model);
        for mesh in self.meshes.borrow().current() {
            let push_constants = GpuDrawPushConstants {
                world_matrix: world.to_cols_array(),
                vertex_buffer: mesh.buffers.vertex_buffer_address,
            };
            cmd.cmd_push_constants(
                mesh_pipeline.layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&push_constants),
            );
            cmd.cmd_bind_index_buffer(&mesh.buffers.index_buffer, 0);
            for surface in &mesh.surfaces {
                cmd.draw_indexed(surface.count, surface.start_index, 1, 0, 0);
            }
        }
        cmd.cmd_end_rendering();
    }

    /// 要求交换链图像处于 COLOR_ATTACHMENT
    fn record_overlay(&mut self, cmd: &GfxCommandBuffer, target_view: vk::ImageView, extent: vk::Extent2D) {
        let Some(overlay) = self.overlay.as_mut() else {
            return;
        };

        let color_attachment = vk::RenderingAttachmentInfo::default()
            .image_view(target_view)
            .image_layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .load_op(vk::AttachmentLoadOp::LOAD)
            .store_op(vk::AttachmentStoreOp::STORE);
        let rendering_info = vk::RenderingInfo::default()
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            })
            .layer_count(1)
            .color_attachments(std::slice::from_ref(&color_attachment));

        cmd.cmd_begin_rendering(&rendering_info);
        overlay.record(cmd, target_view, extent);
        cmd.cmd_end_rendering();
    }
}

impl RenderBackend for VulkanBackend {
    type Slot = GpuFrame;

    fn create_slot(&mut self, label: FrameLabel) -> GpuFrame {
        GpuFrame::new(label)
    }

    fn destroy_slot(&mut self, slot: GpuFrame) {
        slot.destroy();
    }

    fn destroy(self) {
        self.destroy_all();
    }

    fn acquire_image(&mut self, slot: &GpuFrame) -> Result<u32, GfxError> {
        let _span = tracy_client::span!("acquire_image");
        self.swapchain.acquire_next_image(&slot.acquire_complete, self.acquire_timeout_ns)
    }

    fn abandon_frame(&mut self, slot: &GpuFrame) {
        // 空提交：fence 在之前的所有提交完成后 signal
        Gfx::get().gfx_queue().submit(&[], Some(&slot.fence));
    }

    fn record(
        &mut self,
        frame: &mut FrameContext<GpuFrame>,
        image_index: u32,
        script: &[FrameOp],
        draw_extent: vk::Extent2D,
    ) {
        let _span = tracy_client::span!("VulkanBackend::record");

        // 上一次复用这个 slot 之后被替换的网格，等到这个 slot 下一次复用时销毁
        for mesh in self.meshes.borrow_mut().take_retired() {
            frame.deletion_queue.push(move || mesh.destroy());
        }

        let cmd = frame.slot.command_buffer.clone();
        let swapchain_image = self.swapchain.images()[image_index as usize];
        let swapchain_view = self.swapchain.image_views()[image_index as usize];
        let swapchain_extent = self.swapchain.extent();

        cmd.begin(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT, &format!("frame-{}", frame.label));
        for op in script {
            match *op {
                FrameOp::Transition { image, from, to } => {
                    transition_image(&cmd, self.frame_image(image, swapchain_image), from, to);
                }
                FrameOp::Background { effect } => {
                    cmd.begin_label("background", LabelColor::COLOR_PASS);
                    self.background.record(&cmd, effect, self.draw_image_set, draw_extent);
                    cmd.end_label();
                }
                FrameOp::Geometry => {
                    cmd.begin_label("geometry", LabelColor::COLOR_PASS);
                    self.record_geometry(&cmd, draw_extent);
                    cmd.end_label();
                }
                FrameOp::Blit { src_extent, dst_extent } => {
                    cmd.begin_label("blit", LabelColor::COLOR_STAGE);
                    cmd.cmd_blit_image_to_image(self.draw_image.image, swapchain_image, src_extent, dst_extent);
                    cmd.end_label();
                }
                FrameOp::Overlay => {
                    cmd.begin_label("overlay", LabelColor::COLOR_PASS);
                    self.record_overlay(&cmd, swapchain_view, swapchain_extent);
                    cmd.end_label();
                }
            }
        }
        cmd.end();

        self.recorded_frames += 1;
    }

    fn submit(&mut self, slot: &GpuFrame) {
        let _span = tracy_client::span!("submit");

        let submit_info = GfxSubmitInfo::new(std::slice::from_ref(&slot.command_buffer))
            .wait(&slot.acquire_complete, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, None)
            .signal(&slot.render_complete, vk::PipelineStageFlags2::ALL_GRAPHICS, None);

        let gfx_queue = Gfx::get().gfx_queue();
        gfx_queue.begin_label("frame", LabelColor::COLOR_FRAME);
        gfx_queue.submit(&[submit_info], Some(&slot.fence));
        gfx_queue.end_label();
    }

    fn present(&mut self, slot: &GpuFrame, image_index: u32) -> Result<(), GfxError> {
        let _span = tracy_client::span!("present");
        self.swapchain.present_image(Gfx::get().gfx_queue(), image_index, std::slice::from_ref(&slot.render_complete))
    }

    #[inline]
    fn surface_extent(&self) -> vk::Extent2D {
        self.swapchain.extent()
    }

    #[inline]
    fn draw_image_extent(&self) -> vk::Extent2D {
        self.draw_image.extent
    }

    #[inline]
    fn background_effect_count(&self) -> usize {
        self.background.len()
    }

    #[inline]
    fn background_effect_data(&self, index: usize) -> Option<ComputePushConstants> {
        self.background.effect(index).map(|effect| effect.data)
    }

    fn set_background_effect_data(&mut self, index: usize, data: ComputePushConstants) {
        if self.background.set_effect_data(index, data) {
            log::debug!("background effect {} data: {:?}", index, data);
        }
    }

    fn recreate_swapchain(&mut self, window_extent: vk::Extent2D) {
        self.swapchain.recreate(window_extent);
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.on_resize(self.swapchain.extent());
        }
    }

    fn wait_idle(&self) {
        Gfx::get().wait_idle();
    }
}
