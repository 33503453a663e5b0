use ash::vk;
use itertools::Itertools;

use crate::{
    error::{GfxError, PipelineStateError},
    foundation::debug_messenger::DebugType,
    gfx::Gfx,
};

/// 颜色混合模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlendMode {
    #[default]
    Disabled,
    /// `src * src_alpha + dst`
    Additive,
    /// `src * src_alpha + dst * (1 - src_alpha)`
    AlphaBlend,
}

impl BlendMode {
    pub fn attachment_state(self) -> vk::PipelineColorBlendAttachmentState {
        let state = vk::PipelineColorBlendAttachmentState::default().color_write_mask(vk::ColorComponentFlags::RGBA);
        let dst_color = match self {
            BlendMode::Disabled => return state.blend_enable(false),
            BlendMode::Additive => vk::BlendFactor::ONE,
            BlendMode::AlphaBlend => vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        };
        state
            .blend_enable(true)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(dst_color)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
    }
}

/// 深度测试模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DepthTest {
    #[default]
    Disabled,
    Enabled { write: bool, op: vk::CompareOp },
}

impl DepthTest {
    pub fn depth_stencil_state(self) -> vk::PipelineDepthStencilStateCreateInfo<'static> {
        let (test, write, op) = match self {
            DepthTest::Disabled => (false, false, vk::CompareOp::NEVER),
            DepthTest::Enabled { write, op } => (true, write, op),
        };
        vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(test)
            .depth_write_enable(write)
            .depth_compare_op(op)
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false)
            .min_depth_bounds(0.0)
            .max_depth_bounds(1.0)
    }
}

/// 一个 shader stage：stage + module + entry
#[derive(Clone, Copy)]
pub struct ShaderStage {
    pub stage: vk::ShaderStageFlags,
    pub module: vk::ShaderModule,
    pub entry_point: &'static std::ffi::CStr,
}

/// 图形管线状态的累积器
///
/// setter 可以任意顺序、重复调用；`build_pipeline` 先校验再编译，
/// 不会改变 builder 自身，可以用来构建多个 pipeline。
///
/// viewport 和 scissor 总是 dynamic 的；只支持 1 个 color attachment（dynamic rendering）
pub struct PipelineBuilder {
    shader_stages: Vec<ShaderStage>,

    topology: vk::PrimitiveTopology,
    polygon_mode: vk::PolygonMode,
    cull_mode: vk::CullModeFlags,
    front_face: vk::FrontFace,

    /// 不使用 MSAA
    sample_count: vk::SampleCountFlags,

    blend_mode: BlendMode,
    depth_test: DepthTest,

    /// dynamic render 需要的 framebuffer 信息
    color_attachment_format: Option<vk::Format>,
    /// format = undefined 表示不使用这个 attachment
    depth_attachment_format: vk::Format,

    layout: Option<vk::PipelineLayout>,
}
impl Default for PipelineBuilder {
    fn default() -> Self {
        Self {
            shader_stages: vec![],
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            polygon_mode: vk::PolygonMode::FILL,
            cull_mode: vk::CullModeFlags::NONE,
            front_face: vk::FrontFace::CLOCKWISE,
            sample_count: vk::SampleCountFlags::TYPE_1,
            blend_mode: BlendMode::Disabled,
            depth_test: DepthTest::Disabled,
            color_attachment_format: None,
            depth_attachment_format: vk::Format::UNDEFINED,
            layout: None,
        }
    }
}
// builder
impl PipelineBuilder {
    /// 回到默认状态
    #[inline]
    pub fn clear(&mut self) -> &mut Self {
        *self = Self::default();
        self
    }

    /// vertex + fragment，入口都是 `main`
    #[inline]
    pub fn set_shaders(&mut self, vertex: vk::ShaderModule, fragment: vk::ShaderModule) -> &mut Self {
        self.shader_stages = vec![
            ShaderStage {
                stage: vk::ShaderStageFlags::VERTEX,
                module: vertex,
                entry_point: c"main",
            },
            ShaderStage {
                stage: vk::ShaderStageFlags::FRAGMENT,
                module: fragment,
                entry_point: c"main",
            },
        ];
        self
    }

    #[inline]
    pub fn set_input_topology(&mut self, topology: vk::PrimitiveTopology) -> &mut Self {
        self.topology = topology;
        self
    }

    #[inline]
    pub fn set_polygon_mode(&mut self, mode: vk::PolygonMode) -> &mut Self {
        self.polygon_mode = mode;
        self
    }

    #[inline]
    pub fn set_cull_mode(&mut self, mode: vk::CullModeFlags, front_face: vk::FrontFace) -> &mut Self {
        self.cull_mode = mode;
        self.front_face = front_face;
        self
    }

    #[inline]
    pub fn set_multisampling_none(&mut self) -> &mut Self {
        self.sample_count = vk::SampleCountFlags::TYPE_1;
        self
    }

    #[inline]
    pub fn set_blend_mode(&mut self, mode: BlendMode) -> &mut Self {
        self.blend_mode = mode;
        self
    }

    #[inline]
    pub fn set_depth_test(&mut self, depth_test: DepthTest) -> &mut Self {
        self.depth_test = depth_test;
        self
    }

    #[inline]
    pub fn set_color_attachment_format(&mut self, format: vk::Format) -> &mut Self {
        self.color_attachment_format = Some(format);
        self
    }

    #[inline]
    pub fn set_depth_format(&mut self, format: vk::Format) -> &mut Self {
        self.depth_attachment_format = format;
        self
    }

    #[inline]
    pub fn set_layout(&mut self, layout: vk::PipelineLayout) -> &mut Self {
        self.layout = Some(layout);
        self
    }
}
// build
impl PipelineBuilder {
    /// 检查顺序：shader stages → color attachment format → layout
    pub fn validate(&self) -> Result<(), PipelineStateError> {
        if self.shader_stages.is_empty() {
            return Err(PipelineStateError::MissingShaderStages);
        }
        if self.color_attachment_format.is_none() {
            return Err(PipelineStateError::MissingColorAttachmentFormat);
        }
        if self.layout.is_none() {
            return Err(PipelineStateError::MissingPipelineLayout);
        }
        Ok(())
    }

    /// 校验失败或者驱动编译失败都返回错误，不会 panic
    pub fn build_pipeline(&self, debug_name: &str) -> Result<GraphicsPipeline, GfxError> {
        self.validate().inspect_err(|e| log::error!("pipeline {} has invalid state: {}", debug_name, e))?;
        let (Some(color_format), Some(layout)) = (self.color_attachment_format, self.layout) else {
            unreachable!("validated above");
        };

        let color_formats = [color_format];
        let mut attach_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(self.depth_attachment_format);

        let shader_stages_info = self
            .shader_stages
            .iter()
            .map(|s| vk::PipelineShaderStageCreateInfo::default().stage(s.stage).module(s.module).name(s.entry_point))
            .collect_vec();

        // 顶点数据通过 buffer device address 读取，不需要 vertex input
        let vertex_input_state_info = vk::PipelineVertexInputStateCreateInfo::default();
        let input_assembly_info = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(self.topology)
            .primitive_restart_enable(false);

        // viewport 和 scissor 具体值由 dynamic 决定，但是数量由该 create info 决定
        let viewport_info = vk::PipelineViewportStateCreateInfo::default().viewport_count(1).scissor_count(1);

        let rasterize_state_info = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(self.polygon_mode)
            .line_width(1.0)
            .cull_mode(self.cull_mode)
            .front_face(self.front_face)
            .depth_bias_enable(false);

        let msaa_info = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(self.sample_count)
            .min_sample_shading(1.0);

        let blend_attachments = [self.blend_mode.attachment_state()];
        let color_blend_info = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .logic_op(vk::LogicOp::COPY)
            .attachments(&blend_attachments);

        let depth_stencil_info = self.depth_test.depth_stencil_state();

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state_info = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages_info)
            .vertex_input_state(&vertex_input_state_info)
            .input_assembly_state(&input_assembly_info)
            .viewport_state(&viewport_info)
            .rasterization_state(&rasterize_state_info)
            .multisample_state(&msaa_info)
            .color_blend_state(&color_blend_info)
            .depth_stencil_state(&depth_stencil_info)
            .layout(layout)
            .dynamic_state(&dynamic_state_info)
            .push_next(&mut attach_info);

        let gfx_device = Gfx::get().gfx_device();
        let pipelines = unsafe {
            gfx_device.create_graphics_pipelines(vk::PipelineCache::null(), std::slice::from_ref(&pipeline_info), None)
        };
        let pipeline = match pipelines {
            Ok(pipelines) => pipelines[0],
            Err((_, result)) => {
                log::error!("failed to create graphics pipeline {}: {:?}", debug_name, result);
                return Err(GfxError::PipelineCompile {
                    name: debug_name.to_string(),
                    result,
                });
            }
        };

        let pipeline = GraphicsPipeline { pipeline, layout };
        gfx_device.set_debug_name(&pipeline, debug_name);
        Ok(pipeline)
    }
}

/// 不可变的图形管线
///
/// layout 由调用者持有，这里只保存 handle
pub struct GraphicsPipeline {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}
impl GraphicsPipeline {
    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    #[inline]
    pub fn destroy(self) {
        unsafe {
            Gfx::get().gfx_device().destroy_pipeline(self.pipeline, None);
        }
    }
}
impl DebugType for GraphicsPipeline {
    fn debug_type_name() -> &'static str {
        "GfxGraphicsPipeline"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.pipeline
    }
}
