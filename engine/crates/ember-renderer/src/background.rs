use std::path::Path;

use ash::vk;
use ember_crate_tools::resource::EmberPath;
use ember_gfx::{
    commands::command_buffer::GfxCommandBuffer,
    pipelines::{compute_pipeline::ComputePipeline, pipeline_layout::PipelineLayout, shader::ShaderModule},
};
use itertools::Itertools;

use crate::deletion_queue::DeletionQueue;

/// 背景 compute shader 的 push constants，含义由各个 shader 自己决定
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ComputePushConstants {
    pub data1: glam::Vec4,
    pub data2: glam::Vec4,
    pub data3: glam::Vec4,
    pub data4: glam::Vec4,
}

impl ComputePushConstants {
    /// data1 的第 `channel` 个分量加上 `step`，超过 1 时回到 0
    pub fn nudge_data1(&mut self, channel: usize, step: f32) {
        let value = &mut self.data1[channel % 4];
        *value += step;
        if *value > 1.0 {
            *value = 0.0;
        }
    }
}

/// 一个背景 effect 的描述：名字、SPIR-V 文件、初始参数
#[derive(Debug, Clone)]
pub struct EffectDesc {
    pub name: &'static str,
    pub shader_file: &'static str,
    pub data: ComputePushConstants,
}

/// 内置的两个 effect：渐变和星空
pub fn default_effect_descs() -> Vec<EffectDesc> {
    vec![
        EffectDesc {
            name: "gradient",
            shader_file: "gradient_color.comp",
            data: ComputePushConstants {
                data1: glam::vec4(1.0, 0.0, 0.0, 1.0),
                data2: glam::vec4(0.0, 0.0, 1.0, 1.0),
                ..Default::default()
            },
        },
        EffectDesc {
            name: "sky",
            shader_file: "sky.comp",
            data: ComputePushConstants {
                data1: glam::vec4(0.1, 0.2, 0.4, 0.97),
                ..Default::default()
            },
        },
    ]
}

/// workgroup 大小是 16x16
#[inline]
pub fn dispatch_size(extent: vk::Extent2D) -> glam::UVec3 {
    glam::uvec3(extent.width.div_ceil(16), extent.height.div_ceil(16), 1)
}

/// 下标超出范围时回绕；没有 effect 时返回 None
#[inline]
pub fn wrap_effect_index(index: usize, count: usize) -> Option<usize> {
    (count > 0).then(|| index % count)
}

pub struct ComputeEffect {
    pub name: String,
    /// pipeline 本身由 main deletion queue 销毁
    pub pipeline: vk::Pipeline,
    pub data: ComputePushConstants,
}

/// 所有背景 effect，共享一个 pipeline layout：
/// set 0 是 draw image（storage image），push constants 是 [`ComputePushConstants`]
pub struct BackgroundEffects {
    layout: vk::PipelineLayout,
    effects: Vec<ComputeEffect>,
}

// new & init
impl BackgroundEffects {
    /// 加载失败的 effect 会被跳过并写日志
    ///
    /// layout 和各个 pipeline 的销毁注册到 `deletion_queue`
    pub fn new(
        shader_dir: &Path,
        draw_image_set_layout: vk::DescriptorSetLayout,
        deletion_queue: &mut DeletionQueue,
    ) -> Self {
        let push_range = vk::PushConstantRange::default()
            .stage_flags(vk::ShaderStageFlags::COMPUTE)
            .offset(0)
            .size(size_of::<ComputePushConstants>() as u32);
        let layout = PipelineLayout::new(&[draw_image_set_layout], &[push_range], "background-effects");
        let layout_handle = layout.handle();
        deletion_queue.push(move || layout.destroy());

        let mut effects = Vec::new();
        for desc in default_effect_descs() {
            let shader = match ShaderModule::load(&EmberPath::resolve_shader(shader_dir, desc.shader_file)) {
                Ok(shader) => shader,
                Err(e) => {
                    log::error!("skip background effect {}: {}", desc.name, e);
                    continue;
                }
            };
            let pipeline = ComputePipeline::new(layout_handle, &shader, desc.name);
            shader.destroy();

            match pipeline {
                Ok(pipeline) => {
                    effects.push(ComputeEffect {
                        name: desc.name.to_string(),
                        pipeline: pipeline.handle(),
                        data: desc.data,
                    });
                    deletion_queue.push(move || pipeline.destroy());
                }
                Err(e) => log::error!("skip background effect {}: {}", desc.name, e),
            }
        }
        log::info!("background effects loaded: [{}]", effects.iter().map(|e| &e.name).join(", "));

        Self {
            layout: layout_handle,
            effects,
        }
    }
}

// getters
impl BackgroundEffects {
    #[inline]
    pub fn len(&self) -> usize {
        self.effects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    #[inline]
    pub fn effect(&self, index: usize) -> Option<&ComputeEffect> {
        wrap_effect_index(index, self.effects.len()).map(|i| &self.effects[i])
    }
}

// update
impl BackgroundEffects {
    /// 下标会回绕；没有任何 effect 时返回 false
    pub fn set_effect_data(&mut self, index: usize, data: ComputePushConstants) -> bool {
        let Some(index) = wrap_effect_index(index, self.effects.len()) else {
            return false;
        };
        self.effects[index].data = data;
        true
    }
}

// tools
impl BackgroundEffects {
    /// 要求 draw image 处于 GENERAL
    pub fn record(
        &self,
        cmd: &GfxCommandBuffer,
        index: usize,
        draw_image_set: vk::DescriptorSet,
        draw_extent: vk::Extent2D,
    ) {
        let Some(effect) = self.effect(index) else {
            return;
        };

        cmd.cmd_bind_pipeline(vk::PipelineBindPoint::COMPUTE, effect.pipeline);
        cmd.bind_descriptor_sets(vk::PipelineBindPoint::COMPUTE, self.layout, 0, &[draw_image_set]);
        cmd.cmd_push_constants(
            self.layout,
            vk::ShaderStageFlags::COMPUTE,
            0,
            bytemuck::bytes_of(&effect.data),
        );
        cmd.cmd_dispatch(dispatch_size(draw_extent));
    }
}
