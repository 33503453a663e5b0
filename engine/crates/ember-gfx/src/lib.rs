//! Vulkan GFX 抽象层
//!
//! 提供对 Vulkan 1.3 的薄封装：设备管理、命令缓冲、同步原语、描述符、管线、交换链。
//! 所有 Vulkan 资源通过 [`gfx::Gfx`] 单例统一管理，简化生命周期和借用关系。
//!
//! 错误分为两级：
//! - 设备级别必须成功的操作，通过 [`error::VkCheck`] 记录日志后 panic
//! - shader 加载、管线构建、fence 等待、交换链过期等可恢复错误，返回 [`error::GfxError`]

pub mod basic;
pub mod commands;
pub mod descriptors;
pub mod error;
pub mod foundation;
pub mod gfx;
pub mod gfx_core;
pub mod pipelines;
pub mod resources;
pub mod swapchain;
