use std::path::{Path, PathBuf};

/// 统一资源路径管理
///
/// 所有路径基于工作区根目录（通过 `CARGO_MANIFEST_DIR` 推导）。
///
/// # 使用示例
/// ```ignore
/// let shader = EmberPath::resolve_shader(&EmberPath::shader_build_dir(), "sky.comp"); // shaders/.build/sky.comp.spv
/// let config = EmberPath::workspace_path().join("ember.toml");
/// ```
pub struct EmberPath {}
// 核心路径
impl EmberPath {
    /// 获取工作区根目录
    pub fn workspace_path() -> PathBuf {
        // ember-crate-tools 位于工作区根目录下
        let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
        manifest_dir.parent().unwrap_or(manifest_dir).to_path_buf()
    }

    /// shader 源码目录
    pub fn shader_root_path() -> PathBuf {
        Self::workspace_path().join("shaders")
    }

    /// 编译后的 SPIR-V 所在目录
    pub fn shader_build_dir() -> PathBuf {
        Self::shader_root_path().join(".build")
    }

    /// 在指定目录下解析 shader 路径，统一追加 `.spv` 后缀
    pub fn resolve_shader(dir: &Path, filename: &str) -> PathBuf {
        let mut name = filename.to_string();
        if !name.ends_with(".spv") {
            name.push_str(".spv");
        }
        dir.join(name)
    }
}
