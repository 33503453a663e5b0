use std::path::Path;

use ash::vk;

use crate::{error::GfxError, foundation::debug_messenger::DebugType, gfx::Gfx};

/// 解析 SPIR-V 字节流
///
/// 长度不是 4 的倍数或者 magic number 不对都会返回错误
pub fn read_spirv(bytes: &[u8], path: &Path) -> Result<Vec<u32>, GfxError> {
    ash::util::read_spv(&mut std::io::Cursor::new(bytes)).map_err(|source| GfxError::ShaderParse {
        path: path.to_path_buf(),
        source,
    })
}

/// # Destroy
///
/// 需要手动调用 `destroy` 方法来释放资源，一般在 pipeline 创建完成后立刻销毁
pub struct ShaderModule {
    handle: vk::ShaderModule,

    #[cfg(debug_assertions)]
    destroyed: bool,
}
impl ShaderModule {
    /// # param
    /// * path - spv shader 文件路径
    ///
    /// 文件缺失或者内容不是合法的 SPIR-V 时返回错误，由调用者决定是否跳过该 shader
    pub fn load(path: &Path) -> Result<Self, GfxError> {
        let bytes = std::fs::read(path).map_err(|source| GfxError::ShaderLoad {
            path: path.to_path_buf(),
            source,
        })?;
        let shader_code = read_spirv(&bytes, path)?;

        let shader_module_info = vk::ShaderModuleCreateInfo::default().code(&shader_code);

        let gfx_device = Gfx::get().gfx_device();
        let handle = unsafe { gfx_device.create_shader_module(&shader_module_info, None) }.map_err(|e| {
            GfxError::ShaderParse {
                path: path.to_path_buf(),
                source: std::io::Error::other(format!("vkCreateShaderModule: {:?}", e)),
            }
        })?;

        let shader_module = Self {
            handle,

            #[cfg(debug_assertions)]
            destroyed: false,
        };
        gfx_device.set_debug_name(&shader_module, path.to_string_lossy());
        log::debug!("loaded shader module: {:?}", path);
        Ok(shader_module)
    }

    #[inline]
    pub fn handle(&self) -> vk::ShaderModule {
        self.handle
    }

    #[inline]
    pub fn destroy(mut self) {
        let gfx_device = Gfx::get().gfx_device();
        unsafe {
            gfx_device.destroy_shader_module(self.handle, None);
        }
        #[cfg(debug_assertions)]
        {
            self.destroyed = true;
        }
    }
}
impl Drop for ShaderModule {
    fn drop(&mut self) {
        #[cfg(debug_assertions)]
        debug_assert!(self.destroyed, "ShaderModule must be destroyed manually before drop.");
    }
}
impl DebugType for ShaderModule {
    fn debug_type_name() -> &'static str {
        "GfxShaderModule"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_spirv_rejects_truncated() {
        let err = read_spirv(&[0x03, 0x02, 0x23], Path::new("bad.spv")).unwrap_err();
        assert!(matches!(err, GfxError::ShaderParse { .. }));
    }

    #[test]
    fn test_read_spirv_rejects_bad_magic() {
        let err = read_spirv(&[0u8; 8], Path::new("bad.spv")).unwrap_err();
        assert!(matches!(err, GfxError::ShaderParse { .. }));
    }

    #[test]
    fn test_read_spirv_accepts_magic() {
        let mut bytes = 0x0723_0203u32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&0x0001_0000u32.to_le_bytes());
        let words = read_spirv(&bytes, Path::new("ok.spv")).unwrap();
        assert_eq!(words, vec![0x0723_0203, 0x0001_0000]);
    }
}
