use std::{cell::RefCell, rc::Rc};

use ash::vk;
use ember_gfx::{
    commands::immediate::ImmediateSubmit,
    error::fatal,
    resources::{buffer::GfxBuffer, memory_tier::MemoryTier},
};

use crate::{deletion_queue::DeletionQueue, error::RenderError};

/// 顶点格式，shader 通过 buffer device address 读取
///
/// uv 拆开放在 position 和 normal 之后，刚好填满 16 字节对齐
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: glam::Vec3,
    pub uv_x: f32,
    pub normal: glam::Vec3,
    pub uv_y: f32,
    pub color: glam::Vec4,
}

/// 网格绘制的 push constants
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct GpuDrawPushConstants {
    /// 列主序
    pub world_matrix: [f32; 16],
    pub vertex_buffer: vk::DeviceAddress,
}

/// 上传到 GPU 的网格数据
pub struct GpuMeshBuffers {
    pub index_buffer: GfxBuffer,
    pub vertex_buffer: GfxBuffer,
    pub vertex_buffer_address: vk::DeviceAddress,
}
impl GpuMeshBuffers {
    pub fn destroy(self) {
        self.index_buffer.destroy();
        self.vertex_buffer.destroy();
    }
}

/// 一个网格中使用同一材质的一段 index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GeoSurface {
    pub start_index: u32,
    pub count: u32,
}

pub struct MeshAsset {
    pub name: String,
    pub surfaces: Vec<GeoSurface>,
    pub buffers: GpuMeshBuffers,
}
impl MeshAsset {
    pub fn destroy(self) {
        self.buffers.destroy();
    }
}

/// 当前绘制的网格，以及被替换下来、还没有交给 frame slot 的网格
///
/// 和 main deletion queue 共享：退出时还留在这里的网格由 deletion queue 销毁，
/// 已经通过 [`Self::take_retired`] 交出去的不再归这里管
pub struct MeshSet<M = MeshAsset> {
    current: Vec<M>,
    retired: Vec<M>,
}

// new & init
impl<M: 'static> MeshSet<M> {
    /// 创建时就把销毁注册到 `deletion_queue`
    pub fn register(
        current: Vec<M>,
        deletion_queue: &mut DeletionQueue,
        destroy: impl Fn(M) + 'static,
    ) -> Rc<RefCell<Self>> {
        let set = Rc::new(RefCell::new(Self {
            current,
            retired: vec![],
        }));

        let shared = Rc::clone(&set);
        deletion_queue.push(move || {
            let mut set = shared.borrow_mut();
            let set = &mut *set;
            for mesh in set.retired.drain(..).chain(set.current.drain(..)) {
                destroy(mesh);
            }
        });
        set
    }
}

// getters
impl<M> MeshSet<M> {
    #[inline]
    pub fn current(&self) -> &[M] {
        &self.current
    }
}

// update
impl<M> MeshSet<M> {
    /// 旧的网格进入 retired，等待交给某个 frame slot
    pub fn replace(&mut self, meshes: Vec<M>) {
        let old = std::mem::replace(&mut self.current, meshes);
        self.retired.extend(old);
    }

    #[inline]
    pub fn take_retired(&mut self) -> Vec<M> {
        std::mem::take(&mut self.retired)
    }
}

/// 把 index 和 vertex 上传到 device local 的 buffer
///
/// 使用一个 staging buffer：前半部分是 vertex，后半部分是 index，两次 copy。
/// 通过 immediate submit 同步完成，返回时 staging buffer 已经销毁。
pub fn upload_mesh(
    immediate: &ImmediateSubmit,
    name: &str,
    indices: &[u32],
    vertices: &[Vertex],
) -> Result<GpuMeshBuffers, RenderError> {
    if indices.is_empty() || vertices.is_empty() {
        return Err(RenderError::EmptyMesh {
            indices: indices.len(),
            vertices: vertices.len(),
        });
    }

    let _span = tracy_client::span!("upload_mesh");

    let vertex_size = std::mem::size_of_val(vertices) as vk::DeviceSize;
    let index_size = std::mem::size_of_val(indices) as vk::DeviceSize;

    let vertex_buffer = GfxBuffer::new(
        vertex_size,
        vk::BufferUsageFlags::STORAGE_BUFFER
            | vk::BufferUsageFlags::TRANSFER_DST
            | vk::BufferUsageFlags::SHADER_DEVICE_ADDRESS,
        MemoryTier::DeviceLocal,
        format!("{}-vertex", name),
    );
    let vertex_buffer_address = vertex_buffer
        .device_address()
        .unwrap_or_else(|| fatal("query vertex buffer device address", vertex_buffer.name()));

    let index_buffer = GfxBuffer::new(
        index_size,
        vk::BufferUsageFlags::INDEX_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
        MemoryTier::DeviceLocal,
        format!("{}-index", name),
    );

    let staging = GfxBuffer::new_stage_buffer(vertex_size + index_size, format!("{}-staging", name));
    staging.write_mapped(0, vertices);
    staging.write_mapped(vertex_size, indices);

    immediate.submit(&format!("upload-mesh-{}", name), |cmd| {
        cmd.cmd_copy_buffer(
            &staging,
            &vertex_buffer,
            &[vk::BufferCopy {
                src_offset: 0,
                dst_offset: 0,
                size: vertex_size,
            }],
        );
        cmd.cmd_copy_buffer(
            &staging,
            &index_buffer,
            &[vk::BufferCopy {
                src_offset: vertex_size,
                dst_offset: 0,
                size: index_size,
            }],
        );
    });
    staging.destroy();

    log::info!("uploaded mesh {}: {} vertices, {} indices", name, vertices.len(), indices.len());
    Ok(GpuMeshBuffers {
        index_buffer,
        vertex_buffer,
        vertex_buffer_address,
    })
}

/// 边长为 1 的立方体，每个面 4 个顶点，颜色取自法线
pub fn cube_mesh() -> (Vec<u32>, Vec<Vertex>) {
    let faces = [
        (glam::Vec3::X, glam::Vec3::Y, glam::Vec3::Z),
        (glam::Vec3::NEG_X, glam::Vec3::Y, glam::Vec3::NEG_Z),
        (glam::Vec3::Y, glam::Vec3::Z, glam::Vec3::X),
        (glam::Vec3::NEG_Y, glam::Vec3::NEG_Z, glam::Vec3::X),
        (glam::Vec3::Z, glam::Vec3::X, glam::Vec3::Y),
        (glam::Vec3::NEG_Z, glam::Vec3::NEG_X, glam::Vec3::Y),
    ];
    let corners = [(-0.5, -0.5), (0.5, -0.5), (0.5, 0.5), (-0.5, 0.5)];

    let mut vertices = Vec::with_capacity(faces.len() * 4);
    let mut indices = Vec::with_capacity(faces.len() * 6);
    for (normal, u, v) in faces {
        let base = vertices.len() as u32;
        for (cu, cv) in corners {
            vertices.push(Vertex {
                position: normal * 0.5 + u * cu + v * cv,
                uv_x: cu + 0.5,
                normal,
                uv_y: cv + 0.5,
                color: (normal * 0.5 + 0.5).extend(1.0),
            });
        }
        indices.extend([base, base + 1, base + 2, base + 2, base + 3, base]);
    }
    (indices, vertices)
}

/// 相机固定在 z = 5 处看向原点，reversed-z 透视，y 轴翻转到 Vulkan 的方向
pub fn world_matrix(draw_extent: vk::Extent2D, model: glam::Mat4) -> glam::Mat4 {
    let view = glam::Mat4::from_translation(glam::vec3(0.0, 0.0, -5.0));
    let aspect = draw_extent.width as f32 / draw_extent.height.max(1) as f32;
    let mut projection = glam::Mat4::perspective_rh(70_f32.to_radians(), aspect, 10000.0, 0.1);
    projection.y_axis.y *= -1.0;
    projection * view * model
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gpu_layouts() {
        assert_eq!(std::mem::size_of::<Vertex>(), 48);
        assert_eq!(std::mem::offset_of!(Vertex, normal), 16);
        assert_eq!(std::mem::offset_of!(Vertex, color), 32);
        assert_eq!(std::mem::size_of::<GpuDrawPushConstants>(), 72);
    }

    #[test]
    fn test_cube_mesh() {
        let (indices, vertices) = cube_mesh();
        assert_eq!(vertices.len(), 24);
        assert_eq!(indices.len(), 36);
        assert!(indices.iter().all(|&i| (i as usize) < vertices.len()));
        for v in &vertices {
            // 每个顶点都在立方体表面上
            assert!((v.position.abs().max_element() - 0.5).abs() < 1e-6);
            assert!((v.position.dot(v.normal) - 0.5).abs() < 1e-6);
        }
    }

    #[test]
    fn test_world_matrix_flips_y_and_reverses_depth() {
        let extent = vk::Extent2D { width: 1700, height: 900 };
        let m = world_matrix(extent, glam::Mat4::IDENTITY);

        let up = m * glam::vec4(0.0, 1.0, 0.0, 1.0);
        assert!(up.y / up.w < 0.0);

        let near = m * glam::vec4(0.0, 0.0, 1.0, 1.0);
        let far = m * glam::vec4(0.0, 0.0, -1.0, 1.0);
        assert!(near.z / near.w > far.z / far.w);
    }

    #[test]
    fn test_mesh_set_leftovers_destroyed_by_queue() {
        let mut queue = DeletionQueue::new("main");
        let destroyed = Rc::new(RefCell::new(vec![]));
        let log = Rc::clone(&destroyed);
        queue.push(move || log.borrow_mut().push("pipeline"));

        let log = Rc::clone(&destroyed);
        let meshes = MeshSet::register(vec!["cube-0"], &mut queue, move |m| log.borrow_mut().push(m));
        assert_eq!(queue.len(), 2);

        meshes.borrow_mut().replace(vec!["cube-1"]);
        // 交给 frame slot 的那一批由 slot 的 deletion queue 负责
        assert_eq!(meshes.borrow_mut().take_retired(), vec!["cube-0"]);
        meshes.borrow_mut().replace(vec!["cube-2"]);
        assert_eq!(meshes.borrow().current(), &["cube-2"]);

        queue.flush();
        // 网格在 pipeline 之前销毁，retired 在 current 之前
        assert_eq!(*destroyed.borrow(), vec!["cube-1", "cube-2", "pipeline"]);
        assert!(meshes.borrow().current().is_empty());
    }

    #[test]
    fn test_push_constants_are_bytes() {
        let pc = GpuDrawPushConstants {
            world_matrix: glam::Mat4::IDENTITY.to_cols_array(),
            vertex_buffer: 0xdead_beef,
        };
        let bytes = bytemuck::bytes_of(&pc);
        assert_eq!(bytes.len(), 72);
        assert_eq!(&bytes[64..72], &0xdead_beef_u64.to_ne_bytes());
    }
}
