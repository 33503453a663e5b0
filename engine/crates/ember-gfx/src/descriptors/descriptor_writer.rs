use ash::vk;

use crate::gfx::Gfx;

enum PendingInfo {
    Image(usize),
    Buffer(usize),
}

struct PendingWrite {
    binding: u32,
    ty: vk::DescriptorType,
    info: PendingInfo,
}

/// 收集多个 image / buffer 写入，最后一次 `update_set`
///
/// info 先存在自己的数组里，update 时才组装 `vk::WriteDescriptorSet`，避免悬垂指针
#[derive(Default)]
pub struct DescriptorWriter {
    image_infos: Vec<vk::DescriptorImageInfo>,
    buffer_infos: Vec<vk::DescriptorBufferInfo>,
    writes: Vec<PendingWrite>,
}

impl DescriptorWriter {
    pub fn write_image(
        &mut self,
        binding: u32,
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
        ty: vk::DescriptorType,
    ) -> &mut Self {
        self.image_infos.push(vk::DescriptorImageInfo {
            sampler,
            image_view: view,
            image_layout: layout,
        });
        self.writes.push(PendingWrite {
            binding,
            ty,
            info: PendingInfo::Image(self.image_infos.len() - 1),
        });
        self
    }

    pub fn write_buffer(
        &mut self,
        binding: u32,
        buffer: vk::Buffer,
        size: vk::DeviceSize,
        offset: vk::DeviceSize,
        ty: vk::DescriptorType,
    ) -> &mut Self {
        self.buffer_infos.push(vk::DescriptorBufferInfo { buffer, offset, range: size });
        self.writes.push(PendingWrite {
            binding,
            ty,
            info: PendingInfo::Buffer(self.buffer_infos.len() - 1),
        });
        self
    }

    pub fn clear(&mut self) {
        self.image_infos.clear();
        self.buffer_infos.clear();
        self.writes.clear();
    }

    #[inline]
    pub fn pending_writes(&self) -> usize {
        self.writes.len()
    }

    fn vk_writes(&self, set: vk::DescriptorSet) -> Vec<vk::WriteDescriptorSet<'_>> {
        self.writes
            .iter()
            .map(|w| {
                let write = vk::WriteDescriptorSet::default().dst_set(set).dst_binding(w.binding).descriptor_type(w.ty);
                match w.info {
                    PendingInfo::Image(idx) => write.image_info(std::slice::from_ref(&self.image_infos[idx])),
                    PendingInfo::Buffer(idx) => write.buffer_info(std::slice::from_ref(&self.buffer_infos[idx])),
                }
            })
            .collect()
    }

    pub fn update_set(&self, set: vk::DescriptorSet) {
        let writes = self.vk_writes(set);
        unsafe {
            Gfx::get().gfx_device().update_descriptor_sets(&writes, &[]);
        }
    }
}

#[cfg(test)]
mod tests {
    use ash::vk::Handle;

    use super::*;

    #[test]
    fn test_writes_reference_their_infos() {
        let mut writer = DescriptorWriter::default();
        writer
            .write_image(
                0,
                vk::ImageView::from_raw(11),
                vk::Sampler::null(),
                vk::ImageLayout::GENERAL,
                vk::DescriptorType::STORAGE_IMAGE,
            )
            .write_buffer(1, vk::Buffer::from_raw(22), 64, 0, vk::DescriptorType::UNIFORM_BUFFER);

        let writes = writer.vk_writes(vk::DescriptorSet::from_raw(5));
        assert_eq!(writes.len(), 2);
        assert_eq!(writes[0].dst_binding, 0);
        assert_eq!(writes[0].descriptor_count, 1);
        assert_eq!(unsafe { (*writes[0].p_image_info).image_view }.as_raw(), 11);
        assert_eq!(writes[1].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(unsafe { (*writes[1].p_buffer_info).range }, 64);
    }

    #[test]
    fn test_clear() {
        let mut writer = DescriptorWriter::default();
        writer.write_buffer(0, vk::Buffer::null(), 16, 0, vk::DescriptorType::STORAGE_BUFFER);
        writer.clear();
        assert_eq!(writer.pending_writes(), 0);
    }
}
