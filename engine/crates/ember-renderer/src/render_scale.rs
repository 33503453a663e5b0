use ash::vk;

/// 每帧实际渲染的比例
///
/// 只在设置时 clamp 到 `[min, 1.0]`，非有限值回退到最小值
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderScale {
    value: f32,
    min: f32,
}

// new & init
impl RenderScale {
    /// `min` 会被限制在 (0, 1] 之内
    pub fn new(initial: f32, min: f32) -> Self {
        let min = if min.is_finite() && min > 0.0 { min.min(1.0) } else { 1.0 };
        let mut scale = Self { value: 1.0, min };
        scale.set(initial);
        scale
    }
}

// update
impl RenderScale {
    pub fn set(&mut self, value: f32) {
        self.value = if value.is_finite() { value.clamp(self.min, 1.0) } else { self.min };
    }

    #[inline]
    pub fn adjust(&mut self, delta: f32) {
        self.set(self.value + delta);
    }
}

// getters
impl RenderScale {
    #[inline]
    pub fn get(&self) -> f32 {
        self.value
    }

    #[inline]
    pub fn min(&self) -> f32 {
        self.min
    }
}

/// 本帧的绘制区域：`floor(min(surface, allocated) * scale)`，逐分量计算
///
/// 结果不会超过 `allocated`；`surface` 某一维为 0 时结果也为 0
pub fn draw_extent(surface: vk::Extent2D, allocated: vk::Extent2D, scale: RenderScale) -> vk::Extent2D {
    let r = scale.get();
    let scaled = |s: u32, a: u32| (s.min(a) as f32 * r).floor() as u32;
    vk::Extent2D {
        width: scaled(surface.width, allocated.width),
        height: scaled(surface.height, allocated.height),
    }
}
