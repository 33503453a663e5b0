use winit::{
    event::{ElementState, KeyEvent, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
};

/// demo 支持的运行时控制
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlAction {
    ScaleUp,
    ScaleDown,
    NextBackground,
    NextMeshPalette,
    /// 调整当前背景 effect 的 data1 的某个分量
    TweakEffect(usize),
}

pub struct WinitEventAdapter {}
impl WinitEventAdapter {
    /// 只响应按下，忽略松开和按键重复
    pub fn control_from_winit_event(event: &WindowEvent) -> Option<ControlAction> {
        match event {
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(key_code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => Self::control_from_key(*key_code),
            _ => None,
        }
    }

    fn control_from_key(key: KeyCode) -> Option<ControlAction> {
        match key {
            KeyCode::ArrowUp | KeyCode::ArrowRight => Some(ControlAction::ScaleUp),
            KeyCode::ArrowDown | KeyCode::ArrowLeft => Some(ControlAction::ScaleDown),
            KeyCode::Space => Some(ControlAction::NextBackground),
            KeyCode::KeyC => Some(ControlAction::NextMeshPalette),
            KeyCode::Digit1 => Some(ControlAction::TweakEffect(0)),
            KeyCode::Digit2 => Some(ControlAction::TweakEffect(1)),
            KeyCode::Digit3 => Some(ControlAction::TweakEffect(2)),
            KeyCode::Digit4 => Some(ControlAction::TweakEffect(3)),
            _ => None,
        }
    }
}
