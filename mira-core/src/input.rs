//! Local input → control-message translation.
//!
//! Maps a raw input event from the presentation surface to zero or more
//! [`ControlMessage`]s:
//!
//! - pointer coordinates are rescaled from the surface's current size to
//!   the device's current frame size before encoding;
//! - a pointer that leaves the surface while a button is held synthesizes
//!   a button-up, so the device never observes a stuck button;
//! - high-level device actions (home, back, app switch, power, volume)
//!   are a key-down immediately followed by key-up — never a raw
//!   passthrough of a single key state.

use crate::protocol::control::{
    ControlMessage, KeyAction, KeyModifiers, PointerButtons, TouchAction, keycode,
};

/// Pointer id the device attributes mouse-sourced touches to.
pub const POINTER_ID_MOUSE: u64 = u64::MAX;

// ── Raw events ───────────────────────────────────────────────────

/// A local mouse button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    fn flag(self) -> PointerButtons {
        match self {
            MouseButton::Left => PointerButtons::PRIMARY,
            MouseButton::Right => PointerButtons::SECONDARY,
            MouseButton::Middle => PointerButtons::TERTIARY,
        }
    }
}

/// A raw input event from the presentation surface, in surface
/// coordinates. Producing these is the embedder's job; translating them
/// is ours.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    MouseMotion { x: i32, y: i32 },
    MouseButton {
        button: MouseButton,
        pressed: bool,
        x: i32,
        y: i32,
    },
    MouseWheel {
        hscroll: i32,
        vscroll: i32,
        x: i32,
        y: i32,
    },
    Key {
        keycode: u32,
        pressed: bool,
        modifiers: KeyModifiers,
    },
    Text(String),
    /// The pointer left the presentation surface.
    SurfaceLeft,
    /// The presentation surface was resized.
    SurfaceResized { width: u32, height: u32 },
}

/// High-level device actions triggered by the local UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceAction {
    Home,
    Back,
    AppSwitch,
    Power,
    VolumeUp,
    VolumeDown,
    BackOrScreenOn,
    ExpandPanels,
    CollapsePanels,
    GetClipboard,
}

// ── InputMapper ──────────────────────────────────────────────────

/// Stateful translator from surface events to control messages.
#[derive(Debug)]
pub struct InputMapper {
    /// Presentation surface size, in surface pixels.
    surface: (u32, u32),
    /// Device frame size, in device pixels.
    frame: (u16, u16),
    /// Buttons the device currently believes are held.
    buttons: PointerButtons,
    /// Last pointer position, in device coordinates.
    last_pos: (i32, i32),
}

impl InputMapper {
    pub fn new(frame: (u16, u16), surface: (u32, u32)) -> Self {
        Self {
            surface,
            frame,
            buttons: PointerButtons::empty(),
            last_pos: (0, 0),
        }
    }

    /// The device rotated or re-encoded at a new size.
    pub fn set_frame_size(&mut self, width: u16, height: u16) {
        self.frame = (width, height);
    }

    /// Rescale a surface coordinate to device frame coordinates.
    fn to_device(&self, x: i32, y: i32) -> (i32, i32) {
        let scale = |v: i32, from: u32, to: u16| -> i32 {
            if from == 0 {
                return 0;
            }
            let scaled = v as i64 * to as i64 / from as i64;
            scaled.clamp(0, to.saturating_sub(1) as i64) as i32
        };
        (
            scale(x, self.surface.0, self.frame.0),
            scale(y, self.surface.1, self.frame.1),
        )
    }

    fn touch(&self, action: TouchAction, x: i32, y: i32) -> ControlMessage {
        ControlMessage::Touch {
            action,
            pointer_id: POINTER_ID_MOUSE,
            x,
            y,
            screen_width: self.frame.0,
            screen_height: self.frame.1,
            buttons: self.buttons,
        }
    }

    /// Translate one raw event into the control messages it implies.
    pub fn translate(&mut self, event: &InputEvent) -> Vec<ControlMessage> {
        match *event {
            InputEvent::MouseMotion { x, y } => {
                let (dx, dy) = self.to_device(x, y);
                self.last_pos = (dx, dy);
                vec![self.touch(TouchAction::Move, dx, dy)]
            }
            InputEvent::MouseButton {
                button,
                pressed,
                x,
                y,
            } => {
                let (dx, dy) = self.to_device(x, y);
                self.last_pos = (dx, dy);
                if pressed {
                    self.buttons |= button.flag();
                    vec![self.touch(TouchAction::Down, dx, dy)]
                } else {
                    self.buttons -= button.flag();
                    vec![self.touch(TouchAction::Up, dx, dy)]
                }
            }
            InputEvent::MouseWheel {
                hscroll,
                vscroll,
                x,
                y,
            } => {
                let (dx, dy) = self.to_device(x, y);
                vec![ControlMessage::Scroll {
                    x: dx,
                    y: dy,
                    screen_width: self.frame.0,
                    screen_height: self.frame.1,
                    hscroll,
                    vscroll,
                }]
            }
            InputEvent::Key {
                keycode,
                pressed,
                modifiers,
            } => {
                let action = if pressed {
                    KeyAction::Down
                } else {
                    KeyAction::Up
                };
                vec![ControlMessage::Key {
                    action,
                    keycode,
                    metastate: modifiers,
                }]
            }
            InputEvent::Text(ref text) => vec![ControlMessage::Text(text.clone())],
            InputEvent::SurfaceLeft => {
                if self.buttons.is_empty() {
                    return Vec::new();
                }
                // Release everything the device still believes is held.
                self.buttons = PointerButtons::empty();
                let (x, y) = self.last_pos;
                vec![self.touch(TouchAction::Up, x, y)]
            }
            InputEvent::SurfaceResized { width, height } => {
                self.surface = (width, height);
                Vec::new()
            }
        }
    }

    /// Expand a high-level action into its message sequence.
    ///
    /// Key-backed actions always produce a complete down+up pair,
    /// regardless of how the local UI event arrived.
    pub fn action(&self, action: DeviceAction) -> Vec<ControlMessage> {
        let press = |code: u32| {
            vec![
                ControlMessage::Key {
                    action: KeyAction::Down,
                    keycode: code,
                    metastate: KeyModifiers::empty(),
                },
                ControlMessage::Key {
                    action: KeyAction::Up,
                    keycode: code,
                    metastate: KeyModifiers::empty(),
                },
            ]
        };
        match action {
            DeviceAction::Home => press(keycode::HOME),
            DeviceAction::Back => press(keycode::BACK),
            DeviceAction::AppSwitch => press(keycode::APP_SWITCH),
            DeviceAction::Power => press(keycode::POWER),
            DeviceAction::VolumeUp => press(keycode::VOLUME_UP),
            DeviceAction::VolumeDown => press(keycode::VOLUME_DOWN),
            DeviceAction::BackOrScreenOn => vec![ControlMessage::BackOrScreenOn],
            DeviceAction::ExpandPanels => vec![ControlMessage::ExpandPanels],
            DeviceAction::CollapsePanels => vec![ControlMessage::CollapsePanels],
            DeviceAction::GetClipboard => vec![ControlMessage::GetClipboard],
        }
    }

    /// Buttons the device currently believes are held.
    pub fn held_buttons(&self) -> PointerButtons {
        self.buttons
    }
}

// ── Tests ────────────────────────────────────────────────────────
