//! Outbound control messages — the one binary protocol the device obeys.
//!
//! Every message starts with a type byte followed by a fixed or
//! length-prefixed payload, all integers big-endian:
//!
//! ```text
//! 0 KEY                 action u8, keycode u32, metastate u32
//! 1 TEXT                len u32, UTF-8 bytes
//! 2 TOUCH               action u8, pointer_id u64, x i32, y i32,
//!                       screen_w u16, screen_h u16, buttons u32
//! 3 SCROLL              x i32, y i32, screen_w u16, screen_h u16,
//!                       hscroll i32, vscroll i32
//! 4 BACK_OR_SCREEN_ON   —
//! 5 EXPAND_PANELS       —
//! 6 COLLAPSE_PANELS     —
//! 7 GET_CLIPBOARD       —
//! 8 SET_CLIPBOARD       len u32, UTF-8 bytes
//! ```
//!
//! Touch and scroll positions carry the device frame size they were scaled
//! against, so the device can re-project if its own resolution changed in
//! flight.

use bitflags::bitflags;
use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::warn;

use crate::error::MiraError;

/// Longest text payload accepted by the device injector. Longer input is
/// truncated at a character boundary.
pub const MAX_TEXT_LENGTH: usize = 300;

/// Longest clipboard payload.
pub const MAX_CLIPBOARD_LENGTH: usize = 4096;

// ── Keycodes ─────────────────────────────────────────────────────

/// Device keycodes used by the high-level actions.
pub mod keycode {
    pub const HOME: u32 = 3;
    pub const BACK: u32 = 4;
    pub const VOLUME_UP: u32 = 24;
    pub const VOLUME_DOWN: u32 = 25;
    pub const POWER: u32 = 26;
    pub const APP_SWITCH: u32 = 187;
}

// ── Flags ────────────────────────────────────────────────────────

bitflags! {
    /// Key event meta state, matching the device's input stack.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct KeyModifiers: u32 {
        const SHIFT = 0x0000_0001;
        const ALT   = 0x0000_0002;
        const CTRL  = 0x0000_1000;
        const META  = 0x0001_0000;
    }
}

bitflags! {
    /// Pointer buttons currently held, as the device understands them.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct PointerButtons: u32 {
        const PRIMARY   = 1 << 0;
        const SECONDARY = 1 << 1;
        const TERTIARY  = 1 << 2;
    }
}

// ── Actions ──────────────────────────────────────────────────────

/// Key press direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum KeyAction {
    Down = 0,
    Up = 1,
}

/// Touch event phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum TouchAction {
    Down = 0,
    Up = 1,
    Move = 2,
}

// ── ControlMessage ───────────────────────────────────────────────

/// A serialized input/command event sent to the device.
///
/// Immutable once constructed; consumed exactly once by the controller's
/// writer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    Key {
        action: KeyAction,
        keycode: u32,
        metastate: KeyModifiers,
    },
    Text(String),
    Touch {
        action: TouchAction,
        pointer_id: u64,
        x: i32,
        y: i32,
        screen_width: u16,
        screen_height: u16,
        buttons: PointerButtons,
    },
    Scroll {
        x: i32,
        y: i32,
        screen_width: u16,
        screen_height: u16,
        hscroll: i32,
        vscroll: i32,
    },
    BackOrScreenOn,
    ExpandPanels,
    CollapsePanels,
    GetClipboard,
    SetClipboard(String),
}

const TYPE_KEY: u8 = 0;
const TYPE_TEXT: u8 = 1;
const TYPE_TOUCH: u8 = 2;
const TYPE_SCROLL: u8 = 3;
const TYPE_BACK_OR_SCREEN_ON: u8 = 4;
const TYPE_EXPAND_PANELS: u8 = 5;
const TYPE_COLLAPSE_PANELS: u8 = 6;
const TYPE_GET_CLIPBOARD: u8 = 7;
const TYPE_SET_CLIPBOARD: u8 = 8;

/// Truncate to `max` bytes without splitting a UTF-8 character.
fn truncate_utf8(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

impl ControlMessage {
    /// Serialize into `dst`. Never fails: oversized text payloads are
    /// truncated (with a warning) rather than poisoning the writer loop.
    pub fn write_to(&self, dst: &mut BytesMut) {
        match self {
            ControlMessage::Key {
                action,
                keycode,
                metastate,
            } => {
                dst.put_u8(TYPE_KEY);
                dst.put_u8(*action as u8);
                dst.put_u32(*keycode);
                dst.put_u32(metastate.bits());
            }
            ControlMessage::Text(text) => {
                let truncated = truncate_utf8(text, MAX_TEXT_LENGTH);
                if truncated.len() < text.len() {
                    warn!(len = text.len(), "text injection truncated");
                }
                dst.put_u8(TYPE_TEXT);
                dst.put_u32(truncated.len() as u32);
                dst.put_slice(truncated.as_bytes());
            }
            ControlMessage::Touch {
                action,
                pointer_id,
                x,
                y,
                screen_width,
                screen_height,
                buttons,
            } => {
                dst.put_u8(TYPE_TOUCH);
                dst.put_u8(*action as u8);
                dst.put_u64(*pointer_id);
                dst.put_i32(*x);
                dst.put_i32(*y);
                dst.put_u16(*screen_width);
                dst.put_u16(*screen_height);
                dst.put_u32(buttons.bits());
            }
            ControlMessage::Scroll {
                x,
                y,
                screen_width,
                screen_height,
                hscroll,
                vscroll,
            } => {
                dst.put_u8(TYPE_SCROLL);
                dst.put_i32(*x);
                dst.put_i32(*y);
                dst.put_u16(*screen_width);
                dst.put_u16(*screen_height);
                dst.put_i32(*hscroll);
                dst.put_i32(*vscroll);
            }
            ControlMessage::BackOrScreenOn => dst.put_u8(TYPE_BACK_OR_SCREEN_ON),
            ControlMessage::ExpandPanels => dst.put_u8(TYPE_EXPAND_PANELS),
            ControlMessage::CollapsePanels => dst.put_u8(TYPE_COLLAPSE_PANELS),
            ControlMessage::GetClipboard => dst.put_u8(TYPE_GET_CLIPBOARD),
            ControlMessage::SetClipboard(text) => {
                let text = truncate_utf8(text, MAX_CLIPBOARD_LENGTH);
                dst.put_u8(TYPE_SET_CLIPBOARD);
                dst.put_u32(text.len() as u32);
                dst.put_slice(text.as_bytes());
            }
        }
    }

    /// Deserialize one message from the front of `src`.
    ///
    /// Returns `Ok(None)` if `src` does not yet hold a complete message.
    /// Used by the device side of tests; the client only encodes.
    pub fn decode(src: &mut BytesMut) -> Result<Option<Self>, MiraError> {
        if src.is_empty() {
            return Ok(None);
        }
        let ty = src[0];
        let msg = match ty {
            TYPE_KEY => {
                if src.len() < 10 {
                    return Ok(None);
                }
                src.advance(1);
                let action = decode_key_action(src.get_u8())?;
                let keycode = src.get_u32();
                let metastate = KeyModifiers::from_bits_truncate(src.get_u32());
                ControlMessage::Key {
                    action,
                    keycode,
                    metastate,
                }
            }
            TYPE_TEXT | TYPE_SET_CLIPBOARD => {
                if src.len() < 5 {
                    return Ok(None);
                }
                let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
                if len > MAX_CLIPBOARD_LENGTH.max(MAX_TEXT_LENGTH) {
                    return Err(MiraError::InvalidMessage("text payload too long"));
                }
                if src.len() < 5 + len {
                    return Ok(None);
                }
                src.advance(5);
                let bytes = src.split_to(len);
                let text = std::str::from_utf8(&bytes)
                    .map_err(|_| MiraError::InvalidMessage("text payload not UTF-8"))?
                    .to_owned();
                if ty == TYPE_TEXT {
                    ControlMessage::Text(text)
                } else {
                    ControlMessage::SetClipboard(text)
                }
            }
            TYPE_TOUCH => {
                if src.len() < 26 {
                    return Ok(None);
                }
                src.advance(1);
                let action = decode_touch_action(src.get_u8())?;
                ControlMessage::Touch {
                    action,
                    pointer_id: src.get_u64(),
                    x: src.get_i32(),
                    y: src.get_i32(),
                    screen_width: src.get_u16(),
                    screen_height: src.get_u16(),
                    buttons: PointerButtons::from_bits_truncate(src.get_u32()),
                }
            }
            TYPE_SCROLL => {
                if src.len() < 21 {
                    return Ok(None);
                }
                src.advance(1);
                ControlMessage::Scroll {
                    x: src.get_i32(),
                    y: src.get_i32(),
                    screen_width: src.get_u16(),
                    screen_height: src.get_u16(),
                    hscroll: src.get_i32(),
                    vscroll: src.get_i32(),
                }
            }
            TYPE_BACK_OR_SCREEN_ON => {
                src.advance(1);
                ControlMessage::BackOrScreenOn
            }
            TYPE_EXPAND_PANELS => {
                src.advance(1);
                ControlMessage::ExpandPanels
            }
            TYPE_COLLAPSE_PANELS => {
                src.advance(1);
                ControlMessage::CollapsePanels
            }
            TYPE_GET_CLIPBOARD => {
                src.advance(1);
                ControlMessage::GetClipboard
            }
            _ => return Err(MiraError::InvalidMessage("unknown control message type")),
        };
        Ok(Some(msg))
    }
}

fn decode_key_action(v: u8) -> Result<KeyAction, MiraError> {
    match v {
        0 => Ok(KeyAction::Down),
        1 => Ok(KeyAction::Up),
        _ => Err(MiraError::InvalidMessage("unknown key action")),
    }
}

fn decode_touch_action(v: u8) -> Result<TouchAction, MiraError> {
    match v {
        0 => Ok(TouchAction::Down),
        1 => Ok(TouchAction::Up),
        2 => Ok(TouchAction::Move),
        _ => Err(MiraError::InvalidMessage("unknown touch action")),
    }
}

// ── ControlCodec ─────────────────────────────────────────────────

/// Framing codec for the control socket.
///
/// The encoder half drives the controller's `FramedWrite`; the decoder
/// half exists for device-side test harnesses.
#[derive(Debug, Default)]
pub struct ControlCodec;

impl Encoder<ControlMessage> for ControlCodec {
    type Error = MiraError;

    fn encode(&mut self, item: ControlMessage, dst: &mut BytesMut) -> Result<(), Self::Error> {
        item.write_to(dst);
        Ok(())
    }
}

impl Decoder for ControlCodec {
    type Item = ControlMessage;
    type Error = MiraError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        ControlMessage::decode(src)
    }
}

// ── Tests ────────────────────────────────────────────────────────
