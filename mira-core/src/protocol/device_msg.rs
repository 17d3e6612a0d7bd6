//! Inbound device-originated messages on the control socket.
//!
//! The device currently only pushes clipboard contents (in response to a
//! `GetClipboard` request or a device-side copy). Wire format:
//!
//! ```text
//! type:  u8          0 = clipboard
//! len:   u32 BE
//! text:  UTF-8 bytes
//! ```
//!
//! Malformed frames must not kill the channel — the reader logs, resyncs
//! by skipping a byte, and keeps parsing.

use bytes::{Buf, BytesMut};
use tokio_util::codec::Decoder;
use tracing::warn;

use crate::error::MiraError;
use crate::protocol::control::MAX_CLIPBOARD_LENGTH;

const TYPE_CLIPBOARD: u8 = 0;

// ── DeviceMessage ────────────────────────────────────────────────

/// A message pushed by the device to the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceMessage {
    /// Device clipboard contents.
    Clipboard(String),
}

impl DeviceMessage {
    /// Serialize (used by device-side test harnesses).
    pub fn encode(&self) -> Vec<u8> {
        match self {
            DeviceMessage::Clipboard(text) => {
                let mut buf = Vec::with_capacity(5 + text.len());
                buf.push(TYPE_CLIPBOARD);
                buf.extend_from_slice(&(text.len() as u32).to_be_bytes());
                buf.extend_from_slice(text.as_bytes());
                buf
            }
        }
    }
}

// ── DeviceMessageCodec ───────────────────────────────────────────

/// Incremental decoder for the controller's optional reader path.
///
/// Returning `Err` from a `tokio_util` decoder terminates the stream, so
/// malformed input is handled here: skip one byte, log, try again. Only a
/// true I/O error ends the reader.
#[derive(Debug, Default)]
pub struct DeviceMessageCodec;

impl Decoder for DeviceMessageCodec {
    type Item = DeviceMessage;
    type Error = MiraError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, Self::Error> {
        loop {
            if src.is_empty() {
                return Ok(None);
            }

            if src[0] != TYPE_CLIPBOARD {
                warn!(ty = src[0], "skipping unknown device message type");
                src.advance(1);
                continue;
            }

            if src.len() < 5 {
                return Ok(None);
            }
            let len = u32::from_be_bytes([src[1], src[2], src[3], src[4]]) as usize;
            if len > MAX_CLIPBOARD_LENGTH {
                warn!(len, "skipping oversized device clipboard frame");
                src.advance(1);
                continue;
            }
            if src.len() < 5 + len {
                return Ok(None);
            }

            src.advance(5);
            let bytes = src.split_to(len);
            match std::str::from_utf8(&bytes) {
                Ok(text) => return Ok(Some(DeviceMessage::Clipboard(text.to_owned()))),
                Err(_) => {
                    warn!("discarding non-UTF-8 device clipboard frame");
                    continue;
                }
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clipboard_decodes() {
        let mut codec = DeviceMessageCodec;
        let mut buf = BytesMut::from(&DeviceMessage::Clipboard("hello".into()).encode()[..]);
        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg, DeviceMessage::Clipboard("hello".into()));
        assert!(buf.is_empty());
    }

    #[test]
    fn partial_frame_waits_for_more() {
        let mut codec = DeviceMessageCodec;
        let wire = DeviceMessage::Clipboard("clipboard text".into()).encode();

        let mut buf = BytesMut::from(&wire[..wire.len() - 3]);
        assert!(codec.decode(&mut buf).unwrap().is_none());

        buf.extend_from_slice(&wire[wire.len() - 3..]);
        assert!(codec.decode(&mut buf).unwrap().is_some());
    }

    #[test]
    fn unknown_type_is_skipped_not_fatal() {
        let mut codec = DeviceMessageCodec;
        let mut wire = vec![0x42, 0x99]; // garbage
        wire.extend_from_slice(&DeviceMessage::Clipboard("ok".into()).encode());
        let mut buf = BytesMut::from(&wire[..]);

        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg, DeviceMessage::Clipboard("ok".into()));
    }

    #[test]
    fn oversized_length_is_skipped() {
        let mut codec = DeviceMessageCodec;
        let mut wire = vec![TYPE_CLIPBOARD];
        wire.extend_from_slice(&(u32::MAX).to_be_bytes());
        wire.extend_from_slice(&DeviceMessage::Clipboard("after".into()).encode());
        let mut buf = BytesMut::from(&wire[..]);

        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg, DeviceMessage::Clipboard("after".into()));
    }

    #[test]
    fn non_utf8_payload_is_discarded() {
        let mut codec = DeviceMessageCodec;
        let mut wire = vec![TYPE_CLIPBOARD];
        wire.extend_from_slice(&2u32.to_be_bytes());
        wire.extend_from_slice(&[0xFF, 0xFE]);
        wire.extend_from_slice(&DeviceMessage::Clipboard("good".into()).encode());
        let mut buf = BytesMut::from(&wire[..]);

        let msg = codec.decode(&mut buf).unwrap().unwrap();
        assert_eq!(msg, DeviceMessage::Clipboard("good".into()));
    }
}
