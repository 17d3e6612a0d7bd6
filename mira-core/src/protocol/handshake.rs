//! Device handshake header.
//!
//! Read once from the video socket, before any video packet:
//!
//! ```text
//! device_name:  64 bytes, NUL-padded UTF-8
//! width:        u16 big-endian
//! height:       u16 big-endian
//! ```
//!
//! The companion process sends the frame size ahead of the stream because
//! the encoder emits nothing while the screen content is static; the window
//! must be sizable before the first picture arrives.

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::MiraError;

/// Length of the NUL-padded device name field.
pub const DEVICE_NAME_FIELD_LENGTH: usize = 64;

/// Total handshake header size on the wire.
pub const HANDSHAKE_SIZE: usize = DEVICE_NAME_FIELD_LENGTH + 4;

// ── DeviceInfo ───────────────────────────────────────────────────

/// Device name and initial frame dimensions from the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub name: String,
    pub width: u16,
    pub height: u16,
}

impl DeviceInfo {
    /// Parse a complete handshake header.
    ///
    /// Fails with [`MiraError::Handshake`] on short input or a zero frame
    /// dimension.
    pub fn parse(data: &[u8]) -> Result<Self, MiraError> {
        if data.len() < HANDSHAKE_SIZE {
            return Err(MiraError::Handshake("header truncated"));
        }

        let name_field = &data[..DEVICE_NAME_FIELD_LENGTH];
        let name_len = name_field
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(DEVICE_NAME_FIELD_LENGTH);
        let name = String::from_utf8_lossy(&name_field[..name_len]).into_owned();

        let width = u16::from_be_bytes([data[64], data[65]]);
        let height = u16::from_be_bytes([data[66], data[67]]);
        if width == 0 || height == 0 {
            return Err(MiraError::Handshake("zero frame dimension"));
        }

        Ok(Self {
            name,
            width,
            height,
        })
    }

    /// Read and parse the handshake from a socket.
    ///
    /// A closed socket or short read is fatal — there is no stream to fall
    /// back to before this header.
    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, MiraError> {
        let mut buf = [0u8; HANDSHAKE_SIZE];
        reader
            .read_exact(&mut buf)
            .await
            .map_err(|_| MiraError::Handshake("short read"))?;
        Self::parse(&buf)
    }

    /// Serialize a handshake header (used by tests and fake devices).
    pub fn encode(&self) -> [u8; HANDSHAKE_SIZE] {
        let mut buf = [0u8; HANDSHAKE_SIZE];
        let name = self.name.as_bytes();
        let n = name.len().min(DEVICE_NAME_FIELD_LENGTH - 1);
        buf[..n].copy_from_slice(&name[..n]);
        buf[64..66].copy_from_slice(&self.width.to_be_bytes());
        buf[66..68].copy_from_slice(&self.height.to_be_bytes());
        buf
    }
}

// ── Tests ────────────────────────────────────────────────────────
