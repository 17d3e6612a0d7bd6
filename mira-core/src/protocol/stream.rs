//! Video packet metadata framing.
//!
//! The video channel normally carries the raw elementary stream with no
//! added framing — the codec's start codes delimit pictures. When the
//! session records, the companion process is asked to interleave a packet
//! header before each encoded packet so timestamps survive into the
//! container:
//!
//! ```text
//! pts_and_flags:  u64 big-endian   bit 63 = keyframe, bits 62..0 = µs PTS
//! len:            u32 big-endian   payload length in bytes
//! ```

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::MiraError;

/// Encoded size of the packet header on the wire.
pub const PACKET_HEADER_SIZE: usize = 12;

/// Upper bound on a single encoded packet. A full 4K keyframe stays well
/// under this; anything larger means a desynchronized stream.
pub const MAX_PACKET_SIZE: usize = 16 * 1024 * 1024;

const KEYFRAME_FLAG: u64 = 1 << 63;
const PTS_MASK: u64 = KEYFRAME_FLAG - 1;

// ── PacketHeader ─────────────────────────────────────────────────

/// Decoded per-packet metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacketHeader {
    /// Presentation timestamp in microseconds.
    pub pts: u64,
    /// Whether the packet contains a keyframe.
    pub keyframe: bool,
    /// Payload length in bytes.
    pub len: u32,
}

impl PacketHeader {
    /// Serialize to wire bytes.
    pub fn encode(&self) -> [u8; PACKET_HEADER_SIZE] {
        let mut buf = [0u8; PACKET_HEADER_SIZE];
        let mut pts_and_flags = self.pts & PTS_MASK;
        if self.keyframe {
            pts_and_flags |= KEYFRAME_FLAG;
        }
        buf[0..8].copy_from_slice(&pts_and_flags.to_be_bytes());
        buf[8..12].copy_from_slice(&self.len.to_be_bytes());
        buf
    }

    /// Deserialize from wire bytes.
    pub fn decode(data: &[u8]) -> Result<Self, MiraError> {
        if data.len() < PACKET_HEADER_SIZE {
            return Err(MiraError::InvalidMessage("packet header truncated"));
        }
        let pts_and_flags = u64::from_be_bytes(data[0..8].try_into().unwrap());
        let len = u32::from_be_bytes(data[8..12].try_into().unwrap());
        if len as usize > MAX_PACKET_SIZE {
            return Err(MiraError::PacketTooLarge {
                size: len as usize,
                max: MAX_PACKET_SIZE,
            });
        }
        Ok(Self {
            pts: pts_and_flags & PTS_MASK,
            keyframe: pts_and_flags & KEYFRAME_FLAG != 0,
            len,
        })
    }
}

// ── VideoPacket ──────────────────────────────────────────────────

/// One encoded packet as received from the video socket.
///
/// Transient: owned by the decoder loop for a single iteration, optionally
/// forwarded to the recorder.
#[derive(Debug, Clone)]
pub struct VideoPacket {
    /// Presentation timestamp in microseconds.
    pub pts: u64,
    /// Whether the packet contains a keyframe.
    pub keyframe: bool,
    /// The encoded bytes, exactly as received.
    pub data: Bytes,
}

impl VideoPacket {
    /// Read a `header + payload` packet from a framed video socket.
    ///
    /// Returns `Ok(None)` on a clean end of stream at a packet boundary.
    pub async fn read_from<R: AsyncRead + Unpin>(
        reader: &mut R,
    ) -> Result<Option<Self>, MiraError> {
        let mut header_buf = [0u8; PACKET_HEADER_SIZE];
        match reader.read_exact(&mut header_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(MiraError::Connection(e)),
        }
        let header = PacketHeader::decode(&header_buf)?;

        let mut payload = vec![0u8; header.len as usize];
        reader
            .read_exact(&mut payload)
            .await
            .map_err(MiraError::Connection)?;

        Ok(Some(Self {
            pts: header.pts,
            keyframe: header.keyframe,
            data: Bytes::from(payload),
        }))
    }
}

// ── Tests ────────────────────────────────────────────────────────
