//! The video decode seam.
//!
//! The pipeline treats codec integration as an opaque capability: it
//! accepts encoded bytes and produces zero or more decoded pictures, and it
//! may report transient or fatal errors. Any conformant backend satisfies
//! [`VideoDecoder`]; the built-in ones are [`NullDecoder`] (record-only /
//! headless runs) and, behind the `openh264` feature, a real H.264
//! backend.

pub mod annexb;
#[cfg(feature = "openh264")]
pub mod openh264;

use thiserror::Error;

use crate::frame::VideoFrame;

// ── DecodeError ──────────────────────────────────────────────────

/// Decode failures, split by severity.
///
/// The decoder loop logs and skips `Corrupt` (transient per-picture
/// corruption) but terminates on `Fatal` (dead decode context) — this is
/// what distinguishes a glitched stream from a dead one.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Corrupt picture data; the stream is expected to recover.
    #[error("corrupt picture data: {0}")]
    Corrupt(String),

    /// The decode context is unusable; the stream cannot continue.
    #[error("decoder failure: {0}")]
    Fatal(String),
}

// ── VideoDecoder ─────────────────────────────────────────────────

/// A streaming video decode context.
///
/// `decode` is fed chunks of the elementary stream as they arrive off the
/// socket; chunks need not align to picture boundaries. The implementation
/// owns whatever bitstream parsing it needs to find them.
pub trait VideoDecoder: Send {
    fn decode(&mut self, data: &[u8]) -> Result<Vec<VideoFrame>, DecodeError>;
}

// ── NullDecoder ──────────────────────────────────────────────────

/// Discards the stream without decoding.
///
/// Useful when the session only records or forwards input: the decoder
/// loop still drains the socket (and feeds the recorder), but no pictures
/// are produced.
#[derive(Debug, Default)]
pub struct NullDecoder;

impl VideoDecoder for NullDecoder {
    fn decode(&mut self, _data: &[u8]) -> Result<Vec<VideoFrame>, DecodeError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_decoder_produces_nothing() {
        let mut dec = NullDecoder;
        assert!(dec.decode(&[0, 0, 1, 0x65, 0xFF]).unwrap().is_empty());
    }
}
