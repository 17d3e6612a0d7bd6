//! Domain-specific error types for the mirroring pipeline.
//!
//! All fallible operations return `Result<T, MiraError>`.
//! No panics on invalid input — every error is typed and recoverable.

use thiserror::Error;

/// The canonical error type for the mirroring pipeline.
#[derive(Debug, Error)]
pub enum MiraError {
    // ── Startup Errors ───────────────────────────────────────────
    /// The TCP/IO layer reported an error while opening or using a socket.
    #[error("connection error: {0}")]
    Connection(#[from] std::io::Error),

    /// The device handshake header was short, truncated, or malformed.
    #[error("handshake failed: {0}")]
    Handshake(&'static str),

    // ── Stream Errors ────────────────────────────────────────────
    /// The decode context failed irrecoverably or the stream ended.
    #[error("decode error: {0}")]
    Decode(String),

    /// A video packet header announced an impossible payload length.
    #[error("invalid packet length: {size} bytes (max {max})")]
    PacketTooLarge { size: usize, max: usize },

    // ── Control Errors ───────────────────────────────────────────
    /// A write on the control socket failed. Fatal: a half-connected
    /// control channel silently loses input.
    #[error("control channel error: {source}")]
    ControllerIo {
        #[source]
        source: std::io::Error,
    },

    /// A control or device message could not be encoded or decoded.
    #[error("invalid message: {0}")]
    InvalidMessage(&'static str),

    // ── Recording Errors ─────────────────────────────────────────
    /// The output container could not be created or written.
    #[error("recorder error: {0}")]
    Recorder(String),

    // ── Internal Errors ──────────────────────────────────────────
    /// An mpsc channel was closed unexpectedly.
    #[error("channel closed")]
    ChannelClosed,

    /// A component was driven through an invalid lifecycle transition.
    #[error("invalid lifecycle transition: {0}")]
    Lifecycle(&'static str),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for MiraError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        MiraError::ChannelClosed
    }
}
