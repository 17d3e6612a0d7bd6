//! Socket establishment and the device handshake.
//!
//! The companion process listens behind a locally forwarded port. The
//! video socket is connected first, then the control socket — the order
//! the device accepts them in is how it tells the two apart. The
//! handshake header then arrives on the video socket before any stream
//! byte.

use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::debug;

use crate::config::SessionConfig;
use crate::error::MiraError;
use crate::protocol::handshake::DeviceInfo;

// ── DeviceLink ───────────────────────────────────────────────────

/// The two open socket connections to one remote endpoint.
///
/// Owned exclusively by the session; outlives the decoder and controller
/// and is closed last.
#[derive(Debug)]
pub struct DeviceLink {
    video: TcpStream,
    control: TcpStream,
}

impl DeviceLink {
    /// Open the video socket, then the control socket.
    ///
    /// Any failure here aborts startup — no thread has been spawned yet.
    pub async fn connect(config: &SessionConfig) -> Result<Self, MiraError> {
        let addr = ("127.0.0.1", config.port);

        let video = TcpStream::connect(addr).await?;
        debug!(port = config.port, "video socket connected");
        let control = TcpStream::connect(addr).await?;
        debug!(port = config.port, "control socket connected");

        Ok(Self { video, control })
    }

    /// Read the handshake header from the video socket.
    ///
    /// Must be called exactly once, before the stream is handed to the
    /// decoder. A short read or socket error is fatal.
    pub async fn read_handshake(&mut self) -> Result<DeviceInfo, MiraError> {
        DeviceInfo::read_from(&mut self.video).await
    }

    /// Split both sockets into the halves the pipeline components own:
    /// `(video_read, video_write, control_read, control_write)`.
    pub fn into_split(
        self,
    ) -> (
        OwnedReadHalf,
        OwnedWriteHalf,
        OwnedReadHalf,
        OwnedWriteHalf,
    ) {
        let (video_read, video_write) = self.video.into_split();
        let (control_read, control_write) = self.control.into_split();
        (video_read, video_write, control_read, control_write)
    }
}

// ── Tests ────────────────────────────────────────────────────────
