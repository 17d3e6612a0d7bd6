//! Packet sink muxing the received stream into a container file.
//!
//! The encoded bytes are written exactly as received — never re-encoded.
//! Timestamps are rebased so the recording starts at zero, and written
//! timestamps never decrease: a packet that would go backwards is clamped
//! to the previous timestamp rather than dropped, because its payload may
//! be a reference picture later frames depend on.

use std::fs::File;
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::config::RecordFormat;
use crate::error::MiraError;
use crate::protocol::stream::VideoPacket;

/// IVF fixed header length; the frame count at offset 24 is patched on
/// finalize.
const IVF_HEADER_SIZE: usize = 32;
const IVF_FRAME_COUNT_OFFSET: u64 = 24;

/// IVF timebase: timestamps are in microseconds.
const IVF_TIMEBASE_DEN: u32 = 1_000_000;
const IVF_TIMEBASE_NUM: u32 = 1;

fn io_err(context: &str, e: std::io::Error) -> MiraError {
    MiraError::Recorder(format!("{context}: {e}"))
}

// ── Recorder ─────────────────────────────────────────────────────

/// Owns one open output container.
#[derive(Debug)]
pub struct Recorder {
    writer: BufWriter<File>,
    format: RecordFormat,
    path: PathBuf,
    /// Timestamp of the first packet; all written timestamps are relative
    /// to it.
    base_pts: Option<u64>,
    /// Last written (rebased) timestamp — the non-decreasing floor.
    last_pts: u64,
    frames_written: u32,
    finalized: bool,
}

impl Recorder {
    /// Create the output container for a stream of `frame_size` pictures.
    ///
    /// Fails with [`MiraError::Recorder`] if the target cannot be created.
    pub fn init(
        target: &Path,
        format: RecordFormat,
        frame_size: (u16, u16),
    ) -> Result<Self, MiraError> {
        let file = File::create(target).map_err(|e| io_err("cannot create record target", e))?;
        let mut writer = BufWriter::new(file);

        if format == RecordFormat::Ivf {
            write_ivf_header(&mut writer, frame_size, 0)
                .map_err(|e| io_err("cannot write container header", e))?;
        }

        info!(path = %target.display(), ?format, "recording to file");
        Ok(Self {
            writer,
            format,
            path: target.to_path_buf(),
            base_pts: None,
            last_pts: 0,
            frames_written: 0,
            finalized: false,
        })
    }

    /// Append one encoded packet.
    ///
    /// The first packet establishes the base timestamp, so the first
    /// written timestamp is always zero.
    pub fn push(&mut self, packet: &VideoPacket) -> Result<(), MiraError> {
        let base = *self.base_pts.get_or_insert(packet.pts);
        let mut pts = packet.pts.saturating_sub(base);
        if pts < self.last_pts {
            debug!(
                pts,
                floor = self.last_pts,
                "clamping backwards timestamp"
            );
            pts = self.last_pts;
        }

        match self.format {
            RecordFormat::Ivf => {
                let mut frame_header = [0u8; 12];
                frame_header[0..4].copy_from_slice(&(packet.data.len() as u32).to_le_bytes());
                frame_header[4..12].copy_from_slice(&pts.to_le_bytes());
                self.writer
                    .write_all(&frame_header)
                    .and_then(|_| self.writer.write_all(&packet.data))
                    .map_err(|e| io_err("write failed", e))?;
            }
            RecordFormat::Raw => {
                self.writer
                    .write_all(&packet.data)
                    .map_err(|e| io_err("write failed", e))?;
            }
        }

        self.last_pts = pts;
        self.frames_written += 1;
        Ok(())
    }

    /// Flush and close the container so no trailer is left truncated.
    ///
    /// Safe to call again after a success; later calls are no-ops.
    pub fn finalize(&mut self) -> Result<(), MiraError> {
        if self.finalized {
            return Ok(());
        }

        if self.format == RecordFormat::Ivf {
            self.writer
                .seek(SeekFrom::Start(IVF_FRAME_COUNT_OFFSET))
                .and_then(|_| self.writer.write_all(&self.frames_written.to_le_bytes()))
                .and_then(|_| self.writer.seek(SeekFrom::End(0)).map(|_| ()))
                .map_err(|e| io_err("cannot patch container header", e))?;
        }
        self.writer
            .flush()
            .map_err(|e| io_err("cannot flush container", e))?;

        self.finalized = true;
        info!(
            path = %self.path.display(),
            frames = self.frames_written,
            "recording finalized"
        );
        Ok(())
    }

    /// Number of packets written so far.
    pub fn frames_written(&self) -> u32 {
        self.frames_written
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if !self.finalized {
            warn!(path = %self.path.display(), "recorder dropped without finalize");
            if let Err(e) = self.finalize() {
                warn!(error = %e, "best-effort finalize failed");
            }
        }
    }
}

fn write_ivf_header<W: Write>(
    w: &mut W,
    frame_size: (u16, u16),
    frame_count: u32,
) -> std::io::Result<()> {
    let mut header = [0u8; IVF_HEADER_SIZE];
    header[0..4].copy_from_slice(b"DKIF");
    // version 0
    header[6..8].copy_from_slice(&(IVF_HEADER_SIZE as u16).to_le_bytes());
    header[8..12].copy_from_slice(b"H264");
    header[12..14].copy_from_slice(&frame_size.0.to_le_bytes());
    header[14..16].copy_from_slice(&frame_size.1.to_le_bytes());
    header[16..20].copy_from_slice(&IVF_TIMEBASE_DEN.to_le_bytes());
    header[20..24].copy_from_slice(&IVF_TIMEBASE_NUM.to_le_bytes());
    header[24..28].copy_from_slice(&frame_count.to_le_bytes());
    w.write_all(&header)
}

// ── Tests ────────────────────────────────────────────────────────
