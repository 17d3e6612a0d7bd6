//! Session construction options.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

// ── RecordFormat ─────────────────────────────────────────────────

/// Output container kind for [`crate::recorder::Recorder`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RecordFormat {
    /// IVF container — per-frame sizes and timestamps, trivially seekable.
    #[default]
    Ivf,
    /// Bare elementary stream, exactly as received. No timestamps.
    Raw,
}

impl RecordFormat {
    /// Conventional file extension for this format.
    pub fn extension(self) -> &'static str {
        match self {
            RecordFormat::Ivf => "ivf",
            RecordFormat::Raw => "h264",
        }
    }
}

impl std::str::FromStr for RecordFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ivf" => Ok(RecordFormat::Ivf),
            "raw" | "h264" => Ok(RecordFormat::Raw),
            other => Err(format!("unknown record format: {other}")),
        }
    }
}

// ── CropRegion ───────────────────────────────────────────────────

/// A rectangular region of the device screen to capture.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CropRegion {
    pub x: u16,
    pub y: u16,
    pub width: u16,
    pub height: u16,
}

impl CropRegion {
    pub fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl std::str::FromStr for CropRegion {
    type Err = String;

    /// Parse the `WIDTH:HEIGHT:X:Y` form used on the command line.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split(':').collect();
        if parts.len() != 4 {
            return Err(format!("invalid crop (expected W:H:X:Y): {s}"));
        }
        let parse = |p: &str| p.parse::<u16>().map_err(|e| format!("invalid crop: {e}"));
        Ok(Self {
            width: parse(parts[0])?,
            height: parse(parts[1])?,
            x: parse(parts[2])?,
            y: parse(parts[3])?,
        })
    }
}

// ── SessionConfig ────────────────────────────────────────────────

/// Options consumed once at [`crate::session::Session`] construction.
///
/// `serial`, `max_size`, `bit_rate` and `crop` describe what was asked of
/// the device-side companion process when the forward was established; the
/// session itself only dials `port` and records them for diagnostics.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Device identifier the local forward was established for.
    pub serial: Option<String>,
    /// Locally forwarded TCP port both channels connect to.
    pub port: u16,
    /// Cap on the longest output dimension (0 = unlimited).
    pub max_size: u16,
    /// Requested encode bitrate in bits per second.
    pub bit_rate: u32,
    /// Optional capture rectangle.
    pub crop: Option<CropRegion>,
    /// Record the received stream to this path.
    pub record_target: Option<PathBuf>,
    /// Container kind for `record_target`.
    pub record_format: RecordFormat,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            serial: None,
            port: 27183,
            max_size: 0,
            bit_rate: 8_000_000,
            crop: None,
            record_target: None,
            record_format: RecordFormat::default(),
        }
    }
}

impl SessionConfig {
    /// Whether the device stream carries per-packet frame metadata.
    ///
    /// The companion process only interleaves packet headers when asked to,
    /// and it is asked to exactly when the stream is being recorded.
    pub fn framed_stream(&self) -> bool {
        self.record_target.is_some()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crop_parses() {
        let crop: CropRegion = "1224:1440:0:0".parse().unwrap();
        assert_eq!(crop.width, 1224);
        assert_eq!(crop.height, 1440);
        assert_eq!(crop.x, 0);
        assert_eq!(crop.y, 0);
    }

    #[test]
    fn crop_rejects_bad_input() {
        assert!("1224:1440".parse::<CropRegion>().is_err());
        assert!("a:b:c:d".parse::<CropRegion>().is_err());
    }

    #[test]
    fn record_format_parses() {
        assert_eq!("ivf".parse::<RecordFormat>().unwrap(), RecordFormat::Ivf);
        assert_eq!("h264".parse::<RecordFormat>().unwrap(), RecordFormat::Raw);
        assert!("mkv".parse::<RecordFormat>().is_err());
    }

    #[test]
    fn framed_stream_follows_record_target() {
        let mut cfg = SessionConfig::default();
        assert!(!cfg.framed_stream());
        cfg.record_target = Some(PathBuf::from("out.ivf"));
        assert!(cfg.framed_stream());
    }
}
