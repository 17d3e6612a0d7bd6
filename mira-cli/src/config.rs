//! CLI client configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use mira_core::{CropRegion, RecordFormat, SessionConfig};

/// Top-level configuration for the CLI client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    /// Connection settings.
    pub network: NetworkConfig,
    /// Stream parameters requested from the device.
    pub stream: StreamConfig,
    /// Recording output.
    pub recording: RecordingConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Device serial the local forward was established for.
    pub serial: Option<String>,
    /// Locally forwarded TCP port.
    pub port: u16,
}

/// Stream parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Cap on the longest output dimension (0 = unlimited).
    pub max_size: u16,
    /// Requested encode bitrate in bits per second.
    pub bit_rate: u32,
    /// Optional capture rectangle.
    pub crop: Option<CropRegion>,
}

/// Recording output.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Output file; recording is off when unset.
    pub target: Option<PathBuf>,
    /// Container kind.
    pub format: RecordFormat,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level filter.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            stream: StreamConfig::default(),
            recording: RecordingConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            serial: None,
            port: 27183,
        }
    }
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_size: 0,
            bit_rate: 8_000_000,
            crop: None,
        }
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            target: None,
            format: RecordFormat::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl CliConfig {
    /// Load from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                eprintln!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Flatten into the core session options.
    pub fn to_session_config(&self) -> SessionConfig {
        SessionConfig {
            serial: self.network.serial.clone(),
            port: self.network.port,
            max_size: self.stream.max_size,
            bit_rate: self.stream.bit_rate,
            crop: self.stream.crop,
            record_target: self.recording.target.clone(),
            record_format: self.recording.format,
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
