//! Headless mirroring client — entry point.
//!
//! ```text
//! mira                                  Connect with defaults
//! mira --port 27184                     Use a different forwarded port
//! mira --record out.ivf                 Mirror and record the stream
//! mira --config <path>                  Use custom config TOML
//! mira --gen-config                     Dump default config and exit
//! ```
//!
//! Without a display, the client drains the frame slot (keeping the
//! pipeline honest about freshness), reports stream statistics, and
//! records when asked. Ctrl-C runs the orderly shutdown sequence.

mod config;

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use mira_core::{CropRegion, RecordFormat, Session, SessionEvent, VideoDecoder};

use crate::config::CliConfig;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "mira", about = "Remote device screen mirroring client")]
struct Cli {
    /// Device serial the local forward was established for.
    #[arg(short, long)]
    serial: Option<String>,

    /// Locally forwarded TCP port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Cap on the longest output dimension.
    #[arg(short, long)]
    max_size: Option<u16>,

    /// Requested encode bitrate in bits per second.
    #[arg(short, long)]
    bit_rate: Option<u32>,

    /// Capture rectangle, as WIDTH:HEIGHT:X:Y.
    #[arg(long)]
    crop: Option<CropRegion>,

    /// Record the received stream to this file.
    #[arg(short, long)]
    record: Option<PathBuf>,

    /// Container kind for --record (ivf, raw).
    #[arg(long)]
    record_format: Option<RecordFormat>,

    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "mira.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,
}

fn build_codec() -> Result<Box<dyn VideoDecoder>, Box<dyn std::error::Error>> {
    #[cfg(feature = "openh264")]
    {
        Ok(Box::new(mira_core::OpenH264Decoder::new()?))
    }
    #[cfg(not(feature = "openh264"))]
    {
        info!("built without a decode backend; running headless");
        Ok(Box::new(mira_core::NullDecoder))
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if cli.gen_config {
        let text = toml::to_string_pretty(&CliConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    let mut file_config = CliConfig::load(&cli.config);

    // CLI flags override the file.
    if let Some(serial) = cli.serial {
        file_config.network.serial = Some(serial);
    }
    if let Some(port) = cli.port {
        file_config.network.port = port;
    }
    if let Some(max_size) = cli.max_size {
        file_config.stream.max_size = max_size;
    }
    if let Some(bit_rate) = cli.bit_rate {
        file_config.stream.bit_rate = bit_rate;
    }
    if let Some(crop) = cli.crop {
        file_config.stream.crop = Some(crop);
    }
    if let Some(record) = cli.record {
        file_config.recording.target = Some(record);
    }
    if let Some(format) = cli.record_format {
        file_config.recording.format = format;
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&file_config.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("mira v{}", env!("CARGO_PKG_VERSION"));

    let session_config = file_config.to_session_config();

    // ── 1. Connect and start the pipeline ───────────────────────

    let codec = build_codec()?;
    let mut session = Session::start(&session_config, codec).await?;
    let (width, height) = session.frame_size();
    info!(
        device = session.device_name(),
        width, height, "mirroring started"
    );

    let slot = session.frame_slot();
    let stats_rx = session.stats_receiver();
    let mut frames_consumed: u64 = 0;

    // ── 2. Run until the stream ends or the user interrupts ─────

    let mut report = tokio::time::interval(Duration::from_secs(5));
    report.tick().await; // immediate first tick
    let mut slot_open = true;

    let exit_error = loop {
        tokio::select! {
            r = tokio::signal::ctrl_c() => {
                r?;
                info!("interrupted, shutting down");
                break None;
            }
            event = session.wait() => {
                match event {
                    Some(SessionEvent::RecorderStopped { error }) => {
                        warn!(%error, "recording stopped, mirroring continues");
                    }
                    Some(event) => break session_error(event),
                    None => break None,
                }
            }
            frame = slot.take_wait(), if slot_open => {
                // Headless: consuming keeps the slot fresh; a renderer
                // would draw here.
                match frame {
                    Some(_) => frames_consumed += 1,
                    // Slot closed — the decoder's stop event follows.
                    None => slot_open = false,
                }
            }
            _ = report.tick() => {
                let stats = stats_rx.borrow().clone();
                if stats.total_frames > 0 {
                    info!(
                        fps = (stats.fps * 10.0).round() / 10.0,
                        frames = stats.total_frames,
                        bytes = stats.total_bytes,
                        "stream"
                    );
                }
            }
        }
    };

    // ── 3. Shutdown ─────────────────────────────────────────────

    session.shutdown().await?;
    info!(
        frames_consumed,
        skipped = slot.skipped(),
        dropped_messages = session.control().dropped(),
        "session closed"
    );

    match exit_error {
        Some(e) => {
            error!(error = %e, "session terminated");
            Err(e.into())
        }
        None => Ok(()),
    }
}

/// Extract the error (if any) from a fatal session event.
fn session_error(event: SessionEvent) -> Option<mira_core::MiraError> {
    match event {
        SessionEvent::DecoderStopped { error } => {
            if error.is_none() {
                info!("video stream ended");
            }
            error
        }
        SessionEvent::ControllerStopped { error } => error,
        SessionEvent::RecorderStopped { error } => Some(error),
    }
}
