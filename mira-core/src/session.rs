//! Session orchestration: startup order, ownership, shutdown order.
//!
//! The session owns every pipeline component and is the only place that
//! sequences them. Startup: connect, handshake, recorder, decoder,
//! controller — in that order. Shutdown runs exactly once: stop the
//! decoder (unblocks its socket read), stop the controller, join the
//! decoder, join the controller, finalize the recorder (inside the
//! decoder task's exit path, complete before its join returns), then
//! drop the link remnants. Joining before unblocking a read would hang;
//! closing sockets before joining would use a dead resource.

use std::sync::Arc;

use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use crate::codec::VideoDecoder;
use crate::config::SessionConfig;
use crate::controller::{ControlSender, Controller};
use crate::decoder::{Decoder, FrameStats, StreamFormat};
use crate::device::DeviceLink;
use crate::error::MiraError;
use crate::frameslot::FrameSlot;
use crate::protocol::device_msg::DeviceMessage;
use crate::recorder::Recorder;

/// Fatal-event channel depth; a handful of exits at most.
const EVENT_CAPACITY: usize = 8;

// ── SessionEvent ─────────────────────────────────────────────────

/// A thread-local terminal condition surfaced to the session's owner.
///
/// Never logged-and-ignored in place: the owner reacts by calling
/// [`Session::shutdown`].
#[derive(Debug)]
pub enum SessionEvent {
    /// The decode loop exited: end of stream (`error: None`) or a fatal
    /// decode/socket failure.
    DecoderStopped { error: Option<MiraError> },
    /// The control writer exited; any error here is fatal (silent input
    /// loss is unacceptable).
    ControllerStopped { error: Option<MiraError> },
    /// Recording failed and was detached; mirroring continues.
    RecorderStopped { error: MiraError },
}

impl SessionEvent {
    /// Whether the session must shut down in response.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, SessionEvent::RecorderStopped { .. })
    }
}

// ── Session ──────────────────────────────────────────────────────

/// One mirroring session: device link, decoder, controller, optional
/// recorder, and the frame slot connecting decode to presentation.
pub struct Session {
    device_name: String,
    frame_size: (u16, u16),
    slot: Arc<FrameSlot>,
    decoder: Decoder,
    controller: Controller,
    events_rx: mpsc::Receiver<SessionEvent>,
    /// Unused write direction of the video socket, kept so the link
    /// outlives the components and closes last.
    video_write: Option<OwnedWriteHalf>,
    shutdown_done: bool,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("device_name", &self.device_name)
            .field("frame_size", &self.frame_size)
            .field("shutdown_done", &self.shutdown_done)
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Connect, handshake, and start the pipeline.
    ///
    /// Fails before any task is spawned if the link or handshake fails;
    /// components started later are stopped again if a later step fails.
    pub async fn start(
        config: &SessionConfig,
        codec: Box<dyn VideoDecoder>,
    ) -> Result<Self, MiraError> {
        let mut link = DeviceLink::connect(config).await?;
        let info = link.read_handshake().await?;
        info!(
            name = %info.name,
            width = info.width,
            height = info.height,
            "device connected"
        );

        let recorder = match &config.record_target {
            Some(target) => Some(Recorder::init(
                target,
                config.record_format,
                (info.width, info.height),
            )?),
            None => None,
        };
        let format = if config.framed_stream() {
            StreamFormat::Framed
        } else {
            StreamFormat::Raw
        };

        let (events_tx, events_rx) = mpsc::channel(EVENT_CAPACITY);
        let slot = Arc::new(FrameSlot::new());
        let (video_read, video_write, control_read, control_write) = link.into_split();

        let mut decoder = Decoder::new(
            Box::new(video_read),
            codec,
            format,
            Arc::clone(&slot),
            recorder,
            events_tx.clone(),
        );
        let mut controller =
            Controller::new(Box::new(control_write), Some(Box::new(control_read)), events_tx);

        decoder.start()?;
        if let Err(e) = controller.start() {
            // Unwind the half-started pipeline in shutdown order.
            decoder.stop();
            let _ = decoder.join().await;
            return Err(e);
        }

        Ok(Self {
            device_name: info.name,
            frame_size: (info.width, info.height),
            slot,
            decoder,
            controller,
            events_rx,
            video_write: Some(video_write),
            shutdown_done: false,
        })
    }

    /// Device name from the handshake.
    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    /// Initial frame dimensions from the handshake.
    pub fn frame_size(&self) -> (u16, u16) {
        self.frame_size
    }

    /// The slot the presentation loop consumes frames from.
    pub fn frame_slot(&self) -> Arc<FrameSlot> {
        Arc::clone(&self.slot)
    }

    /// Producer handle for control messages.
    pub fn control(&self) -> ControlSender {
        self.controller.sender()
    }

    /// Stream statistics from the decoder.
    pub fn stats_receiver(&self) -> watch::Receiver<FrameStats> {
        self.decoder.stats_receiver()
    }

    /// Take the inbound device-message receiver (at most once).
    pub fn device_messages(&mut self) -> Option<mpsc::Receiver<DeviceMessage>> {
        self.controller.device_messages()
    }

    /// Wait for the next component event.
    ///
    /// Returns `None` if every event sender is gone (all components
    /// exited and were drained).
    pub async fn wait(&mut self) -> Option<SessionEvent> {
        self.events_rx.recv().await
    }

    /// Run the shutdown sequence. Idempotent: later calls are no-ops.
    pub async fn shutdown(&mut self) -> Result<(), MiraError> {
        if self.shutdown_done {
            return Ok(());
        }
        self.shutdown_done = true;
        info!("shutting down session");

        // Unblock reads before joining anything.
        self.decoder.stop();
        self.controller.stop();

        let decoder_result = self.decoder.join().await;
        let controller_result = self.controller.join().await;

        // The recorder was finalized inside the decoder task before its
        // join returned; all that remains is the link itself.
        self.slot.close();
        drop(self.video_write.take());

        if let Err(e) = &decoder_result {
            warn!(error = %e, "decoder join failed");
        }
        decoder_result?;
        controller_result
    }
}

// ── Tests ────────────────────────────────────────────────────────
//
// Session behavior is exercised end-to-end against a fake device in
// `tests/integration.rs`; only the event classification lives here.
