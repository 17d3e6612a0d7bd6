//! Video-socket consumer: read, decode, publish.
//!
//! The decoder task blocks on the video socket, feeds received bytes to
//! the opaque decode context, publishes every reconstructed picture to the
//! [`FrameSlot`], and — when a recorder is attached — forwards the
//! original encoded bytes independent of decode success.
//!
//! Lifecycle: `Idle → Running → Stopping → Stopped`. `stop()` cancels the
//! blocked socket read (no read timeouts exist, so shutdown must unblock
//! the read before `join()`); `join()` waits for the task to exit.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::codec::{DecodeError, VideoDecoder};
use crate::error::MiraError;
use crate::frameslot::FrameSlot;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::protocol::stream::VideoPacket;
use crate::recorder::Recorder;
use crate::session::SessionEvent;

/// Read chunk size for the unframed stream.
const RAW_READ_CHUNK: usize = 0x10000;

// ── StreamFormat ─────────────────────────────────────────────────

/// How the video socket delivers the elementary stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamFormat {
    /// Bare elementary stream; the codec's start codes delimit pictures.
    Raw,
    /// Per-packet metadata headers (present when recording).
    Framed,
}

// ── FrameStats ───────────────────────────────────────────────────

/// Per-stream statistics exposed to the embedder.
#[derive(Debug, Clone, Default)]
pub struct FrameStats {
    /// Current smoothed frames per second.
    pub fps: f64,
    /// Total pictures decoded since start.
    pub total_frames: u64,
    /// Total bytes received from the video socket.
    pub total_bytes: u64,
    /// Last picture width.
    pub width: u32,
    /// Last picture height.
    pub height: u32,
}

struct StatsTracker {
    tx: watch::Sender<FrameStats>,
    samples: Vec<Duration>,
    last_frame_time: Instant,
    total_frames: u64,
    total_bytes: u64,
}

impl StatsTracker {
    fn new(tx: watch::Sender<FrameStats>) -> Self {
        Self {
            tx,
            samples: Vec::with_capacity(120),
            last_frame_time: Instant::now(),
            total_frames: 0,
            total_bytes: 0,
        }
    }

    fn record_bytes(&mut self, n: usize) {
        self.total_bytes += n as u64;
    }

    fn record_frame(&mut self, width: u32, height: u32) {
        self.total_frames += 1;

        let now = Instant::now();
        self.samples.push(now.duration_since(self.last_frame_time));
        self.last_frame_time = now;
        if self.samples.len() > 60 {
            self.samples.remove(0);
        }
        let avg_secs: f64 =
            self.samples.iter().map(|d| d.as_secs_f64()).sum::<f64>() / self.samples.len() as f64;
        let fps = if avg_secs > 0.0 { 1.0 / avg_secs } else { 0.0 };

        let _ = self.tx.send(FrameStats {
            fps,
            total_frames: self.total_frames,
            total_bytes: self.total_bytes,
            width,
            height,
        });
    }
}

// ── Decoder ──────────────────────────────────────────────────────

type VideoSource = Box<dyn AsyncRead + Unpin + Send>;

/// The decode-loop component.
pub struct Decoder {
    inner: Option<DecodeLoop>,
    lifecycle: Arc<Lifecycle>,
    cancel: CancellationToken,
    handle: Option<JoinHandle<()>>,
    stats_rx: watch::Receiver<FrameStats>,
}

impl Decoder {
    /// Build an idle decoder. Nothing runs until [`start`](Self::start).
    pub fn new(
        video: VideoSource,
        codec: Box<dyn VideoDecoder>,
        format: StreamFormat,
        slot: Arc<FrameSlot>,
        recorder: Option<Recorder>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        let (stats_tx, stats_rx) = watch::channel(FrameStats::default());
        Self {
            inner: Some(DecodeLoop {
                video,
                codec,
                format,
                slot,
                recorder,
                events,
                stats: StatsTracker::new(stats_tx),
            }),
            lifecycle: Arc::new(Lifecycle::new()),
            cancel: CancellationToken::new(),
            handle: None,
            stats_rx,
        }
    }

    /// Spawn the packet-read/decode loop. `Idle → Running`.
    pub fn start(&mut self) -> Result<(), MiraError> {
        self.lifecycle.set_running()?;
        let inner = self
            .inner
            .take()
            .ok_or(MiraError::Lifecycle("decoder already consumed"))?;
        let cancel = self.cancel.clone();
        let lifecycle = Arc::clone(&self.lifecycle);
        self.handle = Some(tokio::spawn(inner.run(cancel, lifecycle)));
        Ok(())
    }

    /// Request cooperative termination, unblocking a pending socket read.
    /// `Running → Stopping`. Must be called before [`join`](Self::join).
    pub fn stop(&self) {
        if self.lifecycle.request_stop() {
            self.cancel.cancel();
        }
    }

    /// Wait until the loop task has exited and the state is `Stopped`.
    pub async fn join(&mut self) -> Result<(), MiraError> {
        if let Some(handle) = self.handle.take() {
            handle
                .await
                .map_err(|_| MiraError::Lifecycle("decoder task panicked"))?;
        }
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    /// Obtain a `watch::Receiver` for stream statistics.
    pub fn stats_receiver(&self) -> watch::Receiver<FrameStats> {
        self.stats_rx.clone()
    }
}

// ── DecodeLoop ───────────────────────────────────────────────────

struct DecodeLoop {
    video: VideoSource,
    codec: Box<dyn VideoDecoder>,
    format: StreamFormat,
    slot: Arc<FrameSlot>,
    recorder: Option<Recorder>,
    events: mpsc::Sender<SessionEvent>,
    stats: StatsTracker,
}

impl DecodeLoop {
    async fn run(mut self, cancel: CancellationToken, lifecycle: Arc<Lifecycle>) {
        let result = match self.format {
            StreamFormat::Framed => self.framed_loop(&cancel).await,
            StreamFormat::Raw => self.raw_loop(&cancel).await,
        };

        // The container must never be left truncated, whatever ended the
        // loop.
        if let Some(recorder) = self.recorder.as_mut() {
            if let Err(e) = recorder.finalize() {
                warn!(error = %e, "finalizing recording failed");
            }
        }

        // Unblock a presentation loop waiting on the slot.
        self.slot.close();
        lifecycle.set_stopped();

        let error = match result {
            Ok(()) => None,
            Err(e) => Some(e),
        };
        let _ = self
            .events
            .send(SessionEvent::DecoderStopped { error })
            .await;
    }

    async fn framed_loop(&mut self, cancel: &CancellationToken) -> Result<(), MiraError> {
        loop {
            let packet = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("decoder stop requested");
                    return Ok(());
                }
                r = VideoPacket::read_from(&mut self.video) => match r? {
                    Some(p) => p,
                    None => {
                        info!("video stream ended");
                        return Ok(());
                    }
                },
            };

            self.stats.record_bytes(packet.data.len());
            self.forward_to_recorder(&packet).await;
            self.decode_and_publish(&packet.data)?;
        }
    }

    async fn raw_loop(&mut self, cancel: &CancellationToken) -> Result<(), MiraError> {
        let mut buf = vec![0u8; RAW_READ_CHUNK];
        loop {
            let n = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("decoder stop requested");
                    return Ok(());
                }
                r = self.video.read(&mut buf) => r.map_err(MiraError::Connection)?,
            };
            if n == 0 {
                info!("video stream ended");
                return Ok(());
            }

            self.stats.record_bytes(n);
            self.decode_and_publish(&buf[..n])?;
        }
    }

    /// Forward the originally-received bytes, independent of decode
    /// success. A recorder write failure stops recording, not mirroring.
    async fn forward_to_recorder(&mut self, packet: &VideoPacket) {
        let Some(recorder) = self.recorder.as_mut() else {
            return;
        };
        if let Err(e) = recorder.push(packet) {
            warn!(error = %e, "recording failed, detaching recorder");
            let _ = recorder.finalize();
            self.recorder = None;
            let _ = self
                .events
                .send(SessionEvent::RecorderStopped { error: e })
                .await;
        }
    }

    fn decode_and_publish(&mut self, data: &[u8]) -> Result<(), MiraError> {
        match self.codec.decode(data) {
            Ok(frames) => {
                for frame in frames {
                    self.stats.record_frame(frame.width, frame.height);
                    self.slot.publish(frame);
                }
                Ok(())
            }
            // Transient corruption: log, skip, keep reading. Only a dead
            // decode context ends the stream.
            Err(DecodeError::Corrupt(msg)) => {
                warn!(error = %msg, "skipping corrupt picture");
                Ok(())
            }
            Err(DecodeError::Fatal(msg)) => Err(MiraError::Decode(msg)),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::time::Duration;

    use super::*;
    use crate::frame::{Plane, VideoFrame};
    use crate::protocol::stream::PacketHeader;

    /// Produces one 2×2 picture per decode call.
    struct OnePicturePerChunk;

    impl VideoDecoder for OnePicturePerChunk {
        fn decode(&mut self, data: &[u8]) -> Result<Vec<VideoFrame>, DecodeError> {
            let tag = data.first().copied().unwrap_or(0);
            Ok(vec![VideoFrame::new(
                2,
                2,
                vec![Plane::new(vec![tag; 4], 2)],
            )])
        }
    }

    /// Fails in a configurable way.
    struct FailingDecoder {
        errors: Mutex<Vec<DecodeError>>,
    }

    impl VideoDecoder for FailingDecoder {
        fn decode(&mut self, _data: &[u8]) -> Result<Vec<VideoFrame>, DecodeError> {
            Err(self.errors.lock().unwrap().remove(0))
        }
    }

    fn framed_packet(pts: u64, data: &[u8]) -> Vec<u8> {
        let mut wire = PacketHeader {
            pts,
            keyframe: false,
            len: data.len() as u32,
        }
        .encode()
        .to_vec();
        wire.extend_from_slice(data);
        wire
    }

    fn make_decoder(
        codec: Box<dyn VideoDecoder>,
        format: StreamFormat,
    ) -> (
        Decoder,
        tokio::io::DuplexStream,
        Arc<FrameSlot>,
        mpsc::Receiver<SessionEvent>,
    ) {
        let (device_side, client_side) = tokio::io::duplex(1 << 16);
        let slot = Arc::new(FrameSlot::new());
        let (events_tx, events_rx) = mpsc::channel(4);
        let decoder = Decoder::new(
            Box::new(client_side),
            codec,
            format,
            Arc::clone(&slot),
            None,
            events_tx,
        );
        (decoder, device_side, slot, events_rx)
    }

    #[tokio::test]
    async fn framed_packets_become_frames() {
        let (mut decoder, mut device, slot, mut events) =
            make_decoder(Box::new(OnePicturePerChunk), StreamFormat::Framed);
        decoder.start().unwrap();

        use tokio::io::AsyncWriteExt;
        device.write_all(&framed_packet(0, &[7, 7, 7])).await.unwrap();

        let frame = tokio::time::timeout(Duration::from_secs(1), slot.take_wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.planes[0].data[0], 7);

        // Closing the device socket ends the stream cleanly.
        drop(device);
        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(
            event,
            SessionEvent::DecoderStopped { error: None }
        ));

        decoder.stop();
        decoder.join().await.unwrap();
        assert_eq!(decoder.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn stop_unblocks_a_pending_read() {
        let (mut decoder, _device, _slot, _events) =
            make_decoder(Box::new(OnePicturePerChunk), StreamFormat::Raw);
        decoder.start().unwrap();
        assert_eq!(decoder.state(), LifecycleState::Running);

        // No data will ever arrive; the read is parked. stop() must
        // unblock it and join() must return promptly.
        decoder.stop();
        tokio::time::timeout(Duration::from_secs(2), decoder.join())
            .await
            .expect("join hung after stop")
            .unwrap();
        assert_eq!(decoder.state(), LifecycleState::Stopped);
    }

    #[tokio::test]
    async fn corrupt_picture_is_skipped_fatal_is_not() {
        let codec = FailingDecoder {
            errors: Mutex::new(vec![
                DecodeError::Corrupt("bit glitch".into()),
                DecodeError::Fatal("context dead".into()),
            ]),
        };
        let (mut decoder, mut device, _slot, mut events) =
            make_decoder(Box::new(codec), StreamFormat::Framed);
        decoder.start().unwrap();

        use tokio::io::AsyncWriteExt;
        // First packet: corrupt → skipped, loop continues.
        device.write_all(&framed_packet(0, &[1])).await.unwrap();
        // Second packet: fatal → loop exits with an error event.
        device.write_all(&framed_packet(1, &[2])).await.unwrap();

        let event = tokio::time::timeout(Duration::from_secs(1), events.recv())
            .await
            .unwrap()
            .unwrap();
        match event {
            SessionEvent::DecoderStopped { error: Some(e) } => {
                assert!(matches!(e, MiraError::Decode(_)));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        decoder.stop();
        decoder.join().await.unwrap();
    }

    #[tokio::test]
    async fn start_twice_is_rejected() {
        let (mut decoder, _device, _slot, _events) =
            make_decoder(Box::new(OnePicturePerChunk), StreamFormat::Raw);
        decoder.start().unwrap();
        assert!(decoder.start().is_err());
        decoder.stop();
        decoder.join().await.unwrap();
    }
}
