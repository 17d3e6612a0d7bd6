//! Control-socket producer: queue, serialize, write.
//!
//! Input sources (the presentation loop, or anything else) enqueue
//! [`ControlMessage`]s through a non-blocking [`ControlSender`]; a writer
//! task drains the queue in strict FIFO order and writes each message
//! completely before the next. A write error is fatal to the session — a
//! half-connected control channel loses input silently, which is worse
//! than stopping.
//!
//! Overflow policy: when the queue is full the *new* message is dropped
//! and counted. Already-enqueued messages are never evicted to make room,
//! so a queued button-up can never be cancelled by a burst of pointer
//! motion.
//!
//! An optional reader task parses device-originated messages (clipboard)
//! from the same socket; malformed inbound frames are logged and skipped
//! without terminating the channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::MiraError;
use crate::lifecycle::{Lifecycle, LifecycleState};
use crate::protocol::control::{ControlCodec, ControlMessage};
use crate::protocol::device_msg::{DeviceMessage, DeviceMessageCodec};
use crate::session::SessionEvent;

/// Queue capacity, fixed at construction. Enough for a burst of pointer
/// motion between writer wakeups without unbounded memory.
pub const CONTROL_QUEUE_CAPACITY: usize = 64;

/// Inbound device-message buffer.
const DEVICE_MSG_CAPACITY: usize = 16;

type ControlWrite = Box<dyn AsyncWrite + Unpin + Send>;
type ControlRead = Box<dyn AsyncRead + Unpin + Send>;

// ── ControlSender ────────────────────────────────────────────────

/// Cloneable, non-blocking producer handle for the controller queue.
#[derive(Debug, Clone)]
pub struct ControlSender {
    tx: mpsc::Sender<ControlMessage>,
    dropped: Arc<AtomicU64>,
}

impl ControlSender {
    /// Enqueue a message. Never blocks; returns `false` if the message
    /// was dropped (queue full or controller gone).
    pub fn offer(&self, msg: ControlMessage) -> bool {
        match self.tx.try_send(msg) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                let total = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                warn!(total, "control queue full, dropping message");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Total messages dropped due to overflow.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

// ── Controller ───────────────────────────────────────────────────

/// The control-channel component: writer task plus optional reader task.
pub struct Controller {
    writer: Option<WriterLoop>,
    reader: Option<ReaderLoop>,
    sender: ControlSender,
    device_rx: Option<mpsc::Receiver<DeviceMessage>>,
    lifecycle: Arc<Lifecycle>,
    cancel: CancellationToken,
    write_handle: Option<JoinHandle<()>>,
    read_handle: Option<JoinHandle<()>>,
}

impl Controller {
    /// Build an idle controller over the control socket's halves. Passing
    /// `None` for `control_read` disables the inbound reader path.
    pub fn new(
        control_write: ControlWrite,
        control_read: Option<ControlRead>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        Self::with_capacity(control_write, control_read, events, CONTROL_QUEUE_CAPACITY)
    }

    /// As [`new`](Self::new) with an explicit queue capacity.
    pub fn with_capacity(
        control_write: ControlWrite,
        control_read: Option<ControlRead>,
        events: mpsc::Sender<SessionEvent>,
        capacity: usize,
    ) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(capacity);
        let (device_tx, device_rx) = mpsc::channel(DEVICE_MSG_CAPACITY);

        let sender = ControlSender {
            tx: queue_tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };

        Self {
            writer: Some(WriterLoop {
                socket: control_write,
                queue_rx,
                events,
            }),
            reader: control_read.map(|socket| ReaderLoop { socket, device_tx }),
            sender,
            device_rx: Some(device_rx),
            lifecycle: Arc::new(Lifecycle::new()),
            cancel: CancellationToken::new(),
            write_handle: None,
            read_handle: None,
        }
    }

    /// Producer handle for enqueueing control messages.
    pub fn sender(&self) -> ControlSender {
        self.sender.clone()
    }

    /// Take the inbound device-message receiver (at most once).
    pub fn device_messages(&mut self) -> Option<mpsc::Receiver<DeviceMessage>> {
        self.device_rx.take()
    }

    /// Spawn the writer (and reader, if configured). `Idle → Running`.
    pub fn start(&mut self) -> Result<(), MiraError> {
        self.lifecycle.set_running()?;
        let writer = self
            .writer
            .take()
            .ok_or(MiraError::Lifecycle("controller already consumed"))?;
        let cancel = self.cancel.clone();
        let lifecycle = Arc::clone(&self.lifecycle);
        self.write_handle = Some(tokio::spawn(writer.run(cancel, lifecycle)));

        if let Some(reader) = self.reader.take() {
            self.read_handle = Some(tokio::spawn(reader.run(self.cancel.clone())));
        }
        Ok(())
    }

    /// Request cooperative termination of both tasks. `Running → Stopping`.
    pub fn stop(&self) {
        if self.lifecycle.request_stop() {
            self.cancel.cancel();
        }
    }

    /// Wait until the writer (and reader) tasks have exited.
    pub async fn join(&mut self) -> Result<(), MiraError> {
        if let Some(handle) = self.write_handle.take() {
            handle
                .await
                .map_err(|_| MiraError::Lifecycle("controller writer panicked"))?;
        }
        if let Some(handle) = self.read_handle.take() {
            handle
                .await
                .map_err(|_| MiraError::Lifecycle("controller reader panicked"))?;
        }
        Ok(())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LifecycleState {
        self.lifecycle.state()
    }
}

// ── WriterLoop ───────────────────────────────────────────────────

struct WriterLoop {
    socket: ControlWrite,
    queue_rx: mpsc::Receiver<ControlMessage>,
    events: mpsc::Sender<SessionEvent>,
}

impl WriterLoop {
    async fn run(self, cancel: CancellationToken, lifecycle: Arc<Lifecycle>) {
        let WriterLoop {
            socket,
            mut queue_rx,
            events,
        } = self;
        let mut sink = FramedWrite::new(socket, ControlCodec);

        let result = loop {
            let msg = tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("controller stop requested");
                    break Ok(());
                }
                m = queue_rx.recv() => match m {
                    Some(m) => m,
                    // Every producer handle is gone.
                    None => break Ok(()),
                },
            };

            // `send` flushes: the complete payload is on the wire (or the
            // socket has errored) before the next message is dequeued.
            if let Err(e) = sink.send(msg).await {
                break Err(match e {
                    MiraError::Connection(io) => MiraError::ControllerIo { source: io },
                    other => other,
                });
            }
        };

        lifecycle.set_stopped();
        let error = result.err();
        let _ = events.send(SessionEvent::ControllerStopped { error }).await;
    }
}

// ── ReaderLoop ───────────────────────────────────────────────────

struct ReaderLoop {
    socket: ControlRead,
    device_tx: mpsc::Sender<DeviceMessage>,
}

impl ReaderLoop {
    async fn run(self, cancel: CancellationToken) {
        let mut stream = FramedRead::new(self.socket, DeviceMessageCodec);

        loop {
            let item = tokio::select! {
                _ = cancel.cancelled() => break,
                i = stream.next() => i,
            };
            match item {
                Some(Ok(msg)) => {
                    debug!(?msg, "device message");
                    if self.device_tx.try_send(msg).is_err() {
                        warn!("device message buffer full, discarding");
                    }
                }
                // An I/O failure on the shared socket; the writer is
                // about to notice, so no event from here.
                Some(Err(e)) => {
                    warn!(error = %e, "device message stream error");
                    break;
                }
                None => break,
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
