//! # mira-core
//!
//! Core library for mirroring a remote device's screen and forwarding
//! local input back to it, over two socket channels to a device-side
//! companion process.
//!
//! This crate contains:
//! - **Protocol**: handshake header, video packet framing, control and
//!   device message wire codecs
//! - **FrameSlot**: single-slot hand-off between decode and presentation
//! - **Decoder / Controller**: the two pipeline tasks, with explicit
//!   `start`/`stop`/`join` lifecycles
//! - **Recorder**: container muxing of the unmodified encoded stream
//! - **DeviceLink / Session**: connection establishment and orchestrated
//!   startup/shutdown ordering
//! - **Input**: raw-event → control-message translation
//! - **Error**: `MiraError` — typed, `thiserror`-based error hierarchy
//!
//! Window creation, rendering, and UI are the embedder's job: consume
//! frames from the [`FrameSlot`](frameslot::FrameSlot) and feed events
//! through an [`InputMapper`](input::InputMapper).

pub mod codec;
pub mod config;
pub mod controller;
pub mod decoder;
pub mod device;
pub mod error;
pub mod frame;
pub mod frameslot;
pub mod input;
pub mod lifecycle;
pub mod protocol;
pub mod recorder;
pub mod session;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{DecodeError, NullDecoder, VideoDecoder};
pub use config::{CropRegion, RecordFormat, SessionConfig};
pub use controller::{CONTROL_QUEUE_CAPACITY, ControlSender, Controller};
pub use decoder::{Decoder, FrameStats, StreamFormat};
pub use device::DeviceLink;
pub use error::MiraError;
pub use frame::{Plane, VideoFrame};
pub use frameslot::FrameSlot;
pub use input::{DeviceAction, InputEvent, InputMapper, MouseButton};
pub use lifecycle::{Lifecycle, LifecycleState};
pub use protocol::control::{ControlMessage, KeyModifiers, PointerButtons};
pub use protocol::device_msg::DeviceMessage;
pub use protocol::handshake::DeviceInfo;
pub use recorder::Recorder;
pub use session::{Session, SessionEvent};

#[cfg(feature = "openh264")]
pub use codec::openh264::OpenH264Decoder;
