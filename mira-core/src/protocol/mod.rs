//! Byte-layout definitions for everything that crosses a socket.
//!
//! Three independent layers share the two channels:
//!
//! - [`handshake`] — the one-time header read from the video socket before
//!   any stream data.
//! - [`stream`] — optional per-packet metadata framing on the video socket
//!   (present only when recording), plus the transient packet type.
//! - [`control`] / [`device_msg`] — the bidirectional control channel:
//!   outbound input messages and inbound device-originated messages.
//!
//! All multi-byte integers are big-endian on the wire.

pub mod control;
pub mod device_msg;
pub mod handshake;
pub mod stream;
