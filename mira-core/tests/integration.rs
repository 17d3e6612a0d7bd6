//! Integration tests — full session lifecycle against a fake device on
//! localhost, stream/control round-trips, and shutdown ordering under
//! blocked reads.

use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use mira_core::protocol::stream::PacketHeader;
use mira_core::{
    ControlMessage, DecodeError, DeviceAction, DeviceInfo, DeviceMessage, InputEvent, InputMapper,
    MiraError, MouseButton, NullDecoder, Plane, RecordFormat, Session, SessionConfig,
    SessionEvent, VideoDecoder, VideoFrame,
};

// ── Helpers ──────────────────────────────────────────────────────

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

/// A decoder that turns every received chunk into one tagged 2×2 frame.
struct OneFramePerChunk;

impl VideoDecoder for OneFramePerChunk {
    fn decode(&mut self, data: &[u8]) -> Result<Vec<VideoFrame>, DecodeError> {
        let tag = data.first().copied().unwrap_or(0);
        Ok(vec![VideoFrame::new(
            2,
            2,
            vec![Plane::new(vec![tag; 4], 2)],
        )])
    }
}

/// The device side of an established session.
struct FakeDevice {
    video: TcpStream,
    control: TcpStream,
}

/// Spin up a listener on an OS-assigned port and return a config that
/// dials it.
async fn ephemeral_device() -> (TcpListener, SessionConfig) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let config = SessionConfig {
        port: listener.local_addr().unwrap().port(),
        ..SessionConfig::default()
    };
    (listener, config)
}

/// Accept both channels (video first) and send the handshake header.
async fn accept_session(listener: TcpListener) -> FakeDevice {
    let (mut video, _) = listener.accept().await.unwrap();
    let (control, _) = listener.accept().await.unwrap();

    let info = DeviceInfo {
        name: "Pixel 3".into(),
        width: 1080,
        height: 2340,
    };
    video.write_all(&info.encode()).await.unwrap();
    FakeDevice { video, control }
}

fn framed_packet(pts: u64, keyframe: bool, data: &[u8]) -> Vec<u8> {
    let mut wire = PacketHeader {
        pts,
        keyframe,
        len: data.len() as u32,
    }
    .encode()
    .to_vec();
    wire.extend_from_slice(data);
    wire
}

// ── Session lifecycle ────────────────────────────────────────────

#[tokio::test]
async fn full_session_round_trip() {
    let (listener, config) = ephemeral_device().await;
    let device = tokio::spawn(accept_session(listener));

    let mut session = Session::start(&config, Box::new(OneFramePerChunk))
        .await
        .unwrap();
    let mut device = device.await.unwrap();

    assert_eq!(session.device_name(), "Pixel 3");
    assert_eq!(session.frame_size(), (1080, 2340));

    // Device streams a chunk; it must surface as a frame in the slot.
    let slot = session.frame_slot();
    device.video.write_all(&[0x42, 1, 2, 3]).await.unwrap();
    let frame = tokio::time::timeout(TEST_TIMEOUT, slot.take_wait())
        .await
        .expect("no frame arrived")
        .unwrap();
    assert_eq!(frame.planes[0].data[0], 0x42);

    // Local input flows out through the controller: a pointer-down at
    // (100,100) on an 800×600 surface must hit the device at (135,390).
    let mut mapper = InputMapper::new(session.frame_size(), (800, 600));
    let control = session.control();
    for msg in mapper.translate(&InputEvent::MouseButton {
        button: MouseButton::Left,
        pressed: true,
        x: 100,
        y: 100,
    }) {
        assert!(control.offer(msg));
    }

    let mut received = BytesMut::new();
    let mut buf = [0u8; 256];
    let msg = loop {
        let n = tokio::time::timeout(TEST_TIMEOUT, device.control.read(&mut buf))
            .await
            .expect("no control bytes arrived")
            .unwrap();
        received.extend_from_slice(&buf[..n]);
        if let Some(msg) = ControlMessage::decode(&mut received).unwrap() {
            break msg;
        }
    };
    match msg {
        ControlMessage::Touch { x, y, .. } => assert_eq!((x, y), (135, 390)),
        other => panic!("unexpected control message: {other:?}"),
    }

    tokio::time::timeout(TEST_TIMEOUT, session.shutdown())
        .await
        .expect("shutdown hung")
        .unwrap();
}

#[tokio::test]
async fn stream_end_raises_fatal_decoder_event() {
    let (listener, config) = ephemeral_device().await;
    let device = tokio::spawn(accept_session(listener));

    let mut session = Session::start(&config, Box::new(NullDecoder)).await.unwrap();
    let device = device.await.unwrap();

    // Device dies: closing the video socket ends the stream.
    drop(device);

    let event = tokio::time::timeout(TEST_TIMEOUT, session.wait())
        .await
        .expect("no event")
        .expect("event channel closed");
    assert!(matches!(
        event,
        SessionEvent::DecoderStopped { error: None }
    ));
    assert!(event.is_fatal());

    tokio::time::timeout(TEST_TIMEOUT, session.shutdown())
        .await
        .expect("shutdown hung")
        .unwrap();
}

#[tokio::test]
async fn shutdown_is_bounded_while_reads_are_blocked() {
    let (listener, config) = ephemeral_device().await;
    let device = tokio::spawn(accept_session(listener));

    let mut session = Session::start(&config, Box::new(NullDecoder)).await.unwrap();
    let _device = device.await.unwrap();

    // No stream data ever arrives: both reads are parked. Shutdown must
    // unblock them and return promptly.
    tokio::time::timeout(Duration::from_secs(2), session.shutdown())
        .await
        .expect("shutdown hung on a blocked read")
        .unwrap();

    // Idempotent: a second shutdown is a no-op.
    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn handshake_failure_aborts_startup() {
    let (listener, config) = ephemeral_device().await;

    tokio::spawn(async move {
        let (mut video, _) = listener.accept().await.unwrap();
        let (_control, _) = listener.accept().await.unwrap();
        video.write_all(&[0u8; 63]).await.unwrap(); // short header
        // sockets drop here
    });

    let err = Session::start(&config, Box::new(NullDecoder))
        .await
        .unwrap_err();
    assert!(matches!(err, MiraError::Handshake(_)));
}

#[tokio::test]
async fn connection_refused_aborts_startup() {
    let (listener, config) = ephemeral_device().await;
    drop(listener);

    let err = Session::start(&config, Box::new(NullDecoder))
        .await
        .unwrap_err();
    assert!(matches!(err, MiraError::Connection(_)));
}

// ── Recording ────────────────────────────────────────────────────

#[tokio::test]
async fn recording_session_muxes_the_received_stream() {
    let (listener, mut config) = ephemeral_device().await;
    let dir = tempfile::tempdir().unwrap();
    let target = dir.path().join("session.ivf");
    config.record_target = Some(target.clone());
    config.record_format = RecordFormat::Ivf;

    let device = tokio::spawn(accept_session(listener));
    let mut session = Session::start(&config, Box::new(NullDecoder)).await.unwrap();
    let mut device = device.await.unwrap();

    // With recording on, the device interleaves packet headers.
    device
        .video
        .write_all(&framed_packet(1_000_000, true, &[0, 0, 1, 0x65, 0xAA]))
        .await
        .unwrap();
    device
        .video
        .write_all(&framed_packet(1_033_333, false, &[0, 0, 1, 0x41, 0xBB]))
        .await
        .unwrap();
    device.video.shutdown().await.unwrap();

    // Stream end → decoder stops → recorder finalized before join returns.
    let event = tokio::time::timeout(TEST_TIMEOUT, session.wait())
        .await
        .expect("no event")
        .unwrap();
    assert!(matches!(event, SessionEvent::DecoderStopped { .. }));
    tokio::time::timeout(TEST_TIMEOUT, session.shutdown())
        .await
        .expect("shutdown hung")
        .unwrap();

    let bytes = std::fs::read(&target).unwrap();
    assert_eq!(&bytes[0..4], b"DKIF");
    let count = u32::from_le_bytes(bytes[24..28].try_into().unwrap());
    assert_eq!(count, 2);

    // First frame: rebased pts 0, 5 payload bytes.
    let len0 = u32::from_le_bytes(bytes[32..36].try_into().unwrap());
    let pts0 = u64::from_le_bytes(bytes[36..44].try_into().unwrap());
    assert_eq!((len0, pts0), (5, 0));
    // Second frame: rebased to the inter-packet gap.
    let off1 = 32 + 12 + len0 as usize;
    let pts1 = u64::from_le_bytes(bytes[off1 + 4..off1 + 12].try_into().unwrap());
    assert_eq!(pts1, 33_333);
}

// ── Device messages ──────────────────────────────────────────────

#[tokio::test]
async fn device_clipboard_reaches_the_client() {
    let (listener, config) = ephemeral_device().await;
    let device = tokio::spawn(accept_session(listener));

    let mut session = Session::start(&config, Box::new(NullDecoder)).await.unwrap();
    let mut device = device.await.unwrap();
    let mut device_msgs = session.device_messages().unwrap();

    device
        .control
        .write_all(&DeviceMessage::Clipboard("device text".into()).encode())
        .await
        .unwrap();

    let msg = tokio::time::timeout(TEST_TIMEOUT, device_msgs.recv())
        .await
        .expect("no device message")
        .unwrap();
    assert_eq!(msg, DeviceMessage::Clipboard("device text".into()));

    tokio::time::timeout(TEST_TIMEOUT, session.shutdown())
        .await
        .expect("shutdown hung")
        .unwrap();
}

// ── Input semantics over the wire ────────────────────────────────

#[tokio::test]
async fn home_action_arrives_as_down_then_up() {
    let (listener, config) = ephemeral_device().await;
    let device = tokio::spawn(accept_session(listener));

    let mut session = Session::start(&config, Box::new(NullDecoder)).await.unwrap();
    let mut device = device.await.unwrap();

    let mapper = InputMapper::new(session.frame_size(), (800, 600));
    let control = session.control();
    let msgs = mapper.action(DeviceAction::Home);
    assert_eq!(msgs.len(), 2);
    for msg in msgs {
        assert!(control.offer(msg));
    }

    let mut received = BytesMut::new();
    let mut buf = [0u8; 64];
    let mut decoded = Vec::new();
    while decoded.len() < 2 {
        let n = tokio::time::timeout(TEST_TIMEOUT, device.control.read(&mut buf))
            .await
            .expect("no control bytes")
            .unwrap();
        received.extend_from_slice(&buf[..n]);
        while let Some(msg) = ControlMessage::decode(&mut received).unwrap() {
            decoded.push(msg);
        }
    }

    use mira_core::protocol::control::{KeyAction, keycode};
    match (&decoded[0], &decoded[1]) {
        (
            ControlMessage::Key {
                action: KeyAction::Down,
                keycode: down_code,
                ..
            },
            ControlMessage::Key {
                action: KeyAction::Up,
                keycode: up_code,
                ..
            },
        ) => {
            assert_eq!(*down_code, keycode::HOME);
            assert_eq!(*up_code, keycode::HOME);
        }
        other => panic!("unexpected message pair: {other:?}"),
    }

    tokio::time::timeout(TEST_TIMEOUT, session.shutdown())
        .await
        .expect("shutdown hung")
        .unwrap();
}
