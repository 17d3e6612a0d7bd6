//! Single-slot hand-off between the decoder and the presentation loop.
//!
//! Decode happens at the source frame rate, which may exceed the consumer's
//! draw rate or stall during a resize. The slot bounds memory to one
//! pending frame and guarantees the freshest available picture: a new
//! publish overwrites an unconsumed frame, which is dropped, never queued.
//!
//! The lock is held only for the pointer swap — never across decode or
//! render work — so `publish` cannot block the decoder and `take` cannot
//! block the presentation loop.

use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::Notify;
use tracing::trace;

use crate::frame::VideoFrame;

// ── FrameSlot ────────────────────────────────────────────────────

/// Thread-safe single-slot hand-off of the most recently decoded picture.
#[derive(Debug)]
pub struct FrameSlot {
    pending: Mutex<Option<VideoFrame>>,
    notify: Notify,
    closed: Mutex<bool>,
    skipped: AtomicU64,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(None),
            notify: Notify::new(),
            closed: Mutex::new(false),
            skipped: AtomicU64::new(0),
        }
    }

    /// Publish a freshly decoded frame. Never blocks: any unconsumed
    /// pending frame is replaced and dropped.
    pub fn publish(&self, frame: VideoFrame) {
        {
            let mut pending = self.pending.lock().unwrap();
            if pending.replace(frame).is_some() {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                trace!("superseded an unconsumed frame");
            }
        }
        self.notify.notify_one();
    }

    /// Take the pending frame if there is one. Non-blocking.
    pub fn take(&self) -> Option<VideoFrame> {
        self.pending.lock().unwrap().take()
    }

    /// Wait until a frame is pending, then take it.
    ///
    /// Returns `None` only after [`close`](Self::close), so a consumer
    /// blocked here unblocks during shutdown. Intended for consumers with
    /// nothing else to do between frames.
    pub async fn take_wait(&self) -> Option<VideoFrame> {
        loop {
            // Arm the waiter before checking, so a publish that lands
            // between the check and the await is not missed.
            let notified = self.notify.notified();

            if let Some(frame) = self.take() {
                return Some(frame);
            }
            if *self.closed.lock().unwrap() {
                return None;
            }

            notified.await;
        }
    }

    /// Wake any waiting consumer and make future `take_wait` calls return
    /// `None` once the slot is drained.
    pub fn close(&self) {
        *self.closed.lock().unwrap() = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    /// Number of frames that were superseded before being consumed.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }
}

impl Default for FrameSlot {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::frame::Plane;

    fn frame(tag: u8) -> VideoFrame {
        VideoFrame::new(2, 2, vec![Plane::new(vec![tag; 4], 2)])
    }

    fn tag_of(f: &VideoFrame) -> u8 {
        f.planes[0].data[0]
    }

    #[test]
    fn take_on_empty_is_none() {
        let slot = FrameSlot::new();
        assert!(slot.take().is_none());
    }

    #[test]
    fn latest_publish_wins() {
        let slot = FrameSlot::new();
        slot.publish(frame(1));
        slot.publish(frame(2));
        slot.publish(frame(3));

        let taken = slot.take().unwrap();
        assert_eq!(tag_of(&taken), 3);
        assert_eq!(slot.skipped(), 2);
    }

    #[test]
    fn taken_frame_is_never_returned_twice() {
        let slot = FrameSlot::new();
        slot.publish(frame(1));
        assert!(slot.take().is_some());
        assert!(slot.take().is_none());
    }

    #[tokio::test]
    async fn take_wait_sees_later_publish() {
        let slot = Arc::new(FrameSlot::new());

        let consumer = {
            let slot = Arc::clone(&slot);
            tokio::spawn(async move { slot.take_wait().await })
        };

        // Give the consumer a chance to park first.
        tokio::time::sleep(Duration::from_millis(20)).await;
        slot.publish(frame(9));

        let taken = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap()
            .unwrap();
        assert_eq!(tag_of(&taken), 9);
    }

    #[tokio::test]
    async fn take_wait_returns_pending_frame_immediately() {
        let slot = FrameSlot::new();
        slot.publish(frame(5));
        let taken = tokio::time::timeout(Duration::from_secs(1), slot.take_wait())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(tag_of(&taken), 5);
    }

    #[tokio::test]
    async fn close_unblocks_waiter() {
        let slot = Arc::new(FrameSlot::new());

        let consumer = {
            let slot = Arc::clone(&slot);
            tokio::spawn(async move { slot.take_wait().await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        slot.close();

        let result = tokio::time::timeout(Duration::from_secs(1), consumer)
            .await
            .unwrap()
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn close_drains_pending_frame_first() {
        let slot = FrameSlot::new();
        slot.publish(frame(1));
        slot.close();
        assert!(slot.take_wait().await.is_some());
        assert!(slot.take_wait().await.is_none());
    }

    #[test]
    fn publish_does_not_block_without_consumer() {
        let slot = FrameSlot::new();
        for i in 0..1000 {
            slot.publish(frame(i as u8));
        }
        assert_eq!(slot.skipped(), 999);
    }
}
