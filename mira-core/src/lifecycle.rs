//! Explicit lifecycle state machine for thread-owning components.
//!
//! Decoder and Controller both follow `Idle → Running → Stopping → Stopped`.
//! Keeping the state observable from any task makes the shutdown ordering
//! auditable: `stop()` must precede `join()`, and a component can only be
//! started once.

use std::sync::atomic::{AtomicU8, Ordering};

use crate::error::MiraError;

// ── LifecycleState ───────────────────────────────────────────────

/// The four states a pipeline component moves through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LifecycleState {
    /// Constructed, no task spawned.
    Idle = 0,
    /// Loop task spawned and processing.
    Running = 1,
    /// Cooperative termination requested, task may still be draining.
    Stopping = 2,
    /// Loop task has exited. Terminal.
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => LifecycleState::Idle,
            1 => LifecycleState::Running,
            2 => LifecycleState::Stopping,
            _ => LifecycleState::Stopped,
        }
    }
}

// ── Lifecycle ────────────────────────────────────────────────────

/// Shared, lock-free view of a component's lifecycle state.
#[derive(Debug)]
pub struct Lifecycle(AtomicU8);

impl Lifecycle {
    pub fn new() -> Self {
        Self(AtomicU8::new(LifecycleState::Idle as u8))
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.0.load(Ordering::SeqCst))
    }

    /// `Idle → Running`. Fails if the component was already started.
    pub fn set_running(&self) -> Result<(), MiraError> {
        self.0
            .compare_exchange(
                LifecycleState::Idle as u8,
                LifecycleState::Running as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(|_| MiraError::Lifecycle("start() requires Idle"))
    }

    /// `Running → Stopping`. Returns `false` if the component was not
    /// running (already stopping, stopped, or never started).
    pub fn request_stop(&self) -> bool {
        self.0
            .compare_exchange(
                LifecycleState::Running as u8,
                LifecycleState::Stopping as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .is_ok()
    }

    /// Terminal transition, valid from any state.
    pub fn set_stopped(&self) {
        self.0.store(LifecycleState::Stopped as u8, Ordering::SeqCst);
    }
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

// ── Tests ────────────────────────────────────────────────────────
