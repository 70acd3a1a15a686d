//! Buffer status handoff and cancellation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use serde::Serialize;

/// Lifecycle of a compositing cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BufferStatus {
    /// No cycle has run yet
    Idle,
    /// A cycle was requested and the worker may proceed
    Start,
    /// A cycle is in progress
    Working,
    /// The last cycle finished
    Complete,
    /// The buffer was torn down; terminal
    Disposed,
}

/// How much of the buffer the next cycle must refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RedrawType {
    /// Rebuild the backing buffer even if the window did not move
    Full,
    /// Only a region changed; the front buffer is re-extracted
    Area,
    /// The view moved inside the current window
    Move,
    #[default]
    None,
}

/// Shared status flag with a condition variable for the start handoff.
#[derive(Debug)]
pub struct StatusCell {
    status: Mutex<BufferStatus>,
    changed: Condvar,
}

impl StatusCell {
    pub fn new() -> Self {
        Self {
            status: Mutex::new(BufferStatus::Idle),
            changed: Condvar::new(),
        }
    }

    pub fn get(&self) -> BufferStatus {
        *self.status.lock()
    }

    /// Set the status and wake waiters. `Disposed` is never left.
    pub fn set(&self, status: BufferStatus) -> bool {
        let mut current = self.status.lock();
        if *current == BufferStatus::Disposed {
            return false;
        }
        *current = status;
        drop(current);

        self.changed.notify_all();
        true
    }

    /// Request a new cycle. Only `Idle` and `Complete` move to `Start`.
    pub fn request_start(&self) -> bool {
        let mut current = self.status.lock();
        match *current {
            BufferStatus::Idle | BufferStatus::Complete => {
                *current = BufferStatus::Start;
                drop(current);
                self.changed.notify_all();
                true
            }
            _ => false,
        }
    }

    /// Wait at most `timeout` for the status to satisfy `pred`.
    ///
    /// Returns the status observed when the wait ended.
    pub fn wait_until<F>(&self, timeout: Duration, pred: F) -> BufferStatus
    where
        F: Fn(BufferStatus) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let mut current = self.status.lock();
        while !pred(*current) {
            if self.changed.wait_until(&mut current, deadline).timed_out() {
                break;
            }
        }
        *current
    }

    /// Wait for a cycle request. Returns `true` when the status is `Start`.
    pub fn wait_start(&self, timeout: Duration) -> bool {
        let status = self.wait_until(timeout, |s| {
            matches!(s, BufferStatus::Start | BufferStatus::Disposed)
        });
        status == BufferStatus::Start
    }

    /// Wait for the running cycle to finish. Returns `true` on `Complete`.
    pub fn wait_complete(&self, timeout: Duration) -> bool {
        let status = self.wait_until(timeout, |s| {
            matches!(s, BufferStatus::Complete | BufferStatus::Disposed)
        });
        status == BufferStatus::Complete
    }
}

impl Default for StatusCell {
    fn default() -> Self {
        Self::new()
    }
}

/// Cancellation flag shared between the buffer and its controllers.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}
