//! Dedicated compositing thread.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, error, warn};

use crate::error::BufferError;
use crate::view::ViewProvider;

use super::buffer::{CycleReport, MapBuffer};
use super::eviction::HoldOff;
use super::status::{BufferStatus, CancelToken, StatusCell};

/// How often an idle worker re-checks for cancellation.
pub const DEFAULT_WORKER_TICK: Duration = Duration::from_millis(10);

#[derive(Default)]
struct WorkerShared {
    last_report: Mutex<Option<CycleReport>>,
    cycles: AtomicU64,
}

/// Runs a [`MapBuffer`] on its own thread.
///
/// The control side requests a cycle with [`request_cycle`](Self::request_cycle)
/// and may wait for it with [`wait_complete`](Self::wait_complete). Dropping
/// the worker disposes the buffer and joins the thread.
pub struct BufferWorker {
    status: Arc<StatusCell>,
    cancel: CancelToken,
    hold_off: Arc<HoldOff>,
    shared: Arc<WorkerShared>,
    handle: Option<JoinHandle<()>>,
}

impl BufferWorker {
    /// Move `buffer` onto a new thread that composites `view` on request.
    pub fn spawn(buffer: MapBuffer, view: Arc<dyn ViewProvider>) -> io::Result<Self> {
        let status = Arc::clone(buffer.status_cell());
        let cancel = buffer.cancel_token();
        let hold_off = Arc::clone(buffer.hold_off());
        let shared = Arc::new(WorkerShared::default());

        let handle = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("map-buffer".to_string())
                .spawn(move || worker_loop(buffer, view, shared))?
        };

        debug!("Buffer worker started");
        Ok(Self {
            status,
            cancel,
            hold_off,
            shared,
            handle: Some(handle),
        })
    }

    /// Ask for a new cycle. Ignored while one is pending or running.
    pub fn request_cycle(&self) -> bool {
        self.status.request_start()
    }

    /// Wait at most `timeout` for the current cycle to complete.
    pub fn wait_complete(&self, timeout: Duration) -> bool {
        self.status.wait_complete(timeout)
    }

    pub fn status(&self) -> BufferStatus {
        self.status.get()
    }

    /// Hold-off to take while reading from tiles on the control side.
    pub fn hold_off(&self) -> &Arc<HoldOff> {
        &self.hold_off
    }

    pub fn last_report(&self) -> Option<CycleReport> {
        self.shared.last_report.lock().clone()
    }

    /// Number of cycles completed so far.
    pub fn cycles(&self) -> u64 {
        self.shared.cycles.load(Ordering::Acquire)
    }

    /// Stop the worker, dispose the buffer and join the thread.
    pub fn dispose(&mut self) {
        let Some(handle) = self.handle.take() else {
            return;
        };
        self.cancel.cancel();
        self.status.set(BufferStatus::Disposed);

        if handle.join().is_err() {
            error!("Buffer worker panicked during shutdown");
        }
        debug!("Buffer worker stopped");
    }
}

impl Drop for BufferWorker {
    fn drop(&mut self) {
        self.dispose();
    }
}

fn worker_loop(mut buffer: MapBuffer, view: Arc<dyn ViewProvider>, shared: Arc<WorkerShared>) {
    let status = Arc::clone(buffer.status_cell());
    let cancel = buffer.cancel_token();

    while !cancel.is_cancelled() {
        if !status.wait_start(DEFAULT_WORKER_TICK) {
            continue;
        }

        match buffer.run_cycle(&*view) {
            Ok(report) => {
                *shared.last_report.lock() = Some(report);
                shared.cycles.fetch_add(1, Ordering::AcqRel);
            }
            Err(BufferError::Disposed) => break,
            Err(e) => warn!("Cycle error: {}", e),
        }
    }

    buffer.dispose();
}
