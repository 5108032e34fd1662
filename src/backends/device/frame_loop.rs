// SPDX-License-Identifier: GPL-3.0-only
//! Thread lifecycle management for the capture loop
//!
//! The capture thread is started with a shared [`StopSignal`], checks it
//! once per iteration, and is joined by whoever requested the stop. Joining
//! hands back the value the thread produced, so the caller can release the
//! shared buffers only after the thread has confirmed completion.

use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use tracing::{debug, info, warn};

/// Action returned by one loop iteration to control loop behavior
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    /// Continue running the loop
    Continue,
    /// Stop the loop gracefully
    Stop,
}

/// Cooperative cancellation flag shared between the input side and the
/// capture thread
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the loop to stop at its next check
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Run `step` until it returns [`LoopAction::Stop`] or the signal is raised
///
/// The signal is checked once before every iteration, so stop latency is
/// bounded by the duration of a single `step` call.
pub fn run_until_stopped<F>(name: &str, stop_signal: &StopSignal, mut step: F) -> u64
where
    F: FnMut() -> LoopAction,
{
    let mut iterations = 0u64;
    loop {
        if stop_signal.is_requested() {
            debug!(name = %name, "Stop signal received");
            break;
        }

        iterations += 1;
        match step() {
            LoopAction::Continue => {}
            LoopAction::Stop => {
                debug!(name = %name, "Loop requested stop");
                break;
            }
        }
    }
    iterations
}

/// Controller for a capture loop running in a separate thread
///
/// # Example
///
/// ```ignore
/// let stop = StopSignal::new();
/// let mut controller = CaptureLoopController::start("capture", stop, |stop| {
///     coordinator.run(stop)
/// })?;
///
/// // Later, stop the loop and collect its result
/// let result = controller.stop();
/// ```
pub struct CaptureLoopController<T> {
    /// Thread handle for joining
    thread_handle: Option<JoinHandle<T>>,
    /// Signal to stop the loop
    stop_signal: StopSignal,
    /// Name for logging
    name: String,
}

impl<T: Send + 'static> CaptureLoopController<T> {
    /// Start `body` on a named thread
    ///
    /// Fails only if the OS refuses to create the thread.
    pub fn start<F>(name: &str, stop_signal: StopSignal, body: F) -> io::Result<Self>
    where
        F: FnOnce(StopSignal) -> T + Send + 'static,
    {
        let thread_signal = stop_signal.clone();
        let name_clone = name.to_string();

        info!(name = %name, "Starting capture loop");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %name_clone, "Capture loop thread started");
                let output = body(thread_signal);
                info!(name = %name_clone, "Capture loop thread exiting");
                output
            })?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    /// Check if the loop is still running
    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the loop to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting capture loop stop");
        self.stop_signal.request();
    }

    /// Stop the loop and wait for the thread to finish
    ///
    /// Returns the thread's output, or `None` if it was already joined or
    /// panicked.
    pub fn stop(&mut self) -> Option<T> {
        self.request_stop();
        self.join()
    }

    /// Wait for the thread to finish without sending the stop signal
    pub fn join(&mut self) -> Option<T> {
        let handle = self.thread_handle.take()?;
        debug!(name = %self.name, "Waiting for capture loop thread to finish");
        match handle.join() {
            Ok(output) => {
                debug!(name = %self.name, "Capture loop thread finished");
                Some(output)
            }
            Err(e) => {
                warn!(name = %self.name, "Capture loop thread panicked: {:?}", e);
                None
            }
        }
    }
}

impl<T> Drop for CaptureLoopController<T> {
    fn drop(&mut self) {
        if let Some(handle) = self.thread_handle.take() {
            debug!(name = %self.name, "CaptureLoopController dropped, stopping loop");
            self.stop_signal.request();
            let _ = handle.join();
        }
    }
}
