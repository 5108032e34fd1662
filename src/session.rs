// SPDX-License-Identifier: GPL-3.0-only

//! Recording session lifecycle
//!
//! Startup runs strictly in order and any failure aborts before capture
//! begins: output directory, device, manifest, ring, capture thread. The
//! display loop then runs on the calling thread until capture ends or the
//! user quits. Teardown joins the capture thread before the display's
//! leased buffers and the ring itself are dropped.

use crate::backends::device::frame_loop::{CaptureLoopController, LoopAction, StopSignal};
use crate::backends::device::synthetic::SyntheticDevice;
use crate::backends::device::{CaptureDevice, DeviceCommand};
use crate::config::Config;
use crate::constants::{COMMAND_QUEUE_DEPTH, display};
use crate::errors::{AppError, AppResult, StartupError};
use crate::pipeline::coordinator::{CAPTURE_THREAD, CaptureCoordinator, CaptureReport};
use crate::pipeline::display::{DisplayLoop, FrameRenderer, HeadlessRenderer};
use crate::pipeline::input::InputController;
use crate::pipeline::recorder::{FrameRecorder, RecordingSession};
use crate::pipeline::ring::FrameBufferRing;
use crate::terminal::TerminalRenderer;
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{self, SyncSender};
use tracing::{error, info};

/// Where frames are shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Frontend {
    /// Interactive half-block viewer with keyboard control
    Terminal,
    /// No output; stops on end-of-stream or the stop signal
    Headless,
}

impl Frontend {
    pub fn from_config(config: &Config) -> Self {
        if config.terminal_display {
            Frontend::Terminal
        } else {
            Frontend::Headless
        }
    }
}

/// Outcome of a finished session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub capture: CaptureReport,
    /// Frames handed to the renderer
    pub presented: u64,
    /// Display ticks skipped while a format switch was outstanding
    pub skipped: u64,
}

/// Record from the synthetic device into `out_dir`
pub fn record(
    out_dir: &Path,
    config: &Config,
    frontend: Frontend,
    stop: StopSignal,
) -> AppResult<SessionSummary> {
    std::fs::create_dir_all(out_dir)
        .map_err(|e| StartupError::OutputDir(out_dir.to_path_buf(), e))?;
    let device = SyntheticDevice::open(config.synthetic, config.initial_format)
        .map_err(|e| StartupError::DeviceOpen(e.to_string()))?;
    run_with_device(device, out_dir, config, frontend, stop)
}

/// Record from `device` into the existing directory `out_dir`
pub fn run_with_device<D>(
    device: D,
    out_dir: &Path,
    config: &Config,
    frontend: Frontend,
    stop: StopSignal,
) -> AppResult<SessionSummary>
where
    D: CaptureDevice + 'static,
{
    let recorder = FrameRecorder::new(RecordingSession::open(out_dir)?);
    info!(
        dir = %recorder.session_dir().display(),
        format = %config.initial_format,
        "Recording session"
    );
    let ring = Arc::new(FrameBufferRing::for_sensor(config.initial_format));
    let (commands_tx, commands_rx) = mpsc::sync_channel(COMMAND_QUEUE_DEPTH);

    let coordinator = CaptureCoordinator::new(
        device,
        Arc::clone(&ring),
        recorder,
        commands_rx,
        config.telemetry_every_polls,
    );

    // Leases are taken before capture starts so the display owns its
    // slots from the first frame on
    let result = match frontend {
        Frontend::Terminal => {
            let renderer = TerminalRenderer::enter()?;
            let display = DisplayLoop::new(Arc::clone(&ring), renderer)?;
            let capture = spawn_capture(coordinator, stop.clone())?;
            run_terminal(display, capture, &ring, commands_tx, stop)
        }
        Frontend::Headless => {
            let display = DisplayLoop::new(Arc::clone(&ring), HeadlessRenderer::new())?;
            let capture = spawn_capture(coordinator, stop)?;
            drop(commands_tx);
            run_display(display, capture, |_| Ok(true))
        }
    };

    if let Ok(summary) = &result {
        info!(
            presented = summary.presented,
            skipped = summary.skipped,
            records = summary.capture.records.total(),
            "Session finished"
        );
    }
    result
}

type CaptureThread = CaptureLoopController<AppResult<CaptureReport>>;

fn spawn_capture<D>(coordinator: CaptureCoordinator<D>, stop: StopSignal) -> AppResult<CaptureThread>
where
    D: CaptureDevice + 'static,
{
    CaptureLoopController::start(CAPTURE_THREAD, stop, move |stop| coordinator.run(&stop))
        .map_err(|e| StartupError::ThreadSpawn(e).into())
}

fn run_terminal(
    mut display: DisplayLoop<TerminalRenderer>,
    capture: CaptureThread,
    ring: &Arc<FrameBufferRing>,
    commands: SyncSender<DeviceCommand>,
    stop: StopSignal,
) -> AppResult<SessionSummary> {
    let mut input = InputController::new(Arc::clone(ring), commands, stop);
    display
        .renderer_mut()
        .set_status(status_line(&input, ring));

    // Keys are handled first so the next frame's status reflects them
    run_display(display, capture, move |renderer: &mut TerminalRenderer| {
        let keys = renderer
            .poll_keys(display::INPUT_POLL)
            .map_err(AppError::Display)?;
        for key in keys {
            if input.handle_key(key) == LoopAction::Stop {
                return Ok(false);
            }
        }
        renderer.set_status(status_line(&input, ring));
        Ok(true)
    })
}

fn status_line(input: &InputController, ring: &FrameBufferRing) -> String {
    let format = ring.format();
    let pending = if format.change_pending() {
        format!(" -> {}", format.requested)
    } else {
        String::new()
    };
    format!(
        "REC {}{} | tilt {}° | LED {} | w/x tilt  s level  0-6 LED  f format  q quit",
        format.current,
        pending,
        input.tilt(),
        input.led().display_name()
    )
}

/// Drive the display until capture ends or `between` asks to stop, then
/// join the capture thread before releasing the display's buffers
fn run_display<R, F>(
    mut display: DisplayLoop<R>,
    mut capture: CaptureThread,
    between: F,
) -> AppResult<SessionSummary>
where
    R: FrameRenderer,
    F: FnMut(&mut R) -> AppResult<bool>,
{
    let shown = display.run(between);

    if capture.is_running() {
        info!("Stopping capture");
    }
    let captured = capture.stop().unwrap_or(Err(AppError::CapturePanicked));
    // Capture thread has exited: the leased buffers can go
    let skipped = display.skipped();
    drop(display);

    let presented = shown?;
    match captured {
        Ok(capture) => Ok(SessionSummary {
            capture,
            presented,
            skipped,
        }),
        Err(e) => {
            error!(error = %e, "Capture ended with an error");
            Err(e)
        }
    }
}
