// SPDX-License-Identifier: GPL-3.0-only

//! Capture-thread side of the pipeline
//!
//! [`CaptureCoordinator`] owns the device and pumps its event loop. Every
//! frame callback lands in a [`CaptureSink`], which records the raw payload,
//! then colorizes (depth) or hands back (video) into the ring and
//! publishes. Between polls the coordinator records telemetry, applies
//! motor/LED commands and carries out requested format switches.

use crate::backends::device::frame_loop::{LoopAction, StopSignal, run_until_stopped};
use crate::backends::device::{
    CaptureDevice, CaptureFormat, DeviceCommand, FrameSink, LedState, StreamKind,
};
use crate::errors::{AppError, AppResult, DeviceError};
use crate::pipeline::colorizer::DepthColorizer;
use crate::pipeline::recorder::{FrameRecorder, RecordCounts, RecordKind};
use crate::pipeline::ring::{FrameBuffer, FrameBufferRing};
use std::sync::Arc;
use std::sync::mpsc::{Receiver, TryRecvError};
use tracing::{debug, error, info, warn};

/// Name of the capture thread
pub const CAPTURE_THREAD: &str = "capture";

/// Frame callback adapter: record, colorize, publish
pub struct CaptureSink {
    ring: Arc<FrameBufferRing>,
    recorder: FrameRecorder,
    colorizer: DepthColorizer,
    /// Layout the device is currently producing
    format: CaptureFormat,
    /// First fatal failure raised inside a callback
    fatal: Option<AppError>,
}

impl CaptureSink {
    pub fn new(ring: Arc<FrameBufferRing>, recorder: FrameRecorder) -> Self {
        let format = ring.format().current;
        Self {
            ring,
            recorder,
            colorizer: DepthColorizer::new(),
            format,
            fatal: None,
        }
    }

    fn fail(&mut self, err: AppError) {
        error!(error = %err, "Capture failed");
        self.fatal.get_or_insert(err);
    }

    pub fn take_fatal(&mut self) -> Option<AppError> {
        self.fatal.take()
    }

    pub fn recorder(&self) -> &FrameRecorder {
        &self.recorder
    }

    fn video_kind(&self) -> RecordKind {
        if self.format.is_infrared() {
            RecordKind::Infrared
        } else {
            RecordKind::Color
        }
    }
}

impl FrameSink for CaptureSink {
    fn on_depth_frame(&mut self, raw: &[u16], timestamp: u32) {
        if self.fatal.is_some() {
            return;
        }
        if let Err(e) = self
            .recorder
            .record(RecordKind::Depth, timestamp, bytemuck::cast_slice(raw))
        {
            self.fail(e.into());
            return;
        }

        let colorizer = &self.colorizer;
        if let Err(e) = self
            .ring
            .produce_depth(|rgb| colorizer.colorize_row(raw, rgb))
        {
            self.fail(e.into());
        }
    }

    fn on_video_frame(&mut self, filled: FrameBuffer, bytes: usize, timestamp: u32) -> FrameBuffer {
        if self.fatal.is_some() {
            return filled;
        }
        let kind = self.video_kind();
        let payload = &filled[..bytes.min(filled.len())];
        if let Err(e) = self.recorder.record(kind, timestamp, payload) {
            self.fail(e.into());
            return filled;
        }

        match self.ring.publish_video(filled, self.format) {
            Ok(spare) => spare,
            Err(rejected) => {
                self.fail(rejected.error.into());
                rejected.buffer
            }
        }
    }
}

/// Why the capture loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureEnd {
    /// The stop signal was raised
    Stopped,
    /// The device reported an error while polling or switching
    EndOfStream(DeviceError),
}

/// Summary of a finished capture run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureReport {
    pub end: CaptureEnd,
    /// Successful polls
    pub polls: u64,
    pub records: RecordCounts,
    /// Frames overwritten before the display consumed them, per stream
    pub depth_superseded: u64,
    pub video_superseded: u64,
}

/// Drives one device for the lifetime of a session
pub struct CaptureCoordinator<D: CaptureDevice> {
    device: D,
    sink: CaptureSink,
    commands: Receiver<DeviceCommand>,
    telemetry_every_polls: u32,
    polls: u64,
}

impl<D: CaptureDevice> CaptureCoordinator<D> {
    pub fn new(
        device: D,
        ring: Arc<FrameBufferRing>,
        recorder: FrameRecorder,
        commands: Receiver<DeviceCommand>,
        telemetry_every_polls: u32,
    ) -> Self {
        Self {
            device,
            sink: CaptureSink::new(ring, recorder),
            commands,
            telemetry_every_polls: telemetry_every_polls.max(1),
            polls: 0,
        }
    }

    fn ring(&self) -> &FrameBufferRing {
        &self.sink.ring
    }

    /// Put the device into the current format and start both streams
    fn start(&mut self) -> AppResult<()> {
        let format = self.sink.format;
        self.device.set_video_format(format)?;
        let buffer = self.ring().lend_producing(StreamKind::Video)?;
        self.device.attach_video_buffer(buffer);
        self.device.start_stream(StreamKind::Depth)?;
        self.device.start_stream(StreamKind::Video)?;
        self.device.set_led(LedState::Red)?;
        info!(format = %format, "Capture started");
        Ok(())
    }

    /// Run until stopped, end-of-stream, or a fatal record failure
    ///
    /// The device is closed and the ring is closed on every exit path.
    pub fn run(mut self, stop: &StopSignal) -> AppResult<CaptureReport> {
        if let Err(e) = self.start() {
            self.shutdown();
            return Err(e);
        }

        let mut outcome = Ok(CaptureEnd::Stopped);
        run_until_stopped(CAPTURE_THREAD, stop, || match self.step() {
            Ok(None) => LoopAction::Continue,
            Ok(Some(end)) => {
                info!(reason = %end, "Capture stream ended");
                outcome = Ok(CaptureEnd::EndOfStream(end));
                LoopAction::Stop
            }
            Err(e) => {
                outcome = Err(e);
                LoopAction::Stop
            }
        });

        self.shutdown();
        let end = outcome?;
        Ok(self.report(end))
    }

    /// One poll plus the between-poll housekeeping
    ///
    /// `Ok(Some(_))` means the device has nothing more to deliver. Any
    /// device failure ends the stream; record failures are fatal.
    fn step(&mut self) -> AppResult<Option<DeviceError>> {
        let polled = self.device.poll_events(&mut self.sink);
        if let Some(fatal) = self.sink.take_fatal() {
            return Err(fatal);
        }
        if let Err(end) = polled {
            return Ok(Some(end));
        }
        self.polls += 1;

        if self.polls % u64::from(self.telemetry_every_polls) == 0
            && let Err(e) = self.record_telemetry()
        {
            return end_of_stream(e);
        }
        if let Err(e) = self.apply_commands() {
            return end_of_stream(e);
        }
        match self.switch_format_if_requested() {
            Ok(()) => Ok(None),
            Err(e) => end_of_stream(e),
        }
    }

    fn record_telemetry(&mut self) -> AppResult<()> {
        let Some(timestamp) = self.sink.recorder.last_frame_timestamp() else {
            return Ok(());
        };
        let sample = self.device.query_telemetry()?;
        self.sink
            .recorder
            .record(RecordKind::Telemetry, timestamp, sample.as_bytes())?;
        Ok(())
    }

    fn apply_commands(&mut self) -> AppResult<()> {
        loop {
            let command = match self.commands.try_recv() {
                Ok(command) => command,
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return Ok(()),
            };
            let result = match command {
                DeviceCommand::SetTilt(degrees) => self.device.set_tilt_degrees(degrees),
                DeviceCommand::SetLed(led) => self.device.set_led(led),
            };
            if let Err(e) = result {
                warn!(?command, error = %e, "Device command failed");
                return Err(e.into());
            }
            debug!(?command, "Applied device command");
        }
    }

    fn switch_format_if_requested(&mut self) -> AppResult<()> {
        let state = self.ring().format();
        if !state.change_pending() {
            return Ok(());
        }
        let target = state.requested;
        info!(from = %state.current, to = %target, "Switching video format");

        self.device.stop_stream(StreamKind::Video)?;
        if let Some(buffer) = self.device.detach_video_buffer() {
            self.ring().reclaim_producing(buffer)?;
        }
        self.device.set_video_format(target)?;
        let buffer = self.ring().lend_producing(StreamKind::Video)?;
        self.device.attach_video_buffer(buffer);
        self.device.start_stream(StreamKind::Video)?;

        self.sink.format = target;
        self.ring().confirm_format(target);
        Ok(())
    }

    /// Stop streams, take the video buffer back, close device and ring
    fn shutdown(&mut self) {
        for stream in StreamKind::ALL {
            if let Err(e) = self.device.stop_stream(stream) {
                debug!(stream = stream.name(), error = %e, "Stream stop failed");
            }
        }
        if let Some(buffer) = self.device.detach_video_buffer()
            && let Err(e) = self.ring().reclaim_producing(buffer)
        {
            warn!(error = %e, "Could not return video buffer");
        }
        if let Err(e) = self.device.set_led(LedState::Off) {
            debug!(error = %e, "Failed to clear LED");
        }
        self.device.close();
        self.ring().close();
        info!(polls = self.polls, "Capture shut down");
    }

    fn report(&self, end: CaptureEnd) -> CaptureReport {
        let depth = self.ring().snapshot(StreamKind::Depth);
        let video = self.ring().snapshot(StreamKind::Video);
        let records = self.sink.recorder.counts();
        if depth.superseded > 0 || video.superseded > 0 {
            warn!(
                depth = depth.superseded,
                video = video.superseded,
                "Frames were replaced before they could be displayed"
            );
        }
        info!(
            depth = records.depth,
            color = records.color,
            infrared = records.infrared,
            telemetry = records.telemetry,
            "Recorded session"
        );
        CaptureReport {
            end,
            polls: self.polls,
            records,
            depth_superseded: depth.superseded,
            video_superseded: video.superseded,
        }
    }
}

/// Device failures end the stream; anything else is passed on
fn end_of_stream(err: AppError) -> AppResult<Option<DeviceError>> {
    match err {
        AppError::Device(e) => Ok(Some(e)),
        other => Err(other),
    }
}
