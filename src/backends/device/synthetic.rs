// SPDX-License-Identifier: GPL-3.0-only

//! Synthetic capture device
//!
//! Generates animated test patterns at a fixed frame rate through the same
//! callback interface a hardware driver uses:
//!
//! - depth: diagonal gradient over the full 11-bit range, scrolling each frame
//! - color: eight vertical color bars, shifting one bar every eight frames
//! - infrared: scrolling gray checkerboard
//!
//! Timestamps count ticks of a 60 MHz device clock and wrap at `u32`.

use super::{
    CaptureDevice, CaptureFormat, DeviceResult, FrameSink, LedState, StreamKind, TelemetrySample,
};
use crate::config::SyntheticSettings;
use crate::constants::{accel, depth, frame, synthetic, tilt};
use crate::errors::DeviceError;
use crate::pipeline::ring::FrameBuffer;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace};

const COLOR_BARS: [[u8; 3]; 8] = [
    [255, 255, 255],
    [255, 255, 0],
    [0, 255, 255],
    [0, 255, 0],
    [255, 0, 255],
    [255, 0, 0],
    [0, 0, 255],
    [0, 0, 0],
];

/// Test-pattern device
pub struct SyntheticDevice {
    settings: SyntheticSettings,
    format: CaptureFormat,
    depth_running: bool,
    video_running: bool,
    video_buffer: Option<FrameBuffer>,
    depth_frame: Vec<u16>,
    /// Poll ticks delivered so far
    tick: u64,
    frame_period: Duration,
    next_due: Option<Instant>,
    tilt_degrees: i8,
    led: LedState,
    closed: bool,
}

impl SyntheticDevice {
    pub fn open(settings: SyntheticSettings, format: CaptureFormat) -> DeviceResult<Self> {
        if settings.fps == 0 {
            return Err(DeviceError::Stream("frame rate must be non-zero".into()));
        }
        info!(
            fps = settings.fps,
            frame_limit = ?settings.frame_limit,
            format = %format,
            "Opened synthetic device"
        );
        Ok(Self {
            settings,
            format,
            depth_running: false,
            video_running: false,
            video_buffer: None,
            depth_frame: vec![0; frame::PIXELS],
            tick: 0,
            frame_period: Duration::from_secs(1) / settings.fps,
            next_due: None,
            tilt_degrees: 0,
            led: LedState::Off,
            closed: false,
        })
    }

    pub fn led(&self) -> LedState {
        self.led
    }

    pub fn tilt_degrees(&self) -> i8 {
        self.tilt_degrees
    }

    pub fn format(&self) -> CaptureFormat {
        self.format
    }

    fn ensure_open(&self) -> DeviceResult<()> {
        if self.closed {
            Err(DeviceError::Closed)
        } else {
            Ok(())
        }
    }

    /// Device clock at the current tick
    fn timestamp(&self) -> u32 {
        (self.tick * synthetic::CLOCK_HZ / u64::from(self.settings.fps)) as u32
    }

    fn wait_for_next_frame(&mut self) {
        let now = Instant::now();
        let due = *self.next_due.get_or_insert(now);
        if due > now {
            std::thread::sleep(due - now);
        }
        self.next_due = Some(due + self.frame_period);
    }

    fn fill_depth(&mut self) {
        let shift = (self.tick as usize).wrapping_mul(8);
        let width = frame::WIDTH as usize;
        for (i, sample) in self.depth_frame.iter_mut().enumerate() {
            let (x, y) = (i % width, i / width);
            *sample = ((x + y + shift) % depth::RAW_VALUES) as u16;
        }
    }

    fn fill_video(format: CaptureFormat, tick: u64, buffer: &mut [u8]) {
        let width = frame::WIDTH as usize;
        match format {
            CaptureFormat::Infrared => {
                let offset = tick as usize;
                for (i, px) in buffer.iter_mut().take(frame::IR_BYTES).enumerate() {
                    let (x, y) = (i % width + offset, i / width);
                    *px = if (x / 32 + y / 32) % 2 == 0 { 200 } else { 40 };
                }
            }
            CaptureFormat::Color | CaptureFormat::Paired => {
                let bar_width = width / COLOR_BARS.len();
                let shift = (tick / 8) as usize;
                for (i, px) in buffer
                    .chunks_exact_mut(3)
                    .take(frame::PIXELS)
                    .enumerate()
                {
                    let bar = (i % width / bar_width + shift) % COLOR_BARS.len();
                    px.copy_from_slice(&COLOR_BARS[bar]);
                }
            }
        }
    }
}

impl CaptureDevice for SyntheticDevice {
    fn start_stream(&mut self, stream: StreamKind) -> DeviceResult<()> {
        self.ensure_open()?;
        match stream {
            StreamKind::Depth => self.depth_running = true,
            StreamKind::Video => {
                if self.video_buffer.is_none() {
                    return Err(DeviceError::Stream("no video buffer attached".into()));
                }
                self.video_running = true;
            }
        }
        debug!(stream = stream.name(), "Stream started");
        Ok(())
    }

    fn stop_stream(&mut self, stream: StreamKind) -> DeviceResult<()> {
        self.ensure_open()?;
        match stream {
            StreamKind::Depth => self.depth_running = false,
            StreamKind::Video => self.video_running = false,
        }
        debug!(stream = stream.name(), "Stream stopped");
        Ok(())
    }

    fn set_video_format(&mut self, format: CaptureFormat) -> DeviceResult<()> {
        self.ensure_open()?;
        if self.video_running {
            return Err(DeviceError::Stream(
                "video format can only change while stopped".into(),
            ));
        }
        self.format = format;
        Ok(())
    }

    fn attach_video_buffer(&mut self, buffer: FrameBuffer) {
        self.video_buffer = Some(buffer);
    }

    fn detach_video_buffer(&mut self) -> Option<FrameBuffer> {
        self.video_buffer.take()
    }

    fn poll_events(&mut self, sink: &mut dyn FrameSink) -> DeviceResult<usize> {
        self.ensure_open()?;
        if !self.depth_running && !self.video_running {
            return Err(DeviceError::Stream("no stream running".into()));
        }
        if self
            .settings
            .frame_limit
            .is_some_and(|limit| self.tick >= limit)
        {
            debug!(frames = self.tick, "Synthetic frame limit reached");
            return Err(DeviceError::EndOfStream);
        }

        self.wait_for_next_frame();
        let timestamp = self.timestamp();
        let mut fired = 0;

        if self.depth_running {
            self.fill_depth();
            sink.on_depth_frame(&self.depth_frame, timestamp);
            fired += 1;
        }

        if self.video_running
            && let Some(mut buffer) = self.video_buffer.take()
        {
            Self::fill_video(self.format, self.tick, &mut buffer);
            let bytes = self.format.frame_bytes().min(buffer.len());
            self.video_buffer = Some(sink.on_video_frame(buffer, bytes, timestamp));
            fired += 1;
        }

        trace!(tick = self.tick, fired, "Synthetic poll");
        self.tick += 1;
        Ok(fired)
    }

    fn set_tilt_degrees(&mut self, degrees: i8) -> DeviceResult<()> {
        self.ensure_open()?;
        if !(tilt::MIN_DEGREES..=tilt::MAX_DEGREES).contains(&degrees) {
            return Err(DeviceError::Control(format!(
                "tilt {}° outside motor range",
                degrees
            )));
        }
        self.tilt_degrees = degrees;
        Ok(())
    }

    fn set_led(&mut self, led: LedState) -> DeviceResult<()> {
        self.ensure_open()?;
        self.led = led;
        Ok(())
    }

    fn query_telemetry(&mut self) -> DeviceResult<TelemetrySample> {
        self.ensure_open()?;
        // Accelerometer state only updates while the device is streaming
        if !self.depth_running && !self.video_running {
            return Err(DeviceError::Telemetry("device is not streaming".into()));
        }
        let angle = f64::from(self.tilt_degrees).to_radians();
        let g = accel::COUNTS_PER_G;
        Ok(TelemetrySample {
            accelerometer: [0, (-g * angle.cos()) as i16, (g * angle.sin()) as i16],
            tilt_angle: self.tilt_degrees.saturating_mul(2),
            tilt_status: 0,
        })
    }

    fn close(&mut self) {
        if !self.closed {
            info!(frames = self.tick, "Closing synthetic device");
        }
        self.closed = true;
        self.depth_running = false;
        self.video_running = false;
    }
}
