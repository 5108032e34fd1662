// SPDX-License-Identifier: GPL-3.0-only

//! Display-thread side of the pipeline
//!
//! [`DisplayLoop`] holds the consumer's two leased buffers. Each tick it
//! trades them for the latest ready frames under the current format's
//! synchronization policy and passes them to a [`FrameRenderer`]. While a
//! format change is outstanding the tick is skipped without touching the
//! renderer.

use crate::backends::device::CaptureFormat;
use crate::constants::display::HEADLESS_LOG_EVERY;
use crate::errors::{AppError, AppResult, RingError};
use crate::pipeline::ring::{AcquireOutcome, ConsumerLeases, FrameBufferRing};
use std::io;
use std::sync::Arc;
use tracing::{debug, info};

/// Video frame handed to the renderer
#[derive(Debug, Clone, Copy)]
pub enum VideoFrame<'a> {
    /// Packed RGB, 3 bytes per pixel
    Rgb(&'a [u8]),
    /// 8-bit infrared, 1 byte per pixel
    Infrared(&'a [u8]),
}

impl VideoFrame<'_> {
    /// RGB of pixel `index`, gray-expanded for infrared
    pub fn pixel(&self, index: usize) -> [u8; 3] {
        match self {
            VideoFrame::Rgb(data) => data
                .get(index * 3..index * 3 + 3)
                .map(|p| [p[0], p[1], p[2]])
                .unwrap_or_default(),
            VideoFrame::Infrared(data) => {
                let gray = data.get(index).copied().unwrap_or(0);
                [gray, gray, gray]
            }
        }
    }
}

/// Everything the renderer gets for one tick
#[derive(Debug, Clone, Copy)]
pub struct PresentedFrame<'a> {
    /// Colorized depth, packed RGB
    pub depth: &'a [u8],
    /// Video frame, if the held frame was produced under `format`
    pub video: Option<VideoFrame<'a>>,
    /// The active capture format
    pub format: CaptureFormat,
    /// Whether depth changed since the previous tick
    pub depth_fresh: bool,
    /// Whether video changed since the previous tick
    pub video_fresh: bool,
}

/// Renderer seam
pub trait FrameRenderer {
    /// Show one frame pair
    fn present(&mut self, frame: &PresentedFrame<'_>) -> io::Result<()>;
}

/// What a tick did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Frames were handed to the renderer
    Presented { depth: bool, video: bool },
    /// A format change was outstanding; nothing consumed or presented
    Skipped,
    /// Capture has ended
    Closed,
}

/// Consumer loop state
pub struct DisplayLoop<R: FrameRenderer> {
    ring: Arc<FrameBufferRing>,
    leases: ConsumerLeases,
    renderer: R,
    presented: u64,
    skipped: u64,
}

impl<R: FrameRenderer> DisplayLoop<R> {
    pub fn new(ring: Arc<FrameBufferRing>, renderer: R) -> Result<Self, RingError> {
        let leases = ring.lease_consumers()?;
        Ok(Self {
            ring,
            leases,
            renderer,
            presented: 0,
            skipped: 0,
        })
    }

    /// Block for the next frames and present them
    pub fn tick(&mut self) -> AppResult<TickOutcome> {
        let outcome = self.ring.acquire_latest(&mut self.leases)?;
        self.handle(outcome)
    }

    /// Present frames if the policy is already satisfied; `None` otherwise
    pub fn try_tick(&mut self) -> AppResult<Option<TickOutcome>> {
        match self.ring.try_acquire_latest(&mut self.leases)? {
            Some(outcome) => self.handle(outcome).map(Some),
            None => Ok(None),
        }
    }

    /// Tick until capture ends, calling `between` after every tick
    ///
    /// Stops early when `between` returns `false`.
    pub fn run<F>(&mut self, mut between: F) -> AppResult<u64>
    where
        F: FnMut(&mut R) -> AppResult<bool>,
    {
        loop {
            if self.tick()? == TickOutcome::Closed {
                break;
            }
            if !between(&mut self.renderer)? {
                break;
            }
        }
        Ok(self.presented)
    }

    fn handle(&mut self, outcome: AcquireOutcome) -> AppResult<TickOutcome> {
        match outcome {
            AcquireOutcome::Closed => {
                debug!(presented = self.presented, "Display loop sees capture closed");
                Ok(TickOutcome::Closed)
            }
            AcquireOutcome::FormatChangePending => {
                self.skipped += 1;
                std::thread::yield_now();
                Ok(TickOutcome::Skipped)
            }
            AcquireOutcome::Frames {
                depth,
                video,
                format,
            } => {
                let video_frame = (self.leases.video().layout() == Some(format)).then(|| {
                    let data: &[u8] = self.leases.video();
                    if format.is_infrared() {
                        VideoFrame::Infrared(data)
                    } else {
                        VideoFrame::Rgb(data)
                    }
                });
                let frame = PresentedFrame {
                    depth: self.leases.depth(),
                    video: video_frame,
                    format,
                    depth_fresh: depth,
                    video_fresh: video,
                };
                self.renderer.present(&frame).map_err(AppError::Display)?;
                self.presented += 1;
                Ok(TickOutcome::Presented { depth, video })
            }
        }
    }

    pub fn presented(&self) -> u64 {
        self.presented
    }

    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn renderer_mut(&mut self) -> &mut R {
        &mut self.renderer
    }
}

/// Renderer for runs without a terminal: counts frames, logs progress
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    frames: u64,
    with_video: u64,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Frames that carried a video image
    pub fn frames_with_video(&self) -> u64 {
        self.with_video
    }
}

impl FrameRenderer for HeadlessRenderer {
    fn present(&mut self, frame: &PresentedFrame<'_>) -> io::Result<()> {
        self.frames += 1;
        if frame.video.is_some() {
            self.with_video += 1;
        }
        if self.frames % HEADLESS_LOG_EVERY == 0 {
            info!(frames = self.frames, format = %frame.format, "Displaying");
        }
        Ok(())
    }
}
