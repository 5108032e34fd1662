// SPDX-License-Identifier: GPL-3.0-only

//! Capture device abstraction
//!
//! A [`CaptureDevice`] is the driver capability set the recorder depends
//! on: stream start/stop, frame callbacks delivered during
//! [`CaptureDevice::poll_events`], telemetry, and motor/LED control.
//!
//! Frames are delivered through a [`FrameSink`], mirroring the driver's
//! callback model. The video stream uses lent buffers: the driver fills a
//! [`FrameBuffer`] it was given and must receive a spare one back before
//! the callback returns, which the sink's signature enforces.

pub mod frame_loop;
pub mod motor_control;
pub mod synthetic;

use crate::constants::{accel, frame};
use crate::errors::DeviceError;
use crate::pipeline::ring::{FrameBuffer, SyncPolicy};
use bytemuck::{Pod, Zeroable};
use serde::{Deserialize, Serialize};
use std::fmt;

pub use motor_control::{DeviceCommand, LedState, TiltStatus};

/// Result type for device operations
pub type DeviceResult<T> = Result<T, DeviceError>;

/// The two sensor streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StreamKind {
    Depth,
    Video,
}

impl StreamKind {
    pub const ALL: [StreamKind; 2] = [StreamKind::Depth, StreamKind::Video];

    pub fn name(&self) -> &'static str {
        match self {
            StreamKind::Depth => "depth",
            StreamKind::Video => "video",
        }
    }
}

/// Video stream capture format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CaptureFormat {
    /// 8-bit infrared, one byte per pixel
    Infrared,
    /// RGB color, advancing independently of depth
    Color,
    /// RGB color presented in lockstep with depth
    #[default]
    Paired,
}

impl CaptureFormat {
    /// Cycle order used by the format key
    pub const CYCLE: [CaptureFormat; 3] = [
        CaptureFormat::Infrared,
        CaptureFormat::Color,
        CaptureFormat::Paired,
    ];

    /// The format after this one in [`Self::CYCLE`]
    pub fn next(self) -> Self {
        match self {
            CaptureFormat::Infrared => CaptureFormat::Color,
            CaptureFormat::Color => CaptureFormat::Paired,
            CaptureFormat::Paired => CaptureFormat::Infrared,
        }
    }

    /// Consumer synchronization policy while this format is current
    pub fn sync_policy(self) -> SyncPolicy {
        match self {
            CaptureFormat::Paired => SyncPolicy::Lockstep,
            CaptureFormat::Infrared | CaptureFormat::Color => SyncPolicy::Decoupled,
        }
    }

    /// Bytes the driver writes into the video buffer per frame
    pub fn frame_bytes(self) -> usize {
        match self {
            CaptureFormat::Infrared => frame::IR_BYTES,
            CaptureFormat::Color | CaptureFormat::Paired => frame::RGB_BYTES,
        }
    }

    pub fn is_infrared(self) -> bool {
        self == CaptureFormat::Infrared
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            CaptureFormat::Infrared => "IR",
            CaptureFormat::Color => "color",
            CaptureFormat::Paired => "paired color+depth",
        }
    }
}

impl fmt::Display for CaptureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Raw orientation reading, laid out as the device reports it
///
/// Recorded verbatim as the payload of telemetry files (8 bytes).
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct TelemetrySample {
    /// Accelerometer counts on x, y, z
    pub accelerometer: [i16; 3],
    /// Tilt angle in half-degrees (device units)
    pub tilt_angle: i8,
    /// Raw tilt motor status code
    pub tilt_status: u8,
}

impl TelemetrySample {
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    /// Acceleration in m/s² on x, y, z
    pub fn mks_acceleration(&self) -> [f64; 3] {
        self.accelerometer
            .map(|counts| counts as f64 / accel::COUNTS_PER_G * accel::GRAVITY)
    }

    pub fn tilt_status(&self) -> TiltStatus {
        TiltStatus::from(self.tilt_status)
    }
}

/// Receiver of frame callbacks fired during [`CaptureDevice::poll_events`]
pub trait FrameSink {
    /// A depth frame completed; `raw` holds one 11-bit sample per pixel
    fn on_depth_frame(&mut self, raw: &[u16], timestamp: u32);

    /// A video frame completed in the lent buffer
    ///
    /// `bytes` is the number of valid bytes at the start of `filled`. The
    /// returned buffer is the one the driver fills next.
    fn on_video_frame(&mut self, filled: FrameBuffer, bytes: usize, timestamp: u32)
    -> FrameBuffer;
}

/// Driver capability set
pub trait CaptureDevice: Send {
    fn start_stream(&mut self, stream: StreamKind) -> DeviceResult<()>;

    fn stop_stream(&mut self, stream: StreamKind) -> DeviceResult<()>;

    /// Select the video mode; only valid while the video stream is stopped
    fn set_video_format(&mut self, format: CaptureFormat) -> DeviceResult<()>;

    /// Lend the buffer the driver fills with the next video frame
    fn attach_video_buffer(&mut self, buffer: FrameBuffer);

    /// Take back the currently lent video buffer
    fn detach_video_buffer(&mut self) -> Option<FrameBuffer>;

    /// Block until at least one callback fired or an error occurred
    ///
    /// Returns the number of callbacks fired. Any error means the device has
    /// nothing more to deliver.
    fn poll_events(&mut self, sink: &mut dyn FrameSink) -> DeviceResult<usize>;

    fn set_tilt_degrees(&mut self, degrees: i8) -> DeviceResult<()>;

    fn set_led(&mut self, led: LedState) -> DeviceResult<()>;

    fn query_telemetry(&mut self) -> DeviceResult<TelemetrySample>;

    /// Close the device and release the driver context
    fn close(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_cycle_visits_all_formats() {
        let mut format = CaptureFormat::Infrared;
        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(format);
            format = format.next();
        }
        assert_eq!(seen, CaptureFormat::CYCLE);
        assert_eq!(format, CaptureFormat::Infrared);
    }

    #[test]
    fn test_sync_policy_by_format() {
        assert_eq!(CaptureFormat::Paired.sync_policy(), SyncPolicy::Lockstep);
        assert_eq!(CaptureFormat::Color.sync_policy(), SyncPolicy::Decoupled);
        assert_eq!(CaptureFormat::Infrared.sync_policy(), SyncPolicy::Decoupled);
    }

    #[test]
    fn test_telemetry_layout() {
        let sample = TelemetrySample {
            accelerometer: [1, -2, 819],
            tilt_angle: -4,
            tilt_status: 4,
        };
        let bytes = sample.as_bytes();
        assert_eq!(bytes.len(), 8);
        assert_eq!(&bytes[0..2], &1i16.to_ne_bytes());
        assert_eq!(bytes[6], (-4i8) as u8);
        assert_eq!(sample.tilt_status(), TiltStatus::Moving);

        let mks = sample.mks_acceleration();
        assert!((mks[2] - accel::GRAVITY).abs() < 1e-9);
    }
}
