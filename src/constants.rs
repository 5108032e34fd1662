// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use std::time::Duration;

/// Sensor frame geometry (medium resolution, shared by both streams)
pub mod frame {
    /// Frame width in pixels
    pub const WIDTH: u32 = 640;
    /// Frame height in pixels
    pub const HEIGHT: u32 = 480;
    /// Pixels per frame
    pub const PIXELS: usize = (WIDTH * HEIGHT) as usize;
    /// Bytes in one RGB frame (also the size of every video slot)
    pub const RGB_BYTES: usize = PIXELS * 3;
    /// Bytes in one 8-bit infrared frame
    pub const IR_BYTES: usize = PIXELS;
    /// Bytes in one raw 11-bit depth frame (stored as native-endian u16)
    pub const DEPTH_RAW_BYTES: usize = PIXELS * 2;
}

/// Raw depth sample range
pub mod depth {
    /// Number of distinct raw depth values (11-bit sensor)
    pub const RAW_VALUES: usize = 2048;
    /// Raw value the sensor reports when it has no reading for a pixel
    pub const NO_READING: u16 = 2047;
    /// Max sample value written into recorded depth headers
    pub const RECORDED_MAX_VALUE: u32 = 65535;
}

/// Tilt motor limits (in degrees)
pub mod tilt {
    /// Lowest tilt accepted from the input controller
    pub const MIN_DEGREES: i8 = -30;
    /// Highest tilt accepted from the input controller
    pub const MAX_DEGREES: i8 = 30;
}

/// Accelerometer scaling for telemetry conversion
pub mod accel {
    /// Raw accelerometer counts per 1 g
    pub const COUNTS_PER_G: f64 = 819.0;
    /// Standard gravity in m/s²
    pub const GRAVITY: f64 = 9.80665;
}

/// Session layout on disk
pub mod session {
    /// Manifest file name inside the session directory
    pub const MANIFEST_FILE: &str = "INDEX.txt";
    /// Environment variable naming an optional JSON config file
    pub const CONFIG_ENV: &str = "KINECT_RECORD_CONFIG";
}

/// Timing for the terminal viewer
pub mod display {
    use super::Duration;

    /// How long the terminal viewer polls for keys between frames
    pub const INPUT_POLL: Duration = Duration::from_millis(1);
    /// Presented frames between headless progress log lines
    pub const HEADLESS_LOG_EVERY: u64 = 300;
}

/// Bound of the input → capture command channel
pub const COMMAND_QUEUE_DEPTH: usize = 16;

/// Synthetic device defaults
pub mod synthetic {
    /// Default frame rate of both synthetic streams
    pub const DEFAULT_FPS: u32 = 30;
    /// Device clock ticks per second (timestamps wrap at u32)
    pub const CLOCK_HZ: u64 = 60_000_000;
}
