// SPDX-License-Identifier: GPL-3.0-only

//! Depth and video session recorder
//!
//! Captures a depth stream and a video stream (color or infrared) from a
//! capture device, shows both live and writes every frame plus tilt
//! telemetry to a session directory.
//!
//! # Architecture
//!
//! - [`backends`]: capture device abstraction and the synthetic device
//! - [`pipeline`]: frame ring, recorder, capture coordinator, display loop
//!   and input handling
//! - [`session`]: startup and join-before-release teardown
//! - [`terminal`]: half-block terminal viewer
//! - [`config`]: optional JSON configuration
//!
//! # Example
//!
//! ```ignore
//! // kinect-record ./session-01
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod errors;
pub mod pipeline;
pub mod session;
pub mod terminal;

pub use config::Config;
pub use errors::{AppError, AppResult};
