// SPDX-License-Identifier: GPL-3.0-only

//! Backend abstraction layer for capture devices
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │               Pipeline Layer                │
//! └────────────────────┬────────────────────────┘
//!                      │ CaptureDevice / FrameSink
//! ┌────────────────────┴────────────────────────┐
//! │               Backend Layer                 │
//! │  ┌──────────────────┐  ┌─────────────────┐  │
//! │  │ Synthetic device │  │ Motor / LED     │  │
//! │  │ (test patterns)  │  │ command types   │  │
//! │  └──────────────────┘  └─────────────────┘  │
//! │  ┌───────────────────────────────────────┐  │
//! │  │ Capture thread lifecycle (frame_loop) │  │
//! │  └───────────────────────────────────────┘  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`device`]: driver capability traits, formats and telemetry, plus the
//!   synthetic device

pub mod device;
