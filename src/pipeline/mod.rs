// SPDX-License-Identifier: GPL-3.0-only

//! Capture-to-display frame pipeline
//!
//! The capture thread runs a [`coordinator::CaptureCoordinator`], which
//! records every frame and publishes it into a shared
//! [`ring::FrameBufferRing`]. The display thread runs a
//! [`display::DisplayLoop`] that acquires the latest frames from the same
//! ring. User input reaches both sides through [`input::InputController`].

pub mod colorizer;
pub mod coordinator;
pub mod display;
pub mod input;
pub mod recorder;
pub mod ring;

pub use colorizer::DepthColorizer;
pub use coordinator::{CaptureCoordinator, CaptureEnd, CaptureReport};
pub use display::{DisplayLoop, FrameRenderer, HeadlessRenderer, PresentedFrame, TickOutcome};
pub use input::{Command, InputController, Key};
pub use recorder::{FrameRecorder, RecordKind, RecordingSession};
pub use ring::{AcquireOutcome, FrameBuffer, FrameBufferRing, SyncPolicy};
