// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the recorder
//!
//! Every failure is either absorbed as a normal end-of-stream signal (a
//! [`DeviceError`] returned from polling) or escalated to process
//! termination ([`StartupError`], [`RecordError`]).

use std::fmt;
use std::path::PathBuf;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug)]
pub enum AppError {
    /// Anything that failed before capture began
    Startup(StartupError),
    /// A frame or telemetry sample could not be persisted
    Record(RecordError),
    /// The buffer ring was used against its ownership protocol
    Ring(RingError),
    /// The device rejected a stream operation outside of polling
    Device(DeviceError),
    /// The renderer could not draw a frame
    Display(std::io::Error),
    /// The capture thread panicked before reporting
    CapturePanicked,
}

/// Failures that abort startup before any capture begins
#[derive(Debug)]
pub enum StartupError {
    /// Device could not be opened
    DeviceOpen(String),
    /// Output directory could not be created
    OutputDir(PathBuf, std::io::Error),
    /// Session manifest could not be opened
    Manifest(PathBuf, std::io::Error),
    /// Capture thread could not be spawned
    ThreadSpawn(std::io::Error),
    /// Config file could not be read or parsed
    Config(String),
    /// Terminal could not be put into raw mode
    Terminal(std::io::Error),
}

/// Per-record persistence failure (fatal)
#[derive(Debug)]
pub enum RecordError {
    /// Record file could not be created
    Open(PathBuf, std::io::Error),
    /// Record file could not be written completely
    Write(PathBuf, std::io::Error),
    /// Manifest line could not be appended
    Manifest(std::io::Error),
}

/// Driver-side errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    /// The device has no more events to deliver
    EndOfStream,
    /// The device was closed
    Closed,
    /// A stream operation was rejected
    Stream(String),
    /// Motor or indicator control failed
    Control(String),
    /// Telemetry could not be read
    Telemetry(String),
}

/// Buffer ownership protocol violations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RingError {
    /// The slot's memory is already lent out
    AlreadyLent(&'static str),
    /// A returned buffer does not belong to the expected slot
    ForeignBuffer(&'static str),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Startup(e) => write!(f, "Startup failed: {}", e),
            AppError::Record(e) => write!(f, "Recording failed: {}", e),
            AppError::Ring(e) => write!(f, "Buffer ring error: {}", e),
            AppError::Device(e) => write!(f, "Device error: {}", e),
            AppError::Display(e) => write!(f, "Display failed: {}", e),
            AppError::CapturePanicked => write!(f, "Capture thread panicked"),
        }
    }
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::DeviceOpen(msg) => write!(f, "could not open device: {}", msg),
            StartupError::OutputDir(path, e) => {
                write!(f, "cannot create output directory [{}]: {}", path.display(), e)
            }
            StartupError::Manifest(path, e) => {
                write!(f, "cannot open manifest [{}]: {}", path.display(), e)
            }
            StartupError::ThreadSpawn(e) => write!(f, "capture thread creation failed: {}", e),
            StartupError::Config(msg) => write!(f, "invalid configuration: {}", msg),
            StartupError::Terminal(e) => write!(f, "terminal setup failed: {}", e),
        }
    }
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordError::Open(path, e) => write!(f, "cannot open file [{}]: {}", path.display(), e),
            RecordError::Write(path, e) => {
                write!(f, "cannot write file [{}]: {}", path.display(), e)
            }
            RecordError::Manifest(e) => write!(f, "cannot append to manifest: {}", e),
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::EndOfStream => write!(f, "end of stream"),
            DeviceError::Closed => write!(f, "device closed"),
            DeviceError::Stream(msg) => write!(f, "stream error: {}", msg),
            DeviceError::Control(msg) => write!(f, "control error: {}", msg),
            DeviceError::Telemetry(msg) => write!(f, "telemetry error: {}", msg),
        }
    }
}

impl fmt::Display for RingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RingError::AlreadyLent(what) => write!(f, "{} slot is already lent out", what),
            RingError::ForeignBuffer(what) => {
                write!(f, "returned buffer does not belong to the {} slot", what)
            }
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for StartupError {}
impl std::error::Error for RecordError {}
impl std::error::Error for DeviceError {}
impl std::error::Error for RingError {}

// Conversions from sub-errors to AppError
impl From<StartupError> for AppError {
    fn from(err: StartupError) -> Self {
        AppError::Startup(err)
    }
}

impl From<RecordError> for AppError {
    fn from(err: RecordError) -> Self {
        AppError::Record(err)
    }
}

impl From<RingError> for AppError {
    fn from(err: RingError) -> Self {
        AppError::Ring(err)
    }
}

impl From<DeviceError> for AppError {
    fn from(err: DeviceError) -> Self {
        AppError::Device(err)
    }
}

impl AppError {
    /// Whether the failure happened before capture started
    pub fn is_startup(&self) -> bool {
        matches!(self, AppError::Startup(_))
    }
}
