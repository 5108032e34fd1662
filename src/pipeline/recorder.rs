// SPDX-License-Identifier: GPL-3.0-only

//! Synchronous on-disk session log
//!
//! Every frame and telemetry sample becomes one file in the session
//! directory, and its bare name is appended to `INDEX.txt` in capture order.
//! Writes happen on the capture thread with no queue in between, so the
//! manifest order is exactly the order frames arrived in. Any failure is
//! returned as a [`RecordError`] and must end the session.

use crate::constants::{depth, frame, session};
use crate::errors::{RecordError, StartupError};
use std::fs::File;
use std::io::{LineWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// What a record holds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordKind {
    /// Raw 11-bit depth frame (u16 per pixel)
    Depth,
    /// Raw RGB video frame
    Color,
    /// Raw 8-bit infrared video frame
    Infrared,
    /// Raw orientation telemetry sample
    Telemetry,
}

impl RecordKind {
    /// Filename prefix
    pub fn prefix(&self) -> char {
        match self {
            RecordKind::Depth => 'd',
            RecordKind::Color | RecordKind::Infrared => 'r',
            RecordKind::Telemetry => 'a',
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            RecordKind::Depth | RecordKind::Infrared => "pgm",
            RecordKind::Color => "ppm",
            RecordKind::Telemetry => "dump",
        }
    }

    /// Two-line ASCII image header, `None` for telemetry
    pub fn header(&self) -> Option<String> {
        let (magic, max) = match self {
            RecordKind::Depth => ("P5", depth::RECORDED_MAX_VALUE),
            RecordKind::Color => ("P6", 255),
            RecordKind::Infrared => ("P5", 255),
            RecordKind::Telemetry => return None,
        };
        Some(format!(
            "{}\n{} {} {}\n",
            magic,
            frame::WIDTH,
            frame::HEIGHT,
            max
        ))
    }

    /// Whether this kind is a camera frame (as opposed to telemetry)
    pub fn is_frame(&self) -> bool {
        !matches!(self, RecordKind::Telemetry)
    }
}

/// Source of wall-clock time in microseconds since the Unix epoch
pub trait WallClock: Send {
    fn now_micros(&mut self) -> i64;
}

/// The system clock
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl WallClock for SystemClock {
    fn now_micros(&mut self) -> i64 {
        chrono::Utc::now().timestamp_micros()
    }
}

/// One pending write
#[derive(Debug, Clone, Copy)]
pub struct DumpRecord<'a> {
    pub kind: RecordKind,
    pub wall_micros: i64,
    pub device_timestamp: u32,
    pub payload: &'a [u8],
}

impl DumpRecord<'_> {
    /// `{prefix}-{seconds}.{micros}-{device_timestamp}.{ext}`
    pub fn file_name(&self) -> String {
        format!(
            "{}-{}.{:06}-{}.{}",
            self.kind.prefix(),
            self.wall_micros.div_euclid(1_000_000),
            self.wall_micros.rem_euclid(1_000_000),
            self.device_timestamp,
            self.kind.extension()
        )
    }

    fn write_to(&self, path: &Path) -> Result<(), RecordError> {
        let mut file = File::create(path).map_err(|e| RecordError::Open(path.to_path_buf(), e))?;
        let write = |file: &mut File| -> std::io::Result<()> {
            if let Some(header) = self.kind.header() {
                file.write_all(header.as_bytes())?;
            }
            file.write_all(self.payload)?;
            file.flush()
        };
        write(&mut file).map_err(|e| RecordError::Write(path.to_path_buf(), e))
    }
}

/// Session directory plus its open manifest
pub struct RecordingSession {
    dir: PathBuf,
    manifest: LineWriter<File>,
}

impl RecordingSession {
    /// Start a fresh manifest in an existing directory
    pub fn open(dir: &Path) -> Result<Self, StartupError> {
        let path = dir.join(session::MANIFEST_FILE);
        let file = File::create(&path).map_err(|e| StartupError::Manifest(path.clone(), e))?;
        info!(path = %path.display(), "Opened session manifest");
        Ok(Self {
            dir: dir.to_path_buf(),
            manifest: LineWriter::new(file),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn append(&mut self, file_name: &str) -> Result<(), RecordError> {
        // LineWriter flushes on the newline
        writeln!(self.manifest, "{}", file_name).map_err(RecordError::Manifest)
    }
}

/// Records written so far, per kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecordCounts {
    pub depth: u64,
    pub color: u64,
    pub infrared: u64,
    pub telemetry: u64,
}

impl RecordCounts {
    pub fn total(&self) -> u64 {
        self.depth + self.color + self.infrared + self.telemetry
    }

    fn bump(&mut self, kind: RecordKind) {
        match kind {
            RecordKind::Depth => self.depth += 1,
            RecordKind::Color => self.color += 1,
            RecordKind::Infrared => self.infrared += 1,
            RecordKind::Telemetry => self.telemetry += 1,
        }
    }
}

/// Writes records into a [`RecordingSession`]
pub struct FrameRecorder {
    session: RecordingSession,
    clock: Box<dyn WallClock>,
    last_micros: Option<i64>,
    last_frame_timestamp: Option<u32>,
    counts: RecordCounts,
}

impl FrameRecorder {
    pub fn new(session: RecordingSession) -> Self {
        Self::with_clock(session, SystemClock)
    }

    pub fn with_clock(session: RecordingSession, clock: impl WallClock + 'static) -> Self {
        Self {
            session,
            clock: Box::new(clock),
            last_micros: None,
            last_frame_timestamp: None,
            counts: RecordCounts::default(),
        }
    }

    /// Persist one record and list it in the manifest
    ///
    /// Returns the path written.
    pub fn record(
        &mut self,
        kind: RecordKind,
        device_timestamp: u32,
        payload: &[u8],
    ) -> Result<PathBuf, RecordError> {
        let record = DumpRecord {
            kind,
            wall_micros: self.next_micros(),
            device_timestamp,
            payload,
        };
        let file_name = record.file_name();

        self.session.append(&file_name)?;
        let path = self.session.dir.join(&file_name);
        record.write_to(&path)?;

        debug!(path = %path.display(), bytes = payload.len(), "Recorded");
        self.counts.bump(kind);
        if kind.is_frame() {
            self.last_frame_timestamp = Some(device_timestamp);
        }
        Ok(path)
    }

    /// Wall-clock time, nudged forward so no two records share a name
    fn next_micros(&mut self) -> i64 {
        let now = self.clock.now_micros();
        let micros = match self.last_micros {
            Some(last) if now <= last => last + 1,
            _ => now,
        };
        self.last_micros = Some(micros);
        micros
    }

    /// Device timestamp of the most recently recorded frame
    pub fn last_frame_timestamp(&self) -> Option<u32> {
        self.last_frame_timestamp
    }

    pub fn counts(&self) -> RecordCounts {
        self.counts
    }

    pub fn session_dir(&self) -> &Path {
        self.session.dir()
    }
}
