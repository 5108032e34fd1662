// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the on-disk session format

use kinect_record::backends::device::TelemetrySample;
use kinect_record::constants::frame;
use kinect_record::constants::session::MANIFEST_FILE;
use kinect_record::errors::{RecordError, StartupError};
use kinect_record::pipeline::recorder::{FrameRecorder, RecordKind, RecordingSession, WallClock};

/// Clock that advances one millisecond per reading
struct SteppingClock(i64);

impl WallClock for SteppingClock {
    fn now_micros(&mut self) -> i64 {
        self.0 += 1000;
        self.0
    }
}

fn recorder(dir: &std::path::Path) -> FrameRecorder {
    let session = RecordingSession::open(dir).unwrap();
    FrameRecorder::with_clock(session, SteppingClock(1_600_000_000_000_000))
}

#[test]
fn test_depth_file_layout() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = recorder(dir.path());

    let raw: Vec<u16> = (0..frame::PIXELS).map(|i| (i % 2048) as u16).collect();
    let path = recorder
        .record(RecordKind::Depth, 4242, bytemuck::cast_slice(&raw))
        .unwrap();

    let name = path.file_name().unwrap().to_str().unwrap();
    assert_eq!(name, "d-1600000000.001000-4242.pgm");

    let bytes = std::fs::read(&path).unwrap();
    let header = b"P5\n640 480 65535\n";
    assert_eq!(&bytes[..header.len()], header);
    assert_eq!(bytes.len(), header.len() + frame::DEPTH_RAW_BYTES);
    let payload: &[u8] = bytemuck::cast_slice(&raw);
    assert_eq!(&bytes[header.len()..], payload);
}

#[test]
fn test_color_and_infrared_headers() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = recorder(dir.path());

    let color = recorder
        .record(RecordKind::Color, 1, &vec![10; frame::RGB_BYTES])
        .unwrap();
    let ir = recorder
        .record(RecordKind::Infrared, 2, &vec![20; frame::IR_BYTES])
        .unwrap();

    let color_bytes = std::fs::read(&color).unwrap();
    assert!(color_bytes.starts_with(b"P6\n640 480 255\n"));
    assert!(color.extension().unwrap() == "ppm");

    let ir_bytes = std::fs::read(&ir).unwrap();
    assert!(ir_bytes.starts_with(b"P5\n640 480 255\n"));
    assert!(ir.extension().unwrap() == "pgm");
    assert!(ir.file_name().unwrap().to_str().unwrap().starts_with("r-"));
}

#[test]
fn test_telemetry_is_raw_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = recorder(dir.path());
    let sample = TelemetrySample {
        accelerometer: [12, -800, 40],
        tilt_angle: 10,
        tilt_status: 0,
    };

    let path = recorder
        .record(RecordKind::Telemetry, 77, sample.as_bytes())
        .unwrap();

    assert_eq!(std::fs::read(&path).unwrap(), sample.as_bytes());
    assert!(path.to_str().unwrap().ends_with("-77.dump"));
}

#[test]
fn test_manifest_lists_records_in_call_order() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = recorder(dir.path());

    let kinds = [
        RecordKind::Depth,
        RecordKind::Color,
        RecordKind::Telemetry,
        RecordKind::Depth,
    ];
    let written: Vec<String> = kinds
        .iter()
        .enumerate()
        .map(|(i, &kind)| {
            let path = recorder.record(kind, i as u32, &[0u8; 8]).unwrap();
            path.file_name().unwrap().to_str().unwrap().to_string()
        })
        .collect();

    // Flushed per line, readable while the recorder is still open
    let manifest = std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap();
    let listed: Vec<&str> = manifest.lines().collect();
    assert_eq!(listed, written);
    assert_eq!(recorder.counts().total(), 4);
}

#[test]
fn test_reopening_starts_a_fresh_manifest() {
    let dir = tempfile::tempdir().unwrap();
    {
        let mut recorder = recorder(dir.path());
        recorder.record(RecordKind::Depth, 1, &[]).unwrap();
    }
    let _session = RecordingSession::open(dir.path()).unwrap();
    let manifest = std::fs::read_to_string(dir.path().join(MANIFEST_FILE)).unwrap();
    assert!(manifest.is_empty());
}

#[test]
fn test_write_failure_is_reported() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("gone");
    std::fs::create_dir(&dir).unwrap();
    let mut recorder = recorder(&dir);
    std::fs::remove_dir_all(&dir).unwrap();

    let err = recorder.record(RecordKind::Color, 5, &[1, 2, 3]).unwrap_err();
    assert!(matches!(err, RecordError::Open(..)));
    assert_eq!(recorder.counts().total(), 0);
}

#[test]
fn test_manifest_open_failure_is_startup_error() {
    let root = tempfile::tempdir().unwrap();
    let missing = root.path().join("does-not-exist");
    let result = RecordingSession::open(&missing);
    assert!(matches!(result, Err(StartupError::Manifest(..))));
}

#[test]
fn test_records_land_in_session_dir() {
    let dir = tempfile::tempdir().unwrap();
    let mut recorder = recorder(dir.path());
    assert_eq!(recorder.session_dir(), dir.path());

    let path = recorder.record(RecordKind::Depth, 3, &[0; 4]).unwrap();
    assert_eq!(path.parent(), Some(recorder.session_dir()));
}
