// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the capture-to-display pipeline

use kinect_record::backends::device::frame_loop::{CaptureLoopController, StopSignal};
use kinect_record::backends::device::synthetic::SyntheticDevice;
use kinect_record::backends::device::{
    CaptureDevice, CaptureFormat, DeviceResult, FrameSink, LedState, StreamKind, TelemetrySample,
};
use kinect_record::config::{Config, SyntheticSettings};
use kinect_record::constants::frame;
use kinect_record::constants::session::MANIFEST_FILE;
use kinect_record::errors::{AppError, DeviceError};
use kinect_record::pipeline::coordinator::{CaptureCoordinator, CaptureEnd, CaptureReport};
use kinect_record::pipeline::display::{FrameRenderer, PresentedFrame};
use kinect_record::pipeline::recorder::{FrameRecorder, RecordingSession};
use kinect_record::pipeline::ring::{AcquireOutcome, FrameBuffer, FrameBufferRing};
use kinect_record::pipeline::{DisplayLoop, TickOutcome};
use kinect_record::session::{self, Frontend};
use std::collections::{HashSet, VecDeque};
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc;
use std::time::Duration;

/// One frame callback fired during a scripted poll
#[derive(Debug, Clone, Copy)]
enum Fire {
    Depth,
    Video,
}

/// Device replaying a fixed list of polls, then reporting end-of-stream
struct ScriptedDevice {
    polls: VecDeque<Vec<Fire>>,
    format: CaptureFormat,
    video_buffer: Option<FrameBuffer>,
    timestamp: u32,
    /// Keep answering polls with no frames once the script runs out
    idle_when_done: bool,
    telemetry_fails: bool,
}

impl ScriptedDevice {
    fn new(polls: Vec<Vec<Fire>>) -> Self {
        Self {
            polls: polls.into(),
            format: CaptureFormat::Paired,
            video_buffer: None,
            timestamp: 0,
            idle_when_done: false,
            telemetry_fails: false,
        }
    }
}

impl CaptureDevice for ScriptedDevice {
    fn start_stream(&mut self, _stream: StreamKind) -> DeviceResult<()> {
        Ok(())
    }

    fn stop_stream(&mut self, _stream: StreamKind) -> DeviceResult<()> {
        Ok(())
    }

    fn set_video_format(&mut self, format: CaptureFormat) -> DeviceResult<()> {
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
        let fires = match self.polls.pop_front() {
            Some(fires) => fires,
            None if self.idle_when_done => {
                std::thread::sleep(Duration::from_millis(1));
                Vec::new()
            }
            None => return Err(DeviceError::EndOfStream),
        };
        for fire in &fires {
            self.timestamp += 1000;
            match fire {
                Fire::Depth => {
                    let raw = vec![(self.timestamp % 2048) as u16; frame::PIXELS];
                    sink.on_depth_frame(&raw, self.timestamp);
                }
                Fire::Video => {
                    let mut buffer = self.video_buffer.take().expect("video buffer attached");
                    buffer.fill(self.timestamp as u8);
                    let bytes = self.format.frame_bytes();
                    self.video_buffer = Some(sink.on_video_frame(buffer, bytes, self.timestamp));
                }
            }
        }
        Ok(fires.len())
    }

    fn set_tilt_degrees(&mut self, _degrees: i8) -> DeviceResult<()> {
        Ok(())
    }

    fn set_led(&mut self, _led: LedState) -> DeviceResult<()> {
        Ok(())
    }

    fn query_telemetry(&mut self) -> DeviceResult<TelemetrySample> {
        if self.telemetry_fails {
            return Err(DeviceError::Telemetry("accelerometer unplugged".into()));
        }
        Ok(TelemetrySample {
            accelerometer: [0, -819, 0],
            tilt_angle: 0,
            tilt_status: 0,
        })
    }

    fn close(&mut self) {}
}

/// Renderer that only counts uploads
#[derive(Default)]
struct CountingRenderer {
    uploads: u64,
}

impl FrameRenderer for CountingRenderer {
    fn present(&mut self, _frame: &PresentedFrame<'_>) -> std::io::Result<()> {
        self.uploads += 1;
        Ok(())
    }
}

fn manifest_lines(dir: &Path) -> Vec<String> {
    std::fs::read_to_string(dir.join(MANIFEST_FILE))
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn publish_video(ring: &FrameBufferRing, lent: FrameBuffer, value: u8) -> FrameBuffer {
    let mut lent = lent;
    lent.fill(value);
    ring.publish_video(lent, ring.format().current).unwrap()
}

#[test]
fn test_lockstep_presents_only_complete_pairs() {
    let ring = FrameBufferRing::new(4, 4, CaptureFormat::Paired);
    let mut leases = ring.lease_consumers().unwrap();
    let mut lent = ring.lend_producing(StreamKind::Video).unwrap();

    for round in 1..=2u8 {
        ring.produce_depth(|buf| buf.fill(round)).unwrap();
        assert_eq!(
            ring.try_acquire_latest(&mut leases).unwrap(),
            None,
            "Depth alone must not satisfy lockstep"
        );

        lent = publish_video(&ring, lent, round + 100);
        let outcome = ring.try_acquire_latest(&mut leases).unwrap();
        assert_eq!(
            outcome,
            Some(AcquireOutcome::Frames {
                depth: true,
                video: true,
                format: CaptureFormat::Paired,
            })
        );
        assert!(leases.depth().iter().all(|&b| b == round));
        assert!(leases.video().iter().all(|&b| b == round + 100));
    }
}

#[test]
fn test_roles_stay_a_permutation_and_buffers_never_move() {
    let ring = FrameBufferRing::new(8, 8, CaptureFormat::Color);
    let initial: Vec<_> = StreamKind::ALL
        .iter()
        .map(|&kind| ring.snapshot(kind).slot_ids())
        .collect();

    let mut leases = ring.lease_consumers().unwrap();
    let mut lent = ring.lend_producing(StreamKind::Video).unwrap();
    let mut addresses = HashSet::new();

    // Deterministic pseudo-random interleaving
    let mut seed = 0x2545_f491_u32;
    for step in 0..500u32 {
        seed ^= seed << 13;
        seed ^= seed >> 17;
        seed ^= seed << 5;
        match seed % 3 {
            0 => ring.produce_depth(|buf| buf.fill(step as u8)).unwrap(),
            1 => {
                addresses.insert(lent.as_ptr() as usize);
                lent = publish_video(&ring, lent, step as u8);
            }
            _ => {
                ring.try_acquire_latest(&mut leases).unwrap();
                addresses.insert(leases.video().as_ptr() as usize);
            }
        }

        for (i, &kind) in StreamKind::ALL.iter().enumerate() {
            let snap = ring.snapshot(kind);
            assert_eq!(snap.slot_ids(), initial[i], "roles must cover every slot once");
        }
    }

    assert!(addresses.len() <= 3, "video memory is only ever the three slots");
}

#[test]
fn test_concurrent_consumer_never_sees_torn_frames() {
    const FRAMES: u32 = 400;
    let ring = Arc::new(FrameBufferRing::new(4096, 16, CaptureFormat::Color));
    let mut leases = ring.lease_consumers().unwrap();

    let producer = {
        let ring = Arc::clone(&ring);
        std::thread::spawn(move || {
            for n in 1..=FRAMES {
                ring.produce_depth(|buf| buf.fill((n % 251) as u8)).unwrap();
            }
            ring.close();
        })
    };

    let mut seen = 0;
    loop {
        match ring.acquire_latest(&mut leases).unwrap() {
            AcquireOutcome::Closed => break,
            AcquireOutcome::Frames { depth: true, .. } => {
                let first = leases.depth()[0];
                assert!(leases.depth().iter().all(|&b| b == first), "torn frame");
                seen += 1;
            }
            _ => {}
        }
    }
    producer.join().unwrap();

    let snap = ring.snapshot(StreamKind::Depth);
    assert_eq!(snap.published, u64::from(FRAMES));
    assert_eq!(snap.consumed, seen);
}

#[test]
fn test_decoupled_format_change_blocks_uploads_until_confirmed() {
    let ring = Arc::new(FrameBufferRing::new(4, 4, CaptureFormat::Color));
    let mut display = DisplayLoop::new(Arc::clone(&ring), CountingRenderer::default()).unwrap();

    ring.produce_depth(|_| {}).unwrap();
    assert!(matches!(
        display.try_tick().unwrap(),
        Some(TickOutcome::Presented { .. })
    ));
    assert_eq!(display.renderer().uploads, 1);

    ring.request_format(CaptureFormat::Infrared);
    ring.produce_depth(|_| {}).unwrap();
    for _ in 0..3 {
        assert_eq!(display.try_tick().unwrap(), Some(TickOutcome::Skipped));
    }
    assert_eq!(display.renderer().uploads, 1, "no uploads while switching");
    assert_eq!(ring.snapshot(StreamKind::Depth).pending, 1);

    ring.confirm_format(CaptureFormat::Infrared);
    assert!(matches!(
        display.try_tick().unwrap(),
        Some(TickOutcome::Presented { depth: true, .. })
    ));
    assert_eq!(display.renderer().uploads, 2);
}

#[test]
fn test_confirm_discards_stale_video() {
    let ring = FrameBufferRing::new(4, 4, CaptureFormat::Color);
    let lent = ring.lend_producing(StreamKind::Video).unwrap();
    let _spare = publish_video(&ring, lent, 1);
    assert_eq!(ring.snapshot(StreamKind::Video).pending, 1);

    ring.request_format(CaptureFormat::Infrared);
    ring.confirm_format(CaptureFormat::Infrared);
    assert_eq!(ring.snapshot(StreamKind::Video).pending, 0);
}

fn run_device(dir: &Path, device: ScriptedDevice) -> kinect_record::AppResult<CaptureReport> {
    let ring = Arc::new(FrameBufferRing::for_sensor(CaptureFormat::Paired));
    let recorder = FrameRecorder::new(RecordingSession::open(dir).unwrap());
    let (_tx, rx) = mpsc::sync_channel(1);
    let coordinator = CaptureCoordinator::new(device, ring, recorder, rx, 1);
    coordinator.run(&StopSignal::new())
}

fn run_scripted(dir: &Path, polls: Vec<Vec<Fire>>) -> kinect_record::AppResult<CaptureEnd> {
    run_device(dir, ScriptedDevice::new(polls)).map(|report| report.end)
}

#[test]
fn test_manifest_counts_every_record() {
    let dir = tempfile::tempdir().unwrap();
    let polls = vec![
        vec![Fire::Depth, Fire::Video],
        vec![Fire::Depth],
        vec![Fire::Video, Fire::Depth],
        vec![],
    ];
    let end = run_scripted(dir.path(), polls).unwrap();
    assert_eq!(end, CaptureEnd::EndOfStream(DeviceError::EndOfStream));

    let lines = manifest_lines(dir.path());
    let depth = lines.iter().filter(|l| l.starts_with("d-")).count();
    let video = lines.iter().filter(|l| l.starts_with("r-")).count();
    let telemetry = lines.iter().filter(|l| l.starts_with("a-")).count();
    assert_eq!(depth, 3);
    assert_eq!(video, 2);
    // One telemetry sample per successful poll once a frame exists
    assert_eq!(telemetry, 4);
    assert_eq!(lines.len(), depth + video + telemetry);

    let distinct: HashSet<_> = lines.iter().collect();
    assert_eq!(distinct.len(), lines.len(), "filenames must be distinct");
    for line in &lines {
        assert!(dir.path().join(line).is_file(), "{} listed but missing", line);
    }
}

#[test]
fn test_telemetry_tagged_with_last_frame_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    run_scripted(dir.path(), vec![vec![Fire::Depth, Fire::Video]]).unwrap();

    let lines = manifest_lines(dir.path());
    assert_eq!(lines.len(), 3);
    assert!(lines[1].ends_with("-2000.ppm"));
    assert!(lines[2].starts_with("a-") && lines[2].ends_with("-2000.dump"));
}

#[test]
fn test_session_without_frames_records_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let end = run_scripted(dir.path(), vec![vec![], vec![]]).unwrap();
    assert_eq!(end, CaptureEnd::EndOfStream(DeviceError::EndOfStream));
    assert!(manifest_lines(dir.path()).is_empty());
}

#[test]
fn test_record_failure_stops_capture() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("session");
    std::fs::create_dir(&dir).unwrap();

    let ring = Arc::new(FrameBufferRing::for_sensor(CaptureFormat::Paired));
    let recorder = FrameRecorder::new(RecordingSession::open(&dir).unwrap());
    let (_tx, rx) = mpsc::sync_channel(1);
    let polls = vec![vec![Fire::Depth], vec![Fire::Depth], vec![Fire::Depth]];
    let coordinator = CaptureCoordinator::new(
        ScriptedDevice::new(polls),
        Arc::clone(&ring),
        recorder,
        rx,
        1,
    );

    // Files can no longer be created in the session directory
    std::fs::remove_dir_all(&dir).unwrap();

    let result = coordinator.run(&StopSignal::new());
    assert!(matches!(result, Err(AppError::Record(_))));
    assert!(ring.is_closed());
    assert_eq!(ring.snapshot(StreamKind::Depth).published, 0);
}

#[test]
fn test_headless_session_runs_to_end_of_stream() {
    let dir = tempfile::tempdir().unwrap();
    let polls = (0..5).map(|_| vec![Fire::Depth, Fire::Video]).collect();
    let config = Config {
        terminal_display: false,
        ..Config::default()
    };

    let summary = session::run_with_device(
        ScriptedDevice::new(polls),
        dir.path(),
        &config,
        Frontend::Headless,
        StopSignal::new(),
    )
    .unwrap();

    assert_eq!(
        summary.capture.end,
        CaptureEnd::EndOfStream(DeviceError::EndOfStream)
    );
    assert_eq!(summary.capture.records.depth, 5);
    assert_eq!(summary.capture.records.color, 5);
    assert_eq!(manifest_lines(dir.path()).len(), 15);
}

#[test]
fn test_session_creates_missing_directory() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("nested").join("take-1");
    let mut config = Config {
        terminal_display: false,
        ..Config::default()
    };
    config.synthetic.fps = 500;
    config.synthetic.frame_limit = Some(2);

    let summary = session::record(&dir, &config, Frontend::Headless, StopSignal::new()).unwrap();

    assert!(dir.join(MANIFEST_FILE).is_file());
    assert_eq!(summary.capture.records.depth, 2);
}

#[test]
fn test_telemetry_failure_ends_stream() {
    let dir = tempfile::tempdir().unwrap();
    let polls = vec![vec![Fire::Depth], vec![Fire::Depth], vec![Fire::Depth]];
    let mut device = ScriptedDevice::new(polls);
    device.telemetry_fails = true;

    let report = run_device(dir.path(), device).unwrap();

    assert!(matches!(
        report.end,
        CaptureEnd::EndOfStream(DeviceError::Telemetry(_))
    ));
    assert_eq!(report.polls, 1);
    assert_eq!(report.records.depth, 1);
    assert_eq!(report.records.telemetry, 0);
    assert_eq!(manifest_lines(dir.path()).len(), 1);
}

fn synthetic(format: CaptureFormat) -> SyntheticDevice {
    let settings = SyntheticSettings {
        fps: 200,
        frame_limit: None,
    };
    SyntheticDevice::open(settings, format).unwrap()
}

fn stop_after(stop: &StopSignal, delay: Duration) -> std::thread::JoinHandle<()> {
    let stop = stop.clone();
    std::thread::spawn(move || {
        std::thread::sleep(delay);
        stop.request();
    })
}

#[test]
fn test_stop_signal_mid_run_releases_everything() {
    let dir = tempfile::tempdir().unwrap();
    let ring = Arc::new(FrameBufferRing::for_sensor(CaptureFormat::Paired));
    let recorder = FrameRecorder::new(RecordingSession::open(dir.path()).unwrap());
    let (_tx, rx) = mpsc::sync_channel(1);
    let coordinator = CaptureCoordinator::new(
        synthetic(CaptureFormat::Paired),
        Arc::clone(&ring),
        recorder,
        rx,
        1,
    );
    let mut display = DisplayLoop::new(Arc::clone(&ring), CountingRenderer::default()).unwrap();

    let stop = StopSignal::new();
    let mut capture =
        CaptureLoopController::start("capture", stop.clone(), move |stop| coordinator.run(&stop))
            .unwrap();
    let stopper = stop_after(&stop, Duration::from_millis(100));

    let presented = display.run(|_| Ok(true)).unwrap();
    stopper.join().unwrap();
    let report = capture.join().unwrap().unwrap();

    assert_eq!(report.end, CaptureEnd::Stopped);
    assert!(presented > 0, "frames flowed before the stop");
    assert!(ring.is_closed());
    for kind in StreamKind::ALL {
        let snap = ring.snapshot(kind);
        assert_eq!(
            snap.lent,
            vec![snap.consuming],
            "only the display's lease may still be out"
        );
    }
}

#[test]
fn test_headless_session_returns_on_stop_signal() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        terminal_display: false,
        ..Config::default()
    };
    let stop = StopSignal::new();
    let stopper = stop_after(&stop, Duration::from_millis(100));

    let summary = session::run_with_device(
        synthetic(CaptureFormat::Paired),
        dir.path(),
        &config,
        Frontend::Headless,
        stop,
    )
    .unwrap();
    stopper.join().unwrap();

    assert_eq!(summary.capture.end, CaptureEnd::Stopped);
    assert!(summary.capture.records.depth > 0);
    assert_eq!(
        manifest_lines(dir.path()).len() as u64,
        summary.capture.records.total()
    );
}

#[test]
fn test_lockstep_waiter_wakes_once_switch_is_confirmed() {
    let dir = tempfile::tempdir().unwrap();
    let ring = Arc::new(FrameBufferRing::for_sensor(CaptureFormat::Paired));
    let mut leases = ring.lease_consumers().unwrap();
    let waiter = {
        let ring = Arc::clone(&ring);
        std::thread::spawn(move || ring.acquire_latest(&mut leases).unwrap())
    };

    std::thread::sleep(Duration::from_millis(50));
    ring.request_format(CaptureFormat::Infrared);
    std::thread::sleep(Duration::from_millis(20));
    assert!(!waiter.is_finished(), "a request alone does not satisfy lockstep");

    // One depth frame under the paired layout, then the switch
    let mut device = ScriptedDevice::new(vec![vec![Fire::Depth]]);
    device.idle_when_done = true;
    let recorder = FrameRecorder::new(RecordingSession::open(dir.path()).unwrap());
    let (_tx, rx) = mpsc::sync_channel(1);
    let coordinator = CaptureCoordinator::new(device, Arc::clone(&ring), recorder, rx, 1000);
    let mut capture = CaptureLoopController::start("capture", StopSignal::new(), move |stop| {
        coordinator.run(&stop)
    })
    .unwrap();

    let outcome = waiter.join().unwrap();
    assert_eq!(
        outcome,
        AcquireOutcome::Frames {
            depth: true,
            video: false,
            format: CaptureFormat::Infrared,
        }
    );

    let report = capture.stop().unwrap().unwrap();
    assert_eq!(report.end, CaptureEnd::Stopped);
    assert_eq!(ring.format().current, CaptureFormat::Infrared);
}
