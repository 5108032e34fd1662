// SPDX-License-Identifier: GPL-3.0-only

//! Keyboard commands
//!
//! | Key            | Action                                   |
//! |----------------|------------------------------------------|
//! | `w` / `x`      | tilt up / down one degree                |
//! | `s`            | level the tilt                           |
//! | `0`–`6`        | LED state                                |
//! | `f`            | next capture format                      |
//! | `Esc` `q` `^C` | quit                                     |

use crate::backends::device::frame_loop::{LoopAction, StopSignal};
use crate::backends::device::motor_control::clamp_tilt;
use crate::backends::device::{CaptureFormat, DeviceCommand, LedState};
use crate::pipeline::ring::FrameBufferRing;
use std::sync::Arc;
use std::sync::mpsc::{SyncSender, TrySendError};
use tracing::{debug, info, warn};

/// Backend-neutral key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    Char(char),
    Esc,
    CtrlC,
}

/// Discrete user command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    TiltUp,
    TiltDown,
    TiltLevel,
    Led(LedState),
    CycleFormat,
    Quit,
}

impl Command {
    pub fn from_key(key: Key) -> Option<Self> {
        match key {
            Key::Esc | Key::CtrlC | Key::Char('q') => Some(Command::Quit),
            Key::Char('w') => Some(Command::TiltUp),
            Key::Char('x') => Some(Command::TiltDown),
            Key::Char('s') => Some(Command::TiltLevel),
            Key::Char('f') => Some(Command::CycleFormat),
            Key::Char(c) => LedState::from_key(c).map(Command::Led),
        }
    }
}

/// Applies user commands to tilt, LED, format request and shutdown state
pub struct InputController {
    ring: Arc<FrameBufferRing>,
    commands: SyncSender<DeviceCommand>,
    stop: StopSignal,
    tilt: i8,
    led: LedState,
}

impl InputController {
    pub fn new(
        ring: Arc<FrameBufferRing>,
        commands: SyncSender<DeviceCommand>,
        stop: StopSignal,
    ) -> Self {
        Self {
            ring,
            commands,
            stop,
            tilt: 0,
            led: LedState::Red,
        }
    }

    /// Map and apply one key; unmapped keys are ignored
    pub fn handle_key(&mut self, key: Key) -> LoopAction {
        match Command::from_key(key) {
            Some(command) => self.apply(command),
            None => LoopAction::Continue,
        }
    }

    pub fn apply(&mut self, command: Command) -> LoopAction {
        match command {
            Command::TiltUp => self.set_tilt(i32::from(self.tilt) + 1),
            Command::TiltDown => self.set_tilt(i32::from(self.tilt) - 1),
            Command::TiltLevel => self.set_tilt(0),
            Command::Led(led) => {
                self.led = led;
                self.send(DeviceCommand::SetLed(led));
            }
            Command::CycleFormat => {
                let next = self.ring.format().current.next();
                info!(format = %next, "Requesting capture format");
                self.ring.request_format(next);
            }
            Command::Quit => {
                info!("Quit requested");
                self.stop.request();
                return LoopAction::Stop;
            }
        }
        LoopAction::Continue
    }

    fn set_tilt(&mut self, degrees: i32) {
        self.tilt = clamp_tilt(degrees);
        self.send(DeviceCommand::SetTilt(self.tilt));
    }

    fn send(&self, command: DeviceCommand) {
        match self.commands.try_send(command) {
            Ok(()) => debug!(?command, "Queued device command"),
            Err(TrySendError::Full(command)) => {
                warn!(?command, "Device command queue full, dropping command")
            }
            Err(TrySendError::Disconnected(_)) => debug!("Capture has ended, command ignored"),
        }
    }

    pub fn tilt(&self) -> i8 {
        self.tilt
    }

    pub fn led(&self) -> LedState {
        self.led
    }

    pub fn requested_format(&self) -> CaptureFormat {
        self.ring.format().requested
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn controller(
        format: CaptureFormat,
    ) -> (InputController, mpsc::Receiver<DeviceCommand>, StopSignal) {
        let ring = Arc::new(FrameBufferRing::new(3, 3, format));
        let (tx, rx) = mpsc::sync_channel(128);
        let stop = StopSignal::new();
        (InputController::new(ring, tx, stop.clone()), rx, stop)
    }

    #[test]
    fn test_key_mapping() {
        assert_eq!(Command::from_key(Key::Char('w')), Some(Command::TiltUp));
        assert_eq!(Command::from_key(Key::Char('x')), Some(Command::TiltDown));
        assert_eq!(Command::from_key(Key::Char('s')), Some(Command::TiltLevel));
        assert_eq!(Command::from_key(Key::Char('f')), Some(Command::CycleFormat));
        assert_eq!(
            Command::from_key(Key::Char('3')),
            Some(Command::Led(LedState::Yellow))
        );
        assert_eq!(Command::from_key(Key::Esc), Some(Command::Quit));
        assert_eq!(Command::from_key(Key::CtrlC), Some(Command::Quit));
        assert_eq!(Command::from_key(Key::Char('z')), None);
    }

    #[test]
    fn test_tilt_clamped_at_limits() {
        let (mut input, rx, _) = controller(CaptureFormat::Paired);
        for _ in 0..40 {
            input.handle_key(Key::Char('w'));
        }
        assert_eq!(input.tilt(), 30);
        input.handle_key(Key::Char('s'));
        assert_eq!(input.tilt(), 0);
        for _ in 0..40 {
            input.handle_key(Key::Char('x'));
        }
        assert_eq!(input.tilt(), -30);

        let last = rx.try_iter().last();
        assert_eq!(last, Some(DeviceCommand::SetTilt(-30)));
    }

    #[test]
    fn test_format_cycle_requests_next_after_current() {
        let (mut input, _rx, _) = controller(CaptureFormat::Infrared);
        input.handle_key(Key::Char('f'));
        assert_eq!(input.requested_format(), CaptureFormat::Color);
    }

    #[test]
    fn test_quit_raises_stop_signal() {
        let (mut input, _rx, stop) = controller(CaptureFormat::Color);
        assert_eq!(input.handle_key(Key::Char('q')), LoopAction::Stop);
        assert!(stop.is_requested());
    }

    #[test]
    fn test_full_queue_does_not_block() {
        let ring = Arc::new(FrameBufferRing::new(3, 3, CaptureFormat::Color));
        let (tx, _rx) = mpsc::sync_channel(1);
        let mut input = InputController::new(ring, tx, StopSignal::new());
        for key in ['1', '2', '3'] {
            input.handle_key(Key::Char(key));
        }
        assert_eq!(input.led(), LedState::Yellow);
    }
}
