// SPDX-License-Identifier: GPL-3.0-only

//! Motor and indicator control types
//!
//! The tilt motor and the front LED are driven from the input side but
//! applied on the capture thread, which owns the device. Requests travel as
//! [`DeviceCommand`]s over a bounded channel.

use crate::constants::tilt::{MAX_DEGREES, MIN_DEGREES};
use serde::{Deserialize, Serialize};

/// Front indicator LED states
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedState {
    #[default]
    Off,
    Green,
    Red,
    Yellow,
    BlinkGreen,
    BlinkRedYellow,
}

impl LedState {
    /// Map a number key to an LED state
    ///
    /// `4` and `5` both select blinking green.
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            '0' => Some(LedState::Off),
            '1' => Some(LedState::Green),
            '2' => Some(LedState::Red),
            '3' => Some(LedState::Yellow),
            '4' | '5' => Some(LedState::BlinkGreen),
            '6' => Some(LedState::BlinkRedYellow),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            LedState::Off => "off",
            LedState::Green => "green",
            LedState::Red => "red",
            LedState::Yellow => "yellow",
            LedState::BlinkGreen => "blink green",
            LedState::BlinkRedYellow => "blink red/yellow",
        }
    }
}

/// Tilt motor status as reported in telemetry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TiltStatus {
    Stopped,
    AtLimit,
    Moving,
    Unknown(u8),
}

impl From<u8> for TiltStatus {
    fn from(raw: u8) -> Self {
        match raw {
            0x00 => TiltStatus::Stopped,
            0x01 => TiltStatus::AtLimit,
            0x04 => TiltStatus::Moving,
            other => TiltStatus::Unknown(other),
        }
    }
}

/// Requests applied to the device on the capture thread
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceCommand {
    SetTilt(i8),
    SetLed(LedState),
}

/// Clamp a tilt angle to the accepted range
pub fn clamp_tilt(degrees: i32) -> i8 {
    degrees.clamp(MIN_DEGREES as i32, MAX_DEGREES as i32) as i8
}
