// SPDX-License-Identifier: GPL-3.0-only
//! Depth-to-color ramp for live preview
//!
//! Raw 11-bit depth samples are mapped through a precomputed 2048-entry
//! table onto seven 256-level bands:
//!
//! ```text
//! band 0  white  -> red
//! band 1  red    -> yellow
//! band 2  yellow -> green
//! band 3  green  -> cyan
//! band 4  cyan   -> blue
//! band 5  blue   -> black
//! band 6  black
//! ```
//!
//! Intensity grows with the cube of the sample, so the near range gets most
//! of the color resolution. Samples whose intensity rounds to zero are
//! marked "too close" and render as saturated white.

use crate::constants::depth::{NO_READING, RAW_VALUES};

/// Number of bands in the ramp
pub const BANDS: u8 = 7;

/// Largest encoded intensity (last level of the last band)
const MAX_INTENSITY: u16 = (BANDS as u16 - 1) * 256 + 255;

/// Exponent curve gain, 6 × 6 bands of 256 levels
const CURVE_SCALE: f32 = 6.0 * 6.0 * 256.0;

/// Position on the ramp
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandLevel {
    /// Band index, 0..=6
    pub band: u8,
    /// Level within the band, 0..=255
    pub level: u8,
}

impl BandLevel {
    /// Marker for samples too close to the sensor to measure
    pub const TOO_CLOSE: BandLevel = BandLevel { band: 0, level: 0 };

    fn from_intensity(intensity: u16) -> Self {
        Self {
            band: (intensity >> 8) as u8,
            level: (intensity & 0xff) as u8,
        }
    }

    /// RGB color of this ramp position
    pub fn rgb(self) -> [u8; 3] {
        let lb = self.level;
        match self.band {
            0 => [255, 255 - lb, 255 - lb],
            1 => [255, lb, 0],
            2 => [255 - lb, 255, 0],
            3 => [0, 255, lb],
            4 => [0, 255 - lb, 255],
            5 => [0, 0, 255 - lb],
            _ => [0, 0, 0],
        }
    }
}

/// Precomputed depth ramp
pub struct DepthColorizer {
    table: Box<[u16]>,
}

impl Default for DepthColorizer {
    fn default() -> Self {
        Self::new()
    }
}

impl DepthColorizer {
    pub fn new() -> Self {
        let max = RAW_VALUES as f32;
        let table = (0..RAW_VALUES)
            .map(|i| {
                let v = (i as f32 / max).powi(3);
                match (v * CURVE_SCALE) as u32 {
                    0 => 0,
                    intensity => intensity.min(MAX_INTENSITY as u32) as u16,
                }
            })
            .collect();
        Self { table }
    }

    /// Ramp position of one raw sample
    ///
    /// Samples above the 11-bit range are treated as "no reading".
    pub fn colorize(&self, sample: u16) -> BandLevel {
        let index = usize::from(sample.min(NO_READING));
        match self.table[index] {
            0 => BandLevel::TOO_CLOSE,
            intensity => BandLevel::from_intensity(intensity),
        }
    }

    /// Colorize a row of samples into packed RGB, 3 bytes per pixel
    ///
    /// Stops at whichever of `raw` and `rgb` runs out first.
    pub fn colorize_row(&self, raw: &[u16], rgb: &mut [u8]) {
        for (&sample, pixel) in raw.iter().zip(rgb.chunks_exact_mut(3)) {
            pixel.copy_from_slice(&self.colorize(sample).rgb());
        }
    }
}
