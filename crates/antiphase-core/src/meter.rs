//! Perceptual loudness for the input and output meters.
//!
//! A meter reading is the RMS of a window of samples scaled onto a 0–100
//! display range: `level = min(100, rms * 400)`. The factor of 400 puts normal
//! speech around the middle of the bar; anything with RMS of 0.25 or more pins
//! the meter at 100.
//!
//! All functions are pure and keep no state between calls.

use libm::sqrtf;
use serde::Serialize;
use thiserror::Error;

/// Multiplier from RMS to display level.
pub const LEVEL_SCALE: f32 = 400.0;

/// Upper bound of the display level.
pub const LEVEL_MAX: f32 = 100.0;

/// Midpoint of unsigned 8-bit samples.
pub const BYTE_MIDPOINT: f32 = 128.0;

/// Errors from the level meter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeterError {
    /// The sample window was empty.
    #[error("invalid input: cannot meter an empty buffer")]
    InvalidInput,
}

/// One pair of meter levels, both in 0–100.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct MeterReading {
    /// Level before the chain.
    pub input: f32,
    /// Level after the chain.
    pub output: f32,
}

/// Root-mean-square of `samples`.
pub fn rms(samples: &[f32]) -> Result<f32, MeterError> {
    if samples.is_empty() {
        return Err(MeterError::InvalidInput);
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    Ok(sqrtf(sum / samples.len() as f32))
}

/// Maps an RMS value onto the 0–100 display scale.
#[inline]
pub fn level_from_rms(rms: f32) -> f32 {
    (rms * LEVEL_SCALE).min(LEVEL_MAX)
}

/// Display level of normalised samples in [-1, 1].
pub fn level(samples: &[f32]) -> Result<f32, MeterError> {
    rms(samples).map(level_from_rms)
}

/// Display level of unsigned 8-bit samples centred at 128.
///
/// Each byte is normalised as `b / 128 - 1` before the RMS, so 128 is silence
/// and 0 / 255 are (almost) full scale.
pub fn level_from_bytes(samples: &[u8]) -> Result<f32, MeterError> {
    if samples.is_empty() {
        return Err(MeterError::InvalidInput);
    }
    let sum: f32 = samples
        .iter()
        .map(|&b| {
            let normalized = f32::from(b) / BYTE_MIDPOINT - 1.0;
            normalized * normalized
        })
        .sum();
    Ok(level_from_rms(sqrtf(sum / samples.len() as f32)))
}
