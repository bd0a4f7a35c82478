//! Parameter storage shared between the control side and the audio thread.
//!
//! Two pieces work together:
//!
//! - [`ParamCell`] is the lock-free hand-off point. The control side calls
//!   [`ParamCell::set`], the audio thread calls [`ParamCell::get`] once per block.
//!   The f32 is stored as raw bits in an `AtomicU32`, so a reader never sees a
//!   half-written value.
//! - [`SmoothedParam`] lives only on the audio thread. It takes the cell value as
//!   its target and glides towards it one sample at a time, so a slider jump
//!   never turns into a step in the signal.
//!
//! ## Usage
//!
//! ```rust
//! use antiphase_core::{ParamCell, SmoothedParam};
//!
//! let cell = ParamCell::new(1.0, 0.0, 3.0);
//! let mut gain = SmoothedParam::standard(cell.get(), 48000.0);
//!
//! cell.set(0.5);
//!
//! // Audio callback: pick up the new target, then advance per sample.
//! gain.set_target(cell.get());
//! for _ in 0..480 {
//!     let _g = gain.advance();
//! }
//! ```

use libm::expf;
use std::sync::atomic::{AtomicU32, Ordering};

/// Smoothing time used by [`SmoothedParam::standard`], in milliseconds.
pub const STANDARD_SMOOTHING_MS: f32 = 10.0;

/// Smoothing time used by [`SmoothedParam::slow`], in milliseconds.
pub const SLOW_SMOOTHING_MS: f32 = 20.0;

/// A thread-safe parameter value with a fixed valid range.
///
/// Single writer (control side), any number of readers (audio thread, meters).
/// Values are clamped on store, so every reader sees an in-range value.
#[derive(Debug)]
pub struct ParamCell {
    value: AtomicU32,
    min: f32,
    max: f32,
    default: f32,
}

impl ParamCell {
    /// Create a cell with a default value and an inclusive range.
    ///
    /// The default is clamped into the range.
    pub fn new(default: f32, min: f32, max: f32) -> Self {
        let default = default.clamp(min, max);
        Self {
            value: AtomicU32::new(default.to_bits()),
            min,
            max,
            default,
        }
    }

    /// Store a value, clamped to the cell range. Returns the stored value.
    ///
    /// Non-finite input is ignored and the current value is returned.
    #[inline]
    pub fn set(&self, v: f32) -> f32 {
        if !v.is_finite() {
            return self.get();
        }
        let clamped = v.clamp(self.min, self.max);
        self.value.store(clamped.to_bits(), Ordering::Release);
        clamped
    }

    /// Load the current value.
    #[inline]
    pub fn get(&self) -> f32 {
        f32::from_bits(self.value.load(Ordering::Acquire))
    }

    /// Returns `true` if `v` lies inside the cell range.
    #[inline]
    pub fn contains(&self, v: f32) -> bool {
        v >= self.min && v <= self.max
    }

    /// Lower bound of the range.
    pub fn min(&self) -> f32 {
        self.min
    }

    /// Upper bound of the range.
    pub fn max(&self) -> f32 {
        self.max
    }

    /// Value the cell was created with.
    pub fn default(&self) -> f32 {
        self.default
    }

    /// Reset to the default value.
    pub fn reset(&self) {
        self.set(self.default);
    }
}

/// A parameter with built-in smoothing for zipper-free changes.
///
/// Uses exponential smoothing (one-pole lowpass), which gives natural
/// transitions for gain, frequency and delay time alike.
#[derive(Debug, Clone)]
pub struct SmoothedParam {
    /// Current smoothed value
    current: f32,
    /// Target value we're smoothing towards
    target: f32,
    /// Per-sample step fraction: 1.0 jumps straight to the target (no
    /// smoothing), values towards 0 glide more slowly
    coeff: f32,
    sample_rate: f32,
    smoothing_time_ms: f32,
}

impl SmoothedParam {
    /// Create a parameter with smoothing disabled (instant changes).
    pub fn new(initial: f32) -> Self {
        Self {
            current: initial,
            target: initial,
            coeff: 1.0,
            sample_rate: 48000.0,
            smoothing_time_ms: 0.0,
        }
    }

    /// Create a smoothed parameter with full configuration.
    pub fn with_config(initial: f32, sample_rate: f32, smoothing_time_ms: f32) -> Self {
        let mut param = Self::new(initial);
        param.sample_rate = sample_rate;
        param.smoothing_time_ms = smoothing_time_ms;
        param.recalculate_coeff();
        param
    }

    /// 10 ms smoothing. Good for gains.
    pub fn standard(initial: f32, sample_rate: f32) -> Self {
        Self::with_config(initial, sample_rate, STANDARD_SMOOTHING_MS)
    }

    /// 20 ms smoothing. Good for filter cutoff and delay time.
    pub fn slow(initial: f32, sample_rate: f32) -> Self {
        Self::with_config(initial, sample_rate, SLOW_SMOOTHING_MS)
    }

    /// Set the target value (parameter will smooth towards this).
    #[inline]
    pub fn set_target(&mut self, target: f32) {
        self.target = target;
    }

    /// Set target and immediately snap to it (no smoothing).
    #[inline]
    pub fn set_immediate(&mut self, value: f32) {
        self.target = value;
        self.current = value;
    }

    /// Update sample rate and recalculate the smoothing coefficient.
    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.recalculate_coeff();
    }

    /// Set smoothing time in milliseconds. 0 disables smoothing.
    pub fn set_smoothing_time_ms(&mut self, time_ms: f32) {
        self.smoothing_time_ms = time_ms;
        self.recalculate_coeff();
    }

    /// Get the next smoothed value (advances by one sample).
    ///
    /// Once a step is too small to change the f32 value, the parameter snaps
    /// onto the target, so it always settles exactly.
    #[inline]
    pub fn advance(&mut self) -> f32 {
        // y[n] = y[n-1] + coeff * (target - y[n-1])
        let next = self.current + self.coeff * (self.target - self.current);
        self.current = if next == self.current {
            self.target
        } else {
            next
        };
        self.current
    }

    /// Current smoothed value without advancing.
    #[inline]
    pub fn get(&self) -> f32 {
        self.current
    }

    /// Target value.
    #[inline]
    pub fn target(&self) -> f32 {
        self.target
    }

    /// Returns `true` once the value is within 1e-6 of the target.
    #[inline]
    pub fn is_settled(&self) -> bool {
        (self.current - self.target).abs() < 1e-6
    }

    /// Jump to the target value.
    #[inline]
    pub fn snap_to_target(&mut self) {
        self.current = self.target;
    }

    /// `coeff = 1 - exp(-1 / (tau * sample_rate))`, with `tau` in seconds.
    ///
    /// After one time constant the value has covered 63.2% of the distance to
    /// the target; after five it is effectively settled.
    fn recalculate_coeff(&mut self) {
        if self.smoothing_time_ms <= 0.0 || self.sample_rate <= 0.0 {
            self.coeff = 1.0;
        } else {
            let samples = self.smoothing_time_ms / 1000.0 * self.sample_rate;
            self.coeff = 1.0 - expf(-1.0 / samples);
        }
    }
}

impl Default for SmoothedParam {
    fn default() -> Self {
        Self::new(0.0)
    }
}
