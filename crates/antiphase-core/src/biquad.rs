//! Second-order IIR filter used by the band-pass and low-pass stages.
//!
//! Coefficient calculation uses the RBJ Audio EQ Cookbook formulas. The band-pass
//! variant has constant 0 dB peak gain, so its -3 dB edges sit at
//! `f0 / k` and `f0 * k` with `k ≈ sqrt(1 + 1/(4Q²)) + 1/(2Q)`; for the stage's
//! moderate Q of 0.7 that is roughly 0.5·f0 to 2·f0.

use core::f32::consts::PI;
use libm::{cosf, sinf};

/// Normalised-or-not biquad coefficients: `(b0, b1, b2, a0, a1, a2)`.
pub type Coefficients = (f32, f32, f32, f32, f32, f32);

/// Direct Form I biquad.
///
/// ```text
/// y[n] = b0*x[n] + b1*x[n-1] + b2*x[n-2]
///                - a1*y[n-1] - a2*y[n-2]
/// ```
///
/// Changing coefficients keeps the history, so a cutoff sweep does not reset the
/// filter.
#[derive(Debug, Clone)]
pub struct Biquad {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,

    x1: f32,
    x2: f32,
    y1: f32,
    y2: f32,
}

impl Biquad {
    /// Creates a biquad with passthrough coefficients.
    pub fn new() -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
        }
    }

    /// Sets the coefficients, normalising by `a0`.
    pub fn set_coefficients(&mut self, (b0, b1, b2, a0, a1, a2): Coefficients) {
        let a0_inv = 1.0 / a0;
        self.b0 = b0 * a0_inv;
        self.b1 = b1 * a0_inv;
        self.b2 = b2 * a0_inv;
        self.a1 = a1 * a0_inv;
        self.a2 = a2 * a0_inv;
    }

    /// Processes a single sample.
    #[inline]
    pub fn process(&mut self, input: f32) -> f32 {
        let output = self.b0 * input + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;

        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;

        output
    }

    /// Clears the filter history without touching coefficients.
    pub fn clear(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

impl Default for Biquad {
    fn default() -> Self {
        Self::new()
    }
}

/// Low-pass coefficients. `q` of 0.707 gives a Butterworth response.
pub fn lowpass_coefficients(frequency: f32, q: f32, sample_rate: f32) -> Coefficients {
    let omega = 2.0 * PI * frequency / sample_rate;
    let cos_omega = cosf(omega);
    let alpha = sinf(omega) / (2.0 * q);

    let b0 = (1.0 - cos_omega) / 2.0;
    let b1 = 1.0 - cos_omega;
    let b2 = (1.0 - cos_omega) / 2.0;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_omega;
    let a2 = 1.0 - alpha;

    (b0, b1, b2, a0, a1, a2)
}

/// Band-pass coefficients, constant 0 dB peak gain at `frequency`.
pub fn bandpass_coefficients(frequency: f32, q: f32, sample_rate: f32) -> Coefficients {
    let omega = 2.0 * PI * frequency / sample_rate;
    let cos_omega = cosf(omega);
    let alpha = sinf(omega) / (2.0 * q);

    let b0 = alpha;
    let b1 = 0.0;
    let b2 = -alpha;
    let a0 = 1.0 + alpha;
    let a1 = -2.0 * cos_omega;
    let a2 = 1.0 - alpha;

    (b0, b1, b2, a0, a1, a2)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine_rms(biquad: &mut Biquad, freq: f32, sample_rate: f32) -> f32 {
        let n = 8192;
        let mut sum = 0.0;
        for i in 0..n {
            let x = sinf(2.0 * PI * freq * i as f32 / sample_rate);
            let y = biquad.process(x);
            // skip the transient
            if i >= n / 2 {
                sum += y * y;
            }
        }
        libm::sqrtf(sum / (n / 2) as f32)
    }

    #[test]
    fn passthrough_by_default() {
        let mut biquad = Biquad::new();
        for i in 0..10 {
            let input = i as f32 * 0.1;
            assert!((biquad.process(input) - input).abs() < 1e-4);
        }
    }

    #[test]
    fn clear_resets_history() {
        let mut biquad = Biquad::new();
        for _ in 0..10 {
            biquad.process(1.0);
        }
        biquad.clear();
        assert_eq!(biquad.x1, 0.0);
        assert_eq!(biquad.x2, 0.0);
        assert_eq!(biquad.y1, 0.0);
        assert_eq!(biquad.y2, 0.0);
    }

    #[test]
    fn lowpass_passes_dc() {
        let mut biquad = Biquad::new();
        biquad.set_coefficients(lowpass_coefficients(1000.0, 0.707, 44100.0));

        let mut output = 0.0;
        for _ in 0..1000 {
            output = biquad.process(1.0);
        }
        assert!((output - 1.0).abs() < 0.05);
    }

    #[test]
    fn lowpass_attenuates_above_cutoff() {
        let sr = 48000.0;
        let mut biquad = Biquad::new();
        biquad.set_coefficients(lowpass_coefficients(1000.0, 0.707, sr));
        let high = sine_rms(&mut biquad, 8000.0, sr);
        // Full-scale sine has RMS ~0.707; 3 octaves up a 12 dB/oct slope is ~-36 dB.
        assert!(high < 0.05, "8 kHz should be strongly attenuated, rms={high}");
    }

    #[test]
    fn bandpass_unity_at_center_and_blocks_dc() {
        let sr = 48000.0;
        let mut biquad = Biquad::new();
        biquad.set_coefficients(bandpass_coefficients(1000.0, 0.7, sr));
        let center = sine_rms(&mut biquad, 1000.0, sr);
        assert!(
            (center - core::f32::consts::FRAC_1_SQRT_2).abs() < 0.02,
            "center should pass at 0 dB, rms={center}"
        );

        biquad.clear();
        let mut output = 1.0;
        for _ in 0..20000 {
            output = biquad.process(1.0);
        }
        assert!(output.abs() < 0.01, "DC should be blocked, got {output}");
    }

    #[test]
    fn bandpass_attenuates_far_outside_band() {
        let sr = 48000.0;
        let mut biquad = Biquad::new();
        biquad.set_coefficients(bandpass_coefficients(1000.0, 0.7, sr));
        let far = sine_rms(&mut biquad, 12000.0, sr);
        assert!(far < 0.15, "12 kHz should be attenuated, rms={far}");
    }
}
