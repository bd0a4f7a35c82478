//! Circular-buffer delay line with fractional reads.
//!
//! The buffer is allocated once from the maximum delay time and never
//! reallocates, so reads and writes are safe on the audio thread.

/// Interpolated delay line.
///
/// Reads use linear interpolation between the two nearest samples, which keeps a
/// smoothly changing delay time free of zipper noise.
///
/// # Example
///
/// ```rust
/// use antiphase_core::InterpolatedDelay;
///
/// // 1 s max delay at 48 kHz
/// let mut delay = InterpolatedDelay::from_time(48000.0, 1.0);
/// let out = delay.read_write(1.0, 10.5);
/// assert_eq!(out, 0.0);
/// ```
#[derive(Debug, Clone)]
pub struct InterpolatedDelay {
    buffer: Vec<f32>,
    write_pos: usize,
}

impl InterpolatedDelay {
    /// Creates a delay line holding `max_delay_samples` samples (at least 2).
    pub fn new(max_delay_samples: usize) -> Self {
        Self {
            buffer: vec![0.0; max_delay_samples.max(2)],
            write_pos: 0,
        }
    }

    /// Creates a delay line from sample rate and max delay time in seconds.
    pub fn from_time(sample_rate: f32, max_seconds: f32) -> Self {
        let max_samples = (sample_rate * max_seconds.max(0.0)) as usize + 2;
        Self::new(max_samples)
    }

    /// Reads the sample written `delay_samples` samples before the next write.
    ///
    /// A delay of 0 returns the most recently written sample. Delays past the
    /// capacity are clamped.
    #[inline]
    pub fn read(&self, delay_samples: f32) -> f32 {
        let len = self.buffer.len();
        let delay = delay_samples.clamp(0.0, (len - 2) as f32);

        let delay_int = delay as usize;
        let frac = delay - delay_int as f32;

        let read_pos = (self.write_pos + len - delay_int - 1) % len;
        let older_pos = (read_pos + len - 1) % len;

        let a = self.buffer[read_pos];
        let b = self.buffer[older_pos];
        a + (b - a) * frac
    }

    /// Writes a sample and advances the write position.
    #[inline]
    pub fn write(&mut self, sample: f32) {
        self.buffer[self.write_pos] = sample;
        self.write_pos = (self.write_pos + 1) % self.buffer.len();
    }

    /// Writes `sample`, then reads with the given delay.
    ///
    /// With `delay_samples == 0.0` the output equals the input, so the line is
    /// transparent at zero delay.
    #[inline]
    pub fn read_write(&mut self, sample: f32, delay_samples: f32) -> f32 {
        self.write(sample);
        self.read(delay_samples)
    }

    /// Zeroes the buffer.
    pub fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.write_pos = 0;
    }

    /// Largest usable delay in samples.
    pub fn max_delay_samples(&self) -> usize {
        self.buffer.len() - 2
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_delay_is_transparent() {
        let mut delay = InterpolatedDelay::new(16);
        for i in 0..32 {
            let x = i as f32;
            assert_eq!(delay.read_write(x, 0.0), x);
        }
    }

    #[test]
    fn integer_delay_shifts_signal() {
        let mut delay = InterpolatedDelay::new(64);
        let mut out = Vec::new();
        for i in 0..20 {
            out.push(delay.read_write(i as f32 + 1.0, 5.0));
        }
        assert_eq!(&out[..5], &[0.0; 5]);
        assert_eq!(out[5], 1.0);
        assert_eq!(out[19], 15.0);
    }

    #[test]
    fn fractional_delay_interpolates() {
        let mut delay = InterpolatedDelay::new(16);
        delay.write(0.0);
        delay.write(1.0);
        // Half-way between the last (1.0) and the one before (0.0).
        assert!((delay.read(0.5) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn delay_clamped_to_capacity() {
        let mut delay = InterpolatedDelay::new(8);
        for i in 0..8 {
            delay.write(i as f32);
        }
        let max = delay.max_delay_samples() as f32;
        assert_eq!(delay.read(1000.0), delay.read(max));
    }

    #[test]
    fn from_time_capacity() {
        let delay = InterpolatedDelay::from_time(48000.0, 1.0);
        assert!(delay.max_delay_samples() >= 48000);
    }

    #[test]
    fn clear_zeroes() {
        let mut delay = InterpolatedDelay::new(8);
        for _ in 0..8 {
            delay.write(1.0);
        }
        delay.clear();
        assert_eq!(delay.read(3.0), 0.0);
    }
}
