//! Property-based tests for antiphase-core.
//!
//! Meter bounds, control mapping ranges, filter stability across the reachable
//! parameter space, and parameter cell clamping.

use antiphase_core::{
    Biquad, Control, ControlSettings, LEVEL_MAX, ParamCell, PipelineConfig, SampleSource,
    bandpass_coefficients, build_pipeline, level, level_from_bytes, lowpass_coefficients,
    percent_to_output_gain, phase_to_inverter_gain,
};
use proptest::prelude::*;

struct Noise(Vec<f32>, usize);

impl SampleSource for Noise {
    fn sample_rate(&self) -> f32 {
        48000.0
    }
    fn is_live(&self) -> bool {
        true
    }
    fn read(&mut self, out: &mut [f32]) -> usize {
        for s in out.iter_mut() {
            *s = self.0[self.1 % self.0.len()];
            self.1 += 1;
        }
        out.len()
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// The display level always lands in 0..=100.
    #[test]
    fn level_is_bounded(samples in prop::collection::vec(-4.0f32..=4.0f32, 1..2048)) {
        let lvl = level(&samples).unwrap();
        prop_assert!((0.0..=LEVEL_MAX).contains(&lvl), "level {}", lvl);
    }

    #[test]
    fn byte_level_is_bounded(samples in prop::collection::vec(any::<u8>(), 1..2048)) {
        let lvl = level_from_bytes(&samples).unwrap();
        prop_assert!((0.0..=LEVEL_MAX).contains(&lvl), "level {}", lvl);
    }

    /// Every phase angle maps to a negative factor between -1.5 and -0.5.
    #[test]
    fn phase_mapping_stays_inverting(angle in -720.0f32..720.0f32) {
        let gain = phase_to_inverter_gain(angle);
        prop_assert!((-1.5..=-0.5).contains(&gain), "angle {} -> {}", angle, gain);
    }

    #[test]
    fn gain_mapping_is_monotonic(a in 0.0f32..=100.0f32, b in 0.0f32..=100.0f32) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(percent_to_output_gain(lo) <= percent_to_output_gain(hi));
        prop_assert!((0.0..=3.0).contains(&percent_to_output_gain(hi)));
    }

    /// Filters stay finite for any cutoff the controls can reach.
    #[test]
    fn chain_filters_stay_finite(
        freq in 20.0f32..20000.0f32,
        q in 0.1f32..20.0f32,
        bandpass in any::<bool>(),
        input in prop::array::uniform32(-1.0f32..=1.0f32),
    ) {
        let mut biquad = Biquad::new();
        biquad.set_coefficients(if bandpass {
            bandpass_coefficients(freq, q, 48000.0)
        } else {
            lowpass_coefficients(freq, q, 48000.0)
        });
        for _ in 0..32 {
            for &sample in &input {
                let out = biquad.process(sample);
                prop_assert!(out.is_finite(), "freq={} q={} produced {}", freq, q, out);
            }
        }
    }

    /// Stored control values are always inside the control's range.
    #[test]
    fn settings_clamp_into_range(value in -1.0e6f32..1.0e6f32, index in 0usize..5) {
        let control = Control::ALL[index];
        let mut settings = ControlSettings::default();
        let stored = settings.set(control, value, 1000.0);
        let (min, max) = control.range(1000.0);
        prop_assert!(stored >= min && stored <= max);
        prop_assert_eq!(settings.get(control), stored);
    }

    #[test]
    fn param_cell_clamps(value in -1.0e6f32..1.0e6f32) {
        let cell = ParamCell::new(0.0, -1.5, -0.5);
        let stored = cell.set(value);
        prop_assert!(cell.contains(stored));
        prop_assert_eq!(cell.get(), stored);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Any settings and any bounded input render finite, bounded output.
    #[test]
    fn pipeline_output_is_finite(
        phase in 0.0f32..=360.0f32,
        gain in 0.0f32..=100.0f32,
        delay in 0.0f32..=1000.0f32,
        low in 20.0f32..20000.0f32,
        high in 20.0f32..20000.0f32,
        noise in prop::collection::vec(-1.0f32..=1.0f32, 64..512),
    ) {
        let settings = ControlSettings { phase_shift: phase, gain, delay, low_freq: low, high_freq: high };
        let mut built = build_pipeline(
            Box::new(Noise(noise, 0)),
            &settings,
            &PipelineConfig::default(),
        ).unwrap();
        let mut out = vec![0.0f32; 2048];
        built.processor.render(&mut out);
        for s in &out {
            prop_assert!(s.is_finite());
        }
    }
}
