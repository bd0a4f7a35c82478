//! Audio-thread side of the stages.
//!
//! The [`Processor`] trait is what the pipeline runs per block. Each processor
//! owns a clone of its [`Stage`] handle and pulls parameter targets out of the
//! stage's cells in [`Processor::sync_params`]; per-sample smoothing then glides
//! towards those targets, so a control change lands on the next block without
//! a step and without clearing any buffers.
//!
//! ## Design Decisions
//!
//! - **Mono**: the chain carries a single microphone signal.
//! - **Object-safe**: the pipeline holds `Box<dyn Processor>` in chain order.
//! - **No allocations**: everything is sized at construction.

use crate::biquad::{Biquad, bandpass_coefficients, lowpass_coefficients};
use crate::delay::InterpolatedDelay;
use crate::param::SmoothedParam;
use crate::stage::{Stage, StageKind, StageParam};

/// A stage's DSP, run on the audio thread.
pub trait Processor: Send {
    /// Process a single sample.
    fn process(&mut self, input: f32) -> f32;

    /// Process a block in place.
    fn process_block_inplace(&mut self, buffer: &mut [f32]) {
        for sample in buffer.iter_mut() {
            *sample = self.process(*sample);
        }
    }

    /// Pick up the latest parameter values from the stage's cells.
    ///
    /// Called once per block, before processing.
    fn sync_params(&mut self);

    /// Recalculate sample-rate dependent state.
    fn set_sample_rate(&mut self, sample_rate: f32);

    /// Clear internal state (history, buffers) and snap smoothing to target.
    fn reset(&mut self);

    /// The stage this processor belongs to.
    fn stage(&self) -> &Stage;
}

/// Creates the processor matching `stage.kind()`.
pub fn processor_for(stage: &Stage, sample_rate: f32) -> Box<dyn Processor> {
    match stage.kind() {
        StageKind::BandPass => Box::new(FilterProcessor::new(
            stage.clone(),
            FilterResponse::BandPass,
            sample_rate,
        )),
        StageKind::LowPass => Box::new(FilterProcessor::new(
            stage.clone(),
            FilterResponse::LowPass,
            sample_rate,
        )),
        StageKind::Delay => Box::new(DelayProcessor::new(stage.clone(), sample_rate)),
        StageKind::Inverter | StageKind::OutputGain => {
            Box::new(GainProcessor::new(stage.clone(), sample_rate))
        }
    }
}

fn read(stage: &Stage, param: StageParam) -> f32 {
    // Processors are only built for their own kind, so the lookup cannot miss.
    stage.parameter(param).unwrap_or(0.0)
}

/// Which biquad response a [`FilterProcessor`] uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterResponse {
    /// Constant 0 dB peak band-pass.
    BandPass,
    /// Second-order low-pass.
    LowPass,
}

/// Band-pass or low-pass biquad with smoothed frequency and Q.
pub struct FilterProcessor {
    stage: Stage,
    response: FilterResponse,
    biquad: Biquad,
    frequency: SmoothedParam,
    q: SmoothedParam,
    sample_rate: f32,
    needs_update: bool,
}

impl FilterProcessor {
    /// Create a filter for `stage`, starting at its current parameter values.
    pub fn new(stage: Stage, response: FilterResponse, sample_rate: f32) -> Self {
        let frequency = SmoothedParam::slow(read(&stage, StageParam::Frequency), sample_rate);
        let q = SmoothedParam::slow(read(&stage, StageParam::Q), sample_rate);
        let mut filter = Self {
            stage,
            response,
            biquad: Biquad::new(),
            frequency,
            q,
            sample_rate,
            needs_update: true,
        };
        filter.update_coefficients();
        filter
    }

    fn update_coefficients(&mut self) {
        let frequency = self.frequency.get();
        let q = self.q.get();
        let coefficients = match self.response {
            FilterResponse::BandPass => bandpass_coefficients(frequency, q, self.sample_rate),
            FilterResponse::LowPass => lowpass_coefficients(frequency, q, self.sample_rate),
        };
        self.biquad.set_coefficients(coefficients);
        self.needs_update = false;
    }
}

impl Processor for FilterProcessor {
    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let moving = !self.frequency.is_settled() || !self.q.is_settled();
        self.frequency.advance();
        self.q.advance();

        if self.needs_update || moving {
            self.update_coefficients();
        }

        self.biquad.process(input)
    }

    fn sync_params(&mut self) {
        let frequency = read(&self.stage, StageParam::Frequency);
        let q = read(&self.stage, StageParam::Q);
        if frequency != self.frequency.target() || q != self.q.target() {
            self.frequency.set_target(frequency);
            self.q.set_target(q);
            self.needs_update = true;
        }
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
        self.frequency.set_sample_rate(sample_rate);
        self.q.set_sample_rate(sample_rate);
        self.update_coefficients();
    }

    fn reset(&mut self) {
        self.biquad.clear();
        self.frequency.snap_to_target();
        self.q.snap_to_target();
        self.update_coefficients();
    }

    fn stage(&self) -> &Stage {
        &self.stage
    }
}

/// Delay line whose delay time glides to new settings.
///
/// Sweeping the delay time shifts pitch briefly while the smoothing settles.
/// That short glide is the accepted cost of never clicking.
pub struct DelayProcessor {
    stage: Stage,
    line: InterpolatedDelay,
    delay_samples: SmoothedParam,
    sample_rate: f32,
}

impl DelayProcessor {
    /// Create a delay sized for the stage's maximum delay time.
    pub fn new(stage: Stage, sample_rate: f32) -> Self {
        let max_seconds = stage
            .range(StageParam::DelayTime)
            .map_or(0.0, |(_, max)| max);
        let initial = read(&stage, StageParam::DelayTime) * sample_rate;
        Self {
            stage,
            line: InterpolatedDelay::from_time(sample_rate, max_seconds),
            delay_samples: SmoothedParam::slow(initial, sample_rate),
            sample_rate,
        }
    }
}

impl Processor for DelayProcessor {
    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let delay = self.delay_samples.advance();
        self.line.read_write(input, delay)
    }

    fn sync_params(&mut self) {
        let seconds = read(&self.stage, StageParam::DelayTime);
        self.delay_samples.set_target(seconds * self.sample_rate);
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        let max_seconds = self
            .stage
            .range(StageParam::DelayTime)
            .map_or(0.0, |(_, max)| max);
        self.sample_rate = sample_rate;
        self.line = InterpolatedDelay::from_time(sample_rate, max_seconds);
        self.delay_samples.set_sample_rate(sample_rate);
        self.sync_params();
        self.delay_samples.snap_to_target();
    }

    fn reset(&mut self) {
        self.line.clear();
        self.delay_samples.snap_to_target();
    }

    fn stage(&self) -> &Stage {
        &self.stage
    }
}

/// Multiplies by a smoothed gain factor. Serves both the inverter and the
/// output gain; the stage's range decides the sign.
pub struct GainProcessor {
    stage: Stage,
    gain: SmoothedParam,
}

impl GainProcessor {
    /// Create a gain processor starting at the stage's current gain.
    pub fn new(stage: Stage, sample_rate: f32) -> Self {
        let gain = SmoothedParam::standard(read(&stage, StageParam::Gain), sample_rate);
        Self { stage, gain }
    }
}

impl Processor for GainProcessor {
    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        input * self.gain.advance()
    }

    fn sync_params(&mut self) {
        self.gain.set_target(read(&self.stage, StageParam::Gain));
    }

    fn set_sample_rate(&mut self, sample_rate: f32) {
        self.gain.set_sample_rate(sample_rate);
    }

    fn reset(&mut self) {
        self.gain.snap_to_target();
    }

    fn stage(&self) -> &Stage {
        &self.stage
    }
}
