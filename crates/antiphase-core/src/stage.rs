//! Stages: the units of the processing chain and their control handles.
//!
//! Every stage is split in two, the same way the chain as a whole is:
//!
//! - [`Stage`] is the control-side handle. It owns the [`ParamCell`]s for the
//!   stage's parameters and the link to the next element of the chain. It is
//!   cheap to clone and safe to use from any thread.
//! - A [`Processor`](crate::Processor) runs on the audio thread, holds the DSP
//!   state (filter history, delay buffer, smoothed values) and reads the cells
//!   of its `Stage` once per block.
//!
//! ## Parameters
//!
//! | Kind | Parameter | Range | Default |
//! |------|-----------|-------|---------|
//! | BandPass | Frequency | 20 Hz – 0.49·fs | 1000 Hz |
//! | BandPass | Q | fixed | 0.7 |
//! | LowPass | Frequency | 20 Hz – 0.49·fs | 4000 Hz |
//! | LowPass | Q | 0.1 – 20 | 0.707 |
//! | Delay | DelayTime | 0 – max delay (s, at most 10) | 0 |
//! | Inverter | Gain | -1.5 – -0.5 | -1.0 |
//! | OutputGain | Gain | 0 – 3 | 1.5 |

use crate::param::ParamCell;
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Lowest filter frequency in Hz.
pub const MIN_FREQUENCY_HZ: f32 = 20.0;

/// Highest filter frequency as a fraction of the sample rate.
pub const MAX_FREQUENCY_RATIO: f32 = 0.49;

/// Lower Q bound of the low-pass stage.
pub const MIN_Q: f32 = 0.1;
/// Upper Q bound.
pub const MAX_Q: f32 = 20.0;

/// Fixed Q of the band-pass stage: moderate selectivity.
pub const BANDPASS_Q: f32 = 0.7;

/// Butterworth Q of the low-pass stage.
pub const LOWPASS_Q: f32 = 0.707;

/// Inverter gain at 0°.
pub const INVERTER_GAIN_MIN: f32 = -1.5;
/// Inverter gain at 360°.
pub const INVERTER_GAIN_MAX: f32 = -0.5;

/// Output gain headroom: 100% maps to this factor.
pub const OUTPUT_GAIN_MAX: f32 = 3.0;

/// Delay limit used when the device does not report one.
pub const DEFAULT_MAX_DELAY_SECONDS: f32 = 1.0;

/// Hard ceiling on the delay limit; larger requests are clamped to it.
pub const MAX_DELAY_CEILING_SECONDS: f32 = 10.0;

/// The kinds of stage, in chain order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StageKind {
    /// Band-pass biquad around a configurable center frequency.
    BandPass,
    /// Low-pass biquad with a configurable cutoff.
    LowPass,
    /// Fractional delay line.
    Delay,
    /// Negative gain approximating a phase shift.
    Inverter,
    /// Final amplification before the sink.
    OutputGain,
}

impl StageKind {
    /// Fixed chain order from source to sink.
    pub const CHAIN_ORDER: [StageKind; 5] = [
        StageKind::BandPass,
        StageKind::LowPass,
        StageKind::Delay,
        StageKind::Inverter,
        StageKind::OutputGain,
    ];

    /// Index of this kind in [`CHAIN_ORDER`](Self::CHAIN_ORDER).
    pub fn position(self) -> usize {
        match self {
            StageKind::BandPass => 0,
            StageKind::LowPass => 1,
            StageKind::Delay => 2,
            StageKind::Inverter => 3,
            StageKind::OutputGain => 4,
        }
    }

    /// The element this kind feeds: the next stage, or the sink for the last one.
    pub fn downstream(self) -> Endpoint {
        Self::CHAIN_ORDER
            .get(self.position() + 1)
            .map_or(Endpoint::Sink, |&next| Endpoint::Stage(next))
    }

    /// Parameters this kind accepts.
    pub fn params(self) -> &'static [StageParam] {
        match self {
            StageKind::BandPass | StageKind::LowPass => &[StageParam::Frequency, StageParam::Q],
            StageKind::Delay => &[StageParam::DelayTime],
            StageKind::Inverter | StageKind::OutputGain => &[StageParam::Gain],
        }
    }

    /// Short lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            StageKind::BandPass => "bandpass",
            StageKind::LowPass => "lowpass",
            StageKind::Delay => "delay",
            StageKind::Inverter => "inverter",
            StageKind::OutputGain => "output_gain",
        }
    }
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stage parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum StageParam {
    /// Center or cutoff frequency in Hz.
    Frequency,
    /// Filter quality factor.
    Q,
    /// Delay in seconds.
    DelayTime,
    /// Linear gain factor (signed).
    Gain,
}

impl fmt::Display for StageParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            StageParam::Frequency => "frequency",
            StageParam::Q => "q",
            StageParam::DelayTime => "delay_time",
            StageParam::Gain => "gain",
        })
    }
}

/// Where a stage's output goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Endpoint {
    /// Another stage.
    Stage(StageKind),
    /// The output device.
    Sink,
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Stage(kind) => write!(f, "{kind}"),
            Endpoint::Sink => f.write_str("sink"),
        }
    }
}

/// Errors from stage operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StageError {
    /// The stage kind has no such parameter.
    #[error("{kind} stage has no {param} parameter")]
    UnsupportedParameter {
        /// Stage that was addressed.
        kind: StageKind,
        /// Parameter that was requested.
        param: StageParam,
    },

    /// Strict set with a value outside the valid range.
    #[error("{param} value {value} is outside {min}..={max}")]
    ParameterOutOfRange {
        /// Parameter that was set.
        param: StageParam,
        /// Rejected value.
        value: f32,
        /// Lower bound.
        min: f32,
        /// Upper bound.
        max: f32,
    },

    /// The link would break the fixed chain order.
    #[error("{from} can only feed {expected}, not {to}")]
    InvalidLink {
        /// Stage being connected.
        from: StageKind,
        /// Requested endpoint.
        to: Endpoint,
        /// The only endpoint this stage may feed.
        expected: Endpoint,
    },
}

/// Device-dependent bounds used when creating stages.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageLimits {
    /// Sample rate in Hz.
    pub sample_rate: f32,
    /// Longest delay the delay stage accepts, in seconds.
    pub max_delay_seconds: f32,
}

impl StageLimits {
    /// Limits for a sample rate with the default 1 s delay ceiling.
    pub fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            max_delay_seconds: DEFAULT_MAX_DELAY_SECONDS,
        }
    }

    fn max_frequency(&self) -> f32 {
        (self.sample_rate * MAX_FREQUENCY_RATIO).max(MIN_FREQUENCY_HZ)
    }

    /// Delay limit clamped to `0..=MAX_DELAY_CEILING_SECONDS`. NaN counts as 0.
    pub fn max_delay(&self) -> f32 {
        self.max_delay_seconds.max(0.0).min(MAX_DELAY_CEILING_SECONDS)
    }
}

struct StageShared {
    kind: StageKind,
    cells: Vec<(StageParam, ParamCell)>,
    connected: AtomicBool,
    endpoint: Mutex<Option<Endpoint>>,
}

/// Control handle for one stage.
///
/// Clones share the same parameters and link.
#[derive(Clone)]
pub struct Stage {
    shared: Arc<StageShared>,
}

impl Stage {
    /// Creates an unconnected stage with default parameters.
    pub fn new(kind: StageKind, limits: &StageLimits) -> Self {
        let cells = match kind {
            StageKind::BandPass => vec![
                (
                    StageParam::Frequency,
                    ParamCell::new(1000.0, MIN_FREQUENCY_HZ, limits.max_frequency()),
                ),
                (StageParam::Q, ParamCell::new(BANDPASS_Q, BANDPASS_Q, BANDPASS_Q)),
            ],
            StageKind::LowPass => vec![
                (
                    StageParam::Frequency,
                    ParamCell::new(4000.0, MIN_FREQUENCY_HZ, limits.max_frequency()),
                ),
                (StageParam::Q, ParamCell::new(LOWPASS_Q, MIN_Q, MAX_Q)),
            ],
            StageKind::Delay => vec![(
                StageParam::DelayTime,
                ParamCell::new(0.0, 0.0, limits.max_delay()),
            )],
            StageKind::Inverter => vec![(
                StageParam::Gain,
                ParamCell::new(-1.0, INVERTER_GAIN_MIN, INVERTER_GAIN_MAX),
            )],
            StageKind::OutputGain => vec![(
                StageParam::Gain,
                ParamCell::new(OUTPUT_GAIN_MAX * 0.5, 0.0, OUTPUT_GAIN_MAX),
            )],
        };

        Self {
            shared: Arc::new(StageShared {
                kind,
                cells,
                connected: AtomicBool::new(false),
                endpoint: Mutex::new(None),
            }),
        }
    }

    /// What this stage does.
    pub fn kind(&self) -> StageKind {
        self.shared.kind
    }

    pub(crate) fn cell(&self, param: StageParam) -> Result<&ParamCell, StageError> {
        self.shared
            .cells
            .iter()
            .find(|(p, _)| *p == param)
            .map(|(_, cell)| cell)
            .ok_or(StageError::UnsupportedParameter {
                kind: self.kind(),
                param,
            })
    }

    /// Sets a parameter, clamping to its valid range. Returns the stored value.
    ///
    /// Setting the same value twice is a no-op. Non-finite values leave the
    /// parameter unchanged. The audio thread picks the value up at the start
    /// of its next block.
    pub fn set_parameter(&self, param: StageParam, value: f32) -> Result<f32, StageError> {
        let cell = self.cell(param)?;
        let applied = cell.set(value);
        #[cfg(feature = "tracing")]
        {
            if applied != value {
                tracing::debug!(stage = %self.kind(), %param, value, applied, "parameter clamped");
            }
        }
        Ok(applied)
    }

    /// Sets a parameter, rejecting values outside its range.
    pub fn set_parameter_strict(&self, param: StageParam, value: f32) -> Result<f32, StageError> {
        let cell = self.cell(param)?;
        if !value.is_finite() || !cell.contains(value) {
            return Err(StageError::ParameterOutOfRange {
                param,
                value,
                min: cell.min(),
                max: cell.max(),
            });
        }
        Ok(cell.set(value))
    }

    /// Current value of a parameter.
    pub fn parameter(&self, param: StageParam) -> Result<f32, StageError> {
        self.cell(param).map(ParamCell::get)
    }

    /// Valid `(min, max)` range of a parameter.
    pub fn range(&self, param: StageParam) -> Result<(f32, f32), StageError> {
        self.cell(param).map(|c| (c.min(), c.max()))
    }

    /// Links this stage's output to `to`.
    ///
    /// Only the next element in chain order is accepted, which keeps the chain
    /// acyclic with a single path to the sink. Reconnecting is a no-op.
    pub fn connect(&self, to: Endpoint) -> Result<(), StageError> {
        let expected = self.kind().downstream();
        if to != expected {
            return Err(StageError::InvalidLink {
                from: self.kind(),
                to,
                expected,
            });
        }
        *self.shared.endpoint.lock() = Some(to);
        self.shared.connected.store(true, Ordering::Release);
        Ok(())
    }

    /// Removes the output link. Returns `false` if there was none.
    pub fn disconnect(&self) -> bool {
        let was = self.shared.endpoint.lock().take().is_some();
        self.shared.connected.store(false, Ordering::Release);
        was
    }

    /// Whether the output is linked. Read by the audio thread every block.
    #[inline]
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// The current output link, if any.
    pub fn endpoint(&self) -> Option<Endpoint> {
        *self.shared.endpoint.lock()
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("Stage");
        s.field("kind", &self.kind());
        for (param, cell) in &self.shared.cells {
            s.field(&param.to_string(), &cell.get());
        }
        s.field("connected", &self.is_connected()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limits() -> StageLimits {
        StageLimits::new(48000.0)
    }

    #[test]
    fn chain_order_positions_match() {
        for (i, kind) in StageKind::CHAIN_ORDER.iter().enumerate() {
            assert_eq!(kind.position(), i);
        }
        assert_eq!(StageKind::OutputGain.downstream(), Endpoint::Sink);
        assert_eq!(
            StageKind::BandPass.downstream(),
            Endpoint::Stage(StageKind::LowPass)
        );
    }

    #[test]
    fn in_range_value_is_read_back() {
        let stage = Stage::new(StageKind::LowPass, &limits());
        assert_eq!(stage.set_parameter(StageParam::Frequency, 2500.0), Ok(2500.0));
        assert_eq!(stage.parameter(StageParam::Frequency), Ok(2500.0));
    }

    #[test]
    fn out_of_range_value_is_clamped() {
        let stage = Stage::new(StageKind::OutputGain, &limits());
        assert_eq!(stage.set_parameter(StageParam::Gain, 10.0), Ok(OUTPUT_GAIN_MAX));
        assert_eq!(stage.set_parameter(StageParam::Gain, -1.0), Ok(0.0));

        let bp = Stage::new(StageKind::BandPass, &limits());
        assert_eq!(
            bp.set_parameter(StageParam::Frequency, 1.0e6),
            Ok(48000.0 * MAX_FREQUENCY_RATIO)
        );
    }

    #[test]
    fn set_is_idempotent() {
        let stage = Stage::new(StageKind::Delay, &limits());
        stage.set_parameter(StageParam::DelayTime, 0.25).unwrap();
        stage.set_parameter(StageParam::DelayTime, 0.25).unwrap();
        assert_eq!(stage.parameter(StageParam::DelayTime), Ok(0.25));
    }

    #[test]
    fn strict_set_rejects_out_of_range() {
        let stage = Stage::new(StageKind::Inverter, &limits());
        let err = stage
            .set_parameter_strict(StageParam::Gain, 0.5)
            .unwrap_err();
        assert!(matches!(err, StageError::ParameterOutOfRange { .. }));
        // Rejected value leaves the parameter untouched.
        assert_eq!(stage.parameter(StageParam::Gain), Ok(-1.0));
        assert_eq!(stage.set_parameter_strict(StageParam::Gain, -0.75), Ok(-0.75));
    }

    #[test]
    fn unsupported_parameter() {
        let stage = Stage::new(StageKind::Delay, &limits());
        assert_eq!(
            stage.set_parameter(StageParam::Gain, 1.0),
            Err(StageError::UnsupportedParameter {
                kind: StageKind::Delay,
                param: StageParam::Gain
            })
        );
    }

    #[test]
    fn nan_leaves_parameter_unchanged() {
        let stage = Stage::new(StageKind::OutputGain, &limits());
        assert_eq!(stage.set_parameter(StageParam::Gain, f32::NAN), Ok(1.5));
    }

    #[test]
    fn connect_only_downstream() {
        let stage = Stage::new(StageKind::Delay, &limits());
        assert!(stage.connect(Endpoint::Sink).is_err());
        assert!(stage.connect(Endpoint::Stage(StageKind::BandPass)).is_err());
        assert!(!stage.is_connected());

        stage.connect(Endpoint::Stage(StageKind::Inverter)).unwrap();
        assert!(stage.is_connected());
        assert_eq!(stage.endpoint(), Some(Endpoint::Stage(StageKind::Inverter)));
    }

    #[test]
    fn disconnect_when_unconnected_is_noop() {
        let stage = Stage::new(StageKind::OutputGain, &limits());
        assert!(!stage.disconnect());
        stage.connect(Endpoint::Sink).unwrap();
        assert!(stage.disconnect());
        assert!(!stage.disconnect());
        assert!(!stage.is_connected());
        assert_eq!(stage.endpoint(), None);
    }

    #[test]
    fn clones_share_state() {
        let stage = Stage::new(StageKind::Inverter, &limits());
        let other = stage.clone();
        other.set_parameter(StageParam::Gain, -0.6).unwrap();
        assert_eq!(stage.parameter(StageParam::Gain), Ok(-0.6));
    }

    #[test]
    fn delay_range_follows_limits() {
        let limits = StageLimits {
            sample_rate: 48000.0,
            max_delay_seconds: 0.5,
        };
        let stage = Stage::new(StageKind::Delay, &limits);
        assert_eq!(stage.range(StageParam::DelayTime), Ok((0.0, 0.5)));
        assert_eq!(stage.set_parameter(StageParam::DelayTime, 0.9), Ok(0.5));
    }

    #[test]
    fn delay_limit_is_capped() {
        for requested in [1.0e9, f32::INFINITY] {
            let limits = StageLimits {
                sample_rate: 48000.0,
                max_delay_seconds: requested,
            };
            let stage = Stage::new(StageKind::Delay, &limits);
            assert_eq!(
                stage.range(StageParam::DelayTime),
                Ok((0.0, MAX_DELAY_CEILING_SECONDS))
            );
        }

        let limits = StageLimits {
            sample_rate: 48000.0,
            max_delay_seconds: f32::NAN,
        };
        assert_eq!(limits.max_delay(), 0.0);
    }

    #[test]
    fn bandpass_q_is_fixed() {
        let stage = Stage::new(StageKind::BandPass, &limits());
        assert_eq!(stage.range(StageParam::Q), Ok((BANDPASS_Q, BANDPASS_Q)));
        assert_eq!(stage.set_parameter(StageParam::Q, 5.0), Ok(BANDPASS_Q));
        assert!(matches!(
            stage.set_parameter_strict(StageParam::Q, 2.0),
            Err(StageError::ParameterOutOfRange { .. })
        ));
        assert_eq!(stage.parameter(StageParam::Q), Ok(BANDPASS_Q));

        // The low-pass Q stays adjustable.
        let lp = Stage::new(StageKind::LowPass, &limits());
        assert_eq!(lp.set_parameter(StageParam::Q, 2.0), Ok(2.0));
    }
}
