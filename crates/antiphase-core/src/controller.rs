//! User-facing controls and their mapping onto stage parameters.
//!
//! The five knobs a front end exposes are expressed in user units (degrees,
//! percent, milliseconds, Hz). All scaling lives here as pure functions so it
//! can be tested without any audio running:
//!
//! | Control | Range | Stage / parameter | Mapping |
//! |---------|-------|-------------------|---------|
//! | `phase_shift` | 0–360° | Inverter / Gain | `-1 + (a-180)/180 · 0.5` |
//! | `gain` | 0–100 % | OutputGain / Gain | `p/100 · 3` |
//! | `delay` | 0–max ms | Delay / DelayTime | `ms / 1000` |
//! | `low_freq` | 20–20000 Hz | BandPass / Frequency | identity |
//! | `high_freq` | 20–20000 Hz | LowPass / Frequency | identity |
//!
//! The phase mapping is a linear amplitude approximation, not an all-pass phase
//! shift: 180° is a clean inversion (-1.0), and the ends of the range give
//! -1.5 (0°) and -0.5 (360°). The -1.5 end amplifies the inverted signal; that
//! range is kept as-is.

use crate::pipeline::Pipeline;
use crate::stage::{Stage, StageKind, StageParam};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Lowest selectable filter frequency in Hz.
pub const CONTROL_MIN_FREQ_HZ: f32 = 20.0;

/// Highest selectable filter frequency in Hz.
pub const CONTROL_MAX_FREQ_HZ: f32 = 20000.0;

/// A user-facing control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    /// Phase-shift angle in degrees.
    PhaseShift,
    /// Output gain in percent.
    Gain,
    /// Delay in milliseconds.
    Delay,
    /// Band-pass center frequency in Hz.
    LowFreq,
    /// Low-pass cutoff frequency in Hz.
    HighFreq,
}

impl Control {
    /// Every control, in display order.
    pub const ALL: [Control; 5] = [
        Control::PhaseShift,
        Control::Gain,
        Control::Delay,
        Control::LowFreq,
        Control::HighFreq,
    ];

    /// Canonical snake_case name.
    pub fn name(self) -> &'static str {
        match self {
            Control::PhaseShift => "phase_shift",
            Control::Gain => "gain",
            Control::Delay => "delay",
            Control::LowFreq => "low_freq",
            Control::HighFreq => "high_freq",
        }
    }

    /// Unit suffix for display.
    pub fn unit(self) -> &'static str {
        match self {
            Control::PhaseShift => "°",
            Control::Gain => "%",
            Control::Delay => "ms",
            Control::LowFreq | Control::HighFreq => "Hz",
        }
    }

    /// The stage parameter this control drives.
    pub fn target(self) -> (StageKind, StageParam) {
        match self {
            Control::PhaseShift => (StageKind::Inverter, StageParam::Gain),
            Control::Gain => (StageKind::OutputGain, StageParam::Gain),
            Control::Delay => (StageKind::Delay, StageParam::DelayTime),
            Control::LowFreq => (StageKind::BandPass, StageParam::Frequency),
            Control::HighFreq => (StageKind::LowPass, StageParam::Frequency),
        }
    }

    /// Valid range in user units. Delay depends on the device maximum.
    pub fn range(self, max_delay_ms: f32) -> (f32, f32) {
        match self {
            Control::PhaseShift => (0.0, 360.0),
            Control::Gain => (0.0, 100.0),
            Control::Delay => (0.0, max_delay_ms.max(0.0)),
            Control::LowFreq | Control::HighFreq => (CONTROL_MIN_FREQ_HZ, CONTROL_MAX_FREQ_HZ),
        }
    }

    /// Maps a value in user units to the stage parameter value.
    pub fn map(self, value: f32) -> f32 {
        match self {
            Control::PhaseShift => phase_to_inverter_gain(value),
            Control::Gain => percent_to_output_gain(value),
            Control::Delay => delay_ms_to_seconds(value),
            Control::LowFreq | Control::HighFreq => value,
        }
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors from the control layer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ControlError {
    /// The name does not match any control.
    #[error("unknown control '{0}' (expected phase_shift, gain, delay, low_freq or high_freq)")]
    UnknownControl(String),
}

impl FromStr for Control {
    type Err = ControlError;

    /// Accepts snake_case, kebab-case and camelCase spellings.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| *c != '_' && *c != '-')
            .collect::<String>()
            .to_lowercase();
        match normalized.as_str() {
            "phaseshift" | "phase" => Ok(Control::PhaseShift),
            "gain" => Ok(Control::Gain),
            "delay" => Ok(Control::Delay),
            "lowfreq" => Ok(Control::LowFreq),
            "highfreq" => Ok(Control::HighFreq),
            _ => Err(ControlError::UnknownControl(s.to_string())),
        }
    }
}

/// Inverter gain for a phase angle in degrees.
///
/// `-1.0 + ((angle - 180) / 180) * 0.5`, with the angle clamped to 0–360.
#[inline]
pub fn phase_to_inverter_gain(angle_deg: f32) -> f32 {
    let angle = angle_deg.clamp(0.0, 360.0);
    -1.0 + ((angle - 180.0) / 180.0) * 0.5
}

/// Output gain factor for a percentage: 100% is 3× amplification.
#[inline]
pub fn percent_to_output_gain(percent: f32) -> f32 {
    percent.clamp(0.0, 100.0) / 100.0 * 3.0
}

/// Milliseconds to seconds.
#[inline]
pub fn delay_ms_to_seconds(ms: f32) -> f32 {
    ms.max(0.0) / 1000.0
}

/// Current value of every control, in user units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlSettings {
    /// Phase-shift angle in degrees (0–360).
    pub phase_shift: f32,
    /// Output gain in percent (0–100).
    pub gain: f32,
    /// Delay in milliseconds.
    pub delay: f32,
    /// Band-pass center frequency in Hz.
    pub low_freq: f32,
    /// Low-pass cutoff frequency in Hz.
    pub high_freq: f32,
}

impl Default for ControlSettings {
    fn default() -> Self {
        Self {
            phase_shift: 180.0,
            gain: 50.0,
            delay: 0.0,
            low_freq: 1000.0,
            high_freq: 4000.0,
        }
    }
}

impl ControlSettings {
    /// Value of one control.
    pub fn get(&self, control: Control) -> f32 {
        match control {
            Control::PhaseShift => self.phase_shift,
            Control::Gain => self.gain,
            Control::Delay => self.delay,
            Control::LowFreq => self.low_freq,
            Control::HighFreq => self.high_freq,
        }
    }

    /// Store one control value, clamped to its range. Returns the stored value.
    ///
    /// Non-finite values leave the setting unchanged.
    pub fn set(&mut self, control: Control, value: f32, max_delay_ms: f32) -> f32 {
        if !value.is_finite() {
            return self.get(control);
        }
        let (min, max) = control.range(max_delay_ms);
        let value = value.clamp(min, max);
        let slot = match control {
            Control::PhaseShift => &mut self.phase_shift,
            Control::Gain => &mut self.gain,
            Control::Delay => &mut self.delay,
            Control::LowFreq => &mut self.low_freq,
            Control::HighFreq => &mut self.high_freq,
        };
        *slot = value;
        value
    }

    /// Copy with every value clamped into range.
    pub fn clamped(mut self, max_delay_ms: f32) -> Self {
        for control in Control::ALL {
            let value = self.get(control);
            if value.is_finite() {
                self.set(control, value, max_delay_ms);
            } else {
                self.set(control, Self::default().get(control), max_delay_ms);
            }
        }
        self
    }

    /// Stage parameter value for one control.
    pub fn mapped(&self, control: Control) -> f32 {
        control.map(self.get(control))
    }

    /// Writes every mapped value into the matching stage of `pipeline`.
    pub fn apply_to(&self, pipeline: &Pipeline) {
        for control in Control::ALL {
            let (kind, param) = control.target();
            // Each target is a parameter of its own kind.
            let _ = pipeline.stage(kind).set_parameter(param, self.mapped(control));
        }
    }
}

/// Result of one [`ParameterController::set_control`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ControlUpdate {
    /// The control that changed.
    pub control: Control,
    /// Cached value in user units, after clamping.
    pub value: f32,
    /// Value written to the stage, or `None` if no pipeline is attached.
    pub applied: Option<f32>,
}

/// Routes control changes to the live stage parameters.
///
/// While no pipeline is attached (session idle) values are only cached; the
/// next pipeline is built from the cache. Every update touches a single
/// stage cell and never blocks.
#[derive(Debug)]
pub struct ParameterController {
    settings: ControlSettings,
    max_delay_ms: f32,
    stages: Option<Vec<Stage>>,
}

impl ParameterController {
    /// Create a controller with initial settings and the device delay limit.
    pub fn new(settings: ControlSettings, max_delay_ms: f32) -> Self {
        Self {
            settings: settings.clamped(max_delay_ms),
            max_delay_ms,
            stages: None,
        }
    }

    /// Cached settings.
    pub fn settings(&self) -> &ControlSettings {
        &self.settings
    }

    /// Delay ceiling in milliseconds.
    pub fn max_delay_ms(&self) -> f32 {
        self.max_delay_ms
    }

    /// Start forwarding changes to `pipeline`.
    pub fn attach(&mut self, pipeline: &Pipeline) {
        self.stages = Some(pipeline.stages().to_vec());
    }

    /// Stop forwarding changes. Values keep being cached.
    pub fn detach(&mut self) {
        self.stages = None;
    }

    /// Whether a pipeline is attached.
    pub fn is_attached(&self) -> bool {
        self.stages.is_some()
    }

    /// Record a control value and apply it to the live stage, if any.
    pub fn set_control(&mut self, control: Control, value: f32) -> ControlUpdate {
        let value = self.settings.set(control, value, self.max_delay_ms);
        let applied = self.stages.as_ref().and_then(|stages| {
            let (kind, param) = control.target();
            stages
                .iter()
                .find(|s| s.kind() == kind)
                .and_then(|s| s.set_parameter(param, control.map(value)).ok())
        });

        #[cfg(feature = "tracing")]
        tracing::debug!(%control, value, ?applied, "control updated");

        ControlUpdate {
            control,
            value,
            applied,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_mapping_fixed_points() {
        assert_eq!(phase_to_inverter_gain(180.0), -1.0);
        assert_eq!(phase_to_inverter_gain(0.0), -1.5);
        assert_eq!(phase_to_inverter_gain(360.0), -0.5);
        assert_eq!(phase_to_inverter_gain(90.0), -1.25);
    }

    #[test]
    fn phase_mapping_clamps_angle() {
        assert_eq!(phase_to_inverter_gain(-90.0), -1.5);
        assert_eq!(phase_to_inverter_gain(720.0), -0.5);
    }

    #[test]
    fn output_gain_mapping() {
        assert_eq!(percent_to_output_gain(100.0), 3.0);
        assert_eq!(percent_to_output_gain(0.0), 0.0);
        assert_eq!(percent_to_output_gain(50.0), 1.5);
        assert_eq!(percent_to_output_gain(150.0), 3.0);
    }

    #[test]
    fn delay_mapping() {
        assert_eq!(delay_ms_to_seconds(250.0), 0.25);
        assert_eq!(delay_ms_to_seconds(-5.0), 0.0);
    }

    #[test]
    fn control_names_parse() {
        assert_eq!("phaseShift".parse(), Ok(Control::PhaseShift));
        assert_eq!("phase_shift".parse(), Ok(Control::PhaseShift));
        assert_eq!("phase-shift".parse(), Ok(Control::PhaseShift));
        assert_eq!("GAIN".parse(), Ok(Control::Gain));
        assert_eq!("lowFreq".parse(), Ok(Control::LowFreq));
        assert_eq!("high_freq".parse(), Ok(Control::HighFreq));
        assert!("volume".parse::<Control>().is_err());
    }

    #[test]
    fn names_round_trip_through_parse() {
        for control in Control::ALL {
            assert_eq!(control.name().parse(), Ok(control));
        }
    }

    #[test]
    fn settings_clamp_on_set() {
        let mut settings = ControlSettings::default();
        assert_eq!(settings.set(Control::Gain, 250.0, 1000.0), 100.0);
        assert_eq!(settings.set(Control::Delay, 5000.0, 1000.0), 1000.0);
        assert_eq!(settings.set(Control::LowFreq, 1.0, 1000.0), CONTROL_MIN_FREQ_HZ);
        assert_eq!(settings.set(Control::PhaseShift, f32::NAN, 1000.0), 180.0);
    }

    #[test]
    fn idle_controller_only_caches() {
        let mut controller = ParameterController::new(ControlSettings::default(), 1000.0);
        let update = controller.set_control(Control::Gain, 80.0);
        assert_eq!(update.value, 80.0);
        assert_eq!(update.applied, None);
        assert_eq!(controller.settings().gain, 80.0);
    }

    #[test]
    fn settings_deserialize_with_defaults() {
        let settings: ControlSettings = toml::from_str("gain = 75.0\nlow_freq = 300.0").unwrap();
        assert_eq!(settings.gain, 75.0);
        assert_eq!(settings.low_freq, 300.0);
        assert_eq!(settings.phase_shift, 180.0);
    }
}
