//! Session settings.

use crate::backend::{BackendStreamConfig, CaptureConstraints};
use crate::source::MAX_BUFFER_FRAMES;
use crate::{Error, Result};
use antiphase_core::{
    ControlSettings, MAX_DELAY_CEILING_SECONDS, MAX_METER_WINDOW, MAX_SAMPLE_RATE, PipelineConfig,
};
use serde::{Deserialize, Serialize};

/// Largest accepted `max_delay_ms`.
pub const MAX_DELAY_CEILING_MS: f32 = MAX_DELAY_CEILING_SECONDS * 1000.0;

/// Everything a [`Session`](crate::Session) needs to know before `start()`.
///
/// Deserialises from TOML with every field optional:
///
/// ```toml
/// sample_rate = 44100
/// input_device = "USB"
///
/// [controls]
/// phase_shift = 175.0
/// gain = 60.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Requested sample rate in Hz.
    pub sample_rate: u32,
    /// Device buffer size in frames.
    pub buffer_size: u32,
    /// Input device name substring (system default if unset).
    pub input_device: Option<String>,
    /// Output device name substring (system default if unset).
    pub output_device: Option<String>,
    /// Largest delay the delay control accepts, in milliseconds.
    pub max_delay_ms: f32,
    /// Samples per meter window.
    pub meter_window: usize,
    /// Meter refresh rate in Hz.
    pub meter_refresh_hz: f32,
    /// Platform capture processing.
    pub constraints: CaptureConstraints,
    /// Initial control values.
    pub controls: ControlSettings,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            buffer_size: 256,
            input_device: None,
            output_device: None,
            max_delay_ms: 1000.0,
            meter_window: 1024,
            meter_refresh_hz: 60.0,
            constraints: CaptureConstraints::default(),
            controls: ControlSettings::default(),
        }
    }
}

impl SessionConfig {
    /// Reject settings no device could run.
    pub fn validate(&self) -> Result<()> {
        if self.sample_rate == 0 || self.sample_rate as f32 > MAX_SAMPLE_RATE {
            return Err(Error::InvalidConfig(format!(
                "sample_rate must be between 1 and {MAX_SAMPLE_RATE} Hz, got {}",
                self.sample_rate
            )));
        }
        if self.buffer_size == 0 || self.buffer_size as usize > MAX_BUFFER_FRAMES {
            return Err(Error::InvalidConfig(format!(
                "buffer_size must be between 1 and {MAX_BUFFER_FRAMES} frames, got {}",
                self.buffer_size
            )));
        }
        if !self.max_delay_ms.is_finite()
            || self.max_delay_ms < 0.0
            || self.max_delay_ms > MAX_DELAY_CEILING_MS
        {
            return Err(Error::InvalidConfig(format!(
                "max_delay_ms must be between 0 and {MAX_DELAY_CEILING_MS}, got {}",
                self.max_delay_ms
            )));
        }
        if self.meter_window == 0 || self.meter_window > MAX_METER_WINDOW {
            return Err(Error::InvalidConfig(format!(
                "meter_window must be between 1 and {MAX_METER_WINDOW}, got {}",
                self.meter_window
            )));
        }
        if !self.meter_refresh_hz.is_finite() || self.meter_refresh_hz <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "meter_refresh_hz must be positive, got {}",
                self.meter_refresh_hz
            )));
        }
        Ok(())
    }

    /// Stream settings for the capture side.
    pub fn input_stream(&self) -> BackendStreamConfig {
        BackendStreamConfig {
            sample_rate: self.sample_rate,
            buffer_size: self.buffer_size,
            channels: 1,
            device_name: self.input_device.clone(),
        }
    }

    /// Stream settings for the output side.
    pub fn output_stream(&self) -> BackendStreamConfig {
        BackendStreamConfig {
            sample_rate: self.sample_rate,
            buffer_size: self.buffer_size,
            channels: 2,
            device_name: self.output_device.clone(),
        }
    }

    /// Build-time settings for the pipeline.
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            max_delay_seconds: self.max_delay_ms.max(0.0) / 1000.0,
            meter_window: self.meter_window,
            ..PipelineConfig::default()
        }
    }
}
