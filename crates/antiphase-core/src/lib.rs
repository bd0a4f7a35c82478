//! Antiphase Core - the processing chain behind the antiphase canceller
//!
//! The canceller captures a microphone, shapes the signal through a fixed chain
//! and plays back a polarity-inverted copy so the sound in the room is reduced.
//! This crate holds everything that does not touch an audio device.
//!
//! # Core Abstractions
//!
//! ## Chain
//!
//! - [`build_pipeline`] - Wire a [`SampleSource`] through the five stages
//! - [`Pipeline`] - Control-side handles: stages, taps, teardown
//! - [`PipelineProcessor`] - Audio-side renderer, moved into the output callback
//! - [`Tap`] - Pre- and post-chain sample windows for metering
//!
//! ## Stages
//!
//! - [`Stage`] - Shared handle to one element of the chain
//! - [`StageKind`] - Band-pass, low-pass, delay, inverter, output gain
//! - [`Processor`] - Per-stage DSP run on the audio thread
//!
//! ## Controls
//!
//! - [`Control`] - The five user-facing controls
//! - [`ControlSettings`] - Raw control values (degrees, percent, ms, Hz)
//! - [`ParameterController`] - Maps controls onto stage parameters
//!
//! ## Metering
//!
//! - [`level`], [`level_from_bytes`] - RMS onto a 0–100 display scale
//!
//! ## DSP Primitives
//!
//! - [`ParamCell`] - Lock-free parameter value shared across threads
//! - [`SmoothedParam`] - Exponential smoothing for click-free changes
//! - [`Biquad`] - Second-order IIR filter with RBJ cookbook coefficients
//! - [`InterpolatedDelay`] - Variable-length delay with linear interpolation
//!
//! # Example
//!
//! ```rust,ignore
//! use antiphase_core::{ControlSettings, PipelineConfig, build_pipeline};
//!
//! let built = build_pipeline(source, &ControlSettings::default(), &PipelineConfig::default())?;
//! let mut processor = built.processor;
//! // In the output callback:
//! processor.render(&mut out);
//! // On the control side:
//! let input_level = built.pipeline.input_tap().level()?;
//! built.pipeline.teardown();
//! ```
//!
//! # Logging
//!
//! Enable the `tracing` feature to emit `tracing` events for parameter changes
//! and pipeline lifecycle. Nothing is logged from the audio path.

pub mod biquad;
pub mod controller;
pub mod delay;
pub mod meter;
pub mod param;
pub mod pipeline;
pub mod processor;
pub mod stage;

// Re-export main types at crate root
pub use biquad::{Biquad, Coefficients, bandpass_coefficients, lowpass_coefficients};
pub use controller::{
    Control, ControlError, ControlSettings, ControlUpdate, ParameterController,
    delay_ms_to_seconds, percent_to_output_gain, phase_to_inverter_gain,
};
pub use delay::InterpolatedDelay;
pub use meter::{
    LEVEL_MAX, LEVEL_SCALE, MeterError, MeterReading, level, level_from_bytes, level_from_rms, rms,
};
pub use param::{ParamCell, SmoothedParam};
pub use pipeline::{
    BuiltPipeline, MAX_METER_WINDOW, MAX_SAMPLE_RATE, Pipeline, PipelineConfig, PipelineError,
    PipelineProcessor, SampleSource, Tap, TapPoint, build_pipeline,
};
pub use processor::{
    DelayProcessor, FilterProcessor, FilterResponse, GainProcessor, Processor, processor_for,
};
pub use stage::{
    Endpoint, MAX_DELAY_CEILING_SECONDS, Stage, StageError, StageKind, StageLimits, StageParam,
};
