//! The processing chain from microphone to output.
//!
//! ```text
//! source ─┬─> bandpass ─> lowpass ─> delay ─> inverter ─> output_gain ─┬─> sink
//!         └─> input tap                                    output tap <─┘
//! ```
//!
//! [`build_pipeline`] returns two objects:
//!
//! - [`Pipeline`], owned by the session on the control thread. Holds the
//!   [`Stage`] handles and the [`Tap`]s; parameter changes and teardown go
//!   through it. Never touched by the audio thread.
//! - [`PipelineProcessor`], moved into the output callback. Owns the source and
//!   the per-stage DSP and renders blocks. It sees control changes only through
//!   the atomic cells and link flags the stages share with it.
//!
//! A stage whose output link is removed stops passing signal: everything
//! downstream of it renders silence from the next block on.

use crate::controller::ControlSettings;
use crate::meter::{self, MeterError};
use crate::processor::{Processor, processor_for};
use crate::stage::{DEFAULT_MAX_DELAY_SECONDS, Stage, StageKind, StageLimits};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;

/// Samples held by each tap: the analyser window of 2048-point FFT, halved.
pub const DEFAULT_METER_WINDOW: usize = 1024;

/// Largest block rendered in one pass; longer buffers are split.
pub const DEFAULT_MAX_BLOCK_SIZE: usize = 4096;

/// Upper bound on [`PipelineConfig::meter_window`].
pub const MAX_METER_WINDOW: usize = 65536;

/// Upper bound on [`PipelineConfig::max_block_size`].
pub const MAX_BLOCK_SIZE_LIMIT: usize = 65536;

/// Highest sample rate a source may report.
pub const MAX_SAMPLE_RATE: f32 = 768_000.0;

/// Errors from building a pipeline.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    /// The source cannot supply samples.
    #[error("device unavailable: {0}")]
    DeviceUnavailable(String),
}

/// Mono sample provider at the head of the chain.
pub trait SampleSource: Send {
    /// Sample rate of the samples returned by [`read`](Self::read).
    fn sample_rate(&self) -> f32;

    /// Whether the source is currently able to deliver samples.
    fn is_live(&self) -> bool;

    /// Fill `out` with up to `out.len()` samples; returns how many were written.
    ///
    /// Must not block. The pipeline treats unwritten samples as silence.
    fn read(&mut self, out: &mut [f32]) -> usize;
}

/// Build-time settings that do not change while running.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Longest delay the delay stage accepts, in seconds. Clamped to
    /// [`MAX_DELAY_CEILING_SECONDS`](crate::stage::MAX_DELAY_CEILING_SECONDS).
    pub max_delay_seconds: f32,
    /// Samples per tap window, at most [`MAX_METER_WINDOW`].
    pub meter_window: usize,
    /// Largest block rendered without splitting, at most [`MAX_BLOCK_SIZE_LIMIT`].
    pub max_block_size: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_delay_seconds: DEFAULT_MAX_DELAY_SECONDS,
            meter_window: DEFAULT_METER_WINDOW,
            max_block_size: DEFAULT_MAX_BLOCK_SIZE,
        }
    }
}

/// Where a tap listens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TapPoint {
    /// Raw source signal, before the first stage.
    PreChain,
    /// Signal delivered to the sink.
    PostChain,
}

impl fmt::Display for TapPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TapPoint::PreChain => "input",
            TapPoint::PostChain => "output",
        })
    }
}

struct TapWindow {
    samples: Vec<f32>,
    /// Next write index; also the oldest sample.
    pos: usize,
}

struct TapShared {
    point: TapPoint,
    window: Mutex<TapWindow>,
    connected: AtomicBool,
}

/// Read-only monitoring point holding the most recent window of samples.
///
/// The audio thread writes with `try_lock` and skips the block if a reader
/// holds the window, so metering can never stall audio. Starts filled with
/// silence.
#[derive(Clone)]
pub struct Tap {
    shared: Arc<TapShared>,
}

impl Tap {
    /// Create a disconnected tap with a window of `window_len` samples (at least 1).
    pub fn new(point: TapPoint, window_len: usize) -> Self {
        Self {
            shared: Arc::new(TapShared {
                point,
                window: Mutex::new(TapWindow {
                    samples: vec![0.0; window_len.max(1)],
                    pos: 0,
                }),
                connected: AtomicBool::new(false),
            }),
        }
    }

    /// Where this tap listens.
    pub fn point(&self) -> TapPoint {
        self.shared.point
    }

    /// Window length in samples.
    pub fn window_len(&self) -> usize {
        self.shared.window.lock().samples.len()
    }

    /// Start receiving samples.
    pub fn connect(&self) {
        self.shared.connected.store(true, Ordering::Release);
    }

    /// Stop receiving samples. Returns `false` if already disconnected.
    pub fn disconnect(&self) -> bool {
        self.shared.connected.swap(false, Ordering::AcqRel)
    }

    /// Whether the tap is receiving samples.
    pub fn is_connected(&self) -> bool {
        self.shared.connected.load(Ordering::Acquire)
    }

    /// Copy of the window, oldest sample first.
    pub fn snapshot(&self) -> Vec<f32> {
        let mut out = Vec::new();
        self.snapshot_into(&mut out);
        out
    }

    /// Copy the window into `out`, oldest sample first, reusing its allocation.
    pub fn snapshot_into(&self, out: &mut Vec<f32>) {
        let window = self.shared.window.lock();
        out.clear();
        out.extend_from_slice(&window.samples[window.pos..]);
        out.extend_from_slice(&window.samples[..window.pos]);
    }

    /// Meter level of the current window.
    pub fn level(&self) -> Result<f32, MeterError> {
        let window = self.shared.window.lock();
        meter::level(&window.samples)
    }

    /// Append a block. Audio thread only; never blocks.
    pub(crate) fn write(&self, block: &[f32]) {
        if !self.is_connected() {
            return;
        }
        let Some(mut window) = self.shared.window.try_lock() else {
            return;
        };
        let TapWindow { samples, pos } = &mut *window;
        let len = samples.len();
        // Only the newest `len` samples can survive.
        let block = &block[block.len().saturating_sub(len)..];
        for &s in block {
            samples[*pos] = s;
            *pos = (*pos + 1) % len;
        }
    }
}

impl fmt::Debug for Tap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tap")
            .field("point", &self.point())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

/// Control-side view of a built chain.
#[derive(Debug)]
pub struct Pipeline {
    stages: Vec<Stage>,
    input_tap: Tap,
    output_tap: Tap,
    sample_rate: f32,
}

impl Pipeline {
    /// Stages in chain order.
    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    /// The stage of a given kind. Every pipeline has exactly one of each.
    pub fn stage(&self, kind: StageKind) -> &Stage {
        &self.stages[kind.position()]
    }

    /// Pre-chain tap.
    pub fn input_tap(&self) -> &Tap {
        &self.input_tap
    }

    /// Post-chain tap.
    pub fn output_tap(&self) -> &Tap {
        &self.output_tap
    }

    /// Sample rate the chain runs at.
    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Whether every stage feeds its successor and the last feeds the sink.
    pub fn is_wired(&self) -> bool {
        self.stages
            .iter()
            .all(|s| s.endpoint() == Some(s.kind().downstream()))
    }

    /// Whether any stage or tap is still connected.
    pub fn any_connected(&self) -> bool {
        self.stages.iter().any(Stage::is_connected)
            || self.input_tap.is_connected()
            || self.output_tap.is_connected()
    }

    /// Disconnect every stage and both taps. Returns how many links were removed.
    ///
    /// Each element is handled independently; nothing here can stop the rest
    /// of the chain from being disconnected.
    pub fn teardown(&self) -> usize {
        let stages = self.stages.iter().filter(|s| s.disconnect()).count();
        let taps = usize::from(self.input_tap.disconnect()) + usize::from(self.output_tap.disconnect());
        #[cfg(feature = "tracing")]
        tracing::debug!(stages, taps, "pipeline torn down");
        stages + taps
    }
}

/// Audio-side half of a chain.
pub struct PipelineProcessor {
    source: Box<dyn SampleSource>,
    processors: Vec<Box<dyn Processor>>,
    input_tap: Tap,
    output_tap: Tap,
    scratch: Vec<f32>,
}

impl PipelineProcessor {
    /// Render `out.len()` mono samples into `out` (the sink).
    pub fn render(&mut self, out: &mut [f32]) {
        let chunk_len = self.scratch.len();
        for chunk in out.chunks_mut(chunk_len) {
            self.render_chunk(chunk);
        }
    }

    fn render_chunk(&mut self, out: &mut [f32]) {
        let buf = &mut self.scratch[..out.len()];

        let filled = self.source.read(buf).min(buf.len());
        buf[filled..].fill(0.0);
        for s in buf.iter_mut() {
            if !s.is_finite() {
                *s = 0.0;
            }
        }
        self.input_tap.write(buf);

        let mut flowing = true;
        for processor in &mut self.processors {
            processor.sync_params();
            processor.process_block_inplace(buf);
            if !flowing || !processor.stage().is_connected() {
                // Keep the DSP state moving on silence past a broken link.
                flowing = false;
                buf.fill(0.0);
            }
        }

        self.output_tap.write(buf);
        out.copy_from_slice(buf);
    }

    /// Reset all stage DSP state.
    pub fn reset(&mut self) {
        for processor in &mut self.processors {
            processor.reset();
        }
    }
}

impl fmt::Debug for PipelineProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineProcessor")
            .field("stages", &self.processors.len())
            .field("max_block", &self.scratch.len())
            .finish_non_exhaustive()
    }
}

/// Both halves of a freshly built chain.
#[derive(Debug)]
pub struct BuiltPipeline {
    /// Control side, kept by the session.
    pub pipeline: Pipeline,
    /// Audio side, moved to the audio thread.
    pub processor: PipelineProcessor,
}

/// Build and wire a chain fed by `source`.
///
/// One stage per kind is created with `settings` applied, linked in
/// [`StageKind::CHAIN_ORDER`], the last stage linked to the sink, and both taps
/// attached. Every call produces independent stages and taps.
pub fn build_pipeline(
    source: Box<dyn SampleSource>,
    settings: &ControlSettings,
    config: &PipelineConfig,
) -> Result<BuiltPipeline, PipelineError> {
    let sample_rate = source.sample_rate();
    if !source.is_live() {
        return Err(PipelineError::DeviceUnavailable(
            "source is not delivering samples".to_string(),
        ));
    }
    if !sample_rate.is_finite() || sample_rate <= 0.0 || sample_rate > MAX_SAMPLE_RATE {
        return Err(PipelineError::DeviceUnavailable(format!(
            "source reports invalid sample rate {sample_rate}"
        )));
    }

    let limits = StageLimits {
        sample_rate,
        max_delay_seconds: config.max_delay_seconds,
    };
    let meter_window = config.meter_window.clamp(1, MAX_METER_WINDOW);
    let block_size = config.max_block_size.clamp(1, MAX_BLOCK_SIZE_LIMIT);
    let stages: Vec<Stage> = StageKind::CHAIN_ORDER
        .iter()
        .map(|&kind| Stage::new(kind, &limits))
        .collect();

    let pipeline = Pipeline {
        stages,
        input_tap: Tap::new(TapPoint::PreChain, meter_window),
        output_tap: Tap::new(TapPoint::PostChain, meter_window),
        sample_rate,
    };
    settings.apply_to(&pipeline);

    for stage in &pipeline.stages {
        // downstream() is always the one endpoint connect() accepts.
        let _ = stage.connect(stage.kind().downstream());
    }
    pipeline.input_tap.connect();
    pipeline.output_tap.connect();

    let processors = pipeline
        .stages
        .iter()
        .map(|stage| processor_for(stage, sample_rate))
        .collect();

    let processor = PipelineProcessor {
        source,
        processors,
        input_tap: pipeline.input_tap.clone(),
        output_tap: pipeline.output_tap.clone(),
        scratch: vec![0.0; block_size],
    };

    #[cfg(feature = "tracing")]
    tracing::info!(sample_rate, "pipeline built");

    Ok(BuiltPipeline {
        pipeline,
        processor,
    })
}
