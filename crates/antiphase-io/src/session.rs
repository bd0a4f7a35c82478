//! Session lifecycle: `Idle --start()--> Running --stop()--> Idle`.
//!
//! A [`Session`] owns everything a running canceller needs: the capture stream,
//! the output context, and the control half of the pipeline. The audio half
//! lives inside the output callback. Nothing is global; two sessions on two
//! backends are fully independent.
//!
//! Metering is cooperative. The caller invokes [`Session::meter_tick`] once per
//! display frame (see [`run_meter_loop`](crate::run_meter_loop)); each tick
//! reads both taps, publishes the levels, and reports [`MeterTick::Stopped`]
//! once the session is no longer running. Because `stop()` takes `&mut self`,
//! it can never interleave with a tick, and the first tick after it publishes
//! nothing.

use crate::Error;
use crate::backend::{AudioBackend, ErrorCallback, OutputCallback, StreamDirection, StreamHandle};
use crate::config::SessionConfig;
use crate::source::capture_channel;
use antiphase_core::{
    Control, ControlError, ControlSettings, ControlUpdate, MeterReading, ParameterController,
    Pipeline, PipelineError, PipelineProcessor, build_pipeline,
};
use std::fmt;
use thiserror::Error as ThisError;

/// Frames rendered per pass inside the output callback.
const RENDER_CHUNK_FRAMES: usize = 1024;

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No pipeline; control values are cached for the next start.
    Idle,
    /// Audio is flowing.
    Running,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
        })
    }
}

/// Errors surfaced by [`Session`].
///
/// None of these leave the session half-started: every failed `start()`
/// releases whatever it had acquired and returns to [`SessionState::Idle`].
#[derive(Debug, ThisError)]
pub enum SessionError {
    /// The microphone could not be opened (missing device or access denied).
    #[error("microphone unavailable: {0}")]
    SourceUnavailable(#[source] Error),

    /// The output context could not be created or resumed.
    #[error("audio output unavailable: {0}")]
    ContextUnavailable(#[source] Error),

    /// The operation is not valid in the current state.
    #[error("invalid state: {0}")]
    InvalidState(&'static str),

    /// The pipeline could not be built.
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// A control name was not recognised.
    #[error(transparent)]
    Control(#[from] ControlError),
}

impl SessionError {
    /// Short hint on how the user can recover.
    pub fn guidance(&self) -> &'static str {
        match self {
            SessionError::SourceUnavailable(_) => {
                "check that a microphone is connected and that this program may use it, then start again"
            }
            SessionError::ContextUnavailable(_) => {
                "check the output device and sample rate, then start again"
            }
            SessionError::InvalidState(_) => "stop the running session first",
            SessionError::Pipeline(_) => "the microphone stopped delivering audio; start again",
            SessionError::Control(_) => {
                "valid controls are phase_shift, gain, delay, low_freq and high_freq"
            }
        }
    }
}

/// Outcome of one [`Session::meter_tick`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MeterTick {
    /// Levels were read and published.
    Published(MeterReading),
    /// The session is not running; the metering loop should end.
    Stopped,
}

/// Receives every published meter reading.
pub type MeterCallback = Box<dyn FnMut(MeterReading) + Send>;

/// Resources held while running.
struct Running {
    pipeline: Pipeline,
    source: StreamHandle,
    context: StreamHandle,
}

/// One canceller instance on one backend.
pub struct Session<B: AudioBackend> {
    backend: B,
    config: SessionConfig,
    controller: ParameterController,
    meter_callback: Option<MeterCallback>,
    running: Option<Running>,
}

impl<B: AudioBackend> Session<B> {
    /// Create an idle session. Control values in `config` are clamped.
    pub fn new(backend: B, config: SessionConfig) -> Self {
        let controller = ParameterController::new(config.controls, config.max_delay_ms);
        Self {
            backend,
            config,
            controller,
            meter_callback: None,
            running: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        if self.running.is_some() {
            SessionState::Running
        } else {
            SessionState::Idle
        }
    }

    /// Whether audio is flowing.
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// The backend this session opens streams on.
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Settings this session was created with.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Current control values (cached while idle).
    pub fn controls(&self) -> &ControlSettings {
        self.controller.settings()
    }

    /// The live pipeline, while running.
    pub fn pipeline(&self) -> Option<&Pipeline> {
        self.running.as_ref().map(|r| &r.pipeline)
    }

    /// Register the receiver of meter readings, replacing any previous one.
    pub fn on_meter_update<F>(&mut self, callback: F)
    where
        F: FnMut(MeterReading) + Send + 'static,
    {
        self.meter_callback = Some(Box::new(callback));
    }

    /// Acquire the microphone, build the chain and start audio.
    ///
    /// Fails with [`SessionError::InvalidState`] if already running; the
    /// running session is not touched.
    pub fn start(&mut self) -> Result<(), SessionError> {
        if self.running.is_some() {
            tracing::warn!("start requested while running");
            return Err(SessionError::InvalidState("session is already running"));
        }

        let mut input = self.config.input_stream();
        input.channels = self
            .backend
            .preferred_channels(StreamDirection::Input, &input);
        input.sample_rate = self.backend.actual_sample_rate(&input);

        let (feed, source) = capture_channel(
            input.sample_rate as f32,
            input.channels,
            self.config.buffer_size as usize,
        );
        let mut source_handle = self
            .backend
            .acquire_source(
                &input,
                &self.config.constraints,
                feed.into_callback(),
                stream_error_logger(StreamDirection::Input),
            )
            .map_err(|e| {
                tracing::warn!(error = %e, "microphone unavailable");
                SessionError::SourceUnavailable(e)
            })?;

        let built = match build_pipeline(
            Box::new(source),
            self.controller.settings(),
            &self.config.pipeline(),
        ) {
            Ok(built) => built,
            Err(e) => {
                release(&mut source_handle, "source");
                return Err(e.into());
            }
        };
        let pipeline = built.pipeline;

        let mut output = self.config.output_stream();
        output.channels = self
            .backend
            .preferred_channels(StreamDirection::Output, &output);
        output.sample_rate = input.sample_rate;

        let context = self
            .backend
            .create_context(
                &output,
                render_callback(built.processor, output.channels),
                stream_error_logger(StreamDirection::Output),
            )
            .and_then(|mut context| {
                if context.is_suspended() {
                    tracing::debug!("resuming suspended output context");
                    context.resume()?;
                }
                Ok(context)
            });
        let context = match context {
            Ok(context) => context,
            Err(e) => {
                tracing::warn!(error = %e, "audio output unavailable");
                pipeline.teardown();
                release(&mut source_handle, "source");
                return Err(SessionError::ContextUnavailable(e));
            }
        };

        self.controller.attach(&pipeline);
        self.running = Some(Running {
            pipeline,
            source: source_handle,
            context,
        });
        tracing::info!(
            backend = self.backend.name(),
            sample_rate = input.sample_rate,
            input_channels = input.channels,
            output_channels = output.channels,
            "session started"
        );
        Ok(())
    }

    /// Tear everything down and return to idle. No-op while idle.
    ///
    /// Every stage and tap is disconnected, the source released and the
    /// context closed, whatever fails along the way. Failures are logged.
    pub fn stop(&mut self) {
        let Some(mut running) = self.running.take() else {
            tracing::debug!("stop requested while idle");
            return;
        };

        self.controller.detach();
        let links = running.pipeline.teardown();
        release(&mut running.source, "source");
        release(&mut running.context, "context");
        tracing::info!(links, "session stopped");
    }

    /// Set a control by name (e.g. `"phaseShift"`, `"low_freq"`).
    pub fn set_control(&mut self, name: &str, value: f32) -> Result<ControlUpdate, SessionError> {
        let control: Control = name.parse()?;
        Ok(self.set_control_value(control, value))
    }

    /// Set a control. Applied to the running chain at once, otherwise cached.
    pub fn set_control_value(&mut self, control: Control, value: f32) -> ControlUpdate {
        self.controller.set_control(control, value)
    }

    /// One metering iteration.
    ///
    /// While running, reads both taps, hands the levels to the meter callback
    /// and returns them. Otherwise publishes nothing and returns
    /// [`MeterTick::Stopped`].
    pub fn meter_tick(&mut self) -> MeterTick {
        let Some(running) = self.running.as_ref() else {
            return MeterTick::Stopped;
        };
        // Tap windows are never empty, so metering cannot fail here.
        let reading = MeterReading {
            input: running.pipeline.input_tap().level().unwrap_or(0.0),
            output: running.pipeline.output_tap().level().unwrap_or(0.0),
        };
        if let Some(callback) = self.meter_callback.as_mut() {
            callback(reading);
        }
        MeterTick::Published(reading)
    }
}

impl<B: AudioBackend> Drop for Session<B> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<B: AudioBackend> fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("backend", &self.backend.name())
            .field("state", &self.state())
            .field("controls", self.controls())
            .finish_non_exhaustive()
    }
}

/// Close a stream during teardown, logging instead of failing.
fn release(handle: &mut StreamHandle, what: &'static str) {
    if let Err(e) = handle.close() {
        tracing::warn!(stream = what, error = %e, "close failed during teardown");
    }
}

fn stream_error_logger(direction: StreamDirection) -> ErrorCallback {
    Box::new(move |message: &str| {
        tracing::warn!(?direction, error = message, "stream error");
    })
}

/// Output callback: render mono and copy it to every output channel.
fn render_callback(mut processor: PipelineProcessor, channels: u16) -> OutputCallback {
    let channels = usize::from(channels.max(1));
    let mut mono = vec![0.0f32; RENDER_CHUNK_FRAMES];
    Box::new(move |data: &mut [f32]| {
        for chunk in data.chunks_mut(RENDER_CHUNK_FRAMES * channels) {
            let frames = chunk.len().div_ceil(channels);
            let block = &mut mono[..frames];
            processor.render(block);
            for (frame, &sample) in chunk.chunks_mut(channels).zip(block.iter()) {
                frame.fill(sample);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_carry_guidance() {
        let err = SessionError::SourceUnavailable(Error::NoDevice);
        assert!(err.to_string().contains("microphone unavailable"));
        assert!(err.guidance().contains("microphone"));

        let err = SessionError::InvalidState("session is already running");
        assert_eq!(err.to_string(), "invalid state: session is already running");
    }

    #[test]
    fn state_display() {
        assert_eq!(SessionState::Idle.to_string(), "idle");
        assert_eq!(SessionState::Running.to_string(), "running");
    }
}
