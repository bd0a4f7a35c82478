//! Pluggable audio backend abstraction.
//!
//! A running session needs two things from the platform: a capture stream on
//! the microphone (the *source*) and an output stream that pulls rendered
//! audio (the *context*). [`AudioBackend`] provides both, so the session
//! never sees platform types:
//!
//! ```text
//! ┌──────────────────────────────────┐
//! │             Session              │
//! └──────────────┬───────────────────┘
//!                │ uses AudioBackend trait
//!                ▼
//! ┌──────────────────────────────────┐
//! │        AudioBackend trait        │
//! │ acquire_source / create_context  │
//! └──────────────┬───────────────────┘
//!        ┌───────┴────────┐
//!        ▼                ▼
//! ┌─────────────┐  ┌─────────────┐
//! │ CpalBackend │  │ test mocks  │
//! └─────────────┘  └─────────────┘
//! ```
//!
//! Callbacks are boxed closures so the trait stays object-safe. Streams come
//! back as a [`StreamHandle`], which closes the stream when dropped.

use crate::{AudioDevice, Result};
use serde::{Deserialize, Serialize};

/// Configuration for opening one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendStreamConfig {
    /// Requested sample rate in Hz.
    pub sample_rate: u32,
    /// Preferred buffer size in frames.
    pub buffer_size: u32,
    /// Number of interleaved channels.
    pub channels: u16,
    /// Device name substring (system default if `None`).
    pub device_name: Option<String>,
}

impl Default for BackendStreamConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            buffer_size: 256,
            channels: 1,
            device_name: None,
        }
    }
}

/// Which side of the device a stream uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamDirection {
    /// Capture.
    Input,
    /// Playback.
    Output,
}

/// Processing the platform may apply to captured audio before we see it.
///
/// All off by default: the chain needs the raw microphone signal, and platform
/// echo cancellation would try to remove the very output it produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConstraints {
    /// Platform echo cancellation.
    pub echo_cancellation: bool,
    /// Platform noise suppression.
    pub noise_suppression: bool,
    /// Platform automatic gain control.
    pub auto_gain_control: bool,
}

impl CaptureConstraints {
    /// Whether any platform processing is requested.
    pub fn any_enabled(&self) -> bool {
        self.echo_cancellation || self.noise_suppression || self.auto_gain_control
    }
}

/// Backend-specific control over an open stream.
pub trait StreamControl: Send {
    /// Whether the stream is open but not yet running.
    fn is_suspended(&self) -> bool {
        false
    }

    /// Start or continue a suspended stream.
    fn resume(&mut self) -> Result<()>;

    /// Stop the stream and release the device. Called at most once.
    fn close(&mut self) -> Result<()>;
}

/// Type-erased open stream.
///
/// `close()` releases the device and may be called any number of times; only
/// the first call reaches the backend. Dropping an open handle closes it and
/// discards any error.
pub struct StreamHandle {
    inner: Option<Box<dyn StreamControl>>,
}

impl StreamHandle {
    /// Wrap a backend stream.
    pub fn new<T: StreamControl + 'static>(stream: T) -> Self {
        Self {
            inner: Some(Box::new(stream)),
        }
    }

    /// Whether the stream was created suspended and still needs [`resume`](Self::resume).
    pub fn is_suspended(&self) -> bool {
        self.inner.as_ref().is_some_and(|s| s.is_suspended())
    }

    /// Resume a suspended stream. No-op on a closed handle.
    pub fn resume(&mut self) -> Result<()> {
        match self.inner.as_mut() {
            Some(stream) => stream.resume(),
            None => Ok(()),
        }
    }

    /// Close the stream. Later calls return `Ok(())`.
    pub fn close(&mut self) -> Result<()> {
        match self.inner.take() {
            Some(mut stream) => stream.close(),
            None => Ok(()),
        }
    }

    /// Whether [`close`](Self::close) has been called.
    pub fn is_closed(&self) -> bool {
        self.inner.is_none()
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for StreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamHandle")
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

/// Audio output callback.
///
/// Runs on the real-time audio thread and must fill the whole buffer with
/// interleaved samples (`[L0, R0, L1, R1, ...]` for stereo). Must not
/// allocate, lock or block.
pub type OutputCallback = Box<dyn FnMut(&mut [f32]) + Send>;

/// Audio input callback, called with interleaved captured samples.
pub type InputCallback = Box<dyn FnMut(&[f32]) + Send>;

/// Called with a human-readable message when a stream reports an error.
pub type ErrorCallback = Box<dyn FnMut(&str) + Send>;

/// Pluggable audio backend.
///
/// Object-safe, so sessions can also be driven through `Box<dyn AudioBackend>`.
pub trait AudioBackend: Send {
    /// Human-readable name of this backend (e.g., "cpal", "mock").
    fn name(&self) -> &str;

    /// List all available audio devices.
    fn list_devices(&self) -> Result<Vec<AudioDevice>>;

    /// Get the default output device, if any.
    fn default_output_device(&self) -> Result<Option<AudioDevice>>;

    /// Get the default input device, if any.
    fn default_input_device(&self) -> Result<Option<AudioDevice>>;

    /// Open and start the microphone capture stream.
    ///
    /// `callback` receives captured interleaved samples on the audio thread.
    /// Fails if the device is missing, access is denied, or the configuration
    /// is unsupported.
    fn acquire_source(
        &self,
        config: &BackendStreamConfig,
        constraints: &CaptureConstraints,
        callback: InputCallback,
        error_callback: ErrorCallback,
    ) -> Result<StreamHandle>;

    /// Open the output context.
    ///
    /// `callback` is pulled on the audio thread for every output buffer. The
    /// returned stream may be suspended; callers check
    /// [`StreamHandle::is_suspended`] and resume it.
    fn create_context(
        &self,
        config: &BackendStreamConfig,
        callback: OutputCallback,
        error_callback: ErrorCallback,
    ) -> Result<StreamHandle>;

    /// Sample rate the backend will actually run `config` at.
    ///
    /// Default returns the requested rate unchanged.
    fn actual_sample_rate(&self, config: &BackendStreamConfig) -> u32 {
        config.sample_rate
    }

    /// Channel count a stream in `direction` will be opened with.
    ///
    /// Default returns `config.channels`.
    fn preferred_channels(&self, direction: StreamDirection, config: &BackendStreamConfig) -> u16 {
        let _ = direction;
        config.channels
    }
}

impl<B: AudioBackend + ?Sized> AudioBackend for Box<B> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn list_devices(&self) -> Result<Vec<AudioDevice>> {
        (**self).list_devices()
    }

    fn default_output_device(&self) -> Result<Option<AudioDevice>> {
        (**self).default_output_device()
    }

    fn default_input_device(&self) -> Result<Option<AudioDevice>> {
        (**self).default_input_device()
    }

    fn acquire_source(
        &self,
        config: &BackendStreamConfig,
        constraints: &CaptureConstraints,
        callback: InputCallback,
        error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        (**self).acquire_source(config, constraints, callback, error_callback)
    }

    fn create_context(
        &self,
        config: &BackendStreamConfig,
        callback: OutputCallback,
        error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        (**self).create_context(config, callback, error_callback)
    }

    fn actual_sample_rate(&self, config: &BackendStreamConfig) -> u32 {
        (**self).actual_sample_rate(config)
    }

    fn preferred_channels(&self, direction: StreamDirection, config: &BackendStreamConfig) -> u16 {
        (**self).preferred_channels(direction, config)
    }
}
