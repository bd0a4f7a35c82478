//! Audio devices and session lifecycle for antiphase.
//!
//! This crate provides:
//!
//! - **Backends**: the [`AudioBackend`] trait and its cpal implementation
//!   [`CpalBackend`], which open the microphone capture stream and the output
//!   context
//! - **Capture**: [`ChannelSource`], the pipeline's [`SampleSource`] fed from
//!   the capture callback
//! - **Sessions**: [`Session`] owns one pipeline from `start()` to `stop()`
//!   and publishes meter readings
//! - **Metering cadence**: [`FrameClock`] and [`run_meter_loop`]
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use antiphase_io::{CpalBackend, IntervalClock, Session, SessionConfig, run_meter_loop};
//!
//! let mut session = Session::new(CpalBackend::new(), SessionConfig::default());
//! session.on_meter_update(|reading| println!("{:.0} / {:.0}", reading.input, reading.output));
//! session.start()?;
//! session.set_control("phaseShift", 170.0)?;
//!
//! let mut clock = IntervalClock::new(60.0);
//! run_meter_loop(&mut session, &mut clock, |_| keep_going());
//! session.stop();
//! ```
//!
//! [`SampleSource`]: antiphase_core::SampleSource

pub mod backend;
mod clock;
mod config;
pub mod cpal_backend;
mod device;
mod session;
mod source;

pub use backend::{
    AudioBackend, BackendStreamConfig, CaptureConstraints, ErrorCallback, InputCallback,
    OutputCallback, StreamControl, StreamDirection, StreamHandle,
};
pub use clock::{FrameClock, IntervalClock, run_meter_loop};
pub use config::{MAX_DELAY_CEILING_MS, SessionConfig};
pub use cpal_backend::CpalBackend;
pub use device::{AudioDevice, default_device, list_devices};
pub use session::{MeterCallback, MeterTick, Session, SessionError, SessionState};
pub use source::{CaptureFeed, ChannelSource, capture_channel};

/// Error types for audio device operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Audio stream setup or runtime error.
    #[error("Audio stream error: {0}")]
    Stream(String),

    /// No audio device available on the system.
    #[error("No audio device available")]
    NoDevice,

    /// The requested audio device was not found.
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// A session setting is unusable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience result type for audio device operations.
pub type Result<T> = std::result::Result<T, Error>;
