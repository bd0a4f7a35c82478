//! cpal-based audio backend implementation.
//!
//! [`CpalBackend`] is the default [`AudioBackend`]: ALSA on Linux, CoreAudio on
//! macOS, WASAPI on Windows. Both streams are opened with f32 samples and a
//! fixed buffer size and start playing immediately, so contexts are never
//! handed back suspended.
//!
//! cpal delivers raw device samples, so the capture constraints can only ever
//! be honoured in their default (all off) form. A request to turn any of them
//! on is logged and ignored.

use crate::backend::{
    AudioBackend, BackendStreamConfig, CaptureConstraints, ErrorCallback, InputCallback,
    OutputCallback, StreamControl, StreamDirection, StreamHandle,
};
use crate::device::device_name;
use crate::{AudioDevice, Error, Result};
use cpal::Host;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

/// cpal-based audio backend.
///
/// Holds a cpal [`Host`], the connection to the platform's audio system.
pub struct CpalBackend {
    host: Host,
}

impl CpalBackend {
    /// Create a backend on the platform's default audio host.
    pub fn new() -> Self {
        let host = cpal::default_host();
        tracing::info!(host = host.id().name(), "cpal backend initialized");
        Self { host }
    }

    /// Find a device by case-insensitive name substring, or return the default.
    fn find_device(&self, direction: StreamDirection, name: Option<&str>) -> Result<cpal::Device> {
        let Some(search) = name else {
            let device = match direction {
                StreamDirection::Input => self.host.default_input_device(),
                StreamDirection::Output => self.host.default_output_device(),
            };
            return device.ok_or(Error::NoDevice);
        };

        let search_lower = search.to_lowercase();
        let devices: Vec<cpal::Device> = match direction {
            StreamDirection::Input => self.host.input_devices(),
            StreamDirection::Output => self.host.output_devices(),
        }
        .map_err(|e| Error::Stream(e.to_string()))?
        .collect();

        devices
            .into_iter()
            .find(|device| {
                device_name(device)
                    .is_ok_and(|dev_name| dev_name.to_lowercase().contains(&search_lower))
            })
            .ok_or_else(|| {
                let kind = match direction {
                    StreamDirection::Input => "input",
                    StreamDirection::Output => "output",
                };
                Error::DeviceNotFound(format!("no {} device matching '{}'", kind, search))
            })
    }

    fn stream_config(config: &BackendStreamConfig) -> cpal::StreamConfig {
        cpal::StreamConfig {
            channels: config.channels,
            sample_rate: config.sample_rate,
            buffer_size: cpal::BufferSize::Fixed(config.buffer_size),
        }
    }
}

impl Default for CpalBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// A playing cpal stream. Dropping the inner stream stops it.
struct CpalStream {
    stream: Option<cpal::Stream>,
    direction: StreamDirection,
}

impl StreamControl for CpalStream {
    fn resume(&mut self) -> Result<()> {
        match &self.stream {
            Some(stream) => stream.play().map_err(|e| Error::Stream(e.to_string())),
            None => Ok(()),
        }
    }

    fn close(&mut self) -> Result<()> {
        if self.stream.take().is_some() {
            tracing::info!(direction = ?self.direction, "stream closed");
        }
        Ok(())
    }
}

impl AudioBackend for CpalBackend {
    fn name(&self) -> &'static str {
        "cpal"
    }

    fn list_devices(&self) -> Result<Vec<AudioDevice>> {
        // Same host: CpalBackend always uses the default one.
        crate::device::list_devices()
    }

    fn default_output_device(&self) -> Result<Option<AudioDevice>> {
        let (_, output) = crate::device::default_device()?;
        Ok(output)
    }

    fn default_input_device(&self) -> Result<Option<AudioDevice>> {
        let (input, _) = crate::device::default_device()?;
        Ok(input)
    }

    fn acquire_source(
        &self,
        config: &BackendStreamConfig,
        constraints: &CaptureConstraints,
        mut callback: InputCallback,
        mut error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        if constraints.any_enabled() {
            tracing::warn!(
                ?constraints,
                "cpal captures raw input; capture processing constraints are ignored"
            );
        }

        let device = self.find_device(StreamDirection::Input, config.device_name.as_deref())?;
        let stream = device
            .build_input_stream(
                &Self::stream_config(config),
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    callback(data);
                },
                move |err| {
                    error_callback(&err.to_string());
                },
                None,
            )
            .map_err(|e| Error::Stream(e.to_string()))?;

        stream.play().map_err(|e| Error::Stream(e.to_string()))?;
        tracing::info!(
            device = %device_name(&device).unwrap_or_default(),
            channels = config.channels,
            sample_rate = config.sample_rate,
            "input stream started"
        );

        Ok(StreamHandle::new(CpalStream {
            stream: Some(stream),
            direction: StreamDirection::Input,
        }))
    }

    fn create_context(
        &self,
        config: &BackendStreamConfig,
        mut callback: OutputCallback,
        mut error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        let device = self.find_device(StreamDirection::Output, config.device_name.as_deref())?;
        let stream = device
            .build_output_stream(
                &Self::stream_config(config),
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    callback(data);
                },
                move |err| {
                    error_callback(&err.to_string());
                },
                None,
            )
            .map_err(|e| Error::Stream(e.to_string()))?;

        stream.play().map_err(|e| Error::Stream(e.to_string()))?;
        tracing::info!(
            device = %device_name(&device).unwrap_or_default(),
            channels = config.channels,
            sample_rate = config.sample_rate,
            "output stream started"
        );

        Ok(StreamHandle::new(CpalStream {
            stream: Some(stream),
            direction: StreamDirection::Output,
        }))
    }

    fn preferred_channels(&self, direction: StreamDirection, config: &BackendStreamConfig) -> u16 {
        let Ok(device) = self.find_device(direction, config.device_name.as_deref()) else {
            return config.channels;
        };
        let default_config = match direction {
            StreamDirection::Input => device.default_input_config(),
            StreamDirection::Output => device.default_output_config(),
        };
        default_config.map_or(config.channels, |c| c.channels())
    }
}
