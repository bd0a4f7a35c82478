//! Microphone access check.
//!
//! Opens a capture stream with the same settings `run` would use, listens
//! briefly, and closes it again. A failure here is exactly the failure `run`
//! would report as "microphone unavailable".

use antiphase_io::{
    AudioBackend, BackendStreamConfig, CaptureConstraints, CpalBackend, SessionError,
    StreamDirection,
};
use clap::Args;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Args)]
pub struct CheckArgs {
    /// Input device name (partial match)
    #[arg(long)]
    input_device: Option<String>,

    /// Sample rate
    #[arg(long, default_value = "48000")]
    sample_rate: u32,

    /// How long to listen, in milliseconds
    #[arg(long, default_value = "250")]
    listen_ms: u64,
}

pub fn run(args: CheckArgs) -> anyhow::Result<()> {
    let backend = CpalBackend::new();
    let mut config = BackendStreamConfig {
        sample_rate: args.sample_rate,
        device_name: args.input_device,
        ..BackendStreamConfig::default()
    };
    config.channels = backend.preferred_channels(StreamDirection::Input, &config);

    let captured = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&captured);
    let opened = backend.acquire_source(
        &config,
        &CaptureConstraints::default(),
        Box::new(move |data: &[f32]| {
            counter.fetch_add(data.len(), Ordering::Relaxed);
        }),
        Box::new(|message: &str| tracing::warn!(error = message, "capture error")),
    );

    let mut stream = match opened {
        Ok(stream) => stream,
        Err(e) => {
            let err = SessionError::SourceUnavailable(e);
            println!("Microphone check failed: {}", err);
            println!("  {}", err.guidance());
            return Err(err.into());
        }
    };

    std::thread::sleep(Duration::from_millis(args.listen_ms));
    stream.close()?;

    let samples = captured.load(Ordering::Relaxed);
    let device = config.device_name.as_deref().unwrap_or("default input");
    if samples == 0 {
        println!(
            "Microphone opened ({}) but delivered no audio in {} ms.",
            device, args.listen_ms
        );
        println!("  The device may be muted or blocked; try a longer --listen-ms.");
    } else {
        println!(
            "Microphone OK ({}): {} samples captured at {} Hz, {} channel(s).",
            device, samples, config.sample_rate, config.channels
        );
    }
    Ok(())
}
