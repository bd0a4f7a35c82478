//! Capture-to-pipeline hand-off.
//!
//! The capture stream and the output stream run on separate audio threads.
//! [`capture_channel`] connects them with a bounded lock-free channel: the
//! [`CaptureFeed`] side downmixes each captured frame to mono and pushes it,
//! the [`ChannelSource`] side is the pipeline's [`SampleSource`] and drains it
//! from the output callback.
//!
//! Neither side ever blocks. A full channel drops the newest samples; an empty
//! one makes the pipeline pad with silence. When the input clock runs ahead of
//! the output clock the backlog is trimmed so latency stays bounded.

use antiphase_core::SampleSource;
use crossbeam_channel::{Receiver, Sender, TrySendError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::backend::InputCallback;

/// Channel capacity, in device buffers.
const CAPACITY_BUFFERS: usize = 8;

/// Backlog kept before trimming, in device buffers.
const BACKLOG_BUFFERS: usize = 4;

/// Largest device buffer the channel is sized for, in frames.
pub(crate) const MAX_BUFFER_FRAMES: usize = 16384;

/// Create a connected feed/source pair.
///
/// `buffer_frames` is the device buffer size; one buffer of silence is queued
/// up front so the first output callbacks do not underrun. Sizes above
/// 16384 frames are clamped.
pub fn capture_channel(
    sample_rate: f32,
    channels: u16,
    buffer_frames: usize,
) -> (CaptureFeed, ChannelSource) {
    let buffer_frames = buffer_frames.clamp(1, MAX_BUFFER_FRAMES);
    let (tx, rx) = crossbeam_channel::bounded::<f32>(buffer_frames * CAPACITY_BUFFERS);
    for _ in 0..buffer_frames {
        let _ = tx.try_send(0.0);
    }

    let live = Arc::new(AtomicBool::new(true));
    let dropped = Arc::new(AtomicU64::new(0));
    let feed = CaptureFeed {
        tx,
        channels: usize::from(channels.max(1)),
        live: Arc::clone(&live),
        dropped: Arc::clone(&dropped),
    };
    let source = ChannelSource {
        rx,
        sample_rate,
        live,
        dropped,
        max_backlog: buffer_frames * BACKLOG_BUFFERS,
    };
    (feed, source)
}

/// Producer half, driven by the capture callback.
pub struct CaptureFeed {
    tx: Sender<f32>,
    channels: usize,
    live: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
}

impl CaptureFeed {
    /// Downmix interleaved frames to mono and queue them.
    ///
    /// A trailing partial frame is ignored.
    pub fn push(&mut self, interleaved: &[f32]) {
        let scale = 1.0 / self.channels as f32;
        for frame in interleaved.chunks_exact(self.channels) {
            let mono = frame.iter().sum::<f32>() * scale;
            match self.tx.try_send(mono) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.dropped.fetch_add(1, Ordering::Relaxed);
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.live.store(false, Ordering::Release);
                    return;
                }
            }
        }
    }

    /// Box this feed as a backend input callback.
    pub fn into_callback(self) -> InputCallback {
        let mut feed = self;
        Box::new(move |data: &[f32]| feed.push(data))
    }
}

impl Drop for CaptureFeed {
    fn drop(&mut self) {
        self.live.store(false, Ordering::Release);
    }
}

/// Mono [`SampleSource`] draining a [`CaptureFeed`].
pub struct ChannelSource {
    rx: Receiver<f32>,
    sample_rate: f32,
    live: Arc<AtomicBool>,
    dropped: Arc<AtomicU64>,
    max_backlog: usize,
}

impl ChannelSource {
    /// Samples the feed could not queue because the channel was full.
    pub fn dropped_samples(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Samples currently queued.
    pub fn backlog(&self) -> usize {
        self.rx.len()
    }
}

impl SampleSource for ChannelSource {
    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn is_live(&self) -> bool {
        self.live.load(Ordering::Acquire)
    }

    fn read(&mut self, out: &mut [f32]) -> usize {
        let excess = self.rx.len().saturating_sub(self.max_backlog + out.len());
        for _ in 0..excess {
            if self.rx.try_recv().is_err() {
                break;
            }
        }

        let mut filled = 0;
        for slot in out.iter_mut() {
            match self.rx.try_recv() {
                Ok(sample) => {
                    *slot = sample;
                    filled += 1;
                }
                Err(_) => break,
            }
        }
        filled
    }
}

impl std::fmt::Debug for ChannelSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelSource")
            .field("sample_rate", &self.sample_rate)
            .field("backlog", &self.backlog())
            .field("live", &self.is_live())
            .finish_non_exhaustive()
    }
}
