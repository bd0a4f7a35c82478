//! Frame cadence for the metering loop.

use crate::backend::AudioBackend;
use crate::session::{MeterTick, Session};
use std::time::{Duration, Instant};

/// External timing source that paces the metering loop, one wait per frame.
pub trait FrameClock {
    /// Block until the next frame is due.
    fn wait_frame(&mut self);
}

/// Sleeps to a fixed refresh rate.
///
/// Frames are scheduled on a fixed grid; if the caller falls behind by more
/// than one frame the grid restarts from now instead of bursting to catch up.
#[derive(Debug, Clone)]
pub struct IntervalClock {
    period: Duration,
    next: Instant,
}

impl IntervalClock {
    /// Clock ticking `refresh_hz` times per second (clamped to 1–1000 Hz).
    pub fn new(refresh_hz: f32) -> Self {
        let hz = if refresh_hz.is_finite() {
            refresh_hz.clamp(1.0, 1000.0)
        } else {
            60.0
        };
        let period = Duration::from_secs_f64(1.0 / f64::from(hz));
        Self {
            period,
            next: Instant::now() + period,
        }
    }

    /// Time between frames.
    pub fn period(&self) -> Duration {
        self.period
    }
}

impl Default for IntervalClock {
    fn default() -> Self {
        Self::new(60.0)
    }
}

impl FrameClock for IntervalClock {
    fn wait_frame(&mut self) {
        let now = Instant::now();
        if self.next > now {
            std::thread::sleep(self.next - now);
            self.next += self.period;
        } else if now - self.next > self.period {
            self.next = now + self.period;
        } else {
            self.next += self.period;
        }
    }
}

/// Drive `session.meter_tick()` once per frame.
///
/// Each iteration first asks `should_continue`, which may also mutate the
/// session (apply queued controls, stop it). The loop ends when
/// `should_continue` returns `false` or a tick reports
/// [`MeterTick::Stopped`]. Returns the number of readings published.
pub fn run_meter_loop<B, C, F>(session: &mut Session<B>, clock: &mut C, mut should_continue: F) -> u64
where
    B: AudioBackend,
    C: FrameClock + ?Sized,
    F: FnMut(&mut Session<B>) -> bool,
{
    let mut published = 0;
    loop {
        if !should_continue(session) {
            break;
        }
        match session.meter_tick() {
            MeterTick::Published(_) => published += 1,
            MeterTick::Stopped => break,
        }
        clock.wait_frame();
    }
    tracing::debug!(published, "meter loop ended");
    published
}
