//! Session lifecycle tests against a deterministic mock backend.
//!
//! The mock keeps the callbacks the session hands it, so tests can pump
//! captured audio in and pull rendered audio out without any hardware.

use antiphase_core::{Control, MeterReading, StageKind, StageParam};
use antiphase_io::{
    AudioBackend, AudioDevice, BackendStreamConfig, CaptureConstraints, Error, ErrorCallback,
    FrameClock, InputCallback, MeterTick, OutputCallback, Result, Session, SessionConfig,
    SessionError, SessionState, StreamControl, StreamDirection, StreamHandle, run_meter_loop,
};
use parking_lot::Mutex;
use std::sync::Arc;

#[derive(Default)]
struct MockState {
    input: Option<InputCallback>,
    output: Option<OutputCallback>,
    fail_source: bool,
    fail_context: bool,
    fail_close: bool,
    start_suspended: bool,
    sources_opened: usize,
    contexts_opened: usize,
    open_streams: usize,
    resumes: usize,
    constraints: Option<CaptureConstraints>,
    output_channels: u16,
}

#[derive(Clone, Default)]
struct MockBackend {
    state: Arc<Mutex<MockState>>,
}

impl MockBackend {
    fn new() -> Self {
        let backend = Self::default();
        backend.state.lock().output_channels = 2;
        backend
    }

    fn configure(&self, f: impl FnOnce(&mut MockState)) -> &Self {
        f(&mut self.state.lock());
        self
    }

    fn pump_input(&self, data: &[f32]) {
        if let Some(callback) = self.state.lock().input.as_mut() {
            callback(data);
        }
    }

    fn pull_output(&self, frames: usize) -> Vec<f32> {
        let mut state = self.state.lock();
        let channels = usize::from(state.output_channels);
        let mut buffer = vec![0.0; frames * channels];
        if let Some(callback) = state.output.as_mut() {
            callback(&mut buffer);
        }
        buffer
    }

    /// Feed a 1 kHz tone and render the same amount of output.
    fn run_tone(&self, blocks: usize) -> Vec<f32> {
        let mut last = Vec::new();
        for block in 0..blocks {
            let input: Vec<f32> = (0..256)
                .map(|i| {
                    let n = (block * 256 + i) as f32;
                    0.2 * (core::f32::consts::TAU * 1000.0 * n / 48000.0).sin()
                })
                .collect();
            self.pump_input(&input);
            last = self.pull_output(256);
        }
        last
    }

    fn open_streams(&self) -> usize {
        self.state.lock().open_streams
    }
}

struct MockStream {
    state: Arc<Mutex<MockState>>,
    direction: StreamDirection,
    suspended: bool,
}

impl StreamControl for MockStream {
    fn is_suspended(&self) -> bool {
        self.suspended
    }

    fn resume(&mut self) -> Result<()> {
        self.suspended = false;
        self.state.lock().resumes += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.state.lock();
        state.open_streams -= 1;
        match self.direction {
            StreamDirection::Input => state.input = None,
            StreamDirection::Output => state.output = None,
        }
        if state.fail_close {
            Err(Error::Stream("device vanished".into()))
        } else {
            Ok(())
        }
    }
}

fn mock_device(name: &str) -> AudioDevice {
    AudioDevice {
        name: name.to_string(),
        is_input: true,
        is_output: true,
        default_sample_rate: 48000,
    }
}

impl AudioBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    fn list_devices(&self) -> Result<Vec<AudioDevice>> {
        Ok(vec![mock_device("Mock Device")])
    }

    fn default_output_device(&self) -> Result<Option<AudioDevice>> {
        Ok(Some(mock_device("Mock Device")))
    }

    fn default_input_device(&self) -> Result<Option<AudioDevice>> {
        Ok(Some(mock_device("Mock Device")))
    }

    fn acquire_source(
        &self,
        _config: &BackendStreamConfig,
        constraints: &CaptureConstraints,
        callback: InputCallback,
        _error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        let mut state = self.state.lock();
        state.constraints = Some(*constraints);
        if state.fail_source {
            return Err(Error::Stream("permission denied".into()));
        }
        state.input = Some(callback);
        state.sources_opened += 1;
        state.open_streams += 1;
        Ok(StreamHandle::new(MockStream {
            state: Arc::clone(&self.state),
            direction: StreamDirection::Input,
            suspended: false,
        }))
    }

    fn create_context(
        &self,
        _config: &BackendStreamConfig,
        callback: OutputCallback,
        _error_callback: ErrorCallback,
    ) -> Result<StreamHandle> {
        let mut state = self.state.lock();
        if state.fail_context {
            return Err(Error::NoDevice);
        }
        state.output = Some(callback);
        state.contexts_opened += 1;
        state.open_streams += 1;
        Ok(StreamHandle::new(MockStream {
            state: Arc::clone(&self.state),
            direction: StreamDirection::Output,
            suspended: state.start_suspended,
        }))
    }

    fn preferred_channels(&self, direction: StreamDirection, config: &BackendStreamConfig) -> u16 {
        match direction {
            StreamDirection::Input => config.channels,
            StreamDirection::Output => self.state.lock().output_channels,
        }
    }
}

fn session(backend: &MockBackend) -> Session<MockBackend> {
    Session::new(backend.clone(), SessionConfig::default())
}

struct CountingClock(usize);

impl FrameClock for CountingClock {
    fn wait_frame(&mut self) {
        self.0 += 1;
    }
}

#[test]
fn start_then_stop_leaves_nothing_connected() {
    let backend = MockBackend::new();
    let mut session = session(&backend);
    assert_eq!(session.state(), SessionState::Idle);

    session.start().unwrap();
    assert_eq!(session.state(), SessionState::Running);
    let pipeline = session.pipeline().unwrap();
    assert!(pipeline.is_wired());
    let stages = pipeline.stages().to_vec();
    let taps = [pipeline.input_tap().clone(), pipeline.output_tap().clone()];
    assert_eq!(backend.open_streams(), 2);

    session.stop();
    assert_eq!(session.state(), SessionState::Idle);
    assert!(session.pipeline().is_none());
    assert!(stages.iter().all(|s| !s.is_connected()));
    assert!(taps.iter().all(|t| !t.is_connected()));
    assert_eq!(backend.open_streams(), 0);
}

#[test]
fn stop_while_idle_is_a_no_op() {
    let backend = MockBackend::new();
    let mut session = session(&backend);
    session.stop();
    session.stop();
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(backend.open_streams(), 0);
}

#[test]
fn second_start_fails_and_leaves_first_running() {
    let backend = MockBackend::new();
    let mut session = session(&backend);
    session.start().unwrap();
    backend.run_tone(8);

    let err = session.start().unwrap_err();
    assert!(matches!(err, SessionError::InvalidState(_)));
    assert_eq!(session.state(), SessionState::Running);
    assert_eq!(backend.state.lock().sources_opened, 1);
    assert_eq!(backend.state.lock().contexts_opened, 1);
    assert!(session.pipeline().unwrap().is_wired());

    let out = backend.run_tone(4);
    assert!(out.iter().any(|s| *s != 0.0));
}

#[test]
fn audio_flows_from_microphone_to_every_output_channel() {
    let backend = MockBackend::new();
    let mut session = session(&backend);
    session.start().unwrap();

    let out = backend.run_tone(40);
    assert!(out.iter().any(|s| s.abs() > 0.05));
    for frame in out.chunks(2) {
        assert_eq!(frame[0], frame[1]);
    }

    let MeterTick::Published(reading) = session.meter_tick() else {
        panic!("running session must publish");
    };
    assert!(reading.input > 30.0, "input level {}", reading.input);
    assert!(reading.output > reading.input, "output level {}", reading.output);
}

#[test]
fn meter_publishes_nothing_after_stop() {
    let backend = MockBackend::new();
    let mut session = session(&backend);
    let published: Arc<Mutex<Vec<MeterReading>>> = Arc::default();
    let sink = Arc::clone(&published);
    session.on_meter_update(move |reading| sink.lock().push(reading));

    assert_eq!(session.meter_tick(), MeterTick::Stopped);
    assert!(published.lock().is_empty());

    session.start().unwrap();
    assert!(matches!(session.meter_tick(), MeterTick::Published(_)));
    assert_eq!(published.lock().len(), 1);

    session.stop();
    assert_eq!(session.meter_tick(), MeterTick::Stopped);
    assert_eq!(session.meter_tick(), MeterTick::Stopped);
    assert_eq!(published.lock().len(), 1);
}

#[test]
fn meter_loop_ends_once_stopped() {
    let backend = MockBackend::new();
    let mut session = session(&backend);
    session.start().unwrap();

    let mut clock = CountingClock(0);
    let mut iterations = 0;
    let published = run_meter_loop(&mut session, &mut clock, |session| {
        iterations += 1;
        if iterations == 4 {
            session.stop();
        }
        true
    });
    assert_eq!(published, 3);
    assert_eq!(clock.0, 3);
    assert_eq!(session.state(), SessionState::Idle);
}

#[test]
fn meter_loop_honours_should_continue() {
    let backend = MockBackend::new();
    let mut session = session(&backend);
    session.start().unwrap();

    let mut clock = CountingClock(0);
    let mut budget = 5;
    let published = run_meter_loop(&mut session, &mut clock, |_| {
        budget -= 1;
        budget >= 0
    });
    assert_eq!(published, 5);
    assert_eq!(session.state(), SessionState::Running);
}

#[test]
fn denied_microphone_is_source_unavailable() {
    let backend = MockBackend::new();
    backend.configure(|s| s.fail_source = true);
    let mut session = session(&backend);

    let err = session.start().unwrap_err();
    assert!(matches!(err, SessionError::SourceUnavailable(_)));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(backend.open_streams(), 0);

    // The user retries once access is granted.
    backend.configure(|s| s.fail_source = false);
    session.start().unwrap();
    assert_eq!(session.state(), SessionState::Running);
}

#[test]
fn failed_context_releases_the_microphone() {
    let backend = MockBackend::new();
    backend.configure(|s| s.fail_context = true);
    let mut session = session(&backend);

    let err = session.start().unwrap_err();
    assert!(matches!(err, SessionError::ContextUnavailable(_)));
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(backend.state.lock().sources_opened, 1);
    assert_eq!(backend.open_streams(), 0);
}

#[test]
fn suspended_context_is_resumed() {
    let backend = MockBackend::new();
    backend.configure(|s| s.start_suspended = true);
    let mut session = session(&backend);
    session.start().unwrap();
    assert_eq!(backend.state.lock().resumes, 1);
}

#[test]
fn teardown_completes_when_close_fails() {
    let backend = MockBackend::new();
    let mut session = session(&backend);
    session.start().unwrap();
    let stages = session.pipeline().unwrap().stages().to_vec();

    backend.configure(|s| s.fail_close = true);
    session.stop();
    assert_eq!(session.state(), SessionState::Idle);
    assert_eq!(backend.open_streams(), 0);
    assert!(stages.iter().all(|s| !s.is_connected()));
}

#[test]
fn controls_are_cached_while_idle_and_applied_while_running() {
    let backend = MockBackend::new();
    let mut session = session(&backend);

    let update = session.set_control("gain", 80.0).unwrap();
    assert_eq!(update.applied, None);
    assert_eq!(session.controls().gain, 80.0);

    session.start().unwrap();
    let gain = session
        .pipeline()
        .unwrap()
        .stage(StageKind::OutputGain)
        .parameter(StageParam::Gain)
        .unwrap();
    assert!((gain - 2.4).abs() < 1e-6);

    let update = session.set_control("phaseShift", 90.0).unwrap();
    assert_eq!(update.applied, Some(-1.25));
    assert_eq!(
        session
            .pipeline()
            .unwrap()
            .stage(StageKind::Inverter)
            .parameter(StageParam::Gain),
        Ok(-1.25)
    );

    // Bad values clamp instead of failing.
    let update = session.set_control_value(Control::LowFreq, 1.0);
    assert_eq!(update.value, 20.0);

    assert!(matches!(
        session.set_control("volume", 1.0),
        Err(SessionError::Control(_))
    ));

    // Values survive a restart.
    session.stop();
    session.start().unwrap();
    assert_eq!(
        session
            .pipeline()
            .unwrap()
            .stage(StageKind::Inverter)
            .parameter(StageParam::Gain),
        Ok(-1.25)
    );
}

#[test]
fn raw_capture_is_requested() {
    let backend = MockBackend::new();
    let mut session = session(&backend);
    session.start().unwrap();
    assert_eq!(
        backend.state.lock().constraints,
        Some(CaptureConstraints::default())
    );
}

#[test]
fn dropping_a_running_session_closes_streams() {
    let backend = MockBackend::new();
    {
        let mut session = session(&backend);
        session.start().unwrap();
        assert_eq!(backend.open_streams(), 2);
    }
    assert_eq!(backend.open_streams(), 0);
}

#[test]
fn sessions_work_through_a_boxed_backend() {
    let backend = MockBackend::new();
    let boxed: Box<dyn AudioBackend> = Box::new(backend.clone());
    let mut session = Session::new(boxed, SessionConfig::default());
    session.start().unwrap();
    assert_eq!(session.backend().name(), "mock");
    session.stop();
    assert_eq!(backend.open_streams(), 0);
}
