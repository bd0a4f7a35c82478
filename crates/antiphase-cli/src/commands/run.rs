//! Live cancellation command.
//!
//! Starts a session, redraws both meters in place, and reads control lines
//! from stdin while audio runs:
//!
//! ```text
//! phase_shift=175     set a control (name=value or name value)
//! stop / start        stop or restart the session
//! status              show state and control values
//! quit                exit
//! ```

use crate::config::{ConfigError, load_config};
use crate::meter::meter_line;
use antiphase_core::Control;
use antiphase_io::{
    AudioBackend, CpalBackend, IntervalClock, Session, SessionConfig, run_meter_loop,
};
use clap::Args;
use crossbeam_channel::{Receiver, RecvTimeoutError};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How often an idle session checks for Ctrl+C.
const IDLE_POLL: Duration = Duration::from_millis(100);

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Settings file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Phase shift in degrees (0-360, 180 = plain inversion)
    #[arg(long)]
    phase_shift: Option<f32>,

    /// Output gain in percent (0-100)
    #[arg(long)]
    gain: Option<f32>,

    /// Delay in milliseconds
    #[arg(long)]
    delay: Option<f32>,

    /// Band-pass centre frequency in Hz
    #[arg(long)]
    low_freq: Option<f32>,

    /// Low-pass cutoff frequency in Hz
    #[arg(long)]
    high_freq: Option<f32>,

    /// Input device name (partial match)
    #[arg(long)]
    input_device: Option<String>,

    /// Output device name (partial match)
    #[arg(long)]
    output_device: Option<String>,

    /// Sample rate
    #[arg(long)]
    sample_rate: Option<u32>,

    /// Buffer size in frames
    #[arg(long)]
    buffer_size: Option<u32>,

    /// Meter refresh rate in Hz
    #[arg(long)]
    refresh_hz: Option<f32>,
}

impl RunArgs {
    /// Command-line values take precedence over the settings file.
    fn apply_overrides(&self, config: &mut SessionConfig) {
        let controls = [
            (Control::PhaseShift, self.phase_shift),
            (Control::Gain, self.gain),
            (Control::Delay, self.delay),
            (Control::LowFreq, self.low_freq),
            (Control::HighFreq, self.high_freq),
        ];
        for (control, value) in controls {
            if let Some(value) = value {
                config.controls.set(control, value, config.max_delay_ms);
            }
        }

        if let Some(name) = &self.input_device {
            config.input_device = Some(name.clone());
        }
        if let Some(name) = &self.output_device {
            config.output_device = Some(name.clone());
        }
        if let Some(rate) = self.sample_rate {
            config.sample_rate = rate;
        }
        if let Some(size) = self.buffer_size {
            config.buffer_size = size;
        }
        if let Some(hz) = self.refresh_hz {
            config.meter_refresh_hz = hz;
        }
    }
}

/// A line typed while running.
#[derive(Debug, Clone, PartialEq)]
enum ConsoleCommand {
    Set(String, f32),
    Start,
    Stop,
    Status,
    Help,
    Quit,
}

/// Parse one stdin line. Blank lines yield `None`.
fn parse_command(line: &str) -> Result<Option<ConsoleCommand>, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }

    let (name, value) = match line.split_once('=') {
        Some((name, value)) => (name.trim(), Some(value.trim())),
        None => {
            let mut parts = line.split_whitespace();
            let name = parts.next().unwrap_or_default();
            (name, parts.next())
        }
    };

    let Some(value) = value else {
        return match name.to_ascii_lowercase().as_str() {
            "start" => Ok(Some(ConsoleCommand::Start)),
            "stop" => Ok(Some(ConsoleCommand::Stop)),
            "status" => Ok(Some(ConsoleCommand::Status)),
            "help" | "?" => Ok(Some(ConsoleCommand::Help)),
            "quit" | "exit" | "q" => Ok(Some(ConsoleCommand::Quit)),
            other => Err(format!("unknown command '{other}' (try 'help')")),
        };
    };

    let value: f32 = value
        .parse()
        .map_err(|_| format!("'{value}' is not a number"))?;
    Ok(Some(ConsoleCommand::Set(name.to_string(), value)))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn handle_command<B: AudioBackend>(session: &mut Session<B>, command: ConsoleCommand) -> Flow {
    match command {
        ConsoleCommand::Set(name, value) => match session.set_control(&name, value) {
            Ok(update) => {
                let live = if update.applied.is_some() { "" } else { " (applies on start)" };
                println!(
                    "\n{} = {} {}{}",
                    update.control,
                    update.value,
                    update.control.unit(),
                    live
                );
            }
            Err(e) => println!("\n{e}\n  {}", e.guidance()),
        },
        ConsoleCommand::Start => match session.start() {
            Ok(()) => println!("\nStarted."),
            Err(e) => println!("\nCould not start: {e}\n  {}", e.guidance()),
        },
        ConsoleCommand::Stop => {
            session.stop();
            println!("\nStopped. Type 'start' to resume or 'quit' to exit.");
        }
        ConsoleCommand::Status => print_status(session),
        ConsoleCommand::Help => print_help(),
        ConsoleCommand::Quit => return Flow::Quit,
    }
    Flow::Continue
}

fn print_status<B: AudioBackend>(session: &Session<B>) {
    println!("\nSession {}", session.state());
    for control in Control::ALL {
        println!(
            "  {:<12} {:>8.1} {}",
            control.name(),
            session.controls().get(control),
            control.unit()
        );
    }
}

fn print_help() {
    println!("\nCommands:");
    println!("  <control>=<value>  set phase_shift, gain, delay, low_freq or high_freq");
    println!("  start | stop       start or stop cancelling");
    println!("  status             show state and control values");
    println!("  quit               exit");
}

/// Read stdin on its own thread and forward parsed lines.
fn spawn_stdin_reader() -> Receiver<ConsoleCommand> {
    let (tx, rx) = crossbeam_channel::unbounded();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match parse_command(&line) {
                Ok(Some(command)) => {
                    if tx.send(command).is_err() {
                        break;
                    }
                }
                Ok(None) => {}
                Err(message) => println!("\n{message}"),
            }
        }
    });
    rx
}

pub fn run(args: RunArgs) -> anyhow::Result<()> {
    let mut config = load_config(args.config.as_deref())?;
    args.apply_overrides(&mut config);
    config.validate().map_err(ConfigError::from)?;

    let refresh_hz = config.meter_refresh_hz;
    let mut session = Session::new(CpalBackend::new(), config);
    session.on_meter_update(|reading| {
        let mut stdout = std::io::stdout().lock();
        let _ = write!(stdout, "\r{}", meter_line(reading));
        let _ = stdout.flush();
    });

    let config = session.config();
    println!("Antiphase");
    println!(
        "  Input:  {}",
        config.input_device.as_deref().unwrap_or("default")
    );
    println!(
        "  Output: {}",
        config.output_device.as_deref().unwrap_or("default")
    );
    println!("  Sample rate: {} Hz", config.sample_rate);
    println!("  Buffer size: {} frames", config.buffer_size);
    println!("\nType 'help' for commands, Ctrl+C to quit.\n");

    if let Err(e) = session.start() {
        println!("Could not start: {e}\n  {}", e.guidance());
        return Err(e.into());
    }

    let quit = Arc::new(AtomicBool::new(false));
    let q = Arc::clone(&quit);
    ctrlc::set_handler(move || {
        q.store(true, Ordering::SeqCst);
    })?;

    let commands = spawn_stdin_reader();
    let mut clock = IntervalClock::new(refresh_hz);
    let mut exit = false;
    while !exit && !quit.load(Ordering::SeqCst) {
        if session.is_running() {
            run_meter_loop(&mut session, &mut clock, |session| {
                while let Ok(command) = commands.try_recv() {
                    if handle_command(session, command) == Flow::Quit {
                        exit = true;
                    }
                }
                !exit && !quit.load(Ordering::SeqCst)
            });
        } else {
            match commands.recv_timeout(IDLE_POLL) {
                Ok(command) => {
                    if handle_command(&mut session, command) == Flow::Quit {
                        exit = true;
                    }
                }
                Err(RecvTimeoutError::Timeout) => {}
                // Idle with no way to receive a `start`: nothing left to do.
                Err(RecvTimeoutError::Disconnected) => exit = true,
            }
        }
    }

    session.stop();
    println!("\nStopped.");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_assignments() {
        assert_eq!(
            parse_command("phase_shift=175"),
            Ok(Some(ConsoleCommand::Set("phase_shift".into(), 175.0)))
        );
        assert_eq!(
            parse_command("  gain = 80 "),
            Ok(Some(ConsoleCommand::Set("gain".into(), 80.0)))
        );
        assert_eq!(
            parse_command("delay 12.5"),
            Ok(Some(ConsoleCommand::Set("delay".into(), 12.5)))
        );
    }

    #[test]
    fn parses_keywords() {
        assert_eq!(parse_command("STOP"), Ok(Some(ConsoleCommand::Stop)));
        assert_eq!(parse_command("start"), Ok(Some(ConsoleCommand::Start)));
        assert_eq!(parse_command("q"), Ok(Some(ConsoleCommand::Quit)));
        assert_eq!(parse_command("   "), Ok(None));
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_command("gain=loud").is_err());
        assert!(parse_command("launch").is_err());
    }

    #[test]
    fn overrides_beat_file_values() {
        let mut config = SessionConfig::default();
        config.controls.gain = 10.0;
        let args = RunArgs {
            gain: Some(70.0),
            delay: Some(5000.0),
            sample_rate: Some(44100),
            input_device: Some("usb".into()),
            ..RunArgs::default()
        };
        args.apply_overrides(&mut config);
        assert_eq!(config.controls.gain, 70.0);
        // Clamped to the delay ceiling.
        assert_eq!(config.controls.delay, 1000.0);
        assert_eq!(config.sample_rate, 44100);
        assert_eq!(config.input_device.as_deref(), Some("usb"));
        assert_eq!(config.buffer_size, 256);
    }

    #[test]
    fn missing_overrides_keep_file_values() {
        let mut config = SessionConfig::default();
        config.controls.phase_shift = 170.0;
        RunArgs::default().apply_overrides(&mut config);
        assert_eq!(config, {
            let mut expected = SessionConfig::default();
            expected.controls.phase_shift = 170.0;
            expected
        });
    }
}
