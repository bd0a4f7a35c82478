//! Antiphase CLI - run the canceller from a terminal.

mod commands;
mod config;
mod meter;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "antiphase")]
#[command(author, version, about = "Real-time microphone phase cancellation", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start cancelling and show live input/output meters
    Run(commands::run::RunArgs),

    /// List audio devices
    Devices(commands::devices::DevicesArgs),

    /// Check that the microphone can be opened
    Check(commands::check::CheckArgs),
}

fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never tear the meter line on stdout.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();
    tracing_log::LogTracer::init().ok();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(args) => commands::run::run(args),
        Commands::Devices(args) => commands::devices::run(args),
        Commands::Check(args) => commands::check::run(args),
    }
}
