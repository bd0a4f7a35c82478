//! Audio device listing command.

use antiphase_io::{AudioBackend, CpalBackend};
use clap::Args;

#[derive(Args)]
pub struct DevicesArgs {
    /// Only show devices that can capture audio
    #[arg(long)]
    inputs: bool,
}

pub fn run(args: DevicesArgs) -> anyhow::Result<()> {
    let backend = CpalBackend::new();
    let devices = backend.list_devices()?;

    if devices.is_empty() {
        println!("No audio devices found.");
        return Ok(());
    }

    let default_input = backend.default_input_device()?.map(|d| d.name);
    let default_output = backend.default_output_device()?.map(|d| d.name);

    println!("Audio Devices ({})", backend.name());
    println!("=============\n");

    let inputs: Vec<_> = devices.iter().filter(|d| d.is_input).collect();
    if !inputs.is_empty() {
        println!("Input Devices:");
        for device in &inputs {
            let marker = if default_input.as_ref() == Some(&device.name) {
                " (default)"
            } else {
                ""
            };
            println!("  {}{}", device, marker);
        }
        println!();
    }

    if !args.inputs {
        let outputs: Vec<_> = devices.iter().filter(|d| d.is_output).collect();
        if !outputs.is_empty() {
            println!("Output Devices:");
            for device in &outputs {
                let marker = if default_output.as_ref() == Some(&device.name) {
                    " (default)"
                } else {
                    ""
                };
                println!("  {}{}", device, marker);
            }
            println!();
        }
    }

    println!("Tip: pass part of a name with --input-device/--output-device:");
    println!("  antiphase run --input-device usb");

    Ok(())
}
