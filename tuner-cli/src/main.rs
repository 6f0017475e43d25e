//! # Tuner - terminal front-end
//!
//! Wires the cpal capture backend to the tuner core and prints every reading.
//!
//! ## Architecture
//! - **Main Thread**: renders [`TunerEvent`]s and forwards typed commands
//! - **Capture Thread**: owned by [`CaptureController`]
//! - **Input Thread**: blocking stdin reader
//! - **Communication**: crossbeam channels between all three

mod cli;
mod input;
mod render;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use crossbeam_channel::select;
use tuner_core::audio::selectable_devices;
use tuner_core::{
    CaptureController, CpalSource, DeviceIndex, FrameSource, InputDevice, TunerConfig, TunerEvent,
    TuningOffset,
};

use cli::Cli;
use input::UserCommand;

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli)?;

    let source = Arc::new(CpalSource::new(config.read_timeout()));
    let devices = selectable_devices(
        source.as_ref(),
        &config.stream_format(),
        &config.audio.device_denylist,
        config.audio.probe_devices,
    )?;

    if cli.list_devices {
        print_devices(&devices);
        return Ok(());
    }

    let initial_device = cli
        .device
        .map(DeviceIndex)
        .or_else(|| devices.first().map(|d| d.index));
    match initial_device {
        Some(device) => log::info!("Starting on input device {}", device),
        None => log::warn!("No usable input device; use 'device <N>' to pick one"),
    }

    let (event_tx, event_rx) = crossbeam_channel::unbounded();
    let source: Arc<dyn FrameSource> = source;
    let controller = CaptureController::spawn(source, &config, initial_device, event_tx)
        .context("failed to start capture")?;
    let mut lines = input::spawn_reader()?;
    eprintln!("{}", input::HELP);

    loop {
        let mut stdin_closed = false;
        select! {
            recv(event_rx) -> event => match event {
                Ok(event) => show_event(event, cli.json)?,
                Err(_) => {
                    log::error!("Capture worker stopped unexpectedly");
                    break;
                }
            },
            recv(lines) -> line => {
                match line.map(|line| input::parse_command(&line)) {
                    Ok(Ok(Some(UserCommand::Quit))) => break,
                    Ok(Ok(Some(command))) => run_command(&controller, command, &devices),
                    Ok(Ok(None)) => {}
                    Ok(Err(e)) => eprintln!("{e:#}"),
                    Err(_) => stdin_closed = true,
                }
            }
        }
        if stdin_closed {
            input::detach(&mut lines);
        }
    }

    if !controller.stop() {
        log::warn!("Capture worker was abandoned during shutdown");
    }
    Ok(())
}

/// File values first, then command-line overrides.
fn load_config(cli: &Cli) -> Result<TunerConfig> {
    let path = cli.config.clone().or_else(|| {
        let local = PathBuf::from("tuner.toml");
        local.exists().then_some(local)
    });

    let mut config = match path {
        Some(path) => {
            let config = TunerConfig::load(&path)?;
            log::info!("Loaded config from {}", path.display());
            config
        }
        None => TunerConfig::default(),
    };

    if let Some(offset) = cli.offset {
        config.tuning.offset = TuningOffset::new(offset)?;
    }
    if let Some(reference_hz) = cli.reference_hz {
        config.tuning.reference_hz = reference_hz;
    }
    if cli.no_probe {
        config.audio.probe_devices = false;
    }
    config.validate()?;
    Ok(config)
}

fn run_command(controller: &CaptureController, command: UserCommand, devices: &[InputDevice]) {
    let result = match command {
        UserCommand::Device(device) => controller.select_device(device),
        UserCommand::Offset(value) => controller.set_offset_str(&value),
        UserCommand::List => {
            print_devices(devices);
            Ok(())
        }
        UserCommand::Help => {
            eprintln!("{}", input::HELP);
            Ok(())
        }
        UserCommand::Quit => Ok(()),
    };
    if let Err(e) = result {
        eprintln!("{e}");
    }
}

fn show_event(event: TunerEvent, json: bool) -> Result<()> {
    match event {
        TunerEvent::Update(update) if json => println!("{}", render::format_json(&update)?),
        TunerEvent::Update(update) => println!("{}", render::format_text(&update)),
        TunerEvent::StateChanged(state) => log::info!("Capture {:?}", state),
        TunerEvent::Error(e) => log::warn!("{}", e),
    }
    Ok(())
}

fn print_devices(devices: &[InputDevice]) {
    if devices.is_empty() {
        println!("No usable input devices found");
    }
    for device in devices {
        println!("{:>3}  {}", device.index.0, device.name);
    }
}
