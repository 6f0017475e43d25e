//! Interactive commands typed on stdin.

use std::io::BufRead;
use std::thread;

use anyhow::{Context, Result, bail};
use crossbeam_channel::{Receiver, Sender};
use tuner_core::DeviceIndex;

#[derive(Debug, Clone, PartialEq)]
pub enum UserCommand {
    Device(DeviceIndex),
    /// Raw offset text; validated by the controller.
    Offset(String),
    List,
    Help,
    Quit,
}

pub const HELP: &str = "commands: device <N> | offset <N> | list | help | quit";

/// Parses one input line. Blank lines yield `None`.
pub fn parse_command(line: &str) -> Result<Option<UserCommand>> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let arg = words.next();
    if words.next().is_some() {
        bail!("too many arguments: {}", line.trim());
    }

    let command = match (verb.to_ascii_lowercase().as_str(), arg) {
        ("device" | "d", Some(index)) => {
            let index: usize = index
                .parse()
                .with_context(|| format!("invalid device index '{index}'"))?;
            UserCommand::Device(DeviceIndex(index))
        }
        ("offset" | "o", Some(value)) => UserCommand::Offset(value.to_string()),
        ("list" | "l", None) => UserCommand::List,
        ("help" | "h" | "?", None) => UserCommand::Help,
        ("quit" | "q" | "exit", None) => UserCommand::Quit,
        ("device" | "d" | "offset" | "o", None) => bail!("'{verb}' needs an argument"),
        _ => bail!("unknown command '{}'; {}", line.trim(), HELP),
    };
    Ok(Some(command))
}

/// Reads stdin lines on a background thread. The channel disconnects at EOF.
pub fn spawn_reader() -> Result<Receiver<String>> {
    let (tx, rx) = crossbeam_channel::unbounded();
    thread::Builder::new()
        .name("stdin-reader".into())
        .spawn(move || read_lines(std::io::stdin().lock(), tx))
        .context("failed to spawn stdin reader")?;
    Ok(rx)
}

/// Swaps a finished input channel for one that never fires, so the caller's
/// `select!` keeps serving the other channels after stdin closes.
pub fn detach(lines: &mut Receiver<String>) {
    log::info!("stdin closed; streaming until interrupted");
    *lines = crossbeam_channel::never();
}

fn read_lines(reader: impl BufRead, tx: Sender<String>) {
    for line in reader.lines() {
        match line {
            Ok(line) => {
                if tx.send(line).is_err() {
                    break;
                }
            }
            Err(e) => {
                log::warn!("Failed to read stdin: {}", e);
                break;
            }
        }
    }
}
