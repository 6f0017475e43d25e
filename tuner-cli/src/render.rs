//! Terminal rendering of tuner updates.

use anyhow::Result;
use tuner_core::{TunerUpdate, TuningTier};

/// Half-width of the needle gauge, in characters.
const NEEDLE_HALF_WIDTH: usize = 10;

/// One human-readable line per update.
pub fn format_text(update: &TunerUpdate) -> String {
    let reading = &update.reading;
    match update.tier {
        TuningTier::NoSignal => format!("{:<4} {}", reading.note_name, needle(None)),
        TuningTier::DeviceError => format!("{:<4} {} device error", reading.note_name, needle(None)),
        tier => format!(
            "{:<4} {} {:+6.1} cents  {:>8.2} Hz  {}",
            format!("{}{}", reading.note_name, reading.octave),
            needle(Some(reading.cents)),
            reading.cents,
            reading.frequency_hz,
            tier.label(),
        ),
    }
}

pub fn format_json(update: &TunerUpdate) -> Result<String> {
    Ok(serde_json::to_string(update)?)
}

/// ASCII gauge over [-50, +50] cents with the needle at `cents`.
fn needle(cents: Option<f64>) -> String {
    let width = 2 * NEEDLE_HALF_WIDTH + 1;
    let mut gauge = vec!['-'; width];
    gauge[NEEDLE_HALF_WIDTH] = '|';
    if let Some(cents) = cents {
        let offset = (cents.clamp(-50.0, 50.0) / 50.0 * NEEDLE_HALF_WIDTH as f64).round() as isize;
        let pos = (NEEDLE_HALF_WIDTH as isize + offset) as usize;
        gauge[pos] = '*';
    }
    format!("[{}]", gauge.into_iter().collect::<String>())
}
