//! Buckets a [`NoteReading`] into the accuracy tier that drives feedback.

use serde::{Deserialize, Serialize};

use crate::tuning::NoteReading;

/// Accuracy tier of a reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuningTier {
    InTune,
    Close,
    OutOfTune,
    /// No pitch above the noise floor.
    NoSignal,
    /// Capture failed; only produced by the capture controller.
    DeviceError,
}

impl TuningTier {
    /// Ordering of the pitched tiers, most in tune first. `None` for the
    /// tiers that carry no pitch.
    pub fn accuracy_rank(self) -> Option<u8> {
        match self {
            TuningTier::InTune => Some(0),
            TuningTier::Close => Some(1),
            TuningTier::OutOfTune => Some(2),
            TuningTier::NoSignal | TuningTier::DeviceError => None,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            TuningTier::InTune => "in tune",
            TuningTier::Close => "close",
            TuningTier::OutOfTune => "out of tune",
            TuningTier::NoSignal => "no signal",
            TuningTier::DeviceError => "device error",
        }
    }
}

/// Cent limits for the pitched tiers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierThresholds {
    /// `|cents|` below this is in tune.
    pub in_tune_cents: f64,
    /// `|cents|` below this (and not in tune) is close.
    pub close_cents: f64,
}

impl Default for TierThresholds {
    fn default() -> Self {
        Self {
            in_tune_cents: 5.0,
            close_cents: 15.0,
        }
    }
}

/// Classifies a reading with the default 5 / 15 cent thresholds.
pub fn classify(reading: &NoteReading) -> TuningTier {
    classify_with(reading, &TierThresholds::default())
}

pub fn classify_with(reading: &NoteReading, thresholds: &TierThresholds) -> TuningTier {
    if !reading.valid {
        return TuningTier::NoSignal;
    }
    let deviation = reading.cents.abs();
    if deviation < thresholds.in_tune_cents {
        TuningTier::InTune
    } else if deviation < thresholds.close_cents {
        TuningTier::Close
    } else {
        TuningTier::OutOfTune
    }
}
