//! # Musical Tuning Module
//!
//! Converts a detected frequency into the nearest equal-tempered note and
//! its deviation in cents.
//!
//! ## Features
//! - 12-tone equal temperament around a configurable reference pitch (A4)
//! - Semitone transposition offset for alternate tunings
//! - Cent deviation always in (-50, 50]
//!
//! The transposition offset is folded into the semitone count: an offset of
//! `-1` (a guitar tuned down a half step) reports an Eb string as "E". It
//! moves the note name and octave, never the cents.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TunerError;

/// Standard concert pitch for A4 in Hz.
pub const A4_FREQ: f64 = 440.0;

/// Pitch-class symbols, starting at C.
pub const NOTE_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Note name reported when no pitch could be detected.
pub const NO_NOTE: &str = "--";

/// Semitones between A4 and the C that starts its octave.
const A_OFFSET_FROM_C: i64 = 9;

/// Transposition offset in whole semitones, always within -12..=12.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct TuningOffset(i8);

impl TuningOffset {
    pub const MIN: i32 = -12;
    pub const MAX: i32 = 12;

    pub fn new(semitones: i32) -> Result<Self, TunerError> {
        if (Self::MIN..=Self::MAX).contains(&semitones) {
            Ok(Self(semitones as i8))
        } else {
            Err(TunerError::InvalidOffset {
                input: semitones.to_string(),
            })
        }
    }

    pub fn semitones(self) -> i32 {
        self.0 as i32
    }
}

impl TryFrom<i32> for TuningOffset {
    type Error = TunerError;

    fn try_from(semitones: i32) -> Result<Self, Self::Error> {
        Self::new(semitones)
    }
}

/// Parses raw user input such as `"-2"` or `" +3 "`.
impl FromStr for TuningOffset {
    type Err = TunerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || TunerError::InvalidOffset {
            input: s.to_string(),
        };
        let semitones: i32 = s.trim().parse().map_err(|_| invalid())?;
        Self::new(semitones).map_err(|_| invalid())
    }
}

impl<'de> Deserialize<'de> for TuningOffset {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let semitones = i32::deserialize(deserializer)?;
        Self::new(semitones).map_err(serde::de::Error::custom)
    }
}

impl fmt::Display for TuningOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:+}", self.0)
    }
}

/// The note nearest to a frequency.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NoteReading {
    /// One of [`NOTE_NAMES`], or [`NO_NOTE`] when invalid.
    pub note_name: &'static str,
    pub octave: i32,
    /// Deviation from the nearest note, in (-50, 50]. Positive is sharp.
    pub cents: f64,
    pub frequency_hz: f64,
    pub valid: bool,
}

impl NoteReading {
    /// The reading for "no detectable pitch".
    pub fn invalid(frequency_hz: f64) -> Self {
        Self {
            note_name: NO_NOTE,
            octave: 0,
            cents: 0.0,
            frequency_hz: if frequency_hz.is_finite() { frequency_hz } else { 0.0 },
            valid: false,
        }
    }
}

/// Maps frequencies to notes around a fixed reference pitch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteMapper {
    reference_hz: f64,
}

impl Default for NoteMapper {
    fn default() -> Self {
        Self {
            reference_hz: A4_FREQ,
        }
    }
}

impl NoteMapper {
    /// Creates a mapper for the given A4 reference.
    ///
    /// # Returns
    /// * `Err(TunerError::Config)` - reference is not a positive, finite frequency
    pub fn new(reference_hz: f64) -> Result<Self, TunerError> {
        if !reference_hz.is_finite() || reference_hz <= 0.0 {
            return Err(TunerError::Config(format!(
                "reference pitch must be a positive frequency, got {reference_hz}"
            )));
        }
        Ok(Self { reference_hz })
    }

    /// Finds the note nearest to `frequency_hz` after shifting by `offset`.
    ///
    /// Frequencies that are not positive and finite produce
    /// [`NoteReading::invalid`].
    pub fn map(&self, frequency_hz: f64, offset: TuningOffset) -> NoteReading {
        if !frequency_hz.is_finite() || frequency_hz <= 0.0 {
            return NoteReading::invalid(frequency_hz);
        }

        let note_number =
            12.0 * (frequency_hz / self.reference_hz).log2() - offset.semitones() as f64;
        let (rounded, cents) = split_semitones(note_number);

        let from_c = rounded + A_OFFSET_FROM_C;
        NoteReading {
            note_name: NOTE_NAMES[from_c.rem_euclid(12) as usize],
            octave: 4 + from_c.div_euclid(12) as i32,
            cents,
            frequency_hz,
            valid: true,
        }
    }
}

/// Splits a fractional semitone count into the nearest whole semitone and
/// the remainder in cents. Exact halves round down, so cents land in
/// (-50, 50].
fn split_semitones(note_number: f64) -> (i64, f64) {
    let rounded = (note_number - 0.5).ceil();
    let cents = 100.0 * (note_number - rounded);
    (rounded as i64, cents)
}

/// Calculates the deviation from a target frequency in cents.
///
/// Positive values are sharp, negative values flat.
pub fn calculate_cents_deviation(freq: f64, target_freq: f64) -> f64 {
    1200.0 * (freq / target_freq).log2()
}
