// tuner-core/src/lib.rs

//! The core logic for the string-instrument tuner.
//! This crate is responsible for audio capture, pitch detection,
//! note mapping and the capture lifecycle. It is completely headless
//! and contains no UI code: a front-end feeds it commands and renders
//! the [`TunerEvent`]s it emits.

pub mod audio;
pub mod classify;
pub mod config;
pub mod controller;
pub mod cpal_input;
pub mod error;
pub mod fft;
pub mod pipeline;
pub mod pitch;
pub mod smoothing;
pub mod tuning;

use serde::Serialize;

pub use audio::{AudioFrame, DeviceIndex, FrameSource, InputDevice, StreamFormat};
pub use classify::{TierThresholds, TuningTier};
pub use config::TunerConfig;
pub use controller::{CaptureController, CaptureState, TunerEvent};
pub use cpal_input::CpalSource;
pub use error::TunerError;
pub use tuning::{NoteMapper, NoteReading, TuningOffset};

/// Represents the result of a single audio analysis frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TunerUpdate {
    /// The nearest note and its deviation.
    #[serde(flatten)]
    pub reading: NoteReading,
    /// The accuracy tier derived from the reading.
    pub tier: TuningTier,
}

impl TunerUpdate {
    /// The update sent while capture is failing.
    pub fn device_error() -> Self {
        Self {
            reading: NoteReading::invalid(0.0),
            tier: TuningTier::DeviceError,
        }
    }
}
