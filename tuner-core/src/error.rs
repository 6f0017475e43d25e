use thiserror::Error;

use crate::audio::DeviceIndex;

/// Errors raised by the tuner core.
///
/// None of these are fatal to the process. Open and read faults are surfaced
/// to the renderer as events, offset faults are returned to the caller and
/// leave the running offset untouched.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TunerError {
    #[error("cannot open input device {device}: {reason}")]
    DeviceOpen { device: DeviceIndex, reason: String },

    #[error("audio stream read failed: {0}")]
    StreamRead(String),

    #[error("closing input stream failed: {0}")]
    DeviceClose(String),

    #[error("cannot enumerate input devices: {0}")]
    DeviceEnumeration(String),

    #[error("invalid tuning offset {input:?}: expected whole semitones in -12..=12")]
    InvalidOffset { input: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("capture worker is not running")]
    WorkerStopped,

    #[error("cannot start capture worker: {0}")]
    WorkerSpawn(String),
}
