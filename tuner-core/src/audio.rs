//! # Audio Input Module
//!
//! Frame types and the seams between the tuner core and whatever delivers
//! audio. A backend implements [`FrameSource`] (device listing, opening a
//! stream) and hands back a [`CaptureStream`] that yields fixed-size mono
//! frames on demand.
//!
//! The real backend lives in [`crate::cpal_input`]; tests plug in
//! in-memory sources.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TunerError;

/// Default number of samples per analysis frame.
///
/// 2048 samples is ~46ms at 44.1kHz, a bin width of ~21.5Hz.
pub const FRAME_SIZE: usize = 2048;

/// Default capture sample rate in Hz.
pub const SAMPLE_RATE: u32 = 44_100;

/// Opaque index of an input device as enumerated by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceIndex(pub usize);

impl fmt::Display for DeviceIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<usize> for DeviceIndex {
    fn from(index: usize) -> Self {
        Self(index)
    }
}

/// An input device as reported by a [`FrameSource`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputDevice {
    pub index: DeviceIndex,
    pub name: String,
}

/// Format every stream is opened with: mono samples at a fixed rate,
/// delivered in frames of a fixed length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub frame_size: usize,
}

impl Default for StreamFormat {
    fn default() -> Self {
        Self {
            sample_rate: SAMPLE_RATE,
            frame_size: FRAME_SIZE,
        }
    }
}

/// One frame of mono audio.
///
/// Frames are immutable once built and are moved into the analysis step,
/// which drops them after processing.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioFrame {
    samples: Box<[f32]>,
    sample_rate: u32,
}

impl AudioFrame {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples: samples.into_boxed_slice(),
            sample_rate,
        }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// An open capture stream bound to one device.
///
/// Streams are created and consumed on the capture worker thread, so they
/// are not required to be `Send`.
pub trait CaptureStream {
    /// Blocks until the next frame is available.
    fn read_frame(&mut self) -> Result<AudioFrame, TunerError>;

    /// Stops the stream and releases the device. Must be safe to call twice.
    fn close(&mut self) -> Result<(), TunerError>;
}

/// A provider of input devices and capture streams.
pub trait FrameSource: Send + Sync {
    /// Lists every input device the backend can see.
    fn input_devices(&self) -> Result<Vec<InputDevice>, TunerError>;

    /// Opens a stream on `device` with the given format.
    fn open(
        &self,
        device: DeviceIndex,
        format: &StreamFormat,
    ) -> Result<Box<dyn CaptureStream>, TunerError>;

    /// Opens and immediately closes a trial stream.
    ///
    /// Passing the probe does not guarantee a later open will succeed.
    fn probe(&self, device: DeviceIndex, format: &StreamFormat) -> Result<(), TunerError> {
        let mut stream = self.open(device, format)?;
        stream.close()
    }

    /// Forcibly releases backend resources. Called once during shutdown,
    /// possibly while a worker is still blocked in a read.
    fn terminate(&self) {}
}

/// Returns the devices a user may pick from.
///
/// Devices whose name contains a denylisted keyword (case-insensitive) are
/// dropped. With `probe` set, devices that cannot open `format` are dropped
/// as well.
pub fn selectable_devices(
    source: &dyn FrameSource,
    format: &StreamFormat,
    denylist: &[String],
    probe: bool,
) -> Result<Vec<InputDevice>, TunerError> {
    let devices = source.input_devices()?;
    let selectable = devices
        .into_iter()
        .filter(|device| {
            let name = device.name.to_lowercase();
            match denylist
                .iter()
                .find(|keyword| name.contains(&keyword.to_lowercase()))
            {
                Some(keyword) => {
                    log::info!(
                        "Skipping input device {} ({}): matches denylist entry {:?}",
                        device.index,
                        device.name,
                        keyword
                    );
                    false
                }
                None => true,
            }
        })
        .filter(|device| {
            if !probe {
                return true;
            }
            match source.probe(device.index, format) {
                Ok(()) => true,
                Err(e) => {
                    log::info!(
                        "Skipping input device {} ({}): probe failed: {}",
                        device.index,
                        device.name,
                        e
                    );
                    false
                }
            }
        })
        .collect();
    Ok(selectable)
}
