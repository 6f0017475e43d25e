//! # CPAL Capture Backend
//!
//! Real-time audio capture using CPAL (Cross-Platform Audio Library),
//! exposed through the [`FrameSource`] / [`CaptureStream`] seams.
//!
//! ## Features
//! - Device selection by enumeration index on the default host
//! - `f32` or `i16` devices, mono or multi-channel (downmixed to mono)
//! - Fixed-size frames assembled in the audio callback
//! - Frames dropped, not queued, when the consumer falls behind

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample, SupportedStreamConfigRange};
use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use crate::audio::{AudioFrame, CaptureStream, DeviceIndex, FrameSource, InputDevice, StreamFormat};
use crate::error::TunerError;

/// Frames buffered between the audio callback and the reader.
const FRAME_QUEUE_DEPTH: usize = 4;

/// [`FrameSource`] backed by the default CPAL host.
pub struct CpalSource {
    read_timeout: Duration,
    terminated: Arc<AtomicBool>,
    /// Dropped by [`terminate`](FrameSource::terminate); every stream's
    /// `released` receiver then disconnects and wakes a blocked read.
    release: Mutex<Option<Sender<()>>>,
    released: Receiver<()>,
}

impl CpalSource {
    /// # Arguments
    /// * `read_timeout` - How long a read waits for the next frame before it
    ///   reports a stream fault
    pub fn new(read_timeout: Duration) -> Self {
        let (release, released) = crossbeam_channel::bounded(0);
        Self {
            read_timeout,
            terminated: Arc::new(AtomicBool::new(false)),
            release: Mutex::new(Some(release)),
            released,
        }
    }

    fn device_at(index: DeviceIndex) -> Result<cpal::Device, TunerError> {
        let host = cpal::default_host();
        let mut devices = host
            .input_devices()
            .map_err(|e| TunerError::DeviceEnumeration(e.to_string()))?;
        devices.nth(index.0).ok_or_else(|| TunerError::DeviceOpen {
            device: index,
            reason: "no such input device".into(),
        })
    }
}

impl FrameSource for CpalSource {
    fn input_devices(&self) -> Result<Vec<InputDevice>, TunerError> {
        let host = cpal::default_host();
        let devices = host
            .input_devices()
            .map_err(|e| TunerError::DeviceEnumeration(e.to_string()))?;
        Ok(devices
            .enumerate()
            .map(|(i, device)| InputDevice {
                index: DeviceIndex(i),
                name: device
                    .name()
                    .unwrap_or_else(|_| format!("Input device {i}")),
            })
            .collect())
    }

    fn open(
        &self,
        device: DeviceIndex,
        format: &StreamFormat,
    ) -> Result<Box<dyn CaptureStream>, TunerError> {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(TunerError::DeviceOpen {
                device,
                reason: "audio backend has been released".into(),
            });
        }
        let cpal_device = Self::device_at(device)?;
        let stream = start_capture(
            &cpal_device,
            format,
            self.read_timeout,
            Arc::clone(&self.terminated),
            self.released.clone(),
        )
        .map_err(|e| TunerError::DeviceOpen {
            device,
            reason: format!("{e:#}"),
        })?;
        log::info!(
            "Opened input device {} ({}) at {} Hz",
            device,
            cpal_device.name().unwrap_or_default(),
            format.sample_rate
        );
        Ok(Box::new(stream))
    }

    fn terminate(&self) {
        log::info!("Releasing audio backend");
        self.terminated.store(true, Ordering::SeqCst);
        self.release.lock().take();
    }
}

/// A playing CPAL input stream and the channels its callbacks feed.
struct CpalStream {
    stream: Option<cpal::Stream>,
    frames: Receiver<Vec<f32>>,
    faults: Receiver<String>,
    sample_rate: u32,
    read_timeout: Duration,
    terminated: Arc<AtomicBool>,
    released: Receiver<()>,
}

impl CaptureStream for CpalStream {
    fn read_frame(&mut self) -> Result<AudioFrame, TunerError> {
        if self.terminated.load(Ordering::SeqCst) {
            return Err(TunerError::StreamRead("audio backend has been released".into()));
        }
        crossbeam_channel::select! {
            recv(self.released) -> _ => Err(TunerError::StreamRead(
                "audio backend has been released".into(),
            )),
            recv(self.faults) -> fault => Err(TunerError::StreamRead(
                fault.unwrap_or_else(|_| "input stream closed".into()),
            )),
            recv(self.frames) -> frame => match frame {
                Ok(samples) => Ok(AudioFrame::new(samples, self.sample_rate)),
                Err(_) => Err(TunerError::StreamRead("input stream closed".into())),
            },
            default(self.read_timeout) => Err(TunerError::StreamRead(format!(
                "no audio received within {:?}",
                self.read_timeout
            ))),
        }
    }

    fn close(&mut self) -> Result<(), TunerError> {
        if let Some(stream) = self.stream.take() {
            stream
                .pause()
                .map_err(|e| TunerError::DeviceClose(e.to_string()))?;
        }
        Ok(())
    }
}

/// Builds and starts an input stream on `device`.
///
/// The stream is configured as:
/// - Sample Rate: `format.sample_rate`
/// - Format: 32-bit float or 16-bit integer, converted to f32
/// - Channels: mono preferred, otherwise downmixed
/// - Frames of exactly `format.frame_size` samples
fn start_capture(
    device: &cpal::Device,
    format: &StreamFormat,
    read_timeout: Duration,
    terminated: Arc<AtomicBool>,
    released: Receiver<()>,
) -> anyhow::Result<CpalStream> {
    let configs = device
        .supported_input_configs()
        .context("querying supported input configs")?
        .collect::<Vec<_>>();
    let supported = find_supported_config(configs, format.sample_rate).ok_or_else(|| {
        anyhow!(
            "no f32 or i16 input format supports {} Hz",
            format.sample_rate
        )
    })?;

    let channels = supported.channels() as usize;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported
        .with_sample_rate(cpal::SampleRate(format.sample_rate))
        .into();
    log::debug!(
        "Selected input config: {} channel(s), {:?}, {} Hz",
        channels,
        sample_format,
        format.sample_rate
    );

    let (frame_tx, frame_rx) = crossbeam_channel::bounded(FRAME_QUEUE_DEPTH);
    let (fault_tx, fault_rx) = crossbeam_channel::bounded(1);
    let sink = FrameAssembler {
        pending: Vec::with_capacity(format.frame_size * 2),
        frame_size: format.frame_size,
        channels,
        frames: frame_tx,
        terminated: Arc::clone(&terminated),
    };

    let stream = match sample_format {
        SampleFormat::F32 => build_input::<f32>(device, &config, sink, fault_tx)?,
        SampleFormat::I16 => build_input::<i16>(device, &config, sink, fault_tx)?,
        other => bail!("unsupported sample format {other:?}"),
    };
    stream.play().context("starting input stream")?;

    Ok(CpalStream {
        stream: Some(stream),
        frames: frame_rx,
        faults: fault_rx,
        sample_rate: format.sample_rate,
        read_timeout,
        terminated,
        released,
    })
}

/// Accumulates callback data into fixed-size mono frames.
struct FrameAssembler {
    pending: Vec<f32>,
    frame_size: usize,
    channels: usize,
    frames: Sender<Vec<f32>>,
    terminated: Arc<AtomicBool>,
}

impl FrameAssembler {
    fn push<T>(&mut self, data: &[T])
    where
        T: SizedSample,
        f32: FromSample<T>,
    {
        if self.terminated.load(Ordering::Relaxed) {
            return;
        }
        let channels = self.channels.max(1);
        self.pending.extend(data.chunks(channels).map(|chunk| {
            chunk.iter().map(|&s| f32::from_sample(s)).sum::<f32>() / chunk.len() as f32
        }));

        // While we have enough data for a full frame, hand it off.
        while self.pending.len() >= self.frame_size {
            let frame: Vec<f32> = self.pending.drain(..self.frame_size).collect();
            // Drop the frame if the reader is behind.
            let _ = self.frames.try_send(frame);
        }
    }
}

fn build_input<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut sink: FrameAssembler,
    faults: Sender<String>,
) -> anyhow::Result<cpal::Stream>
where
    T: SizedSample,
    f32: FromSample<T>,
{
    let stream = device
        .build_input_stream(
            config,
            move |data: &[T], _: &cpal::InputCallbackInfo| sink.push(data),
            move |err| {
                log::warn!("Audio stream error: {}", err);
                let _ = faults.try_send(err.to_string());
            },
            None,
        )
        .context("building input stream")?;
    Ok(stream)
}

/// Finds the best supported configuration covering the target sample rate.
///
/// Mono is preferred over multi-channel, and `f32` over `i16`.
fn find_supported_config(
    configs: Vec<SupportedStreamConfigRange>,
    target_rate: u32,
) -> Option<SupportedStreamConfigRange> {
    configs
        .into_iter()
        .filter(|c| matches!(c.sample_format(), SampleFormat::F32 | SampleFormat::I16))
        .filter(|c| c.min_sample_rate().0 <= target_rate && target_rate <= c.max_sample_rate().0)
        .min_by_key(|c| {
            (
                c.channels() != 1,
                c.sample_format() != SampleFormat::F32,
                c.channels(),
            )
        })
}
