//! Tuner configuration.
//!
//! Every field has a default, so an empty file (or no file at all) yields
//! the stock tuner: 44.1kHz mono, 2048-sample frames, Hann window,
//! A4 = 440 Hz, 100ms retry backoff.
//!
//! ```toml
//! [audio]
//! device_denylist = ["bluetooth"]
//!
//! [analysis]
//! refine_peak = true
//! smoothing = { kind = "median", window = 5 }
//!
//! [tuning]
//! offset = -1
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::audio::{FRAME_SIZE, SAMPLE_RATE, StreamFormat};
use crate::classify::TierThresholds;
use crate::error::TunerError;
use crate::fft::WindowFunction;
use crate::pitch::{AnalyzerSettings, NOISE_FLOOR};
use crate::smoothing::Smoothing;
use crate::tuning::{A4_FREQ, TuningOffset};

/// Largest accepted analysis frame, in samples.
pub const MAX_FRAME_SIZE: usize = 65_536;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TunerConfig {
    #[serde(default)]
    pub audio: AudioConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub tuning: TuningConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AudioConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
    #[serde(default = "default_frame_size")]
    pub frame_size: usize,
    /// How long a read may wait for the next frame before it counts as a
    /// stream fault.
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    /// Trial-open every device before offering it.
    #[serde(default = "default_probe_devices")]
    pub probe_devices: bool,
    /// Case-insensitive name fragments of devices never offered.
    #[serde(default = "default_device_denylist")]
    pub device_denylist: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AnalysisConfig {
    #[serde(default = "default_noise_floor")]
    pub noise_floor: f32,
    #[serde(default)]
    pub window: WindowFunction,
    #[serde(default)]
    pub refine_peak: bool,
    #[serde(default)]
    pub smoothing: Smoothing,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TuningConfig {
    #[serde(default = "default_reference_hz")]
    pub reference_hz: f64,
    /// Starting transposition offset in semitones.
    #[serde(default)]
    pub offset: TuningOffset,
    #[serde(default = "default_in_tune_cents")]
    pub in_tune_cents: f64,
    #[serde(default = "default_close_cents")]
    pub close_cents: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CaptureConfig {
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            frame_size: default_frame_size(),
            read_timeout_ms: default_read_timeout_ms(),
            probe_devices: default_probe_devices(),
            device_denylist: default_device_denylist(),
        }
    }
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            noise_floor: default_noise_floor(),
            window: WindowFunction::default(),
            refine_peak: false,
            smoothing: Smoothing::default(),
        }
    }
}

impl Default for TuningConfig {
    fn default() -> Self {
        Self {
            reference_hz: default_reference_hz(),
            offset: TuningOffset::default(),
            in_tune_cents: default_in_tune_cents(),
            close_cents: default_close_cents(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            retry_backoff_ms: default_retry_backoff_ms(),
            shutdown_timeout_ms: default_shutdown_timeout_ms(),
        }
    }
}

fn default_sample_rate() -> u32 {
    SAMPLE_RATE
}

fn default_frame_size() -> usize {
    FRAME_SIZE
}

fn default_read_timeout_ms() -> u64 {
    1000
}

fn default_probe_devices() -> bool {
    true
}

fn default_device_denylist() -> Vec<String> {
    vec!["bluetooth".into(), "hands-free".into(), "handsfree".into()]
}

fn default_noise_floor() -> f32 {
    NOISE_FLOOR
}

fn default_reference_hz() -> f64 {
    A4_FREQ
}

fn default_in_tune_cents() -> f64 {
    5.0
}

fn default_close_cents() -> f64 {
    15.0
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_shutdown_timeout_ms() -> u64 {
    500
}

impl TunerConfig {
    /// Reads and validates a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self, TunerError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            TunerError::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        let config = Self::from_toml(&content)
            .map_err(|e| TunerError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Parses and validates TOML text.
    pub fn from_toml(content: &str) -> Result<Self, TunerError> {
        let config: Self =
            toml::from_str(content).map_err(|e| TunerError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TunerError> {
        let fail = |msg: String| Err(TunerError::Config(msg));

        if self.audio.sample_rate == 0 {
            return fail("sample_rate must be positive".into());
        }
        if !(2..=MAX_FRAME_SIZE).contains(&self.audio.frame_size) {
            return fail(format!(
                "frame_size must be between 2 and {MAX_FRAME_SIZE} samples, got {}",
                self.audio.frame_size
            ));
        }
        if self.audio.read_timeout_ms == 0 {
            return fail("read_timeout_ms must be positive".into());
        }
        if !self.analysis.noise_floor.is_finite() || self.analysis.noise_floor < 0.0 {
            return fail(format!(
                "noise_floor must be a non-negative number, got {}",
                self.analysis.noise_floor
            ));
        }
        self.analysis.smoothing.validate().or_else(fail)?;
        if !self.tuning.reference_hz.is_finite() || self.tuning.reference_hz <= 0.0 {
            return fail(format!(
                "reference_hz must be a positive frequency, got {}",
                self.tuning.reference_hz
            ));
        }
        let (in_tune, close) = (self.tuning.in_tune_cents, self.tuning.close_cents);
        if !(0.0 < in_tune && in_tune < close && close <= 50.0) {
            return fail(format!(
                "tier thresholds must satisfy 0 < in_tune_cents < close_cents <= 50, got {in_tune} / {close}"
            ));
        }
        if self.capture.shutdown_timeout_ms == 0 {
            return fail("shutdown_timeout_ms must be positive".into());
        }
        Ok(())
    }

    pub fn stream_format(&self) -> StreamFormat {
        StreamFormat {
            sample_rate: self.audio.sample_rate,
            frame_size: self.audio.frame_size,
        }
    }

    pub fn analyzer_settings(&self) -> AnalyzerSettings {
        AnalyzerSettings {
            frame_size: self.audio.frame_size,
            window: self.analysis.window,
            noise_floor: self.analysis.noise_floor,
            refine_peak: self.analysis.refine_peak,
        }
    }

    pub fn tier_thresholds(&self) -> TierThresholds {
        TierThresholds {
            in_tune_cents: self.tuning.in_tune_cents,
            close_cents: self.tuning.close_cents,
        }
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.audio.read_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.capture.retry_backoff_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.capture.shutdown_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_yields_defaults() {
        let config = TunerConfig::from_toml("").unwrap();
        assert_eq!(config, TunerConfig::default());
        assert_eq!(config.stream_format(), StreamFormat::default());
        assert_eq!(config.retry_backoff(), Duration::from_millis(100));
        assert_eq!(config.tier_thresholds(), TierThresholds::default());
    }

    #[test]
    fn sections_override_defaults() {
        let config = TunerConfig::from_toml(
            r#"
            [audio]
            sample_rate = 48000
            device_denylist = ["airpods"]

            [analysis]
            window = "rectangular"
            refine_peak = true
            smoothing = { kind = "exponential", alpha = 0.3 }

            [tuning]
            reference_hz = 442.0
            offset = -2

            [capture]
            retry_backoff_ms = 250
            "#,
        )
        .unwrap();

        assert_eq!(config.audio.sample_rate, 48_000);
        assert_eq!(config.audio.frame_size, FRAME_SIZE);
        assert_eq!(config.audio.device_denylist, vec!["airpods".to_string()]);
        assert_eq!(config.analysis.window, WindowFunction::Rectangular);
        assert!(config.analyzer_settings().refine_peak);
        assert_eq!(config.analysis.smoothing, Smoothing::Exponential { alpha: 0.3 });
        assert_eq!(config.tuning.reference_hz, 442.0);
        assert_eq!(config.tuning.offset.semitones(), -2);
        assert_eq!(config.retry_backoff(), Duration::from_millis(250));
    }

    #[test]
    fn out_of_range_offset_is_rejected() {
        let err = TunerConfig::from_toml("[tuning]\noffset = 13").unwrap_err();
        assert!(matches!(err, TunerError::Config(_)));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(TunerConfig::from_toml("[audio]\nchannels = 2").is_err());
    }

    #[test]
    fn nonsensical_values_are_rejected() {
        for toml in [
            "[audio]\nsample_rate = 0",
            "[audio]\nframe_size = 1",
            "[audio]\nframe_size = 1048576",
            "[analysis]\nnoise_floor = -1.0",
            "[analysis]\nsmoothing = { kind = \"median\", window = 0 }",
            "[analysis]\nsmoothing = { kind = \"median\", window = 9223372036854775807 }",
            "[tuning]\nreference_hz = 0.0",
            "[tuning]\nin_tune_cents = 20.0",
            "[capture]\nshutdown_timeout_ms = 0",
        ] {
            assert!(TunerConfig::from_toml(toml).is_err(), "accepted {toml:?}");
        }
    }
}
