//! # Pitch Detection Module
//!
//! Dominant-frequency detection on a single audio frame. The frame is
//! transformed, the strongest bin is located and, when it clears the noise
//! floor, mapped back to a frequency.
//!
//! ## Features
//! - Windowed FFT peak picking
//! - Noise gate on the peak magnitude
//! - Optional log-parabolic interpolation for sub-bin accuracy
//!
//! Every frame is analyzed independently; nothing is carried between calls.

use serde::{Deserialize, Serialize};

use crate::audio::AudioFrame;
use crate::fft::{self, FrameTransform, WindowFunction};

/// Default noise floor, in raw (un-normalized) FFT magnitude.
pub const NOISE_FLOOR: f32 = 0.01;

/// The strongest spectral component of a frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralPeak {
    /// Index of the winning bin, folded into the non-negative half.
    pub bin: usize,
    /// Frequency in Hz, always ≥ 0.
    pub frequency_hz: f64,
    /// Magnitude of the winning bin, always ≥ 0.
    pub magnitude: f32,
}

/// Settings for [`SpectralAnalyzer`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalyzerSettings {
    pub frame_size: usize,
    pub window: WindowFunction,
    pub noise_floor: f32,
    pub refine_peak: bool,
}

impl Default for AnalyzerSettings {
    fn default() -> Self {
        Self {
            frame_size: crate::audio::FRAME_SIZE,
            window: WindowFunction::Hann,
            noise_floor: NOISE_FLOOR,
            refine_peak: false,
        }
    }
}

/// Extracts the dominant frequency of a frame.
pub struct SpectralAnalyzer {
    settings: AnalyzerSettings,
    transform: FrameTransform,
}

impl SpectralAnalyzer {
    pub fn new(settings: AnalyzerSettings) -> Self {
        Self {
            transform: FrameTransform::new(settings.frame_size, settings.window),
            settings,
        }
    }

    /// Returns the dominant peak of `frame`, or `None` when the frame is
    /// empty or its strongest bin is below the noise floor.
    pub fn analyze(&self, frame: &AudioFrame) -> Option<SpectralPeak> {
        if frame.is_empty() {
            return None;
        }

        let spectrum = if frame.len() == self.transform.len() {
            self.transform.forward(frame.samples())
        } else {
            log::debug!(
                "Frame of {} samples does not match planned size {}",
                frame.len(),
                self.transform.len()
            );
            FrameTransform::new(frame.len(), self.settings.window).forward(frame.samples())
        };
        let magnitudes = fft::spectrum_to_magnitudes(&spectrum);

        // First maximum wins on ties.
        let (raw_bin, magnitude) = magnitudes
            .iter()
            .copied()
            .enumerate()
            .fold((0, f32::NEG_INFINITY), |best, (i, m)| {
                if m > best.1 { (i, m) } else { best }
            });

        if !magnitude.is_finite() || magnitude <= self.settings.noise_floor {
            return None;
        }

        let sample_rate = frame.sample_rate();
        let len = magnitudes.len();
        let bin = fold_bin(raw_bin, len);
        let mut frequency_hz = bin_frequency(bin, len, sample_rate);
        if self.settings.refine_peak {
            if let Some(refined) = refine_from_spectrum(&magnitudes, bin, sample_rate) {
                frequency_hz = refined;
            }
        }

        Some(SpectralPeak {
            bin,
            frequency_hz,
            magnitude,
        })
    }
}

/// Maps a negative-frequency bin onto its positive mirror.
fn fold_bin(bin: usize, len: usize) -> usize {
    if bin > len / 2 { len - bin } else { bin }
}

/// `|bin| * sample_rate / len`, with negative-frequency bins folded.
pub fn bin_frequency(bin: usize, len: usize, sample_rate: u32) -> f64 {
    if len == 0 {
        return 0.0;
    }
    fold_bin(bin, len) as f64 * sample_rate as f64 / len as f64
}

/// Refines a peak bin using the magnitudes of its neighbours.
///
/// Fits a parabola through the log-magnitudes of the peak bin and its two
/// neighbours and returns the frequency of the vertex.
///
/// # Arguments
/// * `magnitudes` - Full magnitude spectrum from the FFT
/// * `peak_bin` - Peak bin index, already folded into the positive half
/// * `sample_rate` - Sample rate in Hz
///
/// # Returns
/// * `Some(refined_freq)` - Refined frequency estimate
/// * `None` - The peak sits on an edge or the fit is degenerate
fn refine_from_spectrum(magnitudes: &[f32], peak_bin: usize, sample_rate: u32) -> Option<f64> {
    let len = magnitudes.len();
    if peak_bin == 0 || peak_bin + 1 >= len / 2 {
        return None;
    }

    let y1 = magnitudes[peak_bin - 1].ln();
    let y2 = magnitudes[peak_bin].ln();
    let y3 = magnitudes[peak_bin + 1].ln();

    if !y1.is_finite() || !y2.is_finite() || !y3.is_finite() {
        return None;
    }

    let denominator = 2.0 * y2 - y1 - y3;
    if denominator.abs() < 1e-6 {
        return None;
    }

    let peak_shift = (y3 - y1) / (2.0 * denominator);
    let interpolated_bin = peak_bin as f64 + peak_shift as f64;
    let refined = interpolated_bin * sample_rate as f64 / len as f64;

    (refined.is_finite() && refined > 0.0).then_some(refined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{FRAME_SIZE, SAMPLE_RATE};
    use approx::assert_relative_eq;

    fn sine_frame(freq: f64, amplitude: f32) -> AudioFrame {
        let samples = (0..FRAME_SIZE)
            .map(|i| {
                let t = i as f64 / SAMPLE_RATE as f64;
                amplitude * (2.0 * std::f64::consts::PI * freq * t).sin() as f32
            })
            .collect();
        AudioFrame::new(samples, SAMPLE_RATE)
    }

    fn bin_hz(bin: usize) -> f64 {
        bin as f64 * SAMPLE_RATE as f64 / FRAME_SIZE as f64
    }

    #[test]
    fn all_zero_frame_is_gated() {
        let analyzer = SpectralAnalyzer::new(AnalyzerSettings::default());
        let frame = AudioFrame::new(vec![0.0; FRAME_SIZE], SAMPLE_RATE);
        assert_eq!(analyzer.analyze(&frame), None);
    }

    #[test]
    fn constant_frame_is_gated() {
        let analyzer = SpectralAnalyzer::new(AnalyzerSettings::default());
        let frame = AudioFrame::new(vec![0.5; FRAME_SIZE], SAMPLE_RATE);
        assert_eq!(analyzer.analyze(&frame), None);
    }

    #[test]
    fn empty_frame_is_gated() {
        let analyzer = SpectralAnalyzer::new(AnalyzerSettings::default());
        assert_eq!(analyzer.analyze(&AudioFrame::new(vec![], SAMPLE_RATE)), None);
    }

    #[test]
    fn quiet_tone_stays_below_noise_floor() {
        let analyzer = SpectralAnalyzer::new(AnalyzerSettings::default());
        assert_eq!(analyzer.analyze(&sine_frame(440.0, 1e-7)), None);
    }

    #[test]
    fn peak_exactly_at_noise_floor_is_gated() {
        let frame = sine_frame(bin_hz(21), 0.5);
        let ungated = SpectralAnalyzer::new(AnalyzerSettings {
            noise_floor: 0.0,
            ..AnalyzerSettings::default()
        });
        let magnitude = ungated.analyze(&frame).unwrap().magnitude;

        let at_floor = SpectralAnalyzer::new(AnalyzerSettings {
            noise_floor: magnitude,
            ..AnalyzerSettings::default()
        });
        assert!(at_floor.analyze(&frame).is_none());

        let below_floor = SpectralAnalyzer::new(AnalyzerSettings {
            noise_floor: magnitude * 0.999,
            ..AnalyzerSettings::default()
        });
        assert!(below_floor.analyze(&frame).is_some());
    }

    #[test]
    fn bin_centred_tone_maps_to_its_bin() {
        for window in [WindowFunction::Hann, WindowFunction::Rectangular] {
            let analyzer = SpectralAnalyzer::new(AnalyzerSettings {
                window,
                ..AnalyzerSettings::default()
            });
            let peak = analyzer.analyze(&sine_frame(bin_hz(21), 0.5)).unwrap();
            assert_eq!(peak.bin, 21);
            assert_relative_eq!(peak.frequency_hz, bin_hz(21), epsilon = 1e-9);
            assert!(peak.magnitude > NOISE_FLOOR);
        }
    }

    #[test]
    fn off_bin_tone_snaps_to_nearest_bin_without_refinement() {
        // 440 Hz sits at bin 20.43.
        let analyzer = SpectralAnalyzer::new(AnalyzerSettings::default());
        let peak = analyzer.analyze(&sine_frame(440.0, 0.5)).unwrap();
        assert_eq!(peak.bin, 20);
        assert_relative_eq!(peak.frequency_hz, bin_hz(20), epsilon = 1e-9);
    }

    #[test]
    fn refinement_recovers_sub_bin_frequency() {
        let analyzer = SpectralAnalyzer::new(AnalyzerSettings {
            refine_peak: true,
            ..AnalyzerSettings::default()
        });
        for freq in [82.41, 110.0, 146.83, 196.0, 246.94, 329.63, 440.0] {
            let peak = analyzer.analyze(&sine_frame(freq, 0.5)).unwrap();
            assert!(
                (peak.frequency_hz - freq).abs() < 2.0,
                "expected ~{freq} Hz, got {}",
                peak.frequency_hz
            );
        }
    }

    #[test]
    fn negative_frequency_bins_fold() {
        assert_relative_eq!(bin_frequency(FRAME_SIZE - 21, FRAME_SIZE, SAMPLE_RATE), bin_hz(21));
        assert_relative_eq!(
            bin_frequency(FRAME_SIZE / 2, FRAME_SIZE, SAMPLE_RATE),
            SAMPLE_RATE as f64 / 2.0
        );
        assert_eq!(bin_frequency(0, FRAME_SIZE, SAMPLE_RATE), 0.0);
    }

    #[test]
    fn mismatched_frame_length_is_still_analyzed() {
        let analyzer = SpectralAnalyzer::new(AnalyzerSettings::default());
        let len = 1024;
        let samples = (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * 10.0 * i as f32 / len as f32).sin())
            .collect();
        let peak = analyzer.analyze(&AudioFrame::new(samples, 8_000)).unwrap();
        assert_eq!(peak.bin, 10);
        assert_relative_eq!(peak.frequency_hz, 10.0 * 8_000.0 / 1024.0, epsilon = 1e-9);
    }
}
