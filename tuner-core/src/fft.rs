//! # Fast Fourier Transform (FFT) Module
//!
//! Frequency-domain helpers for the spectral analyzer: DC removal,
//! windowing and the forward transform.
//!
//! ## Features
//! - High-performance FFT using RustFFT
//! - Selectable analysis window (Hann or rectangular)
//! - DC offset removal so constant input yields an empty spectrum

use std::sync::Arc;

use rustfft::{Fft, FftPlanner, num_complex::Complex};
use serde::{Deserialize, Serialize};

/// Window applied to a frame before the transform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowFunction {
    /// Tapers both frame edges to zero; reduces spectral leakage.
    #[default]
    Hann,
    /// No tapering. Matches an unwindowed DFT.
    Rectangular,
}

impl WindowFunction {
    /// Computes the window coefficients for a frame of `len` samples.
    pub fn coefficients(self, len: usize) -> Vec<f32> {
        match self {
            WindowFunction::Rectangular => vec![1.0; len],
            WindowFunction::Hann if len < 2 => vec![1.0; len],
            WindowFunction::Hann => {
                let n_minus_1 = (len - 1) as f32;
                (0..len)
                    .map(|i| {
                        0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / n_minus_1).cos())
                    })
                    .collect()
            }
        }
    }
}

/// Removes the DC offset from a signal by making its average value zero.
///
/// DC offset shows up as a large component at 0 Hz which would otherwise
/// win the peak search for a biased input.
pub fn remove_dc_offset(signal: &mut [f32]) {
    let len = signal.len();
    if len == 0 {
        return;
    }
    let avg = signal.iter().sum::<f32>() / len as f32;
    if avg.abs() > 1e-6 {
        for sample in signal.iter_mut() {
            *sample -= avg;
        }
    }
}

/// A forward transform planned for one frame length, with its window.
pub struct FrameTransform {
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
}

impl FrameTransform {
    pub fn new(len: usize, window: WindowFunction) -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(len),
            window: window.coefficients(len),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.window.len()
    }

    /// Performs a forward FFT on a signal and returns the complex spectrum.
    ///
    /// The signal is processed in three steps:
    /// 1. DC offset removal
    /// 2. Windowing
    /// 3. Forward FFT transformation
    ///
    /// # Arguments
    /// * `signal` - Input audio signal, exactly `self.len()` samples
    ///
    /// # Returns
    /// * `Vec<Complex<f32>>` - Complex frequency spectrum, one entry per input sample
    pub fn forward(&self, signal: &[f32]) -> Vec<Complex<f32>> {
        debug_assert_eq!(signal.len(), self.len());

        let mut processed_signal = signal.to_vec();
        remove_dc_offset(&mut processed_signal);

        let mut buffer: Vec<Complex<f32>> = processed_signal
            .into_iter()
            .zip(&self.window)
            .map(|(sample, w)| Complex {
                re: sample * w,
                im: 0.0,
            })
            .collect();

        self.fft.process(&mut buffer);
        buffer
    }
}

/// Calculates the magnitude of every bin of a complex spectrum.
///
/// Both halves are kept; callers fold negative-frequency bins themselves.
pub fn spectrum_to_magnitudes(spectrum: &[Complex<f32>]) -> Vec<f32> {
    spectrum
        .iter()
        .map(|c| c.norm()) // .norm() is sqrt(re^2 + im^2)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn hann_window_tapers_edges() {
        let w = WindowFunction::Hann.coefficients(9);
        assert_relative_eq!(w[0], 0.0, epsilon = 1e-6);
        assert_relative_eq!(w[8], 0.0, epsilon = 1e-6);
        assert_relative_eq!(w[4], 1.0, epsilon = 1e-6);
    }

    #[test]
    fn degenerate_hann_lengths_do_not_divide_by_zero() {
        assert_eq!(WindowFunction::Hann.coefficients(1), vec![1.0]);
        assert!(WindowFunction::Hann.coefficients(0).is_empty());
    }

    #[test]
    fn dc_offset_is_removed() {
        let mut signal = vec![0.5_f32; 64];
        remove_dc_offset(&mut signal);
        assert!(signal.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn rectangular_transform_of_cosine_peaks_at_its_bin() {
        let len = 64;
        let signal: Vec<f32> = (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * 5.0 * i as f32 / len as f32).cos())
            .collect();
        let transform = FrameTransform::new(len, WindowFunction::Rectangular);
        let magnitudes = spectrum_to_magnitudes(&transform.forward(&signal));

        assert_eq!(magnitudes.len(), len);
        assert_relative_eq!(magnitudes[5], len as f32 / 2.0, epsilon = 1e-3);
        assert_relative_eq!(magnitudes[len - 5], len as f32 / 2.0, epsilon = 1e-3);
        assert!(magnitudes[4] < 1e-3);
    }
}
