//! Optional frequency smoothing between peak detection and note mapping.
//!
//! The analyzer and mapper are stateless; any history lives here. The
//! smoother forgets everything on silence so a new note never inherits the
//! previous one.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::tuning::calculate_cents_deviation;

/// Jumps larger than this restart the exponential filter.
const RESTART_CENTS: f64 = 100.0;

/// Largest accepted median window.
pub const MAX_MEDIAN_WINDOW: usize = 64;

/// Smoothing strategy.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Smoothing {
    /// Every frame stands alone.
    #[default]
    None,
    /// `y = alpha * x + (1 - alpha) * y_prev`, with `alpha` in (0, 1].
    Exponential { alpha: f64 },
    /// Median of the last `window` frequencies.
    Median { window: usize },
}

impl Smoothing {
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Smoothing::None => Ok(()),
            Smoothing::Exponential { alpha } if alpha > 0.0 && alpha <= 1.0 => Ok(()),
            Smoothing::Exponential { alpha } => {
                Err(format!("smoothing alpha must be in (0, 1], got {alpha}"))
            }
            Smoothing::Median { window } if (1..=MAX_MEDIAN_WINDOW).contains(&window) => Ok(()),
            Smoothing::Median { window } => Err(format!(
                "median smoothing window must be in 1..={MAX_MEDIAN_WINDOW}, got {window}"
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FrequencySmoother {
    mode: Smoothing,
    last: Option<f64>,
    history: VecDeque<f64>,
}

impl FrequencySmoother {
    pub fn new(mode: Smoothing) -> Self {
        Self {
            mode,
            last: None,
            history: VecDeque::new(),
        }
    }

    /// Feeds one frame's frequency (`None` for silence) and returns the
    /// smoothed value.
    pub fn smooth(&mut self, frequency_hz: Option<f64>) -> Option<f64> {
        let Some(frequency_hz) = frequency_hz else {
            self.reset();
            return None;
        };

        match self.mode {
            Smoothing::None => Some(frequency_hz),
            Smoothing::Exponential { alpha } => {
                let next = match self.last {
                    Some(prev)
                        if calculate_cents_deviation(frequency_hz, prev).abs() <= RESTART_CENTS =>
                    {
                        alpha * frequency_hz + (1.0 - alpha) * prev
                    }
                    _ => frequency_hz,
                };
                self.last = Some(next);
                Some(next)
            }
            Smoothing::Median { window } => {
                if self.history.len() == window {
                    self.history.pop_front();
                }
                self.history.push_back(frequency_hz);
                Some(median(&self.history))
            }
        }
    }

    pub fn reset(&mut self) {
        self.last = None;
        self.history.clear();
    }
}

fn median(values: &VecDeque<f64>) -> f64 {
    let mut sorted: Vec<f64> = values.iter().copied().collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn passthrough_by_default() {
        let mut smoother = FrequencySmoother::new(Smoothing::default());
        assert_eq!(smoother.smooth(Some(440.0)), Some(440.0));
        assert_eq!(smoother.smooth(Some(110.0)), Some(110.0));
        assert_eq!(smoother.smooth(None), None);
    }

    #[test]
    fn exponential_moves_towards_input() {
        let mut smoother = FrequencySmoother::new(Smoothing::Exponential { alpha: 0.5 });
        assert_eq!(smoother.smooth(Some(440.0)), Some(440.0));
        assert_relative_eq!(smoother.smooth(Some(444.0)).unwrap(), 442.0);
        assert_relative_eq!(smoother.smooth(Some(444.0)).unwrap(), 443.0);
    }

    #[test]
    fn exponential_restarts_on_large_jump() {
        let mut smoother = FrequencySmoother::new(Smoothing::Exponential { alpha: 0.1 });
        smoother.smooth(Some(82.41));
        assert_eq!(smoother.smooth(Some(110.0)), Some(110.0));
    }

    #[test]
    fn median_rejects_single_outlier() {
        let mut smoother = FrequencySmoother::new(Smoothing::Median { window: 3 });
        smoother.smooth(Some(440.0));
        smoother.smooth(Some(880.0));
        assert_eq!(smoother.smooth(Some(441.0)), Some(441.0));
        // Window slides: [880, 441, 442].
        assert_eq!(smoother.smooth(Some(442.0)), Some(442.0));
    }

    #[test]
    fn median_of_even_count_averages_middle_pair() {
        let mut smoother = FrequencySmoother::new(Smoothing::Median { window: 4 });
        smoother.smooth(Some(100.0));
        assert_eq!(smoother.smooth(Some(102.0)), Some(101.0));
    }

    #[test]
    fn silence_clears_history() {
        let mut smoother = FrequencySmoother::new(Smoothing::Median { window: 5 });
        smoother.smooth(Some(100.0));
        smoother.smooth(Some(100.0));
        assert_eq!(smoother.smooth(None), None);
        assert_eq!(smoother.smooth(Some(200.0)), Some(200.0));
    }

    #[test]
    fn validation() {
        assert!(Smoothing::Exponential { alpha: 0.0 }.validate().is_err());
        assert!(Smoothing::Exponential { alpha: 1.0 }.validate().is_ok());
        assert!(Smoothing::Median { window: 0 }.validate().is_err());
        assert!(Smoothing::Median { window: MAX_MEDIAN_WINDOW }.validate().is_ok());
        assert!(Smoothing::Median { window: MAX_MEDIAN_WINDOW + 1 }.validate().is_err());
    }

    #[test]
    fn huge_window_does_not_allocate_up_front() {
        let mut smoother = FrequencySmoother::new(Smoothing::Median { window: usize::MAX });
        assert_eq!(smoother.smooth(Some(440.0)), Some(440.0));
    }
}
