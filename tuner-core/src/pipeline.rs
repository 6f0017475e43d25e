//! The per-frame chain: analyzer → smoother → mapper → classifier.

use crate::audio::AudioFrame;
use crate::classify::{self, TierThresholds};
use crate::config::TunerConfig;
use crate::error::TunerError;
use crate::pitch::{AnalyzerSettings, SpectralAnalyzer};
use crate::smoothing::{FrequencySmoother, Smoothing};
use crate::tuning::{NoteMapper, TuningOffset};
use crate::TunerUpdate;

pub struct TuningPipeline {
    analyzer: SpectralAnalyzer,
    smoother: FrequencySmoother,
    mapper: NoteMapper,
    thresholds: TierThresholds,
}

impl TuningPipeline {
    pub fn new(
        analyzer: AnalyzerSettings,
        smoothing: Smoothing,
        mapper: NoteMapper,
        thresholds: TierThresholds,
    ) -> Self {
        Self {
            analyzer: SpectralAnalyzer::new(analyzer),
            smoother: FrequencySmoother::new(smoothing),
            mapper,
            thresholds,
        }
    }

    pub fn from_config(config: &TunerConfig) -> Result<Self, TunerError> {
        Ok(Self::new(
            config.analyzer_settings(),
            config.analysis.smoothing,
            NoteMapper::new(config.tuning.reference_hz)?,
            config.tier_thresholds(),
        ))
    }

    /// Runs one frame through the chain. The frame is consumed.
    pub fn process(&mut self, frame: AudioFrame, offset: TuningOffset) -> TunerUpdate {
        let peak = self.analyzer.analyze(&frame);
        drop(frame);

        let frequency = self.smoother.smooth(peak.map(|p| p.frequency_hz));
        self.remap(frequency.unwrap_or(0.0), offset)
    }

    /// Maps an already-detected frequency, bypassing analysis and smoothing.
    pub fn remap(&self, frequency_hz: f64, offset: TuningOffset) -> TunerUpdate {
        let reading = self.mapper.map(frequency_hz, offset);
        TunerUpdate {
            tier: classify::classify_with(&reading, &self.thresholds),
            reading,
        }
    }

    /// Forgets smoothing history.
    pub fn reset(&mut self) {
        self.smoother.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{FRAME_SIZE, SAMPLE_RATE};
    use crate::classify::TuningTier;

    fn pipeline() -> TuningPipeline {
        TuningPipeline::from_config(&TunerConfig::default()).unwrap()
    }

    fn tone(freq: f64) -> AudioFrame {
        let samples = (0..FRAME_SIZE)
            .map(|i| {
                let t = i as f64 / SAMPLE_RATE as f64;
                (2.0 * std::f64::consts::PI * freq * t).sin() as f32 * 0.8
            })
            .collect();
        AudioFrame::new(samples, SAMPLE_RATE)
    }

    #[test]
    fn silence_yields_no_signal() {
        let update = pipeline().process(
            AudioFrame::new(vec![0.0; FRAME_SIZE], SAMPLE_RATE),
            TuningOffset::default(),
        );
        assert_eq!(update.tier, TuningTier::NoSignal);
        assert!(!update.reading.valid);
        assert_eq!(update.reading.note_name, "--");
    }

    #[test]
    fn bin_centred_tone_is_classified() {
        // Bin 41 is 882.86 Hz: A5 + 5.6 cents.
        let freq = 41.0 * SAMPLE_RATE as f64 / FRAME_SIZE as f64;
        let update = pipeline().process(tone(freq), TuningOffset::default());
        assert_eq!(update.reading.note_name, "A");
        assert_eq!(update.reading.octave, 5);
        assert_eq!(update.tier, TuningTier::Close);
    }

    #[test]
    fn remap_applies_new_offset() {
        let pipeline = pipeline();
        let update = pipeline.remap(196.0, TuningOffset::new(2).unwrap());
        assert_eq!((update.reading.note_name, update.reading.octave), ("F", 3));
        assert_eq!(update.tier, TuningTier::InTune);
    }

    #[test]
    fn refined_pipeline_tunes_open_a_string() {
        let mut config = TunerConfig::default();
        config.analysis.refine_peak = true;
        let mut pipeline = TuningPipeline::from_config(&config).unwrap();
        let update = pipeline.process(tone(110.0), TuningOffset::default());
        assert_eq!((update.reading.note_name, update.reading.octave), ("A", 2));
        assert!(update.reading.cents.abs() < 30.0);
    }
}
