//! Spectrum analysis, band and beat configuration.

use std::ops::Range;
use std::time::Duration;

use crate::error::{Result, VisualizerError};

/// Frequency analyser configuration
///
/// Models a byte-quantized analyser node: windowed FFT, temporal smoothing,
/// then decibels mapped linearly onto 0..=255.
#[derive(Debug, Clone)]
pub struct AnalyserConfig {
    /// FFT window size (samples, must be power of 2)
    /// Reference value: 512 (= 256 magnitude bins)
    pub fft_size: usize,

    /// Blend factor with the previous frame (0 = no smoothing, must be < 1)
    pub smoothing_time_constant: f32,

    /// Level mapped to byte 0 (dBFS)
    pub min_decibels: f32,

    /// Level mapped to byte 255 (dBFS)
    pub max_decibels: f32,
}

impl Default for AnalyserConfig {
    fn default() -> Self {
        Self {
            fft_size: 512,
            smoothing_time_constant: 0.8,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AnalyserConfig {
    /// Number of usable magnitude bins per frame
    pub fn bin_count(&self) -> usize {
        self.fft_size / 2
    }

    pub fn validate(&self) -> Result<()> {
        if !self.fft_size.is_power_of_two() || self.fft_size < 32 {
            return Err(VisualizerError::Config(format!(
                "FFT size must be a power of 2 >= 32, got {}",
                self.fft_size
            )));
        }
        if !(0.0..1.0).contains(&self.smoothing_time_constant) {
            return Err(VisualizerError::Config(format!(
                "smoothing time constant must be in [0, 1), got {}",
                self.smoothing_time_constant
            )));
        }
        if self.max_decibels <= self.min_decibels {
            return Err(VisualizerError::Config(format!(
                "max decibels ({}) must exceed min decibels ({})",
                self.max_decibels, self.min_decibels
            )));
        }
        Ok(())
    }
}

/// Bin ranges averaged into the three bands
///
/// Boundaries are tunable; they have to partition the frame contiguously.
#[derive(Debug, Clone)]
pub struct BandConfig {
    /// Reference bins: 0..10
    pub bass_bins: Range<usize>,

    /// Reference bins: 10..100
    pub mid_bins: Range<usize>,

    /// Reference bins: 100..256
    pub treble_bins: Range<usize>,
}

impl Default for BandConfig {
    fn default() -> Self {
        Self {
            bass_bins: 0..10,
            mid_bins: 10..100,
            treble_bins: 100..256,
        }
    }
}

impl BandConfig {
    /// Check the ranges are non-empty, gapless and fit a frame of `bin_count` bins
    pub fn validate(&self, bin_count: usize) -> Result<()> {
        let bands = [
            ("bass", &self.bass_bins),
            ("mid", &self.mid_bins),
            ("treble", &self.treble_bins),
        ];

        for (name, range) in bands {
            if range.is_empty() {
                return Err(VisualizerError::Config(format!(
                    "{name} band {range:?} is empty"
                )));
            }
        }
        if self.bass_bins.end != self.mid_bins.start || self.mid_bins.end != self.treble_bins.start
        {
            return Err(VisualizerError::Config(format!(
                "bands must be contiguous, got {:?} {:?} {:?}",
                self.bass_bins, self.mid_bins, self.treble_bins
            )));
        }
        if self.treble_bins.end > bin_count {
            return Err(VisualizerError::Config(format!(
                "treble band ends at bin {} but frames only have {bin_count} bins",
                self.treble_bins.end
            )));
        }
        Ok(())
    }
}

/// Beat detection, envelope and glitch timing
#[derive(Debug, Clone)]
pub struct BeatConfig {
    /// Normalized bass level a beat must exceed
    pub threshold: f32,

    /// Minimum spacing between two beats (milliseconds)
    pub refractory_ms: u64,

    /// Envelope decrement per tick (0.1 = silent after 10 ticks)
    pub decay_step: f32,

    /// How long the glitch effect stays on after a beat (milliseconds)
    pub glitch_duration_ms: u64,
}

impl Default for BeatConfig {
    fn default() -> Self {
        Self {
            threshold: 0.7,
            refractory_ms: 100,
            decay_step: 0.1,
            glitch_duration_ms: 100,
        }
    }
}

impl BeatConfig {
    pub fn refractory(&self) -> Duration {
        Duration::from_millis(self.refractory_ms)
    }

    pub fn glitch_duration(&self) -> Duration {
        Duration::from_millis(self.glitch_duration_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(VisualizerError::Config(format!(
                "beat threshold must be in [0, 1], got {}",
                self.threshold
            )));
        }
        if !(self.decay_step > 0.0 && self.decay_step <= 1.0) {
            return Err(VisualizerError::Config(format!(
                "envelope decay step must be in (0, 1], got {}",
                self.decay_step
            )));
        }
        Ok(())
    }
}

/// Audio constants
pub mod audio_constants {
    /// Largest byte magnitude the analyser emits
    pub const MAX_MAGNITUDE: f32 = 255.0;

    /// Fallback when a container does not report its sample rate
    pub const DEFAULT_SAMPLE_RATE_HZ: u32 = 44_100;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_bands_partition_frame() {
        let analyser = AnalyserConfig::default();
        let bands = BandConfig::default();

        assert_eq!(analyser.bin_count(), 256);
        assert!(bands.validate(analyser.bin_count()).is_ok());
    }

    #[test]
    fn test_gapped_bands_rejected() {
        let bands = BandConfig {
            bass_bins: 0..10,
            mid_bins: 12..100,
            treble_bins: 100..256,
        };
        assert!(bands.validate(256).is_err());
    }

    #[test]
    fn test_bands_past_frame_rejected() {
        let bands = BandConfig::default();
        assert!(bands.validate(128).is_err());
    }

    #[test]
    fn test_analyser_validation() {
        let mut config = AnalyserConfig::default();
        assert!(config.validate().is_ok());

        config.fft_size = 500;
        assert!(config.validate().is_err());

        config.fft_size = 512;
        config.smoothing_time_constant = 1.0;
        assert!(config.validate().is_err());
    }
}
