//! Band aggregation: spectrum bins to bass/mid/treble energies.

use std::ops::Range;

use super::analyser::SpectrumFrame;
use crate::params::{audio_constants::MAX_MAGNITUDE, BandConfig};

/// Normalized band energies for one tick, each in [0, 1]
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BandEnergies {
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
}

/// Averages fixed bin ranges of a [`SpectrumFrame`]
#[derive(Debug, Clone)]
pub struct BandAggregator {
    config: BandConfig,
}

impl BandAggregator {
    pub fn new(config: BandConfig) -> Self {
        Self { config }
    }

    /// Mean magnitude of each band, divided by the byte maximum
    pub fn aggregate(&self, frame: &SpectrumFrame) -> BandEnergies {
        let bins = frame.bins();
        BandEnergies {
            bass: mean_energy(bins, &self.config.bass_bins),
            mid: mean_energy(bins, &self.config.mid_bins),
            treble: mean_energy(bins, &self.config.treble_bins),
        }
    }
}

/// Mean of `bins[range]` over 255; ranges clipped to the frame, empty ones read as 0
fn mean_energy(bins: &[u8], range: &Range<usize>) -> f32 {
    let end = range.end.min(bins.len());
    let start = range.start.min(end);
    let slice = &bins[start..end];
    if slice.is_empty() {
        return 0.0;
    }

    let sum: u32 = slice.iter().map(|&b| u32::from(b)).sum();
    sum as f32 / slice.len() as f32 / MAX_MAGNITUDE
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame_with(f: impl FnMut(usize) -> u8) -> SpectrumFrame {
        SpectrumFrame::from_bins((0..256).map(f).collect())
    }

    #[test]
    fn test_full_bass_only() {
        let aggregator = BandAggregator::new(BandConfig::default());
        let frame = frame_with(|i| if i < 10 { 255 } else { 0 });

        let bands = aggregator.aggregate(&frame);

        assert_eq!(bands.bass, 1.0);
        assert_eq!(bands.mid, 0.0);
        assert_eq!(bands.treble, 0.0);
    }

    #[test]
    fn test_bands_stay_normalized() {
        let aggregator = BandAggregator::new(BandConfig::default());
        let mut rng = fastrand::Rng::with_seed(7);

        for _ in 0..200 {
            let frame = frame_with(|_| rng.u8(..));
            let bands = aggregator.aggregate(&frame);
            for value in [bands.bass, bands.mid, bands.treble] {
                assert!((0.0..=1.0).contains(&value), "{value} out of range");
            }
        }

        let loud = aggregator.aggregate(&frame_with(|_| 255));
        assert_eq!(loud, BandEnergies { bass: 1.0, mid: 1.0, treble: 1.0 });
    }

    #[test]
    fn test_aggregate_is_pure() {
        let aggregator = BandAggregator::new(BandConfig::default());
        let frame = frame_with(|i| (i % 251) as u8);

        assert_eq!(aggregator.aggregate(&frame), aggregator.aggregate(&frame));
    }

    #[test]
    fn test_mid_band_mean() {
        let aggregator = BandAggregator::new(BandConfig::default());
        // Half the mid bins at 255, half at 0
        let frame = frame_with(|i| if (10..55).contains(&i) { 255 } else { 0 });

        let bands = aggregator.aggregate(&frame);
        assert!((bands.mid - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_empty_frame_reads_silent() {
        let aggregator = BandAggregator::new(BandConfig::default());
        let bands = aggregator.aggregate(&SpectrumFrame::new(0));
        assert_eq!(bands, BandEnergies::default());
    }
}
