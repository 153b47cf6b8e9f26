//! Spectrum sampler: windowed FFT with byte-quantized magnitudes.

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::f32::consts::PI;
use std::sync::Arc;

use crate::error::Result;
use crate::params::{audio_constants::MAX_MAGNITUDE, AnalyserConfig};

/// Anything that can hand over its most recent mono samples
///
/// Implementations fill `out` with the newest `out.len()` samples, oldest
/// first, zero-padding at the front when fewer are available.
pub trait SignalSource {
    fn read_recent(&self, out: &mut [f32]);
}

impl SignalSource for Vec<f32> {
    fn read_recent(&self, out: &mut [f32]) {
        let take = self.len().min(out.len());
        let pad = out.len() - take;
        out[..pad].fill(0.0);
        out[pad..].copy_from_slice(&self[self.len() - take..]);
    }
}

/// One tick's magnitudes, one byte per frequency bin (0..=255)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpectrumFrame {
    bins: Vec<u8>,
}

impl SpectrumFrame {
    /// Silent frame with `len` bins
    pub fn new(len: usize) -> Self {
        Self { bins: vec![0; len] }
    }

    pub fn from_bins(bins: Vec<u8>) -> Self {
        Self { bins }
    }

    pub fn bins(&self) -> &[u8] {
        &self.bins
    }

    pub fn len(&self) -> usize {
        self.bins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bins.is_empty()
    }
}

/// Frequency analyser producing a [`SpectrumFrame`] per call
///
/// Keeps the smoothed magnitudes of the previous call, so a sampler should be
/// [`reset`](Self::reset) when its audio source is swapped.
pub struct SpectrumSampler {
    config: AnalyserConfig,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    time_domain: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    frame: SpectrumFrame,
}

impl SpectrumSampler {
    pub fn new(config: AnalyserConfig) -> Result<Self> {
        config.validate()?;

        let size = config.fft_size;
        let mut planner = FftPlanner::new();
        let fft = planner.plan_fft_forward(size);
        let window = (0..size).map(|i| blackman_window(i, size)).collect();

        Ok(Self {
            fft,
            window,
            time_domain: vec![0.0; size],
            spectrum: vec![Complex::new(0.0, 0.0); size],
            smoothed: vec![0.0; config.bin_count()],
            frame: SpectrumFrame::new(config.bin_count()),
            config,
        })
    }

    /// Pull the newest samples from `source` and analyse them
    pub fn sample(&mut self, source: &dyn SignalSource) -> &SpectrumFrame {
        source.read_recent(&mut self.time_domain);

        for ((out, &sample), &w) in self
            .spectrum
            .iter_mut()
            .zip(&self.time_domain)
            .zip(&self.window)
        {
            *out = Complex::new(sample * w, 0.0);
        }
        self.fft.process(&mut self.spectrum);

        let size = self.config.fft_size as f32;
        let tau = self.config.smoothing_time_constant;
        let db_range = self.config.max_decibels - self.config.min_decibels;

        for (k, (smoothed, byte)) in self
            .smoothed
            .iter_mut()
            .zip(self.frame.bins.iter_mut())
            .enumerate()
        {
            let magnitude = self.spectrum[k].norm() / size;
            *smoothed = tau * *smoothed + (1.0 - tau) * magnitude;

            *byte = if *smoothed > 0.0 {
                let db = 20.0 * smoothed.log10();
                let scaled = MAX_MAGNITUDE * (db - self.config.min_decibels) / db_range;
                scaled.clamp(0.0, MAX_MAGNITUDE) as u8
            } else {
                0
            };
        }

        &self.frame
    }

    /// Last frame produced (silent before the first sample)
    pub fn frame(&self) -> &SpectrumFrame {
        &self.frame
    }

    /// Forget smoothing history
    pub fn reset(&mut self) {
        self.smoothed.fill(0.0);
        self.frame = SpectrumFrame::new(self.config.bin_count());
    }
}

/// Blackman window (alpha = 0.16), periodic form
pub fn blackman_window(index: usize, size: usize) -> f32 {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;
    let x = index as f32 / size as f32;
    a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tone(bin: usize, size: usize, amplitude: f32) -> Vec<f32> {
        (0..size)
            .map(|i| amplitude * (2.0 * PI * bin as f32 * i as f32 / size as f32).sin())
            .collect()
    }

    #[test]
    fn test_blackman_window() {
        let size = 512;

        // Zero at the leading edge, 1 at the center
        assert!(blackman_window(0, size).abs() < 1e-6);
        assert!((blackman_window(size / 2, size) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_silence_is_all_zero() {
        let mut sampler = SpectrumSampler::new(AnalyserConfig::default()).unwrap();
        let silence = vec![0.0f32; 512];

        let frame = sampler.sample(&silence);

        assert_eq!(frame.len(), 256);
        assert!(frame.bins().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_pure_tone_peaks_at_its_bin() {
        let mut sampler = SpectrumSampler::new(AnalyserConfig::default()).unwrap();
        // Quiet enough that the main lobe stays below the byte ceiling
        let signal = tone(32, 512, 0.01);

        for _ in 0..10 {
            sampler.sample(&signal);
        }
        let bins = sampler.frame().bins();

        let peak = bins
            .iter()
            .enumerate()
            .max_by_key(|&(_, b)| *b)
            .map(|(i, _)| i)
            .unwrap();
        assert_eq!(peak, 32);
        assert!(bins[32] > bins[100]);
    }

    #[test]
    fn test_smoothing_ramps_up() {
        let mut sampler = SpectrumSampler::new(AnalyserConfig::default()).unwrap();
        let signal = tone(64, 512, 0.5);

        let first = sampler.sample(&signal).bins()[64];
        let second = sampler.sample(&signal).bins()[64];
        assert!(second >= first);
        assert!(second > 0);
    }

    #[test]
    fn test_short_source_is_front_padded() {
        let source = vec![1.0f32, 2.0, 3.0];
        let mut out = [9.0f32; 5];
        source.read_recent(&mut out);
        assert_eq!(out, [0.0, 0.0, 1.0, 2.0, 3.0]);

        let mut short = [0.0f32; 2];
        source.read_recent(&mut short);
        assert_eq!(short, [2.0, 3.0]);
    }

    #[test]
    fn test_reset_clears_history() {
        let mut sampler = SpectrumSampler::new(AnalyserConfig::default()).unwrap();
        sampler.sample(&tone(16, 512, 0.5));
        sampler.reset();

        let frame = sampler.sample(&vec![0.0f32; 512]);
        assert!(frame.bins().iter().all(|&b| b == 0));
    }
}
