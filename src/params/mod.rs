//! Parameter definitions with units and documented semantics.
//!
//! All tuning constants of the pipeline live here:
//! - Analyser and band layout
//! - Beat threshold, refractory window and envelope decay
//! - Particle, surface and render settings

mod audio;
mod render;
mod visual;

// Re-export all types
pub use audio::{audio_constants, AnalyserConfig, BandConfig, BeatConfig};
pub use render::{RecordingConfig, RenderConfig};
pub use visual::{ParticleConfig, SurfaceConfig};

use crate::error::Result;

/// Complete pipeline configuration
#[derive(Debug, Clone, Default)]
pub struct VisualizerParams {
    pub analyser: AnalyserConfig,
    pub bands: BandConfig,
    pub beat: BeatConfig,
    pub particles: ParticleConfig,
    pub surface: SurfaceConfig,
    pub render: RenderConfig,
}

impl VisualizerParams {
    /// Validate every section against each other
    pub fn validate(&self) -> Result<()> {
        self.analyser.validate()?;
        self.bands.validate(self.analyser.bin_count())?;
        self.beat.validate()?;
        self.particles.validate()?;
        Ok(())
    }
}
