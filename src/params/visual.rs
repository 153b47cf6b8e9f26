//! Particle field and image surface parameters.

use crate::error::{Result, VisualizerError};

/// Particle field parameters (scene units, per-tick rates)
#[derive(Debug, Clone)]
pub struct ParticleConfig {
    /// Number of particles (fixed for the lifetime of the field)
    pub count: usize,

    /// Inner radius of the spawn shell
    pub shell_radius: f32,

    /// Shell thickness (spawn radius is uniform in [radius, radius + thickness))
    pub shell_thickness: f32,

    /// Per-tick drift per unit band energy
    pub drift_scale: f32,

    /// Hue sweep per unit of scene time
    pub hue_rate: f32,

    /// Hue offset per flat component index (desynchronizes colors)
    pub hue_spread: f32,

    /// HSL saturation
    pub saturation: f32,

    /// HSL lightness at zero treble (treble adds up to `1 - base_lightness`)
    pub base_lightness: f32,

    /// Size at zero bass
    pub base_size: f32,

    /// Size added at full bass
    pub bass_size_scale: f32,

    /// Y-axis spin per tick, plus extra per unit bass
    pub spin_y: (f32, f32),

    /// X-axis spin per tick, plus extra per unit treble
    pub spin_x: (f32, f32),

    /// Seed for the initial scatter
    pub seed: u64,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            count: 3000,
            shell_radius: 5.0,
            shell_thickness: 2.0,
            drift_scale: 0.01,
            hue_rate: 0.1,
            hue_spread: 0.001,
            saturation: 0.7,
            base_lightness: 0.5,
            base_size: 0.05,
            bass_size_scale: 0.1,
            spin_y: (0.002, 0.003),
            spin_x: (0.001, 0.002),
            seed: 0x5eed,
        }
    }
}

impl ParticleConfig {
    pub fn validate(&self) -> Result<()> {
        if self.count == 0 {
            return Err(VisualizerError::Config(
                "particle count must be > 0".to_string(),
            ));
        }
        if self.shell_radius <= 0.0 || self.shell_thickness < 0.0 {
            return Err(VisualizerError::Config(format!(
                "invalid particle shell radius {} / thickness {}",
                self.shell_radius, self.shell_thickness
            )));
        }
        Ok(())
    }
}

/// Image plane and watermark geometry
#[derive(Debug, Clone)]
pub struct SurfaceConfig {
    /// Plane height in scene units (width follows the image aspect ratio)
    pub base_height: f32,

    /// Subdivisions per side (vertex shader deforms along the normal)
    pub segments: u32,

    /// Watermark quad edge length in scene units
    pub watermark_size: f32,
}

impl Default for SurfaceConfig {
    fn default() -> Self {
        Self {
            base_height: 5.0,
            segments: 50,
            watermark_size: 1.0,
        }
    }
}
