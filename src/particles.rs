//! Orbiting particle field driven by band energies.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec2};
use std::f32::consts::PI;

use crate::audio::BandEnergies;
use crate::params::ParticleConfig;

/// GPU instance data for one particle (32 bytes)
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ParticleInstance {
    pub position: [f32; 3],
    pub size: f32,
    pub color: [f32; 3],
    pub _padding: f32,
}

/// Fixed-size particle field stored as parallel attribute arrays
pub struct ParticleSystem {
    positions: Vec<[f32; 3]>,
    colors: Vec<[f32; 3]>,
    sizes: Vec<f32>,
    /// Bulk rotation (x, y) in radians
    rotation: Vec2,
    dirty: bool,
    config: ParticleConfig,
}

impl ParticleSystem {
    /// Scatter particles in a spherical shell
    ///
    /// Radius is uniform in the shell band; direction is uniform on the sphere
    /// (theta uniform, phi = acos(2u - 1)).
    pub fn new(config: ParticleConfig) -> Self {
        let mut rng = fastrand::Rng::with_seed(config.seed);
        let count = config.count;

        let mut positions = Vec::with_capacity(count);
        let mut colors = Vec::with_capacity(count);
        let mut sizes = Vec::with_capacity(count);

        for _ in 0..count {
            let radius = config.shell_radius + rng.f32() * config.shell_thickness;
            let theta = rng.f32() * 2.0 * PI;
            let phi = (rng.f32() * 2.0 - 1.0).acos();

            positions.push([
                radius * phi.sin() * theta.cos(),
                radius * phi.sin() * theta.sin(),
                radius * phi.cos(),
            ]);
            colors.push([rng.f32(), rng.f32(), rng.f32()]);
            sizes.push(rng.f32() * 0.1 + 0.02);
        }

        Self {
            positions,
            colors,
            sizes,
            rotation: Vec2::ZERO,
            dirty: true,
            config,
        }
    }

    /// Advance one tick
    ///
    /// # Arguments
    /// * `time` - Scene time (drives oscillation phase and hue sweep)
    /// * `bands` - Band energies, each expected in [0, 1]
    pub fn update(&mut self, time: f32, bands: &BandEnergies) {
        let c = &self.config;
        let lightness = c.base_lightness + bands.treble * (1.0 - c.base_lightness);
        let size = c.base_size + bands.bass * c.bass_size_scale;

        for (p, ((position, color), particle_size)) in self
            .positions
            .iter_mut()
            .zip(self.colors.iter_mut())
            .zip(self.sizes.iter_mut())
            .enumerate()
        {
            // Phase follows the flat component index so neighbours desynchronize
            let i = (p * 3) as f32;

            position[0] += (time + i).sin() * bands.bass * c.drift_scale;
            position[1] += (time + i).cos() * bands.mid * c.drift_scale;
            position[2] += (time * 0.5 + i).sin() * bands.treble * c.drift_scale;

            let hue = (time * c.hue_rate + i * c.hue_spread).rem_euclid(1.0);
            *color = hsl_to_rgb(hue, c.saturation, lightness);

            *particle_size = size;
        }

        self.rotation.y += c.spin_y.0 + bands.bass * c.spin_y.1;
        self.rotation.x += c.spin_x.0 + bands.treble * c.spin_x.1;
        self.dirty = true;
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &[[f32; 3]] {
        &self.positions
    }

    pub fn colors(&self) -> &[[f32; 3]] {
        &self.colors
    }

    pub fn sizes(&self) -> &[f32] {
        &self.sizes
    }

    pub fn rotation(&self) -> Vec2 {
        self.rotation
    }

    /// Rotation applied to the whole field (X then Y, like an XYZ Euler)
    pub fn model_matrix(&self) -> Mat4 {
        Mat4::from_rotation_x(self.rotation.x) * Mat4::from_rotation_y(self.rotation.y)
    }

    /// Returns whether attributes changed since the last call, clearing the flag
    pub fn take_dirty(&mut self) -> bool {
        std::mem::replace(&mut self.dirty, false)
    }

    /// Interleave the attribute arrays for upload
    pub fn write_instances(&self, out: &mut Vec<ParticleInstance>) {
        out.clear();
        out.extend(
            self.positions
                .iter()
                .zip(&self.colors)
                .zip(&self.sizes)
                .map(|((&position, &color), &size)| ParticleInstance {
                    position,
                    size,
                    color,
                    _padding: 0.0,
                }),
        );
    }
}

/// HSL (all components in [0, 1]) to RGB
pub fn hsl_to_rgb(hue: f32, saturation: f32, lightness: f32) -> [f32; 3] {
    if saturation <= 0.0 {
        return [lightness; 3];
    }

    let q = if lightness <= 0.5 {
        lightness * (1.0 + saturation)
    } else {
        lightness + saturation - lightness * saturation
    };
    let p = 2.0 * lightness - q;

    [
        hue_to_channel(p, q, hue + 1.0 / 3.0),
        hue_to_channel(p, q, hue),
        hue_to_channel(p, q, hue - 1.0 / 3.0),
    ]
}

fn hue_to_channel(p: f32, q: f32, t: f32) -> f32 {
    let t = t.rem_euclid(1.0);
    if t < 1.0 / 6.0 {
        p + (q - p) * 6.0 * t
    } else if t < 0.5 {
        q
    } else if t < 2.0 / 3.0 {
        p + (q - p) * 6.0 * (2.0 / 3.0 - t)
    } else {
        p
    }
}
