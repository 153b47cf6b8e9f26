//! The per-frame audio-to-visual pipeline.
//!
//! One [`Visualizer`] owns all pipeline state. Each display refresh calls
//! [`Visualizer::tick`]: sample the spectrum, aggregate bands, detect beats,
//! update the envelope, then push everything into the [`VisualSink`]. The
//! renderer only reads the results, so the pipeline runs without a GPU.

use image::RgbaImage;
use std::path::PathBuf;
use std::time::Duration;

use crate::audio::{BandAggregator, BandEnergies, DecodedAudio, SignalSource, SpectrumSampler};
use crate::beat::{BeatDetector, BeatEnvelope};
use crate::error::Result;
use crate::glitch::GlitchEffect;
use crate::loader::{AssetKind, Completion, LoadedAsset};
use crate::params::VisualizerParams;
use crate::particles::ParticleSystem;
use crate::surface::VisualSurface;

/// Uniform values shared by the plane's vertex and fragment stages
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ShaderUniforms {
    pub time: f32,
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub beat: f32,
}

/// Everything the pipeline derived for one tick
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameSignals {
    pub bands: BandEnergies,
    pub beat_envelope: f32,
    pub is_beat: bool,
}

/// A finished load the host installs itself (output device or GPU)
pub enum HostAsset {
    Audio { path: PathBuf, audio: DecodedAudio },
    Watermark(RgbaImage),
}

/// Consumer of the per-tick signals: uniforms, particles and the glitch toggle
pub struct VisualSink {
    uniforms: ShaderUniforms,
    particles: ParticleSystem,
    glitch: GlitchEffect,
}

impl VisualSink {
    pub fn new(particles: ParticleSystem, glitch: GlitchEffect) -> Self {
        Self {
            uniforms: ShaderUniforms::default(),
            particles,
            glitch,
        }
    }

    /// Apply one tick's signals at scene time `time` and clock reading `now`
    pub fn apply(&mut self, signals: &FrameSignals, time: f32, now: Duration) {
        self.uniforms = ShaderUniforms {
            time,
            bass: signals.bands.bass,
            mid: signals.bands.mid,
            treble: signals.bands.treble,
            beat: signals.beat_envelope,
        };

        self.particles.update(time, &signals.bands);

        if signals.is_beat {
            self.glitch.trigger(now);
        }
        self.glitch.poll(now);
    }

    pub fn uniforms(&self) -> &ShaderUniforms {
        &self.uniforms
    }

    pub fn particles(&self) -> &ParticleSystem {
        &self.particles
    }

    pub fn particles_mut(&mut self) -> &mut ParticleSystem {
        &mut self.particles
    }

    pub fn glitch(&self) -> &GlitchEffect {
        &self.glitch
    }
}

/// Pipeline controller: create, tick every frame, dispose
pub struct Visualizer {
    sampler: SpectrumSampler,
    aggregator: BandAggregator,
    detector: BeatDetector,
    envelope: BeatEnvelope,
    sink: VisualSink,
    surface: VisualSurface,
    time_scale: f32,
    ticks: u64,
}

impl Visualizer {
    pub fn new(params: &VisualizerParams) -> Result<Self> {
        params.validate()?;

        let particles = ParticleSystem::new(params.particles.clone());
        let glitch = GlitchEffect::new(params.beat.glitch_duration());

        Ok(Self {
            sampler: SpectrumSampler::new(params.analyser.clone())?,
            aggregator: BandAggregator::new(params.bands.clone()),
            detector: BeatDetector::new(&params.beat),
            envelope: BeatEnvelope::new(&params.beat),
            sink: VisualSink::new(particles, glitch),
            surface: VisualSurface::new(params.surface.clone()),
            time_scale: params.render.time_scale,
            ticks: 0,
        })
    }

    /// Run the pipeline for one display frame
    ///
    /// With no audio bound the tick is skipped and the previous visual state
    /// stays as it is; returns the derived signals otherwise.
    pub fn tick(
        &mut self,
        source: Option<&dyn SignalSource>,
        now: Duration,
    ) -> Option<FrameSignals> {
        let source = source?;

        let frame = self.sampler.sample(source);
        let bands = self.aggregator.aggregate(frame);
        let is_beat = self.detector.detect(bands.bass, now);
        let beat_envelope = self.envelope.update(is_beat);

        let signals = FrameSignals {
            bands,
            beat_envelope,
            is_beat,
        };
        let time = now.as_secs_f32() * self.time_scale;
        self.sink.apply(&signals, time, now);
        self.ticks += 1;

        Some(signals)
    }

    /// Swap in a finished load; a failure leaves the current asset in place
    ///
    /// Images go straight onto the surface. Audio and watermarks are handed
    /// back because only the host owns the output device and the GPU.
    pub fn apply_completion(&mut self, completion: Completion) -> Option<HostAsset> {
        let Completion {
            kind, path, result, ..
        } = completion;
        let asset = match result {
            Ok(asset) => asset,
            Err(e) => {
                log::warn!("Failed to load {}: {}", path.display(), e);
                return None;
            }
        };

        match (kind, asset) {
            (AssetKind::Image, LoadedAsset::Image(image)) => {
                log::info!("Image {} ({}x{})", path.display(), image.width(), image.height());
                self.surface.set_image(image);
                None
            }
            (AssetKind::Watermark, LoadedAsset::Image(image)) => Some(HostAsset::Watermark(image)),
            (AssetKind::Audio, LoadedAsset::Audio(audio)) => Some(HostAsset::Audio { path, audio }),
            (kind, _) => {
                log::warn!("Unexpected asset for {:?} load of {}", kind, path.display());
                None
            }
        }
    }

    /// Call when a new audio source replaces the old one
    pub fn audio_source_changed(&mut self) {
        self.sampler.reset();
    }

    /// Tear down, returning how many ticks ran
    pub fn dispose(self) -> u64 {
        log::debug!("Visualizer disposed after {} ticks", self.ticks);
        self.ticks
    }

    pub fn sink(&self) -> &VisualSink {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut VisualSink {
        &mut self.sink
    }

    pub fn surface(&self) -> &VisualSurface {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut VisualSurface {
        &mut self.surface
    }

    pub fn beat_envelope(&self) -> f32 {
        self.envelope.value()
    }

    pub fn last_beat(&self) -> Option<Duration> {
        self.detector.last_beat()
    }
}
