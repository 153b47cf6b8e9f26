//! Command-line argument parsing.

use clap::Parser;
use std::path::PathBuf;

use crate::error::{Result, VisualizerError};
use crate::params::{RecordingConfig, VisualizerParams};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(name = "Spectraplane")]
#[command(about = "Audio-reactive image plane with a beat-driven particle field")]
#[command(long_about = None)]
pub struct Args {
    /// Audio file to play at startup (drop another onto the window to replace it)
    #[arg(long, value_name = "PATH")]
    pub audio: Option<PathBuf>,

    /// Image shown on the plane
    #[arg(long, value_name = "PATH")]
    pub image: Option<PathBuf>,

    /// Logo drawn in the bottom-right corner
    #[arg(long, value_name = "PATH")]
    pub watermark: Option<PathBuf>,

    /// Number of particles in the field
    #[arg(long, value_name = "N", default_value = "3000")]
    pub particles: usize,

    /// Bass energy a beat must exceed (0-1)
    #[arg(long, value_name = "F", default_value = "0.7")]
    pub beat_threshold: f32,

    /// Minimum gap between beats (milliseconds)
    #[arg(long, value_name = "MS", default_value = "100")]
    pub refractory_ms: u64,

    /// Start in borderless fullscreen
    #[arg(long)]
    pub fullscreen: bool,

    /// Record frames and audio (duration in seconds), then exit
    #[arg(long, value_name = "SECONDS")]
    pub record: Option<f32>,
}

impl Args {
    /// Default parameters with the command-line overrides applied
    pub fn visualizer_params(&self) -> VisualizerParams {
        let mut params = VisualizerParams::default();
        params.particles.count = self.particles;
        params.beat.threshold = self.beat_threshold;
        params.beat.refractory_ms = self.refractory_ms;
        params
    }

    /// Create recording configuration if recording mode is enabled
    pub fn create_recording_config(&self) -> Result<Option<RecordingConfig>> {
        let Some(duration) = self.record else {
            return Ok(None);
        };
        if !(duration > 0.0) {
            return Err(VisualizerError::Config(format!(
                "recording duration must be positive, got {duration}"
            )));
        }

        let config = RecordingConfig::new(duration);

        // Create output directories
        std::fs::create_dir_all(config.frames_dir()).map_err(|e| {
            VisualizerError::Recording(format!("failed to create {}: {e}", config.frames_dir()))
        })?;

        Ok(Some(config))
    }
}
