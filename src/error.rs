//! Error type shared by the loaders, audio output and renderer.

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong outside the per-frame pipeline.
///
/// None of these are fatal once the window is up: a failed load leaves the
/// previous resource in place and is only logged.
#[derive(Debug, Error)]
pub enum VisualizerError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("audio decode failed: {0}")]
    AudioDecode(#[from] symphonia::core::errors::Error),

    #[error("no playable audio in {0}")]
    NoAudio(PathBuf),

    #[error("image decode failed: {0}")]
    ImageDecode(#[from] image::ImageError),

    #[error("audio output: {0}")]
    AudioDevice(String),

    #[error("render setup: {0}")]
    Render(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("recording: {0}")]
    Recording(String),
}

pub type Result<T> = std::result::Result<T, VisualizerError>;
