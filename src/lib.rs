//! Spectraplane library - audio-reactive image plane and particle field

pub mod audio;
pub mod beat;
pub mod camera;
pub mod cli;
pub mod error;
pub mod glitch;
pub mod loader;
pub mod params;
pub mod particles;
pub mod rendering;
pub mod surface;
pub mod visualizer;
