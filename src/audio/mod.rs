//! Audio decoding, playback and spectrum analysis.
//!
//! Decoded files are played through cpal; the played samples feed a
//! byte-quantized spectrum sampler whose frames are reduced to three bands.

mod analyser;
mod bands;
mod decode;
mod player;

pub use analyser::{blackman_window, SignalSource, SpectrumFrame, SpectrumSampler};
pub use bands::{BandAggregator, BandEnergies};
pub use decode::{decode_file, DecodedAudio};
pub use player::{AudioPlayer, PlaybackCursor, PlaybackTap, SteppedPlayback, WavRecorder};
