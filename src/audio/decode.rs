//! Audio file decoding to interleaved f32 PCM.

use std::fs::File;
use std::io::ErrorKind;
use std::path::Path;

use symphonia::core::audio::{SampleBuffer, SignalSpec};
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::error::{Result, VisualizerError};
use crate::params::audio_constants::DEFAULT_SAMPLE_RATE_HZ;

/// A fully decoded audio file
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    /// Interleaved samples in [-1, 1]
    pub samples: Vec<f32>,
    pub channels: usize,
    pub sample_rate: u32,
}

impl DecodedAudio {
    /// Number of sample frames (one sample per channel)
    pub fn frames(&self) -> usize {
        self.samples.len() / self.channels.max(1)
    }

    pub fn duration_secs(&self) -> f32 {
        self.frames() as f32 / self.sample_rate.max(1) as f32
    }
}

/// Decode the first audio track of `path`
///
/// Corrupt packets are skipped with a warning; any other failure aborts the
/// decode so the caller can keep playing what it had.
pub fn decode_file(path: &Path) -> Result<DecodedAudio> {
    let file = File::open(path).map_err(|source| VisualizerError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        mss,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| VisualizerError::NoAudio(path.to_path_buf()))?;
    let track_id = track.id;
    let mut sample_rate = track.codec_params.sample_rate.unwrap_or(DEFAULT_SAMPLE_RATE_HZ);
    let mut channels = track.codec_params.channels.map(|c| c.count()).unwrap_or(2);

    let mut decoder =
        symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

    let mut samples = Vec::new();
    // Reused across packets while capacity and layout allow
    let mut sample_buf: Option<(usize, SignalSpec, SampleBuffer<f32>)> = None;

    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(SymphoniaError::DecodeError(msg)) => {
                log::warn!("Skipping corrupt audio packet in {}: {}", path.display(), msg);
                continue;
            }
            Err(e) => return Err(e.into()),
        };

        let spec = *decoded.spec();
        let capacity = decoded.capacity();
        sample_rate = spec.rate;
        channels = spec.channels.count();

        let reuse = matches!(
            &sample_buf,
            Some((cap, buf_spec, _)) if *cap >= capacity && *buf_spec == spec
        );
        if !reuse {
            sample_buf = Some((capacity, spec, SampleBuffer::new(capacity as u64, spec)));
        }
        if let Some((_, _, buf)) = sample_buf.as_mut() {
            buf.copy_interleaved_ref(decoded);
            samples.extend_from_slice(buf.samples());
        }
    }

    if samples.is_empty() || channels == 0 {
        return Err(VisualizerError::NoAudio(path.to_path_buf()));
    }

    Ok(DecodedAudio {
        samples,
        channels,
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        std::env::temp_dir().join(format!("spectraplane-{}-{}", std::process::id(), name))
    }

    #[test]
    fn test_decode_wav() {
        let path = temp_path("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 22_050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for i in 0..2205 {
            let s = ((i as f32 * 0.05).sin() * 16_000.0) as i16;
            writer.write_sample(s).unwrap();
            writer.write_sample(-s).unwrap();
        }
        writer.finalize().unwrap();

        let audio = decode_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(audio.channels, 2);
        assert_eq!(audio.sample_rate, 22_050);
        assert_eq!(audio.frames(), 2205);
        assert!((audio.duration_secs() - 0.1).abs() < 1e-3);
        assert!(audio.samples.iter().all(|s| (-1.0..=1.0).contains(s)));
        // Right channel mirrors the left
        assert!((audio.samples[20] + audio.samples[21]).abs() < 1e-3);
    }

    #[test]
    fn test_decode_spans_many_packets_in_order() {
        let path = temp_path("ramp.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let written: Vec<i16> = (0..20_000).map(|i| (i % 2000) as i16 * 8 - 8000).collect();
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for &s in &written {
            writer.write_sample(s).unwrap();
        }
        writer.finalize().unwrap();

        let audio = decode_file(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(audio.channels, 1);
        assert_eq!(audio.samples.len(), written.len());
        for (decoded, &raw) in audio.samples.iter().zip(&written) {
            assert!((decoded - raw as f32 / 32_768.0).abs() < 1e-4);
        }
    }

    #[test]
    fn test_missing_file() {
        let err = decode_file(Path::new("/definitely/not/here.mp3")).unwrap_err();
        assert!(matches!(err, VisualizerError::Io { .. }));
    }

    #[test]
    fn test_garbage_is_rejected() {
        let path = temp_path("garbage.ogg");
        std::fs::write(&path, b"this is not an audio file at all").unwrap();

        let result = decode_file(&path);
        std::fs::remove_file(&path).ok();

        assert!(result.is_err());
    }
}
