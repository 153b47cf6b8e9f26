//! Playback of decoded audio through the default output device.
//!
//! The device callback runs on the audio thread; it shares the most recent
//! mono samples with the render thread through a [`PlaybackTap`]. When
//! recording, [`SteppedPlayback`] renders the same mix a frame at a time
//! into a WAV file instead.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{FromSample, Sample, SampleFormat, SizedSample};
use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::sync::{Arc, Mutex};

use super::analyser::SignalSource;
use super::decode::DecodedAudio;
use crate::error::{Result, VisualizerError};

/// Ring of the most recently played mono samples
#[derive(Clone)]
pub struct PlaybackTap {
    recent: Arc<Mutex<VecDeque<f32>>>,
    capacity: usize,
}

impl PlaybackTap {
    pub fn new(capacity: usize) -> Self {
        Self {
            recent: Arc::new(Mutex::new(VecDeque::from(vec![0.0; capacity]))),
            capacity,
        }
    }

    /// Append samples, dropping the oldest beyond capacity
    pub fn push(&self, samples: &[f32]) {
        let Ok(mut recent) = self.recent.lock() else {
            return;
        };
        let skip = samples.len().saturating_sub(self.capacity);
        recent.extend(&samples[skip..]);
        let excess = recent.len().saturating_sub(self.capacity);
        recent.drain(..excess);
    }
}

impl SignalSource for PlaybackTap {
    fn read_recent(&self, out: &mut [f32]) {
        let Ok(recent) = self.recent.lock() else {
            out.fill(0.0);
            return;
        };
        let take = recent.len().min(out.len());
        let pad = out.len() - take;
        out[..pad].fill(0.0);
        for (dst, src) in out[pad..].iter_mut().zip(recent.range(recent.len() - take..)) {
            *dst = *src;
        }
    }
}

/// Read position into a decoded buffer, resampled to the device rate
pub struct PlaybackCursor {
    audio: DecodedAudio,
    /// Position in source frames
    position: f64,
    /// Source frames advanced per output frame
    step: f64,
}

impl PlaybackCursor {
    pub fn new(audio: DecodedAudio, output_rate: u32) -> Self {
        let step = audio.sample_rate as f64 / output_rate.max(1) as f64;
        Self {
            audio,
            position: 0.0,
            step,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.audio.frames() as f64
    }

    /// Fill interleaved `out` (`out_channels` wide), appending the mono mix to `mono`
    ///
    /// Silence is written once the buffer is exhausted.
    pub fn fill(&mut self, out: &mut [f32], out_channels: usize, mono: &mut Vec<f32>) {
        let out_channels = out_channels.max(1);
        let src_channels = self.audio.channels;
        let frames = self.audio.frames();

        for frame in out.chunks_mut(out_channels) {
            if self.is_finished() {
                frame.fill(0.0);
                mono.push(0.0);
                continue;
            }

            let index = self.position as usize;
            let frac = (self.position - index as f64) as f32;
            let next = (index + 1).min(frames - 1);
            let samples = &self.audio.samples;
            let sample_at = |c: usize| {
                let a = samples[index * src_channels + c];
                let b = samples[next * src_channels + c];
                a + (b - a) * frac
            };

            let mix: f32 = (0..src_channels).map(sample_at).sum();
            mono.push(mix / src_channels as f32);

            for (c, out_sample) in frame.iter_mut().enumerate() {
                *out_sample = if c < src_channels {
                    sample_at(c)
                } else if src_channels == 1 {
                    sample_at(0)
                } else {
                    0.0
                };
            }

            self.position += self.step;
        }
    }
}

/// WAV sink for recorded output
///
/// The first failed write is latched: it is logged once, nothing further is
/// written, and [`WavRecorder::finish`] reports it.
pub struct WavRecorder<W: Write + Seek = BufWriter<File>> {
    writer: Option<hound::WavWriter<W>>,
    error: Option<String>,
    channels: u16,
    sample_rate: u32,
}

impl WavRecorder {
    pub fn create(path: &str, channels: u16, sample_rate: u32) -> Result<Self> {
        let writer = hound::WavWriter::create(path, wav_spec(channels, sample_rate))
            .map_err(|e| VisualizerError::Recording(format!("{path}: {e}")))?;
        Ok(Self::from_writer(writer, channels, sample_rate))
    }
}

impl<W: Write + Seek> WavRecorder<W> {
    fn from_writer(writer: hound::WavWriter<W>, channels: u16, sample_rate: u32) -> Self {
        Self {
            writer: Some(writer),
            error: None,
            channels,
            sample_rate,
        }
    }

    fn write(&mut self, samples: &[f32]) {
        let Some(writer) = self.writer.as_mut() else {
            return;
        };
        for &s in samples {
            if let Err(e) = writer.write_sample(s) {
                log::error!("Recording audio failed, no further samples will be written: {e}");
                self.error = Some(e.to_string());
                self.writer = None;
                return;
            }
        }
    }

    /// Finalize the header, or report the write error that stopped recording
    pub fn finish(mut self) -> Result<()> {
        if let Some(error) = self.error.take() {
            return Err(VisualizerError::Recording(error));
        }
        match self.writer.take() {
            Some(writer) => writer
                .finalize()
                .map_err(|e| VisualizerError::Recording(e.to_string())),
            None => Ok(()),
        }
    }
}

fn wav_spec(channels: u16, sample_rate: u32) -> hound::WavSpec {
    hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    }
}

/// Playback locked to the video frame clock (recording mode)
///
/// Each captured frame advances the audio by exactly `sample_rate / fps`
/// frames, so the spectrum a frame is drawn from and the WAV written beside
/// it share one timeline. Nothing is sent to the output device.
pub struct SteppedPlayback<W: Write + Seek = BufWriter<File>> {
    cursor: Option<PlaybackCursor>,
    tap: PlaybackTap,
    recorder: WavRecorder<W>,
    fps: u32,
    /// Audio frames rendered so far
    written: u64,
    scratch: Vec<f32>,
    mono: Vec<f32>,
}

impl<W: Write + Seek> SteppedPlayback<W> {
    pub fn new(recorder: WavRecorder<W>, fps: u32, tap_len: usize) -> Self {
        Self {
            cursor: None,
            tap: PlaybackTap::new(tap_len),
            recorder,
            fps: fps.max(1),
            written: 0,
            scratch: Vec::new(),
            mono: Vec::new(),
        }
    }

    /// Continue from here with `audio`, resampled to the recording format
    pub fn set_audio(&mut self, audio: DecodedAudio) {
        self.cursor = Some(PlaybackCursor::new(audio, self.recorder.sample_rate));
    }

    pub fn has_audio(&self) -> bool {
        self.cursor.is_some()
    }

    /// Render audio up to the timestamp of video frame `frame_num`
    ///
    /// Silence fills any span with no audio bound.
    pub fn advance_to(&mut self, frame_num: usize) {
        let target = frame_num as u64 * self.recorder.sample_rate as u64 / self.fps as u64;
        let frames = target.saturating_sub(self.written) as usize;
        if frames == 0 {
            return;
        }

        let channels = self.recorder.channels.max(1) as usize;
        self.scratch.clear();
        self.scratch.resize(frames * channels, 0.0);
        self.mono.clear();
        match self.cursor {
            Some(ref mut cursor) => cursor.fill(&mut self.scratch, channels, &mut self.mono),
            None => self.mono.resize(frames, 0.0),
        }

        self.tap.push(&self.mono);
        self.recorder.write(&self.scratch);
        self.written = target;
    }

    pub fn tap(&self) -> &PlaybackTap {
        &self.tap
    }

    pub fn written_frames(&self) -> u64 {
        self.written
    }

    pub fn finish(self) -> Result<()> {
        self.recorder.finish()
    }
}

/// A playing audio source; playback stops when this is dropped
pub struct AudioPlayer {
    tap: PlaybackTap,
    /// Audio output stream (kept alive)
    _stream: cpal::Stream,
}

impl AudioPlayer {
    /// Start playing `audio` from the beginning on the default output device
    pub fn start(audio: DecodedAudio, tap_len: usize) -> Result<Self> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| VisualizerError::AudioDevice("no output device found".to_string()))?;
        let supported = device
            .default_output_config()
            .map_err(|e| VisualizerError::AudioDevice(e.to_string()))?;

        log::info!(
            "Audio: {} @ {}Hz, {} channels ({:.1}s source @ {}Hz)",
            device.name().unwrap_or_else(|_| "Unknown".to_string()),
            supported.sample_rate().0,
            supported.channels(),
            audio.duration_secs(),
            audio.sample_rate
        );

        let tap = PlaybackTap::new(tap_len);
        let cursor = PlaybackCursor::new(audio, supported.sample_rate().0);
        let sample_format = supported.sample_format();
        let config: cpal::StreamConfig = supported.into();

        let stream = match sample_format {
            SampleFormat::F32 => build_stream::<f32>(&device, &config, cursor, tap.clone()),
            SampleFormat::I16 => build_stream::<i16>(&device, &config, cursor, tap.clone()),
            SampleFormat::U16 => build_stream::<u16>(&device, &config, cursor, tap.clone()),
            other => Err(VisualizerError::AudioDevice(format!(
                "unsupported sample format {other:?}"
            ))),
        }?;

        stream
            .play()
            .map_err(|e| VisualizerError::AudioDevice(format!("failed to start stream: {e}")))?;

        Ok(Self {
            tap,
            _stream: stream,
        })
    }

    pub fn tap(&self) -> &PlaybackTap {
        &self.tap
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut cursor: PlaybackCursor,
    tap: PlaybackTap,
) -> Result<cpal::Stream>
where
    T: SizedSample + FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut scratch: Vec<f32> = Vec::new();
    let mut mono: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                scratch.resize(data.len(), 0.0);
                mono.clear();
                cursor.fill(&mut scratch, channels, &mut mono);

                for (dst, &src) in data.iter_mut().zip(&scratch) {
                    *dst = T::from_sample(src);
                }
                tap.push(&mono);
            },
            |err| log::error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| VisualizerError::AudioDevice(format!("failed to build stream: {e}")))
}
