//! Rendering and recording configuration.

/// Rendering configuration
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Window width (pixels)
    pub window_width: u32,

    /// Window height (pixels)
    pub window_height: u32,

    /// Vertical field of view (degrees)
    pub fov_degrees: f32,

    /// Near clipping plane
    pub near_plane: f32,

    /// Far clipping plane
    pub far_plane: f32,

    /// Camera distance from the plane along +Z
    pub camera_distance: f32,

    /// Scene time per wall-clock second (0.6 = 0.01 per frame at 60 Hz)
    pub time_scale: f32,

    /// Particle opacity (additive blend)
    pub particle_opacity: f32,

    /// Bloom strength, radius and luminance threshold
    pub bloom_strength: f32,
    pub bloom_radius: f32,
    pub bloom_threshold: f32,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            window_width: 1200,
            window_height: 800,
            fov_degrees: 75.0,
            near_plane: 0.1,
            far_plane: 1000.0,
            camera_distance: 5.0,
            time_scale: 0.6,
            particle_opacity: 0.8,
            bloom_strength: 1.5,
            bloom_radius: 0.4,
            bloom_threshold: 0.85,
        }
    }
}

impl RenderConfig {
    pub fn aspect_ratio(&self) -> f32 {
        self.window_width as f32 / self.window_height.max(1) as f32
    }
}

/// Recording mode configuration
#[derive(Debug, Clone)]
pub struct RecordingConfig {
    /// Duration to record (seconds)
    pub duration_secs: f32,

    /// Output directory for frames and audio
    pub output_dir: String,

    /// Frame rate (FPS)
    pub fps: u32,

    /// Recorded WAV channel count
    pub audio_channels: u16,

    /// Recorded WAV sample rate (Hz)
    pub audio_sample_rate: u32,
}

impl RecordingConfig {
    pub fn new(duration_secs: f32) -> Self {
        Self {
            duration_secs,
            output_dir: "recording".to_string(),
            fps: 60,
            audio_channels: 2,
            audio_sample_rate: 48_000,
        }
    }

    /// Total number of frames to capture
    pub fn total_frames(&self) -> usize {
        (self.duration_secs * self.fps as f32).ceil() as usize
    }

    /// Clock reading for a captured frame; audio advances on the same clock
    pub fn frame_time(&self, frame_num: usize) -> std::time::Duration {
        std::time::Duration::from_secs_f64(frame_num as f64 / self.fps as f64)
    }

    pub fn frames_dir(&self) -> String {
        format!("{}/frames", self.output_dir)
    }

    pub fn audio_path(&self) -> String {
        format!("{}/audio.wav", self.output_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_frame_count() {
        let config = RecordingConfig::new(2.5);
        assert_eq!(config.total_frames(), 150);
        assert_eq!(config.frame_time(30).as_millis(), 500);
        // Whole number of audio frames per video frame
        assert_eq!(config.audio_sample_rate % config.fps, 0);
    }
}
