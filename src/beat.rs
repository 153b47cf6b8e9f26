//! Beat detection and the decaying beat envelope.
//!
//! The detector is a threshold with a refractory window, not an onset
//! detector: a kick keeps the bass band high for several ticks and the window
//! keeps that from firing more than once.

use std::time::Duration;

use crate::params::BeatConfig;

/// Bass threshold with a minimum spacing between events
#[derive(Debug, Clone)]
pub struct BeatDetector {
    threshold: f32,
    refractory: Duration,
    last_beat: Option<Duration>,
}

impl BeatDetector {
    pub fn new(config: &BeatConfig) -> Self {
        Self {
            threshold: config.threshold,
            refractory: config.refractory(),
            last_beat: None,
        }
    }

    /// Returns true when `bass` crosses the threshold outside the refractory window
    ///
    /// `now` is a monotonic clock reading; a reading earlier than the last beat
    /// never fires.
    pub fn detect(&mut self, bass: f32, now: Duration) -> bool {
        if bass <= self.threshold {
            return false;
        }

        let clear = match self.last_beat {
            None => true,
            Some(last) => now.saturating_sub(last) > self.refractory,
        };
        if clear {
            self.last_beat = Some(now);
        }
        clear
    }

    /// Clock reading of the most recent beat
    pub fn last_beat(&self) -> Option<Duration> {
        self.last_beat
    }
}

/// Pulse that jumps to 1.0 on a beat and falls linearly to 0
#[derive(Debug, Clone)]
pub struct BeatEnvelope {
    value: f32,
    decay_step: f32,
}

impl BeatEnvelope {
    pub fn new(config: &BeatConfig) -> Self {
        Self {
            value: 0.0,
            decay_step: config.decay_step,
        }
    }

    /// Advance one tick
    pub fn update(&mut self, is_beat: bool) -> f32 {
        self.value = next_envelope(is_beat, self.value, self.decay_step);
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

/// `1.0` on a beat, otherwise `previous - decay_step` floored at 0
pub fn next_envelope(is_beat: bool, previous: f32, decay_step: f32) -> f32 {
    if is_beat {
        1.0
    } else {
        (previous - decay_step).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn test_refractory_window() {
        let mut detector = BeatDetector::new(&BeatConfig::default());

        assert!(detector.detect(0.9, ms(0)));
        assert_eq!(detector.last_beat(), Some(ms(0)));

        assert!(!detector.detect(0.9, ms(50)));
        assert_eq!(detector.last_beat(), Some(ms(0)));

        assert!(detector.detect(0.9, ms(150)));
        assert_eq!(detector.last_beat(), Some(ms(150)));
    }

    #[test]
    fn test_window_is_exclusive() {
        let mut detector = BeatDetector::new(&BeatConfig::default());

        assert!(detector.detect(0.8, ms(1000)));
        assert!(!detector.detect(0.8, ms(1100)));
        assert!(detector.detect(0.8, ms(1101)));
    }

    #[test]
    fn test_below_threshold_never_fires() {
        let mut detector = BeatDetector::new(&BeatConfig::default());

        assert!(!detector.detect(0.7, ms(0)));
        assert!(!detector.detect(0.2, ms(500)));
        assert_eq!(detector.last_beat(), None);
    }

    #[test]
    fn test_no_two_beats_inside_window() {
        let config = BeatConfig::default();
        let mut detector = BeatDetector::new(&config);
        let mut rng = fastrand::Rng::with_seed(42);
        let mut now = Duration::ZERO;
        let mut beats = Vec::new();

        for _ in 0..5000 {
            now += ms(rng.u64(1..40));
            if detector.detect(rng.f32(), now) {
                beats.push(now);
            }
        }

        assert!(!beats.is_empty());
        for pair in beats.windows(2) {
            assert!(pair[1] - pair[0] > config.refractory());
        }
    }

    #[test]
    fn test_envelope_decays_to_zero_and_holds() {
        let mut envelope = BeatEnvelope::new(&BeatConfig::default());
        assert_eq!(envelope.update(true), 1.0);

        for step in 1..=10 {
            let expected = 1.0 - step as f32 * 0.1;
            let value = envelope.update(false);
            assert!((value - expected).abs() < 1e-5, "tick {step}: {value}");
        }
        for _ in 0..5 {
            assert!(envelope.update(false).abs() < 1e-5);
        }
        assert!(envelope.value() >= 0.0);
    }

    #[test]
    fn test_envelope_retrigger_resets() {
        let mut envelope = BeatEnvelope::new(&BeatConfig::default());
        envelope.update(true);
        envelope.update(false);
        envelope.update(false);
        assert_eq!(envelope.update(true), 1.0);
    }

    #[test]
    fn test_envelope_bounded() {
        let mut rng = fastrand::Rng::with_seed(3);
        let mut value = 0.0;
        for _ in 0..10_000 {
            let beat = rng.u8(..) < 20;
            let next = next_envelope(beat, value, 0.1);
            assert!((0.0..=1.0).contains(&next));
            if !beat {
                assert!(next <= value);
            }
            value = next;
        }
    }
}
