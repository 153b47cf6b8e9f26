//! End-to-end pipeline runs against a scripted signal, no audio device or GPU.

use std::cell::Cell;
use std::time::Duration;

use spectraplane::audio::SignalSource;
use spectraplane::params::{ParticleConfig, VisualizerParams};
use spectraplane::visualizer::Visualizer;

const SAMPLE_RATE: usize = 44_100;
const TICK: Duration = Duration::from_millis(16);

/// A pre-rendered signal whose play head is moved by the test
struct Scripted {
    samples: Vec<f32>,
    head: Cell<usize>,
}

impl Scripted {
    fn seek(&self, at: Duration) {
        let index = (at.as_secs_f64() * SAMPLE_RATE as f64) as usize;
        self.head.set(index.min(self.samples.len()));
    }
}

impl SignalSource for Scripted {
    fn read_recent(&self, out: &mut [f32]) {
        let end = self.head.get();
        let start = end.saturating_sub(out.len());
        let pad = out.len() - (end - start);
        out[..pad].fill(0.0);
        out[pad..].copy_from_slice(&self.samples[start..end]);
    }
}

/// Full-scale noise bursts separated by silence
fn bursts(
    count: usize,
    on: Duration,
    off: Duration,
    seed: u64,
) -> (Scripted, Vec<(Duration, Duration)>) {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut samples = Vec::new();
    let mut windows = Vec::new();
    let per = |d: Duration| (d.as_secs_f64() * SAMPLE_RATE as f64) as usize;

    for _ in 0..count {
        samples.extend(std::iter::repeat(0.0).take(per(off)));
        let start = Duration::from_secs_f64(samples.len() as f64 / SAMPLE_RATE as f64);
        samples.extend((0..per(on)).map(|_| rng.f32() * 2.0 - 1.0));
        windows.push((start, start + on));
    }
    samples.extend(std::iter::repeat(0.0).take(per(off)));

    let source = Scripted {
        samples,
        head: Cell::new(0),
    };
    (source, windows)
}

fn small_params() -> VisualizerParams {
    VisualizerParams {
        particles: ParticleConfig {
            count: 256,
            ..ParticleConfig::default()
        },
        ..VisualizerParams::default()
    }
}

#[test]
fn test_noise_bursts_drive_beats() {
    let on = Duration::from_millis(300);
    let off = Duration::from_millis(600);
    let (source, windows) = bursts(4, on, off, 7);
    let end = windows.last().map(|w| w.1 + off).unwrap();

    let mut vis = Visualizer::new(&small_params()).unwrap();
    let count = vis.sink().particles().len();
    let mut beats = Vec::new();
    let mut now = Duration::ZERO;
    let input: &dyn SignalSource = &source;

    while now < end {
        source.seek(now);
        let signals = vis.tick(Some(input), now).unwrap();

        assert!((0.0..=1.0).contains(&signals.beat_envelope));
        for energy in [signals.bands.bass, signals.bands.mid, signals.bands.treble] {
            assert!((0.0..=1.0).contains(&energy));
        }
        if signals.is_beat {
            assert_eq!(signals.beat_envelope, 1.0);
            assert!(vis.sink().glitch().is_enabled());
            beats.push(now);
        }
        now += TICK;
    }

    assert!(beats.len() >= windows.len(), "expected a beat per burst, got {beats:?}");

    // Refractory spacing
    for pair in beats.windows(2) {
        assert!(pair[1] - pair[0] > Duration::from_millis(100));
    }

    // Every beat falls inside a burst (plus the smoothing tail)
    let tail = Duration::from_millis(250);
    for beat in &beats {
        assert!(
            windows.iter().any(|&(start, stop)| *beat >= start && *beat <= stop + tail),
            "beat at {beat:?} outside every burst"
        );
    }

    // Silence at the end lets everything settle
    assert_eq!(vis.beat_envelope(), 0.0);
    assert!(!vis.sink().glitch().is_enabled());

    let particles = vis.sink().particles();
    assert_eq!(particles.len(), count);
    assert!(particles.positions().iter().flatten().all(|v| v.is_finite()));
    assert!(particles.sizes().iter().all(|s| s.is_finite() && *s > 0.0));
}

#[test]
fn test_source_swap_mid_run() {
    let (loud, _) = bursts(1, Duration::from_millis(500), Duration::from_millis(10), 11);
    let silence = vec![0.0f32; 4096];

    let mut vis = Visualizer::new(&small_params()).unwrap();
    let mut now = Duration::ZERO;
    let (loud_input, silent_input): (&dyn SignalSource, &dyn SignalSource) = (&loud, &silence);

    for _ in 0..20 {
        loud.seek(now + Duration::from_millis(100));
        vis.tick(Some(loud_input), now);
        now += TICK;
    }
    assert!(vis.last_beat().is_some());

    // A new source starts from a clean spectrum
    vis.audio_source_changed();
    let signals = vis.tick(Some(silent_input), now).unwrap();
    assert_eq!(signals.bands.bass, 0.0);
    assert!(!signals.is_beat);

    // Removing the source freezes the visuals
    let uniforms = *vis.sink().uniforms();
    assert!(vis.tick(None, now + TICK).is_none());
    assert_eq!(*vis.sink().uniforms(), uniforms);

    assert_eq!(vis.dispose(), 21);
}
