//! Spectraplane - audio-reactive image plane and particle field
//!
//! An image floats in front of the camera and ripples with the music while a
//! shell of particles spins, swells and shifts color around it. Drop audio
//! or image files onto the window to swap them live.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::{
    application::ApplicationHandler,
    event::*,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowId},
};

use glam::Mat4;
use spectraplane::audio::{AudioPlayer, DecodedAudio, SignalSource, SteppedPlayback, WavRecorder};
use spectraplane::camera::Camera;
use spectraplane::cli::Args;
use spectraplane::error::Result;
use spectraplane::loader::{AssetKind, AssetLoader};
use spectraplane::params::{RecordingConfig, VisualizerParams};
use spectraplane::rendering::{plane_uniforms, ParticleUniforms, PostUniforms, RenderSystem};
use spectraplane::surface::watermark_position;
use spectraplane::visualizer::{HostAsset, ShaderUniforms, Visualizer};

/// Main application state
struct App {
    // Window and rendering
    window: Option<Arc<Window>>,
    render_system: Option<RenderSystem>,
    fullscreen: bool,

    // Pipeline
    params: VisualizerParams,
    visualizer: Visualizer,
    camera: Camera,
    loader: AssetLoader,
    audio: Option<AudioPlayer>,

    // Recording mode: audio is rendered on the frame clock, not played
    recording_config: Option<RecordingConfig>,
    stepped: Option<SteppedPlayback>,
    frame_count: usize,

    // Time tracking
    start_time: Instant,
}

impl App {
    fn new(args: &Args) -> Result<Self> {
        let params = args.visualizer_params();
        let visualizer = Visualizer::new(&params)?;
        let camera = Camera::new(&params.render);

        let recording_config = args.create_recording_config()?;
        let stepped = match recording_config {
            Some(ref config) => {
                log::info!(
                    "Recording {:.1}s ({} frames) to {}/",
                    config.duration_secs,
                    config.total_frames(),
                    config.output_dir
                );
                let recorder = WavRecorder::create(
                    &config.audio_path(),
                    config.audio_channels,
                    config.audio_sample_rate,
                )?;
                Some(SteppedPlayback::new(recorder, config.fps, params.analyser.fft_size))
            }
            None => None,
        };

        let mut loader = AssetLoader::new();
        let startup = [
            (AssetKind::Audio, &args.audio),
            (AssetKind::Image, &args.image),
            (AssetKind::Watermark, &args.watermark),
        ];
        for (kind, path) in startup {
            if let Some(path) = path {
                loader.request(kind, path.clone());
            }
        }

        Ok(Self {
            window: None,
            render_system: None,
            fullscreen: args.fullscreen,
            params,
            visualizer,
            camera,
            loader,
            audio: None,
            recording_config,
            stepped,
            frame_count: 0,
            start_time: Instant::now(),
        })
    }
}

impl ApplicationHandler for App {
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return; // Already initialized
        }

        let mut window_attributes = Window::default_attributes()
            .with_title("Spectraplane")
            .with_inner_size(winit::dpi::LogicalSize::new(
                self.params.render.window_width,
                self.params.render.window_height,
            ));
        if self.fullscreen {
            window_attributes =
                window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };

        let render_system = match pollster::block_on(RenderSystem::new(
            Arc::clone(&window),
            self.visualizer.surface(),
            self.visualizer.sink().particles(),
            self.recording_config.clone(),
        )) {
            Ok(render_system) => render_system,
            Err(e) => {
                log::error!("Failed to initialize renderer: {}", e);
                event_loop.exit();
                return;
            }
        };

        let (width, height) = render_system.size();
        self.camera.set_viewport(width, height);

        log::info!("Spectraplane is running");
        log::info!("Drop audio or image files onto the window, F11 toggles fullscreen, ESC quits");

        self.window = Some(window);
        self.render_system = Some(render_system);
        self.start_time = Instant::now();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => self.shutdown(event_loop),
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        state: ElementState::Pressed,
                        physical_key: PhysicalKey::Code(code),
                        repeat: false,
                        ..
                    },
                ..
            } => match code {
                KeyCode::Escape => self.shutdown(event_loop),
                KeyCode::F11 => self.toggle_fullscreen(),
                _ => {}
            },
            WindowEvent::Resized(size) => {
                if let Some(ref mut render_system) = self.render_system {
                    render_system.resize(size.width, size.height);
                }
                self.camera.set_viewport(size.width, size.height);
            }
            WindowEvent::DroppedFile(path) => self.load_dropped(path),
            WindowEvent::RedrawRequested => {
                self.render_frame(event_loop);
            }
            _ => {}
        }
    }
}

impl App {
    fn toggle_fullscreen(&mut self) {
        let Some(ref window) = self.window else {
            return;
        };
        self.fullscreen = window.fullscreen().is_none();
        window.set_fullscreen(self.fullscreen.then_some(Fullscreen::Borderless(None)));
    }

    fn load_dropped(&mut self, path: PathBuf) {
        match AssetKind::from_path(&path) {
            Some(kind) => {
                self.loader.request(kind, path);
            }
            None => log::warn!("Ignoring dropped file {} (unknown type)", path.display()),
        }
    }

    /// Swap in finished loads; failures leave the current asset in place
    fn apply_completions(&mut self) {
        for completion in self.loader.poll() {
            match self.visualizer.apply_completion(completion) {
                Some(HostAsset::Audio { path, audio }) => self.install_audio(path, audio),
                Some(HostAsset::Watermark(image)) => {
                    if let Some(ref mut render_system) = self.render_system {
                        render_system.set_watermark(image, self.params.surface.watermark_size);
                    }
                }
                None => {}
            }
        }
    }

    fn install_audio(&mut self, path: PathBuf, audio: DecodedAudio) {
        if let Some(ref mut stepped) = self.stepped {
            stepped.set_audio(audio);
            self.visualizer.audio_source_changed();
            log::info!("Recording from {}", path.display());
            return;
        }

        match AudioPlayer::start(audio, self.params.analyser.fft_size) {
            Ok(player) => {
                // Old stream stops when its player is dropped
                self.audio = Some(player);
                self.visualizer.audio_source_changed();
                log::info!("Playing {}", path.display());
            }
            Err(e) => log::warn!("Failed to play {}: {}", path.display(), e),
        }
    }

    /// Clock reading for this frame (the frame clock when recording)
    fn now(&self) -> Duration {
        match self.recording_config {
            Some(ref config) => config.frame_time(self.frame_count),
            None => self.start_time.elapsed(),
        }
    }

    /// Render a single frame
    fn render_frame(&mut self, event_loop: &ActiveEventLoop) {
        if self.render_system.is_none() {
            return;
        }

        self.apply_completions();

        let now = self.now();
        let source = match self.stepped {
            Some(ref mut stepped) => {
                stepped.advance_to(self.frame_count);
                if stepped.has_audio() {
                    Some(stepped.tap() as &dyn SignalSource)
                } else {
                    None
                }
            }
            None => self.audio.as_ref().map(|a| a.tap() as &dyn SignalSource),
        };
        self.visualizer.tick(source, now);

        let Some(ref mut render_system) = self.render_system else {
            return;
        };

        render_system.sync_surface(self.visualizer.surface_mut());
        render_system.update_particles(self.visualizer.sink_mut().particles_mut());

        let view_proj = self.camera.view_proj();
        let sink = self.visualizer.sink();
        let shader = *sink.uniforms();

        render_system.update_plane_uniforms(&plane_uniforms(view_proj, Mat4::IDENTITY, &shader));

        if render_system.has_watermark() {
            let size = self.params.surface.watermark_size;
            let position = watermark_position(
                self.camera.fov_degrees(),
                self.camera.distance(),
                self.camera.aspect(),
                size,
            );
            // Same pipeline as the plane, with no audio input
            let still = ShaderUniforms {
                time: shader.time,
                ..ShaderUniforms::default()
            };
            render_system.update_watermark_uniforms(&plane_uniforms(
                view_proj,
                Mat4::from_translation(position),
                &still,
            ));
        }

        render_system.update_particle_uniforms(&ParticleUniforms {
            model_view: (self.camera.view() * sink.particles().model_matrix()).to_cols_array_2d(),
            proj: self.camera.projection().to_cols_array_2d(),
            opacity: self.params.render.particle_opacity,
            _padding: [0.0; 3],
        });

        let (width, height) = render_system.size();
        render_system.update_post_uniforms(&PostUniforms {
            resolution: [width as f32, height as f32],
            time: shader.time,
            glitch: if sink.glitch().is_enabled() { 1.0 } else { 0.0 },
            glitch_seed: sink.glitch().trigger_count() as f32,
            bloom_strength: self.params.render.bloom_strength,
            bloom_radius: self.params.render.bloom_radius,
            bloom_threshold: self.params.render.bloom_threshold,
        });

        match render_system.render(self.frame_count) {
            Ok(()) => {}
            // Surface went stale (resize, display change): reconfigure and retry next frame
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                render_system.resize(width, height);
            }
            Err(e) => log::error!("Render error: {:?}", e),
        }

        self.frame_count += 1;

        let Some((total, fps)) = self
            .recording_config
            .as_ref()
            .map(|c| (c.total_frames(), c.fps.max(1) as usize))
        else {
            return;
        };
        if self.frame_count % fps == 0 {
            log::info!("Recorded {}/{} frames", self.frame_count, total);
        }
        if self.frame_count >= total {
            self.shutdown(event_loop);
        }
    }

    fn shutdown(&mut self, event_loop: &ActiveEventLoop) {
        self.audio = None;
        if let Some(mut stepped) = self.stepped.take() {
            // Audio through the end of the last captured frame
            stepped.advance_to(self.frame_count);
            let audio_frames = stepped.written_frames();
            match stepped.finish() {
                Ok(()) => log::info!(
                    "Recording finished ({} frames, {} audio frames)",
                    self.frame_count,
                    audio_frames
                ),
                Err(e) => log::error!("Failed to finalize recorded audio: {}", e),
            }
        }
        event_loop.exit();
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    log::info!("Spectraplane - audio-reactive image plane and particle field");

    let mut app = match App::new(&args) {
        Ok(app) => app,
        Err(e) => {
            log::error!("{}", e);
            std::process::exit(1);
        }
    };

    let event_loop = match EventLoop::new() {
        Ok(event_loop) => event_loop,
        Err(e) => {
            log::error!("Failed to create event loop: {}", e);
            std::process::exit(1);
        }
    };
    if let Err(e) = event_loop.run_app(&mut app) {
        log::error!("Event loop error: {}", e);
    }

    let ticks = app.visualizer.dispose();
    log::debug!("Exited after {} pipeline ticks", ticks);
}
