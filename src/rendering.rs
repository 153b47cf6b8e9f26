//! Rendering system with wgpu pipelines for the plane, particles and post pass.
//!
//! The scene (image plane, particle field, watermark) is drawn into an
//! offscreen HDR target; a fullscreen post pass applies bloom and the glitch
//! effect while writing to the window surface.

use bytemuck::{Pod, Zeroable};
use glam::Mat4;
use image::RgbaImage;
use wgpu::util::DeviceExt;

use crate::error::{Result, VisualizerError};
use crate::params::RecordingConfig;
use crate::particles::{ParticleInstance, ParticleSystem};
use crate::surface::{PlaneMesh, Vertex, VisualSurface};

/// Offscreen scene format (headroom above 1.0 for the bloom threshold)
const SCENE_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

/// Uniform buffer for plane shaders (model-view-projection + audio parameters)
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct PlaneUniforms {
    pub view_proj: [[f32; 4]; 4],
    pub time: f32,
    pub bass: f32,
    pub mid: f32,
    pub treble: f32,
    pub beat: f32,
    pub _padding: [f32; 3],
}

/// Uniform buffer for the particle shader (billboards are expanded in view space)
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct ParticleUniforms {
    pub model_view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub opacity: f32,
    pub _padding: [f32; 3],
}

/// Uniform buffer for the post pass (bloom + glitch)
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct PostUniforms {
    pub resolution: [f32; 2],
    pub time: f32,
    pub glitch: f32,
    pub glitch_seed: f32,
    pub bloom_strength: f32,
    pub bloom_radius: f32,
    pub bloom_threshold: f32,
}

struct MeshBuffers {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

impl MeshBuffers {
    fn new(device: &wgpu::Device, mesh: &PlaneMesh, label: &str) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Vertex Buffer")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Index Buffer")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: mesh.indices.len() as u32,
        }
    }
}

struct ImageTexture {
    _texture: wgpu::Texture,
    bind_group: wgpu::BindGroup,
}

/// A textured mesh drawn with the plane pipeline
struct TexturedMesh {
    mesh: MeshBuffers,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    texture: ImageTexture,
}

struct SceneTarget {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

/// Rendering system managing wgpu device, pipelines, and buffers
pub struct RenderSystem {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    plane_pipeline: wgpu::RenderPipeline,
    particle_pipeline: wgpu::RenderPipeline,
    post_pipeline: wgpu::RenderPipeline,
    uniform_layout: wgpu::BindGroupLayout,
    texture_layout: wgpu::BindGroupLayout,
    post_layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    plane: TexturedMesh,
    plane_mesh_version: u64,
    watermark: Option<TexturedMesh>,
    particle_buffer: wgpu::Buffer,
    particle_count: u32,
    particle_uniform_buffer: wgpu::Buffer,
    particle_bind_group: wgpu::BindGroup,
    scene_target: SceneTarget,
    post_uniform_buffer: wgpu::Buffer,
    post_bind_group: wgpu::BindGroup,
    staging: Vec<ParticleInstance>,
    recording_config: Option<RecordingConfig>,
}

impl RenderSystem {
    /// Create new rendering system sized to `window`
    pub async fn new(
        window: std::sync::Arc<winit::window::Window>,
        surface_state: &VisualSurface,
        particles: &ParticleSystem,
        recording_config: Option<RecordingConfig>,
    ) -> Result<Self> {
        let size = window.inner_size();

        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        // Window must have 'static lifetime via Arc
        let surface = instance
            .create_surface(window)
            .map_err(|e| VisualizerError::Render(format!("failed to create surface: {e}")))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or_else(|| VisualizerError::Render("no suitable GPU adapter".to_string()))?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Main Device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| VisualizerError::Render(format!("failed to request device: {e}")))?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| f.is_srgb())
            .copied()
            .or_else(|| surface_caps.formats.first().copied())
            .ok_or_else(|| VisualizerError::Render("surface has no formats".to_string()))?;

        let mut usage = wgpu::TextureUsages::RENDER_ATTACHMENT;

        // Frame capture copies out of the surface texture
        if recording_config.is_some() {
            usage |= wgpu::TextureUsages::COPY_SRC;
        }

        let config = wgpu::SurfaceConfiguration {
            usage,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let plane_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Plane Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("plane.wgsl").into()),
        });
        let particle_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Particle Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("particles.wgsl").into()),
        });
        let post_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Post Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("post.wgsl").into()),
        });

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Uniform Bind Group Layout"),
            entries: &[uniform_entry(0)],
        });

        let texture_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Texture Bind Group Layout"),
            entries: &[texture_entry(0), sampler_entry(1)],
        });

        let post_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Post Bind Group Layout"),
            entries: &[texture_entry(0), sampler_entry(1), uniform_entry(2)],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Linear Clamp Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        // Plane pipeline: double-sided, alpha blended
        let plane_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Plane Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout, &texture_layout],
            push_constant_ranges: &[],
        });

        let plane_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Plane Render Pipeline"),
            layout: Some(&plane_layout),
            vertex: wgpu::VertexState {
                module: &plane_shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &wgpu::vertex_attr_array![
                        0 => Float32x3,
                        1 => Float32x2,
                        2 => Float32x3,
                    ],
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &plane_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: SCENE_FORMAT,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        // Particle pipeline: instanced billboards, additive, no depth test
        let particle_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Particle Pipeline Layout"),
            bind_group_layouts: &[&uniform_layout],
            push_constant_ranges: &[],
        });


        let particle_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Particle Render Pipeline"),
            layout: Some(&particle_layout),
            vertex: wgpu::VertexState {
                module: &particle_shader,
                entry_point: Some("vs_main"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<ParticleInstance>() as wgpu::BufferAddress,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &wgpu::vertex_attr_array![
                        0 => Float32x3,
                        1 => Float32,
                        2 => Float32x3,
                    ],
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &particle_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: SCENE_FORMAT,
                    blend: Some(ADDITIVE_BLEND),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        // Post pipeline: fullscreen triangle into the window surface
        let post_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Post Pipeline Layout"),
            bind_group_layouts: &[&post_layout],
            push_constant_ranges: &[],
        });

        let post_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Post Pipeline"),
            layout: Some(&post_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &post_shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &post_shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        // Plane starts with a transparent texel until an image arrives
        let plane_uniform_buffer =
            create_uniform_buffer::<PlaneUniforms>(&device, "Plane Uniform Buffer");
        let plane = TexturedMesh {
            mesh: MeshBuffers::new(&device, surface_state.mesh(), "Plane"),
            uniform_bind_group: uniform_bind_group(
                &device,
                &uniform_layout,
                &plane_uniform_buffer,
                "Plane",
            ),
            uniform_buffer: plane_uniform_buffer,
            texture: create_image_texture(
                &device,
                &queue,
                &texture_layout,
                &sampler,
                &RgbaImage::new(1, 1),
                "Empty Plane Texture",
            ),
        };

        let particle_count = particles.len() as u32;
        let mut staging = Vec::with_capacity(particles.len());
        particles.write_instances(&mut staging);
        let particle_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Instance Buffer"),
            contents: bytemuck::cast_slice(&staging),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        let particle_uniform_buffer =
            create_uniform_buffer::<ParticleUniforms>(&device, "Particle Uniform Buffer");
        let particle_bind_group =
            uniform_bind_group(&device, &uniform_layout, &particle_uniform_buffer, "Particle");

        let scene_target = create_scene_target(&device, config.width, config.height);
        let post_uniform_buffer =
            create_uniform_buffer::<PostUniforms>(&device, "Post Uniform Buffer");
        let post_bind_group = post_bind_group(
            &device,
            &post_layout,
            &scene_target.view,
            &sampler,
            &post_uniform_buffer,
        );

        Ok(Self {
            surface,
            device,
            queue,
            config,
            plane_pipeline,
            particle_pipeline,
            post_pipeline,
            uniform_layout,
            texture_layout,
            post_layout,
            sampler,
            plane,
            plane_mesh_version: surface_state.mesh_version(),
            watermark: None,
            particle_buffer,
            particle_count,
            particle_uniform_buffer,
            particle_bind_group,
            scene_target,
            post_uniform_buffer,
            post_bind_group,
            staging,
            recording_config,
        })
    }

    /// Current surface size in pixels
    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    /// Reconfigure the surface and offscreen target for a new window size
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);

        self.scene_target = create_scene_target(&self.device, width, height);
        self.post_bind_group = post_bind_group(
            &self.device,
            &self.post_layout,
            &self.scene_target.view,
            &self.sampler,
            &self.post_uniform_buffer,
        );
    }

    /// Pick up geometry rebuilds and new images from the surface state
    ///
    /// The old buffers and texture are dropped only after the replacements
    /// exist, so a frame never sees a half-swapped plane.
    pub fn sync_surface(&mut self, surface_state: &mut VisualSurface) {
        if surface_state.mesh_version() != self.plane_mesh_version {
            self.plane.mesh = MeshBuffers::new(&self.device, surface_state.mesh(), "Plane");
            self.plane_mesh_version = surface_state.mesh_version();
        }

        if let Some(image) = surface_state.take_pending_image() {
            let image = self.fit_to_limits(image);
            self.plane.texture = create_image_texture(
                &self.device,
                &self.queue,
                &self.texture_layout,
                &self.sampler,
                &image,
                "Plane Texture",
            );
        }
    }

    /// Replace the watermark quad and texture
    pub fn set_watermark(&mut self, image: RgbaImage, size: f32) {
        let image = self.fit_to_limits(image);
        let uniform_buffer =
            create_uniform_buffer::<PlaneUniforms>(&self.device, "Watermark Uniform Buffer");
        let uniform_bind_group =
            uniform_bind_group(&self.device, &self.uniform_layout, &uniform_buffer, "Watermark");
        let texture = create_image_texture(
            &self.device,
            &self.queue,
            &self.texture_layout,
            &self.sampler,
            &image,
            "Watermark Texture",
        );

        self.watermark = Some(TexturedMesh {
            mesh: MeshBuffers::new(&self.device, &PlaneMesh::new(size, size, 1), "Watermark"),
            uniform_buffer,
            uniform_bind_group,
            texture,
        });
    }

    pub fn has_watermark(&self) -> bool {
        self.watermark.is_some()
    }

    pub fn update_plane_uniforms(&self, uniforms: &PlaneUniforms) {
        self.queue.write_buffer(
            &self.plane.uniform_buffer,
            0,
            bytemuck::cast_slice(&[*uniforms]),
        );
    }

    pub fn update_watermark_uniforms(&self, uniforms: &PlaneUniforms) {
        if let Some(ref watermark) = self.watermark {
            self.queue.write_buffer(
                &watermark.uniform_buffer,
                0,
                bytemuck::cast_slice(&[*uniforms]),
            );
        }
    }

    /// Re-upload particle attributes if the simulation touched them
    pub fn update_particles(&mut self, particles: &mut ParticleSystem) {
        if !particles.take_dirty() {
            return;
        }
        particles.write_instances(&mut self.staging);
        self.queue
            .write_buffer(&self.particle_buffer, 0, bytemuck::cast_slice(&self.staging));
    }

    pub fn update_particle_uniforms(&self, uniforms: &ParticleUniforms) {
        self.queue.write_buffer(
            &self.particle_uniform_buffer,
            0,
            bytemuck::cast_slice(&[*uniforms]),
        );
    }

    pub fn update_post_uniforms(&self, uniforms: &PostUniforms) {
        self.queue.write_buffer(
            &self.post_uniform_buffer,
            0,
            bytemuck::cast_slice(&[*uniforms]),
        );
    }

    /// Render a frame (and capture it when recording)
    pub fn render(&self, frame_num: usize) -> std::result::Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut scene_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.scene_target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            scene_pass.set_pipeline(&self.plane_pipeline);
            draw_textured(&mut scene_pass, &self.plane);

            scene_pass.set_pipeline(&self.particle_pipeline);
            scene_pass.set_bind_group(0, &self.particle_bind_group, &[]);
            scene_pass.set_vertex_buffer(0, self.particle_buffer.slice(..));
            scene_pass.draw(0..6, 0..self.particle_count);

            if let Some(ref watermark) = self.watermark {
                scene_pass.set_pipeline(&self.plane_pipeline);
                draw_textured(&mut scene_pass, watermark);
            }
        }

        {
            let mut post_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Post Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            post_pass.set_pipeline(&self.post_pipeline);
            post_pass.set_bind_group(0, &self.post_bind_group, &[]);
            post_pass.draw(0..3, 0..1); // Fullscreen triangle
        }

        self.queue.submit(std::iter::once(encoder.finish()));

        if let Some(ref config) = self.recording_config {
            self.capture_frame(frame_num, config, &output);
        }

        output.present();

        Ok(())
    }

    /// Downscale images larger than the device's texture limit
    fn fit_to_limits(&self, image: RgbaImage) -> RgbaImage {
        let max = self.device.limits().max_texture_dimension_2d;
        let (width, height) = image.dimensions();
        if width <= max && height <= max {
            return image;
        }

        let scale = max as f32 / width.max(height) as f32;
        let new_w = ((width as f32 * scale) as u32).clamp(1, max);
        let new_h = ((height as f32 * scale) as u32).clamp(1, max);
        log::warn!(
            "Image {width}x{height} exceeds GPU limit {max}, downscaling to {new_w}x{new_h}"
        );
        image::imageops::resize(&image, new_w, new_h, image::imageops::FilterType::Triangle)
    }

    /// Capture a frame to disk (recording mode only)
    fn capture_frame(
        &self,
        frame_num: usize,
        config: &RecordingConfig,
        texture: &wgpu::SurfaceTexture,
    ) {
        let (width, height) = self.size();
        let padded_row = padded_bytes_per_row(width);

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Frame Capture Buffer"),
            size: (padded_row * height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Frame Capture Encoder"),
            });

        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );

        self.queue.submit(std::iter::once(encoder.finish()));

        let buffer_slice = buffer.slice(..);
        buffer_slice.map_async(wgpu::MapMode::Read, |_| {});
        self.device.poll(wgpu::Maintain::Wait);

        let bgra = matches!(
            self.config.format,
            wgpu::TextureFormat::Bgra8Unorm | wgpu::TextureFormat::Bgra8UnormSrgb
        );
        let image_data = {
            let data = buffer_slice.get_mapped_range();
            frame_to_rgba(&data, width, height, padded_row, bgra)
        };
        buffer.unmap();

        let frame_path = format!("{}/frame_{:05}.png", config.frames_dir(), frame_num);
        if let Err(e) = image::save_buffer(
            &frame_path,
            &image_data,
            width,
            height,
            image::ColorType::Rgba8,
        ) {
            log::error!("Failed to save frame {}: {}", frame_num, e);
        }
    }
}

/// Plane uniforms for `model` seen through `view_proj`
pub fn plane_uniforms(
    view_proj: Mat4,
    model: Mat4,
    shader: &crate::visualizer::ShaderUniforms,
) -> PlaneUniforms {
    PlaneUniforms {
        view_proj: (view_proj * model).to_cols_array_2d(),
        time: shader.time,
        bass: shader.bass,
        mid: shader.mid,
        treble: shader.treble,
        beat: shader.beat,
        _padding: [0.0; 3],
    }
}

fn draw_textured<'a>(pass: &mut wgpu::RenderPass<'a>, object: &'a TexturedMesh) {
    pass.set_bind_group(0, &object.uniform_bind_group, &[]);
    pass.set_bind_group(1, &object.texture.bind_group, &[]);
    pass.set_vertex_buffer(0, object.mesh.vertex_buffer.slice(..));
    pass.set_index_buffer(object.mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
    pass.draw_indexed(0..object.mesh.index_count, 0, 0..1);
}

fn uniform_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

fn create_uniform_buffer<T: Pod + Zeroable>(device: &wgpu::Device, label: &str) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some(label),
        contents: bytemuck::cast_slice(&[T::zeroed()]),
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
    })
}

fn uniform_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    buffer: &wgpu::Buffer,
    label: &str,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(&format!("{label} Uniform Bind Group")),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: buffer.as_entire_binding(),
        }],
    })
}

fn create_image_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    layout: &wgpu::BindGroupLayout,
    sampler: &wgpu::Sampler,
    image: &RgbaImage,
    label: &str,
) -> ImageTexture {
    let (width, height) = image.dimensions();
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };

    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });

    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        image.as_raw(),
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );

    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(&view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    });

    ImageTexture {
        _texture: texture,
        bind_group,
    }
}

fn create_scene_target(device: &wgpu::Device, width: u32, height: u32) -> SceneTarget {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Scene Target"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: SCENE_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    SceneTarget {
        _texture: texture,
        view,
    }
}

fn post_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    scene: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
    uniforms: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Post Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(scene),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: uniforms.as_entire_binding(),
            },
        ],
    })
}

/// Particles add colour and coverage
const ADDITIVE_BLEND: wgpu::BlendState = wgpu::BlendState {
    color: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::SrcAlpha,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
    alpha: wgpu::BlendComponent {
        src_factor: wgpu::BlendFactor::One,
        dst_factor: wgpu::BlendFactor::One,
        operation: wgpu::BlendOperation::Add,
    },
};

/// Row pitch of a texture-to-buffer copy of a 4-byte-per-pixel surface
fn padded_bytes_per_row(width: u32) -> u32 {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    (width * 4).div_ceil(align) * align
}

/// Packed RGBA8 from a row-padded surface copy, flattened onto black
///
/// The surface holds premultiplied colour, so dropping coverage leaves the
/// frame as it looks over a black background.
fn frame_to_rgba(data: &[u8], width: u32, height: u32, padded_row: u32, bgra: bool) -> Vec<u8> {
    let row = width as usize * 4;
    let mut pixels = Vec::with_capacity(row * height as usize);
    for padded in data.chunks(padded_row as usize).take(height as usize) {
        pixels.extend_from_slice(&padded[..row]);
    }
    for pixel in pixels.chunks_exact_mut(4) {
        if bgra {
            pixel.swap(0, 2);
        }
        pixel[3] = u8::MAX;
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::visualizer::ShaderUniforms;

    #[test]
    fn test_uniform_layouts_match_wgsl() {
        // WGSL rounds uniform structs up to 16-byte multiples
        assert_eq!(std::mem::size_of::<PlaneUniforms>(), 96);
        assert_eq!(std::mem::size_of::<ParticleUniforms>(), 144);
        assert_eq!(std::mem::size_of::<PostUniforms>(), 32);
        assert_eq!(std::mem::size_of::<Vertex>(), 32);
    }

    #[test]
    fn test_plane_uniforms_carry_audio() {
        let shader = ShaderUniforms {
            time: 1.5,
            bass: 0.25,
            mid: 0.5,
            treble: 0.75,
            beat: 1.0,
        };
        let uniforms = plane_uniforms(Mat4::IDENTITY, Mat4::IDENTITY, &shader);

        assert_eq!(uniforms.view_proj, Mat4::IDENTITY.to_cols_array_2d());
        assert_eq!(
            [uniforms.time, uniforms.bass, uniforms.mid, uniforms.treble, uniforms.beat],
            [1.5, 0.25, 0.5, 0.75, 1.0]
        );
    }

    #[test]
    fn test_capture_row_pitch() {
        assert_eq!(padded_bytes_per_row(1), 256);
        assert_eq!(padded_bytes_per_row(64), 256);
        assert_eq!(padded_bytes_per_row(65), 512);
    }

    #[test]
    fn test_frame_to_rgba_strips_padding() {
        // 2x2 BGRA frame, rows padded to 12 bytes with junk
        #[rustfmt::skip]
        let data = [
            1, 2, 3, 0,     4, 5, 6, 128,     9, 9, 9, 9,
            7, 8, 9, 255,   10, 11, 12, 64,   9, 9, 9, 9,
        ];

        let rgba = frame_to_rgba(&data, 2, 2, 12, true);
        assert_eq!(rgba, [3, 2, 1, 255, 6, 5, 4, 255, 9, 8, 7, 255, 12, 11, 10, 255]);

        let kept = frame_to_rgba(&data, 2, 2, 12, false);
        assert_eq!(&kept[..4], &[1, 2, 3, 255]);
        assert_eq!(kept.len(), 16);
    }

    #[test]
    fn test_particles_accumulate_coverage() {
        // Coverage feeds the post pass alpha
        assert_eq!(ADDITIVE_BLEND.alpha.src_factor, wgpu::BlendFactor::One);
        assert_eq!(ADDITIVE_BLEND.color.dst_factor, wgpu::BlendFactor::One);
    }
}
