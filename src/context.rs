//! The GPU context.
//!
//! [`Context`] owns the device and queue, the forward pipelines, the per-draw
//! uniform buffer and, for interactive use, the window surface. It is the
//! wgpu [`Backend`] that scene resources are built with, and it executes a
//! [`Frame`] against any colour target.

use std::{collections::HashSet, iter, sync::Arc};

use anyhow::Context as _;
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::{
    data_structures::texture::Texture,
    pipelines::forward::{
        self, DEFAULT_SLOT_STRIDE, DrawUniformsRaw, PipelineCache, PipelineKey,
    },
    render::{DrawKind, Frame, ShaderProgram},
    resources::gpu::{Backend, BindingHandle, GpuResources, TextureUpload},
};

/// Format of offscreen colour targets.
pub const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

#[derive(Debug)]
pub struct Presentation {
    pub window: Arc<Window>,
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
}

#[derive(Debug)]
pub struct Context {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub color_format: wgpu::TextureFormat,
    pub clear_colour: wgpu::Color,
    pub(crate) depth_texture: Texture,
    size: (u32, u32),
    texture_layout: wgpu::BindGroupLayout,
    uniform_layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    uniform_capacity: usize,
    uniform_stride: u64,
    pipelines: PipelineCache,
    /// Zeroes for attribute slots a primitive does not provide.
    default_attributes: wgpu::Buffer,
    unsupported: HashSet<BindingHandle>,
    presentation: Option<Presentation>,
}

async fn request_device(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'_>>,
) -> anyhow::Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue)> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: surface,
            force_fallback_adapter: false,
        })
        .await
        .context("failed to find a suitable GPU adapter")?;
    log::info!("Using adapter {}", adapter.get_info().name);

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("gltf-viewer device"),
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            experimental_features: wgpu::ExperimentalFeatures::disabled(),
            memory_hints: Default::default(),
            trace: wgpu::Trace::Off,
        })
        .await
        .context("failed to create wgpu device/queue")?;
    Ok((adapter, device, queue))
}

fn new_instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    })
}

impl Context {
    /// A context presenting to `window`.
    pub async fn windowed(window: Arc<Window>, program: &ShaderProgram) -> anyhow::Result<Self> {
        let size = window.inner_size();
        let instance = new_instance();
        let surface = instance
            .create_surface(window.clone())
            .context("failed to create wgpu surface")?;
        let (adapter, device, queue) = request_device(&instance, Some(&surface)).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        // Shaders write linear colour, so prefer an sRGB surface.
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("no supported surface formats")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let mut ctx = Self::from_device(
            device,
            queue,
            surface_format,
            (config.width, config.height),
            program,
        );
        ctx.presentation = Some(Presentation {
            window,
            surface,
            config,
        });
        Ok(ctx)
    }

    /// A context without a window, rendering into [`OFFSCREEN_FORMAT`] targets.
    pub async fn headless(width: u32, height: u32, program: &ShaderProgram) -> anyhow::Result<Self> {
        let instance = new_instance();
        let (_, device, queue) = request_device(&instance, None).await?;
        Ok(Self::from_device(
            device,
            queue,
            OFFSCREEN_FORMAT,
            (width.max(1), height.max(1)),
            program,
        ))
    }

    fn from_device(
        device: wgpu::Device,
        queue: wgpu::Queue,
        color_format: wgpu::TextureFormat,
        size: (u32, u32),
        program: &ShaderProgram,
    ) -> Self {
        let uniform_layout = forward::mk_uniform_layout(&device);
        let texture_layout = forward::mk_texture_layout(&device);
        let pipelines = PipelineCache::new(
            &device,
            program,
            color_format,
            &uniform_layout,
            &texture_layout,
        );

        let alignment = device.limits().min_uniform_buffer_offset_alignment as u64;
        let uniform_stride =
            (std::mem::size_of::<DrawUniformsRaw>() as u64).div_ceil(alignment) * alignment;
        let uniform_capacity = 64;
        let (uniform_buffer, uniform_bind_group) =
            mk_uniform_buffer(&device, &uniform_layout, uniform_stride, uniform_capacity);

        let default_attributes = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Default Attributes"),
            contents: &[0; DEFAULT_SLOT_STRIDE as usize],
            usage: wgpu::BufferUsages::VERTEX,
        });

        let depth_texture = Texture::create_depth_texture(&device, [size.0, size.1], "depth_texture");

        Self {
            device,
            queue,
            color_format,
            clear_colour: wgpu::Color::BLACK,
            depth_texture,
            size,
            texture_layout,
            uniform_layout,
            uniform_buffer,
            uniform_bind_group,
            uniform_capacity,
            uniform_stride,
            pipelines,
            default_attributes,
            unsupported: HashSet::new(),
            presentation: None,
        }
    }

    pub fn size(&self) -> (u32, u32) {
        self.size
    }

    pub fn window(&self) -> Option<&Arc<Window>> {
        self.presentation.as_ref().map(|p| &p.window)
    }

    /// Reconfigure the surface and depth buffer. Zero sizes (minimized windows) are ignored.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.size = (width, height);
        if let Some(presentation) = &mut self.presentation {
            presentation.config.width = width;
            presentation.config.height = height;
            presentation
                .surface
                .configure(&self.device, &presentation.config);
        }
        self.depth_texture = Texture::create_depth_texture(&self.device, [width, height], "depth_texture");
    }

    fn ensure_uniform_capacity(&mut self, draws: usize) {
        if draws <= self.uniform_capacity {
            return;
        }
        self.uniform_capacity = draws.next_power_of_two();
        let (buffer, bind_group) = mk_uniform_buffer(
            &self.device,
            &self.uniform_layout,
            self.uniform_stride,
            self.uniform_capacity,
        );
        self.uniform_buffer = buffer;
        self.uniform_bind_group = bind_group;
    }

    /// Draw `frame` into `target`, clearing colour and depth first.
    ///
    /// Every draw rebinds its pipeline, uniforms, texture and vertex buffers.
    /// Primitives the pipelines cannot express are skipped with one warning each.
    pub fn render(
        &mut self,
        frame: &Frame,
        resources: &GpuResources<Context>,
        target: &wgpu::TextureView,
    ) {
        let mut drawable = Vec::with_capacity(frame.draws.len());
        for draw in &frame.draws {
            let binding = resources.binding(draw.binding);
            match PipelineKey::for_binding(binding) {
                Ok(key) => {
                    self.pipelines.prepare(&self.device, key);
                    drawable.push((draw, key));
                }
                Err(reason) => {
                    if self.unsupported.insert(draw.binding) {
                        log::warn!(
                            "Skipping mesh {} primitive {}: unsupported {}",
                            draw.mesh,
                            draw.primitive,
                            reason
                        );
                    }
                }
            }
        }

        self.ensure_uniform_capacity(drawable.len());
        let stride = self.uniform_stride as usize;
        let mut uniforms = vec![0u8; stride * drawable.len()];
        for (i, (draw, _)) in drawable.iter().enumerate() {
            let raw = DrawUniformsRaw::from(&draw.uniforms);
            let bytes = bytemuck::bytes_of(&raw);
            uniforms[i * stride..i * stride + bytes.len()].copy_from_slice(bytes);
        }
        if !uniforms.is_empty() {
            self.queue.write_buffer(&self.uniform_buffer, 0, &uniforms);
        }

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });
        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_colour),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
                multiview_mask: None,
            });

            for (i, (draw, key)) in drawable.iter().enumerate() {
                let Some(pipeline) = self.pipelines.get(key) else {
                    continue;
                };
                let Some(texture_group) = &resources.texture(draw.texture).bind_group else {
                    continue;
                };
                let binding = resources.binding(draw.binding);

                render_pass.set_pipeline(pipeline);
                render_pass.set_bind_group(0, &self.uniform_bind_group, &[(i * stride) as u32]);
                render_pass.set_bind_group(1, texture_group, &[]);
                for (slot, attribute) in binding.attributes.iter().enumerate() {
                    match attribute {
                        Some(attribute) => render_pass.set_vertex_buffer(
                            slot as u32,
                            resources.buffer(attribute.buffer).slice(attribute.offset..),
                        ),
                        None => render_pass
                            .set_vertex_buffer(slot as u32, self.default_attributes.slice(..)),
                    }
                }
                match (draw.kind, binding.index) {
                    (DrawKind::Indexed { count, index_type }, Some(index)) => {
                        render_pass.set_index_buffer(
                            resources.buffer(index.buffer).slice(index.offset..),
                            forward::index_format(index_type),
                        );
                        render_pass.draw_indexed(0..count, 0, 0..1);
                    }
                    (DrawKind::Arrays { count }, _) => render_pass.draw(0..count, 0..1),
                    (DrawKind::Indexed { .. }, None) => {}
                }
            }
        }
        self.queue.submit(iter::once(encoder.finish()));
    }

    /// Render `frame` to the window surface and present it.
    pub fn present(
        &mut self,
        frame: &Frame,
        resources: &GpuResources<Context>,
    ) -> Result<(), wgpu::SurfaceError> {
        let Some(presentation) = &self.presentation else {
            return Ok(());
        };
        let output = presentation.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.render(frame, resources, &view);
        if let Some(presentation) = &self.presentation {
            presentation.window.pre_present_notify();
        }
        output.present();
        Ok(())
    }
}

fn mk_uniform_buffer(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    stride: u64,
    capacity: usize,
) -> (wgpu::Buffer, wgpu::BindGroup) {
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Draw Uniform Buffer"),
        size: stride * capacity as u64,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buffer,
                offset: 0,
                size: wgpu::BufferSize::new(std::mem::size_of::<DrawUniformsRaw>() as u64),
            }),
        }],
        label: Some("draw_uniforms_bind_group"),
    });
    (buffer, bind_group)
}

impl Backend for Context {
    type Buffer = wgpu::Buffer;
    type Texture = Texture;

    fn create_buffer(&mut self, label: &str, contents: &[u8]) -> wgpu::Buffer {
        self.device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::INDEX,
            })
    }

    fn create_texture(&mut self, label: &str, upload: &TextureUpload<'_>) -> Texture {
        Texture::from_upload(&self.device, &self.queue, &self.texture_layout, label, upload)
    }
}
