//! One-shot offscreen rendering.
//!
//! Renders a single frame without a window, copies the colour target back to
//! the CPU and writes it as an 8-bit RGB PNG.

use std::path::Path;

use anyhow::Context as _;
use log::info;

use crate::{
    camera::SceneFraming,
    config::ViewerConfig,
    context::Context,
    data_structures::{scene_graph::compute_scene_bounds, texture::Texture},
    render::build_frame,
    resources::{gpu::GpuResources, load_document},
};

const BYTES_PER_PIXEL: u32 = 4;

/// Where the first row of a pixel buffer sits on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramebufferOrigin {
    TopLeft,
    BottomLeft,
}

/// Row pitch of a texture-to-buffer copy, padded to wgpu's alignment.
pub fn padded_bytes_per_row(width: u32) -> u32 {
    let unpadded = width * BYTES_PER_PIXEL;
    unpadded.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT
}

/// Reverse the order of `height` rows of `row_bytes` each, in place.
pub fn flip_rows(pixels: &mut [u8], row_bytes: usize, height: usize) {
    for top in 0..height / 2 {
        let bottom = height - 1 - top;
        let (upper, lower) = pixels.split_at_mut(bottom * row_bytes);
        upper[top * row_bytes..(top + 1) * row_bytes].swap_with_slice(&mut lower[..row_bytes]);
    }
}

/// Mapped RGBA8 texels as copied out of a texture.
#[derive(Debug, Clone)]
pub struct Readback {
    pub width: u32,
    pub height: u32,
    pub padded_bytes_per_row: u32,
    pub data: Vec<u8>,
    pub origin: FramebufferOrigin,
}

impl Readback {
    /// Tightly packed RGB rows, top row first.
    ///
    /// Fails when `data` holds fewer rows than `height` or a row pitch is
    /// shorter than `width` texels.
    pub fn to_rgb8(&self) -> anyhow::Result<image::RgbImage> {
        let width = self.width as usize;
        let height = self.height as usize;
        let pitch = self.padded_bytes_per_row as usize;
        let row_bytes = width * BYTES_PER_PIXEL as usize;
        anyhow::ensure!(
            pitch >= row_bytes,
            "readback row pitch {pitch} is shorter than {width} texels"
        );
        let needed = (height.saturating_sub(1) * pitch + row_bytes).min(pitch * height);
        anyhow::ensure!(
            self.data.len() >= needed,
            "readback holds {} bytes, a {}x{} image needs {needed}",
            self.data.len(),
            self.width,
            self.height
        );
        let mut rgb = Vec::with_capacity(width * height * 3);
        for row in self.data.chunks(self.padded_bytes_per_row as usize).take(height) {
            for texel in row[..row_bytes].chunks_exact(BYTES_PER_PIXEL as usize) {
                rgb.extend_from_slice(&texel[..3]);
            }
        }
        if self.origin == FramebufferOrigin::BottomLeft {
            flip_rows(&mut rgb, width * 3, height);
        }
        image::RgbImage::from_raw(self.width, self.height, rgb)
            .context("readback does not fill the image")
    }
}

/// Copy `texture` into a mappable buffer and wait for the data.
pub async fn read_texture(
    ctx: &Context,
    texture: &wgpu::Texture,
    width: u32,
    height: u32,
) -> anyhow::Result<Readback> {
    let padded_bytes_per_row = padded_bytes_per_row(width);
    let output_buffer = ctx.device.create_buffer(&wgpu::BufferDescriptor {
        size: (padded_bytes_per_row * height) as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
        label: Some("Readback Buffer"),
        mapped_at_creation: false,
    });

    let mut encoder = ctx
        .device
        .create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
    encoder.copy_texture_to_buffer(
        wgpu::TexelCopyTextureInfo {
            aspect: wgpu::TextureAspect::All,
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
        },
        wgpu::TexelCopyBufferInfo {
            buffer: &output_buffer,
            layout: wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(padded_bytes_per_row),
                rows_per_image: Some(height),
            },
        },
        wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
    );
    ctx.queue.submit(std::iter::once(encoder.finish()));

    let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
    let buffer_slice = output_buffer.slice(..);
    buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = tx.send(result);
    });
    ctx.device
        .poll(wgpu::PollType::Wait {
            submission_index: None,
            timeout: None,
        })
        .context("failed to wait for the GPU")?;
    rx.receive()
        .await
        .context("readback channel closed")?
        .context("failed to map the readback buffer")?;

    let data = buffer_slice.get_mapped_range().to_vec();
    output_buffer.unmap();

    Ok(Readback {
        width,
        height,
        padded_bytes_per_row,
        data,
        origin: FramebufferOrigin::TopLeft,
    })
}

/// Load the configured document, render one frame and save it to `path`.
pub fn render_to_file(config: &ViewerConfig, path: &Path) -> anyhow::Result<()> {
    let document = load_document(&config.document)?;
    let framing = SceneFraming::new(compute_scene_bounds(&document)?);
    let camera = config.camera.unwrap_or_else(|| framing.default_camera());
    let projection = framing.projection(config.width, config.height);

    let async_runtime = tokio::runtime::Runtime::new().context("failed to start async runtime")?;
    let mut ctx = async_runtime.block_on(Context::headless(
        config.width,
        config.height,
        &config.program,
    ))?;
    ctx.clear_colour = config.clear_colour;

    let resources = GpuResources::build(&document, &config.default_sampler, &mut ctx)?;
    let frame = build_frame(
        &document,
        &resources,
        config.program.uniforms(),
        &camera,
        &projection.calc_matrix(),
        &config.light,
    )?;

    let target = Texture::create_render_target(
        &ctx.device,
        [config.width, config.height],
        ctx.color_format,
        "Offscreen Target",
    );
    ctx.render(&frame, &resources, &target.view);
    let readback = async_runtime.block_on(read_texture(
        &ctx,
        &target.texture,
        config.width,
        config.height,
    ))?;

    readback
        .to_rgb8()?
        .save(path)
        .with_context(|| format!("failed to write {}", path.display()))?;
    info!("Saved {}x{} render to {}", config.width, config.height, path.display());
    Ok(())
}
