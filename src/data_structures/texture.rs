//! GPU textures.
//!
//! [`Texture`] wraps a wgpu texture with its view, sampler and, for material
//! textures, the bind group the fragment stage samples it through.

use image::{RgbaImage, imageops::FilterType};

use crate::{
    data_structures::document::WrapMode,
    resources::{
        gpu::TextureUpload,
        sampler::{FilterMode, SamplerState},
    },
};

#[derive(Clone, Debug)]
pub struct Texture {
    #[allow(unused)]
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: Option<wgpu::Sampler>,
    pub bind_group: Option<wgpu::BindGroup>,
}

impl Texture {
    /// Standard depth buffer texture format (32-bit float).
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
    /// Base colour textures hold sRGB encoded texels.
    pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

    /// Create a depth texture for depth-testing during rendering.
    ///
    /// * `size` is [width, height] of the texture in pixels
    /// * `label` is used as a debug label for the GPU resource
    pub fn create_depth_texture(device: &wgpu::Device, size: [u32; 2], label: &str) -> Self {
        let size = wgpu::Extent3d {
            width: size[0].max(1),
            height: size[1].max(1),
            depth_or_array_layers: 1,
        };
        let desc = wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[Self::DEPTH_FORMAT],
        };
        let texture = device.create_texture(&desc);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            texture,
            view,
            sampler: None,
            bind_group: None,
        }
    }

    /// A colour target that can be copied back to the CPU.
    pub fn create_render_target(
        device: &wgpu::Device,
        size: [u32; 2],
        format: wgpu::TextureFormat,
        label: &str,
    ) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: size[0].max(1),
                height: size[1].max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            sampler: None,
            bind_group: None,
        }
    }

    /// Upload an RGBA8 image, with a full mip chain when the sampler asks for one.
    pub fn from_upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        label: &str,
        upload: &TextureUpload<'_>,
    ) -> Self {
        let levels = if upload.generate_mipmaps {
            mip_chain(upload.width, upload.height, &upload.rgba)
        } else {
            vec![(upload.width, upload.height, upload.rgba.to_vec())]
        };

        let size = wgpu::Extent3d {
            width: upload.width,
            height: upload.height,
            depth_or_array_layers: 1,
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: levels.len() as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::COLOR_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (mip_level, (width, height, rgba)) in levels.iter().enumerate() {
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    aspect: wgpu::TextureAspect::All,
                    texture: &texture,
                    mip_level: mip_level as u32,
                    origin: wgpu::Origin3d::ZERO,
                },
                rgba,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * width),
                    rows_per_image: Some(*height),
                },
                wgpu::Extent3d {
                    width: *width,
                    height: *height,
                    depth_or_array_layers: 1,
                },
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = create_sampler(device, &upload.sampler, label);
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
            label: Some(label),
        });

        Self {
            texture,
            view,
            sampler: Some(sampler),
            bind_group: Some(bind_group),
        }
    }
}

/// Number of levels in a full mip chain down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// Every level of a mip chain, level 0 first, each as (width, height, rgba).
///
/// Falls back to level 0 alone when `rgba` does not hold a full image.
pub fn mip_chain(width: u32, height: u32, rgba: &[u8]) -> Vec<(u32, u32, Vec<u8>)> {
    let Some(base) = RgbaImage::from_raw(width, height, rgba.to_vec()) else {
        return vec![(width, height, rgba.to_vec())];
    };
    let count = mip_level_count(width, height);
    let mut levels = Vec::with_capacity(count as usize);
    levels.push((width, height, base.as_raw().clone()));
    for level in 1..count {
        let w = (width >> level).max(1);
        let h = (height >> level).max(1);
        let resized = image::imageops::resize(&base, w, h, FilterType::Triangle);
        levels.push((w, h, resized.into_raw()));
    }
    levels
}

fn address_mode(wrap: WrapMode) -> wgpu::AddressMode {
    match wrap {
        WrapMode::ClampToEdge => wgpu::AddressMode::ClampToEdge,
        WrapMode::MirroredRepeat => wgpu::AddressMode::MirrorRepeat,
        WrapMode::Repeat => wgpu::AddressMode::Repeat,
    }
}

fn filter_mode(filter: FilterMode) -> wgpu::FilterMode {
    match filter {
        FilterMode::Nearest => wgpu::FilterMode::Nearest,
        FilterMode::Linear => wgpu::FilterMode::Linear,
    }
}

pub fn create_sampler(device: &wgpu::Device, state: &SamplerState, label: &str) -> wgpu::Sampler {
    let mipmap_filter = match state.mipmap_filter {
        Some(FilterMode::Linear) => wgpu::MipmapFilterMode::Linear,
        Some(FilterMode::Nearest) | None => wgpu::MipmapFilterMode::Nearest,
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: address_mode(state.wrap_s),
        address_mode_v: address_mode(state.wrap_t),
        address_mode_w: address_mode(state.wrap_r),
        mag_filter: filter_mode(state.mag_filter),
        min_filter: filter_mode(state.min_filter),
        mipmap_filter,
        // without mipmaps only level 0 exists anyway
        lod_max_clamp: if state.uses_mipmaps() { 32.0 } else { 0.0 },
        ..Default::default()
    })
}
