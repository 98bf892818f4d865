//! Sampler state resolution.
//!
//! Document samplers leave filters optional; [`SamplerState`] is the fully
//! specified, backend-neutral form a texture is created with.

use crate::data_structures::document::{MagFilter, MinFilter, Sampler, WrapMode};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SamplerState {
    pub mag_filter: FilterMode,
    pub min_filter: FilterMode,
    /// `Some` only for the mip-mapping minification modes.
    pub mipmap_filter: Option<FilterMode>,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub wrap_r: WrapMode,
}

impl SamplerState {
    /// Linear filtering with repeat on every axis. Used for textures without a sampler.
    pub const DEFAULT: SamplerState = SamplerState {
        mag_filter: FilterMode::Linear,
        min_filter: FilterMode::Linear,
        mipmap_filter: None,
        wrap_s: WrapMode::Repeat,
        wrap_t: WrapMode::Repeat,
        wrap_r: WrapMode::Repeat,
    };

    pub fn uses_mipmaps(&self) -> bool {
        self.mipmap_filter.is_some()
    }
}

impl Default for SamplerState {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl From<&Sampler> for SamplerState {
    fn from(sampler: &Sampler) -> Self {
        let mag_filter = match sampler.mag_filter {
            Some(MagFilter::Nearest) => FilterMode::Nearest,
            Some(MagFilter::Linear) | None => FilterMode::Linear,
        };
        let (min_filter, mipmap_filter) = match sampler.min_filter {
            Some(MinFilter::Nearest) => (FilterMode::Nearest, None),
            Some(MinFilter::Linear) | None => (FilterMode::Linear, None),
            Some(MinFilter::NearestMipmapNearest) => (FilterMode::Nearest, Some(FilterMode::Nearest)),
            Some(MinFilter::LinearMipmapNearest) => (FilterMode::Linear, Some(FilterMode::Nearest)),
            Some(MinFilter::NearestMipmapLinear) => (FilterMode::Nearest, Some(FilterMode::Linear)),
            Some(MinFilter::LinearMipmapLinear) => (FilterMode::Linear, Some(FilterMode::Linear)),
        };
        Self {
            mag_filter,
            min_filter,
            mipmap_filter,
            wrap_s: sampler.wrap_s,
            wrap_t: sampler.wrap_t,
            wrap_r: sampler.wrap_r,
        }
    }
}
