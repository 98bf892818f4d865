//! The in-memory scene document.
//!
//! [`SceneDocument`] mirrors the parts of a glTF 2.0 asset the viewer consumes:
//! raw buffers and the views/accessors that describe them, images, samplers,
//! textures, materials, meshes, nodes and scenes. Cross references are plain
//! indices into the document's lists; the fallible getters turn an out of range
//! index into a [`DocumentError`] instead of a panic.

use std::collections::BTreeMap;

use crate::{data_structures::instance::NodeTransform, error::DocumentError};

/// Vertex attribute semantics the viewer binds, and the shader slot each one uses.
pub const POSITION: &str = "POSITION";
pub const NORMAL: &str = "NORMAL";
pub const TEXCOORD_0: &str = "TEXCOORD_0";

/// Fixed semantic → slot table. The order of this table is the slot number.
pub const ATTRIBUTE_SLOTS: [&str; 3] = [POSITION, NORMAL, TEXCOORD_0];

#[derive(Clone, Debug, Default)]
pub struct SceneDocument {
    pub buffers: Vec<Buffer>,
    pub buffer_views: Vec<BufferView>,
    pub accessors: Vec<Accessor>,
    pub images: Vec<Image>,
    pub samplers: Vec<Sampler>,
    pub textures: Vec<Texture>,
    pub materials: Vec<Material>,
    pub meshes: Vec<Mesh>,
    pub nodes: Vec<Node>,
    pub scenes: Vec<Scene>,
    /// `None` means the document names no scene and nothing is drawn.
    pub default_scene: Option<usize>,
}

#[derive(Clone, Debug, Default)]
pub struct Buffer {
    pub data: Vec<u8>,
}

/// What a buffer view declares it is used for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferTarget {
    VertexData,
    IndexData,
}

#[derive(Clone, Debug, Default)]
pub struct BufferView {
    pub buffer: usize,
    pub byte_offset: usize,
    pub byte_length: usize,
    /// `None` (or zero) means tightly packed.
    pub byte_stride: Option<usize>,
    pub target: Option<BufferTarget>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ComponentType {
    I8,
    U8,
    I16,
    U16,
    U32,
    F32,
}

impl ComponentType {
    pub fn size(self) -> usize {
        match self {
            ComponentType::I8 | ComponentType::U8 => 1,
            ComponentType::I16 | ComponentType::U16 => 2,
            ComponentType::U32 | ComponentType::F32 => 4,
        }
    }
}

/// Element shape of an accessor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ElementType {
    Scalar,
    Vec2,
    Vec3,
    Vec4,
    Mat2,
    Mat3,
    Mat4,
}

impl ElementType {
    pub fn components(self) -> usize {
        match self {
            ElementType::Scalar => 1,
            ElementType::Vec2 => 2,
            ElementType::Vec3 => 3,
            ElementType::Vec4 | ElementType::Mat2 => 4,
            ElementType::Mat3 => 9,
            ElementType::Mat4 => 16,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Accessor {
    pub buffer_view: Option<usize>,
    pub byte_offset: usize,
    pub component_type: ComponentType,
    pub element_type: ElementType,
    pub count: usize,
    pub normalized: bool,
    pub min: Option<Vec<f32>>,
    pub max: Option<Vec<f32>>,
}

impl Accessor {
    /// Size of one element when tightly packed.
    pub fn element_size(&self) -> usize {
        self.component_type.size() * self.element_type.components()
    }
}

/// Pixel layouts an image may be decoded into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    R8,
    R8G8,
    R8G8B8,
    R8G8B8A8,
    R16,
    R16G16,
    R16G16B16,
    R16G16B16A16,
    R32G32B32Float,
    R32G32B32A32Float,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::R8 | PixelFormat::R16 => 1,
            PixelFormat::R8G8 | PixelFormat::R16G16 => 2,
            PixelFormat::R8G8B8 | PixelFormat::R16G16B16 | PixelFormat::R32G32B32Float => 3,
            PixelFormat::R8G8B8A8
            | PixelFormat::R16G16B16A16
            | PixelFormat::R32G32B32A32Float => 4,
        }
    }

    pub fn bytes_per_channel(self) -> usize {
        match self {
            PixelFormat::R8 | PixelFormat::R8G8 | PixelFormat::R8G8B8 | PixelFormat::R8G8B8A8 => 1,
            PixelFormat::R16
            | PixelFormat::R16G16
            | PixelFormat::R16G16B16
            | PixelFormat::R16G16B16A16 => 2,
            PixelFormat::R32G32B32Float | PixelFormat::R32G32B32A32Float => 4,
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        self.channels() * self.bytes_per_channel()
    }
}

#[derive(Clone, Debug)]
pub struct Image {
    pub pixels: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl Image {
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }

    /// Expand any pixel layout to 8-bit RGBA.
    ///
    /// Grey images are replicated across RGB, missing alpha becomes opaque,
    /// 16-bit channels keep their high byte and floats are clamped to [0, 1].
    pub fn to_rgba8(&self) -> Vec<u8> {
        let channels = self.format.channels();
        let width = self.format.bytes_per_channel();
        let pixel_count = self.width as usize * self.height as usize;
        let mut rgba = Vec::with_capacity(pixel_count * 4);

        let channel = |bytes: &[u8]| -> u8 {
            match width {
                1 => bytes[0],
                2 => (u16::from_le_bytes([bytes[0], bytes[1]]) >> 8) as u8,
                _ => {
                    let value = f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
                    (value.clamp(0.0, 1.0) * 255.0).round() as u8
                }
            }
        };

        for pixel in self
            .pixels
            .chunks_exact(self.format.bytes_per_pixel())
            .take(pixel_count)
        {
            let mut values = [0u8, 0, 0, 255];
            for (i, bytes) in pixel.chunks_exact(width).enumerate() {
                values[i] = channel(bytes);
            }
            match channels {
                1 => {
                    values[1] = values[0];
                    values[2] = values[0];
                }
                // Grey + alpha
                2 => {
                    values[3] = values[1];
                    values[1] = values[0];
                    values[2] = values[0];
                }
                _ => {}
            }
            rgba.extend_from_slice(&values);
        }
        rgba
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MagFilter {
    Nearest,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MinFilter {
    Nearest,
    Linear,
    NearestMipmapNearest,
    LinearMipmapNearest,
    NearestMipmapLinear,
    LinearMipmapLinear,
}

impl MinFilter {
    pub fn uses_mipmaps(self) -> bool {
        matches!(
            self,
            MinFilter::NearestMipmapNearest
                | MinFilter::LinearMipmapNearest
                | MinFilter::NearestMipmapLinear
                | MinFilter::LinearMipmapLinear
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum WrapMode {
    ClampToEdge,
    MirroredRepeat,
    #[default]
    Repeat,
}

/// A document sampler. Absent filters fall back to linear filtering.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Sampler {
    pub mag_filter: Option<MagFilter>,
    pub min_filter: Option<MinFilter>,
    pub wrap_s: WrapMode,
    pub wrap_t: WrapMode,
    pub wrap_r: WrapMode,
}

#[derive(Clone, Debug, Default)]
pub struct Texture {
    pub source: Option<usize>,
    pub sampler: Option<usize>,
}

#[derive(Clone, Debug)]
pub struct Material {
    pub base_color_factor: [f32; 4],
    /// Texture index of the base colour map.
    pub base_color_texture: Option<usize>,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            base_color_factor: [1.0; 4],
            base_color_texture: None,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub enum DrawMode {
    Points,
    Lines,
    LineLoop,
    LineStrip,
    #[default]
    Triangles,
    TriangleStrip,
    TriangleFan,
}

#[derive(Clone, Debug, Default)]
pub struct Primitive {
    /// Attribute semantic → accessor index, ordered by semantic name.
    pub attributes: BTreeMap<String, usize>,
    pub indices: Option<usize>,
    pub material: Option<usize>,
    pub mode: DrawMode,
}

#[derive(Clone, Debug, Default)]
pub struct Mesh {
    pub name: Option<String>,
    pub primitives: Vec<Primitive>,
}

#[derive(Clone, Debug, Default)]
pub struct Node {
    pub name: Option<String>,
    pub mesh: Option<usize>,
    pub children: Vec<usize>,
    pub transform: NodeTransform,
}

#[derive(Clone, Debug, Default)]
pub struct Scene {
    pub nodes: Vec<usize>,
}

fn fetch<'a, T>(
    items: &'a [T],
    index: usize,
    kind: &'static str,
    owner: impl FnOnce() -> String,
) -> Result<&'a T, DocumentError> {
    items.get(index).ok_or_else(|| DocumentError::DanglingIndex {
        kind,
        index,
        len: items.len(),
        owner: owner(),
    })
}

impl SceneDocument {
    pub fn buffer(&self, index: usize, owner: impl FnOnce() -> String) -> Result<&Buffer, DocumentError> {
        fetch(&self.buffers, index, "buffer", owner)
    }

    pub fn buffer_view(
        &self,
        index: usize,
        owner: impl FnOnce() -> String,
    ) -> Result<&BufferView, DocumentError> {
        fetch(&self.buffer_views, index, "buffer view", owner)
    }

    pub fn accessor(
        &self,
        index: usize,
        owner: impl FnOnce() -> String,
    ) -> Result<&Accessor, DocumentError> {
        fetch(&self.accessors, index, "accessor", owner)
    }

    pub fn image(&self, index: usize, owner: impl FnOnce() -> String) -> Result<&Image, DocumentError> {
        fetch(&self.images, index, "image", owner)
    }

    pub fn sampler(
        &self,
        index: usize,
        owner: impl FnOnce() -> String,
    ) -> Result<&Sampler, DocumentError> {
        fetch(&self.samplers, index, "sampler", owner)
    }

    pub fn texture(
        &self,
        index: usize,
        owner: impl FnOnce() -> String,
    ) -> Result<&Texture, DocumentError> {
        fetch(&self.textures, index, "texture", owner)
    }

    pub fn material(
        &self,
        index: usize,
        owner: impl FnOnce() -> String,
    ) -> Result<&Material, DocumentError> {
        fetch(&self.materials, index, "material", owner)
    }

    pub fn mesh(&self, index: usize, owner: impl FnOnce() -> String) -> Result<&Mesh, DocumentError> {
        fetch(&self.meshes, index, "mesh", owner)
    }

    pub fn node(&self, index: usize, owner: impl FnOnce() -> String) -> Result<&Node, DocumentError> {
        fetch(&self.nodes, index, "node", owner)
    }

    /// Root nodes of the default scene; empty when there is none.
    pub fn default_scene_roots(&self) -> &[usize] {
        self.default_scene
            .and_then(|index| self.scenes.get(index))
            .map(|scene| scene.nodes.as_slice())
            .unwrap_or(&[])
    }

    /// The bytes an accessor reads, starting at its first element.
    ///
    /// Returns the backing slice plus the effective stride.
    pub fn accessor_bytes(&self, index: usize) -> Result<(&[u8], usize), DocumentError> {
        let accessor = self.accessor(index, || "accessor lookup".to_string())?;
        let view_index = accessor
            .buffer_view
            .ok_or(DocumentError::AccessorWithoutView { accessor: index })?;
        let view = self.buffer_view(view_index, || format!("accessor {index}"))?;
        let buffer = self.buffer(view.buffer, || format!("buffer view {view_index}"))?;
        let stride = effective_stride(view, accessor);

        let view_end = match view.byte_offset.checked_add(view.byte_length) {
            Some(end) if end <= buffer.data.len() => end,
            end => {
                return Err(DocumentError::ViewOutOfBounds {
                    view: view_index,
                    buffer: view.buffer,
                    start: view.byte_offset,
                    end: end.unwrap_or(usize::MAX),
                    length: buffer.data.len(),
                });
            }
        };
        if accessor.byte_offset > view.byte_length {
            return Err(DocumentError::AccessorOutOfBounds {
                accessor: index,
                view: view_index,
                end: accessor.byte_offset,
                length: view.byte_length,
            });
        }
        let start = view.byte_offset + accessor.byte_offset;
        Ok((&buffer.data[start..view_end], stride))
    }
}

/// The stride an accessor's elements are read with: the view's declared stride,
/// or the tightly packed element size when none (or zero) is declared.
pub fn effective_stride(view: &BufferView, accessor: &Accessor) -> usize {
    match view.byte_stride {
        Some(stride) if stride > 0 => stride,
        _ => accessor.element_size(),
    }
}
