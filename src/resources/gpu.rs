//! GPU resource building.
//!
//! Turns a validated [`SceneDocument`] into device objects: one buffer per
//! source buffer, one texture per image, and one [`BindingSet`] per mesh
//! primitive that records which buffer, offset, stride and format feed each
//! attribute slot. Device objects are created through the [`Backend`] trait
//! and owned by a [`GpuResources`] arena; everything else refers to them
//! through small `Copy` handles that stay valid until the arena is dropped.

use std::borrow::Cow;

use log::{debug, info, warn};

use crate::{
    data_structures::document::{
        ATTRIBUTE_SLOTS, BufferTarget, ComponentType, DrawMode, ElementType, Primitive,
        SceneDocument, effective_stride,
    },
    error::DocumentError,
    resources::sampler::SamplerState,
};

/// Creates device objects. Implemented by the wgpu context and by test doubles.
pub trait Backend {
    type Buffer;
    type Texture;

    /// Upload `contents` into a buffer usable as both vertex and index source.
    fn create_buffer(&mut self, label: &str, contents: &[u8]) -> Self::Buffer;

    fn create_texture(&mut self, label: &str, upload: &TextureUpload<'_>) -> Self::Texture;
}

/// Pixel data and sampling state for one texture.
#[derive(Clone, Debug)]
pub struct TextureUpload<'a> {
    pub width: u32,
    pub height: u32,
    /// Level 0 as tightly packed RGBA8.
    pub rgba: Cow<'a, [u8]>,
    pub sampler: SamplerState,
    pub generate_mipmaps: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferHandle(u32);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(u32);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BindingHandle(u32);

macro_rules! handle_index {
    ($($handle:ident),*) => {
        $(impl $handle {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        })*
    };
}
handle_index!(BufferHandle, TextureHandle, BindingHandle);

/// How one attribute slot reads its data.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct VertexFormat {
    pub component_type: ComponentType,
    pub element_type: ElementType,
    pub normalized: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AttributeBinding {
    pub buffer: BufferHandle,
    pub format: VertexFormat,
    /// Accessor offset plus buffer view offset.
    pub offset: u64,
    pub stride: u64,
    pub count: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum IndexType {
    U16,
    U32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IndexBinding {
    pub buffer: BufferHandle,
    pub offset: u64,
    pub count: u32,
    pub index_type: IndexType,
}

/// Everything needed to issue one primitive's draw, minus material and uniforms.
#[derive(Clone, Debug, PartialEq)]
pub struct BindingSet {
    /// Indexed by slot: POSITION, NORMAL, TEXCOORD_0.
    pub attributes: [Option<AttributeBinding>; ATTRIBUTE_SLOTS.len()],
    pub index: Option<IndexBinding>,
    pub mode: DrawMode,
    /// Vertex count for non-indexed draws: the count of the first attribute
    /// in semantic name order.
    pub array_count: u32,
}

/// The contiguous binding sets of one mesh, in primitive order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BindingRange {
    pub begin: usize,
    pub count: usize,
}

impl BindingRange {
    pub fn handles(&self) -> impl Iterator<Item = BindingHandle> + use<> {
        (self.begin..self.begin + self.count).map(|i| BindingHandle(i as u32))
    }
}

/// Owner of every device object built for a document.
pub struct GpuResources<B: Backend> {
    buffers: Vec<B::Buffer>,
    textures: Vec<B::Texture>,
    bindings: Vec<BindingSet>,
    mesh_ranges: Vec<BindingRange>,
    image_textures: Vec<Option<TextureHandle>>,
    white_texture: TextureHandle,
}

impl<B: Backend> GpuResources<B> {
    /// An arena holding only the 1x1 white fallback texture.
    pub fn new(backend: &mut B) -> Self {
        let white = backend.create_texture(
            "white fallback",
            &TextureUpload {
                width: 1,
                height: 1,
                rgba: Cow::Borrowed(&[255, 255, 255, 255]),
                sampler: SamplerState::DEFAULT,
                generate_mipmaps: false,
            },
        );
        Self {
            buffers: Vec::new(),
            textures: vec![white],
            bindings: Vec::new(),
            mesh_ranges: Vec::new(),
            image_textures: Vec::new(),
            white_texture: TextureHandle(0),
        }
    }

    /// Build buffers, binding sets and textures for `document`.
    pub fn build(
        document: &SceneDocument,
        default_sampler: &SamplerState,
        backend: &mut B,
    ) -> Result<Self, DocumentError> {
        let mut resources = Self::new(backend);
        let buffers = resources.build_buffers(document, backend);
        resources.build_primitive_bindings(document, &buffers, backend)?;
        resources.build_textures(document, default_sampler, backend)?;
        Ok(resources)
    }

    fn push_buffer(&mut self, buffer: B::Buffer) -> BufferHandle {
        self.buffers.push(buffer);
        BufferHandle(self.buffers.len() as u32 - 1)
    }

    fn push_texture(&mut self, texture: B::Texture) -> TextureHandle {
        self.textures.push(texture);
        TextureHandle(self.textures.len() as u32 - 1)
    }

    /// One device buffer per source buffer, in source order.
    pub fn build_buffers(&mut self, document: &SceneDocument, backend: &mut B) -> Vec<BufferHandle> {
        document
            .buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| {
                let device_buffer = backend.create_buffer(&format!("buffer {i}"), &buffer.data);
                self.push_buffer(device_buffer)
            })
            .collect()
    }

    /// One binding set per primitive, grouped per mesh.
    ///
    /// Every mesh gets a range, including meshes without primitives, so range
    /// `i` always belongs to mesh `i`.
    pub fn build_primitive_bindings(
        &mut self,
        document: &SceneDocument,
        buffers: &[BufferHandle],
        backend: &mut B,
    ) -> Result<(Vec<BindingHandle>, Vec<BindingRange>), DocumentError> {
        let mut handles = Vec::new();
        let mut ranges = Vec::with_capacity(document.meshes.len());

        for (mesh_index, mesh) in document.meshes.iter().enumerate() {
            let begin = self.bindings.len();
            for (primitive_index, primitive) in mesh.primitives.iter().enumerate() {
                let binding = self.bind_primitive(
                    document,
                    buffers,
                    backend,
                    primitive,
                    &format!("mesh {mesh_index} primitive {primitive_index}"),
                )?;
                self.bindings.push(binding);
                handles.push(BindingHandle(self.bindings.len() as u32 - 1));
            }
            ranges.push(BindingRange {
                begin,
                count: mesh.primitives.len(),
            });
        }

        info!("Number of binding sets: {}", handles.len());
        self.mesh_ranges.extend_from_slice(&ranges);
        Ok((handles, ranges))
    }

    fn bind_primitive(
        &mut self,
        document: &SceneDocument,
        buffers: &[BufferHandle],
        backend: &mut B,
        primitive: &Primitive,
        owner: &str,
    ) -> Result<BindingSet, DocumentError> {
        let mut attributes = [None; ATTRIBUTE_SLOTS.len()];
        for (semantic, &accessor_index) in &primitive.attributes {
            let Some(slot) = ATTRIBUTE_SLOTS.iter().position(|known| known == semantic) else {
                debug!("{owner}: ignoring attribute {semantic}");
                continue;
            };
            let accessor = document.accessor(accessor_index, || owner.to_string())?;
            let view_index = accessor
                .buffer_view
                .ok_or(DocumentError::AccessorWithoutView {
                    accessor: accessor_index,
                })?;
            let view = document.buffer_view(view_index, || format!("accessor {accessor_index}"))?;
            attributes[slot] = Some(AttributeBinding {
                buffer: source_buffer(buffers, view.buffer, view_index)?,
                format: VertexFormat {
                    component_type: accessor.component_type,
                    element_type: accessor.element_type,
                    normalized: accessor.normalized,
                },
                offset: (accessor.byte_offset + view.byte_offset) as u64,
                stride: effective_stride(view, accessor) as u64,
                count: draw_count(accessor_index, accessor.count)?,
            });
        }

        let index = match primitive.indices {
            Some(accessor) => Some(self.bind_indices(document, buffers, backend, accessor)?),
            None => None,
        };

        let array_count = match primitive.attributes.values().next() {
            Some(&first) => {
                draw_count(first, document.accessor(first, || owner.to_string())?.count)?
            }
            None => 0,
        };

        Ok(BindingSet {
            attributes,
            index,
            mode: primitive.mode,
            array_count,
        })
    }

    fn bind_indices(
        &mut self,
        document: &SceneDocument,
        buffers: &[BufferHandle],
        backend: &mut B,
        accessor_index: usize,
    ) -> Result<IndexBinding, DocumentError> {
        let accessor = document.accessor(accessor_index, || "primitive indices".to_string())?;
        let view_index = accessor
            .buffer_view
            .ok_or(DocumentError::AccessorWithoutView {
                accessor: accessor_index,
            })?;
        let view = document.buffer_view(view_index, || format!("accessor {accessor_index}"))?;
        // Only a vertex-data target is refused. An index view without any
        // declared target is accepted.
        if view.target == Some(BufferTarget::VertexData) {
            return Err(DocumentError::IndexBufferRole {
                accessor: accessor_index,
                view: view_index,
            });
        }
        if accessor.element_type != ElementType::Scalar {
            return Err(DocumentError::InvalidIndexAccessor {
                accessor: accessor_index,
                reason: format!("element type {:?}", accessor.element_type),
            });
        }

        let count = draw_count(accessor_index, accessor.count)?;
        let offset = (accessor.byte_offset + view.byte_offset) as u64;
        match accessor.component_type {
            ComponentType::U16 => Ok(IndexBinding {
                buffer: source_buffer(buffers, view.buffer, view_index)?,
                offset,
                count,
                index_type: IndexType::U16,
            }),
            ComponentType::U32 => Ok(IndexBinding {
                buffer: source_buffer(buffers, view.buffer, view_index)?,
                offset,
                count,
                index_type: IndexType::U32,
            }),
            ComponentType::U8 => {
                let (bytes, _) = document.accessor_bytes(accessor_index)?;
                if bytes.len() < accessor.count {
                    return Err(DocumentError::AccessorOutOfBounds {
                        accessor: accessor_index,
                        view: view_index,
                        end: accessor.byte_offset + accessor.count,
                        length: view.byte_length,
                    });
                }
                let widened: Vec<u16> = bytes[..accessor.count].iter().map(|&i| i as u16).collect();
                let buffer = backend.create_buffer(
                    &format!("accessor {accessor_index} widened indices"),
                    bytemuck::cast_slice(&widened),
                );
                Ok(IndexBinding {
                    buffer: self.push_buffer(buffer),
                    offset: 0,
                    count,
                    index_type: IndexType::U16,
                })
            }
            other => Err(DocumentError::InvalidIndexAccessor {
                accessor: accessor_index,
                reason: format!("component type {other:?}"),
            }),
        }
    }

    /// One texture per image that some texture uses as its source.
    ///
    /// An image takes the sampler of the first texture that references it;
    /// textures without a sampler use `default_sampler`. The result is indexed
    /// by image and holds `None` for images no texture references.
    pub fn build_textures(
        &mut self,
        document: &SceneDocument,
        default_sampler: &SamplerState,
        backend: &mut B,
    ) -> Result<Vec<Option<TextureHandle>>, DocumentError> {
        let mut first_use = vec![None; document.images.len()];
        for (texture_index, texture) in document.textures.iter().enumerate() {
            let source = texture.source.ok_or(DocumentError::MissingImage {
                texture: texture_index,
            })?;
            document.image(source, || format!("texture {texture_index}"))?;
            first_use[source].get_or_insert(texture_index);
        }

        let mut handles = vec![None; document.images.len()];
        for (image_index, image) in document.images.iter().enumerate() {
            let Some(texture_index) = first_use[image_index] else {
                debug!("image {image_index} is not used by any texture");
                continue;
            };
            let sampler = match document.textures[texture_index].sampler {
                Some(sampler) => SamplerState::from(
                    document.sampler(sampler, || format!("texture {texture_index}"))?,
                ),
                None => *default_sampler,
            };

            if image.width == 0 || image.height == 0 {
                warn!("image {image_index} is empty, using the white fallback texture");
                handles[image_index] = Some(self.white_texture);
                continue;
            }
            if image.pixels.len() < image.expected_len() {
                return Err(DocumentError::ImageSize {
                    image: image_index,
                    actual: image.pixels.len(),
                    expected: image.expected_len(),
                });
            }

            let upload = TextureUpload {
                width: image.width,
                height: image.height,
                rgba: Cow::Owned(image.to_rgba8()),
                sampler,
                generate_mipmaps: sampler.uses_mipmaps(),
            };
            let texture = backend.create_texture(&format!("image {image_index}"), &upload);
            handles[image_index] = Some(self.push_texture(texture));
        }

        self.image_textures.extend_from_slice(&handles);
        Ok(handles)
    }

    pub fn buffer(&self, handle: BufferHandle) -> &B::Buffer {
        &self.buffers[handle.index()]
    }

    pub fn texture(&self, handle: TextureHandle) -> &B::Texture {
        &self.textures[handle.index()]
    }

    pub fn binding(&self, handle: BindingHandle) -> &BindingSet {
        &self.bindings[handle.index()]
    }

    pub fn bindings(&self) -> &[BindingSet] {
        &self.bindings
    }

    pub fn mesh_range(&self, mesh: usize) -> Option<BindingRange> {
        self.mesh_ranges.get(mesh).copied()
    }

    /// The binding set of `primitive` within `mesh`.
    pub fn primitive_binding(&self, mesh: usize, primitive: usize) -> Option<BindingHandle> {
        let range = self.mesh_range(mesh)?;
        (primitive < range.count).then(|| BindingHandle((range.begin + primitive) as u32))
    }

    pub fn image_texture(&self, image: usize) -> Option<TextureHandle> {
        self.image_textures.get(image).copied().flatten()
    }

    pub fn white_texture(&self) -> TextureHandle {
        self.white_texture
    }

    pub fn buffer_count(&self) -> usize {
        self.buffers.len()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }
}

fn source_buffer(
    buffers: &[BufferHandle],
    buffer: usize,
    view: usize,
) -> Result<BufferHandle, DocumentError> {
    buffers
        .get(buffer)
        .copied()
        .ok_or_else(|| DocumentError::DanglingIndex {
            kind: "buffer",
            index: buffer,
            len: buffers.len(),
            owner: format!("buffer view {view}"),
        })
}

fn draw_count(accessor: usize, count: usize) -> Result<u32, DocumentError> {
    u32::try_from(count).map_err(|_| DocumentError::CountTooLarge { accessor, count })
}
