//! Loading scene documents and turning them into GPU resources.
//!
//! - `gpu` builds buffers, textures and binding sets through a [`gpu::Backend`]
//! - `sampler` resolves document samplers into full sampler state
//! - `validate` checks a document's cross references before anything uses it

use std::path::Path;

use anyhow::Context as _;
use log::info;

use crate::data_structures::{
    document::{
        Accessor, Buffer, BufferTarget, BufferView, ComponentType, DrawMode, ElementType, Image,
        MagFilter, Material, Mesh, MinFilter, Node, PixelFormat, Primitive, Sampler, Scene,
        SceneDocument, Texture, WrapMode,
    },
    instance::NodeTransform,
};

pub mod gpu;
pub mod sampler;
pub mod validate;

/// Import a `.gltf` or `.glb` file with its external buffers and images.
pub fn load_document(path: impl AsRef<Path>) -> anyhow::Result<SceneDocument> {
    let path = path.as_ref();
    let (gltf, buffers, images) =
        gltf::import(path).with_context(|| format!("failed to load {}", path.display()))?;
    let document = convert(&gltf, buffers, images);
    validate::validate_document(&document)
        .with_context(|| format!("invalid scene document {}", path.display()))?;
    info!(
        "Loaded {}: {} buffers, {} nodes, {} meshes, {} images",
        path.display(),
        document.buffers.len(),
        document.nodes.len(),
        document.meshes.len(),
        document.images.len()
    );
    Ok(document)
}

/// Import a self-contained document (embedded or data-URI buffers) from memory.
pub fn load_document_from_slice(bytes: &[u8]) -> anyhow::Result<SceneDocument> {
    let (gltf, buffers, images) = gltf::import_slice(bytes).context("failed to parse glTF")?;
    let document = convert(&gltf, buffers, images);
    validate::validate_document(&document).context("invalid scene document")?;
    Ok(document)
}

fn convert(
    gltf: &gltf::Document,
    buffers: Vec<gltf::buffer::Data>,
    images: Vec<gltf::image::Data>,
) -> SceneDocument {
    SceneDocument {
        buffers: buffers.into_iter().map(|data| Buffer { data: data.0 }).collect(),
        buffer_views: gltf.views().map(convert_view).collect(),
        accessors: gltf.accessors().map(|a| convert_accessor(&a)).collect(),
        images: images.into_iter().map(convert_image).collect(),
        samplers: gltf.samplers().map(|s| convert_sampler(&s)).collect(),
        textures: gltf
            .textures()
            .map(|texture| Texture {
                source: Some(texture.source().index()),
                sampler: texture.sampler().index(),
            })
            .collect(),
        materials: gltf
            .materials()
            .map(|material| {
                let pbr = material.pbr_metallic_roughness();
                Material {
                    base_color_factor: pbr.base_color_factor(),
                    base_color_texture: pbr.base_color_texture().map(|info| info.texture().index()),
                }
            })
            .collect(),
        meshes: gltf.meshes().map(|m| convert_mesh(&m)).collect(),
        nodes: gltf.nodes().map(|n| convert_node(&n)).collect(),
        scenes: gltf
            .scenes()
            .map(|scene| Scene {
                nodes: scene.nodes().map(|node| node.index()).collect(),
            })
            .collect(),
        default_scene: gltf.default_scene().map(|scene| scene.index()),
    }
}

fn convert_view(view: gltf::buffer::View<'_>) -> BufferView {
    BufferView {
        buffer: view.buffer().index(),
        byte_offset: view.offset(),
        byte_length: view.length(),
        byte_stride: view.stride(),
        target: view.target().map(|target| match target {
            gltf::buffer::Target::ArrayBuffer => BufferTarget::VertexData,
            gltf::buffer::Target::ElementArrayBuffer => BufferTarget::IndexData,
        }),
    }
}

fn bound(value: Option<gltf::json::Value>) -> Option<Vec<f32>> {
    value?
        .as_array()?
        .iter()
        .map(|v| v.as_f64().map(|f| f as f32))
        .collect()
}

fn convert_accessor(accessor: &gltf::Accessor<'_>) -> Accessor {
    use gltf::accessor::{DataType, Dimensions};
    Accessor {
        buffer_view: accessor.view().map(|view| view.index()),
        byte_offset: accessor.offset(),
        component_type: match accessor.data_type() {
            DataType::I8 => ComponentType::I8,
            DataType::U8 => ComponentType::U8,
            DataType::I16 => ComponentType::I16,
            DataType::U16 => ComponentType::U16,
            DataType::U32 => ComponentType::U32,
            DataType::F32 => ComponentType::F32,
        },
        element_type: match accessor.dimensions() {
            Dimensions::Scalar => ElementType::Scalar,
            Dimensions::Vec2 => ElementType::Vec2,
            Dimensions::Vec3 => ElementType::Vec3,
            Dimensions::Vec4 => ElementType::Vec4,
            Dimensions::Mat2 => ElementType::Mat2,
            Dimensions::Mat3 => ElementType::Mat3,
            Dimensions::Mat4 => ElementType::Mat4,
        },
        count: accessor.count(),
        normalized: accessor.normalized(),
        min: bound(accessor.min()),
        max: bound(accessor.max()),
    }
}

fn convert_image(image: gltf::image::Data) -> Image {
    use gltf::image::Format;
    let format = match image.format {
        Format::R8 => PixelFormat::R8,
        Format::R8G8 => PixelFormat::R8G8,
        Format::R8G8B8 => PixelFormat::R8G8B8,
        Format::R8G8B8A8 => PixelFormat::R8G8B8A8,
        Format::R16 => PixelFormat::R16,
        Format::R16G16 => PixelFormat::R16G16,
        Format::R16G16B16 => PixelFormat::R16G16B16,
        Format::R16G16B16A16 => PixelFormat::R16G16B16A16,
        Format::R32G32B32FLOAT => PixelFormat::R32G32B32Float,
        Format::R32G32B32A32FLOAT => PixelFormat::R32G32B32A32Float,
    };
    Image {
        pixels: image.pixels,
        width: image.width,
        height: image.height,
        format,
    }
}

fn convert_wrap(mode: gltf::texture::WrappingMode) -> WrapMode {
    match mode {
        gltf::texture::WrappingMode::ClampToEdge => WrapMode::ClampToEdge,
        gltf::texture::WrappingMode::MirroredRepeat => WrapMode::MirroredRepeat,
        gltf::texture::WrappingMode::Repeat => WrapMode::Repeat,
    }
}

fn convert_sampler(sampler: &gltf::texture::Sampler<'_>) -> Sampler {
    Sampler {
        mag_filter: sampler.mag_filter().map(|filter| match filter {
            gltf::texture::MagFilter::Nearest => MagFilter::Nearest,
            gltf::texture::MagFilter::Linear => MagFilter::Linear,
        }),
        min_filter: sampler.min_filter().map(|filter| match filter {
            gltf::texture::MinFilter::Nearest => MinFilter::Nearest,
            gltf::texture::MinFilter::Linear => MinFilter::Linear,
            gltf::texture::MinFilter::NearestMipmapNearest => MinFilter::NearestMipmapNearest,
            gltf::texture::MinFilter::LinearMipmapNearest => MinFilter::LinearMipmapNearest,
            gltf::texture::MinFilter::NearestMipmapLinear => MinFilter::NearestMipmapLinear,
            gltf::texture::MinFilter::LinearMipmapLinear => MinFilter::LinearMipmapLinear,
        }),
        wrap_s: convert_wrap(sampler.wrap_s()),
        wrap_t: convert_wrap(sampler.wrap_t()),
        // glTF samplers are two dimensional
        wrap_r: WrapMode::Repeat,
    }
}

fn semantic_name(semantic: &gltf::Semantic) -> String {
    use gltf::Semantic;
    match semantic {
        Semantic::Positions => "POSITION".to_string(),
        Semantic::Normals => "NORMAL".to_string(),
        Semantic::Tangents => "TANGENT".to_string(),
        Semantic::Colors(set) => format!("COLOR_{set}"),
        Semantic::TexCoords(set) => format!("TEXCOORD_{set}"),
        Semantic::Joints(set) => format!("JOINTS_{set}"),
        Semantic::Weights(set) => format!("WEIGHTS_{set}"),
        #[allow(unreachable_patterns)]
        other => format!("{other:?}"),
    }
}

fn convert_mesh(mesh: &gltf::Mesh<'_>) -> Mesh {
    use gltf::mesh::Mode;
    Mesh {
        name: mesh.name().map(str::to_string),
        primitives: mesh
            .primitives()
            .map(|primitive| Primitive {
                attributes: primitive
                    .attributes()
                    .map(|(semantic, accessor)| (semantic_name(&semantic), accessor.index()))
                    .collect(),
                indices: primitive.indices().map(|accessor| accessor.index()),
                material: primitive.material().index(),
                mode: match primitive.mode() {
                    Mode::Points => DrawMode::Points,
                    Mode::Lines => DrawMode::Lines,
                    Mode::LineLoop => DrawMode::LineLoop,
                    Mode::LineStrip => DrawMode::LineStrip,
                    Mode::Triangles => DrawMode::Triangles,
                    Mode::TriangleStrip => DrawMode::TriangleStrip,
                    Mode::TriangleFan => DrawMode::TriangleFan,
                },
            })
            .collect(),
    }
}

fn convert_node(node: &gltf::Node<'_>) -> Node {
    let transform = match node.transform() {
        gltf::scene::Transform::Matrix { matrix } => NodeTransform::from(matrix),
        gltf::scene::Transform::Decomposed {
            translation,
            rotation,
            scale,
        } => NodeTransform::from_gltf_trs(translation, rotation, scale),
    };
    Node {
        name: node.name().map(str::to_string),
        mesh: node.mesh().map(|mesh| mesh.index()),
        children: node.children().map(|child| child.index()).collect(),
        transform,
    }
}
