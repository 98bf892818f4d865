#![allow(dead_code)]

use std::collections::BTreeMap;

use gltf_viewer::{
    data_structures::{
        document::{
            Accessor, Buffer, BufferTarget, BufferView, ComponentType, DrawMode, ElementType,
            Image, Material, Mesh, Node, PixelFormat, Primitive, Sampler, Scene, SceneDocument,
            Texture,
        },
        instance::NodeTransform,
    },
    resources::{
        gpu::{Backend, TextureUpload},
        sampler::SamplerState,
    },
};

/// Builds synthetic documents one buffer per accessor.
#[derive(Default)]
pub struct DocumentBuilder {
    pub doc: SceneDocument,
}

impl DocumentBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn buffer(&mut self, data: Vec<u8>) -> usize {
        self.doc.buffers.push(Buffer { data });
        self.doc.buffers.len() - 1
    }

    pub fn view(
        &mut self,
        buffer: usize,
        byte_offset: usize,
        byte_length: usize,
        byte_stride: Option<usize>,
        target: Option<BufferTarget>,
    ) -> usize {
        self.doc.buffer_views.push(BufferView {
            buffer,
            byte_offset,
            byte_length,
            byte_stride,
            target,
        });
        self.doc.buffer_views.len() - 1
    }

    pub fn accessor(
        &mut self,
        view: usize,
        byte_offset: usize,
        component_type: ComponentType,
        element_type: ElementType,
        count: usize,
    ) -> usize {
        self.doc.accessors.push(Accessor {
            buffer_view: Some(view),
            byte_offset,
            component_type,
            element_type,
            count,
            normalized: false,
            min: None,
            max: None,
        });
        self.doc.accessors.len() - 1
    }

    /// Float data in its own buffer and view.
    pub fn floats(&mut self, data: &[f32], element_type: ElementType) -> usize {
        let bytes: Vec<u8> = data.iter().flat_map(|f| f.to_le_bytes()).collect();
        let length = bytes.len();
        let buffer = self.buffer(bytes);
        let view = self.view(buffer, 0, length, None, Some(BufferTarget::VertexData));
        self.accessor(
            view,
            0,
            ComponentType::F32,
            element_type,
            data.len() / element_type.components(),
        )
    }

    /// VEC3 positions with declared min/max, as exporters write them.
    pub fn positions(&mut self, points: &[[f32; 3]]) -> usize {
        let flat: Vec<f32> = points.iter().flatten().copied().collect();
        let accessor = self.floats(&flat, ElementType::Vec3);
        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];
        for point in points {
            for c in 0..3 {
                min[c] = min[c].min(point[c]);
                max[c] = max[c].max(point[c]);
            }
        }
        self.doc.accessors[accessor].min = Some(min.to_vec());
        self.doc.accessors[accessor].max = Some(max.to_vec());
        accessor
    }

    pub fn indices_u16(&mut self, indices: &[u16], target: Option<BufferTarget>) -> usize {
        let bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
        let length = bytes.len();
        let buffer = self.buffer(bytes);
        let view = self.view(buffer, 0, length, None, target);
        self.accessor(view, 0, ComponentType::U16, ElementType::Scalar, indices.len())
    }

    pub fn indices_u8(&mut self, indices: &[u8]) -> usize {
        let buffer = self.buffer(indices.to_vec());
        let view = self.view(buffer, 0, indices.len(), None, Some(BufferTarget::IndexData));
        self.accessor(view, 0, ComponentType::U8, ElementType::Scalar, indices.len())
    }

    pub fn image(&mut self, width: u32, height: u32, rgba: [u8; 4]) -> usize {
        self.doc.images.push(Image {
            pixels: rgba
                .iter()
                .copied()
                .cycle()
                .take((width * height * 4) as usize)
                .collect(),
            width,
            height,
            format: PixelFormat::R8G8B8A8,
        });
        self.doc.images.len() - 1
    }

    pub fn sampler(&mut self, sampler: Sampler) -> usize {
        self.doc.samplers.push(sampler);
        self.doc.samplers.len() - 1
    }

    pub fn texture(&mut self, source: Option<usize>, sampler: Option<usize>) -> usize {
        self.doc.textures.push(Texture { source, sampler });
        self.doc.textures.len() - 1
    }

    pub fn material(&mut self, base_color_factor: [f32; 4], base_color_texture: Option<usize>) -> usize {
        self.doc.materials.push(Material {
            base_color_factor,
            base_color_texture,
        });
        self.doc.materials.len() - 1
    }

    pub fn mesh(&mut self, primitives: Vec<Primitive>) -> usize {
        self.doc.meshes.push(Mesh {
            name: None,
            primitives,
        });
        self.doc.meshes.len() - 1
    }

    pub fn node(&mut self, mesh: Option<usize>, transform: NodeTransform, children: Vec<usize>) -> usize {
        self.doc.nodes.push(Node {
            name: None,
            mesh,
            children,
            transform,
        });
        self.doc.nodes.len() - 1
    }

    /// Adds a scene and makes it the default.
    pub fn scene(&mut self, roots: Vec<usize>) -> usize {
        self.doc.scenes.push(Scene { nodes: roots });
        self.doc.default_scene = Some(self.doc.scenes.len() - 1);
        self.doc.default_scene.unwrap_or_default()
    }

    pub fn build(self) -> SceneDocument {
        self.doc
    }
}

pub fn primitive(attributes: &[(&str, usize)], indices: Option<usize>, material: Option<usize>) -> Primitive {
    Primitive {
        attributes: attributes
            .iter()
            .map(|(semantic, accessor)| (semantic.to_string(), *accessor))
            .collect::<BTreeMap<_, _>>(),
        indices,
        material,
        mode: DrawMode::Triangles,
    }
}

pub const TRIANGLE: [[f32; 3]; 3] = [[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]];

/// One triangle mesh on one root node of the default scene.
pub fn triangle_document() -> SceneDocument {
    let mut builder = DocumentBuilder::new();
    let positions = builder.positions(&TRIANGLE);
    let mesh = builder.mesh(vec![primitive(&[("POSITION", positions)], None, None)]);
    let node = builder.node(Some(mesh), NodeTransform::identity(), vec![]);
    builder.scene(vec![node]);
    builder.build()
}

#[derive(Debug, Clone)]
pub struct RecordedTexture {
    pub label: String,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    pub sampler: SamplerState,
    pub generate_mipmaps: bool,
}

/// A [`Backend`] that keeps what it was asked to create. Handles are indices.
#[derive(Default)]
pub struct RecordingBackend {
    pub buffers: Vec<(String, Vec<u8>)>,
    pub textures: Vec<RecordedTexture>,
}

impl Backend for RecordingBackend {
    type Buffer = usize;
    type Texture = usize;

    fn create_buffer(&mut self, label: &str, contents: &[u8]) -> usize {
        self.buffers.push((label.to_string(), contents.to_vec()));
        self.buffers.len() - 1
    }

    fn create_texture(&mut self, label: &str, upload: &TextureUpload<'_>) -> usize {
        self.textures.push(RecordedTexture {
            label: label.to_string(),
            width: upload.width,
            height: upload.height,
            rgba: upload.rgba.to_vec(),
            sampler: upload.sampler,
            generate_mipmaps: upload.generate_mipmaps,
        });
        self.textures.len() - 1
    }
}
