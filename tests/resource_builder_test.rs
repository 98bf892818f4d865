use gltf_viewer::{
    data_structures::{
        document::{BufferTarget, ComponentType, DrawMode, ElementType, MinFilter, Sampler},
        instance::NodeTransform,
    },
    error::DocumentError,
    resources::{
        gpu::{BindingRange, GpuResources, IndexType},
        sampler::{FilterMode, SamplerState},
    },
};

use crate::common::test_utils::{DocumentBuilder, RecordingBackend, TRIANGLE, primitive};

mod common;

#[test]
fn binding_sets_are_grouped_per_mesh() {
    let mut builder = DocumentBuilder::new();
    let positions = builder.positions(&TRIANGLE);
    let p = || primitive(&[("POSITION", positions)], None, None);
    builder.mesh(vec![p(), p()]);
    builder.mesh(vec![]);
    builder.mesh(vec![p(), p(), p()]);
    let doc = builder.build();

    let mut backend = RecordingBackend::default();
    let mut resources = GpuResources::new(&mut backend);
    let buffers = resources.build_buffers(&doc, &mut backend);
    let (handles, ranges) = resources
        .build_primitive_bindings(&doc, &buffers, &mut backend)
        .unwrap();

    assert_eq!(handles.len(), 5);
    assert_eq!(
        ranges,
        vec![
            BindingRange { begin: 0, count: 2 },
            BindingRange { begin: 2, count: 0 },
            BindingRange { begin: 2, count: 3 },
        ]
    );
    assert_eq!(resources.mesh_range(1).unwrap().handles().count(), 0);
    assert_eq!(resources.primitive_binding(2, 1), Some(handles[3]));
    assert_eq!(resources.primitive_binding(2, 3), None);
}

#[test]
fn interleaved_attributes_keep_offsets_and_stride() {
    let mut builder = DocumentBuilder::new();
    let buffer = builder.buffer(vec![0; 104]);
    let view = builder.view(buffer, 8, 96, Some(32), Some(BufferTarget::VertexData));
    let position = builder.accessor(view, 0, ComponentType::F32, ElementType::Vec3, 3);
    let normal = builder.accessor(view, 12, ComponentType::F32, ElementType::Vec3, 3);
    let uv = builder.accessor(view, 24, ComponentType::F32, ElementType::Vec2, 3);
    let color = builder.accessor(view, 24, ComponentType::F32, ElementType::Vec2, 3);
    builder.mesh(vec![primitive(
        &[
            ("POSITION", position),
            ("NORMAL", normal),
            ("TEXCOORD_0", uv),
            ("COLOR_0", color),
        ],
        None,
        None,
    )]);
    let doc = builder.build();

    let mut backend = RecordingBackend::default();
    let resources = GpuResources::build(&doc, &SamplerState::default(), &mut backend).unwrap();
    let binding = resources.binding(resources.primitive_binding(0, 0).unwrap());

    let offsets: Vec<_> = binding
        .attributes
        .iter()
        .map(|a| a.map(|a| (a.offset, a.stride, a.count)))
        .collect();
    assert_eq!(
        offsets,
        vec![Some((8, 32, 3)), Some((20, 32, 3)), Some((32, 32, 3))]
    );
    let uv = binding.attributes[2].unwrap();
    assert_eq!(uv.format.element_type, ElementType::Vec2);
    assert_eq!(uv.format.component_type, ComponentType::F32);
    assert_eq!(*resources.buffer(uv.buffer), 0);
    assert_eq!(binding.index, None);
    // first attribute by semantic name is COLOR_0
    assert_eq!(binding.array_count, 3);
    assert_eq!(binding.mode, DrawMode::Triangles);
}

#[test]
fn missing_slots_stay_unbound() {
    let doc = common::test_utils::triangle_document();
    let mut backend = RecordingBackend::default();
    let resources = GpuResources::build(&doc, &SamplerState::default(), &mut backend).unwrap();
    let binding = &resources.bindings()[0];
    assert!(binding.attributes[0].is_some());
    assert!(binding.attributes[1].is_none());
    assert!(binding.attributes[2].is_none());
}

fn indexed_document(target: Option<BufferTarget>) -> gltf_viewer::data_structures::document::SceneDocument {
    let mut builder = DocumentBuilder::new();
    let positions = builder.positions(&TRIANGLE);
    let indices = builder.indices_u16(&[0, 1, 2], target);
    let mesh = builder.mesh(vec![primitive(&[("POSITION", positions)], Some(indices), None)]);
    let node = builder.node(Some(mesh), NodeTransform::identity(), vec![]);
    builder.scene(vec![node]);
    builder.build()
}

#[test]
fn index_view_declared_as_vertex_data_fails() {
    let doc = indexed_document(Some(BufferTarget::VertexData));
    let mut backend = RecordingBackend::default();
    let result = GpuResources::build(&doc, &SamplerState::default(), &mut backend);
    assert!(matches!(
        result,
        Err(DocumentError::IndexBufferRole { accessor: 1, view: 1 })
    ));
}

#[test]
fn index_view_without_target_is_accepted() {
    for target in [None, Some(BufferTarget::IndexData)] {
        let doc = indexed_document(target);
        let mut backend = RecordingBackend::default();
        let resources = GpuResources::build(&doc, &SamplerState::default(), &mut backend).unwrap();
        let index = resources.bindings()[0].index.unwrap();
        assert_eq!(index.count, 3);
        assert_eq!(index.index_type, IndexType::U16);
        assert_eq!(*resources.buffer(index.buffer), 1);
    }
}

#[test]
fn u8_indices_are_widened_into_an_extra_buffer() {
    let mut builder = DocumentBuilder::new();
    let positions = builder.positions(&TRIANGLE);
    let indices = builder.indices_u8(&[2, 1, 0]);
    builder.mesh(vec![primitive(&[("POSITION", positions)], Some(indices), None)]);
    let doc = builder.build();

    let mut backend = RecordingBackend::default();
    let resources = GpuResources::build(&doc, &SamplerState::default(), &mut backend).unwrap();

    // the two source buffers keep their handles, the widened one comes after
    assert_eq!(resources.buffer_count(), 3);
    let index = resources.bindings()[0].index.unwrap();
    assert_eq!(index.index_type, IndexType::U16);
    assert_eq!(index.offset, 0);
    assert_eq!(index.buffer.index(), 2);
    let (_, widened) = &backend.buffers[*resources.buffer(index.buffer)];
    assert_eq!(widened, &vec![2, 0, 1, 0, 0, 0]);
}

#[test]
fn vector_index_accessor_is_rejected() {
    let mut builder = DocumentBuilder::new();
    let positions = builder.positions(&TRIANGLE);
    builder.mesh(vec![primitive(&[("POSITION", positions)], Some(positions), None)]);
    let mut doc = builder.build();
    doc.buffer_views[0].target = None;

    let mut backend = RecordingBackend::default();
    assert!(matches!(
        GpuResources::build(&doc, &SamplerState::default(), &mut backend),
        Err(DocumentError::InvalidIndexAccessor { accessor: 0, .. })
    ));
}

#[test]
fn counts_beyond_u32_fail_the_build() {
    let mut builder = DocumentBuilder::new();
    let positions = builder.positions(&TRIANGLE);
    builder.mesh(vec![primitive(&[("POSITION", positions)], None, None)]);
    let mut doc = builder.build();
    let count = u32::MAX as usize + 1;
    doc.accessors[positions].count = count;

    let mut backend = RecordingBackend::default();
    assert_eq!(
        GpuResources::build(&doc, &SamplerState::default(), &mut backend).err(),
        Some(DocumentError::CountTooLarge {
            accessor: positions,
            count,
        })
    );
}

#[test]
fn textures_use_the_first_referencing_sampler() {
    let mut builder = DocumentBuilder::new();
    let image = builder.image(4, 4, [255, 0, 0, 255]);
    let unused = builder.image(1, 1, [0, 0, 255, 255]);
    let unsampled = builder.image(1, 1, [0, 255, 0, 255]);
    let mipmapped = builder.sampler(Sampler {
        min_filter: Some(MinFilter::LinearMipmapLinear),
        ..Default::default()
    });
    let nearest = builder.sampler(Sampler {
        min_filter: Some(MinFilter::Nearest),
        ..Default::default()
    });
    builder.texture(Some(image), Some(mipmapped));
    builder.texture(Some(image), Some(nearest));
    builder.texture(Some(unsampled), None);
    let doc = builder.build();

    let mut backend = RecordingBackend::default();
    let resources = GpuResources::build(&doc, &SamplerState::default(), &mut backend).unwrap();

    // white fallback plus one texture per referenced image
    assert_eq!(resources.texture_count(), 3);
    assert_eq!(resources.white_texture().index(), 0);
    assert_eq!(backend.textures[0].rgba, vec![255; 4]);
    assert_eq!(resources.image_texture(unused), None);

    let uploaded = &backend.textures[*resources.texture(resources.image_texture(image).unwrap())];
    assert_eq!((uploaded.width, uploaded.height), (4, 4));
    assert!(uploaded.generate_mipmaps);
    assert_eq!(uploaded.sampler.mipmap_filter, Some(FilterMode::Linear));

    let plain = &backend.textures[*resources.texture(resources.image_texture(unsampled).unwrap())];
    assert!(!plain.generate_mipmaps);
    assert_eq!(plain.sampler, SamplerState::default());
    assert_eq!(plain.rgba, vec![0, 255, 0, 255]);
}

#[test]
fn images_without_textures_are_not_uploaded() {
    let mut builder = DocumentBuilder::new();
    let image = builder.image(2, 2, [10, 20, 30, 255]);
    let doc = builder.build();

    let mut backend = RecordingBackend::default();
    let resources = GpuResources::build(&doc, &SamplerState::default(), &mut backend).unwrap();
    assert_eq!(resources.texture_count(), 1);
    assert_eq!(backend.textures.len(), 1);
    assert_eq!(resources.image_texture(image), None);
}

#[test]
fn texture_without_source_fails_the_build() {
    let mut builder = DocumentBuilder::new();
    builder.texture(None, None);
    let doc = builder.build();
    let mut backend = RecordingBackend::default();
    assert!(matches!(
        GpuResources::build(&doc, &SamplerState::default(), &mut backend),
        Err(DocumentError::MissingImage { texture: 0 })
    ));
}
