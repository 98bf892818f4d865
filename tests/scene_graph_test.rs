use cgmath::{EuclideanSpace, InnerSpace, Point3, SquareMatrix, Vector3};
use gltf_viewer::data_structures::{
    document::ElementType,
    instance::{NodeTransform, transform_point},
    scene_graph::{Traversal, compute_scene_bounds, for_each_world_matrix, traverse_default_scene},
};

use crate::common::test_utils::{DocumentBuilder, TRIANGLE, primitive};

mod common;

fn close(a: Point3<f32>, b: Point3<f32>) -> bool {
    (a - b).magnitude() < 1e-4
}

#[test]
fn world_matrix_is_the_product_along_the_path() {
    let mut builder = DocumentBuilder::new();
    let leaf = builder.node(
        None,
        NodeTransform::from_translation(Vector3::new(0.0, 0.0, 3.0)),
        vec![],
    );
    let middle = builder.node(
        None,
        NodeTransform::from_gltf_trs([0.0, 2.0, 0.0], [0.0, 0.0, 0.0, 1.0], [2.0, 2.0, 2.0]),
        vec![leaf],
    );
    let root = builder.node(
        None,
        NodeTransform::from_translation(Vector3::new(1.0, 0.0, 0.0)),
        vec![middle],
    );
    builder.scene(vec![root]);
    let doc = builder.build();

    let mut worlds = Vec::new();
    for_each_world_matrix(&doc, |node, world| worlds.push((node, *world))).unwrap();

    let expected = doc.nodes[root].transform.to_matrix()
        * doc.nodes[middle].transform.to_matrix()
        * doc.nodes[leaf].transform.to_matrix();
    let (node, world) = worlds[2];
    assert_eq!(node, leaf);
    assert_eq!(world, expected);
    // translate (1,0,0), then (0,2,0) scaled by 2 applied to (0,0,3)
    assert!(close(
        transform_point(&world, Point3::origin()),
        Point3::new(1.0, 2.0, 6.0)
    ));
}

#[test]
fn translation_and_scale_move_a_point() {
    let transform = NodeTransform::from_gltf_trs([1.0, 0.0, 0.0], [0.0, 0.0, 0.0, 1.0], [2.0, 2.0, 2.0]);
    let moved = transform_point(&transform.to_matrix(), Point3::new(1.0, 0.0, 0.0));
    assert!(close(moved, Point3::new(3.0, 0.0, 0.0)), "{moved:?}");
}

#[test]
fn explicit_matrices_are_column_major() {
    let transform = NodeTransform::from([
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [5.0, 6.0, 7.0, 1.0],
    ]);
    let moved = transform_point(&transform.to_matrix(), Point3::origin());
    assert!(close(moved, Point3::new(5.0, 6.0, 7.0)));
}

#[test]
fn traversal_is_pre_order_in_declaration_order() {
    let mut builder = DocumentBuilder::new();
    // 0 -> [1 -> [3], 2], 4
    let n3 = builder.node(None, NodeTransform::identity(), vec![]);
    let n1 = builder.node(None, NodeTransform::identity(), vec![n3]);
    let n2 = builder.node(None, NodeTransform::identity(), vec![]);
    let n0 = builder.node(None, NodeTransform::identity(), vec![n1, n2]);
    let n4 = builder.node(None, NodeTransform::identity(), vec![]);
    builder.scene(vec![n0, n4]);
    let doc = builder.build();

    let order: Vec<usize> = traverse_default_scene(&doc)
        .map(|visit| visit.unwrap().node)
        .collect();
    assert_eq!(order, vec![n0, n1, n3, n2, n4]);
}

#[test]
fn traversal_from_explicit_roots_applies_the_parent_matrix() {
    let mut builder = DocumentBuilder::new();
    let node = builder.node(None, NodeTransform::identity(), vec![]);
    let doc = builder.build();

    let parent = cgmath::Matrix4::from_translation(Vector3::new(0.0, 4.0, 0.0));
    let visits: Vec<_> = Traversal::new(&doc, &[node], parent)
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(visits.len(), 1);
    assert_eq!(visits[0].world, parent);
}

#[test]
fn document_without_default_scene_visits_nothing() {
    let mut builder = DocumentBuilder::new();
    builder.node(None, NodeTransform::identity(), vec![]);
    let doc = builder.build();
    assert_eq!(traverse_default_scene(&doc).count(), 0);
    assert_eq!(compute_scene_bounds(&doc).unwrap(), None);
}

#[test]
fn bounds_cover_transformed_geometry() {
    let mut builder = DocumentBuilder::new();
    let positions = builder.positions(&TRIANGLE);
    let mesh = builder.mesh(vec![primitive(&[("POSITION", positions)], None, None)]);
    let a = builder.node(Some(mesh), NodeTransform::identity(), vec![]);
    let b = builder.node(
        Some(mesh),
        NodeTransform::from_translation(Vector3::new(10.0, 0.0, -2.0)),
        vec![],
    );
    builder.scene(vec![a, b]);
    let doc = builder.build();

    let bounds = compute_scene_bounds(&doc).unwrap().unwrap();
    assert!(close(bounds.min, Point3::new(0.0, 0.0, -2.0)));
    assert!(close(bounds.max, Point3::new(11.0, 1.0, 0.0)));
}

#[test]
fn bounds_scan_positions_without_min_max() {
    let mut builder = DocumentBuilder::new();
    let positions = builder.floats(
        &[-1.0, 0.0, 0.0, 2.0, 3.0, 0.0, 0.0, 0.0, 5.0],
        ElementType::Vec3,
    );
    let mesh = builder.mesh(vec![primitive(&[("POSITION", positions)], None, None)]);
    let node = builder.node(Some(mesh), NodeTransform::identity(), vec![]);
    builder.scene(vec![node]);
    let doc = builder.build();

    let bounds = compute_scene_bounds(&doc).unwrap().unwrap();
    assert!(close(bounds.min, Point3::new(-1.0, 0.0, 0.0)));
    assert!(close(bounds.max, Point3::new(2.0, 3.0, 5.0)));
}

#[test]
fn identity_scene_world_matrix_is_identity() {
    let doc = common::test_utils::triangle_document();
    let visit = traverse_default_scene(&doc).next().unwrap().unwrap();
    assert_eq!(visit.world, cgmath::Matrix4::identity());
}
