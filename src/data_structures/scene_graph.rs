//! Node transform resolution and scene bounds.
//!
//! The document stores a forest of nodes, each with a local transform. A node's
//! world matrix is the product of the local matrices on the path from a scene
//! root down to it. [`Traversal`] walks that forest depth-first with an explicit
//! worklist of `(node, parent world matrix)` pairs, so deep hierarchies never
//! grow the call stack, and yields every reachable node exactly once per root.

use cgmath::{EuclideanSpace, InnerSpace, Point3, SquareMatrix};
use log::warn;

use crate::{
    data_structures::{
        document::{ComponentType, ElementType, POSITION, SceneDocument},
        instance::transform_point,
    },
    error::DocumentError,
};

/// A node reached by a traversal together with its resolved world matrix.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NodeVisit {
    pub node: usize,
    pub world: cgmath::Matrix4<f32>,
}

/// Pre-order traversal over a set of root nodes.
///
/// Children are visited in declaration order after their parent. The iterator
/// stops with an error when a child index does not exist.
pub struct Traversal<'a> {
    document: &'a SceneDocument,
    worklist: Vec<(usize, cgmath::Matrix4<f32>)>,
    failed: bool,
}

impl<'a> Traversal<'a> {
    pub fn new(document: &'a SceneDocument, roots: &[usize], parent: cgmath::Matrix4<f32>) -> Self {
        let worklist = roots.iter().rev().map(|&root| (root, parent)).collect();
        Self {
            document,
            worklist,
            failed: false,
        }
    }
}

impl Iterator for Traversal<'_> {
    type Item = Result<NodeVisit, DocumentError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let (index, parent) = self.worklist.pop()?;
        let node = match self.document.node(index, || "scene traversal".to_string()) {
            Ok(node) => node,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };
        let world = parent * node.transform.to_matrix();
        // reversed so that the first child is popped first
        self.worklist
            .extend(node.children.iter().rev().map(|&child| (child, world)));
        Some(Ok(NodeVisit { node: index, world }))
    }
}

/// Traverse the default scene from the identity matrix.
pub fn traverse_default_scene(document: &SceneDocument) -> Traversal<'_> {
    Traversal::new(
        document,
        document.default_scene_roots(),
        cgmath::Matrix4::identity(),
    )
}

/// Invoke `visit` for every node of the default scene with its world matrix.
pub fn for_each_world_matrix(
    document: &SceneDocument,
    mut visit: impl FnMut(usize, &cgmath::Matrix4<f32>),
) -> Result<(), DocumentError> {
    for visited in traverse_default_scene(document) {
        let visited = visited?;
        visit(visited.node, &visited.world);
    }
    Ok(())
}

/// Axis aligned box in world space.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SceneBounds {
    pub min: Point3<f32>,
    pub max: Point3<f32>,
}

impl SceneBounds {
    pub fn from_point(point: Point3<f32>) -> Self {
        Self {
            min: point,
            max: point,
        }
    }

    pub fn extend(&mut self, point: Point3<f32>) {
        self.min = Point3::new(
            self.min.x.min(point.x),
            self.min.y.min(point.y),
            self.min.z.min(point.z),
        );
        self.max = Point3::new(
            self.max.x.max(point.x),
            self.max.y.max(point.y),
            self.max.z.max(point.z),
        );
    }

    pub fn center(&self) -> Point3<f32> {
        Point3::from_vec((self.min.to_vec() + self.max.to_vec()) * 0.5)
    }

    pub fn diagonal(&self) -> cgmath::Vector3<f32> {
        self.max - self.min
    }

    pub fn corners(&self) -> [Point3<f32>; 8] {
        let (a, b) = (self.min, self.max);
        [
            Point3::new(a.x, a.y, a.z),
            Point3::new(b.x, a.y, a.z),
            Point3::new(a.x, b.y, a.z),
            Point3::new(b.x, b.y, a.z),
            Point3::new(a.x, a.y, b.z),
            Point3::new(b.x, a.y, b.z),
            Point3::new(a.x, b.y, b.z),
            Point3::new(b.x, b.y, b.z),
        ]
    }

    /// Length of the diagonal; zero for a single point.
    pub fn extent(&self) -> f32 {
        self.diagonal().magnitude()
    }
}

fn merge(bounds: &mut Option<SceneBounds>, point: Point3<f32>) {
    match bounds {
        Some(bounds) => bounds.extend(point),
        None => *bounds = Some(SceneBounds::from_point(point)),
    }
}

/// Local-space bounds of a position accessor.
///
/// Uses the accessor's declared min/max, and scans float positions when those
/// are missing. Returns `Ok(None)` for accessors that hold no usable positions.
fn position_bounds(
    document: &SceneDocument,
    accessor_index: usize,
) -> Result<Option<SceneBounds>, DocumentError> {
    let accessor = document.accessor(accessor_index, || "POSITION attribute".to_string())?;
    if let (Some(min), Some(max)) = (&accessor.min, &accessor.max) {
        if min.len() >= 3 && max.len() >= 3 {
            return Ok(Some(SceneBounds {
                min: Point3::new(min[0], min[1], min[2]),
                max: Point3::new(max[0], max[1], max[2]),
            }));
        }
    }

    if accessor.component_type != ComponentType::F32 || accessor.element_type != ElementType::Vec3 {
        warn!(
            "position accessor {} is {:?} {:?}, skipping it for the scene bounds",
            accessor_index, accessor.component_type, accessor.element_type
        );
        return Ok(None);
    }
    let (bytes, stride) = document.accessor_bytes(accessor_index)?;
    let mut bounds = None;
    for i in 0..accessor.count {
        let Some(element) = bytes.get(i * stride..i * stride + 12) else {
            break;
        };
        let component = |c: usize| {
            f32::from_le_bytes([
                element[c * 4],
                element[c * 4 + 1],
                element[c * 4 + 2],
                element[c * 4 + 3],
            ])
        };
        merge(&mut bounds, Point3::new(component(0), component(1), component(2)));
    }
    Ok(bounds)
}

/// World-space bounds of every mesh primitive reachable from the default scene.
///
/// `Ok(None)` means there is nothing to bound (no scene, no meshes, or no positions).
pub fn compute_scene_bounds(document: &SceneDocument) -> Result<Option<SceneBounds>, DocumentError> {
    let mut bounds = None;
    for visited in traverse_default_scene(document) {
        let visited = visited?;
        let node = document.node(visited.node, || "scene bounds".to_string())?;
        let Some(mesh_index) = node.mesh else {
            continue;
        };
        let mesh = document.mesh(mesh_index, || format!("node {}", visited.node))?;
        for primitive in &mesh.primitives {
            let Some(&positions) = primitive.attributes.get(POSITION) else {
                continue;
            };
            if let Some(local) = position_bounds(document, positions)? {
                for corner in local.corners() {
                    merge(&mut bounds, transform_point(&visited.world, corner));
                }
            }
        }
    }
    Ok(bounds)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_structures::{
        document::{Node, Scene},
        instance::NodeTransform,
    };

    fn chain(depth: usize) -> SceneDocument {
        let nodes = (0..depth)
            .map(|i| Node {
                children: if i + 1 < depth { vec![i + 1] } else { vec![] },
                transform: NodeTransform::from_translation(cgmath::Vector3::new(1.0, 0.0, 0.0)),
                ..Default::default()
            })
            .collect();
        SceneDocument {
            nodes,
            scenes: vec![Scene { nodes: vec![0] }],
            default_scene: Some(0),
            ..Default::default()
        }
    }

    #[test]
    fn deep_chains_do_not_recurse() {
        let document = chain(100_000);
        let last = traverse_default_scene(&document)
            .last()
            .and_then(Result::ok)
            .map(|visit| visit.world.w.x);
        assert_eq!(last, Some(100_000.0));
    }

    #[test]
    fn dangling_children_stop_the_traversal() {
        let mut document = chain(2);
        document.nodes[1].children.push(7);
        let results: Vec<_> = traverse_default_scene(&document).collect();
        assert_eq!(results.len(), 3);
        assert!(matches!(
            results[2],
            Err(DocumentError::DanglingIndex { kind: "node", index: 7, .. })
        ));
    }
}
