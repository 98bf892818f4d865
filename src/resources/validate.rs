//! Load-time integrity checks.
//!
//! Everything that would otherwise surface as an out of range index while
//! building GPU resources or drawing is rejected here, once, before the first
//! frame. That includes node graphs that are not forests: a node reachable from
//! itself would make the transform resolver loop forever.

use crate::{data_structures::document::SceneDocument, error::DocumentError};

pub fn validate_document(document: &SceneDocument) -> Result<(), DocumentError> {
    for (index, view) in document.buffer_views.iter().enumerate() {
        let buffer = document.buffer(view.buffer, || format!("buffer view {index}"))?;
        match view.byte_offset.checked_add(view.byte_length) {
            Some(end) if end <= buffer.data.len() => {}
            end => {
                return Err(DocumentError::ViewOutOfBounds {
                    view: index,
                    buffer: view.buffer,
                    start: view.byte_offset,
                    end: end.unwrap_or(usize::MAX),
                    length: buffer.data.len(),
                });
            }
        }
    }

    for (index, accessor) in document.accessors.iter().enumerate() {
        let Some(view_index) = accessor.buffer_view else {
            continue;
        };
        let view = document.buffer_view(view_index, || format!("accessor {index}"))?;
        if accessor.count == 0 {
            continue;
        }
        let stride = crate::data_structures::document::effective_stride(view, accessor);
        let end = stride
            .checked_mul(accessor.count - 1)
            .and_then(|span| span.checked_add(accessor.byte_offset))
            .and_then(|span| span.checked_add(accessor.element_size()));
        match end {
            Some(end) if end <= view.byte_length => {}
            end => {
                return Err(DocumentError::AccessorOutOfBounds {
                    accessor: index,
                    view: view_index,
                    end: end.unwrap_or(usize::MAX),
                    length: view.byte_length,
                });
            }
        }
    }

    for (index, image) in document.images.iter().enumerate() {
        if image.pixels.len() < image.expected_len() {
            return Err(DocumentError::ImageSize {
                image: index,
                actual: image.pixels.len(),
                expected: image.expected_len(),
            });
        }
    }

    for (index, texture) in document.textures.iter().enumerate() {
        let source = texture
            .source
            .ok_or(DocumentError::MissingImage { texture: index })?;
        document.image(source, || format!("texture {index}"))?;
        if let Some(sampler) = texture.sampler {
            document.sampler(sampler, || format!("texture {index}"))?;
        }
    }

    for (index, material) in document.materials.iter().enumerate() {
        if let Some(texture) = material.base_color_texture {
            document.texture(texture, || format!("material {index}"))?;
        }
    }

    for (mesh_index, mesh) in document.meshes.iter().enumerate() {
        for (primitive_index, primitive) in mesh.primitives.iter().enumerate() {
            let owner = || format!("mesh {mesh_index} primitive {primitive_index}");
            for &accessor in primitive.attributes.values() {
                document.accessor(accessor, owner)?;
            }
            if let Some(indices) = primitive.indices {
                document.accessor(indices, owner)?;
            }
            if let Some(material) = primitive.material {
                document.material(material, owner)?;
            }
        }
    }

    for (index, node) in document.nodes.iter().enumerate() {
        if let Some(mesh) = node.mesh {
            document.mesh(mesh, || format!("node {index}"))?;
        }
        for &child in &node.children {
            document.node(child, || format!("node {index}"))?;
        }
    }

    for (index, scene) in document.scenes.iter().enumerate() {
        for &root in &scene.nodes {
            document.node(root, || format!("scene {index}"))?;
        }
    }

    if let Some(index) = document.default_scene {
        if index >= document.scenes.len() {
            return Err(DocumentError::DefaultSceneOutOfRange {
                index,
                len: document.scenes.len(),
            });
        }
    }

    check_acyclic(document)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Iterative three-colour depth-first search over the child edges.
fn check_acyclic(document: &SceneDocument) -> Result<(), DocumentError> {
    let mut marks = vec![Mark::Unvisited; document.nodes.len()];
    // (node, index of the next child to look at)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for start in 0..document.nodes.len() {
        if marks[start] != Mark::Unvisited {
            continue;
        }
        marks[start] = Mark::InProgress;
        stack.push((start, 0));

        while let Some((node, next_child)) = stack.last_mut() {
            let children = &document.nodes[*node].children;
            if let Some(&child) = children.get(*next_child) {
                *next_child += 1;
                match marks[child] {
                    Mark::InProgress => return Err(DocumentError::CyclicNodeGraph { node: child }),
                    Mark::Unvisited => {
                        marks[child] = Mark::InProgress;
                        stack.push((child, 0));
                    }
                    Mark::Done => {}
                }
            } else {
                marks[*node] = Mark::Done;
                stack.pop();
            }
        }
    }
    Ok(())
}
