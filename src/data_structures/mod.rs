//! Scene data: the in-memory document, node transforms, scene traversal and
//! GPU textures.
//!
//! - `document` is the glTF-shaped scene description everything else reads
//! - `instance` holds node transforms and the matrix helpers built on them
//! - `scene_graph` walks node hierarchies and computes world matrices and bounds
//! - `texture` is the GPU texture wrapper

pub mod document;
pub mod instance;
pub mod scene_graph;
pub mod texture;
