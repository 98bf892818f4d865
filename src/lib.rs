//! gltf-viewer
//!
//! A small glTF 2.0 scene viewer. A document is imported into a
//! [`SceneDocument`](data_structures::document::SceneDocument), validated, turned into
//! GPU buffers, textures and per-primitive binding sets, and drawn with a
//! forward pipeline either in a window driven by a trackball or first-person
//! camera, or once into an offscreen target that is saved as a PNG.
//!
//! High-level modules
//! - `camera`: camera pose, projection, scene framing and the two controllers
//! - `capture`: offscreen render, readback and PNG output
//! - `config`: command line parsing and the validated viewer configuration
//! - `context`: wgpu device, queue, pipelines and optional window surface
//! - `data_structures`: the scene document, node transforms, traversal and textures
//! - `error`: document integrity errors
//! - `flow`: the interactive event loop
//! - `pipelines`: the forward render pipeline family
//! - `render`: shader programs, lighting and per-frame draw call composition
//! - `resources`: glTF import, validation and GPU resource building

pub mod camera;
pub mod capture;
pub mod config;
pub mod context;
pub mod data_structures;
pub mod error;
pub mod flow;
pub mod pipelines;
pub mod render;
pub mod resources;
