//! Integrity errors raised while validating or uploading a scene document.
//!
//! All of these are load-time failures: once a document passed validation and
//! its GPU resources were built, per-frame code never produces them.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DocumentError {
    #[error("{owner} references {kind} {index}, but the document only has {len}")]
    DanglingIndex {
        kind: &'static str,
        index: usize,
        len: usize,
        owner: String,
    },

    #[error("accessor {accessor} has no buffer view")]
    AccessorWithoutView { accessor: usize },

    #[error("accessor {accessor} reads {end} bytes into buffer view {view} of length {length}")]
    AccessorOutOfBounds {
        accessor: usize,
        view: usize,
        end: usize,
        length: usize,
    },

    #[error("buffer view {view} spans bytes {start}..{end} of buffer {buffer} with length {length}")]
    ViewOutOfBounds {
        view: usize,
        buffer: usize,
        start: usize,
        end: usize,
        length: usize,
    },

    #[error("accessor {accessor} holds {count} elements, more than a draw can address")]
    CountTooLarge { accessor: usize, count: usize },

    #[error("index accessor {accessor} reads buffer view {view}, which is declared as vertex data")]
    IndexBufferRole { accessor: usize, view: usize },

    #[error("accessor {accessor} cannot be used as an index source ({reason})")]
    InvalidIndexAccessor { accessor: usize, reason: String },

    #[error("texture {texture} has no source image")]
    MissingImage { texture: usize },

    #[error("image {image} holds {actual} bytes, expected {expected}")]
    ImageSize {
        image: usize,
        actual: usize,
        expected: usize,
    },

    #[error("node {node} is reachable from itself")]
    CyclicNodeGraph { node: usize },

    #[error("default scene {index} does not exist, the document has {len} scenes")]
    DefaultSceneOutOfRange { index: usize, len: usize },
}
