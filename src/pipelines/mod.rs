//! Render pipelines.
//!
//! - `forward` holds the forward shading pipeline family, keyed per vertex layout and topology

pub mod forward;
