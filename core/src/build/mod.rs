//! Author-time merge pipeline.
//!
//! Turns a set of independently authored, independently skinned source
//! meshes into one deduplicated simulation topology:
//!
//! 1. [`source::MeshSource`] - raw per-source vertex/topology input
//! 2. cluster soup - every source vertex seeds a cluster, linked by the
//!    source triangles
//! 3. weld passes - grid-hashed near-point reduction and triangle-link
//!    reduction with a surface-angle gate
//! 4. topology rebuild, bone-weight blending, child-mapping weights
//! 5. a sealed [`crate::data::GeometryBuffer`]
//!
//! Everything here runs offline; nothing is called per frame.

mod cluster;
mod merge;
mod source;
mod topology;
mod weights;
mod weld;

pub use merge::{merge_sources, MergeParams};
pub use source::{MeshSource, SourceBinding, SourceWeight};
