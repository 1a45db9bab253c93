//! Unified geometry data model.
//!
//! This module provides:
//!
//! - [`GeometryBuffer`] / [`ChildMapping`] - the merged simulation topology
//!   and its per-source write-back mappings
//! - [`SelectionState`] and [`extend_selection`] - per-vertex simulation
//!   roles
//! - [`packing`] - the packed index words used by the weight tables
//! - [`content_hash`] - stable content hashing for registry deduplication
//!
//! Serialization of [`GeometryBuffer`] as a versioned binary record is
//! implemented on the type itself (`write_to` / `read_from`).

pub mod content_hash;
pub mod packing;

mod geometry;
mod selection;
mod serialize;

pub use geometry::{ChildMapping, GeometryBuffer, VertexWeight, GEOMETRY_FORMAT_VERSION};
pub use selection::{extend_selection, vertex_links, SelectionState};

pub(crate) use geometry::MAX_UNIFIED_VERTICES;
