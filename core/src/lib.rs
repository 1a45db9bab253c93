//! # Meshweave Core
//!
//! Data model and author-time pipeline for mesh virtualization:
//!
//! - [`data::GeometryBuffer`] - unified simulation geometry with per-source
//!   child mappings
//! - [`data::SelectionState`] - per-vertex simulation role and selection
//!   extension
//! - [`build`] - the merge/weld/weight pipeline that produces a
//!   [`data::GeometryBuffer`] from authored source meshes
//!
//! Runtime consumption of this data (registries, deformers, write-back)
//! lives in the `meshweave-runtime` crate.

pub mod build;
pub mod data;
pub mod error;
pub mod math;

pub use error::MeshError;

/// Core library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
