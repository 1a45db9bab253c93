//! Deformer kinds and their shared lifecycle.
//!
//! The two deformer kinds are independent structs sharing one state core:
//!
//! - [`UnifiedMeshBuilder`] owns the merged geometry, registers it with
//!   the shared registry, and propagates per-frame eligibility to its
//!   adapters.
//! - [`SourceMeshAdapter`] consumes simulated output for the slice of
//!   unified vertices relevant to one source mesh and writes it back to
//!   its visual sink.
//!
//! Shared lifecycle logic (init gating, verification, verify-data
//! snapshots) lives on [`DeformerCore`] as plain functions; there is no
//! inheritance and no dynamic dispatch between the kinds.

mod source;
mod unified;

pub use source::{DirtyFlags, RecalculateMode, SourceMeshAdapter};
pub use unified::UnifiedMeshBuilder;

use std::sync::Arc;

use meshweave_core::data::{ChildMapping, GeometryBuffer};
use meshweave_core::math::{Vec3, Vec4};
use meshweave_core::MeshError;

use crate::registry::Registration;
use crate::solver::SimulationView;
use crate::status::StatusHandle;

/// State shared by every deformer kind.
#[derive(Debug)]
pub struct DeformerCore {
    pub(crate) geometry: Option<Arc<GeometryBuffer>>,
    /// Content-hash snapshot taken by [`create_verify_data`]; zero until
    /// then.
    pub(crate) saved_hash: u32,
    /// Format-version snapshot; zero until snapshotted.
    pub(crate) saved_version: u32,
    pub(crate) status: StatusHandle,
    pub(crate) registration: Option<Registration>,
}

impl DeformerCore {
    pub(crate) fn new(status: StatusHandle, geometry: Option<Arc<GeometryBuffer>>) -> Self {
        Self {
            geometry,
            saved_hash: 0,
            saved_version: 0,
            status,
            registration: None,
        }
    }

    /// Snapshot the current geometry hash and version into the persisted
    /// fields. Later divergence between snapshot and geometry surfaces as
    /// a verification error instead of silently simulating stale data.
    pub(crate) fn create_verify_data(&mut self) {
        match &self.geometry {
            Some(g) => {
                self.saved_hash = g.content_hash;
                self.saved_version = g.format_version;
            }
            None => {
                self.saved_hash = 0;
                self.saved_version = 0;
            }
        }
    }

    /// The shared verification every kind starts with: snapshot fields
    /// non-zero, geometry present and valid, target present.
    pub(crate) fn verify(&self, has_target: bool) -> Result<(), MeshError> {
        if self.saved_version == 0 {
            return Err(MeshError::EmptyData);
        }
        if self.saved_hash == 0 {
            return Err(MeshError::InvalidContentHash);
        }
        let geometry = self.geometry.as_ref().ok_or(MeshError::BufferNull)?;
        if !has_target {
            return Err(MeshError::TargetSinkNull);
        }
        geometry.verify()
    }

    pub fn geometry(&self) -> Option<&Arc<GeometryBuffer>> {
        self.geometry.as_ref()
    }

    pub fn status(&self) -> StatusHandle {
        self.status
    }

    pub fn particle_offset(&self) -> Option<u32> {
        self.registration.map(|r| r.particle_offset)
    }
}

/// Evaluated simulated pose of one source mesh.
#[derive(Debug, Default)]
pub(crate) struct SkinnedVertices {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
}

/// Apply a child mapping to the solver output: every source vertex is the
/// weighted sum of its unified parents' simulated frames applied to the
/// stored local pose.
pub(crate) fn skin_child_vertices(
    mapping: &ChildMapping,
    particle_offset: u32,
    sim: &dyn SimulationView,
    want_normals: bool,
    want_tangents: bool,
) -> SkinnedVertices {
    let count = mapping.vertex_count as usize;
    let mut out = SkinnedVertices {
        positions: Vec::with_capacity(count),
        normals: if want_normals {
            Vec::with_capacity(count)
        } else {
            Vec::new()
        },
        tangents: if want_tangents {
            Vec::with_capacity(count)
        } else {
            Vec::new()
        },
    };

    for vertex in 0..mapping.vertex_count {
        let mut position = Vec3::zeros();
        let mut normal = Vec3::zeros();
        let mut tangent = Vec3::zeros();
        for vw in mapping.vertex_weights_of(vertex) {
            let particle = particle_offset + vw.parent_index;
            let rotation = sim.rotation(particle);
            position += (sim.position(particle) + rotation * vw.local_pos) * vw.weight;
            if want_normals {
                normal += (rotation * vw.local_nor) * vw.weight;
            }
            if want_tangents {
                tangent += (rotation * vw.local_tan) * vw.weight;
            }
        }
        out.positions.push(position);
        if want_normals {
            out.normals
                .push(normal.try_normalize(1e-9).unwrap_or_else(Vec3::z));
        }
        if want_tangents {
            let t = tangent.try_normalize(1e-9).unwrap_or_else(Vec3::x);
            // Tangent space is kept left-handed throughout the pipeline.
            out.tangents.push(Vec4::new(t.x, t.y, t.z, -1.0));
        }
    }
    out
}
