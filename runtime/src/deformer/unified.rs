//! Unified-mesh builder deformer.
//!
//! Owns the merged geometry and the adapters it was merged from (by
//! handle, never by reference). Initialization and disposal are
//! orchestrated by [`crate::world::MeshWorld`], which also runs the
//! per-frame eligibility propagation; this type carries the builder's
//! state and its verification rules.

use std::sync::Arc;

use meshweave_core::data::GeometryBuffer;
use meshweave_core::MeshError;

use crate::deformer::{DeformerCore, SourceMeshAdapter};
use crate::sink::CullingMode;
use crate::status::StatusHandle;
use crate::world::AdapterHandle;

/// Builds and owns one merged simulation topology, distributing
/// per-frame eligibility to its source adapters.
#[derive(Debug)]
pub struct UnifiedMeshBuilder {
    pub(crate) core: DeformerCore,
    pub(crate) adapters: Vec<AdapterHandle>,
    pub(crate) culling_mode: CullingMode,
    pub(crate) visible: bool,
    pub(crate) calculate: bool,
    /// Per-adapter hash snapshots taken when the builder was wired up.
    child_hashes: Vec<u32>,
    child_version: u32,
}

impl UnifiedMeshBuilder {
    pub(crate) fn new(
        status: StatusHandle,
        geometry: Arc<GeometryBuffer>,
        adapters: Vec<AdapterHandle>,
        culling_mode: CullingMode,
    ) -> Self {
        let mut builder = Self {
            core: DeformerCore::new(status, Some(geometry)),
            adapters,
            culling_mode,
            visible: false,
            calculate: false,
            child_hashes: Vec::new(),
            child_version: 0,
        };
        builder.core.create_verify_data();
        builder
    }

    /// Snapshot the children's verify data. Rebuilding a child
    /// independently of this builder shows up as a hash/version mismatch
    /// afterwards.
    pub(crate) fn snapshot_children(&mut self, adapters: &[&SourceMeshAdapter]) {
        self.child_hashes = adapters.iter().map(|a| a.core.saved_hash).collect();
        self.child_version = adapters
            .iter()
            .map(|a| a.core.saved_version)
            .next()
            .unwrap_or(0);
    }

    /// Pure data verification, given the resolved adapters in
    /// registration order.
    pub(crate) fn verify_with(&self, adapters: &[&SourceMeshAdapter]) -> Result<(), MeshError> {
        self.core.verify(true)?;

        if adapters.is_empty() {
            return Err(MeshError::ChildListEmpty);
        }
        for adapter in adapters {
            adapter.verify()?;
        }

        if self.child_hashes.len() != adapters.len() {
            return Err(MeshError::ChildCountMismatch {
                expected: adapters.len(),
                found: self.child_hashes.len(),
            });
        }
        for (adapter, &snapshot) in adapters.iter().zip(&self.child_hashes) {
            if adapter.core.saved_hash != snapshot {
                return Err(MeshError::ChildHashMismatch);
            }
            if adapter.core.saved_version != self.child_version {
                return Err(MeshError::ChildVersionMismatch);
            }
        }

        let geometry = self.core.geometry.as_ref().ok_or(MeshError::BufferNull)?;
        if geometry.children.len() != adapters.len() {
            return Err(MeshError::ChildCountMismatch {
                expected: geometry.children.len(),
                found: adapters.len(),
            });
        }
        Ok(())
    }

    pub fn culling_mode(&self) -> CullingMode {
        self.culling_mode
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    /// Whether this builder's geometry must be simulated this frame.
    pub fn calculate(&self) -> bool {
        self.calculate
    }

    pub fn adapters(&self) -> &[AdapterHandle] {
        &self.adapters
    }

    pub fn geometry(&self) -> Option<&Arc<GeometryBuffer>> {
        self.core.geometry()
    }

    pub fn particle_offset(&self) -> Option<u32> {
        self.core.particle_offset()
    }

    /// The shared-registry registration, present after a successful init.
    pub fn registration(&self) -> Option<crate::registry::Registration> {
        self.core.registration
    }
}
