//! Per-source write-back adapter.
//!
//! One adapter per source visual mesh. Each frame it decides whether the
//! sink should show simulated or authored vertices, tracks which visual
//! attributes went stale, and flushes them through exactly one of two
//! write paths chosen at init.

use std::sync::Arc;

use meshweave_core::data::GeometryBuffer;
use meshweave_core::MeshError;

use crate::deformer::{skin_child_vertices, DeformerCore};
use crate::sink::{CullingMode, SinkKind, VisualSink, WritePath};
use crate::solver::SimulationView;
use crate::status::{ActivationGraph, StatusHandle};
use crate::world::BuilderHandle;

bitflags::bitflags! {
    /// Visual attributes that must be rewritten to the sink.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DirtyFlags: u32 {
        const POSITION = 1 << 0;
        const NORMAL_TANGENT = 1 << 1;
        const BONE_WEIGHT = 1 << 2;
    }
}

/// Which attributes are recomputed from simulation every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RecalculateMode {
    /// Positions only; authored normals and tangents stay.
    None,
    /// Positions and normals.
    #[default]
    NormalPerFrame,
    /// Positions, normals, and tangents.
    NormalAndTangentPerFrame,
}

impl RecalculateMode {
    fn normal(self) -> bool {
        !matches!(self, Self::None)
    }

    fn tangent(self) -> bool {
        matches!(self, Self::NormalAndTangentPerFrame)
    }
}

/// Writes queued by `mesh_calculation` for the frame's write-back step.
#[derive(Debug, Clone, Copy, Default)]
struct PendingWrites {
    direct: bool,
    direct_normals: bool,
    position: bool,
    normal: bool,
    tangent: bool,
    bone_weight: bool,
}

/// Consumes simulated output for one source mesh and writes it back to
/// the visual sink.
pub struct SourceMeshAdapter {
    pub(crate) core: DeformerCore,
    pub(crate) sink: Box<dyn VisualSink>,
    kind: SinkKind,
    write_path: WritePath,
    recalc_mode: RecalculateMode,
    dirty: DirtyFlags,
    /// Whether the sink currently shows the working copy.
    in_use: bool,
    /// Skip exactly one write after leaving delayed updates on a reset.
    pub(crate) write_skip: bool,
    /// One-shot request to show the authored pose for a frame.
    pending_reset: bool,
    pub(crate) visible: bool,
    pub(crate) calculate: bool,
    pub(crate) cull_mode: CullingMode,
    /// Index of this adapter's child mapping in the owning builder's
    /// geometry.
    pub(crate) child_index: u32,
    pub(crate) owner: Option<BuilderHandle>,
    pending: PendingWrites,
}

impl SourceMeshAdapter {
    pub(crate) fn new(
        status: StatusHandle,
        geometry: Arc<GeometryBuffer>,
        child_index: u32,
        sink: Box<dyn VisualSink>,
    ) -> Self {
        let kind = sink.kind();
        let mut adapter = Self {
            core: DeformerCore::new(status, Some(geometry)),
            sink,
            kind,
            write_path: WritePath::Staged,
            recalc_mode: RecalculateMode::default(),
            dirty: DirtyFlags::empty(),
            in_use: false,
            write_skip: false,
            pending_reset: false,
            visible: false,
            calculate: true,
            cull_mode: CullingMode::Off,
            child_index,
            owner: None,
            pending: PendingWrites::default(),
        };
        adapter.core.create_verify_data();
        adapter
    }

    /// Idempotent init: probes the sink layout to pick the write path,
    /// then verifies. Failure lands the adapter in the error state and it
    /// stops contributing; the sink keeps showing its authored copy.
    pub(crate) fn init(&mut self, graph: &mut ActivationGraph) {
        let status = self.core.status;
        if graph.is_init_started(status) {
            return;
        }
        graph.mark_init_start(status);

        self.write_path = if self.sink.layout().supports_direct_write() {
            WritePath::Direct
        } else {
            WritePath::Staged
        };
        self.in_use = false;

        match self.verify() {
            Ok(()) => {
                log::debug!(
                    "adapter init: child {} via {:?} path",
                    self.child_index,
                    self.write_path
                );
                graph.mark_init_complete(status);
            }
            Err(e) => {
                log::warn!("adapter init failed: {e}");
                graph.mark_init_error(status);
            }
        }
    }

    /// Release sink-side working state. Safe to call repeatedly.
    pub(crate) fn dispose(&mut self, graph: &mut ActivationGraph) {
        if self.in_use {
            self.sink.swap_active_buffer(false);
            self.in_use = false;
        }
        graph.mark_disposed(self.core.status);
    }

    /// Pure data verification for this adapter.
    pub fn verify(&self) -> Result<(), MeshError> {
        self.core.verify(true)?;
        let geometry = self.core.geometry.as_ref().ok_or(MeshError::BufferNull)?;
        let child = geometry
            .children
            .get(self.child_index as usize)
            .ok_or(MeshError::ChildCountMismatch {
                expected: self.child_index as usize + 1,
                found: geometry.children.len(),
            })?;
        let sink_count = self.sink.vertex_count();
        if sink_count != child.vertex_count {
            return Err(MeshError::SinkVertexCountMismatch {
                geometry: child.vertex_count,
                sink: sink_count,
            });
        }
        if sink_count as usize > u16::MAX as usize {
            return Err(MeshError::VertexLimitExceeded(sink_count as usize));
        }
        Ok(())
    }

    /// Per-frame write decision.
    ///
    /// Computes whether the sink should track simulation this frame,
    /// swaps between the authored and working buffers on change, resets
    /// normals once when recomputation turns off, and queues attribute
    /// writes for [`write_back`](Self::write_back).
    pub(crate) fn mesh_calculation(&mut self, graph: &ActivationGraph, owner_active: bool) {
        self.pending = PendingWrites::default();

        let self_active = graph.is_active(self.core.status);
        let mut in_use = owner_active && self_active;

        if !self.calculate && self_active {
            match self.cull_mode {
                // Frozen: no writes, no buffer switch.
                CullingMode::Pause => return,
                // Forced back to the authored pose.
                CullingMode::Reset => in_use = false,
                CullingMode::Off => {}
            }
        }

        if in_use && self.pending_reset {
            in_use = false;
            self.pending_reset = false;
        }

        if in_use && self.write_skip {
            in_use = false;
            self.write_skip = false;
        }

        if in_use != self.in_use {
            self.sink.swap_active_buffer(in_use);
            self.in_use = in_use;
            if in_use {
                self.dirty = DirtyFlags::all();
            }
        }

        if !in_use {
            return;
        }

        let normal = self.recalc_mode.normal();
        let tangent = self.recalc_mode.tangent();

        // Recomputation switched off since the last write: put the
        // authored normals/tangents back once.
        if self.dirty.contains(DirtyFlags::NORMAL_TANGENT) && !normal && !tangent {
            self.sink.restore_authored_normals_tangents();
            self.dirty.remove(DirtyFlags::NORMAL_TANGENT);
        }

        match self.write_path {
            WritePath::Direct => {
                self.pending.direct = true;
                self.pending.direct_normals = normal;
            }
            WritePath::Staged => {
                self.pending.position = true;
                self.pending.normal = normal;
                self.pending.tangent = tangent;
            }
        }
        self.dirty.remove(DirtyFlags::POSITION);

        let is_skinned = self
            .core
            .geometry
            .as_ref()
            .map(|g| g.is_skinned)
            .unwrap_or(false);
        if is_skinned && self.dirty.contains(DirtyFlags::BONE_WEIGHT) {
            // Authored weights do not change with simulation; one write
            // per use transition is enough.
            self.pending.bone_weight = true;
            self.dirty.remove(DirtyFlags::BONE_WEIGHT);
        }
    }

    /// Flush the queued writes through the adapter's write path.
    pub(crate) fn write_back(&mut self, sim: &dyn SimulationView, particle_offset: u32) {
        let pending = std::mem::take(&mut self.pending);
        if !(pending.direct || pending.position || pending.bone_weight) {
            return;
        }
        let Some(geometry) = self.core.geometry.clone() else {
            return;
        };
        let Some(child) = geometry.children.get(self.child_index as usize) else {
            return;
        };

        if pending.direct {
            let skinned = skin_child_vertices(child, particle_offset, sim, true, false);
            let mut floats = Vec::with_capacity(skinned.positions.len() * 6);
            for (p, n) in skinned.positions.iter().zip(skinned.normals.iter()) {
                floats.extend_from_slice(&[p.x, p.y, p.z, n.x, n.y, n.z]);
            }
            self.sink
                .write_vertex_buffer(bytemuck::cast_slice(&floats), pending.direct_normals);
        }

        if pending.position {
            let skinned =
                skin_child_vertices(child, particle_offset, sim, pending.normal, pending.tangent);
            self.sink.write_positions(&skinned.positions);
            if pending.normal || pending.tangent {
                self.sink.write_normals_tangents(
                    pending.normal.then_some(skinned.normals.as_slice()),
                    pending.tangent.then_some(skinned.tangents.as_slice()),
                );
            }
        }

        if pending.bone_weight {
            self.sink
                .write_bone_weights(&child.vertex_info, &child.vertex_weights);
        }
    }

    /// Swap in different geometry (asset rebuilt or reassigned) and
    /// refresh the verify snapshot. An owning builder that snapshotted
    /// the old data will fail verification until it is rewired.
    pub(crate) fn set_geometry(&mut self, geometry: Arc<GeometryBuffer>) {
        self.core.geometry = Some(geometry);
        self.core.create_verify_data();
    }

    /// Show the authored pose for exactly one frame, then resume
    /// tracking simulation. Useful when the host teleports the object
    /// and the in-flight simulated pose is stale.
    pub fn request_authored_reset(&mut self) {
        self.pending_reset = true;
    }

    /// Change which attributes are recomputed per frame. The next frame
    /// re-evaluates the normal/tangent state, restoring authored data if
    /// recomputation went away.
    pub fn set_recalculate_mode(&mut self, mode: RecalculateMode) {
        if self.recalc_mode != mode {
            self.recalc_mode = mode;
            self.dirty.insert(DirtyFlags::NORMAL_TANGENT);
        }
    }

    pub fn kind(&self) -> SinkKind {
        self.kind
    }

    pub fn write_path(&self) -> WritePath {
        self.write_path
    }

    pub fn is_in_use(&self) -> bool {
        self.in_use
    }

    pub fn visible(&self) -> bool {
        self.visible
    }

    pub fn calculate(&self) -> bool {
        self.calculate
    }

    pub fn dirty(&self) -> DirtyFlags {
        self.dirty
    }

    pub fn sink(&self) -> &dyn VisualSink {
        self.sink.as_ref()
    }
}

impl std::fmt::Debug for SourceMeshAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceMeshAdapter")
            .field("child_index", &self.child_index)
            .field("write_path", &self.write_path)
            .field("in_use", &self.in_use)
            .field("visible", &self.visible)
            .field("calculate", &self.calculate)
            .field("dirty", &self.dirty)
            .finish()
    }
}
