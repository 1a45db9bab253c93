//! World orchestration: arenas, wiring, and the per-frame tick.
//!
//! All deformers live in flat arenas owned by [`MeshWorld`] and refer to
//! each other by handle. The world drives the frame in the contract
//! order: the external solver has already written its pass, then runtime
//! verification, eligibility propagation, write decisions, and finally
//! write-back. Everything is synchronous inside the tick.

use std::sync::Arc;

use meshweave_core::data::GeometryBuffer;
use meshweave_core::MeshError;

use crate::deformer::{SourceMeshAdapter, UnifiedMeshBuilder};
use crate::registry::SharedGeometryRegistry;
use crate::sink::{CullingMode, VisualSink};
use crate::solver::SimulationView;
use crate::status::{ActivationGraph, LifecycleState};

/// Handle to an adapter in the world arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AdapterHandle(pub(crate) u32);

impl AdapterHandle {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a builder in the world arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BuilderHandle(pub(crate) u32);

impl BuilderHandle {
    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

/// Owns every deformer, the shared registry, and the activation graph.
#[derive(Default)]
pub struct MeshWorld {
    registry: SharedGeometryRegistry,
    graph: ActivationGraph,
    adapters: Vec<SourceMeshAdapter>,
    builders: Vec<UnifiedMeshBuilder>,
    /// Host runs delayed (one-frame-latent) updates; leaving a reset
    /// cull while delayed forces a one-write skip.
    delayed_update: bool,
}

impl MeshWorld {
    pub fn new() -> Self {
        Self::default()
    }

    // ---- construction -----------------------------------------------------

    /// Add one source adapter over `geometry`'s child mapping
    /// `child_index`, writing into `sink`.
    pub fn add_adapter(
        &mut self,
        geometry: Arc<GeometryBuffer>,
        child_index: u32,
        sink: Box<dyn VisualSink>,
    ) -> AdapterHandle {
        let status = self.graph.insert();
        self.adapters
            .push(SourceMeshAdapter::new(status, geometry, child_index, sink));
        AdapterHandle((self.adapters.len() - 1) as u32)
    }

    /// Add a builder over its merged geometry and the adapters it was
    /// merged from, in child-mapping order. Links the activation graph
    /// (builder as parent) and snapshots the children's verify data.
    pub fn add_builder(
        &mut self,
        geometry: Arc<GeometryBuffer>,
        adapters: Vec<AdapterHandle>,
        culling_mode: CullingMode,
    ) -> BuilderHandle {
        let status = self.graph.insert();
        let handle = BuilderHandle(self.builders.len() as u32);

        for &ah in &adapters {
            let adapter = &mut self.adapters[ah.index()];
            adapter.owner = Some(handle);
            self.graph.link(status, adapter.core.status());
        }

        let mut builder = UnifiedMeshBuilder::new(status, geometry, adapters, culling_mode);
        let refs: Vec<&SourceMeshAdapter> = builder
            .adapters
            .iter()
            .map(|&ah| &self.adapters[ah.index()])
            .collect();
        builder.snapshot_children(&refs);
        self.builders.push(builder);
        handle
    }

    // ---- lifecycle --------------------------------------------------------

    /// Initialize a builder and its adapters, register the shared
    /// geometry, and enable the whole group. Idempotent: calling again
    /// while initialized is a no-op.
    ///
    /// On any verification failure the builder lands in the error state
    /// without registering anything, and the error is returned.
    pub fn init_builder(&mut self, handle: BuilderHandle) -> Result<(), MeshError> {
        let status = self.builders[handle.index()].core.status();
        if self.graph.is_init_started(status) {
            return Ok(());
        }
        self.graph.mark_init_start(status);

        let adapter_handles = self.builders[handle.index()].adapters.clone();
        for &ah in &adapter_handles {
            self.adapters[ah.index()].init(&mut self.graph);
        }

        let refs: Vec<&SourceMeshAdapter> = adapter_handles
            .iter()
            .map(|&ah| &self.adapters[ah.index()])
            .collect();
        if let Err(e) = self.builders[handle.index()].verify_with(&refs) {
            log::warn!("builder init failed: {e}");
            self.graph.mark_init_error(status);
            return Err(e);
        }

        let geometry = self.builders[handle.index()]
            .core
            .geometry()
            .cloned()
            .ok_or(MeshError::BufferNull)?;
        let registration = match self.registry.register(&geometry) {
            Ok(r) => r,
            Err(e) => {
                self.graph.mark_init_error(status);
                return Err(e);
            }
        };
        self.builders[handle.index()].core.registration = Some(registration);
        self.graph.mark_init_complete(status);

        self.graph.set_enabled(status, true);
        for &ah in &adapter_handles {
            let adapter_status = self.adapters[ah.index()].core.status();
            self.graph.set_enabled(adapter_status, true);
        }
        self.graph.update(status);
        log::info!(
            "builder initialized: {} adapters, first registrant: {}",
            adapter_handles.len(),
            registration.is_first
        );
        Ok(())
    }

    /// Tear a builder group down: unregister shared geometry, restore
    /// every sink to its authored copy, mark everything disposed. Safe to
    /// call repeatedly.
    pub fn dispose_builder(&mut self, handle: BuilderHandle) {
        if let Some(registration) = self.builders[handle.index()].core.registration.take() {
            self.registry.unregister(registration.handle);
        }
        let adapter_handles = self.builders[handle.index()].adapters.clone();
        for &ah in &adapter_handles {
            self.adapters[ah.index()].dispose(&mut self.graph);
        }
        let status = self.builders[handle.index()].core.status();
        self.graph.mark_disposed(status);
        self.graph.update(status);
    }

    /// Host enable/disable of the builder (e.g. the component toggles).
    pub fn set_builder_enabled(&mut self, handle: BuilderHandle, enabled: bool) {
        let status = self.builders[handle.index()].core.status();
        if self.graph.set_enabled(status, enabled) {
            self.graph.update(status);
        }
    }

    /// Host enable/disable of one adapter.
    pub fn set_adapter_enabled(&mut self, handle: AdapterHandle, enabled: bool) {
        let status = self.adapters[handle.index()].core.status();
        if self.graph.set_enabled(status, enabled) {
            self.graph.update(status);
        }
    }

    pub fn set_culling_mode(&mut self, handle: BuilderHandle, mode: CullingMode) {
        self.builders[handle.index()].culling_mode = mode;
    }

    /// Whether the host runs one-frame-latent (delayed) simulation
    /// updates.
    pub fn set_delayed_update(&mut self, delayed: bool) {
        self.delayed_update = delayed;
    }

    /// Reassign an adapter's geometry, e.g. after an asset rebuild. The
    /// owning builder's child snapshot now disagrees, which surfaces as a
    /// blocking hash mismatch instead of silently simulating stale
    /// mappings.
    pub fn replace_adapter_geometry(
        &mut self,
        handle: AdapterHandle,
        geometry: Arc<GeometryBuffer>,
    ) {
        self.adapters[handle.index()].set_geometry(geometry);
    }

    // ---- per-frame --------------------------------------------------------

    /// Run one frame: runtime verification, eligibility propagation,
    /// write decisions, write-back. The solver must have completed its
    /// pass for this frame before the call.
    pub fn tick(&mut self, sim: &dyn SimulationView) {
        self.monitor_runtime_errors();
        self.update_culling();

        let MeshWorld {
            adapters,
            builders,
            graph,
            ..
        } = self;

        // Write decisions for every adapter, then write-back, strictly in
        // that order.
        for adapter in adapters.iter_mut() {
            let owner_active = adapter
                .owner
                .map(|bh| graph.is_active(builders[bh.index()].core.status()))
                .unwrap_or(false);
            adapter.mesh_calculation(graph, owner_active);
        }
        for adapter in adapters.iter_mut() {
            let offset = adapter
                .owner
                .and_then(|bh| builders[bh.index()].particle_offset())
                .unwrap_or(0);
            adapter.write_back(sim, offset);
        }
    }

    /// Re-verify initialized builders; a failure parks the group in the
    /// runtime-error state until the data is fixed, and recovery clears
    /// it. Erroring components stop contributing but never write garbage.
    fn monitor_runtime_errors(&mut self) {
        let mut updates = Vec::new();
        for builder in &self.builders {
            let status = builder.core.status();
            if !self.graph.is_init_success(status) {
                continue;
            }
            let refs: Vec<&SourceMeshAdapter> = builder
                .adapters
                .iter()
                .map(|&ah| &self.adapters[ah.index()])
                .collect();
            let error = builder.verify_with(&refs).is_err();
            updates.push((status, error));
        }
        for (status, error) in updates {
            if self.graph.set_runtime_error(status, error) {
                self.graph.update(status);
            }
        }
    }

    /// Propagate culling and visibility between each builder and its
    /// adapters.
    ///
    /// A builder is visible when culling is off or any of its sinks is
    /// visible; it must calculate exactly when visible (or unconditionally
    /// with culling off). An adapter's own eligibility follows its sink
    /// under culling; leaving a reset cull in delayed-update mode arms a
    /// one-shot write skip so the first simulated frame after the reset
    /// is not stale.
    fn update_culling(&mut self) {
        let delayed = self.delayed_update;
        let MeshWorld {
            adapters, builders, ..
        } = self;

        for builder in builders.iter_mut() {
            let mode = builder.culling_mode;
            let culling_off = mode == CullingMode::Off;
            let mut any_sink_visible = false;

            for &ah in &builder.adapters {
                let adapter = &mut adapters[ah.index()];
                adapter.cull_mode = mode;
                let sink_visible = adapter.sink.is_visible();
                if sink_visible {
                    any_sink_visible = true;
                }
                adapter.visible = culling_off || sink_visible;
                let calculate = culling_off || sink_visible;
                if adapter.calculate != calculate {
                    adapter.calculate = calculate;
                    if calculate && delayed && mode == CullingMode::Reset {
                        adapter.write_skip = true;
                    }
                }
            }

            builder.visible = culling_off || any_sink_visible;
            builder.calculate = culling_off || builder.visible;
        }
    }

    // ---- queries ----------------------------------------------------------

    pub fn registry(&self) -> &SharedGeometryRegistry {
        &self.registry
    }

    pub fn adapter(&self, handle: AdapterHandle) -> &SourceMeshAdapter {
        &self.adapters[handle.index()]
    }

    pub fn adapter_mut(&mut self, handle: AdapterHandle) -> &mut SourceMeshAdapter {
        &mut self.adapters[handle.index()]
    }

    pub fn builder(&self, handle: BuilderHandle) -> &UnifiedMeshBuilder {
        &self.builders[handle.index()]
    }

    pub fn builder_state(&self, handle: BuilderHandle) -> LifecycleState {
        self.graph.state(self.builders[handle.index()].core.status())
    }

    pub fn adapter_state(&self, handle: AdapterHandle) -> LifecycleState {
        self.graph.state(self.adapters[handle.index()].core.status())
    }

    pub fn verify_builder(&self, handle: BuilderHandle) -> Result<(), MeshError> {
        let builder = &self.builders[handle.index()];
        let refs: Vec<&SourceMeshAdapter> = builder
            .adapters
            .iter()
            .map(|&ah| &self.adapters[ah.index()])
            .collect();
        builder.verify_with(&refs)
    }
}
