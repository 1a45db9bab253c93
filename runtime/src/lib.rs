//! # Meshweave Runtime
//!
//! Per-frame machinery that drives visual meshes from one simulated
//! topology:
//!
//! - [`registry::SharedGeometryRegistry`] - content-addressed sharing of
//!   immutable geometry across component instances
//! - [`status::ActivationGraph`] - lifecycle state machine with cascading
//!   enable/visibility propagation over linked deformers
//! - [`deformer`] - the two deformer kinds: unified-mesh builders and
//!   per-source adapters with dirty-tracked write-back
//! - [`world::MeshWorld`] - arenas, wiring, and the per-frame tick
//! - [`sink`] / [`solver`] - the host-facing seams: visual sinks this
//!   crate writes into, and the external solver it reads from
//!
//! Everything runs single-threaded inside one external tick; the solver
//! is assumed to have finished its pass before the tick starts.

pub mod deformer;
pub mod registry;
pub mod sink;
pub mod solver;
pub mod status;
pub mod world;

/// Runtime library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
