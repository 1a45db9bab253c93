//! The consumed solver seam.
//!
//! The external physics solver owns a particle buffer; each registered
//! builder instance reads its unified vertices at the particle offset
//! assigned during registration. The solver is expected to have finished
//! its pass for the frame before write-back runs.

use meshweave_core::math::{UnitQuat, Vec3};

/// Read access to the solver's per-particle output for one frame.
pub trait SimulationView {
    /// Simulated position of a particle.
    fn position(&self, particle_index: u32) -> Vec3;

    /// Simulated orientation of a particle's vertex frame.
    fn rotation(&self, particle_index: u32) -> UnitQuat;
}

/// Plain in-memory particle buffer.
///
/// Hosts with their own solver storage implement [`SimulationView`]
/// directly; this type covers tests and simple embeddings.
#[derive(Debug, Default, Clone)]
pub struct SimulationBuffer {
    pub positions: Vec<Vec3>,
    pub rotations: Vec<UnitQuat>,
}

impl SimulationBuffer {
    pub fn with_len(len: usize) -> Self {
        Self {
            positions: vec![Vec3::zeros(); len],
            rotations: vec![UnitQuat::identity(); len],
        }
    }
}

impl SimulationView for SimulationBuffer {
    fn position(&self, particle_index: u32) -> Vec3 {
        self.positions[particle_index as usize]
    }

    fn rotation(&self, particle_index: u32) -> UnitQuat {
        self.rotations[particle_index as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_view() {
        let mut buffer = SimulationBuffer::with_len(2);
        buffer.positions[1] = Vec3::new(1.0, 2.0, 3.0);
        assert_eq!(buffer.position(1), Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(buffer.rotation(0), UnitQuat::identity());
    }
}
