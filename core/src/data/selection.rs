//! Per-vertex simulation roles and selection extension.
//!
//! Authoring marks unified vertices as moving, fixed, or unused; the
//! solver consumes the result. [`extend_selection`] grows the used set so
//! that vertices bordering the simulated region keep deforming coherently.

use std::collections::BTreeSet;

use crate::data::geometry::GeometryBuffer;

/// Simulation role of one unified vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SelectionState {
    /// Not part of the simulation.
    #[default]
    Invalid = 0,
    /// Simulated freely.
    Move = 1,
    /// Anchored to the animated pose.
    Fixed = 2,
    /// Derived: follows the simulation but is excluded from rotation-line
    /// computation.
    Extend = 3,
}

impl SelectionState {
    /// Move and Fixed vertices anchor the extension passes.
    pub fn is_anchor(self) -> bool {
        matches!(self, Self::Move | Self::Fixed)
    }
}

/// Undirected vertex adjacency from line and triangle topology.
pub fn vertex_links(vertex_count: u32, lines: &[u32], triangles: &[u32]) -> Vec<BTreeSet<u32>> {
    let mut links = vec![BTreeSet::new(); vertex_count as usize];
    for pair in lines.chunks_exact(2) {
        links[pair[0] as usize].insert(pair[1]);
        links[pair[1] as usize].insert(pair[0]);
    }
    for tri in triangles.chunks_exact(3) {
        for (a, b) in [
            (tri[0], tri[1]),
            (tri[1], tri[2]),
            (tri[2], tri[0]),
        ] {
            links[a as usize].insert(b);
            links[b as usize].insert(a);
        }
    }
    links
}

/// Extend an authored selection for cloth use.
///
/// Two independent, optional passes, both of which only ever promote
/// `Invalid` to `Extend`:
///
/// - `extend_adjacent`: any invalid vertex adjacent (via line/triangle
///   topology) to a Move/Fixed vertex becomes Extend.
/// - `extend_weight`: any invalid vertex that shares a weighted source
///   vertex with a Move/Fixed vertex becomes Extend.
///
/// The passes are idempotent and commute; the input is not modified.
pub fn extend_selection(
    geometry: &GeometryBuffer,
    base: &[SelectionState],
    extend_adjacent: bool,
    extend_weight: bool,
) -> Vec<SelectionState> {
    let mut selection = base.to_vec();

    if extend_adjacent {
        let links = vertex_links(geometry.vertex_count, &geometry.lines, &geometry.triangles);
        for v in 0..geometry.vertex_count as usize {
            if base[v] != SelectionState::Invalid {
                continue;
            }
            if links[v].iter().any(|&n| base[n as usize].is_anchor()) {
                selection[v] = SelectionState::Extend;
            }
        }
    }

    if extend_weight {
        let mut promote = BTreeSet::new();
        for child in &geometry.children {
            for vertex in 0..child.vertex_count {
                let weights = child.vertex_weights_of(vertex);
                let linked = weights
                    .iter()
                    .any(|vw| vw.weight > 0.0 && base[vw.parent_index as usize].is_anchor());
                if !linked {
                    continue;
                }
                for vw in weights {
                    if vw.weight > 0.0 && base[vw.parent_index as usize] == SelectionState::Invalid
                    {
                        promote.insert(vw.parent_index);
                    }
                }
            }
        }
        for v in promote {
            selection[v as usize] = SelectionState::Extend;
        }
    }

    selection
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::geometry::{ChildMapping, VertexWeight};
    use crate::data::packing::pack4_28;
    use crate::math::Vec2;

    /// A line strip 0-1-2-3 with vertex 0 fixed, plus one child mesh whose
    /// single source vertex is weighted to unified vertices 2 and 3.
    fn strip() -> GeometryBuffer {
        let mut g = GeometryBuffer {
            vertex_count: 4,
            bone_count: 1,
            line_count: 3,
            lines: vec![0, 1, 1, 2, 2, 3],
            vertex_info: (0..4).map(|i| pack4_28(1, i)).collect(),
            vertex_weights: (0..4).map(|_| VertexWeight::new(0, 1.0)).collect(),
            uvs: vec![Vec2::zeros(); 4],
            vertex_to_triangle_info: vec![0; 4],
            ..GeometryBuffer::default()
        };
        g.children.push(ChildMapping {
            source_hash: 1,
            vertex_count: 1,
            vertex_info: vec![pack4_28(2, 0)],
            vertex_weights: vec![VertexWeight::new(2, 0.5), VertexWeight::new(3, 0.5)],
            original_parent: vec![2],
        });
        g.seal();
        g
    }

    const I: SelectionState = SelectionState::Invalid;
    const M: SelectionState = SelectionState::Move;
    const F: SelectionState = SelectionState::Fixed;
    const E: SelectionState = SelectionState::Extend;

    #[test]
    fn test_adjacency_extension() {
        let g = strip();
        let out = extend_selection(&g, &[F, I, I, I], true, false);
        assert_eq!(out, vec![F, E, I, I]);
    }

    #[test]
    fn test_weight_extension() {
        let g = strip();
        // Vertex 2 moves; the child vertex weighted to 2 and 3 drags 3 in.
        let out = extend_selection(&g, &[I, I, M, I], false, true);
        assert_eq!(out, vec![I, I, M, E]);
    }

    #[test]
    fn test_passes_commute() {
        let g = strip();
        let base = [F, I, M, I];
        let both = extend_selection(&g, &base, true, true);
        // Adjacency first, then weight, on the adjacency result.
        let adjacency = extend_selection(&g, &base, true, false);
        // Promotion only consults the anchor set, which neither pass
        // changes, so applying the second pass adds the same vertices.
        let weight = extend_selection(&g, &base, false, true);
        let mut merged = base.to_vec();
        for i in 0..merged.len() {
            if adjacency[i] == E || weight[i] == E {
                merged[i] = E;
            }
        }
        assert_eq!(both, merged);
    }

    #[test]
    fn test_extension_is_idempotent_and_monotone() {
        let g = strip();
        let once = extend_selection(&g, &[F, I, M, I], true, true);
        let twice = extend_selection(&g, &once, true, true);
        assert_eq!(once, twice);
        // Anchors never change.
        assert_eq!(once[0], F);
        assert_eq!(once[2], M);
    }
}
