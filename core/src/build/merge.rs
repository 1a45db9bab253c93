//! Merge driver: sources in, sealed [`GeometryBuffer`] out.

use crate::build::cluster::ClusterSoup;
use crate::build::source::MeshSource;
use crate::build::topology::{build_topology, reindex};
use crate::build::weights::{blend_cluster_bone_weights, child_mappings, unified_weight_table};
use crate::build::weld::{weld_linked, weld_near_points};
use crate::data::{GeometryBuffer, MAX_UNIFIED_VERTICES};
use crate::error::MeshError;
use crate::math::Mat4;

/// Radius of the implicit zero-distance pass that always precedes vertex
/// merging: exactly coincident seams weld even when the configured
/// distance is tiny.
const ZERO_DISTANCE_RADIUS: f32 = 1e-4;

/// The child-weight search radius is this multiple of the mean edge
/// length of the reduced topology.
const WEIGHT_LENGTH_SCALE: f32 = 1.5;

/// Parameters of the author-time merge.
#[derive(Debug, Clone)]
pub struct MergeParams {
    /// Any two vertices closer than this weld into one unified vertex.
    pub merge_vertex_distance: f32,
    /// Topology-linked vertices closer than this weld, subject to the
    /// surface-angle gate.
    pub merge_triangle_distance: f32,
    /// Triangle-linked vertices weld only when their surface normals
    /// agree within this many degrees; hard edges survive.
    pub same_surface_angle: f32,
    /// When false the result degenerates to single-contribution binding.
    pub use_skinning: bool,
    /// Strongest contributions kept per source vertex (1..=4).
    pub max_weight_count: usize,
    /// Falloff exponent for distance-based weighting.
    pub weight_pow: f32,
}

impl Default for MergeParams {
    fn default() -> Self {
        Self {
            merge_vertex_distance: 0.001,
            merge_triangle_distance: 0.0,
            same_surface_angle: 80.0,
            use_skinning: true,
            max_weight_count: 4,
            weight_pow: 3.0,
        }
    }
}

impl MergeParams {
    /// Contributions kept per source vertex in the child mappings.
    ///
    /// Skinning off forces single binding. So does pure zero-distance
    /// reduction: when both merge distances are at or below 1 mm the
    /// merge is purely topological and each source vertex follows exactly
    /// its own unified vertex.
    pub fn effective_max_weight_count(&self) -> usize {
        if !self.use_skinning {
            return 1;
        }
        if self.merge_vertex_distance <= 0.001 && self.merge_triangle_distance <= 0.001 {
            return 1;
        }
        self.max_weight_count.clamp(1, 4)
    }
}

/// Merge the source meshes into one unified simulation topology.
///
/// `bone_inverse_binds` maps author space into each bone's local space;
/// rigid sources reference a bone in the same table. The returned buffer
/// is sealed: its content hash is stable, so rebuilding from unchanged
/// input yields an identical hash and shares registry storage.
pub fn merge_sources(
    sources: &[MeshSource],
    bone_inverse_binds: &[Mat4],
    params: &MergeParams,
) -> Result<GeometryBuffer, MeshError> {
    if sources.is_empty() {
        return Err(MeshError::EmptyData);
    }
    if bone_inverse_binds.is_empty() {
        return Err(MeshError::SourceMeshUnreadable("empty bone table".into()));
    }
    for source in sources {
        source.validate(bone_inverse_binds.len())?;
    }

    let mut soup = ClusterSoup::from_sources(sources);
    let candidate_count = soup.candidates.len();
    log::debug!(
        "merging {} sources, {candidate_count} candidate vertices",
        sources.len()
    );

    if params.merge_vertex_distance > 0.0 {
        weld_near_points(&mut soup, ZERO_DISTANCE_RADIUS);
        if params.merge_vertex_distance > ZERO_DISTANCE_RADIUS {
            weld_near_points(&mut soup, params.merge_vertex_distance);
        }
    }
    if params.merge_triangle_distance > 0.0 {
        weld_linked(
            &mut soup,
            params.merge_triangle_distance,
            params.same_surface_angle,
        );
    }

    let order = reindex(&mut soup);
    if order.len() > MAX_UNIFIED_VERTICES {
        return Err(MeshError::VertexLimitExceeded(order.len()));
    }

    blend_cluster_bone_weights(&mut soup, params.weight_pow);
    let topo = build_topology(&mut soup, &order);

    let (vertex_info, vertex_weights) = unified_weight_table(&soup, &order, bone_inverse_binds);
    let children = child_mappings(
        &soup,
        &order,
        sources,
        topo.mean_edge_length * WEIGHT_LENGTH_SCALE,
        params.effective_max_weight_count(),
        params.weight_pow,
    );

    let is_skinned = params.use_skinning && sources.iter().any(|s| s.is_skinned());
    let mut buffer = GeometryBuffer {
        is_skinned,
        vertex_count: order.len() as u32,
        line_count: (topo.lines.len() / 2) as u32,
        triangle_count: (topo.triangles.len() / 3) as u32,
        bone_count: bone_inverse_binds.len() as u32,
        vertex_info,
        vertex_weights,
        uvs: order
            .iter()
            .map(|&id| soup.clusters[id as usize].uv)
            .collect(),
        lines: topo.lines,
        triangles: topo.triangles,
        vertex_to_triangle_info: topo.vertex_to_triangle_info,
        vertex_to_triangle_indices: topo.vertex_to_triangle_indices,
        children,
        ..GeometryBuffer::default()
    };
    buffer.seal();
    buffer.verify_deep()?;

    log::info!(
        "merged {} sources: {candidate_count} -> {} vertices, {} triangles, {} lines",
        sources.len(),
        buffer.vertex_count,
        buffer.triangle_count,
        buffer.line_count
    );
    Ok(buffer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::source::SourceBinding;
    use crate::math::{Vec2, Vec3};

    /// Two 4-vertex quads sharing one seam edge: the canonical merge
    /// scenario. Quad A spans x in [0, 1], quad B spans x in [1, 2]; the
    /// two vertex pairs at x = 1 coincide.
    fn seam_quads() -> Vec<MeshSource> {
        let quad = |x0: f32, bone: u32| {
            MeshSource::new(
                vec![
                    Vec3::new(x0, 0.0, 0.0),
                    Vec3::new(x0 + 1.0, 0.0, 0.0),
                    Vec3::new(x0, 1.0, 0.0),
                    Vec3::new(x0 + 1.0, 1.0, 0.0),
                ],
                vec![Vec3::z(); 4],
                vec![0, 1, 2, 1, 3, 2],
                SourceBinding::Rigid { bone },
            )
            .with_uvs(vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(1.0, 0.0),
                Vec2::new(0.0, 1.0),
                Vec2::new(1.0, 1.0),
            ])
        };
        vec![quad(0.0, 0), quad(1.0, 1)]
    }

    fn binds() -> Vec<Mat4> {
        vec![Mat4::identity(), Mat4::identity()]
    }

    #[test]
    fn test_empty_source_list_rejected() {
        assert_eq!(
            merge_sources(&[], &binds(), &MergeParams::default()),
            Err(MeshError::EmptyData)
        );
    }

    #[test]
    fn test_seam_merge_topology() {
        let buffer =
            merge_sources(&seam_quads(), &binds(), &MergeParams::default()).expect("merge");
        // 8 candidates, 2 seam pairs welded -> 6 unified vertices.
        assert_eq!(buffer.vertex_count, 6);
        assert_eq!(buffer.triangle_count, 4);
        assert_eq!(buffer.child_count(), 2);
        for child in &buffer.children {
            assert_eq!(child.vertex_count, 4);
        }
    }

    #[test]
    fn test_seam_vertices_blend_both_sources() {
        let buffer =
            merge_sources(&seam_quads(), &binds(), &MergeParams::default()).expect("merge");
        // Exactly two unified vertices carry a contribution from each
        // source's bone, split evenly.
        let mut seam_vertices = 0;
        for v in 0..buffer.vertex_count {
            let weights = buffer.vertex_weights_of(v);
            if weights.len() == 2 {
                seam_vertices += 1;
                assert!((weights[0].weight - 0.5).abs() < 1e-5);
                assert!((weights[1].weight - 0.5).abs() < 1e-5);
                let bones: Vec<u32> = weights.iter().map(|w| w.parent_index).collect();
                assert_eq!(bones, vec![0, 1]);
            } else {
                assert_eq!(weights.len(), 1);
            }
        }
        assert_eq!(seam_vertices, 2);
    }

    #[test]
    fn test_weight_normalization_property() {
        let buffer =
            merge_sources(&seam_quads(), &binds(), &MergeParams::default()).expect("merge");
        for v in 0..buffer.vertex_count {
            let sum: f32 = buffer.vertex_weights_of(v).iter().map(|w| w.weight).sum();
            assert!((sum - 1.0).abs() < 1e-5, "vertex {v} weight sum {sum}");
        }
        for child in &buffer.children {
            for v in 0..child.vertex_count {
                let sum: f32 = child.vertex_weights_of(v).iter().map(|w| w.weight).sum();
                assert!((sum - 1.0).abs() < 1e-5);
            }
        }
    }

    #[test]
    fn test_mapping_closure_property() {
        let buffer =
            merge_sources(&seam_quads(), &binds(), &MergeParams::default()).expect("merge");
        for child in &buffer.children {
            for vw in &child.vertex_weights {
                assert!(vw.parent_index < buffer.vertex_count);
            }
            for &p in &child.original_parent {
                assert!(p < buffer.vertex_count);
            }
        }
    }

    #[test]
    fn test_merge_is_idempotent() {
        let a = merge_sources(&seam_quads(), &binds(), &MergeParams::default()).expect("merge");
        let b = merge_sources(&seam_quads(), &binds(), &MergeParams::default()).expect("merge");
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.vertex_count, b.vertex_count);
        assert_eq!(a.triangles, b.triangles);
    }

    #[test]
    fn test_different_params_change_hash() {
        let a = merge_sources(&seam_quads(), &binds(), &MergeParams::default()).expect("merge");
        let apart = MergeParams {
            merge_vertex_distance: 0.0,
            ..MergeParams::default()
        };
        let b = merge_sources(&seam_quads(), &binds(), &apart).expect("merge");
        // Without welding the seam stays split, so the topology differs.
        assert_eq!(b.vertex_count, 8);
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_zero_distance_merge_is_single_binding() {
        let params = MergeParams::default();
        assert_eq!(params.effective_max_weight_count(), 1);
        let buffer = merge_sources(&seam_quads(), &binds(), &params).expect("merge");
        for child in &buffer.children {
            for v in 0..child.vertex_count {
                assert_eq!(child.vertex_weights_of(v).len(), 1);
            }
        }
    }

    #[test]
    fn test_skinning_disabled_forces_single_binding() {
        let params = MergeParams {
            use_skinning: false,
            merge_vertex_distance: 0.05,
            merge_triangle_distance: 0.05,
            ..MergeParams::default()
        };
        assert_eq!(params.effective_max_weight_count(), 1);
    }

    #[test]
    fn test_vertex_limit() {
        // A synthetic source over the 16-bit ceiling must be rejected
        // before any table is built.
        let n = MAX_UNIFIED_VERTICES + 1;
        let positions: Vec<Vec3> = (0..n).map(|i| Vec3::new(i as f32, 0.0, 0.0)).collect();
        let normals = vec![Vec3::z(); n];
        let source = MeshSource::new(positions, normals, Vec::new(), SourceBinding::Rigid {
            bone: 0,
        });
        let params = MergeParams {
            merge_vertex_distance: 0.0,
            ..MergeParams::default()
        };
        let result = merge_sources(&[source], &[Mat4::identity()], &params);
        assert_eq!(result, Err(MeshError::VertexLimitExceeded(n)));
    }
}
