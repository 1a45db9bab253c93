//! Weight computation: blended bone weights per unified vertex and the
//! per-source child mapping tables.

use std::collections::BTreeMap;

use crate::build::cluster::ClusterSoup;
use crate::build::source::{MeshSource, SourceWeight};
use crate::data::{ChildMapping, VertexWeight};
use crate::data::packing::pack4_28;
use crate::math::{
    frame_rotation, frame_world_to_local, transform_point, transform_vector, Mat4, Vec3,
};

/// Bone contributions per unified vertex are capped by the packed
/// weight-table format's practical limit.
const MAX_BONE_WEIGHTS: usize = 4;

/// Contributions below this share are noise and get dropped.
const MIN_BONE_WEIGHT: f32 = 0.01;

/// Blend each surviving cluster's bone weights from its members.
///
/// Members close to the cluster center dominate: each member's weights
/// are scaled by `(1 - d / 2·dmax)^weight_pow` and accumulated per bone.
/// The strongest four survive, sub-1% noise is dropped, and the result is
/// renormalized to sum to one. A cluster with a single member keeps that
/// member's weights exactly.
pub(crate) fn blend_cluster_bone_weights(soup: &mut ClusterSoup, weight_pow: f32) {
    for id in 0..soup.clusters.len() {
        if !soup.clusters[id].alive {
            continue;
        }
        let center = soup.clusters[id].wpos;
        let members = soup.clusters[id].members.clone();

        let mut max_dist = 0.0f32;
        for &m in &members {
            max_dist = max_dist.max((soup.candidates[m as usize].wpos - center).norm());
        }

        let mut sums: BTreeMap<u32, f32> = BTreeMap::new();
        for &m in &members {
            let candidate = &soup.candidates[m as usize];
            let ratio = if max_dist > 1e-6 {
                let d = (candidate.wpos - center).norm();
                (1.0 - d / (max_dist * 2.0)).clamp(0.0, 1.0).powf(weight_pow)
            } else {
                1.0
            };
            for w in &candidate.bone_weights {
                *sums.entry(w.bone).or_insert(0.0) += w.weight * ratio;
            }
        }

        let mut list: Vec<SourceWeight> = sums
            .into_iter()
            .map(|(bone, weight)| SourceWeight { bone, weight })
            .collect();
        // Strongest first; equal weights resolve to the lowest bone index.
        list.sort_by(|a, b| {
            b.weight
                .partial_cmp(&a.weight)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.bone.cmp(&b.bone))
        });
        list.truncate(MAX_BONE_WEIGHTS);
        normalize_weights(&mut list);
        list.retain(|w| w.weight >= MIN_BONE_WEIGHT);
        normalize_weights(&mut list);

        soup.clusters[id].bone_weights = list;
    }
}

fn normalize_weights(list: &mut [SourceWeight]) {
    let total: f32 = list.iter().map(|w| w.weight).sum();
    if total > 0.0 {
        for w in list.iter_mut() {
            w.weight /= total;
        }
    }
}

/// Flatten the blended bone weights into the packed unified weight table.
/// Each contribution's local pose is the cluster pose in its bone's bind
/// frame.
pub(crate) fn unified_weight_table(
    soup: &ClusterSoup,
    order: &[u32],
    bone_inverse_binds: &[Mat4],
) -> (Vec<u32>, Vec<VertexWeight>) {
    let mut info = Vec::with_capacity(order.len());
    let mut weights = Vec::new();
    for &id in order {
        let cluster = &soup.clusters[id as usize];
        let start = weights.len() as u32;
        for w in &cluster.bone_weights {
            let bind = &bone_inverse_binds[w.bone as usize];
            weights.push(VertexWeight {
                local_pos: transform_point(bind, cluster.wpos),
                local_nor: transform_vector(bind, cluster.wnor)
                    .try_normalize(1e-9)
                    .unwrap_or_else(Vec3::z),
                local_tan: transform_vector(bind, cluster.wtan)
                    .try_normalize(1e-9)
                    .unwrap_or_else(Vec3::x),
                parent_index: w.bone,
                weight: w.weight,
            });
        }
        info.push(pack4_28(cluster.bone_weights.len() as u32, start));
    }
    (info, weights)
}

#[derive(Debug, Clone, Copy)]
struct NearCluster {
    id: u32,
    dist: f32,
}

/// Nearest clusters reachable within two link hops of `start`, sorted by
/// distance from `base`. Equal distances resolve to the lowest compact
/// index so the result never depends on traversal order.
fn search_near_clusters(
    soup: &ClusterSoup,
    start: u32,
    base: Vec3,
    max_dist: f32,
) -> Vec<NearCluster> {
    const MAX_HOPS: u32 = 2;
    const MAX_RESULTS: usize = 100;

    let mut found: BTreeMap<u32, f32> = BTreeMap::new();
    let mut stack = vec![(start, 0u32)];
    while let Some((id, hops)) = stack.pop() {
        if found.contains_key(&id) {
            continue;
        }
        found.insert(id, (soup.clusters[id as usize].wpos - base).norm());
        if hops >= MAX_HOPS {
            continue;
        }
        for &next in &soup.clusters[id as usize].links {
            if found.contains_key(&next) || !soup.clusters[next as usize].alive {
                continue;
            }
            if (soup.clusters[next as usize].wpos - base).norm() > max_dist {
                continue;
            }
            stack.push((next, hops + 1));
        }
    }

    let mut list: Vec<NearCluster> = found
        .into_iter()
        .map(|(id, dist)| NearCluster { id, dist })
        .collect();
    list.sort_by(|a, b| {
        a.dist
            .partial_cmp(&b.dist)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                soup.clusters[a.id as usize]
                    .compact
                    .cmp(&soup.clusters[b.id as usize].compact),
            )
    });
    list.truncate(MAX_RESULTS);
    list
}

/// Build one child mapping per source mesh.
///
/// Every source vertex is weighted onto the unified clusters nearest to
/// it: inverse-distance falloff raised to `weight_pow` within
/// `weight_length`, at most `max_weights` contributions, renormalized to
/// one. The local pose of each contribution is the source vertex
/// expressed in the cluster's frame.
pub(crate) fn child_mappings(
    soup: &ClusterSoup,
    order: &[u32],
    sources: &[MeshSource],
    weight_length: f32,
    max_weights: usize,
    weight_pow: f32,
) -> Vec<ChildMapping> {
    // Cluster frame binds, by compact index.
    let binds: Vec<Mat4> = order
        .iter()
        .map(|&id| {
            let c = &soup.clusters[id as usize];
            frame_world_to_local(c.wpos, frame_rotation(c.wnor, c.wtan))
        })
        .collect();

    let mut mappings: Vec<ChildMapping> = sources
        .iter()
        .map(|s| ChildMapping {
            source_hash: s.content_hash(),
            vertex_count: s.vertex_count() as u32,
            ..ChildMapping::default()
        })
        .collect();

    for candidate in &soup.candidates {
        let mapping = &mut mappings[candidate.mesh as usize];
        let parent = candidate.parent;

        let mut near = search_near_clusters(soup, parent, candidate.wpos, weight_length * 2.0);
        near.retain(|n| n.dist <= weight_length);
        if near.is_empty() {
            // The parent cluster drifted out of range during welding;
            // bind the vertex to it alone.
            near.push(NearCluster {
                id: parent,
                dist: 0.0,
            });
        }
        near.truncate(max_weights.max(1));

        let mut factors: Vec<f32> = near
            .iter()
            .map(|n| {
                if weight_length > 0.0 {
                    ((1.0 - n.dist / weight_length) + 0.001)
                        .clamp(0.0, 1.0)
                        .powf(weight_pow)
                } else {
                    1.0
                }
            })
            .collect();
        let total: f32 = factors.iter().sum();
        if total > 0.0 {
            for f in &mut factors {
                *f /= total;
            }
        }

        let start = mapping.vertex_weights.len() as u32;
        for (n, &weight) in near.iter().zip(&factors) {
            let compact = soup.clusters[n.id as usize].compact;
            let bind = &binds[compact as usize];
            mapping.vertex_weights.push(VertexWeight {
                local_pos: transform_point(bind, candidate.wpos),
                local_nor: transform_vector(bind, candidate.wnor)
                    .try_normalize(1e-9)
                    .unwrap_or_else(Vec3::z),
                local_tan: transform_vector(bind, candidate.wtan)
                    .try_normalize(1e-9)
                    .unwrap_or_else(Vec3::x),
                parent_index: compact,
                weight,
            });
        }
        mapping.vertex_info.push(pack4_28(near.len() as u32, start));
        mapping
            .original_parent
            .push(soup.clusters[parent as usize].compact);
    }

    mappings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::source::SourceBinding;
    use crate::build::topology::reindex;
    use crate::build::weld::weld_near_points;
    use crate::data::packing::unpack4_28;

    #[test]
    fn test_single_member_cluster_keeps_weights() {
        let source = MeshSource::new(
            vec![Vec3::zeros()],
            vec![Vec3::z()],
            Vec::new(),
            SourceBinding::Rigid { bone: 2 },
        );
        let mut soup = ClusterSoup::from_sources(&[source]);
        blend_cluster_bone_weights(&mut soup, 3.0);
        let w = &soup.clusters[0].bone_weights;
        assert_eq!(w.len(), 1);
        assert_eq!(w[0].bone, 2);
        assert!((w[0].weight - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_coincident_members_blend_evenly() {
        // Two sources, one vertex each at the same point, bound to
        // different bones; welding leaves one cluster whose weights split
        // evenly between the bones.
        let a = MeshSource::new(
            vec![Vec3::zeros()],
            vec![Vec3::z()],
            Vec::new(),
            SourceBinding::Rigid { bone: 0 },
        );
        let b = MeshSource::new(
            vec![Vec3::zeros()],
            vec![Vec3::z()],
            Vec::new(),
            SourceBinding::Rigid { bone: 1 },
        );
        let mut soup = ClusterSoup::from_sources(&[a, b]);
        weld_near_points(&mut soup, 0.001);
        assert_eq!(soup.alive_count(), 1);
        blend_cluster_bone_weights(&mut soup, 3.0);
        let cluster = soup.clusters.iter().find(|c| c.alive).expect("cluster");
        assert_eq!(cluster.bone_weights.len(), 2);
        for w in &cluster.bone_weights {
            assert!((w.weight - 0.5).abs() < 1e-5);
        }
    }

    #[test]
    fn test_unified_table_sums_to_one() {
        let a = MeshSource::new(
            vec![Vec3::zeros(), Vec3::x()],
            vec![Vec3::z(); 2],
            Vec::new(),
            SourceBinding::Skinned {
                vertex_info: vec![pack4_28(2, 0), pack4_28(1, 2)],
                weights: vec![
                    SourceWeight {
                        bone: 0,
                        weight: 0.25,
                    },
                    SourceWeight {
                        bone: 1,
                        weight: 0.75,
                    },
                    SourceWeight {
                        bone: 0,
                        weight: 1.0,
                    },
                ],
            },
        );
        let mut soup = ClusterSoup::from_sources(&[a]);
        blend_cluster_bone_weights(&mut soup, 3.0);
        let order = reindex(&mut soup);
        let binds = vec![Mat4::identity(), Mat4::identity()];
        let (info, weights) = unified_weight_table(&soup, &order, &binds);
        assert_eq!(info.len(), 2);
        for &packed in &info {
            let (count, start) = unpack4_28(packed);
            let sum: f32 = weights[start as usize..(start + count) as usize]
                .iter()
                .map(|w| w.weight)
                .sum();
            assert!((sum - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn test_child_mapping_identity_when_nothing_welds() {
        let source = MeshSource::new(
            vec![Vec3::zeros(), Vec3::x(), Vec3::y()],
            vec![Vec3::z(); 3],
            vec![0, 1, 2],
            SourceBinding::Rigid { bone: 0 },
        );
        let mut soup = ClusterSoup::from_sources(&[source.clone()]);
        let order = reindex(&mut soup);
        let mappings = child_mappings(&soup, &order, &[source], 1.5, 1, 3.0);
        assert_eq!(mappings.len(), 1);
        let m = &mappings[0];
        assert_eq!(m.vertex_count, 3);
        assert_eq!(m.original_parent, vec![0, 1, 2]);
        for v in 0..3 {
            let weights = m.vertex_weights_of(v);
            assert_eq!(weights.len(), 1);
            assert_eq!(weights[0].parent_index, v);
            assert!((weights[0].weight - 1.0).abs() < 1e-6);
            // The local offset within the owning cluster frame is zero.
            assert!(weights[0].local_pos.norm() < 1e-5);
        }
    }
}
