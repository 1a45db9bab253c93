//! Topology rebuild after welding.
//!
//! Re-indexes surviving clusters, reforms triangles and lines from the
//! repaired link graph, drops duplicate coplanar triangle pairs that
//! welding can create, recomputes cluster normals/tangents from their
//! triangles, and builds the reverse vertex-to-triangle tables.

use std::collections::{BTreeMap, BTreeSet};

use crate::build::cluster::ClusterSoup;
use crate::data::packing::{pack8_24, pack_pair, pack_quad, pack_triple, unpack_pair};
use crate::math::{Vec2, Vec3};

/// Triangle pairs spanning the same four vertices count as the same quad
/// when their dihedral angles are this close (degrees).
const DUPLICATE_PAIR_ANGLE: f32 = 10.0;

/// Quads more bent than this are irregular and never considered
/// duplicates (degrees).
const QUAD_FLATNESS_ANGLE: f32 = 135.0;

const MIN_TRIANGLE_AREA: f32 = 1e-6;

#[derive(Debug, Default)]
pub(crate) struct Topology {
    pub lines: Vec<u32>,
    pub triangles: Vec<u32>,
    pub vertex_to_triangle_info: Vec<u32>,
    pub vertex_to_triangle_indices: Vec<u32>,
    /// Mean edge length of the final topology; the child-weight search
    /// radius derives from it.
    pub mean_edge_length: f32,
}

/// Assign compact indices to surviving clusters. Returns the cluster ids
/// in compact order.
pub(crate) fn reindex(soup: &mut ClusterSoup) -> Vec<u32> {
    let mut order = Vec::with_capacity(soup.alive_count());
    for id in 0..soup.clusters.len() as u32 {
        if soup.clusters[id as usize].alive {
            soup.clusters[id as usize].compact = order.len() as u32;
            order.push(id);
        }
    }
    order
}

/// Reform lines and triangles from the link graph and build adjacency.
/// Requires [`reindex`] to have run.
pub(crate) fn build_topology(soup: &mut ClusterSoup, order: &[u32]) -> Topology {
    // Every link pair is a line candidate until a triangle claims it.
    let mut line_keys: BTreeSet<u32> = BTreeSet::new();
    for &id in order {
        let a = soup.clusters[id as usize].compact;
        for &l in &soup.clusters[id as usize].links {
            let b = soup.clusters[l as usize].compact;
            line_keys.insert(pack_pair(a, b));
        }
    }

    // Triangles: mutual link triples with non-degenerate area.
    let mut triangles: BTreeMap<u64, [u32; 3]> = BTreeMap::new();
    for &id in order {
        let c0 = soup.clusters[id as usize].compact;
        let links: Vec<u32> = soup.clusters[id as usize].links.iter().copied().collect();
        for i in 0..links.len() {
            for j in (i + 1)..links.len() {
                let l1 = links[i];
                let l2 = links[j];
                if !soup.clusters[l1 as usize].links.contains(&l2) {
                    continue;
                }
                let area = triangle_area(
                    soup.clusters[id as usize].wpos,
                    soup.clusters[l1 as usize].wpos,
                    soup.clusters[l2 as usize].wpos,
                );
                if area < MIN_TRIANGLE_AREA {
                    continue;
                }
                let c1 = soup.clusters[l1 as usize].compact;
                let c2 = soup.clusters[l2 as usize].compact;
                // Orient the emitted winding along the authored normals.
                let face = (soup.clusters[l1 as usize].wpos - soup.clusters[id as usize].wpos)
                    .cross(&(soup.clusters[l2 as usize].wpos - soup.clusters[id as usize].wpos));
                let reference = soup.clusters[id as usize].wnor
                    + soup.clusters[l1 as usize].wnor
                    + soup.clusters[l2 as usize].wnor;
                let tri = if face.dot(&reference) < 0.0 {
                    [c0, c2, c1]
                } else {
                    [c0, c1, c2]
                };
                triangles.entry(pack_triple(c0, c1, c2)).or_insert(tri);
            }
        }
    }

    remove_duplicate_pairs(soup, order, &mut triangles);

    for tri in triangles.values() {
        line_keys.remove(&pack_pair(tri[0], tri[1]));
        line_keys.remove(&pack_pair(tri[1], tri[2]));
        line_keys.remove(&pack_pair(tri[2], tri[0]));
    }

    let mut topo = Topology::default();
    for key in &line_keys {
        let (a, b) = unpack_pair(*key);
        topo.lines.push(a);
        topo.lines.push(b);
    }
    for tri in triangles.values() {
        topo.triangles.extend_from_slice(tri);
    }

    recalc_cluster_normals(soup, order, &triangles);
    build_adjacency(order.len(), &mut topo);
    topo.mean_edge_length = mean_edge_length(soup, order, &topo);
    topo
}

fn triangle_area(p0: Vec3, p1: Vec3, p2: Vec3) -> f32 {
    (p1 - p0).cross(&(p2 - p0)).norm() * 0.5
}

/// Welding two surfaces can leave both triangulations of one quad in the
/// topology. Detect quads spanned by two triangle pairs and keep one.
fn remove_duplicate_pairs(
    soup: &ClusterSoup,
    order: &[u32],
    triangles: &mut BTreeMap<u64, [u32; 3]>,
) {
    let position = |compact: u32| soup.clusters[order[compact as usize] as usize].wpos;

    // Edge -> incident triangle keys.
    let mut edge_tris: BTreeMap<u32, Vec<u64>> = BTreeMap::new();
    for (&key, tri) in triangles.iter() {
        for (a, b) in [(tri[0], tri[1]), (tri[1], tri[2]), (tri[2], tri[0])] {
            edge_tris.entry(pack_pair(a, b)).or_default().push(key);
        }
    }

    // Quad key -> (dihedral angle, the two triangles) per edge-sharing pair.
    #[derive(Debug)]
    struct Square {
        angle: f32,
        tris: [u64; 2],
    }
    let mut squares: BTreeMap<u64, Vec<Square>> = BTreeMap::new();
    for (&edge, tris) in edge_tris.iter() {
        let (e0, e1) = unpack_pair(edge);
        for i in 0..tris.len() {
            for j in (i + 1)..tris.len() {
                let t0 = triangles[&tris[i]];
                let t1 = triangles[&tris[j]];
                let (Some(v0), Some(v1)) = (opposite_vertex(&t0, e0, e1), opposite_vertex(&t1, e0, e1))
                else {
                    continue;
                };
                let ev = position(e1) - position(e0);
                let n0 = (position(v0) - position(e0)).cross(&ev);
                let n1 = (position(v1) - position(e0)).cross(&ev);
                let angle = n0.angle(&n1).to_degrees();
                if angle <= QUAD_FLATNESS_ANGLE {
                    continue;
                }
                squares
                    .entry(pack_quad(v0, v1, e0, e1))
                    .or_default()
                    .push(Square {
                        angle,
                        tris: [tris[i], tris[j]],
                    });
            }
        }
    }

    let mut removed: BTreeSet<u64> = BTreeSet::new();
    for group in squares.values() {
        for i in 0..group.len() {
            if group[i].tris.iter().any(|t| removed.contains(t)) {
                continue;
            }
            for s1 in group.iter().skip(i + 1) {
                if s1.tris.iter().any(|t| removed.contains(t)) {
                    continue;
                }
                // A pair sharing a triangle with the kept square is not a
                // duplicate of it.
                if s1.tris.iter().any(|t| group[i].tris.contains(t)) {
                    continue;
                }
                if (group[i].angle - s1.angle).abs() <= DUPLICATE_PAIR_ANGLE {
                    removed.extend(s1.tris);
                }
            }
        }
    }
    for key in removed {
        triangles.remove(&key);
    }
}

fn opposite_vertex(tri: &[u32; 3], e0: u32, e1: u32) -> Option<u32> {
    tri.iter().copied().find(|&v| v != e0 && v != e1)
}

/// Recompute cluster normals and tangents from their final triangles.
/// Clusters that only participate in lines keep their authored frame.
fn recalc_cluster_normals(
    soup: &mut ClusterSoup,
    order: &[u32],
    triangles: &BTreeMap<u64, [u32; 3]>,
) {
    let mut normals = vec![Vec3::zeros(); order.len()];
    let mut tangents = vec![Vec3::zeros(); order.len()];
    for tri in triangles.values() {
        let p: Vec<Vec3> = tri
            .iter()
            .map(|&c| soup.clusters[order[c as usize] as usize].wpos)
            .collect();
        let uv: Vec<Vec2> = tri
            .iter()
            .map(|&c| soup.clusters[order[c as usize] as usize].uv)
            .collect();
        let normal = (p[1] - p[0]).cross(&(p[2] - p[0]));
        let tangent = triangle_tangent(&p, &uv).unwrap_or_else(|| (p[1] - p[0]));
        for &c in tri {
            normals[c as usize] += normal;
            tangents[c as usize] += tangent;
        }
    }
    for (compact, &id) in order.iter().enumerate() {
        let cluster = &mut soup.clusters[id as usize];
        if let Some(n) = normals[compact].try_normalize(1e-9) {
            cluster.wnor = n;
        }
        if let Some(t) = tangents[compact].try_normalize(1e-9) {
            cluster.wtan = t;
        }
    }
}

/// UV-space tangent of one triangle; `None` when the UVs are degenerate.
fn triangle_tangent(p: &[Vec3], uv: &[Vec2]) -> Option<Vec3> {
    let e1 = p[1] - p[0];
    let e2 = p[2] - p[0];
    let d1 = uv[1] - uv[0];
    let d2 = uv[2] - uv[0];
    let det = d1.x * d2.y - d1.y * d2.x;
    if det.abs() < 1e-12 {
        return None;
    }
    Some((e1 * d2.y - e2 * d1.y) / det)
}

fn build_adjacency(vertex_count: usize, topo: &mut Topology) {
    let mut per_vertex: Vec<Vec<u32>> = vec![Vec::new(); vertex_count];
    for (t, tri) in topo.triangles.chunks_exact(3).enumerate() {
        for &v in tri {
            per_vertex[v as usize].push(t as u32);
        }
    }
    topo.vertex_to_triangle_info = Vec::with_capacity(vertex_count);
    for list in &per_vertex {
        let start = topo.vertex_to_triangle_indices.len() as u32;
        if list.is_empty() {
            topo.vertex_to_triangle_info.push(0);
        } else {
            topo.vertex_to_triangle_info
                .push(pack8_24(list.len() as u32, start));
            topo.vertex_to_triangle_indices.extend_from_slice(list);
        }
    }
}

fn mean_edge_length(soup: &ClusterSoup, order: &[u32], topo: &Topology) -> f32 {
    let position = |compact: u32| soup.clusters[order[compact as usize] as usize].wpos;
    let mut sum = 0.0f32;
    let mut count = 0u32;
    for tri in topo.triangles.chunks_exact(3) {
        sum += (position(tri[0]) - position(tri[1])).norm();
        sum += (position(tri[1]) - position(tri[2])).norm();
        sum += (position(tri[2]) - position(tri[0])).norm();
        count += 3;
    }
    for line in topo.lines.chunks_exact(2) {
        sum += (position(line[0]) - position(line[1])).norm();
        count += 1;
    }
    if count == 0 {
        0.0
    } else {
        sum / count as f32
    }
}
