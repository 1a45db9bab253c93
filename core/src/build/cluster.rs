//! Working state of the merge: candidates and clusters.
//!
//! Every source vertex becomes a candidate; every candidate seeds one
//! cluster. Welding combines clusters, so a surviving cluster carries one
//! or more candidates whose motion it will represent. Link sets mirror
//! the source triangle topology and are repaired on every combine.

use std::collections::BTreeSet;

use crate::build::source::{MeshSource, SourceWeight};
use crate::math::{Vec2, Vec3};

/// One original source vertex.
#[derive(Debug, Clone)]
pub(crate) struct Candidate {
    pub mesh: u32,
    pub vertex: u32,
    pub wpos: Vec3,
    pub wnor: Vec3,
    pub wtan: Vec3,
    pub uv: Vec2,
    pub bone_weights: Vec<SourceWeight>,
    /// Owning cluster id (kept current through welds).
    pub parent: u32,
}

/// One unified vertex in the making.
#[derive(Debug, Clone)]
pub(crate) struct Cluster {
    pub alive: bool,
    pub wpos: Vec3,
    pub wnor: Vec3,
    pub wtan: Vec3,
    pub uv: Vec2,
    /// Candidate indices merged into this cluster.
    pub members: Vec<u32>,
    /// Linked cluster ids (undirected, from source topology).
    pub links: BTreeSet<u32>,
    /// Blended bone weights (filled after welding).
    pub bone_weights: Vec<SourceWeight>,
    /// Final compact index (filled by reindexing).
    pub compact: u32,
}

#[derive(Debug, Default)]
pub(crate) struct ClusterSoup {
    pub candidates: Vec<Candidate>,
    pub clusters: Vec<Cluster>,
}

impl ClusterSoup {
    /// Seed one cluster per source vertex and link clusters along source
    /// triangles.
    pub fn from_sources(sources: &[MeshSource]) -> Self {
        let mut soup = ClusterSoup::default();
        for (mesh_index, source) in sources.iter().enumerate() {
            let base = soup.clusters.len() as u32;
            for v in 0..source.vertex_count() {
                let id = soup.clusters.len() as u32;
                let candidate = Candidate {
                    mesh: mesh_index as u32,
                    vertex: v as u32,
                    wpos: source.positions[v],
                    wnor: source.normals[v],
                    wtan: source.tangents[v].xyz(),
                    uv: source.uvs[v],
                    bone_weights: source.bone_weights_of(v),
                    parent: id,
                };
                soup.clusters.push(Cluster {
                    alive: true,
                    wpos: candidate.wpos,
                    wnor: candidate.wnor,
                    wtan: candidate.wtan,
                    uv: candidate.uv,
                    members: vec![soup.candidates.len() as u32],
                    links: BTreeSet::new(),
                    bone_weights: Vec::new(),
                    compact: 0,
                });
                soup.candidates.push(candidate);
            }
            for tri in source.triangles.chunks_exact(3) {
                let ids = [base + tri[0], base + tri[1], base + tri[2]];
                for a in 0..3 {
                    for b in 0..3 {
                        if a != b {
                            soup.clusters[ids[a] as usize].links.insert(ids[b]);
                        }
                    }
                }
            }
        }
        soup
    }

    pub fn alive_count(&self) -> usize {
        self.clusters.iter().filter(|c| c.alive).count()
    }

    /// Merge cluster `drop` into cluster `keep`: members, links, and the
    /// averaged position move over; `drop` dies.
    pub fn combine(&mut self, keep: u32, drop: u32) {
        debug_assert_ne!(keep, drop);

        let members = std::mem::take(&mut self.clusters[drop as usize].members);
        for &m in &members {
            self.candidates[m as usize].parent = keep;
        }
        self.clusters[keep as usize].members.extend(members);

        // Rewire links: everything that linked to `drop` now links to
        // `keep`, without self-links.
        let drop_links = std::mem::take(&mut self.clusters[drop as usize].links);
        self.clusters[keep as usize].links.remove(&drop);
        for &l in &drop_links {
            if l != keep {
                self.clusters[keep as usize].links.insert(l);
            }
        }
        let keep_links: Vec<u32> = self.clusters[keep as usize].links.iter().copied().collect();
        for l in keep_links {
            let links = &mut self.clusters[l as usize].links;
            if links.remove(&drop) {
                links.insert(keep);
            }
        }

        self.clusters[drop as usize].alive = false;
        self.recalc_position(keep);
    }

    /// Re-average the cluster position from its members. Normal, tangent,
    /// and UV stay with the first member; topology rebuild recomputes
    /// normals afterwards anyway.
    pub fn recalc_position(&mut self, id: u32) {
        let cluster = &self.clusters[id as usize];
        let mut pos = Vec3::zeros();
        for &m in &cluster.members {
            pos += self.candidates[m as usize].wpos;
        }
        let count = cluster.members.len().max(1) as f32;
        let first = cluster.members.first().map(|&m| {
            let c = &self.candidates[m as usize];
            (c.wnor, c.wtan, c.uv)
        });
        let cluster = &mut self.clusters[id as usize];
        cluster.wpos = pos / count;
        if let Some((nor, tan, uv)) = first {
            cluster.wnor = nor;
            cluster.wtan = tan;
            cluster.uv = uv;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::build::source::SourceBinding;

    fn two_tris() -> ClusterSoup {
        // Two separate triangles in one source.
        let source = MeshSource::new(
            vec![
                Vec3::zeros(),
                Vec3::x(),
                Vec3::y(),
                Vec3::new(5.0, 0.0, 0.0),
                Vec3::new(6.0, 0.0, 0.0),
                Vec3::new(5.0, 1.0, 0.0),
            ],
            vec![Vec3::z(); 6],
            vec![0, 1, 2, 3, 4, 5],
            SourceBinding::Rigid { bone: 0 },
        );
        ClusterSoup::from_sources(&[source])
    }

    #[test]
    fn test_seeding_links_triangles() {
        let soup = two_tris();
        assert_eq!(soup.alive_count(), 6);
        assert_eq!(soup.clusters[0].links, BTreeSet::from([1, 2]));
        assert_eq!(soup.clusters[3].links, BTreeSet::from([4, 5]));
    }

    #[test]
    fn test_combine_moves_members_and_links() {
        let mut soup = two_tris();
        soup.combine(0, 3);
        assert_eq!(soup.alive_count(), 5);
        assert_eq!(soup.clusters[0].members, vec![0, 3]);
        assert_eq!(soup.candidates[3].parent, 0);
        // Cluster 0 inherits 3's links, and 4/5 now point at 0.
        assert_eq!(soup.clusters[0].links, BTreeSet::from([1, 2, 4, 5]));
        assert!(soup.clusters[4].links.contains(&0));
        assert!(!soup.clusters[4].links.contains(&3));
        // Position is the member average.
        assert!((soup.clusters[0].wpos - Vec3::new(2.5, 0.0, 0.0)).norm() < 1e-6);
    }
}
