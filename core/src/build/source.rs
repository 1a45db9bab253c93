//! Author-time source mesh input.

use crate::data::content_hash::DataHasher;
use crate::data::packing::unpack4_28;
use crate::error::MeshError;
use crate::math::{Vec2, Vec3, Vec4};

/// One bone contribution of a skinned source vertex.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceWeight {
    pub bone: u32,
    pub weight: f32,
}

/// How a source mesh binds to the bone table.
#[derive(Debug, Clone)]
pub enum SourceBinding {
    /// Every vertex follows a single transform.
    Rigid { bone: u32 },
    /// Per-vertex multi-bone weights, packed `(count, start)` per vertex
    /// into `weights`.
    Skinned {
        vertex_info: Vec<u32>,
        weights: Vec<SourceWeight>,
    },
}

/// Raw author-time input for one source mesh.
///
/// Positions, normals, and tangents are in the shared author space (the
/// pose the merge runs under). Tangent `w` carries handedness.
#[derive(Debug, Clone)]
pub struct MeshSource {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tangents: Vec<Vec4>,
    pub uvs: Vec<Vec2>,
    pub triangles: Vec<u32>,
    pub binding: SourceBinding,
}

impl MeshSource {
    /// Create a source mesh; tangents and UVs default to placeholder
    /// values and can be supplied with the `with_*` builders.
    pub fn new(
        positions: Vec<Vec3>,
        normals: Vec<Vec3>,
        triangles: Vec<u32>,
        binding: SourceBinding,
    ) -> Self {
        let n = positions.len();
        Self {
            positions,
            normals,
            tangents: vec![Vec4::new(1.0, 0.0, 0.0, -1.0); n],
            uvs: vec![Vec2::zeros(); n],
            triangles,
            binding,
        }
    }

    pub fn with_tangents(mut self, tangents: Vec<Vec4>) -> Self {
        self.tangents = tangents;
        self
    }

    pub fn with_uvs(mut self, uvs: Vec<Vec2>) -> Self {
        self.uvs = uvs;
        self
    }

    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    pub fn is_skinned(&self) -> bool {
        matches!(self.binding, SourceBinding::Skinned { .. })
    }

    /// Stable hash of this source's authored content, stored in its
    /// [`crate::data::ChildMapping`] for later skew detection.
    pub fn content_hash(&self) -> u32 {
        let mut h = DataHasher::new();
        h.write_len(self.positions.len());
        h.write_len(self.triangles.len());
        h.write_bool(self.is_skinned());
        if let SourceBinding::Skinned { weights, .. } = &self.binding {
            h.write_len(weights.len());
        }
        h.finish()
    }

    /// The bone contributions of one vertex.
    pub(crate) fn bone_weights_of(&self, vertex: usize) -> Vec<SourceWeight> {
        match &self.binding {
            SourceBinding::Rigid { bone } => vec![SourceWeight {
                bone: *bone,
                weight: 1.0,
            }],
            SourceBinding::Skinned {
                vertex_info,
                weights,
            } => {
                let (count, start) = unpack4_28(vertex_info[vertex]);
                weights[start as usize..(start + count) as usize]
                    .iter()
                    .filter(|w| w.weight > 0.0)
                    .copied()
                    .collect()
            }
        }
    }

    /// Check array consistency against the shared bone table.
    pub(crate) fn validate(&self, bone_count: usize) -> Result<(), MeshError> {
        let n = self.positions.len();
        if n == 0 {
            return Err(MeshError::VertexCountZero);
        }
        if self.normals.len() != n || self.tangents.len() != n || self.uvs.len() != n {
            return Err(MeshError::SourceMeshUnreadable(format!(
                "attribute arrays disagree on vertex count ({n} positions)"
            )));
        }
        if self.triangles.len() % 3 != 0 {
            return Err(MeshError::SourceMeshUnreadable(
                "triangle list length is not a multiple of 3".into(),
            ));
        }
        if self.triangles.iter().any(|&i| i as usize >= n) {
            return Err(MeshError::SourceMeshUnreadable(
                "triangle index out of range".into(),
            ));
        }
        match &self.binding {
            SourceBinding::Rigid { bone } => {
                if *bone as usize >= bone_count {
                    return Err(MeshError::SourceMeshUnreadable(
                        "rigid bone index out of range".into(),
                    ));
                }
            }
            SourceBinding::Skinned {
                vertex_info,
                weights,
            } => {
                if vertex_info.len() != n {
                    return Err(MeshError::SourceMeshUnreadable(
                        "skin table length mismatch".into(),
                    ));
                }
                if weights.iter().any(|w| w.bone as usize >= bone_count) {
                    return Err(MeshError::SourceMeshUnreadable(
                        "skin bone index out of range".into(),
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::packing::pack4_28;

    fn rigid_tri() -> MeshSource {
        MeshSource::new(
            vec![Vec3::zeros(), Vec3::x(), Vec3::y()],
            vec![Vec3::z(); 3],
            vec![0, 1, 2],
            SourceBinding::Rigid { bone: 0 },
        )
    }

    #[test]
    fn test_validate_accepts_consistent_source() {
        assert!(rigid_tri().validate(1).is_ok());
    }

    #[test]
    fn test_validate_rejects_empty() {
        let src = MeshSource::new(
            Vec::new(),
            Vec::new(),
            Vec::new(),
            SourceBinding::Rigid { bone: 0 },
        );
        assert_eq!(src.validate(1), Err(MeshError::VertexCountZero));
    }

    #[test]
    fn test_validate_rejects_bad_triangle_index() {
        let mut src = rigid_tri();
        src.triangles = vec![0, 1, 9];
        assert!(matches!(
            src.validate(1),
            Err(MeshError::SourceMeshUnreadable(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bone_out_of_range() {
        let src = MeshSource::new(
            vec![Vec3::zeros()],
            vec![Vec3::z()],
            Vec::new(),
            SourceBinding::Rigid { bone: 3 },
        );
        assert!(matches!(
            src.validate(1),
            Err(MeshError::SourceMeshUnreadable(_))
        ));
    }

    #[test]
    fn test_skinned_weights_lookup() {
        let src = MeshSource::new(
            vec![Vec3::zeros(), Vec3::x()],
            vec![Vec3::z(); 2],
            Vec::new(),
            SourceBinding::Skinned {
                vertex_info: vec![pack4_28(2, 0), pack4_28(1, 2)],
                weights: vec![
                    SourceWeight {
                        bone: 0,
                        weight: 0.7,
                    },
                    SourceWeight {
                        bone: 1,
                        weight: 0.3,
                    },
                    SourceWeight {
                        bone: 1,
                        weight: 1.0,
                    },
                ],
            },
        );
        assert_eq!(src.bone_weights_of(0).len(), 2);
        assert_eq!(src.bone_weights_of(1)[0].bone, 1);
    }

    #[test]
    fn test_content_hash_tracks_shape() {
        let a = rigid_tri().content_hash();
        let b = rigid_tri().content_hash();
        assert_eq!(a, b);
        let mut bigger = rigid_tri();
        bigger.positions.push(Vec3::zeros());
        bigger.normals.push(Vec3::z());
        bigger.tangents.push(Vec4::new(1.0, 0.0, 0.0, -1.0));
        bigger.uvs.push(Vec2::zeros());
        assert_ne!(bigger.content_hash(), a);
    }
}
