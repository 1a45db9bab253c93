//! Unified geometry buffers.
//!
//! A [`GeometryBuffer`] is the merged simulation topology produced by the
//! author-time build: welded vertices, packed weight tables, line/triangle
//! topology, reverse adjacency, and one [`ChildMapping`] per merged source
//! mesh describing how that source's vertices map back onto the unified
//! set.
//!
//! Buffers are immutable once sealed. Multiple component instances that
//! reference identical authored content share one buffer through the
//! runtime registry; editing a shared buffer requires an explicit
//! clone-and-replace, never an in-place mutation.

use crate::data::content_hash::DataHasher;
use crate::data::packing::{pack16, unpack4_28, unpack8_24};
use crate::error::MeshError;
use crate::math::{Vec2, Vec3};

/// Serialized record format version.
pub const GEOMETRY_FORMAT_VERSION: u32 = 2;

/// Unified vertex indices are packed into 16-bit halves.
pub(crate) const MAX_UNIFIED_VERTICES: usize = u16::MAX as usize;

/// One weighted contribution to a vertex.
///
/// For the unified weight table the parent is a bone; for a child mapping
/// the parent is a unified vertex. The local pose is expressed in the
/// parent's bind frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexWeight {
    pub local_pos: Vec3,
    pub local_nor: Vec3,
    pub local_tan: Vec3,
    pub parent_index: u32,
    pub weight: f32,
}

impl VertexWeight {
    pub fn new(parent_index: u32, weight: f32) -> Self {
        Self {
            local_pos: Vec3::zeros(),
            local_nor: Vec3::z(),
            local_tan: Vec3::x(),
            parent_index,
            weight,
        }
    }
}

/// Per-source-mesh record of how its vertices relate to the unified
/// topology.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ChildMapping {
    /// Hash of the source mesh data this mapping was built from.
    pub source_hash: u32,
    /// Vertex count of the source mesh (not the unified mesh).
    pub vertex_count: u32,
    /// Packed `(count, start)` per source vertex into `vertex_weights`.
    pub vertex_info: Vec<u32>,
    /// Weighted unified-vertex contributions, contiguous per source vertex.
    pub vertex_weights: Vec<VertexWeight>,
    /// The unified vertex each source vertex was authored from (editing
    /// aid; weights may span more vertices than this).
    pub original_parent: Vec<u32>,
}

impl ChildMapping {
    /// The weight contributions of one source vertex.
    pub fn vertex_weights_of(&self, vertex: u32) -> &[VertexWeight] {
        let (count, start) = unpack4_28(self.vertex_info[vertex as usize]);
        &self.vertex_weights[start as usize..(start + count) as usize]
    }

    /// Check mapping closure against a unified vertex count.
    pub fn verify(&self, unified_vertex_count: u32) -> Result<(), MeshError> {
        if self.vertex_count == 0 {
            return Err(MeshError::VertexCountZero);
        }
        if self.vertex_info.len() != self.vertex_count as usize
            || self.original_parent.len() != self.vertex_count as usize
        {
            return Err(MeshError::CorruptRecord("child table length"));
        }
        for vw in &self.vertex_weights {
            if vw.parent_index >= unified_vertex_count {
                return Err(MeshError::CorruptRecord("child parent index"));
            }
        }
        Ok(())
    }

    pub(crate) fn write_hash(&self, hasher: &mut DataHasher) {
        hasher.write_u32(self.source_hash);
        hasher.write_u32(self.vertex_count);
        hasher.write_len(self.vertex_weights.len());
    }
}

/// The merged simulation topology plus its per-source child mappings.
#[derive(Debug, Clone, PartialEq)]
pub struct GeometryBuffer {
    /// Whether vertices carry multi-bone weights vs. single-transform
    /// binding.
    pub is_skinned: bool,
    pub vertex_count: u32,
    pub line_count: u32,
    pub triangle_count: u32,
    pub bone_count: u32,
    /// Packed `(count, start)` per unified vertex into `vertex_weights`.
    pub vertex_info: Vec<u32>,
    /// Weighted bone contributions, contiguous per unified vertex.
    pub vertex_weights: Vec<VertexWeight>,
    /// Per-vertex UVs (tangent recomputation input).
    pub uvs: Vec<Vec2>,
    /// Line topology as index pairs.
    pub lines: Vec<u32>,
    /// Triangle topology as index triples.
    pub triangles: Vec<u32>,
    /// Packed `(count, start)` per vertex into
    /// `vertex_to_triangle_indices`.
    pub vertex_to_triangle_info: Vec<u32>,
    /// Reverse adjacency: triangle indices, grouped per vertex.
    pub vertex_to_triangle_indices: Vec<u32>,
    /// One entry per merged source mesh, in registration order.
    pub children: Vec<ChildMapping>,
    /// Author-time object scale the buffer was built under.
    pub base_scale: Vec3,
    /// Stable content hash; zero means unsealed.
    pub content_hash: u32,
    /// Record format version; zero means unsealed.
    pub format_version: u32,
}

impl Default for GeometryBuffer {
    fn default() -> Self {
        Self {
            is_skinned: false,
            vertex_count: 0,
            line_count: 0,
            triangle_count: 0,
            bone_count: 0,
            vertex_info: Vec::new(),
            vertex_weights: Vec::new(),
            uvs: Vec::new(),
            lines: Vec::new(),
            triangles: Vec::new(),
            vertex_to_triangle_info: Vec::new(),
            vertex_to_triangle_indices: Vec::new(),
            children: Vec::new(),
            base_scale: Vec3::new(1.0, 1.0, 1.0),
            content_hash: 0,
            format_version: 0,
        }
    }
}

impl GeometryBuffer {
    pub fn weight_count(&self) -> usize {
        self.vertex_weights.len()
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// The weighted bone contributions of one unified vertex.
    pub fn vertex_weights_of(&self, vertex: u32) -> &[VertexWeight] {
        let (count, start) = unpack4_28(self.vertex_info[vertex as usize]);
        &self.vertex_weights[start as usize..(start + count) as usize]
    }

    /// The triangles one unified vertex belongs to.
    pub fn triangles_of(&self, vertex: u32) -> &[u32] {
        let (count, start) = unpack8_24(self.vertex_to_triangle_info[vertex as usize]);
        &self.vertex_to_triangle_indices[start as usize..(start + count) as usize]
    }

    /// Compute the stable content hash over counts, flags, and payload
    /// lengths. Identical authored content yields an identical hash, which
    /// is what the shared registry deduplicates on.
    pub fn compute_content_hash(&self) -> u32 {
        let mut h = DataHasher::new();
        h.write_bool(self.is_skinned);
        h.write_u32(self.vertex_count);
        h.write_u32(self.line_count);
        h.write_u32(self.triangle_count);
        h.write_u32(self.bone_count);
        h.write_len(self.children.len());
        h.write_len(self.vertex_info.len());
        h.write_len(self.vertex_weights.len());
        h.write_len(self.uvs.len());
        h.write_len(self.lines.len());
        h.write_len(self.triangles.len());
        h.write_len(self.vertex_to_triangle_indices.len());
        for child in &self.children {
            child.write_hash(&mut h);
        }
        h.finish()
    }

    /// Stamp the format version and content hash. Call once when the build
    /// finishes; the buffer is immutable afterwards.
    pub fn seal(&mut self) {
        self.format_version = GEOMETRY_FORMAT_VERSION;
        self.content_hash = self.compute_content_hash();
    }

    /// Check that the buffer is in a runnable state.
    pub fn verify(&self) -> Result<(), MeshError> {
        if self.content_hash == 0 {
            return Err(MeshError::InvalidContentHash);
        }
        if self.format_version == 0 {
            return Err(MeshError::EmptyData);
        }
        if self.vertex_count == 0 {
            return Err(MeshError::VertexCountZero);
        }
        Ok(())
    }

    /// Check the structural invariants in depth: index closure for
    /// topology, weight tables, and every child mapping. Slower than
    /// [`verify`](Self::verify); intended for build output validation and
    /// tests.
    pub fn verify_deep(&self) -> Result<(), MeshError> {
        self.verify()?;
        if self.vertex_count as usize > MAX_UNIFIED_VERTICES {
            return Err(MeshError::VertexLimitExceeded(self.vertex_count as usize));
        }
        if self.lines.len() != self.line_count as usize * 2
            || self.triangles.len() != self.triangle_count as usize * 3
            || self.vertex_info.len() != self.vertex_count as usize
        {
            return Err(MeshError::CorruptRecord("topology table length"));
        }
        if self
            .lines
            .iter()
            .chain(self.triangles.iter())
            .any(|&i| i >= self.vertex_count)
        {
            return Err(MeshError::CorruptRecord("topology index"));
        }
        for vw in &self.vertex_weights {
            if vw.parent_index >= self.bone_count {
                return Err(MeshError::CorruptRecord("bone index"));
            }
        }
        for child in &self.children {
            child.verify(self.vertex_count)?;
        }
        Ok(())
    }

    /// For every unified vertex, the packed `(child mesh, child vertex)`
    /// references of the source vertices authored from it.
    pub fn virtual_to_child_map(&self) -> Vec<Vec<u32>> {
        let mut map = vec![Vec::new(); self.vertex_count as usize];
        for (child_index, child) in self.children.iter().enumerate() {
            for (vertex, &parent) in child.original_parent.iter().enumerate() {
                map[parent as usize].push(pack16(child_index as u32, vertex as u32));
            }
        }
        map
    }
}

static_assertions::assert_impl_all!(GeometryBuffer: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::packing::pack4_28;

    fn sealed_buffer() -> GeometryBuffer {
        let mut g = GeometryBuffer {
            vertex_count: 2,
            bone_count: 1,
            vertex_info: vec![pack4_28(1, 0), pack4_28(1, 1)],
            vertex_weights: vec![VertexWeight::new(0, 1.0), VertexWeight::new(0, 1.0)],
            uvs: vec![Vec2::zeros(), Vec2::zeros()],
            line_count: 1,
            lines: vec![0, 1],
            vertex_to_triangle_info: vec![0, 0],
            ..GeometryBuffer::default()
        };
        g.seal();
        g
    }

    #[test]
    fn test_unsealed_buffer_fails_verify() {
        let g = GeometryBuffer::default();
        assert_eq!(g.verify(), Err(MeshError::InvalidContentHash));
    }

    #[test]
    fn test_sealed_buffer_verifies() {
        assert_eq!(sealed_buffer().verify(), Ok(()));
        assert_eq!(sealed_buffer().verify_deep(), Ok(()));
    }

    #[test]
    fn test_zero_vertices_rejected() {
        let mut g = GeometryBuffer::default();
        g.seal();
        assert_eq!(g.verify(), Err(MeshError::VertexCountZero));
    }

    #[test]
    fn test_content_hash_stable_and_sensitive() {
        let a = sealed_buffer();
        let b = sealed_buffer();
        assert_eq!(a.content_hash, b.content_hash);

        let mut c = sealed_buffer();
        c.vertex_count = 3;
        assert_ne!(c.compute_content_hash(), a.content_hash);
    }

    #[test]
    fn test_weight_slices() {
        let g = sealed_buffer();
        assert_eq!(g.vertex_weights_of(0).len(), 1);
        assert_eq!(g.vertex_weights_of(1).len(), 1);
        assert!((g.vertex_weights_of(1)[0].weight - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_virtual_to_child_map() {
        let mut g = sealed_buffer();
        g.children.push(ChildMapping {
            source_hash: 7,
            vertex_count: 2,
            vertex_info: vec![pack4_28(1, 0), pack4_28(1, 1)],
            vertex_weights: vec![VertexWeight::new(0, 1.0), VertexWeight::new(1, 1.0)],
            original_parent: vec![0, 1],
        });
        let map = g.virtual_to_child_map();
        assert_eq!(map.len(), 2);
        assert_eq!(map[0], vec![pack16(0, 0)]);
        assert_eq!(map[1], vec![pack16(0, 1)]);
    }
}
