//! Versioned binary records for [`GeometryBuffer`].
//!
//! Layout: a fixed header (magic, format version, flags, counts, content
//! hash, base scale) followed by the flat arrays in declaration order,
//! then each child mapping. All scalars are little-endian; there are no
//! reflective access paths.

use std::io::{Read, Write};

use crate::data::geometry::{
    ChildMapping, GeometryBuffer, VertexWeight, GEOMETRY_FORMAT_VERSION,
};
use crate::error::MeshError;
use crate::math::{Vec2, Vec3};

const MAGIC: [u8; 4] = *b"MWVM";

const FLAG_SKINNED: u32 = 1 << 0;

impl GeometryBuffer {
    /// Write the buffer as a versioned binary record.
    pub fn write_to<W: Write>(&self, w: &mut W) -> Result<(), MeshError> {
        w.write_all(&MAGIC)?;
        write_u32(w, self.format_version)?;
        let flags = if self.is_skinned { FLAG_SKINNED } else { 0 };
        write_u32(w, flags)?;
        write_u32(w, self.vertex_count)?;
        write_u32(w, self.line_count)?;
        write_u32(w, self.triangle_count)?;
        write_u32(w, self.bone_count)?;
        write_u32(w, self.vertex_weights.len() as u32)?;
        write_u32(w, self.vertex_to_triangle_indices.len() as u32)?;
        write_u32(w, self.children.len() as u32)?;
        write_u32(w, self.content_hash)?;
        write_vec3(w, &self.base_scale)?;

        write_u32_slice(w, &self.vertex_info)?;
        for vw in &self.vertex_weights {
            write_weight(w, vw)?;
        }
        for uv in &self.uvs {
            write_f32(w, uv.x)?;
            write_f32(w, uv.y)?;
        }
        write_u32_slice(w, &self.lines)?;
        write_u32_slice(w, &self.triangles)?;
        write_u32_slice(w, &self.vertex_to_triangle_info)?;
        write_u32_slice(w, &self.vertex_to_triangle_indices)?;

        for child in &self.children {
            write_u32(w, child.source_hash)?;
            write_u32(w, child.vertex_count)?;
            write_u32(w, child.vertex_weights.len() as u32)?;
            write_u32_slice(w, &child.vertex_info)?;
            for vw in &child.vertex_weights {
                write_weight(w, vw)?;
            }
            write_u32_slice(w, &child.original_parent)?;
        }
        Ok(())
    }

    /// Read a buffer back from a binary record.
    ///
    /// Validates the magic, the format version, and the stored content
    /// hash against the recomputed one, so corruption or version skew is
    /// caught before the data reaches a deformer.
    pub fn read_from<R: Read>(r: &mut R) -> Result<Self, MeshError> {
        let mut magic = [0u8; 4];
        r.read_exact(&mut magic)?;
        if magic != MAGIC {
            return Err(MeshError::CorruptRecord("bad magic"));
        }
        let format_version = read_u32(r)?;
        if format_version != GEOMETRY_FORMAT_VERSION {
            return Err(MeshError::FormatVersionMismatch {
                expected: GEOMETRY_FORMAT_VERSION,
                found: format_version,
            });
        }
        let flags = read_u32(r)?;
        let vertex_count = read_u32(r)?;
        let line_count = read_u32(r)?;
        let triangle_count = read_u32(r)?;
        let bone_count = read_u32(r)?;
        let weight_count = read_u32(r)?;
        let adjacency_count = read_u32(r)?;
        let child_count = read_u32(r)?;
        let content_hash = read_u32(r)?;
        let base_scale = read_vec3(r)?;

        let vertex_info = read_u32_vec(r, vertex_count as usize)?;
        let vertex_weights = read_weights(r, weight_count as usize)?;
        let mut uvs = Vec::with_capacity(vertex_count as usize);
        for _ in 0..vertex_count {
            uvs.push(Vec2::new(read_f32(r)?, read_f32(r)?));
        }
        let lines = read_u32_vec(r, line_count as usize * 2)?;
        let triangles = read_u32_vec(r, triangle_count as usize * 3)?;
        let vertex_to_triangle_info = read_u32_vec(r, vertex_count as usize)?;
        let vertex_to_triangle_indices = read_u32_vec(r, adjacency_count as usize)?;

        let mut children = Vec::with_capacity(child_count as usize);
        for _ in 0..child_count {
            let source_hash = read_u32(r)?;
            let child_vertex_count = read_u32(r)?;
            let child_weight_count = read_u32(r)?;
            let vertex_info = read_u32_vec(r, child_vertex_count as usize)?;
            let vertex_weights = read_weights(r, child_weight_count as usize)?;
            let original_parent = read_u32_vec(r, child_vertex_count as usize)?;
            children.push(ChildMapping {
                source_hash,
                vertex_count: child_vertex_count,
                vertex_info,
                vertex_weights,
                original_parent,
            });
        }

        let buffer = GeometryBuffer {
            is_skinned: flags & FLAG_SKINNED != 0,
            vertex_count,
            line_count,
            triangle_count,
            bone_count,
            vertex_info,
            vertex_weights,
            uvs,
            lines,
            triangles,
            vertex_to_triangle_info,
            vertex_to_triangle_indices,
            children,
            base_scale,
            content_hash,
            format_version,
        };

        if buffer.compute_content_hash() != content_hash {
            return Err(MeshError::InvalidContentHash);
        }
        Ok(buffer)
    }
}

fn write_u32<W: Write>(w: &mut W, value: u32) -> Result<(), MeshError> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_f32<W: Write>(w: &mut W, value: f32) -> Result<(), MeshError> {
    w.write_all(&value.to_le_bytes())?;
    Ok(())
}

fn write_vec3<W: Write>(w: &mut W, v: &Vec3) -> Result<(), MeshError> {
    write_f32(w, v.x)?;
    write_f32(w, v.y)?;
    write_f32(w, v.z)
}

fn write_u32_slice<W: Write>(w: &mut W, values: &[u32]) -> Result<(), MeshError> {
    for &v in values {
        write_u32(w, v)?;
    }
    Ok(())
}

fn write_weight<W: Write>(w: &mut W, vw: &VertexWeight) -> Result<(), MeshError> {
    write_vec3(w, &vw.local_pos)?;
    write_vec3(w, &vw.local_nor)?;
    write_vec3(w, &vw.local_tan)?;
    write_u32(w, vw.parent_index)?;
    write_f32(w, vw.weight)
}

fn read_u32<R: Read>(r: &mut R) -> Result<u32, MeshError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_f32<R: Read>(r: &mut R) -> Result<f32, MeshError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(f32::from_le_bytes(buf))
}

fn read_vec3<R: Read>(r: &mut R) -> Result<Vec3, MeshError> {
    Ok(Vec3::new(read_f32(r)?, read_f32(r)?, read_f32(r)?))
}

fn read_u32_vec<R: Read>(r: &mut R, len: usize) -> Result<Vec<u32>, MeshError> {
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(read_u32(r)?);
    }
    Ok(out)
}

fn read_weights<R: Read>(r: &mut R, len: usize) -> Result<Vec<VertexWeight>, MeshError> {
    let mut out = Vec::with_capacity(len);
    for _ in 0..len {
        out.push(VertexWeight {
            local_pos: read_vec3(r)?,
            local_nor: read_vec3(r)?,
            local_tan: read_vec3(r)?,
            parent_index: read_u32(r)?,
            weight: read_f32(r)?,
        });
    }
    Ok(out)
}
