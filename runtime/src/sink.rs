//! The exposed visual-sink seam.
//!
//! A sink is the host-side visual mesh an adapter writes simulated
//! vertices into. The adapter drives it through a narrow contract: buffer
//! swapping between the authored and working copies, attribute writes,
//! and a vertex-layout probe that decides the write path once at init.

use meshweave_core::data::VertexWeight;
use meshweave_core::math::{Vec3, Vec4};

/// What kind of target the sink renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkKind {
    /// Bone-skinned renderer.
    SkinnedTarget,
    /// Static mesh behind a single transform.
    StaticTarget,
}

/// How the adapter writes vertices, decided once at init.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WritePath {
    /// Positions and normals stream into the sink's interleaved vertex
    /// buffer in one write.
    Direct,
    /// Full per-attribute host arrays are rewritten.
    Staged,
}

/// When simulation for an invisible object is culled, what happens to its
/// visual mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CullingMode {
    /// Never cull; always calculate.
    #[default]
    Off,
    /// Freeze in place while invisible.
    Pause,
    /// Restore the authored pose while invisible.
    Reset,
}

/// Vertex attribute semantics a sink can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkSemantic {
    Position,
    Normal,
    Tangent,
    TexCoord,
    Joints,
    Weights,
}

/// Vertex attribute formats a sink can expose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkFormat {
    Float32x2,
    Float32x3,
    Float32x4,
    Uint16x4,
    Unorm8x4,
}

impl SinkFormat {
    pub fn size(&self) -> u32 {
        match self {
            Self::Float32x2 => 8,
            Self::Float32x3 => 12,
            Self::Float32x4 => 16,
            Self::Uint16x4 => 8,
            Self::Unorm8x4 => 4,
        }
    }
}

/// One attribute in a sink's vertex layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkAttribute {
    pub semantic: SinkSemantic,
    pub format: SinkFormat,
    pub offset: u32,
    pub buffer: u32,
}

/// A sink's vertex layout, as reported by the layout probe.
#[derive(Debug, Clone, Default)]
pub struct SinkLayout {
    pub attributes: Vec<SinkAttribute>,
}

impl SinkLayout {
    /// The layout the direct write path requires: position and normal
    /// interleaved at the head of buffer 0, both three-component f32.
    pub fn position_normal_interleaved() -> Self {
        Self {
            attributes: vec![
                SinkAttribute {
                    semantic: SinkSemantic::Position,
                    format: SinkFormat::Float32x3,
                    offset: 0,
                    buffer: 0,
                },
                SinkAttribute {
                    semantic: SinkSemantic::Normal,
                    format: SinkFormat::Float32x3,
                    offset: 12,
                    buffer: 0,
                },
            ],
        }
    }

    /// Whether the direct write path can stream into this layout.
    pub fn supports_direct_write(&self) -> bool {
        let position_ok = self.attributes.iter().any(|a| {
            a.semantic == SinkSemantic::Position
                && a.format == SinkFormat::Float32x3
                && a.offset == 0
                && a.buffer == 0
        });
        let normal_ok = self.attributes.iter().any(|a| {
            a.semantic == SinkSemantic::Normal
                && a.format == SinkFormat::Float32x3
                && a.offset == 12
                && a.buffer == 0
        });
        position_ok && normal_ok
    }
}

/// Host-side visual mesh target driven by a
/// [`SourceMeshAdapter`](crate::deformer::SourceMeshAdapter).
///
/// The sink keeps two copies of its mesh: the authored copy and a working
/// copy the simulation writes into. [`swap_active_buffer`] switches which
/// one renders; restoring the authored pose is just a swap back, so an
/// adapter in error state never has to write anything.
///
/// [`swap_active_buffer`]: VisualSink::swap_active_buffer
pub trait VisualSink {
    fn kind(&self) -> SinkKind;

    fn vertex_count(&self) -> u32;

    /// The working copy's vertex layout.
    fn layout(&self) -> SinkLayout;

    /// Whether the renderer currently draws this sink.
    fn is_visible(&self) -> bool;

    /// Switch rendering between the working copy (true) and the authored
    /// copy (false).
    fn swap_active_buffer(&mut self, use_working: bool);

    /// Direct path: one interleaved position+normal blob matching
    /// [`SinkLayout::position_normal_interleaved`]. When `write_normals`
    /// is false only the position lanes are meaningful and the sink keeps
    /// its current normals.
    fn write_vertex_buffer(&mut self, interleaved: &[u8], write_normals: bool);

    /// Staged path: rewrite the position array.
    fn write_positions(&mut self, positions: &[Vec3]);

    /// Staged path: rewrite normal and/or tangent arrays.
    fn write_normals_tangents(&mut self, normals: Option<&[Vec3]>, tangents: Option<&[Vec4]>);

    /// Rewrite the bone weights of the working copy (packed `(count,
    /// start)` info plus the weight table).
    fn write_bone_weights(&mut self, vertex_info: &[u32], weights: &[VertexWeight]);

    /// Copy the authored normals/tangents back into the working copy.
    fn restore_authored_normals_tangents(&mut self);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interleaved_layout_supports_direct() {
        assert!(SinkLayout::position_normal_interleaved().supports_direct_write());
    }

    #[test]
    fn test_position_only_layout_is_staged() {
        let layout = SinkLayout {
            attributes: vec![SinkAttribute {
                semantic: SinkSemantic::Position,
                format: SinkFormat::Float32x3,
                offset: 0,
                buffer: 0,
            }],
        };
        assert!(!layout.supports_direct_write());
    }

    #[test]
    fn test_offset_position_layout_is_staged() {
        let mut layout = SinkLayout::position_normal_interleaved();
        layout.attributes[0].offset = 4;
        assert!(!layout.supports_direct_write());
    }

    #[test]
    fn test_format_sizes() {
        assert_eq!(SinkFormat::Float32x3.size(), 12);
        assert_eq!(SinkFormat::Unorm8x4.size(), 4);
    }
}
