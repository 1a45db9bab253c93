//! Error types shared by the geometry model, the merge pipeline, and the
//! runtime deformers.

use thiserror::Error;

/// Errors that can occur while building, validating, or consuming unified
/// geometry.
///
/// `verify()`-style functions are pure: they return the first applicable
/// error and have no side effects. Only initialization transitions
/// component state on error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MeshError {
    /// No data has been built yet.
    #[error("no data")]
    EmptyData,
    /// The stored content hash is zero or does not match the payload.
    #[error("invalid content hash")]
    InvalidContentHash,
    /// The record was produced by a different format version.
    #[error("format version mismatch (expected {expected}, found {found})")]
    FormatVersionMismatch { expected: u32, found: u32 },
    /// The geometry has no vertices.
    #[error("vertex count is zero")]
    VertexCountZero,
    /// A required geometry buffer reference is missing.
    #[error("geometry buffer is missing")]
    BufferNull,
    /// A required visual sink reference is missing.
    #[error("target sink is missing")]
    TargetSinkNull,
    /// The adapter list does not line up with the geometry's child mappings.
    #[error("child mapping count mismatch (expected {expected}, found {found})")]
    ChildCountMismatch { expected: usize, found: usize },
    /// A builder has no source adapters at all.
    #[error("no source adapters registered")]
    ChildListEmpty,
    /// A child's data hash differs from the snapshot taken at build time.
    #[error("child data hash mismatch")]
    ChildHashMismatch,
    /// A child's data version differs from the snapshot taken at build time.
    #[error("child data version mismatch")]
    ChildVersionMismatch,
    /// Source mesh arrays are inconsistent or unreadable.
    #[error("source mesh is unreadable: {0}")]
    SourceMeshUnreadable(String),
    /// The unified topology exceeds the 16-bit index ceiling of the packed
    /// weight-table format.
    #[error("unified vertex count {0} exceeds the 16-bit index limit")]
    VertexLimitExceeded(usize),
    /// A sink's vertex count does not match its child mapping.
    #[error("sink vertex count mismatch (geometry {geometry}, sink {sink})")]
    SinkVertexCountMismatch { geometry: u32, sink: u32 },
    /// An I/O error while reading or writing a serialized record.
    #[error("i/o error: {0}")]
    Io(String),
    /// A serialized record failed structural validation.
    #[error("corrupt record: {0}")]
    CorruptRecord(&'static str),
}

impl From<std::io::Error> for MeshError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(MeshError::EmptyData.to_string(), "no data");
        assert_eq!(
            MeshError::FormatVersionMismatch {
                expected: 2,
                found: 1
            }
            .to_string(),
            "format version mismatch (expected 2, found 1)"
        );
        assert_eq!(
            MeshError::VertexLimitExceeded(70000).to_string(),
            "unified vertex count 70000 exceeds the 16-bit index limit"
        );
    }
}
