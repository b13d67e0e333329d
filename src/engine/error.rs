use thiserror::Error;

use crate::parser::Diagnostic;

/// Every failure the tensor engine surfaces. Entry points return exactly one
/// of these; callers branch on the kind, not on message text.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Splitter or validator rejected a statement.
    #[error("{0}")]
    Syntax(Diagnostic),

    #[error("tensor not found: {0}")]
    UnknownTensor(String),

    #[error("tensor already exists: {0}")]
    AlreadyExists(String),

    /// Operand ranks or dimensions are incompatible.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    /// Chunk indices outside the per-dimension chunk counts, or a chunk that
    /// would run past the end of the buffer.
    #[error("chunk out of range: {0}")]
    ChunkOutOfRange(String),

    /// Payload length does not match the chunk element count, or is not a
    /// multiple of the element size.
    #[error("bad payload: {0}")]
    BadPayload(String),

    /// NaN or infinity in an input buffer.
    #[error("invalid value: {0}")]
    InvalidValue(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOp(String),

    #[error("invalid operation: {0}")]
    InvalidOp(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("operation cancelled")]
    Cancelled,
}

impl From<Diagnostic> for EngineError {
    fn from(diag: Diagnostic) -> Self {
        EngineError::Syntax(diag)
    }
}
