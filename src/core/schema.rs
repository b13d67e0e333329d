use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Element type every kernel computes in. The dtype name is stored per
/// tensor, but the engine currently materializes all buffers as `f32`.
pub const DEFAULT_DTYPE: &str = "float32";

/// Bytes per stored element (`f32`).
pub const ELEMENT_SIZE: usize = std::mem::size_of::<f32>();

/// Shape, dtype and chunking metadata for one tensor.
///
/// `chunk_shape` always has the same rank as `shape`. `compression` is an
/// opaque tag carried through persistence; `metadata` is a free-form map the
/// kernels write result annotations into.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TensorSchema {
    pub shape: Vec<usize>,
    pub dtype: String,
    pub chunk_shape: Vec<usize>,
    #[serde(default)]
    pub compression: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, Value>,
}

impl TensorSchema {
    /// Schema with one chunk covering the whole tensor.
    pub fn dense(shape: Vec<usize>, dtype: impl Into<String>) -> Self {
        let chunk_shape = shape.clone();
        Self {
            shape,
            dtype: dtype.into(),
            chunk_shape,
            compression: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_chunks(shape: Vec<usize>, dtype: impl Into<String>, chunk_shape: Vec<usize>) -> Self {
        Self {
            shape,
            dtype: dtype.into(),
            chunk_shape,
            compression: String::new(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements, Π(shape).
    pub fn element_count(&self) -> usize {
        self.shape.iter().product()
    }

    /// Elements per chunk, Π(chunk_shape).
    pub fn chunk_element_count(&self) -> usize {
        self.chunk_shape.iter().product()
    }

    /// Number of chunks along `dim`: ceil(shape / chunk_shape).
    pub fn chunks_along(&self, dim: usize) -> usize {
        let size = self.shape[dim];
        let chunk = self.chunk_shape[dim].max(1);
        (size + chunk - 1) / chunk
    }

    /// Structural validity: rank >= 1, every dimension positive, and a
    /// chunk shape of matching rank with positive entries.
    pub fn validate(&self) -> Result<(), String> {
        if self.shape.is_empty() {
            return Err("tensor shape must have at least one dimension".into());
        }
        if let Some(pos) = self.shape.iter().position(|&d| d == 0) {
            return Err(format!("shape dimension {} must be positive", pos));
        }
        if self.chunk_shape.len() != self.shape.len() {
            return Err(format!(
                "chunk shape rank {} does not match tensor rank {}",
                self.chunk_shape.len(),
                self.shape.len()
            ));
        }
        if let Some(pos) = self.chunk_shape.iter().position(|&d| d == 0) {
            return Err(format!("chunk dimension {} must be positive", pos));
        }
        Ok(())
    }
}

/// Half-open index range along one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Range {
    pub start: usize,
    pub end: usize,
}

impl Range {
    pub fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.end <= self.start
    }
}
