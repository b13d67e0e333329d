use serde_json::Value;

use crate::core::bytes::{bytes_to_f32, f32_to_bytes};
use crate::core::schema::{Range, TensorSchema};

use super::error::EngineError;

/// Upper bound on the element count of a slice result. Larger requests are
/// rejected rather than materialized.
pub const MAX_SLICE_ELEMENTS: usize = 1_000_000;

/// A dense tensor: schema plus an exclusively-owned row-major `f32` buffer.
/// Slicing and every kernel produce a fresh `TensorValue`; nothing aliases.
#[derive(Debug, Clone, PartialEq)]
pub struct TensorValue {
    pub name: String,
    pub schema: TensorSchema,
    data: Vec<f32>,
}

impl TensorValue {
    /// Build a tensor, verifying the buffer length against the shape.
    pub fn new(
        name: impl Into<String>,
        schema: TensorSchema,
        data: Vec<f32>,
    ) -> Result<Self, EngineError> {
        let expected = schema.element_count();
        if data.len() != expected {
            return Err(EngineError::ShapeMismatch(format!(
                "buffer length {} does not match shape {:?} (expected {})",
                data.len(),
                schema.shape,
                expected
            )));
        }
        Ok(Self {
            name: name.into(),
            schema,
            data,
        })
    }

    /// All-zeros tensor for a schema (the state right after creation).
    pub fn zeroed(name: impl Into<String>, schema: TensorSchema) -> Self {
        let len = schema.element_count();
        Self {
            name: name.into(),
            schema,
            data: vec![0.0; len],
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.schema.shape
    }

    pub fn rank(&self) -> usize {
        self.schema.rank()
    }

    pub fn element_count(&self) -> usize {
        self.data.len()
    }

    pub fn data(&self) -> &[f32] {
        &self.data
    }

    /// Replace the whole buffer, e.g. when loading a persisted blob.
    pub(crate) fn replace_data(&mut self, data: Vec<f32>) -> Result<(), EngineError> {
        if data.len() != self.schema.element_count() {
            return Err(EngineError::BadPayload(format!(
                "blob holds {} elements, tensor {:?} expects {}",
                data.len(),
                self.schema.shape,
                self.schema.element_count()
            )));
        }
        self.data = data;
        Ok(())
    }

    pub fn set_metadata(&mut self, key: impl Into<String>, value: Value) {
        self.schema.metadata.insert(key.into(), value);
    }

    /// Row-major flat index of a multi-index (last dimension fastest).
    pub fn flat_index(&self, indices: &[usize]) -> usize {
        flat_index(indices, &self.schema.shape)
    }

    /// Store one chunk-aligned payload. Validates rank, per-dimension chunk
    /// counts, payload length, buffer bounds and element values before any
    /// element is written.
    pub fn store_chunk(&mut self, indices: &[usize], payload: &[u8]) -> Result<(), EngineError> {
        let start = self.chunk_start(indices)?;
        let chunk_len = self.schema.chunk_element_count();

        let values = bytes_to_f32(payload).ok_or_else(|| {
            EngineError::BadPayload(format!(
                "payload length {} is not a multiple of the element size",
                payload.len()
            ))
        })?;
        if values.len() != chunk_len {
            return Err(EngineError::BadPayload(format!(
                "payload holds {} elements, chunk expects {}",
                values.len(),
                chunk_len
            )));
        }

        if let Some(pos) = values.iter().position(|v| !v.is_finite()) {
            return Err(EngineError::InvalidValue(format!(
                "non-finite value at payload position {}",
                pos
            )));
        }

        self.data[start..start + chunk_len].copy_from_slice(&values);
        Ok(())
    }

    /// Fetch one chunk as a freshly-allocated byte payload.
    pub fn get_chunk(&self, indices: &[usize]) -> Result<Vec<u8>, EngineError> {
        let start = self.chunk_start(indices)?;
        let chunk_len = self.schema.chunk_element_count();
        Ok(f32_to_bytes(&self.data[start..start + chunk_len]))
    }

    /// Validate chunk coordinates and compute the starting flat offset.
    ///
    /// The chunk at coordinate `i` along dimension `d` starts at element
    /// `i * chunk_shape[d]`; the payload occupies `Π(chunk_shape)` contiguous
    /// elements from there. This matches a tiled layout only when chunk
    /// boundaries coincide with contiguous row-major regions.
    fn chunk_start(&self, indices: &[usize]) -> Result<usize, EngineError> {
        if indices.len() != self.rank() {
            return Err(EngineError::ShapeMismatch(format!(
                "chunk coordinate has {} entries, tensor rank is {}",
                indices.len(),
                self.rank()
            )));
        }

        for (dim, &idx) in indices.iter().enumerate() {
            let count = self.schema.chunks_along(dim);
            if idx >= count {
                return Err(EngineError::ChunkOutOfRange(format!(
                    "chunk index {} exceeds {} chunks along dimension {}",
                    idx, count, dim
                )));
            }
        }

        let element_indices: Vec<usize> = indices
            .iter()
            .zip(&self.schema.chunk_shape)
            .map(|(&idx, &chunk)| idx * chunk.max(1))
            .collect();
        let start = self.flat_index(&element_indices);
        let chunk_len = self.schema.chunk_element_count();

        if start + chunk_len > self.data.len() {
            return Err(EngineError::ChunkOutOfRange(format!(
                "chunk at {:?} spans elements {}..{} past buffer length {}",
                indices,
                start,
                start + chunk_len,
                self.data.len()
            )));
        }

        Ok(start)
    }

    /// Copy out a sub-tensor. One range per dimension, each non-empty and in
    /// bounds; the result owns its buffer and keeps the input rank.
    pub fn slice(&self, ranges: &[Range]) -> Result<TensorValue, EngineError> {
        if ranges.len() != self.rank() {
            return Err(EngineError::ShapeMismatch(format!(
                "{} ranges for a rank-{} tensor",
                ranges.len(),
                self.rank()
            )));
        }

        for (dim, range) in ranges.iter().enumerate() {
            if range.is_empty() || range.end > self.schema.shape[dim] {
                return Err(EngineError::ShapeMismatch(format!(
                    "invalid range [{}, {}) for dimension {} of size {}",
                    range.start, range.end, dim, self.schema.shape[dim]
                )));
            }
        }

        let out_shape: Vec<usize> = ranges.iter().map(Range::len).collect();
        let total: usize = out_shape.iter().product();
        if total > MAX_SLICE_ELEMENTS {
            return Err(EngineError::InvalidOp(format!(
                "slice of {} elements exceeds the {} element limit",
                total, MAX_SLICE_ELEMENTS
            )));
        }

        let mut data = Vec::with_capacity(total);
        let mut src_indices = vec![0usize; self.rank()];
        for flat in 0..total {
            let out_indices = unravel_index(flat, &out_shape);
            for (i, out_idx) in out_indices.iter().enumerate() {
                src_indices[i] = out_idx + ranges[i].start;
            }
            data.push(self.data[self.flat_index(&src_indices)]);
        }

        let mut schema = self.schema.clone();
        schema.shape = out_shape.clone();
        schema.chunk_shape = out_shape;
        TensorValue::new(format!("{}_slice", self.name), schema, data)
    }

    /// Change the shape in place. The buffer is untouched, so the element
    /// counts must agree.
    pub fn reshape(&mut self, new_shape: Vec<usize>) -> Result<(), EngineError> {
        let new_count: usize = new_shape.iter().product();
        if new_count != self.data.len() {
            return Err(EngineError::ShapeMismatch(format!(
                "cannot reshape {:?} ({} elements) into {:?} ({} elements)",
                self.schema.shape,
                self.data.len(),
                new_shape,
                new_count
            )));
        }
        self.schema.shape = new_shape.clone();
        self.schema.chunk_shape = new_shape;
        Ok(())
    }

    /// Materialize this tensor repeated along its size-1 axes to fill
    /// `target_shape`. Fails when the shapes are not broadcast-compatible.
    pub fn broadcast_to(&self, target_shape: &[usize]) -> Result<TensorValue, EngineError> {
        let broadcast = broadcast_shapes(&self.schema.shape, target_shape)?;
        let total: usize = broadcast.iter().product();
        let rank = self.rank();
        let pad = broadcast.len() - rank;

        let mut data = Vec::with_capacity(total);
        let mut src_indices = vec![0usize; rank];
        for flat in 0..total {
            let indices = unravel_index(flat, &broadcast);
            for j in 0..rank {
                src_indices[j] = if self.schema.shape[j] == 1 {
                    0
                } else {
                    indices[pad + j]
                };
            }
            data.push(self.data[self.flat_index(&src_indices)]);
        }

        let mut schema = self.schema.clone();
        schema.shape = broadcast.clone();
        schema.chunk_shape = broadcast;
        TensorValue::new(format!("{}_broadcast", self.name), schema, data)
    }
}

/// Broadcast two shapes by right-alignment: each pair of extents must be
/// equal or contain a 1; the result takes the maximum.
pub fn broadcast_shapes(a: &[usize], b: &[usize]) -> Result<Vec<usize>, EngineError> {
    let rank = a.len().max(b.len());
    let mut out = vec![0usize; rank];

    for i in 0..rank {
        let da = if i + a.len() >= rank { a[i + a.len() - rank] } else { 1 };
        let db = if i + b.len() >= rank { b[i + b.len() - rank] } else { 1 };
        if da != db && da != 1 && db != 1 {
            return Err(EngineError::ShapeMismatch(format!(
                "shapes {:?} and {:?} are not broadcast-compatible",
                a, b
            )));
        }
        out[i] = da.max(db);
    }

    Ok(out)
}

/// Row-major flat index for a multi-index within `shape`.
pub fn flat_index(indices: &[usize], shape: &[usize]) -> usize {
    let mut index = 0;
    let mut stride = 1;
    for i in (0..indices.len()).rev() {
        index += indices[i] * stride;
        stride *= shape[i];
    }
    index
}

/// Inverse of `flat_index`.
pub fn unravel_index(mut flat: usize, shape: &[usize]) -> Vec<usize> {
    let mut indices = vec![0usize; shape.len()];
    for i in (0..shape.len()).rev() {
        indices[i] = flat % shape[i];
        flat /= shape[i];
    }
    indices
}
