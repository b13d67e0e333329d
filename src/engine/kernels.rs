//! Numeric kernels. Every kernel reads its operands, allocates a fresh
//! result tensor and never mutates its inputs. Heavy loops poll the
//! cancellation token per output row (2D) or every few thousand elements.

use std::collections::BTreeMap;

use crate::core::schema::TensorSchema;

use super::cancel::CancelToken;
use super::error::EngineError;
use super::tensor::{broadcast_shapes, flat_index, unravel_index, TensorValue};

/// How often element-wise loops poll for cancellation.
const CANCEL_STRIDE: usize = 4096;

/// Schema for a kernel result: operand dtype and compression, one chunk
/// covering the whole result, empty metadata (the dispatcher fills it in).
fn result_schema(base: &TensorSchema, shape: Vec<usize>) -> TensorSchema {
    TensorSchema {
        shape: shape.clone(),
        dtype: base.dtype.clone(),
        chunk_shape: shape,
        compression: base.compression.clone(),
        metadata: BTreeMap::new(),
    }
}

fn elementwise_binary(
    a: &TensorValue,
    b: &TensorValue,
    cancel: &CancelToken,
    op: impl Fn(f32, f32) -> f32,
) -> Result<TensorValue, EngineError> {
    let shape = broadcast_shapes(a.shape(), b.shape())?;
    let lhs = a.broadcast_to(&shape)?;
    let rhs = b.broadcast_to(&shape)?;

    let mut data = Vec::with_capacity(lhs.element_count());
    for (i, (x, y)) in lhs.data().iter().zip(rhs.data()).enumerate() {
        if i % CANCEL_STRIDE == 0 {
            cancel.checkpoint()?;
        }
        data.push(op(*x, *y));
    }

    TensorValue::new("", result_schema(&a.schema, shape), data)
}

/// Element-wise sum with broadcasting.
pub fn add(a: &TensorValue, b: &TensorValue, cancel: &CancelToken) -> Result<TensorValue, EngineError> {
    elementwise_binary(a, b, cancel, |x, y| x + y)
}

/// Element-wise product with broadcasting.
pub fn multiply(
    a: &TensorValue,
    b: &TensorValue,
    cancel: &CancelToken,
) -> Result<TensorValue, EngineError> {
    elementwise_binary(a, b, cancel, |x, y| x * y)
}

/// Matrix product of two rank-2 tensors, (m x n) * (n x p) -> (m x p).
pub fn matmul(
    a: &TensorValue,
    b: &TensorValue,
    cancel: &CancelToken,
) -> Result<TensorValue, EngineError> {
    if a.rank() != 2 || b.rank() != 2 {
        return Err(EngineError::ShapeMismatch(
            "matrix multiplication requires rank-2 tensors".into(),
        ));
    }

    let (m, n) = (a.shape()[0], a.shape()[1]);
    let (n2, p) = (b.shape()[0], b.shape()[1]);
    if n != n2 {
        return Err(EngineError::ShapeMismatch(format!(
            "inner dimensions differ: ({} x {}) * ({} x {})",
            m, n, n2, p
        )));
    }

    let lhs = a.data();
    let rhs = b.data();
    let mut data = vec![0.0f32; m * p];
    for i in 0..m {
        cancel.checkpoint()?;
        for j in 0..p {
            let mut sum = 0.0;
            for k in 0..n {
                sum += lhs[i * n + k] * rhs[k * p + j];
            }
            data[i * p + j] = sum;
        }
    }

    TensorValue::new("", result_schema(&a.schema, vec![m, p]), data)
}

/// Transpose of a rank-2 tensor.
pub fn transpose(a: &TensorValue, cancel: &CancelToken) -> Result<TensorValue, EngineError> {
    if a.rank() != 2 {
        return Err(EngineError::ShapeMismatch(
            "transpose requires a rank-2 tensor".into(),
        ));
    }

    let (rows, cols) = (a.shape()[0], a.shape()[1]);
    let src = a.data();
    let mut data = vec![0.0f32; rows * cols];
    for i in 0..rows {
        cancel.checkpoint()?;
        for j in 0..cols {
            data[j * rows + i] = src[i * cols + j];
        }
    }

    TensorValue::new("", result_schema(&a.schema, vec![cols, rows]), data)
}

/// Axis reductions share one implementation; the variant picks the fold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    Sum,
    Mean,
    Max,
    Min,
}

impl Reduction {
    pub fn tag(self) -> &'static str {
        match self {
            Reduction::Sum => "sum",
            Reduction::Mean => "mean",
            Reduction::Max => "max",
            Reduction::Min => "min",
        }
    }

    /// Fold a run of values. Empty runs reduce to zero for every variant.
    fn fold(self, values: &[f32]) -> f32 {
        if values.is_empty() {
            return 0.0;
        }
        match self {
            Reduction::Sum => values.iter().sum(),
            Reduction::Mean => values.iter().sum::<f32>() / values.len() as f32,
            Reduction::Max => values.iter().copied().fold(f32::MIN, f32::max),
            Reduction::Min => values.iter().copied().fold(f32::MAX, f32::min),
        }
    }
}

/// Reduce over the whole tensor (`axis = None`, yielding a length-1 vector)
/// or along one axis (dropping that dimension from the result shape).
pub fn reduce(
    a: &TensorValue,
    kind: Reduction,
    axis: Option<usize>,
    cancel: &CancelToken,
) -> Result<TensorValue, EngineError> {
    let axis = match axis {
        None => {
            let value = kind.fold(a.data());
            return TensorValue::new("", result_schema(&a.schema, vec![1]), vec![value]);
        }
        Some(axis) => axis,
    };

    if axis >= a.rank() {
        return Err(EngineError::ShapeMismatch(format!(
            "axis {} out of bounds for a rank-{} tensor",
            axis,
            a.rank()
        )));
    }

    let shape = a.shape();
    let mut result_shape: Vec<usize> = shape.to_vec();
    result_shape.remove(axis);
    let result_size: usize = result_shape.iter().product();
    let axis_size = shape[axis];

    let mut data = Vec::with_capacity(result_size);
    let mut full_indices = vec![0usize; shape.len()];
    let mut run = Vec::with_capacity(axis_size);
    for result_idx in 0..result_size {
        if result_idx % CANCEL_STRIDE == 0 {
            cancel.checkpoint()?;
        }
        let result_indices = unravel_index(result_idx, &result_shape);
        run.clear();
        for axis_pos in 0..axis_size {
            for (i, &idx) in result_indices.iter().enumerate() {
                let dim = if i < axis { i } else { i + 1 };
                full_indices[dim] = idx;
            }
            full_indices[axis] = axis_pos;
            run.push(a.data()[flat_index(&full_indices, shape)]);
        }
        data.push(kind.fold(&run));
    }

    TensorValue::new("", result_schema(&a.schema, result_shape), data)
}

/// Element-wise activation functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Relu,
    Sigmoid,
    Tanh,
}

impl Activation {
    pub fn tag(self) -> &'static str {
        match self {
            Activation::Relu => "relu",
            Activation::Sigmoid => "sigmoid",
            Activation::Tanh => "tanh",
        }
    }

    fn apply(self, x: f32) -> f32 {
        match self {
            Activation::Relu => x.max(0.0),
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
        }
    }
}

pub fn activation(
    a: &TensorValue,
    kind: Activation,
    cancel: &CancelToken,
) -> Result<TensorValue, EngineError> {
    let mut data = Vec::with_capacity(a.element_count());
    for (i, &x) in a.data().iter().enumerate() {
        if i % CANCEL_STRIDE == 0 {
            cancel.checkpoint()?;
        }
        data.push(kind.apply(x));
    }
    TensorValue::new("", result_schema(&a.schema, a.shape().to_vec()), data)
}

/// 1D convolution of a rank-1 input with a flipped rank-1 kernel.
/// Out-of-range input positions contribute zero.
pub fn conv1d(
    input: &TensorValue,
    kernel: &TensorValue,
    stride: usize,
    padding: usize,
    cancel: &CancelToken,
) -> Result<TensorValue, EngineError> {
    if input.rank() != 1 || kernel.rank() != 1 {
        return Err(EngineError::ShapeMismatch(
            "conv1d requires rank-1 input and kernel tensors".into(),
        ));
    }
    if stride == 0 {
        return Err(EngineError::InvalidOp("conv1d stride must be >= 1".into()));
    }

    let input_size = input.shape()[0];
    let kernel_size = kernel.shape()[0];
    let span = input_size + 2 * padding;
    if span < kernel_size {
        return Err(EngineError::ShapeMismatch(format!(
            "kernel of size {} does not fit a padded input of size {}",
            kernel_size, span
        )));
    }
    let output_size = (span - kernel_size) / stride + 1;

    let src = input.data();
    let ker = kernel.data();
    let mut data = Vec::with_capacity(output_size);
    for out_idx in 0..output_size {
        if out_idx % CANCEL_STRIDE == 0 {
            cancel.checkpoint()?;
        }
        let mut sum = 0.0;
        for k in 0..kernel_size {
            let pos = out_idx * stride + k;
            if pos < padding {
                continue;
            }
            let input_idx = pos - padding;
            if input_idx < input_size {
                sum += src[input_idx] * ker[kernel_size - 1 - k];
            }
        }
        data.push(sum);
    }

    TensorValue::new("", result_schema(&input.schema, vec![output_size]), data)
}

/// 2D convolution of a rank-2 input with a kernel flipped on both axes.
pub fn conv2d(
    input: &TensorValue,
    kernel: &TensorValue,
    stride: (usize, usize),
    padding: (usize, usize),
    cancel: &CancelToken,
) -> Result<TensorValue, EngineError> {
    if input.rank() != 2 || kernel.rank() != 2 {
        return Err(EngineError::ShapeMismatch(
            "conv2d requires rank-2 input and kernel tensors".into(),
        ));
    }
    let (stride_h, stride_w) = stride;
    if stride_h == 0 || stride_w == 0 {
        return Err(EngineError::InvalidOp("conv2d strides must be >= 1".into()));
    }

    let (input_h, input_w) = (input.shape()[0], input.shape()[1]);
    let (kernel_h, kernel_w) = (kernel.shape()[0], kernel.shape()[1]);
    let (pad_h, pad_w) = padding;

    let span_h = input_h + 2 * pad_h;
    let span_w = input_w + 2 * pad_w;
    if span_h < kernel_h || span_w < kernel_w {
        return Err(EngineError::ShapeMismatch(format!(
            "kernel {}x{} does not fit a padded input of {}x{}",
            kernel_h, kernel_w, span_h, span_w
        )));
    }
    let output_h = (span_h - kernel_h) / stride_h + 1;
    let output_w = (span_w - kernel_w) / stride_w + 1;

    let src = input.data();
    let ker = kernel.data();
    let mut data = vec![0.0f32; output_h * output_w];
    for out_y in 0..output_h {
        cancel.checkpoint()?;
        for out_x in 0..output_w {
            let mut sum = 0.0;
            for ky in 0..kernel_h {
                for kx in 0..kernel_w {
                    let pos_y = out_y * stride_h + ky;
                    let pos_x = out_x * stride_w + kx;
                    if pos_y < pad_h || pos_x < pad_w {
                        continue;
                    }
                    let in_y = pos_y - pad_h;
                    let in_x = pos_x - pad_w;
                    if in_y < input_h && in_x < input_w {
                        let flipped = (kernel_h - 1 - ky) * kernel_w + (kernel_w - 1 - kx);
                        sum += src[in_y * input_w + in_x] * ker[flipped];
                    }
                }
            }
            data[out_y * output_w + out_x] = sum;
        }
    }

    TensorValue::new("", result_schema(&input.schema, vec![output_h, output_w]), data)
}

/// Cosine similarity of two flattened tensors as a 1x1 result. A zero-norm
/// operand yields zero.
pub fn cosine_similarity(
    a: &TensorValue,
    b: &TensorValue,
    cancel: &CancelToken,
) -> Result<TensorValue, EngineError> {
    ensure_equal_length(a, b, "cosine_similarity")?;
    cancel.checkpoint()?;

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.data().iter().zip(b.data()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    norm_a = norm_a.sqrt();
    norm_b = norm_b.sqrt();

    let value = if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    };

    TensorValue::new("", result_schema(&a.schema, vec![1, 1]), vec![value])
}

/// Euclidean (L2) distance of two flattened tensors as a 1x1 result.
pub fn euclidean_distance(
    a: &TensorValue,
    b: &TensorValue,
    cancel: &CancelToken,
) -> Result<TensorValue, EngineError> {
    ensure_equal_length(a, b, "euclidean_distance")?;
    cancel.checkpoint()?;

    let sum_sq: f32 = a
        .data()
        .iter()
        .zip(b.data())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum();

    TensorValue::new("", result_schema(&a.schema, vec![1, 1]), vec![sum_sq.sqrt()])
}

fn ensure_equal_length(a: &TensorValue, b: &TensorValue, what: &str) -> Result<(), EngineError> {
    if a.element_count() != b.element_count() {
        return Err(EngineError::ShapeMismatch(format!(
            "{} requires equal element counts, got {} and {}",
            what,
            a.element_count(),
            b.element_count()
        )));
    }
    Ok(())
}

/// Placeholder singular values of a rank-2 tensor: the main diagonal as a
/// rank-1 tensor of length min(m, n). Only the shape contract is real.
pub fn svd(a: &TensorValue, cancel: &CancelToken) -> Result<TensorValue, EngineError> {
    if a.rank() != 2 {
        return Err(EngineError::ShapeMismatch("svd requires a rank-2 tensor".into()));
    }
    cancel.checkpoint()?;

    let (m, n) = (a.shape()[0], a.shape()[1]);
    let k = m.min(n);
    let data: Vec<f32> = (0..k).map(|i| a.data()[i * n + i]).collect();

    TensorValue::new("", result_schema(&a.schema, vec![k]), data)
}

/// Placeholder eigenvalues of a square rank-2 tensor. The 2x2 case solves
/// the characteristic polynomial (real parts only); larger matrices return
/// the diagonal.
pub fn eigenvalues(a: &TensorValue, cancel: &CancelToken) -> Result<TensorValue, EngineError> {
    if a.rank() != 2 || a.shape()[0] != a.shape()[1] {
        return Err(EngineError::ShapeMismatch(
            "eigenvalues require a square rank-2 tensor".into(),
        ));
    }
    cancel.checkpoint()?;

    let n = a.shape()[0];
    let src = a.data();
    let data = if n == 2 {
        let (a00, a01, a10, a11) = (src[0], src[1], src[2], src[3]);
        let trace = a00 + a11;
        let det = a00 * a11 - a01 * a10;
        let discriminant = trace * trace - 4.0 * det;
        if discriminant >= 0.0 {
            let root = discriminant.sqrt();
            vec![(trace + root) / 2.0, (trace - root) / 2.0]
        } else {
            // Complex pair: real parts only.
            vec![trace / 2.0, trace / 2.0]
        }
    } else {
        (0..n).map(|i| src[i * n + i]).collect()
    };

    TensorValue::new("", result_schema(&a.schema, vec![n]), data)
}
