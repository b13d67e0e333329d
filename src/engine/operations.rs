use serde_json::json;

use super::cancel::CancelToken;
use super::error::EngineError;
use super::kernels::{self, Activation, Reduction};
use super::tensor::TensorValue;

/// One tensor operation with its typed parameters. Operand tensors are
/// resolved by the caller before dispatch, so the engine never chases names
/// from inside a kernel.
#[derive(Debug, Clone)]
pub enum Operation {
    Add { operand: TensorValue },
    Multiply { operand: TensorValue },
    MatrixMultiply { operand: TensorValue },
    Transpose,
    Reduce { kind: Reduction, axis: Option<usize> },
    Activate { kind: Activation },
    Conv1d { kernel: TensorValue, stride: usize, padding: usize },
    Conv2d { kernel: TensorValue, stride: (usize, usize), padding: (usize, usize) },
    CosineSimilarity { operand: TensorValue },
    EuclideanDistance { operand: TensorValue },
    Svd,
    Eigenvalues,
}

impl Operation {
    /// The operation tag recorded in result metadata.
    pub fn tag(&self) -> &'static str {
        match self {
            Operation::Add { .. } => "add",
            Operation::Multiply { .. } => "multiply",
            Operation::MatrixMultiply { .. } => "matrix_multiply",
            Operation::Transpose => "transpose",
            Operation::Reduce { kind, .. } => kind.tag(),
            Operation::Activate { kind } => kind.tag(),
            Operation::Conv1d { .. } => "conv1d",
            Operation::Conv2d { .. } => "conv2d",
            Operation::CosineSimilarity { .. } => "cosine_similarity",
            Operation::EuclideanDistance { .. } => "euclidean_distance",
            Operation::Svd => "svd",
            Operation::Eigenvalues => "eigenvalues",
        }
    }
}

/// Dispatch an operation against a receiver tensor. The result is a fresh
/// tensor named after the operation, annotated with the tag and its salient
/// parameters; the receiver is never mutated.
pub fn apply(
    receiver: &TensorValue,
    operation: &Operation,
    cancel: &CancelToken,
) -> Result<TensorValue, EngineError> {
    let tag = operation.tag();

    let mut result = match operation {
        Operation::Add { operand } => {
            let mut out = kernels::add(receiver, operand, cancel)?;
            out.name = format!("{}_plus_{}", receiver.name, operand.name);
            out
        }
        Operation::Multiply { operand } => {
            let mut out = kernels::multiply(receiver, operand, cancel)?;
            out.name = format!("{}_times_{}", receiver.name, operand.name);
            out
        }
        Operation::MatrixMultiply { operand } => {
            let mut out = kernels::matmul(receiver, operand, cancel)?;
            out.name = format!("{}_matmul_{}", receiver.name, operand.name);
            out
        }
        Operation::Transpose => {
            let mut out = kernels::transpose(receiver, cancel)?;
            out.name = format!("{}_transpose", receiver.name);
            out
        }
        Operation::Reduce { kind, axis } => {
            let mut out = kernels::reduce(receiver, *kind, *axis, cancel)?;
            out.name = format!("{}_{}", receiver.name, kind.tag());
            out.set_metadata("axis", json!(axis.map(|a| a as i64).unwrap_or(-1)));
            out
        }
        Operation::Activate { kind } => {
            let mut out = kernels::activation(receiver, *kind, cancel)?;
            out.name = format!("{}_{}", receiver.name, kind.tag());
            out
        }
        Operation::Conv1d { kernel, stride, padding } => {
            let mut out = kernels::conv1d(receiver, kernel, *stride, *padding, cancel)?;
            out.name = format!("{}_conv1d", receiver.name);
            out.set_metadata("kernel_size", json!(kernel.shape()[0]));
            out.set_metadata("stride", json!(stride));
            out.set_metadata("padding", json!(padding));
            out
        }
        Operation::Conv2d { kernel, stride, padding } => {
            let mut out = kernels::conv2d(receiver, kernel, *stride, *padding, cancel)?;
            out.name = format!("{}_conv2d", receiver.name);
            out.set_metadata("kernel_size", json!([kernel.shape()[0], kernel.shape()[1]]));
            out.set_metadata("stride", json!([stride.0, stride.1]));
            out.set_metadata("padding", json!([padding.0, padding.1]));
            out
        }
        Operation::CosineSimilarity { operand } => {
            let mut out = kernels::cosine_similarity(receiver, operand, cancel)?;
            out.name = format!("{}_cosine_{}", receiver.name, operand.name);
            out
        }
        Operation::EuclideanDistance { operand } => {
            let mut out = kernels::euclidean_distance(receiver, operand, cancel)?;
            out.name = format!("{}_distance_{}", receiver.name, operand.name);
            out
        }
        Operation::Svd => {
            let mut out = kernels::svd(receiver, cancel)?;
            out.name = format!("{}_svd_s", receiver.name);
            out
        }
        Operation::Eigenvalues => {
            let mut out = kernels::eigenvalues(receiver, cancel)?;
            out.name = format!("{}_eigenvalues", receiver.name);
            out
        }
    };

    result.set_metadata("operation", json!(tag));
    Ok(result)
}
