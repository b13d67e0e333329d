use once_cell::sync::Lazy;
use regex::Regex;

use super::StatementKind;

/// Statement prefixes that are unambiguously tensor dialect.
const TENSOR_PREFIXES: &[&str] = &[
    "CREATE TENSOR",
    "DROP TENSOR",
    "ALTER TENSOR",
    "SHOW TENSORS",
    "DESCRIBE TENSOR",
    "COSINE_SIMILARITY",
    "EUCLIDEAN_DISTANCE",
    "TENSOR_SLICE",
    "TENSOR_RESHAPE",
    "TRANSPOSE",
    "MATRIX_MULTIPLY",
    "RELU",
    "SIGMOID",
    "TANH",
    "SVD",
    "EIGENVALUES",
    "CONV1D",
    "CONV2D",
    "ADD",
    "MULTIPLY",
];

/// Tensor functions that mark a statement as tensor-bearing wherever they
/// appear, so a `SELECT` invoking them routes to the tensor executor.
const TENSOR_FUNCTIONS: &[&str] = &[
    "COSINE_SIMILARITY",
    "EUCLIDEAN_DISTANCE",
    "TENSOR_SLICE",
    "TENSOR_RESHAPE",
];

/// Standalone reduction calls. SUM/MEAN/MAX/MIN are otherwise ambiguous with
/// relational aggregates and default to SQL.
static STANDALONE_REDUCTION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(SUM|MEAN|MAX|MIN)\(\w+\s*(,\s*axis\s*=\s*\d+)?\s*\)$")
        .expect("static pattern")
});

/// Determine the kind of a statement from its text alone.
pub fn classify(text: &str) -> StatementKind {
    let trimmed = text.trim();

    if trimmed.is_empty() {
        return StatementKind::Empty;
    }

    if trimmed.starts_with("--") || trimmed.starts_with("/*") {
        return StatementKind::Comment;
    }

    let upper = trimmed.to_uppercase();

    for prefix in TENSOR_PREFIXES {
        if upper.starts_with(prefix) {
            return StatementKind::Tensor;
        }
    }

    for function in TENSOR_FUNCTIONS {
        if upper.contains(function) {
            return StatementKind::Tensor;
        }
    }

    if is_standalone_reduction(trimmed) {
        return StatementKind::Tensor;
    }

    StatementKind::Sql
}

fn is_standalone_reduction(trimmed: &str) -> bool {
    let body = trimmed.strip_suffix(';').map(str::trim).unwrap_or(trimmed);
    STANDALONE_REDUCTION.is_match(body)
}
