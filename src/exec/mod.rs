//! Script execution: routes validated statements to the tensor engine or the
//! attached relational store, with strict and batch error policies.

pub mod args;
pub mod relational;

pub use relational::{RelationalStore, SqlOutcome};

use std::collections::HashSet;
use std::fmt;

use serde_json::Value;

use crate::core::schema::TensorSchema;
use crate::engine::{
    Activation, CancelToken, EngineError, Operation, Reduction, TensorDb, TensorValue,
};
use crate::parser::{parse_script, validate_statement, Diagnostic, Statement, StatementKind};

use args::{parse_call, parse_create_tensor, parse_ranges, parse_usize_list, Call};

/// Per-run policy. Strict runs stop at the first error; batch runs collect
/// errors and keep going.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecOptions {
    pub batch: bool,
}

/// What one executed statement produced.
#[derive(Debug, Clone)]
pub enum ExecOutput {
    None,
    Message(String),
    Names(Vec<String>),
    Schema { name: String, schema: TensorSchema },
    Tensor(TensorValue),
}

impl fmt::Display for ExecOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecOutput::None => Ok(()),
            ExecOutput::Message(msg) => write!(f, "{}", msg),
            ExecOutput::Names(names) => {
                if names.is_empty() {
                    return write!(f, "no tensors");
                }
                writeln!(f, "tensors ({}):", names.len())?;
                for name in names {
                    writeln!(f, "  {}", name)?;
                }
                Ok(())
            }
            ExecOutput::Schema { name, schema } => {
                writeln!(f, "Tensor: {}", name)?;
                writeln!(f, "  shape: {:?}", schema.shape)?;
                writeln!(f, "  dtype: {}", schema.dtype)?;
                writeln!(f, "  chunk_shape: {:?}", schema.chunk_shape)?;
                if !schema.compression.is_empty() {
                    writeln!(f, "  compression: {}", schema.compression)?;
                }
                if !schema.metadata.is_empty() {
                    writeln!(
                        f,
                        "  metadata: {}",
                        serde_json::to_string(&schema.metadata).unwrap_or_default()
                    )?;
                }
                Ok(())
            }
            ExecOutput::Tensor(t) => {
                const PREVIEW: usize = 16;
                write!(f, "{} shape {:?} = ", t.name, t.shape())?;
                if t.element_count() <= PREVIEW {
                    write!(f, "{:?}", t.data())
                } else {
                    write!(f, "{:?}... ({} elements)", &t.data()[..PREVIEW], t.element_count())
                }
            }
        }
    }
}

/// Outcome of a whole script run.
#[derive(Debug, Default)]
pub struct ScriptReport {
    pub statements: usize,
    pub executed: usize,
    pub skipped_sql: usize,
    pub outputs: Vec<ExecOutput>,
    pub errors: Vec<Diagnostic>,
}

impl ScriptReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

pub struct ScriptExecutor {
    db: TensorDb,
    relational: Option<Box<dyn RelationalStore>>,
    cancel: CancelToken,
}

impl ScriptExecutor {
    pub fn new(db: TensorDb) -> Self {
        Self {
            db,
            relational: None,
            cancel: CancelToken::new(),
        }
    }

    /// Attach the relational engine SQL statements forward to.
    pub fn with_relational(mut self, store: Box<dyn RelationalStore>) -> Self {
        self.relational = Some(store);
        self
    }

    pub fn db(&self) -> &TensorDb {
        &self.db
    }

    /// Token shared with every operation this executor runs.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Run a whole script. Validation covers every statement up front and
    /// reports all diagnostics; execution then follows the batch/strict
    /// policy.
    pub fn run_script(&mut self, source: &str, options: ExecOptions) -> ScriptReport {
        let script = parse_script(source);
        let mut report = ScriptReport {
            statements: script.statements.len(),
            ..ScriptReport::default()
        };

        let mut invalid: HashSet<usize> = HashSet::new();
        for (idx, stmt) in script.statements.iter().enumerate() {
            if let Err(diag) = validate_statement(stmt, &script.source) {
                invalid.insert(idx);
                report.errors.push(diag);
            }
        }
        if !options.batch && !report.errors.is_empty() {
            return report;
        }

        for (idx, stmt) in script.statements.iter().enumerate() {
            if invalid.contains(&idx) {
                continue;
            }
            match stmt.kind {
                StatementKind::Empty | StatementKind::Comment => continue,
                StatementKind::Sql => match self.relational.as_mut() {
                    Some(store) => match store.execute(&stmt.text) {
                        Ok(outcome) => {
                            report.executed += 1;
                            report.outputs.push(ExecOutput::Message(outcome.summary()));
                        }
                        Err(e) => {
                            report.errors.push(to_diagnostic(stmt, e));
                            if !options.batch {
                                return report;
                            }
                        }
                    },
                    None => {
                        tracing::debug!(statement = %stmt.text, "no relational store attached, skipping SQL");
                        report.skipped_sql += 1;
                    }
                },
                StatementKind::Tensor => match self.execute_tensor_statement(stmt) {
                    Ok(output) => {
                        report.executed += 1;
                        report.outputs.push(output);
                    }
                    Err(e) => {
                        report.errors.push(to_diagnostic(stmt, e));
                        if !options.batch {
                            return report;
                        }
                    }
                },
            }
        }

        report
    }

    /// Execute a single line (REPL and HTTP path). Returns the last output.
    pub fn execute_line(&mut self, line: &str) -> Result<ExecOutput, EngineError> {
        let script = parse_script(line);
        let mut last = ExecOutput::None;

        for stmt in &script.statements {
            validate_statement(stmt, &script.source)?;
            match stmt.kind {
                StatementKind::Empty | StatementKind::Comment => continue,
                StatementKind::Sql => match self.relational.as_mut() {
                    Some(store) => {
                        let outcome = store.execute(&stmt.text)?;
                        last = ExecOutput::Message(outcome.summary());
                    }
                    None => {
                        return Err(EngineError::UnsupportedOp(
                            "SQL statements need a relational store attached".into(),
                        ))
                    }
                },
                StatementKind::Tensor => {
                    last = self.execute_tensor_statement(stmt)?;
                }
            }
        }

        Ok(last)
    }

    fn execute_tensor_statement(&mut self, stmt: &Statement) -> Result<ExecOutput, EngineError> {
        let text = stmt.text.trim();
        let body = text.trim_end_matches(';').trim();

        if strip_prefix_ci(body, "CREATE TENSOR").is_some() {
            let parsed = parse_create_tensor(text).map_err(EngineError::InvalidOp)?;
            let schema = match parsed.chunk_shape {
                Some(chunk) => TensorSchema::with_chunks(parsed.shape, parsed.dtype, chunk),
                None => TensorSchema::dense(parsed.shape, parsed.dtype),
            };
            self.db.create_tensor(&parsed.name, schema)?;
            return Ok(ExecOutput::Message(format!("Created tensor: {}", parsed.name)));
        }

        if let Some(rest) = strip_prefix_ci(body, "DROP TENSOR") {
            let name = single_name(rest, "DROP TENSOR")?;
            self.db.drop_tensor(&name)?;
            return Ok(ExecOutput::Message(format!("Dropped tensor: {}", name)));
        }

        if strip_prefix_ci(body, "SHOW TENSORS").is_some() {
            return Ok(ExecOutput::Names(self.db.list_tensors()));
        }

        if let Some(rest) = strip_prefix_ci(body, "DESCRIBE TENSOR") {
            let name = single_name(rest, "DESCRIBE TENSOR")?;
            let schema = self.db.describe_tensor(&name)?;
            return Ok(ExecOutput::Schema { name, schema });
        }

        if let Some(rest) = strip_prefix_ci(body, "ALTER TENSOR") {
            return self.execute_alter(rest);
        }

        if strip_prefix_ci(body, "SELECT").is_some() {
            // Tensor-bearing SELECT: the relational side owns the query
            // shell, so it only runs with a store attached.
            return match self.relational.as_mut() {
                Some(store) => {
                    let outcome = store.execute(&stmt.text)?;
                    Ok(ExecOutput::Message(outcome.summary()))
                }
                None => Err(EngineError::UnsupportedOp(
                    "tensor functions inside SELECT need the relational store".into(),
                )),
            };
        }

        let call = parse_call(text).map_err(EngineError::InvalidOp)?;
        self.execute_call(&call)
    }

    fn execute_alter(&mut self, rest: &str) -> Result<ExecOutput, EngineError> {
        // ALTER TENSOR <name> SET <key> = <value>
        let mut parts = rest.trim().splitn(2, char::is_whitespace);
        let name = parts
            .next()
            .filter(|n| !n.is_empty())
            .ok_or_else(|| EngineError::InvalidOp("ALTER TENSOR expects a tensor name".into()))?
            .to_string();
        let tail = parts.next().unwrap_or("").trim();

        let assignment = strip_prefix_ci(tail, "SET").ok_or_else(|| {
            EngineError::InvalidOp("Expected: ALTER TENSOR <name> SET <key> = <value>".into())
        })?;
        let (key, raw_value) = assignment.split_once('=').ok_or_else(|| {
            EngineError::InvalidOp("Expected: ALTER TENSOR <name> SET <key> = <value>".into())
        })?;
        let key = key.trim();
        if key.is_empty() {
            return Err(EngineError::InvalidOp("metadata key must not be empty".into()));
        }

        let value = parse_metadata_value(raw_value.trim());
        self.db.set_tensor_metadata(&name, key, value)?;
        Ok(ExecOutput::Message(format!(
            "Updated metadata '{}' on tensor: {}",
            key, name
        )))
    }

    fn execute_call(&mut self, call: &Call) -> Result<ExecOutput, EngineError> {
        let op = call.operation.as_str();

        // Statement-surface forms that address the catalog directly.
        match op {
            "TENSOR_RESHAPE" => {
                let name = call
                    .positional(0, "TENSOR_RESHAPE")
                    .map_err(EngineError::InvalidOp)?
                    .to_string();
                let dims = parse_usize_list(
                    call.positional(1, "TENSOR_RESHAPE")
                        .map_err(EngineError::InvalidOp)?,
                )
                .map_err(EngineError::InvalidOp)?;
                self.db.reshape_tensor(&name, dims.clone())?;
                return Ok(ExecOutput::Message(format!(
                    "Reshaped tensor {} to {:?}",
                    name, dims
                )));
            }
            "TENSOR_SLICE" => {
                let name = call
                    .positional(0, "TENSOR_SLICE")
                    .map_err(EngineError::InvalidOp)?;
                let ranges = parse_ranges(
                    call.positional(1, "TENSOR_SLICE")
                        .map_err(EngineError::InvalidOp)?,
                )
                .map_err(EngineError::InvalidOp)?;
                let out = self.db.slice_tensor(name, &ranges)?;
                return Ok(ExecOutput::Tensor(out));
            }
            _ => {}
        }

        let receiver = call
            .positional(0, op)
            .map_err(EngineError::InvalidOp)?
            .to_string();

        let operation = match op {
            "ADD" => Operation::Add {
                operand: self.operand(call, 1)?,
            },
            "MULTIPLY" => Operation::Multiply {
                operand: self.operand(call, 1)?,
            },
            "MATRIX_MULTIPLY" => Operation::MatrixMultiply {
                operand: self.operand(call, 1)?,
            },
            "COSINE_SIMILARITY" => Operation::CosineSimilarity {
                operand: self.operand(call, 1)?,
            },
            "EUCLIDEAN_DISTANCE" => Operation::EuclideanDistance {
                operand: self.operand(call, 1)?,
            },
            "TRANSPOSE" => Operation::Transpose,
            "RELU" => Operation::Activate { kind: Activation::Relu },
            "SIGMOID" => Operation::Activate { kind: Activation::Sigmoid },
            "TANH" => Operation::Activate { kind: Activation::Tanh },
            "SVD" => Operation::Svd,
            "EIGENVALUES" => Operation::Eigenvalues,
            "SUM" | "MEAN" | "MAX" | "MIN" => {
                let kind = match op {
                    "SUM" => Reduction::Sum,
                    "MEAN" => Reduction::Mean,
                    "MAX" => Reduction::Max,
                    _ => Reduction::Min,
                };
                Operation::Reduce {
                    kind,
                    axis: call.axis().map_err(EngineError::InvalidOp)?,
                }
            }
            "CONV1D" => Operation::Conv1d {
                kernel: self.operand(call, 1)?,
                stride: call.scalar_param("stride", 1).map_err(EngineError::InvalidOp)?,
                padding: call.scalar_param("padding", 0).map_err(EngineError::InvalidOp)?,
            },
            "CONV2D" => Operation::Conv2d {
                kernel: self.operand(call, 1)?,
                stride: call
                    .pair_param("stride", (1, 1))
                    .map_err(EngineError::InvalidOp)?,
                padding: call
                    .pair_param("padding", (0, 0))
                    .map_err(EngineError::InvalidOp)?,
            },
            other => return Err(EngineError::UnsupportedOp(other.to_lowercase())),
        };

        let result = self.db.apply(&receiver, &operation, &self.cancel)?;
        Ok(ExecOutput::Tensor(result))
    }

    fn operand(&self, call: &Call, index: usize) -> Result<TensorValue, EngineError> {
        let name = call
            .positional(index, &call.operation)
            .map_err(EngineError::InvalidOp)?;
        self.db.read_tensor(name)
    }
}

fn to_diagnostic(stmt: &Statement, error: EngineError) -> Diagnostic {
    match error {
        EngineError::Syntax(diag) => diag,
        other => Diagnostic::new(stmt.position, other.to_string()),
    }
}

fn strip_prefix_ci<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&text[prefix.len()..])
    } else {
        None
    }
}

fn single_name(rest: &str, what: &str) -> Result<String, EngineError> {
    let name = rest.trim();
    if name.is_empty() || name.split_whitespace().count() != 1 {
        return Err(EngineError::InvalidOp(format!(
            "{} expects exactly one tensor name",
            what
        )));
    }
    Ok(name.to_string())
}

/// Metadata values parse as JSON scalars when possible, else as bare or
/// single-quoted strings.
fn parse_metadata_value(raw: &str) -> Value {
    if let Ok(value) = serde_json::from_str::<Value>(raw) {
        return value;
    }
    let unquoted = raw
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .unwrap_or(raw);
    Value::String(unquoted.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_metadata_value() {
        assert_eq!(parse_metadata_value("3"), Value::from(3));
        assert_eq!(parse_metadata_value("true"), Value::from(true));
        assert_eq!(parse_metadata_value("\"x\""), Value::from("x"));
        assert_eq!(parse_metadata_value("'owner'"), Value::from("owner"));
        assert_eq!(parse_metadata_value("plain"), Value::from("plain"));
    }

    #[test]
    fn test_strip_prefix_ci() {
        assert_eq!(strip_prefix_ci("drop tensor t", "DROP TENSOR"), Some(" t"));
        assert_eq!(strip_prefix_ci("DROPTENSOR", "DROP TENSOR"), None);
    }
}
