//! Script parsing for the mixed SQL/tensor dialect.
//!
//! A script is split line by line into statements, each tagged with its kind
//! and exact source position, then validated syntactically. The splitter is
//! deliberately not a full lexer: a `;` inside a string literal or block
//! comment will end a statement. Callers embedding such text must escape at a
//! higher level.

mod classify;
mod splitter;
mod validate;

pub use classify::classify;
pub use splitter::{parse_reader, parse_script};
pub use validate::{validate_script, validate_statement};

use std::fmt;

use serde::{Deserialize, Serialize};

/// Location in a script. Lines and columns are 1-based, offsets are bytes
/// from the start of the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
}

impl Position {
    pub fn new(line: usize, column: usize, offset: usize) -> Self {
        Self { line, column, offset }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

/// A positioned parse or validation error. When `source` is present the
/// printed form appends the offending text and a caret under the column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub position: Position,
    pub message: String,
    pub source: Option<String>,
}

impl Diagnostic {
    pub fn new(position: Position, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
            source: None,
        }
    }

    pub fn with_source(
        position: Position,
        message: impl Into<String>,
        source: impl Into<String>,
    ) -> Self {
        Self {
            position,
            message: message.into(),
            source: Some(source.into()),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(text) => write!(
                f,
                "{}: {}\n{}\n{}^",
                self.position,
                self.message,
                text,
                " ".repeat(self.position.column.saturating_sub(1))
            ),
            None => write!(f, "{}: {}", self.position, self.message),
        }
    }
}

impl std::error::Error for Diagnostic {}

/// How a statement is routed: to the relational executor, the tensor engine,
/// or nowhere at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StatementKind {
    Sql,
    Tensor,
    Comment,
    Empty,
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StatementKind::Sql => "SQL",
            StatementKind::Tensor => "TENSOR",
            StatementKind::Comment => "COMMENT",
            StatementKind::Empty => "EMPTY",
        };
        f.write_str(name)
    }
}

/// One statement with its exact source span. `text` keeps the original
/// characters, terminator included, with multi-line statements joined by a
/// single line feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub text: String,
    pub position: Position,
    pub kind: StatementKind,
}

/// A parsed script: the statement sequence plus the source it came from,
/// retained so diagnostics can recompute line/column from byte offsets.
#[derive(Debug, Clone, Default)]
pub struct Script {
    pub statements: Vec<Statement>,
    pub source: String,
}

impl Script {
    /// Validate every statement, collecting all diagnostics instead of
    /// stopping at the first.
    pub fn validate(&self) -> Vec<Diagnostic> {
        validate_script(self)
    }
}
