// src/lib.rs

pub mod catalog;
pub mod core;
pub mod engine;
pub mod exec;
pub mod parser;
pub mod server;

// Re-exports for a clean API from outside the crate
pub use catalog::{BlobStore, CatalogRecord, TensorCatalog};
pub use core::{EngineConfig, Range, TensorSchema};
pub use engine::kernels;
pub use engine::{
    broadcast_shapes, Activation, CancelToken, EngineError, Operation, Reduction, TensorDb,
    TensorValue,
};
pub use exec::{ExecOptions, ExecOutput, RelationalStore, ScriptExecutor, ScriptReport};
pub use parser::{
    classify, parse_script, validate_script, Diagnostic, Position, Script, Statement,
    StatementKind,
};
