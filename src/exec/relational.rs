use serde_json::Value;

use crate::engine::EngineError;

/// Result of forwarding one SQL statement to the relational side.
#[derive(Debug, Clone, Default)]
pub struct SqlOutcome {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
    pub affected: u64,
}

impl SqlOutcome {
    pub fn summary(&self) -> String {
        if self.columns.is_empty() {
            format!("OK, {} rows affected", self.affected)
        } else {
            format!("{} rows", self.rows.len())
        }
    }
}

/// Interface to the relational engine that shares the catalog with the
/// tensor core. The core ships no implementation: rows live as opaque
/// serialized blobs on the other side of this boundary, and scripts run
/// without one by skipping their SQL statements.
pub trait RelationalStore: Send {
    fn execute(&mut self, statement: &str) -> Result<SqlOutcome, EngineError>;
}
