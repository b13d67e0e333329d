pub mod bytes;
pub mod config;
pub mod schema;

// Re-export commonly used types
pub use config::EngineConfig;
pub use schema::{Range, TensorSchema, DEFAULT_DTYPE, ELEMENT_SIZE};
