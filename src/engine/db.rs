use serde_json::Value;

use crate::catalog::TensorCatalog;
use crate::core::config::EngineConfig;
use crate::core::schema::{Range, TensorSchema};

use super::cancel::CancelToken;
use super::error::EngineError;
use super::operations::{self, Operation};
use super::tensor::TensorValue;

/// Engine facade: the catalog plus eager persistence. All mutating entry
/// points write the tensor's blob and sidecar before returning success.
#[derive(Debug)]
pub struct TensorDb {
    pub config: EngineConfig,
    catalog: TensorCatalog,
}

impl TensorDb {
    /// Open the engine at the configured data directory, recovering any
    /// previously registered tensors.
    pub fn open(config: EngineConfig) -> Result<Self, EngineError> {
        let catalog = TensorCatalog::open(&config.storage.data_dir)?;
        Ok(Self { config, catalog })
    }

    /// Open rooted at an explicit directory, defaults elsewhere.
    pub fn open_at(data_dir: impl Into<std::path::PathBuf>) -> Result<Self, EngineError> {
        Self::open(EngineConfig::with_data_dir(data_dir))
    }

    pub fn catalog(&self) -> &TensorCatalog {
        &self.catalog
    }

    /// Register a tensor with a zeroed, persisted buffer.
    pub fn create_tensor(&self, name: &str, schema: TensorSchema) -> Result<(), EngineError> {
        self.catalog.create(name, schema)
    }

    pub fn drop_tensor(&self, name: &str) -> Result<(), EngineError> {
        self.catalog.drop_tensor(name)
    }

    pub fn list_tensors(&self) -> Vec<String> {
        self.catalog.list()
    }

    pub fn describe_tensor(&self, name: &str) -> Result<TensorSchema, EngineError> {
        let handle = self.catalog.get(name)?;
        let stored = read_entry(&handle);
        Ok(stored.value.schema.clone())
    }

    /// Snapshot a registered tensor, e.g. to resolve an operand.
    pub fn read_tensor(&self, name: &str) -> Result<TensorValue, EngineError> {
        let handle = self.catalog.get(name)?;
        let stored = read_entry(&handle);
        Ok(stored.value.clone())
    }

    /// Store one chunk and persist the buffer. Cancellation is observed
    /// before any state is touched.
    pub fn store_chunk(
        &self,
        name: &str,
        indices: &[usize],
        payload: &[u8],
        cancel: &CancelToken,
    ) -> Result<(), EngineError> {
        cancel.checkpoint()?;
        let handle = self.catalog.get(name)?;
        let mut stored = write_entry(&handle);
        stored.value.store_chunk(indices, payload)?;
        self.catalog.persist(&mut stored)
    }

    pub fn get_chunk(&self, name: &str, indices: &[usize]) -> Result<Vec<u8>, EngineError> {
        let handle = self.catalog.get(name)?;
        let stored = read_entry(&handle);
        stored.value.get_chunk(indices)
    }

    /// In-place reshape, persisted.
    pub fn reshape_tensor(&self, name: &str, new_shape: Vec<usize>) -> Result<(), EngineError> {
        let handle = self.catalog.get(name)?;
        let mut stored = write_entry(&handle);
        stored.value.reshape(new_shape)?;
        self.catalog.persist(&mut stored)
    }

    /// Set one metadata key, persisted.
    pub fn set_tensor_metadata(
        &self,
        name: &str,
        key: &str,
        value: Value,
    ) -> Result<(), EngineError> {
        let handle = self.catalog.get(name)?;
        let mut stored = write_entry(&handle);
        stored.value.set_metadata(key, value);
        self.catalog.persist(&mut stored)
    }

    /// Ephemeral slice of a registered tensor; nothing is registered or
    /// persisted.
    pub fn slice_tensor(&self, name: &str, ranges: &[Range]) -> Result<TensorValue, EngineError> {
        let handle = self.catalog.get(name)?;
        let stored = read_entry(&handle);
        stored.value.slice(ranges)
    }

    /// Dispatch an operation against a registered receiver. The result is an
    /// ephemeral tensor owned by the caller; register it explicitly with
    /// `create_tensor` + chunk writes if it should live in the catalog.
    pub fn apply(
        &self,
        receiver: &str,
        operation: &Operation,
        cancel: &CancelToken,
    ) -> Result<TensorValue, EngineError> {
        let handle = self.catalog.get(receiver)?;
        let stored = read_entry(&handle);
        operations::apply(&stored.value, operation, cancel)
    }
}

fn read_entry(
    handle: &crate::catalog::TensorHandle,
) -> std::sync::RwLockReadGuard<'_, crate::catalog::StoredTensor> {
    handle.read().unwrap_or_else(|e| e.into_inner())
}

fn write_entry(
    handle: &crate::catalog::TensorHandle,
) -> std::sync::RwLockWriteGuard<'_, crate::catalog::StoredTensor> {
    handle.write().unwrap_or_else(|e| e.into_inner())
}
