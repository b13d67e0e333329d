//! Durable tensor registry: name -> schema plus the on-disk blob holding the
//! dense buffer. Schema and timestamps persist as one JSON sidecar per tensor
//! next to its blob; on open the catalog re-reads every sidecar and reloads
//! buffers, zero-filling tensors whose blob has gone missing.

mod blob;

pub use blob::BlobStore;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::schema::TensorSchema;
use crate::engine::{EngineError, TensorValue};

const META_SUFFIX: &str = ".meta.json";
const META_PREFIX: &str = "tensor_";

/// Persisted catalog record, one per tensor. `metadata` mirrors the map
/// inside the schema; recovery reads the schema copy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub name: String,
    pub schema: TensorSchema,
    #[serde(default)]
    pub metadata: std::collections::BTreeMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// In-memory state of one registered tensor. The catalog map and each entry
/// carry separate locks, so kernel reads on one tensor never block catalog
/// enumeration or operations on other names.
#[derive(Debug)]
pub struct StoredTensor {
    pub value: TensorValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

pub type TensorHandle = Arc<RwLock<StoredTensor>>;

#[derive(Debug)]
pub struct TensorCatalog {
    data_dir: PathBuf,
    blobs: BlobStore,
    entries: RwLock<BTreeMap<String, TensorHandle>>,
}

impl TensorCatalog {
    /// Open a catalog rooted at `data_dir`, creating the directory and
    /// recovering every registered tensor.
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, EngineError> {
        let data_dir = data_dir.into();
        std::fs::create_dir_all(&data_dir)?;

        let catalog = Self {
            blobs: BlobStore::new(&data_dir),
            data_dir,
            entries: RwLock::new(BTreeMap::new()),
        };
        catalog.recover()?;
        Ok(catalog)
    }

    fn recover(&self) -> Result<(), EngineError> {
        let mut entries = write_lock(&self.entries);

        for entry in std::fs::read_dir(&self.data_dir)? {
            let path = entry?.path();
            let Some(file_name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };
            if !file_name.starts_with(META_PREFIX) || !file_name.ends_with(META_SUFFIX) {
                continue;
            }

            let record: CatalogRecord = match std::fs::read_to_string(&path)
                .map_err(EngineError::from)
                .and_then(|raw| serde_json::from_str(&raw).map_err(EngineError::from))
            {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "skipping unreadable catalog record");
                    continue;
                }
            };

            let mut value = TensorValue::zeroed(record.name.clone(), record.schema.clone());
            match self.blobs.read(&record.name) {
                Ok(Some(data)) => {
                    if let Err(e) = value.replace_data(data) {
                        tracing::warn!(tensor = %record.name, error = %e, "blob does not match schema, keeping zeros");
                    }
                }
                Ok(None) => {
                    tracing::warn!(tensor = %record.name, "blob missing, tensor recovered as zeros");
                }
                Err(e) => {
                    tracing::warn!(tensor = %record.name, error = %e, "blob unreadable, tensor recovered as zeros");
                }
            }

            entries.insert(
                record.name.clone(),
                Arc::new(RwLock::new(StoredTensor {
                    value,
                    created_at: record.created_at,
                    updated_at: record.updated_at,
                })),
            );
        }

        Ok(())
    }

    /// Register a tensor and persist its zeroed buffer. If the blob cannot be
    /// written the registration is rolled back.
    pub fn create(&self, name: &str, schema: TensorSchema) -> Result<(), EngineError> {
        validate_name(name)?;
        schema.validate().map_err(EngineError::InvalidOp)?;

        let mut entries = write_lock(&self.entries);
        if entries.contains_key(name) {
            return Err(EngineError::AlreadyExists(name.to_string()));
        }

        let now = Utc::now();
        let value = TensorValue::zeroed(name, schema);
        let record = CatalogRecord {
            name: name.to_string(),
            schema: value.schema.clone(),
            metadata: value.schema.metadata.clone(),
            created_at: now,
            updated_at: now,
        };
        self.write_record(&record)?;

        if let Err(e) = self.blobs.write(name, value.data()) {
            let _ = std::fs::remove_file(self.record_path(name));
            return Err(e);
        }

        entries.insert(
            name.to_string(),
            Arc::new(RwLock::new(StoredTensor {
                value,
                created_at: now,
                updated_at: now,
            })),
        );
        tracing::info!(tensor = name, "created tensor");
        Ok(())
    }

    /// Remove a tensor's registration, blob and sidecar.
    pub fn drop_tensor(&self, name: &str) -> Result<(), EngineError> {
        // Hold the map lock across file removal so a concurrent create of the
        // same name cannot interleave with the deletes.
        let mut entries = write_lock(&self.entries);
        if entries.remove(name).is_none() {
            return Err(EngineError::UnknownTensor(name.to_string()));
        }

        self.blobs.remove(name)?;
        match std::fs::remove_file(self.record_path(name)) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        tracing::info!(tensor = name, "dropped tensor");
        Ok(())
    }

    /// Handle to a registered tensor.
    pub fn get(&self, name: &str) -> Result<TensorHandle, EngineError> {
        read_lock(&self.entries)
            .get(name)
            .cloned()
            .ok_or_else(|| EngineError::UnknownTensor(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        read_lock(&self.entries).contains_key(name)
    }

    /// All registered names in ascending order.
    pub fn list(&self) -> Vec<String> {
        read_lock(&self.entries).keys().cloned().collect()
    }

    /// Persist a mutated tensor: blob first, then the sidecar with a fresh
    /// update timestamp. The caller holds the entry's write lock.
    pub fn persist(&self, stored: &mut StoredTensor) -> Result<(), EngineError> {
        stored.updated_at = Utc::now();
        self.blobs.write(&stored.value.name, stored.value.data())?;
        self.write_record(&CatalogRecord {
            name: stored.value.name.clone(),
            schema: stored.value.schema.clone(),
            metadata: stored.value.schema.metadata.clone(),
            created_at: stored.created_at,
            updated_at: stored.updated_at,
        })
    }

    pub fn blob_store(&self) -> &BlobStore {
        &self.blobs
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn record_path(&self, name: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}{}{}", META_PREFIX, name, META_SUFFIX))
    }

    fn write_record(&self, record: &CatalogRecord) -> Result<(), EngineError> {
        let rendered = serde_json::to_string_pretty(record)?;
        std::fs::write(self.record_path(&record.name), rendered)?;
        Ok(())
    }
}

fn validate_name(name: &str) -> Result<(), EngineError> {
    let well_formed =
        !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if !well_formed {
        return Err(EngineError::InvalidOp(format!(
            "tensor name '{}' must be non-empty and alphanumeric/underscore",
            name
        )));
    }
    Ok(())
}

// Poisoned locks only happen after a panic in another thread; recover the
// guard rather than propagate a second panic.
fn read_lock<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_lock<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::schema::DEFAULT_DTYPE;

    fn temp_dir(tag: &str) -> String {
        let dir = format!("/tmp/tensordb_test_catalog_{}", tag);
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_create_get_list_drop() {
        let dir = temp_dir("basic");
        let catalog = TensorCatalog::open(&dir).unwrap();

        catalog
            .create("b", TensorSchema::dense(vec![2], DEFAULT_DTYPE))
            .unwrap();
        catalog
            .create("a", TensorSchema::dense(vec![3], DEFAULT_DTYPE))
            .unwrap();

        assert_eq!(catalog.list(), vec!["a".to_string(), "b".to_string()]);
        assert!(catalog.blob_store().exists("a"));

        let err = catalog
            .create("a", TensorSchema::dense(vec![3], DEFAULT_DTYPE))
            .unwrap_err();
        assert!(matches!(err, EngineError::AlreadyExists(_)));

        catalog.drop_tensor("a").unwrap();
        assert!(!catalog.blob_store().exists("a"));
        assert!(matches!(
            catalog.get("a"),
            Err(EngineError::UnknownTensor(_))
        ));
        assert!(matches!(
            catalog.drop_tensor("a"),
            Err(EngineError::UnknownTensor(_))
        ));

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_rejects_bad_names_and_schemas() {
        let dir = temp_dir("invalid");
        let catalog = TensorCatalog::open(&dir).unwrap();

        assert!(catalog
            .create("../escape", TensorSchema::dense(vec![2], DEFAULT_DTYPE))
            .is_err());
        assert!(catalog
            .create("t", TensorSchema::dense(vec![], DEFAULT_DTYPE))
            .is_err());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_recovery_with_missing_blob() {
        let dir = temp_dir("recovery");
        {
            let catalog = TensorCatalog::open(&dir).unwrap();
            catalog
                .create("kept", TensorSchema::dense(vec![2], DEFAULT_DTYPE))
                .unwrap();
            catalog
                .create("lost", TensorSchema::dense(vec![2], DEFAULT_DTYPE))
                .unwrap();

            let handle = catalog.get("kept").unwrap();
            let mut stored = handle.write().unwrap();
            stored.value.replace_data(vec![7.0, 8.0]).unwrap();
            catalog.persist(&mut stored).unwrap();
        }

        // Lose one blob behind the catalog's back.
        std::fs::remove_file(format!("{}/tensor_lost.bin", dir)).unwrap();

        let catalog = TensorCatalog::open(&dir).unwrap();
        assert_eq!(catalog.list(), vec!["kept".to_string(), "lost".to_string()]);

        let kept = catalog.get("kept").unwrap();
        assert_eq!(kept.read().unwrap().value.data(), &[7.0, 8.0]);

        let lost = catalog.get("lost").unwrap();
        assert_eq!(lost.read().unwrap().value.data(), &[0.0, 0.0]);

        let _ = std::fs::remove_dir_all(&dir);
    }
}
