use std::path::{Path, PathBuf};

use crate::core::bytes::{bytes_to_f32, f32_to_bytes};
use crate::engine::EngineError;

/// One raw `.bin` file per tensor: the dense buffer in native byte order,
/// no header. Paths derive from the tensor name inside a data directory.
#[derive(Debug, Clone)]
pub struct BlobStore {
    dir: PathBuf,
}

impl BlobStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("tensor_{}.bin", name))
    }

    pub fn exists(&self, name: &str) -> bool {
        self.path(name).exists()
    }

    /// Write the full buffer for a tensor, replacing any previous blob.
    pub fn write(&self, name: &str, data: &[f32]) -> Result<(), EngineError> {
        std::fs::write(self.path(name), f32_to_bytes(data))?;
        Ok(())
    }

    /// Read a tensor's buffer. `None` when no blob exists for the name.
    pub fn read(&self, name: &str) -> Result<Option<Vec<f32>>, EngineError> {
        let path = self.path(name);
        let raw = match std::fs::read(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let values = bytes_to_f32(&raw).ok_or_else(|| {
            EngineError::BadPayload(format!(
                "blob {} has length {} which is not a multiple of the element size",
                path.display(),
                raw.len()
            ))
        })?;
        Ok(Some(values))
    }

    /// Remove a tensor's blob. Removing an absent blob is not an error.
    pub fn remove(&self, name: &str) -> Result<(), EngineError> {
        match std::fs::remove_file(self.path(name)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_round_trip() {
        let dir = "/tmp/tensordb_test_blob_round_trip";
        let _ = std::fs::remove_dir_all(dir);
        std::fs::create_dir_all(dir).unwrap();

        let store = BlobStore::new(dir);
        assert!(store.read("w").unwrap().is_none());

        store.write("w", &[1.0, 2.5, -3.0]).unwrap();
        assert!(store.path("w").ends_with("tensor_w.bin"));
        assert_eq!(store.read("w").unwrap().unwrap(), vec![1.0, 2.5, -3.0]);

        store.remove("w").unwrap();
        assert!(!store.exists("w"));
        store.remove("w").unwrap();

        let _ = std::fs::remove_dir_all(dir);
    }
}
