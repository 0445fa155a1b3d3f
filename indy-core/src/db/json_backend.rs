//! JSON directory storage backend
//!
//! Each collection lives in its own file inside the data directory
//! (`SavedContacts.json`, `SavedProjects.json`, ...), written through
//! [`Storage`] so concurrent processes are serialised by file locks.

use anyhow::Result;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use super::traits::{BackendType, Collection, DatabaseBackend};
use crate::storage::Storage;

pub struct JsonBackend {
    dir: PathBuf,
}

impl JsonBackend {
    /// Creates a backend rooted at the given data directory
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    /// Gets the storage for a collection's file
    pub fn storage(&self, collection: Collection) -> Storage {
        Storage::new(self.dir.join(collection.file_name()))
    }
}

impl DatabaseBackend for JsonBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Json
    }

    fn location(&self) -> &Path {
        &self.dir
    }

    fn read(&self, collection: Collection) -> Result<Option<String>> {
        self.storage(collection).read_raw()
    }

    fn write(&self, collection: Collection, body: &str) -> Result<()> {
        self.storage(collection).write_raw(body)
    }

    fn remove(&self, collection: Collection) -> Result<()> {
        self.storage(collection).remove()
    }

    /// Modification time in nanoseconds plus file length
    fn revision(&self, collection: Collection) -> Result<Option<String>> {
        let storage = self.storage(collection);
        let Some(modified) = storage.modified_at() else {
            return Ok(None);
        };
        let nanos = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let len = std::fs::metadata(storage.path())
            .map(|m| m.len())
            .unwrap_or_default();
        Ok(Some(format!("{}:{}", nanos, len)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_json_backend_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let backend = JsonBackend::new(temp_dir.path());

        assert!(backend.read(Collection::Contacts).unwrap().is_none());
        backend.write(Collection::Contacts, "[]").unwrap();

        assert_eq!(backend.read(Collection::Contacts).unwrap().as_deref(), Some("[]"));
        assert!(temp_dir.path().join("SavedContacts.json").exists());
    }

    #[test]
    fn test_json_backend_revision_changes_on_write() {
        let temp_dir = TempDir::new().unwrap();
        let backend = JsonBackend::new(temp_dir.path());
        assert!(backend.revision(Collection::Projects).unwrap().is_none());

        backend.write(Collection::Projects, "[]").unwrap();
        let first = backend.revision(Collection::Projects).unwrap();
        backend.write(Collection::Projects, "[1, 2, 3]").unwrap();
        let second = backend.revision(Collection::Projects).unwrap();

        assert!(first.is_some());
        assert_ne!(first, second);
    }

    #[test]
    fn test_json_backend_clear() {
        let temp_dir = TempDir::new().unwrap();
        let backend = JsonBackend::new(temp_dir.path());
        backend.write(Collection::Invoices, "[]").unwrap();
        backend.write(Collection::Alerts, "[]").unwrap();

        let stats = backend.stats().unwrap();
        assert_eq!(stats.stored_collections, 2);

        backend.clear().unwrap();
        assert!(backend.read(Collection::Invoices).unwrap().is_none());
        assert_eq!(backend.stats().unwrap().stored_collections, 0);
    }
}
