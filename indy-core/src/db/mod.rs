//! Database abstraction layer for IndyCRM
//!
//! This module provides a trait-based abstraction for storage backends,
//! allowing the CRM to keep its collections in a directory of JSON files,
//! a SQLite database or memory while maintaining a consistent interface.

mod json_backend;
mod memory_backend;
mod migration;
mod sqlite_backend;
mod traits;

pub use json_backend::JsonBackend;
pub use memory_backend::MemoryBackend;
pub use migration::{copy_collections, migrate_json_to_sqlite, migrate_sqlite_to_json};
pub use sqlite_backend::SqliteBackend;
pub use traits::{BackendType, Collection, DatabaseBackend, DatabaseConfig, DatabaseStats};

use anyhow::Result;
use std::path::Path;

/// Infers the backend from a path: SQLite for database files, JSON otherwise
pub fn infer_backend_type(path: &Path) -> BackendType {
    match path.extension().and_then(|e| e.to_str()) {
        Some("db") | Some("sqlite") | Some("sqlite3") => BackendType::Sqlite,
        _ => BackendType::Json,
    }
}

/// Creates a database backend based on the file extension or explicit type
pub fn create_backend(
    path: &Path,
    backend_type: Option<BackendType>,
) -> Result<Box<dyn DatabaseBackend>> {
    let bt = backend_type.unwrap_or_else(|| infer_backend_type(path));

    match bt {
        BackendType::Json => Ok(Box::new(JsonBackend::new(path))),
        BackendType::Sqlite => Ok(Box::new(SqliteBackend::new(path)?)),
        BackendType::Memory => Ok(Box::new(MemoryBackend::new())),
    }
}

/// Creates a backend from a full configuration
pub fn open_with_config(config: &DatabaseConfig) -> Result<Box<dyn DatabaseBackend>> {
    match config.backend_type {
        BackendType::Sqlite => Ok(Box::new(SqliteBackend::with_options(
            &config.path,
            config.wal_mode,
        )?)),
        other => create_backend(&config.path, Some(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_infer_backend_type() {
        assert_eq!(infer_backend_type(Path::new("crm.db")), BackendType::Sqlite);
        assert_eq!(infer_backend_type(Path::new("crm.sqlite3")), BackendType::Sqlite);
        assert_eq!(infer_backend_type(Path::new("/tmp/indycrm")), BackendType::Json);
    }

    #[test]
    fn test_create_backend_explicit_type_wins() {
        let temp_dir = TempDir::new().unwrap();
        let backend = create_backend(&temp_dir.path().join("data"), Some(BackendType::Memory)).unwrap();
        assert_eq!(backend.backend_type(), BackendType::Memory);

        let backend = create_backend(&temp_dir.path().join("data.db"), None).unwrap();
        assert_eq!(backend.backend_type(), BackendType::Sqlite);
    }
}
