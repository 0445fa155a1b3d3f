//! Migration utilities for converting between storage backends
//!
//! Backends share the same document format, so migrating is a copy of every
//! stored collection body from one backend to another.

use anyhow::{Context, Result};
use std::path::Path;

use super::traits::{Collection, DatabaseBackend};
use super::{JsonBackend, SqliteBackend};

/// Copies every stored collection from `source` into `target`
///
/// Collections the source never wrote are left untouched in the target.
/// Returns the number of collections copied.
pub fn copy_collections(source: &dyn DatabaseBackend, target: &dyn DatabaseBackend) -> Result<usize> {
    let mut copied = 0;
    for collection in Collection::ALL {
        let Some(body) = source
            .read(collection)
            .with_context(|| format!("Failed to read {} from {}", collection, source.backend_type()))?
        else {
            continue;
        };
        target
            .write(collection, &body)
            .with_context(|| format!("Failed to write {} to {}", collection, target.backend_type()))?;
        copied += 1;
    }
    log::info!(
        "event=migrate module=db from={} to={} collections={}",
        source.location().display(),
        target.location().display(),
        copied
    );
    Ok(copied)
}

/// Migrates a JSON data directory into a SQLite database
///
/// # Arguments
/// * `json_dir` - Directory holding the `Saved*.json` files
/// * `sqlite_path` - Path to the destination SQLite database
///
/// # Returns
/// The number of collections migrated
pub fn migrate_json_to_sqlite<P1: AsRef<Path>, P2: AsRef<Path>>(
    json_dir: P1,
    sqlite_path: P2,
) -> Result<usize> {
    let json_backend = JsonBackend::new(json_dir);
    let sqlite_backend = SqliteBackend::new(sqlite_path).context("Failed to open SQLite database")?;
    copy_collections(&json_backend, &sqlite_backend)
}

/// Migrates a SQLite database into a JSON data directory
///
/// # Returns
/// The number of collections migrated
pub fn migrate_sqlite_to_json<P1: AsRef<Path>, P2: AsRef<Path>>(
    sqlite_path: P1,
    json_dir: P2,
) -> Result<usize> {
    let sqlite_backend = SqliteBackend::new(sqlite_path).context("Failed to open SQLite database")?;
    let json_dir = json_dir.as_ref();
    std::fs::create_dir_all(json_dir)
        .with_context(|| format!("Failed to create directory {}", json_dir.display()))?;
    let json_backend = JsonBackend::new(json_dir);
    copy_collections(&sqlite_backend, &json_backend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_json_to_sqlite_and_back() {
        let temp_dir = TempDir::new().unwrap();
        let json_dir = temp_dir.path().join("json");
        let db_path = temp_dir.path().join("crm.db");

        let json_backend = JsonBackend::new(&json_dir);
        json_backend.write(Collection::Contacts, "[{\"a\":1}]").unwrap();
        json_backend.write(Collection::Invoices, "[]").unwrap();

        let count = migrate_json_to_sqlite(&json_dir, &db_path).unwrap();
        assert_eq!(count, 2);

        let back_dir = temp_dir.path().join("back");
        let count = migrate_sqlite_to_json(&db_path, &back_dir).unwrap();
        assert_eq!(count, 2);

        let restored = JsonBackend::new(&back_dir);
        assert_eq!(
            restored.read(Collection::Contacts).unwrap().as_deref(),
            Some("[{\"a\":1}]")
        );
        assert!(restored.read(Collection::Projects).unwrap().is_none());
    }
}
