//! SQLite database storage backend
//!
//! This backend stores every collection as a row of a single SQLite table,
//! giving a single-file store with better concurrent access than a
//! directory of JSON files.

use anyhow::{anyhow, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use super::traits::{BackendType, Collection, DatabaseBackend};

/// Current schema version
const SCHEMA_VERSION: i32 = 1;

/// SQLite backend implementation
pub struct SqliteBackend {
    path: PathBuf,
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Creates a new SQLite backend
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::with_options(path, true)
    }

    /// Creates a backend, optionally without write-ahead logging
    pub fn with_options<P: AsRef<Path>>(path: P, wal_mode: bool) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        // Create parent directories if needed
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(&path)?;

        if wal_mode {
            // query_row: the pragma returns the resulting journal mode
            let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        }

        let backend = Self {
            path,
            conn: Mutex::new(conn),
        };

        backend.init_schema()?;
        log::debug!(
            "event=sqlite_open module=db path={} wal={}",
            backend.path.display(),
            wal_mode
        );
        Ok(backend)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("SQLite connection lock poisoned: {:?}", self.path))
    }

    /// Initialize the database schema
    fn init_schema(&self) -> Result<()> {
        let conn = self.conn()?;

        // A missing table means a fresh database
        let current_version: i32 = conn
            .query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
                row.get(0)
            })
            .unwrap_or(0);

        if current_version == 0 {
            conn.execute_batch(include_str!("schema.sql"))?;
        } else if current_version < SCHEMA_VERSION {
            anyhow::bail!(
                "Database schema version {} is outdated, expected {}",
                current_version,
                SCHEMA_VERSION
            );
        }

        Ok(())
    }
}

impl DatabaseBackend for SqliteBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Sqlite
    }

    fn location(&self) -> &Path {
        &self.path
    }

    fn read(&self, collection: Collection) -> Result<Option<String>> {
        let conn = self.conn()?;
        conn.query_row(
            "SELECT body FROM collections WHERE name = ?1",
            [collection.key()],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| e.into())
    }

    fn write(&self, collection: Collection, body: &str) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO collections (name, body, revision, updated_at)
             VALUES (?1, ?2, 1, ?3)
             ON CONFLICT(name) DO UPDATE SET
                body = excluded.body,
                revision = collections.revision + 1,
                updated_at = excluded.updated_at",
            params![collection.key(), body, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, collection: Collection) -> Result<()> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM collections WHERE name = ?1", [collection.key()])?;
        Ok(())
    }

    fn revision(&self, collection: Collection) -> Result<Option<String>> {
        let conn = self.conn()?;
        // updated_at disambiguates a row that was removed and written again
        let revision: Option<(i64, String)> = conn
            .query_row(
                "SELECT revision, updated_at FROM collections WHERE name = ?1",
                [collection.key()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        Ok(revision.map(|(rev, updated_at)| format!("{}@{}", rev, updated_at)))
    }
}
