//! Database abstraction traits
//!
//! This module defines the core trait that all storage backends must implement.
//! Backends store one JSON document per [`Collection`]; typed access lives in
//! the data controller.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Types of database backends available
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// One JSON file per collection inside a directory
    Json,
    /// SQLite database storage
    Sqlite,
    /// Volatile storage, used for tests and dry runs
    Memory,
}

impl BackendType {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(BackendType::Json),
            "sqlite" | "db" => Some(BackendType::Sqlite),
            "memory" => Some(BackendType::Memory),
            _ => None,
        }
    }
}

impl std::fmt::Display for BackendType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackendType::Json => write!(f, "JSON"),
            BackendType::Sqlite => write!(f, "SQLite"),
            BackendType::Memory => write!(f, "Memory"),
        }
    }
}

/// Every persisted collection of the CRM
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Contacts,
    Projects,
    Invoices,
    Messages,
    ActivityLogs,
    Alerts,
    Collaborations,
    InvoiceNumbering,
}

impl Collection {
    pub const ALL: [Collection; 8] = [
        Collection::Contacts,
        Collection::Projects,
        Collection::Invoices,
        Collection::Messages,
        Collection::ActivityLogs,
        Collection::Alerts,
        Collection::Collaborations,
        Collection::InvoiceNumbering,
    ];

    /// Stable key used as the SQLite row name and backup file stem
    pub fn key(&self) -> &'static str {
        match self {
            Collection::Contacts => "contacts",
            Collection::Projects => "projects",
            Collection::Invoices => "invoices",
            Collection::Messages => "messages",
            Collection::ActivityLogs => "activity_logs",
            Collection::Alerts => "alerts",
            Collection::Collaborations => "collaborations",
            Collection::InvoiceNumbering => "invoice_numbering",
        }
    }

    /// File name inside a JSON data directory
    pub fn file_name(&self) -> &'static str {
        match self {
            Collection::Contacts => "SavedContacts.json",
            Collection::Projects => "SavedProjects.json",
            Collection::Invoices => "SavedInvoices.json",
            Collection::Messages => "SavedMessages.json",
            Collection::ActivityLogs => "SavedActivityLogs.json",
            Collection::Alerts => "SavedAlerts.json",
            Collection::Collaborations => "SavedCollaborations.json",
            Collection::InvoiceNumbering => "InvoiceNumbering.json",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.key() == key)
    }
}

impl std::fmt::Display for Collection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.key())
    }
}

/// Configuration for database backends
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Data directory (JSON) or database file (SQLite)
    pub path: PathBuf,
    /// Backend type
    pub backend_type: BackendType,
    /// Whether to enable write-ahead logging (SQLite only)
    pub wal_mode: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("indycrm-data"),
            backend_type: BackendType::Json,
            wal_mode: true,
        }
    }
}

/// Core trait for database backends
///
/// A backend is a keyed document store: each collection is read and written
/// as one serialized JSON document. `revision` returns an opaque token that
/// changes whenever the stored document changes, including changes made by
/// another process.
pub trait DatabaseBackend: Send + Sync {
    /// Returns the backend type
    fn backend_type(&self) -> BackendType;

    /// Returns the path to the directory or database file
    fn location(&self) -> &std::path::Path;

    /// Reads the stored document, `None` when nothing was ever written
    fn read(&self, collection: Collection) -> Result<Option<String>>;

    /// Replaces the stored document
    fn write(&self, collection: Collection, body: &str) -> Result<()>;

    /// Removes the stored document
    fn remove(&self, collection: Collection) -> Result<()>;

    /// Change token for the stored document, `None` when absent
    fn revision(&self, collection: Collection) -> Result<Option<String>>;

    /// Returns true if the backing store already exists
    fn exists(&self) -> bool {
        self.location().exists()
    }

    /// Removes every collection
    fn clear(&self) -> Result<()> {
        for collection in Collection::ALL {
            self.remove(collection)?;
        }
        Ok(())
    }

    /// Returns statistics about the database
    fn stats(&self) -> Result<DatabaseStats> {
        let mut stored_collections = 0;
        let mut total_bytes = 0;
        for collection in Collection::ALL {
            if let Some(body) = self.read(collection)? {
                stored_collections += 1;
                total_bytes += body.len();
            }
        }
        Ok(DatabaseStats {
            stored_collections,
            total_bytes,
            backend_type: self.backend_type(),
        })
    }
}

/// Statistics about a database
#[derive(Debug, Clone)]
pub struct DatabaseStats {
    pub stored_collections: usize,
    pub total_bytes: usize,
    pub backend_type: BackendType,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collection_keys_round_trip() {
        for collection in Collection::ALL {
            assert_eq!(Collection::from_key(collection.key()), Some(collection));
        }
        assert_eq!(Collection::from_key("nope"), None);
    }

    #[test]
    fn test_backend_type_parse() {
        assert_eq!(BackendType::parse("SQLite"), Some(BackendType::Sqlite));
        assert_eq!(BackendType::parse("json"), Some(BackendType::Json));
        assert_eq!(BackendType::parse("yaml"), None);
    }
}
