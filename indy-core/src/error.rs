//! Domain errors for IndyCRM
//!
//! Library functions return `anyhow::Result`; failures a caller may want to
//! match on are raised as a `CrmError` and can be recovered with
//! `err.downcast_ref::<CrmError>()`.

use thiserror::Error;
use uuid::Uuid;

/// Kind of record an error refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordKind {
    Contact,
    Project,
    Task,
    Milestone,
    Invoice,
    Message,
    Alert,
    ActivityLog,
    Collaboration,
}

impl std::fmt::Display for RecordKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RecordKind::Contact => write!(f, "Contact"),
            RecordKind::Project => write!(f, "Project"),
            RecordKind::Task => write!(f, "Task"),
            RecordKind::Milestone => write!(f, "Milestone"),
            RecordKind::Invoice => write!(f, "Invoice"),
            RecordKind::Message => write!(f, "Message"),
            RecordKind::Alert => write!(f, "Alert"),
            RecordKind::ActivityLog => write!(f, "Activity log"),
            RecordKind::Collaboration => write!(f, "Collaboration"),
        }
    }
}

#[derive(Debug, Error)]
pub enum CrmError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: RecordKind, id: Uuid },

    /// The record is still referenced by another record
    #[error("{kind} {id} is still in use: {reason}")]
    InUse {
        kind: RecordKind,
        id: Uuid,
        reason: String,
    },

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("File is locked by another user/process: {0}")]
    Locked(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Backup was made by version {found}, this is version {expected}")]
    IncompatibleBackup { found: String, expected: String },
}

impl CrmError {
    pub fn not_found(kind: RecordKind, id: Uuid) -> Self {
        CrmError::NotFound { kind, id }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        CrmError::Validation(message.into())
    }
}
