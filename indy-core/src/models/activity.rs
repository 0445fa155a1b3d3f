use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum Action {
    Created,
    Updated,
    Deleted,
    StatusChanged,
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Created => write!(f, "created"),
            Action::Updated => write!(f, "updated"),
            Action::Deleted => write!(f, "deleted"),
            Action::StatusChanged => write!(f, "status changed"),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum EntityType {
    Contact,
    Project,
    Task,
    Invoice,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityType::Contact => write!(f, "contact"),
            EntityType::Project => write!(f, "project"),
            EntityType::Task => write!(f, "task"),
            EntityType::Invoice => write!(f, "invoice"),
        }
    }
}

/// An audit entry describing one change to one record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ActivityLog {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub user_id: Uuid,
    pub action: Action,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub details: String,
}

impl ActivityLog {
    pub fn new(
        user_id: Uuid,
        action: Action,
        entity_type: EntityType,
        entity_id: Uuid,
        details: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            date: Utc::now(),
            user_id,
            action,
            entity_type,
            entity_id,
            details: details.into(),
        }
    }
}
