use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::EntityType;
use crate::error::CrmError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub enum Permission {
    View,
    Edit,
    Delete,
    Share,
}

impl Permission {
    pub const ALL: [Permission; 4] = [
        Permission::View,
        Permission::Edit,
        Permission::Delete,
        Permission::Share,
    ];

    pub const READ_ONLY: [Permission; 1] = [Permission::View];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "view" => Some(Permission::View),
            "edit" => Some(Permission::Edit),
            "delete" => Some(Permission::Delete),
            "share" => Some(Permission::Share),
            _ => None,
        }
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Permission::View => write!(f, "view"),
            Permission::Edit => write!(f, "edit"),
            Permission::Delete => write!(f, "delete"),
            Permission::Share => write!(f, "share"),
        }
    }
}

/// One record shared with a group of users
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Collaboration {
    pub id: Uuid,
    pub entity_type: EntityType,
    pub entity_id: Uuid,
    pub shared_with: Vec<Uuid>,
    pub permissions: Vec<Permission>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Collaboration {
    pub fn new(
        entity_type: EntityType,
        entity_id: Uuid,
        shared_with: Vec<Uuid>,
        permissions: &[Permission],
    ) -> Self {
        let now = Utc::now();
        let mut collaboration = Self {
            id: Uuid::new_v4(),
            entity_type,
            entity_id,
            shared_with,
            permissions: permissions.to_vec(),
            created_at: now,
            updated_at: now,
        };
        collaboration.normalize();
        collaboration
    }

    /// Sorts and dedups users and permissions
    pub fn normalize(&mut self) {
        self.shared_with.sort();
        self.shared_with.dedup();
        self.permissions.sort();
        self.permissions.dedup();
    }

    pub fn validate(&self) -> Result<(), CrmError> {
        if self.shared_with.is_empty() {
            return Err(CrmError::validation("a share needs at least one user"));
        }
        if self.permissions.is_empty() {
            return Err(CrmError::validation("a share needs at least one permission"));
        }
        Ok(())
    }

    pub fn is_about(&self, entity_type: EntityType, entity_id: &Uuid) -> bool {
        self.entity_type == entity_type && self.entity_id == *entity_id
    }

    pub fn grants(&self, permission: Permission, user_id: &Uuid) -> bool {
        self.shared_with.contains(user_id) && self.permissions.contains(&permission)
    }
}
