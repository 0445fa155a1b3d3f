use chrono::{DateTime, Utc};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HelpKind {
    Warning,
    Info,
    Tip,
}

/// Contextual advice about an incomplete record. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct HelpMessage {
    pub id: Uuid,
    pub title: String,
    pub message: String,
    pub kind: HelpKind,
    pub date: DateTime<Utc>,
}

impl HelpMessage {
    pub fn new(title: impl Into<String>, message: impl Into<String>, kind: HelpKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            message: message.into(),
            kind,
            date: Utc::now(),
        }
    }
}
