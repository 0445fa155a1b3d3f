use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::CrmError;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AttachmentKind {
    Document,
    Image,
    Pdf,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Attachment {
    pub id: Uuid,
    pub name: String,
    pub url: String,
    pub kind: AttachmentKind,
}

impl Attachment {
    /// Builds an attachment, guessing its kind from the file extension
    pub fn from_path(url: impl Into<String>) -> Self {
        let url = url.into();
        let name = url.rsplit(['/', '\\']).next().unwrap_or(&url).to_string();
        let lower = name.to_lowercase();
        let kind = if lower.ends_with(".pdf") {
            AttachmentKind::Pdf
        } else if [".png", ".jpg", ".jpeg", ".gif", ".heic", ".webp"]
            .iter()
            .any(|ext| lower.ends_with(ext))
        {
            AttachmentKind::Image
        } else {
            AttachmentKind::Document
        };
        Self {
            id: Uuid::new_v4(),
            name,
            url,
            kind,
        }
    }
}

/// A message exchanged with one or more contacts
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub id: Uuid,
    pub sender_id: Uuid,
    pub recipient_ids: Vec<Uuid>,
    pub subject: String,
    #[serde(default)]
    pub content: String,
    pub date: DateTime<Utc>,
    /// Public messages are visible to every collaborator and trigger no notification
    #[serde(default)]
    pub is_public: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
}

impl Message {
    pub fn new(
        sender_id: Uuid,
        recipient_ids: Vec<Uuid>,
        subject: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender_id,
            recipient_ids,
            subject: subject.into(),
            content: content.into(),
            date: Utc::now(),
            is_public: false,
            attachments: Vec::new(),
        }
    }

    pub fn involves(&self, contact_id: &Uuid) -> bool {
        self.sender_id == *contact_id || self.recipient_ids.contains(contact_id)
    }

    pub fn validate(&self) -> Result<(), CrmError> {
        if self.subject.trim().is_empty() {
            return Err(CrmError::validation("message subject cannot be empty"));
        }
        if self.recipient_ids.is_empty() && !self.is_public {
            return Err(CrmError::validation(
                "a private message needs at least one recipient",
            ));
        }
        Ok(())
    }
}
