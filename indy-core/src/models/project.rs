use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::task::{Comment, ProjectTask};
use crate::error::CrmError;

/// Lifecycle state of a project
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum ProjectStatus {
    #[default]
    Planning,
    InProgress,
    OnHold,
    Completed,
    Cancelled,
}

impl ProjectStatus {
    pub const ALL: [ProjectStatus; 5] = [
        ProjectStatus::Planning,
        ProjectStatus::InProgress,
        ProjectStatus::OnHold,
        ProjectStatus::Completed,
        ProjectStatus::Cancelled,
    ];

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "planning" => Some(ProjectStatus::Planning),
            "inprogress" => Some(ProjectStatus::InProgress),
            "onhold" => Some(ProjectStatus::OnHold),
            "completed" => Some(ProjectStatus::Completed),
            "cancelled" | "canceled" => Some(ProjectStatus::Cancelled),
            _ => None,
        }
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProjectStatus::Planning => write!(f, "Planning"),
            ProjectStatus::InProgress => write!(f, "In progress"),
            ProjectStatus::OnHold => write!(f, "On hold"),
            ProjectStatus::Completed => write!(f, "Completed"),
            ProjectStatus::Cancelled => write!(f, "Cancelled"),
        }
    }
}

/// A dated checkpoint inside a project
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Milestone {
    pub id: Uuid,
    pub title: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub progress: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to_contact_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
}

impl Milestone {
    pub fn new(title: impl Into<String>, date: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            date,
            description: String::new(),
            is_completed: false,
            progress: 0.0,
            dependencies: None,
            assigned_to_contact_id: None,
            last_update: None,
            comments: Vec::new(),
        }
    }
}

/// A body of work carried out for a client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub name: String,
    /// The client contact this project is for
    pub client_id: Uuid,
    pub start_date: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(default)]
    pub status: ProjectStatus,
    #[serde(default)]
    pub tasks: Vec<ProjectTask>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub milestones: Vec<Milestone>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Project {
    /// Creates a new project in the Planning state, starting now
    pub fn new(name: impl Into<String>, client_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            client_id,
            start_date: Utc::now(),
            deadline: None,
            status: ProjectStatus::Planning,
            tasks: Vec::new(),
            notes: String::new(),
            milestones: Vec::new(),
            is_favorite: false,
            updated_at: None,
        }
    }

    /// Fraction of completed tasks, 0 when there are none
    pub fn progress(&self) -> f64 {
        if self.tasks.is_empty() {
            return 0.0;
        }
        let done = self.tasks.iter().filter(|t| t.is_completed).count();
        done as f64 / self.tasks.len() as f64
    }

    pub fn total_estimated_hours(&self) -> f64 {
        self.tasks.iter().filter_map(|t| t.estimated_hours).sum()
    }

    pub fn total_worked_hours(&self) -> f64 {
        self.tasks.iter().map(|t| t.worked_hours).sum()
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.deadline {
            Some(deadline) => now > deadline && self.status != ProjectStatus::Completed,
            None => false,
        }
    }

    pub fn task(&self, task_id: &Uuid) -> Option<&ProjectTask> {
        self.tasks.iter().find(|t| t.id == *task_id)
    }

    pub fn task_mut(&mut self, task_id: &Uuid) -> Option<&mut ProjectTask> {
        self.tasks.iter_mut().find(|t| t.id == *task_id)
    }

    /// Whether the contact is the client, a task assignee or a milestone assignee
    pub fn references_contact(&self, contact_id: &Uuid) -> bool {
        self.client_id == *contact_id
            || self.tasks.iter().any(|t| t.assigned_to == Some(*contact_id))
            || self
                .milestones
                .iter()
                .any(|m| m.assigned_to_contact_id == Some(*contact_id))
    }

    pub fn validate(&self) -> Result<(), CrmError> {
        if self.name.trim().is_empty() {
            return Err(CrmError::validation("project name cannot be empty"));
        }
        if let Some(deadline) = self.deadline {
            if deadline < self.start_date {
                return Err(CrmError::validation(
                    "project deadline cannot precede its start date",
                ));
            }
        }
        if self.tasks.iter().any(|t| t.title.trim().is_empty()) {
            return Err(CrmError::validation("task title cannot be empty"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_progress_and_hours() {
        let mut project = Project::new("Website", Uuid::new_v4());
        assert_eq!(project.progress(), 0.0);

        let mut done = ProjectTask::new("Design");
        done.is_completed = true;
        done.estimated_hours = Some(8.0);
        done.worked_hours = 6.0;
        let mut open = ProjectTask::new("Build");
        open.estimated_hours = Some(12.0);
        open.worked_hours = 2.0;
        project.tasks = vec![done, open];

        assert_eq!(project.progress(), 0.5);
        assert_eq!(project.total_estimated_hours(), 20.0);
        assert_eq!(project.total_worked_hours(), 8.0);
    }

    #[test]
    fn test_is_overdue() {
        let now = Utc::now();
        let mut project = Project::new("Late", Uuid::new_v4());
        assert!(!project.is_overdue(now));

        project.deadline = Some(now - Duration::days(1));
        assert!(project.is_overdue(now));

        project.status = ProjectStatus::Completed;
        assert!(!project.is_overdue(now));
    }

    #[test]
    fn test_references_contact() {
        let client = Uuid::new_v4();
        let helper = Uuid::new_v4();
        let reviewer = Uuid::new_v4();
        let mut project = Project::new("Shop", client);
        assert!(project.references_contact(&client));
        assert!(!project.references_contact(&helper));

        let mut task = ProjectTask::new("Photos");
        task.assigned_to = Some(helper);
        project.tasks.push(task);
        assert!(project.references_contact(&helper));

        let mut milestone = Milestone::new("Launch", Utc::now());
        milestone.assigned_to_contact_id = Some(reviewer);
        project.milestones.push(milestone);
        assert!(project.references_contact(&reviewer));
    }

    #[test]
    fn test_validate() {
        let mut project = Project::new("", Uuid::new_v4());
        assert!(project.validate().is_err());

        project.name = "Ok".into();
        project.deadline = Some(project.start_date - Duration::days(2));
        assert!(project.validate().is_err());

        project.deadline = Some(project.start_date + Duration::days(2));
        assert!(project.validate().is_ok());
    }

    #[test]
    fn test_deserialize_without_optional_fields() {
        let json = format!(
            r#"{{"id":"{}","name":"Legacy","client_id":"{}","start_date":"2024-01-01T00:00:00Z"}}"#,
            Uuid::new_v4(),
            Uuid::new_v4()
        );
        let project: Project = serde_json::from_str(&json).unwrap();
        assert_eq!(project.status, ProjectStatus::Planning);
        assert!(project.tasks.is_empty());
        assert!(!project.is_favorite);
    }
}
