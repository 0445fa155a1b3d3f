use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Workflow state of a task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TaskStatus {
    #[default]
    Todo,
    InProgress,
    Review,
    Done,
}

impl TaskStatus {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().replace(['-', '_', ' '], "").as_str() {
            "todo" => Some(TaskStatus::Todo),
            "inprogress" => Some(TaskStatus::InProgress),
            "review" => Some(TaskStatus::Review),
            "done" => Some(TaskStatus::Done),
            _ => None,
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Todo => write!(f, "To do"),
            TaskStatus::InProgress => write!(f, "In progress"),
            TaskStatus::Review => write!(f, "Review"),
            TaskStatus::Done => write!(f, "Done"),
        }
    }
}

/// Represents the priority of a task
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Priority {
    High,
    #[default]
    Medium,
    Low,
}

impl Priority {
    /// Sort rank, highest priority first
    pub fn rank(&self) -> u8 {
        match self {
            Priority::High => 0,
            Priority::Medium => 1,
            Priority::Low => 2,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "high" => Some(Priority::High),
            "medium" => Some(Priority::Medium),
            "low" => Some(Priority::Low),
            _ => None,
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Priority::High => write!(f, "High"),
            Priority::Medium => write!(f, "Medium"),
            Priority::Low => write!(f, "Low"),
        }
    }
}

/// A comment left on a task or milestone
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Comment {
    pub id: Uuid,
    pub text: String,
    pub date: DateTime<Utc>,
    pub author_id: Uuid,
}

impl Comment {
    pub fn new(text: impl Into<String>, author_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            text: text.into(),
            date: Utc::now(),
            author_id,
        }
    }
}

/// Time logged against a task
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeEntry {
    pub id: Uuid,
    pub date: DateTime<Utc>,
    pub hours: f64,
    #[serde(default)]
    pub comment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Uuid>,
}

impl TimeEntry {
    pub fn new(date: DateTime<Utc>, hours: f64, comment: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            date,
            hours,
            comment: comment.into(),
            user_id: None,
        }
    }
}

/// A unit of work inside a project
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectTask {
    pub id: Uuid,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub status: TaskStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    /// Contact the task is assigned to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_hours: Option<f64>,
    #[serde(default)]
    pub worked_hours: f64,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<Comment>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub time_entries: Vec<TimeEntry>,
    // Optional: records written before these fields existed lack them
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Tasks are identified by id alone
impl PartialEq for ProjectTask {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl ProjectTask {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            title: title.into(),
            description: String::new(),
            status: TaskStatus::Todo,
            priority: Priority::Medium,
            due_date: None,
            assigned_to: None,
            estimated_hours: None,
            worked_hours: 0.0,
            is_completed: false,
            comments: Vec::new(),
            time_entries: Vec::new(),
            created_at: Some(Utc::now()),
            updated_at: None,
        }
    }

    /// Completion ratio in `[0, 1]`; an unfinished task never reports 1.0
    pub fn progress(&self) -> f64 {
        if self.is_completed {
            return 1.0;
        }
        match self.estimated_hours {
            Some(estimated) if estimated > 0.0 => (self.worked_hours / estimated).min(0.99),
            _ => 0.0,
        }
    }

    /// Logged hours grouped by calendar day (UTC)
    pub fn time_by_day(&self) -> BTreeMap<NaiveDate, f64> {
        let mut by_day = BTreeMap::new();
        for entry in &self.time_entries {
            *by_day.entry(entry.date.date_naive()).or_insert(0.0) += entry.hours;
        }
        by_day
    }

    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        matches!(self.due_date, Some(due) if due < now) && !self.is_completed
    }

    /// Worked hours exceed the estimate by more than 20%
    pub fn is_over_budget(&self) -> bool {
        match self.estimated_hours {
            Some(estimated) => self.worked_hours > estimated * 1.2,
            None => false,
        }
    }

    /// Sets the status and keeps `is_completed` in step with it
    pub fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        self.is_completed = status == TaskStatus::Done;
        self.updated_at = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    #[test]
    fn test_progress() {
        let mut task = ProjectTask::new("Write brief");
        assert_eq!(task.progress(), 0.0);

        task.estimated_hours = Some(10.0);
        task.worked_hours = 5.0;
        assert!((task.progress() - 0.5).abs() < f64::EPSILON);

        task.worked_hours = 15.0;
        assert!((task.progress() - 0.99).abs() < f64::EPSILON);

        task.is_completed = true;
        assert_eq!(task.progress(), 1.0);
    }

    #[test]
    fn test_time_by_day() {
        let mut task = ProjectTask::new("Integration");
        let day = Utc.with_ymd_and_hms(2024, 3, 4, 9, 0, 0).unwrap();
        task.time_entries.push(TimeEntry::new(day, 2.0, ""));
        task.time_entries.push(TimeEntry::new(day + Duration::hours(5), 1.5, ""));
        task.time_entries.push(TimeEntry::new(day + Duration::days(1), 3.0, ""));

        let by_day = task.time_by_day();
        assert_eq!(by_day.len(), 2);
        assert_eq!(by_day[&day.date_naive()], 3.5);
    }

    #[test]
    fn test_set_status_tracks_completion() {
        let mut task = ProjectTask::new("Deploy");
        task.set_status(TaskStatus::Done);
        assert!(task.is_completed);
        task.set_status(TaskStatus::Review);
        assert!(!task.is_completed);
    }

    #[test]
    fn test_over_budget_threshold() {
        let mut task = ProjectTask::new("Audit");
        task.estimated_hours = Some(10.0);
        task.worked_hours = 12.0;
        assert!(!task.is_over_budget());
        task.worked_hours = 12.5;
        assert!(task.is_over_budget());
    }

    #[test]
    fn test_equality_by_id() {
        let task = ProjectTask::new("A");
        let mut renamed = task.clone();
        renamed.title = "B".into();
        assert_eq!(task, renamed);
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(TaskStatus::parse("in-progress"), Some(TaskStatus::InProgress));
        assert_eq!(TaskStatus::parse("DONE"), Some(TaskStatus::Done));
        assert_eq!(TaskStatus::parse("blocked"), None);
    }
}
