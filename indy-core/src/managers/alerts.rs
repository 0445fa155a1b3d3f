use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use uuid::Uuid;

use super::RecordStore;
use crate::data_controller::DataController;
use crate::models::{Alert, AlertKind, Project, ProjectStatus, Severity};

/// A deadline this many days away or closer raises a warning
pub const DEADLINE_WARNING_DAYS: i64 = 7;
/// Alerts older than this are removed by [`AlertManager::clear_old_alerts`]
pub const OLD_ALERT_DAYS: i64 = 30;

/// Persistent alerts raised by deadline and task checks
pub struct AlertManager {
    store: RecordStore<Alert>,
}

impl AlertManager {
    pub fn new(controller: Arc<DataController>) -> Self {
        Self {
            store: RecordStore::new(controller),
        }
    }

    pub fn load(&mut self) -> Result<usize> {
        self.store.load()
    }

    pub fn alerts(&self) -> &[Alert] {
        self.store.items()
    }

    /// Unread alerts, most severe first then newest
    pub fn unread(&self) -> Vec<&Alert> {
        let mut unread: Vec<&Alert> = self.alerts().iter().filter(|a| !a.is_read).collect();
        unread.sort_by(|a, b| b.severity.cmp(&a.severity).then(b.date.cmp(&a.date)));
        unread
    }

    /// Raises an alert unless an identical one is still unread
    ///
    /// Returns the id of the new alert, or `None` for a duplicate.
    pub fn create_alert(
        &mut self,
        kind: AlertKind,
        title: &str,
        message: &str,
        severity: Severity,
        now: DateTime<Utc>,
    ) -> Result<Option<Uuid>> {
        let duplicate = self
            .alerts()
            .iter()
            .any(|a| !a.is_read && a.title == title && a.message == message);
        if duplicate {
            return Ok(None);
        }

        let alert = Alert::new(kind, title, message, severity, now);
        let id = alert.id;
        log::info!(
            "event=alert module=alerts kind={} severity={} title={}",
            kind,
            severity,
            title
        );
        self.store.insert(alert)?;
        Ok(Some(id))
    }

    /// Raises alerts for passed and approaching project deadlines
    ///
    /// Completed and cancelled projects are skipped. Returns the number of
    /// alerts created.
    pub fn check_project_deadlines(&mut self, projects: &[Project], now: DateTime<Utc>) -> Result<usize> {
        let mut created = 0;
        for project in projects {
            if matches!(project.status, ProjectStatus::Completed | ProjectStatus::Cancelled) {
                continue;
            }
            let Some(deadline) = project.deadline else {
                continue;
            };
            let days_left = (deadline - now).num_days();
            let raised = if deadline <= now || days_left <= 0 {
                self.create_alert(
                    AlertKind::Error,
                    "Deadline passed",
                    &format!("Project '{}' is past its deadline.", project.name),
                    Severity::High,
                    now,
                )?
            } else if days_left <= DEADLINE_WARNING_DAYS {
                self.create_alert(
                    AlertKind::Warning,
                    "Deadline approaching",
                    &format!("Project '{}' is due in {} days.", project.name, days_left),
                    Severity::Medium,
                    now,
                )?
            } else {
                None
            };
            created += usize::from(raised.is_some());
        }
        Ok(created)
    }

    /// Raises alerts for overdue tasks and tasks over their time estimate
    pub fn check_task_status(&mut self, projects: &[Project], now: DateTime<Utc>) -> Result<usize> {
        let mut created = 0;
        for project in projects {
            for task in &project.tasks {
                if task.is_overdue(now) {
                    let raised = self.create_alert(
                        AlertKind::Warning,
                        "Task overdue",
                        &format!("Task '{}' of project '{}' is overdue.", task.title, project.name),
                        Severity::Medium,
                        now,
                    )?;
                    created += usize::from(raised.is_some());
                }
                if task.is_over_budget() {
                    let raised = self.create_alert(
                        AlertKind::Warning,
                        "Time overrun",
                        &format!(
                            "Task '{}' exceeded its estimated time by more than 20%.",
                            task.title
                        ),
                        Severity::Medium,
                        now,
                    )?;
                    created += usize::from(raised.is_some());
                }
            }
        }
        Ok(created)
    }

    pub fn mark_as_read(&mut self, id: &Uuid) -> Result<()> {
        self.store.modify(id, |alert| {
            alert.is_read = true;
            Ok(())
        })
    }

    pub fn mark_all_read(&mut self) -> Result<usize> {
        let mut alerts = self.alerts().to_vec();
        let mut changed = 0;
        for alert in alerts.iter_mut().filter(|a| !a.is_read) {
            alert.is_read = true;
            changed += 1;
        }
        if changed > 0 {
            self.store.replace_all(alerts)?;
        }
        Ok(changed)
    }

    /// Removes alerts older than thirty days
    pub fn clear_old_alerts(&mut self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - Duration::days(OLD_ALERT_DAYS);
        let removed = self.store.remove_where(|a| a.date < cutoff)?;
        Ok(removed.len())
    }

    pub fn backup_data(&self) -> Vec<Alert> {
        self.alerts().to_vec()
    }

    pub fn restore(&mut self, alerts: Vec<Alert>) -> Result<()> {
        self.store.replace_all(alerts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProjectTask;

    fn manager() -> AlertManager {
        AlertManager::new(Arc::new(DataController::in_memory()))
    }

    fn project_due_in(days: i64, now: DateTime<Utc>) -> Project {
        let mut project = Project::new(format!("Due in {}", days), Uuid::new_v4());
        project.start_date = now - Duration::days(60);
        project.deadline = Some(now + Duration::days(days) + Duration::hours(1));
        project
    }

    #[test]
    fn test_deadline_thresholds() {
        let mut alerts = manager();
        let now = Utc::now();
        let projects = vec![
            project_due_in(-3, now),
            project_due_in(3, now),
            project_due_in(30, now),
        ];

        assert_eq!(alerts.check_project_deadlines(&projects, now).unwrap(), 2);
        let unread = alerts.unread();
        assert_eq!(unread[0].title, "Deadline passed");
        assert_eq!(unread[0].severity, Severity::High);
        assert_eq!(unread[1].title, "Deadline approaching");
        assert_eq!(unread[1].kind, AlertKind::Warning);
    }

    #[test]
    fn test_completed_projects_do_not_alert() {
        let mut alerts = manager();
        let now = Utc::now();
        let mut project = project_due_in(-3, now);
        project.status = ProjectStatus::Completed;

        assert_eq!(alerts.check_project_deadlines(&[project], now).unwrap(), 0);
    }

    #[test]
    fn test_repeated_checks_do_not_duplicate() {
        let mut alerts = manager();
        let now = Utc::now();
        let projects = vec![project_due_in(-3, now)];

        alerts.check_project_deadlines(&projects, now).unwrap();
        alerts.check_project_deadlines(&projects, now).unwrap();
        assert_eq!(alerts.alerts().len(), 1);

        // Once read, the same condition raises a fresh alert
        let id = alerts.alerts()[0].id;
        alerts.mark_as_read(&id).unwrap();
        alerts.check_project_deadlines(&projects, now).unwrap();
        assert_eq!(alerts.alerts().len(), 2);
        assert_eq!(alerts.unread().len(), 1);
    }

    #[test]
    fn test_task_checks() {
        let mut alerts = manager();
        let now = Utc::now();
        let mut project = Project::new("Shop", Uuid::new_v4());

        let mut late = ProjectTask::new("Checkout");
        late.due_date = Some(now - Duration::days(1));
        let mut over = ProjectTask::new("Catalog");
        over.estimated_hours = Some(10.0);
        over.worked_hours = 12.5;
        let mut on_budget = ProjectTask::new("Search");
        on_budget.estimated_hours = Some(10.0);
        on_budget.worked_hours = 12.0;
        project.tasks = vec![late, over, on_budget];

        assert_eq!(alerts.check_task_status(&[project], now).unwrap(), 2);
        let titles: Vec<&str> = alerts.alerts().iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["Task overdue", "Time overrun"]);
    }

    #[test]
    fn test_clear_old_alerts() {
        let mut alerts = manager();
        let now = Utc::now();
        alerts
            .create_alert(AlertKind::Info, "Old", "old", Severity::Low, now - Duration::days(31))
            .unwrap();
        alerts
            .create_alert(AlertKind::Info, "New", "new", Severity::Low, now - Duration::days(2))
            .unwrap();

        assert_eq!(alerts.clear_old_alerts(now).unwrap(), 1);
        assert_eq!(alerts.alerts()[0].title, "New");
    }
}
