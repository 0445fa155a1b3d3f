use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use uuid::Uuid;

use super::RecordStore;
use crate::data_controller::DataController;
use crate::error::{CrmError, RecordKind};
use crate::models::{Comment, Milestone, Project, ProjectTask, TaskStatus, TimeEntry};

/// Owns the projects together with their tasks and milestones
pub struct ProjectManager {
    store: RecordStore<Project>,
}

fn task_not_found(task_id: &Uuid) -> anyhow::Error {
    CrmError::not_found(RecordKind::Task, *task_id).into()
}

impl ProjectManager {
    pub fn new(controller: Arc<DataController>) -> Self {
        Self {
            store: RecordStore::new(controller),
        }
    }

    pub fn load(&mut self) -> Result<usize> {
        self.store.load()
    }

    pub fn projects(&self) -> &[Project] {
        self.store.items()
    }

    pub fn get(&self, id: &Uuid) -> Option<&Project> {
        self.store.get(id)
    }

    pub fn add(&mut self, project: Project) -> Result<()> {
        project.validate()?;
        log::info!(
            "event=project_add module=projects id={} name={}",
            project.id,
            project.name
        );
        self.store.insert(project)
    }

    /// Replaces the project with the same id, returning the previous version
    pub fn update(&mut self, mut project: Project) -> Result<Project> {
        project.validate()?;
        project.updated_at = Some(Utc::now());
        self.store.replace(project)
    }

    pub fn delete(&mut self, id: &Uuid) -> Result<Project> {
        let removed = self.store.remove(id)?;
        log::info!("event=project_delete module=projects id={}", id);
        Ok(removed)
    }

    /// Deletes every project whose client is `client_id`
    pub fn delete_for_client(&mut self, client_id: &Uuid) -> Result<Vec<Project>> {
        self.store.remove_where(|p| p.client_id == *client_id)
    }

    /// Clears task and milestone assignments pointing at the contact
    pub fn unassign_contact(&mut self, contact_id: &Uuid) -> Result<usize> {
        let mut projects = self.projects().to_vec();
        let mut cleared = 0;
        for project in &mut projects {
            for task in &mut project.tasks {
                if task.assigned_to == Some(*contact_id) {
                    task.assigned_to = None;
                    cleared += 1;
                }
            }
            for milestone in &mut project.milestones {
                if milestone.assigned_to_contact_id == Some(*contact_id) {
                    milestone.assigned_to_contact_id = None;
                    cleared += 1;
                }
            }
        }
        if cleared > 0 {
            self.store.replace_all(projects)?;
        }
        Ok(cleared)
    }

    pub fn projects_for_client(&self, client_id: &Uuid) -> Vec<&Project> {
        self.projects()
            .iter()
            .filter(|p| p.client_id == *client_id)
            .collect()
    }

    pub fn add_task(&mut self, project_id: &Uuid, task: ProjectTask) -> Result<()> {
        if task.title.trim().is_empty() {
            return Err(CrmError::validation("task title cannot be empty").into());
        }
        self.store.modify(project_id, |project| {
            project.tasks.push(task);
            project.updated_at = Some(Utc::now());
            Ok(())
        })
    }

    /// Replaces the task with the same id, returning the previous version
    pub fn update_task(&mut self, project_id: &Uuid, mut task: ProjectTask) -> Result<ProjectTask> {
        if task.title.trim().is_empty() {
            return Err(CrmError::validation("task title cannot be empty").into());
        }
        task.updated_at = Some(Utc::now());
        self.store.modify(project_id, |project| {
            let slot = project
                .task_mut(&task.id)
                .ok_or_else(|| task_not_found(&task.id))?;
            let previous = std::mem::replace(slot, task);
            project.updated_at = Some(Utc::now());
            Ok(previous)
        })
    }

    pub fn delete_task(&mut self, project_id: &Uuid, task_id: &Uuid) -> Result<ProjectTask> {
        self.store.modify(project_id, |project| {
            let index = project
                .tasks
                .iter()
                .position(|t| t.id == *task_id)
                .ok_or_else(|| task_not_found(task_id))?;
            project.updated_at = Some(Utc::now());
            Ok(project.tasks.remove(index))
        })
    }

    /// Sets the task status, returning the previous one
    pub fn set_task_status(
        &mut self,
        project_id: &Uuid,
        task_id: &Uuid,
        status: TaskStatus,
    ) -> Result<TaskStatus> {
        self.store.modify(project_id, |project| {
            let task = project.task_mut(task_id).ok_or_else(|| task_not_found(task_id))?;
            let previous = task.status;
            task.set_status(status);
            Ok(previous)
        })
    }

    /// Records worked time on a task
    pub fn log_time(&mut self, project_id: &Uuid, task_id: &Uuid, entry: TimeEntry) -> Result<()> {
        if entry.hours.is_nan() || entry.hours <= 0.0 {
            return Err(CrmError::validation("logged hours must be positive").into());
        }
        self.store.modify(project_id, |project| {
            let task = project.task_mut(task_id).ok_or_else(|| task_not_found(task_id))?;
            task.worked_hours += entry.hours;
            task.time_entries.push(entry);
            task.updated_at = Some(Utc::now());
            Ok(())
        })
    }

    pub fn add_task_comment(
        &mut self,
        project_id: &Uuid,
        task_id: &Uuid,
        comment: Comment,
    ) -> Result<()> {
        if comment.text.trim().is_empty() {
            return Err(CrmError::validation("comment cannot be empty").into());
        }
        self.store.modify(project_id, |project| {
            let task = project.task_mut(task_id).ok_or_else(|| task_not_found(task_id))?;
            task.comments.push(comment);
            Ok(())
        })
    }

    pub fn add_milestone(&mut self, project_id: &Uuid, milestone: Milestone) -> Result<()> {
        if milestone.title.trim().is_empty() {
            return Err(CrmError::validation("milestone title cannot be empty").into());
        }
        self.store.modify(project_id, |project| {
            project.milestones.push(milestone);
            project.updated_at = Some(Utc::now());
            Ok(())
        })
    }

    pub fn complete_milestone(&mut self, project_id: &Uuid, milestone_id: &Uuid) -> Result<()> {
        self.store.modify(project_id, |project| {
            let milestone = project
                .milestones
                .iter_mut()
                .find(|m| m.id == *milestone_id)
                .ok_or_else(|| CrmError::not_found(RecordKind::Milestone, *milestone_id))?;
            milestone.is_completed = true;
            milestone.progress = 1.0;
            milestone.last_update = Some(Utc::now());
            Ok(())
        })
    }

    pub fn favorites(&self) -> Vec<&Project> {
        self.projects().iter().filter(|p| p.is_favorite).collect()
    }

    /// Flips the favorite flag, returning the new value
    pub fn toggle_favorite(&mut self, project_id: &Uuid) -> Result<bool> {
        self.store.modify(project_id, |project| {
            project.is_favorite = !project.is_favorite;
            Ok(project.is_favorite)
        })
    }

    /// Every open task, highest priority first, then by due date
    pub fn tasks_by_priority(&self) -> Vec<(&Project, &ProjectTask)> {
        let mut tasks: Vec<(&Project, &ProjectTask)> = self
            .projects()
            .iter()
            .flat_map(|p| p.tasks.iter().map(move |t| (p, t)))
            .filter(|(_, t)| !t.is_completed)
            .collect();
        // Tasks without a due date go last within their priority
        tasks.sort_by_key(|(_, t)| (t.priority.rank(), t.due_date.is_none(), t.due_date));
        tasks
    }

    pub fn backup_data(&self) -> Vec<Project> {
        self.projects().to_vec()
    }

    pub fn restore(&mut self, projects: Vec<Project>) -> Result<()> {
        log::info!("event=projects_restore module=projects count={}", projects.len());
        self.store.replace_all(projects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Priority, ProjectStatus};
    use chrono::Duration;

    fn manager_with_project() -> (ProjectManager, Uuid) {
        let controller = Arc::new(DataController::in_memory());
        let mut projects = ProjectManager::new(controller);
        let project = Project::new("Website", Uuid::new_v4());
        let id = project.id;
        projects.add(project).unwrap();
        (projects, id)
    }

    #[test]
    fn test_update_returns_previous() {
        let (mut projects, id) = manager_with_project();
        let mut project = projects.get(&id).unwrap().clone();
        project.status = ProjectStatus::InProgress;

        let previous = projects.update(project).unwrap();
        assert_eq!(previous.status, ProjectStatus::Planning);
        assert_eq!(projects.get(&id).unwrap().status, ProjectStatus::InProgress);
    }

    #[test]
    fn test_update_rejects_deadline_before_start() {
        let (mut projects, id) = manager_with_project();
        let mut project = projects.get(&id).unwrap().clone();
        project.deadline = Some(project.start_date - Duration::days(1));

        assert!(projects.update(project).is_err());
        assert!(projects.get(&id).unwrap().deadline.is_none());
    }

    #[test]
    fn test_task_lifecycle() {
        let (mut projects, id) = manager_with_project();
        let mut task = ProjectTask::new("Mockups");
        task.estimated_hours = Some(4.0);
        let task_id = task.id;
        projects.add_task(&id, task).unwrap();

        projects
            .log_time(&id, &task_id, TimeEntry::new(Utc::now(), 2.5, "first pass"))
            .unwrap();
        let task = projects.get(&id).unwrap().task(&task_id).unwrap();
        assert_eq!(task.worked_hours, 2.5);
        assert_eq!(task.time_entries.len(), 1);

        let previous = projects.set_task_status(&id, &task_id, TaskStatus::Done).unwrap();
        assert_eq!(previous, TaskStatus::Todo);
        assert!(projects.get(&id).unwrap().task(&task_id).unwrap().is_completed);

        projects.delete_task(&id, &task_id).unwrap();
        assert!(projects.get(&id).unwrap().tasks.is_empty());
    }

    #[test]
    fn test_task_operations_on_unknown_task() {
        let (mut projects, id) = manager_with_project();
        let err = projects
            .set_task_status(&id, &Uuid::new_v4(), TaskStatus::Done)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrmError>(),
            Some(CrmError::NotFound { kind: RecordKind::Task, .. })
        ));

        let err = projects
            .log_time(&id, &Uuid::new_v4(), TimeEntry::new(Utc::now(), 0.0, ""))
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<CrmError>(), Some(CrmError::Validation(_))));
    }

    #[test]
    fn test_milestones_and_favorites() {
        let (mut projects, id) = manager_with_project();
        let milestone = Milestone::new("Launch", Utc::now() + Duration::days(10));
        let milestone_id = milestone.id;
        projects.add_milestone(&id, milestone).unwrap();
        projects.complete_milestone(&id, &milestone_id).unwrap();

        let milestone = &projects.get(&id).unwrap().milestones[0];
        assert!(milestone.is_completed);
        assert_eq!(milestone.progress, 1.0);

        assert!(projects.toggle_favorite(&id).unwrap());
        assert_eq!(projects.favorites().len(), 1);
        assert!(!projects.toggle_favorite(&id).unwrap());
        assert!(projects.favorites().is_empty());
    }

    #[test]
    fn test_tasks_by_priority() {
        let (mut projects, id) = manager_with_project();
        let now = Utc::now();

        let mut low = ProjectTask::new("low");
        low.priority = Priority::Low;
        let mut high_late = ProjectTask::new("high late");
        high_late.priority = Priority::High;
        high_late.due_date = Some(now + Duration::days(5));
        let mut high_soon = ProjectTask::new("high soon");
        high_soon.priority = Priority::High;
        high_soon.due_date = Some(now + Duration::days(1));
        let mut done = ProjectTask::new("done");
        done.set_status(TaskStatus::Done);

        for task in [low, high_late, high_soon, done] {
            projects.add_task(&id, task).unwrap();
        }

        let ordered = projects.tasks_by_priority();
        let titles: Vec<&str> = ordered
            .iter()
            .map(|(_, t)| t.title.as_str())
            .collect();
        assert_eq!(titles, vec!["high soon", "high late", "low"]);
    }

    #[test]
    fn test_unassign_contact() {
        let (mut projects, id) = manager_with_project();
        let contact_id = Uuid::new_v4();
        let mut task = ProjectTask::new("Review");
        task.assigned_to = Some(contact_id);
        projects.add_task(&id, task).unwrap();

        assert_eq!(projects.unassign_contact(&contact_id).unwrap(), 1);
        assert!(!projects.get(&id).unwrap().references_contact(&contact_id));
    }
}
