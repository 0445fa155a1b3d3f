//! The CRM facade
//!
//! [`Crm`] owns one instance of every manager over a shared
//! [`DataController`] and carries the operations that span several of them:
//! referential checks before deletes, cascades, and the activity log entry
//! written after every change to a contact, project, task or invoice.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use std::sync::{mpsc, Arc};
use uuid::Uuid;

use crate::config::CrmConfig;
use crate::data_controller::DataController;
use crate::db::Collection;
use crate::error::{CrmError, RecordKind};
use crate::managers::{
    ActivityLogManager, AlertManager, CollaborationManager, ContactsManager, DispatchReport, HelpManager,
    InvoiceDispatcher, InvoiceManager, MessagingManager, ProjectManager, DEFAULT_INVOICE_PREFIX,
};
use crate::models::{
    Action, ActivityLog, Comment, Contact, ContactType, EntityType, Invoice, InvoiceItem,
    InvoiceStatus, Milestone, Permission, Project, ProjectStatus, ProjectTask, TaskStatus,
    TimeEntry,
};
use crate::notify::ChangeEvent;

/// Records removed by [`Crm::delete_contact_cascade`]
#[derive(Debug, Default, Clone)]
pub struct CascadeReport {
    pub invoices: usize,
    pub projects: usize,
    /// Task and milestone assignments cleared in other projects
    pub unassigned: usize,
}

pub struct Crm {
    controller: Arc<DataController>,
    user_id: Uuid,
    contacts: ContactsManager,
    projects: ProjectManager,
    invoices: InvoiceManager,
    messaging: MessagingManager,
    alerts: AlertManager,
    collaboration: CollaborationManager,
    help: HelpManager,
    activity: ActivityLogManager,
}

impl Crm {
    /// Opens the store described by the configuration and loads every collection
    pub fn open(config: &CrmConfig) -> Result<Self> {
        let location = config.store_location(&config.data_path);
        let controller = DataController::open(&location, Some(config.backend))?;
        Self::with_controller(Arc::new(controller), config.user_id, &config.invoice_prefix)
    }

    /// A CRM over a volatile store
    pub fn in_memory() -> Result<Self> {
        Self::with_controller(
            Arc::new(DataController::in_memory()),
            Uuid::new_v4(),
            DEFAULT_INVOICE_PREFIX,
        )
    }

    /// A volatile store that still uses the configured user id and invoice prefix
    pub fn in_memory_with_config(config: &CrmConfig) -> Result<Self> {
        Self::with_controller(
            Arc::new(DataController::in_memory()),
            config.user_id,
            &config.invoice_prefix,
        )
    }

    pub fn with_controller(
        controller: Arc<DataController>,
        user_id: Uuid,
        invoice_prefix: &str,
    ) -> Result<Self> {
        let mut crm = Self {
            contacts: ContactsManager::new(controller.clone()),
            projects: ProjectManager::new(controller.clone()),
            invoices: InvoiceManager::with_prefix(controller.clone(), invoice_prefix),
            messaging: MessagingManager::new(controller.clone()),
            alerts: AlertManager::new(controller.clone()),
            collaboration: CollaborationManager::new(controller.clone()),
            help: HelpManager::new(),
            activity: ActivityLogManager::new(controller.clone()),
            controller,
            user_id,
        };
        crm.load_all()?;
        Ok(crm)
    }

    /// Reloads every collection, then runs the overdue and alert checks
    pub fn load_all(&mut self) -> Result<()> {
        for collection in Collection::ALL {
            self.reload(collection)?;
        }
        self.run_checks(Utc::now())?;
        Ok(())
    }

    fn reload(&mut self, collection: Collection) -> Result<()> {
        match collection {
            Collection::Contacts => self.contacts.load().map(drop),
            Collection::Projects => self.projects.load().map(drop),
            // The numbering is loaded alongside the invoices
            Collection::Invoices | Collection::InvoiceNumbering => self.invoices.load().map(drop),
            Collection::Messages => self.messaging.load().map(drop),
            Collection::Alerts => self.alerts.load().map(drop),
            Collection::Collaborations => self.collaboration.load().map(drop),
            Collection::ActivityLogs => self.activity.load().map(drop),
        }
    }

    /// Marks late invoices overdue and raises deadline and task alerts,
    /// returning the number of new alerts
    pub fn run_checks(&mut self, now: DateTime<Utc>) -> Result<usize> {
        self.invoices.refresh_overdue(now)?;
        let mut created = self
            .alerts
            .check_project_deadlines(self.projects.projects(), now)?;
        created += self.alerts.check_task_status(self.projects.projects(), now)?;
        Ok(created)
    }

    pub fn controller(&self) -> &Arc<DataController> {
        &self.controller
    }

    pub fn location(&self) -> &Path {
        self.controller.location()
    }

    pub fn user_id(&self) -> Uuid {
        self.user_id
    }

    pub fn subscribe(&self) -> mpsc::Receiver<ChangeEvent> {
        self.controller.subscribe()
    }

    pub fn contacts(&self) -> &ContactsManager {
        &self.contacts
    }

    pub fn projects(&self) -> &ProjectManager {
        &self.projects
    }

    pub fn invoices(&self) -> &InvoiceManager {
        &self.invoices
    }

    pub fn messaging(&self) -> &MessagingManager {
        &self.messaging
    }

    pub fn messaging_mut(&mut self) -> &mut MessagingManager {
        &mut self.messaging
    }

    pub fn alerts(&self) -> &AlertManager {
        &self.alerts
    }

    pub fn alerts_mut(&mut self) -> &mut AlertManager {
        &mut self.alerts
    }

    pub fn collaboration(&self) -> &CollaborationManager {
        &self.collaboration
    }

    pub fn collaboration_mut(&mut self) -> &mut CollaborationManager {
        &mut self.collaboration
    }

    pub fn help(&self) -> &HelpManager {
        &self.help
    }

    pub fn help_mut(&mut self) -> &mut HelpManager {
        &mut self.help
    }

    pub fn activity(&self) -> &ActivityLogManager {
        &self.activity
    }

    /// Appends an activity entry; the change it describes is already
    /// persisted, so a failure here is only logged
    fn record(&mut self, action: Action, entity_type: EntityType, id: Uuid, details: String) {
        let entry = ActivityLog::new(self.user_id, action, entity_type, id, details);
        if let Err(e) = self.activity.add_log(entry) {
            log::warn!(
                "event=activity_log_failed module=crm entity={} id={} error={:#}",
                entity_type,
                id,
                e
            );
        }
    }

    fn require_contact(&self, id: &Uuid) -> Result<&Contact> {
        self.contacts
            .get(id)
            .ok_or_else(|| CrmError::not_found(RecordKind::Contact, *id).into())
    }

    fn require_project(&self, id: &Uuid) -> Result<&Project> {
        self.projects
            .get(id)
            .ok_or_else(|| CrmError::not_found(RecordKind::Project, *id).into())
    }

    /// Drops the shares of a deleted record; the delete itself already
    /// succeeded, so a failure here is only logged
    fn unshare(&mut self, entity_type: EntityType, id: &Uuid) {
        if let Err(e) = self.collaboration.remove_for_entity(entity_type, id) {
            log::warn!(
                "event=unshare_failed module=crm entity={} id={} error={:#}",
                entity_type,
                id,
                e
            );
        }
    }

    // Contacts

    pub fn add_contact(&mut self, contact: Contact) -> Result<Uuid> {
        let id = contact.id;
        let name = contact.full_name();
        self.contacts.add(contact.clone())?;
        self.help.check_contact(&contact);
        self.record(Action::Created, EntityType::Contact, id, format!("Created contact {}", name));
        Ok(id)
    }

    pub fn update_contact(&mut self, contact: Contact) -> Result<()> {
        let id = contact.id;
        let name = contact.full_name();
        self.contacts.update(contact)?;
        self.record(Action::Updated, EntityType::Contact, id, format!("Updated contact {}", name));
        Ok(())
    }

    /// Deletes a contact that no project or invoice refers to
    pub fn delete_contact(&mut self, id: &Uuid) -> Result<Contact> {
        self.require_contact(id)?;
        self.contacts.can_delete(id, &self.projects)?;
        let billed = self.invoices.invoices_for_client(id).len();
        if billed > 0 {
            return Err(CrmError::InUse {
                kind: RecordKind::Contact,
                id: *id,
                reason: format!("billed on {} invoice(s)", billed),
            }
            .into());
        }

        let removed = self.contacts.delete(id)?;
        self.unshare(EntityType::Contact, id);
        self.record(
            Action::Deleted,
            EntityType::Contact,
            *id,
            format!("Deleted contact {}", removed.full_name()),
        );
        Ok(removed)
    }

    /// Deletes the contact's invoices, then its projects, then the contact
    pub fn delete_contact_cascade(&mut self, id: &Uuid) -> Result<CascadeReport> {
        self.require_contact(id)?;
        let mut report = CascadeReport::default();

        for invoice in self.invoices.delete_for_client(id)? {
            report.invoices += 1;
            self.unshare(EntityType::Invoice, &invoice.id);
            self.record(
                Action::Deleted,
                EntityType::Invoice,
                invoice.id,
                format!("Deleted invoice {}", invoice.number),
            );
        }
        for project in self.projects.delete_for_client(id)? {
            report.projects += 1;
            self.invoices.detach_project(&project.id)?;
            self.unshare_project(&project);
            self.record(
                Action::Deleted,
                EntityType::Project,
                project.id,
                format!("Deleted project {}", project.name),
            );
        }
        report.unassigned = self.projects.unassign_contact(id)?;

        let removed = self.contacts.delete(id)?;
        self.unshare(EntityType::Contact, id);
        self.record(
            Action::Deleted,
            EntityType::Contact,
            *id,
            format!("Deleted contact {} and its dependent records", removed.full_name()),
        );
        log::info!(
            "event=contact_cascade module=crm id={} invoices={} projects={}",
            id,
            report.invoices,
            report.projects
        );
        Ok(report)
    }

    // Projects

    pub fn add_project(&mut self, project: Project) -> Result<Uuid> {
        self.require_contact(&project.client_id)?;
        let id = project.id;
        let name = project.name.clone();
        self.projects.add(project.clone())?;
        self.help.check_project(&project);
        self.record(Action::Created, EntityType::Project, id, format!("Created project {}", name));
        Ok(id)
    }

    /// Replaces the project; a status change is logged as such
    pub fn update_project(&mut self, project: Project) -> Result<()> {
        self.require_contact(&project.client_id)?;
        let id = project.id;
        let previous = self.projects.update(project)?;
        let current = self.require_project(&id)?;
        let (action, details) = if previous.status != current.status {
            (
                Action::StatusChanged,
                format!("Status changed from {} to {}", previous.status, current.status),
            )
        } else {
            (Action::Updated, format!("Updated project {}", current.name))
        };
        self.record(action, EntityType::Project, id, details);
        Ok(())
    }

    pub fn set_project_status(&mut self, id: &Uuid, status: ProjectStatus) -> Result<()> {
        let mut project = self.require_project(id)?.clone();
        project.status = status;
        self.update_project(project)
    }

    pub fn delete_project(&mut self, id: &Uuid) -> Result<Project> {
        let removed = self.projects.delete(id)?;
        self.invoices.detach_project(id)?;
        self.unshare_project(&removed);
        self.record(
            Action::Deleted,
            EntityType::Project,
            *id,
            format!("Deleted project {}", removed.name),
        );
        Ok(removed)
    }

    fn unshare_project(&mut self, project: &Project) {
        self.unshare(EntityType::Project, &project.id);
        for task in &project.tasks {
            self.unshare(EntityType::Task, &task.id);
        }
    }

    pub fn toggle_favorite(&mut self, project_id: &Uuid) -> Result<bool> {
        self.projects.toggle_favorite(project_id)
    }

    pub fn add_milestone(&mut self, project_id: &Uuid, milestone: Milestone) -> Result<Uuid> {
        let id = milestone.id;
        self.projects.add_milestone(project_id, milestone)?;
        Ok(id)
    }

    pub fn complete_milestone(&mut self, project_id: &Uuid, milestone_id: &Uuid) -> Result<()> {
        self.projects.complete_milestone(project_id, milestone_id)
    }

    // Tasks

    pub fn add_task(&mut self, project_id: &Uuid, task: ProjectTask) -> Result<Uuid> {
        let id = task.id;
        let title = task.title.clone();
        self.projects.add_task(project_id, task)?;
        self.record(Action::Created, EntityType::Task, id, format!("Created task {}", title));
        Ok(id)
    }

    pub fn update_task(&mut self, project_id: &Uuid, task: ProjectTask) -> Result<()> {
        let id = task.id;
        let status = task.status;
        let title = task.title.clone();
        let previous = self.projects.update_task(project_id, task)?;
        let (action, details) = if previous.status != status {
            (
                Action::StatusChanged,
                format!("Status changed from {} to {}", previous.status, status),
            )
        } else {
            (Action::Updated, format!("Updated task {}", title))
        };
        self.record(action, EntityType::Task, id, details);
        Ok(())
    }

    pub fn set_task_status(
        &mut self,
        project_id: &Uuid,
        task_id: &Uuid,
        status: TaskStatus,
    ) -> Result<()> {
        let previous = self.projects.set_task_status(project_id, task_id, status)?;
        if previous != status {
            self.record(
                Action::StatusChanged,
                EntityType::Task,
                *task_id,
                format!("Status changed from {} to {}", previous, status),
            );
        }
        Ok(())
    }

    pub fn delete_task(&mut self, project_id: &Uuid, task_id: &Uuid) -> Result<ProjectTask> {
        let removed = self.projects.delete_task(project_id, task_id)?;
        self.unshare(EntityType::Task, task_id);
        self.record(
            Action::Deleted,
            EntityType::Task,
            *task_id,
            format!("Deleted task {}", removed.title),
        );
        Ok(removed)
    }

    pub fn log_time(&mut self, project_id: &Uuid, task_id: &Uuid, mut entry: TimeEntry) -> Result<()> {
        if entry.user_id.is_none() {
            entry.user_id = Some(self.user_id);
        }
        let hours = entry.hours;
        self.projects.log_time(project_id, task_id, entry)?;
        self.record(
            Action::Updated,
            EntityType::Task,
            *task_id,
            format!("Logged {:.2}h", hours),
        );
        Ok(())
    }

    pub fn add_task_comment(&mut self, project_id: &Uuid, task_id: &Uuid, text: &str) -> Result<()> {
        let comment = Comment::new(text, self.user_id);
        self.projects.add_task_comment(project_id, task_id, comment)
    }

    // Invoices

    pub fn add_invoice(&mut self, invoice: Invoice) -> Result<Uuid> {
        self.require_contact(&invoice.client_id)?;
        if let Some(project_id) = invoice.project_id {
            self.require_project(&project_id)?;
        }
        let id = invoice.id;
        self.invoices.add(invoice)?;
        let number = self
            .invoices
            .get(&id)
            .map(|i| i.number.clone())
            .unwrap_or_default();
        self.record(Action::Created, EntityType::Invoice, id, format!("Created invoice {}", number));
        Ok(id)
    }

    pub fn update_invoice(&mut self, invoice: Invoice) -> Result<()> {
        self.require_contact(&invoice.client_id)?;
        if let Some(project_id) = invoice.project_id {
            self.require_project(&project_id)?;
        }
        let id = invoice.id;
        let status = invoice.status;
        let number = invoice.number.clone();
        let previous = self.invoices.update(invoice)?;
        self.record_invoice_change(id, &number, previous.status, status);
        Ok(())
    }

    pub fn mark_invoice_paid(&mut self, id: &Uuid) -> Result<()> {
        let previous = self.invoices.mark_paid(id)?;
        let number = self.invoices.get(id).map(|i| i.number.clone()).unwrap_or_default();
        self.record_invoice_change(*id, &number, previous, InvoiceStatus::Paid);
        Ok(())
    }

    pub fn delete_invoice(&mut self, id: &Uuid) -> Result<Invoice> {
        let removed = self.invoices.delete(id)?;
        self.unshare(EntityType::Invoice, id);
        self.record(
            Action::Deleted,
            EntityType::Invoice,
            *id,
            format!("Deleted invoice {}", removed.number),
        );
        Ok(removed)
    }

    /// Dispatches every draft invoice and logs the ones now sent
    pub fn send_pending_invoices(&mut self, dispatcher: &dyn InvoiceDispatcher) -> Result<DispatchReport> {
        let report = self.invoices.process_pending(dispatcher)?;
        let sent: Vec<Uuid> = self
            .invoices
            .invoices()
            .iter()
            .filter(|i| report.sent.contains(&i.number))
            .map(|i| i.id)
            .collect();
        for id in sent {
            self.record(
                Action::StatusChanged,
                EntityType::Invoice,
                id,
                format!("Status changed from {} to {}", InvoiceStatus::Draft, InvoiceStatus::Sent),
            );
        }
        Ok(report)
    }

    fn record_invoice_change(&mut self, id: Uuid, number: &str, from: InvoiceStatus, to: InvoiceStatus) {
        if from != to {
            self.record(
                Action::StatusChanged,
                EntityType::Invoice,
                id,
                format!("Status changed from {} to {}", from, to),
            );
        } else {
            self.record(Action::Updated, EntityType::Invoice, id, format!("Updated invoice {}", number));
        }
    }

    // Sharing

    /// Shares an existing record with `user_ids`, returning the share's id
    pub fn share_entity(
        &mut self,
        entity_type: EntityType,
        entity_id: Uuid,
        user_ids: Vec<Uuid>,
        permissions: &[Permission],
    ) -> Result<Uuid> {
        match entity_type {
            EntityType::Contact => self.require_contact(&entity_id).map(drop)?,
            EntityType::Project => self.require_project(&entity_id).map(drop)?,
            EntityType::Invoice => {
                if self.invoices.get(&entity_id).is_none() {
                    return Err(CrmError::not_found(RecordKind::Invoice, entity_id).into());
                }
            }
            EntityType::Task => {
                let known = self
                    .projects
                    .projects()
                    .iter()
                    .any(|p| p.tasks.iter().any(|t| t.id == entity_id));
                if !known {
                    return Err(CrmError::not_found(RecordKind::Task, entity_id).into());
                }
            }
        }
        self.collaboration
            .share_entity(entity_type, entity_id, user_ids, permissions)
    }

    // Store-wide operations

    /// Reloads the collections another process changed, returning them
    pub fn sync_remote_changes(&mut self) -> Result<Vec<Collection>> {
        let changed = self.controller.process_remote_changes()?;
        for collection in &changed {
            self.reload(*collection)?;
        }
        if !changed.is_empty() {
            log::info!("event=sync module=crm collections={}", changed.len());
        }
        Ok(changed)
    }

    /// Replaces contacts, projects and invoices, as done by a backup restore
    ///
    /// When one of the writes fails the three collections are put back to
    /// what they held before and the error is returned.
    pub fn restore(
        &mut self,
        contacts: Vec<Contact>,
        projects: Vec<Project>,
        invoices: Vec<Invoice>,
    ) -> Result<()> {
        let saved_contacts = self.contacts.backup_data();
        let saved_projects = self.projects.backup_data();
        let saved_invoices = self.invoices.backup_data();

        let replaced = self
            .contacts
            .restore(contacts)
            .and_then(|()| self.projects.restore(projects))
            .and_then(|()| self.invoices.restore(invoices));
        if let Err(e) = replaced {
            log::error!("event=restore_failed module=crm error={:#}", e);
            let rollbacks = [
                (Collection::Contacts, self.contacts.restore(saved_contacts)),
                (Collection::Projects, self.projects.restore(saved_projects)),
                (Collection::Invoices, self.invoices.restore(saved_invoices)),
            ];
            for (collection, rollback) in rollbacks {
                if let Err(rollback) = rollback {
                    log::error!(
                        "event=restore_rollback_failed module=crm collection={} error={:#}",
                        collection,
                        rollback
                    );
                }
            }
            return Err(e);
        }
        self.run_checks(Utc::now())?;
        Ok(())
    }

    /// Deletes every stored record
    pub fn reset(&mut self) -> Result<()> {
        self.controller.delete_all_data()?;
        self.help.clear_messages();
        for collection in Collection::ALL {
            self.reload(collection)?;
        }
        Ok(())
    }

    /// Adds a client with one project, one task and one invoice
    pub fn create_sample_data(&mut self) -> Result<()> {
        let mut client = Contact::new("Claire", "Martin", ContactType::Client)
            .with_email("contact@example.com")
            .with_organization("Example Company");
        client.phone = "01 23 45 67 89".into();
        client.notes = "Loyal client since 2020".into();
        let client_id = self.add_contact(client)?;

        let mut project = Project::new("Website redesign", client_id);
        project.notes = "Complete responsive redesign of the website".into();
        project.deadline = Some(Utc::now() + Duration::days(60));
        project.status = ProjectStatus::InProgress;
        let project_id = self.add_project(project)?;

        let mut task = ProjectTask::new("Front-end development");
        task.estimated_hours = Some(40.0);
        self.add_task(&project_id, task)?;

        let mut invoice = Invoice::new(client_id)
            .with_item(InvoiceItem::new("Front-end development", 5.0, 300.0));
        invoice.project_id = Some(project_id);
        self.add_invoice(invoice)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Action;
    use crate::notify::ChangeKind;
    use tempfile::TempDir;

    fn crm_with_client() -> (Crm, Uuid) {
        let mut crm = Crm::in_memory().unwrap();
        let id = crm
            .add_contact(Contact::new("Ada", "Lovelace", ContactType::Client))
            .unwrap();
        (crm, id)
    }

    #[test]
    fn test_add_contact_logs_activity() {
        let (crm, id) = crm_with_client();
        let logs = crm.activity().logs_for_entity(EntityType::Contact, &id);
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].action, Action::Created);
        assert_eq!(logs[0].user_id, crm.user_id());
        // No notes and no organization
        assert_eq!(crm.help().messages().len(), 2);
    }

    #[test]
    fn test_project_requires_known_client() {
        let mut crm = Crm::in_memory().unwrap();
        let err = crm
            .add_project(Project::new("Orphan", Uuid::new_v4()))
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrmError>(),
            Some(CrmError::NotFound { kind: RecordKind::Contact, .. })
        ));
    }

    #[test]
    fn test_status_change_is_logged() {
        let (mut crm, client) = crm_with_client();
        let project_id = crm.add_project(Project::new("Website", client)).unwrap();
        crm.set_project_status(&project_id, ProjectStatus::InProgress).unwrap();

        let logs = crm.activity().logs_for_entity(EntityType::Project, &project_id);
        assert!(logs
            .iter()
            .any(|l| l.action == Action::StatusChanged
                && l.details == "Status changed from Planning to In progress"));
    }

    #[test]
    fn test_delete_contact_blocked_then_cascade() {
        let (mut crm, client) = crm_with_client();
        let project_id = crm.add_project(Project::new("Website", client)).unwrap();
        let mut invoice = Invoice::new(client).with_item(InvoiceItem::new("Design", 1.0, 500.0));
        invoice.project_id = Some(project_id);
        crm.add_invoice(invoice).unwrap();

        let err = crm.delete_contact(&client).unwrap_err();
        assert!(matches!(err.downcast_ref::<CrmError>(), Some(CrmError::InUse { .. })));
        assert!(crm.contacts().get(&client).is_some());

        let report = crm.delete_contact_cascade(&client).unwrap();
        assert_eq!(report.invoices, 1);
        assert_eq!(report.projects, 1);
        assert!(crm.contacts().contacts().is_empty());
        assert!(crm.projects().projects().is_empty());
        assert!(crm.invoices().invoices().is_empty());
    }

    #[test]
    fn test_delete_contact_blocked_by_invoice_only() {
        let (mut crm, client) = crm_with_client();
        crm.add_invoice(Invoice::new(client)).unwrap();
        assert!(crm.delete_contact(&client).is_err());

        let invoice_id = crm.invoices().invoices()[0].id;
        crm.delete_invoice(&invoice_id).unwrap();
        crm.delete_contact(&client).unwrap();
        assert!(crm.contacts().contacts().is_empty());
    }

    #[test]
    fn test_delete_project_detaches_invoices() {
        let (mut crm, client) = crm_with_client();
        let project_id = crm.add_project(Project::new("Website", client)).unwrap();
        let mut invoice = Invoice::new(client);
        invoice.project_id = Some(project_id);
        let invoice_id = crm.add_invoice(invoice).unwrap();

        crm.delete_project(&project_id).unwrap();
        assert_eq!(crm.invoices().get(&invoice_id).unwrap().project_id, None);
    }

    #[test]
    fn test_records_survive_reopen() {
        let temp_dir = TempDir::new().unwrap();
        let config = CrmConfig {
            data_path: temp_dir.path().to_path_buf(),
            ..CrmConfig::default()
        };
        {
            let mut crm = Crm::open(&config).unwrap();
            crm.create_sample_data().unwrap();
        }

        let crm = Crm::open(&config).unwrap();
        assert_eq!(crm.contacts().contacts().len(), 1);
        assert_eq!(crm.projects().projects().len(), 1);
        assert_eq!(crm.projects().projects()[0].tasks.len(), 1);
        let invoice = &crm.invoices().invoices()[0];
        assert_eq!(invoice.total(), 1500.0);
        assert!(invoice.number.ends_with("-0001"));
    }

    #[test]
    fn test_sync_remote_changes_reloads() {
        let temp_dir = TempDir::new().unwrap();
        let config = CrmConfig {
            data_path: temp_dir.path().to_path_buf(),
            backend: crate::db::BackendType::Sqlite,
            ..CrmConfig::default()
        };
        let mut ours = Crm::open(&config).unwrap();
        let mut theirs = Crm::open(&config).unwrap();
        let events = ours.subscribe();

        theirs
            .add_contact(Contact::new("Grace", "Hopper", ContactType::Prospect))
            .unwrap();
        assert!(ours.contacts().contacts().is_empty());

        let changed = ours.sync_remote_changes().unwrap();
        assert!(changed.contains(&Collection::Contacts));
        assert_eq!(ours.contacts().contacts().len(), 1);
        assert!(events.try_iter().any(|e| e.kind == ChangeKind::RemoteChange));
    }

    #[test]
    fn test_update_invoice_requires_known_client_and_project() {
        let (mut crm, client) = crm_with_client();
        let id = crm.add_invoice(Invoice::new(client)).unwrap();

        let mut stray = crm.invoices().get(&id).unwrap().clone();
        stray.client_id = Uuid::new_v4();
        let err = crm.update_invoice(stray).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrmError>(),
            Some(CrmError::NotFound { kind: RecordKind::Contact, .. })
        ));

        let mut stray = crm.invoices().get(&id).unwrap().clone();
        stray.project_id = Some(Uuid::new_v4());
        let err = crm.update_invoice(stray).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrmError>(),
            Some(CrmError::NotFound { kind: RecordKind::Project, .. })
        ));
        assert_eq!(crm.invoices().get(&id).unwrap().client_id, client);
        assert_eq!(crm.invoices().get(&id).unwrap().project_id, None);
    }

    #[test]
    fn test_in_memory_store_uses_configured_prefix_and_user() {
        let config = CrmConfig {
            invoice_prefix: "ACME-".into(),
            ..CrmConfig::default()
        };
        let mut crm = Crm::in_memory_with_config(&config).unwrap();
        assert_eq!(crm.user_id(), config.user_id);

        crm.create_sample_data().unwrap();
        assert!(crm.invoices().invoices()[0].number.starts_with("ACME-"));
        assert!(crm.activity().logs().iter().all(|l| l.user_id == config.user_id));
    }

    #[test]
    fn test_share_requires_existing_record() {
        let (mut crm, client) = crm_with_client();
        let err = crm
            .share_entity(EntityType::Project, Uuid::new_v4(), vec![Uuid::new_v4()], &Permission::ALL)
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrmError>(),
            Some(CrmError::NotFound { kind: RecordKind::Project, .. })
        ));

        let user = Uuid::new_v4();
        crm.share_entity(EntityType::Contact, client, vec![user], &Permission::READ_ONLY)
            .unwrap();
        assert!(crm
            .collaboration()
            .has_permission(Permission::View, EntityType::Contact, &client, &user));
    }

    #[test]
    fn test_deletes_drop_shares() {
        let (mut crm, client) = crm_with_client();
        let project_id = crm.add_project(Project::new("Website", client)).unwrap();
        let task = ProjectTask::new("Mockups");
        let task_id = crm.add_task(&project_id, task).unwrap();
        let invoice_id = crm.add_invoice(Invoice::new(client)).unwrap();
        let user = vec![Uuid::new_v4()];

        crm.share_entity(EntityType::Task, task_id, user.clone(), &Permission::ALL)
            .unwrap();
        crm.share_entity(EntityType::Project, project_id, user.clone(), &Permission::ALL)
            .unwrap();
        crm.share_entity(EntityType::Invoice, invoice_id, user.clone(), &Permission::ALL)
            .unwrap();
        crm.share_entity(EntityType::Contact, client, user, &Permission::ALL)
            .unwrap();

        crm.delete_invoice(&invoice_id).unwrap();
        assert!(crm
            .collaboration()
            .for_entity(EntityType::Invoice, &invoice_id)
            .is_empty());
        assert_eq!(crm.collaboration().collaborations().len(), 3);

        crm.delete_contact_cascade(&client).unwrap();
        assert!(crm.collaboration().collaborations().is_empty());
    }

    #[test]
    fn test_reset_deletes_everything() {
        let (mut crm, _) = crm_with_client();
        crm.reset().unwrap();
        assert!(crm.contacts().contacts().is_empty());
        assert!(crm.activity().logs().is_empty());
    }
}
