use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

use super::{ProjectManager, RecordStore};
use crate::data_controller::DataController;
use crate::error::{CrmError, RecordKind};
use crate::models::{Contact, ContactType};

/// Owns the contact book
pub struct ContactsManager {
    store: RecordStore<Contact>,
}

impl ContactsManager {
    pub fn new(controller: Arc<DataController>) -> Self {
        Self {
            store: RecordStore::new(controller),
        }
    }

    /// Loads the stored contacts, returning how many were found
    pub fn load(&mut self) -> Result<usize> {
        self.store.load()
    }

    pub fn contacts(&self) -> &[Contact] {
        self.store.items()
    }

    pub fn get(&self, id: &Uuid) -> Option<&Contact> {
        self.store.get(id)
    }

    pub fn add(&mut self, contact: Contact) -> Result<()> {
        contact.validate()?;
        log::info!(
            "event=contact_add module=contacts id={} name={}",
            contact.id,
            contact.full_name()
        );
        self.store.insert(contact)
    }

    /// Replaces the contact with the same id, returning the previous version
    pub fn update(&mut self, mut contact: Contact) -> Result<Contact> {
        contact.validate()?;
        contact.updated_at = chrono::Utc::now();
        self.store.replace(contact)
    }

    pub fn delete(&mut self, id: &Uuid) -> Result<Contact> {
        let removed = self.store.remove(id)?;
        log::info!("event=contact_delete module=contacts id={}", id);
        Ok(removed)
    }

    /// Deletes the contacts at the given positions of [`Self::contacts`]
    pub fn delete_at(&mut self, indices: &[usize]) -> Result<Vec<Contact>> {
        let ids: Vec<Uuid> = indices
            .iter()
            .filter_map(|&i| self.contacts().get(i).map(|c| c.id))
            .collect();
        self.store.remove_where(|c| ids.contains(&c.id))
    }

    /// Fails with `InUse` while a project refers to the contact as client,
    /// task assignee or milestone assignee
    pub fn can_delete(&self, id: &Uuid, projects: &ProjectManager) -> Result<(), CrmError> {
        match projects
            .projects()
            .iter()
            .find(|p| p.references_contact(id))
        {
            Some(project) => Err(CrmError::InUse {
                kind: RecordKind::Contact,
                id: *id,
                reason: format!("referenced by project '{}'", project.name),
            }),
            None => Ok(()),
        }
    }

    /// Case-insensitive match on name, email and organization
    pub fn search(&self, query: &str) -> Vec<&Contact> {
        self.contacts().iter().filter(|c| c.matches(query)).collect()
    }

    pub fn by_type(&self, contact_type: ContactType) -> Vec<&Contact> {
        self.contacts()
            .iter()
            .filter(|c| c.contact_type == contact_type)
            .collect()
    }

    /// Contacts ordered by last name, then first name
    pub fn sorted_by_name(&self) -> Vec<&Contact> {
        let mut sorted: Vec<&Contact> = self.contacts().iter().collect();
        sorted.sort_by_key(|c| (c.last_name.to_lowercase(), c.first_name.to_lowercase()));
        sorted
    }

    pub fn backup_data(&self) -> Vec<Contact> {
        self.contacts().to_vec()
    }

    /// Replaces every contact with `contacts` and persists them
    pub fn restore(&mut self, contacts: Vec<Contact>) -> Result<()> {
        log::info!("event=contacts_restore module=contacts count={}", contacts.len());
        self.store.replace_all(contacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Project;

    fn manager() -> (Arc<DataController>, ContactsManager) {
        let controller = Arc::new(DataController::in_memory());
        (controller.clone(), ContactsManager::new(controller))
    }

    #[test]
    fn test_add_then_get() {
        let (_, mut contacts) = manager();
        let contact = Contact::new("Ada", "Lovelace", ContactType::Client).with_email("ada@example.com");
        let id = contact.id;
        contacts.add(contact).unwrap();

        assert_eq!(contacts.get(&id).unwrap().email, "ada@example.com");
    }

    #[test]
    fn test_add_rejects_invalid_email() {
        let (_, mut contacts) = manager();
        let contact = Contact::new("Ada", "Lovelace", ContactType::Client).with_email("not-an-email");
        let err = contacts.add(contact).unwrap_err();
        assert!(matches!(err.downcast_ref::<CrmError>(), Some(CrmError::Validation(_))));
        assert!(contacts.contacts().is_empty());
    }

    #[test]
    fn test_update_replaces_by_id() {
        let (_, mut contacts) = manager();
        let contact = Contact::new("Ada", "Lovelace", ContactType::Prospect);
        contacts.add(contact.clone()).unwrap();

        let mut changed = contact.clone();
        changed.contact_type = ContactType::Client;
        let previous = contacts.update(changed).unwrap();

        assert_eq!(previous.contact_type, ContactType::Prospect);
        assert_eq!(contacts.get(&contact.id).unwrap().contact_type, ContactType::Client);
        assert_eq!(contacts.contacts().len(), 1);
    }

    #[test]
    fn test_update_unknown_contact_is_not_found() {
        let (_, mut contacts) = manager();
        let err = contacts
            .update(Contact::new("Nobody", "Here", ContactType::Client))
            .unwrap_err();
        assert!(matches!(err.downcast_ref::<CrmError>(), Some(CrmError::NotFound { .. })));
    }

    #[test]
    fn test_delete_at_and_reload() {
        let (controller, mut contacts) = manager();
        contacts.add(Contact::new("A", "One", ContactType::Client)).unwrap();
        contacts.add(Contact::new("B", "Two", ContactType::Client)).unwrap();
        contacts.add(Contact::new("C", "Three", ContactType::Client)).unwrap();

        let removed = contacts.delete_at(&[0, 2, 7]).unwrap();
        assert_eq!(removed.len(), 2);

        let mut reloaded = ContactsManager::new(controller);
        assert_eq!(reloaded.load().unwrap(), 1);
        assert_eq!(reloaded.contacts()[0].first_name, "B");
    }

    #[test]
    fn test_can_delete_checks_projects() {
        let (controller, contacts) = manager();
        let mut projects = ProjectManager::new(controller);
        let client = Contact::new("Ada", "Lovelace", ContactType::Client);
        let assignee = Contact::new("Grace", "Hopper", ContactType::Partner);
        let free = Contact::new("Alan", "Turing", ContactType::Prospect);

        let mut project = Project::new("Website", client.id);
        let mut task = crate::models::ProjectTask::new("Design");
        task.assigned_to = Some(assignee.id);
        project.tasks.push(task);
        projects.add(project).unwrap();

        assert!(matches!(
            contacts.can_delete(&client.id, &projects),
            Err(CrmError::InUse { .. })
        ));
        assert!(contacts.can_delete(&assignee.id, &projects).is_err());
        assert!(contacts.can_delete(&free.id, &projects).is_ok());
    }

    #[test]
    fn test_search_and_sort() {
        let (_, mut contacts) = manager();
        contacts
            .add(Contact::new("Grace", "Hopper", ContactType::Client).with_organization("Navy"))
            .unwrap();
        contacts.add(Contact::new("Ada", "Lovelace", ContactType::Prospect)).unwrap();
        contacts.add(Contact::new("Alan", "Babbage", ContactType::Client)).unwrap();

        assert_eq!(contacts.search("navy").len(), 1);
        assert_eq!(contacts.by_type(ContactType::Client).len(), 2);
        let sorted = contacts.sorted_by_name();
        let names: Vec<&str> = sorted
            .iter()
            .map(|c| c.last_name.as_str())
            .collect();
        assert_eq!(names, vec!["Babbage", "Hopper", "Lovelace"]);
    }
}
