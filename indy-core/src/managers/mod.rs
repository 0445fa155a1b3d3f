//! In-memory stores over one record type each
//!
//! Every manager owns the records of one collection, persists each mutation
//! through the shared [`DataController`] and then publishes a
//! [`ChangeEvent`]. When persisting fails the in-memory records are put back
//! to their previous state and the error is returned.

mod activity_log;
mod alerts;
mod collaboration;
mod contacts;
mod help;
mod invoices;
mod messaging;
mod projects;

pub use activity_log::ActivityLogManager;
pub use alerts::{AlertManager, DEADLINE_WARNING_DAYS, OLD_ALERT_DAYS};
pub use collaboration::CollaborationManager;
pub use contacts::ContactsManager;
pub use help::HelpManager;
pub use invoices::{
    DispatchReport, InvoiceDispatcher, InvoiceManager, InvoiceNumberer, LoggingDispatcher,
    DEFAULT_INVOICE_PREFIX,
};
pub use messaging::{LoggingNotifier, MessageNotifier, MessagingManager};
pub use projects::ProjectManager;

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

use crate::data_controller::DataController;
use crate::db::Collection;
use crate::error::{CrmError, RecordKind};
use crate::models::{ActivityLog, Alert, Collaboration, Contact, Invoice, Message, Project};
use crate::notify::{ChangeEvent, ChangeKind};

/// A record stored by id in one collection
pub trait Record: Clone + Serialize + DeserializeOwned {
    const KIND: RecordKind;
    const COLLECTION: Collection;

    fn id(&self) -> Uuid;
}

impl Record for Contact {
    const KIND: RecordKind = RecordKind::Contact;
    const COLLECTION: Collection = Collection::Contacts;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Record for Project {
    const KIND: RecordKind = RecordKind::Project;
    const COLLECTION: Collection = Collection::Projects;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Record for Invoice {
    const KIND: RecordKind = RecordKind::Invoice;
    const COLLECTION: Collection = Collection::Invoices;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Record for Message {
    const KIND: RecordKind = RecordKind::Message;
    const COLLECTION: Collection = Collection::Messages;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Record for Alert {
    const KIND: RecordKind = RecordKind::Alert;
    const COLLECTION: Collection = Collection::Alerts;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Record for Collaboration {
    const KIND: RecordKind = RecordKind::Collaboration;
    const COLLECTION: Collection = Collection::Collaborations;

    fn id(&self) -> Uuid {
        self.id
    }
}

impl Record for ActivityLog {
    const KIND: RecordKind = RecordKind::ActivityLog;
    const COLLECTION: Collection = Collection::ActivityLogs;

    fn id(&self) -> Uuid {
        self.id
    }
}

/// The records of one collection plus their persistence
pub(crate) struct RecordStore<T: Record> {
    controller: Arc<DataController>,
    items: Vec<T>,
}

impl<T: Record> RecordStore<T> {
    pub(crate) fn new(controller: Arc<DataController>) -> Self {
        Self {
            controller,
            items: Vec::new(),
        }
    }

    pub(crate) fn items(&self) -> &[T] {
        &self.items
    }

    /// Replaces the in-memory records with the stored ones
    pub(crate) fn load(&mut self) -> Result<usize> {
        self.items = self.controller.load(T::COLLECTION)?;
        log::info!(
            "event=load module=managers collection={} count={}",
            T::COLLECTION,
            self.items.len()
        );
        self.publish(ChangeKind::Reloaded, None);
        Ok(self.items.len())
    }

    pub(crate) fn get(&self, id: &Uuid) -> Option<&T> {
        self.items.iter().find(|r| r.id() == *id)
    }

    fn position(&self, id: &Uuid) -> Result<usize> {
        self.items
            .iter()
            .position(|r| r.id() == *id)
            .ok_or_else(|| CrmError::not_found(T::KIND, *id).into())
    }

    pub(crate) fn insert(&mut self, record: T) -> Result<()> {
        let id = record.id();
        self.commit(|items| {
            items.push(record);
            Ok(())
        })?;
        self.publish(ChangeKind::Added, Some(id));
        Ok(())
    }

    /// Replaces the record with the same id, returning the previous value
    pub(crate) fn replace(&mut self, record: T) -> Result<T> {
        let index = self.position(&record.id())?;
        let id = record.id();
        let previous = self.commit(|items| Ok(std::mem::replace(&mut items[index], record)))?;
        self.publish(ChangeKind::Updated, Some(id));
        Ok(previous)
    }

    /// Applies `change` to a copy of the record and stores the result
    pub(crate) fn modify<R>(&mut self, id: &Uuid, change: impl FnOnce(&mut T) -> Result<R>) -> Result<R> {
        let index = self.position(id)?;
        let mut record = self.items[index].clone();
        let result = change(&mut record)?;
        self.commit(|items| {
            items[index] = record;
            Ok(())
        })?;
        self.publish(ChangeKind::Updated, Some(*id));
        Ok(result)
    }

    pub(crate) fn remove(&mut self, id: &Uuid) -> Result<T> {
        let index = self.position(id)?;
        let removed = self.commit(|items| Ok(items.remove(index)))?;
        self.publish(ChangeKind::Deleted, Some(*id));
        Ok(removed)
    }

    /// Removes every record matching `predicate` in one write
    pub(crate) fn remove_where(&mut self, predicate: impl Fn(&T) -> bool) -> Result<Vec<T>> {
        if !self.items.iter().any(&predicate) {
            return Ok(Vec::new());
        }
        let removed = self.commit(|items| {
            let (removed, kept): (Vec<T>, Vec<T>) = items.drain(..).partition(|r| predicate(r));
            *items = kept;
            Ok(removed)
        })?;
        for record in &removed {
            self.publish(ChangeKind::Deleted, Some(record.id()));
        }
        Ok(removed)
    }

    /// Replaces every record, used by restores and bulk updates
    pub(crate) fn replace_all(&mut self, records: Vec<T>) -> Result<()> {
        self.commit(|items| {
            *items = records;
            Ok(())
        })?;
        self.publish(ChangeKind::Reloaded, None);
        Ok(())
    }

    fn commit<R>(&mut self, change: impl FnOnce(&mut Vec<T>) -> Result<R>) -> Result<R> {
        let snapshot = self.items.clone();
        let result = match change(&mut self.items) {
            Ok(result) => result,
            Err(e) => {
                self.items = snapshot;
                return Err(e);
            }
        };
        if let Err(e) = self.controller.save(T::COLLECTION, &self.items) {
            log::error!(
                "event=save_failed module=managers collection={} error={:#}",
                T::COLLECTION,
                e
            );
            self.items = snapshot;
            return Err(e);
        }
        Ok(result)
    }

    fn publish(&self, kind: ChangeKind, id: Option<Uuid>) {
        self.controller.publish(ChangeEvent {
            collection: T::COLLECTION,
            kind,
            id,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ContactType;

    #[test]
    fn test_record_store_publishes_after_persisting() {
        let controller = Arc::new(DataController::in_memory());
        let events = controller.subscribe();
        let mut store: RecordStore<Contact> = RecordStore::new(controller.clone());

        let contact = Contact::new("Ada", "Lovelace", ContactType::Client);
        let id = contact.id;
        store.insert(contact).unwrap();

        let saved: Vec<Contact> = controller.load(Collection::Contacts).unwrap();
        assert_eq!(saved.len(), 1);
        let event = events.try_recv().unwrap();
        assert_eq!(event, ChangeEvent::new(Collection::Contacts, ChangeKind::Added, id));
    }

    #[test]
    fn test_record_store_unknown_id_is_not_found() {
        let controller = Arc::new(DataController::in_memory());
        let mut store: RecordStore<Contact> = RecordStore::new(controller);

        let err = store.remove(&Uuid::new_v4()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CrmError>(),
            Some(CrmError::NotFound { kind: RecordKind::Contact, .. })
        ));
    }

    #[test]
    fn test_record_store_failed_change_is_rolled_back() {
        let controller = Arc::new(DataController::in_memory());
        let mut store: RecordStore<Contact> = RecordStore::new(controller);
        let contact = Contact::new("Ada", "Lovelace", ContactType::Client);
        let id = contact.id;
        store.insert(contact).unwrap();

        let result: Result<()> = store.modify(&id, |c| {
            c.first_name.clear();
            Err(CrmError::validation("rejected").into())
        });
        assert!(result.is_err());
        assert_eq!(store.get(&id).unwrap().first_name, "Ada");
    }

    #[test]
    fn test_record_store_remove_where() {
        let controller = Arc::new(DataController::in_memory());
        let mut store: RecordStore<Contact> = RecordStore::new(controller);
        store.insert(Contact::new("A", "One", ContactType::Client)).unwrap();
        store.insert(Contact::new("B", "Two", ContactType::Prospect)).unwrap();
        store.insert(Contact::new("C", "Three", ContactType::Client)).unwrap();

        let removed = store
            .remove_where(|c| c.contact_type == ContactType::Client)
            .unwrap();
        assert_eq!(removed.len(), 2);
        assert_eq!(store.items().len(), 1);
    }
}
