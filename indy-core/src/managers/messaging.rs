use anyhow::Result;
use std::sync::Arc;
use uuid::Uuid;

use super::RecordStore;
use crate::data_controller::DataController;
use crate::models::Message;

/// Notifies the recipients of a private message
pub trait MessageNotifier: Send {
    fn notify(&self, message: &Message) -> Result<()>;
}

pub struct LoggingNotifier;

impl MessageNotifier for LoggingNotifier {
    fn notify(&self, message: &Message) -> Result<()> {
        log::info!(
            "event=message_notify module=messaging id={} recipients={}",
            message.id,
            message.recipient_ids.len()
        );
        Ok(())
    }
}

pub struct MessagingManager {
    store: RecordStore<Message>,
    notifier: Box<dyn MessageNotifier>,
}

impl MessagingManager {
    pub fn new(controller: Arc<DataController>) -> Self {
        Self::with_notifier(controller, Box::new(LoggingNotifier))
    }

    pub fn with_notifier(controller: Arc<DataController>, notifier: Box<dyn MessageNotifier>) -> Self {
        Self {
            store: RecordStore::new(controller),
            notifier,
        }
    }

    pub fn load(&mut self) -> Result<usize> {
        self.store.load()
    }

    pub fn messages(&self) -> &[Message] {
        self.store.items()
    }

    pub fn get(&self, id: &Uuid) -> Option<&Message> {
        self.store.get(id)
    }

    /// Stores the message, then notifies recipients of private messages
    ///
    /// A failed notification is logged; the message stays sent.
    pub fn send_message(&mut self, message: Message) -> Result<()> {
        message.validate()?;
        let notify = !message.is_public;
        let stored = message.clone();
        self.store.insert(message)?;

        if notify {
            if let Err(e) = self.notifier.notify(&stored) {
                log::warn!(
                    "event=message_notify_failed module=messaging id={} error={:#}",
                    stored.id,
                    e
                );
            }
        }
        Ok(())
    }

    pub fn delete(&mut self, id: &Uuid) -> Result<Message> {
        self.store.remove(id)
    }

    /// Messages sent or received by the contact, newest first
    pub fn messages_for(&self, contact_id: &Uuid) -> Vec<&Message> {
        let mut messages: Vec<&Message> = self
            .messages()
            .iter()
            .filter(|m| m.involves(contact_id))
            .collect();
        messages.sort_by(|a, b| b.date.cmp(&a.date));
        messages
    }

    pub fn public_messages(&self) -> Vec<&Message> {
        self.messages().iter().filter(|m| m.is_public).collect()
    }

    pub fn backup_data(&self) -> Vec<Message> {
        self.messages().to_vec()
    }

    pub fn restore(&mut self, messages: Vec<Message>) -> Result<()> {
        self.store.replace_all(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CrmError;
    use std::sync::Mutex;

    struct Recording(Arc<Mutex<Vec<Uuid>>>);

    impl MessageNotifier for Recording {
        fn notify(&self, message: &Message) -> Result<()> {
            self.0.lock().unwrap().push(message.id);
            Ok(())
        }
    }

    struct Broken;

    impl MessageNotifier for Broken {
        fn notify(&self, _message: &Message) -> Result<()> {
            anyhow::bail!("smtp down")
        }
    }

    #[test]
    fn test_only_private_messages_notify() {
        let notified = Arc::new(Mutex::new(Vec::new()));
        let controller = Arc::new(DataController::in_memory());
        let mut messaging =
            MessagingManager::with_notifier(controller, Box::new(Recording(notified.clone())));

        let sender = Uuid::new_v4();
        let recipient = Uuid::new_v4();
        let private = Message::new(sender, vec![recipient], "Kickoff", "See you monday");
        let private_id = private.id;
        let mut public = Message::new(sender, vec![], "Holidays", "Office closed");
        public.is_public = true;

        messaging.send_message(private).unwrap();
        messaging.send_message(public).unwrap();

        assert_eq!(*notified.lock().unwrap(), vec![private_id]);
        assert_eq!(messaging.messages_for(&recipient).len(), 1);
        assert_eq!(messaging.messages_for(&sender).len(), 2);
        assert_eq!(messaging.public_messages().len(), 1);
    }

    #[test]
    fn test_notification_failure_keeps_message() {
        let controller = Arc::new(DataController::in_memory());
        let mut messaging = MessagingManager::with_notifier(controller, Box::new(Broken));
        let message = Message::new(Uuid::new_v4(), vec![Uuid::new_v4()], "Invoice", "Attached");

        messaging.send_message(message).unwrap();
        assert_eq!(messaging.messages().len(), 1);
    }

    #[test]
    fn test_send_rejects_missing_subject() {
        let controller = Arc::new(DataController::in_memory());
        let mut messaging = MessagingManager::new(controller);
        let message = Message::new(Uuid::new_v4(), vec![Uuid::new_v4()], "  ", "body");

        let err = messaging.send_message(message).unwrap_err();
        assert!(matches!(err.downcast_ref::<CrmError>(), Some(CrmError::Validation(_))));
        assert!(messaging.messages().is_empty());
    }
}
