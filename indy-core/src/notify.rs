//! Change notification for observers of the CRM stores
//!
//! Managers publish a [`ChangeEvent`] after every successful mutation.
//! Observers subscribe and receive events on an `mpsc` channel, so they can
//! live on another thread.

use std::sync::mpsc;
use uuid::Uuid;

use crate::db::Collection;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Updated,
    Deleted,
    /// The whole collection was replaced (load, restore, reset)
    Reloaded,
    /// Another process modified the stored collection
    RemoteChange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeEvent {
    pub collection: Collection,
    pub kind: ChangeKind,
    /// Record concerned, `None` for collection-wide events
    pub id: Option<Uuid>,
}

impl ChangeEvent {
    pub fn new(collection: Collection, kind: ChangeKind, id: Uuid) -> Self {
        Self {
            collection,
            kind,
            id: Some(id),
        }
    }

    pub fn collection_wide(collection: Collection, kind: ChangeKind) -> Self {
        Self {
            collection,
            kind,
            id: None,
        }
    }
}

/// Fan-out of change events to any number of subscribers
#[derive(Default)]
pub struct ChangeNotifier {
    subscribers: Vec<mpsc::Sender<ChangeEvent>>,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new observer
    pub fn subscribe(&mut self) -> mpsc::Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.push(tx);
        rx
    }

    /// Sends the event to every live subscriber, dropping disconnected ones
    pub fn publish(&mut self, event: ChangeEvent) {
        log::debug!(
            "event=change module=notify collection={} kind={:?} id={:?}",
            event.collection,
            event.kind,
            event.id
        );
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let mut notifier = ChangeNotifier::new();
        let first = notifier.subscribe();
        let second = notifier.subscribe();

        let id = Uuid::new_v4();
        notifier.publish(ChangeEvent::new(Collection::Contacts, ChangeKind::Added, id));

        assert_eq!(first.try_recv().unwrap().id, Some(id));
        assert_eq!(second.try_recv().unwrap().kind, ChangeKind::Added);
    }

    #[test]
    fn test_disconnected_subscribers_are_dropped() {
        let mut notifier = ChangeNotifier::new();
        let kept = notifier.subscribe();
        drop(notifier.subscribe());
        assert_eq!(notifier.subscriber_count(), 2);

        notifier.publish(ChangeEvent::collection_wide(
            Collection::Projects,
            ChangeKind::Reloaded,
        ));
        assert_eq!(notifier.subscriber_count(), 1);
        assert!(kept.try_recv().is_ok());
    }
}
