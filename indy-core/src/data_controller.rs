//! The persistence context shared by every manager
//!
//! A [`DataController`] wraps one backend and hands out typed loads and saves
//! of whole collections. It remembers the revision of every collection it
//! read or wrote, so a later [`DataController::process_remote_changes`] can
//! tell which collections another process modified in the meantime.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{mpsc, Mutex, MutexGuard};

use crate::db::{
    self, BackendType, Collection, DatabaseBackend, DatabaseConfig, DatabaseStats, MemoryBackend,
};
use crate::notify::{ChangeEvent, ChangeKind, ChangeNotifier};

pub struct DataController {
    backend: Box<dyn DatabaseBackend>,
    seen_revisions: Mutex<HashMap<Collection, Option<String>>>,
    notifier: Mutex<ChangeNotifier>,
}

/// Recovers the guard of a poisoned lock; the guarded maps stay consistent
/// because every update is a single insert or push
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl DataController {
    /// Opens the store at `path`, inferring the backend when not given
    pub fn open(path: &Path, backend_type: Option<BackendType>) -> Result<Self> {
        let config = DatabaseConfig {
            path: path.to_path_buf(),
            backend_type: backend_type.unwrap_or_else(|| db::infer_backend_type(path)),
            ..DatabaseConfig::default()
        };
        let backend = db::open_with_config(&config)
            .with_context(|| format!("Failed to open data store at {}", path.display()))?;
        log::info!(
            "event=store_open module=data_controller backend={} path={}",
            backend.backend_type(),
            path.display()
        );
        Ok(Self::from_backend(backend))
    }

    /// A store that lives only as long as the controller
    pub fn in_memory() -> Self {
        Self::from_backend(Box::new(MemoryBackend::new()))
    }

    pub fn from_backend(backend: Box<dyn DatabaseBackend>) -> Self {
        Self {
            backend,
            seen_revisions: Mutex::new(HashMap::new()),
            notifier: Mutex::new(ChangeNotifier::new()),
        }
    }

    pub fn backend(&self) -> &dyn DatabaseBackend {
        self.backend.as_ref()
    }

    pub fn backend_type(&self) -> BackendType {
        self.backend.backend_type()
    }

    pub fn location(&self) -> &Path {
        self.backend.location()
    }

    pub fn stats(&self) -> Result<DatabaseStats> {
        self.backend.stats()
    }

    /// Loads every record of a collection; a missing collection is empty
    pub fn load<T: DeserializeOwned>(&self, collection: Collection) -> Result<Vec<T>> {
        self.load_document(collection)
    }

    /// Loads a collection stored as a single document
    pub fn load_document<T>(&self, collection: Collection) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        let body = self.backend.read(collection)?;
        self.remember_revision(collection)?;

        let Some(body) = body else {
            log::debug!("event=load_empty module=data_controller collection={}", collection);
            return Ok(T::default());
        };
        let value = serde_json::from_str(&body)
            .with_context(|| format!("Failed to decode stored {}", collection))?;
        log::debug!(
            "event=load module=data_controller collection={} bytes={}",
            collection,
            body.len()
        );
        Ok(value)
    }

    /// Replaces the stored collection with `records`
    pub fn save<T: Serialize>(&self, collection: Collection, records: &[T]) -> Result<()> {
        self.save_document(collection, records)
    }

    pub fn save_document<T>(&self, collection: Collection, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let body = serde_json::to_string_pretty(value)
            .with_context(|| format!("Failed to encode {}", collection))?;
        self.backend
            .write(collection, &body)
            .with_context(|| format!("Failed to save {}", collection))?;
        // Our own write is not a remote change
        self.remember_revision(collection)?;
        log::debug!(
            "event=save module=data_controller collection={} bytes={}",
            collection,
            body.len()
        );
        Ok(())
    }

    pub fn delete_collection(&self, collection: Collection) -> Result<()> {
        self.backend
            .remove(collection)
            .with_context(|| format!("Failed to delete {}", collection))?;
        lock(&self.seen_revisions).insert(collection, None);
        log::info!("event=delete_collection module=data_controller collection={}", collection);
        self.publish(ChangeEvent::collection_wide(collection, ChangeKind::Reloaded));
        Ok(())
    }

    /// Removes every collection of the store
    pub fn delete_all_data(&self) -> Result<()> {
        for collection in Collection::ALL {
            self.delete_collection(collection)?;
        }
        log::warn!(
            "event=delete_all module=data_controller path={}",
            self.location().display()
        );
        Ok(())
    }

    pub fn subscribe(&self) -> mpsc::Receiver<ChangeEvent> {
        lock(&self.notifier).subscribe()
    }

    pub fn publish(&self, event: ChangeEvent) {
        lock(&self.notifier).publish(event);
    }

    /// Returns the collections modified outside this controller since they
    /// were last loaded or saved, publishing a `RemoteChange` for each
    pub fn process_remote_changes(&self) -> Result<Vec<Collection>> {
        let mut changed = Vec::new();
        for collection in Collection::ALL {
            let current = self.backend.revision(collection)?;
            let mut seen = lock(&self.seen_revisions);
            let Some(previous) = seen.get(&collection) else {
                // Never loaded here, nothing to be stale against
                continue;
            };
            if *previous != current {
                seen.insert(collection, current);
                changed.push(collection);
            }
        }

        for collection in &changed {
            log::info!("event=remote_change module=data_controller collection={}", collection);
            self.publish(ChangeEvent::collection_wide(*collection, ChangeKind::RemoteChange));
        }
        Ok(changed)
    }

    fn remember_revision(&self, collection: Collection) -> Result<()> {
        let revision = self.backend.revision(collection)?;
        lock(&self.seen_revisions).insert(collection, revision);
        Ok(())
    }
}
