//! Volatile in-process backend

use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::traits::{BackendType, Collection, DatabaseBackend};

#[derive(Default)]
struct Documents {
    bodies: HashMap<Collection, (String, u64)>,
    // Revisions are never reused, even across remove/write
    last_revision: u64,
}

/// Keeps every collection in memory; nothing survives the process
pub struct MemoryBackend {
    documents: Mutex<Documents>,
    location: PathBuf,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            documents: Mutex::new(Documents::default()),
            location: PathBuf::from(":memory:"),
        }
    }

    fn with_documents<T>(&self, f: impl FnOnce(&mut Documents) -> T) -> Result<T> {
        let mut documents = self
            .documents
            .lock()
            .map_err(|_| anyhow!("memory backend lock poisoned"))?;
        Ok(f(&mut documents))
    }
}

impl DatabaseBackend for MemoryBackend {
    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }

    fn location(&self) -> &Path {
        &self.location
    }

    fn read(&self, collection: Collection) -> Result<Option<String>> {
        self.with_documents(|docs| docs.bodies.get(&collection).map(|(body, _)| body.clone()))
    }

    fn write(&self, collection: Collection, body: &str) -> Result<()> {
        self.with_documents(|docs| {
            docs.last_revision += 1;
            docs.bodies
                .insert(collection, (body.to_string(), docs.last_revision));
        })
    }

    fn remove(&self, collection: Collection) -> Result<()> {
        self.with_documents(|docs| {
            docs.bodies.remove(&collection);
        })
    }

    fn revision(&self, collection: Collection) -> Result<Option<String>> {
        self.with_documents(|docs| {
            docs.bodies
                .get(&collection)
                .map(|(_, rev)| rev.to_string())
        })
    }

    fn exists(&self) -> bool {
        true
    }
}
