//! Timestamped backups of the CRM collections
//!
//! A backup is a directory `backup_<timestamp>/` holding one pretty JSON
//! file per collection and a `manifest.json`. Only the newest
//! `max_backups` directories are kept.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::crm::Crm;
use crate::error::CrmError;
use crate::models::{Contact, Invoice, Project};

const BACKUP_PREFIX: &str = "backup_";
const MANIFEST_FILE: &str = "manifest.json";
const CONTACTS_FILE: &str = "contacts.json";
const PROJECTS_FILE: &str = "projects.json";
const INVOICES_FILE: &str = "invoices.json";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordCounts {
    pub contacts: usize,
    pub projects: usize,
    pub invoices: usize,
}

/// Describes the contents of one backup directory
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupManifest {
    pub created_at: DateTime<Utc>,
    pub app_version: String,
    pub counts: RecordCounts,
}

#[derive(Debug, Clone)]
pub struct BackupInfo {
    pub name: String,
    pub path: PathBuf,
    pub manifest: BackupManifest,
}

pub struct BackupService {
    dir: PathBuf,
    max_backups: usize,
}

impl BackupService {
    pub fn new<P: AsRef<Path>>(dir: P, max_backups: usize) -> Result<Self> {
        if max_backups == 0 {
            return Err(
                CrmError::InvalidConfig("max_backups must be greater than 0".into()).into(),
            );
        }
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            max_backups,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn max_backups(&self) -> usize {
        self.max_backups
    }

    /// Writes a new backup of contacts, projects and invoices, then prunes
    /// the oldest ones
    pub fn create_backup(&self, crm: &Crm) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create backup directory {}", self.dir.display()))?;

        let created_at = Utc::now();
        let path = self.unique_path(&created_at);
        fs::create_dir(&path)
            .with_context(|| format!("Failed to create backup {}", path.display()))?;

        if let Err(e) = write_contents(&path, crm, created_at) {
            log::error!(
                "event=backup_failed module=backup path={} error={:#}",
                path.display(),
                e
            );
            let _ = fs::remove_dir_all(&path);
            return Err(e);
        }

        log::info!("event=backup_created module=backup path={}", path.display());
        self.prune()?;
        Ok(path)
    }

    /// Every readable backup, newest first
    pub fn list_backups(&self) -> Result<Vec<BackupInfo>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut backups = Vec::new();
        let entries = fs::read_dir(&self.dir)
            .with_context(|| format!("Failed to list backups in {}", self.dir.display()))?;
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            if !name.starts_with(BACKUP_PREFIX) || !entry.path().is_dir() {
                continue;
            }
            match read_json::<BackupManifest>(&entry.path().join(MANIFEST_FILE)) {
                Ok(manifest) => backups.push(BackupInfo {
                    name,
                    path: entry.path(),
                    manifest,
                }),
                Err(e) => log::warn!(
                    "event=backup_skipped module=backup name={} error={:#}",
                    name,
                    e
                ),
            }
        }

        // Names embed the timestamp, so they sort chronologically
        backups.sort_by(|a, b| b.name.cmp(&a.name));
        Ok(backups)
    }

    /// Replaces contacts, projects and invoices with the named backup
    pub fn restore_backup(&self, name: &str, crm: &mut Crm) -> Result<BackupManifest> {
        let path = self.dir.join(name);
        let manifest: BackupManifest = read_json(&path.join(MANIFEST_FILE))
            .with_context(|| format!("Not a valid backup: {}", name))?;
        check_version(&manifest)?;
        let contacts: Vec<Contact> = read_json(&path.join(CONTACTS_FILE))?;
        let projects: Vec<Project> = read_json(&path.join(PROJECTS_FILE))?;
        let invoices: Vec<Invoice> = read_json(&path.join(INVOICES_FILE))?;

        crm.restore(contacts, projects, invoices)?;
        log::info!("event=backup_restored module=backup name={}", name);
        Ok(manifest)
    }

    pub fn delete_backup(&self, name: &str) -> Result<()> {
        let path = self.dir.join(name);
        fs::remove_dir_all(&path)
            .with_context(|| format!("Failed to delete backup {}", path.display()))
    }

    fn unique_path(&self, created_at: &DateTime<Utc>) -> PathBuf {
        let stem = format!(
            "{}{}",
            BACKUP_PREFIX,
            created_at.format("%Y-%m-%d_%H-%M-%S-%3f")
        );
        let mut path = self.dir.join(&stem);
        let mut suffix = 1;
        while path.exists() {
            path = self.dir.join(format!("{}-{}", stem, suffix));
            suffix += 1;
        }
        path
    }

    fn prune(&self) -> Result<()> {
        let backups = self.list_backups()?;
        for old in backups.iter().skip(self.max_backups) {
            self.delete_backup(&old.name)?;
            log::info!("event=backup_pruned module=backup name={}", old.name);
        }
        Ok(())
    }
}

fn write_contents(path: &Path, crm: &Crm, created_at: DateTime<Utc>) -> Result<()> {
    let contacts = crm.contacts().backup_data();
    let projects = crm.projects().backup_data();
    let invoices = crm.invoices().backup_data();

    write_json(&path.join(CONTACTS_FILE), &contacts)?;
    write_json(&path.join(PROJECTS_FILE), &projects)?;
    write_json(&path.join(INVOICES_FILE), &invoices)?;

    let manifest = BackupManifest {
        created_at,
        app_version: env!("CARGO_PKG_VERSION").to_string(),
        counts: RecordCounts {
            contacts: contacts.len(),
            projects: projects.len(),
            invoices: invoices.len(),
        },
    };
    write_json(&path.join(MANIFEST_FILE), &manifest)
}

fn check_version(manifest: &BackupManifest) -> Result<()> {
    let expected = env!("CARGO_PKG_VERSION");
    if manifest.app_version != expected {
        log::error!(
            "event=backup_incompatible module=backup found={} expected={}",
            manifest.app_version,
            expected
        );
        return Err(CrmError::IncompatibleBackup {
            found: manifest.app_version.clone(),
            expected: expected.to_string(),
        }
        .into());
    }
    Ok(())
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let body = serde_json::to_string_pretty(value)?;
    fs::write(path, body).with_context(|| format!("Failed to write {}", path.display()))
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let body =
        fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&body).with_context(|| format!("Failed to parse {}", path.display()))
}
