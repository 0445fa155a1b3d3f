//! User configuration
//!
//! The configuration is a YAML file, `~/.indycrm/config.yaml` unless the
//! `INDY_CONFIG` environment variable points elsewhere. It is created with
//! defaults on first use.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::db::BackendType;
use crate::error::CrmError;
use crate::managers::DEFAULT_INVOICE_PREFIX;

pub const CONFIG_ENV: &str = "INDY_CONFIG";
pub const DATA_ENV: &str = "INDY_DATA";
const SQLITE_FILE_NAME: &str = "IndyCRM.db";
const LOG_LEVELS: [&str; 6] = ["off", "error", "warn", "info", "debug", "trace"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CrmConfig {
    /// Directory holding the data store, backups and exports
    pub data_path: PathBuf,
    pub backend: BackendType,
    /// Number of backups kept before the oldest are removed
    pub max_backups: usize,
    pub invoice_prefix: String,
    pub log_level: String,
    /// Author recorded in the activity log
    pub user_id: Uuid,
}

impl Default for CrmConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            backend: BackendType::Json,
            max_backups: 5,
            invoice_prefix: DEFAULT_INVOICE_PREFIX.to_string(),
            log_level: "warn".to_string(),
            user_id: Uuid::new_v4(),
        }
    }
}

impl CrmConfig {
    /// Loads the configuration from the provided path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: CrmConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path.as_ref()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads the configuration, writing the defaults first when the file is missing
    pub fn load_or_create<P: AsRef<Path>>(path: P) -> Result<Self> {
        if !path.as_ref().exists() {
            let config = CrmConfig::default();
            config.save(&path)?;
            log::info!("event=config_created module=config path={:?}", path.as_ref());
            return Ok(config);
        }
        Self::load(path)
    }

    /// Save the configuration to the specified path
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        self.validate()?;
        let content = serde_yaml::to_string(&self)?;

        // Ensure parent directories exist
        if let Some(parent) = path.as_ref().parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {:?}", path.as_ref()))?;

        Ok(())
    }

    pub fn validate(&self) -> Result<(), CrmError> {
        if self.max_backups == 0 {
            return Err(CrmError::InvalidConfig(
                "max_backups must be greater than 0".into(),
            ));
        }
        if self.invoice_prefix.trim().is_empty() {
            return Err(CrmError::InvalidConfig("invoice_prefix cannot be empty".into()));
        }
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(CrmError::InvalidConfig(format!(
                "unknown log_level '{}'",
                self.log_level
            )));
        }
        Ok(())
    }

    /// Sets one field from its textual value, as given on the command line
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut updated = self.clone();
        match key {
            "data_path" => updated.data_path = PathBuf::from(value),
            "backend" => {
                updated.backend = BackendType::parse(value).ok_or_else(|| {
                    CrmError::InvalidConfig(format!("unknown backend '{}'", value))
                })?
            }
            "max_backups" => {
                updated.max_backups = value.parse().map_err(|_| {
                    CrmError::InvalidConfig(format!("max_backups must be a number, got '{}'", value))
                })?
            }
            "invoice_prefix" => updated.invoice_prefix = value.to_string(),
            "log_level" => updated.log_level = value.to_lowercase(),
            other => {
                return Err(CrmError::InvalidConfig(format!("unknown setting '{}'", other)).into())
            }
        }
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Location handed to the backend: the directory itself for JSON,
    /// a database file inside it for SQLite
    pub fn store_location(&self, data_path: &Path) -> PathBuf {
        match self.backend {
            BackendType::Sqlite => data_path.join(SQLITE_FILE_NAME),
            _ => data_path.to_path_buf(),
        }
    }

    pub fn backups_dir(&self, data_path: &Path) -> PathBuf {
        data_path.join("Backups")
    }

    pub fn exports_dir(&self, data_path: &Path) -> PathBuf {
        data_path.join("Exports")
    }
}

/// Default data directory, `<platform data dir>/indycrm`
pub fn default_data_path() -> PathBuf {
    dirs::data_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join("indycrm")
}

/// Gets the path to the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    let home_dir = dirs::home_dir().context("Failed to determine home directory")?;
    Ok(home_dir.join(".indycrm"))
}

/// Gets the path to the configuration file
pub fn get_config_path() -> Result<PathBuf> {
    // Check if INDY_CONFIG environment variable is set
    if let Ok(path) = std::env::var(CONFIG_ENV) {
        return Ok(PathBuf::from(path));
    }

    Ok(get_config_dir()?.join("config.yaml"))
}

/// Determines the data directory: command line, then `INDY_DATA`, then the configuration
pub fn determine_data_path(cli_override: Option<&Path>, config: &CrmConfig) -> PathBuf {
    if let Some(path) = cli_override {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var(DATA_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }
    config.data_path.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_or_create_writes_defaults_once() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested/config.yaml");

        let created = CrmConfig::load_or_create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(created.max_backups, 5);
        assert_eq!(created.invoice_prefix, "INDY-");

        // The generated user id is kept across loads
        let loaded = CrmConfig::load_or_create(&path).unwrap();
        assert_eq!(loaded.user_id, created.user_id);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "backend: sqlite\nmax_backups: 2\n").unwrap();

        let config = CrmConfig::load(&path).unwrap();
        assert_eq!(config.backend, BackendType::Sqlite);
        assert_eq!(config.max_backups, 2);
        assert_eq!(config.log_level, "warn");
        assert_eq!(
            config.store_location(Path::new("/data")),
            PathBuf::from("/data/IndyCRM.db")
        );
    }

    #[test]
    fn test_zero_backups_is_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "max_backups: 0\n").unwrap();

        let err = CrmConfig::load(&path).unwrap_err();
        assert!(matches!(err.downcast_ref::<CrmError>(), Some(CrmError::InvalidConfig(_))));
    }

    #[test]
    fn test_set() {
        let mut config = CrmConfig::default();
        config.set("backend", "sqlite").unwrap();
        config.set("max_backups", "9").unwrap();
        assert_eq!(config.backend, BackendType::Sqlite);
        assert_eq!(config.max_backups, 9);

        assert!(config.set("max_backups", "0").is_err());
        assert_eq!(config.max_backups, 9);
        assert!(config.set("colour", "blue").is_err());
    }

    #[test]
    fn test_cli_override_wins() {
        let config = CrmConfig::default();
        let path = determine_data_path(Some(Path::new("/tmp/crm")), &config);
        assert_eq!(path, PathBuf::from("/tmp/crm"));
    }
}
