use anyhow::{Context, Result};
use fs2::FileExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::{self, File, OpenOptions};
use std::io::{BufReader, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use crate::error::CrmError;

const LOCK_TIMEOUT: Duration = Duration::from_secs(5);
const LOCK_RETRY: Duration = Duration::from_millis(100);

/// Handles saving and loading one JSON document with file locking
/// for rudimentary multi-process support
pub struct Storage {
    file_path: PathBuf,
    lock_file_path: PathBuf,
    lock_timeout: Duration,
}

impl Storage {
    /// Creates a new Storage instance
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        let file_path = file_path.as_ref().to_path_buf();
        let lock_file_path = file_path.with_extension("json.lock");
        Self {
            file_path,
            lock_file_path,
            lock_timeout: LOCK_TIMEOUT,
        }
    }

    /// How long lock acquisition retries before failing with `CrmError::Locked`
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Returns the path to the storage file
    pub fn path(&self) -> &Path {
        &self.file_path
    }

    pub fn exists(&self) -> bool {
        self.file_path.exists()
    }

    /// Acquire an exclusive lock on the file for writing
    /// Returns the lock file handle which must be held during the operation
    fn acquire_write_lock(&self) -> Result<File> {
        if let Some(parent) = self.lock_file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let lock_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.lock_file_path)
            .with_context(|| format!("Failed to create lock file: {:?}", self.lock_file_path))?;

        self.wait_for(|| FileExt::try_lock_exclusive(&lock_file))?;
        Ok(lock_file)
    }

    /// Acquire a shared lock on the file for reading
    fn acquire_read_lock(&self) -> Result<Option<File>> {
        if !self.lock_file_path.exists() {
            return Ok(None);
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .open(&self.lock_file_path)
            .with_context(|| format!("Failed to open lock file: {:?}", self.lock_file_path))?;

        self.wait_for(|| FileExt::try_lock_shared(&lock_file))?;
        Ok(Some(lock_file))
    }

    fn wait_for<F>(&self, mut try_lock: F) -> Result<()>
    where
        F: FnMut() -> std::io::Result<()>,
    {
        let start = std::time::Instant::now();
        loop {
            match try_lock() {
                Ok(()) => return Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    if start.elapsed() > self.lock_timeout {
                        log::warn!(
                            "event=lock_timeout module=storage path={}",
                            self.file_path.display()
                        );
                        return Err(CrmError::Locked(self.file_path.display().to_string()).into());
                    }
                    std::thread::sleep(LOCK_RETRY);
                }
                Err(e) => {
                    return Err(e).with_context(|| {
                        format!("Failed to acquire lock on {:?}", self.lock_file_path)
                    })
                }
            }
        }
    }

    /// Loads the document, returning `T::default()` when the file does not exist yet
    pub fn load<T>(&self) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        Ok(self.load_optional()?.unwrap_or_default())
    }

    /// Loads the document, or `None` when the file does not exist yet
    pub fn load_optional<T>(&self) -> Result<Option<T>>
    where
        T: DeserializeOwned,
    {
        if !self.file_path.exists() {
            return Ok(None);
        }

        let _lock = self.acquire_read_lock()?;

        let file = File::open(&self.file_path)
            .with_context(|| format!("Failed to open file: {:?}", self.file_path))?;
        let reader = BufReader::new(file);

        let value = serde_json::from_reader(reader)
            .with_context(|| format!("Failed to parse JSON from {:?}", self.file_path))?;
        Ok(Some(value))
    }

    /// Reads the raw file contents, or `None` when the file does not exist yet
    pub fn read_raw(&self) -> Result<Option<String>> {
        if !self.file_path.exists() {
            return Ok(None);
        }
        let _lock = self.acquire_read_lock()?;
        let text = fs::read_to_string(&self.file_path)
            .with_context(|| format!("Failed to read file: {:?}", self.file_path))?;
        Ok(Some(text))
    }

    /// Saves the document as pretty JSON
    pub fn save<T>(&self, value: &T) -> Result<()>
    where
        T: Serialize + ?Sized,
    {
        let json = serde_json::to_string_pretty(value)?;
        self.write_raw(&json)
    }

    /// Replaces the file contents atomically under the write lock
    pub fn write_raw(&self, contents: &str) -> Result<()> {
        if let Some(parent) = self.file_path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut lock_file = self.acquire_write_lock()?;

        // Write lock holder info (optional, for debugging)
        let _ = writeln!(
            lock_file,
            "Locked by PID {} at {}",
            std::process::id(),
            chrono::Utc::now().to_rfc3339()
        );

        // Write next to the target then rename so readers never see a torn file
        let tmp_path = self.file_path.with_extension("json.tmp");
        fs::write(&tmp_path, contents)
            .with_context(|| format!("Failed to write {:?}", tmp_path))?;
        fs::rename(&tmp_path, &self.file_path)
            .with_context(|| format!("Failed to replace {:?}", self.file_path))?;

        Ok(())
    }

    /// Removes the file and its lock file if present
    pub fn remove(&self) -> Result<()> {
        if self.file_path.exists() {
            let _lock = self.acquire_write_lock()?;
            fs::remove_file(&self.file_path)
                .with_context(|| format!("Failed to remove {:?}", self.file_path))?;
        }
        if self.lock_file_path.exists() {
            let _ = fs::remove_file(&self.lock_file_path);
        }
        Ok(())
    }

    /// File modification time, `None` when the file does not exist
    pub fn modified_at(&self) -> Option<SystemTime> {
        fs::metadata(&self.file_path).and_then(|m| m.modified()).ok()
    }
}
