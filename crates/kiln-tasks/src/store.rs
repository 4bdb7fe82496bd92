//! Persistent fingerprint store

use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use crate::fingerprint::Fingerprint;
use crate::task::TaskId;

/// Where fingerprints of successful runs are kept between invocations
pub trait FingerprintStore: Send + Sync {
    /// Fingerprint recorded for the task's last successful run
    fn get(&self, task: &TaskId) -> Result<Option<Fingerprint>, StoreError>;

    /// Record the fingerprint of a successful run
    fn put(&self, task: &TaskId, fingerprint: &Fingerprint) -> Result<(), StoreError>;

    /// Forget the task; the next run will execute it
    fn remove(&self, task: &TaskId) -> Result<(), StoreError>;
}

/// One persisted record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredFingerprint {
    pub task: TaskId,
    pub fingerprint: Fingerprint,
    /// RFC 3339 timestamp
    pub recorded_at: String,
}

/// Store errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// IO error
    #[error("Fingerprint store IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("Fingerprint store serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// A record exists but is unusable
    #[error("Corrupt fingerprint record: {0}")]
    Corrupt(String),
}

/// Directory of JSON records, one file per task
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Store under `<root>/.kiln/fingerprints`
    pub fn default_dir(root: &Path) -> Self {
        Self::new(root.join(".kiln").join("fingerprints"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File names are hashed so any task name maps to a safe path
    fn record_path(&self, task: &TaskId) -> PathBuf {
        let digest = Sha256::digest(task.as_str().as_bytes());
        self.dir.join(format!("{:x}.json", digest))
    }

    fn read_record(path: &Path) -> Result<StoredFingerprint, StoreError> {
        let contents = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    /// All readable records, sorted by task name
    pub fn entries(&self) -> Result<Vec<StoredFingerprint>, StoreError> {
        let mut entries = Vec::new();
        for path in self.record_files()? {
            if let Ok(record) = Self::read_record(&path) {
                entries.push(record);
            }
        }
        entries.sort_by(|a, b| a.task.cmp(&b.task));
        Ok(entries)
    }

    fn record_files(&self) -> Result<Vec<PathBuf>, StoreError> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|e| e == "json") {
                files.push(path);
            }
        }
        Ok(files)
    }

    /// Remove records older than `max_age`; unreadable records are removed too
    pub fn prune(&self, max_age: Duration) -> Result<PruneStats, StoreError> {
        info!(max_age_secs = max_age.as_secs(), "pruning fingerprint store");
        let mut stats = PruneStats::default();
        // None when the age reaches past the representable range: nothing expires
        let cutoff = chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| chrono::Utc::now().checked_sub_signed(age));

        for path in self.record_files()? {
            stats.total += 1;
            let expired = match Self::read_record(&path) {
                Ok(record) => match cutoff {
                    Some(cutoff) => chrono::DateTime::parse_from_rfc3339(&record.recorded_at)
                        .map(|recorded| recorded < cutoff)
                        .unwrap_or(true),
                    None => false,
                },
                Err(_) => true,
            };
            if expired && fs::remove_file(&path).is_ok() {
                stats.removed += 1;
            } else {
                stats.kept += 1;
            }
        }

        info!(total = stats.total, removed = stats.removed, kept = stats.kept, "prune complete");
        Ok(stats)
    }

    /// Get store statistics
    pub fn status(&self) -> Result<StoreStats, StoreError> {
        let mut stats = StoreStats::default();
        for path in self.record_files()? {
            stats.entries += 1;
            if let Ok(meta) = fs::metadata(&path) {
                stats.total_size += meta.len();
            }
        }
        Ok(stats)
    }

    /// Delete every record; returns how many were removed
    pub fn clear(&self) -> Result<usize, StoreError> {
        let files = self.record_files()?;
        for path in &files {
            fs::remove_file(path)?;
        }
        info!(removed = files.len(), dir = %self.dir.display(), "cleared fingerprint store");
        Ok(files.len())
    }
}

impl FingerprintStore for FileStore {
    fn get(&self, task: &TaskId) -> Result<Option<Fingerprint>, StoreError> {
        let path = self.record_path(task);
        if !path.exists() {
            debug!(task = %task, "no recorded fingerprint");
            return Ok(None);
        }
        let record = Self::read_record(&path)?;
        if record.task != *task {
            return Err(StoreError::Corrupt(format!(
                "{} holds a record for '{}', expected '{}'",
                path.display(),
                record.task,
                task
            )));
        }
        if !record.fingerprint.is_well_formed() {
            return Err(StoreError::Corrupt(format!(
                "{} holds a malformed fingerprint",
                path.display()
            )));
        }
        debug!(task = %task, fingerprint = %record.fingerprint.short(), "recorded fingerprint found");
        Ok(Some(record.fingerprint))
    }

    fn put(&self, task: &TaskId, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        fs::create_dir_all(&self.dir)?;
        let record = StoredFingerprint {
            task: task.clone(),
            fingerprint: fingerprint.clone(),
            recorded_at: chrono::Utc::now().to_rfc3339(),
        };
        let json = serde_json::to_string_pretty(&record)?;

        // Write beside the target and rename so readers never see a partial record.
        let mut file = NamedTempFile::new_in(&self.dir)?;
        file.write_all(json.as_bytes())?;
        file.flush()?;
        file.persist(self.record_path(task))
            .map_err(|e| StoreError::Io(e.error))?;

        debug!(task = %task, fingerprint = %fingerprint.short(), "recorded fingerprint");
        Ok(())
    }

    fn remove(&self, task: &TaskId) -> Result<(), StoreError> {
        match fs::remove_file(self.record_path(task)) {
            Ok(()) => {
                debug!(task = %task, "removed recorded fingerprint");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local store, used for `--no-cache` runs and tests
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<TaskId, Fingerprint>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<TaskId, Fingerprint>>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Corrupt("memory store lock poisoned".to_string()))
    }
}

impl FingerprintStore for MemoryStore {
    fn get(&self, task: &TaskId) -> Result<Option<Fingerprint>, StoreError> {
        Ok(self.lock()?.get(task).cloned())
    }

    fn put(&self, task: &TaskId, fingerprint: &Fingerprint) -> Result<(), StoreError> {
        self.lock()?.insert(task.clone(), fingerprint.clone());
        Ok(())
    }

    fn remove(&self, task: &TaskId) -> Result<(), StoreError> {
        self.lock()?.remove(task);
        Ok(())
    }
}

/// Statistics from a prune operation
#[derive(Debug, Default)]
pub struct PruneStats {
    /// Total records found
    pub total: usize,
    /// Records removed
    pub removed: usize,
    /// Records kept
    pub kept: usize,
}

/// Store statistics
#[derive(Debug, Default)]
pub struct StoreStats {
    /// Number of records
    pub entries: usize,
    /// Total size in bytes
    pub total_size: u64,
}

impl StoreStats {
    /// Format total size in human-readable form
    pub fn formatted_size(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = KB * 1024;
        match self.total_size {
            size if size < KB => format!("{} B", size),
            size if size < MB => format!("{:.1} KB", size as f64 / KB as f64),
            size => format!("{:.1} MB", size as f64 / MB as f64),
        }
    }
}
