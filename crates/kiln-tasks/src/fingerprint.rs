//! Content fingerprints of task inputs

use std::collections::BTreeMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{debug, trace};
use walkdir::WalkDir;

use kiln_core::InputConfig;

use crate::store::StoreError;
use crate::task::{Task, TaskId};

/// Lowercase hex SHA-256 over everything that determines a task's result
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for display
    pub fn short(&self) -> &str {
        self.0.get(..12).unwrap_or(&self.0)
    }

    /// 64 lowercase hex digits, as produced by [`InputFingerprinter`]
    pub fn is_well_formed(&self) -> bool {
        self.0.len() == 64 && self.0.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Why a task must run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum ChangeReason {
    /// The task opts out of caching
    AlwaysRun,
    /// No fingerprint was recorded for the task
    NoPrevious,
    /// The recorded fingerprint could not be read
    LookupFailed(String),
    /// The recorded fingerprint differs from the current one
    InputsChanged,
    /// A declared input path does not exist
    MissingInput(PathBuf),
    /// Inputs could not be fingerprinted for another reason
    InputError(String),
    /// A dependency executed during this run
    DependencyRebuilt(TaskId),
}

impl fmt::Display for ChangeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlwaysRun => write!(f, "always runs"),
            Self::NoPrevious => write!(f, "no previous run recorded"),
            Self::LookupFailed(message) => write!(f, "fingerprint lookup failed: {}", message),
            Self::InputsChanged => write!(f, "inputs changed"),
            Self::MissingInput(path) => write!(f, "missing input {}", path.display()),
            Self::InputError(message) => write!(f, "inputs unreadable: {}", message),
            Self::DependencyRebuilt(dep) => write!(f, "dependency {} was rebuilt", dep),
        }
    }
}

/// Outcome of comparing current inputs against the recorded fingerprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    /// Up to date; the action need not run
    Fresh(Fingerprint),
    /// The action must run. `current` is absent when inputs could not be hashed.
    Stale {
        current: Option<Fingerprint>,
        reason: ChangeReason,
    },
}

impl Freshness {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Freshness::Fresh(_))
    }

    /// The fingerprint computed for this run, if any
    pub fn current(&self) -> Option<&Fingerprint> {
        match self {
            Freshness::Fresh(fp) => Some(fp),
            Freshness::Stale { current, .. } => current.as_ref(),
        }
    }
}

/// Errors raised while hashing inputs
#[derive(Debug, thiserror::Error)]
pub enum FingerprintError {
    #[error("task '{task}' declares input '{}' which does not exist", path.display())]
    MissingInput { task: TaskId, path: PathBuf },

    #[error("failed to read '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid glob pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },
}

/// Computes task fingerprints relative to a project root
#[derive(Debug, Clone)]
pub struct InputFingerprinter {
    root: PathBuf,
}

impl InputFingerprinter {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Fingerprint a task's identity, action and inputs.
    ///
    /// `upstream` holds the fingerprints of direct dependencies computed in
    /// the same run, in dependency order; pass an empty slice to leave them
    /// out.
    pub fn fingerprint(
        &self,
        task: &Task,
        upstream: &[Fingerprint],
    ) -> Result<Fingerprint, FingerprintError> {
        let mut hasher = Sha256::new();
        field(&mut hasher, b"task");
        field(&mut hasher, task.name().as_bytes());
        field(&mut hasher, b"action");
        field(&mut hasher, task.action.describe().as_bytes());

        for input in &task.inputs {
            match input {
                InputConfig::File(path) => {
                    let full = self.existing(task, path)?;
                    field(&mut hasher, b"file");
                    field(&mut hasher, portable(path).as_bytes());
                    field(&mut hasher, hash_file(&full)?.as_bytes());
                }
                InputConfig::Dir(path) => {
                    let full = self.existing(task, path)?;
                    field(&mut hasher, b"dir");
                    field(&mut hasher, portable(path).as_bytes());
                    for (relative, digest) in hash_dir(&full)? {
                        field(&mut hasher, relative.as_bytes());
                        field(&mut hasher, digest.as_bytes());
                    }
                }
                InputConfig::Glob(pattern) => {
                    field(&mut hasher, b"glob");
                    field(&mut hasher, pattern.as_bytes());
                    for (relative, digest) in self.hash_glob(pattern)? {
                        field(&mut hasher, relative.as_bytes());
                        field(&mut hasher, digest.as_bytes());
                    }
                }
                InputConfig::Value { key, value } => {
                    field(&mut hasher, b"value");
                    field(&mut hasher, key.as_bytes());
                    field(&mut hasher, value.as_bytes());
                }
            }
        }

        for dep in upstream {
            field(&mut hasher, b"upstream");
            field(&mut hasher, dep.as_str().as_bytes());
        }

        let fingerprint = Fingerprint(format!("{:x}", hasher.finalize()));
        trace!(task = %task.id, fingerprint = %fingerprint.short(), "computed fingerprint");
        Ok(fingerprint)
    }

    /// Decide whether a task is up to date.
    ///
    /// `previous` is the store lookup result for the task.
    pub fn check(
        &self,
        task: &Task,
        previous: &Result<Option<Fingerprint>, StoreError>,
        upstream: &[Fingerprint],
    ) -> Freshness {
        let current = match self.fingerprint(task, upstream) {
            Ok(fp) => fp,
            Err(FingerprintError::MissingInput { path, .. }) => {
                return Freshness::Stale {
                    current: None,
                    reason: ChangeReason::MissingInput(path),
                };
            }
            Err(e) => {
                return Freshness::Stale {
                    current: None,
                    reason: ChangeReason::InputError(e.to_string()),
                };
            }
        };

        let reason = if task.always_run {
            ChangeReason::AlwaysRun
        } else {
            match previous {
                Err(e) => ChangeReason::LookupFailed(e.to_string()),
                Ok(None) => ChangeReason::NoPrevious,
                Ok(Some(prev)) if *prev != current => ChangeReason::InputsChanged,
                Ok(Some(_)) => {
                    debug!(task = %task.id, "fingerprint unchanged");
                    return Freshness::Fresh(current);
                }
            }
        };

        debug!(task = %task.id, %reason, "task is stale");
        Freshness::Stale {
            current: Some(current),
            reason,
        }
    }

    /// Whether the task would run given the previous fingerprint
    pub fn has_changed(&self, task: &Task, previous: Option<&Fingerprint>) -> bool {
        !self
            .check(task, &Ok(previous.cloned()), &[])
            .is_fresh()
    }

    fn existing(&self, task: &Task, path: &Path) -> Result<PathBuf, FingerprintError> {
        let full = self.root.join(path);
        if full.exists() {
            Ok(full)
        } else {
            Err(FingerprintError::MissingInput {
                task: task.id.clone(),
                path: path.to_path_buf(),
            })
        }
    }

    fn hash_glob(&self, pattern: &str) -> Result<BTreeMap<String, String>, FingerprintError> {
        let full_pattern = self.root.join(pattern).to_string_lossy().to_string();
        let paths = glob::glob(&full_pattern).map_err(|e| FingerprintError::Pattern {
            pattern: pattern.to_string(),
            message: e.to_string(),
        })?;

        let mut hashes = BTreeMap::new();
        for entry in paths {
            let path = entry.map_err(|e| FingerprintError::Io {
                path: e.path().to_path_buf(),
                source: e.into_error(),
            })?;
            if !path.is_file() {
                continue;
            }
            let relative = path.strip_prefix(&self.root).unwrap_or(&path);
            hashes.insert(portable(relative), hash_file(&path)?);
        }
        Ok(hashes)
    }
}

/// Length-prefixed so adjacent fields can never run together
fn field(hasher: &mut Sha256, bytes: &[u8]) {
    hasher.update((bytes.len() as u64).to_le_bytes());
    hasher.update(bytes);
}

fn portable(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn hash_file(path: &Path) -> Result<String, FingerprintError> {
    let contents = fs::read(path).map_err(|source| FingerprintError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(format!("{:x}", Sha256::digest(&contents)))
}

fn hash_dir(dir: &Path) -> Result<BTreeMap<String, String>, FingerprintError> {
    let mut hashes = BTreeMap::new();
    for entry in WalkDir::new(dir).follow_links(true) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(dir).to_path_buf();
            FingerprintError::Io {
                path,
                source: e
                    .into_io_error()
                    .unwrap_or_else(|| std::io::Error::other("filesystem loop")),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(dir).unwrap_or(entry.path());
        hashes.insert(portable(relative), hash_file(entry.path())?);
    }
    Ok(hashes)
}
