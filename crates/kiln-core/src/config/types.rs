//! Configuration types

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Main configuration for kiln
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Project name
    pub name: Option<String>,

    /// Orchestrator settings
    pub settings: Settings,

    /// Task declarations, in declaration order
    pub tasks: Vec<TaskConfig>,
}

impl Config {
    /// Look up a task declaration by name
    pub fn task(&self, name: &str) -> Option<&TaskConfig> {
        self.tasks.iter().find(|t| t.name == name)
    }
}

/// Scheduler and cache settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Maximum concurrently running tasks (default: half the CPUs, minimum 1)
    pub workers: Option<usize>,

    /// What to do after a task fails
    pub mode: FailureMode,

    /// Whether a dependency that re-ran forces its dependents to re-run
    pub rebuild_dependents: bool,

    /// Fingerprint cache configuration
    pub cache: CacheConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            workers: None,
            mode: FailureMode::default(),
            rebuild_dependents: true,
            cache: CacheConfig::default(),
        }
    }
}

impl Settings {
    /// Worker count after applying the default
    pub fn effective_workers(&self) -> usize {
        self.workers.unwrap_or_else(default_workers)
    }
}

/// Half the available parallelism, never less than one
pub fn default_workers() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2);
    (cpus / 2).max(1)
}

/// Continuation policy after a task failure
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureMode {
    /// Stop dispatching new tasks after the first failure
    #[default]
    Halt,
    /// Keep running every task whose dependencies did not fail
    BestEffort,
}

impl FailureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Halt => "halt",
            Self::BestEffort => "best-effort",
        }
    }
}

impl fmt::Display for FailureMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FailureMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "halt" => Ok(Self::Halt),
            "best-effort" | "best_effort" | "besteffort" => Ok(Self::BestEffort),
            other => Err(format!(
                "unknown mode '{}', expected 'halt' or 'best-effort'",
                other
            )),
        }
    }
}

/// Fingerprint cache configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Whether fingerprints are persisted between invocations
    pub enabled: bool,

    /// Store directory, relative to the project root
    pub dir: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dir: PathBuf::from(".kiln/fingerprints"),
        }
    }
}

/// A declared task input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawInput", into = "RawInput")]
pub enum InputConfig {
    /// A single file, hashed by content
    File(PathBuf),
    /// A directory, walked recursively
    Dir(PathBuf),
    /// A glob pattern relative to the project root
    Glob(String),
    /// A configuration value, included verbatim
    Value { key: String, value: String },
}

/// On-disk shape of an input entry: exactly one of the keys is set.
///
/// Kept as a plain table so TOML and YAML read it the same way.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawInput {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    glob: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    value: Option<RawValue>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawValue {
    key: String,
    value: String,
}

impl TryFrom<RawInput> for InputConfig {
    type Error = String;

    fn try_from(raw: RawInput) -> Result<Self, Self::Error> {
        let mut found = Vec::new();
        if let Some(path) = raw.file {
            found.push(Self::File(path));
        }
        if let Some(path) = raw.dir {
            found.push(Self::Dir(path));
        }
        if let Some(pattern) = raw.glob {
            found.push(Self::Glob(pattern));
        }
        if let Some(RawValue { key, value }) = raw.value {
            found.push(Self::Value { key, value });
        }

        match found.len() {
            1 => Ok(found.remove(0)),
            0 => Err("input must set one of: file, dir, glob, value".to_string()),
            _ => Err("input must set exactly one of: file, dir, glob, value".to_string()),
        }
    }
}

impl From<InputConfig> for RawInput {
    fn from(input: InputConfig) -> Self {
        match input {
            InputConfig::File(path) => Self {
                file: Some(path),
                ..Default::default()
            },
            InputConfig::Dir(path) => Self {
                dir: Some(path),
                ..Default::default()
            },
            InputConfig::Glob(pattern) => Self {
                glob: Some(pattern),
                ..Default::default()
            },
            InputConfig::Value { key, value } => Self {
                value: Some(RawValue { key, value }),
                ..Default::default()
            },
        }
    }
}

/// A task declaration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    /// Unique task name (e.g., "compile", "javadoc", "test")
    pub name: String,

    /// One-line description shown by `kiln list`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Listing group (e.g., "build", "documentation", "verification")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    /// Shell command to execute; tasks without one only aggregate dependencies
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// Program to invoke directly, without a shell
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,

    /// Arguments for `program`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,

    /// Tasks that must complete first
    #[serde(default)]
    pub depends_on: Vec<String>,

    /// Inputs that decide whether the task is up to date
    #[serde(default)]
    pub inputs: Vec<InputConfig>,

    /// Paths the task produces
    #[serde(default)]
    pub outputs: Vec<PathBuf>,

    /// Environment variables passed to the command
    #[serde(default)]
    pub env: BTreeMap<String, String>,

    /// Working directory for the command, relative to the project root
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Never skip this task (e.g., tests with external side effects)
    #[serde(default)]
    pub always_run: bool,

    /// Report a failing action as a warning instead of failing the build
    #[serde(default)]
    pub ignore_failures: bool,

    /// Delete declared outputs before running
    #[serde(default)]
    pub clean_outputs: bool,
}

impl TaskConfig {
    /// Create a new task declaration
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            group: None,
            command: None,
            program: None,
            args: Vec::new(),
            depends_on: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            env: BTreeMap::new(),
            working_dir: None,
            always_run: false,
            ignore_failures: false,
            clean_outputs: false,
        }
    }

    /// Set the command
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = Some(command.into());
        self
    }

    /// Add a dependency
    pub fn with_depends_on(mut self, dep: impl Into<String>) -> Self {
        self.depends_on.push(dep.into());
        self
    }

    /// Add an input
    pub fn with_input(mut self, input: InputConfig) -> Self {
        self.inputs.push(input);
        self
    }

    /// Add an output path
    pub fn with_output(mut self, output: impl Into<PathBuf>) -> Self {
        self.outputs.push(output.into());
        self
    }

    /// Set the description and group
    pub fn with_description(mut self, group: impl Into<String>, description: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self.description = Some(description.into());
        self
    }

    /// Mark the task as always running
    pub fn always_run(mut self) -> Self {
        self.always_run = true;
        self
    }
}
