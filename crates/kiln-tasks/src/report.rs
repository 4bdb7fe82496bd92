//! Per-task results and the build summary

use std::fmt;
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::fingerprint::ChangeReason;
use crate::task::TaskId;

/// Terminal status of one task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Skipped,
    Succeeded,
    Failed,
}

impl TaskStatus {
    pub fn is_ok(&self) -> bool {
        !matches!(self, TaskStatus::Failed)
    }
}

/// How a task came to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The action ran and reported failure
    Action,
    /// The action could not be invoked
    Fault,
    /// A dependency failed; the action never ran
    Dependency,
    /// The build halted before the task was dispatched
    Halted,
}

impl FailureKind {
    /// Whether this failure originated in the task itself
    pub fn is_root_cause(&self) -> bool {
        matches!(self, FailureKind::Action | FailureKind::Fault)
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::Action => "action failed",
            FailureKind::Fault => "executor fault",
            FailureKind::Dependency => "dependency failed",
            FailureKind::Halted => "halted",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskFailure {
    pub kind: FailureKind,
    pub message: String,
}

impl TaskFailure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// What happened to one task during a build
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    pub task: TaskId,
    pub status: TaskStatus,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    /// Why the task ran, or why it was skipped
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stdout: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<TaskFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl ExecutionResult {
    fn new(task: TaskId, status: TaskStatus) -> Self {
        Self {
            task,
            status,
            duration: Duration::ZERO,
            reason: None,
            stdout: String::new(),
            stderr: String::new(),
            failure: None,
            warnings: Vec::new(),
        }
    }

    /// The task was up to date
    pub fn skipped(task: TaskId) -> Self {
        let mut result = Self::new(task, TaskStatus::Skipped);
        result.reason = Some("up to date".to_string());
        result
    }

    /// The action ran and succeeded
    pub fn succeeded(task: TaskId, duration: Duration, reason: &ChangeReason) -> Self {
        let mut result = Self::new(task, TaskStatus::Succeeded);
        result.duration = duration;
        result.reason = Some(reason.to_string());
        result
    }

    /// The task failed
    pub fn failed(task: TaskId, failure: TaskFailure) -> Self {
        let mut result = Self::new(task, TaskStatus::Failed);
        result.failure = Some(failure);
        result
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_output(mut self, stdout: String, stderr: String) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    /// Whether the action was invoked
    pub fn executed(&self) -> bool {
        match self.status {
            TaskStatus::Succeeded => true,
            TaskStatus::Skipped => false,
            TaskStatus::Failed => self
                .failure
                .as_ref()
                .is_some_and(|f| f.kind == FailureKind::Action),
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        self.failure.as_ref().map(|f| f.kind)
    }
}

fn serialize_millis<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_u64(duration.as_millis() as u64)
}

/// Overall outcome of a build
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildStatus {
    Succeeded,
    Failed,
}

/// The final report of a build
#[derive(Debug, Clone, Serialize)]
pub struct BuildSummary {
    pub status: BuildStatus,
    #[serde(rename = "duration_ms", serialize_with = "serialize_millis")]
    pub duration: Duration,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Category of the first failure that originated in a task
    pub failure_category: Option<FailureKind>,
    /// Results in completion order
    pub results: Vec<ExecutionResult>,
}

impl BuildSummary {
    pub fn is_success(&self) -> bool {
        self.status == BuildStatus::Succeeded
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    /// Result for a task by name
    pub fn result(&self, name: &str) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| r.task.as_str() == name)
    }

    /// First failure that originated in a task, in completion order
    pub fn first_failure(&self) -> Option<&ExecutionResult> {
        self.results
            .iter()
            .find(|r| r.failure_kind().is_some_and(|k| k.is_root_cause()))
            .or_else(|| self.results.iter().find(|r| r.status == TaskStatus::Failed))
    }

    /// Every warning, prefixed with its task
    pub fn warnings(&self) -> Vec<String> {
        self.results
            .iter()
            .flat_map(|r| r.warnings.iter().map(move |w| format!("{}: {}", r.task, w)))
            .collect()
    }
}

/// Collects results as tasks reach a terminal state
#[derive(Debug, Default)]
pub struct ReportCollector {
    results: Vec<ExecutionResult>,
}

impl ReportCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a result in completion order
    pub fn record(&mut self, result: ExecutionResult) {
        self.results.push(result);
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn get(&self, task: &TaskId) -> Option<&ExecutionResult> {
        self.results.iter().find(|r| &r.task == task)
    }

    /// Build the summary; the collector is left untouched
    pub fn summary(&self, duration: Duration) -> BuildSummary {
        let count = |status| self.results.iter().filter(|r| r.status == status).count();
        let failed = count(TaskStatus::Failed);

        let mut summary = BuildSummary {
            status: if failed == 0 {
                BuildStatus::Succeeded
            } else {
                BuildStatus::Failed
            },
            duration,
            succeeded: count(TaskStatus::Succeeded),
            skipped: count(TaskStatus::Skipped),
            failed,
            failure_category: None,
            results: self.results.clone(),
        };
        summary.failure_category = summary.first_failure().and_then(|r| r.failure_kind());
        summary
    }
}
