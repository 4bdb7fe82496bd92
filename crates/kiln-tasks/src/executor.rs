//! Single-task execution

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, warn};

use crate::action::{ActionContext, ActionError};
use crate::fingerprint::{ChangeReason, Fingerprint};
use crate::report::{ExecutionResult, FailureKind, TaskFailure};
use crate::reporter::{TaskEvent, TaskReporter};
use crate::store::FingerprintStore;
use crate::task::{Task, TaskId};

/// The action could not be invoked; fatal to the task and the run
#[derive(Debug, thiserror::Error)]
#[error("executor fault in task '{task}': {source}")]
pub struct ExecutorFault {
    pub task: TaskId,
    #[source]
    pub source: ActionError,
}

/// Runs one task's action and keeps the fingerprint store in step
#[derive(Clone)]
pub struct TaskExecutor {
    root: PathBuf,
    store: Arc<dyn FingerprintStore>,
    reporter: Arc<dyn TaskReporter>,
}

impl TaskExecutor {
    pub fn new(
        root: impl Into<PathBuf>,
        store: Arc<dyn FingerprintStore>,
        reporter: Arc<dyn TaskReporter>,
    ) -> Self {
        Self {
            root: root.into(),
            store,
            reporter,
        }
    }

    /// Invoke the task's action exactly once.
    ///
    /// `fingerprint` is recorded on success; it is absent when inputs could
    /// not be hashed, in which case nothing is recorded.
    pub async fn execute(
        &self,
        task: &Task,
        fingerprint: Option<&Fingerprint>,
        reason: &ChangeReason,
    ) -> Result<ExecutionResult, ExecutorFault> {
        let mut warnings = Vec::new();
        match reason {
            ChangeReason::MissingInput(path) => {
                warnings.push(format!("input {} is missing, running anyway", path.display()));
            }
            ChangeReason::InputError(message) => {
                warnings.push(format!("inputs could not be hashed ({}), running anyway", message));
            }
            _ => {}
        }
        if task.clean_outputs {
            warnings.extend(self.clean_outputs(task));
        }
        for warning in &warnings {
            self.warn(&task.id, warning);
        }

        debug!(task = %task.id, %reason, "executing task");
        self.reporter.report(&TaskEvent::Started {
            id: task.id.clone(),
            command: task.action.describe(),
        });

        let ctx = ActionContext::new(task.id.clone(), self.root.clone(), Arc::clone(&self.reporter));
        let start = Instant::now();
        let outcome = task.action.run(&ctx).await;
        let duration = start.elapsed();

        let output = match outcome {
            Ok(output) => output,
            Err(source) => {
                self.forget(&task.id);
                self.reporter.report(&TaskEvent::Failed {
                    id: task.id.clone(),
                    duration,
                    error: source.to_string(),
                });
                return Err(ExecutorFault {
                    task: task.id.clone(),
                    source,
                });
            }
        };

        let mut result = if output.success {
            if let Some(fp) = fingerprint {
                if let Err(e) = self.store.put(&task.id, fp) {
                    let warning = format!("could not record fingerprint: {}", e);
                    self.warn(&task.id, &warning);
                    warnings.push(warning);
                }
            }
            self.reporter.report(&TaskEvent::Completed {
                id: task.id.clone(),
                duration,
            });
            ExecutionResult::succeeded(task.id.clone(), duration, reason)
        } else {
            // A failed run must never leave an older success behind to be skipped on.
            self.forget(&task.id);
            let message = output.failure_message();
            if task.ignore_failures {
                let warning = format!("failure ignored: {}", message);
                self.warn(&task.id, &warning);
                warnings.push(warning);
                self.reporter.report(&TaskEvent::Completed {
                    id: task.id.clone(),
                    duration,
                });
                ExecutionResult::succeeded(task.id.clone(), duration, reason)
            } else {
                self.reporter.report(&TaskEvent::Failed {
                    id: task.id.clone(),
                    duration,
                    error: message.clone(),
                });
                ExecutionResult::failed(task.id.clone(), TaskFailure::new(FailureKind::Action, message))
                    .with_duration(duration)
                    .with_reason(reason.to_string())
            }
        };

        result = result.with_output(output.stdout, output.stderr);
        for warning in warnings {
            result = result.with_warning(warning);
        }
        Ok(result)
    }

    fn clean_outputs(&self, task: &Task) -> Vec<String> {
        let mut warnings = Vec::new();
        for output in &task.outputs {
            let path = self.root.join(output);
            if let Err(e) = remove_path(&path) {
                warnings.push(format!("could not clean {}: {}", output.display(), e));
            } else {
                debug!(task = %task.id, path = %path.display(), "cleaned output");
            }
        }
        warnings
    }

    fn forget(&self, task: &TaskId) {
        if let Err(e) = self.store.remove(task) {
            warn!(task = %task, error = %e, "failed to invalidate fingerprint");
        }
    }

    fn warn(&self, task: &TaskId, message: &str) {
        warn!(task = %task, "{}", message);
        self.reporter.report(&TaskEvent::Warning {
            id: task.clone(),
            message: message.to_string(),
        });
    }
}

fn remove_path(path: &Path) -> std::io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::action::{ActionOutput, FnAction};
    use crate::report::TaskStatus;
    use crate::reporter::CollectingReporter;
    use crate::store::MemoryStore;
    use tempfile::TempDir;

    fn executor(root: &Path) -> (TaskExecutor, Arc<MemoryStore>, Arc<CollectingReporter>) {
        let store = Arc::new(MemoryStore::new());
        let reporter = Arc::new(CollectingReporter::default());
        let executor = TaskExecutor::new(root, store.clone(), reporter.clone());
        (executor, store, reporter)
    }

    fn failing(code: i32) -> FnAction {
        FnAction::new("fail", move |_| Ok(ActionOutput::failure(Some(code), "error: broken")))
    }

    #[tokio::test]
    async fn test_success_records_fingerprint() {
        let temp = TempDir::new().unwrap();
        let (executor, store, reporter) = executor(temp.path());
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let task = Task::new(
            "compile",
            FnAction::new("compile", move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(ActionOutput::success("ok"))
            }),
        );
        let fp = Fingerprint::new("abc");

        let result = executor
            .execute(&task, Some(&fp), &ChangeReason::NoPrevious)
            .await
            .unwrap();

        assert_eq!(result.status, TaskStatus::Succeeded);
        assert_eq!(result.stdout, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.get(&task.id).unwrap(), Some(fp));
        assert_eq!(reporter.started(), vec![task.id.clone()]);
    }

    #[tokio::test]
    async fn test_failure_invalidates_fingerprint() {
        let temp = TempDir::new().unwrap();
        let (executor, store, _) = executor(temp.path());
        let task = Task::new("test", failing(1));
        store.put(&task.id, &Fingerprint::new("old")).unwrap();

        let result = executor
            .execute(&task, Some(&Fingerprint::new("new")), &ChangeReason::InputsChanged)
            .await
            .unwrap();

        assert_eq!(result.status, TaskStatus::Failed);
        assert_eq!(result.failure_kind(), Some(FailureKind::Action));
        assert!(result.failure.unwrap().message.contains("error: broken"));
        assert_eq!(store.get(&task.id).unwrap(), None);
    }

    #[tokio::test]
    async fn test_ignore_failures_succeeds_with_warning() {
        let temp = TempDir::new().unwrap();
        let (executor, store, reporter) = executor(temp.path());
        let task = Task::new("test", failing(1)).ignore_failures();

        let result = executor
            .execute(&task, Some(&Fingerprint::new("fp")), &ChangeReason::NoPrevious)
            .await
            .unwrap();

        assert_eq!(result.status, TaskStatus::Succeeded);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(store.get(&task.id).unwrap(), None);
        assert!(reporter
            .events()
            .iter()
            .any(|e| matches!(e, TaskEvent::Warning { .. })));
    }

    #[tokio::test]
    async fn test_fault_is_error() {
        let temp = TempDir::new().unwrap();
        let (executor, store, _) = executor(temp.path());
        let task = Task::new(
            "javadoc",
            FnAction::new("missing", |_| Err(ActionError::Other("javadoc not found".into()))),
        );
        store.put(&task.id, &Fingerprint::new("old")).unwrap();

        let fault = executor
            .execute(&task, None, &ChangeReason::AlwaysRun)
            .await
            .unwrap_err();

        assert_eq!(fault.task, task.id);
        assert_eq!(store.get(&task.id).unwrap(), None);
    }

    #[tokio::test]
    async fn test_clean_outputs_before_run() {
        let temp = TempDir::new().unwrap();
        let stale = temp.path().join("build/delombok/Old.java");
        fs::create_dir_all(stale.parent().unwrap()).unwrap();
        fs::write(&stale, "stale").unwrap();

        let (executor, _, _) = executor(temp.path());
        let observed = stale.clone();
        let task = Task::new(
            "delombok",
            FnAction::new("delombok", move |_| {
                assert!(!observed.exists());
                Ok(ActionOutput::success(""))
            }),
        )
        .with_output("build/delombok")
        .clean_outputs();

        let result = executor
            .execute(&task, None, &ChangeReason::NoPrevious)
            .await
            .unwrap();
        assert_eq!(result.status, TaskStatus::Succeeded);
        assert!(!temp.path().join("build/delombok").exists());
    }

    #[tokio::test]
    async fn test_missing_input_warns() {
        let temp = TempDir::new().unwrap();
        let (executor, store, _) = executor(temp.path());
        let task = Task::new("compile", FnAction::new("ok", |_| Ok(ActionOutput::success(""))));

        let result = executor
            .execute(&task, None, &ChangeReason::MissingInput("lombok.config".into()))
            .await
            .unwrap();

        assert_eq!(result.status, TaskStatus::Succeeded);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("lombok.config"));
        // Nothing to record without a fingerprint
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unhashable_inputs_warn() {
        let temp = TempDir::new().unwrap();
        let (executor, store, reporter) = executor(temp.path());
        let task = Task::new("compile", FnAction::new("ok", |_| Ok(ActionOutput::success(""))));
        let reason = ChangeReason::InputError("src: Is a directory".to_string());

        let result = executor.execute(&task, None, &reason).await.unwrap();

        assert_eq!(result.status, TaskStatus::Succeeded);
        assert_eq!(result.warnings.len(), 1);
        assert!(result.warnings[0].contains("could not be hashed"));
        assert!(reporter
            .events()
            .iter()
            .any(|e| matches!(e, TaskEvent::Warning { .. })));
        assert!(store.is_empty());
    }
}
