//! Task execution reporting

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::task::TaskId;

/// Events emitted during a build
#[derive(Debug, Clone)]
pub enum TaskEvent {
    /// The required tasks were resolved
    Planned {
        total: usize,
        workers: usize,
    },
    /// A task's action is starting
    Started {
        id: TaskId,
        command: String,
    },
    /// A task produced output
    Output {
        id: TaskId,
        line: String,
        is_stderr: bool,
    },
    /// A task was up to date
    Skipped {
        id: TaskId,
        reason: String,
    },
    /// A task's action succeeded
    Completed {
        id: TaskId,
        duration: Duration,
    },
    /// A task failed, ran or not
    Failed {
        id: TaskId,
        duration: Duration,
        error: String,
    },
    /// Something worth surfacing that did not fail the task
    Warning {
        id: TaskId,
        message: String,
    },
    /// No further tasks will be dispatched
    Halted {
        reason: String,
    },
    /// All required tasks reached a terminal state
    Finished {
        total: usize,
        succeeded: usize,
        skipped: usize,
        failed: usize,
        duration: Duration,
    },
}

/// Trait for reporting build progress
pub trait TaskReporter: Send + Sync {
    /// Handle a task event
    fn report(&self, event: &TaskEvent);
}

/// Simple reporter that logs to tracing
#[derive(Debug, Default)]
pub struct TracingReporter;

impl TaskReporter for TracingReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Planned { total, workers } => {
                tracing::info!("Planned {} tasks on {} workers", total, workers);
            }
            TaskEvent::Started { id, command } => {
                tracing::info!("Starting {}: {}", id, command);
            }
            TaskEvent::Output { id, line, is_stderr } => {
                if *is_stderr {
                    tracing::warn!("[{}] {}", id, line);
                } else {
                    tracing::debug!("[{}] {}", id, line);
                }
            }
            TaskEvent::Skipped { id, reason } => {
                tracing::info!("{} skipped: {}", id, reason);
            }
            TaskEvent::Completed { id, duration } => {
                tracing::info!("{} completed in {:.1}s", id, duration.as_secs_f64());
            }
            TaskEvent::Failed {
                id,
                duration,
                error,
            } => {
                tracing::error!("{} failed after {:.1}s: {}", id, duration.as_secs_f64(), error);
            }
            TaskEvent::Warning { id, message } => {
                tracing::warn!("{}: {}", id, message);
            }
            TaskEvent::Halted { reason } => {
                tracing::warn!("Halting build: {}", reason);
            }
            TaskEvent::Finished {
                total,
                succeeded,
                skipped,
                failed,
                duration,
            } => {
                tracing::info!(
                    "Build finished: {}/{} succeeded, {} skipped, {} failed ({:.1}s)",
                    succeeded,
                    total,
                    skipped,
                    failed,
                    duration.as_secs_f64()
                );
            }
        }
    }
}

/// Reporter that collects events for later inspection
#[derive(Debug, Default)]
pub struct CollectingReporter {
    events: Mutex<Vec<TaskEvent>>,
}

impl CollectingReporter {
    /// Get all collected events
    pub fn events(&self) -> Vec<TaskEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// IDs of tasks whose action started, in order
    pub fn started(&self) -> Vec<TaskId> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                TaskEvent::Started { id, .. } => Some(id),
                _ => None,
            })
            .collect()
    }
}

impl TaskReporter for CollectingReporter {
    fn report(&self, event: &TaskEvent) {
        match self.events.lock() {
            Ok(mut events) => events.push(event.clone()),
            Err(poisoned) => poisoned.into_inner().push(event.clone()),
        }
    }
}

/// Forwards every event to several reporters
#[derive(Default)]
pub struct FanoutReporter {
    reporters: Vec<Arc<dyn TaskReporter>>,
}

impl FanoutReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, reporter: Arc<dyn TaskReporter>) -> Self {
        self.reporters.push(reporter);
        self
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

impl TaskReporter for FanoutReporter {
    fn report(&self, event: &TaskEvent) {
        for reporter in &self.reporters {
            reporter.report(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collecting_reporter() {
        let reporter = CollectingReporter::default();
        let id = TaskId::new("compile");

        reporter.report(&TaskEvent::Started {
            id: id.clone(),
            command: "javac".to_string(),
        });
        reporter.report(&TaskEvent::Completed {
            id: id.clone(),
            duration: Duration::from_secs(5),
        });

        assert_eq!(reporter.events().len(), 2);
        assert_eq!(reporter.started(), vec![id]);
    }

    #[test]
    fn test_tracing_reporter() {
        let reporter = TracingReporter;
        let id = TaskId::new("compile");

        // Just verify it doesn't panic
        reporter.report(&TaskEvent::Started {
            id: id.clone(),
            command: "javac".to_string(),
        });
        reporter.report(&TaskEvent::Skipped {
            id,
            reason: "up to date".to_string(),
        });
    }

    #[test]
    fn test_fanout() {
        let first = Arc::new(CollectingReporter::default());
        let second = Arc::new(CollectingReporter::default());
        let fanout = FanoutReporter::new()
            .with(first.clone())
            .with(second.clone());
        assert_eq!(fanout.len(), 2);

        fanout.report(&TaskEvent::Halted {
            reason: "compile failed".to_string(),
        });

        assert_eq!(first.events().len(), 1);
        assert_eq!(second.events().len(), 1);
    }
}
