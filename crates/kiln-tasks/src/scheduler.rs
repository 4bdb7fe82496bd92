//! Task scheduler: ready-queue dispatch on a bounded tokio worker pool

use std::collections::{BTreeSet, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use kiln_core::config::default_workers;
use kiln_core::{FailureMode, Settings};

use crate::executor::TaskExecutor;
use crate::fingerprint::{ChangeReason, Fingerprint, Freshness, InputFingerprinter};
use crate::graph::{GraphError, TaskGraph};
use crate::report::{BuildSummary, ExecutionResult, FailureKind, ReportCollector, TaskFailure};
use crate::reporter::{TaskEvent, TaskReporter};
use crate::store::FingerprintStore;
use crate::task::{Task, TaskId};

/// Options for the task scheduler
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Maximum concurrently running tasks
    pub workers: usize,
    /// What to do after a task fails
    pub mode: FailureMode,
    /// Force dependents of executed tasks to run
    pub rebuild_dependents: bool,
    /// Project root
    pub root_dir: PathBuf,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            mode: FailureMode::default(),
            rebuild_dependents: true,
            root_dir: std::env::current_dir().unwrap_or_default(),
        }
    }
}

impl SchedulerOptions {
    pub fn from_settings(settings: &Settings, root_dir: impl Into<PathBuf>) -> Self {
        Self {
            workers: settings.effective_workers(),
            mode: settings.mode,
            rebuild_dependents: settings.rebuild_dependents,
            root_dir: root_dir.into(),
        }
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_mode(mut self, mode: FailureMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_rebuild_dependents(mut self, enabled: bool) -> Self {
        self.rebuild_dependents = enabled;
        self
    }
}

/// Runs the tasks required by a set of targets
pub struct Scheduler {
    options: SchedulerOptions,
    store: Arc<dyn FingerprintStore>,
    reporter: Arc<dyn TaskReporter>,
}

impl Scheduler {
    pub fn new(
        options: SchedulerOptions,
        store: Arc<dyn FingerprintStore>,
        reporter: Arc<dyn TaskReporter>,
    ) -> Self {
        Self {
            options,
            store,
            reporter,
        }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Build `targets` and everything they depend on.
    ///
    /// Graph errors are returned before any task is dispatched. Otherwise
    /// every required task ends up in the summary with a terminal status.
    #[instrument(skip_all, fields(targets = targets.len(), workers = self.options.workers))]
    pub async fn run<S: AsRef<str>>(
        &self,
        graph: &TaskGraph,
        targets: &[S],
    ) -> Result<BuildSummary, GraphError> {
        let order = graph.resolve_indices(targets)?;
        let workers = self.options.workers.max(1);
        let start = Instant::now();

        info!(tasks = order.len(), workers, mode = %self.options.mode, "starting build");
        self.reporter.report(&TaskEvent::Planned {
            total: order.len(),
            workers,
        });

        let job = JobContext {
            fingerprinter: InputFingerprinter::new(self.options.root_dir.clone()),
            executor: TaskExecutor::new(
                self.options.root_dir.clone(),
                Arc::clone(&self.store),
                Arc::clone(&self.reporter),
            ),
            store: Arc::clone(&self.store),
            reporter: Arc::clone(&self.reporter),
        };

        let mut state = RunState::default();
        // Positions into `order` not yet dispatched or settled
        let mut pending: BTreeSet<usize> = (0..order.len()).collect();
        let mut running: BTreeSet<usize> = BTreeSet::new();
        let mut jobs: JoinSet<(usize, JobOutcome)> = JoinSet::new();

        loop {
            if state.halt_reason.is_none() {
                let candidates: Vec<usize> = pending.iter().copied().collect();
                for pos in candidates {
                    let idx = order[pos];
                    let task = graph.task_at(idx);
                    let deps = dependency_indices(graph, task);
                    if !deps.iter().all(|d| state.is_settled(*d)) {
                        continue;
                    }

                    if let Some(failed) = state.failed_dependency(graph, &deps) {
                        let result = self.dependency_failure(task, &failed);
                        state.settle(idx, result, None);
                        pending.remove(&pos);
                        continue;
                    }

                    if jobs.len() >= workers {
                        continue;
                    }

                    let upstream = self.upstream_fingerprints(&state, &deps);
                    let rebuilt = self.rebuilt_dependency(&state, graph, &deps);
                    pending.remove(&pos);
                    running.insert(idx);

                    let id = task.id.clone();
                    let work = job.clone().run(task.clone(), upstream, rebuilt);
                    let reporter = Arc::clone(&self.reporter);
                    // The inner spawn turns a panicking job into an error we can attribute.
                    jobs.spawn(async move {
                        match tokio::spawn(work).await {
                            Ok(outcome) => (idx, outcome),
                            Err(e) => (idx, fault_outcome(&*reporter, id, format!("job panicked: {}", e))),
                        }
                    });
                }
            }

            let Some(joined) = jobs.join_next().await else {
                break;
            };
            match joined {
                Ok((idx, outcome)) => {
                    running.remove(&idx);
                    self.complete(&mut state, graph, idx, outcome);
                }
                Err(e) => warn!(error = %e, "scheduler job was lost"),
            }
        }

        // Jobs whose wrapper itself was lost
        for idx in running {
            if !state.is_settled(idx) {
                let id = graph.task_at(idx).id.clone();
                let outcome = fault_outcome(&*self.reporter, id, "job was lost".to_string());
                self.complete(&mut state, graph, idx, outcome);
            }
        }

        // Everything still pending was never dispatched
        for pos in pending {
            let idx = order[pos];
            let task = graph.task_at(idx);
            let deps = dependency_indices(graph, task);
            let result = match state.failed_dependency(graph, &deps) {
                Some(failed) => self.dependency_failure(task, &failed),
                None => {
                    let reason = state.halt_reason.clone().unwrap_or_default();
                    self.reporter.report(&TaskEvent::Failed {
                        id: task.id.clone(),
                        duration: Default::default(),
                        error: "not started, build halted".to_string(),
                    });
                    ExecutionResult::failed(
                        task.id.clone(),
                        TaskFailure::new(FailureKind::Halted, format!("not started: {}", reason)),
                    )
                }
            };
            state.settle(idx, result, None);
        }

        let summary = state.collector.summary(start.elapsed());
        self.reporter.report(&TaskEvent::Finished {
            total: summary.total(),
            succeeded: summary.succeeded,
            skipped: summary.skipped,
            failed: summary.failed,
            duration: summary.duration,
        });
        info!(
            status = ?summary.status,
            succeeded = summary.succeeded,
            skipped = summary.skipped,
            failed = summary.failed,
            "build finished"
        );
        Ok(summary)
    }

    fn complete(&self, state: &mut RunState, graph: &TaskGraph, idx: usize, outcome: JobOutcome) {
        let JobOutcome {
            result,
            fingerprint,
            fault,
        } = outcome;

        let root_failure = result.failure_kind().is_some_and(|k| k.is_root_cause());
        let halts = fault || (root_failure && self.options.mode == FailureMode::Halt);
        if halts && state.halt_reason.is_none() {
            let task = &graph.task_at(idx).id;
            let reason = if fault {
                format!("executor fault in '{}'", task)
            } else {
                format!("'{}' failed", task)
            };
            warn!(%reason, "halting build, draining running tasks");
            self.reporter.report(&TaskEvent::Halted {
                reason: reason.clone(),
            });
            state.halt_reason = Some(reason);
        }

        state.settle(idx, result, fingerprint);
    }

    fn dependency_failure(&self, task: &Task, failed: &TaskId) -> ExecutionResult {
        let message = format!("dependency '{}' failed", failed);
        debug!(task = %task.id, dependency = %failed, "not running, dependency failed");
        self.reporter.report(&TaskEvent::Failed {
            id: task.id.clone(),
            duration: Default::default(),
            error: message.clone(),
        });
        ExecutionResult::failed(
            task.id.clone(),
            TaskFailure::new(FailureKind::Dependency, message),
        )
    }

    fn upstream_fingerprints(&self, state: &RunState, deps: &[usize]) -> Vec<Fingerprint> {
        if !self.options.rebuild_dependents {
            return Vec::new();
        }
        deps.iter()
            .filter_map(|d| state.settled.get(d))
            .filter_map(|s| s.fingerprint.clone())
            .collect()
    }

    fn rebuilt_dependency(
        &self,
        state: &RunState,
        graph: &TaskGraph,
        deps: &[usize],
    ) -> Option<TaskId> {
        if !self.options.rebuild_dependents {
            return None;
        }
        deps.iter()
            .find(|d| state.settled.get(d).is_some_and(|s| s.rebuilt))
            .map(|&d| graph.task_at(d).id.clone())
    }
}

fn dependency_indices(graph: &TaskGraph, task: &Task) -> Vec<usize> {
    task.depends_on
        .iter()
        .filter_map(|dep| graph.index_of(dep))
        .collect()
}

/// What a settled task means for its dependents
struct Settled {
    failure: Option<FailureKind>,
    /// The action ran and the task counts as succeeded
    rebuilt: bool,
    fingerprint: Option<Fingerprint>,
}

#[derive(Default)]
struct RunState {
    collector: ReportCollector,
    settled: HashMap<usize, Settled>,
    halt_reason: Option<String>,
}

impl RunState {
    fn is_settled(&self, idx: usize) -> bool {
        self.settled.contains_key(&idx)
    }

    fn settle(&mut self, idx: usize, result: ExecutionResult, fingerprint: Option<Fingerprint>) {
        self.settled.insert(
            idx,
            Settled {
                failure: result.failure_kind(),
                rebuilt: result.executed() && result.status.is_ok(),
                fingerprint,
            },
        );
        self.collector.record(result);
    }

    /// First dependency that failed for a reason other than the halt itself
    fn failed_dependency(&self, graph: &TaskGraph, deps: &[usize]) -> Option<TaskId> {
        deps.iter()
            .find(|d| {
                self.settled
                    .get(d)
                    .and_then(|s| s.failure)
                    .is_some_and(|kind| kind != FailureKind::Halted)
            })
            .map(|&d| graph.task_at(d).id.clone())
    }
}

struct JobOutcome {
    result: ExecutionResult,
    fingerprint: Option<Fingerprint>,
    fault: bool,
}

fn fault_outcome(reporter: &dyn TaskReporter, id: TaskId, message: String) -> JobOutcome {
    reporter.report(&TaskEvent::Failed {
        id: id.clone(),
        duration: Default::default(),
        error: message.clone(),
    });
    JobOutcome {
        result: ExecutionResult::failed(id, TaskFailure::new(FailureKind::Fault, message)),
        fingerprint: None,
        fault: true,
    }
}

/// Everything a dispatched job needs, cheap to clone
#[derive(Clone)]
struct JobContext {
    fingerprinter: InputFingerprinter,
    executor: TaskExecutor,
    store: Arc<dyn FingerprintStore>,
    reporter: Arc<dyn TaskReporter>,
}

impl JobContext {
    async fn run(self, task: Task, upstream: Vec<Fingerprint>, rebuilt: Option<TaskId>) -> JobOutcome {
        let fingerprinter = self.fingerprinter.clone();
        let store = Arc::clone(&self.store);
        let probe = task.clone();
        let checked = tokio::task::spawn_blocking(move || {
            let previous = store.get(&probe.id);
            fingerprinter.check(&probe, &previous, &upstream)
        })
        .await;

        let freshness = match checked {
            Ok(freshness) => freshness,
            Err(e) => {
                return fault_outcome(
                    &*self.reporter,
                    task.id.clone(),
                    format!("fingerprinting panicked: {}", e),
                );
            }
        };

        let (current, reason) = match (freshness, rebuilt) {
            (Freshness::Fresh(fp), None) => {
                debug!(task = %task.id, fingerprint = %fp.short(), "up to date");
                self.reporter.report(&TaskEvent::Skipped {
                    id: task.id.clone(),
                    reason: "up to date".to_string(),
                });
                return JobOutcome {
                    result: ExecutionResult::skipped(task.id.clone()),
                    fingerprint: Some(fp),
                    fault: false,
                };
            }
            (Freshness::Fresh(fp), Some(dep)) => (Some(fp), ChangeReason::DependencyRebuilt(dep)),
            (Freshness::Stale { current, reason }, _) => (current, reason),
        };

        match self.executor.execute(&task, current.as_ref(), &reason).await {
            Ok(result) => JobOutcome {
                result,
                fingerprint: current,
                fault: false,
            },
            Err(fault) => JobOutcome {
                result: ExecutionResult::failed(
                    task.id.clone(),
                    TaskFailure::new(FailureKind::Fault, fault.to_string()),
                )
                .with_reason(reason.to_string()),
                fingerprint: None,
                fault: true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::time::Duration;

    use kiln_core::InputConfig;
    use tempfile::TempDir;

    use crate::action::{ActionError, ActionOutput, FnAction};
    use crate::report::{BuildStatus, TaskStatus};
    use crate::reporter::CollectingReporter;
    use crate::store::MemoryStore;

    struct Harness {
        temp: TempDir,
        store: Arc<MemoryStore>,
        reporter: Arc<CollectingReporter>,
        calls: HashMap<&'static str, Arc<AtomicUsize>>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                temp: TempDir::new().unwrap(),
                store: Arc::new(MemoryStore::new()),
                reporter: Arc::new(CollectingReporter::default()),
                calls: HashMap::new(),
            }
        }

        fn write(&self, name: &str, contents: &str) {
            fs::write(self.temp.path().join(name), contents).unwrap();
        }

        /// Task that counts invocations and succeeds
        fn counting(&mut self, name: &'static str) -> Task {
            self.with_outcome(name, |_| Ok(ActionOutput::success("")))
        }

        fn with_outcome<F>(&mut self, name: &'static str, outcome: F) -> Task
        where
            F: Fn(&crate::action::ActionContext) -> Result<ActionOutput, ActionError>
                + Send
                + Sync
                + 'static,
        {
            let calls = Arc::new(AtomicUsize::new(0));
            self.calls.insert(name, calls.clone());
            Task::new(
                name,
                FnAction::new(name, move |ctx| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    outcome(ctx)
                }),
            )
        }

        fn calls(&self, name: &str) -> usize {
            self.calls[name].load(Ordering::SeqCst)
        }

        fn scheduler(&self, options: SchedulerOptions) -> Scheduler {
            Scheduler::new(
                SchedulerOptions {
                    root_dir: self.temp.path().to_path_buf(),
                    ..options
                },
                self.store.clone(),
                self.reporter.clone(),
            )
        }

        fn default_scheduler(&self) -> Scheduler {
            self.scheduler(SchedulerOptions::default().with_workers(4))
        }
    }

    fn failing(_: &crate::action::ActionContext) -> Result<ActionOutput, ActionError> {
        Ok(ActionOutput::failure(Some(1), "error: compilation failed"))
    }

    fn status(summary: &BuildSummary, name: &str) -> TaskStatus {
        summary.result(name).unwrap().status
    }

    fn failure_kind(summary: &BuildSummary, name: &str) -> Option<FailureKind> {
        summary.result(name).unwrap().failure_kind()
    }

    /// c depends on b depends on a; each reads its own input file
    fn chain(h: &mut Harness) -> TaskGraph {
        h.write("a.txt", "a");
        h.write("b.txt", "b");
        h.write("c.txt", "c");
        let a = h.counting("a").with_input(InputConfig::File("a.txt".into()));
        let b = h
            .counting("b")
            .with_input(InputConfig::File("b.txt".into()))
            .with_depends_on("a");
        let c = h
            .counting("c")
            .with_input(InputConfig::File("c.txt".into()))
            .with_depends_on("b");
        TaskGraph::new()
            .with_task(a)
            .and_then(|g| g.with_task(b))
            .and_then(|g| g.with_task(c))
            .unwrap()
    }

    #[tokio::test]
    async fn test_runs_in_dependency_order() {
        let mut h = Harness::new();
        let graph = chain(&mut h);

        let summary = h.default_scheduler().run(&graph, &["c"]).await.unwrap();

        assert!(summary.is_success());
        assert_eq!(summary.succeeded, 3);
        let started: Vec<String> = h.reporter.started().iter().map(|id| id.to_string()).collect();
        assert_eq!(started, vec!["a", "b", "c"]);
        let completed: Vec<&str> = summary.results.iter().map(|r| r.task.as_str()).collect();
        assert_eq!(completed, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_unchanged_inputs_skip_everything() {
        let mut h = Harness::new();
        let graph = chain(&mut h);
        let scheduler = h.default_scheduler();

        scheduler.run(&graph, &["c"]).await.unwrap();
        let summary = scheduler.run(&graph, &["c"]).await.unwrap();

        assert!(summary.is_success());
        assert_eq!(summary.skipped, 3);
        for name in ["a", "b", "c"] {
            assert_eq!(status(&summary, name), TaskStatus::Skipped);
            assert_eq!(h.calls(name), 1);
        }
    }

    #[tokio::test]
    async fn test_changed_middle_input_reruns_downstream() {
        let mut h = Harness::new();
        let graph = chain(&mut h);
        let scheduler = h.default_scheduler();
        scheduler.run(&graph, &["c"]).await.unwrap();

        h.write("b.txt", "b changed");
        let summary = scheduler.run(&graph, &["c"]).await.unwrap();

        assert_eq!(status(&summary, "a"), TaskStatus::Skipped);
        assert_eq!(status(&summary, "b"), TaskStatus::Succeeded);
        assert_eq!(status(&summary, "c"), TaskStatus::Succeeded);
        assert_eq!((h.calls("a"), h.calls("b"), h.calls("c")), (1, 2, 2));
    }

    #[tokio::test]
    async fn test_without_rebuild_dependents_only_changed_task_runs() {
        let mut h = Harness::new();
        let graph = chain(&mut h);
        let scheduler = h.scheduler(
            SchedulerOptions::default()
                .with_workers(2)
                .with_rebuild_dependents(false),
        );
        scheduler.run(&graph, &["c"]).await.unwrap();

        h.write("b.txt", "b changed");
        let summary = scheduler.run(&graph, &["c"]).await.unwrap();

        assert_eq!(status(&summary, "b"), TaskStatus::Succeeded);
        assert_eq!(status(&summary, "c"), TaskStatus::Skipped);
        assert_eq!(h.calls("c"), 1);
    }

    #[tokio::test]
    async fn test_always_run_dependency_forces_dependents() {
        let mut h = Harness::new();
        h.write("b.txt", "b");
        let a = h.counting("a").always_run();
        let b = h
            .counting("b")
            .with_input(InputConfig::File("b.txt".into()))
            .with_depends_on("a");
        let graph = TaskGraph::new()
            .with_task(a)
            .and_then(|g| g.with_task(b))
            .unwrap();
        let scheduler = h.default_scheduler();

        scheduler.run(&graph, &["b"]).await.unwrap();
        let summary = scheduler.run(&graph, &["b"]).await.unwrap();

        assert_eq!(h.calls("a"), 2);
        assert_eq!(h.calls("b"), 2);
        assert_eq!(
            summary.result("b").unwrap().reason.as_deref(),
            Some("dependency a was rebuilt")
        );
    }

    #[tokio::test]
    async fn test_failure_propagates_without_running_dependents() {
        let mut h = Harness::new();
        h.write("b.txt", "b");
        h.write("c.txt", "c");
        let a = h.with_outcome("a", failing);
        let b = h.counting("b").with_depends_on("a");
        let c = h.counting("c").with_depends_on("b");
        let graph = TaskGraph::new()
            .with_task(a)
            .and_then(|g| g.with_task(b))
            .and_then(|g| g.with_task(c))
            .unwrap();

        let summary = h.default_scheduler().run(&graph, &["c"]).await.unwrap();

        assert_eq!(summary.status, BuildStatus::Failed);
        assert_eq!(summary.failed, 3);
        assert_eq!(failure_kind(&summary, "a"), Some(FailureKind::Action));
        assert_eq!(failure_kind(&summary, "b"), Some(FailureKind::Dependency));
        assert_eq!(failure_kind(&summary, "c"), Some(FailureKind::Dependency));
        assert_eq!(summary.failure_category, Some(FailureKind::Action));
        assert_eq!((h.calls("a"), h.calls("b"), h.calls("c")), (1, 0, 0));
        assert!(summary
            .result("b")
            .unwrap()
            .failure
            .as_ref()
            .unwrap()
            .message
            .contains("'a'"));
    }

    #[tokio::test]
    async fn test_halt_stops_dispatch_after_first_failure() {
        let mut h = Harness::new();
        let broken = h.with_outcome("broken", failing);
        let x = h.counting("x");
        let y = h.counting("y");
        let graph = TaskGraph::new()
            .with_task(broken)
            .and_then(|g| g.with_task(x))
            .and_then(|g| g.with_task(y))
            .unwrap();

        let summary = h
            .scheduler(SchedulerOptions::default().with_workers(1))
            .run(&graph, &["broken", "x", "y"])
            .await
            .unwrap();

        assert_eq!(summary.total(), 3);
        assert_eq!(failure_kind(&summary, "x"), Some(FailureKind::Halted));
        assert_eq!(failure_kind(&summary, "y"), Some(FailureKind::Halted));
        assert_eq!(h.calls("x") + h.calls("y"), 0);
        assert!(h
            .reporter
            .events()
            .iter()
            .any(|e| matches!(e, TaskEvent::Halted { .. })));
    }

    #[tokio::test]
    async fn test_best_effort_runs_independent_tasks() {
        let mut h = Harness::new();
        let broken = h.with_outcome("broken", failing);
        let after = h.counting("after").with_depends_on("broken");
        let x = h.counting("x");
        let y = h.counting("y");
        let graph = TaskGraph::new()
            .with_task(broken)
            .and_then(|g| g.with_task(after))
            .and_then(|g| g.with_task(x))
            .and_then(|g| g.with_task(y))
            .unwrap();

        let summary = h
            .scheduler(
                SchedulerOptions::default()
                    .with_workers(1)
                    .with_mode(FailureMode::BestEffort),
            )
            .run(&graph, &["after", "x", "y"])
            .await
            .unwrap();

        assert_eq!(summary.total(), 4);
        assert_eq!(summary.status, BuildStatus::Failed);
        assert_eq!(failure_kind(&summary, "broken"), Some(FailureKind::Action));
        assert_eq!(failure_kind(&summary, "after"), Some(FailureKind::Dependency));
        assert_eq!(status(&summary, "x"), TaskStatus::Succeeded);
        assert_eq!(status(&summary, "y"), TaskStatus::Succeeded);
        assert_eq!(h.calls("after"), 0);
    }

    #[tokio::test]
    async fn test_failed_task_reruns_next_invocation() {
        let mut h = Harness::new();
        let healthy = Arc::new(AtomicBool::new(false));
        let flag = healthy.clone();
        let flaky = h.with_outcome("flaky", move |_| {
            if flag.load(Ordering::SeqCst) {
                Ok(ActionOutput::success(""))
            } else {
                Ok(ActionOutput::failure(Some(1), "flaky"))
            }
        });
        let graph = TaskGraph::new().with_task(flaky).unwrap();
        let scheduler = h.default_scheduler();

        let first = scheduler.run(&graph, &["flaky"]).await.unwrap();
        assert!(!first.is_success());

        healthy.store(true, Ordering::SeqCst);
        let second = scheduler.run(&graph, &["flaky"]).await.unwrap();
        assert_eq!(status(&second, "flaky"), TaskStatus::Succeeded);

        let third = scheduler.run(&graph, &["flaky"]).await.unwrap();
        assert_eq!(status(&third, "flaky"), TaskStatus::Skipped);
        assert_eq!(h.calls("flaky"), 2);
    }

    #[tokio::test]
    async fn test_ignored_failure_lets_dependents_run() {
        let mut h = Harness::new();
        let tests = h.with_outcome("test", failing).ignore_failures();
        let report = h.counting("report").with_depends_on("test");
        let graph = TaskGraph::new()
            .with_task(tests)
            .and_then(|g| g.with_task(report))
            .unwrap();
        let scheduler = h.default_scheduler();

        let summary = scheduler.run(&graph, &["report"]).await.unwrap();
        assert!(summary.is_success());
        assert_eq!(summary.warnings().len(), 1);
        assert_eq!(h.calls("report"), 1);

        // Never recorded, so it runs again
        scheduler.run(&graph, &["report"]).await.unwrap();
        assert_eq!(h.calls("test"), 2);
    }

    #[tokio::test]
    async fn test_executor_fault_halts_even_in_best_effort() {
        let mut h = Harness::new();
        let fault = h.with_outcome("javadoc", |_| {
            Err(ActionError::Other("javadoc: command not found".into()))
        });
        let other = h.counting("test");
        let graph = TaskGraph::new()
            .with_task(fault)
            .and_then(|g| g.with_task(other))
            .unwrap();

        let summary = h
            .scheduler(
                SchedulerOptions::default()
                    .with_workers(1)
                    .with_mode(FailureMode::BestEffort),
            )
            .run(&graph, &["javadoc", "test"])
            .await
            .unwrap();

        assert_eq!(failure_kind(&summary, "javadoc"), Some(FailureKind::Fault));
        assert_eq!(failure_kind(&summary, "test"), Some(FailureKind::Halted));
        assert_eq!(summary.failure_category, Some(FailureKind::Fault));
        assert_eq!(h.calls("test"), 0);
    }

    #[tokio::test]
    async fn test_panicking_action_becomes_fault() {
        let mut h = Harness::new();
        let panics = h.with_outcome("panics", |_| panic!("boom"));
        let graph = TaskGraph::new().with_task(panics).unwrap();

        let summary = h.default_scheduler().run(&graph, &["panics"]).await.unwrap();

        assert_eq!(summary.total(), 1);
        assert_eq!(failure_kind(&summary, "panics"), Some(FailureKind::Fault));
    }

    #[tokio::test]
    async fn test_missing_input_forces_run_with_warning() {
        let mut h = Harness::new();
        let task = h
            .counting("compile")
            .with_input(InputConfig::File("lombok.config".into()));
        let graph = TaskGraph::new().with_task(task).unwrap();
        let scheduler = h.default_scheduler();

        let first = scheduler.run(&graph, &["compile"]).await.unwrap();
        let second = scheduler.run(&graph, &["compile"]).await.unwrap();

        assert!(first.is_success());
        assert_eq!(status(&second, "compile"), TaskStatus::Succeeded);
        assert_eq!(second.result("compile").unwrap().warnings.len(), 1);
        assert_eq!(h.calls("compile"), 2);
    }

    #[tokio::test]
    async fn test_unhashable_input_runs_every_time_with_warning() {
        let mut h = Harness::new();
        fs::create_dir_all(h.temp.path().join("src")).unwrap();
        let task = h
            .counting("compile")
            .with_input(InputConfig::File("src".into()));
        let graph = TaskGraph::new().with_task(task).unwrap();
        let scheduler = h.default_scheduler();

        scheduler.run(&graph, &["compile"]).await.unwrap();
        let second = scheduler.run(&graph, &["compile"]).await.unwrap();

        assert_eq!(status(&second, "compile"), TaskStatus::Succeeded);
        assert_eq!(second.result("compile").unwrap().warnings.len(), 1);
        assert_eq!(h.calls("compile"), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_halt_drains_running_task() {
        let mut h = Harness::new();
        let (started_tx, started_rx) = std::sync::mpsc::channel::<()>();
        let started_tx = std::sync::Mutex::new(started_tx);
        let slow = h.with_outcome("slow", move |_| {
            let _ = started_tx.lock().unwrap().send(());
            std::thread::sleep(Duration::from_millis(200));
            Ok(ActionOutput::success(""))
        });
        let started_rx = std::sync::Mutex::new(started_rx);
        let broken = h.with_outcome("broken", move |_| {
            // Fail only once the slow sibling is mid-action
            started_rx
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5))
                .unwrap();
            Err(ActionError::Other("javadoc: command not found".into()))
        });
        let waiting = h.counting("waiting");
        let graph = TaskGraph::new()
            .with_task(slow)
            .and_then(|g| g.with_task(broken))
            .and_then(|g| g.with_task(waiting))
            .unwrap();

        let summary = h
            .scheduler(SchedulerOptions::default().with_workers(2))
            .run(&graph, &["slow", "broken", "waiting"])
            .await
            .unwrap();

        assert_eq!(summary.total(), 3);
        assert_eq!(failure_kind(&summary, "broken"), Some(FailureKind::Fault));
        assert_eq!(status(&summary, "slow"), TaskStatus::Succeeded);
        assert_eq!(h.calls("slow"), 1);
        assert_eq!(failure_kind(&summary, "waiting"), Some(FailureKind::Halted));
        assert_eq!(h.calls("waiting"), 0);
        assert_eq!(summary.failure_category, Some(FailureKind::Fault));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_halt_on_action_failure_drains_running_task() {
        let mut h = Harness::new();
        let (started_tx, started_rx) = std::sync::mpsc::channel::<()>();
        let started_tx = std::sync::Mutex::new(started_tx);
        let slow = h.with_outcome("slow", move |_| {
            let _ = started_tx.lock().unwrap().send(());
            std::thread::sleep(Duration::from_millis(200));
            Ok(ActionOutput::success(""))
        });
        let started_rx = std::sync::Mutex::new(started_rx);
        let broken = h.with_outcome("broken", move |ctx| {
            started_rx
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5))
                .unwrap();
            failing(ctx)
        });
        let waiting = h.counting("waiting");
        let graph = TaskGraph::new()
            .with_task(slow)
            .and_then(|g| g.with_task(broken))
            .and_then(|g| g.with_task(waiting))
            .unwrap();

        let summary = h
            .scheduler(SchedulerOptions::default().with_workers(2))
            .run(&graph, &["slow", "broken", "waiting"])
            .await
            .unwrap();

        assert_eq!(failure_kind(&summary, "broken"), Some(FailureKind::Action));
        assert_eq!(status(&summary, "slow"), TaskStatus::Succeeded);
        assert_eq!(h.calls("slow"), 1);
        assert_eq!(failure_kind(&summary, "waiting"), Some(FailureKind::Halted));
        assert_eq!(h.calls("waiting"), 0);
    }

    #[tokio::test]
    async fn test_graph_errors_abort_before_dispatch() {
        let mut h = Harness::new();
        let a = h.counting("a").with_depends_on("b");
        let b = h.counting("b").with_depends_on("a");
        let graph = TaskGraph::new()
            .with_task(a)
            .and_then(|g| g.with_task(b))
            .unwrap();
        let scheduler = h.default_scheduler();

        let err = scheduler.run(&graph, &["a"]).await.unwrap_err();
        assert!(matches!(err, GraphError::CycleDetected(_)));

        let err = scheduler.run(&graph, &["missing"]).await.unwrap_err();
        assert!(matches!(err, GraphError::UnknownTask { .. }));
        assert!(h.reporter.events().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_bound_is_respected() {
        let mut h = Harness::new();
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));
        let names = ["t1", "t2", "t3", "t4", "t5", "t6"];

        let mut graph = TaskGraph::new();
        for name in names {
            let active = active.clone();
            let peak = peak.clone();
            let task = h.with_outcome(name, move |_| {
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(30));
                active.fetch_sub(1, Ordering::SeqCst);
                Ok(ActionOutput::success(""))
            });
            graph.add_task(task).unwrap();
        }

        let summary = h
            .scheduler(SchedulerOptions::default().with_workers(2))
            .run(&graph, &names[..])
            .await
            .unwrap();

        assert_eq!(summary.succeeded, 6);
        assert!(peak.load(Ordering::SeqCst) <= 2);
        assert!(peak.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_options_from_settings() {
        let settings = Settings {
            workers: Some(3),
            mode: FailureMode::BestEffort,
            rebuild_dependents: false,
            ..Default::default()
        };
        let options = SchedulerOptions::from_settings(&settings, "/project");
        assert_eq!(options.workers, 3);
        assert_eq!(options.mode, FailureMode::BestEffort);
        assert!(!options.rebuild_dependents);
        assert_eq!(options.root_dir, PathBuf::from("/project"));
    }
}
