//! kiln tasks - incremental task orchestration engine
//!
//! This crate resolves a graph of named build tasks, fingerprints their
//! inputs to skip work that is up to date, and runs the rest in parallel on a
//! bounded worker pool with fail-fast propagation.

pub mod action;
pub mod executor;
pub mod fingerprint;
pub mod graph;
pub mod report;
pub mod reporter;
pub mod scheduler;
pub mod store;
pub mod task;

pub use action::{
    Action, ActionContext, ActionError, ActionOutput, FnAction, NoopAction, ProgramAction,
    ShellAction,
};
pub use executor::{ExecutorFault, TaskExecutor};
pub use fingerprint::{ChangeReason, Fingerprint, FingerprintError, Freshness, InputFingerprinter};
pub use graph::{GraphError, TaskGraph};
pub use report::{
    BuildStatus, BuildSummary, ExecutionResult, FailureKind, ReportCollector, TaskFailure,
    TaskStatus,
};
pub use reporter::{CollectingReporter, FanoutReporter, TaskEvent, TaskReporter, TracingReporter};
pub use scheduler::{Scheduler, SchedulerOptions};
pub use store::{
    FileStore, FingerprintStore, MemoryStore, PruneStats, StoreError, StoreStats, StoredFingerprint,
};
pub use task::{Task, TaskId};
