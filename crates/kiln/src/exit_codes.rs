//! Exit codes for the CLI

use kiln_core::KilnError;
use kiln_tasks::{FailureKind, GraphError};

/// Success
pub const SUCCESS: i32 = 0;

/// General error
pub const ERROR: i32 = 1;

/// Configuration error (invalid config, unknown task, dependency cycle)
pub const CONFIG_ERROR: i32 = 2;

/// At least one task failed
pub const TASK_FAILED: i32 = 3;

/// A task's action could not be invoked
pub const EXECUTOR_FAULT: i32 = 4;

/// User cancelled
pub const CANCELLED: i32 = 130;

/// The build finished with failed tasks
#[derive(Debug, thiserror::Error)]
#[error("{} failed", task_count(.failed))]
pub struct BuildFailed {
    pub failed: usize,
    pub category: Option<FailureKind>,
}

fn task_count(n: &usize) -> String {
    if *n == 1 {
        "1 task".to_string()
    } else {
        format!("{} tasks", n)
    }
}

/// The user declined a confirmation prompt
#[derive(Debug, thiserror::Error)]
#[error("Aborted")]
pub struct Cancelled;

/// Map an error to the exit code of its category
pub fn for_error(err: &anyhow::Error) -> i32 {
    if let Some(build) = err.downcast_ref::<BuildFailed>() {
        return match build.category {
            Some(FailureKind::Fault) => EXECUTOR_FAULT,
            _ => TASK_FAILED,
        };
    }
    if err.downcast_ref::<GraphError>().is_some() {
        return CONFIG_ERROR;
    }
    if let Some(kiln) = err.downcast_ref::<KilnError>() {
        if kiln.is_config() {
            return CONFIG_ERROR;
        }
    }
    if err.downcast_ref::<Cancelled>().is_some() {
        return CANCELLED;
    }
    ERROR
}
