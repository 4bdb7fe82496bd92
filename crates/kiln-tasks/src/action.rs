//! Actions: the opaque work a task performs
//!
//! The orchestrator only sees an exit outcome and captured text. Anything
//! that can be expressed as an [`Action`] (a compiler invocation, a doc
//! generator, a test runner, an in-process closure) can back a task.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;

use crate::reporter::{TaskEvent, TaskReporter};
use crate::task::TaskId;

/// What an action reported after running
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionOutput {
    /// Whether the action considers itself successful
    pub success: bool,
    /// Process exit code, if the action was a process
    pub exit_code: Option<i32>,
    /// Captured standard output
    pub stdout: String,
    /// Captured standard error
    pub stderr: String,
}

impl ActionOutput {
    /// A successful outcome with the given output
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            success: true,
            exit_code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// A failed outcome with the given error text
    pub fn failure(exit_code: Option<i32>, stderr: impl Into<String>) -> Self {
        Self {
            success: false,
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// One-line description of a failure
    pub fn failure_message(&self) -> String {
        let last_line = self
            .stderr
            .lines()
            .rev()
            .find(|line| !line.trim().is_empty())
            .map(str::trim);
        match (self.exit_code, last_line) {
            (Some(code), Some(line)) => format!("exited with code {}: {}", code, line),
            (Some(code), None) => format!("exited with code {}", code),
            (None, Some(line)) => line.to_string(),
            (None, None) => "action reported failure".to_string(),
        }
    }
}

/// The action could not be invoked at all
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    /// The process could not be started
    #[error("failed to spawn '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The process started but could not be awaited
    #[error("failed to wait for '{program}': {source}")]
    Wait {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The action panicked
    #[error("action panicked: {0}")]
    Panicked(String),

    /// Any other invocation problem
    #[error("{0}")]
    Other(String),
}

/// Everything an action may need while running
#[derive(Clone)]
pub struct ActionContext {
    /// The task being executed
    pub task: TaskId,
    /// Project root; relative paths are resolved against it
    pub root_dir: PathBuf,
    reporter: Arc<dyn TaskReporter>,
}

impl fmt::Debug for ActionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActionContext")
            .field("task", &self.task)
            .field("root_dir", &self.root_dir)
            .finish_non_exhaustive()
    }
}

impl ActionContext {
    pub fn new(task: TaskId, root_dir: PathBuf, reporter: Arc<dyn TaskReporter>) -> Self {
        Self {
            task,
            root_dir,
            reporter,
        }
    }

    /// Stream one line of output to the reporter
    pub fn output_line(&self, line: &str, is_stderr: bool) {
        self.reporter.report(&TaskEvent::Output {
            id: self.task.clone(),
            line: line.to_string(),
            is_stderr,
        });
    }

    fn resolve(&self, dir: Option<&Path>) -> PathBuf {
        match dir {
            Some(dir) => self.root_dir.join(dir),
            None => self.root_dir.clone(),
        }
    }
}

/// Capability interface for the work behind a task
#[async_trait]
pub trait Action: Send + Sync {
    /// Stable description of what runs; part of the task fingerprint
    fn describe(&self) -> String;

    /// Run the action once.
    ///
    /// `Ok` with `success == false` is an action failure; `Err` means the
    /// action could not be invoked.
    async fn run(&self, ctx: &ActionContext) -> Result<ActionOutput, ActionError>;
}

/// Aggregate task with no work of its own
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAction;

#[async_trait]
impl Action for NoopAction {
    fn describe(&self) -> String {
        "<aggregate>".to_string()
    }

    async fn run(&self, _ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        Ok(ActionOutput::success(""))
    }
}

/// Shell command run through `sh -c` (`cmd /C` on Windows)
#[derive(Debug, Clone)]
pub struct ShellAction {
    command: String,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
}

impl ShellAction {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }
}

#[async_trait]
impl Action for ShellAction {
    fn describe(&self) -> String {
        describe_with_env(&self.command, &self.env)
    }

    async fn run(&self, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let (shell, flag) = if cfg!(windows) { ("cmd", "/C") } else { ("sh", "-c") };
        let mut command = Command::new(shell);
        command.arg(flag).arg(&self.command);
        run_process(
            shell,
            command,
            &self.env,
            &ctx.resolve(self.working_dir.as_deref()),
            ctx,
        )
        .await
    }
}

/// Program invoked directly with arguments, no shell involved
#[derive(Debug, Clone)]
pub struct ProgramAction {
    program: String,
    args: Vec<String>,
    env: BTreeMap<String, String>,
    working_dir: Option<PathBuf>,
}

impl ProgramAction {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: BTreeMap::new(),
            working_dir: None,
        }
    }

    pub fn with_env(mut self, env: BTreeMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_working_dir(mut self, dir: Option<PathBuf>) -> Self {
        self.working_dir = dir;
        self
    }
}

#[async_trait]
impl Action for ProgramAction {
    fn describe(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        describe_with_env(&line, &self.env)
    }

    async fn run(&self, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        run_process(
            &self.program,
            command,
            &self.env,
            &ctx.resolve(self.working_dir.as_deref()),
            ctx,
        )
        .await
    }
}

type ActionFn = dyn Fn(&ActionContext) -> Result<ActionOutput, ActionError> + Send + Sync;

/// Synchronous closure run on the blocking thread pool
#[derive(Clone)]
pub struct FnAction {
    label: String,
    func: Arc<ActionFn>,
}

impl FnAction {
    pub fn new<F>(label: impl Into<String>, func: F) -> Self
    where
        F: Fn(&ActionContext) -> Result<ActionOutput, ActionError> + Send + Sync + 'static,
    {
        Self {
            label: label.into(),
            func: Arc::new(func),
        }
    }
}

impl fmt::Debug for FnAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnAction")
            .field("label", &self.label)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Action for FnAction {
    fn describe(&self) -> String {
        format!("<fn:{}>", self.label)
    }

    async fn run(&self, ctx: &ActionContext) -> Result<ActionOutput, ActionError> {
        let func = Arc::clone(&self.func);
        let ctx = ctx.clone();
        tokio::task::spawn_blocking(move || func(&ctx))
            .await
            .map_err(|e| ActionError::Panicked(e.to_string()))?
    }
}

fn describe_with_env(line: &str, env: &BTreeMap<String, String>) -> String {
    if env.is_empty() {
        return line.to_string();
    }
    let vars: Vec<String> = env.iter().map(|(k, v)| format!("{}={}", k, v)).collect();
    format!("{} [env: {}]", line, vars.join(" "))
}

async fn run_process(
    program: &str,
    mut command: Command,
    env: &BTreeMap<String, String>,
    dir: &Path,
    ctx: &ActionContext,
) -> Result<ActionOutput, ActionError> {
    let mut child = command
        .envs(env)
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| ActionError::Spawn {
            program: program.to_string(),
            source,
        })?;

    let stdout = child.stdout.take();
    let stderr = child.stderr.take();

    // Drain both pipes concurrently.
    let (stdout_lines, stderr_lines) =
        tokio::join!(read_lines(stdout, ctx, false), read_lines(stderr, ctx, true));

    let status = child.wait().await.map_err(|source| ActionError::Wait {
        program: program.to_string(),
        source,
    })?;

    Ok(ActionOutput {
        success: status.success(),
        exit_code: status.code(),
        stdout: stdout_lines.join("\n"),
        stderr: stderr_lines.join("\n"),
    })
}

async fn read_lines<R>(handle: Option<R>, ctx: &ActionContext, is_stderr: bool) -> Vec<String>
where
    R: AsyncRead + Unpin,
{
    let mut collected = Vec::new();
    if let Some(handle) = handle {
        let mut lines = BufReader::new(handle).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            ctx.output_line(&line, is_stderr);
            collected.push(line);
        }
    }
    collected
}
