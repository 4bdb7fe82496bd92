//! Task types and definitions

use std::borrow::Borrow;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use kiln_core::{InputConfig, TaskConfig};

use crate::action::{Action, NoopAction, ProgramAction, ShellAction};

/// Unique identifier (name) of a task
#[derive(Debug, Clone, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(String);

impl TaskId {
    /// Create a new task ID
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Borrow<str> for TaskId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskId {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for TaskId {
    fn from(name: String) -> Self {
        Self(name)
    }
}

/// A named, cacheable unit of build work
#[derive(Clone)]
pub struct Task {
    /// Task identifier
    pub id: TaskId,
    /// One-line description for listings
    pub description: Option<String>,
    /// Listing group
    pub group: Option<String>,
    /// Declared inputs, in declaration order
    pub inputs: Vec<InputConfig>,
    /// Declared outputs
    pub outputs: Vec<PathBuf>,
    /// Tasks that must reach a terminal state first
    pub depends_on: Vec<TaskId>,
    /// Never skipped by the fingerprint check
    pub always_run: bool,
    /// An action failure becomes a warning
    pub ignore_failures: bool,
    /// Outputs are deleted before the action runs
    pub clean_outputs: bool,
    /// The work itself
    pub action: Arc<dyn Action>,
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("inputs", &self.inputs)
            .field("outputs", &self.outputs)
            .field("depends_on", &self.depends_on)
            .field("always_run", &self.always_run)
            .field("ignore_failures", &self.ignore_failures)
            .field("clean_outputs", &self.clean_outputs)
            .field("action", &self.action.describe())
            .finish()
    }
}

impl Task {
    /// Create a task with the given action and no inputs or dependencies
    pub fn new(name: impl Into<String>, action: impl Action + 'static) -> Self {
        Self {
            id: TaskId::new(name),
            description: None,
            group: None,
            inputs: Vec::new(),
            outputs: Vec::new(),
            depends_on: Vec::new(),
            always_run: false,
            ignore_failures: false,
            clean_outputs: false,
            action: Arc::new(action),
        }
    }

    /// Build a task from its configuration record
    pub fn from_config(config: &TaskConfig) -> Self {
        let working_dir = config.working_dir.clone();
        let action: Arc<dyn Action> = match (&config.command, &config.program) {
            (Some(command), _) => Arc::new(
                ShellAction::new(command.clone())
                    .with_env(config.env.clone())
                    .with_working_dir(working_dir),
            ),
            (None, Some(program)) => Arc::new(
                ProgramAction::new(program.clone(), config.args.clone())
                    .with_env(config.env.clone())
                    .with_working_dir(working_dir),
            ),
            (None, None) => Arc::new(NoopAction),
        };

        let mut task = Self {
            id: TaskId::new(config.name.clone()),
            description: config.description.clone(),
            group: config.group.clone(),
            inputs: config.inputs.clone(),
            outputs: config.outputs.clone(),
            depends_on: Vec::new(),
            always_run: config.always_run,
            ignore_failures: config.ignore_failures,
            clean_outputs: config.clean_outputs,
            action,
        };
        for dep in &config.depends_on {
            task = task.with_depends_on(dep.as_str());
        }
        task
    }

    pub fn name(&self) -> &str {
        self.id.as_str()
    }

    /// Add a dependency; repeated names are ignored
    pub fn with_depends_on(mut self, dep: impl Into<TaskId>) -> Self {
        let dep = dep.into();
        if !self.depends_on.contains(&dep) {
            self.depends_on.push(dep);
        }
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

    /// Never skip this task
    pub fn always_run(mut self) -> Self {
        self.always_run = true;
        self
    }

    /// Treat action failures as warnings
    pub fn ignore_failures(mut self) -> Self {
        self.ignore_failures = true;
        self
    }

    /// Delete outputs before running
    pub fn clean_outputs(mut self) -> Self {
        self.clean_outputs = true;
        self
    }

    pub(crate) fn dedup_dependencies(&mut self) {
        let mut seen = HashSet::new();
        self.depends_on.retain(|dep| seen.insert(dep.clone()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_id_display() {
        let id = TaskId::new("javadoc");
        assert_eq!(id.to_string(), "javadoc");
        assert_eq!(id.as_str(), "javadoc");
    }

    #[test]
    fn test_task_builder() {
        let task = Task::new("delombok", NoopAction)
            .with_depends_on("compile")
            .with_depends_on("compile")
            .with_input(InputConfig::Dir("src/main/java".into()))
            .with_output("build/delombok")
            .clean_outputs();

        assert_eq!(task.name(), "delombok");
        assert_eq!(task.depends_on, vec![TaskId::new("compile")]);
        assert_eq!(task.outputs, vec![PathBuf::from("build/delombok")]);
        assert!(task.clean_outputs);
        assert!(!task.always_run);
    }

    #[test]
    fn test_from_config_shell_command() {
        let config = TaskConfig::new("compile")
            .with_command("javac Main.java")
            .with_depends_on("generate")
            .always_run();
        let task = Task::from_config(&config);

        assert_eq!(task.id, TaskId::new("compile"));
        assert!(task.always_run);
        assert_eq!(task.depends_on, vec![TaskId::new("generate")]);
        assert!(task.action.describe().contains("javac Main.java"));
    }

    #[test]
    fn test_from_config_program() {
        let mut config = TaskConfig::new("docs");
        config.program = Some("javadoc".to_string());
        config.args = vec!["-d".to_string(), "build/docs".to_string()];
        let task = Task::from_config(&config);

        assert!(task.action.describe().starts_with("javadoc -d build/docs"));
    }

    #[test]
    fn test_from_config_without_command_is_aggregate() {
        let config = TaskConfig::new("check")
            .with_depends_on("test")
            .with_depends_on("coverage");
        let task = Task::from_config(&config);

        assert_eq!(task.action.describe(), NoopAction.describe());
        assert_eq!(task.depends_on.len(), 2);
    }
}
