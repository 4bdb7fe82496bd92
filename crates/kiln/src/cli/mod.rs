//! CLI definition and command handling

pub mod commands;
pub mod output;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use kiln_core::config::{load_config, load_config_from_dir, load_config_or_default, project_root};
use kiln_core::Config;

use commands::{
    CacheCommand, CompletionsCommand, InitCommand, ListCommand, PlanCommand, RunCommand,
    ValidateCommand,
};

/// kiln - incremental build-task orchestrator
#[derive(Debug, Parser)]
#[command(name = "kiln")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Working directory
    #[arg(short = 'C', long, global = true)]
    pub directory: Option<PathBuf>,

    /// Configuration file (default: search upward for kiln.toml / kiln.yaml)
    #[arg(long, global = true, env = "KILN_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Output format for CLI
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    #[default]
    Text,
    /// JSON output
    Json,
}

/// Available commands
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Build targets and everything they depend on
    Run(RunCommand),

    /// Show the execution plan for targets without running anything
    Plan(PlanCommand),

    /// List declared tasks by group
    List(ListCommand),

    /// Validate the configuration and task graph
    Validate(ValidateCommand),

    /// Initialize a new kiln configuration
    Init(InitCommand),

    /// Fingerprint cache management
    Cache(CacheCommand),

    /// Generate shell completions
    Completions(CompletionsCommand),
}

/// Loaded configuration and the directory task paths are relative to
#[derive(Debug)]
pub struct Project {
    pub config: Config,
    pub root: PathBuf,
    pub config_path: Option<PathBuf>,
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> anyhow::Result<()> {
        // Change to specified directory if provided
        if let Some(dir) = &self.directory {
            std::env::set_current_dir(dir)?;
        }

        match self.command {
            Commands::Run(ref cmd) => cmd.execute(&self),
            Commands::Plan(ref cmd) => cmd.execute(&self),
            Commands::List(ref cmd) => cmd.execute(&self),
            Commands::Validate(ref cmd) => cmd.execute(&self),
            Commands::Init(ref cmd) => cmd.execute(&self),
            Commands::Cache(ref cmd) => cmd.execute(&self),
            Commands::Completions(ref cmd) => cmd.execute(&self),
        }
    }

    /// Load the project configuration; a config file must exist
    pub fn load_project(&self) -> anyhow::Result<Project> {
        let cwd = std::env::current_dir()?;
        let (config, path) = match &self.config {
            Some(path) => {
                let path = cwd.join(path);
                (load_config(&path)?, path)
            }
            None => load_config_from_dir(&cwd)?,
        };
        Ok(Project {
            config,
            root: project_root(&path),
            config_path: Some(path),
        })
    }

    /// Load the project configuration, falling back to defaults
    pub fn load_project_or_default(&self) -> anyhow::Result<Project> {
        if self.config.is_some() {
            return self.load_project();
        }
        let cwd = std::env::current_dir()?;
        let (config, path) = load_config_or_default(&cwd)?;
        let root = path.as_deref().map(project_root).unwrap_or(cwd);
        Ok(Project {
            config,
            root,
            config_path: path,
        })
    }

    /// Whether human-readable output should be printed
    pub fn text_output(&self) -> bool {
        !self.quiet && self.format == OutputFormat::Text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from([
            "kiln",
            "run",
            "javadoc",
            "test",
            "--mode",
            "best-effort",
            "--workers",
            "3",
        ]);
        let Commands::Run(run) = cli.command else {
            panic!("expected run command");
        };
        assert_eq!(run.targets, vec!["javadoc", "test"]);
        assert_eq!(run.mode, Some(kiln_core::FailureMode::BestEffort));
        assert_eq!(run.workers, Some(3));
    }

    #[test]
    fn test_parse_global_flags() {
        let cli = Cli::parse_from(["kiln", "--format", "json", "-q", "list"]);
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.quiet);
        assert!(!cli.text_output());
    }

    #[test]
    fn test_relative_config_path_gives_absolute_root() {
        let cwd = std::env::current_dir().unwrap();
        let temp = tempfile::TempDir::new_in(&cwd).unwrap();
        let name = temp.path().file_name().unwrap().to_owned();
        std::fs::write(
            temp.path().join("kiln.toml"),
            "[[tasks]]\nname = \"compile\"\ncommand = \"true\"\n",
        )
        .unwrap();

        let relative = PathBuf::from(name).join("kiln.toml");
        let cli = Cli::parse_from(["kiln", "--config", relative.to_str().unwrap(), "list"]);
        let project = cli.load_project().unwrap();

        assert!(project.root.is_absolute());
        assert_eq!(project.root, temp.path());
        assert_eq!(project.config.tasks.len(), 1);
    }

    #[test]
    fn test_run_requires_targets() {
        assert!(Cli::try_parse_from(["kiln", "run"]).is_err());
        assert!(Cli::try_parse_from(["kiln", "run", "test", "--workers", "0"]).is_err());
    }
}
