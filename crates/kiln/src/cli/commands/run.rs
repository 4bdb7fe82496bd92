//! Run command - build targets and their dependencies

use std::sync::Arc;

use clap::Args;
use console::style;
use tracing::info;

use kiln_core::FailureMode;
use kiln_tasks::{
    BuildSummary, FileStore, FingerprintStore, MemoryStore, Scheduler, SchedulerOptions,
    TaskEvent, TaskGraph, TaskReporter, TaskStatus, TracingReporter,
};

use crate::cli::output;
use crate::cli::{Cli, OutputFormat};
use crate::exit_codes::BuildFailed;

/// Build targets and everything they depend on
#[derive(Debug, Args)]
pub struct RunCommand {
    /// Tasks to build (e.g., javadoc test)
    #[arg(required = true)]
    pub targets: Vec<String>,

    /// What to do after a task fails: halt or best-effort
    #[arg(long)]
    pub mode: Option<FailureMode>,

    /// Maximum concurrently running tasks
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub workers: Option<u64>,

    /// Ignore recorded fingerprints and record nothing
    #[arg(long)]
    pub no_cache: bool,

    /// Do not force dependents of rebuilt tasks to run
    #[arg(long)]
    pub no_rebuild_dependents: bool,
}

impl RunCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let runtime = tokio::runtime::Runtime::new()?;
        runtime.block_on(self.execute_async(cli))
    }

    async fn execute_async(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(targets = ?self.targets, "executing run command");
        let project = cli.load_project()?;
        let settings = &project.config.settings;
        let graph = TaskGraph::from_config(&project.config.tasks)?;

        let mut options = SchedulerOptions::from_settings(settings, project.root.clone());
        if let Some(mode) = self.mode {
            options = options.with_mode(mode);
        }
        if let Some(workers) = self.workers {
            options = options.with_workers(workers as usize);
        }
        if self.no_rebuild_dependents {
            options = options.with_rebuild_dependents(false);
        }

        let store: Arc<dyn FingerprintStore> = if self.no_cache || !settings.cache.enabled {
            Arc::new(MemoryStore::new())
        } else {
            Arc::new(FileStore::new(project.root.join(&settings.cache.dir)))
        };

        let reporter: Arc<dyn TaskReporter> = if cli.text_output() {
            Arc::new(ConsoleReporter::new(cli.verbose))
        } else {
            Arc::new(TracingReporter)
        };

        let scheduler = Scheduler::new(options, store, reporter);
        let summary = scheduler.run(&graph, self.targets.as_slice()).await?;

        if cli.format == OutputFormat::Json {
            println!("{}", serde_json::to_string_pretty(&summary)?);
        } else if !cli.quiet {
            print_failures(&summary);
        }

        if summary.is_success() {
            Ok(())
        } else {
            Err(BuildFailed {
                failed: summary.failed,
                category: summary.failure_category,
            }
            .into())
        }
    }
}

fn print_failures(summary: &BuildSummary) {
    let failed: Vec<_> = summary
        .results
        .iter()
        .filter(|r| r.status == TaskStatus::Failed)
        .collect();
    if failed.is_empty() {
        return;
    }

    println!();
    println!(
        "  {} {}/{} tasks failed:",
        style("✗").red().bold(),
        failed.len(),
        summary.total()
    );
    for result in failed {
        if let Some(failure) = &result.failure {
            println!(
                "    {} {}: {}",
                style("✗").red(),
                result.task,
                style(&failure.message).dim()
            );
        }
    }
}

/// Console reporter with live output
struct ConsoleReporter {
    verbose: bool,
}

impl ConsoleReporter {
    fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl TaskReporter for ConsoleReporter {
    fn report(&self, event: &TaskEvent) {
        match event {
            TaskEvent::Planned { total, workers } => {
                output::info(&format!(
                    "{} on {}",
                    output::plural(*total, "task"),
                    output::plural(*workers, "worker")
                ));
                println!();
            }
            TaskEvent::Started { id, command } => {
                println!(
                    "  {} {} {}",
                    style("▸").dim(),
                    output::task_style().apply_to(id),
                    if self.verbose {
                        style(format!("({})", command)).dim().to_string()
                    } else {
                        String::new()
                    }
                );
            }
            TaskEvent::Output { id, line, is_stderr } => {
                if self.verbose {
                    if *is_stderr {
                        println!("    {} {}", style(format!("[{}]", id)).red().dim(), line);
                    } else {
                        println!("    {} {}", style(format!("[{}]", id)).dim(), line);
                    }
                }
            }
            TaskEvent::Skipped { id, reason } => {
                println!(
                    "  {} {} {}",
                    style("○").cyan(),
                    style(id).cyan(),
                    style(format!("({})", reason)).dim()
                );
            }
            TaskEvent::Completed { id, duration } => {
                println!(
                    "  {} {} {}",
                    style("✓").green(),
                    style(id).green(),
                    output::duration(*duration)
                );
            }
            TaskEvent::Failed {
                id,
                duration,
                error,
            } => {
                println!(
                    "  {} {} {} {}",
                    style("✗").red(),
                    style(id).red(),
                    output::duration(*duration),
                    style(error).red().dim()
                );
            }
            TaskEvent::Warning { id, message } => {
                println!(
                    "  {} {} {}",
                    style("!").yellow().bold(),
                    style(id).yellow(),
                    style(message).yellow()
                );
            }
            TaskEvent::Halted { reason } => {
                println!(
                    "  {} {}",
                    style("■").red().bold(),
                    style(format!("Halting: {}, waiting for running tasks", reason)).red()
                );
            }
            TaskEvent::Finished {
                total,
                succeeded,
                skipped,
                failed,
                duration,
            } => {
                println!();
                println!(
                    "  {} {}/{} succeeded, {} up to date, {} failed ({:.1}s)",
                    if *failed == 0 {
                        style("✓").green().bold()
                    } else {
                        style("✗").red().bold()
                    },
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
