//! Plan command - show what `run` would schedule

use clap::Args;
use console::style;
use tracing::info;

use kiln_tasks::TaskGraph;

use crate::cli::{output, Cli, OutputFormat};

/// Show the execution plan for targets without running anything
#[derive(Debug, Args)]
pub struct PlanCommand {
    /// Tasks to plan
    #[arg(required = true)]
    pub targets: Vec<String>,
}

impl PlanCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(targets = ?self.targets, "executing plan command");
        let project = cli.load_project()?;
        let graph = TaskGraph::from_config(&project.config.tasks)?;
        let waves = graph.waves(self.targets.as_slice())?;

        if cli.format == OutputFormat::Json {
            let plan: Vec<_> = waves
                .iter()
                .enumerate()
                .map(|(i, tasks)| serde_json::json!({ "wave": i, "tasks": tasks }))
                .collect();
            println!("{}", serde_json::to_string_pretty(&plan)?);
            return Ok(());
        }

        if cli.quiet {
            return Ok(());
        }

        let total: usize = waves.iter().map(Vec::len).sum();
        println!(
            "{}",
            output::header(&format!(
                "Plan for {} ({} in {})",
                self.targets.join(", "),
                output::plural(total, "task"),
                output::plural(waves.len(), "wave")
            ))
        );
        println!();
        for line in graph.execution_plan(self.targets.as_slice())?.lines() {
            if line.starts_with("Wave") {
                println!("{}", style(line).bold());
            } else {
                println!("{}", line);
            }
        }

        Ok(())
    }
}
