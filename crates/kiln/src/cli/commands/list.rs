//! List command

use std::collections::BTreeMap;

use clap::Args;
use console::style;
use tracing::info;

use kiln_core::TaskConfig;

use crate::cli::{output, Cli, OutputFormat};

const UNGROUPED: &str = "other";

/// List declared tasks by group
#[derive(Debug, Args)]
pub struct ListCommand {
    /// Only show tasks in this group
    #[arg(long)]
    pub group: Option<String>,
}

impl ListCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(group = ?self.group, "executing list command");
        let project = cli.load_project()?;
        let groups = group_tasks(&project.config.tasks, self.group.as_deref());

        if cli.format == OutputFormat::Json {
            let json: BTreeMap<_, Vec<_>> = groups
                .iter()
                .map(|(group, tasks)| {
                    let entries = tasks
                        .iter()
                        .map(|t| {
                            serde_json::json!({
                                "name": t.name,
                                "description": t.description,
                                "depends_on": t.depends_on,
                            })
                        })
                        .collect();
                    (*group, entries)
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&json)?);
            return Ok(());
        }

        if cli.quiet {
            return Ok(());
        }

        if groups.is_empty() {
            output::warning("No tasks declared");
            return Ok(());
        }

        for (group, tasks) in &groups {
            println!("{}", output::header(&format!("{} tasks", capitalize(group))));
            println!("{}", style("-".repeat(group.len() + 6)).dim());
            for task in tasks {
                let mut line = output::task_style().apply_to(&task.name).to_string();
                if let Some(description) = &task.description {
                    line.push_str(&format!(" - {}", description));
                }
                println!("{}", line);
                if cli.verbose && !task.depends_on.is_empty() {
                    println!(
                        "{}",
                        output::key_value("after", &task.depends_on.join(", "))
                    );
                }
            }
            println!();
        }

        Ok(())
    }
}

/// Tasks keyed by group, declaration order kept within each group
fn group_tasks<'a>(
    tasks: &'a [TaskConfig],
    only: Option<&str>,
) -> BTreeMap<&'a str, Vec<&'a TaskConfig>> {
    let mut groups: BTreeMap<&str, Vec<&TaskConfig>> = BTreeMap::new();
    for task in tasks {
        let group = task.group.as_deref().unwrap_or(UNGROUPED);
        if only.is_some_and(|g| g != group) {
            continue;
        }
        groups.entry(group).or_default().push(task);
    }
    groups
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
