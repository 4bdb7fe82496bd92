//! Validate command

use std::path::Path;

use clap::Args;
use console::style;
use tracing::info;

use kiln_core::{Config, InputConfig};
use kiln_tasks::TaskGraph;

use crate::cli::{Cli, OutputFormat};

/// Validate the configuration and task graph
#[derive(Debug, Args)]
pub struct ValidateCommand {
    /// Strict mode - treat warnings as errors
    #[arg(long)]
    pub strict: bool,
}

impl ValidateCommand {
    /// Execute the validate command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(strict = self.strict, "executing validate command");

        let mut errors: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        // Returned so the exit code reflects the error category
        let mut first_error: Option<anyhow::Error> = None;

        let project = match cli.load_project() {
            Ok(project) => Some(project),
            Err(e) => {
                errors.push(format!("Configuration: {:#}", e));
                first_error = Some(e);
                None
            }
        };

        let mut task_count = 0;
        if let Some(project) = &project {
            match TaskGraph::from_config(&project.config.tasks) {
                Ok(graph) => {
                    task_count = graph.len();
                    warnings.extend(input_warnings(&project.config, &project.root));
                }
                Err(e) => {
                    errors.push(format!("Task graph: {}", e));
                    first_error.get_or_insert_with(|| e.into());
                }
            }
        }

        // If strict, promote warnings to errors
        if self.strict {
            errors.append(&mut warnings);
        }

        let passed = errors.is_empty();
        let config_path = project.as_ref().and_then(|p| p.config_path.clone());

        match cli.format {
            OutputFormat::Json => {
                let output = serde_json::json!({
                    "valid": passed,
                    "config_path": config_path.map(|p| p.to_string_lossy().to_string()),
                    "tasks": task_count,
                    "errors": errors,
                    "warnings": warnings
                });
                println!("{}", serde_json::to_string_pretty(&output)?);
            }
            OutputFormat::Text => {
                if !cli.quiet {
                    println!("{}", style("Validation Results").bold());
                    println!();

                    if let Some(path) = &config_path {
                        println!("Config: {}", style(path.display()).cyan());
                        println!("Tasks:  {}", task_count);
                        println!();
                    }

                    if !errors.is_empty() {
                        println!("{}", style("Errors:").red().bold());
                        for error in &errors {
                            println!("  {} {}", style("✗").red(), error);
                        }
                        println!();
                    }

                    if !warnings.is_empty() {
                        println!("{}", style("Warnings:").yellow().bold());
                        for warning in &warnings {
                            println!("  {} {}", style("!").yellow(), warning);
                        }
                        println!();
                    }

                    if passed {
                        if warnings.is_empty() {
                            println!("{}", style("✓ All checks passed").green().bold());
                        } else {
                            println!(
                                "{} with {} warning(s)",
                                style("✓ Validation passed").green().bold(),
                                warnings.len()
                            );
                        }
                    } else {
                        println!(
                            "{} with {} error(s)",
                            style("✗ Validation failed").red().bold(),
                            errors.len()
                        );
                    }
                }
            }
        }

        if passed {
            return Ok(());
        }
        Err(first_error.unwrap_or_else(|| {
            anyhow::anyhow!("validation failed with {} error(s)", errors.len())
        }))
    }
}

/// Inputs that would make fingerprinting weaker than intended
fn input_warnings(config: &Config, root: &Path) -> Vec<String> {
    let mut warnings = Vec::new();
    for task in &config.tasks {
        let runs_something = task.command.is_some() || task.program.is_some();
        if runs_something && task.inputs.is_empty() && !task.always_run {
            warnings.push(format!(
                "Task '{}' declares no inputs; it only reruns when its command changes",
                task.name
            ));
        }
        for input in &task.inputs {
            if let InputConfig::File(path) | InputConfig::Dir(path) = input {
                if !root.join(path).exists() {
                    warnings.push(format!(
                        "Task '{}' input '{}' does not exist; the task will always run",
                        task.name,
                        path.display()
                    ));
                }
            }
        }
    }
    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use kiln_core::TaskConfig;
    use tempfile::TempDir;

    #[test]
    fn test_input_warnings() {
        let temp = TempDir::new().unwrap();
        std::fs::create_dir_all(temp.path().join("src")).unwrap();

        let config = Config {
            tasks: vec![
                TaskConfig::new("compile")
                    .with_command("javac")
                    .with_input(InputConfig::Dir("src".into())),
                TaskConfig::new("javadoc").with_command("javadoc"),
                TaskConfig::new("test")
                    .with_command("junit")
                    .with_input(InputConfig::File("missing.properties".into())),
                TaskConfig::new("check").with_depends_on("test"),
            ],
            ..Default::default()
        };

        let warnings = input_warnings(&config, temp.path());
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].contains("javadoc"));
        assert!(warnings[1].contains("missing.properties"));
    }
}
