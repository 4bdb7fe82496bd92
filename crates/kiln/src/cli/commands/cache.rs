//! Cache management command

use std::time::Duration;

use clap::{Args, Subcommand};
use console::style;
use tracing::info;

use kiln_tasks::FileStore;

use crate::cli::{output, Cli, OutputFormat};
use crate::exit_codes::Cancelled;

/// Fingerprint cache management
#[derive(Debug, Args)]
pub struct CacheCommand {
    #[command(subcommand)]
    pub action: CacheAction,
}

/// Cache subcommands
#[derive(Debug, Subcommand)]
pub enum CacheAction {
    /// Remove fingerprints recorded before a cutoff
    Prune(CachePruneCommand),
    /// Show store location, size and recorded tasks
    Status(CacheStatusCommand),
    /// Forget every recorded fingerprint so all tasks run again
    Clean(CacheCleanCommand),
}

/// Remove old fingerprints
#[derive(Debug, Args)]
pub struct CachePruneCommand {
    /// Maximum age in days (default: 7)
    #[arg(long, default_value = "7")]
    pub max_age_days: u64,
}

/// Show store statistics
#[derive(Debug, Args)]
pub struct CacheStatusCommand {
    /// List each recorded task
    #[arg(long)]
    pub entries: bool,
}

/// Clear all recorded fingerprints
#[derive(Debug, Args)]
pub struct CacheCleanCommand {
    /// Skip confirmation
    #[arg(short = 'y', long)]
    pub yes: bool,
}

impl CacheCommand {
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        let project = cli.load_project_or_default()?;
        let store = FileStore::new(project.root.join(&project.config.settings.cache.dir));
        info!(dir = %store.dir().display(), "executing cache command");

        match &self.action {
            CacheAction::Prune(cmd) => cmd.execute(cli, &store),
            CacheAction::Status(cmd) => cmd.execute(cli, &store),
            CacheAction::Clean(cmd) => cmd.execute(cli, &store),
        }
    }
}

impl CachePruneCommand {
    fn execute(&self, cli: &Cli, store: &FileStore) -> anyhow::Result<()> {
        let max_age = max_age(self.max_age_days);

        if cli.text_output() {
            output::info(&format!(
                "Pruning fingerprints older than {} days...",
                self.max_age_days
            ));
        }

        let stats = store.prune(max_age)?;

        if cli.format == OutputFormat::Json {
            let result = serde_json::json!({
                "total": stats.total,
                "removed": stats.removed,
                "kept": stats.kept,
            });
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if !cli.quiet {
            println!(
                "  {} Removed {} of {} records ({} kept)",
                style("✓").green(),
                stats.removed,
                stats.total,
                stats.kept
            );
        }

        Ok(())
    }
}

/// Days as a duration, saturating so huge ages keep everything
fn max_age(days: u64) -> Duration {
    days.checked_mul(24 * 60 * 60)
        .map(Duration::from_secs)
        .unwrap_or(Duration::MAX)
}

impl CacheStatusCommand {
    fn execute(&self, cli: &Cli, store: &FileStore) -> anyhow::Result<()> {
        let stats = store.status()?;
        let entries = if self.entries {
            store.entries()?
        } else {
            Vec::new()
        };

        if cli.format == OutputFormat::Json {
            let mut result = serde_json::json!({
                "entries": stats.entries,
                "total_size": stats.total_size,
                "total_size_formatted": stats.formatted_size(),
                "cache_dir": store.dir().display().to_string(),
            });
            if self.entries {
                result["records"] = serde_json::to_value(&entries)?;
            }
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else if !cli.quiet {
            println!("{}", output::header("Fingerprint Store Status"));
            println!();
            let location = output::path_style().apply_to(store.dir().display());
            println!("{}", output::key_value("Location", &location.to_string()));
            println!("{}", output::key_value("Records", &stats.entries.to_string()));
            println!(
                "{}",
                output::key_value("Size", &style(stats.formatted_size()).yellow().to_string())
            );

            if !entries.is_empty() {
                println!();
                for record in &entries {
                    println!(
                        "  {} {} {}",
                        output::task_style().apply_to(&record.task),
                        style(record.fingerprint.short()).dim(),
                        style(&record.recorded_at).dim()
                    );
                }
            }
        }

        Ok(())
    }
}

impl CacheCleanCommand {
    fn execute(&self, cli: &Cli, store: &FileStore) -> anyhow::Result<()> {
        if !store.dir().exists() {
            if !cli.quiet {
                output::success("Nothing recorded yet.");
            }
            return Ok(());
        }

        if !self.yes {
            let confirmed = dialoguer::Confirm::new()
                .with_prompt(format!(
                    "Forget all recorded fingerprints at {}?",
                    store.dir().display()
                ))
                .default(false)
                .interact()?;

            if !confirmed {
                return Err(Cancelled.into());
            }
        }

        let removed = store.clear()?;

        if cli.format == OutputFormat::Json {
            println!("{}", serde_json::json!({ "removed": removed }));
        } else if !cli.quiet {
            output::success(&format!(
                "Removed {} from {}",
                output::plural(removed, "record"),
                output::path_style().apply_to(store.dir().display())
            ));
        }

        Ok(())
    }
}
