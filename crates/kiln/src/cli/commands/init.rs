//! Init command

use std::path::PathBuf;

use clap::{Args, ValueEnum};
use console::style;
use dialoguer::Confirm;
use tracing::info;

use kiln_core::config::defaults::{
    DEFAULT_CONFIG_TEMPLATE, DEFAULT_CONFIG_TOML, DEFAULT_CONFIG_YAML, DEFAULT_CONFIG_YAML_TEMPLATE,
};

use crate::cli::{output, Cli};
use crate::exit_codes::Cancelled;

/// Initialize a new kiln configuration
#[derive(Debug, Args)]
pub struct InitCommand {
    /// Force overwrite existing configuration
    #[arg(short, long)]
    pub force: bool,

    /// Never prompt; fail instead of asking to overwrite
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// Configuration format
    #[arg(long = "config-format", value_enum, default_value = "toml")]
    pub config_format: ConfigFormat,

    /// Output file path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Configuration file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ConfigFormat {
    Toml,
    Yaml,
}

impl ConfigFormat {
    fn file_name(self) -> &'static str {
        match self {
            ConfigFormat::Toml => DEFAULT_CONFIG_TOML,
            ConfigFormat::Yaml => DEFAULT_CONFIG_YAML,
        }
    }

    fn template(self) -> &'static str {
        match self {
            ConfigFormat::Toml => DEFAULT_CONFIG_TEMPLATE,
            ConfigFormat::Yaml => DEFAULT_CONFIG_YAML_TEMPLATE,
        }
    }
}

impl InitCommand {
    /// Execute the init command
    pub fn execute(&self, cli: &Cli) -> anyhow::Result<()> {
        info!(force = self.force, format = ?self.config_format, "executing init command");
        let cwd = std::env::current_dir()?;
        let config_path = self
            .output
            .clone()
            .unwrap_or_else(|| cwd.join(self.config_format.file_name()));

        if config_path.exists() && !self.force {
            if self.yes {
                anyhow::bail!(
                    "Configuration file already exists at {}. Use --force to overwrite.",
                    config_path.display()
                );
            }

            let overwrite = Confirm::new()
                .with_prompt(format!(
                    "Configuration file already exists at {}. Overwrite?",
                    config_path.display()
                ))
                .default(false)
                .interact()?;

            if !overwrite {
                return Err(Cancelled.into());
            }
        }

        std::fs::write(&config_path, self.config_format.template())?;

        if !cli.quiet {
            println!(
                "{} Created configuration at {}",
                style("✓").green().bold(),
                output::path_style().apply_to(config_path.display())
            );
            println!();
            println!("Next steps:");
            println!("  1. Edit {} to describe your build tasks", config_path.display());
            println!("  2. Run {} to check the task graph", style("kiln validate").cyan());
            println!("  3. Run {} to build", style("kiln run <task>").cyan());
        }

        Ok(())
    }
}
