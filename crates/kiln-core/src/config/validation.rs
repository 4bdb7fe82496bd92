//! Configuration validation

use std::collections::HashSet;

use tracing::debug;

use crate::error::{ConfigError, Result};

use super::types::{Config, InputConfig, TaskConfig};

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    debug!(tasks = config.tasks.len(), "validating configuration");
    validate_settings(config)?;
    validate_tasks(&config.tasks)?;
    debug!("configuration validation passed");
    Ok(())
}

fn validate_settings(config: &Config) -> Result<()> {
    if config.settings.workers == Some(0) {
        return Err(ConfigError::InvalidValue {
            field: "settings.workers".to_string(),
            message: "must be at least 1".to_string(),
        }
        .into());
    }

    if config.settings.cache.enabled && config.settings.cache.dir.as_os_str().is_empty() {
        return Err(ConfigError::InvalidValue {
            field: "settings.cache.dir".to_string(),
            message: "cache directory cannot be empty".to_string(),
        }
        .into());
    }

    Ok(())
}

fn validate_tasks(tasks: &[TaskConfig]) -> Result<()> {
    let mut names = HashSet::new();
    for task in tasks {
        validate_task_name(&task.name)?;
        if !names.insert(task.name.as_str()) {
            return Err(ConfigError::DuplicateTask(task.name.clone()).into());
        }
    }

    for task in tasks {
        for dep in &task.depends_on {
            if dep == &task.name {
                return Err(ConfigError::InvalidValue {
                    field: format!("tasks.{}.depends_on", task.name),
                    message: "a task cannot depend on itself".to_string(),
                }
                .into());
            }
            if !names.contains(dep.as_str()) {
                return Err(ConfigError::UnknownDependency {
                    task: task.name.clone(),
                    dependency: dep.clone(),
                }
                .into());
            }
        }

        if task.command.is_some() && task.program.is_some() {
            return Err(ConfigError::InvalidValue {
                field: format!("tasks.{}", task.name),
                message: "set either 'command' or 'program', not both".to_string(),
            }
            .into());
        }

        if task.program.is_none() && !task.args.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: format!("tasks.{}.args", task.name),
                message: "'args' requires 'program'".to_string(),
            }
            .into());
        }

        if let Some(command) = &task.command {
            if command.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: format!("tasks.{}.command", task.name),
                    message: "command cannot be empty".to_string(),
                }
                .into());
            }
        }

        for input in &task.inputs {
            validate_input(&task.name, input)?;
        }
    }

    Ok(())
}

fn validate_task_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
    if !valid {
        return Err(ConfigError::InvalidValue {
            field: "tasks.name".to_string(),
            message: format!(
                "'{}' must be non-empty and use only letters, digits, '_', '-', '.' or ':'",
                name
            ),
        }
        .into());
    }
    Ok(())
}

fn validate_input(task: &str, input: &InputConfig) -> Result<()> {
    let empty = match input {
        InputConfig::File(path) | InputConfig::Dir(path) => path.as_os_str().is_empty(),
        InputConfig::Glob(pattern) => pattern.trim().is_empty(),
        InputConfig::Value { key, .. } => key.trim().is_empty(),
    };
    if empty {
        return Err(ConfigError::InvalidValue {
            field: format!("tasks.{}.inputs", task),
            message: "input paths, patterns and value keys cannot be empty".to_string(),
        }
        .into());
    }
    Ok(())
}
