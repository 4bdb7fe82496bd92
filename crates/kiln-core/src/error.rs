//! Error types for kiln

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using KilnError
pub type Result<T> = std::result::Result<T, KilnError>;

/// Main error type for kiln configuration and workspace operations
#[derive(Debug, Error)]
pub enum KilnError {
    /// Configuration-related errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic errors
    #[error("{0}")]
    Other(String),
}

/// Configuration-related errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found at {0}")]
    NotFound(PathBuf),

    /// Failed to parse configuration
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Invalid configuration value
    #[error("Invalid configuration: {field} - {message}")]
    InvalidValue { field: String, message: String },

    /// Two tasks share a name
    #[error("Task '{0}' is declared more than once")]
    DuplicateTask(String),

    /// A task depends on a task that is not declared
    #[error("Task '{task}' depends on unknown task '{dependency}'")]
    UnknownDependency { task: String, dependency: String },

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// TOML parsing error
    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    /// IO error
    #[error("IO error reading config: {0}")]
    Io(#[from] std::io::Error),
}

impl KilnError {
    /// Create a new "other" error with a message
    pub fn other<S: Into<String>>(msg: S) -> Self {
        Self::Other(msg.into())
    }

    /// Whether this error stems from invalid or missing configuration
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_is_transparent() {
        let err: KilnError = ConfigError::DuplicateTask("compile".to_string()).into();
        assert!(err.is_config());
        assert_eq!(err.to_string(), "Task 'compile' is declared more than once");
    }

    #[test]
    fn test_unknown_dependency_message() {
        let err = ConfigError::UnknownDependency {
            task: "javadoc".to_string(),
            dependency: "delombok".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Task 'javadoc' depends on unknown task 'delombok'"
        );
    }

    #[test]
    fn test_other_is_not_config() {
        assert!(!KilnError::other("boom").is_config());
    }
}
