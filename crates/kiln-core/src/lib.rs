//! kiln core - configuration and error types
//!
//! This crate holds the strongly typed task configuration records, config
//! discovery and validation, and the configuration error taxonomy shared by
//! the task engine and the CLI.

pub mod config;
pub mod error;

pub use config::{CacheConfig, Config, FailureMode, InputConfig, Settings, TaskConfig};
pub use error::{ConfigError, KilnError, Result};
