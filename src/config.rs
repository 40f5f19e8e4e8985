//! Configuration module for ccengine.

use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

use crate::{CcError, Result};

/// Script engine configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Wall-clock budget for one invocation in seconds.
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Maximum number of VM instructions per invocation (0 = unlimited).
    #[serde(default)]
    pub max_instructions: u64,
    /// Maximum Lua heap size in megabytes (0 = unlimited).
    #[serde(default = "default_max_memory")]
    pub max_memory_mb: usize,
}

fn default_timeout() -> u64 {
    10
}

fn default_max_memory() -> usize {
    32
}

impl EngineConfig {
    /// Invocation budget as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout(),
            max_instructions: 0,
            max_memory_mb: default_max_memory(),
        }
    }
}

/// Operator review configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewConfig {
    /// Channel receiving scripts flagged by the security scanner.
    #[serde(default)]
    pub channel_id: Option<u64>,
}

/// Authoring limits for custom commands.
#[derive(Debug, Clone, Deserialize)]
pub struct CommandsConfig {
    /// Maximum command name length in characters.
    #[serde(default = "default_max_name_length")]
    pub max_name_length: usize,
    /// Maximum raw snippet length in characters.
    #[serde(default = "default_max_code_length")]
    pub max_code_length: usize,
}

fn default_max_name_length() -> usize {
    32
}

fn default_max_code_length() -> usize {
    4000
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            max_name_length: default_max_name_length(),
            max_code_length: default_max_code_length(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Path to the log file.
    #[serde(default = "default_log_file")]
    pub file: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_file() -> String {
    "logs/ccengine.log".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            file: default_log_file(),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    /// Script engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,
    /// Operator review configuration.
    #[serde(default)]
    pub review: ReviewConfig,
    /// Authoring limits.
    #[serde(default)]
    pub commands: CommandsConfig,
    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(CcError::Io)?;
        Self::parse(&content)
    }

    /// Load configuration from a TOML file and apply environment variable overrides.
    pub fn load_with_env<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| CcError::Config(format!("config parse error: {e}")))
    }

    /// Apply environment variable overrides to the configuration.
    ///
    /// Supported environment variables:
    /// - `CCENGINE_REVIEW_CHANNEL`: Override the review channel id
    pub fn apply_env_overrides(&mut self) {
        if let Ok(channel) = std::env::var("CCENGINE_REVIEW_CHANNEL") {
            if let Ok(id) = channel.trim().parse::<u64>() {
                self.review.channel_id = Some(id);
            }
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<()> {
        if self.engine.timeout_secs == 0 {
            return Err(CcError::Config(
                "engine.timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.commands.max_name_length == 0 {
            return Err(CcError::Config(
                "commands.max_name_length must be greater than zero".to_string(),
            ));
        }
        if self.review.channel_id == Some(0) {
            return Err(CcError::Config("review.channel_id cannot be 0".to_string()));
        }
        Ok(())
    }
}
