//! Configuration system for QueryLens
//!
//! Supports loading configuration from:
//! 1. Explicit path passed by the caller
//! 2. ~/.config/querylens/config.{QUERYLENS_ENV}.json
//! 3. Default values
//!
//! Where QUERYLENS_ENV can be: production (default), development, test
//!
//! # Examples
//!
//! ## Loading Configuration
//!
//! ```no_run
//! use querylens::config::AppConfig;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! // Load with default priority
//! let config = AppConfig::load(None)?;
//! println!("Upload ceiling: {} bytes", config.upload.max_file_bytes);
//!
//! // Load from specific file
//! let config = AppConfig::load(Some("./my-config.json".as_ref()))?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Environment Variables
//!
//! Environment variables override config file values:
//! - QUERYLENS_MAX_UPLOAD_BYTES
//! - QUERYLENS_AGENT_TIMEOUT_MS
//! - QUERYLENS_MAX_RETRIES

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config JSON: {0}")]
    ParseError(#[from] serde_json::Error),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

/// Upload intake limits
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Hard ceiling on uploaded file size in bytes
    #[serde(default = "default_max_file_bytes")]
    pub max_file_bytes: u64,

    /// Accepted lowercase file extensions
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
}

fn default_max_file_bytes() -> u64 {
    50 * 1024 * 1024
}

fn default_allowed_extensions() -> Vec<String> {
    vec!["csv".to_string(), "tsv".to_string(), "txt".to_string()]
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: default_max_file_bytes(),
            allowed_extensions: default_allowed_extensions(),
        }
    }
}

/// Per-agent execution settings used by the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Timeout raced against every agent execution, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    /// Additional attempts after a retryable failure
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,

    /// Base backoff between retries, doubled per attempt, in milliseconds
    #[serde(default = "default_backoff_ms")]
    pub retry_backoff_ms: u64,
}

fn default_timeout_ms() -> u64 {
    30_000
}

fn default_max_retries() -> usize {
    2
}

fn default_backoff_ms() -> u64 {
    200
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
            retry_backoff_ms: default_backoff_ms(),
        }
    }
}

/// Confidence thresholds for the routing decision table
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    /// At or above this classification confidence, route semantic-only
    #[serde(default = "default_semantic_threshold")]
    pub semantic_threshold: f64,

    /// Below this confidence, the LLM answers alone
    #[serde(default = "default_hybrid_floor")]
    pub hybrid_floor: f64,

    /// Below this confidence, the planner emits an LLM fallback plan
    #[serde(default = "default_planner_floor")]
    pub planner_floor: f64,
}

fn default_semantic_threshold() -> f64 {
    0.7
}

fn default_hybrid_floor() -> f64 {
    0.3
}

fn default_planner_floor() -> f64 {
    0.7
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            semantic_threshold: default_semantic_threshold(),
            hybrid_floor: default_hybrid_floor(),
            planner_floor: default_planner_floor(),
        }
    }
}

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upload intake limits
    #[serde(default)]
    pub upload: UploadConfig,

    /// Agent execution settings
    #[serde(default)]
    pub agent: AgentConfig,

    /// Routing thresholds
    #[serde(default)]
    pub routing: RoutingConfig,
}

impl AppConfig {
    /// Load configuration from file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: AppConfig = serde_json::from_str(&content)?;

        // Apply environment variable overrides
        config.apply_env_overrides();

        // Validate
        config.validate()?;

        Ok(config)
    }

    /// Load configuration with standard priority:
    /// 1. Explicit path
    /// 2. ~/.config/querylens/config.{QUERYLENS_ENV}.json
    /// 3. Defaults
    pub fn load(explicit_path: Option<&Path>) -> Result<Self, ConfigError> {
        // Try explicit path first
        if let Some(path) = explicit_path {
            if path.exists() {
                crate::log_info!("Loading config from: {:?}", path);
                return Self::from_file(path);
            } else {
                return Err(ConfigError::ValidationError(format!(
                    "Config file not found: {:?}",
                    path
                )));
            }
        }

        // Try standard location with environment
        let env = std::env::var("QUERYLENS_ENV").unwrap_or_else(|_| "production".to_string());

        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir
                .join("querylens")
                .join(format!("config.{}.json", env));

            if config_path.exists() {
                crate::log_info!("Loading config from: {:?}", config_path);
                return Self::from_file(&config_path);
            }
        }

        // Fallback to defaults with env overrides
        crate::log_info!("Using default configuration with environment overrides");
        let mut config = Self::default();
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) {
        if let Ok(value) = std::env::var("QUERYLENS_MAX_UPLOAD_BYTES") {
            if let Ok(bytes) = value.parse() {
                self.upload.max_file_bytes = bytes;
            }
        }

        if let Ok(value) = std::env::var("QUERYLENS_AGENT_TIMEOUT_MS") {
            if let Ok(ms) = value.parse() {
                self.agent.timeout_ms = ms;
            }
        }

        if let Ok(value) = std::env::var("QUERYLENS_MAX_RETRIES") {
            if let Ok(retries) = value.parse() {
                self.agent.max_retries = retries;
            }
        }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.upload.max_file_bytes == 0 {
            return Err(ConfigError::ValidationError(
                "max_file_bytes must be greater than 0".to_string(),
            ));
        }

        if self.upload.allowed_extensions.is_empty() {
            return Err(ConfigError::ValidationError(
                "allowed_extensions cannot be empty".to_string(),
            ));
        }

        if self.agent.timeout_ms == 0 {
            return Err(ConfigError::ValidationError(
                "timeout_ms must be greater than 0".to_string(),
            ));
        }

        if !(0.0..=1.0).contains(&self.routing.semantic_threshold)
            || !(0.0..=1.0).contains(&self.routing.hybrid_floor)
            || !(0.0..=1.0).contains(&self.routing.planner_floor)
        {
            return Err(ConfigError::ValidationError(
                "routing thresholds must be within [0.0, 1.0]".to_string(),
            ));
        }

        if self.routing.hybrid_floor > self.routing.semantic_threshold {
            return Err(ConfigError::ValidationError(
                "hybrid_floor cannot exceed semantic_threshold".to_string(),
            ));
        }

        Ok(())
    }

    /// Get the config directory path
    pub fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("querylens"))
    }

    /// Save configuration to file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
