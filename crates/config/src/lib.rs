//! Configuration loading, validation, and management for ClawRun.
//!
//! Loads configuration from `~/.clawrun/config.toml` with environment
//! variable overrides. Validates all settings at startup.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// How the run renders its output on stdout. Fixed for the whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    /// Raw model text, streamed as it arrives
    #[default]
    Text,
    /// One `{response, stats}` object at the end
    Json,
    /// Newline-delimited JSON blocks
    StreamJson,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::StreamJson => "stream-json",
        }
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "json" => Ok(Self::Json),
            "stream-json" | "stream_json" => Ok(Self::StreamJson),
            other => Err(ConfigError::ValidationError(format!(
                "unknown output format '{other}' (expected text, json or stream-json)"
            ))),
        }
    }
}

/// The root configuration structure.
///
/// Maps directly to `~/.clawrun/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Output rendering mode
    #[serde(default)]
    pub output_format: OutputFormat,

    /// Maximum backend round trips per run (-1 = unlimited)
    #[serde(default = "default_max_session_turns")]
    pub max_session_turns: i64,

    /// Verbose logging
    #[serde(default)]
    pub debug: bool,

    /// Model backend settings
    #[serde(default)]
    pub backend: BackendConfig,

    /// Built-in tool settings
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Telemetry settings
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

fn default_max_session_turns() -> i64 {
    -1
}
fn default_api_url() -> String {
    "https://openrouter.ai/api/v1".into()
}
fn default_model() -> String {
    "anthropic/claude-sonnet-4".into()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_true() -> bool {
    true
}

/// Redact a secret string for Debug output.
fn redact(s: &Option<String>) -> &'static str {
    match s {
        Some(_) => "[REDACTED]",
        None => "None",
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Base URL of an OpenAI-compatible endpoint
    #[serde(default = "default_api_url")]
    pub api_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl std::fmt::Debug for BackendConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendConfig")
            .field("api_key", &redact(&self.api_key))
            .field("api_url", &self.api_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            api_url: default_api_url(),
            model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Commands the shell tool may run. Empty = shell tool disabled.
    #[serde(default = "default_allowed_commands")]
    pub allowed_commands: Vec<String>,

    /// Root for relative paths in `@` references and `read_file`.
    /// Defaults to the current directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workspace_root: Option<PathBuf>,
}

fn default_allowed_commands() -> Vec<String> {
    ["ls", "cat", "head", "tail", "wc", "grep", "find", "pwd", "git"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            allowed_commands: default_allowed_commands(),
            workspace_root: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    /// Whether telemetry events are recorded at all
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Append every telemetry event as a JSON line to this file
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outfile: Option<PathBuf>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            outfile: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default path (~/.clawrun/config.toml).
    pub fn load() -> Result<Self, ConfigError> {
        let config_path = Self::config_dir().join("config.toml");
        Self::load_with_env(&config_path)
    }

    /// Load from `path`, then apply environment overrides.
    ///
    /// API key lookup order:
    /// - `CLAWRUN_API_KEY` (highest priority)
    /// - `OPENROUTER_API_KEY`
    /// - `OPENAI_API_KEY`
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load_from(path)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            tracing::debug!("No config file found at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Apply environment overrides through `lookup`.
    fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        if self.backend.api_key.is_none() {
            self.backend.api_key = lookup("CLAWRUN_API_KEY")
                .or_else(|| lookup("OPENROUTER_API_KEY"))
                .or_else(|| lookup("OPENAI_API_KEY"));
        }

        if let Some(url) = lookup("CLAWRUN_API_URL") {
            self.backend.api_url = url;
        }

        if let Some(model) = lookup("CLAWRUN_MODEL") {
            self.backend.model = model;
        }

        if let Some(format) = lookup("CLAWRUN_OUTPUT_FORMAT") {
            self.output_format = format.parse()?;
        }

        if let Some(turns) = lookup("CLAWRUN_MAX_SESSION_TURNS") {
            self.max_session_turns = turns.trim().parse().map_err(|_| {
                ConfigError::ValidationError(format!(
                    "CLAWRUN_MAX_SESSION_TURNS must be an integer, got '{turns}'"
                ))
            })?;
        }

        Ok(())
    }

    /// Get the configuration directory path.
    pub fn config_dir() -> PathBuf {
        dirs_home().join(".clawrun")
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.temperature < 0.0 || self.backend.temperature > 2.0 {
            return Err(ConfigError::ValidationError(
                "backend.temperature must be between 0.0 and 2.0".into(),
            ));
        }

        if self.max_session_turns < -1 {
            return Err(ConfigError::ValidationError(
                "max_session_turns must be -1 (unlimited) or >= 0".into(),
            ));
        }

        Ok(())
    }

    /// Check if an API key is available (from config or environment).
    pub fn has_api_key(&self) -> bool {
        self.backend.api_key.is_some()
    }

    /// Directory relative paths resolve against.
    pub fn workspace_root(&self) -> PathBuf {
        self.tools
            .workspace_root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            output_format: OutputFormat::default(),
            max_session_turns: default_max_session_turns(),
            debug: false,
            backend: BackendConfig::default(),
            tools: ToolsConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

/// Get the user's home directory.
fn dirs_home() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        std::env::var("USERPROFILE")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("C:\\Users\\Default"))
    }
    #[cfg(not(target_os = "windows"))]
    {
        std::env::var("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("/tmp"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {path}: {reason}")]
    ReadError { path: PathBuf, reason: String },

    #[error("Failed to parse config file at {path}: {reason}")]
    ParseError { path: PathBuf, reason: String },

    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}
