//! Configuration file handling.
//!
//! This module handles loading and merging configuration from
//! `.agentping.toml` files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File looked up in the working directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = ".agentping.toml";

/// Model requested when nothing else is configured.
pub const DEFAULT_MODEL: &str = "claude-3-5-sonnet-20241022";

/// Prompt used for the authentication check.
pub const DEFAULT_PROMPT: &str =
    r#"Hello! Please respond with just "Authentication successful" if you can read this."#;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// General settings.
    #[serde(default)]
    pub general: GeneralConfig,

    /// Credential lookup settings.
    #[serde(default)]
    pub auth: AuthConfig,

    /// Query settings.
    #[serde(default)]
    pub query: QueryConfig,
}

/// General application settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Enable verbose logging by default.
    #[serde(default)]
    pub verbose: bool,

    /// Print response text as it streams in.
    #[serde(default)]
    pub stream: bool,
}

/// Which environment variables may hold a credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Variables checked in order; the first non-empty one wins.
    #[serde(default = "default_variables")]
    pub variables: Vec<String>,

    /// Characters of the token shown in the environment check.
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            variables: default_variables(),
            preview_chars: default_preview_chars(),
        }
    }
}

fn default_variables() -> Vec<String> {
    crate::credentials::default_variables()
}

fn default_preview_chars() -> usize {
    crate::credentials::DEFAULT_PREVIEW_CHARS
}

/// Agent query settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Model name passed to the agent.
    #[serde(default = "default_model")]
    pub model: String,

    /// Prompt sent to the agent.
    #[serde(default = "default_prompt")]
    pub prompt: String,

    /// Agent executable.
    #[serde(default = "default_executable")]
    pub executable: String,

    /// Arguments placed before the generated ones.
    #[serde(default)]
    pub executable_args: Vec<String>,

    /// Maximum agent turns.
    #[serde(default)]
    pub max_turns: Option<u32>,

    /// System prompt override.
    #[serde(default)]
    pub system_prompt: Option<String>,

    /// Tools the agent may use.
    #[serde(default)]
    pub allowed_tools: Vec<String>,

    /// Extra arguments passed through to the agent.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            prompt: default_prompt(),
            executable: default_executable(),
            executable_args: Vec::new(),
            max_turns: None,
            system_prompt: None,
            allowed_tools: Vec::new(),
            extra_args: Vec::new(),
        }
    }
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_prompt() -> String {
    DEFAULT_PROMPT.to_string()
}

fn default_executable() -> String {
    crate::agent::process::DEFAULT_EXECUTABLE.to_string()
}

impl QueryConfig {
    /// Options forwarded to the agent for each query.
    pub fn options(&self) -> crate::agent::QueryOptions {
        crate::agent::QueryOptions {
            model: self.model.clone(),
            max_turns: self.max_turns,
            system_prompt: self.system_prompt.clone(),
            allowed_tools: self.allowed_tools.clone(),
            extra_args: self.extra_args.clone(),
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Try to load configuration from the default location.
    ///
    /// Returns `Ok(None)` if the file doesn't exist, `Err` if it exists but can't be parsed.
    pub fn load_default() -> Result<Option<Self>> {
        Self::load_from_dir(Path::new("."))
    }

    /// Try to load `.agentping.toml` from `dir`.
    pub fn load_from_dir(dir: &Path) -> Result<Option<Self>> {
        let config_path = dir.join(DEFAULT_CONFIG_FILE);

        if config_path.exists() {
            Ok(Some(Self::load(&config_path)?))
        } else {
            Ok(None)
        }
    }

    /// Merge this configuration with CLI arguments.
    ///
    /// CLI arguments take precedence over config file settings, but only
    /// when they were actually given.
    pub fn merge_with_args(&mut self, args: &crate::cli::Args) {
        if let Some(ref model) = args.model {
            self.query.model = model.clone();
        }
        if let Some(ref prompt) = args.prompt {
            self.query.prompt = prompt.clone();
        }
        if let Some(ref executable) = args.executable {
            self.query.executable = executable.clone();
        }
        if let Some(turns) = args.max_turns {
            self.query.max_turns = Some(turns);
        }
        if let Some(ref system_prompt) = args.system_prompt {
            self.query.system_prompt = Some(system_prompt.clone());
        }
        if let Some(ref tools) = args.allowed_tools {
            self.query.allowed_tools = tools.clone();
        }

        // Flags only switch things on
        if args.verbose {
            self.general.verbose = true;
        }
        if args.stream {
            self.general.stream = true;
        }
    }

    /// Log level after merging: `quiet` wins, then `general.verbose`.
    pub fn log_level(&self, quiet: bool) -> tracing::Level {
        if quiet {
            tracing::Level::ERROR
        } else if self.general.verbose {
            tracing::Level::DEBUG
        } else {
            tracing::Level::WARN
        }
    }

    /// Generate a default configuration file content.
    pub fn default_toml() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_else(|_| String::new())
    }
}
