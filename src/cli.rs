//! Command-line interface argument parsing.
//!
//! This module handles all CLI argument parsing using clap,
//! including validation and default values.

use clap::Parser;
use std::path::PathBuf;

/// agentping - check that an agent install can authenticate and answer
///
/// Verifies that an agent credential is present in the environment, sends
/// one prompt, and reports whether a text response came back.
///
/// Examples:
///   agentping
///   agentping --prompt "ping" --stream
///   agentping --model claude-sonnet-4-5 --timeout 120
///   agentping --dry-run
///   agentping --format json > result.json
///   agentping --init-config
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Args {
    /// Prompt to send
    ///
    /// Defaults to a short authentication check prompt.
    #[arg(short, long, env = "AGENTPING_PROMPT")]
    pub prompt: Option<String>,

    /// Model to request from the agent
    #[arg(short, long, env = "AGENTPING_MODEL")]
    pub model: Option<String>,

    /// Agent executable to run
    #[arg(long, value_name = "PATH", env = "AGENTPING_EXECUTABLE")]
    pub executable: Option<String>,

    /// Maximum number of agent turns
    #[arg(long, value_name = "N")]
    pub max_turns: Option<u32>,

    /// System prompt override
    #[arg(long, value_name = "TEXT")]
    pub system_prompt: Option<String>,

    /// Tools the agent may use (comma-separated)
    ///
    /// Example: --allowed-tools Read,Write,Bash
    #[arg(long, value_name = "TOOLS", value_delimiter = ',')]
    pub allowed_tools: Option<Vec<String>>,

    /// Give up after this many seconds
    ///
    /// Without it the query runs until the agent finishes or Ctrl+C.
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Print the response as it streams in
    #[arg(short, long)]
    pub stream: bool,

    /// Output format (text, json)
    #[arg(long, default_value = "text", value_name = "FORMAT")]
    pub format: OutputFormat,

    /// Path to configuration file
    ///
    /// If not specified, looks for .agentping.toml in the current directory
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging output
    #[arg(short, long)]
    pub verbose: bool,

    /// Run in quiet mode (minimal output)
    #[arg(short, long)]
    pub quiet: bool,

    /// Only check credentials, don't send a prompt
    #[arg(long)]
    pub dry_run: bool,

    /// Generate a default .agentping.toml configuration file
    #[arg(long)]
    pub init_config: bool,
}

/// Output format for the report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// Human-readable console output (default)
    #[default]
    Text,
    /// JSON report on stdout
    Json,
}

impl Args {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Self::parse()
    }

    /// Validate the parsed arguments.
    pub fn validate(&self) -> Result<(), String> {
        if self.init_config {
            return Ok(());
        }

        if self.verbose && self.quiet {
            return Err("Cannot use both --verbose and --quiet".to_string());
        }

        if let Some(ref prompt) = self.prompt {
            if prompt.trim().is_empty() {
                return Err("Prompt must not be empty".to_string());
            }
        }

        if let Some(ref model) = self.model {
            if model.trim().is_empty() {
                return Err("Model must not be empty".to_string());
            }
        }

        if self.timeout == Some(0) {
            return Err("Timeout must be at least 1 second".to_string());
        }

        if self.max_turns == Some(0) {
            return Err("Max turns must be at least 1".to_string());
        }

        if let Some(ref path) = self.config {
            if !path.is_file() {
                return Err(format!("Config file does not exist: {}", path.display()));
            }
        }

        Ok(())
    }

    /// Whether human-oriented output (headers, spinner) should be shown.
    pub fn is_interactive(&self) -> bool {
        self.format == OutputFormat::Text && !self.quiet
    }
}
