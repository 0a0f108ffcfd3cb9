//! CLI argument definitions for the `reflex` binary.
//!
//! Priority resolution: CLI args > env vars > config file > defaults.

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Reflex - rule-driven auto-replies, emails, and webhooks for social inboxes.
#[derive(Parser, Debug)]
#[command(name = "reflex", version, about)]
pub struct CliArgs {
    /// Path to the configuration file.
    #[arg(short = 'c', long = "config", env = "REFLEX_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Data directory holding the SQLite database.
    #[arg(short = 'd', long = "data-dir", global = true)]
    pub data_dir: Option<PathBuf>,

    /// Log level or filter directive (trace, debug, info, warn, error).
    #[arg(short = 'l', long = "log-level", env = "REFLEX_LOG", global = true)]
    pub log_level: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Evaluate time rules every tick until Ctrl-C.
    Run,
    /// Evaluate time rules once, now.
    Tick {
        #[arg(short = 'w', long)]
        workspace: String,
        #[arg(short = 'a', long)]
        agent: Option<String>,
    },
    /// Run one rule on demand.
    Manual {
        #[arg(short = 'w', long)]
        workspace: String,
        #[arg(short = 'a', long)]
        agent: Option<String>,
        #[arg(short = 'r', long)]
        rule: String,
        /// Send to this recipient instead of the one the rule would pick.
        #[arg(long)]
        recipient: Option<String>,
    },
    /// Process a raw trigger payload (JSON with a `kind` tag).
    Event {
        #[arg(short = 'f', long)]
        file: PathBuf,
    },
    /// Insert or replace rules from a JSON array.
    Import {
        #[arg(short = 'f', long)]
        file: PathBuf,
    },
}

impl CliArgs {
    /// Resolve the configuration file path.
    ///
    /// Priority: --config flag > REFLEX_CONFIG env var > ~/.reflex/config.toml.
    pub fn resolve_config_path(&self) -> PathBuf {
        self.config.clone().unwrap_or_else(default_config_path)
    }

    /// Resolve the data directory, `None` when the config value applies.
    pub fn resolve_data_dir(&self) -> Option<String> {
        self.data_dir
            .as_ref()
            .map(|p| p.to_string_lossy().to_string())
    }

    /// Resolve the log filter.
    ///
    /// Priority: --log-level flag > REFLEX_LOG env var > config file value.
    pub fn resolve_log_level(&self, config_level: &str) -> String {
        match self.log_level.as_deref().map(str::trim) {
            Some(level) if !level.is_empty() => level.to_string(),
            _ => config_level.to_string(),
        }
    }
}

/// Build the tracing filter: `RUST_LOG` when set and valid, else `level`,
/// else `info`.
pub fn log_filter(rust_log: Option<&str>, level: &str) -> EnvFilter {
    rust_log
        .filter(|v| !v.trim().is_empty())
        .and_then(|v| EnvFilter::try_new(v).ok())
        .or_else(|| EnvFilter::try_new(level).ok())
        .unwrap_or_else(|| EnvFilter::new("info"))
}

/// Default config file path for the current platform.
fn default_config_path() -> PathBuf {
    #[cfg(target_os = "windows")]
    if let Ok(home) = std::env::var("USERPROFILE") {
        return PathBuf::from(home).join(".reflex").join("config.toml");
    }
    #[cfg(not(target_os = "windows"))]
    if let Ok(home) = std::env::var("HOME") {
        return PathBuf::from(home).join(".reflex").join("config.toml");
    }
    PathBuf::from("config.toml")
}
