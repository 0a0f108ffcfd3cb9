use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::Result;

/// Top-level configuration for the Reflex automation engine.
///
/// Loaded from `~/.reflex/config.toml` by default. Every section is optional
/// and falls back to its defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReflexConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub composer: ComposerConfig,
    #[serde(default)]
    pub reply: ReplyConfig,
}

impl ReflexConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ReflexConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, falling back to defaults if the
    /// file does not exist or cannot be parsed.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                warn!(
                    "Failed to load config from {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Save the current configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Data directory holding the SQLite database.
    pub data_dir: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            data_dir: "~/.reflex/data".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Dispatch tuning for the engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Upper bound for a single composer, DM, or reply call.
    pub action_timeout_ms: u64,
    /// Upper bound for a single webhook attempt.
    pub webhook_timeout_ms: u64,
    /// Pause between webhook attempts.
    pub retry_delay_ms: u64,
    /// Reply text used when neither the template nor the rule yields any.
    pub default_fallback_text: String,
    /// Header carrying the outbound webhook signature.
    pub signature_header: String,
    /// Response bodies are truncated to this many bytes before logging.
    pub max_logged_body_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            action_timeout_ms: 10_000,
            webhook_timeout_ms: 10_000,
            retry_delay_ms: 1_000,
            default_fallback_text: "Thanks for reaching out! We'll get back to you shortly."
                .to_string(),
            signature_header: "X-Reflex-Signature".to_string(),
            max_logged_body_bytes: 4096,
        }
    }
}

/// Periodic time-trigger evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// Seconds between ticks. Cron granularity is one minute.
    pub tick_interval_secs: u64,
    /// Workspace/agent scopes evaluated on every tick.
    pub targets: Vec<TickTarget>,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            tick_interval_secs: 60,
            targets: Vec::new(),
        }
    }
}

/// One workspace (and optionally one agent) the ticker evaluates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickTarget {
    pub workspace_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
}

/// Language-generation service used for AI-drafted replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposerConfig {
    /// OpenAI-compatible chat completions endpoint.
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "REFLEX_COMPOSER_API_KEY".to_string(),
        }
    }
}

/// Social platform API used to post public replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReplyConfig {
    /// Base URL; replies are posted to `{endpoint}/posts/{post_id}/comments/{comment_id}/replies`.
    pub endpoint: String,
    /// Name of the environment variable holding the bearer token.
    pub token_env: String,
}

impl Default for ReplyConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:8700".to_string(),
            token_env: "REFLEX_REPLY_TOKEN".to_string(),
        }
    }
}
