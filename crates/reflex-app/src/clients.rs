//! HTTP-backed composer and reply poster.

use async_trait::async_trait;
use reflex_core::config::{ComposerConfig, ReplyConfig};
use reflex_core::error::{ReflexError, Result};
use reflex_core::traits::{MessageComposer, PromptContext, ReplyPoster};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

const SYSTEM_PROMPT: &str = "You write short, friendly replies on behalf of a business. \
Answer in the language of the message. Reply with the message text only.";

fn read_secret(var: &str) -> Option<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => {
            warn!(env = var, "Credential not set; requests will be unauthenticated");
            None
        }
    }
}

fn network(e: reqwest::Error) -> ReflexError {
    ReflexError::Network(e.to_string())
}

// =============================================================================
// Composer
// =============================================================================

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
}

#[derive(Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// [`MessageComposer`] over an OpenAI-compatible chat completions endpoint.
#[derive(Clone)]
pub struct HttpComposer {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: Option<String>,
}

impl HttpComposer {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            model: model.into(),
            api_key,
        }
    }

    /// Build from config, reading the key from the configured env var.
    pub fn from_config(config: &ComposerConfig) -> Self {
        Self::new(&config.endpoint, &config.model, read_secret(&config.api_key_env))
    }

    fn user_message(context: &PromptContext) -> String {
        let mut text = String::new();
        if !context.prompt.is_empty() {
            text.push_str(&context.prompt);
            text.push_str("\n\n");
        }
        text.push_str(&format!("Platform: {}\n", context.platform));
        if let Some(author) = &context.author_name {
            text.push_str(&format!("From: {}\n", author));
        }
        text.push_str(&format!("Message: {}", context.content));
        text
    }
}

#[async_trait]
impl MessageComposer for HttpComposer {
    async fn compose(&self, context: &PromptContext) -> Result<String> {
        let body = ChatRequest {
            model: &self.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: SYSTEM_PROMPT.to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: Self::user_message(context),
                },
            ],
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.map_err(network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReflexError::Network(format!(
                "composer returned status {}",
                status.as_u16()
            )));
        }

        let parsed: ChatResponse = response.json().await.map_err(network)?;
        let draft = parsed
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ReflexError::Network("composer returned no choices".to_string()))?;
        debug!(rule = %context.rule_name, chars = draft.len(), "Reply drafted");
        Ok(draft)
    }
}

// =============================================================================
// Reply poster
// =============================================================================

#[derive(Serialize)]
struct ReplyBody<'a> {
    text: &'a str,
}

/// [`ReplyPoster`] over the platform gateway's REST API.
#[derive(Clone)]
pub struct HttpReplyPoster {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

impl HttpReplyPoster {
    pub fn new(endpoint: impl Into<String>, token: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
        }
    }

    pub fn from_config(config: &ReplyConfig) -> Self {
        Self::new(&config.endpoint, read_secret(&config.token_env))
    }
}

#[async_trait]
impl ReplyPoster for HttpReplyPoster {
    async fn post_reply(&self, post_id: &str, comment_id: &str, text: &str) -> Result<()> {
        let url = format!(
            "{}/posts/{}/comments/{}/replies",
            self.endpoint, post_id, comment_id
        );
        let mut request = self.client.post(&url).json(&ReplyBody { text });
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await.map_err(network)?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReflexError::Network(format!(
                "reply gateway returned status {}",
                status.as_u16()
            )));
        }
        Ok(())
    }
}
