//! Collaborator interfaces the engine calls out to.
//!
//! Everything behind these traits is external to the automation core:
//! persistence, language generation, message delivery, and raw HTTP.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{AutomationRule, DmDestination, QueuedEmail, WebhookCallLog};

/// Record store for rules, idempotency markers, and action side tables.
#[async_trait]
pub trait RuleStore: Send + Sync {
    /// Enabled rules of `workspace_id` whose agent is unset or equals `agent_id`.
    async fn get_enabled_rules(
        &self,
        workspace_id: &str,
        agent_id: Option<&str>,
    ) -> Result<Vec<AutomationRule>>;

    /// Compare-and-set `last_executed_at`.
    ///
    /// Writes `at` only if the stored value still equals `previous`, and
    /// returns whether the write happened.
    async fn update_rule_last_executed(
        &self,
        rule_id: &str,
        previous: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<bool>;

    async fn insert_queued_email(&self, email: &QueuedEmail) -> Result<()>;

    async fn log_webhook_call(&self, call: &WebhookCallLog) -> Result<()>;

    /// Whether the pair has a committed (processed) marker.
    async fn is_event_processed(&self, event_id: &str, rule_id: &str) -> Result<bool>;

    /// Atomically create a claimed marker. Returns `false` if any marker for
    /// the pair already exists.
    async fn claim_event(&self, event_id: &str, rule_id: &str) -> Result<bool>;

    /// Promote the pair's marker to processed.
    async fn mark_event_processed(&self, event_id: &str, rule_id: &str) -> Result<()>;

    /// Drop a claimed marker. Processed markers are left untouched.
    async fn release_event(&self, event_id: &str, rule_id: &str) -> Result<()>;
}

/// Context handed to the language-generation service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptContext {
    pub workspace_id: String,
    pub agent_id: Option<String>,
    pub platform: String,
    pub rule_name: String,
    /// Rendered rule-level instructions, empty when the rule has none.
    pub prompt: String,
    /// The inbound text being answered.
    pub content: String,
    pub author_name: Option<String>,
}

/// Language-generation service drafting reply text.
#[async_trait]
pub trait MessageComposer: Send + Sync {
    async fn compose(&self, context: &PromptContext) -> Result<String>;
}

#[async_trait]
pub trait DmSender: Send + Sync {
    async fn send_direct_message(&self, destination: &DmDestination, text: &str) -> Result<()>;
}

#[async_trait]
pub trait ReplyPoster: Send + Sync {
    async fn post_reply(&self, post_id: &str, comment_id: &str, text: &str) -> Result<()>;
}

/// A fully built outbound request. `body` is sent byte-for-byte.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: String,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Raw HTTP transport. Any received response is `Ok`, whatever its status;
/// only transport failures are errors.
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn request(&self, request: &HttpRequest) -> Result<HttpResponse>;
}
