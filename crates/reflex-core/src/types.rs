use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Enums
// =============================================================================

/// The condition class that makes a rule eligible.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Comment,
    Keyword,
    Time,
    Manual,
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TriggerType::Comment => write!(f, "comment"),
            TriggerType::Keyword => write!(f, "keyword"),
            TriggerType::Time => write!(f, "time"),
            TriggerType::Manual => write!(f, "manual"),
        }
    }
}

impl std::str::FromStr for TriggerType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "comment" => Ok(TriggerType::Comment),
            "keyword" => Ok(TriggerType::Keyword),
            "time" => Ok(TriggerType::Time),
            "manual" => Ok(TriggerType::Manual),
            _ => Err(format!("Unknown trigger type: {}", s)),
        }
    }
}

/// The side-effecting operation a matched rule performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    SendDm,
    SendPublicReply,
    SendEmail,
    SendWebhook,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::SendDm => write!(f, "send_dm"),
            ActionType::SendPublicReply => write!(f, "send_public_reply"),
            ActionType::SendEmail => write!(f, "send_email"),
            ActionType::SendWebhook => write!(f, "send_webhook"),
        }
    }
}

impl std::str::FromStr for ActionType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "send_dm" => Ok(ActionType::SendDm),
            "send_public_reply" => Ok(ActionType::SendPublicReply),
            "send_email" => Ok(ActionType::SendEmail),
            "send_webhook" => Ok(ActionType::SendWebhook),
            _ => Err(format!("Unknown action type: {}", s)),
        }
    }
}

/// Lifecycle of an idempotency marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkerState {
    /// A dispatch is in flight for this (event, rule) pair.
    Claimed,
    /// The dispatch succeeded; the pair must never run again.
    Processed,
}

impl fmt::Display for MarkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkerState::Claimed => write!(f, "claimed"),
            MarkerState::Processed => write!(f, "processed"),
        }
    }
}

// =============================================================================
// Records
// =============================================================================

/// Persisted rule pairing one trigger condition with one action.
///
/// `trigger_type`/`action_type` are kept as the raw stored strings and the
/// configs as raw JSON: a record written by a newer configuration surface must
/// still load, and is rejected only when the engine tries to interpret it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AutomationRule {
    pub id: String,
    pub workspace_id: String,
    #[serde(default)]
    pub agent_id: Option<String>,
    #[serde(default)]
    pub name: String,
    pub trigger_type: String,
    #[serde(default)]
    pub trigger_config: serde_json::Value,
    pub action_type: String,
    #[serde(default)]
    pub action_config: serde_json::Value,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub last_executed_at: Option<DateTime<Utc>>,
}

fn default_enabled() -> bool {
    true
}

impl AutomationRule {
    /// Whether this rule belongs to the given workspace/agent scope.
    ///
    /// A rule without an agent applies to every agent in its workspace; an
    /// agent-specific rule only applies when the same agent is given.
    pub fn in_scope(&self, workspace_id: &str, agent_id: Option<&str>) -> bool {
        if self.workspace_id != workspace_id {
            return false;
        }
        match self.agent_id.as_deref() {
            None => true,
            Some(rule_agent) => agent_id == Some(rule_agent),
        }
    }
}

/// An email waiting for the delivery worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedEmail {
    pub id: Uuid,
    pub rule_id: String,
    pub workspace_id: String,
    pub event_id: Option<String>,
    pub to: String,
    pub subject: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// Audit record for one outbound webhook call sequence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookCallLog {
    pub id: Uuid,
    pub rule_id: String,
    pub event_id: Option<String>,
    pub method: String,
    pub url: String,
    pub status: u16,
    pub body: String,
    pub attempts: u32,
    pub called_at: DateTime<Utc>,
}

/// Where a direct message goes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DmDestination {
    pub workspace_id: String,
    pub agent_id: Option<String>,
    pub platform: String,
    pub recipient_id: String,
}

/// A direct message accepted by the outbound DM store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    pub id: Uuid,
    pub destination: DmDestination,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Tests
// =============================================================================
