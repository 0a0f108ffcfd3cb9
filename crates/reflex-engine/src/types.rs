use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use reflex_core::types::{ActionType, AutomationRule, TriggerType};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, ErrorKind};

// =============================================================================
// Events
// =============================================================================

/// Canonical form of anything that can cause rules to fire.
///
/// Produced by the normalizer and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerEvent {
    pub workspace_id: String,
    pub agent_id: Option<String>,
    pub trigger_type: TriggerType,
    pub platform: String,
    pub content: Option<String>,
    pub author_id: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub post_id: Option<String>,
    pub comment_id: Option<String>,
    /// Stable identifier of the inbound occurrence.
    pub event_id: String,
    pub occurred_at: DateTime<Utc>,
    /// Manual events only: the single rule to run.
    pub explicit_rule_id: Option<String>,
    /// Manual events only: recipient replacing the author.
    pub recipient_override: Option<String>,
}

// =============================================================================
// Trigger configuration
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeywordTrigger {
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeTrigger {
    /// One-time mode: RFC 3339 instant, or a naive local time in `timezone`.
    #[serde(default)]
    pub scheduled_time: Option<String>,
    /// Recurring mode: five-field cron expression.
    #[serde(default)]
    pub cron_pattern: Option<String>,
    /// IANA zone name. Defaults to UTC.
    #[serde(default)]
    pub timezone: Option<String>,
}

/// A rule's trigger config, interpreted against its trigger type.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerSpec {
    Comment(KeywordTrigger),
    Keyword(KeywordTrigger),
    Time(TimeTrigger),
    Manual,
}

impl TriggerSpec {
    pub fn from_rule(rule: &AutomationRule) -> Result<Self, EngineError> {
        let trigger_type: TriggerType = rule
            .trigger_type
            .parse()
            .map_err(|e: String| EngineError::Validation(format!("rule {}: {}", rule.id, e)))?;

        Ok(match trigger_type {
            TriggerType::Comment => {
                TriggerSpec::Comment(parse_config(rule, &rule.trigger_config, "trigger")?)
            }
            TriggerType::Keyword => {
                TriggerSpec::Keyword(parse_config(rule, &rule.trigger_config, "trigger")?)
            }
            TriggerType::Time => {
                TriggerSpec::Time(parse_config(rule, &rule.trigger_config, "trigger")?)
            }
            TriggerType::Manual => TriggerSpec::Manual,
        })
    }
}

// =============================================================================
// Action configuration
// =============================================================================

/// Config shared by the direct-message and public-reply actions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageAction {
    #[serde(default)]
    pub message_template: Option<String>,
    #[serde(default, rename = "useAI", alias = "useAi")]
    pub use_ai: bool,
    #[serde(default, rename = "aiPrompt")]
    pub ai_prompt: Option<String>,
    #[serde(default)]
    pub fallback_text: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmailAction {
    /// Explicit recipient; wins over everything else.
    #[serde(default)]
    pub to: Option<String>,
    /// Last-resort recipient when the event carries no address.
    #[serde(default)]
    pub recipient_email: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAction {
    pub url: String,
    #[serde(default = "default_method")]
    pub method: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    /// Payload template. Every string leaf is rendered.
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
    #[serde(default)]
    pub sign_payload: bool,
    #[serde(default)]
    pub retry_count: u32,
}

fn default_method() -> String {
    "POST".to_string()
}

/// A rule's action config, interpreted against its action type.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionSpec {
    SendDm(MessageAction),
    SendPublicReply(MessageAction),
    SendEmail(EmailAction),
    SendWebhook(WebhookAction),
}

impl ActionSpec {
    pub fn from_rule(rule: &AutomationRule) -> Result<Self, EngineError> {
        let action_type: ActionType = rule
            .action_type
            .parse()
            .map_err(|e: String| EngineError::Validation(format!("rule {}: {}", rule.id, e)))?;

        Ok(match action_type {
            ActionType::SendDm => {
                ActionSpec::SendDm(parse_config(rule, &rule.action_config, "action")?)
            }
            ActionType::SendPublicReply => {
                ActionSpec::SendPublicReply(parse_config(rule, &rule.action_config, "action")?)
            }
            ActionType::SendEmail => {
                ActionSpec::SendEmail(parse_config(rule, &rule.action_config, "action")?)
            }
            ActionType::SendWebhook => {
                ActionSpec::SendWebhook(parse_config(rule, &rule.action_config, "action")?)
            }
        })
    }

    pub fn action_type(&self) -> ActionType {
        match self {
            ActionSpec::SendDm(_) => ActionType::SendDm,
            ActionSpec::SendPublicReply(_) => ActionType::SendPublicReply,
            ActionSpec::SendEmail(_) => ActionType::SendEmail,
            ActionSpec::SendWebhook(_) => ActionType::SendWebhook,
        }
    }
}

/// Deserialize one config object. A missing (null) config reads as `{}`.
fn parse_config<T: DeserializeOwned>(
    rule: &AutomationRule,
    raw: &serde_json::Value,
    which: &str,
) -> Result<T, EngineError> {
    let value = if raw.is_null() {
        serde_json::Value::Object(serde_json::Map::new())
    } else {
        raw.clone()
    };
    serde_json::from_value(value).map_err(|e| {
        EngineError::Validation(format!("rule {}: invalid {} config: {}", rule.id, which, e))
    })
}

// =============================================================================
// Outcomes
// =============================================================================

/// What a successful action did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    DirectMessage,
    PublicReply,
    EmailQueued,
    Webhook { status: u16 },
}

/// Per-rule result of one dispatch attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    pub rule_id: String,
    pub ok: bool,
    pub replied: bool,
    #[serde(rename = "sentDM")]
    pub sent_dm: bool,
    pub email_queued: bool,
    pub webhook_called: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ExecutionOutcome {
    fn blank(rule_id: &str) -> Self {
        Self {
            rule_id: rule_id.to_string(),
            ok: false,
            replied: false,
            sent_dm: false,
            email_queued: false,
            webhook_called: false,
            error: None,
            message: None,
        }
    }

    pub fn delivered(rule_id: &str, delivery: Delivery) -> Self {
        let mut outcome = Self::blank(rule_id);
        outcome.ok = true;
        match delivery {
            Delivery::DirectMessage => outcome.sent_dm = true,
            Delivery::PublicReply => outcome.replied = true,
            Delivery::EmailQueued => outcome.email_queued = true,
            Delivery::Webhook { status } => {
                outcome.webhook_called = true;
                outcome.message = Some(format!("webhook responded with status {}", status));
            }
        }
        outcome
    }

    pub fn failed(rule_id: &str, err: &EngineError) -> Self {
        let mut outcome = Self::blank(rule_id);
        outcome.error = Some(err.kind());
        outcome.message = Some(err.to_string());
        outcome
    }

    /// The pair was already handled; nothing was performed.
    pub fn duplicate(rule_id: &str, event_id: &str) -> Self {
        Self::failed(
            rule_id,
            &EngineError::DuplicateExecution {
                event_id: event_id.to_string(),
                rule_id: rule_id.to_string(),
            },
        )
    }

    pub fn is_duplicate(&self) -> bool {
        self.error == Some(ErrorKind::DuplicateExecution)
    }
}

/// Aggregate counts over one invocation's outcomes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duplicates: usize,
    pub replied: usize,
    #[serde(rename = "sentDM")]
    pub sent_dm: usize,
    pub email_queued: usize,
    pub webhook_called: usize,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[ExecutionOutcome]) -> Self {
        let mut summary = Self {
            total: outcomes.len(),
            ..Self::default()
        };
        for o in outcomes {
            if o.ok {
                summary.succeeded += 1;
            } else if o.is_duplicate() {
                summary.duplicates += 1;
            } else {
                summary.failed += 1;
            }
            summary.replied += usize::from(o.replied);
            summary.sent_dm += usize::from(o.sent_dm);
            summary.email_queued += usize::from(o.email_queued);
            summary.webhook_called += usize::from(o.webhook_called);
        }
        summary
    }
}
