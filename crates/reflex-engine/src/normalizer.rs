//! Conversion of raw inbound payloads into [`TriggerEvent`]s.

use chrono::{DateTime, Utc};
use reflex_core::types::TriggerType;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::EngineError;
use crate::schedule::epoch_minute;
use crate::types::TriggerEvent;

/// Raw comment notification from a social platform.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CommentPayload {
    pub workspace_id: String,
    pub agent_id: Option<String>,
    pub platform: String,
    pub comment_id: String,
    pub post_id: Option<String>,
    pub text: String,
    pub author_id: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

/// Raw inbound direct message evaluated against keyword rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct KeywordPayload {
    pub workspace_id: String,
    pub agent_id: Option<String>,
    pub platform: String,
    pub message_id: String,
    pub text: String,
    pub sender_id: Option<String>,
    pub sender_name: Option<String>,
    pub sender_email: Option<String>,
    pub occurred_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TickPayload {
    pub workspace_id: String,
    pub agent_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ManualPayload {
    pub workspace_id: String,
    pub agent_id: Option<String>,
    pub rule_id: String,
    pub recipient_override: Option<String>,
}

/// Any inbound stimulus, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RawTrigger {
    Comment(CommentPayload),
    Keyword(KeywordPayload),
    Tick(TickPayload),
    Manual(ManualPayload),
}

/// Normalize any raw trigger. `now` stands in for a missing occurrence time
/// and is the reference instant of ticks.
pub fn normalize(raw: RawTrigger, now: DateTime<Utc>) -> Result<TriggerEvent, EngineError> {
    match raw {
        RawTrigger::Comment(p) => normalize_comment(p, now),
        RawTrigger::Keyword(p) => normalize_keyword(p, now),
        RawTrigger::Tick(p) => normalize_tick(p, now),
        RawTrigger::Manual(p) => normalize_manual(p, now),
    }
}

pub fn normalize_comment(
    payload: CommentPayload,
    now: DateTime<Utc>,
) -> Result<TriggerEvent, EngineError> {
    let workspace_id = required(&payload.workspace_id, "workspaceId")?;
    let comment_id = required(&payload.comment_id, "commentId")?;

    Ok(TriggerEvent {
        workspace_id,
        agent_id: optional(payload.agent_id),
        trigger_type: TriggerType::Comment,
        platform: platform_or_unknown(&payload.platform),
        content: Some(payload.text),
        author_id: optional(payload.author_id),
        author_name: optional(payload.author_name),
        author_email: optional(payload.author_email),
        post_id: optional(payload.post_id),
        comment_id: Some(comment_id.clone()),
        event_id: comment_id,
        occurred_at: payload.occurred_at.unwrap_or(now),
        explicit_rule_id: None,
        recipient_override: None,
    })
}

pub fn normalize_keyword(
    payload: KeywordPayload,
    now: DateTime<Utc>,
) -> Result<TriggerEvent, EngineError> {
    let workspace_id = required(&payload.workspace_id, "workspaceId")?;
    let message_id = required(&payload.message_id, "messageId")?;

    Ok(TriggerEvent {
        workspace_id,
        agent_id: optional(payload.agent_id),
        trigger_type: TriggerType::Keyword,
        platform: platform_or_unknown(&payload.platform),
        content: Some(payload.text),
        author_id: optional(payload.sender_id),
        author_name: optional(payload.sender_name),
        author_email: optional(payload.sender_email),
        post_id: None,
        comment_id: None,
        event_id: message_id,
        occurred_at: payload.occurred_at.unwrap_or(now),
        explicit_rule_id: None,
        recipient_override: None,
    })
}

/// A scheduler tick. Its event id names the wall-clock minute.
pub fn normalize_tick(payload: TickPayload, now: DateTime<Utc>) -> Result<TriggerEvent, EngineError> {
    let workspace_id = required(&payload.workspace_id, "workspaceId")?;

    Ok(TriggerEvent {
        workspace_id,
        agent_id: optional(payload.agent_id),
        trigger_type: TriggerType::Time,
        platform: "scheduler".to_string(),
        content: None,
        author_id: None,
        author_name: None,
        author_email: None,
        post_id: None,
        comment_id: None,
        event_id: format!("schedule:{}", epoch_minute(now)),
        occurred_at: now,
        explicit_rule_id: None,
        recipient_override: None,
    })
}

pub fn normalize_manual(
    payload: ManualPayload,
    now: DateTime<Utc>,
) -> Result<TriggerEvent, EngineError> {
    let workspace_id = required(&payload.workspace_id, "workspaceId")?;
    let rule_id = required(&payload.rule_id, "ruleId")?;

    Ok(TriggerEvent {
        workspace_id,
        agent_id: optional(payload.agent_id),
        trigger_type: TriggerType::Manual,
        platform: "manual".to_string(),
        content: None,
        author_id: None,
        author_name: None,
        author_email: None,
        post_id: None,
        comment_id: None,
        event_id: format!("manual:{}", Uuid::new_v4()),
        occurred_at: now,
        explicit_rule_id: Some(rule_id),
        recipient_override: optional(payload.recipient_override),
    })
}

fn required(value: &str, field: &str) -> Result<String, EngineError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EngineError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Blank strings count as absent.
fn optional(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn platform_or_unknown(platform: &str) -> String {
    let trimmed = platform.trim();
    if trimmed.is_empty() {
        "unknown".to_string()
    } else {
        trimmed.to_string()
    }
}
