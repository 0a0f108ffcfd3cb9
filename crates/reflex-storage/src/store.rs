//! SQLite-backed implementation of the engine's storage collaborators.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, OptionalExtension, Row};
use tracing::warn;
use uuid::Uuid;

use reflex_core::error::{ReflexError, Result};
use reflex_core::traits::{DmSender, RuleStore};
use reflex_core::types::{
    AutomationRule, DmDestination, OutboundMessage, QueuedEmail, WebhookCallLog,
};

use crate::db::Database;

const RULE_COLUMNS: &str = "id, workspace_id, agent_id, name, trigger_type, trigger_config, \
                            action_type, action_config, enabled, last_executed_at";

/// Rule store and outbound DM store over a shared [`Database`].
#[derive(Debug, Clone)]
pub struct SqliteStore {
    db: Arc<Database>,
}

impl SqliteStore {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert or replace a rule record.
    pub fn upsert_rule(&self, rule: &AutomationRule) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO automation_rules (id, workspace_id, agent_id, name, trigger_type,
                     trigger_config, action_type, action_config, enabled, last_executed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT(id) DO UPDATE SET
                     workspace_id = excluded.workspace_id,
                     agent_id = excluded.agent_id,
                     name = excluded.name,
                     trigger_type = excluded.trigger_type,
                     trigger_config = excluded.trigger_config,
                     action_type = excluded.action_type,
                     action_config = excluded.action_config,
                     enabled = excluded.enabled,
                     last_executed_at = excluded.last_executed_at",
                params![
                    rule.id,
                    rule.workspace_id,
                    rule.agent_id,
                    rule.name,
                    rule.trigger_type,
                    rule.trigger_config.to_string(),
                    rule.action_type,
                    rule.action_config.to_string(),
                    rule.enabled as i32,
                    rule.last_executed_at.map(|t| t.timestamp_millis()),
                ],
            )
            .map_err(|e| ReflexError::Storage(format!("Failed to save rule: {}", e)))?;
            Ok(())
        })
    }

    /// Find a rule by ID regardless of its enabled flag.
    pub fn find_rule(&self, id: &str) -> Result<Option<AutomationRule>> {
        self.db.with_conn(|conn| {
            conn.query_row(
                &format!("SELECT {RULE_COLUMNS} FROM automation_rules WHERE id = ?1"),
                params![id],
                row_to_rule,
            )
            .optional()
            .map_err(|e| ReflexError::Storage(e.to_string()))
        })
    }

    /// Emails still waiting for delivery, oldest first.
    pub fn queued_emails(&self) -> Result<Vec<QueuedEmail>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, rule_id, workspace_id, event_id, recipient, subject, body, created_at
                     FROM queued_emails WHERE status = 'queued'
                     ORDER BY created_at ASC",
                )
                .map_err(|e| ReflexError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(QueuedEmail {
                        id: parse_uuid(row.get::<_, String>(0)?),
                        rule_id: row.get(1)?,
                        workspace_id: row.get(2)?,
                        event_id: row.get(3)?,
                        to: row.get(4)?,
                        subject: row.get(5)?,
                        body: row.get(6)?,
                        created_at: millis_to_datetime(row.get(7)?),
                    })
                })
                .map_err(|e| ReflexError::Storage(e.to_string()))?;

            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| ReflexError::Storage(e.to_string()))
        })
    }

    /// Webhook call log for one rule, newest first.
    pub fn webhook_calls(&self, rule_id: &str) -> Result<Vec<WebhookCallLog>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, rule_id, event_id, method, url, status, body, attempts, called_at
                     FROM webhook_calls WHERE rule_id = ?1
                     ORDER BY called_at DESC",
                )
                .map_err(|e| ReflexError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(params![rule_id], |row| {
                    Ok(WebhookCallLog {
                        id: parse_uuid(row.get::<_, String>(0)?),
                        rule_id: row.get(1)?,
                        event_id: row.get(2)?,
                        method: row.get(3)?,
                        url: row.get(4)?,
                        status: row.get(5)?,
                        body: row.get(6)?,
                        attempts: row.get(7)?,
                        called_at: millis_to_datetime(row.get(8)?),
                    })
                })
                .map_err(|e| ReflexError::Storage(e.to_string()))?;

            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| ReflexError::Storage(e.to_string()))
        })
    }

    /// Direct messages accepted for delivery, oldest first.
    pub fn outbound_messages(&self) -> Result<Vec<OutboundMessage>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT id, workspace_id, agent_id, platform, recipient_id, text, created_at
                     FROM outbound_messages ORDER BY created_at ASC",
                )
                .map_err(|e| ReflexError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map([], |row| {
                    Ok(OutboundMessage {
                        id: parse_uuid(row.get::<_, String>(0)?),
                        destination: DmDestination {
                            workspace_id: row.get(1)?,
                            agent_id: row.get(2)?,
                            platform: row.get(3)?,
                            recipient_id: row.get(4)?,
                        },
                        text: row.get(5)?,
                        created_at: millis_to_datetime(row.get(6)?),
                    })
                })
                .map_err(|e| ReflexError::Storage(e.to_string()))?;

            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| ReflexError::Storage(e.to_string()))
        })
    }
}

#[async_trait]
impl RuleStore for SqliteStore {
    async fn get_enabled_rules(
        &self,
        workspace_id: &str,
        agent_id: Option<&str>,
    ) -> Result<Vec<AutomationRule>> {
        self.db.with_conn(|conn| {
            let mut stmt = conn
                .prepare(&format!(
                    "SELECT {RULE_COLUMNS} FROM automation_rules
                     WHERE workspace_id = ?1 AND enabled = 1
                       AND (agent_id IS NULL OR agent_id = ?2)
                     ORDER BY created_at ASC, id ASC"
                ))
                .map_err(|e| ReflexError::Storage(e.to_string()))?;

            let rows = stmt
                .query_map(params![workspace_id, agent_id], row_to_rule)
                .map_err(|e| ReflexError::Storage(e.to_string()))?;

            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| ReflexError::Storage(e.to_string()))
        })
    }

    async fn update_rule_last_executed(
        &self,
        rule_id: &str,
        previous: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        self.db.with_conn(|conn| {
            let changed = conn
                .execute(
                    "UPDATE automation_rules SET last_executed_at = ?1
                     WHERE id = ?2 AND last_executed_at IS ?3",
                    params![
                        at.timestamp_millis(),
                        rule_id,
                        previous.map(|t| t.timestamp_millis()),
                    ],
                )
                .map_err(|e| {
                    ReflexError::Storage(format!("Failed to update last_executed_at: {}", e))
                })?;
            Ok(changed == 1)
        })
    }

    async fn insert_queued_email(&self, email: &QueuedEmail) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO queued_emails (id, rule_id, workspace_id, event_id, recipient,
                     subject, body, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'queued', ?8)",
                params![
                    email.id.to_string(),
                    email.rule_id,
                    email.workspace_id,
                    email.event_id,
                    email.to,
                    email.subject,
                    email.body,
                    email.created_at.timestamp_millis(),
                ],
            )
            .map_err(|e| ReflexError::Storage(format!("Failed to queue email: {}", e)))?;
            Ok(())
        })
    }

    async fn log_webhook_call(&self, call: &WebhookCallLog) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO webhook_calls (id, rule_id, event_id, method, url, status, body,
                     attempts, called_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                params![
                    call.id.to_string(),
                    call.rule_id,
                    call.event_id,
                    call.method,
                    call.url,
                    call.status,
                    call.body,
                    call.attempts,
                    call.called_at.timestamp_millis(),
                ],
            )
            .map_err(|e| ReflexError::Storage(format!("Failed to log webhook call: {}", e)))?;
            Ok(())
        })
    }

    async fn is_event_processed(&self, event_id: &str, rule_id: &str) -> Result<bool> {
        self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM event_markers
                     WHERE event_id = ?1 AND rule_id = ?2 AND state = 'processed')",
                params![event_id, rule_id],
                |row| row.get::<_, bool>(0),
            )
            .map_err(|e| ReflexError::Storage(e.to_string()))
        })
    }

    async fn claim_event(&self, event_id: &str, rule_id: &str) -> Result<bool> {
        self.db.with_conn(|conn| {
            let inserted = conn
                .execute(
                    "INSERT OR IGNORE INTO event_markers (event_id, rule_id, state, updated_at)
                     VALUES (?1, ?2, 'claimed', ?3)",
                    params![event_id, rule_id, Utc::now().timestamp_millis()],
                )
                .map_err(|e| ReflexError::Storage(format!("Failed to claim event: {}", e)))?;
            Ok(inserted == 1)
        })
    }

    async fn mark_event_processed(&self, event_id: &str, rule_id: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO event_markers (event_id, rule_id, state, updated_at)
                 VALUES (?1, ?2, 'processed', ?3)
                 ON CONFLICT(event_id, rule_id) DO UPDATE SET
                     state = 'processed',
                     updated_at = excluded.updated_at",
                params![event_id, rule_id, Utc::now().timestamp_millis()],
            )
            .map_err(|e| ReflexError::Storage(format!("Failed to mark event processed: {}", e)))?;
            Ok(())
        })
    }

    async fn release_event(&self, event_id: &str, rule_id: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "DELETE FROM event_markers
                 WHERE event_id = ?1 AND rule_id = ?2 AND state = 'claimed'",
                params![event_id, rule_id],
            )
            .map_err(|e| ReflexError::Storage(format!("Failed to release event: {}", e)))?;
            Ok(())
        })
    }
}

#[async_trait]
impl DmSender for SqliteStore {
    async fn send_direct_message(&self, destination: &DmDestination, text: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO outbound_messages (id, workspace_id, agent_id, platform,
                     recipient_id, text, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    Uuid::new_v4().to_string(),
                    destination.workspace_id,
                    destination.agent_id,
                    destination.platform,
                    destination.recipient_id,
                    text,
                    Utc::now().timestamp_millis(),
                ],
            )
            .map_err(|e| ReflexError::Storage(format!("Failed to store DM: {}", e)))?;
            Ok(())
        })
    }
}

// =============================================================================
// Row helpers
// =============================================================================

fn row_to_rule(row: &Row<'_>) -> rusqlite::Result<AutomationRule> {
    let id: String = row.get(0)?;
    let trigger_raw: String = row.get(5)?;
    let action_raw: String = row.get(7)?;
    let last_executed: Option<i64> = row.get(9)?;

    Ok(AutomationRule {
        trigger_config: parse_config(&id, "trigger_config", trigger_raw),
        action_config: parse_config(&id, "action_config", action_raw),
        id,
        workspace_id: row.get(1)?,
        agent_id: row.get(2)?,
        name: row.get(3)?,
        trigger_type: row.get(4)?,
        action_type: row.get(6)?,
        enabled: row.get::<_, i32>(8)? != 0,
        last_executed_at: last_executed.map(millis_to_datetime),
    })
}

/// Corrupt JSON is kept as a raw string so the engine rejects the rule
/// instead of the whole query failing.
fn parse_config(rule_id: &str, column: &str, raw: String) -> serde_json::Value {
    match serde_json::from_str(&raw) {
        Ok(value) => value,
        Err(e) => {
            warn!(rule_id = %rule_id, column, error = %e, "Stored rule config is not valid JSON");
            serde_json::Value::String(raw)
        }
    }
}

fn millis_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

fn parse_uuid(raw: String) -> Uuid {
    Uuid::parse_str(&raw).unwrap_or_default()
}
