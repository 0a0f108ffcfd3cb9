//! In-memory store used by tests and embedders without a database.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use reflex_core::error::{ReflexError, Result};
use reflex_core::traits::{DmSender, RuleStore};
use reflex_core::types::{
    AutomationRule, DmDestination, MarkerState, OutboundMessage, QueuedEmail, WebhookCallLog,
};

#[derive(Debug, Default)]
struct MemoryState {
    rules: Vec<AutomationRule>,
    markers: HashMap<(String, String), MarkerState>,
    emails: Vec<QueuedEmail>,
    webhook_calls: Vec<WebhookCallLog>,
    messages: Vec<OutboundMessage>,
}

/// Mutex-guarded store with the same semantics as the SQLite store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with rules.
    pub fn with_rules(rules: Vec<AutomationRule>) -> Self {
        Self {
            state: Mutex::new(MemoryState {
                rules,
                ..MemoryState::default()
            }),
        }
    }

    /// Insert or replace a rule by ID.
    pub fn upsert_rule(&self, rule: AutomationRule) -> Result<()> {
        let mut state = self.lock()?;
        match state.rules.iter_mut().find(|r| r.id == rule.id) {
            Some(existing) => *existing = rule,
            None => state.rules.push(rule),
        }
        Ok(())
    }

    pub fn rule(&self, id: &str) -> Option<AutomationRule> {
        self.lock()
            .ok()
            .and_then(|s| s.rules.iter().find(|r| r.id == id).cloned())
    }

    pub fn marker(&self, event_id: &str, rule_id: &str) -> Option<MarkerState> {
        self.lock().ok().and_then(|s| {
            s.markers
                .get(&(event_id.to_string(), rule_id.to_string()))
                .copied()
        })
    }

    pub fn queued_emails(&self) -> Vec<QueuedEmail> {
        self.lock().map(|s| s.emails.clone()).unwrap_or_default()
    }

    pub fn webhook_calls(&self) -> Vec<WebhookCallLog> {
        self.lock().map(|s| s.webhook_calls.clone()).unwrap_or_default()
    }

    pub fn outbound_messages(&self) -> Vec<OutboundMessage> {
        self.lock().map(|s| s.messages.clone()).unwrap_or_default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|e| ReflexError::Storage(format!("Lock poisoned: {}", e)))
    }
}

fn key(event_id: &str, rule_id: &str) -> (String, String) {
    (event_id.to_string(), rule_id.to_string())
}

#[async_trait]
impl RuleStore for MemoryStore {
    async fn get_enabled_rules(
        &self,
        workspace_id: &str,
        agent_id: Option<&str>,
    ) -> Result<Vec<AutomationRule>> {
        let state = self.lock()?;
        Ok(state
            .rules
            .iter()
            .filter(|r| r.enabled && r.in_scope(workspace_id, agent_id))
            .cloned()
            .collect())
    }

    async fn update_rule_last_executed(
        &self,
        rule_id: &str,
        previous: Option<DateTime<Utc>>,
        at: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.lock()?;
        match state.rules.iter_mut().find(|r| r.id == rule_id) {
            Some(rule) if rule.last_executed_at == previous => {
                rule.last_executed_at = Some(at);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn insert_queued_email(&self, email: &QueuedEmail) -> Result<()> {
        self.lock()?.emails.push(email.clone());
        Ok(())
    }

    async fn log_webhook_call(&self, call: &WebhookCallLog) -> Result<()> {
        self.lock()?.webhook_calls.push(call.clone());
        Ok(())
    }

    async fn is_event_processed(&self, event_id: &str, rule_id: &str) -> Result<bool> {
        Ok(self.lock()?.markers.get(&key(event_id, rule_id)) == Some(&MarkerState::Processed))
    }

    async fn claim_event(&self, event_id: &str, rule_id: &str) -> Result<bool> {
        let mut state = self.lock()?;
        let k = key(event_id, rule_id);
        if state.markers.contains_key(&k) {
            return Ok(false);
        }
        state.markers.insert(k, MarkerState::Claimed);
        Ok(true)
    }

    async fn mark_event_processed(&self, event_id: &str, rule_id: &str) -> Result<()> {
        self.lock()?
            .markers
            .insert(key(event_id, rule_id), MarkerState::Processed);
        Ok(())
    }

    async fn release_event(&self, event_id: &str, rule_id: &str) -> Result<()> {
        let mut state = self.lock()?;
        let k = key(event_id, rule_id);
        if state.markers.get(&k) == Some(&MarkerState::Claimed) {
            state.markers.remove(&k);
        }
        Ok(())
    }
}

#[async_trait]
impl DmSender for MemoryStore {
    async fn send_direct_message(&self, destination: &DmDestination, text: &str) -> Result<()> {
        self.lock()?.messages.push(OutboundMessage {
            id: Uuid::new_v4(),
            destination: destination.clone(),
            text: text.to_string(),
            created_at: Utc::now(),
        });
        Ok(())
    }
}
