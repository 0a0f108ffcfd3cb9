//! Email action handler.
//!
//! Only queues the email; a separate delivery worker sends it.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reflex_core::traits::RuleStore;
use reflex_core::types::{ActionType, QueuedEmail};
use uuid::Uuid;

use crate::error::EngineError;
use crate::handler::{ActionHandler, HandlerContext};
use crate::template::render;
use crate::types::{ActionSpec, Delivery, EmailAction, TriggerEvent};

pub struct EmailHandler {
    store: Arc<dyn RuleStore>,
}

impl EmailHandler {
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self { store }
    }
}

/// `to`, else the event's address (manual override first), else the rule's
/// fallback `recipientEmail`.
fn recipient(action: &EmailAction, event: &TriggerEvent) -> Option<String> {
    action
        .to
        .clone()
        .or_else(|| event.recipient_override.clone())
        .or_else(|| event.author_email.clone())
        .or_else(|| action.recipient_email.clone())
        .filter(|r| !r.trim().is_empty())
}

#[async_trait]
impl ActionHandler for EmailHandler {
    fn action_type(&self) -> ActionType {
        ActionType::SendEmail
    }

    async fn execute(&self, ctx: &HandlerContext<'_>) -> Result<Delivery, EngineError> {
        let ActionSpec::SendEmail(action) = ctx.action else {
            return Err(EngineError::Validation(format!(
                "rule {}: expected send_email config",
                ctx.rule.id
            )));
        };

        let to = match recipient(action, ctx.event) {
            Some(to) => render(&to, ctx.template),
            None => {
                tracing::warn!(
                    rule_id = %ctx.rule.id,
                    event_id = %ctx.event.event_id,
                    "No recipient address; queueing email without one"
                );
                String::new()
            }
        };

        let email = QueuedEmail {
            id: Uuid::new_v4(),
            rule_id: ctx.rule.id.clone(),
            workspace_id: ctx.event.workspace_id.clone(),
            event_id: Some(ctx.event.event_id.clone()),
            to,
            subject: render(action.subject.as_deref().unwrap_or(""), ctx.template),
            body: render(action.body.as_deref().unwrap_or(""), ctx.template),
            created_at: Utc::now(),
        };

        self.store.insert_queued_email(&email).await?;

        tracing::info!(rule_id = %ctx.rule.id, email_id = %email.id, "Email queued");
        Ok(Delivery::EmailQueued)
    }
}
