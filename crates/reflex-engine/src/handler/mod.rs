//! Action handler registry and trait definition.
//!
//! Defines the `ActionHandler` async trait and provides the handler
//! registry for dispatching actions to the correct implementation.

pub mod direct_message;
pub mod email;
pub mod public_reply;
pub mod webhook;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reflex_core::config::EngineConfig;
use reflex_core::error::ReflexError;
use reflex_core::traits::{MessageComposer, PromptContext};
use reflex_core::types::{ActionType, AutomationRule};
use tracing::debug;

use crate::error::EngineError;
use crate::template::{render, TemplateContext};
use crate::types::{ActionSpec, Delivery, MessageAction, TriggerEvent};

pub use direct_message::DirectMessageHandler;
pub use email::EmailHandler;
pub use public_reply::PublicReplyHandler;
pub use webhook::WebhookHandler;

/// Everything a handler needs to perform one rule's action.
pub struct HandlerContext<'a> {
    pub rule: &'a AutomationRule,
    pub action: &'a ActionSpec,
    pub event: &'a TriggerEvent,
    pub template: &'a TemplateContext,
    pub config: &'a EngineConfig,
}

#[async_trait]
pub trait ActionHandler: Send + Sync {
    fn action_type(&self) -> ActionType;

    async fn execute(&self, ctx: &HandlerContext<'_>) -> Result<Delivery, EngineError>;
}

/// Handlers keyed by the action type they perform.
#[derive(Default)]
pub struct ActionRegistry {
    handlers: HashMap<ActionType, Arc<dyn ActionHandler>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any previous one for the same type.
    pub fn register(&mut self, handler: Arc<dyn ActionHandler>) {
        self.handlers.insert(handler.action_type(), handler);
    }

    pub fn get(&self, action_type: ActionType) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(&action_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Await a collaborator call, bounded by `timeout_ms`.
pub(crate) async fn with_timeout<T, F>(timeout_ms: u64, fut: F) -> Result<T, EngineError>
where
    F: Future<Output = Result<T, ReflexError>>,
{
    match tokio::time::timeout(Duration::from_millis(timeout_ms), fut).await {
        Ok(result) => Ok(result?),
        Err(_) => Err(EngineError::Timeout(timeout_ms)),
    }
}

/// Pick the text for a DM or public reply.
///
/// With `useAI` the composer drafts the text; a composer failure is final.
/// An empty draft falls through to the rendered template, then the rule's
/// fallback text, then the engine default.
pub(crate) async fn message_text(
    composer: &dyn MessageComposer,
    action: &MessageAction,
    ctx: &HandlerContext<'_>,
) -> Result<String, EngineError> {
    if action.use_ai {
        let prompt = PromptContext {
            workspace_id: ctx.event.workspace_id.clone(),
            agent_id: ctx.event.agent_id.clone(),
            platform: ctx.event.platform.clone(),
            rule_name: ctx.rule.name.clone(),
            prompt: action
                .ai_prompt
                .as_deref()
                .map(|p| render(p, ctx.template))
                .unwrap_or_default(),
            content: ctx.event.content.clone().unwrap_or_default(),
            author_name: ctx.event.author_name.clone(),
        };
        let drafted = with_timeout(ctx.config.action_timeout_ms, composer.compose(&prompt))
            .await
            .map_err(|e| match e {
                EngineError::Storage(inner) => EngineError::Network(inner.to_string()),
                other => other,
            })?;
        let drafted = drafted.trim();
        if !drafted.is_empty() {
            return Ok(drafted.to_string());
        }
        debug!(rule_id = %ctx.rule.id, "Composer returned empty text; falling back");
    }

    if let Some(template) = action.message_template.as_deref() {
        let rendered = render(template, ctx.template);
        if !rendered.trim().is_empty() {
            return Ok(rendered);
        }
    }

    if let Some(fallback) = action.fallback_text.as_deref() {
        let rendered = render(fallback, ctx.template);
        if !rendered.trim().is_empty() {
            return Ok(rendered);
        }
    }

    Ok(ctx.config.default_fallback_text.clone())
}
