//! Direct message action handler.

use std::sync::Arc;

use async_trait::async_trait;
use reflex_core::traits::{DmSender, MessageComposer};
use reflex_core::types::{ActionType, DmDestination};

use crate::error::EngineError;
use crate::handler::{message_text, with_timeout, ActionHandler, HandlerContext};
use crate::types::{ActionSpec, Delivery};

/// Sends a private message to the event's author, or to the manual
/// recipient override when one is given.
pub struct DirectMessageHandler {
    composer: Arc<dyn MessageComposer>,
    sender: Arc<dyn DmSender>,
}

impl DirectMessageHandler {
    pub fn new(composer: Arc<dyn MessageComposer>, sender: Arc<dyn DmSender>) -> Self {
        Self { composer, sender }
    }
}

#[async_trait]
impl ActionHandler for DirectMessageHandler {
    fn action_type(&self) -> ActionType {
        ActionType::SendDm
    }

    async fn execute(&self, ctx: &HandlerContext<'_>) -> Result<Delivery, EngineError> {
        let ActionSpec::SendDm(action) = ctx.action else {
            return Err(EngineError::Validation(format!(
                "rule {}: expected send_dm config",
                ctx.rule.id
            )));
        };

        let recipient_id = ctx
            .event
            .recipient_override
            .clone()
            .or_else(|| ctx.event.author_id.clone())
            .ok_or_else(|| {
                EngineError::Validation("event has no author to message".to_string())
            })?;

        let text = message_text(self.composer.as_ref(), action, ctx).await?;

        let destination = DmDestination {
            workspace_id: ctx.event.workspace_id.clone(),
            agent_id: ctx.event.agent_id.clone(),
            platform: ctx.event.platform.clone(),
            recipient_id,
        };
        with_timeout(
            ctx.config.action_timeout_ms,
            self.sender.send_direct_message(&destination, &text),
        )
        .await?;

        tracing::info!(
            rule_id = %ctx.rule.id,
            recipient = %destination.recipient_id,
            "Direct message sent"
        );
        Ok(Delivery::DirectMessage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::test_support::*;
    use reflex_core::config::EngineConfig;
    use reflex_core::traits::PromptContext;
    use reflex_storage::MemoryStore;
    use serde_json::json;

    struct NoComposer;

    #[async_trait]
    impl MessageComposer for NoComposer {
        async fn compose(&self, _: &PromptContext) -> reflex_core::Result<String> {
            Ok(String::new())
        }
    }

    fn handler(store: Arc<MemoryStore>) -> DirectMessageHandler {
        DirectMessageHandler::new(Arc::new(NoComposer), store)
    }

    #[tokio::test]
    async fn test_dm_sent_to_author() {
        let store = Arc::new(MemoryStore::new());
        let fixture = Fixture::new(
            rule("send_dm", json!({"messageTemplate": "Hi {{input.authorName}}, check your inbox"})),
            event(),
            EngineConfig::default(),
        );

        let delivery = handler(store.clone()).execute(&fixture.ctx()).await.unwrap();
        assert_eq!(delivery, Delivery::DirectMessage);

        let sent = store.outbound_messages();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].text, "Hi Jane, check your inbox");
        assert_eq!(sent[0].destination.recipient_id, "u1");
        assert_eq!(sent[0].destination.platform, "instagram");
    }

    #[tokio::test]
    async fn test_recipient_override_wins() {
        let store = Arc::new(MemoryStore::new());
        let mut ev = event();
        ev.recipient_override = Some("vip-7".to_string());
        let fixture = Fixture::new(rule("send_dm", json!({})), ev, EngineConfig::default());

        handler(store.clone()).execute(&fixture.ctx()).await.unwrap();
        assert_eq!(store.outbound_messages()[0].destination.recipient_id, "vip-7");
    }

    #[tokio::test]
    async fn test_missing_author_is_validation_error() {
        let store = Arc::new(MemoryStore::new());
        let mut ev = event();
        ev.author_id = None;
        let fixture = Fixture::new(rule("send_dm", json!({})), ev, EngineConfig::default());

        let err = handler(store.clone()).execute(&fixture.ctx()).await.unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)));
        assert!(store.outbound_messages().is_empty());
    }

    #[tokio::test]
    async fn test_wrong_config_variant_rejected() {
        let store = Arc::new(MemoryStore::new());
        let fixture = Fixture::new(rule("send_email", json!({})), event(), EngineConfig::default());
        assert!(handler(store).execute(&fixture.ctx()).await.is_err());
    }
}
