//! Public reply action handler.

use std::sync::Arc;

use async_trait::async_trait;
use reflex_core::traits::{MessageComposer, ReplyPoster};
use reflex_core::types::ActionType;

use crate::error::EngineError;
use crate::handler::{message_text, with_timeout, ActionHandler, HandlerContext};
use crate::types::{ActionSpec, Delivery};

/// Answers the triggering comment in public, under the same post.
pub struct PublicReplyHandler {
    composer: Arc<dyn MessageComposer>,
    poster: Arc<dyn ReplyPoster>,
}

impl PublicReplyHandler {
    pub fn new(composer: Arc<dyn MessageComposer>, poster: Arc<dyn ReplyPoster>) -> Self {
        Self { composer, poster }
    }
}

#[async_trait]
impl ActionHandler for PublicReplyHandler {
    fn action_type(&self) -> ActionType {
        ActionType::SendPublicReply
    }

    async fn execute(&self, ctx: &HandlerContext<'_>) -> Result<Delivery, EngineError> {
        let ActionSpec::SendPublicReply(action) = ctx.action else {
            return Err(EngineError::Validation(format!(
                "rule {}: expected send_public_reply config",
                ctx.rule.id
            )));
        };

        let (Some(post_id), Some(comment_id)) =
            (ctx.event.post_id.as_deref(), ctx.event.comment_id.as_deref())
        else {
            return Err(EngineError::Validation(
                "public reply needs a post and a comment to answer".to_string(),
            ));
        };

        let text = message_text(self.composer.as_ref(), action, ctx).await?;
        with_timeout(
            ctx.config.action_timeout_ms,
            self.poster.post_reply(post_id, comment_id, &text),
        )
        .await?;

        tracing::info!(rule_id = %ctx.rule.id, post_id, comment_id, "Public reply posted");
        Ok(Delivery::PublicReply)
    }
}
