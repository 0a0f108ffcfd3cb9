//! Routes a matched rule to its action handler.
//!
//! Dispatch never fails: every error becomes a failed [`ExecutionOutcome`]
//! for that rule only.

use chrono::{DateTime, Utc};
use reflex_core::config::EngineConfig;
use reflex_core::types::AutomationRule;
use tracing::{info, warn};

use crate::error::EngineError;
use crate::handler::{ActionRegistry, HandlerContext};
use crate::template::TemplateContext;
use crate::types::{ActionSpec, ExecutionOutcome, TriggerEvent};

pub struct Dispatcher {
    registry: ActionRegistry,
    config: EngineConfig,
}

impl Dispatcher {
    pub fn new(registry: ActionRegistry, config: EngineConfig) -> Self {
        Self { registry, config }
    }

    /// Interpret the rule's action config and perform it.
    pub async fn dispatch(
        &self,
        rule: &AutomationRule,
        event: &TriggerEvent,
        now: DateTime<Utc>,
    ) -> ExecutionOutcome {
        match ActionSpec::from_rule(rule) {
            Ok(action) => self.dispatch_action(rule, &action, event, now).await,
            Err(e) => {
                warn!(rule_id = %rule.id, error = %e, "Invalid action config");
                ExecutionOutcome::failed(&rule.id, &e)
            }
        }
    }

    /// Perform an already interpreted action.
    pub async fn dispatch_action(
        &self,
        rule: &AutomationRule,
        action: &ActionSpec,
        event: &TriggerEvent,
        now: DateTime<Utc>,
    ) -> ExecutionOutcome {
        if !rule.in_scope(&event.workspace_id, event.agent_id.as_deref()) {
            let err = EngineError::Authorization {
                rule_id: rule.id.clone(),
                workspace_id: event.workspace_id.clone(),
            };
            warn!(rule_id = %rule.id, error = %err, "Rule outside event scope");
            return ExecutionOutcome::failed(&rule.id, &err);
        }

        let action_type = action.action_type();
        let Some(handler) = self.registry.get(action_type) else {
            let err = EngineError::Validation(format!("Action type not registered: {}", action_type));
            warn!(rule_id = %rule.id, error = %err, "No handler");
            return ExecutionOutcome::failed(&rule.id, &err);
        };

        let template = TemplateContext::for_rule(event, rule, now);
        let ctx = HandlerContext {
            rule,
            action,
            event,
            template: &template,
            config: &self.config,
        };

        match handler.execute(&ctx).await {
            Ok(delivery) => {
                info!(
                    rule_id = %rule.id,
                    event_id = %event.event_id,
                    action = %action_type,
                    "Rule dispatched"
                );
                ExecutionOutcome::delivered(&rule.id, delivery)
            }
            Err(e) => {
                warn!(
                    rule_id = %rule.id,
                    event_id = %event.event_id,
                    action = %action_type,
                    kind = %e.kind(),
                    error = %e,
                    "Rule dispatch failed"
                );
                ExecutionOutcome::failed(&rule.id, &e)
            }
        }
    }
}
