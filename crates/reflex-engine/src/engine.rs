//! Engine entry points.
//!
//! Each entry point loads the enabled rules of one workspace/agent scope,
//! selects the ones the event fires, and dispatches them concurrently. One
//! rule's failure never affects another's outcome. Only failing to load the
//! rules is an error for the whole invocation.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use reflex_core::config::EngineConfig;
use reflex_core::traits::{DmSender, HttpClient, MessageComposer, ReplyPoster, RuleStore};
use reflex_core::types::{AutomationRule, TriggerType};
use tracing::{error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::error::EngineError;
use crate::guard::{DedupKey, IdempotencyGuard};
use crate::handler::{
    ActionRegistry, DirectMessageHandler, EmailHandler, PublicReplyHandler, WebhookHandler,
};
use crate::matcher::{match_rules, MatchedRule};
use crate::normalizer::{self, ManualPayload, RawTrigger, TickPayload};
use crate::types::{ActionSpec, BatchSummary, ExecutionOutcome, TriggerEvent};

/// External services the engine performs actions through.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn RuleStore>,
    pub composer: Arc<dyn MessageComposer>,
    pub dm_sender: Arc<dyn DmSender>,
    pub reply_poster: Arc<dyn ReplyPoster>,
    pub http: Arc<dyn HttpClient>,
}

pub struct Engine {
    store: Arc<dyn RuleStore>,
    guard: IdempotencyGuard,
    dispatcher: Dispatcher,
}

impl Engine {
    /// Create an engine with the four built-in action handlers.
    pub fn new(config: EngineConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            store,
            composer,
            dm_sender,
            reply_poster,
            http,
        } = collaborators;

        let mut registry = ActionRegistry::new();
        registry.register(Arc::new(DirectMessageHandler::new(
            composer.clone(),
            dm_sender,
        )));
        registry.register(Arc::new(PublicReplyHandler::new(composer, reply_poster)));
        registry.register(Arc::new(EmailHandler::new(store.clone())));
        registry.register(Arc::new(WebhookHandler::new(http, store.clone())));

        Self::with_registry(config, store, registry)
    }

    /// Create an engine with a custom handler set.
    pub fn with_registry(
        config: EngineConfig,
        store: Arc<dyn RuleStore>,
        registry: ActionRegistry,
    ) -> Self {
        Self {
            guard: IdempotencyGuard::new(store.clone()),
            store,
            dispatcher: Dispatcher::new(registry, config),
        }
    }

    /// Fire the comment or keyword rules `event` matches.
    pub async fn process_event(
        &self,
        event: &TriggerEvent,
    ) -> Result<Vec<ExecutionOutcome>, EngineError> {
        if !matches!(
            event.trigger_type,
            TriggerType::Comment | TriggerType::Keyword
        ) {
            warn!(
                event_id = %event.event_id,
                trigger_type = %event.trigger_type,
                "process_event only handles comment and keyword events"
            );
            return Ok(Vec::new());
        }

        let rules = self.load_rules(event).await?;
        let processed = self.already_processed(event, &rules).await;
        let matched = match_rules(event, &rules);
        let now = Utc::now();

        let processed = &processed;
        let outcomes: Vec<ExecutionOutcome> = join_all(matched.into_iter().map(|m| async move {
            if processed.contains(&m.rule.id) {
                info!(
                    rule_id = %m.rule.id,
                    event_id = %event.event_id,
                    "Skipping already processed event"
                );
                return Some(ExecutionOutcome::duplicate(&m.rule.id, &event.event_id));
            }
            self.run_guarded(m, event, now).await
        }))
        .await
        .into_iter()
        .flatten()
        .collect();

        log_summary("event", &event.event_id, &outcomes);
        Ok(outcomes)
    }

    /// Evaluate the scope's time rules at the current instant.
    pub async fn process_time_tick(
        &self,
        workspace_id: &str,
        agent_id: Option<&str>,
    ) -> Result<Vec<ExecutionOutcome>, EngineError> {
        self.process_time_tick_at(workspace_id, agent_id, Utc::now())
            .await
    }

    /// Evaluate the scope's time rules at `now`.
    pub async fn process_time_tick_at(
        &self,
        workspace_id: &str,
        agent_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<ExecutionOutcome>, EngineError> {
        let payload = TickPayload {
            workspace_id: workspace_id.to_string(),
            agent_id: agent_id.map(str::to_string),
        };
        let event = match normalizer::normalize_tick(payload, now) {
            Ok(event) => event,
            Err(e) => {
                warn!(error = %e, "Ignoring malformed tick");
                return Ok(Vec::new());
            }
        };

        let rules = self.load_rules(&event).await?;
        let matched = match_rules(&event, &rules);

        let outcomes: Vec<ExecutionOutcome> = join_all(
            matched
                .into_iter()
                .map(|m| self.run_guarded(m, &event, now)),
        )
        .await
        .into_iter()
        .flatten()
        .collect();

        log_summary("tick", &event.event_id, &outcomes);
        Ok(outcomes)
    }

    /// Run one rule on demand, whatever its trigger type.
    ///
    /// Manual runs bypass idempotency: every call performs the action again.
    pub async fn process_manual(
        &self,
        workspace_id: &str,
        agent_id: Option<&str>,
        rule_id: &str,
        recipient_override: Option<&str>,
    ) -> Result<ExecutionOutcome, EngineError> {
        let payload = ManualPayload {
            workspace_id: workspace_id.to_string(),
            agent_id: agent_id.map(str::to_string),
            rule_id: rule_id.to_string(),
            recipient_override: recipient_override.map(str::to_string),
        };
        let now = Utc::now();
        let event = match normalizer::normalize_manual(payload, now) {
            Ok(event) => event,
            Err(e) => {
                warn!(rule_id, error = %e, "Ignoring malformed manual invocation");
                return Ok(ExecutionOutcome::failed(rule_id, &e));
            }
        };

        let rules = self.load_rules(&event).await?;
        let Some(matched) = match_rules(&event, &rules).into_iter().next() else {
            let reason = if rules.iter().any(|r| r.id == rule_id) {
                format!("rule {} has an invalid trigger config", rule_id)
            } else {
                format!("rule {} not found or not enabled in this scope", rule_id)
            };
            let err = EngineError::Validation(reason);
            warn!(rule_id, error = %err, "Manual invocation rejected");
            return Ok(ExecutionOutcome::failed(rule_id, &err));
        };

        let outcome = self.dispatcher.dispatch(&matched.rule, &event, now).await;
        log_summary("manual", &event.event_id, std::slice::from_ref(&outcome));
        Ok(outcome)
    }

    /// Normalize a raw payload and route it to the matching entry point.
    pub async fn process_raw(&self, raw: RawTrigger) -> Result<Vec<ExecutionOutcome>, EngineError> {
        match raw {
            RawTrigger::Tick(p) => {
                self.process_time_tick(&p.workspace_id, p.agent_id.as_deref())
                    .await
            }
            RawTrigger::Manual(p) => Ok(vec![
                self.process_manual(
                    &p.workspace_id,
                    p.agent_id.as_deref(),
                    &p.rule_id,
                    p.recipient_override.as_deref(),
                )
                .await?,
            ]),
            other => match normalizer::normalize(other, Utc::now()) {
                Ok(event) => self.process_event(&event).await,
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed event");
                    Ok(Vec::new())
                }
            },
        }
    }

    async fn load_rules(&self, event: &TriggerEvent) -> Result<Vec<AutomationRule>, EngineError> {
        self.store
            .get_enabled_rules(&event.workspace_id, event.agent_id.as_deref())
            .await
            .map_err(|e| {
                error!(
                    workspace_id = %event.workspace_id,
                    error = %e,
                    "Failed to load rules"
                );
                EngineError::Storage(e)
            })
    }

    /// IDs of candidate rules already committed for this event. A failed
    /// lookup counts as not processed; the claim still protects the pair.
    async fn already_processed(
        &self,
        event: &TriggerEvent,
        rules: &[AutomationRule],
    ) -> HashSet<String> {
        let mut processed = HashSet::new();
        for rule in rules {
            let key = DedupKey::for_event(&event.event_id, &rule.id);
            match self.guard.is_processed(&key).await {
                Ok(true) => {
                    processed.insert(rule.id.clone());
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(rule_id = %rule.id, error = %e, "Processed-marker lookup failed");
                }
            }
        }
        processed
    }

    /// Claim, dispatch, then commit or release. `None` for rules whose action
    /// config cannot be interpreted.
    async fn run_guarded(
        &self,
        matched: MatchedRule,
        event: &TriggerEvent,
        now: DateTime<Utc>,
    ) -> Option<ExecutionOutcome> {
        let MatchedRule { rule, trigger } = matched;

        let action = match ActionSpec::from_rule(&rule) {
            Ok(action) => action,
            Err(e) => {
                warn!(rule_id = %rule.id, error = %e, "Skipping rule with invalid action");
                return None;
            }
        };

        let Some(key) = DedupKey::for_rule(event, &rule, &trigger, now) else {
            return Some(
                self.dispatcher
                    .dispatch_action(&rule, &action, event, now)
                    .await,
            );
        };

        match self.guard.claim(&key).await {
            Ok(true) => {}
            Ok(false) => {
                info!(
                    rule_id = %rule.id,
                    event_id = %key.event_id,
                    "Skipping event claimed by another dispatch"
                );
                return Some(ExecutionOutcome::duplicate(&rule.id, &key.event_id));
            }
            Err(e) => {
                error!(rule_id = %rule.id, error = %e, "Failed to claim event");
                return Some(ExecutionOutcome::failed(&rule.id, &e));
            }
        }

        let outcome = self
            .dispatcher
            .dispatch_action(&rule, &action, event, now)
            .await;

        let settled = if outcome.ok {
            self.guard.commit(&key, now).await
        } else {
            self.guard.release(&key).await
        };
        if let Err(e) = settled {
            error!(
                rule_id = %rule.id,
                event_id = %key.event_id,
                error = %e,
                "Failed to settle idempotency marker"
            );
        }

        Some(outcome)
    }
}

fn log_summary(entry: &str, event_id: &str, outcomes: &[ExecutionOutcome]) {
    let summary = BatchSummary::from_outcomes(outcomes);
    info!(
        entry,
        event_id,
        total = summary.total,
        succeeded = summary.succeeded,
        failed = summary.failed,
        duplicates = summary.duplicates,
        "Invocation finished"
    );
}
