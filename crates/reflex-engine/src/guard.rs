//! At-most-once dispatch per (event, rule) pair.
//!
//! The guard keeps a marker per pair in the rule store. A dispatch first
//! claims the pair (atomic insert-if-absent), then either commits it as
//! processed or releases it so a later retry can run again.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reflex_core::traits::RuleStore;
use reflex_core::types::AutomationRule;
use tracing::{debug, warn};

use crate::error::EngineError;
use crate::schedule::{epoch_minute, ScheduleMode};
use crate::types::{TriggerEvent, TriggerSpec};

/// Identity of one (occurrence, rule) pair in the marker table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DedupKey {
    pub event_id: String,
    pub rule_id: String,
    schedule: Option<ScheduleClaim>,
}

/// Extra commit step for time rules.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduleClaim {
    observed_last_executed: Option<DateTime<Utc>>,
}

impl DedupKey {
    /// Key for `rule` firing on `event`, or `None` for manual invocations,
    /// which bypass the guard.
    pub fn for_rule(
        event: &TriggerEvent,
        rule: &AutomationRule,
        trigger: &TriggerSpec,
        now: DateTime<Utc>,
    ) -> Option<Self> {
        match trigger {
            TriggerSpec::Manual => None,
            TriggerSpec::Comment(_) | TriggerSpec::Keyword(_) => Some(Self {
                event_id: event.event_id.clone(),
                rule_id: rule.id.clone(),
                schedule: None,
            }),
            TriggerSpec::Time(cfg) => {
                // A re-armed one-time rule gets a fresh key per scheduled instant.
                let event_id = match cfg.mode() {
                    Ok(ScheduleMode::Once(at)) => format!("schedule:once:{}", epoch_minute(at)),
                    _ => format!("schedule:{}", epoch_minute(now)),
                };
                Some(Self {
                    event_id,
                    rule_id: rule.id.clone(),
                    schedule: Some(ScheduleClaim {
                        observed_last_executed: rule.last_executed_at,
                    }),
                })
            }
        }
    }

    pub fn for_event(event_id: &str, rule_id: &str) -> Self {
        Self {
            event_id: event_id.to_string(),
            rule_id: rule_id.to_string(),
            schedule: None,
        }
    }
}

pub struct IdempotencyGuard {
    store: Arc<dyn RuleStore>,
}

impl IdempotencyGuard {
    pub fn new(store: Arc<dyn RuleStore>) -> Self {
        Self { store }
    }

    /// Whether the pair was already committed.
    pub async fn is_processed(&self, key: &DedupKey) -> Result<bool, EngineError> {
        Ok(self
            .store
            .is_event_processed(&key.event_id, &key.rule_id)
            .await?)
    }

    /// Try to take the pair. `false` means another dispatch holds or has
    /// finished it.
    pub async fn claim(&self, key: &DedupKey) -> Result<bool, EngineError> {
        let claimed = self.store.claim_event(&key.event_id, &key.rule_id).await?;
        debug!(event_id = %key.event_id, rule_id = %key.rule_id, claimed, "Claim attempted");
        Ok(claimed)
    }

    /// Record a successful dispatch.
    ///
    /// Time rules also advance `last_executed_at` from the value observed at
    /// match time. Losing that compare-and-set means another scheduler
    /// already recorded a run; the marker still holds the pair.
    pub async fn commit(&self, key: &DedupKey, now: DateTime<Utc>) -> Result<(), EngineError> {
        self.store
            .mark_event_processed(&key.event_id, &key.rule_id)
            .await?;

        if let Some(schedule) = &key.schedule {
            let updated = self
                .store
                .update_rule_last_executed(&key.rule_id, schedule.observed_last_executed, now)
                .await?;
            if !updated {
                warn!(
                    rule_id = %key.rule_id,
                    "last_executed_at changed concurrently; keeping the newer value"
                );
            }
        }
        Ok(())
    }

    /// Drop an uncommitted claim after a failed dispatch.
    pub async fn release(&self, key: &DedupKey) -> Result<(), EngineError> {
        Ok(self.store.release_event(&key.event_id, &key.rule_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reflex_core::types::TriggerType;
    use serde_json::json;
    use reflex_storage::MemoryStore;

    use crate::types::{KeywordTrigger, TimeTrigger};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 12, 9, 0, 20).unwrap()
    }

    fn rule(trigger_type: &str) -> AutomationRule {
        AutomationRule {
            id: "r1".to_string(),
            workspace_id: "w1".to_string(),
            agent_id: None,
            name: String::new(),
            trigger_type: trigger_type.to_string(),
            trigger_config: json!({}),
            action_type: "send_dm".to_string(),
            action_config: json!({}),
            enabled: true,
            last_executed_at: None,
        }
    }

    fn event(trigger_type: TriggerType, event_id: &str) -> TriggerEvent {
        TriggerEvent {
            workspace_id: "w1".to_string(),
            agent_id: None,
            trigger_type,
            platform: "instagram".to_string(),
            content: None,
            author_id: None,
            author_name: None,
            author_email: None,
            post_id: None,
            comment_id: None,
            event_id: event_id.to_string(),
            occurred_at: now(),
            explicit_rule_id: None,
            recipient_override: None,
        }
    }

    #[test]
    fn test_key_for_event_rules_uses_event_id() {
        let key = DedupKey::for_rule(
            &event(TriggerType::Comment, "c1"),
            &rule("comment"),
            &TriggerSpec::Comment(KeywordTrigger::default()),
            now(),
        )
        .unwrap();
        assert_eq!(key, DedupKey::for_event("c1", "r1"));
    }

    #[test]
    fn test_key_for_time_rules() {
        let tick = event(TriggerType::Time, "schedule:0");
        let recurring = TriggerSpec::Time(TimeTrigger {
            cron_pattern: Some("* * * * *".to_string()),
            ..TimeTrigger::default()
        });
        let key = DedupKey::for_rule(&tick, &rule("time"), &recurring, now()).unwrap();
        assert_eq!(key.event_id, format!("schedule:{}", epoch_minute(now())));

        let once = TriggerSpec::Time(TimeTrigger {
            scheduled_time: Some("2026-01-01T00:00:00Z".to_string()),
            ..TimeTrigger::default()
        });
        let key = DedupKey::for_rule(&tick, &rule("time"), &once, now()).unwrap();
        let scheduled = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        assert_eq!(key.event_id, format!("schedule:once:{}", epoch_minute(scheduled)));
    }

    #[test]
    fn test_rearmed_one_time_rule_gets_new_key() {
        let tick = event(TriggerType::Time, "schedule:0");
        let once = |at: &str| {
            TriggerSpec::Time(TimeTrigger {
                scheduled_time: Some(at.to_string()),
                ..TimeTrigger::default()
            })
        };
        let first = DedupKey::for_rule(&tick, &rule("time"), &once("2026-01-01T00:00:00Z"), now());
        let second = DedupKey::for_rule(&tick, &rule("time"), &once("2026-02-01T09:00:00Z"), now());
        assert_ne!(first.unwrap().event_id, second.unwrap().event_id);
    }

    #[test]
    fn test_manual_has_no_key() {
        let key = DedupKey::for_rule(
            &event(TriggerType::Manual, "manual:x"),
            &rule("manual"),
            &TriggerSpec::Manual,
            now(),
        );
        assert!(key.is_none());
    }

    #[tokio::test]
    async fn test_claim_commit_blocks_second_claim() {
        let guard = IdempotencyGuard::new(Arc::new(MemoryStore::new()));
        let key = DedupKey::for_event("e1", "r1");

        assert!(guard.claim(&key).await.unwrap());
        assert!(!guard.claim(&key).await.unwrap());
        guard.commit(&key, now()).await.unwrap();
        assert!(guard.is_processed(&key).await.unwrap());
        assert!(!guard.claim(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_release_allows_retry() {
        let guard = IdempotencyGuard::new(Arc::new(MemoryStore::new()));
        let key = DedupKey::for_event("e1", "r1");

        assert!(guard.claim(&key).await.unwrap());
        guard.release(&key).await.unwrap();
        assert!(!guard.is_processed(&key).await.unwrap());
        assert!(guard.claim(&key).await.unwrap());
    }

    #[tokio::test]
    async fn test_commit_advances_last_executed_for_time_rules() {
        let store = Arc::new(MemoryStore::with_rules(vec![rule("time")]));
        let guard = IdempotencyGuard::new(store.clone());
        let trigger = TriggerSpec::Time(TimeTrigger {
            cron_pattern: Some("* * * * *".to_string()),
            ..TimeTrigger::default()
        });
        let key =
            DedupKey::for_rule(&event(TriggerType::Time, "t"), &rule("time"), &trigger, now())
                .unwrap();

        assert!(guard.claim(&key).await.unwrap());
        guard.commit(&key, now()).await.unwrap();
        assert_eq!(store.rule("r1").unwrap().last_executed_at, Some(now()));

        // A second commit observed the old value and loses the CAS.
        let later = now() + chrono::Duration::minutes(1);
        guard.commit(&key, later).await.unwrap();
        assert_eq!(store.rule("r1").unwrap().last_executed_at, Some(now()));
    }
}
