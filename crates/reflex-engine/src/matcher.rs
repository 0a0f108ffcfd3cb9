//! Selection of the rules an event should fire.

use reflex_core::types::{AutomationRule, TriggerType};
use tracing::{debug, warn};

use crate::schedule;
use crate::types::{KeywordTrigger, TriggerEvent, TriggerSpec};

/// A rule selected for dispatch together with its interpreted trigger.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchedRule {
    pub rule: AutomationRule,
    pub trigger: TriggerSpec,
}

/// Filter `rules` down to those `event` fires, preserving input order.
///
/// Disabled and out-of-scope rules never match. Rules whose trigger config
/// cannot be interpreted are skipped with a warning. Time rules are
/// evaluated at `event.occurred_at`.
pub fn match_rules(event: &TriggerEvent, rules: &[AutomationRule]) -> Vec<MatchedRule> {
    let mut matched = Vec::new();

    for rule in rules {
        if !rule.enabled || !rule.in_scope(&event.workspace_id, event.agent_id.as_deref()) {
            continue;
        }

        if event.trigger_type == TriggerType::Manual
            && event.explicit_rule_id.as_deref() != Some(rule.id.as_str())
        {
            continue;
        }

        let trigger = match TriggerSpec::from_rule(rule) {
            Ok(trigger) => trigger,
            Err(e) => {
                warn!(rule_id = %rule.id, error = %e, "Skipping rule with invalid trigger");
                continue;
            }
        };

        let fires = match (event.trigger_type, &trigger) {
            (TriggerType::Manual, _) => true,
            (TriggerType::Comment, TriggerSpec::Comment(cfg))
            | (TriggerType::Keyword, TriggerSpec::Keyword(cfg)) => {
                keywords_match(cfg, event.content.as_deref().unwrap_or(""))
            }
            (TriggerType::Time, TriggerSpec::Time(cfg)) => {
                match schedule::is_due(cfg, rule.last_executed_at, event.occurred_at) {
                    Ok(due) => due,
                    Err(e) => {
                        warn!(rule_id = %rule.id, error = %e, "Skipping rule with invalid schedule");
                        false
                    }
                }
            }
            _ => false,
        };

        if fires {
            debug!(rule_id = %rule.id, event_id = %event.event_id, "Rule matched");
            matched.push(MatchedRule {
                rule: rule.clone(),
                trigger,
            });
        }
    }

    matched
}

/// Case-insensitive substring match on any keyword. No keywords matches all.
pub fn keywords_match(trigger: &KeywordTrigger, content: &str) -> bool {
    if trigger.keywords.is_empty() {
        return true;
    }
    let haystack = content.to_lowercase();
    trigger
        .keywords
        .iter()
        .any(|k| haystack.contains(&k.to_lowercase()))
}
