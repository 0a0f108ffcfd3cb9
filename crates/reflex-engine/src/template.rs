//! `{{path}}` placeholder substitution.
//!
//! Paths are dot-separated lookups into a JSON context. The special path
//! `now` renders the context's reference instant. Unknown paths render as an
//! empty string; rendering never fails.

use chrono::{DateTime, Utc};
use reflex_core::types::AutomationRule;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::types::TriggerEvent;

const NOW_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Values available to placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateContext {
    root: Value,
    now: DateTime<Utc>,
}

impl TemplateContext {
    pub fn new(root: Value, now: DateTime<Utc>) -> Self {
        Self { root, now }
    }

    /// Build the `{input, rule}` context for one rule firing on one event.
    pub fn for_rule(event: &TriggerEvent, rule: &AutomationRule, now: DateTime<Utc>) -> Self {
        let root = json!({
            "input": {
                "commentText": event.content,
                "content": event.content,
                "authorId": event.author_id,
                "authorName": event.author_name,
                "authorEmail": event.author_email,
                "platform": event.platform,
                "eventId": event.event_id,
                "postId": event.post_id,
                "commentId": event.comment_id,
                "workspaceId": event.workspace_id,
                "agentId": event.agent_id,
                "triggerType": event.trigger_type.to_string(),
                "occurredAt": event.occurred_at.format(NOW_FORMAT).to_string(),
                "recipientOverride": event.recipient_override,
            },
            "rule": {
                "id": rule.id,
                "name": rule.name,
                "workspaceId": rule.workspace_id,
                "agentId": rule.agent_id,
                "triggerType": rule.trigger_type,
                "actionType": rule.action_type,
            },
        });
        Self { root, now }
    }

    /// The `input` object, or an empty object.
    pub fn input(&self) -> Value {
        self.root
            .get("input")
            .cloned()
            .unwrap_or_else(|| Value::Object(Map::new()))
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.now
    }

    fn lookup(&self, path: &str) -> Option<String> {
        if path == "now" {
            return Some(self.now.format(NOW_FORMAT).to_string());
        }
        if path.is_empty() {
            return None;
        }

        let mut current = &self.root;
        for segment in path.split('.') {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }

        match current {
            Value::Null => None,
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            other => Some(other.to_string()),
        }
    }
}

/// Substitute every `{{path}}` in `template`.
pub fn render(template: &str, context: &TemplateContext) -> String {
    render_with_missing(template, context).0
}

/// Like [`render`], also reporting the paths that resolved to nothing.
pub fn render_with_missing(template: &str, context: &TemplateContext) -> (String, Vec<String>) {
    let mut out = String::with_capacity(template.len());
    let mut missing = Vec::new();
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else {
            // Unterminated placeholder stays literal.
            out.push_str(&rest[start..]);
            return (out, missing);
        };

        let path = after[..end].trim();
        match context.lookup(path) {
            Some(value) => out.push_str(&value),
            None => missing.push(path.to_string()),
        }
        rest = &after[end + 2..];
    }
    out.push_str(rest);

    if !missing.is_empty() {
        debug!(missing = ?missing, "Template placeholders resolved to empty");
    }
    (out, missing)
}

/// Render every string leaf of a JSON value, keeping its structure.
pub fn render_value(value: &Value, context: &TemplateContext) -> Value {
    match value {
        Value::String(s) => Value::String(render(s, context)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, context)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, context)))
                .collect(),
        ),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ctx(root: Value) -> TemplateContext {
        TemplateContext::new(root, Utc.with_ymd_and_hms(2026, 1, 12, 9, 30, 0).unwrap())
    }

    #[test]
    fn test_render_simple_path() {
        let c = ctx(json!({"input": {"authorName": "Jane"}}));
        assert_eq!(render("Hello {{input.authorName}}", &c), "Hello Jane");
    }

    #[test]
    fn test_render_trims_whitespace_inside_braces() {
        let c = ctx(json!({"input": {"authorName": "Jane"}}));
        assert_eq!(render("Hi {{ input.authorName }}!", &c), "Hi Jane!");
    }

    #[test]
    fn test_missing_path_renders_empty() {
        let c = ctx(json!({"input": {}}));
        let (out, missing) = render_with_missing("Hello {{input.missing}}", &c);
        assert_eq!(out, "Hello ");
        assert_eq!(missing, vec!["input.missing"]);
        assert_eq!(render("{{nothing.at.all}}", &c), "");
        assert_eq!(render("[{{}}]", &c), "[]");
    }

    #[test]
    fn test_null_renders_empty() {
        let c = ctx(json!({"input": {"authorEmail": null}}));
        assert_eq!(render("<{{input.authorEmail}}>", &c), "<>");
    }

    #[test]
    fn test_now_uses_reference_instant() {
        let c = ctx(json!({}));
        assert_eq!(render("at {{now}}", &c), "at 2026-01-12T09:30:00Z");
    }

    #[test]
    fn test_scalars_and_objects() {
        let c = ctx(json!({"n": 3, "b": true, "o": {"k": "v"}, "a": ["x", "y"]}));
        assert_eq!(render("{{n}} {{b}}", &c), "3 true");
        assert_eq!(render("{{o}}", &c), r#"{"k":"v"}"#);
        assert_eq!(render("{{a.1}}", &c), "y");
    }

    #[test]
    fn test_unterminated_placeholder_is_literal() {
        let c = ctx(json!({"x": "1"}));
        assert_eq!(render("{{x}} and {{y", &c), "1 and {{y");
    }

    #[test]
    fn test_text_without_placeholders_is_unchanged() {
        let c = ctx(json!({}));
        assert_eq!(render("plain } { text", &c), "plain } { text");
    }

    #[test]
    fn test_render_value_renders_leaves_only() {
        let c = ctx(json!({"input": {"commentText": "hi"}}));
        let template = json!({
            "text": "{{input.commentText}}",
            "count": 2,
            "nested": {"list": ["{{input.commentText}}!", false]}
        });
        assert_eq!(
            render_value(&template, &c),
            json!({"text": "hi", "count": 2, "nested": {"list": ["hi!", false]}})
        );
    }

    #[test]
    fn test_for_rule_exposes_event_and_rule() {
        use reflex_core::types::TriggerType;

        let event = TriggerEvent {
            workspace_id: "w1".to_string(),
            agent_id: Some("a1".to_string()),
            trigger_type: TriggerType::Comment,
            platform: "instagram".to_string(),
            content: Some("love it".to_string()),
            author_id: Some("u1".to_string()),
            author_name: Some("Jane".to_string()),
            author_email: None,
            post_id: Some("p1".to_string()),
            comment_id: Some("c1".to_string()),
            event_id: "c1".to_string(),
            occurred_at: Utc.with_ymd_and_hms(2026, 1, 12, 9, 0, 0).unwrap(),
            explicit_rule_id: None,
            recipient_override: None,
        };
        let rule = AutomationRule {
            id: "r1".to_string(),
            workspace_id: "w1".to_string(),
            agent_id: None,
            name: "Thank commenters".to_string(),
            trigger_type: "comment".to_string(),
            trigger_config: json!({}),
            action_type: "send_public_reply".to_string(),
            action_config: json!({}),
            enabled: true,
            last_executed_at: None,
        };
        let c = TemplateContext::for_rule(&event, &rule, event.occurred_at);
        assert_eq!(
            render("{{rule.name}}: {{input.authorName}} said {{input.commentText}} on {{input.platform}}", &c),
            "Thank commenters: Jane said love it on instagram"
        );
        assert_eq!(render("{{input.triggerType}}", &c), "comment");
        assert_eq!(c.input()["eventId"], "c1");
    }
}
