//! Outbound webhook action handler.
//!
//! The payload is serialized once; the signature covers those exact bytes
//! and the same buffer is sent on every attempt.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reflex_core::traits::{HttpClient, HttpRequest, RuleStore};
use reflex_core::types::{ActionType, WebhookCallLog};
use serde_json::json;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::EngineError;
use crate::handler::{with_timeout, ActionHandler, HandlerContext};
use crate::signer;
use crate::template::{render, render_value};
use crate::types::{ActionSpec, Delivery};

const ALLOWED_METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

pub struct WebhookHandler {
    http: Arc<dyn HttpClient>,
    store: Arc<dyn RuleStore>,
}

impl WebhookHandler {
    pub fn new(http: Arc<dyn HttpClient>, store: Arc<dyn RuleStore>) -> Self {
        Self { http, store }
    }
}

#[async_trait]
impl ActionHandler for WebhookHandler {
    fn action_type(&self) -> ActionType {
        ActionType::SendWebhook
    }

    async fn execute(&self, ctx: &HandlerContext<'_>) -> Result<Delivery, EngineError> {
        let ActionSpec::SendWebhook(action) = ctx.action else {
            return Err(EngineError::Validation(format!(
                "rule {}: expected send_webhook config",
                ctx.rule.id
            )));
        };

        let url = render(&action.url, ctx.template);
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(EngineError::Validation(format!(
                "Unsupported URL scheme. Only http:// and https:// are allowed, got: {}",
                url
            )));
        }

        let method = action.method.trim().to_ascii_uppercase();
        if !ALLOWED_METHODS.contains(&method.as_str()) {
            return Err(EngineError::Validation(format!(
                "unsupported webhook method '{}'",
                action.method
            )));
        }

        let body = if matches!(method.as_str(), "GET" | "DELETE") {
            Vec::new()
        } else {
            let template = action
                .payload
                .clone()
                .unwrap_or_else(|| json!({ "ruleId": ctx.rule.id, "event": ctx.template.input() }));
            serde_json::to_vec(&render_value(&template, ctx.template))
                .map_err(|e| EngineError::Render(format!("payload serialization failed: {}", e)))?
        };

        let mut headers: Vec<(String, String)> = action
            .headers
            .iter()
            .map(|(k, v)| (k.clone(), render(v, ctx.template)))
            .collect();
        if !body.is_empty()
            && !headers
                .iter()
                .any(|(k, _)| k.eq_ignore_ascii_case("content-type"))
        {
            headers.push(("Content-Type".to_string(), "application/json".to_string()));
        }
        if action.sign_payload {
            let signature = signer::sign(&body, ctx.rule.id.as_bytes())?;
            headers.push((ctx.config.signature_header.clone(), signature));
        }

        let request = HttpRequest {
            method,
            url,
            headers,
            body,
            timeout: Duration::from_millis(ctx.config.webhook_timeout_ms),
        };

        let max_attempts = action.retry_count.saturating_add(1);
        let mut attempt = 0u32;
        let response = loop {
            attempt += 1;
            match with_timeout(ctx.config.webhook_timeout_ms, self.http.request(&request)).await {
                Ok(response) => break response,
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        rule_id = %ctx.rule.id,
                        attempt,
                        max_attempts,
                        error = %e,
                        "Webhook attempt failed; retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(ctx.config.retry_delay_ms)).await;
                }
                Err(e) => {
                    warn!(rule_id = %ctx.rule.id, attempt, error = %e, "Webhook failed");
                    return Err(e);
                }
            }
        };

        info!(
            rule_id = %ctx.rule.id,
            status = response.status,
            attempts = attempt,
            "Webhook called"
        );

        let log = WebhookCallLog {
            id: Uuid::new_v4(),
            rule_id: ctx.rule.id.clone(),
            event_id: Some(ctx.event.event_id.clone()),
            method: request.method.clone(),
            url: request.url.clone(),
            status: response.status,
            body: truncate(&response.body, ctx.config.max_logged_body_bytes).to_string(),
            attempts: attempt,
            called_at: Utc::now(),
        };
        if let Err(e) = self.store.log_webhook_call(&log).await {
            warn!(rule_id = %ctx.rule.id, error = %e, "Failed to record webhook call");
        } else {
            debug!(rule_id = %ctx.rule.id, log_id = %log.id, "Webhook call recorded");
        }

        Ok(Delivery::Webhook {
            status: response.status,
        })
    }
}

/// Longest prefix of `s` within `max` bytes, cut on a char boundary.
fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::test_support::*;
    use reflex_core::config::EngineConfig;
    use reflex_core::error::ReflexError;
    use reflex_core::traits::HttpResponse;
    use reflex_storage::MemoryStore;
    use std::sync::Mutex;

    /// Fails the first `failures` requests, then answers with `status`.
    struct ScriptedHttp {
        failures: Mutex<u32>,
        status: u16,
        seen: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedHttp {
        fn new(failures: u32, status: u16) -> Self {
            Self {
                failures: Mutex::new(failures),
                status,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedHttp {
        async fn request(&self, request: &HttpRequest) -> reflex_core::Result<HttpResponse> {
            self.seen.lock().unwrap().push(request.clone());
            let mut failures = self.failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(ReflexError::Network("connection refused".to_string()));
            }
            Ok(HttpResponse {
                status: self.status,
                body: "ok".to_string(),
            })
        }
    }

    fn fast_config() -> EngineConfig {
        EngineConfig {
            retry_delay_ms: 1,
            ..EngineConfig::default()
        }
    }

    async fn run(
        http: Arc<ScriptedHttp>,
        config: serde_json::Value,
    ) -> (Arc<MemoryStore>, Result<Delivery, EngineError>) {
        let store = Arc::new(MemoryStore::new());
        let handler = WebhookHandler::new(http, store.clone());
        let fixture = Fixture::new(rule("send_webhook", config), event(), fast_config());
        let result = handler.execute(&fixture.ctx()).await;
        (store, result)
    }

    #[test]
    fn test_truncate_on_char_boundary() {
        assert_eq!(truncate("hello", 10), "hello");
        assert_eq!(truncate("hello", 3), "hel");
        assert_eq!(truncate("héllo", 2), "h");
    }

    #[tokio::test]
    async fn test_signed_payload_matches_sent_bytes() {
        let http = Arc::new(ScriptedHttp::new(0, 200));
        let (_, result) = run(
            http.clone(),
            json!({
                "url": "https://hooks.example.com/in",
                "payload": {"text": "{{input.commentText}}", "who": "{{input.authorName}}"},
                "signPayload": true
            }),
        )
        .await;
        assert_eq!(result.unwrap(), Delivery::Webhook { status: 200 });

        let seen = http.seen.lock().unwrap();
        let request = &seen[0];
        assert_eq!(request.method, "POST");
        let sent: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(sent, json!({"text": "Is this in stock?", "who": "Jane"}));

        let signature = request
            .headers
            .iter()
            .find(|(k, _)| k == "X-Reflex-Signature")
            .map(|(_, v)| v.clone())
            .unwrap();
        assert!(signer::verify(&request.body, b"r1", &signature));
        assert!(request
            .headers
            .iter()
            .any(|(k, v)| k == "Content-Type" && v == "application/json"));
    }

    #[tokio::test]
    async fn test_default_payload_carries_rule_and_event() {
        let http = Arc::new(ScriptedHttp::new(0, 204));
        let (_, result) = run(http.clone(), json!({"url": "https://hooks.example.com/in"})).await;
        assert!(result.is_ok());

        let seen = http.seen.lock().unwrap();
        let sent: serde_json::Value = serde_json::from_slice(&seen[0].body).unwrap();
        assert_eq!(sent["ruleId"], "r1");
        assert_eq!(sent["event"]["eventId"], "c1");
        assert!(!seen[0].headers.iter().any(|(k, _)| k == "X-Reflex-Signature"));
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let http = Arc::new(ScriptedHttp::new(2, 200));
        let (store, result) = run(
            http.clone(),
            json!({"url": "https://hooks.example.com/in", "retryCount": 2}),
        )
        .await;
        assert!(result.is_ok());
        assert_eq!(http.seen.lock().unwrap().len(), 3);

        let calls = store.webhook_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].attempts, 3);
        assert_eq!(calls[0].status, 200);
    }

    #[tokio::test]
    async fn test_exhausted_retries_is_network_error() {
        let http = Arc::new(ScriptedHttp::new(5, 200));
        let (store, result) = run(
            http.clone(),
            json!({"url": "https://hooks.example.com/in", "retryCount": 1}),
        )
        .await;
        assert!(matches!(result, Err(EngineError::Network(_))));
        assert_eq!(http.seen.lock().unwrap().len(), 2);
        assert!(store.webhook_calls().is_empty());
    }

    #[tokio::test]
    async fn test_error_status_still_counts_as_called() {
        let http = Arc::new(ScriptedHttp::new(0, 500));
        let (store, result) = run(http.clone(), json!({"url": "https://hooks.example.com/in", "retryCount": 3})).await;
        assert_eq!(result.unwrap(), Delivery::Webhook { status: 500 });
        assert_eq!(http.seen.lock().unwrap().len(), 1);
        assert_eq!(store.webhook_calls()[0].status, 500);
    }

    #[tokio::test]
    async fn test_rejects_bad_scheme_and_method() {
        let http = Arc::new(ScriptedHttp::new(0, 200));
        let (_, result) = run(http.clone(), json!({"url": "file:///etc/passwd"})).await;
        assert!(matches!(result, Err(EngineError::Validation(_))));

        let (_, result) = run(
            http.clone(),
            json!({"url": "https://hooks.example.com", "method": "TRACE"}),
        )
        .await;
        assert!(matches!(result, Err(EngineError::Validation(_))));
        assert!(http.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_custom_headers_rendered_and_content_type_override() {
        let http = Arc::new(ScriptedHttp::new(0, 200));
        let (_, result) = run(
            http.clone(),
            json!({
                "url": "https://hooks.example.com/{{input.workspaceId}}",
                "method": "put",
                "headers": {"X-Agent": "{{input.agentId}}", "content-type": "application/vnd.reflex+json"}
            }),
        )
        .await;
        assert!(result.is_ok());

        let seen = http.seen.lock().unwrap();
        assert_eq!(seen[0].url, "https://hooks.example.com/w1");
        assert_eq!(seen[0].method, "PUT");
        assert!(seen[0].headers.contains(&("X-Agent".to_string(), "a1".to_string())));
        assert_eq!(
            seen[0]
                .headers
                .iter()
                .filter(|(k, _)| k.eq_ignore_ascii_case("content-type"))
                .count(),
            1
        );
    }
}
