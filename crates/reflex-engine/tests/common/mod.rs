//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use reflex_core::config::EngineConfig;
use reflex_core::error::ReflexError;
use reflex_core::traits::{
    HttpClient, HttpRequest, HttpResponse, MessageComposer, PromptContext, ReplyPoster, RuleStore,
};
use reflex_core::types::AutomationRule;
use reflex_engine::{Collaborators, Engine, ReqwestHttpClient};
use reflex_storage::MemoryStore;
use serde_json::Value;

pub struct CannedComposer(pub String);

#[async_trait]
impl MessageComposer for CannedComposer {
    async fn compose(&self, _: &PromptContext) -> reflex_core::Result<String> {
        Ok(self.0.clone())
    }
}

#[derive(Default)]
pub struct RecordingPoster {
    pub replies: Mutex<Vec<(String, String, String)>>,
}

#[async_trait]
impl ReplyPoster for RecordingPoster {
    async fn post_reply(&self, post_id: &str, comment_id: &str, text: &str) -> reflex_core::Result<()> {
        self.replies.lock().unwrap().push((
            post_id.to_string(),
            comment_id.to_string(),
            text.to_string(),
        ));
        Ok(())
    }
}

/// HTTP client that fails every request for one URL and answers 200
/// otherwise.
pub struct PartitionedHttp {
    pub broken_url: String,
    pub calls: Mutex<Vec<String>>,
}

#[async_trait]
impl HttpClient for PartitionedHttp {
    async fn request(&self, request: &HttpRequest) -> reflex_core::Result<HttpResponse> {
        self.calls.lock().unwrap().push(request.url.clone());
        if request.url == self.broken_url {
            return Err(ReflexError::Network("connection reset".to_string()));
        }
        Ok(HttpResponse {
            status: 200,
            body: "{}".to_string(),
        })
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        retry_delay_ms: 1,
        webhook_timeout_ms: 2_000,
        action_timeout_ms: 2_000,
        ..EngineConfig::default()
    }
}

pub struct Harness {
    pub engine: Engine,
    pub store: Arc<MemoryStore>,
    pub poster: Arc<RecordingPoster>,
}

pub fn harness(rules: Vec<AutomationRule>) -> Harness {
    harness_with_http(rules, Arc::new(ReqwestHttpClient::new()))
}

pub fn harness_with_http(rules: Vec<AutomationRule>, http: Arc<dyn HttpClient>) -> Harness {
    let store = Arc::new(MemoryStore::with_rules(rules));
    let poster = Arc::new(RecordingPoster::default());
    let engine = Engine::new(
        test_config(),
        Collaborators {
            store: store.clone() as Arc<dyn RuleStore>,
            composer: Arc::new(CannedComposer("Drafted reply".to_string())),
            dm_sender: store.clone(),
            reply_poster: poster.clone(),
            http,
        },
    );
    Harness {
        engine,
        store,
        poster,
    }
}

pub fn rule(
    id: &str,
    trigger_type: &str,
    trigger_config: Value,
    action_type: &str,
    action_config: Value,
) -> AutomationRule {
    AutomationRule {
        id: id.to_string(),
        workspace_id: "w1".to_string(),
        agent_id: None,
        name: format!("Rule {}", id),
        trigger_type: trigger_type.to_string(),
        trigger_config,
        action_type: action_type.to_string(),
        action_config,
        enabled: true,
        last_executed_at: None,
    }
}
