//! Periodic driver for time-triggered rules.
//!
//! Wakes shortly after each interval boundary and runs a time tick for every
//! configured workspace/agent target.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use reflex_core::config::TickTarget;
use tokio::sync::Notify;
use tracing::{debug, error, info};

use crate::engine::Engine;
use crate::types::ExecutionOutcome;

/// Margin past the boundary so the tick lands inside the new minute.
const BOUNDARY_SLACK: Duration = Duration::from_millis(500);

/// Background loop calling [`Engine::process_time_tick_at`] on a schedule.
pub struct Ticker {
    engine: Arc<Engine>,
    targets: Vec<TickTarget>,
    interval: Duration,
    shutdown: Arc<Notify>,
}

impl Ticker {
    pub fn new(engine: Arc<Engine>, targets: Vec<TickTarget>, interval_secs: u64) -> Self {
        Self {
            engine,
            targets,
            interval: Duration::from_secs(interval_secs.max(1)),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Tick until [`Ticker::shutdown`] is called.
    pub async fn run(&self) {
        info!(
            targets = self.targets.len(),
            interval_secs = self.interval.as_secs(),
            "Ticker started"
        );
        loop {
            let delay = until_next_tick(Utc::now(), self.interval);
            tokio::select! {
                _ = tokio::time::sleep(delay) => {
                    self.tick_once(Utc::now()).await;
                }
                _ = self.shutdown.notified() => {
                    info!("Ticker stopped");
                    return;
                }
            }
        }
    }

    /// Run one tick for every target at `now`. Target failures are logged
    /// and do not stop the remaining targets.
    pub async fn tick_once(&self, now: DateTime<Utc>) -> Vec<ExecutionOutcome> {
        let mut all = Vec::new();
        for target in &self.targets {
            match self
                .engine
                .process_time_tick_at(&target.workspace_id, target.agent_id.as_deref(), now)
                .await
            {
                Ok(outcomes) => {
                    debug!(
                        workspace_id = %target.workspace_id,
                        fired = outcomes.len(),
                        "Tick evaluated"
                    );
                    all.extend(outcomes);
                }
                Err(e) => {
                    error!(workspace_id = %target.workspace_id, error = %e, "Tick failed");
                }
            }
        }
        all
    }

    /// Signal the loop to stop. Safe to call before `run`.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }
}

/// Time from `now` to just past the next multiple of `interval` since the
/// Unix epoch.
pub fn until_next_tick(now: DateTime<Utc>, interval: Duration) -> Duration {
    let interval_ms = interval.as_millis().max(1) as i64;
    let now_ms = now.timestamp_millis();
    let remainder = now_ms.rem_euclid(interval_ms);
    Duration::from_millis((interval_ms - remainder) as u64) + BOUNDARY_SLACK
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::Collaborators;
    use crate::http::ReqwestHttpClient;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use reflex_core::config::EngineConfig;
    use reflex_core::traits::{MessageComposer, PromptContext, ReplyPoster};
    use reflex_core::types::AutomationRule;
    use reflex_storage::MemoryStore;
    use serde_json::json;

    struct Silent;

    #[async_trait]
    impl MessageComposer for Silent {
        async fn compose(&self, _: &PromptContext) -> reflex_core::Result<String> {
            Ok(String::new())
        }
    }

    #[async_trait]
    impl ReplyPoster for Silent {
        async fn post_reply(&self, _: &str, _: &str, _: &str) -> reflex_core::Result<()> {
            Ok(())
        }
    }

    fn ticker(store: Arc<MemoryStore>, targets: Vec<TickTarget>) -> Ticker {
        let engine = Engine::new(
            EngineConfig::default(),
            Collaborators {
                store: store.clone(),
                composer: Arc::new(Silent),
                dm_sender: store,
                reply_poster: Arc::new(Silent),
                http: Arc::new(ReqwestHttpClient::new()),
            },
        );
        Ticker::new(Arc::new(engine), targets, 60)
    }

    fn target(workspace_id: &str) -> TickTarget {
        TickTarget {
            workspace_id: workspace_id.to_string(),
            agent_id: None,
        }
    }

    #[test]
    fn test_until_next_tick_aligns_to_minute() {
        let now = Utc.with_ymd_and_hms(2026, 1, 12, 9, 0, 45).unwrap();
        assert_eq!(
            until_next_tick(now, Duration::from_secs(60)),
            Duration::from_secs(15) + BOUNDARY_SLACK
        );

        let on_boundary = Utc.with_ymd_and_hms(2026, 1, 12, 9, 1, 0).unwrap();
        assert_eq!(
            until_next_tick(on_boundary, Duration::from_secs(60)),
            Duration::from_secs(60) + BOUNDARY_SLACK
        );
    }

    #[tokio::test]
    async fn test_ticker_shutdown() {
        let t = ticker(Arc::new(MemoryStore::new()), vec![target("w1")]);
        t.shutdown();
        tokio::time::timeout(Duration::from_secs(2), t.run())
            .await
            .expect("Ticker should shut down within timeout");
    }

    #[tokio::test]
    async fn test_tick_once_covers_every_target() {
        let email_rule = |id: &str, ws: &str| AutomationRule {
            id: id.to_string(),
            workspace_id: ws.to_string(),
            agent_id: None,
            name: String::new(),
            trigger_type: "time".to_string(),
            trigger_config: json!({"cronPattern": "0 9 * * *"}),
            action_type: "send_email".to_string(),
            action_config: json!({"to": "ops@example.com", "subject": "Daily digest"}),
            enabled: true,
            last_executed_at: None,
        };
        let store = Arc::new(MemoryStore::with_rules(vec![
            email_rule("r1", "w1"),
            email_rule("r2", "w2"),
        ]));
        let t = ticker(store.clone(), vec![target("w1"), target("w2")]);

        let nine = Utc.with_ymd_and_hms(2026, 1, 12, 9, 0, 0).unwrap();
        let outcomes = t.tick_once(nine).await;
        assert_eq!(outcomes.len(), 2);
        assert!(outcomes.iter().all(|o| o.email_queued));
        assert_eq!(store.queued_emails().len(), 2);

        // Same minute again: nothing fires.
        assert!(t.tick_once(nine).await.is_empty());
    }
}
