//! Database schema migrations.

use rusqlite::Connection;
use tracing::info;

use reflex_core::error::ReflexError;

/// Run all pending database migrations.
pub fn run_migrations(conn: &Connection) -> Result<(), ReflexError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            version     INTEGER PRIMARY KEY NOT NULL,
            name        TEXT NOT NULL,
            applied_at  INTEGER NOT NULL DEFAULT (strftime('%s', 'now'))
        );",
    )
    .map_err(|e| ReflexError::Storage(format!("Failed to create migrations table: {}", e)))?;

    let current_version: i64 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_migrations",
            [],
            |row| row.get(0),
        )
        .map_err(|e| ReflexError::Storage(format!("Failed to query migration version: {}", e)))?;

    if current_version < 1 {
        apply_v1(conn)?;
        info!("Applied migration v1: initial_schema");
    }

    Ok(())
}

/// Version 1: rules, idempotency markers, and action side tables.
///
/// Timestamps are Unix milliseconds.
fn apply_v1(conn: &Connection) -> Result<(), ReflexError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS automation_rules (
            id                TEXT PRIMARY KEY NOT NULL,
            workspace_id      TEXT NOT NULL,
            agent_id          TEXT,
            name              TEXT NOT NULL DEFAULT '',
            trigger_type      TEXT NOT NULL,
            trigger_config    TEXT NOT NULL DEFAULT '{}',
            action_type       TEXT NOT NULL,
            action_config     TEXT NOT NULL DEFAULT '{}',
            enabled           INTEGER NOT NULL DEFAULT 1,
            last_executed_at  INTEGER,
            created_at        INTEGER NOT NULL DEFAULT (strftime('%s', 'now') * 1000)
        );

        CREATE INDEX IF NOT EXISTS idx_rules_scope
            ON automation_rules (workspace_id, enabled, agent_id);

        CREATE TABLE IF NOT EXISTS event_markers (
            event_id    TEXT NOT NULL,
            rule_id     TEXT NOT NULL,
            state       TEXT NOT NULL CHECK (state IN ('claimed', 'processed')),
            updated_at  INTEGER NOT NULL,
            PRIMARY KEY (event_id, rule_id)
        );

        CREATE TABLE IF NOT EXISTS queued_emails (
            id            TEXT PRIMARY KEY NOT NULL,
            rule_id       TEXT NOT NULL,
            workspace_id  TEXT NOT NULL,
            event_id      TEXT,
            recipient     TEXT NOT NULL,
            subject       TEXT NOT NULL DEFAULT '',
            body          TEXT NOT NULL DEFAULT '',
            status        TEXT NOT NULL DEFAULT 'queued'
                          CHECK (status IN ('queued', 'sent', 'failed')),
            created_at    INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_queued_emails_status
            ON queued_emails (status, created_at ASC);

        CREATE TABLE IF NOT EXISTS webhook_calls (
            id          TEXT PRIMARY KEY NOT NULL,
            rule_id     TEXT NOT NULL,
            event_id    TEXT,
            method      TEXT NOT NULL,
            url         TEXT NOT NULL,
            status      INTEGER NOT NULL,
            body        TEXT NOT NULL DEFAULT '',
            attempts    INTEGER NOT NULL,
            called_at   INTEGER NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_webhook_calls_rule
            ON webhook_calls (rule_id, called_at DESC);

        CREATE TABLE IF NOT EXISTS outbound_messages (
            id            TEXT PRIMARY KEY NOT NULL,
            workspace_id  TEXT NOT NULL,
            agent_id      TEXT,
            platform      TEXT NOT NULL,
            recipient_id  TEXT NOT NULL,
            text          TEXT NOT NULL,
            created_at    INTEGER NOT NULL
        );

        INSERT INTO schema_migrations (version, name) VALUES (1, 'initial_schema');
        ",
    )
    .map_err(|e| ReflexError::Storage(format!("Migration v1 failed: {}", e)))?;

    Ok(())
}
