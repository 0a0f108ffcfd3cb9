//! Reflex application binary - composition root.
//!
//! 1. Resolve CLI args and load configuration from TOML
//! 2. Open the SQLite store
//! 3. Build the engine with HTTP-backed collaborators
//! 4. Run the requested subcommand, printing outcomes as JSON

mod cli;
mod clients;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use reflex_core::config::ReflexConfig;
use reflex_core::types::AutomationRule;
use reflex_engine::{BatchSummary, Collaborators, Engine, RawTrigger, ReqwestHttpClient, Ticker};
use reflex_storage::{Database, SqliteStore};
use serde::Serialize;

use cli::{CliArgs, Command};
use clients::{HttpComposer, HttpReplyPoster};

/// Expand ~ to home directory in a path string.
fn resolve_data_dir(data_dir: &str) -> PathBuf {
    if data_dir.starts_with("~/") || data_dir.starts_with("~\\") {
        #[cfg(target_os = "windows")]
        let home = std::env::var("USERPROFILE").unwrap_or_else(|_| ".".to_string());
        #[cfg(not(target_os = "windows"))]
        let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home).join(&data_dir[2..])
    } else {
        PathBuf::from(data_dir)
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, Box<dyn std::error::Error>> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config is read before tracing starts so its log level can apply.
    let config_file = args.resolve_config_path();
    let loaded = if config_file.exists() {
        Some(ReflexConfig::load(&config_file))
    } else {
        None
    };
    let mut config = match &loaded {
        Some(Ok(config)) => config.clone(),
        _ => ReflexConfig::default(),
    };
    if let Some(dir) = args.resolve_data_dir() {
        config.general.data_dir = dir;
    }

    // Tracing.
    let level = args.resolve_log_level(&config.general.log_level);
    tracing_subscriber::fmt()
        .with_env_filter(cli::log_filter(
            std::env::var("RUST_LOG").ok().as_deref(),
            &level,
        ))
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("Starting Reflex v{}", env!("CARGO_PKG_VERSION"));
    match loaded {
        Some(Ok(_)) => tracing::info!(path = %config_file.display(), "Configuration loaded"),
        Some(Err(e)) => tracing::warn!(
            path = %config_file.display(),
            error = %e,
            "Failed to load config; using defaults"
        ),
        None => tracing::info!(path = %config_file.display(), "No config file; using defaults"),
    }

    // Storage.
    let data_dir = resolve_data_dir(&config.general.data_dir);
    if let Err(e) = std::fs::create_dir_all(&data_dir) {
        tracing::error!(path = %data_dir.display(), error = %e, "Failed to create data directory");
        return Err(e.into());
    }
    let db_path = data_dir.join("reflex.db");
    let db = Arc::new(Database::new(&db_path)?);
    let store = Arc::new(SqliteStore::new(db));
    tracing::info!(path = %db_path.display(), "SQLite database opened");

    if let Command::Import { file } = &args.command {
        let rules: Vec<AutomationRule> = read_json(file)?;
        for rule in &rules {
            store.upsert_rule(rule)?;
        }
        tracing::info!(count = rules.len(), "Rules imported");
        return Ok(());
    }

    // Engine.
    let engine = Arc::new(Engine::new(
        config.engine.clone(),
        Collaborators {
            store: store.clone(),
            composer: Arc::new(HttpComposer::from_config(&config.composer)),
            dm_sender: store.clone(),
            reply_poster: Arc::new(HttpReplyPoster::from_config(&config.reply)),
            http: Arc::new(ReqwestHttpClient::new()),
        },
    ));

    match args.command {
        Command::Run => {
            if !config.scheduler.enabled {
                tracing::warn!("Scheduler disabled in config; nothing to run");
                return Ok(());
            }
            if config.scheduler.targets.is_empty() {
                tracing::warn!("No scheduler targets configured");
            }
            let ticker = Arc::new(Ticker::new(
                Arc::clone(&engine),
                config.scheduler.targets.clone(),
                config.scheduler.tick_interval_secs,
            ));
            let runner = Arc::clone(&ticker);
            let handle = tokio::spawn(async move { runner.run().await });

            tokio::signal::ctrl_c().await?;
            tracing::info!("Shutdown requested");
            ticker.shutdown();
            handle.await?;
        }
        Command::Tick { workspace, agent } => {
            let outcomes = engine
                .process_time_tick(&workspace, agent.as_deref())
                .await?;
            tracing::info!(summary = ?BatchSummary::from_outcomes(&outcomes), "Tick complete");
            print_json(&outcomes)?;
        }
        Command::Manual {
            workspace,
            agent,
            rule,
            recipient,
        } => {
            let outcome = engine
                .process_manual(&workspace, agent.as_deref(), &rule, recipient.as_deref())
                .await?;
            print_json(&outcome)?;
        }
        Command::Event { file } => {
            let raw: RawTrigger = read_json(&file)?;
            let outcomes = engine.process_raw(raw).await?;
            tracing::info!(summary = ?BatchSummary::from_outcomes(&outcomes), "Event complete");
            print_json(&outcomes)?;
        }
        Command::Import { .. } => {}
    }

    Ok(())
}
