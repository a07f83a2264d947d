//! # ruleflowd — ruleflow daemon
//!
//! Composition root that wires storage and the action sink into the
//! automation runtime and keeps it running until interrupted.
//!
//! ## Responsibilities
//! - Parse configuration (config file, env vars)
//! - Install the `tracing` subscriber
//! - Initialize the `SQLite` connection pool and run migrations
//! - Load stored rules into the runtime
//! - Persist every emitted event to the event log
//! - Start the scheduler and wait for Ctrl-C
//! - On shutdown, stop the scheduler and save rule statistics
//!
//! ## Dependency rule
//! This is the **only** crate that depends on all other crates.
//! It is the wiring layer — no domain logic belongs here.

mod config;

use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

use ruleflow_adapter_actions::LoggingActionExecutor;
use ruleflow_adapter_storage_sqlite_sqlx::{
    Config as DatabaseConfig, SqliteEventLog, SqliteRuleRepository,
};
use ruleflow_app::ports::EventLog;
use ruleflow_app::runtime::AutomationRuntime;

use crate::config::Config;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = Config::load()?;

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_new(&config.logging.filter)?)
        .init();

    // Database
    let db = DatabaseConfig {
        database_url: config.database_url().to_string(),
    }
    .build()
    .await?;
    let rule_repo = SqliteRuleRepository::new(db.pool().clone());
    let event_log = SqliteEventLog::new(db.pool().clone());

    // Runtime
    let runtime =
        AutomationRuntime::with_settings(LoggingActionExecutor::new(), config.runtime_settings());
    runtime.load_rules(&rule_repo).await?;

    // Event log
    let mut events = runtime.dispatcher().subscribe();
    let recorder = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(err) = event_log.append(event).await {
                        tracing::error!(error = %err, "failed to record event");
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event recorder fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    if config.scheduler.enabled {
        runtime.start().await;
    } else {
        tracing::info!("scheduler disabled");
    }

    tracing::info!(rules = runtime.engine().rule_count().await, "ruleflowd running");
    tokio::signal::ctrl_c().await?;
    tracing::info!("shutting down");

    runtime.stop().await;
    runtime.persist_rules(&rule_repo).await?;
    recorder.abort();
    db.close().await;

    Ok(())
}
